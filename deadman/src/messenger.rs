//! 消息发送模块
//! Messaging module
//!
//! 出站消息的传输由外部实现，这里只定义发送接口。核心不做投递重试
//! Outbound transport lives outside the core; this only defines the send contract.
//! The core never retries a delivery itself.

use crate::error::Result;
use async_trait::async_trait;

/// 消息发送接口
/// Messenger contract
#[async_trait]
pub trait Messenger: Send + Sync {
  /// 向目标地址发送文本
  /// Send text to a destination
  async fn send(&self, destination: &str, text: &str) -> Result<()>;
}

/// 将出站消息写入日志
/// Writes outbound messages to the tracing log
#[derive(Debug, Default, Clone)]
pub struct LogMessenger;

#[async_trait]
impl Messenger for LogMessenger {
  async fn send(&self, destination: &str, text: &str) -> Result<()> {
    tracing::info!(destination, text, "outbound message");
    Ok(())
  }
}
