//! 后台组件模块
//! Background components module
//!
//! 工作者、Requeuer 和 Promoter 都是独立的 tokio 任务，只通过存储协调。
//! 每个组件持有一个取消令牌，在每次循环和每次休眠时检查。
//! Workers, the Requeuer and the Promoter are separate tokio tasks coordinated only
//! through the store. Each holds a cancellation token checked every tick and raced
//! against every sleep.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub mod promoter;
pub mod requeuer;
pub mod worker;

/// 组件生命周期管理接口
/// Component lifecycle interface
///
/// # 实现者 / Implementors
///
/// - [`Worker`](worker::Worker) - 认领并执行任务
/// - [`Requeuer`](requeuer::Requeuer) - 将卡住的任务重新入队
/// - [`Promoter`](promoter::Promoter) - 将到期的延迟任务转为 enqueued
pub trait ComponentLifecycle {
  /// 启动组件，返回可等待的 JoinHandle
  /// Start the component, returning a JoinHandle to await
  fn start(self: Arc<Self>) -> JoinHandle<()>;

  /// 发送关闭信号，组件在完成当前操作后停止
  /// Signal shutdown; the component stops after its current operation
  fn shutdown(&self);

  fn is_done(&self) -> bool;
}

/// 休眠，若令牌被取消则提前返回 `false`
/// Sleep, returning `false` early if the token is cancelled
pub(crate) async fn sleep_or_cancel(token: &CancellationToken, duration: Duration) -> bool {
  if duration.is_zero() {
    // 让出执行权，避免空转占满调度器
    // Yield so a zero wait does not starve the scheduler
    tokio::task::yield_now().await;
    return !token.is_cancelled();
  }
  tokio::select! {
    _ = token.cancelled() => false,
    _ = tokio::time::sleep(duration) => true,
  }
}
