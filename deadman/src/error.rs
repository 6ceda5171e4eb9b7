//! 错误处理模块
//! Error handling module
//!
//! 定义了 deadman 库中使用的各种错误类型
//! Defines the error types used across the deadman library

use thiserror::Error;

/// deadman 库的结果类型
/// Result type for the deadman library
pub type Result<T> = std::result::Result<T, Error>;

/// deadman 错误类型
/// deadman error type
#[derive(Error, Debug)]
pub enum Error {
  /// 存储错误（通用）
  /// Store error (backend agnostic)
  #[error("Store error: {0}")]
  Store(String),

  #[cfg(feature = "postgres")]
  /// SeaORM 数据库错误
  /// SeaORM database error
  #[error("SeaORM database error: {0}")]
  SeaOrm(#[from] sea_orm::DbErr),

  /// 序列化错误
  /// Serialization error
  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  /// 同名的唯一任务已在队列中
  /// A unique job with the same name is already queued
  #[error("Job already exists: {name}")]
  DuplicateJob { name: String },

  /// 处理器名称重复注册
  /// Handler name registered twice
  #[error("Handler already registered: {name}")]
  DuplicateHandler { name: String },

  /// 未注册的处理器
  /// No handler registered under this name
  #[error("No handler registered for: {name}")]
  HandlerNotFound { name: String },

  /// 无效的任务（缺少名称或处理器）
  /// Invalid job (missing name or handler)
  #[error("Invalid job: {message}")]
  InvalidJob { message: String },

  /// 无效的 cron 表达式
  /// Invalid cron expression
  #[error("Invalid cron expression '{expression}': {reason}")]
  InvalidCron { expression: String, reason: String },

  /// 记录未找到
  /// Record not found
  #[error("{entity} not found: {id}")]
  NotFound { entity: &'static str, id: i64 },

  /// 用户已有待处理的探测
  /// The user already has a pending probe
  #[error("User {user_id} already has a pending probe")]
  ProbePending { user_id: i64 },

  /// 消息发送失败
  /// Message delivery failed
  #[error("Messaging error: {0}")]
  Messaging(String),

  /// 处理器执行失败
  /// Handler execution failed
  #[error("Handler failed: {0}")]
  Handler(String),

  /// 配置错误
  /// Configuration error
  #[error("Configuration error: {message}")]
  Config { message: String },
}

impl Error {
  /// 创建存储错误
  /// Create a store error
  pub fn store<S: Into<String>>(message: S) -> Self {
    Self::Store(message.into())
  }

  /// 创建配置错误
  /// Create a configuration error
  pub fn config<S: Into<String>>(message: S) -> Self {
    Self::Config {
      message: message.into(),
    }
  }

  /// 创建无效任务错误
  /// Create an invalid job error
  pub fn invalid_job<S: Into<String>>(message: S) -> Self {
    Self::InvalidJob {
      message: message.into(),
    }
  }

  /// 创建消息发送错误
  /// Create a messaging error
  pub fn messaging<S: Into<String>>(message: S) -> Self {
    Self::Messaging(message.into())
  }

  /// 创建处理器失败错误
  /// Create a handler failure
  pub fn handler<S: Into<String>>(message: S) -> Self {
    Self::Handler(message.into())
  }

  /// 检查是否为可重试错误
  /// Check if the error is retriable
  ///
  /// 存储错误被视为暂时性故障，后台循环会退避后重试
  /// Store errors are treated as transient; background loops back off and retry
  pub fn is_retriable(&self) -> bool {
    match self {
      Error::Store(_) => true,
      #[cfg(feature = "postgres")]
      Error::SeaOrm(_) => true,
      Error::Serialization(_)
      | Error::DuplicateJob { .. }
      | Error::DuplicateHandler { .. }
      | Error::HandlerNotFound { .. }
      | Error::InvalidJob { .. }
      | Error::InvalidCron { .. }
      | Error::NotFound { .. }
      | Error::ProbePending { .. }
      | Error::Messaging(_)
      | Error::Handler(_)
      | Error::Config { .. } => false,
    }
  }

  /// 是否为重复任务错误
  /// Whether this is a duplicate job error
  pub fn is_duplicate_job(&self) -> bool {
    matches!(self, Error::DuplicateJob { .. })
  }
}
