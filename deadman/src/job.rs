//! 任务模块
//! Job module
//!
//! 定义了任务记录、任务状态和创建/更新任务所需的数据结构
//! Defines job records, job status and the data needed to create or update jobs

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// 任务参数：扁平的 JSON 对象
/// Job arguments: a flat JSON object
pub type JobArgs = serde_json::Map<String, Value>;

/// 任务状态
/// Job status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
  /// 延迟任务，等待到期
  /// Delayed job waiting for its due time
  #[serde(rename = "scheduled")]
  Scheduled,
  /// 等待被工作者认领
  /// Waiting to be claimed by a worker
  #[serde(rename = "enqueued")]
  Enqueued,
  /// 正在执行
  /// Being executed
  #[serde(rename = "in-progress")]
  InProgress,
  #[serde(rename = "successful")]
  Successful,
  /// 失败次数达到上限，不再执行
  /// Failed too many times, never executed again
  #[serde(rename = "dead")]
  Dead,
}

impl JobStatus {
  pub const ALL: [JobStatus; 5] = [
    Self::Scheduled,
    Self::Enqueued,
    Self::InProgress,
    Self::Successful,
    Self::Dead,
  ];

  /// 将任务状态转换为字符串
  /// Convert job status to string
  pub fn as_str(&self) -> &'static str {
    match self {
      Self::Scheduled => "scheduled",
      Self::Enqueued => "enqueued",
      Self::InProgress => "in-progress",
      Self::Successful => "successful",
      Self::Dead => "dead",
    }
  }

  /// 唯一性约束覆盖的状态
  /// Statuses covered by the uniqueness constraint
  pub fn is_active(&self) -> bool {
    matches!(self, Self::Scheduled | Self::Enqueued | Self::InProgress)
  }
}

impl fmt::Display for JobStatus {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

impl FromStr for JobStatus {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self> {
    match s {
      "scheduled" => Ok(Self::Scheduled),
      "enqueued" => Ok(Self::Enqueued),
      "in-progress" => Ok(Self::InProgress),
      "successful" => Ok(Self::Successful),
      "dead" => Ok(Self::Dead),
      other => Err(Error::store(format!("unknown job status: {other}"))),
    }
  }
}

/// 持久化的任务记录
/// A persisted job record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
  /// 单调递增的标识，决定 FIFO 顺序
  /// Monotonic identifier; FIFO order is id order
  pub id: i64,
  /// 用于去重的名称
  /// Name used for de-duplication
  pub name: String,
  /// 处理器注册名
  /// Registered handler name
  pub handler: String,
  /// JSON 编码的参数
  /// JSON encoded arguments
  pub args: String,
  pub fails: i32,
  pub last_error: String,
  pub claimed: bool,
  pub status: JobStatus,
  pub run_after: Option<DateTime<Utc>>,
  pub created_at: DateTime<Utc>,
  pub updated_at: DateTime<Utc>,
}

impl Job {
  /// 解码任务参数
  /// Decode the job arguments
  pub fn decode_args(&self) -> Result<JobArgs> {
    if self.args.trim().is_empty() {
      return Ok(JobArgs::new());
    }
    Ok(serde_json::from_str(&self.args)?)
  }
}

/// 待创建的任务
/// A job to be created
#[derive(Debug, Clone, PartialEq, Default)]
pub struct NewJob {
  pub name: String,
  pub handler: String,
  pub args: JobArgs,
}

impl NewJob {
  pub fn new<N: Into<String>, H: Into<String>>(name: N, handler: H) -> Self {
    Self {
      name: name.into(),
      handler: handler.into(),
      args: JobArgs::new(),
    }
  }

  /// 添加一个参数
  /// Add one argument
  pub fn with_arg<K: Into<String>, V: Into<Value>>(mut self, key: K, value: V) -> Self {
    self.args.insert(key.into(), value.into());
    self
  }

  pub fn with_args(mut self, args: JobArgs) -> Self {
    self.args = args;
    self
  }

  /// 校验名称和处理器不能为空
  /// Name and handler must both be non-empty
  pub fn validate(&self) -> Result<()> {
    if self.name.trim().is_empty() {
      return Err(Error::invalid_job("job name must not be empty"));
    }
    if self.handler.trim().is_empty() {
      return Err(Error::invalid_job("job handler must not be empty"));
    }
    Ok(())
  }

  /// 将参数编码为 JSON 文本
  /// Encode arguments as JSON text
  pub fn encode_args(&self) -> Result<String> {
    Ok(serde_json::to_string(&self.args)?)
  }
}

/// 任务的部分更新，未设置的字段保持不变
/// Partial job update; unset fields are left untouched
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobUpdate {
  pub fails: Option<i32>,
  pub last_error: Option<String>,
  pub claimed: Option<bool>,
  pub status: Option<JobStatus>,
}

impl JobUpdate {
  /// 执行成功
  /// Handler succeeded
  pub fn succeeded() -> Self {
    Self {
      claimed: Some(false),
      status: Some(JobStatus::Successful),
      ..Default::default()
    }
  }

  /// 执行失败，重新入队等待重试
  /// Handler failed, back to the queue for another attempt
  pub fn retry<E: Into<String>>(fails: i32, error: E) -> Self {
    Self {
      fails: Some(fails),
      last_error: Some(error.into()),
      claimed: Some(false),
      status: Some(JobStatus::Enqueued),
    }
  }

  /// 失败次数耗尽
  /// Out of attempts
  pub fn dead<E: Into<String>>(fails: i32, error: E) -> Self {
    Self {
      fails: Some(fails),
      last_error: Some(error.into()),
      claimed: None,
      status: Some(JobStatus::Dead),
    }
  }

  /// 释放卡住的任务，不计入失败次数
  /// Release an abandoned job without counting a failure
  pub fn requeue() -> Self {
    Self {
      claimed: Some(false),
      status: Some(JobStatus::Enqueued),
      ..Default::default()
    }
  }

  /// 应用到任务记录上
  /// Apply to a job record
  pub fn apply(&self, job: &mut Job, now: DateTime<Utc>) {
    if let Some(fails) = self.fails {
      job.fails = fails;
    }
    if let Some(last_error) = &self.last_error {
      job.last_error = last_error.clone();
    }
    if let Some(claimed) = self.claimed {
      job.claimed = claimed;
    }
    if let Some(status) = self.status {
      job.status = status;
    }
    job.updated_at = now;
  }
}
