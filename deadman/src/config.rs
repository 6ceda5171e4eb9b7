//! 配置模块
//! Configuration module
//!
//! 定义了工作者池、后台组件和探测调度器的配置选项
//! Defines configuration options for the worker pool, background components and the probe scheduler

use crate::base::constants::{
  DEFAULT_BACKOFF_LADDER, DEFAULT_CONCURRENCY, DEFAULT_ERROR_BACKOFF, DEFAULT_FOLLOW_UP_CRON,
  DEFAULT_POLL_INTERVAL, DEFAULT_PROMOTER_INTERVAL, DEFAULT_REQUEUER_IDLE_INTERVAL,
  DEFAULT_STALE_THRESHOLD, MAX_FAILS, MAX_PROBE_RETRIES,
};
use crate::error::{Error, Result};
use std::time::Duration;

/// 工作者配置
/// Worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
  /// 默认轮询间隔，认领失败后和执行完任务后使用
  /// Default poll interval, used after a lost claim and after each executed job
  pub poll_interval: Duration,
  /// 空闲退避阶梯，到达最后一级后保持不变
  /// Idle backoff ladder; clamped at the last step
  pub backoff_ladder: Vec<Duration>,
  /// 存储错误后的退避时间
  /// Backoff after a store error
  pub error_backoff: Duration,
  /// 失败次数上限
  /// Attempts before a job is dead
  pub max_fails: i32,
}

impl Default for WorkerConfig {
  fn default() -> Self {
    Self {
      poll_interval: DEFAULT_POLL_INTERVAL,
      backoff_ladder: DEFAULT_BACKOFF_LADDER.to_vec(),
      error_backoff: DEFAULT_ERROR_BACKOFF,
      max_fails: MAX_FAILS,
    }
  }
}

impl WorkerConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// 设置轮询间隔
  /// Set the poll interval
  pub fn poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  /// 设置退避阶梯
  /// Set the backoff ladder
  pub fn backoff_ladder(mut self, ladder: Vec<Duration>) -> Self {
    self.backoff_ladder = ladder;
    self
  }

  pub fn error_backoff(mut self, backoff: Duration) -> Self {
    self.error_backoff = backoff;
    self
  }

  pub fn max_fails(mut self, max_fails: i32) -> Self {
    self.max_fails = max_fails;
    self
  }

  /// 验证配置
  /// Validate the configuration
  pub fn validate(&self) -> Result<()> {
    if self.backoff_ladder.is_empty() {
      return Err(Error::config("Backoff ladder must have at least one step"));
    }
    if self.max_fails <= 0 {
      return Err(Error::config("Max fails must be greater than 0"));
    }
    Ok(())
  }
}

/// Requeuer 配置
/// Requeuer configuration
#[derive(Debug, Clone)]
pub struct RequeuerConfig {
  /// 找到卡住任务后的检查间隔
  /// Tick interval while abandoned jobs keep turning up
  pub poll_interval: Duration,
  /// in-progress 任务被视为卡住的阈值
  /// Age after which an in-progress job counts as abandoned
  pub stale_threshold: Duration,
  /// 未发现卡住任务时的休眠时间
  /// Sleep when nothing was found
  pub idle_interval: Duration,
  pub error_backoff: Duration,
}

impl Default for RequeuerConfig {
  fn default() -> Self {
    Self {
      poll_interval: DEFAULT_POLL_INTERVAL,
      stale_threshold: DEFAULT_STALE_THRESHOLD,
      idle_interval: DEFAULT_REQUEUER_IDLE_INTERVAL,
      error_backoff: DEFAULT_ERROR_BACKOFF,
    }
  }
}

impl RequeuerConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn poll_interval(mut self, interval: Duration) -> Self {
    self.poll_interval = interval;
    self
  }

  /// 设置卡住阈值
  /// Set the staleness threshold
  pub fn stale_threshold(mut self, threshold: Duration) -> Self {
    self.stale_threshold = threshold;
    self
  }

  pub fn idle_interval(mut self, interval: Duration) -> Self {
    self.idle_interval = interval;
    self
  }

  pub fn error_backoff(mut self, backoff: Duration) -> Self {
    self.error_backoff = backoff;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.stale_threshold.is_zero() {
      return Err(Error::config("Stale threshold must be greater than 0"));
    }
    Ok(())
  }
}

/// Promoter 配置
/// Promoter configuration
#[derive(Debug, Clone)]
pub struct PromoterConfig {
  pub interval: Duration,
  pub error_backoff: Duration,
}

impl Default for PromoterConfig {
  fn default() -> Self {
    Self {
      interval: DEFAULT_PROMOTER_INTERVAL,
      error_backoff: DEFAULT_ERROR_BACKOFF,
    }
  }
}

impl PromoterConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn interval(mut self, interval: Duration) -> Self {
    self.interval = interval;
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.interval.is_zero() {
      return Err(Error::config("Promoter interval must be greater than 0"));
    }
    Ok(())
  }
}

/// 工作者池配置
/// Worker pool configuration
#[derive(Debug, Clone)]
pub struct PoolConfig {
  /// 并发工作者数量
  /// Number of concurrent workers
  pub concurrency: usize,
  pub worker: WorkerConfig,
  pub requeuer: RequeuerConfig,
  pub promoter: PromoterConfig,
}

impl Default for PoolConfig {
  fn default() -> Self {
    Self {
      concurrency: DEFAULT_CONCURRENCY,
      worker: WorkerConfig::default(),
      requeuer: RequeuerConfig::default(),
      promoter: PromoterConfig::default(),
    }
  }
}

impl PoolConfig {
  pub fn new() -> Self {
    Self::default()
  }

  /// 设置并发数
  /// Set concurrency
  pub fn concurrency(mut self, concurrency: usize) -> Self {
    self.concurrency = concurrency;
    self
  }

  pub fn worker(mut self, worker: WorkerConfig) -> Self {
    self.worker = worker;
    self
  }

  pub fn requeuer(mut self, requeuer: RequeuerConfig) -> Self {
    self.requeuer = requeuer;
    self
  }

  pub fn promoter(mut self, promoter: PromoterConfig) -> Self {
    self.promoter = promoter;
    self
  }

  /// 验证配置
  /// Validate the configuration
  pub fn validate(&self) -> Result<()> {
    if self.concurrency == 0 {
      return Err(Error::config("Concurrency must be greater than 0"));
    }
    self.worker.validate()?;
    self.requeuer.validate()?;
    self.promoter.validate()
  }
}

/// 探测调度器配置
/// Probe scheduler configuration
#[derive(Debug, Clone)]
pub struct ProbeConfig {
  /// 全局跟进扫描的 cron 表达式
  /// Cron expression of the global follow-up sweep
  pub follow_up_cron: String,
  /// 升级前允许的跟进次数
  /// Follow-ups before escalation
  pub max_retries: i32,
  /// 线性退避的单位：第 n 次跟进前需等待 (n+1) 个单位
  /// Linear gate unit: follow-up n waits (n + 1) units since the last update
  pub follow_up_unit: Duration,
  pub probe_message: String,
  pub follow_up_message: String,
  /// 发给紧急联系人的消息，`{name}` 替换为用户名
  /// Message for the emergency contact; `{name}` is replaced by the user's name
  pub emergency_message: String,
}

impl Default for ProbeConfig {
  fn default() -> Self {
    Self {
      follow_up_cron: DEFAULT_FOLLOW_UP_CRON.to_string(),
      max_retries: MAX_PROBE_RETRIES,
      follow_up_unit: Duration::from_secs(60 * 60),
      probe_message: "Are you okay? Reply yes or no.".to_string(),
      follow_up_message: "We haven't heard from you. Are you okay? Reply yes or no.".to_string(),
      emergency_message: "{name} has not responded to their check-ins. Please check on them."
        .to_string(),
    }
  }
}

impl ProbeConfig {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn follow_up_cron<S: Into<String>>(mut self, expression: S) -> Self {
    self.follow_up_cron = expression.into();
    self
  }

  pub fn max_retries(mut self, max_retries: i32) -> Self {
    self.max_retries = max_retries;
    self
  }

  pub fn follow_up_unit(mut self, unit: Duration) -> Self {
    self.follow_up_unit = unit;
    self
  }

  pub fn probe_message<S: Into<String>>(mut self, message: S) -> Self {
    self.probe_message = message.into();
    self
  }

  pub fn follow_up_message<S: Into<String>>(mut self, message: S) -> Self {
    self.follow_up_message = message.into();
    self
  }

  pub fn emergency_message<S: Into<String>>(mut self, message: S) -> Self {
    self.emergency_message = message.into();
    self
  }

  pub fn validate(&self) -> Result<()> {
    if self.max_retries < 0 {
      return Err(Error::config("Max probe retries cannot be negative"));
    }
    if self.follow_up_cron.trim().is_empty() {
      return Err(Error::config("Follow-up cron expression must not be empty"));
    }
    Ok(())
  }
}
