//! 客户端模块
//! Client module
//!
//! 提供任务排队功能，由工作者池和 cron 调度器共享
//! Provides job queuing; shared by the worker pool and the cron scheduler

use crate::base::JobStore;
use crate::error::{Error, Result};
use crate::job::{Job, NewJob};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// 任务生产者
/// Job producer
#[derive(Clone)]
pub struct Client {
  store: Arc<dyn JobStore>,
}

impl Client {
  pub fn new(store: Arc<dyn JobStore>) -> Self {
    Self { store }
  }

  /// 获取存储实例
  /// Get the store instance
  pub fn store(&self) -> Arc<dyn JobStore> {
    self.store.clone()
  }

  /// 将任务加入队列立即处理
  /// Enqueue a job for immediate processing
  ///
  /// `unique` 为 true 时，同名任务已在队列中会记录警告并返回 `Ok(None)`
  /// With `unique`, an already queued job of the same name is logged at warn and yields `Ok(None)`
  pub async fn enqueue(&self, job: NewJob, unique: bool) -> Result<Option<Job>> {
    job.validate()?;
    let created = if unique {
      self.store.create_unique_job(&job).await
    } else {
      self.store.create_job(&job, None).await
    };
    match created {
      Ok(created) => {
        tracing::debug!(job_id = created.id, job_name = %created.name, "enqueued job");
        Ok(Some(created))
      }
      Err(Error::DuplicateJob { name }) => {
        tracing::warn!(job_name = %name, "job already queued, skipping");
        Ok(None)
      }
      Err(e) => Err(e),
    }
  }

  /// 调度任务在指定时间处理
  /// Schedule a job for processing at a specific time
  pub async fn schedule(&self, job: NewJob, run_after: DateTime<Utc>) -> Result<Job> {
    job.validate()?;
    self.store.create_job(&job, Some(run_after)).await
  }

  /// 在指定延迟后处理任务
  /// Enqueue a job to be processed after a delay
  pub async fn enqueue_in(&self, delay: Duration, job: NewJob) -> Result<Job> {
    let delay = chrono::Duration::from_std(delay).map_err(|_| Error::invalid_job("delay overflow"))?;
    let run_after = Utc::now()
      .checked_add_signed(delay)
      .ok_or_else(|| Error::invalid_job("delay overflow"))?;
    self.schedule(job, run_after).await
  }
}
