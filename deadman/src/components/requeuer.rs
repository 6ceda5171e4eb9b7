//! Requeuer 模块
//! Requeuer module
//!
//! 定期检查执行中途被遗弃的任务（工作者崩溃或进程重启），将其重新入队
//! Periodically finds jobs abandoned mid-execution (crashed worker or restarted
//! process) and puts them back on the queue
//!
//! 重新入队不增加失败次数
//! Requeueing never increments `fails`

use crate::base::JobStore;
use crate::components::{sleep_or_cancel, ComponentLifecycle};
use crate::config::RequeuerConfig;
use crate::error::Result;
use crate::job::{Job, JobStatus, JobUpdate};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Requeuer - 负责恢复卡住的任务
/// Requeuer - recovers abandoned jobs
pub struct Requeuer {
  store: Arc<dyn JobStore>,
  config: RequeuerConfig,
  token: CancellationToken,
}

impl Requeuer {
  pub fn new(store: Arc<dyn JobStore>, config: RequeuerConfig, token: CancellationToken) -> Self {
    Self {
      store,
      config,
      token,
    }
  }

  /// 恢复一个卡住的任务，没有则返回 `None`
  /// Recover one abandoned job, `None` when there is none
  pub async fn requeue_once(&self) -> Result<Option<Job>> {
    let Some(job) = self
      .store
      .last_updated_older_than(self.config.stale_threshold, JobStatus::InProgress)
      .await?
    else {
      return Ok(None);
    };

    self.store.update(job.id, JobUpdate::requeue()).await?;
    tracing::info!(
      job_id = job.id,
      job_name = %job.name,
      last_update = %job.updated_at,
      "requeued abandoned job"
    );
    Ok(Some(job))
  }

  /// 运行循环直到令牌被取消
  /// Run the loop until the token is cancelled
  pub async fn run(&self) {
    tracing::debug!("Requeuer: started");
    loop {
      if self.token.is_cancelled() {
        break;
      }

      let wait = match self.requeue_once().await {
        Ok(Some(_)) => self.config.poll_interval,
        Ok(None) => self.config.idle_interval,
        Err(e) => {
          tracing::error!(error = %e, "Requeuer: store error");
          self.config.error_backoff
        }
      };

      if !sleep_or_cancel(&self.token, wait).await {
        break;
      }
    }
    tracing::debug!("Requeuer: shutting down");
  }
}

impl ComponentLifecycle for Requeuer {
  fn start(self: Arc<Self>) -> JoinHandle<()> {
    tokio::spawn(async move { self.run().await })
  }

  fn shutdown(&self) {
    self.token.cancel();
  }

  fn is_done(&self) -> bool {
    self.token.is_cancelled()
  }
}
