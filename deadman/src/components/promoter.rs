//! Promoter 模块
//! Promoter module
//!
//! 定期检查延迟任务，将到期的 scheduled 任务转为 enqueued
//! Periodically moves due scheduled jobs to enqueued

use crate::base::JobStore;
use crate::components::{sleep_or_cancel, ComponentLifecycle};
use crate::config::PromoterConfig;
use crate::error::Result;
use chrono::Utc;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Promoter - 负责转发已到期的延迟任务
/// Promoter - forwards due delayed jobs
pub struct Promoter {
  store: Arc<dyn JobStore>,
  config: PromoterConfig,
  token: CancellationToken,
}

impl Promoter {
  pub fn new(store: Arc<dyn JobStore>, config: PromoterConfig, token: CancellationToken) -> Self {
    Self {
      store,
      config,
      token,
    }
  }

  /// 转发所有已到期的任务，返回数量
  /// Promote every due job, returning how many moved
  pub async fn promote_due(&self) -> Result<usize> {
    let mut promoted = 0;
    while let Some(job) = self.store.first_scheduled_job_due(Utc::now()).await? {
      if self.store.promote(job.id).await? {
        tracing::debug!(job_id = job.id, job_name = %job.name, "promoted scheduled job");
        promoted += 1;
      }
      if self.token.is_cancelled() {
        break;
      }
    }
    Ok(promoted)
  }

  pub async fn run(&self) {
    tracing::debug!("Promoter: started");
    loop {
      if self.token.is_cancelled() {
        break;
      }

      let wait = match self.promote_due().await {
        Ok(_) => self.config.interval,
        Err(e) => {
          tracing::error!(error = %e, "Promoter: store error");
          self.config.error_backoff
        }
      };

      if !sleep_or_cancel(&self.token, wait).await {
        break;
      }
    }
    tracing::debug!("Promoter: shutting down");
  }
}

impl ComponentLifecycle for Promoter {
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

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::{JobStatus, NewJob};
  use crate::memdb::MemoryStore;
  use std::time::Duration;

  #[tokio::test]
  async fn test_promote_due_jobs_only() {
    let store = Arc::new(MemoryStore::new());
    let soon = store
      .create_job(
        &NewJob::new("soon", "h"),
        Some(Utc::now() + chrono::Duration::milliseconds(20)),
      )
      .await
      .unwrap();
    let later = store
      .create_job(
        &NewJob::new("later", "h"),
        Some(Utc::now() + chrono::Duration::hours(1)),
      )
      .await
      .unwrap();

    let promoter = Promoter::new(store.clone(), PromoterConfig::default(), CancellationToken::new());
    assert_eq!(promoter.promote_due().await.unwrap(), 0);

    tokio::time::sleep(Duration::from_millis(40)).await;
    assert_eq!(promoter.promote_due().await.unwrap(), 1);
    assert_eq!(
      store.get_job(soon.id).await.unwrap().unwrap().status,
      JobStatus::Enqueued
    );
    assert_eq!(
      store.get_job(later.id).await.unwrap().unwrap().status,
      JobStatus::Scheduled
    );
  }
}
