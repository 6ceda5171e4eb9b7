//! 检查器模块
//! Inspector module
//!
//! 提供任务的检查和管理功能：按状态列出、按 id 查询、统计、复活 dead 任务
//! Job inspection and administration: list by status, fetch by id, count, revive dead jobs

use crate::base::JobStore;
use crate::error::{Error, Result};
use crate::job::{Job, JobStatus, JobUpdate};
use std::collections::BTreeMap;
use std::sync::Arc;

/// 检查器
/// Inspector
pub struct Inspector {
  store: Arc<dyn JobStore>,
}

impl Inspector {
  pub fn new(store: Arc<dyn JobStore>) -> Self {
    Self { store }
  }

  /// 列出任务，`None` 表示所有状态
  /// List jobs; `None` lists every status
  pub async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
    self.store.list_jobs(status).await
  }

  /// 获取任务信息
  /// Get job information
  pub async fn get_job(&self, job_id: i64) -> Result<Job> {
    self
      .store
      .get_job(job_id)
      .await?
      .ok_or(Error::NotFound {
        entity: "job",
        id: job_id,
      })
  }

  /// 按状态统计任务数量，包含数量为 0 的状态
  /// Count jobs per status, including statuses with zero jobs
  pub async fn count_by_status(&self) -> Result<BTreeMap<&'static str, usize>> {
    let mut counts: BTreeMap<&'static str, usize> =
      JobStatus::ALL.iter().map(|s| (s.as_str(), 0)).collect();
    for job in self.store.list_jobs(None).await? {
      *counts.entry(job.status.as_str()).or_default() += 1;
    }
    Ok(counts)
  }

  /// 将 dead 任务重新入队，失败次数清零
  /// Put a dead job back on the queue with its fail count reset
  pub async fn revive_dead_job(&self, job_id: i64) -> Result<Job> {
    let job = self.get_job(job_id).await?;
    if job.status != JobStatus::Dead {
      return Err(Error::invalid_job(format!(
        "job {job_id} is {}, only dead jobs can be revived",
        job.status
      )));
    }
    self
      .store
      .update(
        job_id,
        JobUpdate {
          fails: Some(0),
          ..JobUpdate::requeue()
        },
      )
      .await?;
    tracing::info!(job_id, job_name = %job.name, "revived dead job");
    self.get_job(job_id).await
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::job::NewJob;
  use crate::memdb::MemoryStore;

  #[tokio::test]
  async fn test_revive_dead_job() {
    let store = Arc::new(MemoryStore::new());
    let job = store
      .create_job(&NewJob::new("flaky", "h"), None)
      .await
      .unwrap();
    let inspector = Inspector::new(store.clone());

    let err = inspector.revive_dead_job(job.id).await.unwrap_err();
    assert!(matches!(err, Error::InvalidJob { .. }));

    store.claim(job.id).await.unwrap();
    store
      .update(job.id, JobUpdate::dead(4, "boom"))
      .await
      .unwrap();
    let revived = inspector.revive_dead_job(job.id).await.unwrap();
    assert_eq!(revived.status, JobStatus::Enqueued);
    assert_eq!(revived.fails, 0);
    assert!(!revived.claimed);
    assert_eq!(revived.last_error, "boom");
  }

  #[tokio::test]
  async fn test_count_and_get() {
    let store = Arc::new(MemoryStore::new());
    store
      .create_job(&NewJob::new("a", "h"), None)
      .await
      .unwrap();
    let inspector = Inspector::new(store);
    let counts = inspector.count_by_status().await.unwrap();
    assert_eq!(counts["enqueued"], 1);
    assert_eq!(counts["dead"], 0);
    assert_eq!(counts.len(), 5);
    assert!(matches!(
      inspector.get_job(99).await,
      Err(Error::NotFound { .. })
    ));
  }
}
