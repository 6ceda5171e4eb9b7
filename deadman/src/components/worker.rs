//! Worker 模块
//! Worker module
//!
//! 单个轮询单元：每次认领一个任务，通过注册表执行并记录结果
//! A single polling unit: claims one job at a time, runs it through the
//! registry and records the outcome
//!
//! 状态：空闲轮询 → 认领 → 执行 → (成功 | 重试 | dead) → 空闲轮询
//! States: idle-polling → claiming → executing → (success | retry | dead) → idle-polling

use crate::base::JobStore;
use crate::components::{sleep_or_cancel, ComponentLifecycle};
use crate::config::WorkerConfig;
use crate::error::Result;
use crate::handler::HandlerRegistry;
use crate::job::{Job, JobStatus, JobUpdate};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// 有界退避阶梯
/// Bounded backoff ladder
///
/// 空闲时每次调用 `next` 前进一级，到最后一级后保持不变；找到任务时 `reset`
/// Each idle `next` moves one step up and stays on the last step; `reset` when work turns up
#[derive(Debug, Clone)]
pub struct Backoff {
  ladder: Vec<Duration>,
  index: usize,
}

impl Backoff {
  pub fn new(ladder: Vec<Duration>) -> Self {
    Self { ladder, index: 0 }
  }

  /// 返回当前等待时间并前进一级
  /// Return the current wait and step up
  pub fn next(&mut self) -> Duration {
    let wait = self
      .ladder
      .get(self.index)
      .or_else(|| self.ladder.last())
      .copied()
      .unwrap_or_default();
    if self.index + 1 < self.ladder.len() {
      self.index += 1;
    }
    wait
  }

  pub fn reset(&mut self) {
    self.index = 0;
  }
}

/// 一次执行的结果
/// Outcome of one execution
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobOutcome {
  Succeeded,
  /// 失败后重新入队
  /// Failed and put back on the queue
  Retried,
  /// 失败次数耗尽
  /// Out of attempts
  Dead,
}

/// 一次轮询的结果
/// Result of one poll
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tick {
  /// 没有可执行的任务
  /// Nothing to run
  Idle,
  /// 其他工作者先认领了任务
  /// Another worker claimed the job first
  LostClaim,
  Executed { job_id: i64, outcome: JobOutcome },
}

/// Worker - 认领并执行任务
/// Worker - claims and runs jobs
pub struct Worker {
  id: String,
  store: Arc<dyn JobStore>,
  registry: Arc<HandlerRegistry>,
  config: WorkerConfig,
  token: CancellationToken,
}

impl Worker {
  pub fn new(
    id: String,
    store: Arc<dyn JobStore>,
    registry: Arc<HandlerRegistry>,
    config: WorkerConfig,
    token: CancellationToken,
  ) -> Self {
    Self {
      id,
      store,
      registry,
      config,
      token,
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// 执行一次轮询
  /// Run one poll
  pub async fn work_once(&self) -> Result<Tick> {
    let Some(job) = self.store.first_job(JobStatus::Enqueued, false).await? else {
      return Ok(Tick::Idle);
    };

    if !self.store.claim(job.id).await? {
      tracing::debug!(worker = %self.id, job_id = job.id, "lost claim");
      return Ok(Tick::LostClaim);
    }

    let outcome = self.execute(&job).await?;
    Ok(Tick::Executed {
      job_id: job.id,
      outcome,
    })
  }

  /// 执行已认领的任务并记录结果
  /// Run a claimed job and record the outcome
  async fn execute(&self, job: &Job) -> Result<JobOutcome> {
    tracing::debug!(worker = %self.id, job_id = job.id, job_name = %job.name, handler = %job.handler, "executing job");

    let result = match job.decode_args() {
      Ok(args) => self.registry.dispatch(&job.handler, args).await,
      Err(e) => Err(e),
    };

    match result {
      Ok(()) => {
        self.store.update(job.id, JobUpdate::succeeded()).await?;
        tracing::debug!(worker = %self.id, job_id = job.id, "job succeeded");
        Ok(JobOutcome::Succeeded)
      }
      Err(e) => {
        let fails = job.fails + 1;
        let message = e.to_string();
        if fails >= self.config.max_fails {
          tracing::warn!(
            worker = %self.id,
            job_id = job.id,
            job_name = %job.name,
            fails,
            error = %message,
            "job is dead"
          );
          self.store.update(job.id, JobUpdate::dead(fails, message)).await?;
          Ok(JobOutcome::Dead)
        } else {
          tracing::info!(
            worker = %self.id,
            job_id = job.id,
            job_name = %job.name,
            fails,
            error = %message,
            "job failed, requeued"
          );
          self.store.update(job.id, JobUpdate::retry(fails, message)).await?;
          Ok(JobOutcome::Retried)
        }
      }
    }
  }

  /// 运行循环直到令牌被取消
  /// Run the loop until the token is cancelled
  pub async fn run(&self) {
    let mut backoff = Backoff::new(self.config.backoff_ladder.clone());
    tracing::debug!(worker = %self.id, "worker started");
    loop {
      if self.token.is_cancelled() {
        break;
      }

      let wait = match self.work_once().await {
        Ok(Tick::Idle) => backoff.next(),
        Ok(Tick::LostClaim) => self.config.poll_interval,
        Ok(Tick::Executed { .. }) => {
          backoff.reset();
          self.config.poll_interval
        }
        Err(e) => {
          tracing::error!(worker = %self.id, error = %e, "worker store error");
          self.config.error_backoff
        }
      };

      if !sleep_or_cancel(&self.token, wait).await {
        break;
      }
    }
    tracing::debug!(worker = %self.id, "worker stopped");
  }
}

impl ComponentLifecycle for Worker {
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
  use crate::error::Error;
  use crate::job::{JobArgs, NewJob};
  use crate::memdb::MemoryStore;

  fn secs(s: u64) -> Duration {
    Duration::from_secs(s)
  }

  #[test]
  fn test_backoff_monotone_and_clamped() {
    let mut backoff = Backoff::new(crate::base::constants::DEFAULT_BACKOFF_LADDER.to_vec());
    let waits: Vec<Duration> = (0..8).map(|_| backoff.next()).collect();
    assert_eq!(
      waits,
      vec![secs(0), secs(1), secs(2), secs(5), secs(15), secs(30), secs(30), secs(30)]
    );
    assert!(waits.windows(2).all(|w| w[0] <= w[1]));

    backoff.reset();
    assert_eq!(backoff.next(), secs(0));
  }

  #[test]
  fn test_backoff_empty_ladder() {
    let mut backoff = Backoff::new(vec![]);
    assert_eq!(backoff.next(), Duration::ZERO);
  }

  fn worker(store: Arc<MemoryStore>, registry: Arc<HandlerRegistry>) -> Worker {
    Worker::new(
      "test#0".to_string(),
      store,
      registry,
      WorkerConfig::default(),
      CancellationToken::new(),
    )
  }

  #[tokio::test]
  async fn test_idle_when_empty() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(HandlerRegistry::new());
    let worker = worker(store, registry);
    assert_eq!(worker.work_once().await.unwrap(), Tick::Idle);
  }

  #[tokio::test]
  async fn test_success_marks_job_successful() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("ok", |_: JobArgs| Ok(())).unwrap();
    let job = store
      .create_job(&NewJob::new("ok-job", "ok"), None)
      .await
      .unwrap();

    let worker = worker(store.clone(), registry);
    assert_eq!(
      worker.work_once().await.unwrap(),
      Tick::Executed {
        job_id: job.id,
        outcome: JobOutcome::Succeeded
      }
    );
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Successful);
    assert!(!stored.claimed);
  }

  #[tokio::test]
  async fn test_unknown_handler_counts_as_failure() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(HandlerRegistry::new());
    let job = store
      .create_job(&NewJob::new("orphan", "nobody"), None)
      .await
      .unwrap();

    let worker = worker(store.clone(), registry);
    let outcomes: Vec<Tick> = {
      let mut ticks = Vec::new();
      for _ in 0..4 {
        ticks.push(worker.work_once().await.unwrap());
      }
      ticks
    };
    assert!(matches!(
      outcomes[0],
      Tick::Executed {
        outcome: JobOutcome::Retried,
        ..
      }
    ));
    assert!(matches!(
      outcomes[3],
      Tick::Executed {
        outcome: JobOutcome::Dead,
        ..
      }
    ));
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.status, JobStatus::Dead);
    assert_eq!(stored.fails, 4);
    assert!(stored.last_error.contains("nobody"));
    assert_eq!(worker.work_once().await.unwrap(), Tick::Idle);
  }

  #[tokio::test]
  async fn test_undecodable_args_count_as_failure() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(HandlerRegistry::new());
    registry.register_fn("ok", |_: JobArgs| Ok(())).unwrap();
    let job = store
      .create_job(&NewJob::new("broken", "ok"), None)
      .await
      .unwrap();
    store
      .storage()
      .write()
      .await
      .jobs
      .get_mut(&job.id)
      .unwrap()
      .args = "not json".to_string();

    let worker = worker(store.clone(), registry);
    worker.work_once().await.unwrap();
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.fails, 1);
    assert_eq!(stored.status, JobStatus::Enqueued);
  }

  #[tokio::test]
  async fn test_failing_handler_records_error() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(HandlerRegistry::new());
    registry
      .register_fn("fail", |_: JobArgs| Err(Error::handler("gateway timeout")))
      .unwrap();
    let job = store
      .create_job(&NewJob::new("f", "fail"), None)
      .await
      .unwrap();

    let worker = worker(store.clone(), registry);
    worker.work_once().await.unwrap();
    let stored = store.get_job(job.id).await.unwrap().unwrap();
    assert_eq!(stored.fails, 1);
    assert!(!stored.claimed);
    assert_eq!(stored.status, JobStatus::Enqueued);
    assert!(stored.last_error.contains("gateway timeout"));
  }

  #[tokio::test]
  async fn test_shutdown_stops_loop() {
    let store = Arc::new(MemoryStore::new());
    let registry = Arc::new(HandlerRegistry::new());
    let worker = Arc::new(worker(store, registry));
    let handle = worker.clone().start();
    tokio::time::sleep(Duration::from_millis(20)).await;
    worker.shutdown();
    assert!(worker.is_done());
    tokio::time::timeout(Duration::from_secs(5), handle)
      .await
      .unwrap()
      .unwrap();
  }
}
