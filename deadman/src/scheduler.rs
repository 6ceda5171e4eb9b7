//! # 周期性任务调度器
//! # Periodic job scheduler
//!
//! 将 cron 表达式绑定到周期性的入队操作。每个触发器有唯一标签，
//! 对同一标签重新调度会替换之前的触发器。
//! Binds cron expressions to recurring enqueue operations. Each trigger has a
//! unique tag; scheduling an existing tag replaces the previous trigger.
//!
//! 表达式支持 `cron` crate 的 6/7 字段格式（带秒），经典的 5 字段表达式会自动补上 `0` 秒
//! Expressions use the 6/7-field format of the `cron` crate (with seconds); classic
//! 5-field expressions get a `0` seconds field prepended.
//!
//! ```rust,no_run
//! use deadman::client::Client;
//! use deadman::job::NewJob;
//! use deadman::memdb::MemoryStore;
//! use deadman::scheduler::CronScheduler;
//! use std::sync::Arc;
//!
//! # async fn example() -> deadman::error::Result<()> {
//! let client = Arc::new(Client::new(Arc::new(MemoryStore::new())));
//! let scheduler = CronScheduler::new(client);
//! scheduler.schedule_cron("*/5 * * * *", "report", NewJob::new("report", "build_report"))?;
//! scheduler.start().await;
//! # Ok(())
//! # }
//! ```

use crate::client::Client;
use crate::error::{Error, Result};
use crate::job::NewJob;
use chrono::{DateTime, Utc};
use cron::Schedule;
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 没有任何触发器时的休眠时间
/// Sleep when no trigger is registered
const IDLE_SLEEP: Duration = Duration::from_secs(60);

/// 规范化并解析 cron 表达式
/// Normalise and parse a cron expression
pub fn parse_cron(expression: &str) -> Result<(String, Schedule)> {
  let trimmed = expression.trim();
  let normalized = match trimmed.split_whitespace().count() {
    5 => format!("0 {trimmed}"),
    6 | 7 => trimmed.to_string(),
    n => {
      return Err(Error::InvalidCron {
        expression: expression.to_string(),
        reason: format!("expected 5, 6 or 7 fields, got {n}"),
      })
    }
  };
  let schedule = Schedule::from_str(&normalized).map_err(|e| Error::InvalidCron {
    expression: expression.to_string(),
    reason: e.to_string(),
  })?;
  Ok((normalized, schedule))
}

/// 一个已注册的触发器
/// A registered trigger
#[derive(Debug, Clone)]
pub struct CronEntry {
  pub tag: String,
  /// 规范化后的表达式
  /// Normalised expression
  pub expression: String,
  pub job: NewJob,
  schedule: Schedule,
  pub next_tick: Option<DateTime<Utc>>,
}

impl CronEntry {
  fn new(tag: &str, expression: &str, job: NewJob, now: DateTime<Utc>) -> Result<Self> {
    let (expression, schedule) = parse_cron(expression)?;
    let next_tick = schedule.after(&now).next();
    Ok(Self {
      tag: tag.to_string(),
      expression,
      job,
      schedule,
      next_tick,
    })
  }
}

type Entries = Arc<RwLock<HashMap<String, CronEntry>>>;

/// cron 调度器
/// Cron scheduler
pub struct CronScheduler {
  client: Arc<Client>,
  id: String,
  entries: Entries,
  notify: Arc<Notify>,
  running: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl CronScheduler {
  pub fn new(client: Arc<Client>) -> Self {
    let id = format!(
      "{}:{}:{}",
      hostname::get().unwrap_or_default().to_string_lossy(),
      std::process::id(),
      Uuid::new_v4()
    );
    Self {
      client,
      id,
      entries: Arc::new(RwLock::new(HashMap::new())),
      notify: Arc::new(Notify::new()),
      running: Mutex::new(None),
    }
  }

  pub fn id(&self) -> &str {
    &self.id
  }

  /// 注册周期触发器，每次触发执行一次非唯一入队；同名标签会被替换
  /// Register a recurring trigger; each fire is a non-unique enqueue. An existing tag is replaced.
  pub fn schedule_cron(&self, expression: &str, tag: &str, job: NewJob) -> Result<()> {
    job.validate()?;
    if tag.trim().is_empty() {
      return Err(Error::config("cron tag must not be empty"));
    }
    let entry = CronEntry::new(tag, expression, job, Utc::now())?;
    let replaced = self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .insert(tag.to_string(), entry)
      .is_some();
    tracing::info!(tag, expression, replaced, "cron trigger scheduled");
    self.notify.notify_one();
    Ok(())
  }

  /// 按标签移除触发器
  /// Remove a trigger by tag
  pub fn remove_by_tag(&self, tag: &str) -> bool {
    let removed = self
      .entries
      .write()
      .unwrap_or_else(PoisonError::into_inner)
      .remove(tag)
      .is_some();
    if removed {
      tracing::info!(tag, "cron trigger removed");
      self.notify.notify_one();
    }
    removed
  }

  /// 已注册的标签（排序后）
  /// Registered tags, sorted
  pub fn tags(&self) -> Vec<String> {
    let mut tags: Vec<String> = self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect();
    tags.sort();
    tags
  }

  pub fn entry(&self, tag: &str) -> Option<CronEntry> {
    self
      .entries
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(tag)
      .cloned()
  }

  /// 触发所有在 `now` 之前到期的触发器，返回成功入队的数量
  /// Fire every trigger due at `now`, returning how many jobs were enqueued
  pub async fn fire_due(&self, now: DateTime<Utc>) -> usize {
    fire_due(&self.entries, &self.client, now).await
  }

  /// 启动调度循环；重复调用无副作用
  /// Start the scheduling loop; calling it twice is a no-op
  pub async fn start(&self) {
    let mut running = self.running.lock().await;
    if running.is_some() {
      return;
    }

    let token = CancellationToken::new();
    let entries = self.entries.clone();
    let client = self.client.clone();
    let notify = self.notify.clone();
    let loop_token = token.clone();

    let handle = tokio::spawn(async move {
      loop {
        if loop_token.is_cancelled() {
          break;
        }
        fire_due(&entries, &client, Utc::now()).await;

        let sleep_dur = next_tick(&entries)
          .map(|t| (t - Utc::now()).to_std().unwrap_or(Duration::ZERO))
          .unwrap_or(IDLE_SLEEP);
        tokio::select! {
          _ = loop_token.cancelled() => break,
          _ = tokio::time::sleep(sleep_dur) => {},
          _ = notify.notified() => {},
        }
      }
      tracing::debug!("cron scheduler loop exited");
    });

    *running = Some((token, handle));
    tracing::info!(scheduler = %self.id, "cron scheduler started");
  }

  /// 停止调度循环并等待其退出
  /// Stop the scheduling loop and wait for it to exit
  pub async fn stop(&self) {
    let Some((token, handle)) = self.running.lock().await.take() else {
      return;
    };
    token.cancel();
    if let Err(e) = handle.await {
      tracing::error!(error = %e, "cron scheduler task failed");
    }
    tracing::info!(scheduler = %self.id, "cron scheduler stopped");
  }
}

fn next_tick(entries: &Entries) -> Option<DateTime<Utc>> {
  entries
    .read()
    .unwrap_or_else(PoisonError::into_inner)
    .values()
    .filter_map(|e| e.next_tick)
    .min()
}

async fn fire_due(entries: &Entries, client: &Client, now: DateTime<Utc>) -> usize {
  let due: Vec<(String, NewJob)> = {
    let mut guard = entries.write().unwrap_or_else(PoisonError::into_inner);
    guard
      .values_mut()
      .filter(|e| e.next_tick.map(|next| next <= now).unwrap_or(false))
      .map(|e| {
        e.next_tick = e.schedule.after(&now).next();
        (e.tag.clone(), e.job.clone())
      })
      .collect()
  };

  let mut enqueued = 0;
  for (tag, job) in due {
    match client.enqueue(job, false).await {
      Ok(Some(created)) => {
        tracing::debug!(tag = %tag, job_id = created.id, "cron trigger fired");
        enqueued += 1;
      }
      Ok(None) => {}
      Err(e) => tracing::error!(tag = %tag, error = %e, "cron enqueue failed"),
    }
  }
  enqueued
}

#[cfg(test)]
mod tests {
  use super::*;
  use crate::base::JobStore;
  use crate::memdb::MemoryStore;

  fn scheduler() -> (Arc<MemoryStore>, CronScheduler) {
    let store = Arc::new(MemoryStore::new());
    let client = Arc::new(Client::new(store.clone()));
    (store, CronScheduler::new(client))
  }

  #[test]
  fn test_parse_cron() {
    let (normalized, _) = parse_cron("0 0 12 * * *").unwrap();
    assert_eq!(normalized, "0 0 12 * * *");
    let (normalized, _) = parse_cron("*/30 * * * *").unwrap();
    assert_eq!(normalized, "0 */30 * * * *");
    assert!(matches!(
      parse_cron("every day"),
      Err(Error::InvalidCron { .. })
    ));
    assert!(parse_cron("a b c d e f").is_err());
  }

  #[test]
  fn test_tags_are_unique() {
    let (_, scheduler) = scheduler();
    scheduler
      .schedule_cron("0 0 12 * * *", "probe_1", NewJob::new("probe_1", "a"))
      .unwrap();
    scheduler
      .schedule_cron("0 0 9 * * *", "probe_1", NewJob::new("probe_1", "b"))
      .unwrap();
    assert_eq!(scheduler.tags(), vec!["probe_1".to_string()]);
    let entry = scheduler.entry("probe_1").unwrap();
    assert_eq!(entry.expression, "0 0 9 * * *");
    assert_eq!(entry.job.handler, "b");

    assert!(scheduler.remove_by_tag("probe_1"));
    assert!(!scheduler.remove_by_tag("probe_1"));
    assert!(scheduler.tags().is_empty());
  }

  #[test]
  fn test_invalid_expression_rejected() {
    let (_, scheduler) = scheduler();
    assert!(scheduler
      .schedule_cron("not a cron", "t", NewJob::new("n", "h"))
      .is_err());
    assert!(scheduler.tags().is_empty());
  }

  #[tokio::test]
  async fn test_fire_due_enqueues_non_unique() {
    let (store, scheduler) = scheduler();
    scheduler
      .schedule_cron("* * * * * *", "tick", NewJob::new("tick", "h"))
      .unwrap();
    let first = scheduler.entry("tick").unwrap().next_tick.unwrap();

    assert_eq!(scheduler.fire_due(first - chrono::Duration::milliseconds(1)).await, 0);
    assert_eq!(scheduler.fire_due(first).await, 1);
    let second = scheduler.entry("tick").unwrap().next_tick.unwrap();
    assert!(second > first);
    assert_eq!(scheduler.fire_due(second).await, 1);
    assert_eq!(store.list_jobs(None).await.unwrap().len(), 2);
  }

  #[tokio::test]
  async fn test_start_stop() {
    let (store, scheduler) = scheduler();
    scheduler
      .schedule_cron("* * * * * *", "tick", NewJob::new("tick", "h"))
      .unwrap();
    scheduler.start().await;
    scheduler.start().await;
    tokio::time::sleep(Duration::from_millis(2200)).await;
    scheduler.stop().await;
    scheduler.stop().await;
    let fired = store.list_jobs(None).await.unwrap().len();
    assert!(fired >= 1, "expected at least one fire, got {fired}");
  }
}
