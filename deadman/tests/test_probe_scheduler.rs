//! 探测调度器集成测试
//! Probe scheduler integration tests

use async_trait::async_trait;
use chrono::Duration as ChronoDuration;
use deadman::config::{PoolConfig, ProbeConfig, WorkerConfig};
use deadman::error::{Error, Result};
use deadman::job::JobStatus;
use deadman::probe::{Probe, ProbeStatus, User};
use deadman::probe_scheduler::{initial_probe_job, probe_tag, SweepReport};
use deadman::{
  CronScheduler, JobStore, MemoryStore, Messenger, ProbeScheduler, ProbeStore, WorkerPool,
};
use std::collections::HashSet;
use std::sync::{Arc, Mutex, Weak};
use std::time::Duration;

/// 记录所有出站消息，可让指定目标发送失败
/// Records every outbound message; sends to chosen destinations fail
#[derive(Default)]
struct RecordingMessenger {
  sent: Mutex<Vec<(String, String)>>,
  failing: Mutex<HashSet<String>>,
}

impl RecordingMessenger {
  fn fail_for(&self, destination: &str) {
    self.failing.lock().unwrap().insert(destination.to_string());
  }

  fn sent_to(&self, destination: &str) -> Vec<String> {
    self
      .sent
      .lock()
      .unwrap()
      .iter()
      .filter(|(to, _)| to == destination)
      .map(|(_, text)| text.clone())
      .collect()
  }
}

#[async_trait]
impl Messenger for RecordingMessenger {
  async fn send(&self, destination: &str, text: &str) -> Result<()> {
    if self.failing.lock().unwrap().contains(destination) {
      return Err(Error::messaging(format!("{destination} unreachable")));
    }
    self
      .sent
      .lock()
      .unwrap()
      .push((destination.to_string(), text.to_string()));
    Ok(())
  }
}

/// 向 `destination` 发送消息的同时代替用户回复一次
/// Replies once on the user's behalf while a message to `destination` is in flight
struct ReplyingMessenger {
  destination: String,
  user_id: i64,
  reply: String,
  scheduler: Mutex<Option<Weak<ProbeScheduler>>>,
  recorded: Mutex<Option<Option<Probe>>>,
}

impl ReplyingMessenger {
  fn new(destination: &str, user_id: i64, reply: &str) -> Self {
    Self {
      destination: destination.to_string(),
      user_id,
      reply: reply.to_string(),
      scheduler: Mutex::new(None),
      recorded: Mutex::new(None),
    }
  }

  fn arm(&self, scheduler: &Arc<ProbeScheduler>) {
    *self.scheduler.lock().unwrap() = Some(Arc::downgrade(scheduler));
  }

  fn recorded(&self) -> Option<Option<Probe>> {
    self.recorded.lock().unwrap().clone()
  }
}

#[async_trait]
impl Messenger for ReplyingMessenger {
  async fn send(&self, destination: &str, _text: &str) -> Result<()> {
    if destination != self.destination {
      return Ok(());
    }
    let scheduler = self.scheduler.lock().unwrap().take();
    if let Some(scheduler) = scheduler.and_then(|weak| weak.upgrade()) {
      let recorded = scheduler.record_response(self.user_id, &self.reply).await?;
      *self.recorded.lock().unwrap() = Some(recorded);
    }
    Ok(())
  }
}

fn scheduler_with(store: Arc<MemoryStore>, messenger: Arc<dyn Messenger>) -> Arc<ProbeScheduler> {
  let pool = Arc::new(WorkerPool::new(store.clone(), PoolConfig::default()).unwrap());
  let cron = Arc::new(CronScheduler::new(pool.client()));
  ProbeScheduler::new(store, pool, cron, messenger, ProbeConfig::default()).unwrap()
}

struct Harness {
  store: Arc<MemoryStore>,
  pool: Arc<WorkerPool>,
  cron: Arc<CronScheduler>,
  messenger: Arc<RecordingMessenger>,
  probes: Arc<ProbeScheduler>,
}

fn harness() -> Harness {
  let _ = tracing_subscriber::fmt().with_test_writer().try_init();
  let store = Arc::new(MemoryStore::new());
  let config = PoolConfig::default().worker(
    WorkerConfig::default()
      .poll_interval(Duration::from_millis(1))
      .backoff_ladder(vec![Duration::from_millis(10), Duration::from_millis(50)]),
  );
  let pool = Arc::new(WorkerPool::new(store.clone(), config).unwrap());
  let cron = Arc::new(CronScheduler::new(pool.client()));
  let messenger = Arc::new(RecordingMessenger::default());
  let probes = ProbeScheduler::new(
    store.clone(),
    pool.clone(),
    cron.clone(),
    messenger.clone(),
    ProbeConfig::default(),
  )
  .unwrap();
  probes.register_handlers().unwrap();
  Harness {
    store,
    pool,
    cron,
    messenger,
    probes,
  }
}

async fn user_with_contact(store: &MemoryStore) -> User {
  let user = store.create_user("ada", "+15550001").await.unwrap();
  store
    .create_contact(user.id, "sister", "+15550009", true)
    .await
    .unwrap();
  user
}

async fn pending_count(store: &MemoryStore, user_id: i64) -> usize {
  store
    .list_probes(user_id)
    .await
    .unwrap()
    .iter()
    .filter(|p| p.status == ProbeStatus::Pending)
    .count()
}

/// 跟进按 1h、2h、3h 的间隔发送，第三次跟进后才升级
/// Follow-ups are spaced 1h, 2h and 3h apart; escalation only after the third
#[tokio::test]
async fn test_follow_up_timing_and_escalation() {
  let h = harness();
  let user = user_with_contact(&h.store).await;
  let probe = h.probes.send_initial_probe(user.id).await.unwrap().unwrap();
  let t0 = probe.updated_at;
  let user_id = user.id;

  let sweep = |minutes: i64| {
    let probes = h.probes.clone();
    async move {
      probes
        .sweep_pending_probes_at(t0 + ChronoDuration::minutes(minutes))
        .await
        .unwrap()
    }
  };
  let retry_count = || {
    let store = h.store.clone();
    async move {
      store
        .pending_probe_for_user(user_id)
        .await
        .unwrap()
        .map(|p| p.retry_count)
    }
  };

  assert_eq!(sweep(59).await.skipped, 1);
  assert_eq!(sweep(60).await.followed_up, 1);
  assert_eq!(retry_count().await, Some(1));

  // 第二次跟进需要距上次 2 小时
  // The second follow-up waits 2h after the first
  assert_eq!(sweep(60 + 119).await.skipped, 1);
  assert_eq!(sweep(60 + 120).await.followed_up, 1);
  assert_eq!(retry_count().await, Some(2));

  assert_eq!(sweep(180 + 179).await.skipped, 1);
  assert_eq!(sweep(180 + 180).await.followed_up, 1);
  assert_eq!(retry_count().await, Some(3));

  let report = sweep(360).await;
  assert_eq!(
    report,
    SweepReport {
      escalated: 1,
      ..SweepReport::default()
    }
  );

  let probe = h.store.list_probes(user.id).await.unwrap().remove(0);
  assert_eq!(probe.status, ProbeStatus::Unavailable);
  assert_eq!(probe.retry_count, 3);

  let audit = h.store.emergency_probes(probe.id).await.unwrap();
  assert_eq!(audit.len(), 1);
  assert!(audit[0].delivered);

  assert_eq!(h.messenger.sent_to("+15550001").len(), 4);
  let emergency = h.messenger.sent_to("+15550009");
  assert_eq!(emergency.len(), 1);
  assert!(emergency[0].contains("ada"));

  // 已升级的探测不再被扫描
  // An escalated probe is no longer swept
  assert_eq!(sweep(24 * 60).await, SweepReport::default());
}

async fn exhausted_probe(store: &MemoryStore, user_id: i64) -> Probe {
  let seen = store.create_pending_probe(user_id).await.unwrap();
  let mut probe = seen.clone();
  probe.retry_count = 3;
  assert!(store.save_probe_if_pending(&probe, &seen).await.unwrap());
  probe
}

#[tokio::test]
async fn test_failed_escalation_still_marks_unavailable() {
  let h = harness();
  let user = user_with_contact(&h.store).await;
  h.messenger.fail_for("+15550009");
  let probe = exhausted_probe(&h.store, user.id).await;

  let report = h.probes.sweep_pending_probes().await.unwrap();
  assert_eq!(report.escalated, 1);

  let audit = h.store.emergency_probes(probe.id).await.unwrap();
  assert_eq!(audit.len(), 1);
  assert!(!audit[0].delivered);
  assert!(h.store.pending_probe_for_user(user.id).await.unwrap().is_none());
}

#[tokio::test]
async fn test_escalation_without_emergency_contact() {
  let h = harness();
  let user = h.store.create_user("bob", "+15550002").await.unwrap();
  let probe = exhausted_probe(&h.store, user.id).await;

  let report = h.probes.sweep_pending_probes().await.unwrap();
  assert_eq!(report.escalated, 1);
  assert!(h.store.emergency_probes(probe.id).await.unwrap().is_empty());
  assert_eq!(
    h.store.list_probes(user.id).await.unwrap()[0].status,
    ProbeStatus::Unavailable
  );
}

/// 一个探测的跟进失败不影响同一轮中的其他探测
/// A failed follow-up does not stop the rest of the sweep
#[tokio::test]
async fn test_sweep_handles_probes_independently() {
  let h = harness();
  let ada = user_with_contact(&h.store).await;
  let bob = h.store.create_user("bob", "+15550002").await.unwrap();
  h.probes.send_initial_probe(ada.id).await.unwrap();
  h.probes.send_initial_probe(bob.id).await.unwrap();
  h.messenger.fail_for("+15550001");

  let later = chrono::Utc::now() + ChronoDuration::hours(2);
  let report = h.probes.sweep_pending_probes_at(later).await.unwrap();
  assert_eq!(report.followed_up, 1);
  assert_eq!(report.failed, 1);

  let ada_probe = h.store.pending_probe_for_user(ada.id).await.unwrap().unwrap();
  assert_eq!(ada_probe.retry_count, 0);
  let bob_probe = h.store.pending_probe_for_user(bob.id).await.unwrap().unwrap();
  assert_eq!(bob_probe.retry_count, 1);
}

#[tokio::test]
async fn test_initial_probe_is_single_pending() {
  let h = harness();
  let user = user_with_contact(&h.store).await;
  assert!(h.probes.send_initial_probe(user.id).await.unwrap().is_some());
  assert!(h.probes.send_initial_probe(user.id).await.unwrap().is_none());
  assert_eq!(pending_count(&h.store, user.id).await, 1);
  assert_eq!(h.messenger.sent_to("+15550001").len(), 1);
}

#[tokio::test]
async fn test_failed_initial_send_creates_no_probe() {
  let h = harness();
  let user = user_with_contact(&h.store).await;
  h.messenger.fail_for("+15550001");
  let err = h.probes.send_initial_probe(user.id).await.unwrap_err();
  assert!(matches!(err, Error::Messaging(_)));
  assert!(h.store.list_probes(user.id).await.unwrap().is_empty());
}

#[tokio::test]
async fn test_record_response_mapping() {
  let h = harness();
  let user = user_with_contact(&h.store).await;

  h.probes.send_initial_probe(user.id).await.unwrap();
  let probe = h.probes.record_response(user.id, " Yeah ").await.unwrap().unwrap();
  assert_eq!(probe.status, ProbeStatus::Good);

  h.probes.send_initial_probe(user.id).await.unwrap();
  let probe = h.probes.record_response(user.id, "nope").await.unwrap().unwrap();
  assert_eq!(probe.status, ProbeStatus::Bad);

  h.probes.send_initial_probe(user.id).await.unwrap();
  let probe = h.probes.record_response(user.id, "maybe").await.unwrap().unwrap();
  assert_eq!(probe.status, ProbeStatus::Pending);
  assert_eq!(probe.last_response, "maybe");

  h.probes.record_response(user.id, "y").await.unwrap();
  // 没有 pending 探测时回复被忽略
  // A reply without a pending probe is ignored
  assert!(h.probes.record_response(user.id, "yes").await.unwrap().is_none());

  let statuses: Vec<ProbeStatus> = h
    .store
    .list_probes(user.id)
    .await
    .unwrap()
    .iter()
    .map(|p| p.status)
    .collect();
  assert_eq!(
    statuses,
    vec![ProbeStatus::Good, ProbeStatus::Bad, ProbeStatus::Good]
  );
}

#[tokio::test]
async fn test_update_probe_setting() {
  let h = harness();
  let user = user_with_contact(&h.store).await;
  let tag = probe_tag(user.id);

  let setting = h
    .probes
    .update_probe_setting(user.id, true, Some("30 9 * * *"))
    .await
    .unwrap();
  assert!(setting.active);
  assert_eq!(setting.cron_expression, "0 30 9 * * *");
  assert_eq!(h.cron.entry(&tag).unwrap().expression, "0 30 9 * * *");

  let err = h
    .probes
    .update_probe_setting(user.id, true, Some("whenever"))
    .await
    .unwrap_err();
  assert!(matches!(err, Error::InvalidCron { .. }));
  let stored = h.store.probe_setting(user.id).await.unwrap().unwrap();
  assert_eq!(stored.cron_expression, "0 30 9 * * *");

  h.probes.send_initial_probe(user.id).await.unwrap();
  h.probes
    .update_probe_setting(user.id, false, None)
    .await
    .unwrap();
  assert!(h.cron.entry(&tag).is_none());
  assert_eq!(pending_count(&h.store, user.id).await, 0);
  assert_eq!(
    h.store.list_probes(user.id).await.unwrap()[0].status,
    ProbeStatus::Cancelled
  );
  assert!(h.store.active_probe_settings().await.unwrap().is_empty());
}

#[tokio::test]
async fn test_bootstrap_schedules_active_users() {
  let h = harness();
  let ada = user_with_contact(&h.store).await;
  let bob = h.store.create_user("bob", "+15550002").await.unwrap();
  h.store.create_user("eve", "+15550003").await.unwrap();
  h.probes
    .update_probe_setting(ada.id, true, None)
    .await
    .unwrap();
  h.probes
    .update_probe_setting(bob.id, true, Some("0 0 8 * * *"))
    .await
    .unwrap();
  for tag in h.cron.tags() {
    h.cron.remove_by_tag(&tag);
  }

  assert_eq!(h.probes.bootstrap().await.unwrap(), 2);
  let mut expected = vec![
    probe_tag(ada.id),
    probe_tag(bob.id),
    "follow_up_probes".to_string(),
  ];
  expected.sort();
  assert_eq!(h.cron.tags(), expected);
}

/// 探测处理器通过工作者池执行
/// Probe handlers run through the worker pool
#[tokio::test]
async fn test_initial_probe_job_runs_on_pool() {
  let h = harness();
  let user = user_with_contact(&h.store).await;
  h.pool.enqueue(initial_probe_job(user.id), false).await.unwrap();
  h.pool.start().await;

  let mut sent = false;
  for _ in 0..200 {
    if pending_count(&h.store, user.id).await == 1 {
      sent = true;
      break;
    }
    tokio::time::sleep(Duration::from_millis(10)).await;
  }
  h.pool.stop().await;
  assert!(sent);
}

/// 端到端：两个每秒触发的用户，3 秒后至少 3 个任务，每个用户恰好一个 pending 探测
/// End to end: two users probed every second; after 3s there are at least 3 jobs
/// and exactly one pending probe per user
#[tokio::test]
async fn test_end_to_end_every_second() {
  let h = harness();
  let ada = user_with_contact(&h.store).await;
  let bob = h.store.create_user("bob", "+15550002").await.unwrap();
  for user in [&ada, &bob] {
    h.probes
      .update_probe_setting(user.id, true, Some("* * * * * *"))
      .await
      .unwrap();
  }

  h.probes.bootstrap().await.unwrap();
  h.pool.start().await;
  h.cron.start().await;
  tokio::time::sleep(Duration::from_secs(3)).await;
  h.cron.stop().await;
  h.pool.stop().await;

  let jobs = h.store.list_jobs(None).await.unwrap();
  assert!(jobs.len() >= 3, "only {} jobs recorded", jobs.len());
  assert!(jobs.iter().all(|j| j.status != JobStatus::Dead));
  assert_eq!(pending_count(&h.store, ada.id).await, 1);
  assert_eq!(pending_count(&h.store, bob.id).await, 1);
}

/// 跟进消息发送期间到达的回复不会被跟进覆盖
/// A reply that lands while a follow-up is being sent is kept
#[tokio::test]
async fn test_reply_during_follow_up_is_kept() {
  let store = Arc::new(MemoryStore::new());
  let user = user_with_contact(&store).await;
  let messenger = Arc::new(ReplyingMessenger::new("+15550001", user.id, "yes"));
  let probes = scheduler_with(store.clone(), messenger.clone());
  let probe = store.create_pending_probe(user.id).await.unwrap();
  messenger.arm(&probes);

  let later = probe.updated_at + ChronoDuration::hours(2);
  let report = probes.sweep_pending_probes_at(later).await.unwrap();
  assert_eq!(
    report,
    SweepReport {
      skipped: 1,
      ..SweepReport::default()
    }
  );
  let recorded = messenger.recorded().unwrap().unwrap();
  assert_eq!(recorded.status, ProbeStatus::Good);

  let stored = store.list_probes(user.id).await.unwrap().remove(0);
  assert_eq!(stored.status, ProbeStatus::Good);
  assert_eq!(stored.last_response, "yes");
  assert_eq!(stored.retry_count, 0);

  // 已回复的探测不会再跟进或升级
  // An answered probe is never followed up or escalated
  let report = probes
    .sweep_pending_probes_at(later + ChronoDuration::hours(24))
    .await
    .unwrap();
  assert_eq!(report, SweepReport::default());
  assert!(store.emergency_probes(probe.id).await.unwrap().is_empty());
}

/// 通知紧急联系人之前探测已经是 unavailable，审计行只写一次
/// The probe is already unavailable when the contact is notified; one audit row is written
#[tokio::test]
async fn test_escalation_is_persisted_before_notifying() {
  let store = Arc::new(MemoryStore::new());
  let user = user_with_contact(&store).await;
  let messenger = Arc::new(ReplyingMessenger::new("+15550009", user.id, "yes"));
  let probes = scheduler_with(store.clone(), messenger.clone());
  let probe = exhausted_probe(&store, user.id).await;
  messenger.arm(&probes);

  let report = probes.sweep_pending_probes().await.unwrap();
  assert_eq!(report.escalated, 1);

  // 升级期间的回复找不到 pending 探测
  // A reply during escalation finds no pending probe
  assert_eq!(messenger.recorded(), Some(None));
  let stored = store.list_probes(user.id).await.unwrap().remove(0);
  assert_eq!(stored.status, ProbeStatus::Unavailable);
  assert_eq!(store.emergency_probes(probe.id).await.unwrap().len(), 1);

  assert_eq!(
    probes.sweep_pending_probes().await.unwrap(),
    SweepReport::default()
  );
  assert_eq!(store.emergency_probes(probe.id).await.unwrap().len(), 1);
}
