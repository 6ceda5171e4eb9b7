//! 存储契约模块
//! Store contract module
//!
//! 定义了工作者、后台组件和探测调度器依赖的存储接口
//! Defines the store interfaces that workers, background components and the probe scheduler rely on

use crate::error::Result;
use crate::job::{Job, JobStatus, JobUpdate, NewJob};
use crate::probe::{Contact, EmergencyProbe, Probe, ProbeSetting, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

pub mod constants;

/// 任务存储特性
/// Job store trait
///
/// 所有操作都必须在并发调用下安全
/// Every operation must be safe under concurrent callers
#[async_trait]
pub trait JobStore: Send + Sync {
  /// 创建唯一任务；同名任务处于 enqueued/in-progress/scheduled 时返回 `Error::DuplicateJob`
  /// Create a unique job; fails with `Error::DuplicateJob` while a job with the
  /// same name is enqueued, in-progress or scheduled
  async fn create_unique_job(&self, job: &NewJob) -> Result<Job>;

  /// 创建任务，不做唯一性检查；`run_after` 在未来时状态为 scheduled
  /// Create a job without a uniqueness check; a future `run_after` yields a scheduled job
  async fn create_job(&self, job: &NewJob, run_after: Option<DateTime<Utc>>) -> Result<Job>;

  /// 按 FIFO 顺序返回第一个匹配的任务
  /// Oldest job with the given status and claim flag
  async fn first_job(&self, status: JobStatus, claimed: bool) -> Result<Option<Job>>;

  /// 最早的已到期 scheduled 任务
  /// Oldest scheduled job whose due time has passed
  async fn first_scheduled_job_due(&self, now: DateTime<Utc>) -> Result<Option<Job>>;

  /// 条件更新 scheduled → enqueued，返回是否成功
  /// Conditional scheduled → enqueued transition
  async fn promote(&self, job_id: i64) -> Result<bool>;

  /// 认领任务：仅当任务为 enqueued 且未被认领时设置 claimed=true 并进入 in-progress
  /// Claim a job: sets claimed=true and in-progress only if it is enqueued and unclaimed.
  /// Returns whether the caller won.
  async fn claim(&self, job_id: i64) -> Result<bool>;

  /// 部分更新，总是刷新更新时间
  /// Partial update; always refreshes the update timestamp
  async fn update(&self, job_id: i64, update: JobUpdate) -> Result<()>;

  /// 最后更新时间早于 `age` 之前的最早任务
  /// Oldest job in `status` last updated more than `age` ago
  async fn last_updated_older_than(&self, age: Duration, status: JobStatus) -> Result<Option<Job>>;

  async fn get_job(&self, job_id: i64) -> Result<Option<Job>>;

  async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>>;
}

/// 探测存储特性
/// Probe store trait
#[async_trait]
pub trait ProbeStore: Send + Sync {
  /// 创建用户及其默认探测设置
  /// Create a user together with its default probe setting
  async fn create_user(&self, name: &str, destination: &str) -> Result<User>;

  async fn get_user(&self, user_id: i64) -> Result<Option<User>>;

  /// 添加联系人；`emergency` 为 true 时设为用户的紧急联系人
  /// Add a contact; with `emergency` it becomes the user's emergency contact
  async fn create_contact(
    &self,
    user_id: i64,
    name: &str,
    destination: &str,
    emergency: bool,
  ) -> Result<Contact>;

  async fn emergency_contact(&self, user_id: i64) -> Result<Option<Contact>>;

  async fn probe_setting(&self, user_id: i64) -> Result<Option<ProbeSetting>>;

  async fn save_probe_setting(&self, setting: &ProbeSetting) -> Result<()>;

  async fn active_probe_settings(&self) -> Result<Vec<ProbeSetting>>;

  /// 创建 pending 探测；已有 pending 探测时返回 `Error::ProbePending`
  /// Create a pending probe; fails with `Error::ProbePending` if one exists
  async fn create_pending_probe(&self, user_id: i64) -> Result<Probe>;

  async fn pending_probes(&self) -> Result<Vec<Probe>>;

  async fn pending_probe_for_user(&self, user_id: i64) -> Result<Option<Probe>>;

  /// 条件保存探测：仅当存储中的探测仍为 pending，且 `retry_count`、`updated_at` 与
  /// 调用方读到的 `seen` 一致时才写入，返回是否写入
  /// Conditionally persist a probe. The write happens only while the stored probe is
  /// still pending and its `retry_count` and `updated_at` match the `seen` snapshot.
  /// Returns whether the write happened.
  async fn save_probe_if_pending(&self, probe: &Probe, seen: &Probe) -> Result<bool>;

  /// 取消用户所有 pending 探测，返回数量
  /// Cancel every pending probe of a user, returning how many changed
  async fn cancel_pending_probes(&self, user_id: i64) -> Result<u64>;

  async fn list_probes(&self, user_id: i64) -> Result<Vec<Probe>>;

  async fn create_emergency_probe(
    &self,
    probe_id: i64,
    contact_id: i64,
    delivered: bool,
  ) -> Result<EmergencyProbe>;

  async fn emergency_probes(&self, probe_id: i64) -> Result<Vec<EmergencyProbe>>;
}

/// 同时满足两种契约的存储
/// A store that satisfies both contracts
pub trait Store: JobStore + ProbeStore {}

impl<T: JobStore + ProbeStore> Store for T {}
