//! 内存存储实现
//! Memory store implementation
//!
//! 所有表都保存在一个读写锁后面，按 id 有序
//! Every table lives behind one read-write lock, ordered by id

use crate::job::Job;
use crate::probe::{Contact, EmergencyProbe, Probe, ProbeSetting, User};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// 内存中的表
/// In-memory tables
#[derive(Default, Debug)]
pub struct MemoryStorage {
  /// 任务表，BTreeMap 保证 FIFO 顺序
  /// Job table; BTreeMap keeps FIFO order
  pub jobs: BTreeMap<i64, Job>,
  pub users: BTreeMap<i64, User>,
  pub contacts: BTreeMap<i64, Contact>,
  /// key: user_id
  pub probe_settings: BTreeMap<i64, ProbeSetting>,
  pub probes: BTreeMap<i64, Probe>,
  pub emergency_probes: BTreeMap<i64, EmergencyProbe>,
  sequences: Sequences,
}

#[derive(Default, Debug)]
struct Sequences {
  job: i64,
  user: i64,
  contact: i64,
  probe: i64,
  emergency_probe: i64,
}

impl MemoryStorage {
  pub(crate) fn next_job_id(&mut self) -> i64 {
    self.sequences.job += 1;
    self.sequences.job
  }

  pub(crate) fn next_user_id(&mut self) -> i64 {
    self.sequences.user += 1;
    self.sequences.user
  }

  pub(crate) fn next_contact_id(&mut self) -> i64 {
    self.sequences.contact += 1;
    self.sequences.contact
  }

  pub(crate) fn next_probe_id(&mut self) -> i64 {
    self.sequences.probe += 1;
    self.sequences.probe
  }

  pub(crate) fn next_emergency_probe_id(&mut self) -> i64 {
    self.sequences.emergency_probe += 1;
    self.sequences.emergency_probe
  }
}

/// 内存存储
/// Memory store
#[derive(Clone, Default)]
pub struct MemoryStore {
  pub(crate) storage: Arc<RwLock<MemoryStorage>>,
}

impl MemoryStore {
  /// 创建新的内存存储实例
  /// Create a new memory store instance
  pub fn new() -> Self {
    Self::default()
  }

  /// 获取存储的引用
  /// Get storage reference
  pub fn storage(&self) -> &Arc<RwLock<MemoryStorage>> {
    &self.storage
  }

  /// 任务总数
  /// Total number of jobs
  pub async fn job_count(&self) -> usize {
    self.storage.read().await.jobs.len()
  }
}
