//! 探测调度器
//! Probe scheduler
//!
//! 按每个用户的 cron 表达式发送存活探测，定期扫描未回复的探测，
//! 按线性退避发送跟进消息，超过次数后升级到紧急联系人。
//! Sends liveliness probes on each user's cron expression, periodically sweeps
//! unanswered probes, follows up on a linear backoff and escalates to the
//! emergency contact once the follow-ups run out.
//!
//! 探测状态机 / Probe state machine:
//!
//! ```text
//! (send initial probe) → pending ──reply yes──→ good
//!                           │    ──reply no───→ bad
//!                           │    ──disabled───→ cancelled
//!                           └─retries spent──→ unavailable (+ emergency probe)
//! ```

use crate::base::constants::{
  FOLLOW_UP_TAG, PROBE_TAG_PREFIX, SEND_INITIAL_PROBE_HANDLER, SWEEP_PENDING_PROBES_HANDLER,
};
use crate::base::ProbeStore;
use crate::config::ProbeConfig;
use crate::error::{Error, Result};
use crate::handler::Handler;
use crate::job::{JobArgs, NewJob};
use crate::messenger::Messenger;
use crate::pool::WorkerPool;
use crate::probe::{status_from_last_response, Probe, ProbeSetting, ProbeStatus};
use crate::scheduler::{parse_cron, CronScheduler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Weak};

/// 一次扫描的统计
/// Counts from one sweep
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SweepReport {
  pub followed_up: usize,
  pub escalated: usize,
  /// 尚未到跟进时间，或扫描期间已被回复
  /// Not due for a follow-up yet, or answered during the sweep
  pub skipped: usize,
  pub failed: usize,
}

/// 用户的 cron 标签
/// Cron tag of a user
pub fn probe_tag(user_id: i64) -> String {
  format!("{PROBE_TAG_PREFIX}{user_id}")
}

/// 发送初始探测的任务
/// Job that sends the initial probe
pub fn initial_probe_job(user_id: i64) -> NewJob {
  NewJob::new(probe_tag(user_id), SEND_INITIAL_PROBE_HANDLER).with_arg("user_id", user_id)
}

/// 探测调度器
/// Probe scheduler
pub struct ProbeScheduler {
  store: Arc<dyn ProbeStore>,
  pool: Arc<WorkerPool>,
  cron: Arc<CronScheduler>,
  messenger: Arc<dyn Messenger>,
  config: ProbeConfig,
}

impl ProbeScheduler {
  pub fn new(
    store: Arc<dyn ProbeStore>,
    pool: Arc<WorkerPool>,
    cron: Arc<CronScheduler>,
    messenger: Arc<dyn Messenger>,
    config: ProbeConfig,
  ) -> Result<Arc<Self>> {
    config.validate()?;
    parse_cron(&config.follow_up_cron)?;
    Ok(Arc::new(Self {
      store,
      pool,
      cron,
      messenger,
      config,
    }))
  }

  pub fn config(&self) -> &ProbeConfig {
    &self.config
  }

  /// 向工作者池注册两个探测处理器
  /// Register both probe handlers with the worker pool
  pub fn register_handlers(self: &Arc<Self>) -> Result<()> {
    self.pool.register_handler(
      SEND_INITIAL_PROBE_HANDLER,
      SendInitialProbeHandler {
        scheduler: Arc::downgrade(self),
      },
    )?;
    self.pool.register_handler(
      SWEEP_PENDING_PROBES_HANDLER,
      SweepPendingProbesHandler {
        scheduler: Arc::downgrade(self),
      },
    )
  }

  /// 为每个启用探测的用户安排触发器，并安排全局跟进扫描
  /// Schedule a trigger per active user plus the global follow-up sweep
  ///
  /// 返回安排的用户数量
  /// Returns how many users were scheduled
  pub async fn bootstrap(&self) -> Result<usize> {
    let mut scheduled = 0;
    for setting in self.store.active_probe_settings().await? {
      match self.schedule_user(&setting) {
        Ok(()) => scheduled += 1,
        Err(e) => tracing::error!(
          user_id = setting.user_id,
          cron = %setting.cron_expression,
          error = %e,
          "could not schedule probe"
        ),
      }
    }
    self.cron.schedule_cron(
      &self.config.follow_up_cron,
      FOLLOW_UP_TAG,
      NewJob::new(FOLLOW_UP_TAG, SWEEP_PENDING_PROBES_HANDLER),
    )?;
    tracing::info!(users = scheduled, "probe scheduler bootstrapped");
    Ok(scheduled)
  }

  fn schedule_user(&self, setting: &ProbeSetting) -> Result<()> {
    self.cron.schedule_cron(
      &setting.cron_expression,
      &probe_tag(setting.user_id),
      initial_probe_job(setting.user_id),
    )
  }

  /// 发送初始探测；用户已有 pending 探测时不做任何事
  /// Send the initial probe; does nothing while the user has a pending probe
  ///
  /// 发送失败返回错误，由任务重试策略处理，不创建探测记录
  /// A failed send is an error for the job retry policy and creates no probe
  pub async fn send_initial_probe(&self, user_id: i64) -> Result<Option<Probe>> {
    if let Some(pending) = self.store.pending_probe_for_user(user_id).await? {
      tracing::debug!(user_id, probe_id = pending.id, "probe already pending, skipping");
      return Ok(None);
    }
    let user = self.store.get_user(user_id).await?.ok_or(Error::NotFound {
      entity: "user",
      id: user_id,
    })?;

    self
      .messenger
      .send(&user.destination, &self.config.probe_message)
      .await?;

    match self.store.create_pending_probe(user_id).await {
      Ok(probe) => {
        tracing::info!(user_id, probe_id = probe.id, "probe sent");
        Ok(Some(probe))
      }
      Err(Error::ProbePending { .. }) => Ok(None),
      Err(e) => Err(e),
    }
  }

  /// 以当前时间扫描 pending 探测
  /// Sweep pending probes as of now
  pub async fn sweep_pending_probes(&self) -> Result<SweepReport> {
    self.sweep_pending_probes_at(Utc::now()).await
  }

  /// 以给定时间扫描 pending 探测，每个探测独立处理
  /// Sweep pending probes as of `now`; every probe is handled independently
  ///
  /// 扫描期间被回复或被其他写入改变的探测计入 `skipped`
  /// Probes answered or otherwise changed during the sweep count as `skipped`
  pub async fn sweep_pending_probes_at(&self, now: DateTime<Utc>) -> Result<SweepReport> {
    let mut report = SweepReport::default();
    for probe in self.store.pending_probes().await? {
      if probe.retry_count >= self.config.max_retries {
        match self.escalate(probe, now).await {
          Ok(true) => report.escalated += 1,
          Ok(false) => report.skipped += 1,
          Err(e) => {
            tracing::error!(error = %e, "escalation failed");
            report.failed += 1;
          }
        }
        continue;
      }

      if !self.follow_up_due(&probe, now)? {
        report.skipped += 1;
        continue;
      }

      match self.follow_up(probe, now).await {
        Ok(true) => report.followed_up += 1,
        Ok(false) => report.skipped += 1,
        Err(e) => {
          tracing::warn!(error = %e, "follow-up failed, retrying next sweep");
          report.failed += 1;
        }
      }
    }
    Ok(report)
  }

  /// 线性退避：第 n 次跟进需要距上次更新 (n+1) 个单位
  /// Linear gate: follow-up n needs (n + 1) units since the last update
  fn follow_up_due(&self, probe: &Probe, now: DateTime<Utc>) -> Result<bool> {
    let steps = u32::try_from(probe.retry_count.max(0)).unwrap_or(0) + 1;
    let wait = chrono::Duration::from_std(self.config.follow_up_unit * steps)
      .map_err(|e| Error::config(e.to_string()))?;
    Ok(now - probe.updated_at >= wait)
  }

  async fn follow_up(&self, seen: Probe, now: DateTime<Utc>) -> Result<bool> {
    let user = self
      .store
      .get_user(seen.user_id)
      .await?
      .ok_or(Error::NotFound {
        entity: "user",
        id: seen.user_id,
      })?;
    self
      .messenger
      .send(&user.destination, &self.config.follow_up_message)
      .await?;

    let mut probe = seen.clone();
    probe.retry_count += 1;
    probe.updated_at = now;
    if !self.store.save_probe_if_pending(&probe, &seen).await? {
      tracing::debug!(probe_id = probe.id, "probe changed during follow-up, left as is");
      return Ok(false);
    }
    tracing::info!(
      user_id = probe.user_id,
      probe_id = probe.id,
      retry_count = probe.retry_count,
      "follow-up sent"
    );
    Ok(true)
  }

  /// 升级：先把探测标记为 unavailable，再通知紧急联系人并记录审计行
  /// Escalate: mark the probe unavailable first, then notify the emergency contact and write the audit row
  ///
  /// 探测已被回复时不升级。通知失败只记录日志
  /// A probe that was answered meanwhile is not escalated. A failed notification is only logged
  async fn escalate(&self, seen: Probe, now: DateTime<Utc>) -> Result<bool> {
    let mut probe = seen.clone();
    probe.status = ProbeStatus::Unavailable;
    probe.updated_at = now;
    if !self.store.save_probe_if_pending(&probe, &seen).await? {
      tracing::debug!(probe_id = probe.id, "probe changed before escalation, left as is");
      return Ok(false);
    }
    tracing::warn!(user_id = probe.user_id, probe_id = probe.id, "probe escalated");

    match self.notify_emergency_contact(&probe).await {
      Ok(Some((contact_id, delivered))) => {
        if let Err(e) = self
          .store
          .create_emergency_probe(probe.id, contact_id, delivered)
          .await
        {
          tracing::error!(probe_id = probe.id, error = %e, "could not record emergency probe");
        }
      }
      Ok(None) => tracing::warn!(
        user_id = probe.user_id,
        probe_id = probe.id,
        "no emergency contact to notify"
      ),
      Err(e) => tracing::error!(probe_id = probe.id, error = %e, "emergency lookup failed"),
    }
    Ok(true)
  }

  /// 返回 (联系人 id, 是否送达)
  /// Returns (contact id, delivered)
  async fn notify_emergency_contact(&self, probe: &Probe) -> Result<Option<(i64, bool)>> {
    let Some(contact) = self.store.emergency_contact(probe.user_id).await? else {
      return Ok(None);
    };
    let name = self
      .store
      .get_user(probe.user_id)
      .await?
      .map(|u| u.name)
      .unwrap_or_default();
    let text = self.config.emergency_message.replace("{name}", &name);
    let delivered = match self.messenger.send(&contact.destination, &text).await {
      Ok(()) => true,
      Err(e) => {
        tracing::warn!(probe_id = probe.id, contact_id = contact.id, error = %e, "emergency message failed");
        false
      }
    };
    Ok(Some((contact.id, delivered)))
  }

  /// 更新用户的探测设置并重新安排触发器
  /// Update a user's probe setting and re-schedule the trigger
  ///
  /// 关闭探测会取消所有 pending 探测并移除触发器
  /// Disabling cancels every pending probe and removes the trigger
  pub async fn update_probe_setting(
    &self,
    user_id: i64,
    active: bool,
    cron_expression: Option<&str>,
  ) -> Result<ProbeSetting> {
    let mut setting = self
      .store
      .probe_setting(user_id)
      .await?
      .ok_or(Error::NotFound {
        entity: "probe setting",
        id: user_id,
      })?;
    if let Some(expression) = cron_expression {
      let (normalized, _) = parse_cron(expression)?;
      setting.cron_expression = normalized;
    }
    setting.active = active;
    setting.updated_at = Utc::now();
    self.store.save_probe_setting(&setting).await?;

    if active {
      self.schedule_user(&setting)?;
    } else {
      self.cron.remove_by_tag(&probe_tag(user_id));
      let cancelled = self.store.cancel_pending_probes(user_id).await?;
      tracing::info!(user_id, cancelled, "probing disabled");
    }
    Ok(setting)
  }

  /// 记录用户回复
  /// Record a user reply
  ///
  /// 没有 pending 探测时（重复、过期或乱序的回复）忽略并返回 `None`
  /// Without a pending probe (duplicate, late or out-of-order replies) the reply is ignored and `None` returned
  pub async fn record_response(&self, user_id: i64, text: &str) -> Result<Option<Probe>> {
    loop {
      let Some(seen) = self.store.pending_probe_for_user(user_id).await? else {
        tracing::debug!(user_id, "reply without a pending probe ignored");
        return Ok(None);
      };
      let mut probe = seen.clone();
      probe.last_response = text.to_string();
      if let Some(status) = status_from_last_response(text) {
        probe.status = status;
      }
      probe.updated_at = Utc::now();
      if self.store.save_probe_if_pending(&probe, &seen).await? {
        tracing::info!(user_id, probe_id = probe.id, status = %probe.status, "reply recorded");
        return Ok(Some(probe));
      }
      // 探测在读取后被跟进或升级，重新读取
      // The probe moved on after the read; read it again
    }
  }
}

/// "send initial probe" 任务的处理器
/// Handler of the "send initial probe" job
struct SendInitialProbeHandler {
  scheduler: Weak<ProbeScheduler>,
}

#[async_trait]
impl Handler for SendInitialProbeHandler {
  async fn handle(&self, args: JobArgs) -> Result<()> {
    let scheduler = self
      .scheduler
      .upgrade()
      .ok_or_else(|| Error::handler("probe scheduler is gone"))?;
    let user_id = args
      .get("user_id")
      .and_then(|v| v.as_i64())
      .ok_or_else(|| Error::invalid_job("missing user_id"))?;
    scheduler.send_initial_probe(user_id).await.map(|_| ())
  }
}

struct SweepPendingProbesHandler {
  scheduler: Weak<ProbeScheduler>,
}

#[async_trait]
impl Handler for SweepPendingProbesHandler {
  async fn handle(&self, _args: JobArgs) -> Result<()> {
    let scheduler = self
      .scheduler
      .upgrade()
      .ok_or_else(|| Error::handler("probe scheduler is gone"))?;
    let report = scheduler.sweep_pending_probes().await?;
    tracing::info!(
      followed_up = report.followed_up,
      escalated = report.escalated,
      skipped = report.skipped,
      failed = report.failed,
      "sweep finished"
    );
    Ok(())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_probe_job() {
    let job = initial_probe_job(42);
    assert_eq!(job.name, "probe_42");
    assert_eq!(job.handler, "send_initial_probe");
    assert_eq!(job.args.get("user_id").and_then(|v| v.as_i64()), Some(42));
  }
}
