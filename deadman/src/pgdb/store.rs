//! PostgresSQL 存储的 trait 实现
//! Store trait implementations for the PostgresSQL store

use crate::base::{JobStore, ProbeStore};
use crate::error::{Error, Result};
use crate::job::{Job, JobStatus, JobUpdate, NewJob};
use crate::pgdb::entity::jobs::JobState;
use crate::pgdb::entity::probes::ProbeState;
use crate::pgdb::entity::{
  contacts, emergency_probes, jobs, probe_settings, probes, users, Contacts, EmergencyProbes,
  Jobs, ProbeSettings, Probes, Users,
};
use crate::pgdb::postgres_store::is_unique_violation;
use crate::pgdb::PostgresStore;
use crate::probe::{Contact, EmergencyProbe, Probe, ProbeSetting, ProbeStatus, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sea_orm::{
  ActiveModelTrait, ColumnTrait, Condition, EntityTrait, NotSet, QueryFilter, QueryOrder, Set,
  TransactionTrait,
};
use std::time::Duration;

const ACTIVE_JOB_STATES: [JobState; 3] = [
  JobState::Scheduled,
  JobState::Enqueued,
  JobState::InProgress,
];

fn new_job_model(
  job: &NewJob,
  args: String,
  run_after: Option<DateTime<Utc>>,
  unique: bool,
) -> jobs::ActiveModel {
  let now = Utc::now();
  let status = match run_after {
    Some(at) if at > now => JobState::Scheduled,
    _ => JobState::Enqueued,
  };
  jobs::ActiveModel {
    id: NotSet,
    name: Set(job.name.clone()),
    handler: Set(job.handler.clone()),
    args: Set(args),
    fails: Set(0),
    last_error: Set(String::new()),
    claimed: Set(false),
    status: Set(status),
    is_unique: Set(unique),
    run_after: Set(run_after.map(Into::into)),
    created_at: Set(now.into()),
    updated_at: Set(now.into()),
  }
}

impl PostgresStore {
  async fn ensure_user(&self, user_id: i64) -> Result<()> {
    match Users::find_by_id(user_id).one(self.db()).await? {
      Some(_) => Ok(()),
      None => Err(Error::NotFound {
        entity: "user",
        id: user_id,
      }),
    }
  }
}

#[async_trait]
impl JobStore for PostgresStore {
  async fn create_unique_job(&self, job: &NewJob) -> Result<Job> {
    job.validate()?;
    let args = job.encode_args()?;
    let exists = Jobs::find()
      .filter(jobs::Column::Name.eq(job.name.as_str()))
      .filter(jobs::Column::Status.is_in(ACTIVE_JOB_STATES))
      .one(self.db())
      .await?
      .is_some();
    if exists {
      return Err(Error::DuplicateJob {
        name: job.name.clone(),
      });
    }
    // 并发插入由部分唯一索引兜底
    // Concurrent inserts are caught by the partial unique index
    match new_job_model(job, args, None, true).insert(self.db()).await {
      Ok(model) => Ok(model.into()),
      Err(e) if is_unique_violation(&e) => Err(Error::DuplicateJob {
        name: job.name.clone(),
      }),
      Err(e) => Err(e.into()),
    }
  }

  async fn create_job(&self, job: &NewJob, run_after: Option<DateTime<Utc>>) -> Result<Job> {
    job.validate()?;
    let args = job.encode_args()?;
    let model = new_job_model(job, args, run_after, false)
      .insert(self.db())
      .await?;
    Ok(model.into())
  }

  async fn first_job(&self, status: JobStatus, claimed: bool) -> Result<Option<Job>> {
    let model = Jobs::find()
      .filter(jobs::Column::Status.eq(JobState::from(status)))
      .filter(jobs::Column::Claimed.eq(claimed))
      .order_by_asc(jobs::Column::Id)
      .one(self.db())
      .await?;
    Ok(model.map(Into::into))
  }

  async fn first_scheduled_job_due(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
    let now: sea_orm::prelude::DateTimeWithTimeZone = now.into();
    let model = Jobs::find()
      .filter(jobs::Column::Status.eq(JobState::Scheduled))
      .filter(
        Condition::any()
          .add(jobs::Column::RunAfter.is_null())
          .add(jobs::Column::RunAfter.lte(now)),
      )
      .order_by_asc(jobs::Column::Id)
      .one(self.db())
      .await?;
    Ok(model.map(Into::into))
  }

  async fn promote(&self, job_id: i64) -> Result<bool> {
    let result = Jobs::update_many()
      .set(jobs::ActiveModel {
        status: Set(JobState::Enqueued),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
      })
      .filter(jobs::Column::Id.eq(job_id))
      .filter(jobs::Column::Status.eq(JobState::Scheduled))
      .exec(self.db())
      .await?;
    Ok(result.rows_affected == 1)
  }

  async fn claim(&self, job_id: i64) -> Result<bool> {
    // 单条条件 UPDATE，只有一个调用方能看到受影响的行
    // A single conditional UPDATE; only one caller sees the affected row
    let result = Jobs::update_many()
      .set(jobs::ActiveModel {
        claimed: Set(true),
        status: Set(JobState::InProgress),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
      })
      .filter(jobs::Column::Id.eq(job_id))
      .filter(jobs::Column::Claimed.eq(false))
      .filter(jobs::Column::Status.eq(JobState::Enqueued))
      .exec(self.db())
      .await?;
    Ok(result.rows_affected == 1)
  }

  async fn update(&self, job_id: i64, update: JobUpdate) -> Result<()> {
    let mut model = jobs::ActiveModel {
      updated_at: Set(Utc::now().into()),
      ..Default::default()
    };
    if let Some(fails) = update.fails {
      model.fails = Set(fails);
    }
    if let Some(last_error) = update.last_error {
      model.last_error = Set(last_error);
    }
    if let Some(claimed) = update.claimed {
      model.claimed = Set(claimed);
    }
    if let Some(status) = update.status {
      model.status = Set(status.into());
    }
    let result = Jobs::update_many()
      .set(model)
      .filter(jobs::Column::Id.eq(job_id))
      .exec(self.db())
      .await?;
    if result.rows_affected == 0 {
      return Err(Error::NotFound {
        entity: "job",
        id: job_id,
      });
    }
    Ok(())
  }

  async fn last_updated_older_than(&self, age: Duration, status: JobStatus) -> Result<Option<Job>> {
    let age = chrono::Duration::from_std(age).map_err(|e| Error::store(e.to_string()))?;
    let cutoff: sea_orm::prelude::DateTimeWithTimeZone = (Utc::now() - age).into();
    let model = Jobs::find()
      .filter(jobs::Column::Status.eq(JobState::from(status)))
      .filter(jobs::Column::UpdatedAt.lt(cutoff))
      .order_by_asc(jobs::Column::Id)
      .one(self.db())
      .await?;
    Ok(model.map(Into::into))
  }

  async fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
    Ok(Jobs::find_by_id(job_id).one(self.db()).await?.map(Into::into))
  }

  async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
    let mut query = Jobs::find();
    if let Some(status) = status {
      query = query.filter(jobs::Column::Status.eq(JobState::from(status)));
    }
    let models = query
      .order_by_asc(jobs::Column::Id)
      .all(self.db())
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }
}

#[async_trait]
impl ProbeStore for PostgresStore {
  async fn create_user(&self, name: &str, destination: &str) -> Result<User> {
    let now = Utc::now();
    let txn = self.db().begin().await?;
    let user = users::ActiveModel {
      id: NotSet,
      name: Set(name.to_string()),
      destination: Set(destination.to_string()),
      emergency_contact_id: Set(None),
      created_at: Set(now.into()),
      updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;
    let setting = ProbeSetting::default_for(user.id, now);
    probe_settings::ActiveModel {
      user_id: Set(setting.user_id),
      active: Set(setting.active),
      cron_expression: Set(setting.cron_expression),
      updated_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;
    txn.commit().await?;
    Ok(user.into())
  }

  async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
    Ok(Users::find_by_id(user_id).one(self.db()).await?.map(Into::into))
  }

  async fn create_contact(
    &self,
    user_id: i64,
    name: &str,
    destination: &str,
    emergency: bool,
  ) -> Result<Contact> {
    self.ensure_user(user_id).await?;
    let now = Utc::now();
    let txn = self.db().begin().await?;
    let contact = contacts::ActiveModel {
      id: NotSet,
      user_id: Set(user_id),
      name: Set(name.to_string()),
      destination: Set(destination.to_string()),
      created_at: Set(now.into()),
    }
    .insert(&txn)
    .await?;
    if emergency {
      Users::update_many()
        .set(users::ActiveModel {
          emergency_contact_id: Set(Some(contact.id)),
          updated_at: Set(now.into()),
          ..Default::default()
        })
        .filter(users::Column::Id.eq(user_id))
        .exec(&txn)
        .await?;
    }
    txn.commit().await?;
    Ok(contact.into())
  }

  async fn emergency_contact(&self, user_id: i64) -> Result<Option<Contact>> {
    let Some(contact_id) = Users::find_by_id(user_id)
      .one(self.db())
      .await?
      .and_then(|u| u.emergency_contact_id)
    else {
      return Ok(None);
    };
    Ok(
      Contacts::find_by_id(contact_id)
        .one(self.db())
        .await?
        .map(Into::into),
    )
  }

  async fn probe_setting(&self, user_id: i64) -> Result<Option<ProbeSetting>> {
    Ok(
      ProbeSettings::find_by_id(user_id)
        .one(self.db())
        .await?
        .map(Into::into),
    )
  }

  async fn save_probe_setting(&self, setting: &ProbeSetting) -> Result<()> {
    self.ensure_user(setting.user_id).await?;
    let result = ProbeSettings::update_many()
      .set(probe_settings::ActiveModel {
        active: Set(setting.active),
        cron_expression: Set(setting.cron_expression.clone()),
        updated_at: Set(setting.updated_at.into()),
        ..Default::default()
      })
      .filter(probe_settings::Column::UserId.eq(setting.user_id))
      .exec(self.db())
      .await?;
    if result.rows_affected == 0 {
      probe_settings::ActiveModel {
        user_id: Set(setting.user_id),
        active: Set(setting.active),
        cron_expression: Set(setting.cron_expression.clone()),
        updated_at: Set(setting.updated_at.into()),
      }
      .insert(self.db())
      .await?;
    }
    Ok(())
  }

  async fn active_probe_settings(&self) -> Result<Vec<ProbeSetting>> {
    let models = ProbeSettings::find()
      .filter(probe_settings::Column::Active.eq(true))
      .order_by_asc(probe_settings::Column::UserId)
      .all(self.db())
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }

  async fn create_pending_probe(&self, user_id: i64) -> Result<Probe> {
    if self.pending_probe_for_user(user_id).await?.is_some() {
      return Err(Error::ProbePending { user_id });
    }
    let now = Utc::now();
    let model = probes::ActiveModel {
      id: NotSet,
      user_id: Set(user_id),
      last_response: Set(String::new()),
      retry_count: Set(0),
      status: Set(ProbeState::Pending),
      created_at: Set(now.into()),
      updated_at: Set(now.into()),
    };
    match model.insert(self.db()).await {
      Ok(model) => Ok(model.into()),
      Err(e) if is_unique_violation(&e) => Err(Error::ProbePending { user_id }),
      Err(e) => Err(e.into()),
    }
  }

  async fn pending_probes(&self) -> Result<Vec<Probe>> {
    let models = Probes::find()
      .filter(probes::Column::Status.eq(ProbeState::Pending))
      .order_by_asc(probes::Column::Id)
      .all(self.db())
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }

  async fn pending_probe_for_user(&self, user_id: i64) -> Result<Option<Probe>> {
    let model = Probes::find()
      .filter(probes::Column::UserId.eq(user_id))
      .filter(probes::Column::Status.eq(ProbeState::Pending))
      .one(self.db())
      .await?;
    Ok(model.map(Into::into))
  }

  async fn save_probe_if_pending(&self, probe: &Probe, seen: &Probe) -> Result<bool> {
    let seen_at: sea_orm::prelude::DateTimeWithTimeZone = seen.updated_at.into();
    let result = Probes::update_many()
      .set(probes::ActiveModel {
        last_response: Set(probe.last_response.clone()),
        retry_count: Set(probe.retry_count),
        status: Set(probe.status.into()),
        updated_at: Set(probe.updated_at.into()),
        ..Default::default()
      })
      .filter(probes::Column::Id.eq(probe.id))
      .filter(probes::Column::Status.eq(ProbeState::Pending))
      .filter(probes::Column::RetryCount.eq(seen.retry_count))
      .filter(probes::Column::UpdatedAt.eq(seen_at))
      .exec(self.db())
      .await?;
    if result.rows_affected == 1 {
      return Ok(true);
    }
    if Probes::find_by_id(probe.id).one(self.db()).await?.is_none() {
      return Err(Error::NotFound {
        entity: "probe",
        id: probe.id,
      });
    }
    Ok(false)
  }

  async fn cancel_pending_probes(&self, user_id: i64) -> Result<u64> {
    let result = Probes::update_many()
      .set(probes::ActiveModel {
        status: Set(ProbeState::Cancelled),
        updated_at: Set(Utc::now().into()),
        ..Default::default()
      })
      .filter(probes::Column::UserId.eq(user_id))
      .filter(probes::Column::Status.eq(ProbeState::Pending))
      .exec(self.db())
      .await?;
    Ok(result.rows_affected)
  }

  async fn list_probes(&self, user_id: i64) -> Result<Vec<Probe>> {
    let models = Probes::find()
      .filter(probes::Column::UserId.eq(user_id))
      .order_by_asc(probes::Column::Id)
      .all(self.db())
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }

  async fn create_emergency_probe(
    &self,
    probe_id: i64,
    contact_id: i64,
    delivered: bool,
  ) -> Result<EmergencyProbe> {
    let model = emergency_probes::ActiveModel {
      id: NotSet,
      probe_id: Set(probe_id),
      contact_id: Set(contact_id),
      delivered: Set(delivered),
      created_at: Set(Utc::now().into()),
    }
    .insert(self.db())
    .await?;
    Ok(model.into())
  }

  async fn emergency_probes(&self, probe_id: i64) -> Result<Vec<EmergencyProbe>> {
    let models = EmergencyProbes::find()
      .filter(emergency_probes::Column::ProbeId.eq(probe_id))
      .order_by_asc(emergency_probes::Column::Id)
      .all(self.db())
      .await?;
    Ok(models.into_iter().map(Into::into).collect())
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_new_job_model_status() {
    let job = NewJob::new("later", "h");
    let future = Utc::now() + chrono::Duration::hours(1);
    let model = new_job_model(&job, "{}".to_string(), Some(future), false);
    assert!(matches!(model.status, Set(JobState::Scheduled)));

    let model = new_job_model(&job, "{}".to_string(), None, true);
    assert!(matches!(model.status, Set(JobState::Enqueued)));
    assert!(matches!(model.is_unique, Set(true)));
  }

  #[test]
  fn test_state_mapping() {
    for status in JobStatus::ALL {
      assert_eq!(JobStatus::from(JobState::from(status)), status);
    }
    assert_eq!(ProbeStatus::from(ProbeState::Pending), ProbeStatus::Pending);
  }
}
