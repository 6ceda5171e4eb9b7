//! 内存存储的 trait 实现
//! Store trait implementations for the memory store

use crate::base::{JobStore, ProbeStore};
use crate::error::{Error, Result};
use crate::job::{Job, JobStatus, JobUpdate, NewJob};
use crate::memdb::memory_store::MemoryStorage;
use crate::memdb::MemoryStore;
use crate::probe::{Contact, EmergencyProbe, Probe, ProbeSetting, ProbeStatus, User};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::time::Duration;

fn insert_job(
  storage: &mut MemoryStorage,
  job: &NewJob,
  args: String,
  run_after: Option<DateTime<Utc>>,
) -> Job {
  let now = Utc::now();
  let status = match run_after {
    Some(at) if at > now => JobStatus::Scheduled,
    _ => JobStatus::Enqueued,
  };
  let id = storage.next_job_id();
  let record = Job {
    id,
    name: job.name.clone(),
    handler: job.handler.clone(),
    args,
    fails: 0,
    last_error: String::new(),
    claimed: false,
    status,
    run_after,
    created_at: now,
    updated_at: now,
  };
  storage.jobs.insert(id, record.clone());
  record
}

#[async_trait]
impl JobStore for MemoryStore {
  async fn create_unique_job(&self, job: &NewJob) -> Result<Job> {
    job.validate()?;
    let args = job.encode_args()?;
    let mut storage = self.storage.write().await;
    // 检查与插入在同一把写锁下完成
    // Check and insert happen under the same write lock
    let exists = storage
      .jobs
      .values()
      .any(|j| j.name == job.name && j.status.is_active());
    if exists {
      return Err(Error::DuplicateJob {
        name: job.name.clone(),
      });
    }
    Ok(insert_job(&mut storage, job, args, None))
  }

  async fn create_job(&self, job: &NewJob, run_after: Option<DateTime<Utc>>) -> Result<Job> {
    job.validate()?;
    let args = job.encode_args()?;
    let mut storage = self.storage.write().await;
    Ok(insert_job(&mut storage, job, args, run_after))
  }

  async fn first_job(&self, status: JobStatus, claimed: bool) -> Result<Option<Job>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .jobs
        .values()
        .find(|j| j.status == status && j.claimed == claimed)
        .cloned(),
    )
  }

  async fn first_scheduled_job_due(&self, now: DateTime<Utc>) -> Result<Option<Job>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .jobs
        .values()
        .find(|j| {
          j.status == JobStatus::Scheduled && j.run_after.map(|at| at <= now).unwrap_or(true)
        })
        .cloned(),
    )
  }

  async fn promote(&self, job_id: i64) -> Result<bool> {
    let mut storage = self.storage.write().await;
    match storage.jobs.get_mut(&job_id) {
      Some(job) if job.status == JobStatus::Scheduled => {
        job.status = JobStatus::Enqueued;
        job.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn claim(&self, job_id: i64) -> Result<bool> {
    let mut storage = self.storage.write().await;
    match storage.jobs.get_mut(&job_id) {
      Some(job) if !job.claimed && job.status == JobStatus::Enqueued => {
        job.claimed = true;
        job.status = JobStatus::InProgress;
        job.updated_at = Utc::now();
        Ok(true)
      }
      _ => Ok(false),
    }
  }

  async fn update(&self, job_id: i64, update: JobUpdate) -> Result<()> {
    let mut storage = self.storage.write().await;
    let job = storage.jobs.get_mut(&job_id).ok_or(Error::NotFound {
      entity: "job",
      id: job_id,
    })?;
    update.apply(job, Utc::now());
    Ok(())
  }

  async fn last_updated_older_than(&self, age: Duration, status: JobStatus) -> Result<Option<Job>> {
    let age = chrono::Duration::from_std(age).map_err(|e| Error::store(e.to_string()))?;
    let cutoff = Utc::now() - age;
    let storage = self.storage.read().await;
    Ok(
      storage
        .jobs
        .values()
        .find(|j| j.status == status && j.updated_at < cutoff)
        .cloned(),
    )
  }

  async fn get_job(&self, job_id: i64) -> Result<Option<Job>> {
    Ok(self.storage.read().await.jobs.get(&job_id).cloned())
  }

  async fn list_jobs(&self, status: Option<JobStatus>) -> Result<Vec<Job>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .jobs
        .values()
        .filter(|j| status.map(|s| j.status == s).unwrap_or(true))
        .cloned()
        .collect(),
    )
  }
}

#[async_trait]
impl ProbeStore for MemoryStore {
  async fn create_user(&self, name: &str, destination: &str) -> Result<User> {
    let now = Utc::now();
    let mut storage = self.storage.write().await;
    let id = storage.next_user_id();
    let user = User {
      id,
      name: name.to_string(),
      destination: destination.to_string(),
      emergency_contact_id: None,
      created_at: now,
      updated_at: now,
    };
    storage.users.insert(id, user.clone());
    storage
      .probe_settings
      .insert(id, ProbeSetting::default_for(id, now));
    Ok(user)
  }

  async fn get_user(&self, user_id: i64) -> Result<Option<User>> {
    Ok(self.storage.read().await.users.get(&user_id).cloned())
  }

  async fn create_contact(
    &self,
    user_id: i64,
    name: &str,
    destination: &str,
    emergency: bool,
  ) -> Result<Contact> {
    let now = Utc::now();
    let mut storage = self.storage.write().await;
    if !storage.users.contains_key(&user_id) {
      return Err(Error::NotFound {
        entity: "user",
        id: user_id,
      });
    }
    let id = storage.next_contact_id();
    let contact = Contact {
      id,
      user_id,
      name: name.to_string(),
      destination: destination.to_string(),
      created_at: now,
    };
    storage.contacts.insert(id, contact.clone());
    if emergency {
      if let Some(user) = storage.users.get_mut(&user_id) {
        user.emergency_contact_id = Some(id);
        user.updated_at = now;
      }
    }
    Ok(contact)
  }

  async fn emergency_contact(&self, user_id: i64) -> Result<Option<Contact>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .users
        .get(&user_id)
        .and_then(|u| u.emergency_contact_id)
        .and_then(|id| storage.contacts.get(&id))
        .cloned(),
    )
  }

  async fn probe_setting(&self, user_id: i64) -> Result<Option<ProbeSetting>> {
    Ok(self.storage.read().await.probe_settings.get(&user_id).cloned())
  }

  async fn save_probe_setting(&self, setting: &ProbeSetting) -> Result<()> {
    let mut storage = self.storage.write().await;
    if !storage.users.contains_key(&setting.user_id) {
      return Err(Error::NotFound {
        entity: "user",
        id: setting.user_id,
      });
    }
    storage
      .probe_settings
      .insert(setting.user_id, setting.clone());
    Ok(())
  }

  async fn active_probe_settings(&self) -> Result<Vec<ProbeSetting>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .probe_settings
        .values()
        .filter(|s| s.active)
        .cloned()
        .collect(),
    )
  }

  async fn create_pending_probe(&self, user_id: i64) -> Result<Probe> {
    let now = Utc::now();
    let mut storage = self.storage.write().await;
    if storage
      .probes
      .values()
      .any(|p| p.user_id == user_id && p.is_pending())
    {
      return Err(Error::ProbePending { user_id });
    }
    let id = storage.next_probe_id();
    let probe = Probe {
      id,
      user_id,
      last_response: String::new(),
      retry_count: 0,
      status: ProbeStatus::Pending,
      created_at: now,
      updated_at: now,
    };
    storage.probes.insert(id, probe.clone());
    Ok(probe)
  }

  async fn pending_probes(&self) -> Result<Vec<Probe>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .probes
        .values()
        .filter(|p| p.is_pending())
        .cloned()
        .collect(),
    )
  }

  async fn pending_probe_for_user(&self, user_id: i64) -> Result<Option<Probe>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .probes
        .values()
        .find(|p| p.user_id == user_id && p.is_pending())
        .cloned(),
    )
  }

  async fn save_probe_if_pending(&self, probe: &Probe, seen: &Probe) -> Result<bool> {
    let mut storage = self.storage.write().await;
    match storage.probes.get_mut(&probe.id) {
      Some(current)
        if current.is_pending()
          && current.retry_count == seen.retry_count
          && current.updated_at == seen.updated_at =>
      {
        current.last_response = probe.last_response.clone();
        current.retry_count = probe.retry_count;
        current.status = probe.status;
        current.updated_at = probe.updated_at;
        Ok(true)
      }
      Some(_) => Ok(false),
      None => Err(Error::NotFound {
        entity: "probe",
        id: probe.id,
      }),
    }
  }

  async fn cancel_pending_probes(&self, user_id: i64) -> Result<u64> {
    let now = Utc::now();
    let mut storage = self.storage.write().await;
    let mut cancelled = 0;
    for probe in storage
      .probes
      .values_mut()
      .filter(|p| p.user_id == user_id && p.is_pending())
    {
      probe.status = ProbeStatus::Cancelled;
      probe.updated_at = now;
      cancelled += 1;
    }
    Ok(cancelled)
  }

  async fn list_probes(&self, user_id: i64) -> Result<Vec<Probe>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .probes
        .values()
        .filter(|p| p.user_id == user_id)
        .cloned()
        .collect(),
    )
  }

  async fn create_emergency_probe(
    &self,
    probe_id: i64,
    contact_id: i64,
    delivered: bool,
  ) -> Result<EmergencyProbe> {
    let mut storage = self.storage.write().await;
    let id = storage.next_emergency_probe_id();
    let record = EmergencyProbe {
      id,
      probe_id,
      contact_id,
      delivered,
      created_at: Utc::now(),
    };
    storage.emergency_probes.insert(id, record.clone());
    Ok(record)
  }

  async fn emergency_probes(&self, probe_id: i64) -> Result<Vec<EmergencyProbe>> {
    let storage = self.storage.read().await;
    Ok(
      storage
        .emergency_probes
        .values()
        .filter(|e| e.probe_id == probe_id)
        .cloned()
        .collect(),
    )
  }
}
