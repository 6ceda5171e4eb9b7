//! 任务实体
//! Job entity

use crate::job::{Job, JobStatus};
use chrono::Utc;
use sea_orm::entity::prelude::*;

/// 任务状态枚举
/// Job state enum
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum JobState {
  #[sea_orm(string_value = "scheduled")]
  Scheduled,
  #[sea_orm(string_value = "enqueued")]
  Enqueued,
  #[sea_orm(string_value = "in-progress")]
  InProgress,
  #[sea_orm(string_value = "successful")]
  Successful,
  #[sea_orm(string_value = "dead")]
  Dead,
}

impl From<JobStatus> for JobState {
  fn from(status: JobStatus) -> Self {
    match status {
      JobStatus::Scheduled => Self::Scheduled,
      JobStatus::Enqueued => Self::Enqueued,
      JobStatus::InProgress => Self::InProgress,
      JobStatus::Successful => Self::Successful,
      JobStatus::Dead => Self::Dead,
    }
  }
}

impl From<JobState> for JobStatus {
  fn from(state: JobState) -> Self {
    match state {
      JobState::Scheduled => Self::Scheduled,
      JobState::Enqueued => Self::Enqueued,
      JobState::InProgress => Self::InProgress,
      JobState::Successful => Self::Successful,
      JobState::Dead => Self::Dead,
    }
  }
}

/// 任务实体模型
/// Job entity model
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "jobs")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub name: String,
  pub handler: String,
  #[sea_orm(column_type = "Text")]
  pub args: String,
  pub fails: i32,
  #[sea_orm(column_type = "Text")]
  pub last_error: String,
  pub claimed: bool,
  pub status: JobState,
  /// 是否通过唯一入队创建，部分唯一索引只覆盖这些行
  /// Created through a unique enqueue; the partial unique index covers only these rows
  pub is_unique: bool,
  pub run_after: Option<DateTimeWithTimeZone>,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Job {
  fn from(m: Model) -> Self {
    Job {
      id: m.id,
      name: m.name,
      handler: m.handler,
      args: m.args,
      fails: m.fails,
      last_error: m.last_error,
      claimed: m.claimed,
      status: m.status.into(),
      run_after: m.run_after.map(|t| t.with_timezone(&Utc)),
      created_at: m.created_at.with_timezone(&Utc),
      updated_at: m.updated_at.with_timezone(&Utc),
    }
  }
}
