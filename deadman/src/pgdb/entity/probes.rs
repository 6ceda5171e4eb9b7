//! 探测实体
//! Probe entity

use crate::probe::{Probe, ProbeStatus};
use chrono::Utc;
use sea_orm::entity::prelude::*;

/// 探测状态枚举
/// Probe state enum
#[derive(Clone, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
pub enum ProbeState {
  #[sea_orm(string_value = "pending")]
  Pending,
  #[sea_orm(string_value = "good")]
  Good,
  #[sea_orm(string_value = "bad")]
  Bad,
  #[sea_orm(string_value = "unavailable")]
  Unavailable,
  #[sea_orm(string_value = "cancelled")]
  Cancelled,
}

impl From<ProbeStatus> for ProbeState {
  fn from(status: ProbeStatus) -> Self {
    match status {
      ProbeStatus::Pending => Self::Pending,
      ProbeStatus::Good => Self::Good,
      ProbeStatus::Bad => Self::Bad,
      ProbeStatus::Unavailable => Self::Unavailable,
      ProbeStatus::Cancelled => Self::Cancelled,
    }
  }
}

impl From<ProbeState> for ProbeStatus {
  fn from(state: ProbeState) -> Self {
    match state {
      ProbeState::Pending => Self::Pending,
      ProbeState::Good => Self::Good,
      ProbeState::Bad => Self::Bad,
      ProbeState::Unavailable => Self::Unavailable,
      ProbeState::Cancelled => Self::Cancelled,
    }
  }
}

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "probes")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub user_id: i64,
  #[sea_orm(column_type = "Text")]
  pub last_response: String,
  pub retry_count: i32,
  pub status: ProbeState,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Probe {
  fn from(m: Model) -> Self {
    Probe {
      id: m.id,
      user_id: m.user_id,
      last_response: m.last_response,
      retry_count: m.retry_count,
      status: m.status.into(),
      created_at: m.created_at.with_timezone(&Utc),
      updated_at: m.updated_at.with_timezone(&Utc),
    }
  }
}
