//! 紧急探测审计实体
//! Emergency probe audit entity

use crate::probe::EmergencyProbe;
use chrono::Utc;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "emergency_probes")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub probe_id: i64,
  pub contact_id: i64,
  pub delivered: bool,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for EmergencyProbe {
  fn from(m: Model) -> Self {
    EmergencyProbe {
      id: m.id,
      probe_id: m.probe_id,
      contact_id: m.contact_id,
      delivered: m.delivered,
      created_at: m.created_at.with_timezone(&Utc),
    }
  }
}
