//! 探测设置实体，与用户一对一
//! Probe setting entity, one-to-one with users

use crate::probe::ProbeSetting;
use chrono::Utc;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "probe_settings")]
pub struct Model {
  #[sea_orm(primary_key, auto_increment = false)]
  pub user_id: i64,
  pub active: bool,
  pub cron_expression: String,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for ProbeSetting {
  fn from(m: Model) -> Self {
    ProbeSetting {
      user_id: m.user_id,
      active: m.active,
      cron_expression: m.cron_expression,
      updated_at: m.updated_at.with_timezone(&Utc),
    }
  }
}
