//! 用户实体
//! User entity

use crate::probe::User;
use chrono::Utc;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "users")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub name: String,
  pub destination: String,
  pub emergency_contact_id: Option<i64>,
  pub created_at: DateTimeWithTimeZone,
  pub updated_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for User {
  fn from(m: Model) -> Self {
    User {
      id: m.id,
      name: m.name,
      destination: m.destination,
      emergency_contact_id: m.emergency_contact_id,
      created_at: m.created_at.with_timezone(&Utc),
      updated_at: m.updated_at.with_timezone(&Utc),
    }
  }
}
