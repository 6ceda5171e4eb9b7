//! 联系人实体
//! Contact entity

use crate::probe::Contact;
use chrono::Utc;
use sea_orm::entity::prelude::*;

#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel)]
#[sea_orm(table_name = "contacts")]
pub struct Model {
  #[sea_orm(primary_key)]
  pub id: i64,
  pub user_id: i64,
  pub name: String,
  pub destination: String,
  pub created_at: DateTimeWithTimeZone,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}

impl From<Model> for Contact {
  fn from(m: Model) -> Self {
    Contact {
      id: m.id,
      user_id: m.user_id,
      name: m.name,
      destination: m.destination,
      created_at: m.created_at.with_timezone(&Utc),
    }
  }
}
