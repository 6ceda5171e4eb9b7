//! SeaORM 实体模块
//! SeaORM entity module
//!
//! 定义了与 PostgresSQL 表对应的实体模型
//! Defines entity models corresponding to PostgresSQL tables

pub mod contacts;
pub mod emergency_probes;
pub mod jobs;
pub mod prelude;
pub mod probe_settings;
pub mod probes;
pub mod users;

pub use prelude::*;
