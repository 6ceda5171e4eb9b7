//! PostgresSQL 存储模块
//! PostgresSQL store module
//!
//! 使用 SeaORM 实现基于 PostgresSQL 的持久化存储，任务在进程重启后仍然保留
//! Durable store backed by PostgresSQL through SeaORM; jobs survive process restarts

pub mod entity;
pub mod postgres_store;
mod store;

pub use entity::*;
pub use postgres_store::PostgresStore;
