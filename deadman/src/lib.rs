//! # Deadman
//!
//! 一个死人开关服务的核心：持久化任务队列、工作者池、cron 调度以及存活探测状态机
//! The core of a dead man's switch service: a durable job queue, a worker pool,
//! cron scheduling and a liveliness probe state machine.
//!
//! ## 特性
//! ## Features
//!
//! - 基于存储的任务队列，FIFO 认领，至多一个工作者执行同一任务
//!   - Store-backed job queue with FIFO claims; a job runs on at most one worker at a time
//! - 失败重试，达到上限后进入 dead 状态
//!   - Failed jobs are retried until they hit the fail ceiling and go dead
//! - 卡住的任务由 Requeuer 自动重新入队
//!   - Stuck jobs are put back on the queue by the Requeuer
//! - 按名称去重的唯一任务
//!   - Unique jobs deduplicated by name
//! - 延迟任务和 cron 周期任务
//!   - Delayed jobs and cron-driven recurring jobs
//! - 每个用户的存活探测、跟进和紧急联系人升级
//!   - Per-user liveliness probes with follow-ups and escalation to an emergency contact
//! - 内存存储，以及可选的 PostgresSQL 存储（`postgres` 特性）
//!   - In-memory store, plus an optional PostgresSQL store (`postgres` feature)
//!
//! ## 快速开始
//! ## Quick Start
//!
//! ```rust,no_run
//! use deadman::{
//!   CronScheduler, LogMessenger, MemoryStore, PoolConfig, ProbeConfig, ProbeScheduler,
//!   ProbeStore, WorkerPool,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!   let store = Arc::new(MemoryStore::new());
//!   let pool = Arc::new(WorkerPool::new(store.clone(), PoolConfig::default())?);
//!   let cron = Arc::new(CronScheduler::new(pool.client()));
//!   let probes = ProbeScheduler::new(
//!     store.clone(),
//!     pool.clone(),
//!     cron.clone(),
//!     Arc::new(LogMessenger),
//!     ProbeConfig::default(),
//!   )?;
//!   probes.register_handlers()?;
//!
//!   let user = store.create_user("ada", "+15550001").await?;
//!   probes.update_probe_setting(user.id, true, Some("0 0 12 * * *")).await?;
//!
//!   probes.bootstrap().await?;
//!   pool.start().await;
//!   cron.start().await;
//!
//!   tokio::signal::ctrl_c().await?;
//!   cron.stop().await;
//!   pool.stop().await;
//!   Ok(())
//! }
//! ```

pub mod base;
pub mod client;
pub mod components;
pub mod config;
pub mod error;
pub mod handler;
pub mod inspector;
pub mod job;
pub mod memdb;
pub mod messenger;
#[cfg(feature = "postgres")]
pub mod pgdb;
pub mod pool;
pub mod probe;
pub mod probe_scheduler;
pub mod scheduler;

pub use base::{JobStore, ProbeStore, Store};
pub use client::Client;
pub use config::{PoolConfig, ProbeConfig};
pub use error::{Error, Result};
pub use handler::{Handler, HandlerRegistry};
pub use inspector::Inspector;
pub use job::{Job, JobArgs, JobStatus, NewJob};
pub use memdb::MemoryStore;
pub use messenger::{LogMessenger, Messenger};
#[cfg(feature = "postgres")]
pub use pgdb::PostgresStore;
pub use pool::WorkerPool;
pub use probe::{Probe, ProbeStatus};
pub use probe_scheduler::ProbeScheduler;
pub use scheduler::CronScheduler;
