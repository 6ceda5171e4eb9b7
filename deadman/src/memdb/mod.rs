//! 内存存储模块
//! Memory store module
//!
//! 基于内存的任务与探测存储，不依赖任何外部服务
//! In-memory job and probe storage without any external service dependencies

mod store;
pub mod memory_store;

pub use memory_store::MemoryStore;
