//! 工作者池模块
//! Worker pool module
//!
//! 持有固定数量的工作者以及一个 Requeuer 和一个 Promoter，
//! 对外提供处理器注册、入队以及启动/停止
//! Owns a fixed set of workers plus one Requeuer and one Promoter, and exposes
//! handler registration, enqueueing and start/stop
//!
//! ```rust,no_run
//! use deadman::config::PoolConfig;
//! use deadman::job::{JobArgs, NewJob};
//! use deadman::memdb::MemoryStore;
//! use deadman::pool::WorkerPool;
//! use std::sync::Arc;
//!
//! # async fn example() -> deadman::error::Result<()> {
//! let pool = WorkerPool::new(Arc::new(MemoryStore::new()), PoolConfig::default())?;
//! pool.register_fn("say_hello", |_args: JobArgs| Ok(()))?;
//! pool.start().await;
//! pool.enqueue(NewJob::new("hello", "say_hello"), false).await?;
//! pool.stop().await;
//! # Ok(())
//! # }
//! ```

use crate::base::JobStore;
use crate::client::Client;
use crate::components::promoter::Promoter;
use crate::components::requeuer::Requeuer;
use crate::components::worker::Worker;
use crate::components::ComponentLifecycle;
use crate::config::PoolConfig;
use crate::error::Result;
use crate::handler::{Handler, HandlerRegistry};
use crate::job::{Job, JobArgs, NewJob};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

/// 池状态
/// Pool state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolState {
  /// 新建，尚未启动
  New,
  Running,
  Stopped,
}

struct PoolInner {
  state: PoolState,
  token: Option<CancellationToken>,
  handles: Vec<JoinHandle<()>>,
}

/// 工作者池
/// Worker pool
pub struct WorkerPool {
  store: Arc<dyn JobStore>,
  client: Arc<Client>,
  registry: Arc<HandlerRegistry>,
  config: PoolConfig,
  host: String,
  pid: u32,
  pool_uuid: String,
  inner: Mutex<PoolInner>,
}

impl WorkerPool {
  /// 创建新的工作者池
  /// Create a new worker pool
  pub fn new(store: Arc<dyn JobStore>, config: PoolConfig) -> Result<Self> {
    config.validate()?;
    let host = hostname::get()
      .unwrap_or_default()
      .to_string_lossy()
      .to_string();
    Ok(Self {
      client: Arc::new(Client::new(store.clone())),
      store,
      registry: Arc::new(HandlerRegistry::new()),
      config,
      host,
      pid: std::process::id(),
      pool_uuid: Uuid::new_v4().to_string(),
      inner: Mutex::new(PoolInner {
        state: PoolState::New,
        token: None,
        handles: Vec::new(),
      }),
    })
  }

  /// 组合的池 id (hostname:pid:uuid)，用于日志
  /// Combined pool id (hostname:pid:uuid), used in log fields
  pub fn pool_id(&self) -> String {
    format!("{}:{}:{}", self.host, self.pid, self.pool_uuid)
  }

  pub fn config(&self) -> &PoolConfig {
    &self.config
  }

  pub fn store(&self) -> Arc<dyn JobStore> {
    self.store.clone()
  }

  /// 共享的任务生产者
  /// Shared job producer
  pub fn client(&self) -> Arc<Client> {
    self.client.clone()
  }

  pub fn registry(&self) -> Arc<HandlerRegistry> {
    self.registry.clone()
  }

  /// 注册处理器，所有工作者立即可见
  /// Register a handler; visible to every worker at once
  pub fn register_handler<H>(&self, name: &str, handler: H) -> Result<()>
  where
    H: Handler + 'static,
  {
    self.registry.register(name, handler)
  }

  pub fn register_fn<F>(&self, name: &str, func: F) -> Result<()>
  where
    F: Fn(JobArgs) -> Result<()> + Send + Sync + 'static,
  {
    self.registry.register_fn(name, func)
  }

  pub fn register_async_fn<F, Fut>(&self, name: &str, func: F) -> Result<()>
  where
    F: Fn(JobArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    self.registry.register_async_fn(name, func)
  }

  /// 入队；唯一任务重复时返回 `Ok(None)`
  /// Enqueue; a duplicate unique job yields `Ok(None)`
  pub async fn enqueue(&self, job: NewJob, unique: bool) -> Result<Option<Job>> {
    self.client.enqueue(job, unique).await
  }

  /// 延迟入队
  /// Enqueue after a delay
  pub async fn enqueue_in(&self, delay: Duration, job: NewJob) -> Result<Job> {
    self.client.enqueue_in(delay, job).await
  }

  pub async fn state(&self) -> PoolState {
    self.inner.lock().await.state
  }

  /// 启动所有工作者和后台组件；重复调用无副作用
  /// Start every worker and background component; calling it twice is a no-op
  pub async fn start(&self) {
    let mut inner = self.inner.lock().await;
    if inner.state == PoolState::Running {
      return;
    }

    let token = CancellationToken::new();
    let pool_id = self.pool_id();
    let mut handles = Vec::with_capacity(self.config.concurrency + 2);

    for index in 0..self.config.concurrency {
      let worker = Arc::new(Worker::new(
        format!("{pool_id}#{index}"),
        self.store.clone(),
        self.registry.clone(),
        self.config.worker.clone(),
        token.child_token(),
      ));
      handles.push(worker.start());
    }

    let requeuer = Arc::new(Requeuer::new(
      self.store.clone(),
      self.config.requeuer.clone(),
      token.child_token(),
    ));
    handles.push(requeuer.start());

    let promoter = Arc::new(Promoter::new(
      self.store.clone(),
      self.config.promoter.clone(),
      token.child_token(),
    ));
    handles.push(promoter.start());

    inner.token = Some(token);
    inner.handles = handles;
    inner.state = PoolState::Running;
    tracing::info!(
      pool = %pool_id,
      concurrency = self.config.concurrency,
      "worker pool started"
    );
  }

  /// 停止并等待所有单元退出；正在执行的处理器会执行完毕
  /// Stop and await every unit; handlers already running finish first
  pub async fn stop(&self) {
    let mut inner = self.inner.lock().await;
    if inner.state != PoolState::Running {
      return;
    }

    if let Some(token) = inner.token.take() {
      token.cancel();
    }
    let handles = std::mem::take(&mut inner.handles);
    tracing::info!(pool = %self.pool_id(), "waiting for workers to finish");
    for result in futures::future::join_all(handles).await {
      if let Err(e) = result {
        tracing::error!(error = %e, "worker task failed");
      }
    }
    inner.state = PoolState::Stopped;
    tracing::info!(pool = %self.pool_id(), "worker pool stopped");
  }
}
