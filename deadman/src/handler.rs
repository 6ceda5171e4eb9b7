//! 处理器注册表
//! Handler registry
//!
//! 按名称把任务分派到处理器。注册表由所有工作者共享，启动前后都可以注册
//! Dispatches jobs to handlers by name. One registry is shared by every worker,
//! and handlers may be registered before or after the pool starts.
//!
//! ```rust,no_run
//! use deadman::handler::HandlerRegistry;
//! use deadman::job::JobArgs;
//!
//! # fn example() -> deadman::error::Result<()> {
//! let registry = HandlerRegistry::new();
//! registry.register_fn("say_hello", |args: JobArgs| {
//!   println!("hello {:?}", args.get("name"));
//!   Ok(())
//! })?;
//! registry.register_async_fn("say_hello_later", |_args: JobArgs| async move {
//!   Ok::<(), deadman::error::Error>(())
//! })?;
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::job::JobArgs;
use async_trait::async_trait;
use std::collections::HashMap;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::{Arc, PoisonError, RwLock};

/// 任务处理器特性
/// Job handler trait
#[async_trait]
pub trait Handler: Send + Sync {
  /// 处理任务，返回错误即视为一次失败
  /// Handle a job; an error counts as one failed attempt
  async fn handle(&self, args: JobArgs) -> Result<()>;
}

/// 函数式处理器适配器
/// Functional handler adapter
pub struct HandlerFunc<F> {
  func: F,
}

impl<F> HandlerFunc<F>
where
  F: Fn(JobArgs) -> Result<()> + Send + Sync,
{
  pub fn new(func: F) -> Self {
    Self { func }
  }
}

#[async_trait]
impl<F> Handler for HandlerFunc<F>
where
  F: Fn(JobArgs) -> Result<()> + Send + Sync,
{
  async fn handle(&self, args: JobArgs) -> Result<()> {
    (self.func)(args)
  }
}

/// 异步函数式处理器适配器
/// Asynchronous functional handler adapter
pub struct AsyncHandlerFunc<F, Fut> {
  func: F,
  _phantom: PhantomData<fn() -> Fut>,
}

impl<F, Fut> AsyncHandlerFunc<F, Fut>
where
  F: Fn(JobArgs) -> Fut + Send + Sync,
  Fut: Future<Output = Result<()>> + Send,
{
  pub fn new(func: F) -> Self {
    Self {
      func,
      _phantom: PhantomData,
    }
  }
}

#[async_trait]
impl<F, Fut> Handler for AsyncHandlerFunc<F, Fut>
where
  F: Fn(JobArgs) -> Fut + Send + Sync,
  Fut: Future<Output = Result<()>> + Send,
{
  async fn handle(&self, args: JobArgs) -> Result<()> {
    (self.func)(args).await
  }
}

/// 处理器注册表
/// Handler registry
#[derive(Default)]
pub struct HandlerRegistry {
  handlers: RwLock<HashMap<String, Arc<dyn Handler>>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  /// 注册处理器；同名重复注册返回 `Error::DuplicateHandler`
  /// Register a handler; a second registration of a name fails with `Error::DuplicateHandler`
  pub fn register<H>(&self, name: &str, handler: H) -> Result<()>
  where
    H: Handler + 'static,
  {
    self.register_arc(name, Arc::new(handler))
  }

  pub fn register_arc(&self, name: &str, handler: Arc<dyn Handler>) -> Result<()> {
    if name.trim().is_empty() {
      return Err(Error::config("handler name must not be empty"));
    }
    let mut handlers = self.handlers.write().unwrap_or_else(PoisonError::into_inner);
    if handlers.contains_key(name) {
      return Err(Error::DuplicateHandler {
        name: name.to_string(),
      });
    }
    handlers.insert(name.to_string(), handler);
    Ok(())
  }

  /// 注册同步处理函数
  /// Register a synchronous handler function
  pub fn register_fn<F>(&self, name: &str, func: F) -> Result<()>
  where
    F: Fn(JobArgs) -> Result<()> + Send + Sync + 'static,
  {
    self.register(name, HandlerFunc::new(func))
  }

  /// 注册异步处理函数
  /// Register an asynchronous handler function
  pub fn register_async_fn<F, Fut>(&self, name: &str, func: F) -> Result<()>
  where
    F: Fn(JobArgs) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
  {
    self.register(name, AsyncHandlerFunc::new(func))
  }

  pub fn get(&self, name: &str) -> Option<Arc<dyn Handler>> {
    self
      .handlers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .get(name)
      .cloned()
  }

  pub fn contains(&self, name: &str) -> bool {
    self
      .handlers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .contains_key(name)
  }

  /// 已注册的处理器名称（排序后）
  /// Registered handler names, sorted
  pub fn names(&self) -> Vec<String> {
    let mut names: Vec<String> = self
      .handlers
      .read()
      .unwrap_or_else(PoisonError::into_inner)
      .keys()
      .cloned()
      .collect();
    names.sort();
    names
  }

  /// 查找处理器并执行
  /// Look up a handler and run it
  pub async fn dispatch(&self, name: &str, args: JobArgs) -> Result<()> {
    let handler = self.get(name).ok_or_else(|| Error::HandlerNotFound {
      name: name.to_string(),
    })?;
    handler.handle(args).await
  }
}
