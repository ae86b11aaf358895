// flow_engine/src/registry.rs

//! Task types and the registry that maps step types to task factories.
//!
//! A step's type is resolved in this order:
//! 1. task overrides carried by the running frame and its ancestors,
//! 2. the built-in tasks (`if`, `switch`, `operation-switch`, `throw`, `call`),
//! 3. every registered [`TaskLoader`], in registration order.
//!
//! A type nobody knows is a configuration error and aborts the flow.

use crate::conditional::evaluator::{DefaultEvaluator, SharedConditionEvaluator};
use crate::conditional::{IfTask, OperationSwitchTask, SwitchTask};
use crate::core::context::Context;
use crate::error::{FlowError, FlowResult};
use crate::pipeline::handle::FlowHandle;
use crate::tasks::{CallTask, ThrowTask};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;
use tracing::{event, Level};

/// The runtime object behind one step.
///
/// `execute` receives the step's resolved configuration and must report its
/// outcome through `flow`. Returning without signalling, or panicking, fails
/// the step with a `TaskError`.
#[async_trait]
pub trait Task: Send + Sync {
  /// Hand the raw step configuration to `execute` instead of the resolved one.
  fn skip_param_resolving(&self) -> bool {
    false
  }

  async fn execute(&self, props: Value, ctx: Context, flow: FlowHandle);
}

pub type SharedTask = Arc<dyn Task>;

/// Builds the task for a step from the step's raw configuration.
///
/// Failing with a [`FlowError::Configuration`] or [`FlowError::UnknownTask`]
/// aborts the flow; any other error fails the step and is recoverable.
pub trait TaskFactory: Send + Sync {
  fn make(&self, config: &Value) -> FlowResult<SharedTask>;
}

pub type SharedTaskFactory = Arc<dyn TaskFactory>;

impl<F> TaskFactory for F
where
  F: Fn(&Value) -> FlowResult<SharedTask> + Send + Sync,
{
  fn make(&self, config: &Value) -> FlowResult<SharedTask> {
    self(config)
  }
}

/// A factory handing out the same task for every step of its type.
pub fn stateless<T: Task + 'static>(task: T) -> SharedTaskFactory {
  let task: SharedTask = Arc::new(task);
  Arc::new(move |_: &Value| -> FlowResult<SharedTask> { Ok(task.clone()) })
}

/// A [`Task`] backed by an async closure.
pub struct FnTask<F> {
  f: F,
  skip_param_resolving: bool,
}

/// Wraps an async closure as a task.
///
/// ```ignore
/// let greet = task_fn(|_props, ctx, flow| async move {
///   ctx.set("greeting", "hello").ok();
///   flow.proceed();
/// });
/// ```
pub fn task_fn<F, Fut>(f: F) -> FnTask<F>
where
  F: Fn(Value, Context, FlowHandle) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  FnTask {
    f,
    skip_param_resolving: false,
  }
}

impl<F> FnTask<F> {
  pub fn skip_param_resolving(mut self) -> Self {
    self.skip_param_resolving = true;
    self
  }
}

#[async_trait]
impl<F, Fut> Task for FnTask<F>
where
  F: Fn(Value, Context, FlowHandle) -> Fut + Send + Sync + 'static,
  Fut: Future<Output = ()> + Send + 'static,
{
  fn skip_param_resolving(&self) -> bool {
    self.skip_param_resolving
  }

  async fn execute(&self, props: Value, ctx: Context, flow: FlowHandle) {
    (self.f)(props, ctx, flow).await
  }
}

/// A source of task factories consulted after the built-ins.
pub trait TaskLoader: Send + Sync {
  fn load(&self, kind: &str) -> Option<SharedTaskFactory>;
}

/// A named, in-memory collection of task factories.
#[derive(Clone, Default)]
pub struct ModuleNamespace {
  name: String,
  modules: HashMap<String, SharedTaskFactory>,
}

impl ModuleNamespace {
  pub fn new(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      modules: HashMap::new(),
    }
  }

  pub fn name(&self) -> &str {
    &self.name
  }

  pub fn register(&mut self, kind: impl Into<String>, factory: SharedTaskFactory) -> &mut Self {
    let kind = kind.into();
    event!(Level::DEBUG, namespace = %self.name, %kind, "Registering task module.");
    self.modules.insert(kind, factory);
    self
  }

  pub fn with(mut self, kind: impl Into<String>, factory: SharedTaskFactory) -> Self {
    self.register(kind, factory);
    self
  }

  pub fn contains(&self, kind: &str) -> bool {
    self.modules.contains_key(kind)
  }
}

impl fmt::Debug for ModuleNamespace {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let mut kinds: Vec<&String> = self.modules.keys().collect();
    kinds.sort();
    f.debug_struct("ModuleNamespace")
      .field("name", &self.name)
      .field("modules", &kinds)
      .finish()
  }
}

impl TaskLoader for ModuleNamespace {
  fn load(&self, kind: &str) -> Option<SharedTaskFactory> {
    self.modules.get(kind).cloned()
  }
}

/// Built-in tasks plus the loaders that supply everything else.
///
/// Shared by every flow created from the same options.
pub struct TaskRegistry {
  builtins: HashMap<String, SharedTaskFactory>,
  loaders: Vec<Arc<dyn TaskLoader>>,
}

impl Default for TaskRegistry {
  fn default() -> Self {
    Self::new()
  }
}

impl fmt::Debug for TaskRegistry {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("TaskRegistry")
      .field("builtins", &self.builtin_kinds())
      .field("loaders", &self.loaders.len())
      .finish()
  }
}

impl TaskRegistry {
  /// A registry with the built-in tasks using the default condition evaluator.
  pub fn new() -> Self {
    Self::with_condition_evaluator(Arc::new(DefaultEvaluator))
  }

  /// A registry whose `if` and `switch` tasks use `evaluator`.
  pub fn with_condition_evaluator(evaluator: SharedConditionEvaluator) -> Self {
    let mut builtins: HashMap<String, SharedTaskFactory> = HashMap::new();
    let if_evaluator = evaluator.clone();
    builtins.insert(
      "if".into(),
      Arc::new(move |config: &Value| -> FlowResult<SharedTask> {
        Ok(Arc::new(IfTask::from_config(config, if_evaluator.clone())?))
      }),
    );
    builtins.insert(
      "switch".into(),
      Arc::new(move |config: &Value| -> FlowResult<SharedTask> {
        Ok(Arc::new(SwitchTask::from_config(config, evaluator.clone())?))
      }),
    );
    builtins.insert(
      "operation-switch".into(),
      Arc::new(|config: &Value| -> FlowResult<SharedTask> { Ok(Arc::new(OperationSwitchTask::from_config(config)?)) }),
    );
    builtins.insert("throw".into(), stateless(ThrowTask));
    builtins.insert("call".into(), Arc::new(CallTask::factory));
    Self {
      builtins,
      loaders: Vec::new(),
    }
  }

  /// A registry without built-ins.
  pub fn empty() -> Self {
    Self {
      builtins: HashMap::new(),
      loaders: Vec::new(),
    }
  }

  pub fn add_loader(&mut self, loader: Arc<dyn TaskLoader>) -> &mut Self {
    self.loaders.push(loader);
    self
  }

  pub fn with_loader(mut self, loader: impl TaskLoader + 'static) -> Self {
    self.loaders.push(Arc::new(loader));
    self
  }

  pub fn builtin_kinds(&self) -> Vec<&str> {
    let mut kinds: Vec<&str> = self.builtins.keys().map(String::as_str).collect();
    kinds.sort_unstable();
    kinds
  }

  /// Finds the factory for a step type outside any frame override.
  pub fn resolve(&self, kind: &str) -> FlowResult<SharedTaskFactory> {
    if let Some(factory) = self.builtins.get(kind) {
      return Ok(factory.clone());
    }
    self
      .loaders
      .iter()
      .find_map(|loader| loader.load(kind))
      .ok_or_else(|| {
        event!(Level::ERROR, %kind, "No task registered for step type.");
        FlowError::UnknownTask { kind: kind.to_string() }
      })
  }
}
