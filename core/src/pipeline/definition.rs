// flow_engine/src/pipeline/definition.rs

//! The per-request [`Flow`] engine and the options it is built from.

use crate::core::assembly::FlowConfig;
use crate::core::context::Context;
use crate::core::control::{FlowState, FlowStatus};
use crate::core::descriptor::ErrorDescriptor;
use crate::core::params::{ParamResolver, SharedParamResolver};
use crate::observer::{Listener, Observer};
use crate::pipeline::frame::{FrameStack, Overrides};
use crate::registry::{SharedTaskFactory, TaskRegistry};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::Span;

static NEXT_FLOW_ID: AtomicU64 = AtomicU64::new(1);

/// How a flow resolves tasks and parameters.
///
/// Tasks and the resolver set here apply to the main assembly and, through
/// frame inheritance, to everything nested below it.
#[derive(Clone)]
pub struct FlowOptions {
  pub(crate) registry: Arc<TaskRegistry>,
  pub(crate) overrides: Overrides,
}

impl Default for FlowOptions {
  fn default() -> Self {
    Self {
      registry: Arc::new(TaskRegistry::new()),
      overrides: Overrides::default(),
    }
  }
}

impl fmt::Debug for FlowOptions {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("FlowOptions")
      .field("registry", &self.registry)
      .field("overrides", &self.overrides)
      .finish()
  }
}

impl FlowOptions {
  pub fn new() -> Self {
    Self::default()
  }

  /// Resolves steps of type `kind` with `factory`, ahead of the registry.
  pub fn with_task(mut self, kind: impl Into<String>, factory: SharedTaskFactory) -> Self {
    self.overrides.tasks.insert(kind.into(), factory);
    self
  }

  pub fn with_tasks<I, K>(mut self, tasks: I) -> Self
  where
    I: IntoIterator<Item = (K, SharedTaskFactory)>,
    K: Into<String>,
  {
    self
      .overrides
      .tasks
      .extend(tasks.into_iter().map(|(kind, factory)| (kind.into(), factory)));
    self
  }

  pub fn with_param_resolver(mut self, resolver: impl ParamResolver + 'static) -> Self {
    self.overrides.param_resolver = Some(Arc::new(resolver));
    self
  }

  pub fn with_shared_param_resolver(mut self, resolver: SharedParamResolver) -> Self {
    self.overrides.param_resolver = Some(resolver);
    self
  }

  pub fn with_registry(mut self, registry: TaskRegistry) -> Self {
    self.registry = Arc::new(registry);
    self
  }

  pub fn registry(&self) -> &TaskRegistry {
    &self.registry
  }
}

/// Overrides for a pipeline started with
/// [`FlowHandle::invoke_with`](crate::FlowHandle::invoke_with).
#[derive(Clone, Default, Debug)]
pub struct InvokeOptions {
  pub(crate) overrides: Overrides,
}

impl InvokeOptions {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn with_task(mut self, kind: impl Into<String>, factory: SharedTaskFactory) -> Self {
    self.overrides.tasks.insert(kind.into(), factory);
    self
  }

  pub fn with_param_resolver(mut self, resolver: impl ParamResolver + 'static) -> Self {
    self.overrides.param_resolver = Some(Arc::new(resolver));
    self
  }
}

/// One execution of a [`FlowConfig`] against one [`Context`].
///
/// Create one per request and drive it with [`Flow::run`]. Flows share
/// nothing but the process-wide id counter, so any number may run
/// concurrently.
pub struct Flow {
  pub(crate) id: u64,
  pub(crate) config: Arc<FlowConfig>,
  pub(crate) options: FlowOptions,
  pub(crate) context: Context,
  pub(crate) observer: Observer,
  pub(crate) stack: FrameStack,
  pub(crate) state: FlowState,
  pub(crate) status: FlowStatus,
  pub(crate) error: Option<ErrorDescriptor>,
  pub(crate) span: Span,
}

impl fmt::Debug for Flow {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.debug_struct("Flow")
      .field("id", &self.id)
      .field("state", &self.state)
      .field("stack", &self.stack)
      .field("error", &self.error)
      .finish()
  }
}

impl Flow {
  pub fn new(config: FlowConfig, context: Context, options: FlowOptions) -> Self {
    Self::from_shared(Arc::new(config), context, options)
  }

  pub(crate) fn from_shared(config: Arc<FlowConfig>, context: Context, options: FlowOptions) -> Self {
    let id = NEXT_FLOW_ID.fetch_add(1, Ordering::Relaxed);
    Self {
      id,
      config,
      options,
      context,
      observer: Observer::new(),
      stack: FrameStack::new(),
      state: FlowState::Init,
      status: FlowStatus::Completed,
      error: None,
      span: Span::none(),
    }
  }

  /// Process-wide unique id of this flow.
  pub fn id(&self) -> u64 {
    self.id
  }

  pub fn state(&self) -> FlowState {
    self.state
  }

  pub fn context(&self) -> &Context {
    &self.context
  }

  /// The observer carrying this flow's lifecycle events.
  pub fn observer(&self) -> &Observer {
    &self.observer
  }

  pub fn subscribe(&self, event: impl Into<String>, listener: Listener) {
    self.observer.subscribe(event, listener);
  }

  pub fn unsubscribe(&self, event: &str, listener: &Listener) -> bool {
    self.observer.unsubscribe(event, listener)
  }
}
