// flow_engine/src/lib.rs

//! An async execution core for declarative gateway assemblies.
//!
//! An assembly is an ordered list of steps, each a `{ type: config }`
//! mapping resolved to a [`Task`]. The engine runs one [`Flow`] per request:
//!  - Steps run in order; every task signals exactly one outcome through its
//!    [`FlowHandle`] (`proceed`, `fail` or `stop`). Extra signals are ignored.
//!  - Tasks may run nested pipelines (`invoke`) and resume once they finish.
//!  - Failures are matched against step-level catch clauses, then the flow-level
//!    catch of each enclosing pipeline, then the global catch.
//!  - A shared, path-addressable [`Context`] carries request state, supporting
//!    read-only and computed properties and namespaced views.
//!  - Lifecycle events (`START`, `pre:<type>`, `post:<type>`, `FINISH`, `ERROR`)
//!    are delivered through an [`Observer`].
//!  - Step configuration may be run through a [`ParamResolver`] before the task
//!    sees it.

pub mod conditional;
pub mod core;
pub mod error;
pub mod observer;
pub mod pipeline;
pub mod registry;
pub mod tasks;

// --- Re-exports for the Public API ---

pub use crate::core::assembly::{Assembly, Case, CatchClause, FlowConfig, Pipeline, Step};
pub use crate::core::context::Context;
pub use crate::core::control::{events, FlowState, FlowStatus};
pub use crate::core::descriptor::ErrorDescriptor;
pub use crate::core::params::{resolve_params, ParamResolver, SharedParamResolver, TemplateResolver};

pub use crate::observer::{Listener, NotifyControl, Observer};

pub use crate::pipeline::definition::{Flow, FlowOptions, InvokeOptions};
pub use crate::pipeline::frame::FrameKind;
pub use crate::pipeline::handle::FlowHandle;
pub use crate::pipeline::runner::FlowRunner;

pub use crate::conditional::{ConditionEvaluator, DefaultEvaluator};
pub use crate::registry::{
  stateless, task_fn, FnTask, ModuleNamespace, SharedTask, SharedTaskFactory, Task, TaskFactory, TaskLoader,
  TaskRegistry,
};

pub use crate::error::{ContextError, FlowError, FlowResult};
