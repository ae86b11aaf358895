// flow_engine/src/tasks.rs

//! Built-in `throw` and `call` tasks, and helpers shared by the built-ins.

use crate::core::assembly::{Assembly, Pipeline};
use crate::core::context::Context;
use crate::core::descriptor::ErrorDescriptor;
use crate::error::{FlowError, FlowResult};
use crate::pipeline::handle::FlowHandle;
use crate::registry::{SharedTask, Task};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{event, Level};

/// Reads the static configuration of a built-in step.
pub(crate) fn parse_props<P: DeserializeOwned>(kind: &str, config: &Value) -> FlowResult<P> {
  P::deserialize(config).map_err(|e| FlowError::MalformedAssembly {
    message: format!("invalid '{}' step: {}", kind, e),
  })
}

/// Runs `pipeline` nested under the current step, then proceeds.
///
/// If the flow abandons the nested pipeline it has already moved past this
/// step, so nothing is signalled.
pub(crate) async fn invoke_then_proceed(flow: &FlowHandle, pipeline: Pipeline) {
  match flow.invoke(pipeline).await {
    Ok(()) => {
      flow.proceed();
    }
    Err(err) => {
      event!(Level::DEBUG, kind = flow.step_kind(), error = %err, "Nested pipeline did not resume.");
    }
  }
}

/// `throw`: fails the step with the configured `{ name, message? }`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThrowTask;

#[async_trait]
impl Task for ThrowTask {
  async fn execute(&self, props: Value, _ctx: Context, flow: FlowHandle) {
    let error = match &props {
      Value::Null => ErrorDescriptor::new("Error", ""),
      other => ErrorDescriptor::from_value(other),
    };
    event!(Level::INFO, name = %error.name, "Raising error.");
    flow.fail(error);
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum CallProps {
  Nested { pipeline: Pipeline },
  Inline { execute: Assembly },
}

/// `call`: runs a nested pipeline, then proceeds.
///
/// Accepts `{ execute }`, or `{ pipeline: { execute, catch? } }` for a nested
/// pipeline with its own flow-level catch. A `catch` beside `execute` is the
/// step's own catch clause, as on any other step.
#[derive(Debug, Clone)]
pub struct CallTask {
  pipeline: Pipeline,
}

impl CallTask {
  pub fn from_config(config: &Value) -> FlowResult<Self> {
    let pipeline = match parse_props::<CallProps>("call", config)? {
      CallProps::Nested { pipeline } => pipeline,
      CallProps::Inline { execute } => Pipeline::new(execute),
    };
    Ok(Self { pipeline })
  }

  pub(crate) fn factory(config: &Value) -> FlowResult<SharedTask> {
    Ok(Arc::new(Self::from_config(config)?))
  }
}

#[async_trait]
impl Task for CallTask {
  fn skip_param_resolving(&self) -> bool {
    true
  }

  async fn execute(&self, _props: Value, _ctx: Context, flow: FlowHandle) {
    event!(Level::DEBUG, steps = self.pipeline.execute.len(), "Calling nested pipeline.");
    invoke_then_proceed(&flow, self.pipeline.clone()).await;
  }
}
