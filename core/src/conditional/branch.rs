// flow_engine/src/conditional/branch.rs

//! The branching built-ins: `if`, `switch` and `operation-switch`.
//!
//! Their nested assemblies are parsed once from the raw step configuration
//! when the task is made. Conditions are read from the resolved properties at
//! execution time, so they may use parameter placeholders.

use crate::conditional::evaluator::SharedConditionEvaluator;
use crate::core::assembly::{Assembly, Pipeline};
use crate::core::context::Context;
use crate::core::descriptor::ErrorDescriptor;
use crate::error::FlowResult;
use crate::pipeline::handle::FlowHandle;
use crate::registry::Task;
use crate::tasks::{invoke_then_proceed, parse_props};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::Value;
use tracing::{event, Level};

/// Default context path holding the current operation id.
pub const OPERATION_PATH: &str = "operation.id";

fn runtime_error(condition: &Value, err: anyhow::Error) -> ErrorDescriptor {
  ErrorDescriptor::new("RuntimeError", format!("cannot evaluate {}: {}", condition, err))
}

#[derive(Deserialize)]
struct IfProps {
  #[serde(default)]
  condition: Value,
  execute: Assembly,
}

/// `if`: `{ condition, execute }`. Runs `execute` when the condition holds.
pub struct IfTask {
  evaluator: SharedConditionEvaluator,
  condition: Value,
  execute: Assembly,
}

impl IfTask {
  pub fn from_config(config: &Value, evaluator: SharedConditionEvaluator) -> FlowResult<Self> {
    let props: IfProps = parse_props("if", config)?;
    Ok(Self {
      evaluator,
      condition: props.condition,
      execute: props.execute,
    })
  }
}

#[async_trait]
impl Task for IfTask {
  async fn execute(&self, props: Value, ctx: Context, flow: FlowHandle) {
    let condition = props.get("condition").unwrap_or(&self.condition);
    match self.evaluator.evaluate(condition, &ctx) {
      Ok(true) => {
        event!(Level::DEBUG, %condition, "Condition holds; running nested pipeline.");
        invoke_then_proceed(&flow, Pipeline::new(self.execute.clone())).await;
      }
      Ok(false) => {
        event!(Level::DEBUG, %condition, "Condition does not hold; skipping.");
        flow.proceed();
      }
      Err(err) => {
        event!(Level::ERROR, %condition, error = %err, "Condition evaluation failed.");
        flow.fail(runtime_error(condition, err));
      }
    }
  }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SwitchCase {
  When { condition: Value, execute: Assembly },
  Otherwise { otherwise: Assembly },
}

#[derive(Deserialize)]
struct SwitchProps {
  case: Vec<SwitchCase>,
}

/// `switch`: `{ case: [{ condition, execute } | { otherwise }] }`.
///
/// Runs the first case whose condition holds, or the first `otherwise` case
/// reached before one does. Proceeds when nothing matches.
pub struct SwitchTask {
  evaluator: SharedConditionEvaluator,
  cases: Vec<SwitchCase>,
}

impl SwitchTask {
  pub fn from_config(config: &Value, evaluator: SharedConditionEvaluator) -> FlowResult<Self> {
    let props: SwitchProps = parse_props("switch", config)?;
    Ok(Self {
      evaluator,
      cases: props.case,
    })
  }
}

#[async_trait]
impl Task for SwitchTask {
  async fn execute(&self, props: Value, ctx: Context, flow: FlowHandle) {
    for (idx, case) in self.cases.iter().enumerate() {
      match case {
        SwitchCase::When { condition, execute } => {
          let condition = props
            .get("case")
            .and_then(|cases| cases.get(idx))
            .and_then(|case| case.get("condition"))
            .unwrap_or(condition);
          match self.evaluator.evaluate(condition, &ctx) {
            Ok(true) => {
              event!(Level::INFO, case = idx, %condition, "Switch case holds.");
              invoke_then_proceed(&flow, Pipeline::new(execute.clone())).await;
              return;
            }
            Ok(false) => {}
            Err(err) => {
              event!(Level::ERROR, case = idx, %condition, error = %err, "Switch condition evaluation failed.");
              flow.fail(runtime_error(condition, err));
              return;
            }
          }
        }
        SwitchCase::Otherwise { otherwise } => {
          event!(Level::INFO, case = idx, "Taking the otherwise case.");
          invoke_then_proceed(&flow, Pipeline::new(otherwise.clone())).await;
          return;
        }
      }
    }
    event!(Level::INFO, "No switch case matched; moving on.");
    flow.proceed();
  }
}

#[derive(Deserialize)]
struct OperationCase {
  operations: Vec<Value>,
  execute: Assembly,
}

#[derive(Deserialize)]
struct OperationSwitchProps {
  case: Vec<OperationCase>,
  #[serde(default)]
  otherwise: Option<Assembly>,
  #[serde(default, rename = "operation-path")]
  operation_path: Option<String>,
}

/// `operation-switch`: `{ case: [{ operations: [id, ..], execute }],
/// otherwise?, operation-path? }`.
///
/// Selects the case listing the operation id found in the context (at
/// `operation.id` unless `operation-path` says otherwise).
pub struct OperationSwitchTask {
  cases: Vec<OperationCase>,
  otherwise: Option<Assembly>,
  operation_path: String,
}

impl OperationSwitchTask {
  pub fn from_config(config: &Value) -> FlowResult<Self> {
    let props: OperationSwitchProps = parse_props("operation-switch", config)?;
    Ok(Self {
      cases: props.case,
      otherwise: props.otherwise,
      operation_path: props.operation_path.unwrap_or_else(|| OPERATION_PATH.to_string()),
    })
  }
}

fn same_operation(listed: &Value, target: &Value) -> bool {
  match (listed, target) {
    (Value::String(a), Value::String(b)) => a == b,
    (Value::String(a), other) | (other, Value::String(a)) => *a == other.to_string(),
    (a, b) => a == b,
  }
}

#[async_trait]
impl Task for OperationSwitchTask {
  fn skip_param_resolving(&self) -> bool {
    true
  }

  async fn execute(&self, _props: Value, ctx: Context, flow: FlowHandle) {
    let Some(target) = ctx.get(&self.operation_path) else {
      event!(Level::WARN, path = %self.operation_path, "No operation id in context; skipped.");
      flow.proceed();
      return;
    };

    let selected = self
      .cases
      .iter()
      .find(|case| case.operations.iter().any(|op| same_operation(op, &target)))
      .map(|case| &case.execute)
      .or(self.otherwise.as_ref());

    match selected {
      Some(execute) => {
        event!(Level::INFO, operation = %target, "Operation case matched; running nested pipeline.");
        invoke_then_proceed(&flow, Pipeline::new(execute.clone())).await;
      }
      None => {
        event!(Level::WARN, operation = %target, "No case matched the operation; skipped.");
        flow.proceed();
      }
    }
  }
}
