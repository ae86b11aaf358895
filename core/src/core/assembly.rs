// flow_engine/src/core/assembly.rs

//! The already-parsed assembly tree: ordered steps, catch clauses and the
//! `{ execute, catch }` pipeline shape used by the main flow and by nested
//! invocations.

use crate::core::descriptor::ErrorDescriptor;
use crate::error::{FlowError, FlowResult};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::ops::Deref;

/// Reserved configuration key holding a nested assembly.
pub const EXECUTE_KEY: &str = "execute";
/// Reserved configuration key holding a catch clause.
pub const CATCH_KEY: &str = "catch";

/// One configured unit of work: the single-key mapping `{ kind: config }`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "Value", into = "Value")]
pub struct Step {
  kind: String,
  config: Value,
  catch: Option<CatchClause>,
}

impl Step {
  pub fn new(kind: impl Into<String>, config: Value) -> FlowResult<Self> {
    let kind = kind.into();
    let catch = match config.get(CATCH_KEY) {
      Some(raw) => Some(CatchClause::deserialize(raw).map_err(|e| FlowError::MalformedAssembly {
        message: format!("invalid catch clause on step '{}': {}", kind, e),
      })?),
      None => None,
    };
    Ok(Self { kind, config, catch })
  }

  /// The step type name used to resolve its task.
  pub fn kind(&self) -> &str {
    &self.kind
  }

  /// The raw (unresolved) step configuration, reserved keys included.
  pub fn config(&self) -> &Value {
    &self.config
  }

  /// The step-level catch clause, if declared.
  pub fn catch(&self) -> Option<&CatchClause> {
    self.catch.as_ref()
  }
}

impl TryFrom<Value> for Step {
  type Error = FlowError;

  fn try_from(value: Value) -> Result<Self, Self::Error> {
    match value {
      Value::Object(map) if map.len() == 1 => {
        let (kind, config) = map.into_iter().next().ok_or_else(|| FlowError::MalformedAssembly {
          message: "empty step mapping".to_string(),
        })?;
        Step::new(kind, config)
      }
      Value::String(kind) => Step::new(kind, Value::Null),
      other => Err(FlowError::MalformedAssembly {
        message: format!("a step must be a single-key mapping, got {}", other),
      }),
    }
  }
}

impl From<Step> for Value {
  fn from(step: Step) -> Self {
    let mut map = Map::new();
    map.insert(step.kind, step.config);
    Value::Object(map)
  }
}

/// An ordered sequence of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Assembly(Vec<Step>);

impl Assembly {
  pub fn new(steps: Vec<Step>) -> Self {
    Self(steps)
  }

  pub fn from_value(value: &Value) -> FlowResult<Self> {
    Assembly::deserialize(value).map_err(|e| FlowError::MalformedAssembly { message: e.to_string() })
  }

  pub fn steps(&self) -> &[Step] {
    &self.0
  }
}

impl Deref for Assembly {
  type Target = [Step];

  fn deref(&self) -> &Self::Target {
    &self.0
  }
}

impl FromIterator<Step> for Assembly {
  fn from_iter<I: IntoIterator<Item = Step>>(iter: I) -> Self {
    Self(iter.into_iter().collect())
  }
}

/// One case of a catch clause.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Case {
  /// Matches when the error name equals one of the tokens.
  Errors {
    #[serde(deserialize_with = "error_tokens")]
    errors: Vec<String>,
    execute: Assembly,
  },
  /// Matches unconditionally.
  Default { default: Assembly },
}

impl Case {
  pub fn matches(&self, error: &ErrorDescriptor) -> bool {
    match self {
      Case::Errors { errors, .. } => errors.iter().any(|token| *token == error.name),
      Case::Default { .. } => true,
    }
  }

  pub fn assembly(&self) -> &Assembly {
    match self {
      Case::Errors { execute, .. } => execute,
      Case::Default { default } => default,
    }
  }
}

// Tokens may be written as non-string scalars; they are compared as strings.
fn error_tokens<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
  D: Deserializer<'de>,
{
  let raw = Vec::<Value>::deserialize(deserializer)?;
  Ok(
    raw
      .into_iter()
      .map(|v| match v {
        Value::String(s) => s,
        other => other.to_string(),
      })
      .collect(),
  )
}

/// A pipeline's or step's declared error-recovery cases, evaluated in order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatchClause(Vec<Case>);

impl CatchClause {
  pub fn new(cases: Vec<Case>) -> Self {
    Self(cases)
  }

  pub fn cases(&self) -> &[Case] {
    &self.0
  }

  /// Returns the assembly of the first case matching `error`.
  pub fn find(&self, error: &ErrorDescriptor) -> Option<&Assembly> {
    self.0.iter().find(|case| case.matches(error)).map(Case::assembly)
  }
}

/// The `{ execute, catch }` shape: an assembly plus its flow-level catch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Pipeline {
  pub execute: Assembly,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub catch: Option<CatchClause>,
}

impl Pipeline {
  pub fn new(execute: Assembly) -> Self {
    Self { execute, catch: None }
  }

  pub fn with_catch(mut self, catch: CatchClause) -> Self {
    self.catch = Some(catch);
    self
  }

  /// Reads `{ execute, catch? }` out of a step configuration.
  pub fn from_value(value: &Value) -> FlowResult<Self> {
    Pipeline::deserialize(value).map_err(|e| FlowError::MalformedAssembly { message: e.to_string() })
  }
}

/// Top-level declarative configuration: `{ assembly: { execute, catch? } }`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FlowConfig {
  pub assembly: Pipeline,
}

impl FlowConfig {
  pub fn new(assembly: Pipeline) -> Self {
    Self { assembly }
  }

  pub fn from_value(value: Value) -> FlowResult<Self> {
    serde_json::from_value(value).map_err(|e| FlowError::MalformedAssembly { message: e.to_string() })
  }

  pub fn from_json_str(text: &str) -> FlowResult<Self> {
    serde_json::from_str(text).map_err(|e| FlowError::MalformedAssembly { message: e.to_string() })
  }
}
