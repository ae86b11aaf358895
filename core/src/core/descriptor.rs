// flow_engine/src/core/descriptor.rs

//! The unit of failure information carried through a flow run.

use crate::error::FlowError;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Failure information propagated through the engine, matched against catch
/// clauses by `name`, and stored on the [`Context`](crate::Context) while a
/// flow recovers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorDescriptor {
  pub name: String,
  #[serde(default)]
  pub message: String,
}

impl ErrorDescriptor {
  pub fn new(name: impl Into<String>, message: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      message: message.into(),
    }
  }

  /// Descriptor used when a run aborts without any recorded failure.
  pub fn internal(message: impl Into<String>) -> Self {
    Self::new("InternalError", message)
  }

  /// Builds a descriptor from an arbitrary value raised by a task.
  ///
  /// Objects carrying a string `name` keep it (and `message`, if any). Any
  /// other value is stringified into `name`, so catch clauses compare the raw
  /// value.
  pub fn from_value(value: &Value) -> Self {
    if let Value::Object(map) = value {
      if let Some(Value::String(name)) = map.get("name") {
        let message = match map.get("message") {
          Some(Value::String(s)) => s.clone(),
          Some(Value::Null) | None => String::new(),
          Some(other) => other.to_string(),
        };
        return Self::new(name.clone(), message);
      }
    }
    let raw = match value {
      Value::String(s) => s.clone(),
      other => other.to_string(),
    };
    Self::new(raw.clone(), raw)
  }

  pub fn to_value(&self) -> Value {
    serde_json::json!({ "name": self.name, "message": self.message })
  }
}

impl fmt::Display for ErrorDescriptor {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.message.is_empty() || self.message == self.name {
      write!(f, "{}", self.name)
    } else {
      write!(f, "{}: {}", self.name, self.message)
    }
  }
}

impl std::error::Error for ErrorDescriptor {}

impl From<FlowError> for ErrorDescriptor {
  fn from(err: FlowError) -> Self {
    Self::new(err.name(), err.to_string())
  }
}

impl From<anyhow::Error> for ErrorDescriptor {
  fn from(err: anyhow::Error) -> Self {
    match err.downcast::<ErrorDescriptor>() {
      Ok(descriptor) => descriptor,
      Err(other) => FlowError::from(other).into(),
    }
  }
}

impl From<&str> for ErrorDescriptor {
  fn from(name: &str) -> Self {
    Self::new(name, name)
  }
}

impl From<String> for ErrorDescriptor {
  fn from(name: String) -> Self {
    Self::new(name.clone(), name)
  }
}

impl From<Value> for ErrorDescriptor {
  fn from(value: Value) -> Self {
    Self::from_value(&value)
  }
}

impl From<&Value> for ErrorDescriptor {
  fn from(value: &Value) -> Self {
    Self::from_value(value)
  }
}
