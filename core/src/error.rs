// flow_engine/src/error.rs
use anyhow::Error as AnyhowError;
use thiserror::Error;

/// Rejections raised by the [`Context`](crate::Context) property store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ContextError {
  #[error("Cannot write read-only property '{path}'")]
  ReadOnly { path: String },

  #[error("Property '{path}' is not configurable and cannot be redefined")]
  NotConfigurable { path: String },

  #[error("Cannot descend into '{path}': the value there is not a mapping")]
  NotAMapping { path: String },

  #[error("Context paths must not be empty")]
  EmptyPath,
}

#[derive(Debug, Error)]
pub enum FlowError {
  #[error("Configuration error: {message}")]
  Configuration { message: String },

  #[error("No task is registered for step type '{kind}'")]
  UnknownTask { kind: String },

  #[error("Malformed assembly: {message}")]
  MalformedAssembly { message: String },

  #[error(transparent)]
  Context(#[from] ContextError),

  #[error("Step '{kind}' already signalled its outcome")]
  AlreadySignalled { kind: String },

  #[error("The nested pipeline invoked by step '{kind}' was abandoned before it resumed")]
  SubflowAbandoned { kind: String },

  #[error("Serialization error: {0}")]
  Serialization(#[from] serde_json::Error),

  #[error("Error in user-provided task or listener. Source: {source}")]
  HandlerError {
    #[source]
    source: AnyhowError,
  },

  #[error("Internal flow engine error: {0}")]
  Internal(String),
}

impl FlowError {
  /// The error name used when this error is surfaced as an [`ErrorDescriptor`](crate::ErrorDescriptor).
  pub fn name(&self) -> &'static str {
    match self {
      FlowError::Configuration { .. } | FlowError::UnknownTask { .. } | FlowError::MalformedAssembly { .. } => {
        "ConfigurationError"
      }
      FlowError::Context(_) => "ContextError",
      FlowError::AlreadySignalled { .. } => "ProtocolViolation",
      FlowError::SubflowAbandoned { .. } => "SubflowAbandoned",
      FlowError::Serialization(_) => "SerializationError",
      FlowError::HandlerError { .. } => "TaskError",
      FlowError::Internal(_) => "InternalError",
    }
  }

  /// Configuration errors are never offered to catch clauses.
  pub fn is_configuration(&self) -> bool {
    matches!(
      self,
      FlowError::Configuration { .. } | FlowError::UnknownTask { .. } | FlowError::MalformedAssembly { .. }
    )
  }
}

impl From<AnyhowError> for FlowError {
  fn from(err: AnyhowError) -> Self {
    match err.downcast::<FlowError>() {
      Ok(flow_err) => flow_err,
      Err(source) => FlowError::HandlerError { source },
    }
  }
}

pub type FlowResult<T, E = FlowError> = std::result::Result<T, E>;
