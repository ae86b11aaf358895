// flow_engine/src/core/control.rs

//! Engine states and the successful outcome of a flow run.

/// Successful terminal outcome of a flow run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowStatus {
  /// Every frame ran out of steps.
  Completed,
  /// A task called `stop()`; remaining steps in all frames were skipped.
  Stopped,
}

/// States of the engine's state machine.
///
/// `Init`, `Done` and `Abort` are entered at most once per engine instance;
/// `Running` is re-entered after every resolved step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowState {
  Init,
  Running,
  PrepareOutput,
  Done,
  Abort,
}

impl FlowState {
  pub fn is_terminal(self) -> bool {
    matches!(self, FlowState::Done | FlowState::Abort)
  }
}

/// Names of the lifecycle events fired by the engine.
pub mod events {
  pub const START: &str = "START";
  pub const FINISH: &str = "FINISH";
  pub const ERROR: &str = "ERROR";

  /// Fired before a step of the given type is handed to its task.
  pub fn pre(kind: &str) -> String {
    format!("pre:{}", kind)
  }

  /// Fired after a step of the given type proceeded.
  pub fn post(kind: &str) -> String {
    format!("post:{}", kind)
  }
}
