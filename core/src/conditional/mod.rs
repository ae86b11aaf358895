// flow_engine/src/conditional/mod.rs

//! Branching built-in tasks and the condition evaluator they share.

mod branch;
pub mod evaluator;

pub use branch::{IfTask, OperationSwitchTask, SwitchTask, OPERATION_PATH};
pub use evaluator::{ConditionEvaluator, DefaultEvaluator, SharedConditionEvaluator};
