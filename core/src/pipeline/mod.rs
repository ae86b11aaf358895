// flow_engine/src/pipeline/mod.rs

//! The per-request engine: frames, signalling, recovery and the run loop.

pub mod definition;
pub mod execution;
pub mod frame;
pub mod handle;
pub(crate) mod recovery;
pub mod runner;

pub use definition::{Flow, FlowOptions, InvokeOptions};
pub use execution::TASK_ERROR;
pub use handle::FlowHandle;
pub use runner::FlowRunner;
