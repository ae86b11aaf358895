// flow_engine/src/core/mod.rs

pub mod assembly;
pub mod context;
pub mod control;
pub mod descriptor;
pub mod params;
pub(crate) mod property;

pub use assembly::{Assembly, CatchClause, Pipeline, Step};
pub use context::Context;
pub use control::{FlowState, FlowStatus};
pub use descriptor::ErrorDescriptor;
pub use property::{Getter, Setter};
