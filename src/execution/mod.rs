// Batch execution of recurring orders
pub mod orchestrator;

pub use orchestrator::{Orchestrator, OrderStage};
