pub mod workflow_runtime;

pub use workflow_runtime::{TickReport, WorkflowRuntime};
