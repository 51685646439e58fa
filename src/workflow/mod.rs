pub mod request_ctx;
pub mod task_runner;

pub use request_ctx::RequestCtx;
pub use task_runner::{run_task, TaskOutcome};
