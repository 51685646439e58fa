pub mod loaders;
pub mod partition;
pub mod result;
pub mod task;

pub use loaders::{load_all_requests, load_grading_request, GradingRequest};
pub use partition::{DeviceBinding, PartitionInstance};
pub use result::{
    CodeAnalysis, DeviceAssignments, FeedbackReport, GradingMethod, GradingStats, MergedResult,
    StructuredOutput, TaskResult,
};
pub use task::{GradingContext, GradingTask, TaskKind};
