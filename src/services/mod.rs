pub mod prompt_builder;
pub mod result_merger;

pub use prompt_builder::PromptBuilder;
pub use result_merger::{extract_json_object, ResultMerger, CODE_WEIGHT, FEEDBACK_WEIGHT};
