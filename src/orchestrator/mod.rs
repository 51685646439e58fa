//! 编排层（Orchestration Layer）
//!
//! ## 职责
//!
//! 本层负责评分请求的调度，是整个系统的"指挥中心"。
//!
//! ## 模块划分
//!
//! ### `batch_grader` - 批量评分器
//! - 管理应用生命周期（初始化、运行）
//! - 批量加载提交（Vec<GradingRequest>）
//! - 控制并发数量（Semaphore）
//! - 输出全局统计信息
//!
//! ### `dual_task` - 双任务评分编排器
//! - 租用 / 归还 GPU 分区
//! - 并行提交代码分析与反馈生成
//! - 失败时顺序兜底
//! - 合并两个子结果
//!
//! ## 层次关系
//!
//! ```text
//! batch_grader (处理 Vec<GradingRequest>)
//!     ↓
//! dual_task (处理单个 GradingContext)
//!     ↓
//! workflow::run_task (处理单个 GradingTask)
//!     ↓
//! clients / services (能力层：推理 / 提示词 / 合并)
//!     ↓
//! infrastructure (基础设施：分区、工作池)
//! ```

pub mod batch_grader;
pub mod dual_task;

// 重新导出主要类型
pub use batch_grader::{App, GradingSummary};
pub use dual_task::{DualTaskOrchestrator, OrchestratorSettings};
