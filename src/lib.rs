//! # Parallel Grading
//!
//! 一个把一份作业提交拆成两个推理任务、在 GPU 分区上并行评分的 Rust 应用程序
//!
//! ## 架构设计
//!
//! 本系统采用分层架构：
//!
//! ### ① 基础设施层（Infrastructure）
//! - `infrastructure/` - 持有稀缺资源（GPU 分区、工作线程），只暴露能力
//! - `PartitionRegistry` - 发现并记录 GPU 分区
//! - `PartitionAllocator` - 按显存需求分配分区，租约释放时归还
//! - `WorkerPool` - 有界的任务派发池
//!
//! ### ② 客户端层（Clients）
//! - `clients/` - 与推理后端通信，绑定到某个设备
//! - `OllamaClient` / `OpenAiClient` - 两种协议的实现
//!
//! ### ③ 业务能力层（Services）
//! - `services/` - 描述"我能做什么"，只处理单份提交
//! - `PromptBuilder` - 构建两条提示词
//! - `ResultMerger` - 解析回复、兜底、加权合并
//!
//! ### ④ 流程层（Workflow）
//! - `workflow/` - 定义"一个任务"的完整执行过程
//! - `RequestCtx` - 上下文封装（request_id + 作业标题）
//! - `run_task` - 计时 + 调用 + 超时判定
//!
//! ### ⑤ 编排层（Orchestration）
//! - `orchestrator/batch_grader` - 批量评分器，管理资源和并发
//! - `orchestrator/dual_task` - 单份提交的双任务编排器
//!
//! ## 模块结构

pub mod clients;
pub mod config;
pub mod error;
pub mod infrastructure;

pub mod models;
pub mod orchestrator;
pub mod services;
pub mod utils;
pub mod workflow;

// 重新导出常用类型
pub use clients::{BackendClientFactory, ClientFactory, InferenceClient};
pub use config::{BackendConfig, BackendProtocol, Config};
pub use error::{AppError, AppResult};
pub use infrastructure::{PartitionAllocator, PartitionLease, PartitionRegistry, WorkerPool};
pub use models::{DeviceBinding, GradingContext, MergedResult, PartitionInstance, TaskKind};
pub use orchestrator::{App, DualTaskOrchestrator, OrchestratorSettings};
pub use services::{PromptBuilder, ResultMerger};
