//! 双任务评分编排器 - 编排层
//!
//! ## 职责
//!
//! 对一次评分请求：
//!
//! 1. **准备**：构建代码分析 / 反馈生成两个任务，尽力为每个任务租用一个分区
//! 2. **并行调度**：通过共享工作池同时提交两个推理调用，各自受超时约束
//! 3. **判定**：任一任务异常退出或无法提交时，顺序重跑两个任务
//! 4. **合并**：解析两个回复并加权合并
//! 5. **清理**：分区租约在所有退出路径上释放（`PartitionLease` 销毁即释放）
//!
//! 单个任务超时不是错误，只会让该任务使用兜底结果。

use crate::clients::{BackendClientFactory, ClientFactory, InferenceClient};
use crate::config::Config;
use crate::error::{AppError, AppResult, DispatchError};
use crate::infrastructure::{memory_requirement_estimate, PartitionAllocator, PartitionLease, WorkerPool};
use crate::models::{
    CodeAnalysis, DeviceAssignments, DeviceBinding, FeedbackReport, GradingContext, GradingMethod,
    GradingTask, MergedResult, TaskKind,
};
use crate::services::{PromptBuilder, ResultMerger};
use crate::workflow::{run_task, RequestCtx, TaskOutcome};
use futures::FutureExt;
use serde_json::{Map, Value};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{error, info, warn};

/// 每个评分请求并行占用的工作者数量
pub const SLOTS_PER_REQUEST: usize = 2;

/// 编排器参数
#[derive(Debug, Clone)]
pub struct OrchestratorSettings {
    pub code_timeout: Duration,
    pub feedback_timeout: Duration,
    pub code_max_tokens: u32,
    pub feedback_max_tokens: u32,
    /// 代码分析模型所需的分区显存（MB）
    pub code_required_mb: u64,
    /// 反馈生成模型所需的分区显存（MB）
    pub feedback_required_mb: u64,
}

impl OrchestratorSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            code_timeout: config.code_timeout(),
            feedback_timeout: config.feedback_timeout(),
            code_max_tokens: config.code_max_tokens,
            feedback_max_tokens: config.feedback_max_tokens,
            code_required_mb: memory_requirement_estimate(config.code_backend.model_size_mb),
            feedback_required_mb: memory_requirement_estimate(config.feedback_backend.model_size_mb),
        }
    }

    fn for_kind(&self, kind: TaskKind) -> (Duration, u32, u64) {
        match kind {
            TaskKind::CodeAnalysis => (self.code_timeout, self.code_max_tokens, self.code_required_mb),
            TaskKind::FeedbackGeneration => (
                self.feedback_timeout,
                self.feedback_max_tokens,
                self.feedback_required_mb,
            ),
        }
    }
}

/// 一个已准备好的任务：任务描述 + 绑定好设备的客户端
struct PreparedTask {
    task: GradingTask,
    client: Arc<dyn InferenceClient>,
}

/// 双任务评分编排器
pub struct DualTaskOrchestrator {
    allocator: Option<PartitionAllocator>,
    factory: Arc<dyn ClientFactory>,
    pool: WorkerPool,
    prompt_builder: PromptBuilder,
    merger: ResultMerger,
    settings: OrchestratorSettings,
    next_request_id: AtomicU64,
}

impl DualTaskOrchestrator {
    /// 创建编排器
    ///
    /// # 参数
    /// - `allocator`: 分区分配器，None 表示始终使用共享默认 GPU
    /// - `factory`: 推理客户端工厂
    /// - `pool`: 跨请求复用的工作池
    /// - `settings`: 超时、token 预算与显存需求
    pub fn new(
        allocator: Option<PartitionAllocator>,
        factory: Arc<dyn ClientFactory>,
        pool: WorkerPool,
        settings: OrchestratorSettings,
    ) -> Self {
        Self {
            allocator,
            factory,
            pool,
            prompt_builder: PromptBuilder::new(),
            merger: ResultMerger::new(),
            settings,
            next_request_id: AtomicU64::new(0),
        }
    }

    /// 按配置创建使用真实后端的编排器
    ///
    /// 工作池至少能容纳 `max_concurrent_submissions` 个请求同时并行。
    pub fn from_config(config: &Config, allocator: Option<PartitionAllocator>) -> Self {
        let needed = SLOTS_PER_REQUEST * config.max_concurrent_submissions.max(1);
        let workers = config.worker_count.max(needed);
        if workers > config.worker_count {
            info!(
                "工作池从 {} 扩大到 {}（{} 份提交同时评分）",
                config.worker_count, workers, config.max_concurrent_submissions
            );
        }

        Self::new(
            allocator,
            Arc::new(BackendClientFactory::new(config)),
            WorkerPool::new(workers, config.dispatch_timeout()),
            OrchestratorSettings::from_config(config),
        )
    }

    pub fn pool(&self) -> &WorkerPool {
        &self.pool
    }

    pub fn allocator(&self) -> Option<&PartitionAllocator> {
        self.allocator.as_ref()
    }

    /// 探测两个后端在共享默认设备上是否可用
    pub async fn probe_backends(&self) -> (bool, bool) {
        let code = self.factory.build(TaskKind::CodeAnalysis, DeviceBinding::SharedDefault);
        let feedback = self
            .factory
            .build(TaskKind::FeedbackGeneration, DeviceBinding::SharedDefault);
        tokio::join!(code.is_ready(), feedback.is_ready())
    }

    /// 调用方接口：按提交内容评分
    pub async fn grade_submission(
        &self,
        student_code: &str,
        student_markdown: &str,
        solution_code: &str,
        assignment_info: Map<String, Value>,
        rubric_elements: Map<String, Value>,
    ) -> AppResult<MergedResult> {
        let ctx = GradingContext::new(
            student_code,
            student_markdown,
            solution_code,
            assignment_info,
            rubric_elements,
        );
        self.grade(&ctx).await
    }

    /// 评分
    ///
    /// 总是返回完整的 `MergedResult`；只有并行与顺序两条路径都无法执行时才返回错误。
    pub async fn grade(&self, ctx: &GradingContext) -> AppResult<MergedResult> {
        let total_start = Instant::now();
        let request_id = self.next_request_id.fetch_add(1, Ordering::SeqCst) + 1;
        let rctx = RequestCtx::new(request_id, ctx.assignment_title());
        info!("{} 开始评分", rctx);

        // ========== 1. 准备：任务 + 分区租约 + 客户端 ==========
        let code_task = self.build_task(request_id, TaskKind::CodeAnalysis, ctx);
        let feedback_task = self.build_task(request_id, TaskKind::FeedbackGeneration, ctx);

        let use_partitions = self.partitions_usable();
        let code_lease = self.acquire_lease(&rctx, &code_task, use_partitions);
        let feedback_lease = self.acquire_lease(&rctx, &feedback_task, use_partitions);

        let devices = DeviceAssignments {
            code_analysis: binding_of(&code_lease),
            feedback_generation: binding_of(&feedback_lease),
        };

        let code = PreparedTask {
            client: self.factory.build(TaskKind::CodeAnalysis, devices.code_analysis.clone()),
            task: code_task,
        };
        let feedback = PreparedTask {
            client: self
                .factory
                .build(TaskKind::FeedbackGeneration, devices.feedback_generation.clone()),
            task: feedback_task,
        };

        // ========== 2/3. 并行调度，失败时顺序兜底 ==========
        let (code_outcome, feedback_outcome, method, phase_time) =
            match self.run_parallel(&rctx, &code, &feedback).await {
                Ok((c, f, elapsed)) => (c, f, GradingMethod::Parallel, elapsed),
                Err(e) => {
                    error!("{} ❌ 并行调度失败: {}，改为顺序执行", rctx, e);
                    let sequential_start = Instant::now();
                    let (c, f) = self.run_sequential(&rctx, &code, &feedback).await?;
                    (c, f, GradingMethod::SequentialFallback, sequential_start.elapsed())
                }
            };

        // ========== 4. 合并 ==========
        let code_result = self.merger.task_result::<CodeAnalysis>(code_outcome);
        let feedback_result = self.merger.task_result::<FeedbackReport>(feedback_outcome);
        let merged = self.merger.merge(
            request_id,
            ctx,
            code_result,
            feedback_result,
            devices,
            method,
            phase_time,
            total_start.elapsed(),
        );

        // ========== 5. 清理 ==========
        drop(code_lease);
        drop(feedback_lease);

        log_grading_complete(&rctx, &merged);
        Ok(merged)
    }

    fn build_task(&self, request_id: u64, kind: TaskKind, ctx: &GradingContext) -> GradingTask {
        let (timeout, max_tokens, _) = self.settings.for_kind(kind);
        GradingTask::new(request_id, kind, self.prompt_builder.build(kind, ctx), max_tokens, timeout)
    }

    /// 少于两个分区时不做分配，两个任务都在共享 GPU 上运行
    fn partitions_usable(&self) -> bool {
        self.allocator
            .as_ref()
            .map(|a| a.registry().parallel_partitions_available())
            .unwrap_or(false)
    }

    fn acquire_lease(&self, rctx: &RequestCtx, task: &GradingTask, use_partitions: bool) -> Option<PartitionLease> {
        if !use_partitions {
            return None;
        }
        let allocator = self.allocator.as_ref()?;
        let (_, _, required_mb) = self.settings.for_kind(task.kind);

        // 只租用请求真正能发到的分区，报告的绑定与实际运行位置一致
        let lease = allocator.lease_matching(task.workload_id(), required_mb, |p| {
            self.factory.routes_partition(task.kind, &p.uuid)
        });
        if lease.is_none() {
            warn!(
                "{} ⚠️ 没有满足 {} MB 且配置了服务地址的空闲分区，{} 使用共享 GPU",
                rctx,
                required_mb,
                task.kind.label()
            );
        }
        lease
    }

    async fn run_parallel(
        &self,
        rctx: &RequestCtx,
        code: &PreparedTask,
        feedback: &PreparedTask,
    ) -> Result<(TaskOutcome, TaskOutcome, Duration), DispatchError> {
        // 两个工作者一次性预留，排队时间不计入并行墙钟
        let reservation = self.pool.reserve(SLOTS_PER_REQUEST).await?;
        info!("{} 🚀 并行提交两个任务", rctx);

        let start = Instant::now();
        let code_handle =
            reservation.spawn(&code.task.id, run_task(code.client.clone(), code.task.clone()));
        let feedback_handle = reservation.spawn(
            &feedback.task.id,
            run_task(feedback.client.clone(), feedback.task.clone()),
        );
        drop(reservation);

        let (code_joined, feedback_joined) = tokio::join!(code_handle, feedback_handle);
        let code_outcome = code_joined.map_err(|e| DispatchError::TaskPanicked {
            task: code.task.id.clone(),
            detail: e.to_string(),
        })?;
        let feedback_outcome = feedback_joined.map_err(|e| DispatchError::TaskPanicked {
            task: feedback.task.id.clone(),
            detail: e.to_string(),
        })?;

        Ok((code_outcome, feedback_outcome, start.elapsed()))
    }

    /// 在调用方任务上依次执行，不占用工作池
    async fn run_sequential(
        &self,
        rctx: &RequestCtx,
        code: &PreparedTask,
        feedback: &PreparedTask,
    ) -> AppResult<(TaskOutcome, TaskOutcome)> {
        info!("{} 🔁 顺序执行两个任务", rctx);

        let code_outcome = run_guarded(code).await?;
        let feedback_outcome = run_guarded(feedback).await?;
        Ok((code_outcome, feedback_outcome))
    }
}

/// 在调用方任务上执行，把 panic 转成调度错误
async fn run_guarded(prepared: &PreparedTask) -> AppResult<TaskOutcome> {
    AssertUnwindSafe(run_task(prepared.client.clone(), prepared.task.clone()))
        .catch_unwind()
        .await
        .map_err(|payload| AppError::task_panicked(prepared.task.id.clone(), panic_message(payload.as_ref())))
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg.to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "未知 panic".to_string()
    }
}

fn binding_of(lease: &Option<PartitionLease>) -> DeviceBinding {
    lease
        .as_ref()
        .map(PartitionLease::binding)
        .unwrap_or(DeviceBinding::SharedDefault)
}

// ========== 日志辅助函数 ==========

fn log_grading_complete(rctx: &RequestCtx, merged: &MergedResult) {
    info!(
        "{} ✅ 评分完成: 总分 {:.2} (代码 {:.1}{}, 反馈 {:.1}{})",
        rctx,
        merged.final_score,
        merged.code_analysis.technical_score,
        if merged.code_fallback_used { " 兜底" } else { "" },
        merged.feedback.overall_score,
        if merged.feedback_fallback_used { " 兜底" } else { "" },
    );
    info!(
        "{} ⏱️ 方式 {:?}, 代码 {:.1}s, 反馈 {:.1}s, 墙钟 {:.1}s, 效率 {:.2}",
        rctx,
        merged.grading_method,
        merged.stats.code_duration_secs,
        merged.stats.feedback_duration_secs,
        merged.stats.parallel_time_secs,
        merged.stats.efficiency
    );
}
