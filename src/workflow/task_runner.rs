//! 单任务执行流程 - 流程层
//!
//! 定义"一次推理调用"的完整过程：计时 → 调用 → 超时判定

use crate::clients::InferenceClient;
use crate::models::{GradingTask, TaskKind};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

/// 一次推理调用的结果（解析前）
#[derive(Debug, Clone)]
pub struct TaskOutcome {
    pub kind: TaskKind,
    pub duration: Duration,
    /// 超时或后端失败时为 None
    pub response: Option<String>,
}

/// 在任务自己的超时内执行一次推理
///
/// 超时只影响本任务，返回 None，不取消兄弟任务。
pub async fn run_task(client: Arc<dyn InferenceClient>, task: GradingTask) -> TaskOutcome {
    info!(
        "▶ 任务 {} 开始 ({}, 模型 {}, 超时 {:?})",
        task.id,
        client.binding(),
        client.model_name(),
        task.timeout
    );

    let start = Instant::now();
    let response = match timeout(task.timeout, client.generate(&task.prompt, task.max_tokens)).await {
        Ok(response) => response,
        Err(_) => {
            warn!("⏱️ 任务 {} 超时 ({:?})", task.id, task.timeout);
            None
        }
    };
    let duration = start.elapsed();

    match &response {
        Some(text) => info!("✓ 任务 {} 完成，耗时 {:.1}s，回复 {} 字符", task.id, duration.as_secs_f64(), text.len()),
        None => warn!("⚠️ 任务 {} 没有得到回复，耗时 {:.1}s", task.id, duration.as_secs_f64()),
    }

    TaskOutcome {
        kind: task.kind,
        duration,
        response,
    }
}
