//! 结果合并服务 - 业务能力层
//!
//! 只负责"把两个原始回复变成一个评分结果"，不关心调度。

use crate::models::{
    CodeAnalysis, DeviceAssignments, FeedbackReport, GradingContext, GradingMethod, GradingStats,
    MergedResult, StructuredOutput, TaskResult,
};
use crate::workflow::TaskOutcome;
use std::time::Duration;
use tracing::{debug, warn};

/// 代码分析得分权重
pub const CODE_WEIGHT: f64 = 0.6;
/// 反馈得分权重
pub const FEEDBACK_WEIGHT: f64 = 0.4;

/// 结果合并服务
///
/// 职责：
/// - 从模型回复中提取 JSON 并解析为结构化结果
/// - 解析失败时替换为固定的兜底结果
/// - 计算加权总分与计时统计
#[derive(Debug, Default, Clone, Copy)]
pub struct ResultMerger;

impl ResultMerger {
    pub fn new() -> Self {
        Self
    }

    /// 解析模型回复
    ///
    /// 返回 (结构化结果, 是否使用了兜底)
    pub fn parse<T: StructuredOutput>(&self, raw: Option<&str>) -> (T, bool) {
        let Some(raw) = raw else {
            debug!("{} 没有回复，使用兜底结果", T::KIND.label());
            return (T::fallback(), true);
        };

        let Some(json) = extract_json_object(raw) else {
            warn!("{} 回复中没有 JSON 对象，使用兜底结果", T::KIND.label());
            return (T::fallback(), true);
        };

        match serde_json::from_str::<T>(json) {
            Ok(parsed) => (parsed.normalize(), false),
            Err(e) => {
                warn!("{} 回复 JSON 解析失败: {}，使用兜底结果", T::KIND.label(), e);
                (T::fallback(), true)
            }
        }
    }

    /// 把一次任务执行包装成 `TaskResult`
    pub fn task_result<T: StructuredOutput>(&self, outcome: TaskOutcome) -> TaskResult<T> {
        let (structured, used_fallback) = self.parse::<T>(outcome.response.as_deref());
        TaskResult {
            kind: T::KIND,
            duration: outcome.duration,
            raw_response: outcome.response,
            structured,
            used_fallback,
        }
    }

    /// 加权总分：0.6 × 代码分析 + 0.4 × 反馈
    pub fn merge_scores(&self, code: &CodeAnalysis, feedback: &FeedbackReport) -> f64 {
        round2(CODE_WEIGHT * code.score() + FEEDBACK_WEIGHT * feedback.score())
    }

    /// 计算计时统计
    ///
    /// 顺序兜底时不声称有并行加速，效率固定为 1.0。
    pub fn compute_stats(
        &self,
        code_duration: Duration,
        feedback_duration: Duration,
        parallel_time: Duration,
        total_time: Duration,
        method: GradingMethod,
    ) -> GradingStats {
        let code_secs = code_duration.as_secs_f64();
        let feedback_secs = feedback_duration.as_secs_f64();
        let parallel_secs = parallel_time.as_secs_f64();

        let efficiency = match method {
            GradingMethod::Parallel if parallel_secs > 0.0 => {
                (code_secs + feedback_secs) / parallel_secs
            }
            _ => 1.0,
        };

        GradingStats {
            code_duration_secs: round2(code_secs),
            feedback_duration_secs: round2(feedback_secs),
            parallel_time_secs: round2(parallel_secs),
            total_time_secs: round2(total_time.as_secs_f64()),
            efficiency: round2(efficiency),
        }
    }

    /// 组装最终结果
    #[allow(clippy::too_many_arguments)]
    pub fn merge(
        &self,
        request_id: u64,
        context: &GradingContext,
        code: TaskResult<CodeAnalysis>,
        feedback: TaskResult<FeedbackReport>,
        devices: DeviceAssignments,
        method: GradingMethod,
        parallel_time: Duration,
        total_time: Duration,
    ) -> MergedResult {
        let stats = self.compute_stats(code.duration, feedback.duration, parallel_time, total_time, method);
        let final_score = self.merge_scores(&code.structured, &feedback.structured);

        MergedResult {
            request_id,
            final_score,
            code_analysis: code.structured,
            feedback: feedback.structured,
            code_fallback_used: code.used_fallback,
            feedback_fallback_used: feedback.used_fallback,
            assignment_info: context.assignment_info.clone(),
            devices,
            grading_method: method,
            stats,
        }
    }
}

/// 找出回复中第一个 `{` 到最后一个 `}` 之间的内容
pub fn extract_json_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let end = raw.rfind('}')?;
    (end > start).then(|| &raw[start..=end])
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
