//! 评分结果数据模型

use crate::models::partition::DeviceBinding;
use crate::models::task::TaskKind;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;

/// 可由模型输出解析出的结构化子结果
pub trait StructuredOutput: DeserializeOwned + Serialize + Clone + Send + 'static {
    const KIND: TaskKind;

    /// 固定的、字段完整的兜底结果
    fn fallback() -> Self;

    /// 0-100 分制的得分
    fn score(&self) -> f64;

    /// 把得分限制在 [0, 100]
    fn normalize(self) -> Self;
}

/// 代码分析结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CodeAnalysis {
    pub technical_score: f64,
    pub code_quality: f64,
    pub correctness: f64,
    pub issues: Vec<String>,
    pub strengths: Vec<String>,
    pub suggestions: Vec<String>,
    /// 模型额外返回的字段
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for CodeAnalysis {
    fn default() -> Self {
        Self::fallback()
    }
}

impl StructuredOutput for CodeAnalysis {
    const KIND: TaskKind = TaskKind::CodeAnalysis;

    fn fallback() -> Self {
        Self {
            technical_score: 75.0,
            code_quality: 75.0,
            correctness: 75.0,
            issues: vec!["自动代码分析不可用，需人工复核".to_string()],
            strengths: vec!["代码已提交".to_string()],
            suggestions: vec!["请等待教师人工评阅".to_string()],
            extra: Map::new(),
        }
    }

    fn score(&self) -> f64 {
        self.technical_score
    }

    fn normalize(mut self) -> Self {
        self.technical_score = clamp_score(self.technical_score);
        self.code_quality = clamp_score(self.code_quality);
        self.correctness = clamp_score(self.correctness);
        self
    }
}

/// 反馈生成结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeedbackReport {
    pub overall_score: f64,
    pub summary: String,
    pub strengths: Vec<String>,
    pub improvements: Vec<String>,
    pub encouragement: String,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Default for FeedbackReport {
    fn default() -> Self {
        Self::fallback()
    }
}

impl StructuredOutput for FeedbackReport {
    const KIND: TaskKind = TaskKind::FeedbackGeneration;

    fn fallback() -> Self {
        Self {
            overall_score: 80.0,
            summary: "自动反馈暂不可用，作业已收到，教师将补充评语。".to_string(),
            strengths: vec!["按时提交了作业".to_string()],
            improvements: vec!["请关注教师后续的人工反馈".to_string()],
            encouragement: "继续保持！".to_string(),
            extra: Map::new(),
        }
    }

    fn score(&self) -> f64 {
        self.overall_score
    }

    fn normalize(mut self) -> Self {
        self.overall_score = clamp_score(self.overall_score);
        self
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 100.0)
    }
}

/// 单个任务的执行结果
#[derive(Debug, Clone)]
pub struct TaskResult<T> {
    pub kind: TaskKind,
    pub duration: Duration,
    /// 模型原始输出，超时或失败时为 None
    pub raw_response: Option<String>,
    pub structured: T,
    /// 是否使用了兜底结果
    pub used_fallback: bool,
}

/// 评分方式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GradingMethod {
    Parallel,
    SequentialFallback,
}

/// 计时统计
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradingStats {
    pub code_duration_secs: f64,
    pub feedback_duration_secs: f64,
    /// 两个任务的并行（或顺序兜底）墙钟时间
    pub parallel_time_secs: f64,
    /// 整个评分请求的墙钟时间
    pub total_time_secs: f64,
    /// (代码耗时 + 反馈耗时) / 并行墙钟时间
    pub efficiency: f64,
}

/// 每个任务实际使用的设备
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceAssignments {
    pub code_analysis: DeviceBinding,
    pub feedback_generation: DeviceBinding,
}

/// 最终合并的评分结果
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergedResult {
    pub request_id: u64,
    pub final_score: f64,
    pub code_analysis: CodeAnalysis,
    pub feedback: FeedbackReport,
    pub code_fallback_used: bool,
    pub feedback_fallback_used: bool,
    pub assignment_info: Map<String, Value>,
    pub devices: DeviceAssignments,
    pub grading_method: GradingMethod,
    pub stats: GradingStats,
}
