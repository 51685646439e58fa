//! 评分任务数据模型

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt::Display;
use std::time::Duration;

/// 评分任务类型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskKind {
    /// 代码分析
    CodeAnalysis,
    /// 反馈生成
    FeedbackGeneration,
}

impl TaskKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskKind::CodeAnalysis => "code_analysis",
            TaskKind::FeedbackGeneration => "feedback_generation",
        }
    }

    /// 日志用的中文名称
    pub fn label(&self) -> &'static str {
        match self {
            TaskKind::CodeAnalysis => "代码分析",
            TaskKind::FeedbackGeneration => "反馈生成",
        }
    }
}

impl Display for TaskKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 一次评分请求的输入（调用方接口）
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GradingContext {
    #[serde(default)]
    pub student_code: String,
    #[serde(default)]
    pub student_markdown: String,
    #[serde(default)]
    pub solution_code: String,
    /// 作业信息（标题、描述等）
    #[serde(default)]
    pub assignment_info: Map<String, Value>,
    /// 评分细则
    #[serde(default)]
    pub rubric_elements: Map<String, Value>,
}

impl GradingContext {
    pub fn new(
        student_code: impl Into<String>,
        student_markdown: impl Into<String>,
        solution_code: impl Into<String>,
        assignment_info: Map<String, Value>,
        rubric_elements: Map<String, Value>,
    ) -> Self {
        Self {
            student_code: student_code.into(),
            student_markdown: student_markdown.into(),
            solution_code: solution_code.into(),
            assignment_info,
            rubric_elements,
        }
    }

    /// 作业标题，缺省时返回占位名称
    pub fn assignment_title(&self) -> &str {
        self.assignment_info
            .get("title")
            .and_then(|v| v.as_str())
            .unwrap_or("未命名作业")
    }
}

/// 一次推理调用的不可变描述
#[derive(Debug, Clone)]
pub struct GradingTask {
    /// 任务标识，形如 `7:code_analysis`
    pub id: String,
    pub request_id: u64,
    pub kind: TaskKind,
    pub prompt: String,
    pub max_tokens: u32,
    /// 单任务超时
    pub timeout: Duration,
}

impl GradingTask {
    pub fn new(
        request_id: u64,
        kind: TaskKind,
        prompt: String,
        max_tokens: u32,
        timeout: Duration,
    ) -> Self {
        Self {
            id: format!("{}:{}", request_id, kind.as_str()),
            request_id,
            kind,
            prompt,
            max_tokens,
            timeout,
        }
    }

    /// 分区分配时使用的工作负载标识
    pub fn workload_id(&self) -> &str {
        &self.id
    }
}
