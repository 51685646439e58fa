//! 提示词构建服务 - 业务能力层
//!
//! 只负责把一份提交转换成两条提示词，不关心模型和调度。

use crate::models::{GradingContext, TaskKind};
use crate::utils::logging::truncate_text;
use serde_json::{Map, Value};

/// 单段材料的最大字符数，避免超出模型上下文
const MAX_SECTION_CHARS: usize = 12_000;

/// 提示词构建服务
#[derive(Debug, Clone, Default)]
pub struct PromptBuilder;

impl PromptBuilder {
    pub fn new() -> Self {
        Self
    }

    pub fn build(&self, kind: TaskKind, ctx: &GradingContext) -> String {
        match kind {
            TaskKind::CodeAnalysis => self.build_code_prompt(ctx),
            TaskKind::FeedbackGeneration => self.build_feedback_prompt(ctx),
        }
    }

    /// 代码分析提示词：学生代码 + 参考答案 + 评分细则
    pub fn build_code_prompt(&self, ctx: &GradingContext) -> String {
        format!(
            r#"请对学生提交的代码进行技术分析。

作业：{}
作业信息：
{}

评分细则：
{}

参考答案：
```
{}
```

学生代码：
```
{}
```

只返回如下格式的 JSON（分数为 0-100）：
{{"technical_score": 0, "code_quality": 0, "correctness": 0, "issues": [], "strengths": [], "suggestions": []}}"#,
            ctx.assignment_title(),
            render_map(&ctx.assignment_info),
            render_map(&ctx.rubric_elements),
            truncate_text(&ctx.solution_code, MAX_SECTION_CHARS),
            truncate_text(&ctx.student_code, MAX_SECTION_CHARS),
        )
    }

    /// 反馈生成提示词：学生的说明文档 + 代码
    pub fn build_feedback_prompt(&self, ctx: &GradingContext) -> String {
        format!(
            r#"请以助教的身份，给学生写一份有建设性的反馈。

作业：{}

评分细则：
{}

学生的说明文档：
{}

学生代码：
```
{}
```

只返回如下格式的 JSON（overall_score 为 0-100）：
{{"overall_score": 0, "summary": "", "strengths": [], "improvements": [], "encouragement": ""}}"#,
            ctx.assignment_title(),
            render_map(&ctx.rubric_elements),
            truncate_text(&ctx.student_markdown, MAX_SECTION_CHARS),
            truncate_text(&ctx.student_code, MAX_SECTION_CHARS),
        )
    }
}

fn render_map(map: &Map<String, Value>) -> String {
    if map.is_empty() {
        return "（无）".to_string();
    }
    serde_json::to_string_pretty(map).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn context() -> GradingContext {
        let mut rubric = Map::new();
        rubric.insert("correctness".to_string(), json!(60));
        let mut info = Map::new();
        info.insert("title".to_string(), json!("斐波那契"));
        GradingContext::new(
            "def fib(n): return n",
            "我用了递归",
            "def fib(n): ...",
            info,
            rubric,
        )
    }

    #[test]
    fn test_code_prompt_contains_material() {
        let prompt = PromptBuilder::new().build(TaskKind::CodeAnalysis, &context());
        assert!(prompt.contains("斐波那契"));
        assert!(prompt.contains("def fib(n): return n"));
        assert!(prompt.contains("\"correctness\": 60"));
        assert!(prompt.contains("\"technical_score\""));
    }

    #[test]
    fn test_feedback_prompt_contains_markdown() {
        let prompt = PromptBuilder::new().build(TaskKind::FeedbackGeneration, &context());
        assert!(prompt.contains("我用了递归"));
        assert!(prompt.contains("\"overall_score\""));
        assert!(!prompt.contains("参考答案"));
    }

    #[test]
    fn test_empty_maps_render_placeholder() {
        let prompt = PromptBuilder::new().build_code_prompt(&GradingContext::default());
        assert!(prompt.contains("（无）"));
        assert!(prompt.contains("未命名作业"));
    }
}
