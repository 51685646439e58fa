//! 评分请求上下文
//!
//! 封装"我正在处理第几个评分请求"这一信息，用于日志前缀

use std::fmt::Display;

/// 评分请求上下文
#[derive(Debug, Clone)]
pub struct RequestCtx {
    /// 评分请求编号（进程内单调递增）
    pub request_id: u64,

    /// 作业标题（仅用于日志显示）
    pub assignment_title: String,
}

impl RequestCtx {
    pub fn new(request_id: u64, assignment_title: impl Into<String>) -> Self {
        Self {
            request_id,
            assignment_title: assignment_title.into(),
        }
    }
}

impl Display for RequestCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[评分 #{} {}]", self.request_id, self.assignment_title)
    }
}
