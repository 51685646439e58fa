use thiserror::Error;

/// 应用程序错误类型
///
/// 只有资源查询失败和调度失败是调用方需要感知的真正错误，
/// 超时、无分区、解析失败都在内部降级处理。
#[derive(Debug, Error)]
pub enum AppError {
    /// 硬件分区查询错误
    #[error("资源错误: {0}")]
    Resource(#[from] ResourceError),
    /// 任务调度错误
    #[error("调度错误: {0}")]
    Dispatch(#[from] DispatchError),
    /// 配置错误
    #[error("配置错误: {0}")]
    Config(#[from] ConfigError),
    /// 文件操作错误
    #[error("文件错误: {0}")]
    File(#[from] FileError),
}

/// 硬件分区查询错误（ResourceQueryError）
#[derive(Debug, Error)]
pub enum ResourceError {
    /// 查询工具不存在或无法启动
    #[error("无法执行硬件查询命令 {command}: {source}")]
    CommandUnavailable {
        command: String,
        #[source]
        source: std::io::Error,
    },
    /// 查询命令返回非零状态
    #[error("硬件查询命令 {command} 执行失败 (status: {status:?}): {stderr}")]
    CommandFailed {
        command: String,
        status: Option<i32>,
        stderr: String,
    },
    /// 查询输出无法解析
    #[error("无法解析硬件查询输出: {detail}")]
    ParseFailed { detail: String },
}

/// 任务调度错误（TaskDispatchFailure）
#[derive(Debug, Error)]
pub enum DispatchError {
    /// 工作池已关闭
    #[error("工作池已关闭，无法提交任务")]
    PoolClosed,
    /// 等待空闲工作者超时
    #[error("等待空闲工作者超时 ({waited_ms}ms)")]
    PoolExhausted { waited_ms: u64 },
    /// 任务执行过程中异常退出
    #[error("任务 {task} 异常退出: {detail}")]
    TaskPanicked { task: String, detail: String },
}

/// 配置错误
#[derive(Debug, Error)]
pub enum ConfigError {
    /// 配置文件解析失败
    #[error("配置文件 {path} 解析失败: {source}")]
    TomlParseFailed {
        path: String,
        #[source]
        source: toml::de::Error,
    },
    /// 环境变量解析失败
    #[error("环境变量 {var_name} 解析失败: 值 '{value}' 无法转换为 {expected_type}")]
    EnvVarParseFailed {
        var_name: String,
        value: String,
        expected_type: String,
    },
}

/// 文件操作错误
#[derive(Debug, Error)]
pub enum FileError {
    /// 读取文件失败
    #[error("读取文件失败 ({path}): {source}")]
    ReadFailed {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

// ========== 便捷构造函数 ==========

impl AppError {
    /// 创建任务异常退出错误
    pub fn task_panicked(task: impl Into<String>, detail: impl Into<String>) -> Self {
        AppError::Dispatch(DispatchError::TaskPanicked {
            task: task.into(),
            detail: detail.into(),
        })
    }

    /// 创建文件读取错误
    pub fn file_read_failed(path: impl Into<String>, source: std::io::Error) -> Self {
        AppError::File(FileError::ReadFailed {
            path: path.into(),
            source,
        })
    }

    /// 是否是调度层错误
    pub fn is_dispatch(&self) -> bool {
        matches!(self, AppError::Dispatch(_))
    }
}

// ========== Result 类型别名 ==========

/// 应用程序结果类型
pub type AppResult<T> = Result<T, AppError>;
