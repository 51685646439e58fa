use crate::error::{AppResult, ConfigError};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// 推理后端协议
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendProtocol {
    /// Ollama 原生接口（/api/generate, /api/tags）
    Ollama,
    /// OpenAI 兼容接口（/v1/chat/completions）
    OpenAi,
}

/// 单个推理后端的配置
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct BackendConfig {
    pub protocol: BackendProtocol,
    /// 共享默认设备上的服务地址
    pub base_url: String,
    pub model: String,
    /// OpenAI 兼容服务的密钥
    pub api_key: Option<String>,
    pub temperature: f32,
    /// 模型文件大小（MB），用于估算分区显存需求
    pub model_size_mb: u64,
    /// 分区 UUID → 绑定在该分区上的服务地址
    pub partition_endpoints: HashMap<String, String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            protocol: BackendProtocol::Ollama,
            base_url: "http://localhost:11434".to_string(),
            model: "qwen2.5-coder:7b".to_string(),
            api_key: None,
            temperature: 0.3,
            model_size_mb: 4700,
            partition_endpoints: HashMap::new(),
        }
    }
}

/// 程序配置文件
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    // --- 后端配置 ---
    pub code_backend: BackendConfig,
    pub feedback_backend: BackendConfig,
    // --- 任务参数 ---
    /// 代码分析任务超时（秒）
    pub code_timeout_secs: u64,
    /// 反馈生成任务超时（秒）
    pub feedback_timeout_secs: u64,
    pub code_max_tokens: u32,
    pub feedback_max_tokens: u32,
    // --- 调度与分区 ---
    /// 工作池大小
    pub worker_count: usize,
    /// 排队等待空闲工作者的最长时间（毫秒）
    pub dispatch_timeout_ms: u64,
    /// 是否启用 GPU 分区
    pub enable_partitions: bool,
    pub nvidia_smi_path: String,
    // --- 批量处理 ---
    /// 待评分提交的 TOML 目录
    pub submissions_folder: String,
    /// 评分结果输出目录
    pub output_folder: String,
    /// 同时评分的提交数量
    pub max_concurrent_submissions: usize,
    /// 是否显示详细日志
    pub verbose_logging: bool,
    /// 输出日志文件
    pub output_log_file: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            code_backend: BackendConfig::default(),
            feedback_backend: BackendConfig {
                model: "llama3.1:8b".to_string(),
                temperature: 0.5,
                model_size_mb: 4900,
                ..BackendConfig::default()
            },
            code_timeout_secs: 180,
            feedback_timeout_secs: 200,
            code_max_tokens: 2048,
            feedback_max_tokens: 1536,
            worker_count: 2,
            dispatch_timeout_ms: 600_000,
            enable_partitions: true,
            nvidia_smi_path: "nvidia-smi".to_string(),
            submissions_folder: "submissions".to_string(),
            output_folder: "grading_results".to_string(),
            max_concurrent_submissions: 4,
            verbose_logging: false,
            output_log_file: "grading_log.txt".to_string(),
        }
    }
}

impl Config {
    /// 加载配置：`GRADER_CONFIG` 指向的 TOML 文件（可选）+ 环境变量覆盖
    pub fn load() -> AppResult<Self> {
        let base = match std::env::var("GRADER_CONFIG") {
            Ok(path) => Self::from_toml_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };
        base.with_env_overrides()
    }

    /// 从 TOML 文件读取配置，缺省字段使用默认值
    pub fn from_toml_file(path: &Path) -> AppResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| crate::error::AppError::file_read_failed(path.display().to_string(), e))?;
        Self::from_toml_str(&content, &path.display().to_string())
    }

    pub fn from_toml_str(content: &str, origin: &str) -> AppResult<Self> {
        let config = toml::from_str(content).map_err(|source| ConfigError::TomlParseFailed {
            path: origin.to_string(),
            source,
        })?;
        Ok(config)
    }

    /// 使用环境变量覆盖配置
    pub fn with_env_overrides(self) -> AppResult<Self> {
        let mut config = self;
        config.code_timeout_secs = env_parse("CODE_TIMEOUT_SECS", config.code_timeout_secs)?;
        config.feedback_timeout_secs =
            env_parse("FEEDBACK_TIMEOUT_SECS", config.feedback_timeout_secs)?;
        config.worker_count = env_parse("WORKER_COUNT", config.worker_count)?;
        config.enable_partitions = env_parse("ENABLE_PARTITIONS", config.enable_partitions)?;
        config.max_concurrent_submissions =
            env_parse("MAX_CONCURRENT_SUBMISSIONS", config.max_concurrent_submissions)?;
        config.verbose_logging = env_parse("VERBOSE_LOGGING", config.verbose_logging)?;
        config.code_backend.base_url =
            std::env::var("CODE_BACKEND_URL").unwrap_or(config.code_backend.base_url);
        config.code_backend.model = std::env::var("CODE_MODEL").unwrap_or(config.code_backend.model);
        config.feedback_backend.base_url =
            std::env::var("FEEDBACK_BACKEND_URL").unwrap_or(config.feedback_backend.base_url);
        config.feedback_backend.model =
            std::env::var("FEEDBACK_MODEL").unwrap_or(config.feedback_backend.model);
        config.submissions_folder =
            std::env::var("SUBMISSIONS_FOLDER").unwrap_or(config.submissions_folder);
        config.output_folder = std::env::var("OUTPUT_FOLDER").unwrap_or(config.output_folder);
        config.output_log_file = std::env::var("OUTPUT_LOG_FILE").unwrap_or(config.output_log_file);
        Ok(config)
    }

    pub fn code_timeout(&self) -> Duration {
        Duration::from_secs(self.code_timeout_secs)
    }

    pub fn feedback_timeout(&self) -> Duration {
        Duration::from_secs(self.feedback_timeout_secs)
    }

    pub fn dispatch_timeout(&self) -> Duration {
        Duration::from_millis(self.dispatch_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(var_name: &str, default: T) -> AppResult<T> {
    match std::env::var(var_name) {
        Ok(value) => value.trim().parse().map_err(|_| {
            ConfigError::EnvVarParseFailed {
                var_name: var_name.to_string(),
                value,
                expected_type: std::any::type_name::<T>().to_string(),
            }
            .into()
        }),
        Err(_) => Ok(default),
    }
}
