//! 推理客户端接口
//!
//! 每种后端协议一个小适配器，编排层只依赖 `InferenceClient`。

use crate::clients::{OllamaClient, OpenAiClient};
use crate::config::{BackendConfig, BackendProtocol, Config};
use crate::models::{DeviceBinding, TaskKind};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// 同步语义的推理外观：发送提示词，阻塞直到得到回复或超时
///
/// 超时、连接失败、非成功状态码一律返回 None，不区分错误类型。
#[async_trait]
pub trait InferenceClient: Send + Sync {
    /// 生成文本
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Option<String>;

    /// 轻量的存活探测
    async fn is_ready(&self) -> bool;

    /// 构造时确定的设备绑定
    fn binding(&self) -> &DeviceBinding;

    fn model_name(&self) -> &str;
}

/// 按任务类型与设备绑定构造推理客户端
pub trait ClientFactory: Send + Sync {
    fn build(&self, kind: TaskKind, binding: DeviceBinding) -> Arc<dyn InferenceClient>;

    /// 该任务类型的请求能否真正发送到指定分区上的服务
    ///
    /// 返回 false 的分区不会被租用，任务改用共享默认 GPU。
    fn routes_partition(&self, kind: TaskKind, uuid: &str) -> bool;
}

/// 根据配置构造真实后端客户端
///
/// 所有客户端共享同一个 `reqwest::Client` 连接池。
pub struct BackendClientFactory {
    code_backend: BackendConfig,
    feedback_backend: BackendConfig,
    code_timeout: Duration,
    feedback_timeout: Duration,
    http: reqwest::Client,
}

impl BackendClientFactory {
    pub fn new(config: &Config) -> Self {
        Self {
            code_backend: config.code_backend.clone(),
            feedback_backend: config.feedback_backend.clone(),
            code_timeout: config.code_timeout(),
            feedback_timeout: config.feedback_timeout(),
            http: reqwest::Client::new(),
        }
    }

    fn backend_for(&self, kind: TaskKind) -> (&BackendConfig, Duration) {
        match kind {
            TaskKind::CodeAnalysis => (&self.code_backend, self.code_timeout),
            TaskKind::FeedbackGeneration => (&self.feedback_backend, self.feedback_timeout),
        }
    }
}

impl ClientFactory for BackendClientFactory {
    fn build(&self, kind: TaskKind, binding: DeviceBinding) -> Arc<dyn InferenceClient> {
        let (backend, timeout) = self.backend_for(kind);
        let endpoint = resolve_endpoint(backend, &binding);
        debug!(
            "构造 {} 客户端: {} @ {} ({}, CUDA_VISIBLE_DEVICES={})",
            kind.label(),
            backend.model,
            endpoint,
            binding,
            binding.cuda_visible_devices()
        );

        match backend.protocol {
            BackendProtocol::Ollama => Arc::new(OllamaClient::new(
                self.http.clone(),
                endpoint,
                backend,
                timeout,
                binding,
            )),
            BackendProtocol::OpenAi => Arc::new(OpenAiClient::new(
                self.http.clone(),
                endpoint,
                backend,
                timeout,
                binding,
            )),
        }
    }

    fn routes_partition(&self, kind: TaskKind, uuid: &str) -> bool {
        self.backend_for(kind).0.partition_endpoints.contains_key(uuid)
    }
}

/// 选择请求地址：绑定分区且配置了该分区的服务时使用分区服务，否则使用默认地址
pub fn resolve_endpoint(backend: &BackendConfig, binding: &DeviceBinding) -> String {
    binding
        .partition_uuid()
        .and_then(|uuid| backend.partition_endpoints.get(uuid))
        .unwrap_or(&backend.base_url)
        .trim_end_matches('/')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn partition_binding(uuid: &str) -> DeviceBinding {
        DeviceBinding::Partition {
            partition_id: "gpu0-mig0".to_string(),
            uuid: uuid.to_string(),
            device_index: 0,
        }
    }

    #[test]
    fn test_resolve_endpoint_prefers_partition_server() {
        let mut backend = BackendConfig::default();
        backend
            .partition_endpoints
            .insert("MIG-a".to_string(), "http://localhost:11435/".to_string());

        assert_eq!(
            resolve_endpoint(&backend, &partition_binding("MIG-a")),
            "http://localhost:11435"
        );
        assert_eq!(
            resolve_endpoint(&backend, &partition_binding("MIG-unmapped")),
            "http://localhost:11434"
        );
        assert_eq!(
            resolve_endpoint(&backend, &DeviceBinding::SharedDefault),
            "http://localhost:11434"
        );
    }

    #[test]
    fn test_factory_routes_only_mapped_partitions() {
        let mut config = Config::default();
        config
            .code_backend
            .partition_endpoints
            .insert("MIG-a".to_string(), "http://localhost:11435".to_string());
        let factory = BackendClientFactory::new(&config);

        assert!(factory.routes_partition(TaskKind::CodeAnalysis, "MIG-a"));
        assert!(!factory.routes_partition(TaskKind::CodeAnalysis, "MIG-b"));
        assert!(!factory.routes_partition(TaskKind::FeedbackGeneration, "MIG-a"));

        // 默认配置没有分区服务地址，任何分区都不可路由
        let default_factory = BackendClientFactory::new(&Config::default());
        assert!(!default_factory.routes_partition(TaskKind::CodeAnalysis, "MIG-a"));
    }

    #[test]
    fn test_factory_keeps_binding_and_model() {
        let mut config = Config::default();
        config.feedback_backend.protocol = BackendProtocol::OpenAi;
        config.feedback_backend.model = "feedback-model".to_string();
        let factory = BackendClientFactory::new(&config);

        let code = factory.build(TaskKind::CodeAnalysis, partition_binding("MIG-a"));
        assert_eq!(code.binding(), &partition_binding("MIG-a"));
        assert_eq!(code.model_name(), "qwen2.5-coder:7b");

        let feedback = factory.build(TaskKind::FeedbackGeneration, DeviceBinding::SharedDefault);
        assert_eq!(feedback.binding(), &DeviceBinding::SharedDefault);
        assert_eq!(feedback.model_name(), "feedback-model");
    }
}
