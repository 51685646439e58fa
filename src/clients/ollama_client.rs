/// Ollama 后端客户端
///
/// `POST /api/generate` 生成文本，`GET /api/tags` 探测存活
use crate::clients::InferenceClient;
use crate::config::BackendConfig;
use crate::models::DeviceBinding;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, warn};

const READY_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    num_predict: u32,
    temperature: f32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

/// Ollama 客户端
pub struct OllamaClient {
    http: reqwest::Client,
    endpoint: String,
    model: String,
    temperature: f32,
    timeout: Duration,
    binding: DeviceBinding,
}

impl OllamaClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        backend: &BackendConfig,
        timeout: Duration,
        binding: DeviceBinding,
    ) -> Self {
        Self {
            http,
            endpoint: endpoint.into(),
            model: backend.model.clone(),
            temperature: backend.temperature,
            timeout,
            binding,
        }
    }
}

#[async_trait]
impl InferenceClient for OllamaClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Option<String> {
        debug!("调用 Ollama，模型: {}，提示词长度: {} 字符", self.model, prompt.len());

        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                num_predict: max_tokens,
                temperature: self.temperature,
            },
        };

        let response = match self
            .http
            .post(format!("{}/api/generate", self.endpoint))
            .timeout(self.timeout)
            .json(&request)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => {
                warn!("Ollama 请求失败 ({}): {}", self.endpoint, e);
                return None;
            }
        };

        if !response.status().is_success() {
            warn!("Ollama 返回错误状态 ({}): {}", self.endpoint, response.status());
            return None;
        }

        match response.json::<GenerateResponse>().await {
            Ok(body) => {
                debug!("Ollama 调用成功，回复长度: {} 字符", body.response.len());
                Some(body.response.trim().to_string())
            }
            Err(e) => {
                warn!("Ollama 回复无法解析: {}", e);
                None
            }
        }
    }

    async fn is_ready(&self) -> bool {
        match self
            .http
            .get(format!("{}/api/tags", self.endpoint))
            .timeout(READY_TIMEOUT)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Ollama 不可用 ({}): {}", self.endpoint, e);
                false
            }
        }
    }

    fn binding(&self) -> &DeviceBinding {
        &self.binding
    }

    fn model_name(&self) -> &str {
        &self.model
    }
}
