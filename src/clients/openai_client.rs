//! OpenAI 兼容后端客户端
//!
//! ## 技术栈
//! - 使用 `async-openai` crate 进行 chat completion 调用
//! - 兼容 OpenAI API 的本地服务（如 vLLM、llama.cpp server 等）
//! - 存活探测使用 `GET {base}/models`

use crate::clients::InferenceClient;
use crate::config::BackendConfig;
use crate::models::DeviceBinding;
use async_openai::{
    config::OpenAIConfig,
    types::chat::{
        ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
        ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
        CreateChatCompletionRequestArgs,
    },
    Client,
};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

const SYSTEM_MESSAGE: &str =
    "你是一名严谨的编程课助教。只输出一个 JSON 对象，不要输出任何其他内容。";
const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// OpenAI 兼容客户端
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
    http: reqwest::Client,
    endpoint: String,
    api_key: Option<String>,
    model: String,
    temperature: f32,
    timeout: Duration,
    binding: DeviceBinding,
}

impl OpenAiClient {
    pub fn new(
        http: reqwest::Client,
        endpoint: impl Into<String>,
        backend: &BackendConfig,
        timeout: Duration,
        binding: DeviceBinding,
    ) -> Self {
        let endpoint = endpoint.into();
        let mut openai_config = OpenAIConfig::new().with_api_base(&endpoint);
        if let Some(key) = &backend.api_key {
            openai_config = openai_config.with_api_key(key);
        }

        Self {
            client: Client::with_config(openai_config),
            http,
            endpoint,
            api_key: backend.api_key.clone(),
            model: backend.model.clone(),
            temperature: backend.temperature,
            timeout,
            binding,
        }
    }

    fn build_request(&self, prompt: &str, max_tokens: u32) -> anyhow::Result<CreateChatCompletionRequest> {
        let system_msg = ChatCompletionRequestSystemMessageArgs::default()
            .content(SYSTEM_MESSAGE)
            .build()?;
        let user_msg = ChatCompletionRequestUserMessageArgs::default()
            .content(prompt)
            .build()?;

        let request = CreateChatCompletionRequestArgs::default()
            .model(&self.model)
            .messages(vec![
                ChatCompletionRequestMessage::System(system_msg),
                ChatCompletionRequestMessage::User(user_msg),
            ])
            .temperature(self.temperature)
            .max_tokens(max_tokens)
            .build()?;
        Ok(request)
    }
}

#[async_trait]
impl InferenceClient for OpenAiClient {
    async fn generate(&self, prompt: &str, max_tokens: u32) -> Option<String> {
        debug!("调用 OpenAI 兼容接口，模型: {}", self.model);
        debug!("提示词长度: {} 字符", prompt.len());

        let request = match self.build_request(prompt, max_tokens) {
            Ok(request) => request,
            Err(e) => {
                warn!("构建 chat 请求失败: {}", e);
                return None;
            }
        };

        let response = match tokio::time::timeout(self.timeout, self.client.chat().create(request)).await {
            Ok(Ok(response)) => response,
            Ok(Err(e)) => {
                warn!("LLM API 调用失败 ({}): {}", self.endpoint, e);
                return None;
            }
            Err(_) => {
                warn!("LLM API 调用超时 ({:?}): {}", self.timeout, self.endpoint);
                return None;
            }
        };

        debug!("LLM API 调用成功");

        let content = response
            .choices
            .first()
            .and_then(|choice| choice.message.content.clone());
        if content.is_none() {
            warn!("LLM 返回内容为空 (模型: {})", self.model);
        }
        content.map(|c| c.trim().to_string())
    }

    async fn is_ready(&self) -> bool {
        let mut request = self
            .http
            .get(format!("{}/models", self.endpoint))
            .timeout(READY_TIMEOUT);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        match request.send().await {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("OpenAI 兼容服务不可用 ({}): {}", self.endpoint, e);
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
