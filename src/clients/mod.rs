pub mod inference_client;
pub mod ollama_client;
pub mod openai_client;

pub use inference_client::{resolve_endpoint, BackendClientFactory, ClientFactory, InferenceClient};
pub use ollama_client::OllamaClient;
pub use openai_client::OpenAiClient;
