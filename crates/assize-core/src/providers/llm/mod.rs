use crate::model::{ChatMessage, LlmResponse, ModelConfig};
use async_trait::async_trait;
use std::sync::Arc;

pub mod openai;

/// Constrained-output request: the answer must match `schema`.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseFormat {
    pub name: String,
    pub schema: serde_json::Value,
}

#[async_trait]
pub trait LlmClient: Send + Sync {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        response_format: Option<&ResponseFormat>,
    ) -> anyhow::Result<LlmResponse>;
    fn provider_name(&self) -> &'static str;
}

/// Builds endpoint clients once credentials are resolved. The orchestrator
/// goes through this seam so tests can hand it scripted clients.
pub trait ClientFactory: Send + Sync {
    fn build(&self, cfg: &ModelConfig, api_key: String) -> anyhow::Result<Arc<dyn LlmClient>>;
}

/// Default factory: every provider is reached through the OpenAI-compatible
/// chat completions API, optionally at a custom `base_url`.
#[derive(Debug, Clone, Default)]
pub struct OpenAiCompatibleFactory;

impl ClientFactory for OpenAiCompatibleFactory {
    fn build(&self, cfg: &ModelConfig, api_key: String) -> anyhow::Result<Arc<dyn LlmClient>> {
        Ok(Arc::new(openai::OpenAIClient::from_config(cfg, api_key)?))
    }
}
