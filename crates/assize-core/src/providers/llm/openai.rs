use super::{LlmClient, ResponseFormat};
use crate::model::{ChatMessage, LlmResponse, ModelConfig};
use async_trait::async_trait;
use serde_json::json;

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";

pub struct OpenAIClient {
    pub model: String,
    pub api_key: String,
    pub base_url: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
    pub client: reqwest::Client,
}

impl OpenAIClient {
    pub fn new(model: String, api_key: String) -> Self {
        Self {
            model,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            temperature: None,
            max_tokens: None,
            client: reqwest::Client::new(),
        }
    }

    pub fn from_config(cfg: &ModelConfig, api_key: String) -> anyhow::Result<Self> {
        let base_url = cfg
            .base_url
            .clone()
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        if !base_url.starts_with("http://") && !base_url.starts_with("https://") {
            anyhow::bail!("config error: base_url must be an http(s) URL, got {}", base_url);
        }
        Ok(Self {
            model: cfg.model.clone(),
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            temperature: cfg.temperature,
            max_tokens: cfg.max_tokens,
            client: reqwest::Client::new(),
        })
    }

    fn request_body(
        &self,
        messages: &[ChatMessage],
        response_format: Option<&ResponseFormat>,
    ) -> serde_json::Value {
        let mut body = json!({
            "model": self.model,
            "messages": messages,
        });
        if let Some(t) = self.temperature {
            body["temperature"] = json!(t);
        }
        if let Some(m) = self.max_tokens {
            body["max_tokens"] = json!(m);
        }
        if let Some(fmt) = response_format {
            body["response_format"] = json!({
                "type": "json_schema",
                "json_schema": {
                    "name": fmt.name,
                    "schema": fmt.schema,
                    "strict": true
                }
            });
        }
        body
    }
}

#[async_trait]
impl LlmClient for OpenAIClient {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        response_format: Option<&ResponseFormat>,
    ) -> anyhow::Result<LlmResponse> {
        let url = format!("{}/chat/completions", self.base_url);
        let body = self.request_body(messages, response_format);

        let resp = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&body)
            .send()
            .await?;

        let status = resp.status();
        if !status.is_success() {
            let error_text = resp.text().await.unwrap_or_default();
            anyhow::bail!("chat API error ({}): {}", status.as_u16(), error_text);
        }

        let json: serde_json::Value = resp.json().await?;

        let text = json
            .pointer("/choices/0/message/content")
            .and_then(|v| v.as_str())
            .ok_or_else(|| anyhow::anyhow!("chat API response missing content"))?
            .to_string();

        Ok(LlmResponse {
            text,
            provider: "openai".to_string(),
            model: self.model.clone(),
            meta: json!({
                "finish_reason": json.pointer("/choices/0/finish_reason"),
                "usage": json.get("usage"),
            }),
        })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
