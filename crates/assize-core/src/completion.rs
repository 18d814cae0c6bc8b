use crate::dataset::Document;
use crate::model::{ChatMessage, LlmResponse};
use crate::providers::llm::LlmClient;
use anyhow::Context;
use std::sync::Arc;
use tokio::time::{timeout, Duration};

/// Produces the candidate response for a document.
#[derive(Clone)]
pub struct CompletionClient {
    client: Arc<dyn LlmClient>,
    system_prompt: Option<String>,
    timeout: Duration,
}

impl CompletionClient {
    pub fn new(client: Arc<dyn LlmClient>, system_prompt: Option<String>, timeout: Duration) -> Self {
        Self {
            client,
            system_prompt,
            timeout,
        }
    }

    pub fn messages(&self, doc: &Document) -> Vec<ChatMessage> {
        let mut messages = Vec::with_capacity(2);
        if let Some(sys) = &self.system_prompt {
            messages.push(ChatMessage::system(sys.clone()));
        }
        messages.push(ChatMessage::user(doc.completion_prompt()));
        messages
    }

    pub async fn generate(&self, doc: &Document) -> anyhow::Result<LlmResponse> {
        let messages = self.messages(doc);
        let fut = self.client.complete(&messages, None);
        let resp = timeout(self.timeout, fut)
            .await
            .with_context(|| {
                format!(
                    "completion for sample {} timed out after {}s",
                    doc.sample_id,
                    self.timeout.as_secs()
                )
            })?
            .with_context(|| format!("completion for sample {} failed", doc.sample_id))?;
        Ok(resp)
    }
}
