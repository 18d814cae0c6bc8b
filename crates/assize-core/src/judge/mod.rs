//! Judge client: scores completions against guidelines with a second model.

pub mod parse;
pub mod prompt;
pub mod retry;

use crate::errors::JudgeError;
use crate::providers::llm::{LlmClient, ResponseFormat};
use crate::scale::{AnswerContract, Score};
use retry::{RetryError, RetryPolicy};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio::time::timeout;

#[derive(Clone, Debug)]
pub struct JudgeRuntimeConfig {
    pub retry: RetryPolicy,
    /// Upper bound on judge calls in flight, shared by every batch.
    pub parallel: usize,
    pub timeout: Duration,
}

impl Default for JudgeRuntimeConfig {
    fn default() -> Self {
        Self {
            retry: RetryPolicy::default(),
            parallel: 10,
            timeout: Duration::from_secs(60),
        }
    }
}

/// One prompt to score and the contract its answer must satisfy.
#[derive(Debug, Clone)]
pub struct JudgeItem {
    pub prompt: String,
    pub contract: AnswerContract,
}

/// Result for one [`JudgeItem`]. Always carries the prompt that was sent;
/// carries the raw response whenever the endpoint answered at all.
#[derive(Debug, Clone)]
pub struct JudgeOutcome {
    pub prompt: String,
    pub raw_response: Option<String>,
    pub result: Result<Score, JudgeError>,
}

impl JudgeOutcome {
    pub fn score(&self) -> Option<&Score> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&JudgeError> {
        self.result.as_ref().err()
    }
}

struct AttemptFailure {
    error: JudgeError,
    raw: Option<String>,
}

impl std::fmt::Display for AttemptFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

#[derive(Clone)]
pub struct JudgeClient {
    config: JudgeRuntimeConfig,
    client: Arc<dyn LlmClient>,
    pool: Arc<Semaphore>,
}

impl JudgeClient {
    pub fn new(config: JudgeRuntimeConfig, client: Arc<dyn LlmClient>) -> Self {
        let pool = Arc::new(Semaphore::new(config.parallel.max(1)));
        Self {
            config,
            client,
            pool,
        }
    }

    /// Score every item. Returns exactly one outcome per item, in input order.
    /// A failing item never fails its neighbours.
    pub async fn evaluate_batch(&self, items: Vec<JudgeItem>) -> Vec<JudgeOutcome> {
        let mut handles = Vec::with_capacity(items.len());
        let mut prompts = Vec::with_capacity(items.len());

        for item in items {
            prompts.push(item.prompt.clone());
            let this = self.clone();
            handles.push(tokio::spawn(async move {
                // the pool is never closed, so acquire only fails if it were
                let _permit = match this.pool.clone().acquire_owned().await {
                    Ok(p) => p,
                    Err(e) => {
                        return JudgeOutcome {
                            prompt: item.prompt,
                            raw_response: None,
                            result: Err(JudgeError::Transport(format!("judge pool closed: {}", e))),
                        }
                    }
                };
                this.evaluate_one(item).await
            }));
        }

        let mut outcomes = Vec::with_capacity(handles.len());
        for (h, prompt) in handles.into_iter().zip(prompts) {
            let outcome = match h.await {
                Ok(o) => o,
                Err(e) => JudgeOutcome {
                    prompt,
                    raw_response: None,
                    result: Err(JudgeError::Transport(format!("judge task failed: {}", e))),
                },
            };
            outcomes.push(outcome);
        }
        outcomes
    }

    /// Score one item with retries; no concurrency limit applied here.
    pub async fn evaluate_one(&self, item: JudgeItem) -> JudgeOutcome {
        let messages = prompt::judge_messages(&item.prompt);
        let format = ResponseFormat {
            name: "judge_answer".to_string(),
            schema: item.contract.json_schema(),
        };
        let messages = &messages;
        let format = &format;
        let contract = &item.contract;

        let result = self
            .config
            .retry
            .run("judge", |_attempt| async move {
                let resp = match timeout(
                    self.config.timeout,
                    self.client.complete(messages, Some(format)),
                )
                .await
                {
                    Err(_) => {
                        return Err(AttemptFailure {
                            error: JudgeError::Transport(format!(
                                "timed out after {}s",
                                self.config.timeout.as_secs()
                            )),
                            raw: None,
                        })
                    }
                    Ok(Err(e)) => {
                        return Err(AttemptFailure {
                            error: JudgeError::Transport(format!("{:#}", e)),
                            raw: None,
                        })
                    }
                    Ok(Ok(resp)) => resp,
                };
                match parse::parse_answer(&resp.text, contract) {
                    Ok(score) => Ok((score, resp.text)),
                    Err(msg) => Err(AttemptFailure {
                        error: JudgeError::Contract(msg),
                        raw: Some(resp.text),
                    }),
                }
            })
            .await;

        match result {
            Ok((score, raw)) => JudgeOutcome {
                prompt: item.prompt,
                raw_response: Some(raw),
                result: Ok(score),
            },
            Err(RetryError { attempts, last }) => JudgeOutcome {
                prompt: item.prompt,
                raw_response: last.raw,
                result: Err(JudgeError::Exhausted {
                    attempts,
                    last: Box::new(last.error),
                }),
            },
        }
    }
}
