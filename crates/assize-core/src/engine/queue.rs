use crate::dataset::FieldMapping;
use crate::model::ModelConfig;
use serde::{Deserialize, Serialize};
use std::future::Future;
use tokio::sync::{mpsc, watch};

/// What a caller asks to evaluate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunRequest {
    pub owner: String,
    pub dataset: String,
    #[serde(default)]
    pub fields: FieldMapping,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    pub guidelines: Vec<String>,
    pub completion_model: ModelConfig,
    pub judge_model: ModelConfig,
}

/// A submitted run waiting for the dispatcher.
#[derive(Debug)]
pub struct RunJob {
    pub run_id: String,
    pub request: RunRequest,
    pub cancel: watch::Receiver<bool>,
}

#[derive(Clone)]
pub struct JobQueue {
    tx: mpsc::UnboundedSender<RunJob>,
}

impl JobQueue {
    /// Start a dispatcher that hands every job to `handler` on its own task.
    /// Must be called inside a tokio runtime.
    pub fn start<H, Fut>(handler: H) -> Self
    where
        H: Fn(RunJob) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let (tx, mut rx) = mpsc::unbounded_channel::<RunJob>();
        tokio::spawn(async move {
            while let Some(job) = rx.recv().await {
                tracing::debug!(event = "run_dispatched", run_id = %job.run_id);
                tokio::spawn(handler(job));
            }
            tracing::debug!(event = "run_queue_closed");
        });
        Self { tx }
    }

    pub fn enqueue(&self, job: RunJob) -> anyhow::Result<()> {
        self.tx
            .send(job)
            .map_err(|e| anyhow::anyhow!("run queue is closed; dropped run {}", e.0.run_id))
    }
}
