#![allow(dead_code)]

use assize_core::config::EngineSettings;
use assize_core::engine::{Collaborators, Orchestrator, RunRequest};
use assize_core::model::{
    ChatMessage, EvaluationRun, EventType, Guideline, LlmResponse, ModelConfig, RunEvent, RunStatus,
};
use assize_core::providers::llm::{ClientFactory, LlmClient, ResponseFormat};
use assize_core::scale::ScoringScale;
use assize_core::storage::blob::{dataset_key, secret_key};
use assize_core::storage::{BlobStore, FsBlobStore, GuidelineStore, NewRun, RunStore, Store};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

pub const OWNER: &str = "alice";

/// Completion endpoint: answers `answer-<query>`, fails for listed queries.
pub struct FakeCompletion {
    pub failing: Vec<String>,
    pub delay: Duration,
}

#[async_trait]
impl LlmClient for FakeCompletion {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        _response_format: Option<&ResponseFormat>,
    ) -> anyhow::Result<LlmResponse> {
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let query = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        if self.failing.contains(&query) {
            anyhow::bail!("upstream 500 for {}", query);
        }
        Ok(LlmResponse {
            text: format!("answer-{}", query),
            provider: "fake".into(),
            model: "completion".into(),
            meta: serde_json::Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

/// Judge endpoint: looks up the completion text inside the prompt and
/// replies with the scripted raw text. Unscripted completions fail.
pub struct FakeJudge {
    pub answers: HashMap<String, String>,
    pub prompts: Mutex<Vec<String>>,
}

#[async_trait]
impl LlmClient for FakeJudge {
    async fn complete(
        &self,
        messages: &[ChatMessage],
        response_format: Option<&ResponseFormat>,
    ) -> anyhow::Result<LlmResponse> {
        assert!(response_format.is_some(), "judge calls carry a schema");
        let prompt = messages.last().map(|m| m.content.clone()).unwrap_or_default();
        self.prompts.lock().unwrap().push(prompt.clone());
        let raw = self
            .answers
            .iter()
            .find(|(completion, _)| prompt.contains(completion.as_str()))
            .map(|(_, raw)| raw.clone())
            .ok_or_else(|| anyhow::anyhow!("judge endpoint unavailable"))?;
        Ok(LlmResponse {
            text: raw,
            provider: "fake".into(),
            model: "judge".into(),
            meta: serde_json::Value::Null,
        })
    }

    fn provider_name(&self) -> &'static str {
        "fake"
    }
}

pub struct FakeFactory {
    pub completion: Arc<FakeCompletion>,
    pub judge: Arc<FakeJudge>,
    pub keys: Mutex<Vec<String>>,
}

impl ClientFactory for FakeFactory {
    fn build(&self, cfg: &ModelConfig, api_key: String) -> anyhow::Result<Arc<dyn LlmClient>> {
        self.keys.lock().unwrap().push(api_key);
        let client: Arc<dyn LlmClient> = match cfg.model.as_str() {
            "completion" => self.completion.clone(),
            _ => self.judge.clone(),
        };
        Ok(client)
    }
}

pub struct Harness {
    pub dir: TempDir,
    pub store: Store,
    pub blobs: Arc<FsBlobStore>,
    pub judge: Arc<FakeJudge>,
    pub factory: Arc<FakeFactory>,
    pub orchestrator: Orchestrator,
}

pub struct Setup {
    pub judge_answers: Vec<(&'static str, &'static str)>,
    pub failing_queries: Vec<&'static str>,
    pub completion_delay: Duration,
    pub parallel: usize,
    /// Run store handed to the orchestrator; reads in tests go to the inner store.
    pub runs: fn(Store) -> Arc<dyn RunStore>,
    pub blobs: fn(Arc<FsBlobStore>) -> Arc<dyn BlobStore>,
}

impl Default for Setup {
    fn default() -> Self {
        Self {
            judge_answers: vec![],
            failing_queries: vec![],
            completion_delay: Duration::ZERO,
            parallel: 4,
            runs: plain_runs,
            blobs: plain_blobs,
        }
    }
}

fn plain_runs(store: Store) -> Arc<dyn RunStore> {
    Arc::new(store)
}

fn plain_blobs(blobs: Arc<FsBlobStore>) -> Arc<dyn BlobStore> {
    blobs
}

/// Run store that injects write failures into an otherwise working store.
pub struct FaultyRuns {
    pub inner: Store,
    /// Fail the `sampling` append of this sample id.
    pub sampling_of: Option<&'static str>,
    /// Fail completion after the report and status writes were issued.
    pub completion: bool,
}

impl RunStore for FaultyRuns {
    fn create_run(&self, new: &NewRun) -> anyhow::Result<EvaluationRun> {
        self.inner.create_run(new)
    }

    fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        summary: Option<&serde_json::Value>,
    ) -> anyhow::Result<EvaluationRun> {
        self.inner.update_run_status(run_id, status, summary)
    }

    fn complete_run(
        &self,
        run_id: &str,
        report: &serde_json::Value,
        publish: &dyn Fn(&[RunEvent]) -> anyhow::Result<()>,
    ) -> anyhow::Result<EvaluationRun> {
        if !self.completion {
            return self.inner.complete_run(run_id, report, publish);
        }
        self.inner
            .complete_run(run_id, report, &|events: &[RunEvent]| -> anyhow::Result<()> {
                publish(events)?;
                anyhow::bail!("database is locked")
            })
    }

    fn get_run(&self, run_id: &str) -> anyhow::Result<EvaluationRun> {
        self.inner.get_run(run_id)
    }

    fn append_event(
        &self,
        run_id: &str,
        event_type: EventType,
        payload: &serde_json::Value,
        sample_id: Option<&str>,
        guideline_name: Option<&str>,
    ) -> anyhow::Result<RunEvent> {
        if event_type == EventType::Sampling && sample_id.is_some() && sample_id == self.sampling_of {
            anyhow::bail!("disk full");
        }
        self.inner
            .append_event(run_id, event_type, payload, sample_id, guideline_name)
    }

    fn list_events(&self, run_id: &str) -> anyhow::Result<Vec<RunEvent>> {
        self.inner.list_events(run_id)
    }
}

/// Blob store that refuses to write exported run artifacts.
pub struct NoArtifacts(pub Arc<FsBlobStore>);

impl BlobStore for NoArtifacts {
    fn get_text(&self, key: &str) -> anyhow::Result<String> {
        self.0.get_text(key)
    }

    fn put_text(&self, key: &str, content: &str) -> anyhow::Result<()> {
        if key.starts_with("details/") {
            anyhow::bail!("quota exceeded writing {}", key);
        }
        self.0.put_text(key, content)
    }

    fn get_secret(&self, owner: &str, provider: &str) -> anyhow::Result<String> {
        self.0.get_secret(owner, provider)
    }
}

pub fn harness(setup: Setup) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let blobs = Arc::new(FsBlobStore::new(dir.path().join("blobs")).without_env_secrets());
    blobs.put_text(&secret_key(OWNER, "openai"), "sk-test\n").unwrap();

    let judge = Arc::new(FakeJudge {
        answers: setup
            .judge_answers
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect(),
        prompts: Mutex::new(vec![]),
    });
    let factory = Arc::new(FakeFactory {
        completion: Arc::new(FakeCompletion {
            failing: setup.failing_queries.into_iter().map(str::to_string).collect(),
            delay: setup.completion_delay,
        }),
        judge: judge.clone(),
        keys: Mutex::new(vec![]),
    });

    let settings = EngineSettings {
        parallel: setup.parallel,
        judge_parallel: 3,
        max_attempts: 2,
        backoff_ms: 1,
        timeout_seconds: 5,
        ..EngineSettings::default()
    };
    let deps = Collaborators {
        runs: (setup.runs)(store.clone()),
        guidelines: Arc::new(store.clone()),
        blobs: (setup.blobs)(blobs.clone()),
        clients: factory.clone(),
    };
    let orchestrator = Orchestrator::new(deps, settings).unwrap();

    Harness {
        dir,
        store,
        blobs,
        judge,
        factory,
        orchestrator,
    }
}

impl Harness {
    pub fn dataset(&self, name: &str, queries: &[&str]) {
        let content: String = queries
            .iter()
            .map(|q| format!("{}\n", serde_json::json!({ "query": q })))
            .collect();
        self.blobs.put_text(&dataset_key(name), &content).unwrap();
    }

    pub fn guideline(&self, name: &str, scale: ScoringScale) {
        self.store
            .put_guideline(&Guideline {
                name: name.into(),
                prompt: format!("Judge '{}' for this response:\n{{completion}}", name),
                category: "test".into(),
                scale,
            })
            .unwrap();
    }

    pub fn request(&self, dataset: &str, guidelines: &[&str]) -> RunRequest {
        RunRequest {
            owner: OWNER.into(),
            dataset: dataset.into(),
            fields: Default::default(),
            limit: None,
            guidelines: guidelines.iter().map(|g| g.to_string()).collect(),
            completion_model: ModelConfig::new("openai", "completion"),
            judge_model: ModelConfig::new("openai", "judge"),
        }
    }

    pub async fn run_to_end(&self, request: RunRequest) -> EvaluationRun {
        let id = self.orchestrator.submit_run(request).unwrap();
        self.wait(&id).await
    }

    pub async fn wait(&self, run_id: &str) -> EvaluationRun {
        tokio::time::timeout(
            Duration::from_secs(10),
            self.orchestrator
                .wait_for_run(run_id, Duration::from_millis(10)),
        )
        .await
        .expect("run did not finish in time")
        .unwrap()
    }

    pub fn events(&self, run_id: &str) -> Vec<RunEvent> {
        self.store.list_events(run_id).unwrap()
    }
}
