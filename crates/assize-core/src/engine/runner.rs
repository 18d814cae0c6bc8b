use super::context::RunContext;
use super::queue::{JobQueue, RunJob, RunRequest};
use crate::completion::CompletionClient;
use crate::config::EngineSettings;
use crate::dataset::parse_jsonl;
use crate::judge::{JudgeClient, JudgeOutcome};
use crate::model::{EvaluationRun, EventType, RunStatus};
use crate::providers::llm::{ClientFactory, OpenAiCompatibleFactory};
use crate::scale::Score;
use crate::storage::blob::dataset_key;
use crate::storage::{BlobStore, EventLog, GuidelineStore, NewRun, RunStore, Store};
use crate::summary::{RunSummary, ScoreBook};
use anyhow::Context;
use serde_json::json;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;
use tokio::time::{Duration, Instant};

/// Error message stored on runs stopped through [`Orchestrator::cancel_run`].
pub const CANCELLED: &str = "cancelled";

/// External services a run depends on.
#[derive(Clone)]
pub struct Collaborators {
    pub runs: Arc<dyn RunStore>,
    pub guidelines: Arc<dyn GuidelineStore>,
    pub blobs: Arc<dyn BlobStore>,
    pub clients: Arc<dyn ClientFactory>,
}

impl Collaborators {
    /// SQLite store for runs and guidelines, OpenAI-compatible endpoints.
    pub fn new(store: Store, blobs: Arc<dyn BlobStore>) -> Self {
        Self {
            runs: Arc::new(store.clone()),
            guidelines: Arc::new(store),
            blobs,
            clients: Arc::new(OpenAiCompatibleFactory),
        }
    }
}

/// Accepts runs, executes each in the background and answers status queries.
#[derive(Clone)]
pub struct Orchestrator {
    engine: Arc<Engine>,
    queue: JobQueue,
}

struct Engine {
    deps: Collaborators,
    settings: EngineSettings,
    cancels: Mutex<HashMap<String, watch::Sender<bool>>>,
}

#[derive(Debug, Default)]
struct SampleOutcome {
    scores: Vec<(String, Score)>,
}

struct SampleBatch {
    outcomes: Vec<SampleOutcome>,
    skipped: usize,
}

impl Orchestrator {
    /// Must be called inside a tokio runtime: starts the run dispatcher.
    pub fn new(deps: Collaborators, settings: EngineSettings) -> anyhow::Result<Self> {
        settings.validate()?;
        let engine = Arc::new(Engine {
            deps,
            settings,
            cancels: Mutex::new(HashMap::new()),
        });
        let worker = engine.clone();
        let queue = JobQueue::start(move |job| {
            let engine = worker.clone();
            async move { engine.execute(job).await }
        });
        Ok(Self { engine, queue })
    }

    /// Create a `running` run and queue it. Returns without waiting for it.
    pub fn submit_run(&self, request: RunRequest) -> anyhow::Result<String> {
        let run = self.engine.deps.runs.create_run(&NewRun {
            owner: request.owner.clone(),
            dataset: request.dataset.clone(),
            guidelines: request.guidelines.clone(),
            completion_model: request.completion_model.clone(),
            judge_model: request.judge_model.clone(),
        })?;
        let (tx, rx) = watch::channel(false);
        self.engine.cancels().insert(run.id.clone(), tx);
        tracing::info!(
            event = "run_submitted",
            run_id = %run.id,
            dataset = %run.dataset,
            guidelines = run.guidelines.len(),
        );

        let job = RunJob {
            run_id: run.id.clone(),
            request,
            cancel: rx,
        };
        if let Err(e) = self.queue.enqueue(job) {
            self.engine.fail_run(&run.id, &e);
            return Err(e);
        }
        Ok(run.id)
    }

    pub fn get_run(&self, run_id: &str) -> anyhow::Result<EvaluationRun> {
        self.engine.deps.runs.get_run(run_id)
    }

    pub fn events(&self) -> EventLog {
        EventLog::new(self.engine.deps.runs.clone())
    }

    /// Ask a running run to stop. Samples already in flight finish; the rest
    /// are skipped and the run ends `failed`. Returns false when the run is
    /// no longer active.
    pub fn cancel_run(&self, run_id: &str) -> anyhow::Result<bool> {
        let run = self.get_run(run_id)?;
        if run.status.is_terminal() {
            return Ok(false);
        }
        match self.engine.cancels().get(run_id) {
            Some(tx) => {
                tx.send_replace(true);
                tracing::info!(event = "run_cancel_requested", run_id);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Poll until the run reaches a terminal state.
    pub async fn wait_for_run(&self, run_id: &str, poll: Duration) -> anyhow::Result<EvaluationRun> {
        loop {
            let run = self.get_run(run_id)?;
            if run.status.is_terminal() {
                return Ok(run);
            }
            tokio::time::sleep(poll).await;
        }
    }
}

impl Engine {
    fn cancels(&self) -> MutexGuard<'_, HashMap<String, watch::Sender<bool>>> {
        self.cancels.lock().unwrap_or_else(|p| p.into_inner())
    }

    async fn execute(self: Arc<Self>, job: RunJob) {
        let run_id = job.run_id.clone();
        let started = Instant::now();
        tracing::info!(event = "run_started", run_id = %run_id);

        match self.drive(job).await {
            Ok(summary) => tracing::info!(
                event = "run_completed",
                run_id = %run_id,
                guidelines = summary.guidelines.len(),
                duration_ms = started.elapsed().as_millis() as u64,
            ),
            Err(e) => self.fail_run(&run_id, &e),
        }
        self.cancels().remove(&run_id);
    }

    async fn drive(&self, job: RunJob) -> anyhow::Result<RunSummary> {
        let ctx = Arc::new(self.setup(job)?);
        self.emit_spec(&ctx)?;

        let batch = process_samples(&ctx).await?;
        if batch.skipped > 0 {
            tracing::warn!(
                event = "run_cancelled",
                run_id = ctx.run_id(),
                skipped = batch.skipped,
            );
            anyhow::bail!(CANCELLED);
        }

        let mut book = ScoreBook::default();
        for outcome in batch.outcomes {
            for (guideline, score) in outcome.scores {
                book.record(&guideline, score);
            }
        }
        let summary = book
            .summarize(&ctx.guidelines, ctx.documents.len())
            .context("failed to aggregate scores")?;

        self.finalize(&ctx, &summary)?;
        Ok(summary)
    }

    /// Resolve credentials, dataset and guidelines. Any failure here fails
    /// the run before a single sample is processed.
    fn setup(&self, job: RunJob) -> anyhow::Result<RunContext> {
        let req = &job.request;
        let deps = &self.deps;

        let completion_key = deps
            .blobs
            .get_secret(&req.owner, &req.completion_model.provider)
            .with_context(|| {
                format!("no credentials for completion provider {}", req.completion_model.provider)
            })?;
        let judge_key = deps
            .blobs
            .get_secret(&req.owner, &req.judge_model.provider)
            .with_context(|| format!("no credentials for judge provider {}", req.judge_model.provider))?;
        let completion_llm = deps.clients.build(&req.completion_model, completion_key)?;
        let judge_llm = deps.clients.build(&req.judge_model, judge_key)?;

        let content = deps
            .blobs
            .get_text(&dataset_key(&req.dataset))
            .with_context(|| format!("failed to load dataset {}", req.dataset))?;
        let documents = parse_jsonl(&content, &req.fields, req.limit)
            .with_context(|| format!("failed to parse dataset {}", req.dataset))?;

        if req.guidelines.is_empty() {
            anyhow::bail!("run has no guidelines");
        }
        let guidelines = req
            .guidelines
            .iter()
            .map(|name| {
                deps.guidelines
                    .get_guideline_by_name(name)
                    .with_context(|| format!("failed to load guideline {}", name))
            })
            .collect::<anyhow::Result<Vec<_>>>()?;
        crate::guideline::validate_all(&guidelines)?;

        let run = deps.runs.get_run(&job.run_id)?;
        tracing::info!(
            event = "run_setup_done",
            run_id = %run.id,
            samples = documents.len(),
            guidelines = guidelines.len(),
        );

        Ok(RunContext {
            run,
            guidelines,
            documents,
            completion: CompletionClient::new(
                completion_llm,
                req.completion_model.system_prompt.clone(),
                self.settings.timeout(),
            ),
            judge: JudgeClient::new(self.settings.judge_runtime(), judge_llm),
            events: EventLog::new(deps.runs.clone()),
            settings: self.settings.clone(),
            cancel: job.cancel,
        })
    }

    fn emit_spec(&self, ctx: &RunContext) -> anyhow::Result<()> {
        let names: Vec<&str> = ctx.guidelines.iter().map(|g| g.name.as_str()).collect();
        let payload = json!({
            "dataset": ctx.run.dataset,
            "guidelines": names,
            "completion_model": ctx.run.completion_model,
            "judge_model": ctx.run.judge_model,
            "sample_count": ctx.documents.len(),
            "settings": {
                "parallel": ctx.settings.parallel,
                "judge_parallel": ctx.settings.judge_parallel,
                "max_attempts": ctx.settings.max_attempts,
                "backoff_ms": ctx.settings.backoff_ms,
                "timeout_seconds": ctx.settings.timeout_seconds,
            },
        });
        ctx.events
            .append(ctx.run_id(), EventType::Spec, payload, None, None)?;
        Ok(())
    }

    fn finalize(&self, ctx: &RunContext, summary: &RunSummary) -> anyhow::Result<()> {
        let value = summary.to_value()?;
        ctx.events
            .complete(self.deps.blobs.as_ref(), &ctx.run, &value)
            .context("failed to finalize run")?;
        Ok(())
    }

    fn fail_run(&self, run_id: &str, err: &anyhow::Error) {
        let message = format!("{:#}", err);
        tracing::error!(event = "run_failed", run_id, error = %message);

        if let Err(e) = self.deps.runs.append_event(
            run_id,
            EventType::Error,
            &json!({ "stage": "run", "error": message }),
            None,
            None,
        ) {
            tracing::warn!(event = "run_error_event_failed", run_id, error = %e);
        }
        let summary = json!({ "error": message, "trace": format!("{:?}", err) });
        if let Err(e) = self
            .deps
            .runs
            .update_run_status(run_id, RunStatus::Failed, Some(&summary))
        {
            tracing::error!(event = "run_status_update_failed", run_id, error = %e);
        }
    }
}

/// Run every sample with at most `settings.parallel` in flight. Outcomes come
/// back in dataset order. On the first sample error every other sample task
/// is aborted and awaited before the error is returned.
async fn process_samples(ctx: &Arc<RunContext>) -> anyhow::Result<SampleBatch> {
    let total = ctx.documents.len();
    let sem = Arc::new(Semaphore::new(ctx.settings.parallel.max(1)));
    let mut tasks = JoinSet::new();
    let mut skipped = 0;

    for index in 0..total {
        let permit = sem.clone().acquire_owned().await?;
        if ctx.is_cancelled() {
            skipped = total - index;
            break;
        }
        let ctx = ctx.clone();
        tasks.spawn(async move {
            let _permit = permit;
            (index, process_sample(&ctx, index).await)
        });
    }

    let mut outcomes = Vec::with_capacity(tasks.len());
    while let Some(joined) = tasks.join_next().await {
        let failure = match joined {
            Ok((index, Ok(outcome))) => {
                outcomes.push((index, outcome));
                continue;
            }
            Ok((_, Err(e))) => e,
            Err(e) => anyhow::Error::new(e).context("sample task panicked"),
        };
        tasks.shutdown().await;
        return Err(failure);
    }
    outcomes.sort_by_key(|(index, _)| *index);
    Ok(SampleBatch {
        outcomes: outcomes.into_iter().map(|(_, o)| o).collect(),
        skipped,
    })
}

/// Completion, then one judge event per guideline. A completion failure is
/// recorded and swallowed; event-log failures propagate.
async fn process_sample(ctx: &RunContext, index: usize) -> anyhow::Result<SampleOutcome> {
    let doc = &ctx.documents[index];
    let run_id = ctx.run_id();
    let sample_id = doc.sample_id.as_str();

    let response = match ctx.completion.generate(doc).await {
        Ok(r) => r,
        Err(e) => {
            let message = format!("{:#}", e);
            tracing::warn!(event = "sample_failed", run_id, sample_id, error = %message);
            ctx.events.append(
                run_id,
                EventType::Error,
                json!({ "stage": "completion", "error": message }),
                Some(sample_id),
                None,
            )?;
            return Ok(SampleOutcome::default());
        }
    };

    ctx.events.append(
        run_id,
        EventType::Sampling,
        json!({
            "query": doc.query,
            "prompt": doc.completion_prompt(),
            "target": doc.target,
            "response": response.text,
            "model": response.model,
        }),
        Some(sample_id),
        None,
    )?;

    let outcomes = ctx.judge.evaluate_batch(ctx.judge_items(&response.text)).await;
    let mut scores = Vec::with_capacity(outcomes.len());
    for (guideline, outcome) in ctx.guidelines.iter().zip(outcomes) {
        ctx.events.append(
            run_id,
            EventType::Judge,
            judge_payload(&outcome),
            Some(sample_id),
            Some(&guideline.name),
        )?;
        match outcome.result {
            Ok(score) => scores.push((guideline.name.clone(), score)),
            Err(e) => tracing::warn!(
                event = "judge_item_failed",
                run_id,
                sample_id,
                guideline = %guideline.name,
                kind = e.kind(),
                error = %e,
            ),
        }
    }
    Ok(SampleOutcome { scores })
}

fn judge_payload(outcome: &JudgeOutcome) -> serde_json::Value {
    let mut payload = json!({
        "prompt": outcome.prompt,
        "raw_response": outcome.raw_response,
    });
    match &outcome.result {
        Ok(score) => payload["score"] = json!(score),
        Err(e) => {
            payload["error"] = json!(e.to_string());
            payload["error_kind"] = json!(e.kind());
        }
    }
    payload
}
