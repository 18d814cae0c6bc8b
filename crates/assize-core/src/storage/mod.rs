//! Persistence seams used by the engine, and their default implementations.

pub mod blob;
pub mod events;
pub mod schema;
pub mod store;

pub use blob::{BlobStore, FsBlobStore};
pub use events::EventLog;
pub use store::Store;

use crate::model::{EvaluationRun, EventType, Guideline, ModelConfig, RunEvent, RunStatus};

/// Everything needed to create a run record.
#[derive(Debug, Clone)]
pub struct NewRun {
    pub owner: String,
    pub dataset: String,
    pub guidelines: Vec<String>,
    pub completion_model: ModelConfig,
    pub judge_model: ModelConfig,
}

pub trait RunStore: Send + Sync {
    /// Create a run in the `running` state.
    fn create_run(&self, new: &NewRun) -> anyhow::Result<EvaluationRun>;
    /// Move a running run to a terminal state, writing its summary.
    fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        summary: Option<&serde_json::Value>,
    ) -> anyhow::Result<EvaluationRun>;
    /// Append the `report` event and mark the run `completed` as one write.
    ///
    /// `publish` receives the full event list, report included, before the
    /// write is committed. If it or the commit fails, neither the report
    /// event nor the status change is kept.
    fn complete_run(
        &self,
        run_id: &str,
        report: &serde_json::Value,
        publish: &dyn Fn(&[RunEvent]) -> anyhow::Result<()>,
    ) -> anyhow::Result<EvaluationRun>;
    fn get_run(&self, run_id: &str) -> anyhow::Result<EvaluationRun>;
    fn append_event(
        &self,
        run_id: &str,
        event_type: EventType,
        payload: &serde_json::Value,
        sample_id: Option<&str>,
        guideline_name: Option<&str>,
    ) -> anyhow::Result<RunEvent>;
    /// Events of a run in insertion order.
    fn list_events(&self, run_id: &str) -> anyhow::Result<Vec<RunEvent>>;
}

pub trait GuidelineStore: Send + Sync {
    fn get_guideline_by_name(&self, name: &str) -> anyhow::Result<Guideline>;
    fn put_guideline(&self, guideline: &Guideline) -> anyhow::Result<()>;
    fn list_guidelines(&self) -> anyhow::Result<Vec<Guideline>>;
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
