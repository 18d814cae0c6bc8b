use crate::completion::CompletionClient;
use crate::config::EngineSettings;
use crate::dataset::Document;
use crate::judge::{JudgeClient, JudgeItem};
use crate::model::{EvaluationRun, Guideline};
use crate::storage::EventLog;
use tokio::sync::watch;

/// Everything one run needs, resolved once during setup and passed to every
/// step. Nothing here outlives the run.
pub struct RunContext {
    pub run: EvaluationRun,
    pub guidelines: Vec<Guideline>,
    pub documents: Vec<Document>,
    pub completion: CompletionClient,
    pub judge: JudgeClient,
    pub events: EventLog,
    pub settings: EngineSettings,
    pub cancel: watch::Receiver<bool>,
}

impl RunContext {
    pub fn run_id(&self) -> &str {
        &self.run.id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel.borrow()
    }

    /// One judge item per guideline, in guideline order.
    pub fn judge_items(&self, completion: &str) -> Vec<JudgeItem> {
        self.guidelines
            .iter()
            .map(|g| JudgeItem {
                prompt: crate::judge::prompt::render_judge_prompt(g, completion),
                contract: g.scale.answer_contract(),
            })
            .collect()
    }
}
