//! Append-only run event log and its JSONL export.

use super::{BlobStore, RunStore};
use crate::model::{EvaluationRun, EventType, RunEvent};
use anyhow::Context;
use serde_json::Value;
use std::sync::Arc;

#[derive(Clone)]
pub struct EventLog {
    store: Arc<dyn RunStore>,
}

impl EventLog {
    pub fn new(store: Arc<dyn RunStore>) -> Self {
        Self { store }
    }

    pub fn append(
        &self,
        run_id: &str,
        event_type: EventType,
        payload: Value,
        sample_id: Option<&str>,
        guideline_name: Option<&str>,
    ) -> anyhow::Result<RunEvent> {
        let ev = self
            .store
            .append_event(run_id, event_type, &payload, sample_id, guideline_name)?;
        tracing::debug!(
            event = "run_event_appended",
            run_id,
            event_type = event_type.as_str(),
            sample_id = sample_id.unwrap_or(""),
            guideline = guideline_name.unwrap_or(""),
            id = ev.id,
        );
        Ok(ev)
    }

    pub fn list(&self, run_id: &str) -> anyhow::Result<Vec<RunEvent>> {
        self.store.list_events(run_id)
    }

    /// Write the full ordered event list of a run to `blobs`, returning the key.
    pub fn export(
        &self,
        blobs: &dyn BlobStore,
        run_id: &str,
        completion_model: &str,
        dataset: &str,
    ) -> anyhow::Result<String> {
        let events = self.list(run_id)?;
        write_artifact(blobs, &events, run_id, completion_model, dataset)
    }

    /// Close the log of a successful run: append `report`, export the
    /// artifact and mark the run `completed`. Either all three happen or the
    /// run stays `running` with no report event.
    pub fn complete(
        &self,
        blobs: &dyn BlobStore,
        run: &EvaluationRun,
        report: &Value,
    ) -> anyhow::Result<EvaluationRun> {
        let completed = self.store.complete_run(&run.id, report, &|events| {
            write_artifact(blobs, events, &run.id, &run.completion_model.model, &run.dataset)
                .map(|_| ())
                .context("failed to export run events")
        })?;
        Ok(completed)
    }
}

fn write_artifact(
    blobs: &dyn BlobStore,
    events: &[RunEvent],
    run_id: &str,
    completion_model: &str,
    dataset: &str,
) -> anyhow::Result<String> {
    let key = artifact_key(run_id, completion_model, dataset);
    blobs.put_text(&key, &export_jsonl(events)?)?;
    tracing::info!(
        event = "run_events_exported",
        run_id,
        key = %key,
        count = events.len(),
    );
    Ok(key)
}

/// One JSON object per line, null-valued fields dropped.
pub fn export_jsonl(events: &[RunEvent]) -> anyhow::Result<String> {
    let mut out = String::new();
    for ev in events {
        let mut v = serde_json::to_value(ev)?;
        if let Value::Object(map) = &mut v {
            map.retain(|_, val| !val.is_null());
        }
        out.push_str(&serde_json::to_string(&v)?);
        out.push('\n');
    }
    Ok(out)
}

pub fn artifact_key(run_id: &str, completion_model: &str, dataset: &str) -> String {
    format!(
        "details/{}/{}/{}.jsonl",
        completion_model.replace('/', "__"),
        dataset.replace('/', "__"),
        run_id
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{FsBlobStore, Store};
    use serde_json::json;

    fn ev(id: i64, t: EventType, sample: Option<&str>, payload: Value) -> RunEvent {
        RunEvent {
            id,
            run_id: "r1".into(),
            event_type: t,
            sample_id: sample.map(str::to_string),
            guideline_name: None,
            payload,
            created_at: "2024-01-01T00:00:00.000Z".into(),
        }
    }

    #[test]
    fn export_drops_absent_fields() {
        let out = export_jsonl(&[
            ev(1, EventType::Spec, None, json!({"dataset": "jokes"})),
            ev(2, EventType::Sampling, Some("0"), json!({"response": "ha"})),
        ])
        .unwrap();
        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].get("sample_id").is_none());
        assert!(lines[0].get("guideline_name").is_none());
        assert_eq!(lines[1]["sample_id"], "0");
        assert_eq!(lines[1]["event_type"], "sampling");
    }

    #[test]
    fn model_slashes_are_flattened_in_key() {
        assert_eq!(
            artifact_key("abc", "meta-llama/Llama-3-8B", "jokes"),
            "details/meta-llama__Llama-3-8B/jokes/abc.jsonl"
        );
    }

    struct ReadOnlyBlobs;

    impl BlobStore for ReadOnlyBlobs {
        fn get_text(&self, key: &str) -> anyhow::Result<String> {
            anyhow::bail!("{} not found", key)
        }
        fn put_text(&self, _key: &str, _content: &str) -> anyhow::Result<()> {
            anyhow::bail!("read-only file system")
        }
        fn get_secret(&self, _owner: &str, provider: &str) -> anyhow::Result<String> {
            anyhow::bail!("no secret for {}", provider)
        }
    }

    fn running(store: &Store) -> crate::model::EvaluationRun {
        store
            .create_run(&crate::storage::NewRun {
                owner: "o".into(),
                dataset: "d".into(),
                guidelines: vec![],
                completion_model: crate::model::ModelConfig::new("openai", "m"),
                judge_model: crate::model::ModelConfig::new("openai", "j"),
            })
            .unwrap()
    }

    #[test]
    fn complete_exports_log_ending_in_report() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let run = running(&store);
        let log = EventLog::new(Arc::new(store));
        log.append(&run.id, EventType::Spec, json!({}), None, None)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        let done = log.complete(&blobs, &run, &json!({"g": {}})).unwrap();
        assert_eq!(done.status, crate::model::RunStatus::Completed);

        let text = blobs.get_text(&artifact_key(&run.id, "m", "d")).unwrap();
        let last: Value = serde_json::from_str(text.lines().last().unwrap()).unwrap();
        assert_eq!(last["event_type"], "report");
        assert_eq!(last["payload"], json!({"g": {}}));
    }

    #[test]
    fn complete_keeps_run_open_when_export_fails() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let run = running(&store);
        let log = EventLog::new(Arc::new(store.clone()));

        let err = log.complete(&ReadOnlyBlobs, &run, &json!({})).unwrap_err();
        assert!(format!("{:#}", err).contains("read-only file system"));
        assert_eq!(
            store.get_run(&run.id).unwrap().status,
            crate::model::RunStatus::Running
        );
        assert!(log.list(&run.id).unwrap().is_empty());
    }

    #[test]
    fn export_writes_ordered_log_to_blob_store() {
        let store = Store::memory().unwrap();
        store.init_schema().unwrap();
        let run = store
            .create_run(&crate::storage::NewRun {
                owner: "o".into(),
                dataset: "d".into(),
                guidelines: vec![],
                completion_model: crate::model::ModelConfig::new("openai", "m"),
                judge_model: crate::model::ModelConfig::new("openai", "j"),
            })
            .unwrap();
        let log = EventLog::new(Arc::new(store));
        log.append(&run.id, EventType::Spec, json!({}), None, None)
            .unwrap();
        log.append(&run.id, EventType::Report, json!({}), None, None)
            .unwrap();

        let dir = tempfile::tempdir().unwrap();
        let blobs = FsBlobStore::new(dir.path());
        let key = log.export(&blobs, &run.id, "m", "d").unwrap();
        let text = blobs.get_text(&key).unwrap();
        let types: Vec<String> = text
            .lines()
            .map(|l| serde_json::from_str::<Value>(l).unwrap()["event_type"].to_string())
            .collect();
        assert_eq!(types, vec!["\"spec\"", "\"report\""]);
    }
}
