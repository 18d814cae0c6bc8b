use assize_core::errors::StoreError;
use assize_core::model::{EventType, Guideline, ModelConfig, RunStatus};
use assize_core::scale::ScoringScale;
use assize_core::storage::{GuidelineStore, NewRun, RunStore, Store};
use serde_json::json;

fn new_run(dataset: &str) -> NewRun {
    NewRun {
        owner: "alice".into(),
        dataset: dataset.into(),
        guidelines: vec!["humor".into()],
        completion_model: ModelConfig::new("openai", "gpt-4o-mini"),
        judge_model: ModelConfig::new("openai", "gpt-4o"),
    }
}

#[test]
fn file_backed_store_survives_reopen() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("assize.db");

    let run_id = {
        let store = Store::open(&path).unwrap();
        store.init_schema().unwrap();
        let run = store.create_run(&new_run("jokes")).unwrap();
        store
            .append_event(&run.id, EventType::Spec, &json!({"n": 1}), None, None)
            .unwrap();
        store
            .append_event(
                &run.id,
                EventType::Judge,
                &json!({"score": 7}),
                Some("0"),
                Some("humor"),
            )
            .unwrap();
        store
            .put_guideline(&Guideline {
                name: "humor".into(),
                prompt: "Rate: {completion}".into(),
                category: "style".into(),
                scale: ScoringScale::Percentage,
            })
            .unwrap();
        run.id
    };

    let store = Store::open(&path).unwrap();
    store.init_schema().unwrap();
    let run = store.get_run(&run_id).unwrap();
    assert_eq!(run.status, RunStatus::Running);
    assert_eq!(run.dataset, "jokes");
    assert_eq!(run.completion_model.model, "gpt-4o-mini");

    let events = store.list_events(&run_id).unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].id < events[1].id);
    assert_eq!(events[1].guideline_name.as_deref(), Some("humor"));
    assert_eq!(events[1].payload["score"], 7);

    assert_eq!(
        store.get_guideline_by_name("humor").unwrap().scale,
        ScoringScale::Percentage
    );
}

#[test]
fn events_are_scoped_per_run_and_runs_listed_newest_first() {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let a = store.create_run(&new_run("a")).unwrap();
    let b = store.create_run(&new_run("b")).unwrap();
    store
        .append_event(&a.id, EventType::Spec, &json!({}), None, None)
        .unwrap();

    assert_eq!(store.list_events(&a.id).unwrap().len(), 1);
    assert!(store.list_events(&b.id).unwrap().is_empty());

    let runs = store.list_runs(10).unwrap();
    assert_eq!(runs.len(), 2);
    assert_eq!(runs[0].id, b.id);
}

#[test]
fn invalid_guideline_never_reaches_the_store() {
    let store = Store::memory().unwrap();
    store.init_schema().unwrap();
    let bad = Guideline {
        name: "range".into(),
        prompt: "{completion}".into(),
        category: String::new(),
        scale: ScoringScale::Numeric {
            min_value: 5,
            max_value: 1,
        },
    };
    assert!(store.put_guideline(&bad).is_err());
    let err = store.get_guideline_by_name("range").unwrap_err();
    assert!(matches!(
        err.downcast_ref::<StoreError>(),
        Some(StoreError::NotFound {
            kind: "guideline",
            ..
        })
    ));
}
