pub const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS runs (
  id TEXT PRIMARY KEY,
  owner TEXT NOT NULL,
  dataset TEXT NOT NULL,
  guidelines_json TEXT NOT NULL,
  completion_model_json TEXT NOT NULL,
  judge_model_json TEXT NOT NULL,
  status TEXT NOT NULL,
  summary_json TEXT,
  created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS events (
  id INTEGER PRIMARY KEY AUTOINCREMENT,
  run_id TEXT NOT NULL REFERENCES runs(id),
  event_type TEXT NOT NULL,
  sample_id TEXT,
  guideline_name TEXT,
  payload_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_events_run ON events(run_id, id);

CREATE TABLE IF NOT EXISTS guidelines (
  name TEXT PRIMARY KEY,
  prompt TEXT NOT NULL,
  category TEXT NOT NULL,
  scale_json TEXT NOT NULL,
  created_at TEXT NOT NULL
);
"#;
