use super::{now_rfc3339, GuidelineStore, NewRun, RunStore};
use crate::errors::{GuidelineError, StoreError};
use crate::model::{EvaluationRun, EventType, Guideline, RunEvent, RunStatus};
use anyhow::Context;
use rusqlite::{params, Connection, OptionalExtension, Row};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// SQLite-backed run, event and guideline store.
#[derive(Clone)]
pub struct Store {
    pub(crate) conn: Arc<Mutex<Connection>>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open sqlite db {}", path.display()))?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory sqlite db")?;
        conn.execute("PRAGMA foreign_keys = ON", [])?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    pub fn init_schema(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch(crate::storage::schema::DDL)?;
        Ok(())
    }

    /// Most recent runs first.
    pub fn list_runs(&self, limit: u32) -> anyhow::Result<Vec<EvaluationRun>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM runs ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            RUN_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit], run_from_row)?;
        let mut out = Vec::new();
        for r in rows {
            out.push(r??);
        }
        Ok(out)
    }
}

const RUN_COLUMNS: &str = "id, owner, dataset, guidelines_json, completion_model_json, \
                           judge_model_json, status, summary_json, created_at";

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<anyhow::Result<EvaluationRun>> {
    let id: String = row.get(0)?;
    let owner: String = row.get(1)?;
    let dataset: String = row.get(2)?;
    let guidelines: String = row.get(3)?;
    let completion: String = row.get(4)?;
    let judge: String = row.get(5)?;
    let status: String = row.get(6)?;
    let summary: Option<String> = row.get(7)?;
    let created_at: String = row.get(8)?;

    Ok((|| -> anyhow::Result<EvaluationRun> {
        Ok(EvaluationRun {
            status: RunStatus::parse(&status)
                .ok_or_else(|| anyhow::anyhow!("run {} has unknown status {:?}", id, status))?,
            guidelines: serde_json::from_str(&guidelines)?,
            completion_model: serde_json::from_str(&completion)?,
            judge_model: serde_json::from_str(&judge)?,
            summary: summary.map(|s| serde_json::from_str(&s)).transpose()?,
            id,
            owner,
            dataset,
            created_at,
        })
    })())
}

fn event_from_row(row: &Row<'_>) -> rusqlite::Result<anyhow::Result<RunEvent>> {
    let id: i64 = row.get(0)?;
    let run_id: String = row.get(1)?;
    let event_type: String = row.get(2)?;
    let sample_id: Option<String> = row.get(3)?;
    let guideline_name: Option<String> = row.get(4)?;
    let payload: String = row.get(5)?;
    let created_at: String = row.get(6)?;

    Ok((|| -> anyhow::Result<RunEvent> {
        Ok(RunEvent {
            event_type: EventType::parse(&event_type)
                .ok_or_else(|| anyhow::anyhow!("event {} has unknown type {:?}", id, event_type))?,
            payload: serde_json::from_str(&payload)?,
            id,
            run_id,
            sample_id,
            guideline_name,
            created_at,
        })
    })())
}

fn get_run_locked(conn: &Connection, run_id: &str) -> anyhow::Result<EvaluationRun> {
    let found = conn
        .query_row(
            &format!("SELECT {} FROM runs WHERE id = ?1", RUN_COLUMNS),
            params![run_id],
            run_from_row,
        )
        .optional()?;
    match found {
        Some(run) => run,
        None => Err(StoreError::not_found("run", run_id).into()),
    }
}

impl RunStore for Store {
    fn create_run(&self, new: &NewRun) -> anyhow::Result<EvaluationRun> {
        let run = EvaluationRun {
            id: uuid::Uuid::new_v4().to_string(),
            owner: new.owner.clone(),
            dataset: new.dataset.clone(),
            guidelines: new.guidelines.clone(),
            completion_model: new.completion_model.clone(),
            judge_model: new.judge_model.clone(),
            status: RunStatus::Running,
            summary: None,
            created_at: now_rfc3339(),
        };
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO runs(id, owner, dataset, guidelines_json, completion_model_json,
                              judge_model_json, status, summary_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, NULL, ?8)",
            params![
                run.id,
                run.owner,
                run.dataset,
                serde_json::to_string(&run.guidelines)?,
                serde_json::to_string(&run.completion_model)?,
                serde_json::to_string(&run.judge_model)?,
                run.status.as_str(),
                run.created_at,
            ],
        )?;
        Ok(run)
    }

    fn update_run_status(
        &self,
        run_id: &str,
        status: RunStatus,
        summary: Option<&serde_json::Value>,
    ) -> anyhow::Result<EvaluationRun> {
        if !status.is_terminal() {
            anyhow::bail!("run {}: cannot transition back to {}", run_id, status);
        }
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        ensure_running(&tx, run_id)?;
        set_status_locked(&tx, run_id, status, summary)?;
        let updated = get_run_locked(&tx, run_id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn complete_run(
        &self,
        run_id: &str,
        report: &serde_json::Value,
        publish: &dyn Fn(&[RunEvent]) -> anyhow::Result<()>,
    ) -> anyhow::Result<EvaluationRun> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;
        ensure_running(&tx, run_id)?;
        insert_event_locked(&tx, run_id, EventType::Report, report, None, None)?;
        set_status_locked(&tx, run_id, RunStatus::Completed, Some(report))?;
        publish(&list_events_locked(&tx, run_id)?)?;
        let updated = get_run_locked(&tx, run_id)?;
        tx.commit()?;
        Ok(updated)
    }

    fn get_run(&self, run_id: &str) -> anyhow::Result<EvaluationRun> {
        let conn = self.conn.lock().unwrap();
        get_run_locked(&conn, run_id)
    }

    fn append_event(
        &self,
        run_id: &str,
        event_type: EventType,
        payload: &serde_json::Value,
        sample_id: Option<&str>,
        guideline_name: Option<&str>,
    ) -> anyhow::Result<RunEvent> {
        let conn = self.conn.lock().unwrap();
        insert_event_locked(&conn, run_id, event_type, payload, sample_id, guideline_name)
    }

    fn list_events(&self, run_id: &str) -> anyhow::Result<Vec<RunEvent>> {
        let conn = self.conn.lock().unwrap();
        list_events_locked(&conn, run_id)
    }
}

fn ensure_running(conn: &Connection, run_id: &str) -> anyhow::Result<()> {
    let current = get_run_locked(conn, run_id)?;
    if current.status.is_terminal() {
        return Err(StoreError::TerminalRun {
            run_id: run_id.to_string(),
            status: current.status.to_string(),
        }
        .into());
    }
    Ok(())
}

fn set_status_locked(
    conn: &Connection,
    run_id: &str,
    status: RunStatus,
    summary: Option<&serde_json::Value>,
) -> anyhow::Result<()> {
    let summary_json = summary.map(serde_json::to_string).transpose()?;
    conn.execute(
        "UPDATE runs SET status = ?1, summary_json = ?2 WHERE id = ?3",
        params![status.as_str(), summary_json, run_id],
    )?;
    Ok(())
}

fn insert_event_locked(
    conn: &Connection,
    run_id: &str,
    event_type: EventType,
    payload: &serde_json::Value,
    sample_id: Option<&str>,
    guideline_name: Option<&str>,
) -> anyhow::Result<RunEvent> {
    let created_at = now_rfc3339();
    conn.execute(
        "INSERT INTO events(run_id, event_type, sample_id, guideline_name, payload_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            run_id,
            event_type.as_str(),
            sample_id,
            guideline_name,
            serde_json::to_string(payload)?,
            created_at,
        ],
    )
    .with_context(|| format!("failed to append {} event to run {}", event_type.as_str(), run_id))?;
    Ok(RunEvent {
        id: conn.last_insert_rowid(),
        run_id: run_id.to_string(),
        event_type,
        sample_id: sample_id.map(str::to_string),
        guideline_name: guideline_name.map(str::to_string),
        payload: payload.clone(),
        created_at,
    })
}

fn list_events_locked(conn: &Connection, run_id: &str) -> anyhow::Result<Vec<RunEvent>> {
    let mut stmt = conn.prepare(
        "SELECT id, run_id, event_type, sample_id, guideline_name, payload_json, created_at
         FROM events WHERE run_id = ?1 ORDER BY id ASC",
    )?;
    let rows = stmt.query_map(params![run_id], event_from_row)?;
    let mut out = Vec::new();
    for r in rows {
        out.push(r??);
    }
    Ok(out)
}

impl GuidelineStore for Store {
    fn get_guideline_by_name(&self, name: &str) -> anyhow::Result<Guideline> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT name, prompt, category, scale_json FROM guidelines WHERE name = ?1",
                params![name],
                |r| {
                    Ok((
                        r.get::<_, String>(0)?,
                        r.get::<_, String>(1)?,
                        r.get::<_, String>(2)?,
                        r.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;
        let (name, prompt, category, scale) =
            row.ok_or_else(|| StoreError::not_found("guideline", name))?;
        Ok(Guideline {
            scale: serde_json::from_str(&scale)
                .with_context(|| format!("guideline {} has a corrupt scale", name))?,
            name,
            prompt,
            category,
        })
    }

    fn put_guideline(&self, guideline: &Guideline) -> anyhow::Result<()> {
        crate::guideline::validate(guideline)?;
        let conn = self.conn.lock().unwrap();
        let exists: bool = conn.query_row(
            "SELECT EXISTS(SELECT 1 FROM guidelines WHERE name = ?1)",
            params![guideline.name],
            |r| r.get(0),
        )?;
        if exists {
            return Err(GuidelineError::Duplicate(guideline.name.clone()).into());
        }
        conn.execute(
            "INSERT INTO guidelines(name, prompt, category, scale_json, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                guideline.name,
                guideline.prompt,
                guideline.category,
                serde_json::to_string(&guideline.scale)?,
                now_rfc3339(),
            ],
        )?;
        Ok(())
    }

    fn list_guidelines(&self) -> anyhow::Result<Vec<Guideline>> {
        let names: Vec<String> = {
            let conn = self.conn.lock().unwrap();
            let mut stmt = conn.prepare("SELECT name FROM guidelines ORDER BY name")?;
            let rows = stmt.query_map([], |r| r.get(0))?;
            rows.collect::<rusqlite::Result<_>>()?
        };
        names
            .iter()
            .map(|n| self.get_guideline_by_name(n))
            .collect()
    }
}
