use crate::model::{EvaluationRun, RunStatus};
use crate::scale::Aggregate;
use crate::summary::RunSummary;
use std::fmt::Write;

pub fn print_summary(run: &EvaluationRun) {
    eprint!("{}", render_summary(run));
}

pub fn render_summary(run: &EvaluationRun) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\nRun {} [{}] dataset={} model={} judge={}",
        run.id, run.status, run.dataset, run.completion_model.model, run.judge_model.model
    );

    match run.status {
        RunStatus::Running => {
            let _ = writeln!(out, "⏳ still running");
        }
        RunStatus::Failed => {
            let msg = run
                .summary
                .as_ref()
                .and_then(|s| s.get("error"))
                .and_then(|v| v.as_str())
                .unwrap_or("unknown error");
            let _ = writeln!(out, "❌ failed: {}", msg);
        }
        RunStatus::Completed => {
            let summary: RunSummary = match run
                .summary
                .clone()
                .map(serde_json::from_value::<RunSummary>)
                .transpose()
            {
                Ok(Some(s)) => s,
                Ok(None) => RunSummary::default(),
                Err(e) => {
                    let _ = writeln!(out, "⚠️  unreadable summary: {}", e);
                    return out;
                }
            };
            let mut degraded = 0;
            for (name, rec) in &summary.guidelines {
                let icon = if rec.failed > 0 {
                    degraded += 1;
                    "⚠️ "
                } else {
                    "✅"
                };
                let detail = match &rec.aggregate {
                    Aggregate::Numeric { mean, std } => format!("mean={:.2} std={:.2}", mean, std),
                    Aggregate::Categorical { histogram, mode } => {
                        let counts: Vec<String> =
                            histogram.iter().map(|(k, c)| format!("{}={}", k, c)).collect();
                        format!(
                            "mode={} [{}]",
                            mode.as_deref().unwrap_or("-"),
                            counts.join(" ")
                        )
                    }
                };
                let _ = writeln!(out, "{} {:<20} {}  failed={}", icon, name, detail, rec.failed);
            }
            let _ = writeln!(
                out,
                "Guidelines: {} scored, {} with failed samples",
                summary.guidelines.len(),
                degraded
            );
        }
    }
    out
}
