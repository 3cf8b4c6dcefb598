//! End-of-run summaries: human lines for the event stream and a JSON record.

use crate::model::{Attempt, ExportConfig};
use crate::orchestrator::RunReport;
use anyhow::{Context, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};

/// Pre-formatted lines for text output.
pub struct TextSummary {
    pub lines: Vec<String>,
}

/// Build the closing summary of a run.
pub fn build_text_summary(cfg: &ExportConfig, report: &RunReport) -> TextSummary {
    let mut lines = Vec::new();
    lines.push(format!(
        "Job: {} / Study: {} / Format: {}",
        cfg.job_label(),
        cfg.study_path.display(),
        cfg.format.as_str()
    ));
    lines.push(format!(
        "Attempts: {} of {}",
        report.attempts.len(),
        cfg.max_attempts.max(1)
    ));
    match &report.result {
        Ok(output) => {
            lines.push(format!(
                "Output: {} file(s), {} in {}",
                output.files.len(),
                human_bytes(output.total_bytes),
                cfg.output_dir.display()
            ));
        }
        Err(e) => lines.push(format!("Failed ({}): {e}", e.exit_code())),
    }
    TextSummary { lines }
}

fn human_bytes(n: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = n as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{n} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}

/// Machine-readable record of a run.
#[derive(Debug, Serialize)]
pub struct RunSummary {
    pub job_id: Option<String>,
    pub study: PathBuf,
    pub format: &'static str,
    pub target_schema: Option<String>,
    pub exit_code: i32,
    pub success: bool,
    pub attempts: Vec<Attempt>,
    pub files: Vec<PathBuf>,
    pub total_bytes: u64,
    pub error: Option<String>,
}

impl RunSummary {
    pub fn from_report(cfg: &ExportConfig, report: &RunReport) -> Self {
        let (files, total_bytes, error) = match &report.result {
            Ok(out) => (out.files.clone(), out.total_bytes, None),
            Err(e) => (Vec::new(), 0, Some(e.to_string())),
        };
        Self {
            job_id: cfg.job_id.clone(),
            study: cfg.study_path.clone(),
            format: cfg.format.as_str(),
            target_schema: cfg.target_schema.clone(),
            exit_code: report.exit_code(),
            success: report.result.is_ok(),
            attempts: report.attempts.clone(),
            files,
            total_bytes,
            error,
        }
    }
}

pub fn export_json(path: &Path, summary: &RunSummary) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("create {}", parent.display()))?;
    }
    let json = serde_json::to_string_pretty(summary).context("serialize run summary")?;
    std::fs::write(path, json).with_context(|| format!("write {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExportError;
    use crate::model::AttemptOutcome;
    use crate::orchestrator::ProcessedOutput;

    fn cfg() -> ExportConfig {
        let mut cfg = ExportConfig::new(
            "nesstar.exe".into(),
            "lfs.nesstar".into(),
            "out".into(),
            "auto.exe".into(),
            "export.au3".into(),
        );
        cfg.job_id = Some("42".into());
        cfg
    }

    fn attempt(index: u32, outcome: AttemptOutcome) -> Attempt {
        let mut a = Attempt::start(index);
        a.outcome = Some(outcome);
        a
    }

    #[test]
    fn success_summary_lists_output() {
        let report = RunReport {
            attempts: vec![attempt(1, AttemptOutcome::Success)],
            result: Ok(ProcessedOutput {
                files: vec![PathBuf::from("out/lfs.csv")],
                total_bytes: 3 * 1024 * 1024,
            }),
        };
        let text = build_text_summary(&cfg(), &report).lines.join("\n");
        assert!(text.contains("Job: 42"));
        assert!(text.contains("Attempts: 1 of 3"));
        assert!(text.contains("1 file(s), 3.0 MiB"));
    }

    #[test]
    fn failure_summary_carries_exit_code() {
        let report = RunReport {
            attempts: Vec::new(),
            result: Err(ExportError::MissingStudy("lfs.nesstar".into())),
        };
        let summary = RunSummary::from_report(&cfg(), &report);
        assert_eq!(summary.exit_code, 11);
        assert!(!summary.success);
        assert!(summary.error.unwrap().contains("lfs.nesstar"));
        let text = build_text_summary(&cfg(), &report).lines.join("\n");
        assert!(text.contains("Failed (11)"));
    }

    #[test]
    fn json_summary_is_written() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("summary.json");
        let report = RunReport {
            attempts: vec![attempt(1, AttemptOutcome::Success)],
            result: Ok(ProcessedOutput {
                files: vec![PathBuf::from("out/lfs.csv")],
                total_bytes: 2048,
            }),
        };
        export_json(&path, &RunSummary::from_report(&cfg(), &report)).unwrap();

        let value: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["exit_code"], 0);
        assert_eq!(value["job_id"], "42");
        assert_eq!(value["attempts"][0]["outcome"], "Success");
        assert_eq!(value["total_bytes"], 2048);
    }

    #[test]
    fn human_bytes_scales() {
        assert_eq!(human_bytes(512), "512 B");
        assert_eq!(human_bytes(1536), "1.5 KiB");
    }
}
