//! Post-export processing.
//!
//! Moves or copies settled files from the staging directory into the output
//! directory and issues the final verdict on what landed there.

use crate::engine::stability::list_matching;
use crate::error::ExportError;
use crate::model::{FilePattern, TransferMode};
use std::path::{Path, PathBuf};

/// Placement and verdict inputs for one run.
pub(crate) struct OutputPlan<'a> {
    pub staging_dir: &'a Path,
    pub output_dir: &'a Path,
    pub pattern: &'a FilePattern,
    pub transfer: TransferMode,
    pub min_bytes: u64,
}

/// Result of a successful verdict, ready for reporting.
#[derive(Debug, Clone)]
pub struct ProcessedOutput {
    pub files: Vec<PathBuf>,
    pub total_bytes: u64,
}

/// Relocate staged files, then validate the output directory.
pub(crate) fn finalize_outputs(plan: &OutputPlan<'_>) -> Result<ProcessedOutput, ExportError> {
    let staged = list_matching(plan.staging_dir, plan.pattern).map_err(|e| {
        ExportError::Validation(format!(
            "cannot list {}: {e}",
            plan.staging_dir.display()
        ))
    })?;

    for source in &staged {
        let Some(name) = source.file_name() else {
            continue;
        };
        let dest = plan.output_dir.join(name);
        if same_path(source, &dest) {
            tracing::debug!(file = %source.display(), "already in place");
            continue;
        }
        relocate(source, &dest, plan.transfer).map_err(|e| ExportError::Relocate {
            from: source.clone(),
            to: dest.clone(),
            source: e,
        })?;
        tracing::info!(from = %source.display(), to = %dest.display(), mode = ?plan.transfer, "placed export file");
    }

    validate_output(plan.output_dir, plan.pattern, plan.min_bytes)
}

/// Success iff at least one matching data file exists and none is undersized.
pub(crate) fn validate_output(
    dir: &Path,
    pattern: &FilePattern,
    min_bytes: u64,
) -> Result<ProcessedOutput, ExportError> {
    let files = list_matching(dir, pattern)
        .map_err(|e| ExportError::Validation(format!("cannot list {}: {e}", dir.display())))?;
    if files.is_empty() {
        return Err(ExportError::Validation(format!(
            "no exported data files in {}",
            dir.display()
        )));
    }

    let mut total_bytes = 0;
    for file in &files {
        let size = std::fs::metadata(file)
            .map(|m| m.len())
            .map_err(|e| ExportError::Validation(format!("{}: {e}", file.display())))?;
        if size < min_bytes {
            return Err(ExportError::Validation(format!(
                "{} is {size} bytes, expected at least {min_bytes}",
                file.display()
            )));
        }
        total_bytes += size;
    }

    Ok(ProcessedOutput { files, total_bytes })
}

fn same_path(a: &Path, b: &Path) -> bool {
    if a == b {
        return true;
    }
    match (a.canonicalize(), b.canonicalize()) {
        (Ok(a), Ok(b)) => a == b,
        _ => false,
    }
}

fn relocate(from: &Path, to: &Path, mode: TransferMode) -> std::io::Result<()> {
    match mode {
        TransferMode::Copy => std::fs::copy(from, to).map(|_| ()),
        TransferMode::Move => match std::fs::rename(from, to) {
            Ok(()) => Ok(()),
            // Rename cannot cross filesystems.
            Err(_) => {
                std::fs::copy(from, to)?;
                std::fs::remove_file(from)
            }
        },
    }
}
