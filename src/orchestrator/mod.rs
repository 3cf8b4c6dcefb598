//! Run orchestration.
//!
//! This module owns the run lifecycle (preflight, attempts, teardown) and the
//! post-export processing of the produced files. The CLI layer calls into
//! [`run_export`] and only renders what comes back.

mod controller;
mod pipeline;
mod post_process;
pub mod process;

pub use controller::{AttemptController, RunReport, JOB_ID_ENV, TARGET_SCHEMA_ENV};
pub use pipeline::{AttemptPipeline, ExportPipeline};
pub use post_process::ProcessedOutput;

use crate::config::preflight;
use crate::events::EventSink;
use crate::model::{DriverEvent, ExportConfig, Stage};
use crate::window::WindowAdapter;
use process::AppLauncher;
use tracing::Instrument;

/// Validate the configuration, run attempts, and emit the final result event.
pub async fn run_export<A: WindowAdapter + ?Sized>(
    cfg: &ExportConfig,
    launcher: &dyn AppLauncher,
    adapter: &A,
    events: &dyn EventSink,
) -> RunReport {
    let span = tracing::info_span!("export", job = %cfg.job_label(), format = cfg.format.as_str());
    async {
        events.stage(Stage::Started);
        let report = match preflight(cfg) {
            Ok(()) => {
                let mut pipeline = ExportPipeline::new(adapter);
                AttemptController::new(cfg, launcher, adapter, events)
                    .run(&mut pipeline)
                    .await
            }
            Err(e) => RunReport {
                attempts: Vec::new(),
                result: Err(e),
            },
        };

        // The result event terminates the stream; the summary goes first.
        for line in crate::summary::build_text_summary(cfg, &report).lines {
            events.log(line);
        }
        match &report.result {
            Ok(_) => events.emit(DriverEvent::Success),
            Err(e) => {
                tracing::error!(code = e.exit_code(), error = %e, "export failed");
                events.failure(e);
            }
        }
        report
    }
    .instrument(span)
    .await
}
