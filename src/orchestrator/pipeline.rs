//! One attempt from the export protocol through the output verdict.

use super::post_process::{finalize_outputs, OutputPlan, ProcessedOutput};
use crate::engine::stability::{scan, StabilityMonitor};
use crate::engine::{AttemptContext, ExportEngine};
use crate::error::ExportError;
use crate::model::Stage;
use crate::window::WindowAdapter;
use std::future::Future;

/// The work done between launching the application and tearing it down.
pub trait AttemptPipeline {
    fn run_attempt(
        &mut self,
        ctx: &mut AttemptContext<'_>,
    ) -> impl Future<Output = Result<ProcessedOutput, ExportError>>;
}

/// Drives the dialogs, waits for the output to settle and validates it.
///
/// A timed-out automation phase is not the final word: when matching output is
/// already present it is still awaited and validated, and a passing verdict makes
/// the attempt a success.
pub struct ExportPipeline<'a, A: WindowAdapter + ?Sized> {
    adapter: &'a A,
}

impl<'a, A: WindowAdapter + ?Sized> ExportPipeline<'a, A> {
    pub fn new(adapter: &'a A) -> Self {
        Self { adapter }
    }
}

impl<A: WindowAdapter + ?Sized> AttemptPipeline for ExportPipeline<'_, A> {
    async fn run_attempt(
        &mut self,
        ctx: &mut AttemptContext<'_>,
    ) -> Result<ProcessedOutput, ExportError> {
        let cfg = ctx.cfg;
        let t = &cfg.timings;
        let pattern = cfg.data_pattern();

        ctx.stage_once(Stage::ExportDialogOpened);
        let automation = ExportEngine::new(self.adapter, t.poll_interval)
            .run(ctx)
            .await;

        let automation = match automation {
            Err(e) if !e.is_recoverable() => return Err(e),
            Err(e) => {
                let staged = scan(&cfg.staging_dir, &pattern).unwrap_or_default();
                if staged.is_empty() {
                    return Err(e);
                }
                tracing::warn!(error = %e, files = staged.files().len(), "automation incomplete, checking output anyway");
                Err(e)
            }
            Ok(()) => Ok(()),
        };

        ctx.stage_once(Stage::ValidatingExportedFiles);
        let min_bytes = cfg.min_data_bytes();
        let monitor = StabilityMonitor::new(
            cfg.staging_dir.clone(),
            pattern.clone(),
            min_bytes,
            t.quiet_period,
            t.poll_interval,
        );
        let settled = monitor.await_stable(t.stability).await;

        let verdict = if settled {
            finalize_outputs(&OutputPlan {
                staging_dir: &cfg.staging_dir,
                output_dir: &cfg.output_dir,
                pattern: &pattern,
                transfer: cfg.transfer,
                min_bytes,
            })
        } else {
            Err(ExportError::Validation(format!(
                "output in {} did not settle within {:?}",
                cfg.staging_dir.display(),
                t.stability
            )))
        };

        match (automation, verdict) {
            (Ok(()), verdict) => verdict,
            (Err(e), Ok(output)) => {
                ctx.events.log(format!(
                    "automation did not finish ({e}) but the exported files validated"
                ));
                Ok(output)
            }
            // A placement failure outranks the automation timeout.
            (Err(_), Err(fatal)) if !fatal.is_recoverable() => Err(fatal),
            (Err(e), Err(_)) => Err(e),
        }
    }
}
