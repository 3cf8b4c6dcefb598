//! Attempt lifecycle controller.
//!
//! Owns launch/teardown around each attempt and the retry policy: recoverable
//! failures get a fresh process while budget remains, everything else ends the run.

use super::pipeline::AttemptPipeline;
use super::post_process::ProcessedOutput;
use super::process::{AppLauncher, AppProcess, LaunchSpec};
use crate::engine::AttemptContext;
use crate::error::ExportError;
use crate::events::EventSink;
use crate::model::{Attempt, AttemptOutcome, ExportConfig};
use crate::poll::wait_until;
use crate::window::{keys, WindowAdapter, DIALOG_CLASS};

/// Environment handed to the application and the automation tool.
pub const JOB_ID_ENV: &str = "NESSTAR_JOB_ID";
pub const TARGET_SCHEMA_ENV: &str = "NESSTAR_TARGET_SCHEMA";

/// Everything a finished run has to say about itself.
#[derive(Debug)]
pub struct RunReport {
    pub attempts: Vec<Attempt>,
    pub result: Result<ProcessedOutput, ExportError>,
}

impl RunReport {
    pub fn exit_code(&self) -> i32 {
        match &self.result {
            Ok(_) => 0,
            Err(e) => e.exit_code(),
        }
    }
}

pub struct AttemptController<'a, A: WindowAdapter + ?Sized> {
    cfg: &'a ExportConfig,
    launcher: &'a dyn AppLauncher,
    adapter: &'a A,
    events: &'a dyn EventSink,
}

impl<'a, A: WindowAdapter + ?Sized> AttemptController<'a, A> {
    pub fn new(
        cfg: &'a ExportConfig,
        launcher: &'a dyn AppLauncher,
        adapter: &'a A,
        events: &'a dyn EventSink,
    ) -> Self {
        Self {
            cfg,
            launcher,
            adapter,
            events,
        }
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        let mut env = Vec::new();
        if let Some(job) = &self.cfg.job_id {
            env.push((JOB_ID_ENV.to_string(), job.clone()));
        }
        if let Some(schema) = &self.cfg.target_schema {
            env.push((TARGET_SCHEMA_ENV.to_string(), schema.clone()));
        }
        LaunchSpec {
            program: self.cfg.app_exe.clone(),
            env,
        }
    }

    /// Run attempts until one succeeds, a failure is not recoverable, or the
    /// attempt budget is spent. The process of every attempt is gone on return.
    pub async fn run<P: AttemptPipeline>(&self, pipeline: &mut P) -> RunReport {
        let max = self.cfg.max_attempts.max(1);
        let spec = self.launch_spec();
        let mut attempts = Vec::new();
        let mut index = 0;

        let result = loop {
            index += 1;
            let mut attempt = Attempt::start(index);
            self.events.log(format!(
                "attempt {index}/{max} (job {})",
                self.cfg.job_label()
            ));

            let mut process = match self.launcher.launch(&spec) {
                Ok(p) => p,
                Err(e) => {
                    attempt.outcome = Some(AttemptOutcome::from_error(&e));
                    attempts.push(attempt);
                    break Err(e);
                }
            };

            let mut ctx = AttemptContext::new(self.cfg, index, self.events);
            let outcome = pipeline.run_attempt(&mut ctx).await;
            self.teardown(process.as_mut()).await;

            match outcome {
                Ok(output) => {
                    attempt.outcome = Some(AttemptOutcome::Success);
                    attempts.push(attempt);
                    break Ok(output);
                }
                Err(e) => {
                    attempt.outcome = Some(AttemptOutcome::from_error(&e));
                    attempts.push(attempt);
                    if e.is_recoverable() && index < max {
                        tracing::warn!(attempt = index, error = %e, "attempt failed, retrying");
                        self.events.log(format!("attempt {index} failed: {e}"));
                        continue;
                    }
                    break Err(e);
                }
            }
        };

        RunReport { attempts, result }
    }

    /// Ask the application to close, kill it once the grace period is over, and
    /// wait for the kill to land.
    async fn teardown(&self, process: &mut dyn AppProcess) {
        if !process.is_alive() {
            return;
        }
        let pattern = self.cfg.main_window_title.to_lowercase();
        for window in self
            .adapter
            .find_windows(None)
            .into_iter()
            .filter(|w| w.class != DIALOG_CLASS && w.title.to_lowercase().contains(&pattern))
        {
            self.adapter.send_keys(window.handle, keys::CLOSE);
        }

        let t = &self.cfg.timings;
        let exited = wait_until(t.poll_interval, t.grace_period, || {
            (!process.is_alive()).then_some(())
        })
        .await
        .is_some();
        if exited {
            return;
        }
        tracing::warn!(pid = ?process.id(), "application still running after close request, killing");
        process.kill();
        // The next attempt must not start beside a process that is still dying.
        let reaped = wait_until(t.poll_interval, t.grace_period, || {
            (!process.is_alive()).then_some(())
        })
        .await
        .is_some();
        if !reaped {
            tracing::warn!(pid = ?process.id(), "application survived kill");
        }
    }
}
