//! Export orchestration: drives the application from its main window to a
//! closed save dialog, one poll tick at a time.

pub mod classifier;
pub mod locator;
mod save_as;
pub mod stability;

use crate::error::{ExportError, FailureCode};
use crate::events::EventSink;
use crate::model::{ExportConfig, Stage};
use crate::poll::Deadline;
use crate::window::{keys, WindowAdapter, WindowRef};
use classifier::{DialogDescriptor, Role, AFFIRMATIVE_CAPTIONS};
use locator::WindowLocator;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportState {
    Idle,
    AwaitingMainWindow,
    StudyOpened,
    ExportTriggered,
    SelectingFormat,
    AwaitingSaveAs,
    AwaitingWizard,
    DismissingUnknown,
    ConfirmingOverwrite,
    SaveAsClosed,
    Succeeded,
    Failed(FailureCode),
}

impl ExportState {
    pub fn is_terminal(self) -> bool {
        matches!(self, ExportState::Succeeded | ExportState::Failed(_))
    }
}

/// Explicit per-attempt run context threaded through every transition.
pub struct AttemptContext<'a> {
    pub cfg: &'a ExportConfig,
    pub index: u32,
    pub events: &'a dyn EventSink,
    state: ExportState,
    emitted: Vec<Stage>,
}

impl<'a> AttemptContext<'a> {
    pub fn new(cfg: &'a ExportConfig, index: u32, events: &'a dyn EventSink) -> Self {
        Self {
            cfg,
            index,
            events,
            state: ExportState::Idle,
            emitted: Vec::new(),
        }
    }

    pub fn state(&self) -> ExportState {
        self.state
    }

    pub(crate) fn transition(&mut self, next: ExportState) {
        if self.state != next {
            tracing::debug!(attempt = self.index, from = ?self.state, to = ?next, "export state");
            self.state = next;
        }
    }

    /// Emit `stage` unless this attempt already did.
    pub fn stage_once(&mut self, stage: Stage) {
        if !self.emitted.contains(&stage) {
            self.emitted.push(stage);
            self.events.stage(stage);
        }
    }
}

pub struct ExportEngine<'a, A: WindowAdapter + ?Sized> {
    adapter: &'a A,
    locator: WindowLocator<'a, A>,
    interval: Duration,
}

impl<'a, A: WindowAdapter + ?Sized> ExportEngine<'a, A> {
    pub fn new(adapter: &'a A, interval: Duration) -> Self {
        Self {
            adapter,
            locator: WindowLocator::new(adapter, interval),
            interval,
        }
    }

    /// Run the export protocol to a terminal state.
    pub async fn run(&self, ctx: &mut AttemptContext<'_>) -> Result<(), ExportError> {
        let result = self.drive(ctx).await;
        match &result {
            Ok(()) => ctx.transition(ExportState::Succeeded),
            Err(e) => ctx.transition(ExportState::Failed(e.code())),
        }
        result
    }

    async fn drive(&self, ctx: &mut AttemptContext<'_>) -> Result<(), ExportError> {
        let cfg = ctx.cfg;
        let t = &cfg.timings;

        ctx.transition(ExportState::AwaitingMainWindow);
        let main = self
            .locator
            .wait_for_main_window(&cfg.main_window_title, t.activation, t.main_window)
            .await?;
        ctx.events.log(format!("main window found (attempt {})", ctx.index));

        self.locator
            .open_study(main, &cfg.study_path, t.open_study_attempts, t.open_study)
            .await?;
        ctx.transition(ExportState::StudyOpened);

        self.adapter.activate(main);
        self.adapter.send_keys(main, keys::EXPORT);
        ctx.transition(ExportState::ExportTriggered);
        ctx.events
            .log(format!("export requested as {}", cfg.format.as_str()));

        let save_dialog = self.await_save_dialog(ctx, main).await?;
        ctx.stage_once(Stage::SavingDatasets);
        self.complete_save_as(ctx, main, &save_dialog).await?;
        ctx.transition(ExportState::SaveAsClosed);
        Ok(())
    }

    /// Handle whatever dialog is in front until the save target dialog shows up.
    async fn await_save_dialog(
        &self,
        ctx: &mut AttemptContext<'_>,
        main: WindowRef,
    ) -> Result<DialogDescriptor, ExportError> {
        let deadline = Deadline::after(ctx.cfg.timings.save_step);
        loop {
            match self.locator.active_dialog(Some(main)) {
                Some(d) if matches!(d.role, Role::SaveAsDialog | Role::PathInputDialog) => {
                    ctx.transition(ExportState::AwaitingSaveAs);
                    return Ok(d);
                }
                Some(d) if d.role == Role::ExportFormatDialog => {
                    ctx.transition(ExportState::SelectingFormat);
                    ctx.stage_once(Stage::ConfirmingExportOptions);
                    self.select_format(ctx, &d);
                }
                Some(d) if d.role == Role::WizardStep => {
                    ctx.transition(ExportState::AwaitingWizard);
                    ctx.stage_once(Stage::ConfirmingExportOptions);
                    self.advance_wizard(ctx, main, &d).await;
                }
                Some(d) if d.role == Role::OverwriteConfirmDialog => {
                    ctx.transition(ExportState::ConfirmingOverwrite);
                    self.confirm_overwrite(&d);
                }
                Some(d) => {
                    ctx.transition(ExportState::DismissingUnknown);
                    tracing::info!(title = %d.title, "dismissing unexpected dialog");
                    self.adapter.send_keys(d.handle, keys::CANCEL);
                }
                None => {
                    if let Some(fg) = self.adapter.foreground().filter(|fg| *fg != main) {
                        self.adapter.send_keys(fg, keys::CANCEL);
                    }
                }
            }

            if deadline.expired() {
                return Err(ExportError::AutomationTimeout {
                    stage: "save dialog",
                    detail: format!(
                        "no save dialog within {:?} (last state {:?})",
                        ctx.cfg.timings.save_step,
                        ctx.state()
                    ),
                });
            }
            tokio::time::sleep(self.interval).await;
        }
    }

    fn select_format(&self, ctx: &AttemptContext<'_>, dialog: &DialogDescriptor) {
        let format = ctx.cfg.format;
        self.adapter.send_keys(dialog.handle, format.selection_keys());
        let pressed = dialog
            .controls
            .primary()
            .map_or(false, |b| self.adapter.invoke(dialog.handle, &b.id));
        if !pressed {
            self.adapter.send_keys(dialog.handle, keys::CONFIRM);
        }
    }

    /// Press through wizard pages, at most `wizard_substeps` per tick.
    async fn advance_wizard(
        &self,
        ctx: &AttemptContext<'_>,
        main: WindowRef,
        wizard: &DialogDescriptor,
    ) {
        for _ in 0..ctx.cfg.timings.wizard_substeps {
            self.adapter.send_keys(wizard.handle, keys::CONFIRM);
            tokio::time::sleep(self.interval).await;
            if !self.adapter.exists(wizard.handle) {
                return;
            }
            let next = self.locator.active_dialog(Some(main)).map(|d| d.role);
            if matches!(
                next,
                Some(Role::PathInputDialog | Role::SaveAsDialog | Role::ExportFormatDialog)
            ) {
                return;
            }
        }
    }

    fn confirm_overwrite(&self, dialog: &DialogDescriptor) {
        let pressed = dialog
            .controls
            .button_matching(AFFIRMATIVE_CAPTIONS)
            .map_or(false, |b| self.adapter.invoke(dialog.handle, &b.id));
        if !pressed {
            self.adapter.send_keys(dialog.handle, keys::CONFIRM);
        }
    }
}
