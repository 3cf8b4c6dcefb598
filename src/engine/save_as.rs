//! Completion of the save dialog: enter the target path, press save, answer an
//! overwrite prompt, and wait for the dialog to go away.

use super::classifier::{DialogDescriptor, Role};
use super::{AttemptContext, ExportEngine, ExportState};
use crate::error::ExportError;
use crate::poll::Deadline;
use crate::window::{keys, WindowAdapter, WindowRef};
use tokio::time::Instant;

const SAVE_CAPTIONS: &[&str] = &["save", "export", "ok"];

impl<'a, A: WindowAdapter + ?Sized> ExportEngine<'a, A> {
    pub(super) async fn complete_save_as(
        &self,
        ctx: &mut AttemptContext<'_>,
        main: WindowRef,
        dialog: &DialogDescriptor,
    ) -> Result<(), ExportError> {
        let cfg = ctx.cfg;
        let t = &cfg.timings;
        let target = cfg.export_target();
        let target = target.to_string_lossy();

        self.submit_save(dialog, &target);
        ctx.events.log(format!("saving to {target}"));

        let deadline = Deadline::after(t.save_close);
        let mut last_progress = Instant::now();
        loop {
            tokio::time::sleep(self.interval).await;
            if !self.adapter.exists(dialog.handle) {
                return Ok(());
            }
            if deadline.expired() {
                return Err(ExportError::AutomationTimeout {
                    stage: "save",
                    detail: format!("'{}' still open after {:?}", dialog.title, t.save_close),
                });
            }

            let prompt = self
                .locator
                .active_dialog(Some(main))
                .filter(|d| d.role == Role::OverwriteConfirmDialog);
            if let Some(prompt) = prompt {
                ctx.transition(ExportState::ConfirmingOverwrite);
                tracing::info!(title = %prompt.title, "confirming overwrite");
                self.confirm_overwrite(&prompt);
                last_progress = Instant::now();
                continue;
            }

            if last_progress.elapsed() >= t.save_reissue {
                tracing::warn!(title = %dialog.title, "save dialog did not react, re-issuing");
                self.adapter.activate(dialog.handle);
                self.submit_save(dialog, &target);
                last_progress = Instant::now();
            }
        }
    }

    fn submit_save(&self, dialog: &DialogDescriptor, target: &str) {
        if let Some(entry) = dialog.controls.text_entry.as_deref() {
            self.adapter.set_control_text(dialog.handle, entry, target);
        }
        let pressed = dialog
            .controls
            .button_matching(SAVE_CAPTIONS)
            .or_else(|| dialog.controls.primary())
            .map_or(false, |b| self.adapter.invoke(dialog.handle, &b.id));
        if !pressed {
            self.adapter.send_keys(dialog.handle, keys::CONFIRM);
        }
    }
}
