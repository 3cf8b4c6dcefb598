//! Finding the application's main window and its live modal dialogs.

use super::classifier::{describe, DialogDescriptor, Role};
use crate::error::ExportError;
use crate::poll::wait_until;
use crate::window::{keys, WindowAdapter, WindowRef, DIALOG_CLASS};
use std::path::Path;
use std::time::Duration;

pub struct WindowLocator<'a, A: WindowAdapter + ?Sized> {
    adapter: &'a A,
    interval: Duration,
}

impl<'a, A: WindowAdapter + ?Sized> WindowLocator<'a, A> {
    pub fn new(adapter: &'a A, interval: Duration) -> Self {
        Self { adapter, interval }
    }

    /// The modal dialog currently in front, classified from a fresh snapshot.
    ///
    /// Prefers the foreground window when it is a dialog; otherwise the topmost
    /// dialog that is not `main`.
    pub fn active_dialog(&self, main: Option<WindowRef>) -> Option<DialogDescriptor> {
        let dialogs: Vec<WindowRef> = self
            .adapter
            .find_windows(Some(DIALOG_CLASS))
            .into_iter()
            .map(|w| w.handle)
            .filter(|h| Some(*h) != main)
            .collect();
        let foreground = self.adapter.foreground().filter(|f| dialogs.contains(f));
        foreground
            .into_iter()
            .chain(dialogs.iter().rev().copied())
            .find_map(|h| describe(self.adapter, h))
    }

    /// Wait for a window whose title contains `title_pattern` (case-insensitive)
    /// and confirm it has focus.
    ///
    /// Unrelated generic modals that show up meanwhile (splash notices, tips)
    /// are dismissed with a cancel keystroke to the foreground window.
    pub async fn wait_for_main_window(
        &self,
        title_pattern: &str,
        per_poll_timeout: Duration,
        total_timeout: Duration,
    ) -> Result<WindowRef, ExportError> {
        let pattern = title_pattern.to_lowercase();
        let found = wait_until(self.interval, total_timeout, || {
            let candidate = self
                .adapter
                .find_windows(None)
                .into_iter()
                .find(|w| w.class != DIALOG_CLASS && w.title.to_lowercase().contains(&pattern));
            match candidate {
                Some(w) => {
                    self.adapter.activate(w.handle);
                    if self.adapter.wait_active(w.handle, per_poll_timeout) {
                        return Some(w.handle);
                    }
                    self.dismiss_generic(Some(w.handle));
                    None
                }
                None => {
                    self.dismiss_generic(None);
                    None
                }
            }
        })
        .await;

        found.ok_or_else(|| ExportError::AutomationTimeout {
            stage: "main window",
            detail: format!("no window titled like '{title_pattern}' within {total_timeout:?}"),
        })
    }

    fn dismiss_generic(&self, main: Option<WindowRef>) {
        if let Some(dialog) = self.active_dialog(main) {
            if dialog.role == Role::GenericModal {
                tracing::info!(title = %dialog.title, "dismissing unrelated dialog");
                if let Some(fg) = self.adapter.foreground() {
                    self.adapter.send_keys(fg, keys::CANCEL);
                }
            }
        }
    }

    /// Open `study` through the application's open-file dialog.
    ///
    /// Each attempt re-issues the open command and waits up to `per_attempt_timeout`
    /// for a path dialog. Exhausting all attempts is fatal: without the study
    /// there is nothing to export.
    pub async fn open_study(
        &self,
        main: WindowRef,
        study: &Path,
        max_attempts: u32,
        per_attempt_timeout: Duration,
    ) -> Result<(), ExportError> {
        let path = study.to_string_lossy();
        for attempt in 1..=max_attempts {
            self.adapter.activate(main);
            self.adapter.send_keys(main, keys::OPEN);

            let dialog = wait_until(self.interval, per_attempt_timeout, || {
                self.active_dialog(Some(main))
                    .filter(|d| d.role == Role::PathInputDialog)
            })
            .await;

            let Some(dialog) = dialog else {
                tracing::warn!(attempt, "open dialog did not appear");
                continue;
            };
            let Some(entry) = dialog.controls.text_entry.as_deref() else {
                continue;
            };
            if !self.adapter.set_control_text(dialog.handle, entry, &path) {
                tracing::warn!(attempt, "open dialog vanished before the path was entered");
                continue;
            }
            self.adapter.send_keys(dialog.handle, keys::CONFIRM);
            tracing::info!(attempt, study = %path, "study submitted");
            return Ok(());
        }
        Err(ExportError::StudyOpenFailed {
            attempts: max_attempts,
        })
    }
}
