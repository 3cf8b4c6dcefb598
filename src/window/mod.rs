//! Window/Control Adapter: the only way the driver touches the desktop.
//!
//! Handles are borrowed views of external state. The application may close or
//! replace a window at any moment, so every operation reports absence instead of
//! failing, and callers re-read state on the next poll tick rather than caching.

#[cfg(any(test, feature = "test-util"))]
pub mod fake;
pub mod tool;

use std::time::Duration;

/// Window class of standard modal dialogs.
pub const DIALOG_CLASS: &str = "#32770";

/// Opaque handle to a live top-level window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct WindowRef(pub u64);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowInfo {
    pub handle: WindowRef,
    pub class: String,
    pub title: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlKind {
    TextEntry,
    Button,
    Other,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ControlInfo {
    /// Control identifier understood by the adapter (e.g. `Edit1`, `Button2`).
    pub id: String,
    pub kind: ControlKind,
    pub caption: String,
}

/// Title and controls of one window, read in a single call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowSnapshot {
    pub title: String,
    pub controls: Vec<ControlInfo>,
}

pub trait WindowAdapter: Send + Sync {
    /// Top-level windows, optionally restricted to one window class.
    fn find_windows(&self, class_filter: Option<&str>) -> Vec<WindowInfo>;

    fn foreground(&self) -> Option<WindowRef>;

    fn exists(&self, window: WindowRef) -> bool;

    /// `None` when the window vanished.
    fn snapshot(&self, window: WindowRef) -> Option<WindowSnapshot>;

    fn get_control_text(&self, window: WindowRef, control: &str) -> Option<String>;

    fn set_control_text(&self, window: WindowRef, control: &str, text: &str) -> bool;

    /// Click/press a control.
    fn invoke(&self, window: WindowRef, control: &str) -> bool;

    /// Send synthetic key input (`{ENTER}`, `{ESC}`, `^o`, `!{F4}` ...).
    fn send_keys(&self, window: WindowRef, keys: &str);

    fn activate(&self, window: WindowRef);

    fn wait_active(&self, window: WindowRef, timeout: Duration) -> bool;
}

/// Key chords used by the export workflow.
pub mod keys {
    pub const CONFIRM: &str = "{ENTER}";
    pub const CANCEL: &str = "{ESC}";
    pub const OPEN: &str = "^o";
    /// File > Export Datasets.
    pub const EXPORT: &str = "!fe";
    pub const CLOSE: &str = "!{F4}";
}
