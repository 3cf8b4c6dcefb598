//! Dialog classification.
//!
//! A window's role is derived from one snapshot (title + controls) through an
//! ordered rule table; the first matching rule wins. Matching is English-only.

use crate::window::{ControlKind, WindowAdapter, WindowRef, WindowSnapshot};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    PathInputDialog,
    SaveAsDialog,
    WizardStep,
    OverwriteConfirmDialog,
    ExportFormatDialog,
    GenericModal,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ButtonControl {
    pub id: String,
    /// Lowercased, trimmed, accelerator `&` removed.
    pub caption: String,
}

/// Logical control signature of a dialog.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlSignature {
    /// Control id of the first text-entry control.
    pub text_entry: Option<String>,
    /// Buttons in window order; the first one is the primary action.
    pub buttons: Vec<ButtonControl>,
}

impl ControlSignature {
    pub fn primary(&self) -> Option<&ButtonControl> {
        self.buttons.first()
    }

    /// First button whose caption contains any of `words`.
    pub fn button_matching(&self, words: &[&str]) -> Option<&ButtonControl> {
        self.buttons
            .iter()
            .find(|b| words.iter().any(|w| b.caption.contains(w)))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialogDescriptor {
    pub handle: WindowRef,
    pub role: Role,
    pub title: String,
    pub controls: ControlSignature,
}

fn normalize_caption(caption: &str) -> String {
    caption.replace('&', "").trim().to_lowercase()
}

impl From<&WindowSnapshot> for ControlSignature {
    fn from(snapshot: &WindowSnapshot) -> Self {
        let text_entry = snapshot
            .controls
            .iter()
            .find(|c| c.kind == ControlKind::TextEntry)
            .map(|c| c.id.clone());
        let buttons = snapshot
            .controls
            .iter()
            .filter(|c| c.kind == ControlKind::Button)
            .map(|c| ButtonControl {
                id: c.id.clone(),
                caption: normalize_caption(&c.caption),
            })
            .collect();
        Self {
            text_entry,
            buttons,
        }
    }
}

const SAVE_TITLES: &[&str] = &["save as", "save dataset", "export dataset"];
const WIZARD_CAPTIONS: &[&str] = &["next", "finish"];
const OVERWRITE_TITLES: &[&str] = &["confirm", "replace", "overwrite", "already exists"];
const EXPORT_CAPTIONS: &[&str] = &["ok", "next", "finish", "export"];
/// Affirmative answers of an overwrite confirmation, in preference order.
pub const AFFIRMATIVE_CAPTIONS: &[&str] = &["yes", "replace", "overwrite"];

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|n| haystack.contains(n))
}

struct Rule {
    role: Role,
    matches: fn(&str, &ControlSignature) -> bool,
}

fn is_save_as(title: &str, sig: &ControlSignature) -> bool {
    sig.text_entry.is_some() && contains_any(title, SAVE_TITLES)
}

fn is_path_input(_title: &str, sig: &ControlSignature) -> bool {
    sig.text_entry.is_some() && sig.primary().is_some()
}

fn is_wizard_step(_title: &str, sig: &ControlSignature) -> bool {
    sig.text_entry.is_none()
        && sig
            .buttons
            .iter()
            .any(|b| contains_any(&b.caption, WIZARD_CAPTIONS))
}

fn is_overwrite_confirm(title: &str, sig: &ControlSignature) -> bool {
    sig.text_entry.is_none() && contains_any(title, OVERWRITE_TITLES)
}

fn is_export_format(title: &str, sig: &ControlSignature) -> bool {
    sig.text_entry.is_none()
        && title.contains("export")
        && sig
            .primary()
            .map_or(false, |b| contains_any(&b.caption, EXPORT_CAPTIONS))
}

/// Precedence matters: the save-title rule must stay above the generic path rule.
const RULES: &[Rule] = &[
    Rule {
        role: Role::SaveAsDialog,
        matches: is_save_as,
    },
    Rule {
        role: Role::PathInputDialog,
        matches: is_path_input,
    },
    Rule {
        role: Role::WizardStep,
        matches: is_wizard_step,
    },
    Rule {
        role: Role::OverwriteConfirmDialog,
        matches: is_overwrite_confirm,
    },
    Rule {
        role: Role::ExportFormatDialog,
        matches: is_export_format,
    },
];

/// Role for a title and control signature. Pure and total.
pub fn classify(title: &str, controls: &ControlSignature) -> Role {
    let title = title.trim().to_lowercase();
    RULES
        .iter()
        .find(|rule| (rule.matches)(&title, controls))
        .map(|rule| rule.role)
        .unwrap_or(Role::GenericModal)
}

/// Describe a window from a single snapshot; `None` when it vanished.
pub fn describe<A: WindowAdapter + ?Sized>(
    adapter: &A,
    handle: WindowRef,
) -> Option<DialogDescriptor> {
    let snapshot = adapter.snapshot(handle)?;
    let controls = ControlSignature::from(&snapshot);
    Some(DialogDescriptor {
        handle,
        role: classify(&snapshot.title, &controls),
        title: snapshot.title,
        controls,
    })
}

/// Role of an optional modal; no modal at all is `Role::None`.
pub fn role_of(descriptor: Option<&DialogDescriptor>) -> Role {
    descriptor.map_or(Role::None, |d| d.role)
}
