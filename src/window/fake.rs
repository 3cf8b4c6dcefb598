//! Deterministic in-memory desktop for tests.
//!
//! Windows live in a z-ordered stack (last = foreground). Scripted reactions fire
//! synchronously when the driver sends keys to or invokes a control on a window
//! with a given title, which is enough to replay any dialog sequence.

use super::{
    ControlInfo, ControlKind, WindowAdapter, WindowInfo, WindowRef, WindowSnapshot, DIALOG_CLASS,
};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

pub const MAIN_CLASS: &str = "NesstarExplorerMain";

#[derive(Debug, Clone)]
pub struct FakeWindow {
    class: String,
    title: String,
    controls: Vec<ControlInfo>,
    texts: HashMap<String, String>,
}

impl FakeWindow {
    pub fn main(title: &str) -> Self {
        Self::with_class(MAIN_CLASS, title)
    }

    pub fn dialog(title: &str) -> Self {
        Self::with_class(DIALOG_CLASS, title)
    }

    pub fn with_class(class: &str, title: &str) -> Self {
        Self {
            class: class.to_string(),
            title: title.to_string(),
            controls: Vec::new(),
            texts: HashMap::new(),
        }
    }

    pub fn text_entry(mut self) -> Self {
        let n = self.count(ControlKind::TextEntry) + 1;
        self.controls.push(ControlInfo {
            id: format!("Edit{n}"),
            kind: ControlKind::TextEntry,
            caption: String::new(),
        });
        self
    }

    pub fn button(mut self, caption: &str) -> Self {
        let n = self.count(ControlKind::Button) + 1;
        self.controls.push(ControlInfo {
            id: format!("Button{n}"),
            kind: ControlKind::Button,
            caption: caption.to_string(),
        });
        self
    }

    fn count(&self, kind: ControlKind) -> usize {
        self.controls.iter().filter(|c| c.kind == kind).count()
    }
}

/// What the driver did, as recorded against a window title.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Action {
    Keys(String),
    /// Caption of the invoked control, accelerator `&` removed.
    Invoke(String),
    SetText { control: String, text: String },
    Activate,
}

#[derive(Debug, Clone)]
pub enum Trigger {
    Keys(String),
    /// Case-insensitive substring of the invoked control's caption.
    Invoke(String),
}

impl Trigger {
    pub fn keys(keys: &str) -> Self {
        Trigger::Keys(keys.to_string())
    }

    pub fn invoke(caption: &str) -> Self {
        Trigger::Invoke(caption.to_lowercase())
    }
}

#[derive(Debug, Clone)]
pub enum Effect {
    Open(FakeWindow),
    /// Close the window the action was sent to.
    CloseSelf,
    Close(String),
    WriteFile { path: PathBuf, len: u64 },
}

#[derive(Debug)]
struct Reaction {
    title: String,
    trigger: Trigger,
    effects: Vec<Effect>,
    ignore_first: u32,
    seen: u32,
}

#[derive(Debug, Default)]
struct DesktopState {
    next_handle: u64,
    windows: Vec<(WindowRef, FakeWindow)>,
    reactions: Vec<Reaction>,
    actions: Vec<(String, Action)>,
}

#[derive(Debug, Default)]
pub struct FakeDesktop {
    state: Mutex<DesktopState>,
}

impl FakeDesktop {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put a window on top of the stack.
    pub fn open(&self, window: FakeWindow) -> WindowRef {
        let mut state = self.lock();
        open_window(&mut state, window)
    }

    pub fn close_titled(&self, title: &str) {
        let mut state = self.lock();
        state.windows.retain(|(_, w)| w.title != title);
    }

    /// React every time `trigger` hits a window titled `title`.
    pub fn on(&self, title: &str, trigger: Trigger, effects: Vec<Effect>) {
        self.on_after(title, trigger, 0, effects);
    }

    /// Like [`FakeDesktop::on`], but the first `ignore_first` matches have no effect.
    pub fn on_after(&self, title: &str, trigger: Trigger, ignore_first: u32, effects: Vec<Effect>) {
        self.lock().reactions.push(Reaction {
            title: title.to_string(),
            trigger,
            effects,
            ignore_first,
            seen: 0,
        });
    }

    pub fn actions(&self) -> Vec<(String, Action)> {
        self.lock().actions.clone()
    }

    pub fn count(&self, title: &str, action: &Action) -> usize {
        self.lock()
            .actions
            .iter()
            .filter(|(t, a)| t == title && a == action)
            .count()
    }

    pub fn is_open(&self, title: &str) -> bool {
        self.lock().windows.iter().any(|(_, w)| w.title == title)
    }

    pub fn text_of(&self, title: &str, control: &str) -> Option<String> {
        self.lock()
            .windows
            .iter()
            .find(|(_, w)| w.title == title)
            .and_then(|(_, w)| w.texts.get(control).cloned())
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, DesktopState> {
        match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn record_and_react(&self, window: WindowRef, action: Action) {
        let mut state = self.lock();
        let Some(title) = title_of(&state, window) else {
            return;
        };
        state.actions.push((title.clone(), action.clone()));

        let mut fired = Vec::new();
        for reaction in state.reactions.iter_mut() {
            if reaction.title != title || !trigger_matches(&reaction.trigger, &action) {
                continue;
            }
            reaction.seen += 1;
            if reaction.seen > reaction.ignore_first {
                fired.extend(reaction.effects.iter().cloned());
            }
        }
        for effect in fired {
            match effect {
                Effect::Open(w) => {
                    open_window(&mut state, w);
                }
                Effect::CloseSelf => state.windows.retain(|(h, _)| *h != window),
                Effect::Close(t) => state.windows.retain(|(_, w)| w.title != t),
                Effect::WriteFile { path, len } => {
                    let _ = std::fs::write(&path, vec![0u8; len as usize]);
                }
            }
        }
    }
}

fn open_window(state: &mut DesktopState, window: FakeWindow) -> WindowRef {
    state.next_handle += 1;
    let handle = WindowRef(0x1000 + state.next_handle);
    state.windows.push((handle, window));
    handle
}

fn title_of(state: &DesktopState, window: WindowRef) -> Option<String> {
    state
        .windows
        .iter()
        .find(|(h, _)| *h == window)
        .map(|(_, w)| w.title.clone())
}

fn trigger_matches(trigger: &Trigger, action: &Action) -> bool {
    match (trigger, action) {
        (Trigger::Keys(k), Action::Keys(sent)) => k == sent,
        (Trigger::Invoke(c), Action::Invoke(caption)) => caption.to_lowercase().contains(c),
        _ => false,
    }
}

impl WindowAdapter for FakeDesktop {
    fn find_windows(&self, class_filter: Option<&str>) -> Vec<WindowInfo> {
        self.lock()
            .windows
            .iter()
            .filter(|(_, w)| class_filter.map_or(true, |c| w.class == c))
            .map(|(h, w)| WindowInfo {
                handle: *h,
                class: w.class.clone(),
                title: w.title.clone(),
            })
            .collect()
    }

    fn foreground(&self) -> Option<WindowRef> {
        self.lock().windows.last().map(|(h, _)| *h)
    }

    fn exists(&self, window: WindowRef) -> bool {
        self.lock().windows.iter().any(|(h, _)| *h == window)
    }

    fn snapshot(&self, window: WindowRef) -> Option<WindowSnapshot> {
        self.lock()
            .windows
            .iter()
            .find(|(h, _)| *h == window)
            .map(|(_, w)| WindowSnapshot {
                title: w.title.clone(),
                controls: w.controls.clone(),
            })
    }

    fn get_control_text(&self, window: WindowRef, control: &str) -> Option<String> {
        self.lock()
            .windows
            .iter()
            .find(|(h, _)| *h == window)
            .and_then(|(_, w)| w.texts.get(control).cloned())
    }

    fn set_control_text(&self, window: WindowRef, control: &str, text: &str) -> bool {
        let updated = {
            let mut state = self.lock();
            match state.windows.iter_mut().find(|(h, _)| *h == window) {
                Some((_, w)) if w.controls.iter().any(|c| c.id == control) => {
                    w.texts.insert(control.to_string(), text.to_string());
                    true
                }
                _ => false,
            }
        };
        if updated {
            self.record_and_react(
                window,
                Action::SetText {
                    control: control.to_string(),
                    text: text.to_string(),
                },
            );
        }
        updated
    }

    fn invoke(&self, window: WindowRef, control: &str) -> bool {
        let caption = {
            let state = self.lock();
            state
                .windows
                .iter()
                .find(|(h, _)| *h == window)
                .and_then(|(_, w)| w.controls.iter().find(|c| c.id == control))
                .map(|c| c.caption.replace('&', ""))
        };
        match caption {
            Some(caption) => {
                self.record_and_react(window, Action::Invoke(caption));
                true
            }
            None => false,
        }
    }

    fn send_keys(&self, window: WindowRef, keys: &str) {
        self.record_and_react(window, Action::Keys(keys.to_string()));
    }

    fn activate(&self, window: WindowRef) {
        {
            let mut state = self.lock();
            if let Some(pos) = state.windows.iter().position(|(h, _)| *h == window) {
                let entry = state.windows.remove(pos);
                state.windows.push(entry);
            }
        }
        self.record_and_react(window, Action::Activate);
    }

    fn wait_active(&self, window: WindowRef, _timeout: Duration) -> bool {
        self.foreground() == Some(window)
    }
}
