//! Event stream emitted upward by the driver.

use crate::error::ExportError;
use crate::model::{DriverEvent, Stage};
use std::sync::Mutex;

/// Receiver of `LOG`/`STAGE`/result events. Emission never fails the run.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: DriverEvent);

    fn log(&self, msg: String) {
        self.emit(DriverEvent::Log(msg));
    }

    fn stage(&self, stage: Stage) {
        self.emit(DriverEvent::Stage(stage));
    }

    fn failure(&self, err: &ExportError) {
        self.emit(DriverEvent::Failure {
            code: err.code(),
            message: err.to_string(),
        });
    }
}

/// Keeps every event in memory, in order.
#[derive(Debug, Default)]
pub struct MemorySink {
    events: Mutex<Vec<DriverEvent>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<DriverEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn stages(&self) -> Vec<Stage> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                DriverEvent::Stage(s) => Some(s),
                _ => None,
            })
            .collect()
    }

    pub fn stage_count(&self, stage: Stage) -> usize {
        self.stages().into_iter().filter(|s| *s == stage).count()
    }

    pub fn lines(&self) -> Vec<String> {
        self.events().iter().map(DriverEvent::to_line).collect()
    }
}

impl EventSink for MemorySink {
    fn emit(&self, event: DriverEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}
