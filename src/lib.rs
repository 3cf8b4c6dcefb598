//! Drives Nesstar Explorer through its export dialogs and validates the files
//! it writes.

pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod model;
pub mod orchestrator;
pub mod poll;
pub mod summary;
pub mod window;
