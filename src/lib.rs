//! Scan for, connect to and drive a BLE LED controller board.
//!
//! - [`domain`] - session state machine, event log, settings
//! - [`infrastructure`] - adapter traits, platform backends, logging, worker thread
//! - [`presentation`] - eframe screen observing the controller state

pub mod domain;
pub mod infrastructure;
pub mod presentation;
