//! Append-only event log shown in the log panel.

use std::collections::VecDeque;

use crate::domain::models::{LogEntry, LogLevel};

pub const DEFAULT_RETENTION: usize = 1000;

#[derive(Debug, Clone)]
pub struct EventLog {
    entries: VecDeque<LogEntry>,
    next_sequence: u64,
    // 0 keeps everything
    retention: usize,
}

impl Default for EventLog {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

impl EventLog {
    pub fn new(retention: usize) -> Self {
        Self {
            entries: VecDeque::new(),
            next_sequence: 0,
            retention,
        }
    }

    pub fn log_event(&mut self, message: impl Into<String>) -> u64 {
        self.append(LogLevel::Info, message.into())
    }

    pub fn log_error(&mut self, message: impl Into<String>) -> u64 {
        self.append(LogLevel::Error, message.into())
    }

    /// Changes the cap; oldest entries are evicted right away if needed.
    pub fn set_retention(&mut self, retention: usize) {
        self.retention = retention;
        self.enforce_retention();
    }

    pub fn entries(&self) -> impl Iterator<Item = &LogEntry> {
        self.entries.iter()
    }

    pub fn snapshot(&self) -> Vec<LogEntry> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn append(&mut self, level: LogLevel, message: String) -> u64 {
        let sequence = self.next_sequence;
        self.next_sequence += 1;

        match level {
            LogLevel::Info => tracing::info!(sequence, "{}", message),
            LogLevel::Error => tracing::error!(sequence, "{}", message),
        }

        self.entries.push_back(LogEntry {
            level,
            message,
            sequence,
        });
        self.enforce_retention();
        sequence
    }

    fn enforce_retention(&mut self) {
        if self.retention == 0 {
            return;
        }
        while self.entries.len() > self.retention {
            self.entries.pop_front();
        }
    }
}
