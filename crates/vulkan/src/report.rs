// Copyright 2026 The Kiln Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! # Reporting
//!
//! The pipeline talks to the outside world through two narrow capabilities.  `LogSink` takes a
//! level and a message.  `FatalReporter` is told once, when negotiation cannot continue, and the
//! host decides what termination means.

use std::sync::Mutex;

use log::Level;

/// Leveled message output.  The debug messenger may call this from driver threads.
pub trait LogSink: Send + Sync {
    fn log(&self, level: Level, message: &str);

    fn info(&self, message: &str) {
        self.log(Level::Info, message);
    }

    fn warn(&self, message: &str) {
        self.log(Level::Warn, message);
    }

    /// `log` has no critical level.  Critical messages are errors with a recognizable prefix.
    fn critical(&self, message: &str) {
        self.log(Level::Error, &format!("critical: {message}"));
    }
}

/// Forwards to the `log` facade.  Whatever logger the host installed decides formatting.
#[derive(Debug, Default, Clone, Copy)]
pub struct FacadeSink;

impl LogSink for FacadeSink {
    fn log(&self, level: Level, message: &str) {
        log::log!(target: "kiln_vulkan", level, "{message}");
    }
}

/// Keeps every message in memory.
#[derive(Debug, Default)]
pub struct RecordingSink {
    records: Mutex<Vec<(Level, String)>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<(Level, String)> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_else(|poisoned| poisoned.into_inner().clone())
    }

    /// Messages logged at exactly `level`.
    pub fn at(&self, level: Level) -> Vec<String> {
        self.records()
            .into_iter()
            .filter(|(l, _)| *l == level)
            .map(|(_, m)| m)
            .collect()
    }
}

impl LogSink for RecordingSink {
    fn log(&self, level: Level, message: &str) {
        let mut records = match self.records.lock() {
            Ok(records) => records,
            Err(poisoned) => poisoned.into_inner(),
        };
        records.push((level, message.to_owned()));
    }
}

/// Receives the single message describing why negotiation stopped.
pub trait FatalReporter {
    fn report_fatal(&self, message: &str);
}

/// Exits the process with `code`.
#[derive(Debug, Clone, Copy)]
pub struct ExitReporter {
    pub code: i32,
}

impl Default for ExitReporter {
    fn default() -> Self {
        Self { code: 1 }
    }
}

impl FatalReporter for ExitReporter {
    fn report_fatal(&self, _message: &str) {
        std::process::exit(self.code);
    }
}

/// Aborts without unwinding.  Closest to a debugger break when one is attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct AbortReporter;

impl FatalReporter for AbortReporter {
    fn report_fatal(&self, _message: &str) {
        std::process::abort();
    }
}

/// Panics with the message.
#[derive(Debug, Default, Clone, Copy)]
pub struct PanicReporter;

impl FatalReporter for PanicReporter {
    fn report_fatal(&self, message: &str) {
        panic!("{message}");
    }
}
