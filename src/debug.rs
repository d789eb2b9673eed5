//! # Logging and timing utilities
//!
//! Thin wrappers around the `log` crate's macros, one per pipeline phase,
//! plus a small [`PerfTimer`] for ad hoc timing. Output is controlled the
//! usual way, via `RUST_LOG` and `env_logger::init()` in `main`; nothing in
//! this crate's behavior depends on whether logging is enabled.

use log::{debug, trace};
use std::time::Instant;

pub fn log_lexer(msg: &str) {
    trace!(target: "romualdo::lexer", "{msg}");
}

pub fn log_parser(msg: &str) {
    trace!(target: "romualdo::parser", "{msg}");
}

pub fn log_codegen(msg: &str) {
    trace!(target: "romualdo::codegen", "{msg}");
}

pub fn log_compiler(msg: &str) {
    debug!(target: "romualdo::compiler", "{msg}");
}

/// Times a labeled operation and logs its duration at debug level when
/// dropped (or when `finish` is called explicitly).
pub struct PerfTimer {
    start: Instant,
    label: String,
}

impl PerfTimer {
    pub fn new(label: &str) -> Self {
        Self {
            start: Instant::now(),
            label: label.to_string(),
        }
    }

    pub fn finish(self) {
        debug!(target: "romualdo::perf", "{}: {:?}", self.label, self.start.elapsed());
    }
}
