//! Execution timing and template identification.

use sha2::{Digest, Sha256};
use std::time::Instant;

/// Returns a short SHA-256 fingerprint of a template.
///
/// Logs and events identify templates by this value so that prompt content
/// never reaches a log line.
#[must_use]
pub fn template_fingerprint(template: &str) -> String {
    let digest = Sha256::digest(template.as_bytes());
    hex::encode(&digest[..8])
}

/// Simple span timing helper.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new span timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Returns the elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> f64 {
        self.start.elapsed().as_secs_f64() * 1000.0
    }

    /// Returns the span name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}
