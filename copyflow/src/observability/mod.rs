//! Logging setup and diagnostics helpers.

mod logging;
mod timing;

pub use logging::{init_tracing, LogFormat};
pub use timing::{template_fingerprint, SpanTimer};
