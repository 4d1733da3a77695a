//! The seven-stage generation pipeline.
//!
//! - [`catalog`]: what each stage reads, asks for and writes
//! - [`StageExecutor`]: runs one stage through the gateway
//! - [`StageSequencer`]: moves the cursor along the allowed transitions

pub mod catalog;
mod executor;
pub mod fallbacks;
mod sequencer;


pub use catalog::{definition, OutputBinding, StageDefinition};
pub use executor::StageExecutor;
pub use fallbacks::fallback_for;
pub use sequencer::{allowed_targets, is_allowed, skipped_stages, StageSequencer, Transition};
