//! Core domain types: stages and the keys they read and write.

mod keys;
mod stage;

pub use keys::StateKey;
pub use stage::{StageId, StageRunStatus};
