//! Utility functions for identifiers and timestamps.

pub mod timestamps;
mod uuid_utils;

pub use timestamps::{format_timestamp, iso_timestamp, now_utc, Timestamp};
pub use uuid_utils::{generate_execution_id, generate_uuid};
