//! Testing utilities for copyflow sessions.
//!
//! This module provides:
//! - A scripted generation capability that records calls
//! - Populated workflow states and ready-made sessions
//! - Assertions on pipeline errors

mod assertions;
mod fixtures;
mod mocks;

pub use assertions::{assert_missing_keys, assert_provider_kind};
pub use fixtures::{populated_state, store_with, test_credentials, test_gateway, test_session};
pub use mocks::ScriptedCapability;
