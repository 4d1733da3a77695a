//! Assertions on pipeline errors.

use crate::core::StateKey;
use crate::errors::{CopyflowError, ProviderErrorKind};

/// Asserts that `err` is `IncompleteUpstream` naming exactly `expected`.
pub fn assert_missing_keys(err: &CopyflowError, expected: &[StateKey]) {
    match err {
        CopyflowError::IncompleteUpstream { missing, .. } => {
            assert_eq!(missing.as_slice(), expected, "unexpected missing keys");
        }
        other => panic!("expected IncompleteUpstream, got {other:?}"),
    }
}

/// Asserts that `err` is a provider failure of the given kind.
pub fn assert_provider_kind(err: &CopyflowError, expected: ProviderErrorKind) {
    match err {
        CopyflowError::Gateway(gateway) => {
            assert_eq!(gateway.provider_kind(), Some(expected), "unexpected provider kind");
        }
        other => panic!("expected a gateway error, got {other:?}"),
    }
}
