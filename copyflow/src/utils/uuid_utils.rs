//! Identifier generation.

use uuid::Uuid;

/// Generates a new random UUID v4.
#[must_use]
pub fn generate_uuid() -> Uuid {
    Uuid::new_v4()
}

/// Generates the identifier attached to one stage execution's events.
#[must_use]
pub fn generate_execution_id() -> String {
    generate_uuid().to_string()
}
