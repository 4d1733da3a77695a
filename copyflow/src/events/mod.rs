//! Stage lifecycle events.
//!
//! The executor reports every run-status transition as a [`StageEvent`]
//! through an injected [`EventSink`]. Sinks are owned by the session; there
//! is no process-wide sink.

mod sink;

pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::core::{StageId, StageRunStatus};

/// Event type emitted when a stage starts validating and rendering.
pub const STAGE_RENDERING: &str = "stage.rendering";
/// Event type emitted when the prompt has been sent to the gateway.
pub const STAGE_AWAITING_GENERATION: &str = "stage.awaiting_generation";
/// Event type emitted when a stage's output was produced.
pub const STAGE_SUCCEEDED: &str = "stage.succeeded";
/// Event type emitted when a stage execution failed.
pub const STAGE_FAILED: &str = "stage.failed";
/// Event type emitted when the sequencer moves the cursor.
pub const WORKFLOW_ADVANCED: &str = "workflow.advanced";
/// Event type emitted when the workflow is reset.
pub const WORKFLOW_RESET: &str = "workflow.reset";

/// Returns the event type that announces a run status.
#[must_use]
pub const fn event_type_for(status: StageRunStatus) -> Option<&'static str> {
    match status {
        StageRunStatus::Idle => None,
        StageRunStatus::Rendering => Some(STAGE_RENDERING),
        StageRunStatus::AwaitingGeneration => Some(STAGE_AWAITING_GENERATION),
        StageRunStatus::Success => Some(STAGE_SUCCEEDED),
        StageRunStatus::Failed => Some(STAGE_FAILED),
    }
}

/// A lifecycle event for one stage execution.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageEvent {
    /// The event type, e.g. `stage.succeeded`.
    #[serde(rename = "type")]
    pub event_type: String,

    /// The stage the event concerns.
    pub stage: StageId,

    /// Identifier shared by every event of one execution.
    pub execution_id: String,

    /// When the event occurred (RFC 3339).
    pub timestamp: String,

    /// Additional payload.
    #[serde(default)]
    pub data: HashMap<String, serde_json::Value>,
}

impl StageEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(event_type: impl Into<String>, stage: StageId, execution_id: impl Into<String>) -> Self {
        Self {
            event_type: event_type.into(),
            stage,
            execution_id: execution_id.into(),
            timestamp: crate::utils::iso_timestamp(),
            data: HashMap::new(),
        }
    }

    /// Adds a data field to the event.
    #[must_use]
    pub fn with_data(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.data.insert(key.into(), value);
        self
    }

    /// Converts the event into the JSON payload handed to sinks.
    #[must_use]
    pub fn to_value(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }

    /// Emits the event through a sink without blocking.
    pub fn emit_to(&self, sink: &dyn EventSink) {
        sink.try_emit(&self.event_type, Some(self.to_value()));
    }
}
