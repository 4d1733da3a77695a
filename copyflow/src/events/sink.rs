//! Where stage and workflow events go.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use tracing::{debug, info, warn, Level};

use super::STAGE_FAILED;
use crate::core::StageId;

/// Receives stage lifecycle and workflow events.
///
/// `data` is the serialized [`super::StageEvent`] for stage events, or a
/// small object for workflow events (`workflow.advanced`, `workflow.reset`).
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Records an event.
    async fn emit(&self, event_type: &str, data: Option<Value>);

    /// Records an event from synchronous code. Never fails; a sink that
    /// cannot keep the event drops it.
    fn try_emit(&self, event_type: &str, data: Option<Value>);
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event_type: &str, _data: Option<Value>) {}

    fn try_emit(&self, _event_type: &str, _data: Option<Value>) {}
}

/// Writes events to `tracing`.
///
/// `stage.failed` always goes out at `warn` with the error message; other
/// events use the configured level.
#[derive(Debug, Clone)]
pub struct LoggingEventSink {
    level: Level,
}

impl Default for LoggingEventSink {
    fn default() -> Self {
        Self::info()
    }
}

impl LoggingEventSink {
    /// Logs at `level`. Anything below `INFO` is logged at `debug`.
    #[must_use]
    pub fn new(level: Level) -> Self {
        Self { level }
    }

    /// Logs at `debug`.
    #[must_use]
    pub fn debug() -> Self {
        Self::new(Level::DEBUG)
    }

    /// Logs at `info`.
    #[must_use]
    pub fn info() -> Self {
        Self::new(Level::INFO)
    }

    fn log_event(&self, event_type: &str, data: Option<&Value>) {
        let field = |name: &str| {
            data.and_then(|d| d.get(name))
                .and_then(Value::as_str)
                .unwrap_or("-")
                .to_string()
        };
        let stage = field("stage");
        let execution_id = field("execution_id");

        if event_type == STAGE_FAILED {
            let error = data
                .and_then(|d| d.pointer("/data/error/message"))
                .and_then(Value::as_str)
                .unwrap_or("-");
            warn!(event_type, stage = %stage, execution_id = %execution_id, error, "Stage event");
        } else if self.level > Level::INFO {
            debug!(event_type, stage = %stage, execution_id = %execution_id, "Stage event");
        } else {
            info!(event_type, stage = %stage, execution_id = %execution_id, "Stage event");
        }
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.log_event(event_type, data.as_ref());
    }
}

/// Keeps every event in memory, for tests and UI replays.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: Mutex<Vec<(String, Option<Value>)>>,
}

impl CollectingEventSink {
    /// Creates an empty sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Every event, in emission order.
    #[must_use]
    pub fn events(&self) -> Vec<(String, Option<Value>)> {
        self.events.lock().clone()
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// True if nothing was recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Forgets every event.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Event types, in emission order.
    #[must_use]
    pub fn event_types(&self) -> Vec<String> {
        self.events.lock().iter().map(|(t, _)| t.clone()).collect()
    }

    /// Events whose type starts with `type_prefix`.
    #[must_use]
    pub fn events_of_type(&self, type_prefix: &str) -> Vec<(String, Option<Value>)> {
        self.events
            .lock()
            .iter()
            .filter(|(t, _)| t.starts_with(type_prefix))
            .cloned()
            .collect()
    }

    /// Stage events about `stage`.
    #[must_use]
    pub fn events_for_stage(&self, stage: StageId) -> Vec<(String, Option<Value>)> {
        self.events
            .lock()
            .iter()
            .filter(|(_, data)| {
                data.as_ref()
                    .and_then(|d| d.get("stage"))
                    .and_then(Value::as_str)
                    == Some(stage.as_str())
            })
            .cloned()
            .collect()
    }

    fn record(&self, event_type: &str, data: Option<Value>) {
        self.events.lock().push((event_type.to_string(), data));
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }

    fn try_emit(&self, event_type: &str, data: Option<Value>) {
        self.record(event_type, data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_noop_sink() {
        let sink = NoOpEventSink;
        sink.emit("stage.rendering", None).await;
        sink.try_emit("stage.rendering", Some(serde_json::json!({"stage": "draft"})));
    }

    #[tokio::test]
    async fn test_logging_sink() {
        let sink = LoggingEventSink::debug();
        sink.emit("stage.succeeded", Some(serde_json::json!({"stage": "outline"}))).await;
        sink.try_emit(
            "stage.failed",
            Some(serde_json::json!({"stage": "draft", "data": {"error": {"message": "quota"}}})),
        );
        sink.try_emit("workflow.reset", None);
    }

    #[tokio::test]
    async fn test_collecting_sink() {
        let sink = CollectingEventSink::new();
        assert!(sink.is_empty());

        sink.emit("stage.rendering", None).await;
        sink.try_emit("stage.succeeded", Some(serde_json::json!({"stage": "draft"})));

        assert_eq!(sink.len(), 2);

        let events = sink.events();
        assert_eq!(events[0].0, "stage.rendering");
        assert_eq!(events[1].0, "stage.succeeded");
    }

    #[tokio::test]
    async fn test_collecting_sink_filter() {
        let sink = CollectingEventSink::new();
        sink.emit("stage.rendering", None).await;
        sink.emit("stage.failed", None).await;
        sink.emit("workflow.advanced", None).await;

        assert_eq!(sink.events_of_type("stage.").len(), 2);
        assert_eq!(sink.events_of_type("workflow.").len(), 1);
    }

    #[test]
    fn test_events_for_stage() {
        let sink = CollectingEventSink::new();
        sink.try_emit("stage.rendering", Some(serde_json::json!({"stage": "draft"})));
        sink.try_emit("stage.rendering", Some(serde_json::json!({"stage": "outline"})));
        sink.try_emit("workflow.reset", None);
        assert_eq!(sink.events_for_stage(StageId::Draft).len(), 1);
    }

    #[tokio::test]
    async fn test_collecting_sink_clear() {
        let sink = CollectingEventSink::new();
        sink.emit("workflow.reset", None).await;
        assert_eq!(sink.len(), 1);

        sink.clear();
        assert!(sink.is_empty());
    }

    #[test]
    fn test_emit_outside_runtime() {
        let sink = CollectingEventSink::new();
        tokio_test::block_on(sink.emit("stage.awaiting_generation", None));
        assert_eq!(sink.event_types(), vec!["stage.awaiting_generation"]);
    }
}
