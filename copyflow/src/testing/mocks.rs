//! Scripted generation capability.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::time::Duration;

use crate::gateway::{CapabilityCall, GenerationCapability, ProviderFailure};

/// A fake generation service that records every call.
///
/// Queued responses are returned first, in order. Once the queue is empty
/// the capability answers on its own: for a structured request it returns
/// an object filling every schema property with `"<name> 生成内容"`, for a
/// plain request it returns [`ScriptedCapability::DEFAULT_TEXT`].
#[derive(Debug, Default)]
pub struct ScriptedCapability {
    queue: Mutex<VecDeque<Result<String, ProviderFailure>>>,
    calls: Mutex<Vec<CapabilityCall>>,
    delay: Option<Duration>,
}

impl ScriptedCapability {
    /// Text returned for plain requests when nothing is queued.
    pub const DEFAULT_TEXT: &'static str = "润色后的终稿";

    /// Creates a capability with an empty queue.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Delays every answer, to keep a call in flight.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Queues a successful raw response.
    pub fn push_text(&self, text: impl Into<String>) {
        self.queue.lock().push_back(Ok(text.into()));
    }

    /// Queues a provider failure.
    pub fn push_failure(&self, message: impl Into<String>) {
        self.queue
            .lock()
            .push_back(Err(ProviderFailure::new(message)));
    }

    /// Returns the number of calls received.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// Returns the prompts received, in order.
    #[must_use]
    pub fn prompts(&self) -> Vec<String> {
        self.calls
            .lock()
            .iter()
            .map(|call| call.prompt_text.clone())
            .collect()
    }

    /// Returns the most recent call.
    #[must_use]
    pub fn last_call(&self) -> Option<CapabilityCall> {
        self.calls.lock().last().cloned()
    }

    fn default_answer(call: &CapabilityCall) -> String {
        let Some(schema) = &call.response_schema else {
            return Self::DEFAULT_TEXT.to_string();
        };
        let object: Map<String, Value> = schema["properties"]
            .as_object()
            .map(|props| {
                props
                    .keys()
                    .map(|name| (name.clone(), Value::String(format!("{name} 生成内容"))))
                    .collect()
            })
            .unwrap_or_default();
        Value::Object(object).to_string()
    }
}

#[async_trait]
impl GenerationCapability for ScriptedCapability {
    async fn invoke(&self, call: CapabilityCall) -> Result<String, ProviderFailure> {
        let queued = self.queue.lock().pop_front();
        let answer = queued.unwrap_or_else(|| Ok(Self::default_answer(&call)));
        self.calls.lock().push(call);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        answer
    }
}
