//! Single-stage execution.
//!
//! An execution validates the stage's required keys, renders its prompt,
//! calls the gateway and writes the answer into a copy of the state. The
//! caller's state is never touched, so a failure anywhere leaves no partial
//! writes behind.
//!
//! At most one generation is in flight per executor. A second call while
//! one is pending fails with [`CopyflowError::GenerationInFlight`] before
//! rendering anything.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{info, warn};

use super::catalog::{definition, OutputBinding, StageDefinition};
use super::fallbacks::fallback_for;
use crate::core::{StageId, StageRunStatus, StateKey};
use crate::errors::{CopyflowError, GatewayError};
use crate::events::{event_type_for, EventSink, NoOpEventSink, StageEvent};
use crate::gateway::{Credentials, GenerationGateway, GenerationResult};
use crate::observability::{template_fingerprint, SpanTimer};
use crate::state::WorkflowState;
use crate::templates::{render, TemplateVars};
use crate::utils::generate_execution_id;

/// Releases the in-flight flag when dropped, including when the execution
/// future is dropped mid-flight.
struct InFlightGuard<'a> {
    flag: &'a AtomicBool,
}

impl<'a> InFlightGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self { flag })
    }
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

/// Runs stages against the generation gateway.
pub struct StageExecutor {
    gateway: Arc<GenerationGateway>,
    events: Arc<dyn EventSink>,
    in_flight: AtomicBool,
    statuses: RwLock<HashMap<StageId, StageRunStatus>>,
    temperatures: BTreeMap<StageId, f64>,
}

impl std::fmt::Debug for StageExecutor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageExecutor")
            .field("in_flight", &self.in_flight.load(Ordering::Relaxed))
            .field("statuses", &*self.statuses.read())
            .finish_non_exhaustive()
    }
}

impl StageExecutor {
    /// Creates an executor that discards events.
    #[must_use]
    pub fn new(gateway: Arc<GenerationGateway>) -> Self {
        Self {
            gateway,
            events: Arc::new(NoOpEventSink),
            in_flight: AtomicBool::new(false),
            statuses: RwLock::new(HashMap::new()),
            temperatures: BTreeMap::new(),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Overrides the temperature of some stages.
    #[must_use]
    pub fn with_stage_temperatures(mut self, temperatures: BTreeMap<StageId, f64>) -> Self {
        self.temperatures = temperatures;
        self
    }

    /// Returns the latest run status of a stage.
    #[must_use]
    pub fn status(&self, stage: StageId) -> StageRunStatus {
        self.statuses.read().get(&stage).copied().unwrap_or_default()
    }

    /// Returns the latest run status of every stage.
    #[must_use]
    pub fn statuses(&self) -> BTreeMap<StageId, StageRunStatus> {
        StageId::ALL
            .into_iter()
            .map(|stage| (stage, self.status(stage)))
            .collect()
    }

    /// Returns true while a generation is pending.
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    /// Returns the stage whose generation is pending, if any.
    #[must_use]
    pub fn in_flight_stage(&self) -> Option<StageId> {
        if !self.is_busy() {
            return None;
        }
        self.statuses
            .read()
            .iter()
            .find(|(_, status)| {
                matches!(
                    status,
                    StageRunStatus::Rendering | StageRunStatus::AwaitingGeneration
                )
            })
            .map(|(stage, _)| *stage)
    }

    /// Forgets every recorded status.
    pub fn reset_statuses(&self) {
        self.statuses.write().clear();
    }

    /// Returns the temperature used for a stage.
    #[must_use]
    pub fn temperature_for(&self, stage: StageId) -> f64 {
        self.temperatures
            .get(&stage)
            .copied()
            .unwrap_or(definition(stage).temperature)
    }

    /// Renders the prompt a stage would send, without calling the gateway.
    pub fn render_prompt(
        &self,
        stage: StageId,
        state: &WorkflowState,
        override_template: Option<&str>,
    ) -> Result<String, CopyflowError> {
        let def = definition(stage);
        check_required(def, state)?;
        let template = override_template.unwrap_or_else(|| def.default_template());
        render(template, &build_vars(def, state))
            .map_err(|source| CopyflowError::TemplateSyntax { stage, source })
    }

    /// Executes one stage and returns the updated state.
    pub async fn execute(
        &self,
        stage: StageId,
        state: &WorkflowState,
        override_template: Option<&str>,
        credentials: &Credentials,
    ) -> Result<WorkflowState, CopyflowError> {
        let Some(_guard) = InFlightGuard::acquire(&self.in_flight) else {
            warn!(stage = %stage, "Rejected: generation already in flight");
            return Err(CopyflowError::GenerationInFlight { stage });
        };

        let execution_id = generate_execution_id();
        let timer = SpanTimer::start(format!("stage.{stage}"));
        info!(stage = %stage, execution_id = %execution_id, "Stage execution started");

        let result = self
            .run(stage, state, override_template, credentials, &execution_id)
            .await;

        match &result {
            Ok(next) => {
                let written: Vec<_> = next
                    .changed_keys(state)
                    .iter()
                    .map(StateKey::as_str)
                    .collect();
                info!(
                    stage = %stage,
                    execution_id = %execution_id,
                    duration_ms = timer.elapsed_ms(),
                    "Stage execution succeeded"
                );
                self.transition(
                    stage,
                    StageRunStatus::Success,
                    &execution_id,
                    [
                        ("duration_ms", serde_json::json!(timer.elapsed_ms())),
                        ("written_keys", serde_json::json!(written)),
                    ],
                );
            }
            Err(err) => {
                warn!(
                    stage = %stage,
                    execution_id = %execution_id,
                    category = ?err.category(),
                    error = %err,
                    "Stage execution failed"
                );
                self.transition(
                    stage,
                    StageRunStatus::Failed,
                    &execution_id,
                    [
                        ("duration_ms", serde_json::json!(timer.elapsed_ms())),
                        ("error", serde_json::json!(err.to_dict())),
                    ],
                );
            }
        }
        result
    }

    async fn run(
        &self,
        stage: StageId,
        state: &WorkflowState,
        override_template: Option<&str>,
        credentials: &Credentials,
        execution_id: &str,
    ) -> Result<WorkflowState, CopyflowError> {
        let def = definition(stage);
        self.transition(stage, StageRunStatus::Rendering, execution_id, []);

        check_required(def, state)?;
        let template = override_template.unwrap_or_else(|| def.default_template());
        let prompt = render(template, &build_vars(def, state))
            .map_err(|source| CopyflowError::TemplateSyntax { stage, source })?;

        self.transition(
            stage,
            StageRunStatus::AwaitingGeneration,
            execution_id,
            [
                ("template_fingerprint", serde_json::json!(template_fingerprint(template))),
                ("template_overridden", serde_json::json!(override_template.is_some())),
            ],
        );

        let request = self
            .gateway
            .request(prompt)
            .with_schema(def.output_schema)
            .with_temperature(self.temperature_for(stage));
        let result = self.gateway.generate(request, credentials).await?;

        let mut next = state.clone();
        apply_bindings(def.bindings, &result, &mut next)?;
        Ok(next)
    }

    fn transition<const N: usize>(
        &self,
        stage: StageId,
        status: StageRunStatus,
        execution_id: &str,
        data: [(&str, Value); N],
    ) {
        self.statuses.write().insert(stage, status);
        if let Some(event_type) = event_type_for(status) {
            let event = data.into_iter().fold(
                StageEvent::new(event_type, stage, execution_id),
                |event, (key, value)| event.with_data(key, value),
            );
            event.emit_to(self.events.as_ref());
        }
    }
}

fn check_required(def: &StageDefinition, state: &WorkflowState) -> Result<(), CopyflowError> {
    let missing = def.missing_keys(state);
    if missing.is_empty() {
        Ok(())
    } else {
        Err(CopyflowError::IncompleteUpstream {
            stage: def.stage,
            missing,
        })
    }
}

/// Builds the closed variable set of a stage.
fn build_vars(def: &StageDefinition, state: &WorkflowState) -> TemplateVars {
    let mut vars = TemplateVars::new();
    for key in def.declared_keys() {
        let value = if state.has(key) {
            state.get(key).unwrap_or_default()
        } else {
            fallback_for(key)
        };
        vars.insert(key.var_name(), value);
    }
    vars
}

fn field_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => items
            .iter()
            .map(|item| item.as_str().map_or_else(|| item.to_string(), ToString::to_string))
            .collect::<Vec<_>>()
            .join("\n"),
        other => other.to_string(),
    }
}

fn apply_bindings(
    bindings: &[OutputBinding],
    result: &GenerationResult,
    state: &mut WorkflowState,
) -> Result<(), GatewayError> {
    for binding in bindings {
        let value = match (binding.field, result) {
            (Some(field), GenerationResult::Structured(map)) => map
                .get(field)
                .map(field_text)
                .ok_or_else(|| GatewayError::malformed(format!("missing field '{field}'"), ""))?,
            (None, GenerationResult::Text(text)) => text.clone(),
            (Some(_), GenerationResult::Text(text)) => {
                return Err(GatewayError::malformed("expected structured output", text.clone()));
            }
            (None, GenerationResult::Structured(map)) => {
                return Err(GatewayError::malformed(
                    "expected plain text",
                    Value::Object(map.clone()).to_string(),
                ));
            }
        };
        for key in binding.keys {
            state.set(*key, value.clone());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GenerationConfig;
    use crate::errors::TemplateErrorKind;
    use crate::events::CollectingEventSink;
    use crate::gateway::{CredentialResolver, MockGenerationCapability, ProviderFailure};
    use crate::testing::{populated_state, test_credentials as creds, ScriptedCapability};
    use pretty_assertions::assert_eq;

    fn executor_with(mock: MockGenerationCapability) -> StageExecutor {
        let gateway = GenerationGateway::new(Arc::new(mock), GenerationConfig::default())
            .with_resolver(CredentialResolver::without_env());
        StageExecutor::new(Arc::new(gateway))
    }

    #[tokio::test]
    async fn test_missing_keys_make_zero_calls() {
        for stage in StageId::ALL {
            let mut mock = MockGenerationCapability::new();
            mock.expect_invoke().times(0);
            let executor = executor_with(mock);

            let err = executor
                .execute(stage, &WorkflowState::new(), None, &creds())
                .await
                .unwrap_err();
            match err {
                CopyflowError::IncompleteUpstream { stage: s, missing } => {
                    assert_eq!(s, stage);
                    assert_eq!(missing, definition(stage).required_keys().collect::<Vec<_>>());
                }
                other => panic!("{stage}: unexpected {other:?}"),
            }
            assert_eq!(executor.status(stage), StageRunStatus::Failed);
        }
    }

    #[tokio::test]
    async fn test_structured_output_is_bound() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .withf(|call| (call.temperature - 0.3).abs() < f64::EPSILON)
            .times(1)
            .returning(|_| Ok(r#"{"analysisReport": "开头套路化"}"#.to_string()));
        let executor = executor_with(mock);

        let state = WorkflowState::new().with(StateKey::CurrentDraft, "初稿");
        let next = executor
            .execute(StageId::SignatureAnalysis, &state, None, &creds())
            .await
            .unwrap();
        assert_eq!(next.get(StateKey::AnalysisReport), Some("开头套路化"));
        assert_eq!(next.get(StateKey::CurrentDraft), Some("初稿"));
        assert_eq!(state.get(StateKey::AnalysisReport), None);
        assert_eq!(executor.status(StageId::SignatureAnalysis), StageRunStatus::Success);
    }

    #[tokio::test]
    async fn test_refinement_rewrites_current_draft() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .returning(|_| Ok(r#"{"refinedText": "自然的稿件"}"#.to_string()));
        let executor = executor_with(mock);

        let state = WorkflowState::new().with(StateKey::CurrentDraft, "初稿");
        let next = executor
            .execute(StageId::Refinement, &state, None, &creds())
            .await
            .unwrap();
        assert_eq!(next.get(StateKey::RefinementOutput), Some("自然的稿件"));
        assert_eq!(next.get(StateKey::CurrentDraft), Some("自然的稿件"));
    }

    #[tokio::test]
    async fn test_final_polish_returns_text_with_fallbacks() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .withf(|call| {
                call.response_schema.is_none()
                    && call.prompt_text.contains("无甲方需求信息。")
                    && call.prompt_text.contains("无创作大纲信息。")
            })
            .times(1)
            .returning(|_| Ok("终稿".to_string()));
        let executor = executor_with(mock);

        let state = WorkflowState::new()
            .with(StateKey::CurrentDraft, "稿件")
            .with(StateKey::PolishInstructions, "更简洁");
        let next = executor
            .execute(StageId::FinalPolish, &state, None, &creds())
            .await
            .unwrap();
        assert_eq!(next.get(StateKey::PolishOutput), Some("终稿"));
        assert_eq!(next.get(StateKey::CurrentDraft), Some("终稿"));
    }

    #[tokio::test]
    async fn test_failure_leaves_state_untouched() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .returning(|_| Err(ProviderFailure::new("blocked by SAFETY settings")));
        let executor = executor_with(mock);

        let state = populated_state();
        let err = executor
            .execute(StageId::Draft, &state, None, &creds())
            .await
            .unwrap_err();
        assert_eq!(err.category(), crate::errors::ErrorCategory::Remote);
        assert_eq!(state, populated_state());
        assert_eq!(executor.status(StageId::Draft), StageRunStatus::Failed);
    }

    #[tokio::test]
    async fn test_template_error_makes_no_call() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke().times(0);
        let executor = executor_with(mock);

        let state = WorkflowState::new().with(StateKey::CurrentDraft, "稿件");
        let err = executor
            .execute(
                StageId::SignatureAnalysis,
                &state,
                Some("{{{draft_current}}} {{brand}}"),
                &creds(),
            )
            .await
            .unwrap_err();
        match err {
            CopyflowError::TemplateSyntax { source, .. } => {
                assert_eq!(source.kind, TemplateErrorKind::UnknownVariable("brand".to_string()));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_override_template_is_used() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .withf(|call| call.prompt_text == "分析：稿件")
            .returning(|_| Ok(r#"{"analysisReport": "ok"}"#.to_string()));
        let executor = executor_with(mock);

        let state = WorkflowState::new().with(StateKey::CurrentDraft, "稿件");
        assert!(executor
            .execute(StageId::SignatureAnalysis, &state, Some("分析：{{{draft_current}}}"), &creds())
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_in_flight_guard_rejects_second_call() {
        let capability = Arc::new(
            ScriptedCapability::new().with_delay(std::time::Duration::from_millis(200)),
        );
        let gateway = GenerationGateway::new(capability.clone(), GenerationConfig::default())
            .with_resolver(CredentialResolver::without_env());
        let executor = StageExecutor::new(Arc::new(gateway));
        let state = populated_state();
        let creds = creds();

        let (first, second) = tokio::join!(
            executor.execute(StageId::SignatureAnalysis, &state, None, &creds),
            async {
                tokio::time::sleep(std::time::Duration::from_millis(20)).await;
                executor.execute(StageId::Refinement, &state, None, &creds).await
            }
        );
        assert!(first.is_ok());
        assert!(matches!(
            second.unwrap_err(),
            CopyflowError::GenerationInFlight { stage: StageId::Refinement }
        ));
        assert_eq!(capability.call_count(), 1);
        assert!(!executor.is_busy());
        assert_eq!(executor.in_flight_stage(), None);
        assert_eq!(executor.status(StageId::Refinement), StageRunStatus::Idle);
    }

    #[tokio::test]
    async fn test_events_follow_run_status() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .returning(|_| Ok(r#"{"analysisReport": "ok"}"#.to_string()));
        let sink = Arc::new(CollectingEventSink::new());
        let executor = executor_with(mock).with_event_sink(sink.clone());

        let state = WorkflowState::new().with(StateKey::CurrentDraft, "稿件");
        executor
            .execute(StageId::SignatureAnalysis, &state, None, &creds())
            .await
            .unwrap();

        assert_eq!(
            sink.event_types(),
            vec!["stage.rendering", "stage.awaiting_generation", "stage.succeeded"]
        );
        let events = sink.events();
        let ids: Vec<_> = events
            .iter()
            .map(|(_, data)| data.as_ref().unwrap()["execution_id"].clone())
            .collect();
        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        let awaiting = events[1].1.as_ref().unwrap();
        assert_eq!(awaiting["data"]["template_overridden"], false);
        assert_eq!(
            awaiting["data"]["template_fingerprint"],
            template_fingerprint(definition(StageId::SignatureAnalysis).default_template())
        );
    }

    #[tokio::test]
    async fn test_stage_temperature_override() {
        let mut mock = MockGenerationCapability::new();
        mock.expect_invoke()
            .withf(|call| (call.temperature - 0.9).abs() < f64::EPSILON)
            .times(1)
            .returning(|_| Ok(r#"{"analysisReport": "ok"}"#.to_string()));
        let executor = executor_with(mock)
            .with_stage_temperatures([(StageId::SignatureAnalysis, 0.9)].into_iter().collect());

        let state = WorkflowState::new().with(StateKey::CurrentDraft, "稿件");
        assert!(executor
            .execute(StageId::SignatureAnalysis, &state, None, &creds())
            .await
            .is_ok());
    }

    #[test]
    fn test_render_prompt_draft_without_style() {
        let executor = executor_with(MockGenerationCapability::new());
        let state = populated_state().with(StateKey::StyleReport, "");
        let prompt = executor.render_prompt(StageId::Draft, &state, None).unwrap();
        assert!(prompt.contains("由于跳过了风格学习步骤"));
        assert!(!prompt.contains("【临时微调指令】"));
    }

    #[test]
    fn test_field_text() {
        assert_eq!(field_text(&serde_json::json!("a")), "a");
        assert_eq!(field_text(&serde_json::json!(1500)), "1500");
        assert_eq!(field_text(&serde_json::json!(["a", "b"])), "a\nb");
    }
}
