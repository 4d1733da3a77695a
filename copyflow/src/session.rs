//! The workflow session.
//!
//! A [`Session`] owns everything one user's manuscript workflow needs: the
//! state store, the template overrides, the stage cursor and the executor.
//! Collaborators are injected at construction; nothing is global.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

use crate::config::CopyflowConfig;
use crate::core::{StageId, StageRunStatus, StateKey};
use crate::errors::CopyflowError;
use crate::events::{EventSink, NoOpEventSink, WORKFLOW_RESET};
use crate::gateway::{Credentials, GenerationCapability, GenerationGateway};
use crate::pipeline::{StageExecutor, StageSequencer, Transition};
use crate::state::{to_entries, FileStateStore, MemoryStateStore, StateStore, WorkflowState, API_KEY_SETTING};
use crate::templates::{render, TemplateStore, TemplateVars, GENERIC_REFINEMENT};

/// What a UI needs to draw the workflow.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Every stored workflow value.
    pub state: WorkflowState,
    /// The active stage.
    pub current: StageId,
    /// Latest run status of each stage.
    pub statuses: BTreeMap<StageId, StageRunStatus>,
    /// Stages running a custom template.
    pub overridden: Vec<StageId>,
}

/// One user's manuscript workflow.
pub struct Session {
    store: Arc<dyn StateStore>,
    templates: TemplateStore,
    sequencer: StageSequencer,
    executor: StageExecutor,
    gateway: Arc<GenerationGateway>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("store", &self.store)
            .field("current", &self.sequencer.current())
            .field("overridden", &self.templates.overridden_stages())
            .finish_non_exhaustive()
    }
}

impl Session {
    /// Creates a session over `store` and `gateway`.
    #[must_use]
    pub fn new(store: Arc<dyn StateStore>, gateway: Arc<GenerationGateway>) -> Self {
        Self {
            store,
            templates: TemplateStore::new(),
            sequencer: StageSequencer::new(),
            executor: StageExecutor::new(gateway.clone()),
            gateway,
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Builds a session from configuration and a generation capability.
    ///
    /// The state lives in the configured file, or in memory when no path is
    /// set.
    pub fn from_config_with(
        config: &CopyflowConfig,
        capability: Arc<dyn GenerationCapability>,
    ) -> Result<Self, CopyflowError> {
        let store: Arc<dyn StateStore> = match &config.state_path {
            Some(path) => Arc::new(FileStateStore::open(path)?),
            None => Arc::new(MemoryStateStore::new()),
        };
        let gateway = GenerationGateway::new(capability, config.generation.clone());
        Ok(Self::new(store, Arc::new(gateway))
            .with_stage_temperatures(config.stage_temperatures.clone()))
    }

    /// Builds a session from configuration, talking to Gemini.
    #[cfg(feature = "gemini")]
    pub fn from_config(config: &CopyflowConfig) -> Result<Self, CopyflowError> {
        let capability = crate::gateway::GeminiCapability::new(&config.generation)
            .map_err(crate::errors::GatewayError::from)?;
        Self::from_config_with(config, Arc::new(capability))
    }

    /// Routes stage and workflow events to `events`.
    #[must_use]
    pub fn with_event_sink(self, events: Arc<dyn EventSink>) -> Self {
        Self {
            sequencer: self.sequencer.with_event_sink(events.clone()),
            executor: self.executor.with_event_sink(events.clone()),
            events,
            ..self
        }
    }

    /// Overrides the temperature of some stages.
    #[must_use]
    pub fn with_stage_temperatures(self, temperatures: BTreeMap<StageId, f64>) -> Self {
        Self {
            executor: self.executor.with_stage_temperatures(temperatures),
            ..self
        }
    }

    /// The template store of this session.
    #[must_use]
    pub fn templates(&self) -> &TemplateStore {
        &self.templates
    }

    /// The state store of this session.
    #[must_use]
    pub fn store(&self) -> &Arc<dyn StateStore> {
        &self.store
    }

    /// The active stage.
    #[must_use]
    pub fn current_stage(&self) -> StageId {
        self.sequencer.current()
    }

    /// Latest run status of a stage.
    #[must_use]
    pub fn status(&self, stage: StageId) -> StageRunStatus {
        self.executor.status(stage)
    }

    /// Loads the stored workflow values.
    pub fn state(&self) -> Result<WorkflowState, CopyflowError> {
        Ok(self.store.load_workflow()?)
    }

    /// Everything a UI needs to draw the workflow.
    pub fn snapshot(&self) -> Result<SessionSnapshot, CopyflowError> {
        Ok(SessionSnapshot {
            state: self.state()?,
            current: self.sequencer.current(),
            statuses: self.executor.statuses(),
            overridden: self.templates.overridden_stages(),
        })
    }

    /// Writes a user-supplied value.
    pub fn set_input(&self, key: StateKey, value: &str) -> Result<(), CopyflowError> {
        if !key.is_user_input() {
            return Err(CopyflowError::NotUserInput(key));
        }
        self.store.set(key.as_str(), value)?;
        Ok(())
    }

    /// Replaces any workflow value, such as a generated outline the user
    /// edited by hand.
    pub fn edit_output(&self, key: StateKey, value: &str) -> Result<(), CopyflowError> {
        self.store.set(key.as_str(), value)?;
        info!(key = %key, "Workflow value edited");
        Ok(())
    }

    /// Stores the session API key. A blank key removes it.
    pub fn set_api_key(&self, key: &str) -> Result<(), CopyflowError> {
        if key.trim().is_empty() {
            self.store.remove(API_KEY_SETTING)?;
        } else {
            self.store.set(API_KEY_SETTING, key.trim())?;
        }
        Ok(())
    }

    fn credentials(&self, explicit_key: Option<&str>) -> Result<Credentials, CopyflowError> {
        let mut credentials = Credentials::none();
        if let Some(key) = explicit_key {
            credentials = credentials.with_explicit(key);
        }
        if let Some(key) = self.store.get(API_KEY_SETTING)? {
            credentials = credentials.with_session(key);
        }
        Ok(credentials)
    }

    /// Renders the prompt a stage would send, using its override if set.
    pub fn render_prompt(&self, stage: StageId) -> Result<String, CopyflowError> {
        let state = self.state()?;
        let override_template = self.templates.override_for(stage);
        self.executor
            .render_prompt(stage, &state, override_template.as_deref())
    }

    /// Runs a stage and stores what it produced.
    ///
    /// The store is written only after the generation succeeded, with every
    /// changed key in one batch.
    pub async fn run_stage(
        &self,
        stage: StageId,
        explicit_key: Option<&str>,
    ) -> Result<WorkflowState, CopyflowError> {
        let state = self.state()?;
        let credentials = self.credentials(explicit_key)?;
        let override_template = self.templates.override_for(stage);

        let next = self
            .executor
            .execute(stage, &state, override_template.as_deref(), &credentials)
            .await?;

        let changed = next.changed_keys(&state);
        let entries = to_entries(
            changed
                .iter()
                .filter_map(|key| next.get(*key).map(|value| (*key, value))),
        );
        self.store.set_many(&entries).map_err(|err| {
            warn!(stage = %stage, error = %err, "Generated output could not be stored");
            err
        })?;
        Ok(next)
    }

    /// Moves from the active stage to `to`.
    pub fn advance(&self, from: StageId, to: StageId) -> Result<Transition, CopyflowError> {
        self.sequencer.advance(from, to, self.store.as_ref())
    }

    /// True iff the stored state satisfies the upstream keys of `stage`.
    pub fn can_advance_to(&self, stage: StageId) -> Result<bool, CopyflowError> {
        Ok(self.sequencer.can_enter(stage, &self.state()?))
    }

    /// Moves back to an earlier stage.
    pub fn revisit(&self, to: StageId) -> Result<(), CopyflowError> {
        self.sequencer.revisit(to)
    }

    /// Starts a new manuscript.
    ///
    /// Refused with [`CopyflowError::GenerationInFlight`] while a stage is
    /// generating, since its output would land in the cleared store.
    /// Every workflow key is removed first; overrides, the cursor and the
    /// statuses are only cleared once the store has accepted the removal.
    /// The session API key is kept.
    pub fn reset(&self) -> Result<(), CopyflowError> {
        if self.executor.is_busy() {
            let stage = self
                .executor
                .in_flight_stage()
                .unwrap_or_else(|| self.sequencer.current());
            warn!(stage = %stage, "Reset rejected: generation in flight");
            return Err(CopyflowError::GenerationInFlight { stage });
        }
        let keys: Vec<String> = StateKey::ALL
            .iter()
            .map(|key| key.as_str().to_string())
            .collect();
        self.store.remove_many(&keys)?;

        self.templates.clear_all();
        self.sequencer.reset();
        self.executor.reset_statuses();

        info!("Workflow reset");
        self.events.try_emit(
            WORKFLOW_RESET,
            Some(serde_json::json!({ "timestamp": crate::utils::iso_timestamp() })),
        );
        Ok(())
    }

    /// Rewrites `original` according to a free-form instruction.
    ///
    /// Returns the raw text and writes nothing.
    pub async fn refine_text(
        &self,
        original: &str,
        instruction: &str,
        explicit_key: Option<&str>,
    ) -> Result<String, CopyflowError> {
        let vars = TemplateVars::new()
            .with("original_text", original)
            .with("user_instruction", instruction);
        let prompt = render(GENERIC_REFINEMENT, &vars).map_err(|source| {
            CopyflowError::TemplateSyntax {
                stage: self.sequencer.current(),
                source,
            }
        })?;
        let credentials = self.credentials(explicit_key)?;
        let result = self
            .gateway
            .generate(self.gateway.request(prompt), &credentials)
            .await?;
        Ok(result.as_text().unwrap_or_default().to_string())
    }

    /// Checks that the key in use is accepted by the generation service.
    pub async fn validate_credentials(&self, explicit_key: Option<&str>) -> Result<(), CopyflowError> {
        let credentials = self.credentials(explicit_key)?;
        self.gateway.validate_credentials(&credentials).await?;
        Ok(())
    }
}
