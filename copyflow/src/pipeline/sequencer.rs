//! The workflow cursor and its allowed transitions.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use super::catalog::definition;
use crate::core::{StageId, StateKey};
use crate::errors::CopyflowError;
use crate::events::{EventSink, NoOpEventSink, WORKFLOW_ADVANCED};
use crate::state::{StateStore, WorkflowState};

/// Outcome of a successful [`StageSequencer::advance`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transition {
    /// Stage that was active.
    pub from: StageId,
    /// Stage that is now active.
    pub to: StageId,
    /// Optional stages the transition jumped over.
    pub skipped: Vec<StageId>,
    /// Keys removed because their owning stage was skipped.
    pub cleared: Vec<StateKey>,
}

/// Returns the stages reachable from `from` in one transition.
#[must_use]
pub const fn allowed_targets(from: StageId) -> &'static [StageId] {
    match from {
        StageId::Requirements => &[StageId::Outline],
        StageId::Outline => &[StageId::StyleLearning, StageId::Draft],
        StageId::StyleLearning => &[StageId::Draft],
        StageId::Draft => &[
            StageId::SignatureAnalysis,
            StageId::Refinement,
            StageId::FinalPolish,
        ],
        StageId::SignatureAnalysis => &[StageId::Refinement, StageId::FinalPolish],
        StageId::Refinement => &[StageId::FinalPolish],
        StageId::FinalPolish => &[],
    }
}

/// Returns true if `from → to` is an edge of the workflow graph.
#[must_use]
pub fn is_allowed(from: StageId, to: StageId) -> bool {
    allowed_targets(from).contains(&to)
}

/// Stages strictly between `from` and `to`.
#[must_use]
pub fn skipped_stages(from: StageId, to: StageId) -> Vec<StageId> {
    StageId::ALL
        .into_iter()
        .filter(|stage| *stage > from && *stage < to)
        .collect()
}

/// Owns the active stage and enforces the transition graph.
///
/// The sequencer reads and writes the state store directly but never calls
/// the generation service.
pub struct StageSequencer {
    current: Mutex<StageId>,
    events: Arc<dyn EventSink>,
}

impl std::fmt::Debug for StageSequencer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StageSequencer")
            .field("current", &*self.current.lock())
            .finish_non_exhaustive()
    }
}

impl Default for StageSequencer {
    fn default() -> Self {
        Self::new()
    }
}

impl StageSequencer {
    /// Creates a sequencer positioned on the first stage.
    #[must_use]
    pub fn new() -> Self {
        Self {
            current: Mutex::new(StageId::first()),
            events: Arc::new(NoOpEventSink),
        }
    }

    /// Sets the event sink.
    #[must_use]
    pub fn with_event_sink(mut self, events: Arc<dyn EventSink>) -> Self {
        self.events = events;
        self
    }

    /// Returns the active stage.
    #[must_use]
    pub fn current(&self) -> StageId {
        *self.current.lock()
    }

    /// True iff every upstream key of `stage` is present and non-empty.
    #[must_use]
    pub fn can_enter(&self, stage: StageId, state: &WorkflowState) -> bool {
        definition(stage).missing_upstream(state).is_empty()
    }

    /// Moves from the active stage to `to`.
    ///
    /// Keys owned by skipped optional stages are removed from `store`
    /// before the cursor moves.
    pub fn advance(
        &self,
        from: StageId,
        to: StageId,
        store: &dyn StateStore,
    ) -> Result<Transition, CopyflowError> {
        let mut current = self.current.lock();
        if *current != from {
            return Err(CopyflowError::StageNotActive {
                expected: *current,
                actual: from,
            });
        }
        if !is_allowed(from, to) {
            return Err(CopyflowError::InvalidTransition { from, to });
        }

        let state = store.load_workflow()?;
        let missing = definition(to).missing_upstream(&state);
        if !missing.is_empty() {
            return Err(CopyflowError::IncompleteUpstream { stage: to, missing });
        }

        let skipped = skipped_stages(from, to);
        let cleared: Vec<StateKey> = skipped
            .iter()
            .flat_map(|stage| definition(*stage).owned.iter().copied())
            .filter(|key| state.get(*key).is_some())
            .collect();
        if !cleared.is_empty() {
            let names: Vec<String> = cleared.iter().map(|k| k.as_str().to_string()).collect();
            store.remove_many(&names)?;
        }

        *current = to;
        drop(current);

        info!(from = %from, to = %to, skipped = ?skipped, "Workflow advanced");
        self.events.try_emit(
            WORKFLOW_ADVANCED,
            Some(serde_json::json!({
                "from": from,
                "to": to,
                "skipped": skipped,
                "cleared": cleared,
                "timestamp": crate::utils::iso_timestamp(),
            })),
        );

        Ok(Transition {
            from,
            to,
            skipped,
            cleared,
        })
    }

    /// Moves the cursor back to an earlier (or the same) stage without
    /// touching state.
    pub fn revisit(&self, to: StageId) -> Result<(), CopyflowError> {
        let mut current = self.current.lock();
        if to > *current {
            return Err(CopyflowError::InvalidTransition { from: *current, to });
        }
        *current = to;
        Ok(())
    }

    /// Returns the cursor to the first stage.
    pub fn reset(&self) {
        *self.current.lock() = StageId::first();
    }
}
