//! Per-session template overrides.

use dashmap::DashMap;

use super::defaults::default_template;
use crate::core::StageId;

/// Holds the default template of every stage and the session's overrides.
///
/// Overrides live in memory only. Nothing is validated when an override is
/// written; a malformed template fails when it is rendered.
#[derive(Debug, Default)]
pub struct TemplateStore {
    overrides: DashMap<StageId, String>,
}

impl TemplateStore {
    /// Creates a store with no overrides.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the built-in template for a stage.
    #[must_use]
    pub fn default_template(&self, stage: StageId) -> &'static str {
        default_template(stage)
    }

    /// Returns the override for a stage, if one is set.
    #[must_use]
    pub fn override_for(&self, stage: StageId) -> Option<String> {
        self.overrides.get(&stage).map(|entry| entry.value().clone())
    }

    /// Sets the override for a stage.
    pub fn set_override(&self, stage: StageId, template: impl Into<String>) {
        let template = template.into();
        tracing::debug!(
            stage = %stage,
            fingerprint = %crate::observability::template_fingerprint(&template),
            "Template override set"
        );
        self.overrides.insert(stage, template);
    }

    /// Restores the default template for a stage.
    pub fn clear_override(&self, stage: StageId) {
        self.overrides.remove(&stage);
    }

    /// Removes every override.
    pub fn clear_all(&self) {
        self.overrides.clear();
    }

    /// Returns the override if present, otherwise the default.
    #[must_use]
    pub fn resolve(&self, stage: StageId) -> String {
        self.override_for(stage)
            .unwrap_or_else(|| default_template(stage).to_string())
    }

    /// Returns the stages that currently have an override.
    #[must_use]
    pub fn overridden_stages(&self) -> Vec<StageId> {
        let mut stages: Vec<_> = self.overrides.iter().map(|entry| *entry.key()).collect();
        stages.sort();
        stages
    }

    /// Returns the number of overrides.
    #[must_use]
    pub fn len(&self) -> usize {
        self.overrides.len()
    }

    /// Returns true if no override is set.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.overrides.is_empty()
    }
}
