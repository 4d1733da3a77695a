//! The static stage catalog.
//!
//! One [`StageDefinition`] per stage, fixed at compile time: which keys a
//! stage reads, what structure it asks the model for, and where each field
//! of the answer is stored.

use crate::core::{StageId, StateKey};
use crate::gateway::{OutputSchema, SchemaField};
use crate::state::WorkflowState;
use crate::templates::default_template;

/// Routes one field of a generation result into state keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputBinding {
    /// Field of a structured result, or `None` for a plain-text result.
    pub field: Option<&'static str>,
    /// Keys that receive the value.
    pub keys: &'static [StateKey],
}

/// Immutable description of one stage.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StageDefinition {
    /// The stage.
    pub stage: StageId,
    /// Keys produced by earlier stages that must exist before entering.
    pub upstream: &'static [StateKey],
    /// User-supplied keys that must exist before executing.
    pub inputs: &'static [StateKey],
    /// Keys that may be absent; they take their fallback value.
    pub optional: &'static [StateKey],
    /// Structure requested from the model.
    pub output_schema: Option<OutputSchema>,
    /// Where the answer is stored.
    pub bindings: &'static [OutputBinding],
    /// Keys removed when the sequencer skips this stage.
    pub owned: &'static [StateKey],
    /// Default sampling temperature.
    pub temperature: f64,
}

impl StageDefinition {
    /// Returns the built-in template.
    #[must_use]
    pub fn default_template(&self) -> &'static str {
        default_template(self.stage)
    }

    /// Every key the stage's template may reference, in catalog order.
    pub fn declared_keys(&self) -> impl Iterator<Item = StateKey> {
        self.upstream
            .iter()
            .chain(self.inputs)
            .chain(self.optional)
            .copied()
    }

    /// Keys that must be present before executing, in catalog order.
    pub fn required_keys(&self) -> impl Iterator<Item = StateKey> {
        self.upstream.iter().chain(self.inputs).copied()
    }

    /// Required keys missing or blank in `state`.
    #[must_use]
    pub fn missing_keys(&self, state: &WorkflowState) -> Vec<StateKey> {
        self.required_keys().filter(|k| !state.has(*k)).collect()
    }

    /// Upstream keys missing or blank in `state`.
    #[must_use]
    pub fn missing_upstream(&self, state: &WorkflowState) -> Vec<StateKey> {
        self.upstream
            .iter()
            .copied()
            .filter(|k| !state.has(*k))
            .collect()
    }

    /// Keys written on success.
    pub fn written_keys(&self) -> impl Iterator<Item = StateKey> {
        self.bindings.iter().flat_map(|b| b.keys.iter().copied())
    }
}

static REQUIREMENTS_FIELDS: [SchemaField; 1] = [SchemaField::string(
    "summary",
    "提炼后的甲方核心需求摘要",
)];

static OUTLINE_FIELDS: [SchemaField; 1] = [SchemaField::string(
    "generatedOutline",
    "Markdown 格式的稿件大纲",
)];

static STYLE_FIELDS: [SchemaField; 1] = [SchemaField::string(
    "styleAnalysisReport",
    "写作风格分析报告",
)];

static DRAFT_FIELDS: [SchemaField; 1] = [SchemaField::string(
    "generatedDraft",
    "稿件初稿全文",
)];

static ANALYSIS_FIELDS: [SchemaField; 1] = [SchemaField::string(
    "analysisReport",
    "AI写作特征分析报告与修改建议",
)];

static REFINEMENT_FIELDS: [SchemaField; 1] = [SchemaField::string(
    "refinedText",
    "消除AI痕迹后的完整稿件",
)];

static CATALOG: [StageDefinition; 7] = [
    StageDefinition {
        stage: StageId::Requirements,
        upstream: &[],
        inputs: &[StateKey::RequirementsSource],
        optional: &[],
        output_schema: Some(OutputSchema::new(&REQUIREMENTS_FIELDS)),
        bindings: &[OutputBinding {
            field: Some("summary"),
            keys: &[StateKey::RequirementsText],
        }],
        owned: &[],
        temperature: 0.5,
    },
    StageDefinition {
        stage: StageId::Outline,
        upstream: &[StateKey::RequirementsText],
        inputs: &[
            StateKey::OutlineInstructions,
            StateKey::ManuscriptType,
            StateKey::Brand,
            StateKey::WordCount,
        ],
        optional: &[],
        output_schema: Some(OutputSchema::new(&OUTLINE_FIELDS)),
        bindings: &[OutputBinding {
            field: Some("generatedOutline"),
            keys: &[StateKey::OutlineMarkdown],
        }],
        owned: &[],
        temperature: 0.7,
    },
    StageDefinition {
        stage: StageId::StyleLearning,
        upstream: &[],
        inputs: &[StateKey::StyleSample],
        optional: &[],
        output_schema: Some(OutputSchema::new(&STYLE_FIELDS)),
        bindings: &[OutputBinding {
            field: Some("styleAnalysisReport"),
            keys: &[StateKey::StyleReport],
        }],
        owned: &[StateKey::StyleReport],
        temperature: 0.7,
    },
    StageDefinition {
        stage: StageId::Draft,
        upstream: &[StateKey::RequirementsText, StateKey::OutlineMarkdown],
        inputs: &[StateKey::ManuscriptType, StateKey::Brand, StateKey::WordCount],
        optional: &[StateKey::StyleReport, StateKey::DraftInstructions],
        output_schema: Some(OutputSchema::new(&DRAFT_FIELDS)),
        bindings: &[OutputBinding {
            field: Some("generatedDraft"),
            keys: &[StateKey::CurrentDraft],
        }],
        owned: &[],
        temperature: 0.7,
    },
    StageDefinition {
        stage: StageId::SignatureAnalysis,
        upstream: &[StateKey::CurrentDraft],
        inputs: &[],
        optional: &[],
        output_schema: Some(OutputSchema::new(&ANALYSIS_FIELDS)),
        bindings: &[OutputBinding {
            field: Some("analysisReport"),
            keys: &[StateKey::AnalysisReport],
        }],
        owned: &[StateKey::AnalysisReport],
        temperature: 0.3,
    },
    StageDefinition {
        stage: StageId::Refinement,
        upstream: &[StateKey::CurrentDraft],
        inputs: &[],
        optional: &[
            StateKey::AnalysisReport,
            StateKey::RefinementInstructions,
            StateKey::StyleReport,
        ],
        output_schema: Some(OutputSchema::new(&REFINEMENT_FIELDS)),
        bindings: &[OutputBinding {
            field: Some("refinedText"),
            keys: &[StateKey::RefinementOutput, StateKey::CurrentDraft],
        }],
        owned: &[StateKey::RefinementOutput],
        temperature: 0.7,
    },
    StageDefinition {
        stage: StageId::FinalPolish,
        upstream: &[StateKey::CurrentDraft],
        inputs: &[StateKey::PolishInstructions],
        optional: &[StateKey::RequirementsText, StateKey::OutlineMarkdown],
        output_schema: None,
        bindings: &[OutputBinding {
            field: None,
            keys: &[StateKey::PolishOutput, StateKey::CurrentDraft],
        }],
        owned: &[],
        temperature: 0.7,
    },
];

/// Returns the definition of a stage.
#[must_use]
pub fn definition(stage: StageId) -> &'static StageDefinition {
    &CATALOG[stage as usize]
}

/// Returns every definition in workflow order.
#[must_use]
pub fn catalog() -> &'static [StageDefinition] {
    &CATALOG
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::templates::Template;

    #[test]
    fn test_catalog_is_indexed_by_stage() {
        for stage in StageId::ALL {
            assert_eq!(definition(stage).stage, stage);
        }
    }

    #[test]
    fn test_templates_only_use_declared_keys() {
        for def in catalog() {
            let template = Template::parse(def.default_template()).unwrap();
            let declared: Vec<_> = def.declared_keys().map(|k| k.var_name()).collect();
            for name in template.variables() {
                assert!(
                    declared.contains(&name),
                    "{} template references undeclared '{name}'",
                    def.stage
                );
            }
        }
    }

    #[test]
    fn test_only_optional_stages_own_keys() {
        for def in catalog() {
            assert_eq!(!def.owned.is_empty(), def.stage.is_optional(), "{}", def.stage);
        }
    }

    #[test]
    fn test_bindings_match_schema() {
        for def in catalog() {
            for binding in def.bindings {
                match (binding.field, def.output_schema) {
                    (Some(field), Some(schema)) => {
                        assert!(schema.fields().iter().any(|f| f.name == field));
                    }
                    (None, None) => {}
                    _ => panic!("binding/schema mismatch in {}", def.stage),
                }
            }
        }
    }

    #[test]
    fn test_missing_keys_in_catalog_order() {
        let state = WorkflowState::new().with(StateKey::Brand, "京东方");
        assert_eq!(
            definition(StageId::Draft).missing_keys(&state),
            vec![
                StateKey::RequirementsText,
                StateKey::OutlineMarkdown,
                StateKey::ManuscriptType,
                StateKey::WordCount,
            ]
        );
    }

    #[test]
    fn test_temperatures() {
        assert!((definition(StageId::SignatureAnalysis).temperature - 0.3).abs() < f64::EPSILON);
        assert!((definition(StageId::Requirements).temperature - 0.5).abs() < f64::EPSILON);
        assert!((definition(StageId::Draft).temperature - 0.7).abs() < f64::EPSILON);
    }
}
