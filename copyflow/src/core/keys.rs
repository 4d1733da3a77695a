//! The closed namespace of persisted workflow keys.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use super::StageId;

/// Identifies one persisted value of the workflow.
///
/// Keys are namespaced as `<area>.<name>`. Inside prompt templates each key
/// is referenced by its [`var_name`](Self::var_name), with the dot replaced
/// by an underscore.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum StateKey {
    /// The client's raw brief as pasted by the user.
    #[serde(rename = "requirements.source")]
    RequirementsSource,
    /// Distilled core requirements.
    #[serde(rename = "requirements.text")]
    RequirementsText,
    /// The user's creative instructions for the outline.
    #[serde(rename = "outline.instructions")]
    OutlineInstructions,
    /// Manuscript type, e.g. "新闻通稿".
    #[serde(rename = "outline.manuscript_type")]
    ManuscriptType,
    /// Target brand.
    #[serde(rename = "outline.brand")]
    Brand,
    /// Desired word count, free-form ("1500字" or "1800").
    #[serde(rename = "outline.word_count")]
    WordCount,
    /// The confirmed outline in Markdown.
    #[serde(rename = "outline.markdown")]
    OutlineMarkdown,
    /// Sample manuscript used for style learning.
    #[serde(rename = "style.sample")]
    StyleSample,
    /// The style analysis report.
    #[serde(rename = "style.report")]
    StyleReport,
    /// Temporary fine-tune instructions for draft generation.
    #[serde(rename = "draft.instructions")]
    DraftInstructions,
    /// The current working draft, rewritten by later stages.
    #[serde(rename = "draft.current")]
    CurrentDraft,
    /// The signature analysis report.
    #[serde(rename = "analysis.report")]
    AnalysisReport,
    /// Extra instructions for the refinement pass.
    #[serde(rename = "refinement.instructions")]
    RefinementInstructions,
    /// Output of the refinement pass.
    #[serde(rename = "refinement.output")]
    RefinementOutput,
    /// Final polishing instruction.
    #[serde(rename = "polish.instructions")]
    PolishInstructions,
    /// Output of the final polishing pass.
    #[serde(rename = "polish.output")]
    PolishOutput,
}

impl StateKey {
    /// Every known key. Reset removes exactly this set.
    pub const ALL: [Self; 16] = [
        Self::RequirementsSource,
        Self::RequirementsText,
        Self::OutlineInstructions,
        Self::ManuscriptType,
        Self::Brand,
        Self::WordCount,
        Self::OutlineMarkdown,
        Self::StyleSample,
        Self::StyleReport,
        Self::DraftInstructions,
        Self::CurrentDraft,
        Self::AnalysisReport,
        Self::RefinementInstructions,
        Self::RefinementOutput,
        Self::PolishInstructions,
        Self::PolishOutput,
    ];

    /// Returns the persisted key string.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::RequirementsSource => "requirements.source",
            Self::RequirementsText => "requirements.text",
            Self::OutlineInstructions => "outline.instructions",
            Self::ManuscriptType => "outline.manuscript_type",
            Self::Brand => "outline.brand",
            Self::WordCount => "outline.word_count",
            Self::OutlineMarkdown => "outline.markdown",
            Self::StyleSample => "style.sample",
            Self::StyleReport => "style.report",
            Self::DraftInstructions => "draft.instructions",
            Self::CurrentDraft => "draft.current",
            Self::AnalysisReport => "analysis.report",
            Self::RefinementInstructions => "refinement.instructions",
            Self::RefinementOutput => "refinement.output",
            Self::PolishInstructions => "polish.instructions",
            Self::PolishOutput => "polish.output",
        }
    }

    /// Returns the template variable name for this key.
    #[must_use]
    pub const fn var_name(&self) -> &'static str {
        match self {
            Self::RequirementsSource => "requirements_source",
            Self::RequirementsText => "requirements_text",
            Self::OutlineInstructions => "outline_instructions",
            Self::ManuscriptType => "outline_manuscript_type",
            Self::Brand => "outline_brand",
            Self::WordCount => "outline_word_count",
            Self::OutlineMarkdown => "outline_markdown",
            Self::StyleSample => "style_sample",
            Self::StyleReport => "style_report",
            Self::DraftInstructions => "draft_instructions",
            Self::CurrentDraft => "draft_current",
            Self::AnalysisReport => "analysis_report",
            Self::RefinementInstructions => "refinement_instructions",
            Self::RefinementOutput => "refinement_output",
            Self::PolishInstructions => "polish_instructions",
            Self::PolishOutput => "polish_output",
        }
    }

    /// The stage whose form collects this key, if it is typed in by the user.
    #[must_use]
    pub const fn input_stage(&self) -> Option<StageId> {
        match self {
            Self::RequirementsSource => Some(StageId::Requirements),
            Self::OutlineInstructions | Self::ManuscriptType | Self::Brand | Self::WordCount => {
                Some(StageId::Outline)
            }
            Self::StyleSample => Some(StageId::StyleLearning),
            Self::DraftInstructions => Some(StageId::Draft),
            Self::RefinementInstructions => Some(StageId::Refinement),
            Self::PolishInstructions => Some(StageId::FinalPolish),
            _ => None,
        }
    }

    /// Whether the key is typed in by the user rather than generated.
    #[must_use]
    pub const fn is_user_input(&self) -> bool {
        self.input_stage().is_some()
    }
}

impl fmt::Display for StateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StateKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|key| key.as_str() == s)
            .ok_or_else(|| format!("unknown state key '{s}'"))
    }
}
