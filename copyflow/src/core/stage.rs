//! Stage identifiers and per-stage run status.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// One of the seven steps of the manuscript pipeline, in workflow order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageId {
    /// Step 1: distill the client's brief into core requirements.
    Requirements,
    /// Step 2: generate a structured outline.
    Outline,
    /// Step 3: learn the user's writing style from a sample (optional).
    StyleLearning,
    /// Step 4: generate the first draft.
    Draft,
    /// Step 5: analyse the draft for machine-writing signatures (optional).
    SignatureAnalysis,
    /// Step 6: rewrite the draft to remove those signatures (optional).
    Refinement,
    /// Step 7: apply the user's final polishing instruction.
    FinalPolish,
}

impl StageId {
    /// All stages in workflow order.
    pub const ALL: [Self; 7] = [
        Self::Requirements,
        Self::Outline,
        Self::StyleLearning,
        Self::Draft,
        Self::SignatureAnalysis,
        Self::Refinement,
        Self::FinalPolish,
    ];

    /// Returns the stable identifier used in events and configuration.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Requirements => "requirements",
            Self::Outline => "outline",
            Self::StyleLearning => "style_learning",
            Self::Draft => "draft",
            Self::SignatureAnalysis => "signature_analysis",
            Self::Refinement => "refinement",
            Self::FinalPolish => "final_polish",
        }
    }

    /// Returns the 1-based step number.
    #[must_use]
    pub const fn step_number(&self) -> usize {
        *self as usize + 1
    }

    /// Returns the title shown to the user for this step.
    #[must_use]
    pub const fn title(&self) -> &'static str {
        match self {
            Self::Requirements => "步骤一：甲方核心需求",
            Self::Outline => "步骤二：生成稿件大纲",
            Self::StyleLearning => "步骤三：学习写作风格",
            Self::Draft => "步骤四：生成稿件初稿",
            Self::SignatureAnalysis => "步骤五：AI特征分析",
            Self::Refinement => "步骤六：AI特征消除",
            Self::FinalPolish => "步骤七：最终润色",
        }
    }

    /// Whether the user may bypass this stage.
    #[must_use]
    pub const fn is_optional(&self) -> bool {
        matches!(
            self,
            Self::StyleLearning | Self::SignatureAnalysis | Self::Refinement
        )
    }

    /// Returns the first stage of the workflow.
    #[must_use]
    pub const fn first() -> Self {
        Self::Requirements
    }
}

impl fmt::Display for StageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("unknown stage '{s}'"))
    }
}

/// Lifecycle of a single stage execution.
///
/// `Idle` is both the initial state and the state a stage returns to
/// conceptually before every re-execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageRunStatus {
    /// Not running.
    #[default]
    Idle,
    /// Validating inputs and rendering the prompt.
    Rendering,
    /// Waiting on the generation service.
    AwaitingGeneration,
    /// The last execution stored its output.
    Success,
    /// The last execution failed; stored state is untouched.
    Failed,
}

impl fmt::Display for StageRunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Rendering => write!(f, "rendering"),
            Self::AwaitingGeneration => write!(f, "awaiting_generation"),
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl StageRunStatus {
    /// Returns true if an execution is currently in progress.
    #[must_use]
    pub fn is_running(&self) -> bool {
        matches!(self, Self::Rendering | Self::AwaitingGeneration)
    }

    /// Returns true if the status is the outcome of a finished execution.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Success | Self::Failed)
    }
}
