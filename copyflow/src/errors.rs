//! Error types for the copyflow pipeline.
//!
//! Every failure aborts only the current stage execution. Errors carry enough
//! structure for a UI to pick a remediation message without string matching.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::core::{StageId, StateKey};

/// The main error type for copyflow operations.
#[derive(Debug, Error)]
pub enum CopyflowError {
    /// Required upstream or input keys are missing or empty.
    #[error("Stage '{stage}' is missing required input: {}", format_keys(.missing))]
    IncompleteUpstream {
        /// The stage that could not start.
        stage: StageId,
        /// Every missing key, in catalog order.
        missing: Vec<StateKey>,
    },

    /// The prompt template could not be rendered.
    #[error("Template error in stage '{stage}': {source}")]
    TemplateSyntax {
        /// The stage whose template failed.
        stage: StageId,
        /// The underlying syntax error.
        #[source]
        source: TemplateSyntaxError,
    },

    /// A generation is already running.
    #[error("A generation is already in progress; '{stage}' was rejected")]
    GenerationInFlight {
        /// The stage whose execution was rejected.
        stage: StageId,
    },

    /// The requested transition is not an edge of the workflow graph.
    #[error("Transition from '{from}' to '{to}' is not allowed")]
    InvalidTransition {
        /// Source stage.
        from: StageId,
        /// Target stage.
        to: StageId,
    },

    /// `advance` was called from a stage that is not the active one.
    #[error("Stage '{actual}' is not active (current stage is '{expected}')")]
    StageNotActive {
        /// The active stage.
        expected: StageId,
        /// The stage the caller claimed to be on.
        actual: StageId,
    },

    /// The generation gateway failed.
    #[error("{0}")]
    Gateway(#[from] GatewayError),

    /// The durable state store failed.
    #[error("{0}")]
    State(#[from] StateStoreError),

    /// A key that is generated by a stage was written as user input.
    #[error("'{0}' is not a user input key")]
    NotUserInput(StateKey),
}

fn format_keys(keys: &[StateKey]) -> String {
    keys.iter()
        .map(StateKey::as_str)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Coarse grouping used to decide how an error is presented.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Caused by local inputs or templates; fix and retry.
    Local,
    /// Caused by missing configuration such as an API key.
    Configuration,
    /// Reported by the generation service.
    Remote,
    /// Caused by navigating outside the workflow graph.
    Sequencing,
    /// Storage failure.
    Storage,
}

impl CopyflowError {
    /// Returns the error category.
    #[must_use]
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::IncompleteUpstream { .. }
            | Self::TemplateSyntax { .. }
            | Self::GenerationInFlight { .. }
            | Self::NotUserInput(_) => ErrorCategory::Local,
            Self::InvalidTransition { .. } | Self::StageNotActive { .. } => {
                ErrorCategory::Sequencing
            }
            Self::Gateway(GatewayError::MissingCredentials) => ErrorCategory::Configuration,
            Self::Gateway(_) => ErrorCategory::Remote,
            Self::State(_) => ErrorCategory::Storage,
        }
    }

    /// Returns a remediation hint for the user.
    #[must_use]
    pub fn user_guidance(&self) -> &'static str {
        match self {
            Self::IncompleteUpstream { .. } => "请先完成前置步骤或补全必填内容，然后重试。",
            Self::TemplateSyntax { .. } => "提示词模板有语法错误，请修改模板或恢复默认模板。",
            Self::GenerationInFlight { .. } => "正在生成中，请等待当前请求完成。",
            Self::InvalidTransition { .. } | Self::StageNotActive { .. } => {
                "无法跳转到该步骤，请按流程顺序操作。"
            }
            Self::Gateway(err) => err.user_guidance(),
            Self::State(_) => "本地存储读写失败，请检查存储位置后重试。",
            Self::NotUserInput(_) => "该内容由AI生成，不能作为输入直接填写。",
        }
    }

    /// Whether the user can recover by retrying after fixing something.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        match self {
            Self::Gateway(err) => err.is_recoverable(),
            _ => true,
        }
    }

    /// Converts to a dictionary representation for surfacing in a UI.
    #[must_use]
    pub fn to_dict(&self) -> HashMap<String, serde_json::Value> {
        let mut map = HashMap::new();
        let kind = match self {
            Self::IncompleteUpstream { missing, .. } => {
                map.insert(
                    "missing".to_string(),
                    serde_json::json!(missing.iter().map(StateKey::as_str).collect::<Vec<_>>()),
                );
                "IncompleteUpstreamError"
            }
            Self::TemplateSyntax { source, .. } => {
                map.insert("offset".to_string(), serde_json::json!(source.offset));
                "TemplateSyntaxError"
            }
            Self::GenerationInFlight { .. } => "GenerationInFlightError",
            Self::InvalidTransition { .. } => "InvalidTransitionError",
            Self::StageNotActive { .. } => "StageNotActiveError",
            Self::Gateway(GatewayError::MissingCredentials) => "MissingCredentialsError",
            Self::Gateway(GatewayError::Provider { kind, .. }) => kind.as_str(),
            Self::Gateway(GatewayError::MalformedOutput { .. }) => "MalformedOutputError",
            Self::State(_) => "StateStoreError",
            Self::NotUserInput(_) => "NotUserInputError",
        };
        map.insert("type".to_string(), serde_json::json!(kind));
        map.insert("message".to_string(), serde_json::json!(self.to_string()));
        map.insert("category".to_string(), serde_json::json!(self.category()));
        map.insert("guidance".to_string(), serde_json::json!(self.user_guidance()));
        map
    }
}

/// What went wrong while parsing or rendering a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TemplateErrorKind {
    /// `{{` without a matching `}}`.
    UnterminatedTag,
    /// `{{}}`.
    EmptyTag,
    /// Tag content that is not a variable name or supported helper.
    InvalidTag(String),
    /// A block helper other than `#if`.
    UnsupportedHelper(String),
    /// `{{else}}` outside an `{{#if}}` block.
    UnexpectedElse,
    /// A second `{{else}}` in the same block.
    DuplicateElse,
    /// `{{/if}}` without an open block.
    UnexpectedClose,
    /// An `{{#if}}` block that is never closed.
    UnclosedBlock(String),
    /// A variable that is not part of the stage's variable set.
    UnknownVariable(String),
}

impl std::fmt::Display for TemplateErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::UnterminatedTag => write!(f, "unterminated tag"),
            Self::EmptyTag => write!(f, "empty tag"),
            Self::InvalidTag(tag) => write!(f, "invalid tag '{tag}'"),
            Self::UnsupportedHelper(helper) => write!(f, "unsupported helper '{helper}'"),
            Self::UnexpectedElse => write!(f, "'else' outside of an 'if' block"),
            Self::DuplicateElse => write!(f, "duplicate 'else' in block"),
            Self::UnexpectedClose => write!(f, "'/if' without a matching '#if'"),
            Self::UnclosedBlock(guard) => write!(f, "'#if {guard}' is never closed"),
            Self::UnknownVariable(name) => write!(f, "unknown variable '{name}'"),
        }
    }
}

/// Error raised when a template cannot be rendered.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind} at byte {offset}")]
pub struct TemplateSyntaxError {
    /// What went wrong.
    pub kind: TemplateErrorKind,
    /// Byte offset into the template.
    pub offset: usize,
}

impl TemplateSyntaxError {
    /// Creates a new template syntax error.
    #[must_use]
    pub fn new(kind: TemplateErrorKind, offset: usize) -> Self {
        Self { kind, offset }
    }
}

/// Classification of a failure reported by the generation service.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderErrorKind {
    /// The API key was rejected.
    InvalidCredentials,
    /// Quota or rate limit exhausted.
    QuotaExceeded,
    /// The key lacks permission for the model or project.
    PermissionDenied,
    /// The prompt or response was blocked by a safety filter.
    ContentFiltered,
    /// Anything else, including transport failures and timeouts.
    Unknown,
}

impl ProviderErrorKind {
    /// Classifies a provider message by the markers the service embeds in it.
    ///
    /// The order matters: a message mentioning both an API key and a quota
    /// is a credentials problem.
    #[must_use]
    pub fn classify(message: &str) -> Self {
        if message.contains("API_KEY_INVALID") || message.contains("API key") {
            Self::InvalidCredentials
        } else if message.contains("QUOTA_EXCEEDED")
            || message.contains("RESOURCE_EXHAUSTED")
            || message.contains("quota")
        {
            Self::QuotaExceeded
        } else if message.contains("PERMISSION_DENIED") {
            Self::PermissionDenied
        } else if message.contains("SAFETY") {
            Self::ContentFiltered
        } else {
            Self::Unknown
        }
    }

    /// Returns the stable name of the classification.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "InvalidCredentials",
            Self::QuotaExceeded => "QuotaExceeded",
            Self::PermissionDenied => "PermissionDenied",
            Self::ContentFiltered => "ContentFiltered",
            Self::Unknown => "Unknown",
        }
    }

    /// Returns the remediation hint for this class of failure.
    #[must_use]
    pub const fn user_guidance(&self) -> &'static str {
        match self {
            Self::InvalidCredentials => "API key 无效，请检查密钥是否正确。",
            Self::QuotaExceeded => "API 配额已用完，请稍后重试或检查计费设置。",
            Self::PermissionDenied => "API key 权限不足，请检查权限设置。",
            Self::ContentFiltered => "内容被安全过滤器阻止，请修改提示内容。",
            Self::Unknown => "生成过程中发生错误，请稍后重试。",
        }
    }
}

impl std::fmt::Display for ProviderErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Errors raised by the generation gateway.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// No API key in the request, the session, or the environment.
    #[error("API key is required: provide one explicitly, store one in the session, or set GOOGLE_API_KEY")]
    MissingCredentials,

    /// The service reported a failure.
    #[error("{kind}: {message}")]
    Provider {
        /// Classification of the failure.
        kind: ProviderErrorKind,
        /// The provider's message, verbatim.
        message: String,
    },

    /// Structured output was requested but the response did not satisfy it.
    #[error("Malformed output: {reason}")]
    MalformedOutput {
        /// Why validation failed.
        reason: String,
        /// The raw response text.
        raw: String,
    },
}

impl GatewayError {
    /// Creates a provider error, classifying the message.
    #[must_use]
    pub fn provider(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::Provider {
            kind: ProviderErrorKind::classify(&message),
            message,
        }
    }

    /// Creates a malformed output error.
    #[must_use]
    pub fn malformed(reason: impl Into<String>, raw: impl Into<String>) -> Self {
        Self::MalformedOutput {
            reason: reason.into(),
            raw: raw.into(),
        }
    }

    /// Returns the provider classification, if this is a provider error.
    #[must_use]
    pub fn provider_kind(&self) -> Option<ProviderErrorKind> {
        match self {
            Self::Provider { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Returns the remediation hint.
    #[must_use]
    pub fn user_guidance(&self) -> &'static str {
        match self {
            Self::MissingCredentials => "请在设置中填写 API key，或配置 GOOGLE_API_KEY 环境变量。",
            Self::Provider { kind, .. } => kind.user_guidance(),
            Self::MalformedOutput { .. } => "AI返回的内容格式不正确，请重新生成。",
        }
    }

    /// Whether retrying (possibly after a fix) can succeed.
    #[must_use]
    pub fn is_recoverable(&self) -> bool {
        !matches!(
            self,
            Self::Provider {
                kind: ProviderErrorKind::PermissionDenied,
                ..
            }
        )
    }
}

/// Errors raised by a workflow state store.
#[derive(Debug, Error)]
pub enum StateStoreError {
    /// IO error.
    #[error("State store IO error at {path}: {source}")]
    Io {
        /// The file involved.
        path: String,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The persisted file could not be decoded.
    #[error("State store is corrupt: {0}")]
    Corrupt(String),

    /// The state could not be encoded.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl StateStoreError {
    /// Creates an IO error for a path.
    #[must_use]
    pub fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io {
            path: path.display().to_string(),
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_quota() {
        assert_eq!(
            ProviderErrorKind::classify("You exceeded your current quota"),
            ProviderErrorKind::QuotaExceeded
        );
        assert_eq!(
            ProviderErrorKind::classify("RESOURCE_EXHAUSTED: too many requests"),
            ProviderErrorKind::QuotaExceeded
        );
    }

    #[test]
    fn test_classify_safety() {
        assert_eq!(
            ProviderErrorKind::classify("blocked: SAFETY"),
            ProviderErrorKind::ContentFiltered
        );
    }

    #[test]
    fn test_classify_permission_denied() {
        assert_eq!(
            ProviderErrorKind::classify("PERMISSION_DENIED: caller lacks access"),
            ProviderErrorKind::PermissionDenied
        );
    }

    #[test]
    fn test_classify_invalid_key_wins_over_quota() {
        assert_eq!(
            ProviderErrorKind::classify("API key not valid (quota project unset)"),
            ProviderErrorKind::InvalidCredentials
        );
        assert_eq!(
            ProviderErrorKind::classify("INVALID_ARGUMENT: API_KEY_INVALID"),
            ProviderErrorKind::InvalidCredentials
        );
    }

    #[test]
    fn test_classify_unknown() {
        assert_eq!(
            ProviderErrorKind::classify("connection reset by peer"),
            ProviderErrorKind::Unknown
        );
        assert_eq!(ProviderErrorKind::classify(""), ProviderErrorKind::Unknown);
    }

    #[test]
    fn test_each_kind_has_distinct_guidance() {
        let kinds = [
            ProviderErrorKind::InvalidCredentials,
            ProviderErrorKind::QuotaExceeded,
            ProviderErrorKind::PermissionDenied,
            ProviderErrorKind::ContentFiltered,
            ProviderErrorKind::Unknown,
        ];
        let guidance: std::collections::HashSet<_> =
            kinds.iter().map(ProviderErrorKind::user_guidance).collect();
        assert_eq!(guidance.len(), kinds.len());
    }

    #[test]
    fn test_incomplete_upstream_message_names_keys() {
        let err = CopyflowError::IncompleteUpstream {
            stage: StageId::Draft,
            missing: vec![StateKey::RequirementsText, StateKey::OutlineMarkdown],
        };
        let msg = err.to_string();
        assert!(msg.contains("requirements.text"));
        assert!(msg.contains("outline.markdown"));
        assert_eq!(err.category(), ErrorCategory::Local);
    }

    #[test]
    fn test_to_dict() {
        let err = CopyflowError::from(GatewayError::provider("SAFETY"));
        let dict = err.to_dict();
        assert_eq!(dict.get("type").unwrap(), "ContentFiltered");
        assert_eq!(dict.get("category").unwrap(), "remote");

        let missing = CopyflowError::from(GatewayError::MissingCredentials);
        assert_eq!(missing.category(), ErrorCategory::Configuration);
        assert_eq!(missing.to_dict().get("type").unwrap(), "MissingCredentialsError");
    }

    #[test]
    fn test_template_error_display() {
        let err = TemplateSyntaxError::new(TemplateErrorKind::UnexpectedClose, 12);
        assert_eq!(err.to_string(), "'/if' without a matching '#if' at byte 12");
    }
}
