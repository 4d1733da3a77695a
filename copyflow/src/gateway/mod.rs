//! Generation gateway: the only path to the external text-generation service.
//!
//! The gateway resolves credentials, sends the prompt (and an optional
//! response schema) through a [`GenerationCapability`], and turns the raw
//! answer into a [`GenerationResult`]. When a schema was requested the
//! result is always a validated object or an error; plain text is never
//! passed off as structured output.
//!
//! There is no retry. Provider failures are classified once by
//! [`ProviderErrorKind::classify`] and surfaced as [`GatewayError`].

mod credentials;
#[cfg(feature = "gemini")]
mod gemini;
mod schema;

pub use credentials::{ApiKey, CredentialResolver, CredentialSource, Credentials, ENV_API_KEYS};
#[cfg(feature = "gemini")]
pub use gemini::GeminiCapability;
pub use schema::{strip_code_fences, FieldKind, OutputSchema, SchemaField};

use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;
use tracing::{debug, warn};

use crate::config::GenerationConfig;
use crate::errors::{GatewayError, ProviderErrorKind};

/// Prompt used to check that a key is accepted.
const VALIDATION_PROMPT: &str = "Say OK";

/// One call to the external service.
#[derive(Debug, Clone)]
pub struct CapabilityCall {
    /// The rendered prompt.
    pub prompt_text: String,
    /// The provider-dialect response schema, when structured output is wanted.
    pub response_schema: Option<Value>,
    /// Model identifier.
    pub model_id: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output token limit.
    pub max_output_tokens: u32,
    /// The resolved key.
    pub api_key: ApiKey,
}

/// A failure reported by the external service or its transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderFailure {
    /// The provider's message.
    pub message: String,
    /// HTTP status, when one was received.
    pub status: Option<u16>,
}

impl ProviderFailure {
    /// Creates a failure with no HTTP status.
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            status: None,
        }
    }

    /// Attaches an HTTP status.
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Classifies the failure.
    #[must_use]
    pub fn kind(&self) -> ProviderErrorKind {
        ProviderErrorKind::classify(&self.message)
    }
}

impl From<ProviderFailure> for GatewayError {
    fn from(failure: ProviderFailure) -> Self {
        GatewayError::provider(failure.message)
    }
}

/// The replaceable text-generation service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait GenerationCapability: Send + Sync {
    /// Sends one prompt and returns the raw response text.
    async fn invoke(&self, call: CapabilityCall) -> Result<String, ProviderFailure>;
}

/// What to generate.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    /// The rendered prompt.
    pub prompt_text: String,
    /// Structure the answer must satisfy.
    pub output_schema: Option<OutputSchema>,
    /// Model identifier.
    pub model_id: String,
    /// Sampling temperature.
    pub temperature: f64,
    /// Output token limit.
    pub max_output_tokens: u32,
}

impl GenerationRequest {
    /// Creates a plain-text request using the configured parameters.
    #[must_use]
    pub fn new(prompt_text: impl Into<String>, config: &GenerationConfig) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            output_schema: None,
            model_id: config.model_id.clone(),
            temperature: config.temperature,
            max_output_tokens: config.max_output_tokens,
        }
    }

    /// Requests structured output.
    #[must_use]
    pub fn with_schema(mut self, schema: Option<OutputSchema>) -> Self {
        self.output_schema = schema;
        self
    }

    /// Sets the temperature.
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }
}

/// The answer of a generation.
#[derive(Debug, Clone, PartialEq)]
pub enum GenerationResult {
    /// A JSON object satisfying the requested schema.
    Structured(Map<String, Value>),
    /// Raw text, returned when no schema was requested.
    Text(String),
}

impl GenerationResult {
    /// Returns the text of a `Text` result.
    #[must_use]
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            Self::Structured(_) => None,
        }
    }

    /// Returns the object of a `Structured` result.
    #[must_use]
    pub fn as_structured(&self) -> Option<&Map<String, Value>> {
        match self {
            Self::Structured(map) => Some(map),
            Self::Text(_) => None,
        }
    }
}

/// Sends requests to a [`GenerationCapability`].
pub struct GenerationGateway {
    capability: Arc<dyn GenerationCapability>,
    config: GenerationConfig,
    resolver: CredentialResolver,
}

impl std::fmt::Debug for GenerationGateway {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GenerationGateway")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl GenerationGateway {
    /// Creates a gateway reading fallback keys from the process environment.
    #[must_use]
    pub fn new(capability: Arc<dyn GenerationCapability>, config: GenerationConfig) -> Self {
        Self {
            capability,
            config,
            resolver: CredentialResolver::from_env(),
        }
    }

    /// Creates a gateway over the Gemini REST API.
    #[cfg(feature = "gemini")]
    pub fn gemini(config: GenerationConfig) -> Result<Self, GatewayError> {
        let capability = GeminiCapability::new(&config)?;
        Ok(Self::new(Arc::new(capability), config))
    }

    /// Replaces the credential resolver.
    #[must_use]
    pub fn with_resolver(mut self, resolver: CredentialResolver) -> Self {
        self.resolver = resolver;
        self
    }

    /// Returns the generation parameters.
    #[must_use]
    pub fn config(&self) -> &GenerationConfig {
        &self.config
    }

    /// Creates a request with this gateway's parameters.
    #[must_use]
    pub fn request(&self, prompt_text: impl Into<String>) -> GenerationRequest {
        GenerationRequest::new(prompt_text, &self.config)
    }

    /// Generates a response.
    pub async fn generate(
        &self,
        request: GenerationRequest,
        credentials: &Credentials,
    ) -> Result<GenerationResult, GatewayError> {
        let (api_key, source) = self
            .resolver
            .resolve(credentials)
            .ok_or(GatewayError::MissingCredentials)?;

        debug!(
            model = %request.model_id,
            prompt_chars = request.prompt_text.chars().count(),
            structured = request.output_schema.is_some(),
            credential_source = %source,
            "Calling generation service"
        );

        let call = CapabilityCall {
            prompt_text: request.prompt_text,
            response_schema: request.output_schema.as_ref().map(OutputSchema::to_json_schema),
            model_id: request.model_id,
            temperature: request.temperature,
            max_output_tokens: request.max_output_tokens,
            api_key,
        };

        let raw = self.capability.invoke(call).await.map_err(|failure| {
            let err = GatewayError::from(failure);
            warn!(error = %err, "Generation service failed");
            err
        })?;

        match request.output_schema {
            Some(schema) => schema.parse(&raw).map(GenerationResult::Structured).map_err(|reason| {
                warn!(reason = %reason, "Structured output rejected");
                GatewayError::malformed(reason, raw)
            }),
            None => Ok(GenerationResult::Text(raw)),
        }
    }

    /// Checks that the resolved key is accepted by the service.
    pub async fn validate_credentials(&self, credentials: &Credentials) -> Result<(), GatewayError> {
        self.generate(self.request(VALIDATION_PROMPT), credentials)
            .await
            .map(|_| ())
    }
}
