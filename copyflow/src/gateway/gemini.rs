//! Gemini REST capability.

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{CapabilityCall, GenerationCapability, ProviderFailure};
use crate::config::GenerationConfig;

/// Calls `models/{model}:generateContent` on the Gemini REST API.
#[derive(Debug, Clone)]
pub struct GeminiCapability {
    client: reqwest::Client,
    endpoint: String,
}

impl GeminiCapability {
    /// Creates a capability using the endpoint and timeout from `config`.
    pub fn new(config: &GenerationConfig) -> Result<Self, ProviderFailure> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ProviderFailure::new(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: config.endpoint.trim_end_matches('/').to_string(),
        })
    }

    fn url(&self, model_id: &str) -> String {
        format!("{}/models/{model_id}:generateContent", self.endpoint)
    }
}

/// Builds the request body of a call.
pub(crate) fn request_body(call: &CapabilityCall) -> Value {
    let mut generation_config = Map::new();
    generation_config.insert("temperature".to_string(), json!(call.temperature));
    generation_config.insert("maxOutputTokens".to_string(), json!(call.max_output_tokens));
    if let Some(schema) = &call.response_schema {
        generation_config.insert("responseMimeType".to_string(), json!("application/json"));
        generation_config.insert("responseSchema".to_string(), schema.clone());
    }

    json!({
        "contents": [{"role": "user", "parts": [{"text": call.prompt_text}]}],
        "generationConfig": generation_config,
    })
}

/// Turns an error body into a failure whose message carries the status name.
pub(crate) fn error_from_body(status: u16, body: &Value) -> ProviderFailure {
    let error = &body["error"];
    let message = error["message"].as_str().unwrap_or("request failed");
    let text = match error["status"].as_str() {
        Some(code) => format!("{code}: {message}"),
        None => format!("HTTP {status}: {message}"),
    };
    ProviderFailure::new(text).with_status(status)
}

/// Extracts the generated text from a successful response body.
pub(crate) fn extract_text(body: &Value) -> Result<String, ProviderFailure> {
    let candidates = body["candidates"].as_array().map_or(&[][..], Vec::as_slice);

    let Some(candidate) = candidates.first() else {
        return Err(match body["promptFeedback"]["blockReason"].as_str() {
            Some(reason) => ProviderFailure::new(format!("Prompt blocked: {reason}")),
            None => ProviderFailure::new("Empty response from model"),
        });
    };

    let text: String = candidate["content"]["parts"]
        .as_array()
        .map(|parts| parts.iter().filter_map(|p| p["text"].as_str()).collect())
        .unwrap_or_default();

    if text.is_empty() {
        let reason = candidate["finishReason"].as_str().unwrap_or("UNKNOWN");
        return Err(ProviderFailure::new(format!(
            "Empty response from model (finishReason: {reason})"
        )));
    }
    Ok(text)
}

#[async_trait]
impl GenerationCapability for GeminiCapability {
    async fn invoke(&self, call: CapabilityCall) -> Result<String, ProviderFailure> {
        let response = self
            .client
            .post(self.url(&call.model_id))
            .header("x-goog-api-key", call.api_key.expose())
            .json(&request_body(&call))
            .send()
            .await
            .map_err(|e| ProviderFailure::new(format!("Request failed: {e}")))?;

        let status = response.status();
        let body: Value = response
            .json()
            .await
            .map_err(|e| ProviderFailure::new(format!("Unreadable response: {e}")).with_status(status.as_u16()))?;

        if !status.is_success() {
            return Err(error_from_body(status.as_u16(), &body));
        }
        extract_text(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::ProviderErrorKind;
    use crate::gateway::ApiKey;

    fn call(schema: Option<Value>) -> CapabilityCall {
        CapabilityCall {
            prompt_text: "写一段话".to_string(),
            response_schema: schema,
            model_id: "gemini-2.5-flash".to_string(),
            temperature: 0.3,
            max_output_tokens: 1024,
            api_key: ApiKey::new("k").unwrap(),
        }
    }

    #[test]
    fn test_request_body_plain() {
        let body = request_body(&call(None));
        assert_eq!(body["contents"][0]["parts"][0]["text"], "写一段话");
        assert_eq!(body["generationConfig"]["maxOutputTokens"], 1024);
        assert!(body["generationConfig"].get("responseSchema").is_none());
    }

    #[test]
    fn test_request_body_with_schema() {
        let body = request_body(&call(Some(json!({"type": "OBJECT"}))));
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert_eq!(body["generationConfig"]["responseSchema"]["type"], "OBJECT");
    }

    #[test]
    fn test_url() {
        let capability =
            GeminiCapability::new(&GenerationConfig::default().with_endpoint("http://localhost/v1/"))
                .unwrap();
        assert_eq!(
            capability.url("gemini-2.5-flash"),
            "http://localhost/v1/models/gemini-2.5-flash:generateContent"
        );
    }

    #[test]
    fn test_extract_text_joins_parts() {
        let body = json!({"candidates": [{"content": {"parts": [{"text": "你"}, {"text": "好"}]}}]});
        assert_eq!(extract_text(&body).unwrap(), "你好");
    }

    #[test]
    fn test_blocked_prompt_classifies_as_filtered() {
        let body = json!({"candidates": [], "promptFeedback": {"blockReason": "SAFETY"}});
        let failure = extract_text(&body).unwrap_err();
        assert_eq!(failure.kind(), ProviderErrorKind::ContentFiltered);
    }

    #[test]
    fn test_safety_finish_reason() {
        let body = json!({"candidates": [{"finishReason": "SAFETY"}]});
        assert_eq!(
            extract_text(&body).unwrap_err().kind(),
            ProviderErrorKind::ContentFiltered
        );
    }

    #[test]
    fn test_error_body_classification() {
        let body = json!({"error": {"code": 400, "message": "API key not valid. Please pass a valid API key.", "status": "INVALID_ARGUMENT"}});
        let failure = error_from_body(400, &body);
        assert_eq!(failure.status, Some(400));
        assert_eq!(failure.kind(), ProviderErrorKind::InvalidCredentials);

        let body = json!({"error": {"code": 429, "message": "Too many requests", "status": "RESOURCE_EXHAUSTED"}});
        assert_eq!(error_from_body(429, &body).kind(), ProviderErrorKind::QuotaExceeded);

        let body = json!({"error": {"code": 403, "message": "denied", "status": "PERMISSION_DENIED"}});
        assert_eq!(error_from_body(403, &body).kind(), ProviderErrorKind::PermissionDenied);
    }
}
