//! Request and response models for the gateway API.
//!
//! These types are serialized with serde and documented with utoipa.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use utoipa::ToSchema;

/// Body of `/api/ai/stream` and `/api/ai/generate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"model": "fast", "prompt": "Write a binary search in Rust"}))]
pub struct PromptRequest {
    /// Model alias; unknown or missing aliases use the default route
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt: Option<String>,
}

impl PromptRequest {
    /// Parse a request body, treating anything malformed as an empty request.
    ///
    /// Fields are read independently: one that is not a string is dropped
    /// without discarding the other. Validation happens afterwards, so a bad
    /// body surfaces as a missing prompt rather than a parse error.
    pub fn parse_lenient(body: &[u8]) -> Self {
        let value: Value = match serde_json::from_slice(body) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(error = %e, "Request body is not valid JSON");
                return Self::default();
            }
        };

        let field = |name: &str| value.get(name).and_then(Value::as_str).map(String::from);
        Self {
            model: field("model"),
            prompt: field("prompt"),
        }
    }

    /// The prompt, if present and non-empty.
    pub fn prompt(&self) -> Option<&str> {
        self.prompt.as_deref().filter(|p| !p.is_empty())
    }
}

/// Result of `/api/ai/generate`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"model": "fast", "provider": "remote_text", "text": "fn main() {}"}))]
pub struct GenerateResponse {
    pub model: String,
    pub provider: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    /// Data URL or hosted URL of the generated image
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"path": "notes/todo.md", "content": "- ship it"}))]
pub struct FsWriteRequest {
    /// Path relative to the data directory
    pub path: String,
    /// Strings are written as-is, any other JSON value pretty-printed
    #[schema(value_type = Object)]
    pub content: Value,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FsWriteResponse {
    pub ok: bool,
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"path": "notes/todo.md"}))]
pub struct FsReadRequest {
    pub path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct FsReadResponse {
    pub path: String,
    pub content: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct SessionSaveResponse {
    pub ok: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[schema(example = json!({"status": "ok", "time": "2024-05-01T12:00:00Z"}))]
pub struct PingResponse {
    pub status: String,
    pub time: chrono::DateTime<chrono::Utc>,
}

/// Error body shared by every non-streaming endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorResponse {
    pub error: ErrorDetail,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ErrorDetail {
    pub message: String,
    #[serde(rename = "type")]
    pub error_type: String,
    pub code: u16,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_lenient_valid() {
        let req = PromptRequest::parse_lenient(br#"{"model":"smart","prompt":"hi"}"#);
        assert_eq!(req.model.as_deref(), Some("smart"));
        assert_eq!(req.prompt(), Some("hi"));
    }

    #[test]
    fn test_parse_lenient_malformed_is_empty() {
        for body in [&b"{not json"[..], b"", b"null", b"[1,2]", br#"{"prompt": 5}"#] {
            assert_eq!(PromptRequest::parse_lenient(body), PromptRequest::default());
        }
    }

    #[test]
    fn test_parse_lenient_keeps_fields_independently() {
        let req = PromptRequest::parse_lenient(br#"{"model":5,"prompt":"hi"}"#);
        assert_eq!(req.model, None);
        assert_eq!(req.prompt(), Some("hi"));

        let req = PromptRequest::parse_lenient(br#"{"model":"image","prompt":["a"]}"#);
        assert_eq!(req.model.as_deref(), Some("image"));
        assert_eq!(req.prompt(), None);
    }

    #[test]
    fn test_parse_lenient_ignores_unknown_fields() {
        let req = PromptRequest::parse_lenient(br#"{"prompt":"hi","temperature":0.2}"#);
        assert_eq!(req.prompt(), Some("hi"));
        assert!(req.model.is_none());
    }

    #[test]
    fn test_empty_prompt_is_missing() {
        let req = PromptRequest::parse_lenient(br#"{"prompt":""}"#);
        assert_eq!(req.prompt(), None);
    }

    #[test]
    fn test_generate_response_omits_absent_payload() {
        let body = serde_json::to_value(GenerateResponse {
            model: "image".to_string(),
            provider: "image".to_string(),
            text: None,
            image: Some("data:image/png;base64,AAAA".to_string()),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "image",
                "provider": "image",
                "image": "data:image/png;base64,AAAA"
            })
        );
    }
}
