//! Remote hosted text model over the OpenAI chat completions streaming API.

use super::sse::{SseEvent, SseParser};
use super::{upstream_error, ProviderAdapter};
use crate::api::streaming::{Event, EventSink};
use crate::core::config::RemoteConfig;
use crate::core::{get_provider_context, get_request_id, ProviderError};
use crate::services::model_router::ProviderKind;
use async_trait::async_trait;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

const DONE_MARKER: &str = "[DONE]";

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    stream: bool,
    messages: [ChatMessage<'a>; 2],
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatChunk {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: Delta,
}

#[derive(Debug, Default, Deserialize)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
}

/// Whether to keep reading the upstream stream.
#[derive(Debug, PartialEq, Eq)]
enum Flow {
    Continue,
    Done,
}

pub struct RemoteTextAdapter {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    system_prompt: String,
}

impl RemoteTextAdapter {
    pub fn new(client: reqwest::Client, config: &RemoteConfig) -> Self {
        Self {
            client,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            system_prompt: config.system_prompt.clone(),
        }
    }

    async fn handle_event(&self, event: SseEvent, sink: &EventSink) -> Result<Flow, ProviderError> {
        let Some(data) = event.data else {
            return Ok(Flow::Continue);
        };
        let data = data.trim();
        if data == DONE_MARKER {
            return Ok(Flow::Done);
        }
        if data.is_empty() {
            return Ok(Flow::Continue);
        }

        let chunk: ChatChunk = serde_json::from_str(data)?;
        if let Some(error) = chunk.error {
            return Err(ProviderError::Upstream {
                status: 200,
                message: error.to_string(),
            });
        }

        let token = chunk
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.delta.content)
            .filter(|content| !content.is_empty());

        if let Some(token) = token {
            sink.emit(Event::text(token)).await?;
        }
        Ok(Flow::Continue)
    }
}

#[async_trait]
impl ProviderAdapter for RemoteTextAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::RemoteText
    }

    async fn run(
        &self,
        prompt: &str,
        model_id: &str,
        sink: &EventSink,
    ) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "remote API key is not set".to_string(),
            ));
        }

        let url = format!("{}/chat/completions", self.api_base);
        let payload = ChatRequest {
            model: model_id,
            stream: true,
            messages: [
                ChatMessage {
                    role: "system",
                    content: &self.system_prompt,
                },
                ChatMessage {
                    role: "user",
                    content: prompt,
                },
            ],
        };

        tracing::debug!(
            request_id = %get_request_id(),
            provider = %get_provider_context(),
            url = %url,
            model = %model_id,
            "Opening remote completion stream"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&payload)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let mut parser = SseParser::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let chunk = chunk?;
            for event in parser.push(&chunk) {
                if self.handle_event(event, sink).await? == Flow::Done {
                    return Ok(());
                }
            }
        }

        if let Some(event) = parser.finish() {
            self.handle_event(event, sink).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::StreamCancelHandle;

    fn adapter() -> RemoteTextAdapter {
        RemoteTextAdapter::new(
            reqwest::Client::new(),
            &RemoteConfig {
                api_base: "http://localhost:1/v1/".to_string(),
                api_key: "sk-test".to_string(),
                system_prompt: "Be precise.".to_string(),
            },
        )
    }

    fn data(s: &str) -> SseEvent {
        SseEvent {
            event: None,
            data: Some(s.to_string()),
        }
    }

    #[test]
    fn test_api_base_trailing_slash_trimmed() {
        assert_eq!(adapter().api_base, "http://localhost:1/v1");
    }

    #[test]
    fn test_request_shape() {
        let payload = ChatRequest {
            model: "gpt-4o-mini",
            stream: true,
            messages: [
                ChatMessage {
                    role: "system",
                    content: "Be precise.",
                },
                ChatMessage {
                    role: "user",
                    content: "hello",
                },
            ],
        };
        assert_eq!(
            serde_json::to_value(&payload).unwrap(),
            serde_json::json!({
                "model": "gpt-4o-mini",
                "stream": true,
                "messages": [
                    {"role": "system", "content": "Be precise."},
                    {"role": "user", "content": "hello"}
                ]
            })
        );
    }

    #[tokio::test]
    async fn test_handle_event_emits_non_empty_deltas() {
        let adapter = adapter();
        let (sink, mut rx) = EventSink::channel(StreamCancelHandle::new());

        let chunks = [
            r#"{"choices":[{"delta":{"role":"assistant"}}]}"#,
            r#"{"choices":[{"delta":{"content":"Hel"}}]}"#,
            r#"{"choices":[{"delta":{"content":""}}]}"#,
            r#"{"choices":[]}"#,
            r#"{"choices":[{"delta":{"content":"lo"}}]}"#,
        ];
        for chunk in chunks {
            assert_eq!(
                adapter.handle_event(data(chunk), &sink).await.unwrap(),
                Flow::Continue
            );
        }
        assert_eq!(
            adapter.handle_event(data("[DONE]"), &sink).await.unwrap(),
            Flow::Done
        );
        sink.close();

        let mut events = Vec::new();
        while let Some(event) = rx.recv().await {
            events.push(event);
        }
        assert_eq!(events, vec![Event::text("Hel"), Event::text("lo")]);
    }

    #[tokio::test]
    async fn test_handle_event_malformed_chunk() {
        let adapter = adapter();
        let (sink, _rx) = EventSink::channel(StreamCancelHandle::new());
        let err = adapter
            .handle_event(data("{not json"), &sink)
            .await
            .unwrap_err();
        assert!(matches!(err, ProviderError::Malformed(_)));
    }

    #[tokio::test]
    async fn test_handle_event_inline_error() {
        let adapter = adapter();
        let (sink, _rx) = EventSink::channel(StreamCancelHandle::new());
        let err = adapter
            .handle_event(data(r#"{"error":{"message":"quota exceeded"}}"#), &sink)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("quota exceeded"));
    }

    #[tokio::test]
    async fn test_missing_api_key_is_not_configured() {
        let adapter = RemoteTextAdapter::new(reqwest::Client::new(), &RemoteConfig::default());
        let (sink, _rx) = EventSink::channel(StreamCancelHandle::new());
        let err = adapter.run("hello", "gpt-4o-mini", &sink).await.unwrap_err();
        assert!(matches!(err, ProviderError::NotConfigured(_)));
    }
}
