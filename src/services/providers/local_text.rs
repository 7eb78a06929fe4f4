//! Locally hosted text model over an Ollama-style streaming generate endpoint.
//!
//! The body is forwarded chunk by chunk exactly as the transport delivers it;
//! no line reassembly is done. Only an incomplete UTF-8 sequence at the end of
//! a chunk is held back until the next one arrives.

use super::{upstream_error, ProviderAdapter};
use crate::api::streaming::{Event, EventSink};
use crate::core::config::LocalConfig;
use crate::core::{get_provider_context, get_request_id, ProviderError};
use crate::services::model_router::ProviderKind;
use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;

#[derive(Debug, Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
}

/// Decodes a byte stream as UTF-8 one chunk at a time.
#[derive(Debug, Default)]
pub struct Utf8ChunkDecoder {
    pending: Vec<u8>,
}

impl Utf8ChunkDecoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode `chunk` plus anything held back from the previous call.
    ///
    /// Invalid sequences become U+FFFD. A sequence cut off by the chunk
    /// boundary is kept for the next call.
    pub fn decode(&mut self, chunk: &[u8]) -> String {
        self.pending.extend_from_slice(chunk);

        let mut out = String::with_capacity(self.pending.len());
        let mut rest: &[u8] = &self.pending;
        loop {
            match std::str::from_utf8(rest) {
                Ok(valid) => {
                    out.push_str(valid);
                    rest = &[];
                    break;
                }
                Err(e) => {
                    let (valid, after) = rest.split_at(e.valid_up_to());
                    out.push_str(&String::from_utf8_lossy(valid));
                    match e.error_len() {
                        Some(len) => {
                            out.push(char::REPLACEMENT_CHARACTER);
                            rest = &after[len..];
                        }
                        None => {
                            rest = after;
                            break;
                        }
                    }
                }
            }
        }

        let remainder = rest.to_vec();
        self.pending = remainder;
        out
    }

    /// Flush whatever is still held back at end of stream.
    pub fn finish(&mut self) -> String {
        let pending = std::mem::take(&mut self.pending);
        String::from_utf8_lossy(&pending).into_owned()
    }
}

pub struct LocalTextAdapter {
    client: reqwest::Client,
    endpoint: String,
}

impl LocalTextAdapter {
    pub fn new(client: reqwest::Client, config: &LocalConfig) -> Self {
        Self {
            client,
            endpoint: config.endpoint.clone(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for LocalTextAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::LocalText
    }

    async fn run(
        &self,
        prompt: &str,
        model_id: &str,
        sink: &EventSink,
    ) -> Result<(), ProviderError> {
        tracing::debug!(
            request_id = %get_request_id(),
            provider = %get_provider_context(),
            url = %self.endpoint,
            model = %model_id,
            "Opening local generation stream"
        );

        let response = self
            .client
            .post(&self.endpoint)
            .json(&GenerateRequest {
                model: model_id,
                prompt,
                stream: true,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let mut decoder = Utf8ChunkDecoder::new();
        let mut body = response.bytes_stream();

        while let Some(chunk) = body.next().await {
            let text = decoder.decode(&chunk?);
            if !text.is_empty() {
                sink.emit(Event::text(text)).await?;
            }
        }

        let tail = decoder.finish();
        if !tail.is_empty() {
            sink.emit(Event::text(tail)).await?;
        }
        Ok(())
    }
}
