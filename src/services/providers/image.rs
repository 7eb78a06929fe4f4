//! Image synthesis over the OpenAI images API. Single-shot, no streaming.

use super::{upstream_error, ProviderAdapter};
use crate::api::streaming::{Event, EventSink};
use crate::core::{get_provider_context, get_request_id, ProviderError};
use crate::services::model_router::ProviderKind;
use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::{Deserialize, Serialize};

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    size: &'a str,
    n: u32,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageDatum>,
}

#[derive(Debug, Default, Deserialize)]
struct ImageDatum {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// Media type from the leading magic bytes; PNG when unrecognised.
fn sniff_media_type(bytes: &[u8]) -> &'static str {
    match bytes {
        [0x89, b'P', b'N', b'G', ..] => "image/png",
        [0xFF, 0xD8, 0xFF, ..] => "image/jpeg",
        [b'G', b'I', b'F', b'8', ..] => "image/gif",
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => "image/webp",
        _ => "image/png",
    }
}

/// Pick the client-facing payload: inline base64 as a data URL, else the URL.
fn image_payload(datum: ImageDatum) -> Result<String, ProviderError> {
    if let Some(b64) = datum.b64_json.filter(|s| !s.is_empty()) {
        let bytes = STANDARD
            .decode(b64.as_bytes())
            .map_err(|e| ProviderError::Malformed(format!("invalid base64 image: {}", e)))?;
        return Ok(format!("data:{};base64,{}", sniff_media_type(&bytes), b64));
    }

    if let Some(url) = datum.url.filter(|s| !s.is_empty()) {
        return Ok(url);
    }

    Err(ProviderError::Malformed(
        "image response has neither b64_json nor url".to_string(),
    ))
}

pub struct ImageAdapter {
    client: reqwest::Client,
    api_base: String,
    api_key: String,
    size: String,
}

impl ImageAdapter {
    pub fn new(client: reqwest::Client, api_base: &str, api_key: &str, size: &str) -> Self {
        Self {
            client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            size: size.to_string(),
        }
    }
}

#[async_trait]
impl ProviderAdapter for ImageAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Image
    }

    async fn run(
        &self,
        prompt: &str,
        model_id: &str,
        sink: &EventSink,
    ) -> Result<(), ProviderError> {
        if self.api_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "image API key is not set".to_string(),
            ));
        }

        let url = format!("{}/images/generations", self.api_base);
        tracing::debug!(
            request_id = %get_request_id(),
            provider = %get_provider_context(),
            url = %url,
            model = %model_id,
            size = %self.size,
            "Requesting image generation"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&ImageRequest {
                model: model_id,
                prompt,
                size: &self.size,
                n: 1,
            })
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(upstream_error(response).await);
        }

        let body = response.bytes().await?;
        let parsed: ImageResponse = serde_json::from_slice(&body)?;
        let datum = parsed
            .data
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Malformed("image response has no data".to_string()))?;

        sink.emit(Event::image(image_payload(datum)?)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_matches::assert_matches;

    const PNG_HEADER: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A, 0x1A, 0x0A];

    #[test]
    fn test_sniff_media_type() {
        assert_eq!(sniff_media_type(PNG_HEADER), "image/png");
        assert_eq!(sniff_media_type(&[0xFF, 0xD8, 0xFF, 0xE0]), "image/jpeg");
        assert_eq!(sniff_media_type(b"GIF89a"), "image/gif");
        assert_eq!(sniff_media_type(b"RIFF\x00\x00\x00\x00WEBPVP8 "), "image/webp");
        assert_eq!(sniff_media_type(b""), "image/png");
    }

    #[test]
    fn test_payload_prefers_base64() {
        let b64 = STANDARD.encode([0xFF, 0xD8, 0xFF, 0xE0, 0x00]);
        let payload = image_payload(ImageDatum {
            b64_json: Some(b64.clone()),
            url: Some("https://cdn.example/img.png".to_string()),
        })
        .unwrap();
        assert_eq!(payload, format!("data:image/jpeg;base64,{}", b64));
    }

    #[test]
    fn test_payload_falls_back_to_url() {
        let payload = image_payload(ImageDatum {
            b64_json: Some(String::new()),
            url: Some("https://cdn.example/img.png".to_string()),
        })
        .unwrap();
        assert_eq!(payload, "https://cdn.example/img.png");
    }

    #[test]
    fn test_payload_rejects_invalid_base64() {
        let err = image_payload(ImageDatum {
            b64_json: Some("***not base64***".to_string()),
            url: None,
        })
        .unwrap_err();
        assert_matches!(err, ProviderError::Malformed(_));
    }

    #[test]
    fn test_payload_requires_some_form() {
        assert_matches!(
            image_payload(ImageDatum::default()),
            Err(ProviderError::Malformed(_))
        );
    }

    #[test]
    fn test_request_shape() {
        let body = serde_json::to_value(ImageRequest {
            model: "gpt-image-1",
            prompt: "a lighthouse",
            size: "1024x1024",
            n: 1,
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({
                "model": "gpt-image-1",
                "prompt": "a lighthouse",
                "size": "1024x1024",
                "n": 1
            })
        );
    }
}
