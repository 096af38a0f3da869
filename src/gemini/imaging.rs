//! Gemini image generation over the REST `generateContent` endpoint.

use crate::audio::codec::decode_base64;
use crate::gemini::{
    Content, GenerateContentRequest, GenerateContentResponse, ImageConfig, ImageGenerationConfig,
};
use crate::imaging::{ImageGenerator, ImagingError};
use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, info};

/// Public generative-language REST base.
pub const DEFAULT_IMAGING_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";

/// Image generator backed by a Gemini image model.
pub struct GeminiImageGenerator {
    client: reqwest::Client,
    endpoint: String,
    api_key: String,
    model: String,
    aspect_ratio: String,
    image_size: String,
    timeout: Duration,
}

impl GeminiImageGenerator {
    pub fn new(endpoint: impl Into<String>, api_key: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            model: model.into(),
            aspect_ratio: "16:9".to_string(),
            image_size: "1K".to_string(),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_format(mut self, aspect_ratio: impl Into<String>, image_size: impl Into<String>) -> Self {
        self.aspect_ratio = aspect_ratio.into();
        self.image_size = image_size.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    fn url(&self) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.endpoint.trim_end_matches('/'),
            self.model
        )
    }

    fn request(&self, prompt: &str) -> GenerateContentRequest {
        GenerateContentRequest {
            contents: vec![Content::text(None, prompt)],
            generation_config: ImageGenerationConfig {
                response_modalities: vec!["TEXT".to_string(), "IMAGE".to_string()],
                image_config: ImageConfig {
                    aspect_ratio: self.aspect_ratio.clone(),
                    image_size: self.image_size.clone(),
                },
            },
        }
    }
}

/// Pull the first inline image out of a response body.
fn extract_image(response: &GenerateContentResponse) -> Result<Vec<u8>, ImagingError> {
    let data = response.first_inline_data().ok_or(ImagingError::NoImage)?;
    decode_base64(data).map_err(|e| ImagingError::InvalidPayload(e.to_string()))
}

#[async_trait]
impl ImageGenerator for GeminiImageGenerator {
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, ImagingError> {
        if self.api_key.is_empty() {
            return Err(ImagingError::Request("no API key configured".to_string()));
        }

        info!(model = %self.model, aspect_ratio = %self.aspect_ratio, "Requesting planet image");

        let response = self
            .client
            .post(self.url())
            .header("x-goog-api-key", &self.api_key)
            .json(&self.request(prompt))
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| ImagingError::Request(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ImagingError::Status {
                code: status.as_u16(),
                body,
            });
        }

        let body: GenerateContentResponse = response
            .json()
            .await
            .map_err(|e| ImagingError::InvalidPayload(e.to_string()))?;

        let image = extract_image(&body)?;
        debug!(bytes = image.len(), "Planet image received");
        Ok(image)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_body() {
        let generator = GeminiImageGenerator::new(DEFAULT_IMAGING_ENDPOINT, "key", "gemini-3-pro-image-preview");
        let json = serde_json::to_value(generator.request("a red planet")).unwrap();

        assert_eq!(json["contents"][0]["parts"][0]["text"], "a red planet");
        assert_eq!(json["generationConfig"]["imageConfig"]["aspectRatio"], "16:9");
        assert_eq!(json["generationConfig"]["imageConfig"]["imageSize"], "1K");
        assert_eq!(
            generator.url(),
            "https://generativelanguage.googleapis.com/v1beta/models/gemini-3-pro-image-preview:generateContent"
        );
    }

    #[test]
    fn test_extract_image() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "iVBORw=="}}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_image(&response).unwrap(), vec![0x89, b'P', b'N', b'G']);
    }

    #[test]
    fn test_text_only_response_has_no_image() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"text": "I cannot draw that"}]}}]}"#,
        )
        .unwrap();
        assert_eq!(extract_image(&response), Err(ImagingError::NoImage));
    }

    #[test]
    fn test_corrupt_image_payload() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"parts": [{"inlineData": {"mimeType": "image/png", "data": "%%%"}}]}}]}"#,
        )
        .unwrap();
        assert!(matches!(extract_image(&response), Err(ImagingError::InvalidPayload(_))));
    }

    #[tokio::test]
    async fn test_missing_key() {
        let generator = GeminiImageGenerator::new(DEFAULT_IMAGING_ENDPOINT, "", "model");
        assert!(matches!(
            generator.generate_image("prompt").await,
            Err(ImagingError::Request(_))
        ));
    }
}
