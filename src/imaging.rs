//! # Planet Imaging
//!
//! The "deep scan" feature: turn a planet description into a cinematic
//! orbital image using a generative image model.

use async_trait::async_trait;
use std::fmt;

/// Errors from an image generation request.
#[derive(Debug, Clone, PartialEq)]
pub enum ImagingError {
    /// The request never produced a response (network, timeout, TLS)
    Request(String),

    /// The vendor answered with a non-success status
    Status { code: u16, body: String },

    /// The response contained no image part
    NoImage,

    /// The response or its image payload could not be decoded
    InvalidPayload(String),
}

impl fmt::Display for ImagingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ImagingError::Request(msg) => write!(f, "Image request failed: {}", msg),
            ImagingError::Status { code, body } => {
                write!(f, "Image service returned {}: {}", code, body)
            }
            ImagingError::NoImage => write!(f, "No image data found in response"),
            ImagingError::InvalidPayload(msg) => write!(f, "Invalid image payload: {}", msg),
        }
    }
}

impl std::error::Error for ImagingError {}

/// Generates images from text prompts.
#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// Generate one image and return its encoded bytes (PNG).
    async fn generate_image(&self, prompt: &str) -> Result<Vec<u8>, ImagingError>;
}

/// Build the orbital-view prompt for a planet description.
pub fn planet_visual_prompt(description: &str) -> String {
    format!(
        "Generate a photorealistic, cinematic 8k image of {}. \
         The view should be from orbit, showing the curvature of the planet against the blackness of space. \
         Lighting should be dramatic (chiaroscuro), highlighting surface textures, craters, or clouds. \
         Ensure scientific plausibility while maintaining artistic grandeur. \
         No text or labels overlay.",
        description.trim()
    )
}

/// Render image bytes as a `data:` URL the browser can display directly.
pub fn png_data_url(bytes: &[u8]) -> String {
    format!("data:image/png;base64,{}", crate::audio::codec::encode_base64(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prompt_embeds_description() {
        let prompt = planet_visual_prompt("  Mars, the red planet ");

        assert!(prompt.starts_with("Generate a photorealistic, cinematic 8k image of Mars, the red planet."));
        assert!(prompt.contains("view should be from orbit"));
        assert!(prompt.ends_with("No text or labels overlay."));
    }

    #[test]
    fn test_data_url() {
        assert_eq!(png_data_url(&[0x89, b'P', b'N', b'G']), "data:image/png;base64,iVBORw==");
    }

    #[test]
    fn test_status_error_display() {
        let err = ImagingError::Status { code: 429, body: "quota".to_string() };
        assert_eq!(err.to_string(), "Image service returned 429: quota");
    }
}
