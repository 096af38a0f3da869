//! # Configuration Management
//!
//! Settings for the HTTP server, the live voice session, deep scan image
//! generation and the audio pipeline. API keys are secrets: they are never
//! echoed by the config endpoint and cannot be changed at runtime.
//!
//! ## Sources (highest priority first):
//! 1. Special environment variables (HOST, PORT, GEMINI_API_KEY, API_KEY)
//! 2. Environment variables (APP__SERVER__PORT, APP__LIVE__VOICE_NAME, etc.)
//! 3. Configuration file (config.toml)
//! 4. Default values (defined in the Default impl)

use crate::audio::DEFAULT_CAPTURE_BLOCK_SIZE;
use crate::gemini::imaging::DEFAULT_IMAGING_ENDPOINT;
use crate::gemini::live::DEFAULT_LIVE_ENDPOINT;
use crate::voice::{LinkOptions, LiveSetup};
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;

/// Persona of the ship's AI that answers the pilot.
pub const DEFAULT_SYSTEM_INSTRUCTION: &str = "\
You are Dr. Nexus, the ship's AI Commander and senior astrophysicist on the Orbital Nexus exploration vessel.
Your voice is deep, calm, intelligent, and authoritative, like a seasoned scientist or a high-end documentary narrator.
You are communicating directly with the pilot (the user) via a neural link.

Behavioral Guidelines:
1. Scientific Accuracy: Always be scientifically grounded. Use correct terminology (e.g., \"orbital period,\" \"atmospheric composition,\" \"silicate crust\").
2. Tone: Wonder, awe, and precision. Space is dangerous but beautiful.
3. Brevity: Keep initial responses concise (2-3 sentences) unless asked for a \"Deep Scan\" or detailed explanation.
4. Interaction: When the user selects a planet, brief them on it. If they ask to \"scan\", describe the visual data coming in from the sensors vividly.

Example Interaction:
User: Selects Mars.
Dr. Nexus: \"Target confirmed: Mars. The Red Planet. A cold, desert world with a thin carbon dioxide atmosphere. Note the massive shield volcanoes and the scar of Valles Marineris.\"
";

/// Complete service configuration, one group per concern.
///
/// A partial JSON update can touch one group without restating the others.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub live: LiveConfig,
    pub imaging: ImagingConfig,
    pub audio: AudioConfig,
}

/// Bind address. Use `0.0.0.0` to accept browsers from other hosts.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Live conversation (voice) settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LiveConfig {
    /// WebSocket endpoint of the live API
    pub endpoint: String,
    /// API key; never returned by the config endpoint
    pub api_key: String,
    pub model: String,
    /// Prebuilt voice used for the agent's speech
    pub voice_name: String,
    pub system_instruction: String,
    /// Seconds to wait for the remote handshake
    pub handshake_timeout_secs: u64,
}

/// Image generation ("deep scan") settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagingConfig {
    /// REST base of the generative-language API
    pub endpoint: String,
    pub api_key: String,
    pub model: String,
    pub aspect_ratio: String,
    pub image_size: String,
    pub timeout_secs: u64,
}

/// Audio pipeline tuning.
///
/// The sample rates themselves are fixed by the wire contract and are not
/// configurable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    /// Mono samples per captured block (power of two, 256..=16384)
    pub capture_block_size: usize,
    /// Outbound frames buffered before capture starts dropping them
    pub outbound_queue_frames: usize,
    /// Inbound events buffered from the live session
    pub inbound_queue_chunks: usize,
}

/// Defaults are enough to start; only the API key has to come from the
/// environment.
impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "127.0.0.1".to_string(),
                port: 8080,
            },
            live: LiveConfig {
                endpoint: DEFAULT_LIVE_ENDPOINT.to_string(),
                api_key: String::new(),
                model: "gemini-2.5-flash-native-audio-preview-09-2025".to_string(),
                voice_name: "Kore".to_string(),
                system_instruction: DEFAULT_SYSTEM_INSTRUCTION.to_string(),
                handshake_timeout_secs: 15,
            },
            imaging: ImagingConfig {
                endpoint: DEFAULT_IMAGING_ENDPOINT.to_string(),
                api_key: String::new(),
                model: "gemini-3-pro-image-preview".to_string(),
                aspect_ratio: "16:9".to_string(),
                image_size: "1K".to_string(),
                timeout_secs: 120,
            },
            audio: AudioConfig {
                capture_block_size: DEFAULT_CAPTURE_BLOCK_SIZE,
                outbound_queue_frames: 32,
                inbound_queue_chunks: 256,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from multiple sources in priority order.
    ///
    /// ## Configuration Loading Process:
    /// 1. Start with built-in defaults
    /// 2. Override with values from config.toml (if it exists)
    /// 3. Override with environment variables prefixed with APP__
    /// 4. Handle special cases for HOST, PORT and the API key
    ///
    /// ## Environment Variable Examples:
    /// - `APP__SERVER__PORT=3000`: Override server port
    /// - `APP__LIVE__VOICE_NAME=Puck`: Override the agent voice
    /// - `GEMINI_API_KEY=...` (or `API_KEY`): Key for both live and imaging
    ///
    /// The double underscore separator keeps field names such as
    /// `voice_name` intact.
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("__")
                    .separator("__"),
            );

        if let Ok(host) = env::var("HOST") {
            settings = settings.set_override("server.host", host)?;
        }

        if let Ok(port) = env::var("PORT") {
            settings = settings.set_override("server.port", port)?;
        }

        if let Some(key) = env::var("GEMINI_API_KEY").ok().or_else(|| env::var("API_KEY").ok()) {
            settings = settings
                .set_override("live.api_key", key.clone())?
                .set_override("imaging.api_key", key)?;
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration values make sense.
    ///
    /// A missing API key is not an error here: the service still starts and
    /// reports the problem when a session or scan is attempted.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.live.model.trim().is_empty() || self.imaging.model.trim().is_empty() {
            return Err(anyhow::anyhow!("Model names cannot be empty"));
        }

        if self.live.voice_name.trim().is_empty() {
            return Err(anyhow::anyhow!("Voice name cannot be empty"));
        }

        if self.live.handshake_timeout_secs == 0 || self.imaging.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Timeouts must be greater than 0"));
        }

        let block = self.audio.capture_block_size;
        if !block.is_power_of_two() || !(256..=16384).contains(&block) {
            return Err(anyhow::anyhow!(
                "Capture block size must be a power of two between 256 and 16384, got {}",
                block
            ));
        }

        if self.audio.outbound_queue_frames == 0 || self.audio.inbound_queue_chunks == 0 {
            return Err(anyhow::anyhow!("Audio queue sizes must be greater than 0"));
        }

        Ok(())
    }

    /// Update configuration from a JSON string (used for runtime config updates).
    ///
    /// Only the fields present in the JSON are changed, for example
    /// `{"live": {"voice_name": "Puck"}}`. API keys and endpoints cannot be
    /// changed at runtime. If the result fails validation, nothing is changed.
    pub fn update_from_json(&mut self, json_str: &str) -> Result<()> {
        let partial_config: serde_json::Value = serde_json::from_str(json_str)?;
        let mut updated = self.clone();

        if let Some(server) = partial_config.get("server") {
            if let Some(host) = server.get("host").and_then(|v| v.as_str()) {
                updated.server.host = host.to_string();
            }
            if let Some(port) = server.get("port").and_then(|v| v.as_u64()) {
                updated.server.port = u16::try_from(port)
                    .map_err(|_| anyhow::anyhow!("Server port out of range: {}", port))?;
            }
        }

        if let Some(live) = partial_config.get("live") {
            if let Some(model) = live.get("model").and_then(|v| v.as_str()) {
                updated.live.model = model.to_string();
            }
            if let Some(voice) = live.get("voice_name").and_then(|v| v.as_str()) {
                updated.live.voice_name = voice.to_string();
            }
            if let Some(instruction) = live.get("system_instruction").and_then(|v| v.as_str()) {
                updated.live.system_instruction = instruction.to_string();
            }
            if let Some(timeout) = live.get("handshake_timeout_secs").and_then(|v| v.as_u64()) {
                updated.live.handshake_timeout_secs = timeout;
            }
        }

        if let Some(imaging) = partial_config.get("imaging") {
            if let Some(model) = imaging.get("model").and_then(|v| v.as_str()) {
                updated.imaging.model = model.to_string();
            }
            if let Some(ratio) = imaging.get("aspect_ratio").and_then(|v| v.as_str()) {
                updated.imaging.aspect_ratio = ratio.to_string();
            }
            if let Some(size) = imaging.get("image_size").and_then(|v| v.as_str()) {
                updated.imaging.image_size = size.to_string();
            }
            if let Some(timeout) = imaging.get("timeout_secs").and_then(|v| v.as_u64()) {
                updated.imaging.timeout_secs = timeout;
            }
        }

        if let Some(audio) = partial_config.get("audio") {
            if let Some(block) = audio.get("capture_block_size").and_then(|v| v.as_u64()) {
                updated.audio.capture_block_size = block as usize;
            }
            if let Some(frames) = audio.get("outbound_queue_frames").and_then(|v| v.as_u64()) {
                updated.audio.outbound_queue_frames = frames as usize;
            }
            if let Some(chunks) = audio.get("inbound_queue_chunks").and_then(|v| v.as_u64()) {
                updated.audio.inbound_queue_chunks = chunks as usize;
            }
        }

        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Copy safe to return to clients: API keys are replaced by a marker.
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        copy.live.api_key = redact(&copy.live.api_key);
        copy.imaging.api_key = redact(&copy.imaging.api_key);
        copy
    }

    /// Parameters for opening live conversations.
    pub fn live_setup(&self) -> LiveSetup {
        LiveSetup {
            model: self.live.model.clone(),
            voice_name: self.live.voice_name.clone(),
            system_instruction: self.live.system_instruction.clone(),
        }
    }

    pub fn link_options(&self) -> LinkOptions {
        LinkOptions {
            capture_block_size: self.audio.capture_block_size,
            outbound_queue_frames: self.audio.outbound_queue_frames,
        }
    }
}

fn redact(secret: &str) -> String {
    if secret.is_empty() {
        String::new()
    } else {
        "********".to_string()
    }
}
