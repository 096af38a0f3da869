//! # Gemini Adapters
//!
//! Vendor adapters for Google's generative-language API:
//!
//! - **live**: the bidirectional `BidiGenerateContent` WebSocket used for the
//!   voice conversation, implementing [`crate::voice::LiveConnector`]
//! - **imaging**: `generateContent` image requests, implementing
//!   [`crate::imaging::ImageGenerator`]
//!
//! This file holds the JSON wire types shared by both.
//!
//! ## Live Protocol Overview
//! 1. **Connect**: open the WebSocket with the API key in the query string
//! 2. **Setup**: send the model, voice and system instruction, then wait for
//!    `setupComplete`
//! 3. **Stream**: `realtimeInput` frames out, `serverContent` frames in
//! 4. **Close**: send a close frame

pub mod imaging;
pub mod live;

use crate::audio::codec::MediaBlob;
use crate::voice::live::{LiveEvent, LiveSetup};
use serde::{Deserialize, Serialize};
use serde_json::Value;

// ── Setup ──────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct SetupMessage {
    pub setup: SetupPayload,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SetupPayload {
    pub model: String,
    pub generation_config: LiveGenerationConfig,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system_instruction: Option<Content>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LiveGenerationConfig {
    pub response_modalities: Vec<String>,
    pub speech_config: SpeechConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SpeechConfig {
    pub voice_config: VoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VoiceConfig {
    pub prebuilt_voice_config: PrebuiltVoiceConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PrebuiltVoiceConfig {
    pub voice_name: String,
}

/// A list of parts with an optional role, used for prompts and instructions.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub parts: Vec<Part>,
}

impl Content {
    pub fn text(role: Option<&str>, text: impl Into<String>) -> Self {
        Self {
            role: role.map(str::to_string),
            parts: vec![Part {
                text: Some(text.into()),
                inline_data: None,
            }],
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inline_data: Option<MediaBlob>,
}

/// Build the first frame of a live session.
pub fn build_setup_message(setup: &LiveSetup) -> SetupMessage {
    let model = if setup.model.starts_with("models/") {
        setup.model.clone()
    } else {
        format!("models/{}", setup.model)
    };

    let instruction = setup.system_instruction.trim();

    SetupMessage {
        setup: SetupPayload {
            model,
            generation_config: LiveGenerationConfig {
                response_modalities: vec!["AUDIO".to_string()],
                speech_config: SpeechConfig {
                    voice_config: VoiceConfig {
                        prebuilt_voice_config: PrebuiltVoiceConfig {
                            voice_name: setup.voice_name.clone(),
                        },
                    },
                },
            },
            system_instruction: (!instruction.is_empty()).then(|| Content::text(None, instruction)),
        },
    }
}

// ── Client messages ────────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInputMessage {
    pub realtime_input: RealtimeInput,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeInput {
    pub media_chunks: Vec<MediaBlob>,
}

/// `{"realtimeInput": {"mediaChunks": [{"mimeType": ..., "data": ...}]}}`
pub fn build_media_message(blob: MediaBlob) -> RealtimeInputMessage {
    RealtimeInputMessage {
        realtime_input: RealtimeInput {
            media_chunks: vec![blob],
        },
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContentMessage {
    pub client_content: ClientContent,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientContent {
    pub turns: Vec<Content>,
    pub turn_complete: bool,
}

/// A complete user text turn.
pub fn build_text_message(text: impl Into<String>) -> ClientContentMessage {
    ClientContentMessage {
        client_content: ClientContent {
            turns: vec![Content::text(Some("user"), text)],
            turn_complete: true,
        },
    }
}

// ── Server messages ────────────────────────────────────────────────

/// What one server frame contained.
#[derive(Debug, Default, PartialEq)]
pub struct ServerMessage {
    pub setup_complete: bool,
    pub events: Vec<LiveEvent>,
}

/// Parse one JSON server frame.
///
/// A frame can carry several things at once (audio parts followed by
/// `turnComplete`), so events are returned in the order they should be
/// applied. Interruption always comes first so stale audio is never
/// scheduled after it.
pub fn parse_server_message(text: &str) -> ServerMessage {
    let mut message = ServerMessage::default();

    let value: Value = match serde_json::from_str(text) {
        Ok(value) => value,
        Err(err) => {
            message
                .events
                .push(LiveEvent::Error(format!("Failed to parse server message: {}", err)));
            return message;
        }
    };

    message.setup_complete = value.get("setupComplete").is_some();

    if let Some(content) = value.get("serverContent") {
        if content.get("interrupted").and_then(Value::as_bool) == Some(true) {
            message.events.push(LiveEvent::Interrupted);
        }

        if let Some(parts) = content.pointer("/modelTurn/parts").and_then(Value::as_array) {
            for part in parts {
                if let Some(data) = part.pointer("/inlineData/data").and_then(Value::as_str) {
                    message.events.push(LiveEvent::Audio(data.to_string()));
                }
            }
        }

        if content.get("turnComplete").and_then(Value::as_bool) == Some(true) {
            message.events.push(LiveEvent::TurnComplete);
        }
    }

    if let Some(err) = value.get("error") {
        let cause = err
            .get("message")
            .and_then(Value::as_str)
            .unwrap_or("Unknown server error");
        message.events.push(LiveEvent::Error(cause.to_string()));
    }

    message
}

// ── Image generation ───────────────────────────────────────────────

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentRequest {
    pub contents: Vec<Content>,
    pub generation_config: ImageGenerationConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageGenerationConfig {
    pub response_modalities: Vec<String>,
    pub image_config: ImageConfig,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageConfig {
    pub aspect_ratio: String,
    pub image_size: String,
}

#[derive(Debug, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub struct GenerateContentResponse {
    #[serde(default)]
    pub candidates: Vec<Candidate>,
}

#[derive(Debug, Deserialize, Default)]
pub struct Candidate {
    #[serde(default)]
    pub content: Content,
}

impl GenerateContentResponse {
    /// Base64 payload of the first inline data part, if any.
    pub fn first_inline_data(&self) -> Option<&str> {
        self.candidates
            .iter()
            .flat_map(|candidate| candidate.content.parts.iter())
            .find_map(|part| part.inline_data.as_ref())
            .map(|blob| blob.data.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::testing::test_setup;

    #[test]
    fn test_setup_message_json() {
        let json = serde_json::to_value(build_setup_message(&test_setup())).unwrap();

        assert_eq!(json["setup"]["model"], "models/test-model");
        assert_eq!(json["setup"]["generationConfig"]["responseModalities"][0], "AUDIO");
        assert_eq!(
            json["setup"]["generationConfig"]["speechConfig"]["voiceConfig"]["prebuiltVoiceConfig"]["voiceName"],
            "Kore"
        );
        assert_eq!(json["setup"]["systemInstruction"]["parts"][0]["text"], "You are a test agent.");
        assert!(json["setup"]["systemInstruction"].get("role").is_none());
    }

    #[test]
    fn test_setup_keeps_qualified_model_name() {
        let mut setup = test_setup();
        setup.model = "models/already-qualified".to_string();
        setup.system_instruction = "   ".to_string();

        let message = build_setup_message(&setup);
        assert_eq!(message.setup.model, "models/already-qualified");
        assert!(message.setup.system_instruction.is_none());
    }

    #[test]
    fn test_media_message_json() {
        let blob = MediaBlob {
            data: "AAA=".to_string(),
            mime_type: "audio/pcm;rate=16000".to_string(),
        };
        let json = serde_json::to_string(&build_media_message(blob)).unwrap();

        assert_eq!(
            json,
            r#"{"realtimeInput":{"mediaChunks":[{"data":"AAA=","mimeType":"audio/pcm;rate=16000"}]}}"#
        );
    }

    #[test]
    fn test_text_message_json() {
        let json = serde_json::to_value(build_text_message("Scan Mars")).unwrap();

        assert_eq!(json["clientContent"]["turns"][0]["role"], "user");
        assert_eq!(json["clientContent"]["turns"][0]["parts"][0]["text"], "Scan Mars");
        assert_eq!(json["clientContent"]["turnComplete"], true);
    }

    #[test]
    fn test_parse_setup_complete() {
        let message = parse_server_message(r#"{"setupComplete": {}}"#);
        assert!(message.setup_complete);
        assert!(message.events.is_empty());
    }

    #[test]
    fn test_parse_audio_then_turn_complete() {
        let message = parse_server_message(
            r#"{"serverContent": {"modelTurn": {"parts": [
                {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "AAAA"}},
                {"inlineData": {"mimeType": "audio/pcm;rate=24000", "data": "BBBB"}}
            ]}, "turnComplete": true}}"#,
        );

        assert_eq!(
            message.events,
            vec![
                LiveEvent::Audio("AAAA".to_string()),
                LiveEvent::Audio("BBBB".to_string()),
                LiveEvent::TurnComplete,
            ]
        );
    }

    #[test]
    fn test_parse_interrupted() {
        let message = parse_server_message(r#"{"serverContent": {"interrupted": true}}"#);
        assert_eq!(message.events, vec![LiveEvent::Interrupted]);
    }

    #[test]
    fn test_parse_error_and_garbage() {
        let message = parse_server_message(r#"{"error": {"message": "Quota exceeded"}}"#);
        assert_eq!(message.events, vec![LiveEvent::Error("Quota exceeded".to_string())]);

        let message = parse_server_message("not json");
        assert!(matches!(message.events[0], LiveEvent::Error(_)));
    }

    #[test]
    fn test_text_parts_are_ignored() {
        let message =
            parse_server_message(r#"{"serverContent": {"modelTurn": {"parts": [{"text": "hi"}]}}}"#);
        assert!(message.events.is_empty());
    }

    #[test]
    fn test_first_inline_data() {
        let response: GenerateContentResponse = serde_json::from_str(
            r#"{"candidates": [{"content": {"role": "model", "parts": [
                {"text": "Here is your image"},
                {"inlineData": {"mimeType": "image/png", "data": "iVBORw=="}}
            ]}}]}"#,
        )
        .unwrap();
        assert_eq!(response.first_inline_data(), Some("iVBORw=="));

        let empty: GenerateContentResponse = serde_json::from_str(r#"{"candidates": []}"#).unwrap();
        assert_eq!(empty.first_inline_data(), None);
    }
}
