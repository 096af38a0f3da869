//! # Browser WebSocket Protocol
//!
//! JSON messages exchanged with the browser over `/ws/voice`. Every text frame
//! is an object tagged by `type`. Binary frames from the client carry one
//! captured microphone block as little-endian `f32` samples.
//!
//! ## Client → Server:
//! - `connect`, `disconnect`, `send_message {text}`
//! - `microphone {granted, reason?}`: answer to `request_microphone`
//! - `playback_ended {source_id}`: a `play` source finished naturally
//! - `pong {timestamp}`
//!
//! ## Server → Client:
//! - `status {status, error?, session_id?, timestamp}`
//! - `volume {level}`
//! - `request_microphone`, `close_microphone`
//! - `open_output`, `play`, `stop`, `close_output`
//! - `ping {timestamp}`, `error {code, message}`
//!
//! ## Output Clock:
//! `play.start_time` is in seconds on the output clock, which starts at 0 when
//! `open_output` is sent. The browser records its own audio clock at that
//! moment and adds it as an offset when scheduling.

use crate::error::VoiceLinkError;
use crate::voice::LinkStatus;
use actix::Message;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Messages sent by the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Start a voice link session
    Connect,

    /// End the current session
    Disconnect,

    /// Add a text turn to the conversation
    SendMessage { text: String },

    /// Outcome of the microphone permission prompt
    Microphone {
        granted: bool,
        #[serde(default)]
        reason: Option<String>,
    },

    /// A played source reached its end
    PlaybackEnded { source_id: u64 },

    /// Heartbeat response
    Pong { timestamp: u64 },
}

/// Error details attached to a status update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    pub code: String,
    pub message: String,
}

impl From<&VoiceLinkError> for ErrorDetail {
    fn from(err: &VoiceLinkError) -> Self {
        Self {
            code: err.code().to_string(),
            message: err.to_string(),
        }
    }
}

/// Messages sent to the browser.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Session status change
    Status {
        status: LinkStatus,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<ErrorDetail>,
        #[serde(skip_serializing_if = "Option::is_none")]
        session_id: Option<Uuid>,
        timestamp: u64,
    },

    /// Microphone level for the visualizer, in `[0, 1]`
    Volume { level: f32 },

    /// Ask the user for microphone access and start capturing
    RequestMicrophone { sample_rate: u32, block_size: usize },

    /// Stop capturing and release the microphone
    CloseMicrophone,

    /// Create the output audio context
    OpenOutput { sample_rate: u32 },

    /// Play base64 PCM16 audio at `start_time` on the output clock
    Play {
        source_id: u64,
        start_time: f64,
        sample_rate: u32,
        data: String,
    },

    /// Stop a scheduled or playing source
    Stop { source_id: u64 },

    /// Stop all playback and release the output context
    CloseOutput,

    /// Heartbeat
    Ping { timestamp: u64 },

    /// Request-level error (bad frame, bad JSON)
    Error { code: String, message: String },
}

impl ServerMessage {
    pub fn status(status: LinkStatus, error: Option<&VoiceLinkError>, session_id: Option<Uuid>) -> Self {
        ServerMessage::Status {
            status,
            error: error.map(ErrorDetail::from),
            session_id,
            timestamp: now_millis(),
        }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerMessage::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}

/// Actor message: push a server message to one browser.
#[derive(Debug, Clone, Message)]
#[rtype(result = "()")]
pub struct Push(pub ServerMessage);

/// Milliseconds since the Unix epoch.
pub fn now_millis() -> u64 {
    chrono::Utc::now().timestamp_millis().max(0) as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_client_messages() {
        let msg: ClientMessage = serde_json::from_str(r#"{"type": "connect"}"#).unwrap();
        assert_eq!(msg, ClientMessage::Connect);

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "send_message", "text": "Scan Jupiter"}"#).unwrap();
        assert_eq!(msg, ClientMessage::SendMessage { text: "Scan Jupiter".to_string() });

        let msg: ClientMessage = serde_json::from_str(r#"{"type": "microphone", "granted": true}"#).unwrap();
        assert_eq!(msg, ClientMessage::Microphone { granted: true, reason: None });

        let msg: ClientMessage =
            serde_json::from_str(r#"{"type": "playback_ended", "source_id": 7}"#).unwrap();
        assert_eq!(msg, ClientMessage::PlaybackEnded { source_id: 7 });
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        assert!(serde_json::from_str::<ClientMessage>(r#"{"type": "start_session"}"#).is_err());
    }

    #[test]
    fn test_status_with_error() {
        let err = VoiceLinkError::PermissionDenied("dismissed".to_string());
        let value = serde_json::to_value(ServerMessage::status(LinkStatus::Error, Some(&err), None)).unwrap();

        assert_eq!(value["type"], "status");
        assert_eq!(value["status"], "error");
        assert_eq!(value["error"]["code"], "permission_denied");
        assert!(value.get("session_id").is_none());
        assert!(value["timestamp"].as_u64().unwrap() > 0);
    }

    #[test]
    fn test_play_message() {
        let value = serde_json::to_value(ServerMessage::Play {
            source_id: 3,
            start_time: 1.5,
            sample_rate: 24000,
            data: "AAA=".to_string(),
        })
        .unwrap();

        assert_eq!(
            value,
            json!({"type": "play", "source_id": 3, "start_time": 1.5, "sample_rate": 24000, "data": "AAA="})
        );
    }

    #[test]
    fn test_unit_variants() {
        let value = serde_json::to_value(ServerMessage::CloseMicrophone).unwrap();
        assert_eq!(value, json!({"type": "close_microphone"}));
    }
}
