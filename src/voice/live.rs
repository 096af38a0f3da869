//! # Live Conversation Collaborator
//!
//! Minimal, vendor-neutral view of a persistent bidirectional conversation:
//! open it, push audio frames and text turns into it, and read back speech
//! audio, interruption signals and close/error events.

use crate::audio::codec::MediaBlob;
use crate::error::VoiceLinkError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Parameters for opening a live conversation.
#[derive(Debug, Clone, PartialEq)]
pub struct LiveSetup {
    /// Vendor model identifier
    pub model: String,
    /// Prebuilt voice used for synthesized speech
    pub voice_name: String,
    /// Persona and behavioural instructions for the agent
    pub system_instruction: String,
}

/// Something the remote agent sent us.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Base64 PCM16 speech at 24kHz
    Audio(String),
    /// The agent's current utterance was cut off; stop playback now
    Interrupted,
    /// The agent finished its turn
    TurnComplete,
    /// The remote side closed the session
    Closed,
    /// The session failed
    Error(String),
}

/// An open conversation.
pub struct LiveChannel {
    pub sender: Arc<dyn LiveSender>,
    pub events: mpsc::Receiver<LiveEvent>,
}

/// Outbound half of an open conversation.
#[async_trait]
pub trait LiveSender: Send + Sync {
    /// Send one realtime media frame. Must not wait on the network.
    async fn send_media(&self, blob: MediaBlob) -> Result<(), VoiceLinkError>;

    /// Add a text turn to the conversation.
    async fn send_text(&self, text: String) -> Result<(), VoiceLinkError>;

    /// Close the conversation. Must be safe to call more than once.
    fn close(&self);
}

/// Opens live conversations.
#[async_trait]
pub trait LiveConnector: Send + Sync {
    /// Open a conversation. Resolves only once the handshake is confirmed.
    async fn connect(&self, setup: &LiveSetup) -> Result<LiveChannel, VoiceLinkError>;
}
