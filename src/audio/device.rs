//! # Audio Device Abstraction
//!
//! The voice link never touches audio hardware directly. It talks to an
//! [`AudioBackend`] that knows how to obtain a microphone and a speaker. The
//! service provides a backend that drives a browser over a WebSocket, and
//! tests provide in-memory fakes.

use crate::audio::playback::{PlaybackBuffer, SourceId};
use crate::error::VoiceLinkError;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::sync::mpsc;

/// Format requested when opening the microphone.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureFormat {
    pub sample_rate: u32,
    pub block_size: usize,
}

/// An opened microphone: a stream of captured blocks plus the device handle.
///
/// Each block holds `block_size` mono samples normalized to `[-1.0, 1.0]`.
pub struct Microphone {
    pub blocks: mpsc::Receiver<Vec<f32>>,
    pub device: Box<dyn InputDevice>,
}

/// Handle to an open capture device.
pub trait InputDevice: Send {
    /// Stop capturing and release the device. Must be safe to call twice.
    fn close(&mut self);
}

/// Handle to an open output device with its own clock.
pub trait OutputDevice: Send + Sync {
    /// Seconds elapsed on the output clock. Starts at 0 when the device opens.
    fn current_time(&self) -> f64;

    /// Start playing `buffer` at output time `when`.
    ///
    /// When playback finishes naturally the device sends `id` on the ended
    /// channel it was opened with.
    fn start(&self, id: SourceId, buffer: PlaybackBuffer, when: f64) -> Result<(), VoiceLinkError>;

    /// Stop a scheduled or playing source immediately. Unknown ids are ignored.
    fn stop(&self, id: SourceId);

    /// Release the device.
    fn close(&self);
}

/// Source of microphones and speakers for one voice link session.
#[async_trait]
pub trait AudioBackend: Send + Sync {
    /// Ask for microphone access.
    ///
    /// This may wait indefinitely for a user or OS permission prompt. A refusal
    /// is reported as [`VoiceLinkError::PermissionDenied`].
    async fn request_microphone(&self, format: CaptureFormat) -> Result<Microphone, VoiceLinkError>;

    /// Open the output device at `sample_rate`.
    fn open_output(
        &self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<SourceId>,
    ) -> Result<Arc<dyn OutputDevice>, VoiceLinkError>;
}
