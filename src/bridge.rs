//! # Browser Audio Bridge
//!
//! Implements [`AudioBackend`] for a browser connected over `/ws/voice`. The
//! browser owns the real microphone and speakers; this side only exchanges
//! protocol messages with it:
//!
//! - **Microphone**: `request_microphone` is answered by a `microphone`
//!   message, then captured blocks arrive as binary frames
//! - **Output**: `play`/`stop` messages against an output clock that starts
//!   when `open_output` is sent; `playback_ended` reports natural ends

use crate::audio::codec::{bytes_to_f32, encode_buffer};
use crate::audio::device::{AudioBackend, CaptureFormat, InputDevice, Microphone, OutputDevice};
use crate::audio::playback::{PlaybackBuffer, SourceId};
use crate::error::VoiceLinkError;
use crate::protocol::{Push, ServerMessage};
use actix::Recipient;
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;
use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, trace};

/// Captured blocks buffered between the socket and the capture loop.
const CAPTURE_QUEUE_BLOCKS: usize = 16;

type PermissionReply = oneshot::Sender<Result<(), VoiceLinkError>>;

#[derive(Default)]
struct BridgeState {
    /// Outstanding microphone prompt and its number
    pending_permission: Option<(u64, PermissionReply)>,
    prompts: u64,
    blocks: Option<mpsc::Sender<Vec<f32>>>,
    ended: Option<mpsc::UnboundedSender<SourceId>>,
}

#[derive(Clone, Default)]
struct SharedState(Arc<Mutex<BridgeState>>);

impl SharedState {
    fn lock(&self) -> MutexGuard<'_, BridgeState> {
        self.0.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Audio devices of one browser tab.
pub struct BrowserAudio {
    client: Recipient<Push>,
    state: SharedState,
}

impl BrowserAudio {
    pub fn new(client: Recipient<Push>) -> Self {
        Self {
            client,
            state: SharedState::default(),
        }
    }

    /// Answer an outstanding microphone request. Ignored when none is pending.
    pub fn resolve_permission(&self, granted: bool, reason: Option<String>) {
        let Some((_, reply)) = self.state.lock().pending_permission.take() else {
            debug!(granted, "Microphone answer without a pending request");
            return;
        };

        let outcome = if granted {
            Ok(())
        } else {
            Err(VoiceLinkError::PermissionDenied(
                reason.unwrap_or_else(|| "denied by user".to_string()),
            ))
        };
        let _ = reply.send(outcome);
    }

    /// Feed one binary frame of little-endian `f32` samples to the capture loop.
    ///
    /// Frames arriving while no microphone is open are discarded.
    pub fn push_block(&self, bytes: &[u8]) -> Result<(), VoiceLinkError> {
        let samples = bytes_to_f32(bytes)?;

        let blocks = self.state.lock().blocks.clone();
        let Some(blocks) = blocks else {
            trace!("Captured block without an open microphone");
            return Ok(());
        };

        match blocks.try_send(samples) {
            Ok(()) | Err(TrySendError::Closed(_)) => Ok(()),
            Err(TrySendError::Full(_)) => {
                trace!("Capture queue full, dropping block");
                Ok(())
            }
        }
    }

    /// Report that a played source finished on its own.
    pub fn playback_ended(&self, id: SourceId) {
        if let Some(ended) = &self.state.lock().ended {
            let _ = ended.send(id);
        }
    }

    /// The browser went away: fail any pending prompt and stop routing frames.
    pub fn detach(&self) {
        let mut state = self.state.lock();
        state.pending_permission = None;
        state.blocks = None;
        state.ended = None;
    }

    fn push(&self, message: ServerMessage) {
        self.client.do_send(Push(message));
    }
}

#[async_trait]
impl AudioBackend for BrowserAudio {
    async fn request_microphone(&self, format: CaptureFormat) -> Result<Microphone, VoiceLinkError> {
        if !self.client.connected() {
            return Err(VoiceLinkError::DeviceUnavailable("browser disconnected".to_string()));
        }

        let (reply, answer) = oneshot::channel();
        let prompt = {
            let mut state = self.state.lock();
            let prompt = state.prompts + 1;
            state.prompts = prompt;
            state.pending_permission = Some((prompt, reply));
            prompt
        };
        let _guard = PromptGuard {
            client: self.client.clone(),
            state: self.state.clone(),
            prompt,
        };
        self.push(ServerMessage::RequestMicrophone {
            sample_rate: format.sample_rate,
            block_size: format.block_size,
        });

        match answer.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => return Err(err),
            Err(_) => {
                return Err(VoiceLinkError::PermissionDenied(
                    "permission request abandoned".to_string(),
                ))
            }
        }

        let (blocks_tx, blocks) = mpsc::channel(CAPTURE_QUEUE_BLOCKS);
        self.state.lock().blocks = Some(blocks_tx);
        debug!(sample_rate = format.sample_rate, "Browser microphone open");

        Ok(Microphone {
            blocks,
            device: Box::new(BrowserInput {
                client: self.client.clone(),
                state: self.state.clone(),
                closed: false,
            }),
        })
    }

    fn open_output(
        &self,
        sample_rate: u32,
        ended: mpsc::UnboundedSender<SourceId>,
    ) -> Result<Arc<dyn OutputDevice>, VoiceLinkError> {
        if !self.client.connected() {
            return Err(VoiceLinkError::DeviceUnavailable("browser disconnected".to_string()));
        }

        self.state.lock().ended = Some(ended);
        self.push(ServerMessage::OpenOutput { sample_rate });

        Ok(Arc::new(BrowserOutput {
            client: self.client.clone(),
            state: self.state.clone(),
            opened_at: Instant::now(),
            closed: AtomicBool::new(false),
        }))
    }
}

/// Withdraws the prompt if the request is dropped before the browser answers.
///
/// The browser starts capturing as soon as the user grants access, so an
/// abandoned prompt must be followed by `close_microphone`.
struct PromptGuard {
    client: Recipient<Push>,
    state: SharedState,
    prompt: u64,
}

impl Drop for PromptGuard {
    fn drop(&mut self) {
        let withdrawn = {
            let mut state = self.state.lock();
            let unanswered = state
                .pending_permission
                .as_ref()
                .is_some_and(|(prompt, _)| *prompt == self.prompt);
            if unanswered {
                state.pending_permission = None;
            }
            unanswered
        };

        if withdrawn {
            debug!(prompt = self.prompt, "Microphone request withdrawn");
            self.client.do_send(Push(ServerMessage::CloseMicrophone));
        }
    }
}

/// The browser's microphone.
struct BrowserInput {
    client: Recipient<Push>,
    state: SharedState,
    closed: bool,
}

impl InputDevice for BrowserInput {
    fn close(&mut self) {
        if std::mem::replace(&mut self.closed, true) {
            return;
        }
        self.state.lock().blocks = None;
        self.client.do_send(Push(ServerMessage::CloseMicrophone));
    }
}

/// The browser's speakers.
struct BrowserOutput {
    client: Recipient<Push>,
    state: SharedState,
    opened_at: Instant,
    closed: AtomicBool,
}

impl OutputDevice for BrowserOutput {
    fn current_time(&self) -> f64 {
        self.opened_at.elapsed().as_secs_f64()
    }

    fn start(&self, id: SourceId, buffer: PlaybackBuffer, when: f64) -> Result<(), VoiceLinkError> {
        if self.closed.load(Ordering::SeqCst) || !self.client.connected() {
            return Err(VoiceLinkError::DeviceUnavailable("output closed".to_string()));
        }

        self.client.do_send(Push(ServerMessage::Play {
            source_id: id,
            start_time: when,
            sample_rate: buffer.sample_rate(),
            data: encode_buffer(&buffer),
        }));
        Ok(())
    }

    fn stop(&self, id: SourceId) {
        if !self.closed.load(Ordering::SeqCst) {
            self.client.do_send(Push(ServerMessage::Stop { source_id: id }));
        }
    }

    fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        self.state.lock().ended = None;
        self.client.do_send(Push(ServerMessage::CloseOutput));
    }
}
