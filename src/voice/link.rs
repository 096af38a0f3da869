//! # Voice Link Session Manager
//!
//! Owns the lifecycle of one bidirectional real-time audio conversation:
//! microphone capture, outbound frame transmission, inbound speech playback
//! and interruption, plus the status/volume notifications sent to the UI.
//!
//! ## Session Lifecycle:
//! 1. **connect**: tear down any previous session, move to `Connecting`, then
//!    open the output device, wait for microphone permission and wait for the
//!    remote handshake in a background task
//! 2. **Active**: `connected` is reported once the handshake is confirmed;
//!    capture, transmission and inbound processing run as separate tasks
//! 3. **Closed / Errored**: resources are released by `disconnect`, by a
//!    remote close, or by the failure path
//!
//! ## Concurrency:
//! All mutable session state lives in one `Mutex<LinkInner>`. Locks are held
//! only for short bookkeeping and never while a callback runs. Every task is
//! tagged with the session generation; tearing a session down advances the
//! generation so late events from old tasks are ignored.

use crate::audio::capture::run_capture;
use crate::audio::codec::{decode_chunk, MediaBlob};
use crate::audio::device::{AudioBackend, CaptureFormat, InputDevice, Microphone};
use crate::audio::playback::{PlaybackBuffer, PlaybackScheduler, SourceId};
use crate::audio::{DEFAULT_CAPTURE_BLOCK_SIZE, INPUT_SAMPLE_RATE, OUTPUT_SAMPLE_RATE};
use crate::error::VoiceLinkError;
use crate::voice::live::{LiveChannel, LiveConnector, LiveEvent, LiveSender, LiveSetup};
use crate::voice::status::{
    LinkState, LinkStats, LinkStatsSnapshot, LinkStatus, ResourceSnapshot, StatusCallback,
    VolumeCallback,
};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Tuning knobs for a voice link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LinkOptions {
    /// Mono samples per capture block
    pub capture_block_size: usize,
    /// Outbound frames buffered before capture starts dropping them
    pub outbound_queue_frames: usize,
}

impl Default for LinkOptions {
    fn default() -> Self {
        Self {
            capture_block_size: DEFAULT_CAPTURE_BLOCK_SIZE,
            outbound_queue_frames: 32,
        }
    }
}

/// Callbacks of one session.
///
/// Status notifications are serialized, and nothing is reported after a
/// `disconnected` or `error`.
#[derive(Clone)]
struct LinkCallbacks {
    on_status: StatusCallback,
    on_volume: VolumeCallback,
    ended: Arc<Mutex<bool>>,
}

impl LinkCallbacks {
    fn new(on_status: StatusCallback, on_volume: VolumeCallback) -> Self {
        Self {
            on_status,
            on_volume,
            ended: Arc::new(Mutex::new(false)),
        }
    }

    fn notify(&self, status: LinkStatus, error: Option<VoiceLinkError>) {
        let mut ended = self.ended.lock().unwrap_or_else(PoisonError::into_inner);
        if *ended {
            return;
        }
        *ended = status != LinkStatus::Connected;
        (self.on_status)(status, error);
    }
}

/// Mutable session state guarded by the link's mutex.
struct LinkInner {
    state: LinkState,
    generation: u64,
    session_id: Option<Uuid>,
    callbacks: Option<LinkCallbacks>,
    input: Option<Box<dyn InputDevice>>,
    scheduler: Option<PlaybackScheduler>,
    sender: Option<Arc<dyn LiveSender>>,
    tasks: Vec<JoinHandle<()>>,
}

impl LinkInner {
    fn new() -> Self {
        Self {
            state: LinkState::Idle,
            generation: 0,
            session_id: None,
            callbacks: None,
            input: None,
            scheduler: None,
            sender: None,
            tasks: Vec::new(),
        }
    }

    fn is_current(&self, generation: u64) -> bool {
        self.generation == generation
    }

    /// Detach every resource so it can be released outside the lock.
    fn release(&mut self) -> Released {
        Released {
            input: self.input.take(),
            scheduler: self.scheduler.take(),
            sender: self.sender.take(),
            tasks: std::mem::take(&mut self.tasks),
        }
    }

    /// End the current session in place: advance the generation and detach
    /// its callbacks and resources.
    fn take_session(&mut self) -> Teardown {
        let previous = self.state;
        self.generation += 1;
        self.session_id = None;
        Teardown {
            previous,
            callbacks: self.callbacks.take(),
            released: self.release(),
        }
    }
}

/// A session taken out of [`LinkInner`], finished outside the lock.
struct Teardown {
    previous: LinkState,
    callbacks: Option<LinkCallbacks>,
    released: Released,
}

impl Teardown {
    /// Release everything, then tell the old caller it was disconnected if it
    /// was still connecting or active.
    fn finish(self) {
        self.released.finish();

        if self.previous.is_live() {
            info!(previous = self.previous.as_str(), "Voice link disconnected");
            if let Some(callbacks) = self.callbacks {
                callbacks.notify(LinkStatus::Disconnected, None);
            }
        }
    }
}

/// Resources detached from a session, released by [`Released::finish`].
struct Released {
    input: Option<Box<dyn InputDevice>>,
    scheduler: Option<PlaybackScheduler>,
    sender: Option<Arc<dyn LiveSender>>,
    tasks: Vec<JoinHandle<()>>,
}

impl Released {
    fn finish(self) {
        for task in self.tasks {
            task.abort();
        }
        if let Some(mut input) = self.input {
            input.close();
        }
        if let Some(scheduler) = self.scheduler {
            scheduler.shutdown();
        }
        if let Some(sender) = self.sender {
            sender.close();
        }
    }
}

/// The voice link. Construct once at startup and share it as `Arc<VoiceLink>`.
pub struct VoiceLink {
    connector: Arc<dyn LiveConnector>,
    setup: LiveSetup,
    options: LinkOptions,
    inner: Mutex<LinkInner>,
    stats: Arc<LinkStats>,
}

impl VoiceLink {
    pub fn new(connector: Arc<dyn LiveConnector>, setup: LiveSetup, options: LinkOptions) -> Self {
        Self {
            connector,
            setup,
            options,
            inner: Mutex::new(LinkInner::new()),
            stats: Arc::new(LinkStats::default()),
        }
    }

    fn lock(&self) -> MutexGuard<'_, LinkInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn state(&self) -> LinkState {
        self.lock().state
    }

    /// Id of the current (or most recently failed) session.
    pub fn session_id(&self) -> Option<Uuid> {
        self.lock().session_id
    }

    pub fn stats(&self) -> LinkStatsSnapshot {
        self.stats.snapshot()
    }

    pub fn resources(&self) -> ResourceSnapshot {
        let inner = self.lock();
        ResourceSnapshot {
            input_device: inner.input.is_some(),
            output_device: inner.scheduler.is_some(),
            remote_session: inner.sender.is_some(),
            scheduled_sources: inner.scheduler.as_ref().map_or(0, |s| s.active_count()),
            background_tasks: inner.tasks.iter().filter(|task| !task.is_finished()).count(),
        }
    }

    /// Start a new conversation, replacing any session that is still running.
    ///
    /// Returns immediately in `Connecting`. The outcome is reported through
    /// `on_status`: `connected` once the remote handshake is confirmed, or
    /// `error` with the cause. Must be called from within a tokio runtime.
    pub fn connect(
        self: &Arc<Self>,
        audio: Arc<dyn AudioBackend>,
        on_status: StatusCallback,
        on_volume: VolumeCallback,
    ) -> Uuid {
        let session_id = Uuid::new_v4();
        let (generation, replaced) = {
            let mut inner = self.lock();
            let replaced = inner.take_session();
            inner.state = LinkState::Connecting;
            inner.session_id = Some(session_id);
            inner.callbacks = Some(LinkCallbacks::new(on_status, on_volume));
            (inner.generation, replaced)
        };
        replaced.finish();
        self.stats.record_session_started();
        info!(%session_id, "Voice link connecting");

        let link = Arc::clone(self);
        let handle = tokio::spawn(async move { link.establish(generation, audio).await });

        let mut inner = self.lock();
        if inner.is_current(generation) {
            inner.tasks.push(handle);
        } else {
            handle.abort();
        }

        session_id
    }

    /// Tear down the current session. Safe to call in any state, any number of times.
    ///
    /// When this returns, capture has stopped, scheduled playback has been
    /// stopped and every device and remote handle has been released.
    pub fn disconnect(&self) {
        let teardown = {
            let mut inner = self.lock();
            let teardown = inner.take_session();
            if teardown.previous != LinkState::Idle {
                inner.state = LinkState::Closed;
            }
            teardown
        };

        teardown.finish();
    }

    /// Add a text turn to the live conversation.
    ///
    /// Returns whether the turn was handed to the remote session; without an
    /// active session nothing is sent.
    pub fn send_message(&self, text: impl Into<String>) -> bool {
        let sender = {
            let inner = self.lock();
            if inner.state == LinkState::Active {
                inner.sender.clone()
            } else {
                None
            }
        };

        let Some(sender) = sender else {
            debug!("No active voice link, text message not sent");
            return false;
        };

        let text = text.into();
        tokio::spawn(async move {
            if let Err(err) = sender.send_text(text).await {
                warn!(error = %err, "Failed to send text message");
            }
        });
        true
    }

    async fn establish(self: Arc<Self>, generation: u64, audio: Arc<dyn AudioBackend>) {
        let (ended_tx, ended_rx) = mpsc::unbounded_channel();
        let output = match audio.open_output(OUTPUT_SAMPLE_RATE, ended_tx) {
            Ok(output) => output,
            Err(err) => return self.fail(generation, err),
        };
        {
            let mut inner = self.lock();
            if !inner.is_current(generation) {
                drop(inner);
                output.close();
                return;
            }
            inner.scheduler = Some(PlaybackScheduler::new(output));
        }

        let format = CaptureFormat {
            sample_rate: INPUT_SAMPLE_RATE,
            block_size: self.options.capture_block_size,
        };
        debug!(block_size = format.block_size, "Requesting microphone access");
        let Microphone { blocks, device } = match audio.request_microphone(format).await {
            Ok(microphone) => microphone,
            Err(err) => return self.fail(generation, err),
        };
        if !self.adopt_input(generation, device) {
            return;
        }

        debug!(model = %self.setup.model, "Opening live session");
        let LiveChannel { sender, events } = match self.connector.connect(&self.setup).await {
            Ok(channel) => channel,
            Err(err) => return self.fail(generation, err),
        };

        let (frames_tx, frames_rx) = mpsc::channel(self.options.outbound_queue_frames.max(1));
        let callbacks = {
            let mut inner = self.lock();
            let callbacks = if inner.is_current(generation) {
                inner.callbacks.clone()
            } else {
                None
            };
            let Some(callbacks) = callbacks else {
                drop(inner);
                sender.close();
                return;
            };

            inner.sender = Some(sender.clone());
            inner.state = LinkState::Active;
            inner.tasks.push(tokio::spawn(run_capture(
                blocks,
                frames_tx,
                callbacks.on_volume.clone(),
                self.stats.clone(),
            )));
            inner.tasks.push(tokio::spawn(transmit_frames(frames_rx, sender, self.stats.clone())));
            inner.tasks.push(tokio::spawn(
                Arc::clone(&self).process_inbound(generation, events, ended_rx),
            ));
            callbacks
        };

        info!("Voice link active");
        callbacks.notify(LinkStatus::Connected, None);
    }

    fn adopt_input(&self, generation: u64, mut device: Box<dyn InputDevice>) -> bool {
        let mut inner = self.lock();
        if inner.is_current(generation) {
            inner.input = Some(device);
            true
        } else {
            drop(inner);
            device.close();
            false
        }
    }

    async fn process_inbound(
        self: Arc<Self>,
        generation: u64,
        mut events: mpsc::Receiver<LiveEvent>,
        mut ended: mpsc::UnboundedReceiver<SourceId>,
    ) {
        loop {
            tokio::select! {
                event = events.recv() => {
                    let event = event.unwrap_or(LiveEvent::Closed);
                    if !self.handle_event(generation, event) {
                        break;
                    }
                }
                Some(id) = ended.recv() => self.finish_source(generation, id),
            }
        }
    }

    /// Returns false once the session is over.
    fn handle_event(&self, generation: u64, event: LiveEvent) -> bool {
        match event {
            LiveEvent::Audio(data) => match decode_chunk(&data) {
                Ok(buffer) => self.schedule_chunk(generation, buffer),
                Err(err) => {
                    self.fail(generation, err);
                    false
                }
            },
            LiveEvent::Interrupted => {
                self.interrupt(generation);
                true
            }
            LiveEvent::TurnComplete => {
                debug!("Agent turn complete");
                true
            }
            LiveEvent::Error(cause) => {
                self.fail(generation, VoiceLinkError::TransportError(cause));
                false
            }
            LiveEvent::Closed => {
                self.remote_closed(generation);
                false
            }
        }
    }

    fn schedule_chunk(&self, generation: u64, buffer: PlaybackBuffer) -> bool {
        let scheduled = {
            let mut inner = self.lock();
            if !inner.is_current(generation) {
                return false;
            }
            match inner.scheduler.as_mut() {
                Some(scheduler) => scheduler.schedule(buffer),
                None => return false,
            }
        };

        match scheduled {
            Ok(_) => {
                self.stats.record_chunk_scheduled();
                true
            }
            Err(err) => {
                self.fail(generation, err);
                false
            }
        }
    }

    fn interrupt(&self, generation: u64) {
        let stopped = {
            let mut inner = self.lock();
            if !inner.is_current(generation) {
                return;
            }
            inner.scheduler.as_mut().map_or(0, |scheduler| scheduler.interrupt())
        };
        self.stats.record_interruption();
        debug!(stopped, "Playback interrupted by remote agent");
    }

    fn finish_source(&self, generation: u64, id: SourceId) {
        let mut inner = self.lock();
        if !inner.is_current(generation) {
            return;
        }
        if let Some(scheduler) = inner.scheduler.as_mut() {
            scheduler.finish(id);
        }
    }

    fn remote_closed(&self, generation: u64) {
        let (callbacks, released) = {
            let mut inner = self.lock();
            if !inner.is_current(generation) {
                return;
            }
            inner.generation += 1;
            inner.state = LinkState::Closed;
            (inner.callbacks.clone(), inner.release())
        };

        released.finish();
        info!("Live session closed by remote side");
        if let Some(callbacks) = callbacks {
            callbacks.notify(LinkStatus::Disconnected, None);
        }
    }

    fn fail(&self, generation: u64, error: VoiceLinkError) {
        let (callbacks, released) = {
            let mut inner = self.lock();
            if !inner.is_current(generation) {
                return;
            }
            inner.generation += 1;
            inner.state = LinkState::Errored;
            (inner.callbacks.clone(), inner.release())
        };

        released.finish();
        self.stats.record_error();
        warn!(code = error.code(), error = %error, "Voice link failed");
        if let Some(callbacks) = callbacks {
            callbacks.notify(LinkStatus::Error, Some(error));
        }
    }
}

/// Forward queued frames to the remote session. Failed frames are dropped.
async fn transmit_frames(
    mut frames: mpsc::Receiver<MediaBlob>,
    sender: Arc<dyn LiveSender>,
    stats: Arc<LinkStats>,
) {
    while let Some(frame) = frames.recv().await {
        match sender.send_media(frame).await {
            Ok(()) => stats.record_frame_sent(),
            Err(err) => {
                stats.record_frame_dropped();
                debug!(error = %err, "Dropped outbound frame");
            }
        }
    }
}
