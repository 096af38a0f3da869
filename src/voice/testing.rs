//! In-memory fakes for the device and live-session traits.

use crate::audio::codec::MediaBlob;
use crate::audio::device::{AudioBackend, CaptureFormat, InputDevice, Microphone, OutputDevice};
use crate::audio::playback::{PlaybackBuffer, SourceId};
use crate::error::VoiceLinkError;
use crate::voice::live::{LiveChannel, LiveConnector, LiveEvent, LiveSender, LiveSetup};
use crate::voice::status::{LinkStatus, StatusCallback, VolumeCallback};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, watch};

/// Poll `condition` until it holds, panicking after two seconds.
pub async fn wait_until(condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(2);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("condition not reached within 2s");
        }
        tokio::time::sleep(Duration::from_millis(1)).await;
    }
}

/// Let spawned tasks run for a moment.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(20)).await;
}

pub type StatusLog = Arc<Mutex<Vec<(LinkStatus, Option<VoiceLinkError>)>>>;
pub type VolumeLog = Arc<Mutex<Vec<f32>>>;

pub fn status_recorder() -> (StatusCallback, StatusLog) {
    let log: StatusLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    (Arc::new(move |status, error| sink.lock().unwrap().push((status, error))), log)
}

pub fn volume_recorder() -> (VolumeCallback, VolumeLog) {
    let log: VolumeLog = Arc::new(Mutex::new(Vec::new()));
    let sink = log.clone();
    (Arc::new(move |level| sink.lock().unwrap().push(level)), log)
}

#[derive(Default)]
struct OutputState {
    time: f64,
    started: Vec<(SourceId, f64, f64)>,
    stopped: Vec<SourceId>,
    closed: bool,
    ended: Option<mpsc::UnboundedSender<SourceId>>,
}

/// Output device with a manually driven clock.
#[derive(Default)]
pub struct FakeOutput {
    state: Mutex<OutputState>,
}

impl FakeOutput {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_time(&self, seconds: f64) {
        self.state.lock().unwrap().time = seconds;
    }

    /// `(id, start_time, duration)` of every started source.
    pub fn started(&self) -> Vec<(SourceId, f64, f64)> {
        self.state.lock().unwrap().started.clone()
    }

    pub fn stopped(&self) -> Vec<SourceId> {
        self.state.lock().unwrap().stopped.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.state.lock().unwrap().closed
    }

    /// Simulate a source reaching its natural end.
    pub fn finish(&self, id: SourceId) {
        if let Some(ended) = &self.state.lock().unwrap().ended {
            let _ = ended.send(id);
        }
    }

    fn attach(&self, ended: mpsc::UnboundedSender<SourceId>) {
        let mut state = self.state.lock().unwrap();
        state.ended = Some(ended);
        state.closed = false;
    }
}

impl OutputDevice for FakeOutput {
    fn current_time(&self) -> f64 {
        self.state.lock().unwrap().time
    }

    fn start(&self, id: SourceId, buffer: PlaybackBuffer, when: f64) -> Result<(), VoiceLinkError> {
        self.state.lock().unwrap().started.push((id, when, buffer.duration()));
        Ok(())
    }

    fn stop(&self, id: SourceId) {
        self.state.lock().unwrap().stopped.push(id);
    }

    fn close(&self) {
        let mut state = self.state.lock().unwrap();
        state.closed = true;
        state.ended = None;
    }
}

struct FakeInput {
    closed: Arc<AtomicBool>,
}

impl InputDevice for FakeInput {
    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Audio backend whose microphone permission is decided by the test.
pub struct FakeAudio {
    output: Arc<FakeOutput>,
    decision: watch::Sender<Option<Result<(), VoiceLinkError>>>,
    blocks: Mutex<Option<mpsc::Sender<Vec<f32>>>>,
    input_closed: Arc<AtomicBool>,
    output_error: Option<VoiceLinkError>,
}

impl FakeAudio {
    fn with_decision(decision: Option<Result<(), VoiceLinkError>>) -> Arc<Self> {
        let (decision, _) = watch::channel(decision);
        Arc::new(Self {
            output: FakeOutput::new(),
            decision,
            blocks: Mutex::new(None),
            input_closed: Arc::new(AtomicBool::new(false)),
            output_error: None,
        })
    }

    /// Permission is granted as soon as it is requested.
    pub fn granted() -> Arc<Self> {
        Self::with_decision(Some(Ok(())))
    }

    /// Permission prompt stays open until [`FakeAudio::grant`] is called.
    pub fn pending() -> Arc<Self> {
        Self::with_decision(None)
    }

    pub fn denied() -> Arc<Self> {
        Self::with_decision(Some(Err(VoiceLinkError::PermissionDenied(
            "user dismissed the prompt".to_string(),
        ))))
    }

    pub fn without_output() -> Arc<Self> {
        let (decision, _) = watch::channel(Some(Ok(())));
        Arc::new(Self {
            output: FakeOutput::new(),
            decision,
            blocks: Mutex::new(None),
            input_closed: Arc::new(AtomicBool::new(false)),
            output_error: Some(VoiceLinkError::DeviceUnavailable("no speakers".to_string())),
        })
    }

    pub fn grant(&self) {
        self.decision.send_replace(Some(Ok(())));
    }

    pub fn output(&self) -> Arc<FakeOutput> {
        self.output.clone()
    }

    pub fn input_closed(&self) -> bool {
        self.input_closed.load(Ordering::SeqCst)
    }

    /// Feed one captured block into the open microphone.
    pub async fn capture(&self, block: Vec<f32>) {
        let blocks = self.blocks.lock().unwrap().clone();
        if let Some(blocks) = blocks {
            let _ = blocks.send(block).await;
        }
    }
}

#[async_trait]
impl AudioBackend for FakeAudio {
    async fn request_microphone(&self, _format: CaptureFormat) -> Result<Microphone, VoiceLinkError> {
        let mut decisions = self.decision.subscribe();
        let decision = loop {
            let current = decisions.borrow_and_update().clone();
            if let Some(decision) = current {
                break decision;
            }
            if decisions.changed().await.is_err() {
                return Err(VoiceLinkError::PermissionDenied("prompt abandoned".to_string()));
            }
        };
        decision?;

        let (tx, rx) = mpsc::channel(16);
        *self.blocks.lock().unwrap() = Some(tx);
        Ok(Microphone {
            blocks: rx,
            device: Box::new(FakeInput {
                closed: self.input_closed.clone(),
            }),
        })
    }

    fn open_output(
        &self,
        _sample_rate: u32,
        ended: mpsc::UnboundedSender<SourceId>,
    ) -> Result<Arc<dyn OutputDevice>, VoiceLinkError> {
        if let Some(err) = &self.output_error {
            return Err(err.clone());
        }
        self.output.attach(ended);
        Ok(self.output.clone())
    }
}

/// Records everything sent into a fake conversation.
#[derive(Default)]
pub struct FakeSender {
    media: Mutex<Vec<MediaBlob>>,
    texts: Mutex<Vec<String>>,
    closed: AtomicBool,
}

impl FakeSender {
    pub fn media_count(&self) -> usize {
        self.media.lock().unwrap().len()
    }

    pub fn texts(&self) -> Vec<String> {
        self.texts.lock().unwrap().clone()
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LiveSender for FakeSender {
    async fn send_media(&self, blob: MediaBlob) -> Result<(), VoiceLinkError> {
        self.media.lock().unwrap().push(blob);
        Ok(())
    }

    async fn send_text(&self, text: String) -> Result<(), VoiceLinkError> {
        self.texts.lock().unwrap().push(text);
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Live connector whose handshake outcome is controlled by the test.
pub struct FakeConnector {
    failure: Option<VoiceLinkError>,
    handshake: watch::Sender<bool>,
    events: Mutex<Option<mpsc::Sender<LiveEvent>>>,
    sender: Mutex<Option<Arc<FakeSender>>>,
    connects: AtomicUsize,
}

impl FakeConnector {
    fn build(failure: Option<VoiceLinkError>, open: bool) -> Arc<Self> {
        let (handshake, _) = watch::channel(open);
        Arc::new(Self {
            failure,
            handshake,
            events: Mutex::new(None),
            sender: Mutex::new(None),
            connects: AtomicUsize::new(0),
        })
    }

    /// Handshake completes immediately.
    pub fn new() -> Arc<Self> {
        Self::build(None, true)
    }

    /// Handshake waits for [`FakeConnector::open`].
    pub fn gated() -> Arc<Self> {
        Self::build(None, false)
    }

    pub fn failing(error: VoiceLinkError) -> Arc<Self> {
        Self::build(Some(error), true)
    }

    pub fn open(&self) {
        self.handshake.send_replace(true);
    }

    pub fn connect_count(&self) -> usize {
        self.connects.load(Ordering::SeqCst)
    }

    /// Sender of the most recent conversation.
    pub fn sender(&self) -> Option<Arc<FakeSender>> {
        self.sender.lock().unwrap().clone()
    }

    /// Deliver an event from the remote agent.
    pub async fn push(&self, event: LiveEvent) {
        let events = self.events.lock().unwrap().clone();
        if let Some(events) = events {
            let _ = events.send(event).await;
        }
    }
}

#[async_trait]
impl LiveConnector for FakeConnector {
    async fn connect(&self, _setup: &LiveSetup) -> Result<LiveChannel, VoiceLinkError> {
        self.connects.fetch_add(1, Ordering::SeqCst);

        let mut handshake = self.handshake.subscribe();
        while !*handshake.borrow_and_update() {
            if handshake.changed().await.is_err() {
                return Err(VoiceLinkError::HandshakeFailure("connector dropped".to_string()));
            }
        }

        if let Some(err) = &self.failure {
            return Err(err.clone());
        }

        let (tx, rx) = mpsc::channel(64);
        let sender = Arc::new(FakeSender::default());
        *self.events.lock().unwrap() = Some(tx);
        *self.sender.lock().unwrap() = Some(sender.clone());

        Ok(LiveChannel { sender, events: rx })
    }
}

pub fn test_setup() -> LiveSetup {
    LiveSetup {
        model: "test-model".to_string(),
        voice_name: "Kore".to_string(),
        system_instruction: "You are a test agent.".to_string(),
    }
}
