//! Link states, caller-facing status notifications and session counters.

use crate::error::VoiceLinkError;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// Internal lifecycle state of the voice link.
///
/// ```text
/// Idle -> Connecting -> Active -> Closed
///            |            |
///            +--> Errored <+
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkState {
    Idle,
    Connecting,
    Active,
    Closed,
    Errored,
}

impl LinkState {
    pub fn as_str(&self) -> &'static str {
        match self {
            LinkState::Idle => "idle",
            LinkState::Connecting => "connecting",
            LinkState::Active => "active",
            LinkState::Closed => "closed",
            LinkState::Errored => "errored",
        }
    }

    /// Whether a session is in flight (resources may be held).
    pub fn is_live(&self) -> bool {
        matches!(self, LinkState::Connecting | LinkState::Active)
    }
}

/// Status reported to the caller through the status callback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LinkStatus {
    Connected,
    Disconnected,
    Error,
}

/// Fired on `connected`, `disconnected` and `error` transitions.
pub type StatusCallback = Arc<dyn Fn(LinkStatus, Option<VoiceLinkError>) + Send + Sync>;

/// Fired once per captured block with the RMS level in `[0, 1]`.
pub type VolumeCallback = Arc<dyn Fn(f32) + Send + Sync>;

/// Counters for the lifetime of the link (across sessions).
#[derive(Debug, Default)]
pub struct LinkStats {
    sessions_started: AtomicU64,
    frames_sent: AtomicU64,
    frames_dropped: AtomicU64,
    chunks_scheduled: AtomicU64,
    interruptions: AtomicU64,
    errors: AtomicU64,
}

/// Point-in-time copy of [`LinkStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct LinkStatsSnapshot {
    pub sessions_started: u64,
    pub frames_sent: u64,
    pub frames_dropped: u64,
    pub chunks_scheduled: u64,
    pub interruptions: u64,
    pub errors: u64,
}

impl LinkStats {
    pub fn record_session_started(&self) {
        self.sessions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_sent(&self) {
        self.frames_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_frame_dropped(&self) {
        self.frames_dropped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_chunk_scheduled(&self) {
        self.chunks_scheduled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_interruption(&self) {
        self.interruptions.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> LinkStatsSnapshot {
        LinkStatsSnapshot {
            sessions_started: self.sessions_started.load(Ordering::Relaxed),
            frames_sent: self.frames_sent.load(Ordering::Relaxed),
            frames_dropped: self.frames_dropped.load(Ordering::Relaxed),
            chunks_scheduled: self.chunks_scheduled.load(Ordering::Relaxed),
            interruptions: self.interruptions.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Which resources the link currently holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResourceSnapshot {
    pub input_device: bool,
    pub output_device: bool,
    pub remote_session: bool,
    pub scheduled_sources: usize,
    pub background_tasks: usize,
}

impl ResourceSnapshot {
    pub fn is_released(&self) -> bool {
        *self == ResourceSnapshot::default()
    }
}
