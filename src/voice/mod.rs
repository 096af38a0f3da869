//! # Voice Module
//!
//! The voice link session manager and the contracts it depends on.
//!
//! ## Key Components:
//! - **Link**: session lifecycle, capture, playback and interruption
//! - **Live**: vendor-neutral view of the remote conversation
//! - **Status**: link states, status notifications and counters

pub mod link;    // Session manager
pub mod live;    // Remote conversation contract
pub mod status;  // States, callbacks and counters

#[cfg(test)]
pub mod testing;

pub use link::{LinkOptions, VoiceLink};
pub use live::{LiveConnector, LiveEvent, LiveSetup};
pub use status::{LinkState, LinkStatus, StatusCallback, VolumeCallback};
