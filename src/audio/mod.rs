//! # Audio Module
//!
//! Audio primitives used by the voice link:
//!
//! ## Key Components:
//! - **Codec**: base64 and PCM16 conversion helpers, RMS volume metering
//! - **Device**: traits that abstract the microphone and the speakers
//! - **Capture**: per-block metering and encoding of microphone audio
//! - **Playback**: gapless scheduling of inbound speech with interruption
//!
//! ## Audio Format Requirements:
//! These rates are part of the wire contract with the live conversation
//! endpoint and must not change without renegotiating with it.
//! - **Input**: 16kHz mono 16-bit PCM (little-endian)
//! - **Output**: 24kHz mono 16-bit PCM (little-endian)

pub mod capture;   // Microphone block processing
pub mod codec;     // Base64 / PCM conversion and metering
pub mod device;    // Device traits
pub mod playback;  // Output scheduling

/// Sample rate of captured microphone audio sent to the remote agent.
pub const INPUT_SAMPLE_RATE: u32 = 16_000;

/// Sample rate of synthesized speech received from the remote agent.
pub const OUTPUT_SAMPLE_RATE: u32 = 24_000;

/// Default number of mono samples in one capture block.
pub const DEFAULT_CAPTURE_BLOCK_SIZE: usize = 4096;

/// MIME descriptor attached to every outbound frame.
pub const INPUT_MIME_TYPE: &str = "audio/pcm;rate=16000";
