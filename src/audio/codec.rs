//! # Audio Codec Helpers
//!
//! Pure conversion functions between the representations an audio sample
//! goes through on its way to and from the live conversation endpoint:
//!
//! ```text
//! f32 samples <-> i16 PCM <-> little-endian bytes <-> base64 text
//! ```
//!
//! Every pair is an exact inverse (bytes/base64) or an inverse within one
//! quantization step (float/PCM).

use crate::audio::playback::PlaybackBuffer;
use crate::audio::{INPUT_MIME_TYPE, OUTPUT_SAMPLE_RATE};
use crate::error::VoiceLinkError;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use byteorder::{ByteOrder, LittleEndian, ReadBytesExt, WriteBytesExt};
use serde::{Deserialize, Serialize};
use std::io::Cursor;

/// Scale factor between normalized floats and 16-bit PCM.
const PCM16_SCALE: f32 = 32768.0;

/// One encoded frame of microphone audio ready to send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MediaBlob {
    /// Base64-encoded little-endian PCM16
    pub data: String,
    /// MIME descriptor, e.g. `audio/pcm;rate=16000`
    pub mime_type: String,
}

/// Encode raw bytes as standard base64 (with padding).
pub fn encode_base64(bytes: &[u8]) -> String {
    STANDARD.encode(bytes)
}

/// Decode standard base64 text into raw bytes.
pub fn decode_base64(text: &str) -> Result<Vec<u8>, VoiceLinkError> {
    STANDARD
        .decode(text.trim())
        .map_err(|e| VoiceLinkError::DecodeError(format!("invalid base64: {}", e)))
}

/// Convert normalized samples in `[-1.0, 1.0]` to 16-bit PCM.
///
/// Values outside the range are clamped to the i16 limits.
pub fn float_to_pcm16(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample * PCM16_SCALE).round().clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Convert 16-bit PCM samples to normalized floats.
pub fn pcm16_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / PCM16_SCALE).collect()
}

/// Serialize PCM samples as little-endian bytes.
pub fn pcm16_to_bytes(samples: &[i16]) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(samples.len() * 2);
    for &sample in samples {
        // Writing into a Vec cannot fail
        let _ = bytes.write_i16::<LittleEndian>(sample);
    }
    bytes
}

/// Parse little-endian bytes into PCM samples.
pub fn bytes_to_pcm16(bytes: &[u8]) -> Result<Vec<i16>, VoiceLinkError> {
    if bytes.len() % 2 != 0 {
        return Err(VoiceLinkError::DecodeError(format!(
            "PCM16 payload has odd length {}",
            bytes.len()
        )));
    }

    let mut cursor = Cursor::new(bytes);
    let mut samples = Vec::with_capacity(bytes.len() / 2);
    while let Ok(sample) = cursor.read_i16::<LittleEndian>() {
        samples.push(sample);
    }
    Ok(samples)
}

/// Parse a block of little-endian `f32` samples (the browser's capture format).
pub fn bytes_to_f32(bytes: &[u8]) -> Result<Vec<f32>, VoiceLinkError> {
    if bytes.len() % 4 != 0 {
        return Err(VoiceLinkError::DecodeError(format!(
            "f32 block has length {} (not a multiple of 4)",
            bytes.len()
        )));
    }

    let mut samples = vec![0.0f32; bytes.len() / 4];
    LittleEndian::read_f32_into(bytes, &mut samples);
    Ok(samples)
}

/// Root-mean-square amplitude of a block, clamped to `[0, 1]`.
///
/// An empty block and a block of zeros both report exactly 0.
pub fn rms_level(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum: f64 = samples.iter().map(|&s| (s as f64) * (s as f64)).sum();
    let rms = (sum / samples.len() as f64).sqrt() as f32;
    rms.clamp(0.0, 1.0)
}

/// Encode one captured block as an outbound frame.
pub fn create_blob(samples: &[f32]) -> MediaBlob {
    let pcm = float_to_pcm16(samples);
    MediaBlob {
        data: encode_base64(&pcm16_to_bytes(&pcm)),
        mime_type: INPUT_MIME_TYPE.to_string(),
    }
}

/// Decode one inbound speech chunk (base64 PCM16 at 24kHz) into a playable buffer.
pub fn decode_chunk(data: &str) -> Result<PlaybackBuffer, VoiceLinkError> {
    let bytes = decode_base64(data)?;
    let pcm = bytes_to_pcm16(&bytes)?;
    Ok(PlaybackBuffer::new(pcm16_to_float(&pcm), OUTPUT_SAMPLE_RATE))
}

/// Encode a playable buffer back to base64 PCM16 (used when forwarding to a browser).
pub fn encode_buffer(buffer: &PlaybackBuffer) -> String {
    encode_base64(&pcm16_to_bytes(&float_to_pcm16(buffer.samples())))
}
