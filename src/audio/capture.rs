//! # Microphone Capture Loop
//!
//! Consumes captured blocks one at a time. For every block the loop reports
//! the RMS volume and enqueues an encoded frame for transmission. The frame
//! queue is bounded and filled with `try_send`, so a slow transport drops
//! frames instead of stalling capture.

use crate::audio::codec::{create_blob, rms_level, MediaBlob};
use crate::voice::status::{LinkStats, VolumeCallback};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tracing::{debug, trace};

/// Meter and encode one block, then hand the frame to the transmit queue.
///
/// Returns false once the transmit side has gone away.
pub fn process_block(
    block: &[f32],
    frames: &mpsc::Sender<MediaBlob>,
    on_volume: &VolumeCallback,
    stats: &LinkStats,
) -> bool {
    on_volume(rms_level(block));

    match frames.try_send(create_blob(block)) {
        Ok(()) => true,
        Err(TrySendError::Full(_)) => {
            stats.record_frame_dropped();
            trace!("Transmit queue full, dropping capture frame");
            true
        }
        Err(TrySendError::Closed(_)) => false,
    }
}

/// Run until the microphone stops producing blocks or the transmitter stops.
pub async fn run_capture(
    mut blocks: mpsc::Receiver<Vec<f32>>,
    frames: mpsc::Sender<MediaBlob>,
    on_volume: VolumeCallback,
    stats: Arc<LinkStats>,
) {
    let mut processed = 0u64;

    while let Some(block) = blocks.recv().await {
        if !process_block(&block, &frames, &on_volume, &stats) {
            break;
        }
        processed += 1;
    }

    debug!(blocks = processed, "Capture loop finished");
}
