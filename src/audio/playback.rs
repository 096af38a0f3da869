//! # Output Playback Scheduling
//!
//! Schedules inbound speech chunks back to back on an output device.
//!
//! ## Scheduling Rule:
//! ```text
//! start  = max(output clock now, cursor)
//! cursor = start + chunk duration
//! ```
//! Chunks arriving faster than real time queue up behind each other, chunks
//! arriving late start immediately, and nothing is ever scheduled in the past.
//!
//! ## Interruption:
//! Every scheduled source is stopped, the active set is cleared and the cursor
//! drops to zero so the next chunk starts "now".

use crate::audio::device::OutputDevice;
use crate::error::VoiceLinkError;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// Identifier of one scheduled chunk on an output device.
pub type SourceId = u64;

/// Decoded audio ready for playback.
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackBuffer {
    samples: Vec<f32>,
    sample_rate: u32,
}

impl PlaybackBuffer {
    pub fn new(samples: Vec<f32>, sample_rate: u32) -> Self {
        Self { samples, sample_rate }
    }

    pub fn samples(&self) -> &[f32] {
        &self.samples
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Duration in seconds.
    pub fn duration(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.samples.len() as f64 / self.sample_rate as f64
    }
}

/// Where and when a chunk was placed on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScheduledSource {
    pub id: SourceId,
    pub start_time: f64,
    pub duration: f64,
}

impl ScheduledSource {
    pub fn end_time(&self) -> f64 {
        self.start_time + self.duration
    }
}

/// Gapless scheduler for one output device.
pub struct PlaybackScheduler {
    output: Arc<dyn OutputDevice>,
    next_start_time: f64,
    active: HashMap<SourceId, ScheduledSource>,
    next_id: SourceId,
}

impl PlaybackScheduler {
    pub fn new(output: Arc<dyn OutputDevice>) -> Self {
        Self {
            output,
            next_start_time: 0.0,
            active: HashMap::new(),
            next_id: 1,
        }
    }

    /// Schedule `buffer` right after everything already queued.
    pub fn schedule(&mut self, buffer: PlaybackBuffer) -> Result<ScheduledSource, VoiceLinkError> {
        let now = self.output.current_time();
        let start_time = self.next_start_time.max(now);
        let duration = buffer.duration();

        let id = self.next_id;
        self.next_id += 1;

        self.output.start(id, buffer, start_time)?;

        let source = ScheduledSource { id, start_time, duration };
        self.next_start_time = source.end_time();
        self.active.insert(id, source);

        debug!(source_id = id, start_time, duration, "Scheduled output chunk");
        Ok(source)
    }

    /// Forget a source that finished playing. Returns false for unknown ids.
    pub fn finish(&mut self, id: SourceId) -> bool {
        self.active.remove(&id).is_some()
    }

    /// Stop everything that is scheduled and reset the cursor.
    ///
    /// Returns how many sources were stopped.
    pub fn interrupt(&mut self) -> usize {
        let stopped = self.active.len();
        for id in self.active.keys() {
            self.output.stop(*id);
        }
        self.active.clear();
        self.next_start_time = 0.0;
        stopped
    }

    /// Stop all playback and close the output device.
    pub fn shutdown(mut self) {
        self.interrupt();
        self.output.close();
    }

    pub fn next_start_time(&self) -> f64 {
        self.next_start_time
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::voice::testing::FakeOutput;

    fn chunk(seconds: f64) -> PlaybackBuffer {
        PlaybackBuffer::new(vec![0.0; (seconds * 24000.0) as usize], 24000)
    }

    #[test]
    fn test_chunks_play_back_to_back() {
        let output = FakeOutput::new();
        let mut scheduler = PlaybackScheduler::new(output.clone());

        let first = scheduler.schedule(chunk(0.5)).unwrap();
        let second = scheduler.schedule(chunk(0.25)).unwrap();
        let third = scheduler.schedule(chunk(1.0)).unwrap();

        assert_eq!(first.start_time, 0.0);
        assert_eq!(second.start_time, first.end_time());
        assert_eq!(third.start_time, second.end_time());
        assert_eq!(scheduler.active_count(), 3);
    }

    #[test]
    fn test_never_schedules_in_the_past() {
        let output = FakeOutput::new();
        let mut scheduler = PlaybackScheduler::new(output.clone());

        let first = scheduler.schedule(chunk(0.5)).unwrap();
        output.set_time(2.0);
        let late = scheduler.schedule(chunk(0.5)).unwrap();

        assert!(late.start_time >= first.end_time());
        assert_eq!(late.start_time, 2.0);
    }

    #[test]
    fn test_monotonic_under_varying_clock() {
        let output = FakeOutput::new();
        let mut scheduler = PlaybackScheduler::new(output.clone());
        let mut previous: Option<ScheduledSource> = None;

        for (i, now) in [0.0, 0.1, 0.15, 0.9, 3.0, 3.05, 3.1].iter().enumerate() {
            output.set_time(*now);
            let source = scheduler.schedule(chunk(0.1 + i as f64 * 0.05)).unwrap();

            assert!(source.start_time >= *now);
            if let Some(prev) = previous {
                assert!(source.start_time >= prev.end_time());
            }
            previous = Some(source);
        }
    }

    #[test]
    fn test_interrupt_stops_everything_and_resets_cursor() {
        let output = FakeOutput::new();
        let mut scheduler = PlaybackScheduler::new(output.clone());

        scheduler.schedule(chunk(1.0)).unwrap();
        scheduler.schedule(chunk(1.0)).unwrap();
        output.set_time(0.3);

        assert_eq!(scheduler.interrupt(), 2);
        assert_eq!(scheduler.active_count(), 0);
        assert_eq!(scheduler.next_start_time(), 0.0);
        assert_eq!(output.stopped().len(), 2);

        let next = scheduler.schedule(chunk(0.2)).unwrap();
        assert_eq!(next.start_time, 0.3);
    }

    #[test]
    fn test_finished_source_leaves_active_set() {
        let output = FakeOutput::new();
        let mut scheduler = PlaybackScheduler::new(output.clone());

        let source = scheduler.schedule(chunk(0.1)).unwrap();
        assert!(scheduler.finish(source.id));
        assert!(!scheduler.finish(source.id));
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_shutdown_closes_output() {
        let output = FakeOutput::new();
        let mut scheduler = PlaybackScheduler::new(output.clone());
        scheduler.schedule(chunk(0.1)).unwrap();

        scheduler.shutdown();
        assert!(output.is_closed());
        assert_eq!(output.stopped().len(), 1);
    }
}
