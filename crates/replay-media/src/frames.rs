//! Sample-and-hold frame synthesis at the fixed output rate.

use std::sync::Arc;

use replay_models::encoding::FRAME_INTERVAL_MS;
use replay_models::ReplaySequence;

use crate::render::Rasterizer;

/// Number of frames covering `total_ms`, never less than one.
pub fn frame_count(total_ms: u64) -> u64 {
    total_ms.div_ceil(FRAME_INTERVAL_MS).max(1)
}

/// Length of the video in milliseconds.
///
/// The larger of the requested duration and the last event offset. When both
/// are zero, one frame interval per event.
pub fn expected_duration_ms(sequence: &ReplaySequence, duration_hint_ms: u64) -> u64 {
    let base = duration_hint_ms.max(sequence.last_offset_ms());
    if base == 0 {
        (sequence.len() as u64 * FRAME_INTERVAL_MS).max(FRAME_INTERVAL_MS)
    } else {
        base
    }
}

/// Forward-only cursor selecting the last event at or before a timestamp.
///
/// Timestamps must be requested in non-decreasing order.
#[derive(Debug, Clone, Default)]
pub struct SampleAndHold {
    index: usize,
}

impl SampleAndHold {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance to `t_ms` and return the index of the event to show.
    pub fn advance(&mut self, sequence: &ReplaySequence, t_ms: u64) -> usize {
        let events = sequence.events();
        while self.index + 1 < events.len() && events[self.index + 1].offset_ms <= t_ms {
            self.index += 1;
        }
        self.index
    }
}

/// Iterator of raw frames for a replay, in presentation order.
#[derive(Debug, Clone)]
pub struct FrameSynthesizer {
    sequence: Arc<ReplaySequence>,
    rasterizer: Rasterizer,
    cursor: SampleAndHold,
    next_frame: u64,
    total_frames: u64,
}

impl FrameSynthesizer {
    pub fn new(sequence: Arc<ReplaySequence>, rasterizer: Rasterizer, total_ms: u64) -> Self {
        Self {
            sequence,
            rasterizer,
            cursor: SampleAndHold::new(),
            next_frame: 0,
            total_frames: frame_count(total_ms),
        }
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    /// Event index for each frame, without rendering.
    pub fn schedule(sequence: &ReplaySequence, total_ms: u64) -> Vec<usize> {
        let mut cursor = SampleAndHold::new();
        (0..frame_count(total_ms))
            .map(|frame| cursor.advance(sequence, frame * FRAME_INTERVAL_MS))
            .collect()
    }
}

impl Iterator for FrameSynthesizer {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.next_frame >= self.total_frames {
            return None;
        }
        let t_ms = self.next_frame * FRAME_INTERVAL_MS;
        self.next_frame += 1;
        let index = self.cursor.advance(&self.sequence, t_ms);
        let snapshot = &self.sequence.events()[index].snapshot;
        Some(self.rasterizer.render_bytes(snapshot))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = (self.total_frames - self.next_frame) as usize;
        (remaining, Some(remaining))
    }
}

impl ExactSizeIterator for FrameSynthesizer {}
