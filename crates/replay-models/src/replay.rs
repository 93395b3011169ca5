//! Replay snapshots and event sequences.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Logical court width in game units.
pub const COURT_WIDTH: f64 = 800.0;
/// Logical court height in game units.
pub const COURT_HEIGHT: f64 = 480.0;
/// Paddle height in game units.
pub const PADDLE_HEIGHT: f64 = 80.0;
/// Paddle width in output pixels (not scaled with the court).
pub const PADDLE_WIDTH: f64 = 12.0;
/// Ball diameter in output pixels (not scaled with the court).
pub const BALL_SIZE: f64 = 12.0;
/// Score needed to win when the log does not say otherwise.
pub const DEFAULT_TARGET_SCORE: i64 = 5;

/// One instant of game state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct Snapshot {
    pub ball_x: f64,
    pub ball_y: f64,
    pub left_paddle_y: f64,
    pub right_paddle_y: f64,
    pub left_score: i64,
    pub right_score: i64,
    pub target_score: i64,
    pub finished: bool,
}

impl Default for Snapshot {
    /// Centre-court ball, centred paddles, 0:0 towards the default target.
    fn default() -> Self {
        let paddle_y = (COURT_HEIGHT - PADDLE_HEIGHT) / 2.0;
        Self {
            ball_x: COURT_WIDTH / 2.0,
            ball_y: COURT_HEIGHT / 2.0,
            left_paddle_y: paddle_y,
            right_paddle_y: paddle_y,
            left_score: 0,
            right_score: 0,
            target_score: DEFAULT_TARGET_SCORE,
            finished: false,
        }
    }
}

/// A snapshot stamped with its offset from the start of the recording.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ReplayEvent {
    pub offset_ms: u64,
    pub snapshot: Snapshot,
}

impl ReplayEvent {
    pub fn new(offset_ms: u64, snapshot: Snapshot) -> Self {
        Self { offset_ms, snapshot }
    }
}

/// Ordered, non-empty, immutable list of replay events.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplaySequence {
    events: Vec<ReplayEvent>,
}

impl ReplaySequence {
    /// Wrap a list of events. Returns `None` for an empty list.
    pub fn new(events: Vec<ReplayEvent>) -> Option<Self> {
        if events.is_empty() {
            None
        } else {
            Some(Self { events })
        }
    }

    pub fn events(&self) -> &[ReplayEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Always false; kept for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn first(&self) -> &ReplayEvent {
        &self.events[0]
    }

    pub fn last(&self) -> &ReplayEvent {
        &self.events[self.events.len() - 1]
    }

    /// Offset of the final event in log order.
    pub fn last_offset_ms(&self) -> u64 {
        self.last().offset_ms
    }

    /// Event at index `len / 2`, used for thumbnails.
    pub fn midpoint(&self) -> &ReplayEvent {
        &self.events[self.events.len() / 2]
    }

    /// Number of places where an offset is smaller than its predecessor.
    pub fn ordering_violations(&self) -> usize {
        self.events
            .windows(2)
            .filter(|w| w[1].offset_ms < w[0].offset_ms)
            .count()
    }
}
