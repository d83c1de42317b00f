//! Captured note representation.
//!
//! A note event is one key press as seen by the recorder: when it happened
//! relative to the start of the take, which pitch token was played, which
//! voice should render it, and how long and how hard it was played.

use serde::{Deserialize, Serialize};

/// Sounding length used when the input source does not report one.
pub const DEFAULT_NOTE_DURATION_MS: u32 = 500;

/// Velocity used when the input source does not report one.
pub const DEFAULT_VELOCITY: u8 = 100;

/// Highest valid MIDI velocity.
pub const MAX_VELOCITY: u8 = 127;

fn default_velocity() -> u8 {
    DEFAULT_VELOCITY
}

/// Represents a single captured musical event.
///
/// Field names on the wire follow the storage collaborator's note shape
/// (`timestamp`, `note`, `instrument`, `duration`, `velocity`), so a take can be
/// handed to persistence verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NoteEvent {
    /// Milliseconds since the take started, read from a monotonic clock.
    #[serde(rename = "timestamp")]
    pub timestamp_ms: u64,

    /// Pitch token such as `"C4"` or `"F#3"`. Stored as captured; parsing
    /// happens at the codec boundary.
    #[serde(rename = "note")]
    pub pitch: String,

    /// Identifier of the external voice that renders this event.
    pub instrument: String,

    /// Intended sounding length in milliseconds. Always at least 1.
    #[serde(rename = "duration")]
    pub duration_ms: u32,

    /// Note velocity (0-127).
    #[serde(default = "default_velocity")]
    pub velocity: u8,
}

impl NoteEvent {
    /// Creates a new note event.
    ///
    /// Velocity is clamped to the MIDI range and a zero duration is raised to
    /// one millisecond so every event has a positive sounding length.
    ///
    /// # Examples
    ///
    /// ```
    /// use keytake::NoteEvent;
    ///
    /// let note = NoteEvent::new(0, "C4", "piano", 500, 200);
    /// assert_eq!(note.velocity, 127);
    /// ```
    pub fn new(
        timestamp_ms: u64,
        pitch: impl Into<String>,
        instrument: impl Into<String>,
        duration_ms: u32,
        velocity: u8,
    ) -> Self {
        Self {
            timestamp_ms,
            pitch: pitch.into(),
            instrument: instrument.into(),
            duration_ms: duration_ms.max(1),
            velocity: velocity.min(MAX_VELOCITY),
        }
    }

    /// Returns the timestamp at which this note stops sounding.
    pub fn end_ms(&self) -> u64 {
        self.timestamp_ms.saturating_add(self.duration_ms as u64)
    }

    /// Velocity on the 0.0-1.0 scale expected by sound engines.
    pub fn unit_velocity(&self) -> f32 {
        self.velocity.min(MAX_VELOCITY) as f32 / MAX_VELOCITY as f32
    }
}

/// Converts a normalized 0.0-1.0 velocity into the MIDI 0-127 range.
///
/// Out-of-range and NaN inputs clamp to the nearest bound.
pub fn velocity_from_unit(value: f32) -> u8 {
    if value.is_nan() {
        return 0;
    }
    (value.clamp(0.0, 1.0) * MAX_VELOCITY as f32).round() as u8
}
