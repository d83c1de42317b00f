//! Duration bucketing into note values.
//!
//! Waits and sounding lengths are classified into one of five note values
//! before they are written as tick deltas.

use super::{DEFAULT_TEMPO, TICKS_PER_BEAT};
use serde::{Deserialize, Serialize};

/// Milliseconds per beat used by the fixed reference (120 BPM).
pub const REFERENCE_BEAT_MS: f64 = 500.0;

/// Note value a millisecond duration is bucketed into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoteValue {
    Whole,
    Half,
    Quarter,
    Eighth,
    Sixteenth,
}

impl NoteValue {
    /// Buckets a length expressed in beats.
    ///
    /// Thresholds are inclusive lower bounds: 4 beats and up is a whole note,
    /// 2 a half, 1 a quarter, 0.5 an eighth, anything shorter a sixteenth.
    pub fn from_beats(beats: f64) -> Self {
        if beats >= 4.0 {
            NoteValue::Whole
        } else if beats >= 2.0 {
            NoteValue::Half
        } else if beats >= 1.0 {
            NoteValue::Quarter
        } else if beats >= 0.5 {
            NoteValue::Eighth
        } else {
            NoteValue::Sixteenth
        }
    }

    /// Length of this note value in file ticks.
    pub fn ticks(self) -> u32 {
        let beat = TICKS_PER_BEAT as u32;
        match self {
            NoteValue::Whole => beat * 4,
            NoteValue::Half => beat * 2,
            NoteValue::Quarter => beat,
            NoteValue::Eighth => beat / 2,
            NoteValue::Sixteenth => beat / 4,
        }
    }
}

/// Which beat length milliseconds are divided by before bucketing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QuantizeReference {
    /// Always 500 ms per beat, whatever the session tempo.
    ///
    /// Takes recorded at tempos other than 120 BPM get systematically shifted
    /// note values. Kept as the default so existing exports stay byte-identical.
    #[default]
    Fixed,
    /// Beat length derived from the session tempo (`60000 / bpm` ms).
    SessionTempo,
}

impl QuantizeReference {
    /// Milliseconds per beat for a session recorded at `tempo_bpm`.
    pub fn beat_ms(self, tempo_bpm: u32) -> f64 {
        match self {
            QuantizeReference::Fixed => REFERENCE_BEAT_MS,
            QuantizeReference::SessionTempo => {
                let tempo = if tempo_bpm == 0 { DEFAULT_TEMPO } else { tempo_bpm };
                60_000.0 / tempo as f64
            }
        }
    }

    /// Buckets a millisecond length.
    pub fn quantize(self, ms: u64, tempo_bpm: u32) -> NoteValue {
        NoteValue::from_beats(ms as f64 / self.beat_ms(tempo_bpm))
    }
}
