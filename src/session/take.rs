//! Completed recording sessions.
//!
//! A session is the immutable result of one start/stop cycle of the recorder.
//! Notes keep their capture order; consumers that need time order sort a copy.

use super::note::NoteEvent;
use crate::error::Result;
use crate::midi::DEFAULT_TEMPO;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

fn default_tempo() -> u32 {
    DEFAULT_TEMPO
}

/// A captured take: notes, the tempo the take was recorded at, and its length.
///
/// Serializes to the storage shape `{ "tempo", "duration", "notes" }`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordingSession {
    /// Tempo in beats per minute, fixed when the take was started.
    #[serde(rename = "tempo", default = "default_tempo")]
    tempo_bpm: u32,

    /// Milliseconds between start and stop of the take.
    #[serde(rename = "duration", default)]
    total_duration_ms: u64,

    /// Notes in capture order.
    notes: Vec<NoteEvent>,
}

impl RecordingSession {
    /// Creates a session from already captured notes.
    ///
    /// Used by the recorder on stop and by callers rebuilding a take that came
    /// back from storage.
    pub fn new(tempo_bpm: u32, notes: Vec<NoteEvent>, total_duration_ms: u64) -> Self {
        Self {
            tempo_bpm,
            total_duration_ms,
            notes,
        }
    }

    /// Tempo as captured. May be zero for takes restored from incomplete data.
    pub fn tempo_bpm(&self) -> u32 {
        self.tempo_bpm
    }

    /// Tempo to use for playback and export: the captured tempo, or 120 when unset.
    pub fn effective_tempo(&self) -> u32 {
        if self.tempo_bpm == 0 {
            DEFAULT_TEMPO
        } else {
            self.tempo_bpm
        }
    }

    /// Elapsed milliseconds between start and stop.
    pub fn total_duration_ms(&self) -> u64 {
        self.total_duration_ms
    }

    /// Notes in capture order.
    pub fn notes(&self) -> &[NoteEvent] {
        &self.notes
    }

    pub fn len(&self) -> usize {
        self.notes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.notes.is_empty()
    }

    /// Returns the notes ordered by timestamp.
    ///
    /// The sort is stable: notes sharing a timestamp keep their capture order.
    pub fn sorted_notes(&self) -> Vec<&NoteEvent> {
        let mut sorted: Vec<&NoteEvent> = self.notes.iter().collect();
        sorted.sort_by_key(|note| note.timestamp_ms);
        sorted
    }

    /// Timestamp at which the last note stops sounding.
    pub fn end_ms(&self) -> u64 {
        self.notes.iter().map(NoteEvent::end_ms).max().unwrap_or(0)
    }

    /// Serializes the session to pretty-printed JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parses a session from JSON.
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Saves the session as JSON.
    ///
    /// # Errors
    ///
    /// Returns error if serialization or file writing fails
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        fs::write(path, self.to_json()?)?;
        Ok(())
    }

    /// Loads a session from a JSON file.
    ///
    /// # Errors
    ///
    /// Returns error if file reading or parsing fails
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Saves the session in the compact bincode format.
    pub fn save_to_binary<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let data = bincode::serialize(self)?;
        fs::write(path, data)?;
        Ok(())
    }

    /// Loads a session from the compact bincode format.
    pub fn load_from_binary<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = fs::read(path)?;
        Ok(bincode::deserialize(&data)?)
    }
}
