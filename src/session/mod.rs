//! Captured performance data.
//!
//! This module provides the shared data model produced by the recorder and
//! consumed by the playback scheduler and the MIDI codec.

mod note;
mod take;

pub use note::{
    velocity_from_unit, NoteEvent, DEFAULT_NOTE_DURATION_MS, DEFAULT_VELOCITY, MAX_VELOCITY,
};
pub use take::RecordingSession;
