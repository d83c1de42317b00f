//! keytake - performance capture, replay and MIDI export.
//!
//! This library records timestamped notes from a live input stream, replays
//! them with their captured timing through an external transport and sound
//! engine, and encodes them into Standard MIDI Files.

pub mod activity;
pub mod config;
pub mod error;
pub mod midi;
pub mod playback;
pub mod recorder;
pub mod session;
mod sync;

// Re-export commonly used types
pub use activity::{Activity, ActivityGate, PlaybackId};
pub use config::EngineConfig;
pub use error::{Error, Result};
pub use midi::{midi_number, write_midi_file, MidiEncoder, NoteValue, PitchPolicy};
pub use playback::{
    Clock, ManualTransport, PlaybackHandle, PlaybackScheduler, RealtimeTransport, SoundEngine,
    SystemClock, Transport,
};
pub use recorder::{NoteCounter, Recorder};
pub use session::{NoteEvent, RecordingSession};

/// Encodes a session into Standard MIDI File bytes with the default encoder.
///
/// # Examples
///
/// ```
/// use keytake::{encode, NoteEvent, RecordingSession};
///
/// let session = RecordingSession::new(120, vec![NoteEvent::new(0, "C4", "piano", 500, 100)], 500);
/// let bytes = encode(&session, "Demo").unwrap();
/// assert_eq!(&bytes[..4], b"MThd");
/// ```
pub fn encode(session: &RecordingSession, track_name: &str) -> Result<Vec<u8>> {
    MidiEncoder::new().encode(session, track_name)
}
