//! Error types shared by the recorder, the playback scheduler and the MIDI codec.
//!
//! None of these are fatal: every variant can be recovered at the call site by
//! retrying the operation with corrected input or state.

use thiserror::Error;

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the capture, replay and export engine.
#[derive(Debug, Error)]
pub enum Error {
    /// `start_recording` was called while a take is already open.
    #[error("a recording is already in progress")]
    AlreadyRecording,

    /// `stop_recording` was called with no open take.
    #[error("no recording is in progress")]
    NotRecording,

    /// A session with no notes was handed to the scheduler or the codec.
    #[error("the recording session contains no notes")]
    EmptySession,

    /// A pitch token did not match `[A-G](#|b)?<octave>` or is outside the MIDI range.
    #[error("invalid pitch token: {0:?}")]
    InvalidPitchToken(String),

    /// The external sound engine could not be initialized.
    #[error("sound engine unavailable: {0}")]
    SoundEngineUnavailable(String),

    /// Recording cannot start while a shared gate reports active playback.
    #[error("cannot start recording while playback is active")]
    PlaybackActive,

    /// Playback cannot start while a shared gate reports an open take.
    #[error("cannot start playback while recording is active")]
    RecordingActive,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("binary encoding error: {0}")]
    Binary(#[from] bincode::Error),
}
