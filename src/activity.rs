//! Shared record/playback state token.
//!
//! A recorder and a scheduler holding clones of the same [`ActivityGate`]
//! exclude each other: a take cannot start while playback is running, and
//! playback cannot start while a take is open. Components built without an
//! explicit gate get a private one and never block each other.

use crate::error::{Error, Result};
use crate::sync::lock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

/// Global counter for playback identifiers.
static PLAYBACK_ID_COUNTER: AtomicU64 = AtomicU64::new(1);

/// Identifier of one `play` call, unique across all schedulers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PlaybackId(u64);

impl PlaybackId {
    /// Generates a new unique playback ID.
    pub fn new() -> Self {
        Self(PLAYBACK_ID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for PlaybackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl Default for PlaybackId {
    fn default() -> Self {
        Self::new()
    }
}

/// What the gate currently allows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Activity {
    #[default]
    Idle,
    Recording,
    Playing(PlaybackId),
}

/// Cloneable handle to a shared [`Activity`].
#[derive(Debug, Clone, Default)]
pub struct ActivityGate {
    state: Arc<Mutex<Activity>>,
}

impl ActivityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current(&self) -> Activity {
        *lock(&self.state)
    }

    pub fn is_recording(&self) -> bool {
        self.current() == Activity::Recording
    }

    pub fn is_playing(&self) -> bool {
        matches!(self.current(), Activity::Playing(_))
    }

    /// Marks a take as open.
    ///
    /// # Errors
    ///
    /// [`Error::PlaybackActive`] while playing, [`Error::AlreadyRecording`]
    /// while another take holds the gate.
    pub fn begin_recording(&self) -> Result<()> {
        let mut state = lock(&self.state);
        match *state {
            Activity::Idle => {
                *state = Activity::Recording;
                Ok(())
            }
            Activity::Recording => Err(Error::AlreadyRecording),
            Activity::Playing(_) => Err(Error::PlaybackActive),
        }
    }

    pub fn end_recording(&self) {
        let mut state = lock(&self.state);
        if *state == Activity::Recording {
            *state = Activity::Idle;
        }
    }

    /// Marks `id` as the active playback, superseding any earlier one.
    ///
    /// # Errors
    ///
    /// [`Error::RecordingActive`] while a take is open.
    pub fn begin_playback(&self, id: PlaybackId) -> Result<()> {
        let mut state = lock(&self.state);
        if *state == Activity::Recording {
            return Err(Error::RecordingActive);
        }
        *state = Activity::Playing(id);
        Ok(())
    }

    /// Releases the gate if `id` is still the active playback.
    pub fn end_playback(&self, id: PlaybackId) {
        let mut state = lock(&self.state);
        if *state == Activity::Playing(id) {
            *state = Activity::Idle;
        }
    }
}
