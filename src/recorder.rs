//! Live performance capture.
//!
//! The recorder gates and timestamps an incoming key-press stream. Timestamps
//! are read from an injected monotonic [`Clock`] (normally the audio
//! transport's), never from the wall clock.

use crate::activity::ActivityGate;
use crate::error::{Error, Result};
use crate::playback::Clock;
use crate::session::{NoteEvent, RecordingSession, DEFAULT_NOTE_DURATION_MS, DEFAULT_VELOCITY};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Cloneable view of the number of notes captured in the current take.
///
/// Lets a UI thread poll progress without borrowing the recorder.
#[derive(Debug, Clone, Default)]
pub struct NoteCounter(Arc<AtomicUsize>);

impl NoteCounter {
    pub fn get(&self) -> usize {
        self.0.load(Ordering::Relaxed)
    }

    fn increment(&self) {
        self.0.fetch_add(1, Ordering::Relaxed);
    }

    fn reset(&self) {
        self.0.store(0, Ordering::Relaxed);
    }
}

/// A take that is still accepting notes.
#[derive(Debug)]
struct OpenTake {
    /// Clock reading when the take started.
    started_at: Duration,
    tempo_bpm: u32,
    notes: Vec<NoteEvent>,
}

impl OpenTake {
    fn elapsed_ms(&self, now: Duration) -> u64 {
        now.saturating_sub(self.started_at).as_millis() as u64
    }
}

/// Captures timestamped notes between `start_recording` and `stop_recording`.
///
/// At most one take is open at a time. Notes arriving while idle are dropped
/// silently: input outside a recording window is normal, not a fault.
pub struct Recorder {
    clock: Arc<dyn Clock>,
    gate: ActivityGate,
    take: Option<OpenTake>,
    counter: NoteCounter,
}

impl Recorder {
    /// Creates an idle recorder reading time from `clock`.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self::with_gate(clock, ActivityGate::new())
    }

    /// Creates an idle recorder that shares `gate` with a playback scheduler,
    /// so recording and playback exclude each other.
    pub fn with_gate(clock: Arc<dyn Clock>, gate: ActivityGate) -> Self {
        Self {
            clock,
            gate,
            take: None,
            counter: NoteCounter::default(),
        }
    }

    /// Opens a new take.
    ///
    /// # Errors
    ///
    /// - [`Error::AlreadyRecording`] if a take is already open
    /// - [`Error::PlaybackActive`] if the shared gate reports playback
    pub fn start_recording(&mut self, tempo_bpm: u32) -> Result<()> {
        if self.take.is_some() {
            return Err(Error::AlreadyRecording);
        }
        self.gate.begin_recording()?;

        self.counter.reset();
        self.take = Some(OpenTake {
            started_at: self.clock.now(),
            tempo_bpm,
            notes: Vec::new(),
        });
        tracing::info!("Recording started at {} BPM", tempo_bpm);
        Ok(())
    }

    /// Appends a note to the open take, timestamped against its start.
    ///
    /// Returns `false` (and records nothing) when no take is open.
    pub fn record_note(
        &mut self,
        pitch: impl Into<String>,
        instrument: impl Into<String>,
        duration_ms: u32,
        velocity: u8,
    ) -> bool {
        let Some(take) = self.take.as_mut() else {
            return false;
        };

        let timestamp_ms = take.elapsed_ms(self.clock.now());
        take.notes.push(NoteEvent::new(
            timestamp_ms,
            pitch,
            instrument,
            duration_ms,
            velocity,
        ));
        self.counter.increment();
        true
    }

    /// Records a note with a 500 ms duration and velocity 100.
    pub fn record_default_note(
        &mut self,
        pitch: impl Into<String>,
        instrument: impl Into<String>,
    ) -> bool {
        self.record_note(pitch, instrument, DEFAULT_NOTE_DURATION_MS, DEFAULT_VELOCITY)
    }

    /// Closes the open take and returns it.
    ///
    /// # Errors
    ///
    /// [`Error::NotRecording`] if no take is open.
    pub fn stop_recording(&mut self) -> Result<RecordingSession> {
        let take = self.take.take().ok_or(Error::NotRecording)?;
        self.gate.end_recording();

        let total_duration_ms = take.elapsed_ms(self.clock.now());
        tracing::info!(
            "Recording stopped. Total duration: {}ms, Notes: {}",
            total_duration_ms,
            take.notes.len()
        );
        Ok(RecordingSession::new(
            take.tempo_bpm,
            take.notes,
            total_duration_ms,
        ))
    }

    /// Drops the open take, if any, without producing a session.
    pub fn discard(&mut self) {
        if self.take.take().is_some() {
            self.gate.end_recording();
            tracing::debug!("Recording discarded");
        }
        self.counter.reset();
    }

    pub fn is_recording(&self) -> bool {
        self.take.is_some()
    }

    /// Number of notes in the open take (0 when idle).
    pub fn note_count(&self) -> usize {
        self.take.as_ref().map_or(0, |take| take.notes.len())
    }

    /// Shared counter that tracks `note_count` across threads.
    pub fn counter(&self) -> NoteCounter {
        self.counter.clone()
    }
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.take.is_some() {
            self.gate.end_recording();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::activity::PlaybackId;
    use crate::playback::ManualTransport;

    fn recorder() -> (Arc<ManualTransport>, Recorder) {
        let clock = Arc::new(ManualTransport::new());
        let recorder = Recorder::new(clock.clone());
        (clock, recorder)
    }

    #[test]
    fn test_start_stop() {
        let (clock, mut recorder) = recorder();
        clock.advance(Duration::from_secs(3));

        recorder.start_recording(120).unwrap();
        assert!(recorder.is_recording());

        clock.advance(Duration::from_millis(500));
        let session = recorder.stop_recording().unwrap();
        assert!(!recorder.is_recording());
        assert_eq!(session.total_duration_ms(), 500);
        assert_eq!(session.tempo_bpm(), 120);
    }

    #[test]
    fn test_timestamps_relative_to_start() {
        let (clock, mut recorder) = recorder();
        clock.advance(Duration::from_millis(1234));
        recorder.start_recording(100).unwrap();

        assert!(recorder.record_note("C4", "piano", 400, 90));
        clock.advance(Duration::from_millis(150));
        assert!(recorder.record_default_note("E4", "synth"));

        let session = recorder.stop_recording().unwrap();
        let notes = session.notes();
        assert_eq!(notes.len(), 2);
        assert_eq!(notes[0].timestamp_ms, 0);
        assert_eq!(notes[0].duration_ms, 400);
        assert_eq!(notes[1].timestamp_ms, 150);
        assert_eq!(notes[1].duration_ms, 500);
        assert_eq!(notes[1].velocity, 100);
        assert_eq!(notes[1].instrument, "synth");
    }

    #[test]
    fn test_record_outside_session_is_noop() {
        let (_clock, mut recorder) = recorder();
        assert!(!recorder.record_note("C4", "piano", 500, 100));
        assert_eq!(recorder.note_count(), 0);
        assert_eq!(recorder.counter().get(), 0);
    }

    #[test]
    fn test_double_start_fails() {
        let (_clock, mut recorder) = recorder();
        recorder.start_recording(120).unwrap();
        assert!(matches!(
            recorder.start_recording(90),
            Err(Error::AlreadyRecording)
        ));
        // The open take is untouched.
        let session = recorder.stop_recording().unwrap();
        assert_eq!(session.tempo_bpm(), 120);
    }

    #[test]
    fn test_stop_while_idle_fails() {
        let (_clock, mut recorder) = recorder();
        assert!(matches!(
            recorder.stop_recording(),
            Err(Error::NotRecording)
        ));
    }

    #[test]
    fn test_note_counter() {
        let (_clock, mut recorder) = recorder();
        let counter = recorder.counter();
        recorder.start_recording(120).unwrap();
        recorder.record_default_note("C4", "piano");
        recorder.record_default_note("D4", "piano");
        assert_eq!(counter.get(), 2);
        assert_eq!(recorder.note_count(), 2);

        recorder.stop_recording().unwrap();
        assert_eq!(recorder.note_count(), 0);

        recorder.start_recording(120).unwrap();
        assert_eq!(counter.get(), 0);
    }

    #[test]
    fn test_capture_order_preserved() {
        let (clock, mut recorder) = recorder();
        recorder.start_recording(120).unwrap();
        clock.advance(Duration::from_millis(10));
        recorder.record_default_note("G4", "piano");
        recorder.record_default_note("A4", "piano");

        let session = recorder.stop_recording().unwrap();
        assert_eq!(session.notes()[0].pitch, "G4");
        assert_eq!(session.notes()[1].pitch, "A4");
        assert_eq!(session.notes()[0].timestamp_ms, session.notes()[1].timestamp_ms);
    }

    #[test]
    fn test_discard() {
        let (_clock, mut recorder) = recorder();
        recorder.start_recording(120).unwrap();
        recorder.record_default_note("C4", "piano");
        recorder.discard();

        assert!(!recorder.is_recording());
        assert_eq!(recorder.counter().get(), 0);
        assert!(recorder.start_recording(120).is_ok());
    }

    #[test]
    fn test_shared_gate_blocks_during_playback() {
        let clock = Arc::new(ManualTransport::new());
        let gate = ActivityGate::new();
        let mut recorder = Recorder::with_gate(clock, gate.clone());

        let playback = PlaybackId::new();
        gate.begin_playback(playback).unwrap();
        assert!(matches!(
            recorder.start_recording(120),
            Err(Error::PlaybackActive)
        ));

        gate.end_playback(playback);
        recorder.start_recording(120).unwrap();
        assert!(gate.is_recording());
        recorder.stop_recording().unwrap();
        assert!(!gate.is_recording());
    }

    #[test]
    fn test_drop_releases_gate() {
        let gate = ActivityGate::new();
        {
            let mut recorder = Recorder::with_gate(Arc::new(ManualTransport::new()), gate.clone());
            recorder.start_recording(120).unwrap();
        }
        assert!(!gate.is_recording());
    }
}
