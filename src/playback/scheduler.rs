//! Timed replay of captured sessions.
//!
//! The scheduler turns each note of a session into one transport callback at
//! the note's capture offset, then starts the transport after a short lead-in.
//! It keeps no audio state of its own.

use super::transport::{Callback, SoundEngine, Transport};
use crate::activity::{ActivityGate, PlaybackId};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::session::{NoteEvent, RecordingSession};
use crate::sync::lock;
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replays sessions against a transport. At most one playback is active per
/// scheduler; starting a new one supersedes the previous one.
pub struct PlaybackScheduler {
    transport: Arc<dyn Transport>,
    gate: ActivityGate,
    lead_in: Duration,
    /// Playback currently owning the transport.
    active: Arc<Mutex<Option<PlaybackId>>>,
}

impl PlaybackScheduler {
    /// Creates a scheduler with the default configuration and a private gate.
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, &EngineConfig::default(), ActivityGate::new())
    }

    /// Creates a scheduler sharing `gate` with a recorder.
    pub fn with_gate(transport: Arc<dyn Transport>, gate: ActivityGate) -> Self {
        Self::with_config(transport, &EngineConfig::default(), gate)
    }

    pub fn with_config(
        transport: Arc<dyn Transport>,
        config: &EngineConfig,
        gate: ActivityGate,
    ) -> Self {
        Self {
            transport,
            gate,
            lead_in: config.lead_in(),
            active: Arc::new(Mutex::new(None)),
        }
    }

    /// Schedules every note of `session` and starts the transport.
    ///
    /// Each note fires at its capture timestamp (relative to transport zero)
    /// and calls `engine.play_note` with velocity scaled to 0.0-1.0. Failures
    /// reported by the engine inside a callback are logged and skipped.
    ///
    /// # Errors
    ///
    /// - [`Error::EmptySession`] if the session has no notes
    /// - [`Error::SoundEngineUnavailable`] if the engine cannot be prepared
    /// - [`Error::RecordingActive`] if the shared gate reports an open take
    pub fn play(
        &mut self,
        session: &RecordingSession,
        engine: Arc<dyn SoundEngine>,
    ) -> Result<PlaybackHandle> {
        if session.is_empty() {
            return Err(Error::EmptySession);
        }
        engine.ensure_ready()?;

        let id = PlaybackId::new();
        self.gate.begin_playback(id)?;

        if let Some(previous) = lock(&self.active).replace(id) {
            tracing::debug!("Superseding playback {}", previous);
        }
        self.transport.stop();
        self.transport.cancel_all();

        let notes = session.sorted_notes();
        tracing::info!(
            "Scheduling playback for {} notes using transport",
            notes.len()
        );

        let last = notes.len() - 1;
        for (index, note) in notes.into_iter().enumerate() {
            let offset = Duration::from_millis(note.timestamp_ms);
            tracing::debug!("Note {} at {:?}", note.pitch, offset);

            let release = (index == last).then(|| (self.gate.clone(), Arc::clone(&self.active)));
            let callback = note_callback(note, Arc::clone(&engine), id, release);
            self.transport.schedule_at(offset, callback);
        }

        self.transport.set_tempo(session.effective_tempo());
        self.transport.start(self.lead_in);

        Ok(PlaybackHandle {
            id,
            transport: Arc::clone(&self.transport),
            gate: self.gate.clone(),
            active: Arc::clone(&self.active),
        })
    }

    /// Cancels the active playback, if any.
    pub fn stop(&mut self) {
        let previous = lock(&self.active).take();
        if let Some(id) = previous {
            self.transport.stop();
            self.transport.cancel_all();
            self.gate.end_playback(id);
            tracing::debug!("Playback {} stopped", id);
        }
    }

    /// Whether a playback is scheduled and its final note has not fired yet.
    pub fn is_playing(&self) -> bool {
        lock(&self.active).is_some()
    }

    pub fn gate(&self) -> &ActivityGate {
        &self.gate
    }
}

/// Builds the callback for one note. The final note also releases the
/// playback's hold on the gate.
fn note_callback(
    note: &NoteEvent,
    engine: Arc<dyn SoundEngine>,
    id: PlaybackId,
    release: Option<(ActivityGate, Arc<Mutex<Option<PlaybackId>>>)>,
) -> Callback {
    let pitch = note.pitch.clone();
    let instrument = note.instrument.clone();
    let duration_ms = note.duration_ms;
    let velocity = note.unit_velocity();

    Box::new(move || {
        if let Err(e) = engine.play_note(&pitch, duration_ms, velocity, &instrument) {
            tracing::warn!("Sound engine failed to play {} on {}: {}", pitch, instrument, e);
        }
        if let Some((gate, active)) = release {
            {
                let mut active = lock(&active);
                if *active == Some(id) {
                    *active = None;
                }
            }
            gate.end_playback(id);
        }
    })
}

/// Cancellation handle returned by [`PlaybackScheduler::play`].
///
/// Dropping the handle does not stop playback.
pub struct PlaybackHandle {
    id: PlaybackId,
    transport: Arc<dyn Transport>,
    gate: ActivityGate,
    active: Arc<Mutex<Option<PlaybackId>>>,
}

impl PlaybackHandle {
    pub fn id(&self) -> PlaybackId {
        self.id
    }

    /// Whether this playback still owns the transport.
    pub fn is_active(&self) -> bool {
        *lock(&self.active) == Some(self.id)
    }

    /// Stops the transport and discards all pending callbacks.
    ///
    /// No callback of this playback fires after `cancel` returns. Returns
    /// `false` without touching the transport when this playback already
    /// finished or was superseded by a newer `play`.
    pub fn cancel(&self) -> bool {
        {
            let mut active = lock(&self.active);
            if *active != Some(self.id) {
                return false;
            }
            *active = None;
        }
        self.transport.stop();
        self.transport.cancel_all();
        self.gate.end_playback(self.id);
        tracing::debug!("Playback {} cancelled", self.id);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::transport::EngineUnavailable;
    use crate::playback::ManualTransport;

    #[derive(Debug, Clone, PartialEq)]
    struct PlayedNote {
        pitch: String,
        duration_ms: u32,
        velocity: f32,
        instrument: String,
    }

    #[derive(Default)]
    struct MockEngine {
        played: Mutex<Vec<PlayedNote>>,
        unavailable: bool,
    }

    impl MockEngine {
        fn played(&self) -> Vec<PlayedNote> {
            lock(&self.played).clone()
        }
    }

    impl SoundEngine for MockEngine {
        fn ensure_ready(&self) -> std::result::Result<(), EngineUnavailable> {
            if self.unavailable {
                Err(EngineUnavailable("audio context blocked".to_string()))
            } else {
                Ok(())
            }
        }

        fn play_note(
            &self,
            pitch: &str,
            duration_ms: u32,
            velocity: f32,
            instrument: &str,
        ) -> std::result::Result<(), EngineUnavailable> {
            lock(&self.played).push(PlayedNote {
                pitch: pitch.to_string(),
                duration_ms,
                velocity,
                instrument: instrument.to_string(),
            });
            Ok(())
        }
    }

    fn two_note_session() -> RecordingSession {
        RecordingSession::new(
            90,
            vec![
                NoteEvent::new(300, "E4", "guitar", 200, 127),
                NoteEvent::new(0, "C4", "piano", 500, 0),
            ],
            600,
        )
    }

    fn setup() -> (Arc<ManualTransport>, PlaybackScheduler, Arc<MockEngine>) {
        let transport = Arc::new(ManualTransport::new());
        let scheduler = PlaybackScheduler::new(transport.clone());
        (transport, scheduler, Arc::new(MockEngine::default()))
    }

    #[test]
    fn test_schedules_one_callback_per_note() {
        let (transport, mut scheduler, engine) = setup();
        scheduler.play(&two_note_session(), engine).unwrap();

        assert_eq!(
            transport.pending_offsets(),
            vec![Duration::from_millis(0), Duration::from_millis(300)]
        );
        assert_eq!(transport.tempo(), 90);
        assert!(transport.is_running());
    }

    #[test]
    fn test_replays_with_lead_in() {
        let (transport, mut scheduler, engine) = setup();
        let handle = scheduler.play(&two_note_session(), engine.clone()).unwrap();

        assert_eq!(transport.advance(Duration::from_millis(99)), 0);
        assert_eq!(transport.advance(Duration::from_millis(1)), 1);
        assert_eq!(transport.advance(Duration::from_millis(300)), 1);

        let played = engine.played();
        assert_eq!(played[0].pitch, "C4");
        assert_eq!(played[0].velocity, 0.0);
        assert_eq!(played[0].instrument, "piano");
        assert_eq!(played[1].pitch, "E4");
        assert_eq!(played[1].duration_ms, 200);
        assert!((played[1].velocity - 1.0).abs() < f32::EPSILON);

        // The final note ends the playback.
        assert!(!handle.is_active());
        assert!(!scheduler.is_playing());
        assert!(!handle.cancel());
    }

    #[test]
    fn test_cancel_before_firing() {
        let (transport, mut scheduler, engine) = setup();
        let handle = scheduler.play(&two_note_session(), engine.clone()).unwrap();

        assert!(handle.cancel());
        transport.advance(Duration::from_secs(10));
        assert!(engine.played().is_empty());
        assert!(!transport.is_running());
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_cancel_midway() {
        let (transport, mut scheduler, engine) = setup();
        let handle = scheduler.play(&two_note_session(), engine.clone()).unwrap();

        transport.advance(Duration::from_millis(200));
        assert!(handle.cancel());
        transport.advance(Duration::from_secs(1));
        assert_eq!(engine.played().len(), 1);
    }

    /// Engine that cancels its own playback on the first note.
    #[derive(Default)]
    struct CancellingEngine {
        handle: Mutex<Option<PlaybackHandle>>,
        played: Mutex<Vec<String>>,
    }

    impl SoundEngine for CancellingEngine {
        fn play_note(
            &self,
            pitch: &str,
            _duration_ms: u32,
            _velocity: f32,
            _instrument: &str,
        ) -> std::result::Result<(), EngineUnavailable> {
            lock(&self.played).push(pitch.to_string());
            let handle = lock(&self.handle).take();
            if let Some(handle) = handle {
                assert!(handle.cancel());
            }
            Ok(())
        }
    }

    #[test]
    fn test_cancel_inside_note_silences_rest() {
        let (transport, mut scheduler, _) = setup();
        let engine = Arc::new(CancellingEngine::default());
        let session = RecordingSession::new(
            120,
            vec![
                NoteEvent::new(0, "C4", "piano", 100, 100),
                NoteEvent::new(0, "E4", "piano", 100, 100),
                NoteEvent::new(10, "G4", "piano", 100, 100),
            ],
            110,
        );

        let handle = scheduler.play(&session, engine.clone()).unwrap();
        *lock(&engine.handle) = Some(handle);
        transport.advance(Duration::from_millis(200));

        assert_eq!(*lock(&engine.played), vec!["C4"]);
        assert!(!scheduler.is_playing());
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn test_new_play_supersedes_previous() {
        let (transport, mut scheduler, engine) = setup();
        let first = scheduler.play(&two_note_session(), engine.clone()).unwrap();

        let single = RecordingSession::new(
            120,
            vec![NoteEvent::new(50, "A4", "synth", 100, 64)],
            100,
        );
        let second = scheduler.play(&single, engine.clone()).unwrap();
        assert!(!first.is_active());
        assert!(second.is_active());
        assert_eq!(transport.pending_count(), 1);

        // A stale handle must not stop the newer playback.
        assert!(!first.cancel());
        transport.advance(Duration::from_secs(1));
        let played = engine.played();
        assert_eq!(played.len(), 1);
        assert_eq!(played[0].pitch, "A4");
    }

    #[test]
    fn test_empty_session_rejected() {
        let (transport, mut scheduler, engine) = setup();
        let empty = RecordingSession::new(120, Vec::new(), 0);
        assert!(matches!(
            scheduler.play(&empty, engine),
            Err(Error::EmptySession)
        ));
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn test_engine_unavailable() {
        let (_transport, mut scheduler, _) = setup();
        let engine = Arc::new(MockEngine {
            unavailable: true,
            ..Default::default()
        });
        assert!(matches!(
            scheduler.play(&two_note_session(), engine),
            Err(Error::SoundEngineUnavailable(_))
        ));
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_unset_tempo_defaults() {
        let (transport, mut scheduler, engine) = setup();
        let session = RecordingSession::new(0, vec![NoteEvent::new(0, "C4", "piano", 500, 100)], 500);
        scheduler.play(&session, engine).unwrap();
        assert_eq!(transport.tempo(), 120);
    }

    #[test]
    fn test_shared_gate_blocks_while_recording() {
        let transport = Arc::new(ManualTransport::new());
        let gate = ActivityGate::new();
        let mut scheduler = PlaybackScheduler::with_gate(transport.clone(), gate.clone());

        gate.begin_recording().unwrap();
        assert!(matches!(
            scheduler.play(&two_note_session(), Arc::new(MockEngine::default())),
            Err(Error::RecordingActive)
        ));
        gate.end_recording();

        scheduler
            .play(&two_note_session(), Arc::new(MockEngine::default()))
            .unwrap();
        assert!(gate.is_playing());
        scheduler.stop();
        assert!(!gate.is_playing());
    }
}
