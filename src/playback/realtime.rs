//! Wall-time transport driven by a background worker thread.
//!
//! Callbacks run on the worker without the queue lock held, so a callback may
//! schedule, retune or cancel the transport it runs on. The worker holds a
//! separate firing lock for the whole time a callback runs. `stop` and
//! `cancel_all` take that lock first, so once they return no pending callback
//! fires. Called from inside a callback they skip it, and the worker checks
//! the queue again before the next callback.

use super::transport::{Callback, CallbackQueue, Clock, ScheduleId, Transport};
use crate::error::Result;
use crate::midi::DEFAULT_TEMPO;
use crate::sync::lock;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle, ThreadId};
use std::time::{Duration, Instant};

struct RealtimeState {
    /// Instant of transport zero while running.
    origin: Option<Instant>,
    tempo: u32,
    queue: CallbackQueue,
    next_id: u64,
    shutdown: bool,
}

impl RealtimeState {
    /// Instant the earliest pending callback is due, if the transport runs.
    fn next_deadline(&self) -> Option<Instant> {
        let origin = self.origin?;
        let (offset, _) = self.queue.keys().next()?;
        Some(origin + *offset)
    }
}

struct Shared {
    state: Mutex<RealtimeState>,
    /// Held by the worker while a callback runs.
    firing: Mutex<()>,
    wakeup: Condvar,
    epoch: Instant,
}

/// Transport that fires callbacks at real elapsed time.
pub struct RealtimeTransport {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
    worker_id: ThreadId,
}

impl RealtimeTransport {
    /// Creates the transport and spawns its worker thread.
    ///
    /// # Errors
    ///
    /// Returns error if the worker thread cannot be spawned
    pub fn new() -> Result<Self> {
        let shared = Arc::new(Shared {
            state: Mutex::new(RealtimeState {
                origin: None,
                tempo: DEFAULT_TEMPO,
                queue: CallbackQueue::new(),
                next_id: 0,
                shutdown: false,
            }),
            firing: Mutex::new(()),
            wakeup: Condvar::new(),
            epoch: Instant::now(),
        });

        let worker_shared = Arc::clone(&shared);
        let worker = thread::Builder::new()
            .name("keytake-transport".to_string())
            .spawn(move || run_worker(&worker_shared))?;
        let worker_id = worker.thread().id();

        Ok(Self {
            shared,
            worker: Some(worker),
            worker_id,
        })
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.shared.state).queue.len()
    }

    pub fn tempo(&self) -> u32 {
        lock(&self.shared.state).tempo
    }

    pub fn is_running(&self) -> bool {
        lock(&self.shared.state).origin.is_some()
    }

    fn on_worker(&self) -> bool {
        thread::current().id() == self.worker_id
    }

    /// Waits for a running callback to finish, unless called from one.
    fn hold_firing(&self) -> Option<MutexGuard<'_, ()>> {
        (!self.on_worker()).then(|| lock(&self.shared.firing))
    }
}

fn run_worker(shared: &Shared) {
    loop {
        let firing = lock(&shared.firing);
        let mut state = lock(&shared.state);
        if state.shutdown {
            break;
        }

        match state.next_deadline() {
            Some(deadline) if deadline <= Instant::now() => {
                let callback = state.queue.pop_first().map(|(_, callback)| callback);
                drop(state);
                if let Some(callback) = callback {
                    callback();
                }
                drop(firing);
            }
            Some(deadline) => {
                drop(firing);
                let timeout = deadline.saturating_duration_since(Instant::now());
                drop(
                    shared
                        .wakeup
                        .wait_timeout(state, timeout)
                        .unwrap_or_else(PoisonError::into_inner),
                );
            }
            None => {
                drop(firing);
                drop(
                    shared
                        .wakeup
                        .wait(state)
                        .unwrap_or_else(PoisonError::into_inner),
                );
            }
        }
    }
    tracing::debug!("Transport worker stopped");
}

impl Clock for RealtimeTransport {
    fn now(&self) -> Duration {
        self.shared.epoch.elapsed()
    }
}

impl Transport for RealtimeTransport {
    fn schedule_at(&self, offset: Duration, callback: Callback) -> ScheduleId {
        let id = {
            let mut state = lock(&self.shared.state);
            let id = state.next_id;
            state.next_id += 1;
            state.queue.insert((offset, id), callback);
            id
        };
        self.shared.wakeup.notify_all();
        ScheduleId::from_raw(id)
    }

    fn set_tempo(&self, bpm: u32) {
        lock(&self.shared.state).tempo = bpm;
    }

    fn start(&self, lead_in: Duration) {
        lock(&self.shared.state).origin = Some(Instant::now() + lead_in);
        self.shared.wakeup.notify_all();
    }

    fn stop(&self) {
        let _firing = self.hold_firing();
        lock(&self.shared.state).origin = None;
        self.shared.wakeup.notify_all();
    }

    fn cancel_all(&self) {
        let _firing = self.hold_firing();
        lock(&self.shared.state).queue.clear();
        self.shared.wakeup.notify_all();
    }
}

impl Drop for RealtimeTransport {
    fn drop(&mut self) {
        lock(&self.shared.state).shutdown = true;
        self.shared.wakeup.notify_all();
        // A callback holding the last reference drops the transport on the
        // worker itself, which exits on its next loop.
        if self.on_worker() {
            return;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::playback::{EngineUnavailable, PlaybackScheduler, SoundEngine};
    use crate::session::{NoteEvent, RecordingSession};
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn wait_for(counter: &AtomicUsize, expected: usize) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while counter.load(Ordering::SeqCst) < expected && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
    }

    /// Engine that retunes and extends the transport it is played from.
    struct RetuningEngine {
        transport: Arc<RealtimeTransport>,
        played: Arc<AtomicUsize>,
        released: Arc<AtomicUsize>,
    }

    impl SoundEngine for RetuningEngine {
        fn play_note(
            &self,
            _pitch: &str,
            duration_ms: u32,
            _velocity: f32,
            _instrument: &str,
        ) -> std::result::Result<(), EngineUnavailable> {
            self.transport.set_tempo(90);
            let released = Arc::clone(&self.released);
            self.transport.schedule_at(
                Duration::from_millis(duration_ms as u64),
                Box::new(move || {
                    released.fetch_add(1, Ordering::SeqCst);
                }),
            );
            self.played.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    #[test]
    fn test_fires_after_lead_in() {
        let transport = RealtimeTransport::new().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        for offset_ms in [0, 10, 20] {
            let fired = Arc::clone(&fired);
            transport.schedule_at(
                Duration::from_millis(offset_ms),
                Box::new(move || {
                    fired.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        transport.start(Duration::from_millis(10));

        let deadline = Instant::now() + Duration::from_secs(5);
        while fired.load(Ordering::SeqCst) < 3 && Instant::now() < deadline {
            thread::sleep(Duration::from_millis(5));
        }
        assert_eq!(fired.load(Ordering::SeqCst), 3);
        assert_eq!(transport.pending_count(), 0);
    }

    #[test]
    fn test_cancel_prevents_firing() {
        let transport = RealtimeTransport::new().unwrap();
        let fired = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&fired);
        transport.schedule_at(
            Duration::from_millis(50),
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
            }),
        );
        transport.start(Duration::ZERO);
        transport.stop();
        transport.cancel_all();

        thread::sleep(Duration::from_millis(120));
        assert_eq!(fired.load(Ordering::SeqCst), 0);
        assert!(!transport.is_running());
    }

    #[test]
    fn test_engine_may_call_back_into_transport() {
        let transport = Arc::new(RealtimeTransport::new().unwrap());
        let played = Arc::new(AtomicUsize::new(0));
        let released = Arc::new(AtomicUsize::new(0));
        let engine = Arc::new(RetuningEngine {
            transport: Arc::clone(&transport),
            played: Arc::clone(&played),
            released: Arc::clone(&released),
        });

        let session = RecordingSession::new(
            120,
            vec![
                NoteEvent::new(0, "C4", "piano", 10, 100),
                NoteEvent::new(20, "E4", "piano", 10, 100),
            ],
            30,
        );
        let mut scheduler = PlaybackScheduler::new(transport.clone());
        scheduler.play(&session, engine).unwrap();

        wait_for(&played, 2);
        wait_for(&released, 2);
        assert_eq!(played.load(Ordering::SeqCst), 2);
        assert_eq!(released.load(Ordering::SeqCst), 2);
        assert_eq!(transport.tempo(), 90);
        assert!(!scheduler.is_playing());
    }

    #[test]
    fn test_cancel_from_callback_stops_remaining() {
        let transport = Arc::new(RealtimeTransport::new().unwrap());
        let fired = Arc::new(AtomicUsize::new(0));

        let canceller = Arc::clone(&transport);
        let counter = Arc::clone(&fired);
        transport.schedule_at(
            Duration::ZERO,
            Box::new(move || {
                counter.fetch_add(1, Ordering::SeqCst);
                canceller.stop();
                canceller.cancel_all();
            }),
        );
        for offset_ms in [0, 5] {
            let counter = Arc::clone(&fired);
            transport.schedule_at(
                Duration::from_millis(offset_ms),
                Box::new(move || {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
            );
        }
        transport.start(Duration::ZERO);

        wait_for(&fired, 1);
        thread::sleep(Duration::from_millis(100));
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        assert_eq!(transport.pending_count(), 0);
        assert!(!transport.is_running());
    }
}
