//! Capability traits for the external clock, transport and sound engine.
//!
//! The engine never produces audio or keeps time itself. It reads a monotonic
//! clock, registers callbacks with a transport, and asks a sound engine to
//! render notes. [`ManualTransport`] is a virtual transport advanced by hand,
//! used for deterministic tests and offline rendering.

use crate::error::Error;
use crate::sync::lock;
use std::collections::BTreeMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};
use thiserror::Error as ThisError;

/// Deferred work registered with a transport.
pub type Callback = Box<dyn FnOnce() + Send + 'static>;

/// Identifier of a scheduled callback, unique per transport.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ScheduleId(u64);

impl ScheduleId {
    pub(crate) fn from_raw(id: u64) -> Self {
        Self(id)
    }
}

/// Monotonic time source. Never reads the wall clock.
pub trait Clock: Send + Sync {
    /// Time elapsed since an arbitrary fixed origin.
    fn now(&self) -> Duration;
}

/// Scheduling surface of an external transport.
///
/// Offsets are relative to the transport's time zero, which is `lead_in` after
/// [`Transport::start`]. Callbacks fire in non-decreasing offset order; equal
/// offsets fire in scheduling order. Once [`Transport::stop`] or
/// [`Transport::cancel_all`] returns, no previously pending callback fires.
pub trait Transport: Clock {
    fn schedule_at(&self, offset: Duration, callback: Callback) -> ScheduleId;
    fn set_tempo(&self, bpm: u32);
    fn start(&self, lead_in: Duration);
    fn stop(&self);
    fn cancel_all(&self);
}

/// The external engine's voice could not be used.
#[derive(Debug, Clone, PartialEq, Eq, ThisError)]
#[error("{0}")]
pub struct EngineUnavailable(pub String);

impl From<EngineUnavailable> for Error {
    fn from(e: EngineUnavailable) -> Self {
        Error::SoundEngineUnavailable(e.0)
    }
}

/// Sound-producing collaborator.
///
/// Implementations own instrument loading. An instrument that is not ready yet
/// should fall back to a default voice inside `play_note` instead of failing.
pub trait SoundEngine: Send + Sync {
    /// Prepares the engine for playback.
    fn ensure_ready(&self) -> Result<(), EngineUnavailable> {
        Ok(())
    }

    /// Renders one note.
    ///
    /// # Arguments
    ///
    /// * `pitch` - Pitch token such as `"C#4"`
    /// * `duration_ms` - Sounding length in milliseconds
    /// * `velocity` - Intensity on the 0.0-1.0 scale
    /// * `instrument` - Voice identifier
    fn play_note(
        &self,
        pitch: &str,
        duration_ms: u32,
        velocity: f32,
        instrument: &str,
    ) -> Result<(), EngineUnavailable>;
}

/// Clock backed by [`Instant`], counting from construction.
#[derive(Debug, Clone, Copy)]
pub struct SystemClock {
    epoch: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self {
            epoch: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.epoch.elapsed()
    }
}

/// Pending callbacks keyed by (offset, schedule order).
pub(crate) type CallbackQueue = BTreeMap<(Duration, u64), Callback>;

struct ManualState {
    now: Duration,
    /// Clock time of transport zero while running.
    origin: Option<Duration>,
    tempo: u32,
    queue: CallbackQueue,
    next_id: u64,
}

impl ManualState {
    /// Removes the earliest callback if the transport is running and it is due.
    fn pop_due(&mut self) -> Option<Callback> {
        let origin = self.origin?;
        let entry = self.queue.first_entry()?;
        if origin + entry.key().0 > self.now {
            return None;
        }
        Some(entry.remove())
    }
}

/// Virtual transport whose clock only moves when [`ManualTransport::advance`]
/// is called.
pub struct ManualTransport {
    state: Mutex<ManualState>,
}

impl ManualTransport {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(ManualState {
                now: Duration::ZERO,
                origin: None,
                tempo: crate::midi::DEFAULT_TEMPO,
                queue: BTreeMap::new(),
                next_id: 0,
            }),
        }
    }

    /// Moves the clock forward and fires every callback that became due.
    ///
    /// Callbacks run one at a time outside the lock, and the queue is checked
    /// again before each one, so a callback may stop or cancel the transport
    /// and nothing after it fires. Returns the number of callbacks fired.
    pub fn advance(&self, by: Duration) -> usize {
        lock(&self.state).now += by;

        let mut fired = 0;
        loop {
            let next = lock(&self.state).pop_due();
            let Some(callback) = next else {
                break;
            };
            callback();
            fired += 1;
        }
        fired
    }

    /// Offsets of callbacks still waiting to fire, in firing order.
    pub fn pending_offsets(&self) -> Vec<Duration> {
        lock(&self.state).queue.keys().map(|(offset, _)| *offset).collect()
    }

    pub fn pending_count(&self) -> usize {
        lock(&self.state).queue.len()
    }

    /// Tempo last set on the transport.
    pub fn tempo(&self) -> u32 {
        lock(&self.state).tempo
    }

    pub fn is_running(&self) -> bool {
        lock(&self.state).origin.is_some()
    }
}

impl Default for ManualTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for ManualTransport {
    fn now(&self) -> Duration {
        lock(&self.state).now
    }
}

impl Transport for ManualTransport {
    fn schedule_at(&self, offset: Duration, callback: Callback) -> ScheduleId {
        let mut state = lock(&self.state);
        let id = state.next_id;
        state.next_id += 1;
        state.queue.insert((offset, id), callback);
        ScheduleId(id)
    }

    fn set_tempo(&self, bpm: u32) {
        lock(&self.state).tempo = bpm;
    }

    fn start(&self, lead_in: Duration) {
        let mut state = lock(&self.state);
        state.origin = Some(state.now + lead_in);
    }

    fn stop(&self) {
        lock(&self.state).origin = None;
    }

    fn cancel_all(&self) {
        lock(&self.state).queue.clear();
    }
}
