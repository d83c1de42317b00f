//! Playback against an external transport and sound engine.
//!
//! This module provides:
//! - The capability traits the engine consumes (`Clock`, `Transport`, `SoundEngine`)
//! - A manually advanced transport for tests and offline rendering
//! - A real-time transport backed by a worker thread
//! - The playback scheduler

mod realtime;
mod scheduler;
pub(crate) mod transport;

pub use realtime::RealtimeTransport;
pub use scheduler::{PlaybackHandle, PlaybackScheduler};
pub use transport::{
    Callback, Clock, EngineUnavailable, ManualTransport, ScheduleId, SoundEngine, SystemClock,
    Transport,
};
