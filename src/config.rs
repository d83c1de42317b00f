//! Engine configuration.
//!
//! All fields have defaults matching the reference behavior, so an empty JSON
//! object (or no config file at all) yields a working engine.

use crate::error::Result;
use crate::midi::{PitchPolicy, QuantizeReference};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Default delay between starting the transport and its time zero.
pub const DEFAULT_LEAD_IN_MS: u64 = 100;

/// Tunables for playback scheduling and MIDI export.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Milliseconds the transport waits after `start` before time zero.
    pub lead_in_ms: u64,

    /// What the codec does with unparseable pitch tokens.
    pub pitch_policy: PitchPolicy,

    /// Beat length used to bucket durations.
    pub quantize_reference: QuantizeReference,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            lead_in_ms: DEFAULT_LEAD_IN_MS,
            pitch_policy: PitchPolicy::Lenient,
            quantize_reference: QuantizeReference::Fixed,
        }
    }
}

impl EngineConfig {
    pub fn lead_in(&self) -> Duration {
        Duration::from_millis(self.lead_in_ms)
    }

    /// Loads a configuration from a JSON file. Missing fields take defaults.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = fs::read_to_string(path)?;
        Ok(serde_json::from_str(&json)?)
    }
}
