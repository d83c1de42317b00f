//! Standard MIDI File encoding for captured sessions.
//!
//! This module maps pitch tokens to MIDI note numbers, buckets millisecond
//! durations into note values, and writes the single-track file.

mod midi_export;
mod quantize;

pub use midi_export::{write_midi_file, EncodedNote, MidiEncoder, MIDI_MIME_TYPE};
pub use quantize::{NoteValue, QuantizeReference, REFERENCE_BEAT_MS};

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};

/// Ticks per beat (quarter note) written to the file header.
pub const TICKS_PER_BEAT: u16 = 128;

/// Default tempo in beats per minute.
pub const DEFAULT_TEMPO: u32 = 120;

/// MIDI number used when a pitch token cannot be parsed in lenient mode.
pub const FALLBACK_NOTE: u8 = 60;

/// How the codec treats pitch tokens it cannot parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PitchPolicy {
    /// Substitute middle C and log a warning.
    #[default]
    Lenient,
    /// Fail with [`Error::InvalidPitchToken`].
    Strict,
}

/// Semitone offset within the octave for a note name, sharps and flats aliased.
fn pitch_class_offset(name: &str) -> Option<u8> {
    let offset = match name {
        "C" => 0,
        "C#" | "Db" => 1,
        "D" => 2,
        "D#" | "Eb" => 3,
        "E" => 4,
        "F" => 5,
        "F#" | "Gb" => 6,
        "G" => 7,
        "G#" | "Ab" => 8,
        "A" => 9,
        "A#" | "Bb" => 10,
        "B" => 11,
        _ => return None,
    };
    Some(offset)
}

/// Converts a pitch token like `"C4"`, `"F#3"` or `"Bb2"` to a MIDI note number.
///
/// The token must be a letter `A`-`G`, an optional `#` or `b`, and a
/// non-negative octave. Uses the `(octave + 1) * 12` convention, so C4 is 60.
///
/// # Errors
///
/// Returns [`Error::InvalidPitchToken`] when the token does not match or the
/// resulting number is above 127.
///
/// # Examples
///
/// ```
/// use keytake::midi::parse_pitch;
///
/// assert_eq!(parse_pitch("A4").unwrap(), 69);
/// assert!(parse_pitch("H2").is_err());
/// ```
pub fn parse_pitch(token: &str) -> Result<u8> {
    let invalid = || Error::InvalidPitchToken(token.to_string());

    let octave_start = token
        .char_indices()
        .find(|(_, c)| c.is_ascii_digit())
        .map(|(i, _)| i)
        .ok_or_else(invalid)?;

    let (name, octave_part) = token.split_at(octave_start);
    let offset = pitch_class_offset(name).ok_or_else(invalid)?;

    if !octave_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(invalid());
    }
    let octave: u32 = octave_part.parse().map_err(|_| invalid())?;

    let number = (octave as u64 + 1) * 12 + offset as u64;
    if number > 127 {
        return Err(invalid());
    }
    Ok(number as u8)
}

/// Converts a pitch token to a MIDI note number, falling back to middle C.
pub fn midi_number(token: &str) -> u8 {
    parse_pitch(token).unwrap_or(FALLBACK_NOTE)
}

/// Resolves a pitch token according to `policy`.
pub fn resolve_pitch(token: &str, policy: PitchPolicy) -> Result<u8> {
    match (parse_pitch(token), policy) {
        (Ok(number), _) => Ok(number),
        (Err(err), PitchPolicy::Strict) => Err(err),
        (Err(_), PitchPolicy::Lenient) => {
            tracing::warn!("Invalid pitch token {:?}, using middle C", token);
            Ok(FALLBACK_NOTE)
        }
    }
}
