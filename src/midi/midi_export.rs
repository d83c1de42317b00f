//! Standard MIDI File (SMF) export functionality.
//!
//! Encodes a captured session into a byte-exact .mid buffer.
//!
//! # Format Details
//!
//! Exports as SMF Format 0 (single track, 128 ticks per quarter note) with:
//! - Tempo meta event
//! - Track name meta event
//! - One note-on/note-off pair per captured note, in timestamp order
//! - End of track
//!
//! Notes are laid out sequentially: each note starts after the previous one's
//! note-off plus its own quantized wait, and sounds for its quantized duration.

use super::quantize::{NoteValue, QuantizeReference};
use super::{resolve_pitch, PitchPolicy, TICKS_PER_BEAT};
use crate::config::EngineConfig;
use crate::error::{Error, Result};
use crate::session::{RecordingSession, MAX_VELOCITY};
use std::fs;
use std::path::Path;

/// MIME type of the produced buffer.
pub const MIDI_MIME_TYPE: &str = "audio/midi";

/// Largest value representable by the 24-bit tempo field.
const MAX_TEMPO_MICROS: u32 = 0x00FF_FFFF;

/// Notes are written on MIDI channel 1.
const NOTE_CHANNEL: u8 = 0;

/// Writes a variable-length quantity (VLQ) used for delta times in MIDI.
///
/// VLQ encodes values using 7 bits per byte, with the MSB indicating
/// whether more bytes follow (1 = more bytes, 0 = last byte).
fn write_vlq(value: u32, buffer: &mut Vec<u8>) {
    if value == 0 {
        buffer.push(0);
        return;
    }

    let mut temp = value;
    let mut bytes = Vec::with_capacity(4);

    while temp > 0 {
        bytes.push((temp & 0x7F) as u8);
        temp >>= 7;
    }

    for (i, &byte) in bytes.iter().rev().enumerate() {
        if i < bytes.len() - 1 {
            buffer.push(byte | 0x80);
        } else {
            buffer.push(byte);
        }
    }
}

/// MIDI event types for track data.
enum MidiEvent {
    NoteOn { channel: u8, pitch: u8, velocity: u8 },
    NoteOff { channel: u8, pitch: u8 },
    /// Set tempo: microseconds per quarter note
    SetTempo { microseconds_per_beat: u32 },
    TrackName { name: String },
    EndOfTrack,
}

/// Represents a timed MIDI event for sorting and writing.
struct TimedEvent {
    /// Absolute tick position
    tick: u32,
    event: MidiEvent,
    /// Priority for sorting events at the same tick (lower = first)
    priority: u8,
}

impl TimedEvent {
    fn new(tick: u32, event: MidiEvent, priority: u8) -> Self {
        Self {
            tick,
            event,
            priority,
        }
    }
}

/// Writes a single MIDI event to the buffer (without delta time).
fn write_event(event: &MidiEvent, buffer: &mut Vec<u8>) {
    match event {
        MidiEvent::NoteOn {
            channel,
            pitch,
            velocity,
        } => {
            buffer.push(0x90 | (channel & 0x0F));
            buffer.push(*pitch);
            buffer.push(*velocity);
        }
        MidiEvent::NoteOff { channel, pitch } => {
            buffer.push(0x80 | (channel & 0x0F));
            buffer.push(*pitch);
            buffer.push(0);
        }
        MidiEvent::SetTempo {
            microseconds_per_beat,
        } => {
            // Meta event: FF 51 03 tt tt tt
            buffer.push(0xFF);
            buffer.push(0x51);
            buffer.push(0x03);
            buffer.push((microseconds_per_beat >> 16) as u8);
            buffer.push((microseconds_per_beat >> 8) as u8);
            buffer.push(*microseconds_per_beat as u8);
        }
        MidiEvent::TrackName { name } => {
            // Meta event: FF 03 len text
            buffer.push(0xFF);
            buffer.push(0x03);
            let name_bytes = name.as_bytes();
            write_vlq(name_bytes.len() as u32, buffer);
            buffer.extend_from_slice(name_bytes);
        }
        MidiEvent::EndOfTrack => {
            buffer.push(0xFF);
            buffer.push(0x2F);
            buffer.push(0x00);
        }
    }
}

/// Builds the track chunk data from a list of timed events.
///
/// Events are sorted by tick position and converted to delta times. The sort
/// is stable, so events sharing a tick and priority keep insertion order.
fn build_track_data(events: &mut [TimedEvent]) -> Vec<u8> {
    let mut buffer = Vec::new();
    events.sort_by(|a, b| a.tick.cmp(&b.tick).then(a.priority.cmp(&b.priority)));

    let mut last_tick = 0u32;
    for timed_event in events.iter() {
        let delta = timed_event.tick.saturating_sub(last_tick);
        write_vlq(delta, &mut buffer);
        write_event(&timed_event.event, &mut buffer);
        last_tick = timed_event.tick;
    }

    buffer
}

/// Appends a track chunk to the output.
fn write_track_chunk(output: &mut Vec<u8>, track_data: &[u8]) {
    output.extend_from_slice(b"MTrk");
    output.extend_from_slice(&(track_data.len() as u32).to_be_bytes());
    output.extend_from_slice(track_data);
}

/// Appends the header chunk for a single-track format 0 file.
fn write_header_chunk(output: &mut Vec<u8>) {
    output.extend_from_slice(b"MThd");
    output.extend_from_slice(&6u32.to_be_bytes()); // Header length (always 6)
    output.extend_from_slice(&0u16.to_be_bytes()); // Format 0
    output.extend_from_slice(&1u16.to_be_bytes()); // One track
    output.extend_from_slice(&TICKS_PER_BEAT.to_be_bytes());
}

/// Converts BPM to the tempo meta event's microseconds per quarter note.
fn tempo_micros(tempo_bpm: u32) -> u32 {
    (60_000_000 / tempo_bpm.max(1)).clamp(1, MAX_TEMPO_MICROS)
}

/// How a single captured note is written to the file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EncodedNote {
    /// MIDI note number after pitch resolution.
    pub midi_number: u8,
    /// Milliseconds since the previous note in timestamp order (0 for the first).
    pub wait_ms: u64,
    /// Bucketed wait, present only when `wait_ms > 0`.
    pub wait: Option<NoteValue>,
    /// Bucketed sounding length.
    pub duration: NoteValue,
    /// Note-On velocity clamped to 1-127. A zero Note-On velocity would read
    /// as a Note-Off.
    pub velocity: u8,
}

impl EncodedNote {
    /// Delta time written before the note-on.
    pub fn wait_ticks(&self) -> u32 {
        self.wait.map(NoteValue::ticks).unwrap_or(0)
    }
}

/// Encoder turning recording sessions into Standard MIDI File bytes.
///
/// Encoding is pure: the same session always yields the same bytes.
#[derive(Debug, Clone, Copy, Default)]
pub struct MidiEncoder {
    pitch_policy: PitchPolicy,
    quantize: QuantizeReference,
}

impl MidiEncoder {
    /// Creates an encoder with the lenient pitch policy and the fixed 500 ms
    /// beat reference.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates an encoder using the codec settings of `config`.
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            pitch_policy: config.pitch_policy,
            quantize: config.quantize_reference,
        }
    }

    pub fn with_pitch_policy(mut self, policy: PitchPolicy) -> Self {
        self.pitch_policy = policy;
        self
    }

    pub fn with_quantize_reference(mut self, reference: QuantizeReference) -> Self {
        self.quantize = reference;
        self
    }

    /// Computes how each note will be written, in timestamp order.
    ///
    /// # Errors
    ///
    /// Returns [`Error::EmptySession`] for a session without notes, or
    /// [`Error::InvalidPitchToken`] under the strict pitch policy.
    pub fn layout(&self, session: &RecordingSession) -> Result<Vec<EncodedNote>> {
        if session.is_empty() {
            return Err(Error::EmptySession);
        }

        let tempo = session.effective_tempo();
        let sorted = session.sorted_notes();
        let mut previous_ms: Option<u64> = None;
        let mut layout = Vec::with_capacity(sorted.len());

        for note in sorted {
            let wait_ms = previous_ms
                .map(|prev| note.timestamp_ms - prev)
                .unwrap_or(0);
            previous_ms = Some(note.timestamp_ms);

            layout.push(EncodedNote {
                midi_number: resolve_pitch(&note.pitch, self.pitch_policy)?,
                wait_ms,
                wait: (wait_ms > 0).then(|| self.quantize.quantize(wait_ms, tempo)),
                duration: self.quantize.quantize(note.duration_ms as u64, tempo),
                velocity: note.velocity.clamp(1, MAX_VELOCITY),
            });
        }

        Ok(layout)
    }

    /// Encodes a session into Standard MIDI File bytes.
    ///
    /// # Arguments
    ///
    /// * `session` - The captured take; must contain at least one note
    /// * `track_name` - Text of the track name meta event
    ///
    /// # Errors
    ///
    /// Fails before producing any bytes, see [`MidiEncoder::layout`].
    pub fn encode(&self, session: &RecordingSession, track_name: &str) -> Result<Vec<u8>> {
        let layout = self.layout(session)?;

        let mut events = vec![
            TimedEvent::new(
                0,
                MidiEvent::SetTempo {
                    microseconds_per_beat: tempo_micros(session.effective_tempo()),
                },
                0,
            ),
            TimedEvent::new(
                0,
                MidiEvent::TrackName {
                    name: track_name.to_string(),
                },
                1,
            ),
        ];

        let mut cursor = 0u32;
        for note in &layout {
            let start = cursor.saturating_add(note.wait_ticks());
            let end = start.saturating_add(note.duration.ticks());
            events.push(TimedEvent::new(
                start,
                MidiEvent::NoteOn {
                    channel: NOTE_CHANNEL,
                    pitch: note.midi_number,
                    velocity: note.velocity,
                },
                10,
            ));
            events.push(TimedEvent::new(
                end,
                MidiEvent::NoteOff {
                    channel: NOTE_CHANNEL,
                    pitch: note.midi_number,
                },
                10,
            ));
            cursor = end;
        }
        events.push(TimedEvent::new(cursor, MidiEvent::EndOfTrack, 255));

        let track_data = build_track_data(&mut events);

        let mut output = Vec::with_capacity(14 + 8 + track_data.len());
        write_header_chunk(&mut output);
        write_track_chunk(&mut output, &track_data);

        tracing::debug!(
            "Encoded {} notes into {} bytes (track {:?})",
            layout.len(),
            output.len(),
            track_name
        );
        Ok(output)
    }
}

/// Encodes a session with the default encoder and writes it to `path`.
///
/// Nothing is written when encoding fails.
///
/// # Errors
///
/// Returns error if encoding, file creation or writing fails
pub fn write_midi_file<P: AsRef<Path>>(
    session: &RecordingSession,
    track_name: &str,
    path: P,
) -> Result<()> {
    let bytes = MidiEncoder::new().encode(session, track_name)?;
    fs::write(path.as_ref(), &bytes)?;
    tracing::info!("MIDI file written: {}", path.as_ref().display());
    Ok(())
}
