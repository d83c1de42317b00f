//! keytake - capture, replay and export keyboard performances.
//!
//! # Usage
//!
//! ```bash
//! keytake record --tempo 100 --output take.json   # one note per stdin line
//! keytake play take.json                           # replay with captured timing
//! keytake export take.json --output take.mid      # write a Standard MIDI File
//! ```
//!
//! Set `RUST_LOG=debug` for scheduling and encoding details.

use anyhow::{bail, Context, Result};
use keytake::midi::DEFAULT_TEMPO;
use keytake::playback::EngineUnavailable;
use keytake::session::{DEFAULT_NOTE_DURATION_MS, DEFAULT_VELOCITY};
use keytake::{
    ActivityGate, EngineConfig, MidiEncoder, PlaybackScheduler, RealtimeTransport, Recorder,
    RecordingSession, SoundEngine, SystemClock,
};
use std::io::{self, BufRead};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

const DEFAULT_INSTRUMENT: &str = "piano";
const DEFAULT_TAKE_PATH: &str = "take.json";
const DEFAULT_MIDI_PATH: &str = "composition.mid";

/// Subcommand selected on the command line.
enum Command {
    Record,
    Play,
    Export,
}

/// Command-line options for the application.
struct CliOptions {
    command: Command,
    /// Take file to read (play, export).
    input: Option<PathBuf>,
    output: Option<PathBuf>,
    tempo: u32,
    instrument: String,
    title: Option<String>,
    config: Option<PathBuf>,
}

fn print_usage() {
    eprintln!("keytake - performance capture, replay and MIDI export");
    eprintln!();
    eprintln!("Usage:");
    eprintln!("  keytake record [--tempo BPM] [--instrument NAME] [--output PATH]");
    eprintln!("  keytake play <TAKE> [--config PATH]");
    eprintln!("  keytake export <TAKE> [--output PATH] [--title NAME] [--config PATH]");
    eprintln!();
    eprintln!("record reads one note per line from stdin: PITCH [DURATION_MS [VELOCITY]].");
    eprintln!("An empty line or end of input stops the take.");
    eprintln!("Takes ending in .json are stored as JSON, anything else as binary.");
}

impl CliOptions {
    /// Parses command-line arguments.
    fn parse() -> Result<Self> {
        let args: Vec<String> = std::env::args().collect();
        let command = match args.get(1).map(String::as_str) {
            Some("record") => Command::Record,
            Some("play") => Command::Play,
            Some("export") => Command::Export,
            Some("--help") | Some("-h") | None => {
                print_usage();
                std::process::exit(0);
            }
            Some(other) => bail!("Unknown command: {} (use --help for usage)", other),
        };

        let mut options = Self {
            command,
            input: None,
            output: None,
            tempo: DEFAULT_TEMPO,
            instrument: DEFAULT_INSTRUMENT.to_string(),
            title: None,
            config: None,
        };

        let mut i = 2;
        while i < args.len() {
            let flag = args[i].as_str();
            let mut value = || -> Result<String> {
                i += 1;
                args.get(i)
                    .cloned()
                    .with_context(|| format!("{} requires a value", flag))
            };
            match flag {
                "--output" | "-o" => options.output = Some(PathBuf::from(value()?)),
                "--tempo" | "-t" => {
                    let raw = value()?;
                    options.tempo = raw
                        .parse()
                        .with_context(|| format!("Invalid tempo: {}", raw))?;
                }
                "--instrument" | "-i" => options.instrument = value()?,
                "--title" => options.title = Some(value()?),
                "--config" | "-c" => options.config = Some(PathBuf::from(value()?)),
                "--help" | "-h" => {
                    print_usage();
                    std::process::exit(0);
                }
                other if !other.starts_with('-') && options.input.is_none() => {
                    options.input = Some(PathBuf::from(other));
                }
                other => bail!("Unknown option: {}", other),
            }
            i += 1;
        }

        Ok(options)
    }

    fn engine_config(&self) -> Result<EngineConfig> {
        match &self.config {
            Some(path) => EngineConfig::load_from_file(path)
                .with_context(|| format!("Failed to load config: {}", path.display())),
            None => Ok(EngineConfig::default()),
        }
    }

    fn input(&self) -> Result<&Path> {
        self.input
            .as_deref()
            .context("A take file is required (use --help for usage)")
    }
}

fn is_json(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext.eq_ignore_ascii_case("json"))
}

fn load_take(path: &Path) -> Result<RecordingSession> {
    let session = if is_json(path) {
        RecordingSession::load_from_file(path)
    } else {
        RecordingSession::load_from_binary(path)
    };
    session.with_context(|| format!("Failed to load take: {}", path.display()))
}

fn save_take(session: &RecordingSession, path: &Path) -> Result<()> {
    let saved = if is_json(path) {
        session.save_to_file(path)
    } else {
        session.save_to_binary(path)
    };
    saved.with_context(|| format!("Failed to save take: {}", path.display()))
}

/// Parses one stdin line: `PITCH [DURATION_MS [VELOCITY]]`.
fn parse_note_line(line: &str) -> Result<(String, u32, u8)> {
    let mut fields = line.split_whitespace();
    let pitch = fields.next().context("Missing pitch")?.to_string();
    let duration = match fields.next() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid duration: {}", raw))?,
        None => DEFAULT_NOTE_DURATION_MS,
    };
    let velocity = match fields.next() {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("Invalid velocity: {}", raw))?,
        None => DEFAULT_VELOCITY,
    };
    Ok((pitch, duration, velocity))
}

fn run_record(cli: &CliOptions) -> Result<()> {
    let mut recorder = Recorder::new(Arc::new(SystemClock::new()));

    recorder.start_recording(cli.tempo)?;
    eprintln!(
        "Recording at {} BPM on {}. One note per line, empty line to stop.",
        cli.tempo, cli.instrument
    );

    for line in io::stdin().lock().lines() {
        let line = line.context("Failed to read stdin")?;
        if line.trim().is_empty() {
            break;
        }
        match parse_note_line(&line) {
            Ok((pitch, duration, velocity)) => {
                recorder.record_note(pitch, cli.instrument.as_str(), duration, velocity);
            }
            Err(e) => eprintln!("Skipped: {:#}", e),
        }
    }

    let session = recorder.stop_recording()?;
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_TAKE_PATH));
    save_take(&session, &output)?;
    eprintln!(
        "Saved {} notes ({} ms) to {}",
        session.len(),
        session.total_duration_ms(),
        output.display()
    );
    Ok(())
}

/// Sound engine that prints each note instead of producing audio.
struct ConsoleEngine {
    started: Instant,
}

impl SoundEngine for ConsoleEngine {
    fn play_note(
        &self,
        pitch: &str,
        duration_ms: u32,
        velocity: f32,
        instrument: &str,
    ) -> std::result::Result<(), EngineUnavailable> {
        println!(
            "{:>8.3}s  {:<4} {:<8} {:>5}ms  vel {:.2}",
            self.started.elapsed().as_secs_f64(),
            pitch,
            instrument,
            duration_ms,
            velocity
        );
        Ok(())
    }
}

fn run_play(cli: &CliOptions) -> Result<()> {
    let config = cli.engine_config()?;
    let session = load_take(cli.input()?)?;

    let transport = Arc::new(RealtimeTransport::new().context("Failed to start transport")?);
    let mut scheduler = PlaybackScheduler::with_config(transport, &config, ActivityGate::new());
    let started = Instant::now();
    let engine = Arc::new(ConsoleEngine { started });
    let _handle = scheduler.play(&session, engine)?;

    // Keep the transport alive until the last note has rung out.
    let ring_out = config.lead_in() + Duration::from_millis(session.end_ms());
    while scheduler.is_playing() || started.elapsed() < ring_out {
        thread::sleep(Duration::from_millis(10));
    }
    Ok(())
}

fn run_export(cli: &CliOptions) -> Result<()> {
    let config = cli.engine_config()?;
    let input = cli.input()?;
    let session = load_take(input)?;

    let title = cli.title.clone().unwrap_or_else(|| {
        input
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled Composition")
            .to_string()
    });
    let output = cli
        .output
        .clone()
        .unwrap_or_else(|| PathBuf::from(DEFAULT_MIDI_PATH));

    let bytes = MidiEncoder::from_config(&config)
        .encode(&session, &title)
        .context("MIDI export failed")?;
    std::fs::write(&output, &bytes)
        .with_context(|| format!("Failed to write {}", output.display()))?;
    eprintln!(
        "MIDI file written: {} ({} notes, {} bytes)",
        output.display(),
        session.len(),
        bytes.len()
    );
    Ok(())
}

/// Main entry point.
fn main() -> Result<()> {
    let cli = CliOptions::parse()?;

    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Command::Record => run_record(&cli),
        Command::Play => run_play(&cli),
        Command::Export => run_export(&cli),
    }
}
