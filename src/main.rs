//! chordsheet - check, format, transpose and render song sheets
//!
//! Subcommands:
//! - `chordsheet check <file>` - Parse and validate a song sheet
//! - `chordsheet format <file>` - Print a song sheet in canonical form
//! - `chordsheet transpose <file> <semitones>` - Move every chord and the key
//! - `chordsheet events <file>` - Print playback events as YAML

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::{debug, info};

use chordsheet::playback::{schedule_song, OfflineEngine, Scheduler, SchedulerConfig};

/// Virtual time advanced per pump when recording a performance.
const RECORD_STEP_SECS: f64 = 0.05;

#[derive(Parser)]
#[command(name = "chordsheet")]
#[command(about = "Compiler and playback scheduler for strummed song sheets")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a song sheet
    Check {
        /// Song sheet file
        input: PathBuf,
    },

    /// Print a song sheet in canonical form
    Format {
        /// Song sheet file
        input: PathBuf,

        /// Rebuild the text from the parsed song instead of the token tree
        #[arg(long)]
        normalize: bool,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Transpose chords, key and chord voicings
    Transpose {
        /// Song sheet file
        input: PathBuf,

        /// Semitones to move, negative for down
        #[arg(allow_hyphen_values = true)]
        semitones: i32,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Print playback events as YAML
    Events {
        /// Song sheet file
        input: PathBuf,

        /// Scheduler settings (YAML)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Run the live scheduler on a virtual clock and print the notes it sends
        #[arg(long)]
        record: bool,

        /// Start position for --record, in milliseconds
        #[arg(long, default_value = "0")]
        from_ms: f64,

        /// Write here instead of stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn read_source(path: &Path) -> Result<String> {
    fs::read_to_string(path).with_context(|| format!("Error reading file '{}'", path.display()))
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => {
            fs::write(path, text).with_context(|| format!("Error writing to '{}'", path.display()))?;
            info!("wrote {}", path.display());
        }
        None => print!("{}", text),
    }
    Ok(())
}

fn with_newline(mut text: String) -> String {
    if !text.ends_with('\n') {
        text.push('\n');
    }
    text
}

fn check(input: &Path) -> Result<()> {
    let song = chordsheet::compile(&read_source(input)?)?;
    let bars = song.bars().count();
    println!(
        "{}: {} parts, {} bars, {:.1}s",
        song.title().map(str::trim).unwrap_or("untitled"),
        song.parts.len(),
        bars,
        song.duration_secs()
    );
    for (i, instrument) in song.instruments.iter().enumerate() {
        let chords: Vec<String> = song.used_chords(i).iter().map(|c| c.name()).collect();
        println!(
            "  {} ({}): {} patterns, chords {}",
            instrument.name,
            instrument.kind.name(),
            song.used_patterns(i).len(),
            chords.join(" ")
        );
    }
    Ok(())
}

fn events(input: &Path, config: Option<&Path>, record: bool, from_ms: f64) -> Result<String> {
    let config = match config {
        Some(path) => SchedulerConfig::from_file(path)?,
        None => SchedulerConfig::default(),
    };
    let song = chordsheet::compile(&read_source(input)?)?;
    if !record {
        let data = schedule_song(&song, &config);
        debug!(events = data.events.len(), "scheduled");
        return Ok(serde_yaml::to_string(&data)?);
    }

    let mut scheduler = Scheduler::new(OfflineEngine::new(), config);
    scheduler.init();
    scheduler.load_song(Arc::new(song));
    scheduler.play(from_ms)?;
    while scheduler.is_playing() {
        scheduler.pump();
        scheduler.engine_mut().advance(RECORD_STEP_SECS);
    }
    Ok(serde_yaml::to_string(scheduler.engine().notes())?)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::WARN.into()),
        )
        .init();

    match cli.command {
        Commands::Check { input } => {
            check(&input)?;
        }
        Commands::Format {
            input,
            normalize,
            output,
        } => {
            let source = read_source(&input)?;
            let text = if normalize {
                chordsheet::normalize(&source)?
            } else {
                chordsheet::format(&source)?
            };
            write_output(output.as_deref(), &with_newline(text))?;
        }
        Commands::Transpose {
            input,
            semitones,
            output,
        } => {
            let text = chordsheet::transpose_source(&read_source(&input)?, semitones)?;
            write_output(output.as_deref(), &with_newline(text))?;
        }
        Commands::Events {
            input,
            config,
            record,
            from_ms,
            output,
        } => {
            let yaml = events(&input, config.as_deref(), record, from_ms)?;
            write_output(output.as_deref(), &yaml)?;
        }
    }
    Ok(())
}
