//! # Playback Module
//!
//! Turn a parsed song into timed notes and play them through a tone engine.
//!
//! ## Purpose
//! This module converts a [`Song`](crate::song::Song) into playback data that is used for:
//! 1. **Audio playback** - MIDI pitches, velocities and timing for each instrument track
//! 2. **Visual following** - the bar under the transport while the song plays
//! 3. **Metronome** - count-in and per-beat clicks
//!
//! ## Sub-modules
//! - `types` - NoteEvent, Voice, Timeline, PlaybackData type definitions
//! - `config` - Scheduler settings read from YAML
//! - `engine` - Pure note event generation from bars, patterns and voicings
//! - `scheduler` - Live playback state machine driving a `ToneEngine`
//! - `offline` - Virtual-clock engine that records notes instead of playing them
//!
//! ## Key Types
//! - [`PlaybackData`] - Complete playback info (timeline + events + voices)
//! - [`NoteEvent`] - Single note with pitch, velocity, start and duration
//! - [`Scheduler`] - Count-in, transport control, muting and bar following
//! - [`ToneEngine`] - What the scheduler needs from an audio backend
//!
//! ## Entry Point
//! [`generate_playback_data()`] - Convert song sheet text to playback data
//!
//! ## Example
//! ```rust
//! use chordsheet::playback::{generate_playback_data, SchedulerConfig, Voice};
//!
//! let source = "{tempo: 120}\n{pattern: |d-du|}\n[C][G]";
//!
//! let data = generate_playback_data(source, &SchedulerConfig::default()).unwrap();
//!
//! assert_eq!(data.tempo, 120);
//! assert_eq!(data.timeline.bars.len(), 2);
//! assert_eq!(data.duration(), 4.0);
//! let first = data.events.iter().find(|e| e.voice == Voice::Track(0)).unwrap();
//! assert_eq!(first.pitch, 67); // G4, open first string of the ukulele C
//! ```
//!
//! ## Timing
//!
//! Times in [`NoteEvent`] are seconds from the start of the song. A bar lasts
//! `beats * 60 / tempo` seconds and its pattern splits it into equal strum
//! slots. A bar without a pattern is strummed down once per beat.
//!
//! The scheduler maps song time onto the engine's audio clock when the
//! transport starts, after the count-in.
//!
//! ## Related Modules
//! - `song` - Bars in playing order
//! - `chord_lib` - Fret voicings that decide which pitches a strum sounds
//! - `pattern` - Strum sequences

mod types;
mod config;
mod engine;
mod scheduler;
mod offline;

#[cfg(test)]
mod tests;

pub use types::{BarTiming, NoteEvent, PlaybackData, Timeline, Voice};
pub use config::SchedulerConfig;
pub use engine::{bar_events, generate_playback_data, metronome_events, schedule_song, timeline};
pub use scheduler::{CueId, Scheduler, SchedulerState, ToneEngine};
pub use offline::{OfflineEngine, RecordedNote};
