//! Playback data type definitions
//!
//! This module defines the timed events the scheduler hands to a tone engine,
//! and the bar timeline used to follow playback on screen.

use serde::Serialize;

use crate::instrument::Sound;

/// Who plays a note.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Voice {
    Metronome,
    /// Instrument track, indexed like the song's instrument library.
    Track(usize),
}

/// One note to trigger.
///
/// # Fields
/// - `voice`: metronome or instrument track
/// - `pitch`: MIDI note number
/// - `velocity`: 0.0 to 1.0
/// - `time`: seconds from the start of the song
/// - `duration`: seconds the note rings
/// - `bar`: index of the bar the note belongs to (0-based, playing order)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NoteEvent {
    pub voice: Voice,
    pub pitch: u8,
    pub velocity: f32,
    pub time: f64,
    pub duration: f64,
    pub bar: usize,
}

/// Where a bar sits in time.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BarTiming {
    pub index: usize,
    /// Seconds from the start of the song.
    pub start: f64,
    pub duration: f64,
    pub beats: u32,
    pub tempo: u32,
}

impl BarTiming {
    pub fn end(&self) -> f64 {
        self.start + self.duration
    }

    /// Length of one beat of this bar.
    pub fn beat_secs(&self) -> f64 {
        self.duration / self.beats.max(1) as f64
    }
}

/// Bar start times of a song. Starts are increasing and bars never overlap.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Timeline {
    pub bars: Vec<BarTiming>,
}

impl Timeline {
    pub fn duration(&self) -> f64 {
        self.bars.last().map(|b| b.end()).unwrap_or(0.0)
    }

    /// Index of the bar sounding at `time` seconds.
    pub fn bar_at(&self, time: f64) -> Option<usize> {
        if time < 0.0 || time >= self.duration() {
            return None;
        }
        let idx = self.bars.partition_point(|b| b.start <= time);
        idx.checked_sub(1)
    }
}

/// Everything needed to play a song.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackData {
    pub title: Option<String>,
    pub tempo: u32,
    /// Sound of each instrument track.
    pub voices: Vec<Sound>,
    pub timeline: Timeline,
    /// Sorted by time.
    pub events: Vec<NoteEvent>,
}

impl PlaybackData {
    pub fn duration(&self) -> f64 {
        self.timeline.duration()
    }
}
