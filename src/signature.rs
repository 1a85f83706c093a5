//! Time signatures, key signatures and tempo values.

use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::error::SheetError;
use crate::note::Note;

/// Smallest subdivision of a beat. Every duration is an exact multiple.
pub const TICKS_PER_BEAT: u32 = 24;

/// Tempo used when neither the song nor a part sets one.
pub const DEFAULT_TEMPO: u32 = 120;

static TIME_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([1-9][0-9]?)/(1|2|4|8|16|32)$").unwrap());
static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^([A-G][#b]?)(m)?$").unwrap());

/// Time signature (e.g., 4/4, 3/4, 6/8)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct TimeSignature {
    pub beats: u32,
    pub note_value: u32,
}

impl Default for TimeSignature {
    fn default() -> Self {
        Self {
            beats: 4,
            note_value: 4,
        }
    }
}

impl TimeSignature {
    pub fn new(beats: u32, note_value: u32) -> Self {
        Self { beats, note_value }
    }

    /// Length of one bar in ticks.
    pub fn bar_ticks(&self) -> u32 {
        self.beats * TICKS_PER_BEAT
    }
}

impl fmt::Display for TimeSignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.beats, self.note_value)
    }
}

impl FromStr for TimeSignature {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = TIME_RE
            .captures(s.trim())
            .ok_or_else(|| SheetError::grammar("time signature", s))?;
        let beats = caps[1]
            .parse()
            .map_err(|_| SheetError::grammar("time signature", s))?;
        let note_value = caps[2]
            .parse()
            .map_err(|_| SheetError::grammar("time signature", s))?;
        Ok(TimeSignature { beats, note_value })
    }
}

/// Mode for key signature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize)]
pub enum Scale {
    #[default]
    Major,
    Minor,
}

/// Key signature: tonic plus scale, e.g. `G` or `F#m`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct KeySignature {
    pub tonic: Note,
    pub scale: Scale,
}

impl KeySignature {
    pub fn new(tonic: Note, scale: Scale) -> Self {
        Self { tonic, scale }
    }

    /// Whether accidentals in this key are conventionally spelled as flats.
    pub fn prefers_flat(&self) -> bool {
        if self.tonic.is_flat() {
            return true;
        }
        if self.tonic.is_sharp() {
            return false;
        }
        match self.scale {
            Scale::Major => self.tonic == Note::F,
            Scale::Minor => matches!(self.tonic, Note::D | Note::G | Note::C | Note::F),
        }
    }

    pub fn transpose(&self, semitones: i32, prefer_flat: bool) -> Self {
        let tonic = Note::from_semitone(self.tonic.semitone() as i32 + semitones.rem_euclid(12), prefer_flat);
        Self {
            tonic,
            scale: self.scale,
        }
    }
}

impl fmt::Display for KeySignature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.scale {
            Scale::Major => write!(f, "{}", self.tonic),
            Scale::Minor => write!(f, "{}m", self.tonic),
        }
    }
}

impl FromStr for KeySignature {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let caps = KEY_RE
            .captures(s.trim())
            .ok_or_else(|| SheetError::grammar("key signature", s))?;
        let tonic: Note = caps[1]
            .parse()
            .map_err(|_| SheetError::grammar("key signature", s))?;
        let scale = if caps.get(2).is_some() {
            Scale::Minor
        } else {
            Scale::Major
        };
        Ok(KeySignature { tonic, scale })
    }
}

/// Parse a tempo value in beats per minute (1..=400).
pub fn parse_tempo(s: &str) -> Result<u32, SheetError> {
    let bpm: u32 = s
        .trim()
        .parse()
        .map_err(|_| SheetError::grammar("tempo", s))?;
    if bpm == 0 || bpm > 400 {
        return Err(SheetError::grammar("tempo", s));
    }
    Ok(bpm)
}
