//! Note names and pitched notes.
//!
//! A [`Note`] is one of 17 symbolic pitch classes. Sharps and flats that sound
//! the same (`C#`/`Db`) compare unequal but share a semitone, which is what all
//! lookups normalize on.
//!
//! A [`PitchedNote`] is a single integer on the MIDI scale (C4 = 60). All
//! arithmetic happens on that integer; the symbolic name is only derived for
//! display.

use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SheetError;

/// Symbolic pitch class: naturals plus the sharps and flats in common use.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub enum Note {
    C,
    CSharp,
    DFlat,
    D,
    DSharp,
    EFlat,
    E,
    F,
    FSharp,
    GFlat,
    G,
    GSharp,
    AFlat,
    A,
    ASharp,
    BFlat,
    B,
}

impl Note {
    pub const ALL: [Note; 17] = [
        Note::C,
        Note::CSharp,
        Note::DFlat,
        Note::D,
        Note::DSharp,
        Note::EFlat,
        Note::E,
        Note::F,
        Note::FSharp,
        Note::GFlat,
        Note::G,
        Note::GSharp,
        Note::AFlat,
        Note::A,
        Note::ASharp,
        Note::BFlat,
        Note::B,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Note::C => "C",
            Note::CSharp => "C#",
            Note::DFlat => "Db",
            Note::D => "D",
            Note::DSharp => "D#",
            Note::EFlat => "Eb",
            Note::E => "E",
            Note::F => "F",
            Note::FSharp => "F#",
            Note::GFlat => "Gb",
            Note::G => "G",
            Note::GSharp => "G#",
            Note::AFlat => "Ab",
            Note::A => "A",
            Note::ASharp => "A#",
            Note::BFlat => "Bb",
            Note::B => "B",
        }
    }

    /// Semitone above C (0..12).
    pub fn semitone(&self) -> u8 {
        match self {
            Note::C => 0,
            Note::CSharp | Note::DFlat => 1,
            Note::D => 2,
            Note::DSharp | Note::EFlat => 3,
            Note::E => 4,
            Note::F => 5,
            Note::FSharp | Note::GFlat => 6,
            Note::G => 7,
            Note::GSharp | Note::AFlat => 8,
            Note::A => 9,
            Note::ASharp | Note::BFlat => 10,
            Note::B => 11,
        }
    }

    pub fn is_flat(&self) -> bool {
        matches!(
            self,
            Note::DFlat | Note::EFlat | Note::GFlat | Note::AFlat | Note::BFlat
        )
    }

    pub fn is_sharp(&self) -> bool {
        matches!(
            self,
            Note::CSharp | Note::DSharp | Note::FSharp | Note::GSharp | Note::ASharp
        )
    }

    /// Spell a semitone, choosing the flat name for black keys when asked to.
    pub fn from_semitone(semitone: i32, prefer_flat: bool) -> Note {
        match (semitone.rem_euclid(12), prefer_flat) {
            (0, _) => Note::C,
            (1, false) => Note::CSharp,
            (1, true) => Note::DFlat,
            (2, _) => Note::D,
            (3, false) => Note::DSharp,
            (3, true) => Note::EFlat,
            (4, _) => Note::E,
            (5, _) => Note::F,
            (6, false) => Note::FSharp,
            (6, true) => Note::GFlat,
            (7, _) => Note::G,
            (8, false) => Note::GSharp,
            (8, true) => Note::AFlat,
            (9, _) => Note::A,
            (10, false) => Note::ASharp,
            (10, true) => Note::BFlat,
            _ => Note::B,
        }
    }

    /// The other spelling of the same pitch class, if there is one.
    pub fn alias(&self) -> Option<Note> {
        if self.is_sharp() {
            Some(Note::from_semitone(self.semitone() as i32, true))
        } else if self.is_flat() {
            Some(Note::from_semitone(self.semitone() as i32, false))
        } else {
            None
        }
    }

    /// Same pitch class, regardless of spelling.
    pub fn same_pitch_class(&self, other: &Note) -> bool {
        self.semitone() == other.semitone()
    }
}

impl fmt::Display for Note {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Note {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Note::ALL
            .iter()
            .find(|n| n.name() == s)
            .copied()
            .ok_or_else(|| SheetError::grammar("note", s))
    }
}

/// Lowest and highest representable pitch (MIDI range).
pub const MIN_PITCH: i32 = 0;
pub const MAX_PITCH: i32 = 127;

/// Shift by whole octaves to the nearest value in `MIN_PITCH..=MAX_PITCH`.
fn wrap_into_range(value: i64) -> i32 {
    let (min, max) = (MIN_PITCH as i64, MAX_PITCH as i64);
    let wrapped = if value > max {
        max - (max - value).rem_euclid(12)
    } else if value < min {
        min + (value - min).rem_euclid(12)
    } else {
        value
    };
    wrapped as i32
}

/// A note with an octave, stored as one semitone number (C4 = 60).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub struct PitchedNote {
    value: i32,
    prefers_flat: bool,
}

impl PitchedNote {
    pub fn new(note: Note, octave: i32) -> Self {
        Self::from_value((octave + 1) * 12 + note.semitone() as i32, note.is_flat())
    }

    /// Build from a raw semitone number, wrapping by whole octaves into range.
    pub fn from_value(value: i32, prefers_flat: bool) -> Self {
        Self {
            value: wrap_into_range(value as i64),
            prefers_flat,
        }
    }

    pub fn value(&self) -> i32 {
        self.value
    }

    pub fn midi(&self) -> u8 {
        self.value as u8
    }

    pub fn prefers_flat(&self) -> bool {
        self.prefers_flat
    }

    pub fn octave(&self) -> i32 {
        self.value.div_euclid(12) - 1
    }

    pub fn note(&self) -> Note {
        Note::from_semitone(self.value, self.prefers_flat)
    }

    pub fn pitch_class(&self) -> u8 {
        self.value.rem_euclid(12) as u8
    }

    pub fn add_semitones(&self, semitones: i32) -> Self {
        Self {
            value: wrap_into_range(self.value as i64 + semitones as i64),
            prefers_flat: self.prefers_flat,
        }
    }

    /// Hertz at A4 = 440.
    pub fn frequency(&self) -> f64 {
        440.0 * 2f64.powf((self.value - 69) as f64 / 12.0)
    }
}

impl PartialOrd for PitchedNote {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for PitchedNote {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.value.cmp(&other.value)
    }
}

impl fmt::Display for PitchedNote {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.note(), self.octave())
    }
}

impl FromStr for PitchedNote {
    type Err = SheetError;

    /// Parse `C4`, `Bb3`, `F#-1`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let split = s
            .char_indices()
            .find(|(i, c)| *i > 0 && (c.is_ascii_digit() || *c == '-'))
            .map(|(i, _)| i)
            .ok_or_else(|| SheetError::grammar("pitched note", s))?;
        let note: Note = s[..split]
            .parse()
            .map_err(|_| SheetError::grammar("pitched note", s))?;
        let octave: i32 = s[split..]
            .parse()
            .map_err(|_| SheetError::grammar("pitched note", s))?;
        if !(-1..=9).contains(&octave) {
            return Err(SheetError::grammar("pitched note", s));
        }
        Ok(PitchedNote::new(note, octave))
    }
}
