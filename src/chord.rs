//! Chord grammar and derived pitches.
//!
//! A chord reference in the text is `root + qualifier + extension + duration markers`,
//! e.g. `Am7..` (A minor seventh for two beats). The grammar is one anchored regex
//! assembled from the value tables below, so adding a qualifier or extension only
//! touches a table.
//!
//! ## Duration markers
//! - `.` one beat
//! - `'` half a beat
//! - (none) the rest of the current bar
//!
//! A body made only of markers (`[..]`, or even `[]`) is the "no chord" form: the
//! previous chord keeps sounding. That check runs before the chord grammar, so
//! it takes precedence over it.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Serialize, Serializer};

use crate::error::SheetError;
use crate::note::{Note, PitchedNote};
use crate::signature::TICKS_PER_BEAT;

/// Octave the root of a derived chord voicing sits in.
const CHORD_ROOT_OCTAVE: i32 = 4;

const BEAT_MARKER: char = '.';
const HALF_BEAT_MARKER: char = '\'';

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Qualifier {
    Major,
    Minor,
    Diminished,
    Augmented,
}

impl Qualifier {
    pub const ALL: [Qualifier; 4] = [
        Qualifier::Major,
        Qualifier::Minor,
        Qualifier::Diminished,
        Qualifier::Augmented,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Qualifier::Major => "",
            Qualifier::Minor => "m",
            Qualifier::Diminished => "dim",
            Qualifier::Augmented => "aug",
        }
    }

    fn triad(&self) -> [i32; 3] {
        match self {
            Qualifier::Major => [0, 4, 7],
            Qualifier::Minor => [0, 3, 7],
            Qualifier::Diminished => [0, 3, 6],
            Qualifier::Augmented => [0, 4, 8],
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Extension {
    None,
    Sixth,
    Seventh,
    MajorSeventh,
}

impl Extension {
    pub const ALL: [Extension; 4] = [
        Extension::None,
        Extension::Sixth,
        Extension::Seventh,
        Extension::MajorSeventh,
    ];

    pub fn suffix(&self) -> &'static str {
        match self {
            Extension::None => "",
            Extension::Sixth => "6",
            Extension::Seventh => "7",
            Extension::MajorSeventh => "maj7",
        }
    }

    fn interval(&self, qualifier: Qualifier) -> Option<i32> {
        match (self, qualifier) {
            (Extension::None, _) => None,
            (Extension::Sixth, _) => Some(9),
            (Extension::Seventh, Qualifier::Diminished) => Some(9),
            (Extension::Seventh, _) => Some(10),
            (Extension::MajorSeventh, _) => Some(11),
        }
    }
}

/// Alternation of the non-empty suffixes of a table, longest first.
fn alternation<'a>(values: impl Iterator<Item = &'a str>) -> String {
    let mut values: Vec<&str> = values.filter(|v| !v.is_empty()).collect();
    values.sort_by(|a, b| b.len().cmp(&a.len()).then(a.cmp(b)));
    values
        .iter()
        .map(|v| regex::escape(v))
        .collect::<Vec<_>>()
        .join("|")
}

static CHORD_RE: Lazy<Regex> = Lazy::new(|| {
    let roots = alternation(Note::ALL.iter().map(|n| n.name()));
    let qualifiers = alternation(Qualifier::ALL.iter().map(|q| q.suffix()));
    let extensions = alternation(Extension::ALL.iter().map(|e| e.suffix()));
    Regex::new(&format!(
        r"^(?P<root>{})(?P<qualifier>{})?(?P<extension>{})?(?P<duration>[.']*)$",
        roots, qualifiers, extensions
    ))
    .unwrap()
});

static DURATION_ONLY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[.']*$").unwrap());

/// Identity of a chord for lookups: sharp and flat spellings collapse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ChordKey {
    pub root: u8,
    pub qualifier: Qualifier,
    pub extension: Extension,
}

/// A chord: root note, qualifier and extension. Equality is structural, so
/// `C#` and `Db` are different chords that share a [`ChordKey`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Chord {
    pub root: Note,
    pub qualifier: Qualifier,
    pub extension: Extension,
}

impl Chord {
    pub fn new(root: Note, qualifier: Qualifier, extension: Extension) -> Self {
        Self {
            root,
            qualifier,
            extension,
        }
    }

    pub fn major(root: Note) -> Self {
        Self::new(root, Qualifier::Major, Extension::None)
    }

    /// Parse a bare chord name. Duration markers are not allowed here.
    pub fn parse(s: &str) -> Result<Self, SheetError> {
        match ChordSymbol::parse(s)? {
            ChordSymbol {
                chord: Some(chord),
                ticks: None,
            } => Ok(chord),
            _ => Err(SheetError::grammar("chord", s)),
        }
    }

    pub fn key(&self) -> ChordKey {
        ChordKey {
            root: self.root.semitone(),
            qualifier: self.qualifier,
            extension: self.extension,
        }
    }

    /// The same chord spelled with the alternative root name, if any.
    pub fn alias(&self) -> Option<Chord> {
        self.root.alias().map(|root| Chord { root, ..*self })
    }

    pub fn name(&self) -> String {
        format!(
            "{}{}{}",
            self.root.name(),
            self.qualifier.suffix(),
            self.extension.suffix()
        )
    }

    fn intervals(&self) -> Vec<i32> {
        let mut intervals = self.qualifier.triad().to_vec();
        if let Some(ext) = self.extension.interval(self.qualifier) {
            intervals.push(ext);
        }
        intervals
    }

    /// Theoretical pitches of the chord, root in octave 4.
    pub fn as_pitched_notes(&self) -> Vec<PitchedNote> {
        let root = PitchedNote::new(self.root, CHORD_ROOT_OCTAVE);
        self.intervals()
            .into_iter()
            .map(|i| root.add_semitones(i))
            .collect()
    }

    /// Pitch classes (0..12) of the chord.
    pub fn pitch_classes(&self) -> BTreeSet<u8> {
        self.as_pitched_notes()
            .iter()
            .map(|p| p.pitch_class())
            .collect()
    }

    pub fn transpose(&self, semitones: i32, prefer_flat: bool) -> Chord {
        let root = Note::from_semitone(self.root.semitone() as i32 + semitones.rem_euclid(12), prefer_flat);
        Chord { root, ..*self }
    }
}

impl fmt::Display for Chord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Chord {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Chord::parse(s)
    }
}

impl Serialize for Chord {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// The content of one `[...]` chord reference: an optional chord plus an
/// optional explicit duration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChordSymbol {
    pub chord: Option<Chord>,
    /// Explicit duration in ticks; `None` means "rest of the bar".
    pub ticks: Option<u32>,
}

impl ChordSymbol {
    pub fn parse(s: &str) -> Result<Self, SheetError> {
        if DURATION_ONLY_RE.is_match(s) {
            return Ok(ChordSymbol {
                chord: None,
                ticks: marker_ticks(s),
            });
        }

        let caps = CHORD_RE
            .captures(s)
            .ok_or_else(|| SheetError::grammar("chord", s))?;
        let root: Note = caps["root"].parse()?;
        let qualifier = caps
            .name("qualifier")
            .and_then(|m| Qualifier::ALL.iter().find(|q| q.suffix() == m.as_str()))
            .copied()
            .unwrap_or(Qualifier::Major);
        let extension = caps
            .name("extension")
            .and_then(|m| Extension::ALL.iter().find(|e| e.suffix() == m.as_str()))
            .copied()
            .unwrap_or(Extension::None);
        let ticks = caps.name("duration").and_then(|m| marker_ticks(m.as_str()));

        Ok(ChordSymbol {
            chord: Some(Chord::new(root, qualifier, extension)),
            ticks,
        })
    }

    /// Render back to reference text. `ticks` must be a multiple of half a beat.
    pub fn render(&self) -> String {
        let mut out = self.chord.map(|c| c.name()).unwrap_or_default();
        if let Some(ticks) = self.ticks {
            out.push_str(&duration_markers(ticks));
        }
        out
    }
}

fn marker_ticks(markers: &str) -> Option<u32> {
    if markers.is_empty() {
        return None;
    }
    Some(
        markers
            .chars()
            .map(|c| match c {
                BEAT_MARKER => TICKS_PER_BEAT,
                _ => TICKS_PER_BEAT / 2,
            })
            .sum(),
    )
}

/// Markers for a duration: whole beats as `.`, a trailing half beat as `'`.
pub fn duration_markers(ticks: u32) -> String {
    let beats = ticks / TICKS_PER_BEAT;
    let mut out: String = std::iter::repeat(BEAT_MARKER).take(beats as usize).collect();
    if ticks % TICKS_PER_BEAT >= TICKS_PER_BEAT / 2 {
        out.push(HALF_BEAT_MARKER);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pitches(name: &str) -> Vec<String> {
        Chord::parse(name)
            .unwrap()
            .as_pitched_notes()
            .iter()
            .map(|p| p.to_string())
            .collect()
    }

    #[test]
    fn test_chord_pitches() {
        assert_eq!(pitches("C"), vec!["C4", "E4", "G4"]);
        assert_eq!(pitches("Am7"), vec!["A4", "C5", "E5", "G5"]);
        assert_eq!(pitches("Bbmaj7"), vec!["Bb4", "D5", "F5", "A5"]);
        assert_eq!(pitches("Cdim7"), vec!["C4", "Eb4", "Gb4", "A4"]);
    }

    #[test]
    fn test_parse_components() {
        let chord = Chord::parse("F#m7").unwrap();
        assert_eq!(chord.root, Note::FSharp);
        assert_eq!(chord.qualifier, Qualifier::Minor);
        assert_eq!(chord.extension, Extension::Seventh);

        let chord = Chord::parse("Cmaj7").unwrap();
        assert_eq!(chord.qualifier, Qualifier::Major);
        assert_eq!(chord.extension, Extension::MajorSeventh);

        let chord = Chord::parse("Ebaug").unwrap();
        assert_eq!(chord.root, Note::EFlat);
        assert_eq!(chord.qualifier, Qualifier::Augmented);
    }

    #[test]
    fn test_chord_with_duration() {
        let sym = ChordSymbol::parse("C7...").unwrap();
        assert_eq!(sym.chord, Some(Chord::parse("C7").unwrap()));
        assert_eq!(sym.ticks, Some(72));

        let sym = ChordSymbol::parse("G.'").unwrap();
        assert_eq!(sym.ticks, Some(36));
        assert_eq!(sym.render(), "G.'");
    }

    #[test]
    fn test_duration_only_is_no_chord() {
        let sym = ChordSymbol::parse("...").unwrap();
        assert_eq!(sym.chord, None);
        assert_eq!(sym.ticks, Some(72));

        let sym = ChordSymbol::parse("").unwrap();
        assert_eq!(sym, ChordSymbol { chord: None, ticks: None });
    }

    #[test]
    fn test_unknown_chord_carries_value() {
        let err = ChordSymbol::parse("Hm").unwrap_err();
        assert_eq!(err, SheetError::grammar("chord", "Hm"));
        assert!(ChordSymbol::parse("C7x").is_err());
        assert!(ChordSymbol::parse(".C").is_err());
        assert!(Chord::parse("C..").is_err());
    }

    #[test]
    fn test_alias_and_key() {
        let cs = Chord::parse("C#m").unwrap();
        let db = Chord::parse("Dbm").unwrap();
        assert_ne!(cs, db);
        assert_eq!(cs.key(), db.key());
        assert_eq!(cs.alias(), Some(db));
    }

    #[test]
    fn test_transpose() {
        let chord = Chord::parse("A7").unwrap();
        assert_eq!(chord.transpose(1, true).name(), "Bb7");
        assert_eq!(chord.transpose(-2, false).name(), "G7");
        assert_eq!(chord.transpose(i32::MAX, false).name(), "E7");
        assert_eq!(chord.transpose(i32::MIN, false).name(), "C#7");
    }

    #[test]
    fn test_duration_markers() {
        assert_eq!(duration_markers(96), "....");
        assert_eq!(duration_markers(12), "'");
        assert_eq!(duration_markers(60), "..'");
    }
}
