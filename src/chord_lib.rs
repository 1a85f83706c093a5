//! Fret positions for chords on a fretted instrument.
//!
//! A [`ChordLib`] answers "which fret on which string" for a chord. Lookups try,
//! in order: custom definitions, the built-in table for the instrument type, and
//! finally a synthesized voicing. Sharp and flat spellings (`C#`/`Db`) are the
//! same entry.
//!
//! Fret arrays are in string order, lowest string first. `-1` is a muted string.

use std::collections::HashMap;

use once_cell::sync::Lazy;

use crate::chord::{Chord, ChordKey};
use crate::error::SheetError;
use crate::note::PitchedNote;

/// Muted string marker in a fret array.
pub const MUTED: i32 = -1;

/// Highest fret the library accepts or synthesizes.
pub const MAX_FRET: i32 = 12;

const UKULELE_CHORDS: &[(&str, &str)] = &[
    ("C", "0003"), ("Cm", "0333"), ("C7", "0001"), ("Cm7", "3333"), ("Cmaj7", "0002"),
    ("C#", "1114"), ("C#m", "1104"), ("C#7", "1112"), ("C#m7", "1102"),
    ("D", "2220"), ("Dm", "2210"), ("D7", "2223"), ("Dm7", "2213"), ("Dmaj7", "2224"),
    ("Eb", "0331"), ("Ebm", "3321"), ("Eb7", "3334"), ("Ebm7", "3324"),
    ("E", "4442"), ("Em", "0432"), ("E7", "1202"), ("Em7", "0202"),
    ("F", "2010"), ("Fm", "1013"), ("F7", "2310"), ("Fm7", "1313"), ("Fmaj7", "2000"),
    ("F#", "3121"), ("F#m", "2120"), ("F#7", "3424"), ("F#m7", "2424"),
    ("G", "0232"), ("Gm", "0231"), ("G7", "0212"), ("Gm7", "0211"), ("Gmaj7", "0222"),
    ("Ab", "5343"), ("Abm", "4342"), ("Ab7", "1323"), ("Abm7", "1322"),
    ("A", "2100"), ("Am", "2000"), ("A7", "0100"), ("Am7", "0000"), ("Amaj7", "1100"),
    ("Bb", "3211"), ("Bbm", "3111"), ("Bb7", "1211"), ("Bbm7", "1111"),
    ("B", "4322"), ("Bm", "4222"), ("B7", "2322"), ("Bm7", "2222"),
];

const GUITAR_CHORDS: &[(&str, &str)] = &[
    ("C", "x32010"), ("D", "xx0232"), ("E", "022100"), ("F", "133211"),
    ("G", "320003"), ("A", "x02220"), ("B", "x24442"),
    ("Am", "x02210"), ("Dm", "xx0231"), ("Em", "022000"), ("Bm", "x24432"),
    ("Gm", "355333"), ("Fm", "133111"),
    ("C7", "x32310"), ("D7", "xx0212"), ("E7", "020100"), ("G7", "320001"),
    ("A7", "x02020"), ("B7", "x21202"),
    ("Am7", "x02010"), ("Em7", "020000"), ("Dm7", "xx0211"),
    ("Cmaj7", "x32000"), ("Fmaj7", "xx3210"),
];

type ChordTable = HashMap<ChordKey, Vec<i32>>;

fn build_table(entries: &[(&str, &str)]) -> ChordTable {
    entries
        .iter()
        .filter_map(|(name, frets)| {
            let chord = Chord::parse(name).ok()?;
            let frets = frets
                .chars()
                .map(|c| c.to_digit(10).map(|d| d as i32).unwrap_or(MUTED))
                .collect();
            Some((chord.key(), frets))
        })
        .collect()
}

static UKULELE_TABLE: Lazy<ChordTable> = Lazy::new(|| build_table(UKULELE_CHORDS));
static GUITAR_TABLE: Lazy<ChordTable> = Lazy::new(|| build_table(GUITAR_CHORDS));

/// Which built-in table seeds a library.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuiltinTable {
    Ukulele,
    Guitar,
    None,
}

impl BuiltinTable {
    fn table(&self) -> Option<&'static ChordTable> {
        match self {
            BuiltinTable::Ukulele => Some(&UKULELE_TABLE),
            BuiltinTable::Guitar => Some(&GUITAR_TABLE),
            BuiltinTable::None => None,
        }
    }
}

/// A user-supplied voicing, kept in definition order for serialization.
#[derive(Debug, Clone, PartialEq)]
pub struct ChordDefinition {
    pub chord: Chord,
    pub frets: Vec<i32>,
}

#[derive(Debug, Clone)]
pub struct ChordLib {
    tuning: Vec<PitchedNote>,
    builtin: BuiltinTable,
    custom: Vec<ChordDefinition>,
}

impl ChordLib {
    pub fn new(tuning: Vec<PitchedNote>, builtin: BuiltinTable) -> Self {
        Self {
            tuning,
            builtin,
            custom: Vec::new(),
        }
    }

    /// Standard GCEA ukulele.
    pub fn for_ukulele() -> Self {
        let tuning = ["G4", "C4", "E4", "A4"]
            .iter()
            .filter_map(|n| n.parse().ok())
            .collect();
        Self::new(tuning, BuiltinTable::Ukulele)
    }

    pub fn tuning(&self) -> &[PitchedNote] {
        &self.tuning
    }

    pub fn string_count(&self) -> usize {
        self.tuning.len()
    }

    pub fn custom_chords(&self) -> &[ChordDefinition] {
        &self.custom
    }

    /// Frets for a chord: custom, then built-in, then a synthesized voicing.
    pub fn get_frets(&self, chord: &Chord) -> Vec<i32> {
        let key = chord.key();
        if let Some(def) = self.custom.iter().rev().find(|d| d.chord.key() == key) {
            return def.frets.clone();
        }
        if let Some(frets) = self.builtin.table().and_then(|t| t.get(&key)) {
            if frets.len() == self.tuning.len() {
                return frets.clone();
            }
        }
        self.synthesize(chord)
    }

    /// Whether the chord has a custom or built-in voicing.
    pub fn is_defined(&self, chord: &Chord) -> bool {
        let key = chord.key();
        self.custom.iter().any(|d| d.chord.key() == key)
            || self
                .builtin
                .table()
                .map(|t| t.contains_key(&key))
                .unwrap_or(false)
    }

    /// Per string, the lowest fret that lands on a chord tone.
    fn synthesize(&self, chord: &Chord) -> Vec<i32> {
        let classes = chord.pitch_classes();
        self.tuning
            .iter()
            .map(|open| {
                (0..=MAX_FRET)
                    .find(|fret| classes.contains(&open.add_semitones(*fret).pitch_class()))
                    .unwrap_or(MUTED)
            })
            .collect()
    }

    /// Pitches sounded by a fret array; muted strings are skipped.
    pub fn sounding_pitches(&self, frets: &[i32]) -> Vec<(usize, PitchedNote)> {
        self.tuning
            .iter()
            .zip(frets)
            .enumerate()
            .filter(|(_, (_, fret))| **fret >= 0)
            .map(|(string, (open, fret))| (string, open.add_semitones(*fret)))
            .collect()
    }

    fn check_compatible(&self, chord: &Chord, frets: &[i32]) -> Result<(), SheetError> {
        if frets.len() != self.tuning.len() {
            return Err(SheetError::structural(format!(
                "chord {} needs {} frets, got {}",
                chord,
                self.tuning.len(),
                frets.len()
            )));
        }
        if let Some(fret) = frets.iter().find(|f| **f < MUTED || **f > MAX_FRET) {
            return Err(SheetError::structural(format!(
                "fret {} out of range for chord {}",
                fret, chord
            )));
        }
        let classes = chord.pitch_classes();
        if let Some((string, pitch)) = self
            .sounding_pitches(frets)
            .into_iter()
            .find(|(_, p)| !classes.contains(&p.pitch_class()))
        {
            return Err(SheetError::structural(format!(
                "chord {} does not contain {} (string {})",
                chord,
                pitch.note(),
                string + 1
            )));
        }
        Ok(())
    }

    /// Add a custom voicing. Every sounded string must be a chord tone.
    pub fn define_chord(&mut self, chord: Chord, frets: Vec<i32>) -> Result<(), SheetError> {
        self.check_compatible(&chord, &frets)?;
        let key = chord.key();
        match self.custom.iter_mut().find(|d| d.chord.key() == key) {
            Some(existing) => {
                existing.chord = chord;
                existing.frets = frets;
            }
            None => self.custom.push(ChordDefinition { chord, frets }),
        }
        Ok(())
    }

    /// Like [`ChordLib::define_chord`], but reports incompatibility as `false`.
    pub fn define_chord_if_compatible(&mut self, chord: Chord, frets: Vec<i32>) -> bool {
        self.define_chord(chord, frets).is_ok()
    }
}

/// Parse one fret value: an integer, or `x`/`X`/`-1` for a muted string.
pub fn parse_fret(s: &str) -> Result<i32, SheetError> {
    match s {
        "x" | "X" => Ok(MUTED),
        _ => match s.parse::<i32>() {
            Ok(f) if (MUTED..=MAX_FRET).contains(&f) => Ok(f),
            _ => Err(SheetError::grammar("fret", s)),
        },
    }
}

/// Inverse of [`parse_fret`].
pub fn render_fret(fret: i32) -> String {
    if fret < 0 {
        "x".to_string()
    } else {
        fret.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chord(name: &str) -> Chord {
        Chord::parse(name).unwrap()
    }

    #[test]
    fn test_builtin_lookup() {
        let lib = ChordLib::for_ukulele();
        assert_eq!(lib.get_frets(&chord("C")), vec![0, 0, 0, 3]);
        assert_eq!(lib.get_frets(&chord("Am")), vec![2, 0, 0, 0]);
    }

    #[test]
    fn test_alias_lookup_is_equivalent() {
        let lib = ChordLib::for_ukulele();
        assert_eq!(lib.get_frets(&chord("C#")), lib.get_frets(&chord("Db")));
        assert_eq!(lib.get_frets(&chord("A#m")), lib.get_frets(&chord("Bbm")));
        assert_eq!(lib.get_frets(&chord("G#7")), vec![1, 3, 2, 3]);
    }

    #[test]
    fn test_fallback_voicing_uses_chord_tones() {
        let lib = ChordLib::for_ukulele();
        let aug = chord("Caug");
        assert!(!lib.is_defined(&aug));
        let frets = lib.get_frets(&aug);
        // G4 -> G# (1), C4 -> C (0), E4 -> E (0), A4 -> C (3)
        assert_eq!(frets, vec![1, 0, 0, 3]);
        let classes = aug.pitch_classes();
        for (_, pitch) in lib.sounding_pitches(&frets) {
            assert!(classes.contains(&pitch.pitch_class()));
        }
    }

    #[test]
    fn test_define_compatible_subset() {
        let mut lib = ChordLib::for_ukulele();
        // Only C and G sound: a subset of C major.
        lib.define_chord(chord("C"), vec![0, 0, -1, 3]).unwrap();
        assert_eq!(lib.get_frets(&chord("C")), vec![0, 0, -1, 3]);
        assert_eq!(lib.custom_chords().len(), 1);
    }

    #[test]
    fn test_define_wrong_note_fails() {
        let mut lib = ChordLib::for_ukulele();
        // A4 + 2 = B, not in C major
        let err = lib.define_chord(chord("C"), vec![0, 0, 0, 2]).unwrap_err();
        assert!(matches!(err, SheetError::StructuralError { .. }));
        assert!(!lib.define_chord_if_compatible(chord("C"), vec![0, 0, 0, 2]));
        assert!(lib.define_chord_if_compatible(chord("C"), vec![5, 0, 0, 3]));
        assert_eq!(lib.get_frets(&chord("C")), vec![5, 0, 0, 3]);
    }

    #[test]
    fn test_define_checks_string_count() {
        let mut lib = ChordLib::for_ukulele();
        assert!(lib.define_chord(chord("G"), vec![3, 2, 0, 0, 0, 3]).is_err());
    }

    #[test]
    fn test_redefinition_keeps_order_and_alias() {
        let mut lib = ChordLib::for_ukulele();
        lib.define_chord(chord("C#"), vec![1, 1, 1, 4]).unwrap();
        lib.define_chord(chord("G"), vec![0, 2, 3, 2]).unwrap();
        lib.define_chord(chord("Db"), vec![6, 5, 4, 4]).unwrap();
        let names: Vec<String> = lib.custom_chords().iter().map(|d| d.chord.name()).collect();
        assert_eq!(names, vec!["Db", "G"]);
        assert_eq!(lib.get_frets(&chord("C#")), vec![6, 5, 4, 4]);
    }

    #[test]
    fn test_parse_fret() {
        assert_eq!(parse_fret("x").unwrap(), MUTED);
        assert_eq!(parse_fret("-1").unwrap(), MUTED);
        assert_eq!(parse_fret("12").unwrap(), 12);
        assert!(parse_fret("13").is_err());
        assert!(parse_fret("o").is_err());
    }
}
