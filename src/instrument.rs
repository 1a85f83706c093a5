//! Instruments and the per-song instrument library.

use std::fmt;
use std::str::FromStr;

use crate::chord_lib::{BuiltinTable, ChordLib};
use crate::error::SheetError;
use crate::note::PitchedNote;

/// Name of the instrument used when a song declares none.
pub const DEFAULT_INSTRUMENT_NAME: &str = "Ukulele";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstrumentType {
    Ukulele,
    UkuleleLowG,
    Guitar,
    Bass,
    Custom,
}

impl InstrumentType {
    pub const ALL: [InstrumentType; 5] = [
        InstrumentType::Ukulele,
        InstrumentType::UkuleleLowG,
        InstrumentType::Guitar,
        InstrumentType::Bass,
        InstrumentType::Custom,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            InstrumentType::Ukulele => "ukulele",
            InstrumentType::UkuleleLowG => "ukulele-low-g",
            InstrumentType::Guitar => "guitar",
            InstrumentType::Bass => "bass",
            InstrumentType::Custom => "custom",
        }
    }

    fn default_tuning(&self) -> &'static [&'static str] {
        match self {
            InstrumentType::Ukulele => &["G4", "C4", "E4", "A4"],
            InstrumentType::UkuleleLowG => &["G3", "C4", "E4", "A4"],
            InstrumentType::Guitar => &["E2", "A2", "D3", "G3", "B3", "E4"],
            InstrumentType::Bass => &["E1", "A1", "D2", "G2"],
            InstrumentType::Custom => &[],
        }
    }

    fn default_sound(&self) -> Sound {
        match self {
            InstrumentType::Ukulele | InstrumentType::UkuleleLowG => Sound::Ukulele,
            InstrumentType::Guitar => Sound::Nylon,
            InstrumentType::Bass => Sound::Bass,
            InstrumentType::Custom => Sound::Piano,
        }
    }

    fn builtin_table(&self) -> BuiltinTable {
        match self {
            InstrumentType::Ukulele | InstrumentType::UkuleleLowG => BuiltinTable::Ukulele,
            InstrumentType::Guitar => BuiltinTable::Guitar,
            InstrumentType::Bass | InstrumentType::Custom => BuiltinTable::None,
        }
    }
}

impl FromStr for InstrumentType {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        InstrumentType::ALL
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| SheetError::grammar("instrument type", s))
    }
}

/// Sample set the tone engine should use for an instrument.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Sound {
    Ukulele,
    Nylon,
    Steel,
    Electric,
    Bass,
    Piano,
}

impl Sound {
    pub const ALL: [Sound; 6] = [
        Sound::Ukulele,
        Sound::Nylon,
        Sound::Steel,
        Sound::Electric,
        Sound::Bass,
        Sound::Piano,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Sound::Ukulele => "ukulele",
            Sound::Nylon => "nylon",
            Sound::Steel => "steel",
            Sound::Electric => "electric",
            Sound::Bass => "bass",
            Sound::Piano => "piano",
        }
    }
}

impl FromStr for Sound {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Sound::ALL
            .iter()
            .find(|t| t.name().eq_ignore_ascii_case(s))
            .copied()
            .ok_or_else(|| SheetError::grammar("instrument sound", s))
    }
}

#[derive(Debug, Clone)]
pub struct Instrument {
    pub name: String,
    pub kind: InstrumentType,
    pub sound: Sound,
    chord_lib: ChordLib,
    custom_tuning: bool,
}

impl Instrument {
    pub fn new(name: impl Into<String>, kind: InstrumentType) -> Result<Self, SheetError> {
        let tuning = kind
            .default_tuning()
            .iter()
            .map(|n| n.parse())
            .collect::<Result<Vec<PitchedNote>, _>>()?;
        Self::with_tuning(name, kind, kind.default_sound(), tuning)
    }

    pub fn with_tuning(
        name: impl Into<String>,
        kind: InstrumentType,
        sound: Sound,
        tuning: Vec<PitchedNote>,
    ) -> Result<Self, SheetError> {
        let name = name.into();
        if tuning.is_empty() {
            return Err(SheetError::structural(format!(
                "instrument {} has no strings",
                name
            )));
        }
        let custom_tuning = kind == InstrumentType::Custom
            || kind
                .default_tuning()
                .iter()
                .map(|n| n.parse::<PitchedNote>().ok())
                .ne(tuning.iter().map(|p| Some(*p)));
        Ok(Self {
            name,
            kind,
            sound,
            chord_lib: ChordLib::new(tuning, kind.builtin_table()),
            custom_tuning,
        })
    }

    /// Parse the value of an `{instrument: ...}` directive:
    /// `Name [type] [sound] [tuning...]`.
    pub fn parse_declaration(value: &str) -> Result<Self, SheetError> {
        let mut words = value.split_whitespace().peekable();
        let name = words
            .next()
            .ok_or_else(|| SheetError::grammar("instrument", value))?;

        let kind = match words.peek().map(|w| w.parse::<InstrumentType>()) {
            Some(Ok(kind)) => {
                words.next();
                kind
            }
            _ => InstrumentType::Ukulele,
        };
        let sound = match words.peek().map(|w| w.parse::<Sound>()) {
            Some(Ok(sound)) => {
                words.next();
                sound
            }
            _ => kind.default_sound(),
        };
        let tuning = words
            .map(|w| w.parse::<PitchedNote>())
            .collect::<Result<Vec<_>, _>>()
            .map_err(|_| SheetError::grammar("instrument", value))?;

        if tuning.is_empty() {
            if kind == InstrumentType::Custom {
                return Err(SheetError::structural(format!(
                    "custom instrument {} needs a tuning",
                    name
                )));
            }
            let mut instrument = Self::new(name, kind)?;
            instrument.sound = sound;
            return Ok(instrument);
        }
        Self::with_tuning(name, kind, sound, tuning)
    }

    /// Canonical declaration text, the inverse of [`Instrument::parse_declaration`].
    pub fn declaration(&self) -> String {
        let mut out = format!("{} {} {}", self.name, self.kind.name(), self.sound.name());
        if self.custom_tuning {
            for pitch in self.tuning() {
                out.push(' ');
                out.push_str(&pitch.to_string());
            }
        }
        out
    }

    pub fn tuning(&self) -> &[PitchedNote] {
        self.chord_lib.tuning()
    }

    pub fn string_count(&self) -> usize {
        self.chord_lib.string_count()
    }

    pub fn chord_lib(&self) -> &ChordLib {
        &self.chord_lib
    }

    pub fn chord_lib_mut(&mut self) -> &mut ChordLib {
        &mut self.chord_lib
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.declaration())
    }
}

/// Ordered instrument set of a song. Index 0 is the default instrument; a track
/// index is an index into this list.
#[derive(Debug, Clone)]
pub struct InstrumentLib {
    instruments: Vec<Instrument>,
    implicit_default: bool,
}

impl Default for InstrumentLib {
    fn default() -> Self {
        Self::new()
    }
}

impl InstrumentLib {
    /// A library holding only the implicit default ukulele.
    pub fn new() -> Self {
        let ukulele = Instrument {
            name: DEFAULT_INSTRUMENT_NAME.to_string(),
            kind: InstrumentType::Ukulele,
            sound: Sound::Ukulele,
            chord_lib: ChordLib::for_ukulele(),
            custom_tuning: false,
        };
        Self {
            instruments: vec![ukulele],
            implicit_default: true,
        }
    }

    /// Add a declared instrument. The first declaration replaces the implicit default.
    pub fn declare(&mut self, instrument: Instrument) -> Result<usize, SheetError> {
        if self.implicit_default {
            if !self.instruments[0].chord_lib.custom_chords().is_empty() {
                return Err(SheetError::structural(
                    "instruments must be declared before chords are defined",
                ));
            }
            self.instruments.clear();
            self.implicit_default = false;
        }
        if self.index_of(&instrument.name).is_some() {
            return Err(SheetError::structural(format!(
                "instrument {} is declared twice",
                instrument.name
            )));
        }
        self.instruments.push(instrument);
        Ok(self.instruments.len() - 1)
    }

    pub fn is_implicit(&self) -> bool {
        self.implicit_default
    }

    pub fn len(&self) -> usize {
        self.instruments.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instruments.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Instrument> {
        self.instruments.iter()
    }

    pub fn get(&self, index: usize) -> Option<&Instrument> {
        self.instruments.get(index)
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut Instrument> {
        self.instruments.get_mut(index)
    }

    pub fn default_instrument(&self) -> &Instrument {
        &self.instruments[0]
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.instruments.iter().position(|i| i.name == name)
    }

    /// Track index for an optional directive selector; `None` is the default instrument.
    pub fn resolve(&self, selector: Option<&str>) -> Result<usize, SheetError> {
        match selector {
            None => Ok(0),
            Some(name) => self
                .index_of(name)
                .ok_or_else(|| SheetError::lookup("instrument", name)),
        }
    }
}
