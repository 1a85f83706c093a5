//! The song model: parts, paragraphs and the top-level [`Song`].

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use crate::bar::{Bar, BarParagraph};
use crate::chord::Chord;
use crate::error::SheetError;
use crate::instrument::InstrumentLib;
use crate::metadata::Metadata;
use crate::pattern::Pattern;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PartKind {
    /// Content outside any part environment.
    None,
    Song,
    Verse,
    Chorus,
    Bridge,
}

impl PartKind {
    /// Environment name, e.g. `verse` for `{start_of_verse}`.
    pub fn environment(&self) -> Option<&'static str> {
        match self {
            PartKind::None => None,
            PartKind::Song => Some("song"),
            PartKind::Verse => Some("verse"),
            PartKind::Chorus => Some("chorus"),
            PartKind::Bridge => Some("bridge"),
        }
    }
}

impl fmt::Display for PartKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.environment().unwrap_or("none"))
    }
}

impl FromStr for PartKind {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "song" => Ok(PartKind::Song),
            "verse" => Ok(PartKind::Verse),
            "chorus" => Ok(PartKind::Chorus),
            "bridge" => Ok(PartKind::Bridge),
            _ => Err(SheetError::grammar("part", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PartContent {
    Paragraph(BarParagraph),
    Part(SongPart),
}

#[derive(Debug, Clone, PartialEq)]
pub struct SongPart {
    pub kind: PartKind,
    pub label: Option<String>,
    /// Values set by the part itself.
    pub metadata: Metadata,
    /// Values in effect where the part starts.
    pub inherited: Metadata,
    pub content: Vec<PartContent>,
    /// Set when the part sits directly inside a part of the same kind.
    pub nested_same_kind: bool,
}

impl SongPart {
    pub fn new(kind: PartKind, label: Option<String>, inherited: Metadata) -> Self {
        Self {
            kind,
            label,
            metadata: Metadata::new(),
            inherited,
            content: Vec::new(),
            nested_same_kind: false,
        }
    }

    /// Own values layered over the inherited ones.
    pub fn effective_metadata(&self) -> Metadata {
        self.metadata.merged_over(&self.inherited)
    }

    /// Paragraphs of this part and its nested parts, in order.
    pub fn paragraphs<'a>(&'a self) -> Box<dyn Iterator<Item = &'a BarParagraph> + 'a> {
        Box::new(self.content.iter().flat_map(|c| match c {
            PartContent::Paragraph(p) => {
                Box::new(std::iter::once(p)) as Box<dyn Iterator<Item = &'a BarParagraph> + 'a>
            }
            PartContent::Part(part) => part.paragraphs(),
        }))
    }

    pub fn bars<'a>(&'a self) -> impl Iterator<Item = &'a Bar> + 'a {
        self.paragraphs().flat_map(|p| p.bars.iter())
    }

    pub fn is_empty(&self) -> bool {
        self.content.is_empty()
    }
}

/// A parsed song: metadata, instruments and parts.
#[derive(Debug, Clone)]
pub struct Song {
    pub metadata: Metadata,
    pub instruments: InstrumentLib,
    pub parts: Vec<SongPart>,
}

impl Song {
    pub fn new(metadata: Metadata, instruments: InstrumentLib, parts: Vec<SongPart>) -> Self {
        Self {
            metadata,
            instruments,
            parts,
        }
    }

    pub fn title(&self) -> Option<&str> {
        self.metadata.get(crate::metadata::MetaKey::Title)
    }

    pub fn artist(&self) -> Option<&str> {
        self.metadata.get(crate::metadata::MetaKey::Artist)
    }

    /// Song-level tempo (bars may override it).
    pub fn tempo(&self) -> u32 {
        self.metadata.tempo()
    }

    pub fn paragraphs(&self) -> impl Iterator<Item = &BarParagraph> {
        self.parts.iter().flat_map(|p| p.paragraphs())
    }

    /// Every bar in playing order.
    pub fn bars(&self) -> impl Iterator<Item = &Bar> {
        self.paragraphs().flat_map(|p| p.bars.iter())
    }

    /// Total playing time in seconds.
    pub fn duration_secs(&self) -> f64 {
        self.bars().map(|b| b.duration_secs()).sum()
    }

    /// Distinct chords of the bars an instrument plays, sorted by name.
    pub fn used_chords(&self, instrument: usize) -> Vec<Chord> {
        let mut chords: Vec<Chord> = Vec::new();
        for bar in self.bars().filter(|b| b.is_played_by(instrument)) {
            for chord in bar.chords.iter().flatten() {
                if !chords.contains(chord) {
                    chords.push(*chord);
                }
            }
        }
        chords.sort_by_key(|c| c.name());
        chords
    }

    /// Distinct pattern instances an instrument plays, in order of first use.
    pub fn used_patterns(&self, instrument: usize) -> Vec<Arc<Pattern>> {
        let mut patterns: Vec<Arc<Pattern>> = Vec::new();
        for bar in self.bars() {
            if let Some((pattern, _)) = bar.pattern(instrument) {
                if !patterns.iter().any(|p| Arc::ptr_eq(p, pattern)) {
                    patterns.push(Arc::clone(pattern));
                }
            }
        }
        patterns
    }
}
