//! Song metadata keys and values.
//!
//! The registry is fixed; its order is the order the serializer writes fields in.
//! `key`, `time` and `tempo` have their own grammars and are checked as soon as
//! they are read. Everything else is free text.

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::Serialize;

use crate::error::SheetError;
use crate::signature::{parse_tempo, KeySignature, TimeSignature, DEFAULT_TEMPO};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MetaKey {
    Title,
    SortTitle,
    Subtitle,
    Artist,
    Composer,
    Lyricist,
    Album,
    Year,
    Copyright,
    Key,
    Time,
    Tempo,
    Capo,
    Duration,
}

impl MetaKey {
    pub const ALL: [MetaKey; 14] = [
        MetaKey::Title,
        MetaKey::SortTitle,
        MetaKey::Subtitle,
        MetaKey::Artist,
        MetaKey::Composer,
        MetaKey::Lyricist,
        MetaKey::Album,
        MetaKey::Year,
        MetaKey::Copyright,
        MetaKey::Key,
        MetaKey::Time,
        MetaKey::Tempo,
        MetaKey::Capo,
        MetaKey::Duration,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            MetaKey::Title => "title",
            MetaKey::SortTitle => "sorttitle",
            MetaKey::Subtitle => "subtitle",
            MetaKey::Artist => "artist",
            MetaKey::Composer => "composer",
            MetaKey::Lyricist => "lyricist",
            MetaKey::Album => "album",
            MetaKey::Year => "year",
            MetaKey::Copyright => "copyright",
            MetaKey::Key => "key",
            MetaKey::Time => "time",
            MetaKey::Tempo => "tempo",
            MetaKey::Capo => "capo",
            MetaKey::Duration => "duration",
        }
    }

    /// Keys that change how bars are built. They are inherited by nested parts.
    pub fn is_musical(&self) -> bool {
        matches!(self, MetaKey::Key | MetaKey::Time | MetaKey::Tempo)
    }

    /// Grammar check for a value of this key.
    pub fn validate(&self, value: &str) -> Result<(), SheetError> {
        match self {
            MetaKey::Key => value.parse::<KeySignature>().map(|_| ()),
            MetaKey::Time => value.parse::<TimeSignature>().map(|_| ()),
            MetaKey::Tempo => parse_tempo(value).map(|_| ()),
            _ => Ok(()),
        }
    }
}

impl fmt::Display for MetaKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for MetaKey {
    type Err = SheetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        MetaKey::ALL
            .iter()
            .find(|k| k.name() == s)
            .copied()
            .ok_or_else(|| SheetError::grammar("metadata key", s))
    }
}

/// Map short directive names to their canonical key.
pub fn canonical_key(key: &str) -> &str {
    match key {
        "t" => "title",
        "st" => "subtitle",
        "c" => "comment",
        "soc" => "start_of_chorus",
        "eoc" => "end_of_chorus",
        "sov" => "start_of_verse",
        "eov" => "end_of_verse",
        "sob" => "start_of_bridge",
        "eob" => "end_of_bridge",
        "sot" => "start_of_tab",
        "eot" => "end_of_tab",
        other => other,
    }
}

/// Metadata values in registry order.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    values: BTreeMap<MetaKey, String>,
}

impl Metadata {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: MetaKey) -> Option<&str> {
        self.values.get(&key).map(|s| s.as_str())
    }

    pub fn set(&mut self, key: MetaKey, value: impl Into<String>) -> Result<(), SheetError> {
        let value = value.into();
        key.validate(&value)?;
        self.values.insert(key, value);
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (MetaKey, &str)> {
        self.values.iter().map(|(k, v)| (*k, v.as_str()))
    }

    /// These values layered over `parent`.
    pub fn merged_over(&self, parent: &Metadata) -> Metadata {
        let mut values = parent.values.clone();
        values.extend(self.values.iter().map(|(k, v)| (*k, v.clone())));
        Metadata { values }
    }

    pub fn time(&self) -> TimeSignature {
        self.get(MetaKey::Time)
            .and_then(|v| v.parse().ok())
            .unwrap_or_default()
    }

    pub fn tempo(&self) -> u32 {
        self.get(MetaKey::Tempo)
            .and_then(|v| parse_tempo(v).ok())
            .unwrap_or(DEFAULT_TEMPO)
    }

    pub fn key(&self) -> Option<KeySignature> {
        self.get(MetaKey::Key).and_then(|v| v.parse().ok())
    }
}
