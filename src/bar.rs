//! Bars and bar paragraphs.
//!
//! A [`Bar`] is a set of parallel arrays: one entry per chord onset in
//! `chords`, `beats`, `ticks` and `lyrics`, and one entry per instrument track in
//! `patterns` and `pattern_idxs`. Bars are built by [`crate::builder::BarBuilder`],
//! which guarantees the beat sum; the type itself does not re-check it.

use std::sync::Arc;

use crate::chord::Chord;
use crate::pattern::{Pattern, Strum};
use crate::signature::{TimeSignature, TICKS_PER_BEAT};

#[derive(Debug, Clone, PartialEq)]
pub struct Bar {
    /// Chord per onset. `None` means the previous chord keeps sounding.
    pub chords: Vec<Option<Chord>>,
    /// Duration of each onset in beats.
    pub beats: Vec<f64>,
    /// Duration of each onset in ticks.
    pub ticks: Vec<u32>,
    /// Lyric sung from each onset; line breaks are kept as `\n`.
    pub lyrics: Vec<String>,
    /// Pickup lyric sung before the first beat.
    pub anacrusis: Option<String>,
    /// Active pattern per instrument track.
    pub patterns: Vec<Option<Arc<Pattern>>>,
    /// Which repetition of its pattern each track plays in this bar.
    pub pattern_idxs: Vec<usize>,
    pub time: TimeSignature,
    pub tempo: u32,
    /// Key change written inside a part, taking effect from this bar.
    pub key: Option<String>,
}

impl Bar {
    pub fn new(time: TimeSignature, tempo: u32) -> Self {
        Self {
            chords: Vec::new(),
            beats: Vec::new(),
            ticks: Vec::new(),
            lyrics: Vec::new(),
            anacrusis: None,
            patterns: Vec::new(),
            pattern_idxs: Vec::new(),
            time,
            tempo,
            key: None,
        }
    }

    pub(crate) fn push_onset(&mut self, chord: Option<Chord>, ticks: u32) {
        self.chords.push(chord);
        self.ticks.push(ticks);
        self.beats.push(ticks as f64 / TICKS_PER_BEAT as f64);
        self.lyrics.push(String::new());
    }

    pub(crate) fn extend_last_onset(&mut self, ticks: u32) {
        if let (Some(t), Some(b)) = (self.ticks.last_mut(), self.beats.last_mut()) {
            *t += ticks;
            *b = *t as f64 / TICKS_PER_BEAT as f64;
        }
    }

    pub fn onset_count(&self) -> usize {
        self.chords.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chords.is_empty()
    }

    pub fn total_ticks(&self) -> u32 {
        self.ticks.iter().sum()
    }

    pub fn total_beats(&self) -> f64 {
        self.beats.iter().sum()
    }

    /// Start of each onset, in ticks from the bar start.
    pub fn onset_ticks(&self) -> Vec<u32> {
        self.ticks
            .iter()
            .scan(0, |acc, t| {
                let start = *acc;
                *acc += t;
                Some(start)
            })
            .collect()
    }

    pub fn duration_secs(&self) -> f64 {
        self.time.beats as f64 * 60.0 / self.tempo as f64
    }

    /// Pattern and repeat index for a track, if the track has a pattern here.
    pub fn pattern(&self, track: usize) -> Option<(&Arc<Pattern>, usize)> {
        let pattern = self.patterns.get(track)?.as_ref()?;
        let idx = self.pattern_idxs.get(track).copied().unwrap_or(0);
        Some((pattern, idx))
    }

    /// Strums a track plays in this bar.
    pub fn strums(&self, track: usize) -> Option<&[Strum]> {
        self.pattern(track).map(|(p, idx)| p.bar(idx))
    }

    /// Whether an instrument track sounds in this bar. Bars built before any
    /// pattern was set count as played by the default instrument.
    pub fn is_played_by(&self, track: usize) -> bool {
        if self.patterns.is_empty() {
            return track == 0;
        }
        matches!(self.patterns.get(track), Some(Some(_)))
    }

    /// Lyrics of the whole bar, anacrusis first.
    pub fn text(&self) -> String {
        let mut out = self.anacrusis.clone().unwrap_or_default();
        for lyric in &self.lyrics {
            out.push_str(lyric);
        }
        out
    }
}

/// Bars that render as one block.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BarParagraph {
    pub bars: Vec<Bar>,
}

impl BarParagraph {
    pub fn new(bars: Vec<Bar>) -> Self {
        Self { bars }
    }

    pub fn len(&self) -> usize {
        self.bars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bars.is_empty()
    }
}
