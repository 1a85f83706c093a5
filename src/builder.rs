//! Bar and paragraph builder.
//!
//! The builder is a small state machine fed one musical event at a time:
//!
//! - **accumulating**: chord onsets fill the open bar until its beat count is reached.
//! - **bar-closed**: a full bar is emitted into the current paragraph and every
//!   track's repeat index advances. A full bar is held open until the next chord
//!   arrives so that trailing lyrics still attach to its last onset.
//! - **paragraph-closed**: on a paragraph break, a pattern switch or a
//!   metadata change, the paragraph's bars are moved to the output.
//!
//! Lyrics before the first chord of a paragraph become the anacrusis of its
//! first bar. A key change is held the same way and lands on the next bar.

use std::sync::Arc;

use crate::bar::{Bar, BarParagraph};
use crate::chord::ChordSymbol;
use crate::error::SheetError;
use crate::pattern::Pattern;
use crate::signature::{TimeSignature, DEFAULT_TEMPO, TICKS_PER_BEAT};

fn beats(ticks: u32) -> f64 {
    ticks as f64 / TICKS_PER_BEAT as f64
}

#[derive(Debug)]
pub struct BarBuilder {
    time: TimeSignature,
    tempo: u32,
    tracks: Vec<Option<Arc<Pattern>>>,
    repeat_idxs: Vec<usize>,
    track_count: Option<usize>,
    open: Bar,
    filled: u32,
    pending_anacrusis: Option<String>,
    paragraph_anacrusis: bool,
    pending_key: Option<String>,
    bars: Vec<Bar>,
    done: Vec<BarParagraph>,
    bars_closed: usize,
}

impl Default for BarBuilder {
    fn default() -> Self {
        Self::new(TimeSignature::default(), DEFAULT_TEMPO)
    }
}

impl BarBuilder {
    pub fn new(time: TimeSignature, tempo: u32) -> Self {
        Self {
            time,
            tempo,
            tracks: Vec::new(),
            repeat_idxs: Vec::new(),
            track_count: None,
            open: Bar::new(time, tempo),
            filled: 0,
            pending_anacrusis: None,
            paragraph_anacrusis: false,
            pending_key: None,
            bars: Vec::new(),
            done: Vec::new(),
            bars_closed: 0,
        }
    }

    pub fn time(&self) -> TimeSignature {
        self.time
    }

    pub fn tempo(&self) -> u32 {
        self.tempo
    }

    pub fn track_count(&self) -> Option<usize> {
        self.track_count
    }

    /// Active pattern of a track.
    pub fn pattern(&self, track: usize) -> Option<&Arc<Pattern>> {
        self.tracks.get(track).and_then(|p| p.as_ref())
    }

    /// Whether a bar is partly filled.
    pub fn is_mid_bar(&self) -> bool {
        !self.open.is_empty() && self.filled < self.time.bar_ticks()
    }

    fn current_bar_number(&self) -> usize {
        self.bars_closed + 1
    }

    pub fn chord(&mut self, symbol: ChordSymbol) -> Result<(), SheetError> {
        if !self.open.is_empty() && self.filled == self.time.bar_ticks() {
            self.close_bar()?;
        }

        let bar_ticks = self.time.bar_ticks();
        let remaining = bar_ticks - self.filled;
        let ticks = symbol.ticks.unwrap_or(remaining);
        if ticks > remaining {
            return Err(SheetError::structural(format!(
                "beats don't add up: bar {} has {} beats left, [{}] needs {}",
                self.current_bar_number(),
                beats(remaining),
                symbol.render(),
                beats(ticks)
            )));
        }

        if symbol.chord.is_none() && !self.open.is_empty() {
            self.open.extend_last_onset(ticks);
        } else {
            if self.open.is_empty() {
                if let Some(anacrusis) = self.pending_anacrusis.take() {
                    self.open.anacrusis = Some(anacrusis);
                    self.paragraph_anacrusis = true;
                }
                if let Some(key) = self.pending_key.take() {
                    self.open.key = Some(key);
                }
            }
            self.open.push_onset(symbol.chord, ticks);
        }
        self.filled += ticks;
        Ok(())
    }

    pub fn text(&mut self, text: &str) -> Result<(), SheetError> {
        if let Some(lyric) = self.open.lyrics.last_mut() {
            lyric.push_str(text);
            return Ok(());
        }
        if self.paragraph_anacrusis || !self.bars.is_empty() {
            return Err(SheetError::structural(format!(
                "only one anacrusis is allowed per paragraph, found '{}'",
                text
            )));
        }
        self.pending_anacrusis
            .get_or_insert_with(String::new)
            .push_str(text);
        Ok(())
    }

    pub fn line_break(&mut self) {
        if let Some(lyric) = self.open.lyrics.last_mut() {
            lyric.push('\n');
        } else if let Some(anacrusis) = self.pending_anacrusis.as_mut() {
            anacrusis.push('\n');
        }
    }

    fn close_bar(&mut self) -> Result<(), SheetError> {
        let bar_ticks = self.time.bar_ticks();
        if self.filled != bar_ticks {
            return Err(SheetError::structural(format!(
                "beats don't add up: bar {} has {} of {} beats",
                self.current_bar_number(),
                beats(self.filled),
                self.time.beats
            )));
        }
        if let Some(pattern) = self.tracks.iter().flatten().find(|p| p.time() != self.time) {
            return Err(SheetError::structural(format!(
                "pattern {} is in {} but bar {} is in {}",
                pattern.name().unwrap_or("(anonymous)"),
                pattern.time(),
                self.current_bar_number(),
                self.time
            )));
        }

        let mut bar = std::mem::replace(&mut self.open, Bar::new(self.time, self.tempo));
        bar.patterns = self.tracks.clone();
        bar.pattern_idxs = self.repeat_idxs.clone();
        for (idx, pattern) in self.repeat_idxs.iter_mut().zip(&self.tracks) {
            if pattern.is_some() {
                *idx += 1;
            }
        }
        self.bars.push(bar);
        self.filled = 0;
        self.bars_closed += 1;
        Ok(())
    }

    /// Close the current paragraph. Fails on a partly filled bar or a dangling anacrusis.
    pub fn close_paragraph(&mut self) -> Result<(), SheetError> {
        if !self.open.is_empty() {
            if self.filled < self.time.bar_ticks() {
                return Err(SheetError::structural(format!(
                    "beats don't add up: bar {} is incomplete ({} of {} beats)",
                    self.current_bar_number(),
                    beats(self.filled),
                    self.time.beats
                )));
            }
            self.close_bar()?;
        }
        if let Some(anacrusis) = self.pending_anacrusis.take() {
            if !anacrusis.trim().is_empty() {
                return Err(SheetError::structural(format!(
                    "anacrusis '{}' has no bar",
                    anacrusis.trim_end()
                )));
            }
        }
        self.paragraph_anacrusis = false;

        if self.bars.is_empty() {
            return Ok(());
        }
        let mut bars = std::mem::take(&mut self.bars);
        if let Some(last) = bars.last_mut() {
            if let Some(lyric) = last.lyrics.last_mut() {
                let trimmed = lyric.trim_end_matches('\n').len();
                lyric.truncate(trimmed);
            }
        }
        self.done.push(BarParagraph::new(bars));
        Ok(())
    }

    fn at_boundary(&self, what: &str) -> Result<(), SheetError> {
        if self.is_mid_bar() {
            return Err(SheetError::structural(format!(
                "{} can only change at a bar boundary (bar {})",
                what,
                self.current_bar_number()
            )));
        }
        Ok(())
    }

    /// Switch a track's pattern. `track_count` is the number of instruments.
    pub fn switch_pattern(
        &mut self,
        track: usize,
        pattern: Arc<Pattern>,
        track_count: usize,
    ) -> Result<(), SheetError> {
        self.at_boundary("pattern")?;
        self.close_paragraph()?;
        match self.track_count {
            None => {
                self.track_count = Some(track_count);
                self.tracks = vec![None; track_count];
                self.repeat_idxs = vec![0; track_count];
            }
            Some(count) if count != track_count => {
                return Err(SheetError::structural(format!(
                    "track count changed from {} to {}",
                    count, track_count
                )));
            }
            Some(_) => {}
        }
        if track >= track_count {
            return Err(SheetError::structural(format!(
                "track {} out of range for {} instruments",
                track, track_count
            )));
        }
        self.tracks[track] = Some(pattern);
        self.repeat_idxs[track] = 0;
        Ok(())
    }

    pub fn set_time(&mut self, time: TimeSignature) -> Result<(), SheetError> {
        if time == self.time {
            return Ok(());
        }
        self.at_boundary("time signature")?;
        self.close_paragraph()?;
        self.time = time;
        self.open = Bar::new(self.time, self.tempo);
        Ok(())
    }

    pub fn set_tempo(&mut self, tempo: u32) -> Result<(), SheetError> {
        if tempo == self.tempo {
            return Ok(());
        }
        self.at_boundary("tempo")?;
        self.close_paragraph()?;
        self.tempo = tempo;
        self.open = Bar::new(self.time, self.tempo);
        Ok(())
    }

    /// Change key at a bar boundary. The next bar records the change.
    pub fn change_key(&mut self, key: &str) -> Result<(), SheetError> {
        self.at_boundary("key")?;
        self.close_paragraph()?;
        self.pending_key = Some(key.to_string());
        Ok(())
    }

    /// A key change that no bar has picked up yet.
    pub fn take_pending_key(&mut self) -> Option<String> {
        self.pending_key.take()
    }

    /// Paragraphs completed since the last call.
    pub fn take_paragraphs(&mut self) -> Vec<BarParagraph> {
        std::mem::take(&mut self.done)
    }

    /// Close everything and return the remaining paragraphs.
    pub fn finish(&mut self) -> Result<Vec<BarParagraph>, SheetError> {
        self.close_paragraph()?;
        Ok(self.take_paragraphs())
    }
}
