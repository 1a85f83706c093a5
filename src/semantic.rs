//! # Semantic Validation Module
//!
//! Re-checks a parsed song for musical consistency.
//!
//! ## Purpose
//! The builder enforces the bar invariants while parsing, but a [`Song`] can
//! also be assembled or edited in code. This module checks the same rules on a
//! finished song:
//! - Every bar's parallel arrays have matching lengths
//! - Every bar's beats add up to its time signature
//! - Every pattern a bar uses is written in the bar's time signature
//!
//! ## Validation Rules
//!
//! ### Bar Duration
//! - Sum of onset beats equals the time signature's beat count
//! - Compared with a tolerance of one tick (1/24 of a beat)
//!
//! ### Tracks
//! - `patterns` and `pattern_idxs` have one entry per track
//!
//! ## Entry Point
//! `validate(song: &Song) -> Result<(), SheetError>`
//!
//! ## Example
//! ```rust
//! use chordsheet::{parse, validate};
//!
//! let song = parse("[C][G.][Am...]")?;
//! validate(&song)?;
//! # Ok::<(), chordsheet::SheetError>(())
//! ```

use crate::bar::Bar;
use crate::error::SheetError;
use crate::signature::TICKS_PER_BEAT;
use crate::song::Song;

/// Allowed drift between a bar's beat sum and its time signature.
const BEAT_TOLERANCE: f64 = 1.0 / TICKS_PER_BEAT as f64;

/// Validate every bar of a song.
///
/// Bars are numbered from 1 in playing order in error messages.
pub fn validate(song: &Song) -> Result<(), SheetError> {
    for (i, bar) in song.bars().enumerate() {
        validate_bar(bar, i + 1)?;
    }
    Ok(())
}

fn validate_bar(bar: &Bar, number: usize) -> Result<(), SheetError> {
    let onsets = bar.chords.len();
    if bar.beats.len() != onsets || bar.ticks.len() != onsets || bar.lyrics.len() != onsets {
        return Err(SheetError::structural(format!(
            "bar {} has {} chords, {} durations and {} lyrics",
            number,
            onsets,
            bar.beats.len(),
            bar.lyrics.len()
        )));
    }
    if bar.patterns.len() != bar.pattern_idxs.len() {
        return Err(SheetError::structural(format!(
            "bar {} has {} patterns but {} repeat indexes",
            number,
            bar.patterns.len(),
            bar.pattern_idxs.len()
        )));
    }

    let expected = bar.time.beats as f64;
    let actual = bar.total_beats();
    if (actual - expected).abs() > BEAT_TOLERANCE {
        return Err(SheetError::structural(format!(
            "beats don't add up: bar {} has {} beats, expected {} ({})",
            number, actual, expected, bar.time
        )));
    }

    for pattern in bar.patterns.iter().flatten() {
        if pattern.time() != bar.time {
            return Err(SheetError::structural(format!(
                "bar {} is in {} but its pattern is in {}",
                number,
                bar.time,
                pattern.time()
            )));
        }
    }
    Ok(())
}
