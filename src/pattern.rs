//! Strumming patterns.
//!
//! A pattern is written between bar delimiters, e.g. `|D-du-udu|d-du-udu|`.
//! Every bar must hold the same number of strums, and the strums of a bar must
//! divide its beats into whole ticks.
//!
//! ## Strum symbols
//! | Symbol | Strum |
//! |---|---|
//! | `-` | pause (previous strum keeps ringing) |
//! | `.` | rest (silence) |
//! | `d` / `D` | down stroke / accented down stroke |
//! | `u` / `U` | up stroke / accented up stroke |
//! | `x` | percussive chop |
//! | `a` | arpeggio |
//! | `t` | tremolo |
//! | `1`..`9` | plucked string (1 = lowest string) |
//! | `(134)` | several plucked strings |
//! | `[3 2 - 0]` | tab column, one fret or `-` per string |
//!
//! Tab blocks produce the same kind of pattern from fret rows.

use std::fmt;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::chord_lib::MUTED;
use crate::error::SheetError;
use crate::signature::{TimeSignature, TICKS_PER_BEAT};

static DIRECTIVE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*(?P<name>[^\s|]+)?\s*(?P<strums>\|.*\|)?\s*$").unwrap());

/// One playing action inside a bar.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Strum {
    Pause,
    Rest,
    Down { emphasis: bool },
    Up { emphasis: bool },
    Percussion,
    Arpeggio,
    Tremolo,
    /// Zero-based string indices, lowest string first.
    Pluck(Vec<usize>),
    /// One fret per string, lowest string first; `-1` is not played.
    Tab(Vec<i32>),
}

impl Strum {
    /// Whether the strum starts new notes.
    pub fn is_attack(&self) -> bool {
        !matches!(self, Strum::Pause | Strum::Rest)
    }
}

impl fmt::Display for Strum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Strum::Pause => f.write_str("-"),
            Strum::Rest => f.write_str("."),
            Strum::Down { emphasis: false } => f.write_str("d"),
            Strum::Down { emphasis: true } => f.write_str("D"),
            Strum::Up { emphasis: false } => f.write_str("u"),
            Strum::Up { emphasis: true } => f.write_str("U"),
            Strum::Percussion => f.write_str("x"),
            Strum::Arpeggio => f.write_str("a"),
            Strum::Tremolo => f.write_str("t"),
            Strum::Pluck(strings) if strings.len() == 1 => write!(f, "{}", strings[0] + 1),
            Strum::Pluck(strings) => {
                f.write_str("(")?;
                for s in strings {
                    write!(f, "{}", s + 1)?;
                }
                f.write_str(")")
            }
            Strum::Tab(frets) => {
                let cols: Vec<String> = frets
                    .iter()
                    .map(|fr| {
                        if *fr == MUTED {
                            "-".to_string()
                        } else {
                            fr.to_string()
                        }
                    })
                    .collect();
                write!(f, "[{}]", cols.join(" "))
            }
        }
    }
}

/// An immutable sequence of strums spanning one or more bars.
#[derive(Debug, Clone, PartialEq)]
pub struct Pattern {
    name: Option<String>,
    strums: Vec<Strum>,
    bars: usize,
    time: TimeSignature,
    /// Fret rows (lowest string first) when the pattern came from a tab block.
    tab_rows: Option<Vec<String>>,
}

impl Pattern {
    /// Parse a strum string such as `|d-du|D-du|` under the given time signature.
    pub fn parse(name: Option<String>, text: &str, time: TimeSignature) -> Result<Self, SheetError> {
        let grammar = || SheetError::grammar("pattern", text);
        let body = text.trim();
        if body.len() < 2 || !body.starts_with('|') || !body.ends_with('|') {
            return Err(grammar());
        }

        let mut strums = Vec::new();
        let mut per_bar: Option<usize> = None;
        let mut bars = 0;
        for segment in body[1..body.len() - 1].split('|') {
            let bar = parse_bar(segment).map_err(|_| grammar())?;
            match per_bar {
                None if bar.is_empty() => return Err(grammar()),
                None => per_bar = Some(bar.len()),
                Some(count) if count != bar.len() => {
                    return Err(SheetError::structural(format!(
                        "pattern {} has {} strums in bar {}, expected {}",
                        text.trim(),
                        bar.len(),
                        bars + 1,
                        count
                    )));
                }
                Some(_) => {}
            }
            strums.extend(bar);
            bars += 1;
        }

        Self::new(name, strums, bars, time, None)
    }

    /// Build a pattern from tab rows, lowest string first. Each character of a row
    /// is one column: a fret digit, or `-`/`x` for a string that is not played.
    pub fn from_tab(name: Option<String>, rows: &[String], time: TimeSignature) -> Result<Self, SheetError> {
        let parsed: Vec<Vec<Vec<i32>>> = rows
            .iter()
            .map(|row| parse_tab_row(row))
            .collect::<Result<_, _>>()?;
        let first = parsed
            .first()
            .ok_or_else(|| SheetError::structural("tab block has no rows"))?;
        let bar_lengths: Vec<usize> = first.iter().map(|bar| bar.len()).collect();
        for (i, row) in parsed.iter().enumerate() {
            let lengths: Vec<usize> = row.iter().map(|bar| bar.len()).collect();
            if lengths != bar_lengths {
                return Err(SheetError::structural(format!(
                    "tab row {} does not line up with the first row",
                    i + 1
                )));
            }
        }
        if let Some(count) = bar_lengths.first() {
            if bar_lengths.iter().any(|len| len != count) || *count == 0 {
                return Err(SheetError::structural(
                    "tab bars must all have the same number of columns",
                ));
            }
        }

        let mut strums = Vec::new();
        for (bar, len) in bar_lengths.iter().enumerate() {
            for col in 0..*len {
                let frets: Vec<i32> = parsed.iter().map(|row| row[bar][col]).collect();
                if frets.iter().all(|f| *f == MUTED) {
                    strums.push(Strum::Pause);
                } else {
                    strums.push(Strum::Tab(frets));
                }
            }
        }

        Self::new(name, strums, bar_lengths.len(), time, Some(rows.to_vec()))
    }

    fn new(
        name: Option<String>,
        strums: Vec<Strum>,
        bars: usize,
        time: TimeSignature,
        tab_rows: Option<Vec<String>>,
    ) -> Result<Self, SheetError> {
        if bars == 0 || strums.is_empty() || strums.len() % bars != 0 {
            return Err(SheetError::structural(format!(
                "{} strums cannot be split over {} bars",
                strums.len(),
                bars
            )));
        }
        let per_bar = strums.len() / bars;
        let beats = time.beats as usize;
        if per_bar % beats != 0 || TICKS_PER_BEAT as usize % (per_bar / beats) != 0 {
            return Err(SheetError::structural(format!(
                "{} strums per bar do not fit {} time",
                per_bar, time
            )));
        }
        Ok(Self {
            name,
            strums,
            bars,
            time,
            tab_rows,
        })
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn strums(&self) -> &[Strum] {
        &self.strums
    }

    pub fn bar_count(&self) -> usize {
        self.bars
    }

    pub fn time(&self) -> TimeSignature {
        self.time
    }

    pub fn tab_rows(&self) -> Option<&[String]> {
        self.tab_rows.as_deref()
    }

    pub fn strums_per_bar(&self) -> usize {
        self.strums.len() / self.bars
    }

    /// Length of one strum slot in ticks.
    pub fn ticks_per_strum(&self) -> u32 {
        self.time.bar_ticks() / self.strums_per_bar() as u32
    }

    /// Strums played in the bar with the given repeat index.
    pub fn bar(&self, repeat_idx: usize) -> &[Strum] {
        let per_bar = self.strums_per_bar();
        let start = (repeat_idx % self.bars) * per_bar;
        &self.strums[start..start + per_bar]
    }

    /// Check plucked strings and tab columns against an instrument's string count.
    pub fn check_strings(&self, strings: usize) -> Result<(), SheetError> {
        for strum in &self.strums {
            let fits = match strum {
                Strum::Pluck(indices) => indices.iter().all(|i| *i < strings),
                Strum::Tab(frets) => frets.len() == strings,
                _ => true,
            };
            if !fits {
                return Err(SheetError::structural(format!(
                    "strum {} does not fit an instrument with {} strings",
                    strum, strings
                )));
            }
        }
        Ok(())
    }

    /// The strum string, e.g. `|d-du|D-du|`.
    pub fn strum_text(&self) -> String {
        let mut out = String::from("|");
        for bar in 0..self.bars {
            for strum in self.bar(bar) {
                out.push_str(&strum.to_string());
            }
            out.push('|');
        }
        out
    }

    /// Value of a `{pattern: ...}` directive defining this pattern.
    pub fn directive_value(&self) -> String {
        match &self.name {
            Some(name) => format!("{} {}", name, self.strum_text()),
            None => self.strum_text(),
        }
    }
}

/// Split a pattern directive value into its optional name and strum string.
pub fn split_directive(value: &str) -> Result<(Option<String>, Option<String>), SheetError> {
    let caps = DIRECTIVE_RE
        .captures(value)
        .ok_or_else(|| SheetError::grammar("pattern", value))?;
    let name = caps.name("name").map(|m| m.as_str().to_string());
    let strums = caps.name("strums").map(|m| m.as_str().to_string());
    if name.is_none() && strums.is_none() {
        return Err(SheetError::grammar("pattern", value));
    }
    Ok((name, strums))
}

fn parse_bar(segment: &str) -> Result<Vec<Strum>, SheetError> {
    let bad = |s: &str| SheetError::grammar("strum", s);
    let mut strums = Vec::new();
    let mut chars = segment.char_indices().peekable();
    while let Some((start, c)) = chars.next() {
        let strum = match c {
            ' ' => continue,
            '-' => Strum::Pause,
            '.' => Strum::Rest,
            'd' | 'D' => Strum::Down {
                emphasis: c == 'D',
            },
            'u' | 'U' => Strum::Up {
                emphasis: c == 'U',
            },
            'x' => Strum::Percussion,
            'a' => Strum::Arpeggio,
            't' => Strum::Tremolo,
            '1'..='9' => Strum::Pluck(vec![c as usize - '1' as usize]),
            '(' | '[' => {
                let close = if c == '(' { ')' } else { ']' };
                let end = segment[start..]
                    .find(close)
                    .map(|i| start + i)
                    .ok_or_else(|| bad(&segment[start..]))?;
                let inner = &segment[start + 1..end];
                while chars.peek().map(|(i, _)| *i <= end).unwrap_or(false) {
                    chars.next();
                }
                if c == '(' {
                    parse_pluck_set(inner).ok_or_else(|| bad(&segment[start..=end]))?
                } else {
                    parse_tab_column(inner).ok_or_else(|| bad(&segment[start..=end]))?
                }
            }
            _ => return Err(bad(&segment[start..])),
        };
        strums.push(strum);
    }
    Ok(strums)
}

fn parse_pluck_set(inner: &str) -> Option<Strum> {
    let strings: Vec<usize> = inner
        .chars()
        .map(|c| match c {
            '1'..='9' => Some(c as usize - '1' as usize),
            _ => None,
        })
        .collect::<Option<_>>()?;
    if strings.is_empty() {
        return None;
    }
    Some(Strum::Pluck(strings))
}

fn parse_tab_column(inner: &str) -> Option<Strum> {
    let frets: Vec<i32> = inner
        .split_whitespace()
        .map(|v| match v {
            "-" => Some(MUTED),
            _ => v.parse::<i32>().ok().filter(|f| *f >= 0),
        })
        .collect::<Option<_>>()?;
    if frets.is_empty() {
        return None;
    }
    if frets.iter().all(|f| *f == MUTED) {
        return Some(Strum::Pause);
    }
    Some(Strum::Tab(frets))
}

/// One tab row split into bars of fret columns.
fn parse_tab_row(row: &str) -> Result<Vec<Vec<i32>>, SheetError> {
    let compact: String = row.chars().filter(|c| *c != ' ').collect();
    let bars: Vec<Vec<i32>> = compact
        .split('|')
        .filter(|bar| !bar.is_empty())
        .map(|bar| {
            bar.chars()
                .map(|c| match c {
                    '-' | 'x' => Ok(MUTED),
                    _ => c
                        .to_digit(10)
                        .map(|d| d as i32)
                        .ok_or_else(|| SheetError::grammar("tab line", row)),
                })
                .collect()
        })
        .collect::<Result<_, _>>()?;
    if bars.is_empty() {
        return Err(SheetError::grammar("tab line", row));
    }
    Ok(bars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn four_four() -> TimeSignature {
        TimeSignature::default()
    }

    #[test]
    fn test_parse_simple_pattern() {
        let p = Pattern::parse(None, "|d-du|", four_four()).unwrap();
        assert_eq!(p.bar_count(), 1);
        assert_eq!(p.strums_per_bar(), 4);
        assert_eq!(p.ticks_per_strum(), 24);
        assert_eq!(
            p.strums(),
            &[
                Strum::Down { emphasis: false },
                Strum::Pause,
                Strum::Down { emphasis: false },
                Strum::Up { emphasis: false },
            ]
        );
    }

    #[test]
    fn test_all_strum_symbols() {
        let p = Pattern::parse(None, "|-.dDuUxat1(23)[0 - 2 3]|", four_four()).unwrap();
        assert_eq!(p.strums_per_bar(), 12);
        assert_eq!(p.strums()[9], Strum::Pluck(vec![0]));
        assert_eq!(p.strums()[10], Strum::Pluck(vec![1, 2]));
        assert_eq!(p.strums()[11], Strum::Tab(vec![0, -1, 2, 3]));
        assert_eq!(p.strum_text(), "|-.dDuUxat1(23)[0 - 2 3]|");
    }

    #[test]
    fn test_bar_consistency() {
        assert!(Pattern::parse(None, "|d-du|d-du|", four_four()).is_ok());
        let err = Pattern::parse(None, "|d-du|d-d|", four_four()).unwrap_err();
        assert!(matches!(err, SheetError::StructuralError { .. }));
    }

    #[test]
    fn test_strums_must_fit_beats() {
        // 3 strums over 4 beats
        assert!(Pattern::parse(None, "|d-d|", four_four()).is_err());
        // 20 strums per bar: 5 per beat does not divide 24
        assert!(Pattern::parse(None, "|dudududududududududu|", four_four()).is_err());
        // 6 per bar in 3/4
        assert!(Pattern::parse(None, "|d-dudu|", TimeSignature::new(3, 4)).is_ok());
    }

    #[test]
    fn test_grammar_errors() {
        assert!(Pattern::parse(None, "d-du", four_four()).is_err());
        assert!(Pattern::parse(None, "|d-dq|", four_four()).is_err());
        assert!(Pattern::parse(None, "||", four_four()).is_err());
        assert!(Pattern::parse(None, "|d(12|", four_four()).is_err());
    }

    #[test]
    fn test_bar_by_repeat_index() {
        let p = Pattern::parse(None, "|dddd|uuuu|", four_four()).unwrap();
        assert_eq!(p.bar(0)[0], Strum::Down { emphasis: false });
        assert_eq!(p.bar(1)[0], Strum::Up { emphasis: false });
        assert_eq!(p.bar(2)[0], Strum::Down { emphasis: false });
    }

    #[test]
    fn test_split_directive() {
        assert_eq!(
            split_directive("verse |d-du|").unwrap(),
            (Some("verse".to_string()), Some("|d-du|".to_string()))
        );
        assert_eq!(split_directive("verse").unwrap(), (Some("verse".to_string()), None));
        assert_eq!(split_directive("|d-du|").unwrap(), (None, Some("|d-du|".to_string())));
        assert!(split_directive("  ").is_err());
        assert!(split_directive("a b").is_err());
    }

    #[test]
    fn test_from_tab() {
        let rows: Vec<String> = ["|0-2-|", "|--0-|", "|----|", "|---3|"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let p = Pattern::from_tab(Some("intro".to_string()), &rows, four_four()).unwrap();
        assert_eq!(p.strums_per_bar(), 4);
        assert_eq!(p.strums()[0], Strum::Tab(vec![0, -1, -1, -1]));
        assert_eq!(p.strums()[1], Strum::Pause);
        assert_eq!(p.strums()[2], Strum::Tab(vec![2, 0, -1, -1]));
        assert!(p.check_strings(4).is_ok());
        assert!(p.check_strings(6).is_err());
        assert_eq!(p.tab_rows().map(|r| r.len()), Some(4));
    }

    #[test]
    fn test_from_tab_rows_must_align() {
        let rows: Vec<String> = ["|0-2-|", "|--0|"].iter().map(|s| s.to_string()).collect();
        assert!(Pattern::from_tab(None, &rows, four_four()).is_err());
    }

    #[test]
    fn test_check_strings_for_plucks() {
        let p = Pattern::parse(None, "|1234|", four_four()).unwrap();
        assert!(p.check_strings(4).is_ok());
        assert!(p.check_strings(3).is_err());
    }
}
