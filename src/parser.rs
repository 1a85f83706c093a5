//! Song assembly: token tree to [`Song`].
//!
//! Walks the tree produced by the tokenizer. Part environments recurse into
//! nested [`SongPart`]s, `pattern`/`instrument`/`chord` directives update the
//! shared instrument library, and chords, lyrics and breaks feed one
//! [`BarBuilder`] that lives for the whole song, so active patterns carry
//! across part boundaries.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::builder::BarBuilder;
use crate::chord::ChordSymbol;
use crate::error::SheetError;
use crate::instrument::{Instrument, InstrumentLib};
use crate::lexer::{parse_chord_definition, tokenize, LocatedToken, Token, TAB_ENVIRONMENT};
use crate::metadata::{MetaKey, Metadata};
use crate::pattern::{split_directive, Pattern};
use crate::song::{PartContent, PartKind, Song, SongPart};
use crate::signature::parse_tempo;

/// Parse song sheet text into a [`Song`].
pub fn parse(source: &str) -> Result<Song, SheetError> {
    let root = tokenize(source)?;
    assemble(&root)
}

/// Build a [`Song`] from a root token produced by [`tokenize`].
pub fn assemble(root: &LocatedToken) -> Result<Song, SheetError> {
    let mut assembler = Assembler::new();
    assembler.root(root.children())?;
    Ok(Song::new(
        assembler.song_meta,
        assembler.instruments,
        assembler.parts,
    ))
}

/// A part being assembled.
struct Frame {
    part: SongPart,
    has_content: bool,
    line_has_music: bool,
}

impl Frame {
    fn new(kind: PartKind, label: Option<String>, inherited: Metadata) -> Self {
        Self {
            part: SongPart::new(kind, label, inherited),
            has_content: false,
            line_has_music: false,
        }
    }
}

struct Assembler {
    song_meta: Metadata,
    instruments: InstrumentLib,
    patterns: HashMap<String, Arc<Pattern>>,
    builder: BarBuilder,
    parts: Vec<SongPart>,
    /// Song metadata plus root-level changes made between parts.
    root_meta: Metadata,
    started: bool,
}

impl Assembler {
    fn new() -> Self {
        Self {
            song_meta: Metadata::new(),
            instruments: InstrumentLib::new(),
            patterns: HashMap::new(),
            builder: BarBuilder::default(),
            parts: Vec::new(),
            root_meta: Metadata::new(),
            started: false,
        }
    }

    fn root(&mut self, children: &[LocatedToken]) -> Result<(), SheetError> {
        let mut implicit: Option<Frame> = None;

        for tok in children {
            let located = |e: SheetError| e.at(tok.line, tok.column);
            match &tok.token {
                Token::Metadata { key, value } if !self.started => {
                    self.song_meta.set(*key, value.trim()).map_err(located)?;
                    self.root_meta = self.song_meta.clone();
                    self.apply_musical(*key, value.trim()).map_err(located)?;
                }
                Token::Environment { name, label, children } if name != TAB_ENVIRONMENT => {
                    let kind: PartKind = name.parse().map_err(located)?;
                    if let Some(frame) = implicit.take() {
                        self.close_frame(frame).map_err(located)?;
                    }
                    self.started = true;
                    let part = self
                        .part(kind, label.clone(), self.root_meta.clone(), children, None)
                        .map_err(located)?;
                    self.parts.push(part);
                }
                Token::Directive { .. } => {
                    match implicit.as_mut() {
                        Some(frame) => self.token(frame, tok)?,
                        None => self.directive(tok)?,
                    }
                }
                Token::LineBreak | Token::ParagraphBreak | Token::Comment(_) if implicit.is_none() => {}
                Token::EndOfEnvironment(_) => {}
                _ => {
                    self.started = true;
                    let frame = implicit.get_or_insert_with(|| {
                        Frame::new(PartKind::None, None, self.root_meta.clone())
                    });
                    self.token(frame, tok)?;
                }
            }
        }

        if let Some(frame) = implicit.take() {
            let (line, column) = children
                .last()
                .map(|t| (t.line, t.column))
                .unwrap_or((1, 1));
            self.close_frame(frame).map_err(|e| e.at(line, column))?;
        }
        Ok(())
    }

    /// Finish an implicit root-level part.
    fn close_frame(&mut self, mut frame: Frame) -> Result<(), SheetError> {
        self.builder.close_paragraph()?;
        self.drain(&mut frame);
        self.drop_trailing_key(frame.part.kind);
        self.root_meta = frame.part.metadata.merged_over(&self.root_meta);
        if !frame.part.is_empty() || !frame.part.metadata.is_empty() {
            self.parts.push(frame.part);
        }
        Ok(())
    }

    fn part(
        &mut self,
        kind: PartKind,
        label: Option<String>,
        inherited: Metadata,
        children: &[LocatedToken],
        parent_kind: Option<PartKind>,
    ) -> Result<SongPart, SheetError> {
        self.builder.close_paragraph()?;
        let saved = (self.builder.time(), self.builder.tempo());

        let mut frame = Frame::new(kind, label, inherited);
        if parent_kind == Some(kind) {
            warn!(part = %kind, "part nested inside a part of the same kind");
            frame.part.nested_same_kind = true;
        }
        debug!(part = %kind, label = ?frame.part.label, "assembling part");

        for tok in children {
            self.token(&mut frame, tok)?;
        }

        let end = children.last().map(|t| (t.line, t.column)).unwrap_or((1, 1));
        self.builder
            .close_paragraph()
            .map_err(|e| e.at(end.0, end.1))?;
        self.drain(&mut frame);
        self.drop_trailing_key(kind);
        self.builder.set_time(saved.0)?;
        self.builder.set_tempo(saved.1)?;
        Ok(frame.part)
    }

    /// A key change must not leak out of the part it was written in.
    fn drop_trailing_key(&mut self, kind: PartKind) {
        if let Some(key) = self.builder.take_pending_key() {
            warn!(part = %kind, key = %key, "key change at the end of a part has no bars");
        }
    }

    fn drain(&mut self, frame: &mut Frame) {
        for paragraph in self.builder.take_paragraphs() {
            frame.part.content.push(PartContent::Paragraph(paragraph));
        }
    }

    /// Handle one token inside a part.
    fn token(&mut self, frame: &mut Frame, tok: &LocatedToken) -> Result<(), SheetError> {
        let located = |e: SheetError| e.at(tok.line, tok.column);
        match &tok.token {
            Token::Text(text) => {
                self.builder.text(text).map_err(located)?;
                frame.has_content = true;
                frame.line_has_music = true;
            }
            Token::ChordRef(body) => {
                let symbol = ChordSymbol::parse(body).map_err(located)?;
                self.builder.chord(symbol).map_err(located)?;
                frame.has_content = true;
                frame.line_has_music = true;
            }
            Token::LineBreak => {
                if frame.line_has_music {
                    self.builder.line_break();
                }
                frame.line_has_music = false;
            }
            Token::ParagraphBreak => {
                self.builder.close_paragraph().map_err(located)?;
                frame.line_has_music = false;
            }
            Token::Metadata { key, value } => {
                let value = value.trim();
                if !frame.has_content {
                    frame.part.metadata.set(*key, value).map_err(located)?;
                    self.apply_musical(*key, value).map_err(located)?;
                } else if key.is_musical() {
                    if *key == MetaKey::Key {
                        key.validate(value).map_err(located)?;
                        self.builder.change_key(value).map_err(located)?;
                    } else {
                        self.apply_musical(*key, value).map_err(located)?;
                    }
                } else {
                    frame.part.metadata.set(*key, value).map_err(located)?;
                }
            }
            Token::Environment { name, children, .. } if name == TAB_ENVIRONMENT => {
                self.tab(tok, children).map_err(located)?;
            }
            Token::Environment { name, label, children } => {
                let kind: PartKind = name.parse().map_err(located)?;
                self.builder.close_paragraph().map_err(located)?;
                self.drain(frame);
                let inherited = frame.part.effective_metadata();
                let nested = self
                    .part(kind, label.clone(), inherited, children, Some(frame.part.kind))
                    .map_err(located)?;
                frame.part.content.push(PartContent::Part(nested));
                frame.has_content = true;
            }
            Token::Directive { .. } => self.directive(tok)?,
            Token::EndOfEnvironment(_) | Token::Comment(_) | Token::TabLine(_) => {}
        }
        self.drain(frame);
        Ok(())
    }

    fn apply_musical(&mut self, key: MetaKey, value: &str) -> Result<(), SheetError> {
        match key {
            MetaKey::Time => self.builder.set_time(value.parse()?),
            MetaKey::Tempo => self.builder.set_tempo(parse_tempo(value)?),
            _ => Ok(()),
        }
    }

    fn directive(&mut self, tok: &LocatedToken) -> Result<(), SheetError> {
        let located = |e: SheetError| e.at(tok.line, tok.column);
        let (key, selector, value) = match &tok.token {
            Token::Directive { key, selector, value } => (key.as_str(), selector.as_deref(), value.as_deref()),
            _ => return Ok(()),
        };
        let value = value.unwrap_or_default();

        match key {
            "instrument" => {
                if let Some(count) = self.builder.track_count() {
                    return Err(located(SheetError::structural(format!(
                        "instrument declared after patterns were set for {} track(s)",
                        count
                    ))));
                }
                let instrument = Instrument::parse_declaration(value).map_err(located)?;
                debug!(name = %instrument.name, "declared instrument");
                self.instruments.declare(instrument).map_err(located)?;
            }
            "chord" => {
                let track = self.instruments.resolve(selector).map_err(located)?;
                let (chord, frets) = parse_chord_definition(value).map_err(located)?;
                if let Some(instrument) = self.instruments.get_mut(track) {
                    instrument
                        .chord_lib_mut()
                        .define_chord(chord, frets)
                        .map_err(located)?;
                }
            }
            "pattern" => {
                let track = self.instruments.resolve(selector).map_err(located)?;
                let (name, strums) = split_directive(value).map_err(located)?;
                let pattern = match (name, strums) {
                    (Some(name), None) => self.reference_pattern(name, track).map_err(located)?,
                    (name, Some(strums)) => {
                        let pattern = Pattern::parse(name.clone(), &strums, self.builder.time())
                            .map_err(located)?;
                        self.define_pattern(pattern, track).map_err(located)?
                    }
                    (None, None) => return Err(located(SheetError::grammar("pattern", value))),
                };
                self.builder
                    .switch_pattern(track, pattern, self.instruments.len())
                    .map_err(located)?;
            }
            _ => {}
        }
        Ok(())
    }

    /// A pattern defined earlier, checked against the strings of the track reusing it.
    fn reference_pattern(&self, name: String, track: usize) -> Result<Arc<Pattern>, SheetError> {
        let pattern = self
            .patterns
            .get(&name)
            .cloned()
            .ok_or_else(|| SheetError::lookup("pattern", name))?;
        if let Some(instrument) = self.instruments.get(track) {
            pattern.check_strings(instrument.string_count())?;
        }
        Ok(pattern)
    }

    fn define_pattern(&mut self, pattern: Pattern, track: usize) -> Result<Arc<Pattern>, SheetError> {
        if let Some(instrument) = self.instruments.get(track) {
            pattern.check_strings(instrument.string_count())?;
        }
        let pattern = Arc::new(pattern);
        if let Some(name) = pattern.name() {
            self.patterns.insert(name.to_string(), Arc::clone(&pattern));
        }
        Ok(pattern)
    }

    /// A tab block defines a pattern for the default instrument and switches to it.
    fn tab(&mut self, tok: &LocatedToken, children: &[LocatedToken]) -> Result<(), SheetError> {
        let label = match &tok.token {
            Token::Environment { label, .. } => label.clone(),
            _ => None,
        };
        let rows: Vec<String> = children
            .iter()
            .filter_map(|c| match &c.token {
                Token::TabLine(row) => Some(row.clone()),
                _ => None,
            })
            .collect();
        let pattern = Pattern::from_tab(label, &rows, self.builder.time())?;
        let pattern = self.define_pattern(pattern, 0)?;
        self.builder
            .switch_pattern(0, pattern, self.instruments.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chord::Chord;

    #[test]
    fn test_single_bar_song() {
        let song = parse("{title: X}\n{time: 4/4}\n{tempo: 100}\n\n{pattern: verse |d-du|}\n[C.][...]Hi ")
            .unwrap();
        assert_eq!(song.title(), Some("X"));
        assert_eq!(song.tempo(), 100);
        let bars: Vec<_> = song.bars().collect();
        assert_eq!(bars.len(), 1);
        assert_eq!(bars[0].chords, vec![Chord::parse("C").ok()]);
        assert_eq!(bars[0].beats, vec![4.0]);
        assert_eq!(bars[0].tempo, 100);
        assert_eq!(song.used_patterns(0).len(), 1);
        assert_eq!(song.parts.len(), 1);
        assert_eq!(song.parts[0].kind, PartKind::None);
    }

    #[test]
    fn test_parts_and_inheritance() {
        let song = parse(
            "{tempo: 90}\n{start_of_verse}\n[C]a\n{end_of_verse}\n{soc}\n{tempo: 140}\n[G]b\n{eoc}\n",
        )
        .unwrap();
        assert_eq!(song.parts.len(), 2);
        assert_eq!(song.parts[0].kind, PartKind::Verse);
        assert_eq!(song.parts[0].effective_metadata().tempo(), 90);
        assert_eq!(song.parts[1].metadata.get(MetaKey::Tempo), Some("140"));
        let tempos: Vec<u32> = song.bars().map(|b| b.tempo).collect();
        assert_eq!(tempos, vec![90, 140]);
    }

    #[test]
    fn test_part_tempo_is_restored() {
        let song = parse("{soc}\n{tempo: 60}\n[C]a\n{eoc}\n[G]b").unwrap();
        let tempos: Vec<u32> = song.bars().map(|b| b.tempo).collect();
        assert_eq!(tempos, vec![60, 120]);
    }

    #[test]
    fn test_nested_same_kind_is_flagged() {
        let song = parse("{sov}\n[C]a\n{sov}\n[G]b\n{eov}\n{eov}").unwrap();
        let outer = &song.parts[0];
        match &outer.content[1] {
            PartContent::Part(inner) => assert!(inner.nested_same_kind),
            other => panic!("expected nested part, got {:?}", other),
        }
        assert!(!outer.nested_same_kind);
        assert_eq!(song.bars().count(), 2);
    }

    #[test]
    fn test_unknown_pattern_reference() {
        let err = parse("{title: T}\n{pattern: chorus}\n[C]").unwrap_err();
        assert!(matches!(err, SheetError::LookupError { what: "pattern", ref name, .. } if name == "chorus"));
        assert_eq!(err.location().map(|l| l.line), Some(2));
    }

    #[test]
    fn test_pattern_reference_checks_strings() {
        let source = concat!(
            "{instrument: G guitar}\n",
            "{instrument: U ukulele}\n",
            "{pattern: six |6---|}\n",
            "{pattern-U: six}\n",
            "[C]"
        );
        let err = parse(source).unwrap_err();
        assert!(matches!(err, SheetError::StructuralError { .. }));
        assert!(err.to_string().contains("4 strings"));
        assert_eq!(err.location().map(|l| l.line), Some(4));

        // the guitar can reuse it
        assert!(parse("{instrument: G guitar}\n{pattern: six |6---|}\n[C]\n{pattern: six}\n[G]").is_ok());
    }

    #[test]
    fn test_chords_before_first_pattern() {
        let song = parse("[C]\n{pattern: |dudu|}\n[G]").unwrap();
        let names: Vec<String> = song.used_chords(0).iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["C", "G"]);
        let bars: Vec<_> = song.bars().collect();
        assert!(bars[0].patterns.is_empty());
        assert!(bars[1].pattern(0).is_some());
    }

    #[test]
    fn test_pattern_reference_reuses_instance() {
        let song = parse("{pattern: a |dudu|}\n[C]\n{pattern: b |dddd|}\n[G]\n{pattern: a}\n[C]").unwrap();
        let used = song.used_patterns(0);
        assert_eq!(used.len(), 2);
        let bars: Vec<_> = song.bars().collect();
        let (first, _) = bars[0].pattern(0).unwrap();
        let (third, idx) = bars[2].pattern(0).unwrap();
        assert!(Arc::ptr_eq(first, third));
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_key_change_after_content() {
        let song = parse("{key: C}\n[C]\n{key: G}\n[G][D]").unwrap();
        let keys: Vec<Option<&str>> = song.bars().map(|b| b.key.as_deref()).collect();
        assert_eq!(keys, vec![None, Some("G"), None]);
        assert_eq!(song.metadata.get(MetaKey::Key), Some("C"));

        let err = parse("[C..]\n{key: G}\n[G..]").unwrap_err();
        assert!(err.to_string().contains("bar boundary"));
        assert_eq!(err.location().map(|l| l.line), Some(2));

        let err = parse("[C]\n{key: Q}").unwrap_err();
        assert!(matches!(err, SheetError::GrammarError { .. }));
    }

    #[test]
    fn test_incomplete_bar_at_part_end() {
        let err = parse("{sov}\n[C..]a\n{eov}").unwrap_err();
        assert!(err.to_string().contains("incomplete"));
        assert_eq!(err.location().map(|l| l.line), Some(3));
    }

    #[test]
    fn test_line_breaks_in_lyrics() {
        let song = parse("[C]one\n# just a comment\ntwo\n[G]three").unwrap();
        let bars: Vec<_> = song.bars().collect();
        assert_eq!(bars[0].lyrics, vec!["one\ntwo\n".to_string()]);
        assert_eq!(bars[1].lyrics, vec!["three".to_string()]);
    }

    #[test]
    fn test_instruments_and_selectors() {
        let song = parse(concat!(
            "{instrument: Uke ukulele}\n",
            "{instrument: Bass bass}\n",
            "{chord-Bass: G 3 2 0 0}\n",
            "{pattern: |d-du|}\n",
            "{pattern-Bass: |1-2-|}\n",
            "[G][C]"
        ))
        .unwrap();
        assert_eq!(song.instruments.len(), 2);
        assert_eq!(song.used_patterns(1).len(), 1);
        let names: Vec<String> = song.used_chords(0).iter().map(|c| c.name()).collect();
        assert_eq!(names, vec!["C", "G"]);
        let bass = song.instruments.get(1).unwrap();
        assert_eq!(bass.chord_lib().get_frets(&Chord::parse("G").unwrap()), vec![3, 2, 0, 0]);
    }

    #[test]
    fn test_instrument_after_patterns() {
        let err = parse("{pattern: |dddd|}\n{instrument: Late}").unwrap_err();
        assert!(matches!(err, SheetError::StructuralError { .. }));
    }

    #[test]
    fn test_unknown_instrument_selector() {
        let err = parse("{pattern-Kazoo: |dddd|}").unwrap_err();
        assert!(matches!(err, SheetError::LookupError { what: "instrument", ref name, .. } if name == "Kazoo"));
        assert_eq!(err.location().map(|l| l.line), Some(1));
    }

    #[test]
    fn test_tab_block_sets_pattern() {
        let song = parse("{start_of_tab: riff}\n|0-2-|\n|----|\n|----|\n|3---|\n{end_of_tab}\n[C]").unwrap();
        let used = song.used_patterns(0);
        assert_eq!(used[0].name(), Some("riff"));
        assert_eq!(used[0].strums()[0], crate::pattern::Strum::Tab(vec![3, -1, -1, 0]));
    }

    #[test]
    fn test_unknown_environment() {
        assert!(matches!(
            parse("{start_of_grid}\n{end_of_grid}").unwrap_err(),
            SheetError::GrammarError { what: "part", .. }
        ));
    }
}
