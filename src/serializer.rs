//! Serializer: tokens back to text, and the song model back to tokens.
//!
//! Rendering is a fixed template per token type, so for any text the
//! tokenizer accepts, `render(tokenize(text))` gives the text back. Aliased keys
//! (`{t: ...}`), directive spacing and runs of blank lines come back in their
//! canonical form. A line holding only whitespace counts as blank and comes back
//! empty.
//!
//! [`Song::tokenize`] goes the other way, from the model to tokens. Part
//! metadata is written only where it differs from the inherited value, and a
//! pattern directive is written only where a track's pattern changes. A key
//! change made after a part's first line is written before the bar it applies to.

use std::collections::HashMap;
use std::sync::Arc;

use crate::bar::{Bar, BarParagraph};
use crate::chord::ChordSymbol;
use crate::error::SheetError;
use crate::chord_lib::render_fret;
use crate::lexer::{escape, tokenize, LocatedToken, Token, ROOT_ENVIRONMENT, TAB_ENVIRONMENT};
use crate::metadata::MetaKey;
use crate::parser::parse;
use crate::pattern::Pattern;
use crate::signature::TimeSignature;
use crate::song::{PartContent, Song, SongPart};

/// Render a token tree to text.
pub fn render(token: &LocatedToken) -> String {
    let mut out = String::new();
    render_into(token, &mut out);
    out
}

fn render_into(token: &LocatedToken, out: &mut String) {
    match &token.token {
        Token::Text(text) => out.push_str(&escape(text)),
        Token::ChordRef(body) => {
            out.push('[');
            out.push_str(body);
            out.push(']');
        }
        Token::Metadata { key, value } => {
            out.push_str(&format!("{{{}: {}}}", key, value));
        }
        Token::Directive {
            key,
            selector,
            value,
        } => {
            out.push('{');
            out.push_str(key);
            if let Some(selector) = selector {
                out.push('-');
                out.push_str(selector);
            }
            if let Some(value) = value {
                out.push_str(": ");
                out.push_str(value);
            }
            out.push('}');
        }
        Token::Environment {
            name,
            label,
            children,
        } => {
            if name == ROOT_ENVIRONMENT && is_root(token) {
                for child in children {
                    render_into(child, out);
                }
                return;
            }
            out.push_str("{start_of_");
            out.push_str(name);
            if let Some(label) = label {
                out.push_str(": ");
                out.push_str(label);
            }
            out.push('}');
            if name == TAB_ENVIRONMENT {
                render_tab_body(children, out);
                return;
            }
            for child in children {
                render_into(child, out);
            }
        }
        Token::EndOfEnvironment(name) => {
            out.push_str("{end_of_");
            out.push_str(name);
            out.push('}');
        }
        Token::TabLine(row) => out.push_str(row),
        Token::Comment(text) => {
            out.push('#');
            out.push_str(text);
        }
        Token::LineBreak | Token::ParagraphBreak => out.push('\n'),
    }
}

/// The root environment is the only one without a closing tag.
fn is_root(token: &LocatedToken) -> bool {
    !matches!(
        token.children().last().map(|c| &c.token),
        Some(Token::EndOfEnvironment(name)) if name == ROOT_ENVIRONMENT
    )
}

/// Rows are stored lowest string first and printed highest string first.
fn render_tab_body(children: &[LocatedToken], out: &mut String) {
    out.push('\n');
    for child in children.iter().rev() {
        if let Token::TabLine(row) = &child.token {
            out.push_str(row);
            out.push('\n');
        }
    }
    out.push_str(&format!("{{end_of_{}}}", TAB_ENVIRONMENT));
}

/// Tokenize and render again, normalizing directive spelling.
pub fn format(source: &str) -> Result<String, SheetError> {
    Ok(render(&tokenize(source)?))
}

/// Parse, then write the song back out from the model.
pub fn normalize(source: &str) -> Result<String, SheetError> {
    Ok(render(&parse(source)?.tokenize()))
}

fn tok(token: Token) -> LocatedToken {
    LocatedToken::new(token, 0, 0)
}

/// Lyric text with embedded line breaks as Text/LineBreak tokens.
fn push_lyric(out: &mut Vec<LocatedToken>, lyric: &str) {
    for (i, piece) in lyric.split('\n').enumerate() {
        if i > 0 {
            out.push(tok(Token::LineBreak));
        }
        if !piece.is_empty() {
            out.push(tok(Token::Text(piece.to_string())));
        }
    }
}

fn push_metadata(out: &mut Vec<LocatedToken>, key: MetaKey, value: &str) {
    out.push(tok(Token::Metadata {
        key,
        value: value.to_string(),
    }));
    out.push(tok(Token::LineBreak));
}

/// What has been written so far, to decide which directives a paragraph needs.
struct TokenizeState<'a> {
    song: &'a Song,
    tracks: Vec<Option<Arc<Pattern>>>,
    next_idxs: Vec<usize>,
    defined: HashMap<String, Arc<Pattern>>,
    time: TimeSignature,
    tempo: u32,
}

impl<'a> TokenizeState<'a> {
    fn part(&mut self, part: &SongPart, out: &mut Vec<LocatedToken>) {
        let saved = (self.time, self.tempo);
        let effective = part.effective_metadata();
        self.time = effective.time();
        self.tempo = effective.tempo();

        let mut body = Vec::new();
        for (key, value) in part.metadata.iter() {
            if part.inherited.get(key) != Some(value) {
                push_metadata(&mut body, key, value);
            }
        }
        for (i, content) in part.content.iter().enumerate() {
            if i > 0 {
                body.push(tok(Token::ParagraphBreak));
            }
            match content {
                PartContent::Paragraph(paragraph) => self.paragraph(paragraph, &mut body),
                PartContent::Part(nested) => self.part(nested, &mut body),
            }
        }

        match part.kind.environment() {
            None => out.extend(body),
            Some(name) => {
                let mut children = vec![tok(Token::LineBreak)];
                children.extend(body);
                children.push(tok(Token::EndOfEnvironment(name.to_string())));
                out.push(tok(Token::Environment {
                    name: name.to_string(),
                    label: part.label.clone(),
                    children,
                }));
                out.push(tok(Token::LineBreak));
            }
        }
        self.time = saved.0;
        self.tempo = saved.1;
    }

    fn paragraph(&mut self, paragraph: &BarParagraph, out: &mut Vec<LocatedToken>) {
        let first = match paragraph.bars.first() {
            Some(bar) => bar,
            None => return,
        };
        if let Some(key) = &first.key {
            push_metadata(out, MetaKey::Key, key);
        }
        if first.time != self.time {
            self.time = first.time;
            push_metadata(out, MetaKey::Time, &first.time.to_string());
        }
        if first.tempo != self.tempo {
            self.tempo = first.tempo;
            push_metadata(out, MetaKey::Tempo, &first.tempo.to_string());
        }
        self.pattern_changes(first, out);

        for bar in &paragraph.bars {
            self.bar(bar, out);
        }
        out.push(tok(Token::LineBreak));
    }

    fn pattern_changes(&mut self, bar: &Bar, out: &mut Vec<LocatedToken>) {
        if self.tracks.len() < bar.patterns.len() {
            self.tracks.resize(bar.patterns.len(), None);
            self.next_idxs.resize(bar.patterns.len(), 0);
        }
        for (track, pattern) in bar.patterns.iter().enumerate() {
            let pattern = match pattern {
                Some(p) => p,
                None => continue,
            };
            let idx = bar.pattern_idxs.get(track).copied().unwrap_or(0);
            let same = self.tracks[track]
                .as_ref()
                .map(|current| Arc::ptr_eq(current, pattern))
                .unwrap_or(false);
            if same && idx == self.next_idxs[track] {
                continue;
            }
            self.pattern_directive(track, pattern, out);
        }
    }

    fn pattern_directive(&mut self, track: usize, pattern: &Arc<Pattern>, out: &mut Vec<LocatedToken>) {
        let selector = if track == 0 {
            None
        } else {
            self.song.instruments.get(track).map(|i| i.name.clone())
        };

        let defined = pattern
            .name()
            .filter(|name| {
                self.defined
                    .get(*name)
                    .map(|d| Arc::ptr_eq(d, pattern))
                    .unwrap_or(false)
            })
            .map(|name| name.to_string());

        match (defined, pattern.tab_rows()) {
            (Some(name), _) => out.push(tok(Token::Directive {
                key: "pattern".to_string(),
                selector,
                value: Some(name),
            })),
            (None, Some(rows)) if track == 0 => {
                let mut children: Vec<LocatedToken> = rows
                    .iter()
                    .map(|row| tok(Token::TabLine(row.clone())))
                    .collect();
                children.push(tok(Token::EndOfEnvironment(TAB_ENVIRONMENT.to_string())));
                out.push(tok(Token::Environment {
                    name: TAB_ENVIRONMENT.to_string(),
                    label: pattern.name().map(|n| n.to_string()),
                    children,
                }));
            }
            (None, _) => out.push(tok(Token::Directive {
                key: "pattern".to_string(),
                selector,
                value: Some(pattern.directive_value()),
            })),
        }
        out.push(tok(Token::LineBreak));

        if let Some(name) = pattern.name() {
            self.defined.insert(name.to_string(), Arc::clone(pattern));
        }
        self.tracks[track] = Some(Arc::clone(pattern));
        self.next_idxs[track] = 0;
    }

    fn bar(&mut self, bar: &Bar, out: &mut Vec<LocatedToken>) {
        if let Some(anacrusis) = &bar.anacrusis {
            push_lyric(out, anacrusis);
        }
        let last = bar.onset_count().saturating_sub(1);
        for (i, (chord, ticks)) in bar.chords.iter().zip(&bar.ticks).enumerate() {
            let symbol = ChordSymbol {
                chord: *chord,
                ticks: if i == last { None } else { Some(*ticks) },
            };
            out.push(tok(Token::ChordRef(symbol.render())));
            if let Some(lyric) = bar.lyrics.get(i) {
                push_lyric(out, lyric);
            }
        }
        for (track, pattern) in bar.patterns.iter().enumerate() {
            if pattern.is_some() {
                if let Some(idx) = bar.pattern_idxs.get(track) {
                    self.next_idxs[track] = idx + 1;
                }
            }
        }
    }
}

impl Song {
    /// The token tree that renders to this song.
    pub fn tokenize(&self) -> LocatedToken {
        let mut children = Vec::new();

        for (key, value) in self.metadata.iter() {
            push_metadata(&mut children, key, value);
        }
        if !self.instruments.is_implicit() {
            for instrument in self.instruments.iter() {
                children.push(tok(Token::Directive {
                    key: "instrument".to_string(),
                    selector: None,
                    value: Some(instrument.declaration()),
                }));
                children.push(tok(Token::LineBreak));
            }
        }
        for (idx, instrument) in self.instruments.iter().enumerate() {
            let selector = if idx == 0 {
                None
            } else {
                Some(instrument.name.clone())
            };
            for def in instrument.chord_lib().custom_chords() {
                let frets: Vec<String> = def.frets.iter().map(|f| render_fret(*f)).collect();
                children.push(tok(Token::Directive {
                    key: "chord".to_string(),
                    selector: selector.clone(),
                    value: Some(format!("{} {}", def.chord, frets.join(" "))),
                }));
                children.push(tok(Token::LineBreak));
            }
        }

        let mut state = TokenizeState {
            song: self,
            tracks: Vec::new(),
            next_idxs: Vec::new(),
            defined: HashMap::new(),
            time: self.metadata.time(),
            tempo: self.metadata.tempo(),
        };
        for (i, part) in self.parts.iter().enumerate() {
            if i > 0 || !children.is_empty() {
                children.push(tok(Token::ParagraphBreak));
            }
            state.part(part, &mut children);
        }
        tok(Token::Environment {
            name: ROOT_ENVIRONMENT.to_string(),
            label: None,
            children,
        })
    }

    /// Source text of the song, written from the model.
    pub fn to_source(&self) -> String {
        render(&self.tokenize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_is_byte_exact() {
        let source = "{title: X}\n{time: 4/4}\n{tempo: 100}\n\n{pattern: verse |d-du|}\n[C.][...]Hi ";
        assert_eq!(format(source).unwrap(), source);
    }

    #[test]
    fn test_format_keeps_structure() {
        let source = concat!(
            "{instrument: Uke ukulele}\n",
            "{instrument: Bass bass}\n",
            "# intro riff\n",
            "{start_of_tab: riff}\n",
            "|0---|\n",
            "|--2-|\n",
            "{end_of_tab}\n",
            "\n",
            "{start_of_chorus: Refrain}\n",
            "{pattern-Bass: |1-2-|}\n",
            "Oh \\[not a chord\\] [C]la la [G7.]la\n",
            "{comment: softly}\n",
            "{end_of_chorus}\n",
        );
        assert_eq!(format(source).unwrap(), source);
    }

    #[test]
    fn test_format_canonicalizes_aliases() {
        assert_eq!(format("{t:X}\n\n\n{soc}\n{eoc}").unwrap(), "{title: X}\n\n{start_of_chorus}\n{end_of_chorus}");
    }

    #[test]
    fn test_format_empties_whitespace_lines() {
        assert_eq!(format("[C]a\n  \t\n[G]b").unwrap(), "[C]a\n\n[G]b");
        assert_eq!(format("[C]a\n   \n\n \n[G]b").unwrap(), "[C]a\n\n[G]b");
    }

    #[test]
    fn test_normalize_keeps_key_change_inside_part() {
        let source = "{key: C}\n[C]one\n{key: G}\n[G]two\n\n{sov}\n[C]\n{key: D}\n{eov}\n[G]";
        let out = normalize(source).unwrap();
        assert!(out.contains("[C]one\n\n{key: G}\n[G]two\n"));
        // a change with no bars after it is dropped
        assert!(!out.contains("{key: D}"));

        let song = parse(&out).unwrap();
        let keys: Vec<Option<&str>> = song.bars().map(|b| b.key.as_deref()).collect();
        assert_eq!(keys, vec![None, Some("G"), None, None]);
        assert_eq!(normalize(&out).unwrap(), out);
    }

    #[test]
    fn test_normalize_from_model() {
        let source = "{title: X}\n{tempo: 100}\n\n{pattern: verse |d-du|}\n[C.][...]Hi \n{sov}\n[G]la [Am.]da[C...]\n{eov}";
        let expected = concat!(
            "{title: X}\n",
            "{tempo: 100}\n",
            "\n",
            "{pattern: verse |d-du|}\n",
            "[C]Hi \n",
            "\n",
            "{start_of_verse}\n",
            "[G]la [Am.]da[C]\n",
            "{end_of_verse}\n",
        );
        assert_eq!(normalize(source).unwrap(), expected);
    }

    #[test]
    fn test_model_round_trip() {
        let source = concat!(
            "{title: Round}\n",
            "{key: Am}\n",
            "{chord: Am 2 0 0 x}\n",
            "{pattern: a |d-du|D-du|}\n",
            "And [Am]so it [C.]goes[G...]\n",
            "on\n",
            "\n",
            "{pattern: |dddd|}\n",
            "{tempo: 90}\n",
            "[Am..][..]\n",
            "{pattern: a}\n",
            "[C]",
        );
        let song = parse(source).unwrap();
        let again = parse(&song.to_source()).unwrap();

        let bars: Vec<_> = song.bars().collect();
        let bars_again: Vec<_> = again.bars().collect();
        assert_eq!(bars.len(), bars_again.len());
        for (a, b) in bars.iter().zip(&bars_again) {
            assert_eq!(a.chords, b.chords);
            assert_eq!(a.ticks, b.ticks);
            assert_eq!(a.lyrics, b.lyrics);
            assert_eq!(a.anacrusis, b.anacrusis);
            assert_eq!(a.pattern_idxs, b.pattern_idxs);
            assert_eq!(a.tempo, b.tempo);
        }
        assert_eq!(song.used_patterns(0).len(), again.used_patterns(0).len());
        assert_eq!(song.metadata, again.metadata);
        assert_eq!(
            again.instruments.default_instrument().chord_lib().custom_chords(),
            song.instruments.default_instrument().chord_lib().custom_chords()
        );
    }

    #[test]
    fn test_part_metadata_is_delta_encoded() {
        let source = "{tempo: 90}\n{sov}\n{tempo: 90}\n[C]a\n{eov}\n{soc}\n{tempo: 120}\n[G]b\n{eoc}";
        let out = normalize(source).unwrap();
        assert!(out.contains("{start_of_chorus}\n{tempo: 120}\n"));
        assert!(out.contains("{start_of_verse}\n[C]a\n"));
    }

    #[test]
    fn test_render_escapes_text() {
        let token = LocatedToken::new(Token::Text("a [b] #c".to_string()), 1, 1);
        assert_eq!(render(&token), r"a \[b\] \#c");
    }
}
