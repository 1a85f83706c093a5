//! Tokenizer: raw song sheet text to a tree of located tokens.
//!
//! The input is read line by line. Each line is scanned left to right with one
//! anchored grammar that matches, at every position, exactly one of: a run of
//! lyric text, a `[chord]` reference, a `{key: value}` directive or a trailing
//! `# comment`. Environment directives (`{start_of_verse}` ... `{end_of_verse}`)
//! open and close nested [`Token::Environment`] tokens. Tab blocks switch to a
//! per-line fret-row grammar until `{end_of_tab}`.
//!
//! The result is a single root environment named `song` that has no closing tag.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::chord::Chord;
use crate::chord_lib::parse_fret;
use crate::error::SheetError;
use crate::instrument::Instrument;
use crate::metadata::{canonical_key, MetaKey};
use crate::pattern::split_directive;

/// Name of the implicit root environment.
pub const ROOT_ENVIRONMENT: &str = "song";

/// Name of the tab environment.
pub const TAB_ENVIRONMENT: &str = "tab";

/// Characters that must be escaped with `\` inside lyric text.
pub const ESCAPED_CHARS: &[char] = &['[', ']', '{', '}', '\\', '#'];

/// Directives with no musical effect, kept for round-tripping.
pub const INFORMATIONAL_DIRECTIVES: &[&str] =
    &["comment", "comment_italic", "highlight", "new_page", "column_break"];

static LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"^(?:",
        r"(?P<text>(?:[^\[\]{}\\#]|\\[\[\]{}\\#])+)",
        r"|\[(?P<chord>[^\[\]]*)\]",
        r"|\{(?P<key>[A-Za-z_][A-Za-z0-9_]*)(?:-(?P<selector>[A-Za-z0-9_]+))?(?:\s*:\s*(?P<value>[^}]*))?\}",
        r"|#(?P<comment>.*)",
        r")"
    ))
    .unwrap()
});

static TAB_LINE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[0-9\-|x ]+$").unwrap());

static CHORD_DEFINITION_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\s*(?P<chord>\S+)(?P<frets>(?:\s+(?:-1|x|X|[0-9]+)){1,12})\s*$").unwrap()
});

/// Token types for the song sheet notation
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    /// Lyric text, unescaped.
    Text(String),
    /// Raw body of a `[...]` chord reference.
    ChordRef(String),
    /// A registered metadata field (`{title: ...}`, `{tempo: ...}`, ...).
    Metadata { key: MetaKey, value: String },
    /// Any other directive: `pattern`, `chord`, `instrument` or an informational one.
    Directive {
        key: String,
        selector: Option<String>,
        value: Option<String>,
    },
    /// An opened region. Its last child is the closing tag, except for the root.
    Environment {
        name: String,
        label: Option<String>,
        children: Vec<LocatedToken>,
    },
    EndOfEnvironment(String),
    /// One fret row of a tab block.
    TabLine(String),
    /// Text after `#`.
    Comment(String),
    LineBreak,
    ParagraphBreak,
}

/// A token with its position in the source
#[derive(Debug, Clone, PartialEq)]
pub struct LocatedToken {
    pub token: Token,
    pub line: usize,
    pub column: usize,
}

impl LocatedToken {
    pub fn new(token: Token, line: usize, column: usize) -> Self {
        Self {
            token,
            line,
            column,
        }
    }

    /// Children of an environment token; empty for every other token.
    pub fn children(&self) -> &[LocatedToken] {
        match &self.token {
            Token::Environment { children, .. } => children,
            _ => &[],
        }
    }
}

struct OpenEnvironment {
    name: String,
    label: Option<String>,
    children: Vec<LocatedToken>,
    line: usize,
    column: usize,
}

impl OpenEnvironment {
    fn into_token(self) -> LocatedToken {
        LocatedToken::new(
            Token::Environment {
                name: self.name,
                label: self.label,
                children: self.children,
            },
            self.line,
            self.column,
        )
    }
}

/// Lexer for tokenizing song sheet text
pub struct Lexer<'a> {
    input: &'a str,
    stack: Vec<OpenEnvironment>,
    last_blank: bool,
}

impl<'a> Lexer<'a> {
    pub fn new(input: &'a str) -> Self {
        Self {
            input,
            stack: vec![OpenEnvironment {
                name: ROOT_ENVIRONMENT.to_string(),
                label: None,
                children: Vec::new(),
                line: 1,
                column: 1,
            }],
            last_blank: false,
        }
    }

    pub fn tokenize(mut self) -> Result<LocatedToken, SheetError> {
        let lines: Vec<&str> = self.input.split('\n').collect();
        let count = lines.len();

        for (idx, line) in lines.iter().enumerate() {
            let line_no = idx + 1;
            let is_last = idx + 1 == count;

            if self.in_tab() {
                self.tab_line(line, line_no, is_last)?;
                continue;
            }

            if line.trim().is_empty() {
                if !is_last && !self.last_blank {
                    self.push(LocatedToken::new(Token::ParagraphBreak, line_no, 1));
                }
                self.last_blank = true;
                continue;
            }
            self.last_blank = false;

            let opened_tab = self.scan_line(line, line_no)?;
            if !is_last && !opened_tab {
                let column = line.chars().count() + 1;
                self.push(LocatedToken::new(Token::LineBreak, line_no, column));
            }
        }

        if self.stack.len() != 1 {
            let open = &self.stack[self.stack.len() - 1];
            return Err(SheetError::structural(format!(
                "unclosed environment start_of_{}",
                open.name
            ))
            .at(open.line, open.column));
        }
        match self.stack.pop() {
            Some(root) => Ok(root.into_token()),
            None => Err(SheetError::structural("environment stack is empty")),
        }
    }

    fn in_tab(&self) -> bool {
        self.stack.len() > 1 && self.top().name == TAB_ENVIRONMENT
    }

    fn top(&self) -> &OpenEnvironment {
        &self.stack[self.stack.len() - 1]
    }

    fn push(&mut self, token: LocatedToken) {
        let last = self.stack.len() - 1;
        self.stack[last].children.push(token);
    }

    /// Scan one ordinary line. Returns true if it opened a tab block.
    fn scan_line(&mut self, line: &str, line_no: usize) -> Result<bool, SheetError> {
        let mut pos = 0;
        while pos < line.len() {
            let column = line[..pos].chars().count() + 1;
            let caps = LINE_RE
                .captures(&line[pos..])
                .ok_or_else(|| SheetError::grammar("line", &line[pos..]).at(line_no, column))?;
            let whole = caps.get(0).map(|m| m.as_str()).unwrap_or_default();
            if whole.is_empty() {
                return Err(SheetError::grammar("line", &line[pos..]).at(line_no, column));
            }

            if let Some(text) = caps.name("text") {
                self.push(LocatedToken::new(
                    Token::Text(unescape(text.as_str())),
                    line_no,
                    column,
                ));
            } else if let Some(chord) = caps.name("chord") {
                self.push(LocatedToken::new(
                    Token::ChordRef(chord.as_str().to_string()),
                    line_no,
                    column,
                ));
            } else if let Some(key) = caps.name("key") {
                let selector = caps.name("selector").map(|m| m.as_str().to_string());
                let value = caps.name("value").map(|m| m.as_str().to_string());
                let opened_tab = self
                    .directive(key.as_str(), selector, value, line_no, column)
                    .map_err(|e| e.at(line_no, column))?;
                if opened_tab {
                    if !line[pos + whole.len()..].trim().is_empty() {
                        return Err(SheetError::structural(
                            "start_of_tab must be the last thing on its line",
                        )
                        .at(line_no, column));
                    }
                    return Ok(true);
                }
            } else if let Some(comment) = caps.name("comment") {
                self.push(LocatedToken::new(
                    Token::Comment(comment.as_str().to_string()),
                    line_no,
                    column,
                ));
            }
            pos += whole.len();
        }
        Ok(false)
    }

    /// Handle one directive. Returns true if it opened a tab block.
    fn directive(
        &mut self,
        raw_key: &str,
        selector: Option<String>,
        value: Option<String>,
        line: usize,
        column: usize,
    ) -> Result<bool, SheetError> {
        let key = canonical_key(raw_key);

        if let Some(name) = key.strip_prefix("start_of_") {
            if name.is_empty() || selector.is_some() {
                return Err(SheetError::grammar("directive", raw_key));
            }
            let label = value.filter(|v| !v.trim().is_empty());
            self.stack.push(OpenEnvironment {
                name: name.to_string(),
                label,
                children: Vec::new(),
                line,
                column,
            });
            return Ok(name == TAB_ENVIRONMENT);
        }

        if let Some(name) = key.strip_prefix("end_of_") {
            if name.is_empty() || selector.is_some() || value.is_some() {
                return Err(SheetError::grammar("directive", raw_key));
            }
            self.close(name, line, column)?;
            return Ok(false);
        }

        if let Ok(meta) = key.parse::<MetaKey>() {
            if selector.is_some() {
                return Err(SheetError::grammar("directive", raw_key));
            }
            let value = value.ok_or_else(|| SheetError::grammar(meta.name(), ""))?;
            meta.validate(value.trim())?;
            self.push(LocatedToken::new(
                Token::Metadata { key: meta, value },
                line,
                column,
            ));
            return Ok(false);
        }

        match key {
            "pattern" => {
                let v = value.as_deref().ok_or_else(|| SheetError::grammar("pattern", ""))?;
                split_directive(v)?;
            }
            "chord" => {
                let v = value.as_deref().ok_or_else(|| SheetError::grammar("chord definition", ""))?;
                parse_chord_definition(v)?;
            }
            "instrument" => {
                if selector.is_some() {
                    return Err(SheetError::grammar("directive", raw_key));
                }
                let v = value.as_deref().ok_or_else(|| SheetError::grammar("instrument", ""))?;
                Instrument::parse_declaration(v)?;
            }
            k if INFORMATIONAL_DIRECTIVES.contains(&k) => {
                if selector.is_some() {
                    return Err(SheetError::grammar("directive", raw_key));
                }
            }
            _ => return Err(SheetError::grammar("directive", raw_key)),
        }

        self.push(LocatedToken::new(
            Token::Directive {
                key: key.to_string(),
                selector,
                value,
            },
            line,
            column,
        ));
        Ok(false)
    }

    fn close(&mut self, name: &str, line: usize, column: usize) -> Result<(), SheetError> {
        if self.stack.len() == 1 || self.top().name != name {
            let expected = if self.stack.len() == 1 {
                "no open environment".to_string()
            } else {
                format!("expected end_of_{}", self.top().name)
            };
            return Err(SheetError::structural(format!(
                "mismatched end_of_{}: {}",
                name, expected
            )));
        }
        self.push(LocatedToken::new(
            Token::EndOfEnvironment(name.to_string()),
            line,
            column,
        ));
        if let Some(env) = self.stack.pop() {
            self.push(env.into_token());
        }
        Ok(())
    }

    fn tab_line(&mut self, line: &str, line_no: usize, is_last: bool) -> Result<(), SheetError> {
        let trimmed = line.trim();
        if trimmed.starts_with('{') {
            let column = line.len() - line.trim_start().len() + 1;
            match trimmed {
                "{end_of_tab}" | "{eot}" => {
                    self.close(TAB_ENVIRONMENT, line_no, column)
                        .map_err(|e| e.at(line_no, column))?;
                    self.last_blank = false;
                    if !is_last {
                        let end = line.chars().count() + 1;
                        self.push(LocatedToken::new(Token::LineBreak, line_no, end));
                    }
                    Ok(())
                }
                _ => Err(SheetError::grammar("tab line", line).at(line_no, column)),
            }
        } else if TAB_LINE_RE.is_match(line) {
            // Rows are stored lowest string first, the reverse of the text.
            let last = self.stack.len() - 1;
            self.stack[last].children.insert(
                0,
                LocatedToken::new(Token::TabLine(line.to_string()), line_no, 1),
            );
            Ok(())
        } else {
            Err(SheetError::grammar("tab line", line).at(line_no, 1))
        }
    }
}

/// Remove `\` escapes from lyric text.
pub fn unescape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(next) = chars.next() {
                out.push(next);
            }
        } else {
            out.push(c);
        }
    }
    out
}

/// Escape lyric text for output.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if ESCAPED_CHARS.contains(&c) {
            out.push('\\');
        }
        out.push(c);
    }
    out
}

/// Split a `{chord: ...}` value into its chord and fret array.
pub fn parse_chord_definition(value: &str) -> Result<(Chord, Vec<i32>), SheetError> {
    let caps = CHORD_DEFINITION_RE
        .captures(value)
        .ok_or_else(|| SheetError::grammar("chord definition", value))?;
    let chord = Chord::parse(&caps["chord"])?;
    let frets = caps["frets"]
        .split_whitespace()
        .map(parse_fret)
        .collect::<Result<Vec<_>, _>>()?;
    Ok((chord, frets))
}

/// Tokenize a whole document into its root environment.
pub fn tokenize(source: &str) -> Result<LocatedToken, SheetError> {
    Lexer::new(source).tokenize()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tokens(source: &str) -> Vec<Token> {
        tokenize(source)
            .unwrap()
            .children()
            .iter()
            .map(|t| t.token.clone())
            .collect()
    }

    #[test]
    fn test_simple_line() {
        assert_eq!(
            tokens("[C]Hello [G7.]world"),
            vec![
                Token::ChordRef("C".to_string()),
                Token::Text("Hello ".to_string()),
                Token::ChordRef("G7.".to_string()),
                Token::Text("world".to_string()),
            ]
        );
    }

    #[test]
    fn test_metadata_and_aliases() {
        assert_eq!(
            tokens("{t: My Song}\n{tempo: 90}"),
            vec![
                Token::Metadata {
                    key: MetaKey::Title,
                    value: "My Song".to_string()
                },
                Token::LineBreak,
                Token::Metadata {
                    key: MetaKey::Tempo,
                    value: "90".to_string()
                },
            ]
        );
    }

    #[test]
    fn test_invalid_metadata_value() {
        let err = tokenize("{time: 4/5}").unwrap_err();
        assert!(matches!(err, SheetError::GrammarError { what: "time signature", .. }));
        assert_eq!(err.location().map(|l| l.line), Some(1));
    }

    #[test]
    fn test_escapes_and_comment() {
        assert_eq!(
            tokens(r"a \[b\] \# c # note"),
            vec![
                Token::Text("a [b] # c ".to_string()),
                Token::Comment(" note".to_string()),
            ]
        );
    }

    #[test]
    fn test_blank_lines_collapse() {
        assert_eq!(
            tokens("a\n\n\n\nb\n"),
            vec![
                Token::Text("a".to_string()),
                Token::LineBreak,
                Token::ParagraphBreak,
                Token::Text("b".to_string()),
                Token::LineBreak,
            ]
        );
    }

    #[test]
    fn test_environment_nesting() {
        let root = tokenize("{soc: Refrain}\n[C]la\n{eoc}").unwrap();
        let children = root.children();
        assert_eq!(children.len(), 1);
        match &children[0].token {
            Token::Environment {
                name,
                label,
                children,
            } => {
                assert_eq!(name, "chorus");
                assert_eq!(label.as_deref(), Some("Refrain"));
                assert_eq!(
                    children.last().map(|t| &t.token),
                    Some(&Token::EndOfEnvironment("chorus".to_string()))
                );
            }
            other => panic!("expected environment, got {:?}", other),
        }
    }

    #[test]
    fn test_mismatched_environment() {
        let err = tokenize("{start_of_verse}\n{end_of_chorus}").unwrap_err();
        assert!(matches!(err, SheetError::StructuralError { .. }));
        assert_eq!(err.location().map(|l| (l.line, l.column)), Some((2, 1)));
    }

    #[test]
    fn test_unclosed_environment() {
        let err = tokenize("x\n  {start_of_verse}\n[C]la").unwrap_err();
        assert_eq!(err.location().map(|l| (l.line, l.column)), Some((2, 3)));
        assert!(err.to_string().contains("unclosed environment start_of_verse"));
    }

    #[test]
    fn test_tab_block() {
        let root = tokenize("{start_of_tab: riff}\n|0---|\n|--2-|\n{end_of_tab}\n[C]x").unwrap();
        match &root.children()[0].token {
            Token::Environment { name, children, .. } => {
                assert_eq!(name, "tab");
                assert_eq!(children[0].token, Token::TabLine("|--2-|".to_string()));
                assert_eq!(children[1].token, Token::TabLine("|0---|".to_string()));
                assert_eq!(children[2].token, Token::EndOfEnvironment("tab".to_string()));
            }
            other => panic!("expected tab environment, got {:?}", other),
        }
        assert_eq!(root.children()[1].token, Token::LineBreak);
    }

    #[test]
    fn test_tab_block_rejects_lyrics() {
        assert!(tokenize("{start_of_tab}\nhello\n{end_of_tab}").is_err());
        assert!(tokenize("{start_of_tab} [C]\n|0|\n{end_of_tab}").is_err());
        assert!(tokenize("{start_of_tab}\n|0|\n\n{end_of_tab}").is_err());
    }

    #[test]
    fn test_unknown_directive_and_bad_brace() {
        assert!(matches!(
            tokenize("{frobnicate: 1}").unwrap_err(),
            SheetError::GrammarError { .. }
        ));
        let err = tokenize("ok {title").unwrap_err();
        assert_eq!(err.location().map(|l| l.column), Some(4));
    }

    #[test]
    fn test_specialized_directives() {
        assert!(tokenize("{pattern: verse |d-du|}").is_ok());
        assert!(tokenize("{pattern-Bass: |d-du|}").is_ok());
        assert!(tokenize("{chord: Am 2 0 0 0}").is_ok());
        assert!(tokenize("{chord: Am}").is_err());
        assert!(tokenize("{chord: Hm 2 0 0 0}").is_err());
        assert!(tokenize("{instrument: Lead guitar steel}").is_ok());
        assert!(tokenize("{instrument: Odd custom}").is_err());
    }

    #[test]
    fn test_parse_chord_definition() {
        let (chord, frets) = parse_chord_definition("D7 2 x 2 3").unwrap();
        assert_eq!(chord.name(), "D7");
        assert_eq!(frets, vec![2, -1, 2, 3]);
    }
}
