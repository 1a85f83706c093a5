use crate::chord::{Chord, ChordSymbol};
use crate::chord_lib::render_fret;
use crate::error::SheetError;
use crate::lexer::{parse_chord_definition, tokenize, LocatedToken, Token};
use crate::metadata::MetaKey;
use crate::serializer::render;
use crate::signature::{KeySignature, Scale};

/// Move a key by some semitones, spelling the new tonic the way the key is usually written.
pub fn transpose_key(key: &KeySignature, semitones: i32) -> KeySignature {
    let pitch_class = (key.tonic.semitone() as i32 + semitones.rem_euclid(12)).rem_euclid(12);
    // Db Eb Ab Bb major, Eb Bb minor
    let flat = match key.scale {
        Scale::Major => matches!(pitch_class, 1 | 3 | 8 | 10),
        Scale::Minor => matches!(pitch_class, 3 | 10),
    };
    key.transpose(semitones, flat)
}

fn first_key(token: &LocatedToken) -> Option<KeySignature> {
    match &token.token {
        Token::Metadata {
            key: MetaKey::Key,
            value,
        } => value.trim().parse().ok(),
        _ => token.children().iter().find_map(first_key),
    }
}

struct Transposer {
    semitones: i32,
    /// Spelling from the song key; `None` keeps each chord's own style.
    prefer_flat: Option<bool>,
}

impl Transposer {
    fn chord(&self, chord: &Chord) -> Chord {
        let flat = self.prefer_flat.unwrap_or_else(|| chord.root.is_flat());
        chord.transpose(self.semitones, flat)
    }

    fn token(&self, token: &LocatedToken) -> Result<LocatedToken, SheetError> {
        let located = |e: SheetError| e.at(token.line, token.column);
        let new = match &token.token {
            Token::ChordRef(body) => {
                let symbol = ChordSymbol::parse(body).map_err(located)?;
                match symbol.chord {
                    Some(chord) => {
                        let markers = &body[chord.name().len()..];
                        Token::ChordRef(format!("{}{}", self.chord(&chord), markers))
                    }
                    None => token.token.clone(),
                }
            }
            Token::Metadata {
                key: MetaKey::Key,
                value,
            } => {
                let key: KeySignature = value.trim().parse().map_err(located)?;
                Token::Metadata {
                    key: MetaKey::Key,
                    value: transpose_key(&key, self.semitones).to_string(),
                }
            }
            Token::Directive {
                key,
                selector,
                value: Some(value),
            } if key == "chord" => {
                let (chord, frets) = parse_chord_definition(value).map_err(located)?;
                let frets: Vec<String> = frets
                    .iter()
                    .map(|f| {
                        if *f < 0 {
                            render_fret(*f)
                        } else {
                            render_fret((f + self.semitones.rem_euclid(12)).rem_euclid(12))
                        }
                    })
                    .collect();
                Token::Directive {
                    key: key.clone(),
                    selector: selector.clone(),
                    value: Some(format!("{} {}", self.chord(&chord), frets.join(" "))),
                }
            }
            Token::Environment {
                name,
                label,
                children,
            } => Token::Environment {
                name: name.clone(),
                label: label.clone(),
                children: children
                    .iter()
                    .map(|c| self.token(c))
                    .collect::<Result<_, _>>()?,
            },
            other => other.clone(),
        };
        Ok(LocatedToken::new(new, token.line, token.column))
    }
}

/// Transpose chord references, the song key and custom chord voicings.
///
/// Tab blocks hold absolute frets and are left as they are.
pub fn transpose(root: &LocatedToken, semitones: i32) -> Result<LocatedToken, SheetError> {
    let prefer_flat = first_key(root).map(|k| transpose_key(&k, semitones).prefers_flat());
    Transposer {
        semitones,
        prefer_flat,
    }
    .token(root)
}

/// Transpose song sheet text.
pub fn transpose_source(source: &str, semitones: i32) -> Result<String, SheetError> {
    let root = tokenize(source)?;
    Ok(render(&transpose(&root, semitones)?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_transpose_chords_keep_durations() {
        let out = transpose_source("[C.]one [G7...]two\n[Am]three", 2).unwrap();
        assert_eq!(out, "[D.]one [A7...]two\n[Bm]three");
    }

    #[test]
    fn test_key_decides_spelling() {
        let out = transpose_source("{key: F}\n[F][C7]", 1).unwrap();
        assert_eq!(out, "{key: F#}\n[F#][C#7]");
        let out = transpose_source("{key: C}\n[C][G]", 3).unwrap();
        assert_eq!(out, "{key: Eb}\n[Eb][Bb]");
    }

    #[test]
    fn test_without_key_chord_style_is_kept() {
        let out = transpose_source("[Bb][C]", -1).unwrap();
        assert_eq!(out, "[A][B]");
        let out = transpose_source("[Eb][D]", 1).unwrap();
        assert_eq!(out, "[E][D#]");
    }

    #[test]
    fn test_custom_voicing_stays_compatible() {
        let out = transpose_source("{chord: Am 2 0 0 x}\n[Am]", 2).unwrap();
        assert_eq!(out, "{chord: Bm 4 2 2 x}\n[Bm]");
        assert!(parse(&out).is_ok());
    }

    #[test]
    fn test_tab_and_no_chord_untouched() {
        let source = "{start_of_tab}\n|0-2-|\n{end_of_tab}\n[C..][..]";
        let out = transpose_source(source, 5).unwrap();
        assert_eq!(out, "{start_of_tab}\n|0-2-|\n{end_of_tab}\n[F..][..]");
    }

    #[test]
    fn test_transpose_key_spelling() {
        let key: KeySignature = "Am".parse().unwrap();
        assert_eq!(transpose_key(&key, 1).to_string(), "Bbm");
        assert_eq!(transpose_key(&key, 4).to_string(), "C#m");
        let key: KeySignature = "G".parse().unwrap();
        assert_eq!(transpose_key(&key, -1).to_string(), "F#");
    }

    #[test]
    fn test_extreme_offsets_reduce_to_an_octave() {
        let source = "{key: C}\n{chord: Am 2 0 0 x}\n[C][Am]";
        assert_eq!(
            transpose_source(source, i32::MAX).unwrap(),
            transpose_source(source, 7).unwrap()
        );
        assert_eq!(
            transpose_source(source, i32::MIN).unwrap(),
            transpose_source(source, 4).unwrap()
        );
    }
}
