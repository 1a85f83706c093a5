pub mod bar;
pub mod builder;
pub mod chord;
pub mod chord_lib;
pub mod error;
pub mod instrument;
pub mod lexer;
pub mod metadata;
pub mod note;
pub mod parser;
pub mod pattern;
pub mod playback;
pub mod record;
pub mod semantic;
pub mod serializer;
pub mod signature;
pub mod song;
pub mod transpose;

pub use bar::{Bar, BarParagraph};
pub use chord::{Chord, ChordSymbol};
pub use error::*;
pub use instrument::{Instrument, InstrumentLib};
pub use lexer::{tokenize, LocatedToken, Token};
pub use parser::parse;
pub use pattern::{Pattern, Strum};
pub use record::SongRecord;
pub use semantic::validate;
pub use serializer::{format, normalize, render};
pub use song::{PartKind, Song, SongPart};
pub use transpose::transpose_source;

/// Parse and validate song sheet text.
/// This is the main entry point for the library.
pub fn compile(source: &str) -> Result<Song, SheetError> {
    let song = parse(source)?;
    validate(&song)?;
    Ok(song)
}

/// Parse song sheet text and print it back in canonical form.
pub fn compile_to_source(source: &str) -> Result<String, SheetError> {
    Ok(compile(source)?.to_source())
}
