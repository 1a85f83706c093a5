//! # Error Types
//!
//! This module defines all error types for the song sheet compiler.
//!
//! Every malformed document aborts the parse and surfaces exactly one error.
//! There is no recoverable error class: callers fix the text and re-submit it.
//!
//! ## Error Types
//! - `GrammarError` - a line, chord, pattern or directive value does not match its grammar
//! - `StructuralError` - beat sums, strum counts, environments or voicings are inconsistent
//! - `LookupError` - an unknown pattern or instrument was referenced
//!
//! ## Usage
//! ```rust
//! use chordsheet::{parse, SheetError};
//!
//! match parse("[H]Hello") {
//!     Ok(song) => println!("{} bars", song.bars().count()),
//!     Err(SheetError::GrammarError { what, value, .. }) => {
//!         eprintln!("not a valid {}: {}", what, value);
//!     }
//!     Err(e) => eprintln!("Error: {}", e),
//! }
//! ```

use std::fmt;

use thiserror::Error;

/// A 1-based position in the source text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

fn location_suffix(location: &Option<Location>) -> String {
    match location {
        Some(loc) => format!(" at {}", loc),
        None => String::new(),
    }
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SheetError {
    /// Text does not match its grammar.
    ///
    /// # Example
    /// ```
    /// # use chordsheet::{Location, SheetError};
    /// let err = SheetError::GrammarError {
    ///     what: "chord",
    ///     value: "H7".to_string(),
    ///     location: Some(Location { line: 3, column: 5 }),
    /// };
    /// assert_eq!(err.to_string(), "Grammar error at line 3, column 5: invalid chord 'H7'");
    /// ```
    #[error("Grammar error{}: invalid {what} '{value}'", location_suffix(.location))]
    GrammarError {
        what: &'static str,
        value: String,
        location: Option<Location>,
    },

    /// An invariant of the musical structure is violated.
    ///
    /// # Example
    /// ```
    /// # use chordsheet::SheetError;
    /// let err = SheetError::structural("beats don't add up: bar 2 needs 4 beats, got 5");
    /// assert_eq!(err.to_string(), "Structural error: beats don't add up: bar 2 needs 4 beats, got 5");
    /// ```
    #[error("Structural error{}: {message}", location_suffix(.location))]
    StructuralError {
        message: String,
        location: Option<Location>,
    },

    /// A pattern or instrument name that was never defined.
    #[error("Unknown {what} '{name}'{}", location_suffix(.location))]
    LookupError {
        what: &'static str,
        name: String,
        location: Option<Location>,
    },
}

impl SheetError {
    pub fn grammar(what: &'static str, value: impl Into<String>) -> Self {
        SheetError::GrammarError {
            what,
            value: value.into(),
            location: None,
        }
    }

    pub fn structural(message: impl Into<String>) -> Self {
        SheetError::StructuralError {
            message: message.into(),
            location: None,
        }
    }

    pub fn lookup(what: &'static str, name: impl Into<String>) -> Self {
        SheetError::LookupError {
            what,
            name: name.into(),
            location: None,
        }
    }

    /// Attach a source position unless the error already carries one.
    pub fn at(self, line: usize, column: usize) -> Self {
        let here = Some(Location { line, column });
        match self {
            SheetError::GrammarError {
                what,
                value,
                location: None,
            } => SheetError::GrammarError {
                what,
                value,
                location: here,
            },
            SheetError::StructuralError {
                message,
                location: None,
            } => SheetError::StructuralError {
                message,
                location: here,
            },
            SheetError::LookupError {
                what,
                name,
                location: None,
            } => SheetError::LookupError {
                what,
                name,
                location: here,
            },
            other => other,
        }
    }

    pub fn location(&self) -> Option<Location> {
        match self {
            SheetError::GrammarError { location, .. }
            | SheetError::StructuralError { location, .. }
            | SheetError::LookupError { location, .. } => *location,
        }
    }
}

/// Failures of the playback side.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EngineError {
    #[error("Audio engine unavailable: {0}")]
    Unavailable(String),

    #[error("Audio engine not initialized")]
    NotInitialized,

    #[error("No song loaded")]
    NoSong,

    #[error("Invalid scheduler config: {0}")]
    Config(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_at_only_fills_missing_location() {
        let err = SheetError::grammar("pattern", "|dq|").at(2, 4).at(9, 9);
        assert_eq!(err.location(), Some(Location { line: 2, column: 4 }));
        assert_eq!(err.to_string(), "Grammar error at line 2, column 4: invalid pattern '|dq|'");
    }

    #[test]
    fn test_lookup_location() {
        let err = SheetError::lookup("pattern", "chorus");
        assert_eq!(err.to_string(), "Unknown pattern 'chorus'");
        let err = err.at(4, 1);
        assert_eq!(err.location(), Some(Location { line: 4, column: 1 }));
        assert_eq!(err.to_string(), "Unknown pattern 'chorus' at line 4, column 1");
    }
}
