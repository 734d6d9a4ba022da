//! Key parsing and reconciliation errors

use std::path::PathBuf;

use thiserror::Error;

/// A line that looks like a key but does not follow the authorized_keys grammar
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyLineError {
    /// No recognised key algorithm token
    #[error("No key algorithm found")]
    MissingAlgorithm,

    /// Algorithm token present but nothing after it
    #[error("Missing base64 payload after {algorithm}")]
    MissingPayload { algorithm: String },

    /// Payload contains characters outside the base64 alphabet
    #[error("Invalid character {found:?} in key payload")]
    InvalidPayload { found: char },

    /// An options field opened a double quote that never closes
    #[error("Unterminated quote in key options")]
    UnterminatedQuote,
}

/// Errors while applying a local keyfile to a [`KeyFile`](crate::KeyFile)
#[derive(Error, Debug)]
pub enum KeyFileError {
    /// Keyfile does not exist
    #[error("Keyfile does not exist: {0}")]
    NotFound(PathBuf),

    /// Keyfile could not be read
    #[error("Failed to read keyfile {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A key-shaped line failed to parse; the rest of the file was not applied
    #[error("Malformed key on line {line} of {source_name}: {error}")]
    Malformed {
        source_name: String,
        line: usize,
        #[source]
        error: KeyLineError,
    },
}
