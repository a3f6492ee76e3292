//! Typed errors for the places where callers branch on the failure kind.
//!
//! Everything else in the crate propagates `anyhow::Error`.

use thiserror::Error;

/// A file could not be turned into text.
///
/// Parse errors are per-file: the indexer logs them distinctly from storage
/// or embedding failures and the scanner moves on to the next file.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("io error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path} is {size} bytes, above the {limit} byte limit")]
    TooLarge { path: String, size: u64, limit: u64 },

    #[error("PDF extraction failed for {path}: {reason}")]
    Pdf { path: String, reason: String },

    #[error("office document extraction failed for {path}: {reason}")]
    Office { path: String, reason: String },

    #[error("no text could be extracted from {path}")]
    Empty { path: String },
}

/// A lookup whose contract says the target must exist.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("document not found: {0}")]
    DocumentNotFound(String),
}
