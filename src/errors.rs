use std::io;

use thiserror::Error;

use crate::types::PathString;

/// Error type for configuration, input, and output failures.
///
/// Recoverable per-record problems (malformed lines, unresolved images,
/// failed copies) are logged and counted instead of surfacing here.
#[derive(Debug, Error)]
pub enum BatchError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("listing source '{path}' is unavailable: {reason}")]
    SourceUnavailable { path: PathString, reason: String },
    #[error("image index '{path}' could not be read: {reason}")]
    ImageIndex { path: PathString, reason: String },
    #[error("batch metadata '{path}' is invalid: {reason}")]
    Metadata { path: PathString, reason: String },
    #[error(transparent)]
    Io(#[from] io::Error),
}
