//! Top-level error type for the publisher and monitors.

use std::path::PathBuf;

use thiserror::Error;

use smokewatch_adapters::{NotifyError, TransportError};

use crate::config::ConfigError;
use crate::source::SourceError;

/// Errors that end a publisher or monitor run.
#[derive(Debug, Error)]
pub enum Error {
    /// Settings could not be loaded or failed validation.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The reading source failed in a way that cannot be skipped.
    #[error(transparent)]
    Source(#[from] SourceError),

    /// The transport failed outside a single publish.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The JSON-lines alert log could not be opened.
    #[error("Failed to open alert file {path:?}: {source}")]
    AlertFile {
        /// Configured path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The notification relay could not be set up.
    #[error(transparent)]
    Notify(#[from] NotifyError),
}

/// Result alias for this crate.
pub type Result<T, E = Error> = std::result::Result<T, E>;
