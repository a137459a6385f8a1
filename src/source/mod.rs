//! Reading source abstraction.
//!
//! A reading source yields [`TimeStep`]s in order, one per sampling instant.
//! Channels without a value at a step are simply absent from it.

mod csv;
mod steps;

pub use self::csv::{Columns, CsvSource};
pub use steps::StepSource;

use std::fmt::Debug;
use std::path::PathBuf;

use thiserror::Error;

use smokewatch_types::TimeStep;

/// Failures that stop a reading source.
///
/// Bad values in individual fields are not errors: the source logs and
/// skips them.
#[derive(Debug, Error)]
pub enum SourceError {
    /// The file could not be opened.
    #[error("Failed to open {path:?}: {source}")]
    Open {
        /// Path that was tried.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A required column is missing from the header row.
    #[error("Column '{0}' not found in header row")]
    MissingColumn(String),

    /// The file is not readable as delimited text.
    #[error("Malformed input: {0}")]
    Malformed(#[from] ::csv::Error),
}

/// Trait for anything that yields time steps to the publisher.
///
/// # Example
///
/// ```
/// use smokewatch::source::{ReadingSource, StepSource};
/// use smokewatch::types::{ChannelId, TimeStep};
///
/// let mut source = StepSource::new(vec![TimeStep::new("t1").with(ChannelId::Smoker, 225.0)]);
/// let step = source.next_step().unwrap().unwrap();
/// assert_eq!(step.readings.len(), 1);
/// assert!(source.next_step().is_none());
/// ```
pub trait ReadingSource: Send + Debug {
    /// The next time step, `None` when exhausted.
    fn next_step(&mut self) -> Option<Result<TimeStep, SourceError>>;

    /// Human-readable description of the source.
    fn description(&self) -> &str;
}
