//! Delimited-file reading source.
//!
//! Reads a CSV file with a header row. One column carries the shared
//! timestamp and three columns carry the per-channel temperatures; any of
//! the three may be empty on a given row.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use csv::{Reader, ReaderBuilder, StringRecord, Trim};
use tracing::{debug, warn};

use smokewatch_types::{ChannelId, TimeStep};

use super::{ReadingSource, SourceError};

/// Header names used to locate each field.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Columns {
    /// Shared timestamp column.
    pub timestamp: String,
    /// Smoker temperature column.
    pub smoker: String,
    /// Food A temperature column.
    pub food_a: String,
    /// Food B temperature column.
    pub food_b: String,
}

impl Default for Columns {
    fn default() -> Self {
        Self {
            timestamp: "Time (UTC)".to_string(),
            smoker: "Channel1".to_string(),
            food_a: "Channel2".to_string(),
            food_b: "Channel3".to_string(),
        }
    }
}

impl Columns {
    fn for_channel(&self, channel: ChannelId) -> &str {
        match channel {
            ChannelId::Smoker => &self.smoker,
            ChannelId::FoodA => &self.food_a,
            ChannelId::FoodB => &self.food_b,
        }
    }
}

/// Field positions resolved from the header row.
#[derive(Debug, Clone, Copy)]
struct Layout {
    timestamp: usize,
    channels: [(ChannelId, usize); 3],
}

/// A reading source backed by a CSV reader.
///
/// Rows are parsed lazily as the publisher asks for them. Empty fields mean
/// "no reading"; unparseable values are logged and skipped for that row
/// only.
pub struct CsvSource<R> {
    reader: Reader<R>,
    layout: Layout,
    record: StringRecord,
    description: String,
}

impl CsvSource<File> {
    /// Open a CSV file.
    ///
    /// A missing file or missing header column is an error.
    pub fn open<P: AsRef<Path>>(path: P, columns: &Columns) -> Result<Self, SourceError> {
        let path = path.as_ref();
        let file = File::open(path).map_err(|source| SourceError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_reader(file, columns, &format!("file: {}", path.display()))
    }
}

impl<R: Read> CsvSource<R> {
    /// Read CSV from any reader.
    pub fn from_reader(reader: R, columns: &Columns, description: &str) -> Result<Self, SourceError> {
        let mut reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .from_reader(reader);

        let headers = reader.headers()?.clone();
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h == name.trim())
                .ok_or_else(|| SourceError::MissingColumn(name.to_string()))
        };

        let layout = Layout {
            timestamp: find(&columns.timestamp)?,
            channels: [
                (ChannelId::Smoker, find(columns.for_channel(ChannelId::Smoker))?),
                (ChannelId::FoodA, find(columns.for_channel(ChannelId::FoodA))?),
                (ChannelId::FoodB, find(columns.for_channel(ChannelId::FoodB))?),
            ],
        };

        Ok(Self {
            reader,
            layout,
            record: StringRecord::new(),
            description: description.to_string(),
        })
    }

    /// Build a step from the current record, or `None` if the row has no
    /// timestamp.
    fn parse_record(&self) -> Option<TimeStep> {
        let line = self.record.position().map_or(0, |p| p.line());
        let timestamp = self.record.get(self.layout.timestamp).unwrap_or_default();
        if timestamp.is_empty() {
            warn!(line, "skipping row without a timestamp");
            return None;
        }

        let mut step = TimeStep::new(timestamp);
        for (channel, index) in self.layout.channels {
            let field = self.record.get(index).unwrap_or_default();
            if field.is_empty() {
                debug!(line, %channel, "no reading");
                continue;
            }
            match field.parse::<f64>() {
                Ok(value) if value.is_finite() => step.push(channel, value),
                _ => warn!(line, %channel, field, "skipping unparseable value"),
            }
        }
        Some(step)
    }
}

impl<R: Read + Send> ReadingSource for CsvSource<R> {
    fn next_step(&mut self) -> Option<Result<TimeStep, SourceError>> {
        loop {
            match self.reader.read_record(&mut self.record) {
                Ok(false) => return None,
                Err(e) => return Some(Err(e.into())),
                Ok(true) => {
                    if let Some(step) = self.parse_record() {
                        return Some(Ok(step));
                    }
                }
            }
        }
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl<R> std::fmt::Debug for CsvSource<R> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CsvSource")
            .field("description", &self.description)
            .finish_non_exhaustive()
    }
}
