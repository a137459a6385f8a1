//! The text payload carried on the transport.
//!
//! A wire message is a single UTF-8 line `"<timestamp>, <value>"`. The
//! channel is implied by the destination the message was published to.

use std::fmt;

/// Errors from decoding a wire payload.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WireError {
    /// Payload bytes are not valid UTF-8.
    #[error("payload is not valid UTF-8")]
    Utf8,

    /// No `,` separating timestamp and value.
    #[error("payload has no ',' separator: {0:?}")]
    MissingSeparator(String),

    /// The timestamp field is empty.
    #[error("payload has an empty timestamp: {0:?}")]
    EmptyTimestamp(String),

    /// The value field is not a finite decimal number.
    #[error("payload value is not a finite number: {0:?}")]
    InvalidValue(String),
}

/// A reading as it travels between publisher and monitor.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct WireMessage {
    /// Timestamp token of the reading.
    pub timestamp: String,
    /// The reading value in degrees.
    pub value: f64,
}

impl WireMessage {
    /// Create a new wire message.
    pub fn new(timestamp: impl Into<String>, value: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            value,
        }
    }

    /// Render the payload text.
    pub fn encode(&self) -> String {
        self.to_string()
    }

    /// Decode a payload into exactly one timestamp token and one float.
    ///
    /// The value is split off at the last comma so timestamps may
    /// themselves contain commas.
    pub fn parse(payload: &[u8]) -> Result<Self, WireError> {
        let text = std::str::from_utf8(payload).map_err(|_| WireError::Utf8)?;
        let text = text.trim();

        let (timestamp, value) = text
            .rsplit_once(',')
            .ok_or_else(|| WireError::MissingSeparator(text.to_string()))?;

        let timestamp = timestamp.trim();
        if timestamp.is_empty() {
            return Err(WireError::EmptyTimestamp(text.to_string()));
        }

        let value = value.trim();
        let value: f64 = value
            .parse()
            .map_err(|_| WireError::InvalidValue(value.to_string()))?;
        if !value.is_finite() {
            return Err(WireError::InvalidValue(text.to_string()));
        }

        Ok(Self::new(timestamp, value))
    }
}

impl fmt::Display for WireMessage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}, ", self.timestamp)?;
        fmt_plain(self.value, f)
    }
}

/// Plain decimal rendering; integral values keep one fractional digit.
fn fmt_plain(value: f64, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if value.is_finite() && value.fract() == 0.0 {
        write!(f, "{:.1}", value)
    } else {
        write!(f, "{}", value)
    }
}
