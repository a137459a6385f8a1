//! Readings produced by a reading source.

use crate::ChannelId;

/// A single sensor value for one channel at one instant.
///
/// Readings are immutable once produced; the publisher forwards them
/// unmodified as message payloads.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Reading {
    /// Opaque, ordered timestamp token copied from the source.
    pub timestamp: String,
    /// The channel this value belongs to.
    pub channel: ChannelId,
    /// Temperature in degrees.
    pub value: f64,
}

impl Reading {
    /// Create a new reading.
    pub fn new(timestamp: impl Into<String>, channel: ChannelId, value: f64) -> Self {
        Self {
            timestamp: timestamp.into(),
            channel,
            value,
        }
    }
}

/// All readings sharing one sampling instant.
///
/// A channel absent from `readings` had no value at this step; that is
/// "no reading", never zero.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TimeStep {
    /// The shared timestamp of this step.
    pub timestamp: String,
    /// Readings for the channels present at this step, in channel order.
    pub readings: Vec<Reading>,
}

impl TimeStep {
    /// Create an empty step for the given timestamp.
    pub fn new(timestamp: impl Into<String>) -> Self {
        Self {
            timestamp: timestamp.into(),
            readings: Vec::new(),
        }
    }

    /// Add a reading for `channel` stamped with this step's timestamp.
    pub fn with(mut self, channel: ChannelId, value: f64) -> Self {
        self.push(channel, value);
        self
    }

    /// Add a reading for `channel` stamped with this step's timestamp.
    pub fn push(&mut self, channel: ChannelId, value: f64) {
        self.readings
            .push(Reading::new(self.timestamp.clone(), channel, value));
    }

    /// The reading for `channel`, if present.
    pub fn get(&self, channel: ChannelId) -> Option<&Reading> {
        self.readings.iter().find(|r| r.channel == channel)
    }

    /// Check if no channel has a reading at this step.
    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_time_step_builder() {
        let step = TimeStep::new("t1")
            .with(ChannelId::Smoker, 225.0)
            .with(ChannelId::FoodB, 160.0);

        assert_eq!(step.readings.len(), 2);
        assert_eq!(step.get(ChannelId::Smoker).unwrap().value, 225.0);
        assert_eq!(step.get(ChannelId::FoodB).unwrap().timestamp, "t1");
        assert!(step.get(ChannelId::FoodA).is_none());
    }

    #[test]
    fn test_empty_step() {
        assert!(TimeStep::new("t1").is_empty());
    }
}
