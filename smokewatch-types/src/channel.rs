//! Channel identifiers.

use std::fmt;
use std::str::FromStr;

/// One independently monitored measurement stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "kebab-case"))]
pub enum ChannelId {
    /// The smoker chamber temperature.
    Smoker,
    /// The first food probe.
    FoodA,
    /// The second food probe.
    FoodB,
}

impl ChannelId {
    /// Every channel, in routing order.
    pub const ALL: [ChannelId; 3] = [ChannelId::Smoker, ChannelId::FoodA, ChannelId::FoodB];

    /// The destination (queue) name this channel publishes to by default.
    pub const fn default_destination(self) -> &'static str {
        match self {
            ChannelId::Smoker => "01-smoker",
            ChannelId::FoodA => "02-food-A",
            ChannelId::FoodB => "03-food-B",
        }
    }

    /// Human-readable label used in alert text.
    pub const fn label(self) -> &'static str {
        match self {
            ChannelId::Smoker => "Smoker",
            ChannelId::FoodA => "Food A",
            ChannelId::FoodB => "Food B",
        }
    }

    /// Short identifier used on the command line and in config keys.
    pub const fn key(self) -> &'static str {
        match self {
            ChannelId::Smoker => "smoker",
            ChannelId::FoodA => "food-a",
            ChannelId::FoodB => "food-b",
        }
    }
}

impl fmt::Display for ChannelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

/// Returned when a string names no known channel.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown channel '{0}' (expected smoker, food-a or food-b)")]
pub struct UnknownChannel(pub String);

impl FromStr for ChannelId {
    type Err = UnknownChannel;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "smoker" | "01-smoker" => Ok(ChannelId::Smoker),
            "food-a" | "food_a" | "a" | "02-food-a" => Ok(ChannelId::FoodA),
            "food-b" | "food_b" | "b" | "03-food-b" => Ok(ChannelId::FoodB),
            _ => Err(UnknownChannel(s.to_string())),
        }
    }
}
