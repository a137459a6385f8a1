//! Alert events raised by monitors.

use std::fmt;

use crate::ChannelId;

/// What kind of anomaly fired.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(tag = "kind", rename_all = "snake_case"))]
pub enum AlertKind {
    /// Oldest minus newest value across a full window.
    Drop {
        /// Size of the decrease in degrees.
        magnitude: f64,
    },
    /// Max minus min across a full window.
    Stall {
        /// Total variation in degrees.
        spread: f64,
    },
}

/// An anomaly detected on one channel.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct AlertEvent {
    /// Channel the monitor watches.
    pub channel: ChannelId,
    /// Timestamp of the newest reading, the one that completed the window.
    pub trigger_timestamp: String,
    /// The predicate that fired and its measured quantity.
    #[cfg_attr(feature = "serde", serde(flatten))]
    pub kind: AlertKind,
    /// Human-readable alert text.
    pub message: String,
}

impl AlertEvent {
    /// Build an alert with generated message text.
    pub fn new(channel: ChannelId, trigger_timestamp: impl Into<String>, kind: AlertKind) -> Self {
        let trigger_timestamp = trigger_timestamp.into();
        let message = match kind {
            AlertKind::Drop { magnitude } => format!(
                "{} alert! Temperature dropped by {:.1} F (at {})",
                channel.label(),
                magnitude,
                trigger_timestamp
            ),
            AlertKind::Stall { spread } => format!(
                "{} stall alert! Temperature changed only {:.1} F (at {})",
                channel.label(),
                spread,
                trigger_timestamp
            ),
        };
        Self {
            channel,
            trigger_timestamp,
            kind,
            message,
        }
    }

    /// Check if this is a stall alert.
    pub fn is_stall(&self) -> bool {
        matches!(self.kind, AlertKind::Stall { .. })
    }
}

impl fmt::Display for AlertEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_drop_message_names_magnitude() {
        let alert = AlertEvent::new(ChannelId::Smoker, "t2", AlertKind::Drop { magnitude: 125.0 });
        assert_eq!(
            alert.message,
            "Smoker alert! Temperature dropped by 125.0 F (at t2)"
        );
        assert!(!alert.is_stall());
    }

    #[test]
    fn test_stall_message() {
        let alert = AlertEvent::new(ChannelId::FoodB, "t7", AlertKind::Stall { spread: 0.4 });
        assert!(alert.message.starts_with("Food B stall alert!"));
        assert!(alert.message.contains("t7"));
        assert!(alert.is_stall());
    }

    #[cfg(feature = "serde")]
    #[test]
    fn test_serde_shape() {
        let alert = AlertEvent::new(ChannelId::FoodA, "t3", AlertKind::Stall { spread: 0.5 });
        let json = serde_json::to_value(&alert).unwrap();
        assert_eq!(json["channel"], "food-a");
        assert_eq!(json["kind"], "stall");
        assert_eq!(json["spread"], 0.5);

        let parsed: AlertEvent = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, alert);
    }
}
