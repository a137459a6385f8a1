//! Channel routing.

use std::collections::BTreeMap;

use crate::{ChannelId, Reading, WireMessage};

/// Maps channels to transport destinations and serializes readings.
///
/// The router is a pure function of its routing table; it never fails
/// for a valid [`ChannelId`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Router {
    routes: BTreeMap<ChannelId, String>,
}

impl Default for Router {
    fn default() -> Self {
        Self {
            routes: ChannelId::ALL
                .iter()
                .map(|c| (*c, c.default_destination().to_string()))
                .collect(),
        }
    }
}

impl Router {
    /// Create a router with the default destination names.
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the destination of one channel.
    pub fn with_route(mut self, channel: ChannelId, destination: impl Into<String>) -> Self {
        self.routes.insert(channel, destination.into());
        self
    }

    /// The destination name for a channel.
    pub fn route(&self, channel: ChannelId) -> &str {
        self.routes
            .get(&channel)
            .map(String::as_str)
            .unwrap_or_else(|| channel.default_destination())
    }

    /// Build the wire message for a reading.
    pub fn serialize(&self, reading: &Reading) -> WireMessage {
        WireMessage::new(reading.timestamp.clone(), reading.value)
    }

    /// Every destination in channel order.
    pub fn destinations(&self) -> impl Iterator<Item = (ChannelId, &str)> + '_ {
        ChannelId::ALL.into_iter().map(|c| (c, self.route(c)))
    }
}
