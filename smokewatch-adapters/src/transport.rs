//! The transport seam between publisher and monitors.

use async_trait::async_trait;

use crate::TransportError;

/// A message handed to a consumer, not yet settled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Tag used to acknowledge or reject this delivery.
    pub tag: u64,
    /// Raw message body.
    pub payload: Vec<u8>,
}

impl Delivery {
    /// Create a new delivery.
    pub fn new(tag: u64, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            tag,
            payload: payload.into(),
        }
    }
}

/// Producer side of a message transport.
///
/// Destinations are durable and messages are published persistent.
#[async_trait]
pub trait Transport: Send {
    /// Delete any existing destination with this name, then declare it
    /// again as durable and empty.
    ///
    /// Returns the number of stale messages discarded.
    async fn reset_destination(&mut self, destination: &str) -> Result<u32, TransportError>;

    /// Publish one persistent message.
    async fn publish(&mut self, destination: &str, payload: &[u8]) -> Result<(), TransportError>;

    /// Close the underlying connection.
    ///
    /// Closing an already-closed transport is a no-op.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Human-readable description, safe to log.
    fn description(&self) -> &str;
}

/// Consumer side of a message transport bound to one destination.
///
/// Deliveries arrive in the order the transport hands them out and stay
/// unsettled until [`ack`](Subscription::ack) or
/// [`reject`](Subscription::reject) is called.
#[async_trait]
pub trait Subscription: Send {
    /// Wait for the next delivery, with no timeout.
    ///
    /// Returns `Ok(None)` once the transport is closed and drained. A
    /// broker-side cancellation, such as the queue being deleted and
    /// declared again, does not end the stream: the subscription consumes
    /// from the new queue and keeps waiting.
    async fn recv(&mut self) -> Result<Option<Delivery>, TransportError>;

    /// Acknowledge a delivery as durably processed.
    async fn ack(&mut self, tag: u64) -> Result<(), TransportError>;

    /// Negatively acknowledge a delivery without requeueing it.
    async fn reject(&mut self, tag: u64) -> Result<(), TransportError>;

    /// Close the underlying connection.
    async fn close(&mut self) -> Result<(), TransportError>;

    /// Human-readable description, safe to log.
    fn description(&self) -> &str;
}
