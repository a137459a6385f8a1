//! Error types for adapters.

use thiserror::Error;

/// Errors raised by a message transport.
#[derive(Debug, Error)]
pub enum TransportError {
    /// Could not establish the broker connection.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// A channel-level operation (declare, delete, consume) failed.
    #[error("Channel error: {0}")]
    Channel(String),

    /// Publishing a single message failed.
    #[error("Publish to '{destination}' failed: {reason}")]
    Publish {
        /// Destination the message was addressed to.
        destination: String,
        /// Broker-reported cause.
        reason: String,
    },

    /// The destination has not been declared.
    #[error("Destination '{0}' does not exist")]
    UnknownDestination(String),

    /// Acknowledging or rejecting a delivery failed.
    #[error("Acknowledgement of delivery {tag} failed: {reason}")]
    Ack {
        /// Delivery tag being settled.
        tag: u64,
        /// Broker-reported cause.
        reason: String,
    },

    /// The transport has been closed.
    #[error("Transport is closed")]
    Closed,
}

/// Errors raised by a notification relay.
#[derive(Debug, Error)]
pub enum NotifyError {
    /// The relay is misconfigured (bad address, host, credentials).
    #[error("Invalid notification config: {0}")]
    Config(String),

    /// Building the outgoing message failed.
    #[error("Failed to build notification: {0}")]
    Message(String),

    /// The relay rejected or failed to deliver the message.
    #[error("Notification delivery failed: {0}")]
    Delivery(String),
}

#[cfg(feature = "rabbitmq")]
impl From<lapin::Error> for TransportError {
    fn from(err: lapin::Error) -> Self {
        match err {
            lapin::Error::IOError(e) => TransportError::Connection(e.to_string()),
            lapin::Error::InvalidConnectionState(state) => {
                TransportError::Connection(format!("invalid connection state: {:?}", state))
            }
            other => TransportError::Channel(other.to_string()),
        }
    }
}
