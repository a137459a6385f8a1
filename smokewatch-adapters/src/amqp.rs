//! RabbitMQ transport over AMQP 0-9-1, using `lapin`.
//!
//! Messages go through the default exchange with the destination name as
//! routing key. Queues are declared durable and messages are published with
//! `delivery_mode = 2` so they survive a broker restart.
//!
//! ## Example
//!
//! ```rust,no_run
//! use smokewatch_adapters::amqp::{AmqpSubscription, AmqpTransport};
//! use smokewatch_adapters::{Subscription, Transport};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let uri = "amqp://127.0.0.1:5672/%2f";
//!
//!     let mut transport = AmqpTransport::connect(uri).await?;
//!     transport.reset_destination("01-smoker").await?;
//!     transport.publish("01-smoker", b"03/23/24 11:06:01, 35.6").await?;
//!     transport.close().await?;
//!
//!     let mut subscription = AmqpSubscription::connect(uri, "01-smoker").await?;
//!     if let Some(delivery) = subscription.recv().await? {
//!         subscription.ack(delivery.tag).await?;
//!     }
//!     subscription.close().await?;
//!     Ok(())
//! }
//! ```

use async_trait::async_trait;
use futures_util::StreamExt;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicPublishOptions, BasicQosOptions,
    BasicRejectOptions, QueueDeclareOptions, QueueDeleteOptions,
};
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, Consumer};
use tracing::{debug, info, warn};

use crate::{redact_uri, Delivery, Subscription, Transport, TransportError};

/// AMQP persistent delivery mode.
const PERSISTENT: u8 = 2;

/// Reply code for a normal connection close.
const REPLY_SUCCESS: u16 = 200;

async fn open(uri: &str) -> Result<(Connection, Channel), TransportError> {
    let connection = Connection::connect(uri, ConnectionProperties::default())
        .await
        .map_err(|e| TransportError::Connection(format!("{}: {}", redact_uri(uri), e)))?;
    let channel = connection.create_channel().await?;
    Ok((connection, channel))
}

async fn declare_durable(channel: &Channel, queue: &str) -> Result<u32, TransportError> {
    let declared = channel
        .queue_declare(
            queue,
            QueueDeclareOptions {
                durable: true,
                ..QueueDeclareOptions::default()
            },
            FieldTable::default(),
        )
        .await?;
    Ok(declared.message_count())
}

async fn consume(channel: &Channel, queue: &str) -> Result<Consumer, TransportError> {
    let consumer = channel
        .basic_consume(
            queue,
            &format!("smokewatch-{}", queue),
            BasicConsumeOptions::default(),
            FieldTable::default(),
        )
        .await?;
    Ok(consumer)
}

async fn shutdown(connection: &Connection, channel: &Channel) -> Result<(), TransportError> {
    if channel.status().connected() {
        channel.close(REPLY_SUCCESS, "OK").await?;
    }
    if connection.status().connected() {
        connection.close(REPLY_SUCCESS, "OK").await?;
    }
    Ok(())
}

/// Publishing side of a RabbitMQ connection.
pub struct AmqpTransport {
    connection: Connection,
    channel: Channel,
    description: String,
}

impl AmqpTransport {
    /// Connect to the broker at `uri` and open a channel.
    pub async fn connect(uri: &str) -> Result<Self, TransportError> {
        let (connection, channel) = open(uri).await?;
        let description = format!("amqp: {}", redact_uri(uri));
        info!(broker = %description, "connected");
        Ok(Self {
            connection,
            channel,
            description,
        })
    }
}

#[async_trait]
impl Transport for AmqpTransport {
    async fn reset_destination(&mut self, destination: &str) -> Result<u32, TransportError> {
        // Deleting an absent queue is not an error in RabbitMQ.
        let purged = self
            .channel
            .queue_delete(destination, QueueDeleteOptions::default())
            .await?;
        declare_durable(&self.channel, destination).await?;
        debug!(destination, purged, "reset durable queue");
        Ok(purged)
    }

    async fn publish(&mut self, destination: &str, payload: &[u8]) -> Result<(), TransportError> {
        let publish_error = |e: lapin::Error| TransportError::Publish {
            destination: destination.to_string(),
            reason: e.to_string(),
        };
        self.channel
            .basic_publish(
                "",
                destination,
                BasicPublishOptions::default(),
                payload,
                BasicProperties::default().with_delivery_mode(PERSISTENT),
            )
            .await
            .map_err(publish_error)?
            .await
            .map_err(publish_error)?;
        Ok(())
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        shutdown(&self.connection, &self.channel).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for AmqpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpTransport")
            .field("broker", &self.description)
            .finish()
    }
}

/// Consuming side of a RabbitMQ connection, bound to one durable queue.
///
/// Uses a prefetch of one so a single unacknowledged message is in flight
/// at a time; anything unacknowledged when the connection drops is
/// redelivered by the broker.
///
/// The broker cancels the consumer when its queue is deleted, which the
/// publisher does at startup. The subscription then declares the queue
/// again and resumes consuming, so only [`close`](Subscription::close)
/// ends the stream.
pub struct AmqpSubscription {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue: String,
    description: String,
    closed: bool,
}

impl AmqpSubscription {
    /// Connect, declare `queue` as durable and start consuming with manual acks.
    pub async fn connect(uri: &str, queue: &str) -> Result<Self, TransportError> {
        let (connection, channel) = open(uri).await?;
        let backlog = declare_durable(&channel, queue).await?;
        channel.basic_qos(1, BasicQosOptions::default()).await?;
        let consumer = consume(&channel, queue).await?;

        let description = format!("amqp: {} {}", redact_uri(uri), queue);
        info!(queue, backlog, "consuming");
        Ok(Self {
            connection,
            channel,
            consumer,
            queue: queue.to_string(),
            description,
            closed: false,
        })
    }

    /// Start consuming again after the broker cancelled the consumer.
    async fn resubscribe(&mut self) -> Result<(), TransportError> {
        if !self.channel.status().connected() {
            return Err(TransportError::Channel(format!(
                "consumer on '{}' cancelled and channel closed",
                self.queue
            )));
        }
        warn!(queue = %self.queue, "consumer cancelled by broker, consuming again");
        declare_durable(&self.channel, &self.queue).await?;
        self.consumer = consume(&self.channel, &self.queue).await?;
        Ok(())
    }
}

#[async_trait]
impl Subscription for AmqpSubscription {
    async fn recv(&mut self) -> Result<Option<Delivery>, TransportError> {
        loop {
            if self.closed {
                return Ok(None);
            }
            match self.consumer.next().await {
                Some(Ok(delivery)) => {
                    return Ok(Some(Delivery::new(delivery.delivery_tag, delivery.data)))
                }
                Some(Err(e)) => return Err(e.into()),
                None => self.resubscribe().await?,
            }
        }
    }

    async fn ack(&mut self, tag: u64) -> Result<(), TransportError> {
        self.channel
            .basic_ack(tag, BasicAckOptions::default())
            .await
            .map_err(|e| TransportError::Ack {
                tag,
                reason: e.to_string(),
            })
    }

    async fn reject(&mut self, tag: u64) -> Result<(), TransportError> {
        self.channel
            .basic_reject(tag, BasicRejectOptions { requeue: false })
            .await
            .map_err(|e| TransportError::Ack {
                tag,
                reason: e.to_string(),
            })
    }

    async fn close(&mut self) -> Result<(), TransportError> {
        self.closed = true;
        shutdown(&self.connection, &self.channel).await
    }

    fn description(&self) -> &str {
        &self.description
    }
}

impl std::fmt::Debug for AmqpSubscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AmqpSubscription")
            .field("consumer", &self.description)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_refused_is_connection_error() {
        // Port 1 is reserved and never runs an AMQP broker.
        let err = AmqpTransport::connect("amqp://user:pw@127.0.0.1:1/%2f")
            .await
            .unwrap_err();
        match err {
            TransportError::Connection(msg) => {
                assert!(msg.contains("127.0.0.1:1"));
                assert!(!msg.contains("pw"));
            }
            other => panic!("expected connection error, got {other:?}"),
        }
    }
}
