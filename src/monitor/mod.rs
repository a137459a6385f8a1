//! Sliding-window monitors.
//!
//! One monitor consumes one channel's destination. Each message is parsed,
//! appended to the window and, once the window is full, the channel's
//! predicate is evaluated before the oldest value is evicted. The message
//! is acknowledged only after that sequence completes.

mod predicate;
mod window;

pub use predicate::{Predicate, PredicateKind};
pub use window::SlidingWindow;

use std::num::NonZeroUsize;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use smokewatch_adapters::{Notifier, Subscription, TransportError};
use smokewatch_types::{AlertEvent, ChannelId, WireError, WireMessage};

use crate::alert::AlertSink;

/// Per-monitor configuration, fixed at startup.
#[derive(Debug, Clone, PartialEq)]
pub struct MonitorConfig {
    /// Channel being watched.
    pub channel: ChannelId,
    /// Destination to consume from.
    pub queue: String,
    /// Window capacity N.
    pub capacity: NonZeroUsize,
    /// Anomaly rule.
    pub predicate: Predicate,
}

impl MonitorConfig {
    /// The built-in configuration for `channel`.
    pub fn defaults_for(channel: ChannelId) -> Self {
        let (capacity, predicate) = match channel {
            ChannelId::Smoker => (NonZeroUsize::new(5), Predicate::drop(15.0)),
            ChannelId::FoodA | ChannelId::FoodB => (NonZeroUsize::new(20), Predicate::stall(1.0)),
        };
        Self {
            channel,
            queue: channel.default_destination().to_string(),
            capacity: capacity.unwrap_or(NonZeroUsize::MIN),
            predicate,
        }
    }

    /// An empty window sized for this configuration.
    pub fn window(&self) -> SlidingWindow {
        SlidingWindow::new(self.capacity)
    }
}

/// Handle one payload against `window`.
///
/// A payload that does not parse leaves the window untouched.
pub fn process(
    config: &MonitorConfig,
    window: &mut SlidingWindow,
    payload: &[u8],
) -> Result<Option<AlertEvent>, WireError> {
    let message = WireMessage::parse(payload)?;
    window.push(message.value);

    if !window.is_full() {
        return Ok(None);
    }
    let alert = config
        .predicate
        .evaluate(window)
        .map(|kind| AlertEvent::new(config.channel, message.timestamp, kind));
    window.evict_oldest();
    Ok(alert)
}

/// Counters kept by a running monitor.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    /// Messages acknowledged.
    pub received: u64,
    /// Messages rejected as unparseable.
    pub rejected: u64,
    /// Alerts raised.
    pub alerts: u64,
}

/// A sliding-window monitor for one channel.
#[derive(Debug)]
pub struct Monitor {
    config: MonitorConfig,
    window: SlidingWindow,
    sink: Arc<dyn AlertSink>,
    notifier: Arc<dyn Notifier>,
    stats: MonitorStats,
}

impl Monitor {
    /// Create a monitor with an empty window.
    pub fn new(config: MonitorConfig, sink: Arc<dyn AlertSink>, notifier: Arc<dyn Notifier>) -> Self {
        let window = config.window();
        Self {
            config,
            window,
            sink,
            notifier,
            stats: MonitorStats::default(),
        }
    }

    /// The monitor's configuration.
    pub fn config(&self) -> &MonitorConfig {
        &self.config
    }

    /// Current window contents.
    pub fn window(&self) -> &SlidingWindow {
        &self.window
    }

    /// Counters so far.
    pub fn stats(&self) -> MonitorStats {
        self.stats
    }

    /// Process one payload, dispatching any alert.
    ///
    /// Stall alerts are also relayed through the notifier; a relay failure
    /// is logged and does not fail the message.
    pub async fn handle(&mut self, payload: &[u8]) -> Result<Option<AlertEvent>, WireError> {
        let alert = process(&self.config, &mut self.window, payload)?;
        info!(
            channel = %self.config.channel,
            payload = %String::from_utf8_lossy(payload),
            "received"
        );

        let Some(alert) = alert else {
            return Ok(None);
        };
        self.stats.alerts += 1;
        self.sink.deliver(&alert);

        if alert.is_stall() {
            if let Err(e) = self.notifier.notify(&alert.message).await {
                error!(channel = %self.config.channel, "Failed to send notification: {}", e);
            }
        }
        Ok(Some(alert))
    }

    /// Consume from `subscription` until it reports end of stream.
    ///
    /// Parse failures reject the message and continue. Transport failures
    /// end the loop.
    pub async fn run<S>(&mut self, subscription: &mut S) -> Result<MonitorStats, TransportError>
    where
        S: Subscription + ?Sized,
    {
        info!(
            channel = %self.config.channel,
            source = subscription.description(),
            capacity = self.config.capacity.get(),
            threshold = self.config.predicate.threshold,
            "monitor waiting for messages"
        );

        while let Some(delivery) = subscription.recv().await? {
            match self.handle(&delivery.payload).await {
                Ok(_) => {
                    subscription.ack(delivery.tag).await?;
                    self.stats.received += 1;
                }
                Err(e) => {
                    warn!(
                        channel = %self.config.channel,
                        payload = %String::from_utf8_lossy(&delivery.payload),
                        "Rejecting malformed message: {}",
                        e
                    );
                    subscription.reject(delivery.tag).await?;
                    self.stats.rejected += 1;
                }
            }
        }

        debug!(channel = %self.config.channel, "subscription drained");
        Ok(self.stats)
    }
}
