//! Pacing publisher.
//!
//! Drains a [`ReadingSource`] onto a [`Transport`], one message per present
//! channel reading, sleeping a fixed interval between time steps.

use std::future::Future;
use std::time::Duration;

use tracing::{debug, error, info, warn};

use smokewatch_adapters::Transport;
use smokewatch_types::{Router, TimeStep};

use crate::error::Result;
use crate::source::ReadingSource;

/// Outcome of a publisher run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PublishReport {
    /// Time steps consumed from the source.
    pub steps: u64,
    /// Messages published.
    pub published: u64,
    /// Messages whose publish failed.
    pub failed: u64,
    /// Destinations reset during setup.
    pub destinations: u32,
    /// Stale messages discarded during setup.
    pub purged: u32,
    /// Whether the run stopped on the shutdown signal.
    pub interrupted: bool,
}

/// Publishes readings to their channel destinations at a fixed cadence.
#[derive(Debug)]
pub struct PacingPublisher<T: Transport> {
    transport: T,
    router: Router,
    interval: Duration,
    report: PublishReport,
}

impl<T: Transport> PacingPublisher<T> {
    /// Create a publisher over an already connected transport.
    pub fn new(transport: T, router: Router, interval: Duration) -> Self {
        Self {
            transport,
            router,
            interval,
            report: PublishReport::default(),
        }
    }

    /// Progress so far.
    pub fn report(&self) -> PublishReport {
        self.report
    }

    /// Reset every routed destination so it exists, durable and empty.
    pub async fn setup(&mut self) -> Result<()> {
        for (channel, destination) in self.router.destinations() {
            let purged = self.transport.reset_destination(destination).await?;
            if purged > 0 {
                info!(%channel, destination, purged, "discarded stale messages");
            } else {
                debug!(%channel, destination, "destination ready");
            }
            self.report.destinations += 1;
            self.report.purged += purged;
        }
        Ok(())
    }

    /// Publish every reading in one time step.
    ///
    /// A failed publish is logged and counted; the remaining channels are
    /// still published.
    pub async fn publish_step(&mut self, step: &TimeStep) {
        for reading in &step.readings {
            let destination = self.router.route(reading.channel);
            let message = self.router.serialize(reading);
            match self
                .transport
                .publish(destination, message.encode().as_bytes())
                .await
            {
                Ok(()) => {
                    info!(
                        destination,
                        timestamp = %reading.timestamp,
                        value = reading.value,
                        "sent"
                    );
                    self.report.published += 1;
                }
                Err(e) => {
                    error!(destination, timestamp = %reading.timestamp, "{}", e);
                    self.report.failed += 1;
                }
            }
        }
        self.report.steps += 1;
    }

    /// Publish every step of `source`, sleeping between steps.
    ///
    /// Each step is published in full, then the interval elapses before the
    /// next one. There is no pause after the final step, so the run ends as
    /// soon as the last readings are out. A source error ends the stream.
    pub async fn stream(&mut self, source: &mut dyn ReadingSource) -> Result<()> {
        let mut first = true;
        while let Some(step) = source.next_step() {
            let step = step?;
            if !first {
                tokio::time::sleep(self.interval).await;
            }
            first = false;

            if step.is_empty() {
                debug!(timestamp = %step.timestamp, "no readings in step");
            }
            self.publish_step(&step).await;
        }
        Ok(())
    }

    /// Set up destinations, stream the source, and close the transport.
    ///
    /// `shutdown` stops the run early. The transport is closed on every
    /// exit path, including errors.
    pub async fn run<F>(mut self, source: &mut dyn ReadingSource, shutdown: F) -> Result<PublishReport>
    where
        F: Future<Output = ()>,
    {
        info!(
            transport = self.transport.description(),
            source = source.description(),
            interval = %crate::duration::format_duration(self.interval),
            "publisher starting"
        );

        let outcome = tokio::select! {
            result = self.setup_and_stream(source) => Some(result),
            _ = shutdown => None,
        };
        let outcome = outcome.unwrap_or_else(|| {
            warn!("interrupted, stopping publisher");
            self.report.interrupted = true;
            Ok(())
        });

        if let Err(e) = self.transport.close().await {
            error!("Failed to close transport: {}", e);
        }
        outcome?;

        info!(
            steps = self.report.steps,
            published = self.report.published,
            failed = self.report.failed,
            "publisher finished"
        );
        Ok(self.report)
    }

    async fn setup_and_stream(&mut self, source: &mut dyn ReadingSource) -> Result<()> {
        self.setup().await?;
        self.stream(source).await
    }
}
