//! # smokewatch
//!
//! Streams smoker and food-probe temperatures from a recorded CSV file onto
//! durable message queues, and watches each channel with a sliding-window
//! monitor that raises alerts on a smoker temperature drop or a food stall.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────┐   ┌───────────┐   ┌───────────┐   ┌──────────┐   ┌────────┐
//! │  source  │──▶│ publisher │──▶│ transport │──▶│ monitor  │──▶│ alert  │
//! │  (CSV)   │   │ (pacing)  │   │ (queues)  │   │ (window) │   │ (sink) │
//! └──────────┘   └───────────┘   └───────────┘   └────┬─────┘   └────────┘
//!                                                     │ stall
//!                                                     ▼
//!                                                ┌──────────┐
//!                                                │ notifier │
//!                                                └──────────┘
//! ```
//!
//! - **[`source`]**: [`ReadingSource`] trait; [`CsvSource`] reads one time step per row
//! - **[`publisher`]**: [`PacingPublisher`] resets destinations and publishes at a fixed interval
//! - **[`monitor`]**: [`SlidingWindow`], [`Predicate`] and the per-channel [`Monitor`] loop
//! - **[`alert`]**: [`AlertSink`] implementations (log, JSON lines, channel, fanout)
//! - **[`config`]**: layered [`Settings`]
//!
//! The publisher and monitors only share the transport, so they can run as
//! separate processes against RabbitMQ or together against the in-memory
//! broker.
//!
//! ## Usage
//!
//! ```bash
//! # Terminal 1..3
//! smokewatch monitor smoker
//! smokewatch monitor food-a
//! smokewatch monitor food-b
//!
//! # Terminal 4
//! smokewatch publish --file smoker-temps.csv
//!
//! # Everything in one process, no broker needed
//! smokewatch demo --interval 100ms
//! ```
//!
//! ## As a library
//!
//! ```
//! use std::num::NonZeroUsize;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! use smokewatch::adapters::memory::MemoryBroker;
//! use smokewatch::adapters::LogNotifier;
//! use smokewatch::types::{ChannelId, Router, TimeStep};
//! use smokewatch::{ChannelSink, Monitor, MonitorConfig, PacingPublisher, StepSource};
//!
//! # tokio_test::block_on(async {
//! let broker = MemoryBroker::new();
//! let mut subscription = broker.subscribe("01-smoker");
//!
//! let mut source = StepSource::new(vec![
//!     TimeStep::new("t1").with(ChannelId::Smoker, 225.0),
//!     TimeStep::new("t2").with(ChannelId::Smoker, 100.0),
//! ]);
//! PacingPublisher::new(broker.transport(), Router::default(), Duration::ZERO)
//!     .run(&mut source, std::future::pending())
//!     .await
//!     .unwrap();
//! broker.close();
//!
//! let mut config = MonitorConfig::defaults_for(ChannelId::Smoker);
//! config.capacity = NonZeroUsize::new(2).unwrap();
//! let (sink, mut alerts) = ChannelSink::create();
//! let mut monitor = Monitor::new(config, Arc::new(sink), Arc::new(LogNotifier));
//! monitor.run(&mut subscription).await.unwrap();
//!
//! assert_eq!(alerts.recv().await.unwrap().trigger_timestamp, "t2");
//! # });
//! ```

pub mod alert;
pub mod config;
pub mod dashboard;
pub mod duration;
pub mod error;
pub mod logging;
pub mod monitor;
pub mod publisher;
pub mod source;

pub use smokewatch_adapters as adapters;
pub use smokewatch_types as types;

pub use alert::{AlertSink, ChannelSink, FanoutSink, JsonLinesSink, LogSink};
pub use config::{ConfigError, Settings};
pub use error::{Error, Result};
pub use monitor::{Monitor, MonitorConfig, MonitorStats, Predicate, PredicateKind, SlidingWindow};
pub use publisher::{PacingPublisher, PublishReport};
pub use source::{Columns, CsvSource, ReadingSource, SourceError, StepSource};

#[cfg(test)]
mod tests {
    use super::*;
    use std::num::NonZeroUsize;
    use std::sync::Arc;
    use std::time::Duration;

    use adapters::memory::MemoryBroker;
    use adapters::LogNotifier;
    use types::{AlertKind, ChannelId, Router};

    const CSV: &str = "\
Time (UTC),Channel1,Channel2,Channel3
t1,225.0,150.0,160.0
t2,100.0,150.5,160.2
";

    fn monitor_for(
        channel: ChannelId,
        capacity: usize,
    ) -> (Monitor, tokio::sync::mpsc::UnboundedReceiver<types::AlertEvent>) {
        let mut config = MonitorConfig::defaults_for(channel);
        config.capacity = NonZeroUsize::new(capacity).unwrap();
        let (sink, alerts) = ChannelSink::create();
        (Monitor::new(config, Arc::new(sink), Arc::new(LogNotifier)), alerts)
    }

    #[tokio::test(start_paused = true)]
    async fn test_csv_to_drop_alert_end_to_end() {
        let broker = MemoryBroker::new();
        broker.inject("01-smoker", "stale, 500.0");

        let mut source = CsvSource::from_reader(CSV.as_bytes(), &Columns::default(), "inline").unwrap();
        let report = PacingPublisher::new(
            broker.transport(),
            Router::default(),
            Duration::from_secs(30),
        )
        .run(&mut source, std::future::pending())
        .await
        .unwrap();
        assert_eq!(report.published, 6);
        assert_eq!(report.purged, 1);
        broker.close();

        let mut subscription = broker.subscribe("01-smoker");
        let (mut monitor, mut alerts) = monitor_for(ChannelId::Smoker, 2);
        let stats = monitor.run(&mut subscription).await.unwrap();

        assert_eq!(stats.received, 2);
        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.trigger_timestamp, "t2");
        assert_eq!(alert.kind, AlertKind::Drop { magnitude: 125.0 });
        assert_eq!(alert.message, "Smoker alert! Temperature dropped by 125.0 F (at t2)");
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_alert_on_fifth_smoker_reading() {
        let broker = MemoryBroker::new();
        let mut subscription = broker.subscribe("01-smoker");
        let (mut monitor, mut alerts) = monitor_for(ChannelId::Smoker, 5);
        let consumer = tokio::spawn(async move {
            let stats = monitor.run(&mut subscription).await;
            (stats, monitor)
        });

        let mut source = StepSource::new(
            [225.0, 222.0, 218.0, 214.0, 209.0]
                .into_iter()
                .enumerate()
                .map(|(i, v)| types::TimeStep::new(format!("t{}", i + 1)).with(ChannelId::Smoker, v))
                .collect(),
        );
        PacingPublisher::new(broker.transport(), Router::default(), Duration::from_secs(30))
            .run(&mut source, std::future::pending())
            .await
            .unwrap();
        broker.close();

        let (stats, monitor) = consumer.await.unwrap();
        assert_eq!(stats.unwrap().alerts, 1);
        assert_eq!(monitor.window().len(), 4);

        let alert = alerts.recv().await.unwrap();
        assert_eq!(alert.trigger_timestamp, "t5");
        assert_eq!(alert.kind, AlertKind::Drop { magnitude: 16.0 });
        assert!(alerts.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn test_running_monitor_survives_publisher_setup() {
        let broker = MemoryBroker::new();
        broker.inject("02-food-A", "stale, 140.0");

        let mut subscription = broker.subscribe("02-food-A");
        let (mut monitor, mut alerts) = monitor_for(ChannelId::FoodA, 3);
        let consumer = tokio::spawn(async move {
            let stats = monitor.run(&mut subscription).await;
            (stats, subscription)
        });

        // setup deletes and re-declares every queue under the live consumer
        let mut source = StepSource::new(
            [150.0, 150.3, 150.1, 150.2]
                .into_iter()
                .enumerate()
                .map(|(i, v)| types::TimeStep::new(format!("t{}", i + 1)).with(ChannelId::FoodA, v))
                .collect(),
        );
        PacingPublisher::new(broker.transport(), Router::default(), Duration::from_secs(30))
            .run(&mut source, std::future::pending())
            .await
            .unwrap();
        assert!(!consumer.is_finished());
        broker.close();

        let (stats, subscription) = consumer.await.unwrap();
        let stats = stats.unwrap();
        assert_eq!(stats.received, 4);
        assert_eq!(subscription.resubscribed(), 1);

        assert_eq!(alerts.recv().await.unwrap().trigger_timestamp, "t3");
        assert_eq!(alerts.recv().await.unwrap().trigger_timestamp, "t4");
    }
}
