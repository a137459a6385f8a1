//! Alert sinks: where monitors hand finished alert events.
//!
//! A sink never fails the monitor. Delivery problems are logged and the
//! alert is otherwise dropped.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{error, warn};

use smokewatch_adapters::{LogNotifier, Notifier};
use smokewatch_types::AlertEvent;

use crate::config::NotifySettings;
use crate::error::{Error, Result};

/// Receives alert events raised by a monitor.
pub trait AlertSink: Send + Sync + std::fmt::Debug {
    /// Deliver one alert.
    fn deliver(&self, alert: &AlertEvent);
}

/// Logs each alert at warn level.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogSink;

impl AlertSink for LogSink {
    fn deliver(&self, alert: &AlertEvent) {
        warn!(
            channel = %alert.channel,
            timestamp = %alert.trigger_timestamp,
            "{}",
            alert.message
        );
    }
}

/// Appends each alert as one JSON object per line.
///
/// Each line is flushed as soon as it is written, so the file is complete
/// after every alert.
#[derive(Debug)]
pub struct JsonLinesSink {
    path: PathBuf,
    file: Mutex<BufWriter<File>>,
}

impl JsonLinesSink {
    /// Open `path` for appending, creating it if needed.
    pub fn create(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|source| Error::AlertFile {
                path: path.clone(),
                source,
            })?;
        Ok(Self {
            path,
            file: Mutex::new(BufWriter::new(file)),
        })
    }

    /// Path of the alert log.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl AlertSink for JsonLinesSink {
    fn deliver(&self, alert: &AlertEvent) {
        let line = match serde_json::to_string(alert) {
            Ok(line) => line,
            Err(e) => {
                error!("Failed to serialize alert: {}", e);
                return;
            }
        };
        let mut file = self.file.lock();
        if let Err(e) = writeln!(file, "{}", line).and_then(|()| file.flush()) {
            error!(path = %self.path.display(), "Failed to write alert: {}", e);
        }
    }
}

/// Forwards alerts into a tokio channel.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    sender: mpsc::UnboundedSender<AlertEvent>,
}

impl ChannelSink {
    /// Create a sink and the receiving end of its channel.
    pub fn create() -> (Self, mpsc::UnboundedReceiver<AlertEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        (Self { sender }, receiver)
    }
}

impl AlertSink for ChannelSink {
    fn deliver(&self, alert: &AlertEvent) {
        // A dropped receiver just means nobody is listening any more.
        let _ = self.sender.send(alert.clone());
    }
}

/// Delivers to every inner sink in order.
#[derive(Debug, Default)]
pub struct FanoutSink {
    sinks: Vec<Arc<dyn AlertSink>>,
}

impl FanoutSink {
    /// Create an empty fanout.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a sink.
    pub fn with(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Number of inner sinks.
    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    /// Check if there are no inner sinks.
    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }
}

impl AlertSink for FanoutSink {
    fn deliver(&self, alert: &AlertEvent) {
        for sink in &self.sinks {
            sink.deliver(alert);
        }
    }
}

/// Build the sink stack from settings: always logs, optionally appends to a file.
pub fn sink_from_settings(settings: &NotifySettings) -> Result<Arc<dyn AlertSink>> {
    let mut fanout = FanoutSink::new().with(Arc::new(LogSink));
    if let Some(path) = settings.alerts_file() {
        fanout = fanout.with(Arc::new(JsonLinesSink::create(path)?));
    }
    Ok(Arc::new(fanout))
}

/// Build the out-of-band notifier from settings.
///
/// Without an `[notify.smtp]` table, or without the `smtp` feature, alerts
/// are only logged.
pub fn notifier_from_settings(settings: &NotifySettings) -> Result<Arc<dyn Notifier>> {
    let Some(smtp) = &settings.smtp else {
        return Ok(Arc::new(LogNotifier));
    };

    #[cfg(feature = "smtp")]
    {
        let mut builder = smokewatch_adapters::smtp::SmtpNotifier::builder()
            .relay(smtp.host.clone(), smtp.port)
            .to(smtp.to.clone());
        if let (Some(username), Some(password)) = (&smtp.username, &smtp.password) {
            builder = builder.credentials(username.clone(), password.clone());
        }
        if let Some(from) = &smtp.from {
            builder = builder.from(from.clone());
        }
        Ok(Arc::new(builder.build()?))
    }

    #[cfg(not(feature = "smtp"))]
    {
        warn!(
            host = %smtp.host,
            "SMTP relay configured but smokewatch was built without the smtp feature; logging notifications only"
        );
        Ok(Arc::new(LogNotifier))
    }
}
