//! Settings for the publisher and monitors.
//!
//! Settings are layered with the `config` crate: built-in defaults, then an
//! optional TOML file, then environment variables prefixed with
//! `SMOKEWATCH_` using `__` between nested keys.
//!
//! ```toml
//! [broker]
//! url = "amqp://127.0.0.1:5672/%2f"
//!
//! [publisher]
//! file = "smoker-temps.csv"
//! interval = "30s"
//!
//! [monitors.food_a]
//! capacity = 20
//! predicate = "stall"
//! threshold = 1.0
//!
//! [notify.smtp]
//! host = "smtp.gmail.com"
//! username = "pitmaster@example.com"
//! password = "app-password"
//! to = "5555550123@vtext.com"
//! ```
//!
//! ```bash
//! SMOKEWATCH_PUBLISHER__INTERVAL=1s smokewatch publish
//! ```

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, Environment, File};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use smokewatch_types::{ChannelId, Router};

use crate::duration::parse_duration;
use crate::monitor::{MonitorConfig, Predicate, PredicateKind};
use crate::source::Columns;

const ENV_PREFIX: &str = "SMOKEWATCH";

/// Settings errors. All of them are fatal at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The config file or environment could not be read or deserialized.
    #[error("Failed to load settings: {0}")]
    Load(#[from] config::ConfigError),

    /// A value was read but is not acceptable.
    #[error("Invalid setting {key}: {reason}")]
    Invalid {
        /// Dotted key of the offending setting.
        key: String,
        /// Why it was rejected.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(key: impl Into<String>, reason: impl Into<String>) -> Self {
        ConfigError::Invalid {
            key: key.into(),
            reason: reason.into(),
        }
    }
}

/// All smokewatch settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Broker connection.
    pub broker: BrokerSettings,
    /// Pacing publisher and reading source.
    pub publisher: PublisherSettings,
    /// Per-channel monitor settings.
    pub monitors: MonitorsSettings,
    /// Alert delivery.
    pub notify: NotifySettings,
}

/// Broker connection settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerSettings {
    /// AMQP URI of the broker.
    pub url: String,
    /// Management UI offered at publisher startup.
    pub dashboard_url: String,
}

impl Default for BrokerSettings {
    fn default() -> Self {
        Self {
            url: "amqp://127.0.0.1:5672/%2f".to_string(),
            dashboard_url: "http://localhost:15672/#/queues".to_string(),
        }
    }
}

/// Publisher and reading source settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PublisherSettings {
    /// Delimited file holding the historical readings.
    pub file: PathBuf,
    /// Pause between time steps, e.g. `"30s"`.
    pub interval: String,
    /// Ask whether to open the broker dashboard at startup.
    pub offer_dashboard: bool,
    /// Header of the shared timestamp column.
    pub timestamp_column: String,
    /// Header of the smoker temperature column.
    pub smoker_column: String,
    /// Header of the food A temperature column.
    pub food_a_column: String,
    /// Header of the food B temperature column.
    pub food_b_column: String,
}

impl Default for PublisherSettings {
    fn default() -> Self {
        Self {
            file: PathBuf::from("smoker-temps.csv"),
            interval: "30s".to_string(),
            offer_dashboard: true,
            timestamp_column: "Time (UTC)".to_string(),
            smoker_column: "Channel1".to_string(),
            food_a_column: "Channel2".to_string(),
            food_b_column: "Channel3".to_string(),
        }
    }
}

impl PublisherSettings {
    /// Parsed pacing interval.
    pub fn interval(&self) -> Result<Duration, ConfigError> {
        parse_duration(&self.interval)
            .map_err(|e| ConfigError::invalid("publisher.interval", e.to_string()))
    }

    /// Column mapping for the reading source.
    pub fn columns(&self) -> Columns {
        Columns {
            timestamp: self.timestamp_column.clone(),
            smoker: self.smoker_column.clone(),
            food_a: self.food_a_column.clone(),
            food_b: self.food_b_column.clone(),
        }
    }
}

/// Settings for one sliding-window monitor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitorSettings {
    /// Queue to consume.
    pub queue: String,
    /// Window capacity N.
    pub capacity: usize,
    /// Which anomaly rule to apply.
    pub predicate: PredicateKind,
    /// Threshold in degrees.
    pub threshold: f64,
}

impl MonitorSettings {
    /// Defaults for a channel: a 5-reading drop watch on the smoker and
    /// 20-reading stall watches on the food probes.
    pub fn defaults_for(channel: ChannelId) -> Self {
        let (capacity, predicate, threshold) = match channel {
            ChannelId::Smoker => (5, PredicateKind::Drop, 15.0),
            ChannelId::FoodA | ChannelId::FoodB => (20, PredicateKind::Stall, 1.0),
        };
        Self {
            queue: channel.default_destination().to_string(),
            capacity,
            predicate,
            threshold,
        }
    }

    fn validate(&self, key: &str) -> Result<(), ConfigError> {
        if self.queue.trim().is_empty() {
            return Err(ConfigError::invalid(
                format!("{}.queue", key),
                "must not be empty",
            ));
        }
        if self.capacity == 0 {
            return Err(ConfigError::invalid(
                format!("{}.capacity", key),
                "must be at least 1",
            ));
        }
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::invalid(
                format!("{}.threshold", key),
                format!("must be a finite, non-negative number (got {})", self.threshold),
            ));
        }
        Ok(())
    }
}

/// Per-channel monitor settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorsSettings {
    /// Smoker channel.
    pub smoker: MonitorSettings,
    /// Food probe A.
    pub food_a: MonitorSettings,
    /// Food probe B.
    pub food_b: MonitorSettings,
}

impl Default for MonitorsSettings {
    fn default() -> Self {
        Self {
            smoker: MonitorSettings::defaults_for(ChannelId::Smoker),
            food_a: MonitorSettings::defaults_for(ChannelId::FoodA),
            food_b: MonitorSettings::defaults_for(ChannelId::FoodB),
        }
    }
}

impl MonitorsSettings {
    /// Settings for one channel.
    pub fn get(&self, channel: ChannelId) -> &MonitorSettings {
        match channel {
            ChannelId::Smoker => &self.smoker,
            ChannelId::FoodA => &self.food_a,
            ChannelId::FoodB => &self.food_b,
        }
    }

    /// Mutable settings for one channel.
    pub fn get_mut(&mut self, channel: ChannelId) -> &mut MonitorSettings {
        match channel {
            ChannelId::Smoker => &mut self.smoker,
            ChannelId::FoodA => &mut self.food_a,
            ChannelId::FoodB => &mut self.food_b,
        }
    }
}

/// Alert delivery settings.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NotifySettings {
    /// Append every alert as a JSON line to this file. Empty means none.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts_file: Option<PathBuf>,
    /// SMTP relay for stall text alerts. Absent means log only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp: Option<SmtpSettings>,
}

/// SMTP relay settings.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct SmtpSettings {
    /// Relay host.
    pub host: String,
    /// Relay port (STARTTLS).
    #[serde(default = "default_smtp_port")]
    pub port: u16,
    /// Login name.
    #[serde(default)]
    pub username: Option<String>,
    /// Login password.
    #[serde(default)]
    pub password: Option<String>,
    /// Sender address; defaults to the login name.
    #[serde(default)]
    pub from: Option<String>,
    /// Recipient, usually an email-to-SMS gateway address.
    pub to: String,
}

impl NotifySettings {
    /// The alert log path, ignoring an empty setting.
    pub fn alerts_file(&self) -> Option<&Path> {
        self.alerts_file
            .as_deref()
            .filter(|path| !path.as_os_str().to_string_lossy().trim().is_empty())
    }
}

fn default_smtp_port() -> u16 {
    587
}

impl std::fmt::Debug for SmtpSettings {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SmtpSettings")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "***"))
            .field("from", &self.from)
            .field("to", &self.to)
            .finish()
    }
}

impl Settings {
    /// Load settings from defaults, an optional file and the environment.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        Self::load_with_env(path, None)
    }

    /// Like [`load`](Self::load) but reads environment variables from
    /// `env` instead of the process environment when given.
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> Result<Self, ConfigError> {
        let mut builder = with_defaults(Config::builder())?;
        if let Some(path) = path {
            builder = builder.add_source(File::from(path));
        }
        builder = builder.add_source(
            Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("_")
                .separator("__")
                .source(env),
        );

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    /// Check every value that cannot be expressed in the type system.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.broker.url.trim().is_empty() {
            return Err(ConfigError::invalid("broker.url", "must not be empty"));
        }
        self.publisher.interval()?;
        for channel in ChannelId::ALL {
            let key = format!("monitors.{}", channel.key().replace('-', "_"));
            self.monitors.get(channel).validate(&key)?;
        }
        if let Some(smtp) = &self.notify.smtp {
            if smtp.host.trim().is_empty() {
                return Err(ConfigError::invalid("notify.smtp.host", "must not be empty"));
            }
            if smtp.to.trim().is_empty() {
                return Err(ConfigError::invalid("notify.smtp.to", "must not be empty"));
            }
        }
        Ok(())
    }

    /// Routing table matching the monitors' queues.
    pub fn router(&self) -> Router {
        ChannelId::ALL.into_iter().fold(Router::new(), |router, channel| {
            router.with_route(channel, self.monitors.get(channel).queue.clone())
        })
    }

    /// Build the monitor configuration for one channel.
    pub fn monitor_config(&self, channel: ChannelId) -> Result<MonitorConfig, ConfigError> {
        let settings = self.monitors.get(channel);
        let key = format!("monitors.{}", channel.key().replace('-', "_"));
        settings.validate(&key)?;

        let capacity = NonZeroUsize::new(settings.capacity)
            .ok_or_else(|| ConfigError::invalid(format!("{}.capacity", key), "must be at least 1"))?;
        Ok(MonitorConfig {
            channel,
            queue: settings.queue.clone(),
            capacity,
            predicate: Predicate::new(settings.predicate, settings.threshold),
        })
    }
}

/// Seed every defaulted key so partial tables in files or the environment
/// merge over complete defaults.
fn with_defaults(
    builder: ConfigBuilder<DefaultState>,
) -> Result<ConfigBuilder<DefaultState>, ConfigError> {
    let defaults = Settings::default();
    let mut builder = builder
        .set_default("broker.url", defaults.broker.url)?
        .set_default("broker.dashboard_url", defaults.broker.dashboard_url)?
        .set_default(
            "publisher.file",
            defaults.publisher.file.to_string_lossy().into_owned(),
        )?
        .set_default("publisher.interval", defaults.publisher.interval)?
        .set_default("publisher.offer_dashboard", defaults.publisher.offer_dashboard)?
        .set_default("publisher.timestamp_column", defaults.publisher.timestamp_column)?
        .set_default("publisher.smoker_column", defaults.publisher.smoker_column)?
        .set_default("publisher.food_a_column", defaults.publisher.food_a_column)?
        .set_default("publisher.food_b_column", defaults.publisher.food_b_column)?;

    for channel in ChannelId::ALL {
        let monitor = defaults.monitors.get(channel);
        let key = format!("monitors.{}", channel.key().replace('-', "_"));
        let predicate = match monitor.predicate {
            PredicateKind::Drop => "drop",
            PredicateKind::Stall => "stall",
        };
        builder = builder
            .set_default(format!("{}.queue", key), monitor.queue.clone())?
            .set_default(format!("{}.capacity", key), monitor.capacity as u64)?
            .set_default(format!("{}.predicate", key), predicate)?
            .set_default(format!("{}.threshold", key), monitor.threshold)?;
    }
    Ok(builder)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn env(pairs: &[(&str, &str)]) -> Option<HashMap<String, String>> {
        Some(
            pairs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }

    #[test]
    fn test_defaults() {
        let settings = Settings::load_with_env(None, env(&[])).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(
            settings.publisher.interval().unwrap(),
            Duration::from_secs(30)
        );

        let smoker = settings.monitor_config(ChannelId::Smoker).unwrap();
        assert_eq!(smoker.queue, "01-smoker");
        assert_eq!(smoker.capacity.get(), 5);
        assert_eq!(smoker.predicate, Predicate::new(PredicateKind::Drop, 15.0));

        let food_b = settings.monitor_config(ChannelId::FoodB).unwrap();
        assert_eq!(food_b.queue, "03-food-B");
        assert_eq!(food_b.capacity.get(), 20);
        assert_eq!(food_b.predicate, Predicate::new(PredicateKind::Stall, 1.0));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[broker]
url = "amqp://broker:5672/%2f"

[publisher]
file = "/data/cook.csv"
interval = "500ms"
offer_dashboard = false

[monitors.food_a]
queue = "probe-a"
capacity = 8
predicate = "stall"
threshold = 0.5

[notify]
alerts_file = "/tmp/alerts.jsonl"

[notify.smtp]
host = "smtp.example.com"
username = "me@example.com"
password = "secret"
to = "5555550123@vtext.com"
"#
        )
        .unwrap();

        let settings = Settings::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(settings.broker.url, "amqp://broker:5672/%2f");
        assert_eq!(settings.publisher.file, PathBuf::from("/data/cook.csv"));
        assert_eq!(
            settings.publisher.interval().unwrap(),
            Duration::from_millis(500)
        );
        assert!(!settings.publisher.offer_dashboard);
        // untouched sections keep their defaults
        assert_eq!(settings.monitors.smoker, MonitorSettings::defaults_for(ChannelId::Smoker));
        assert_eq!(settings.monitors.food_a.queue, "probe-a");
        assert_eq!(settings.monitors.food_a.capacity, 8);

        let smtp = settings.notify.smtp.unwrap();
        assert_eq!(smtp.port, 587);
        assert_eq!(smtp.from, None);
        assert!(!format!("{:?}", smtp).contains("secret"));
    }

    #[test]
    fn test_router_follows_monitor_queues() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[monitors.food_a]\nqueue = \"probe-a\"").unwrap();

        let settings = Settings::load_with_env(Some(file.path()), env(&[])).unwrap();
        let router = settings.router();
        assert_eq!(router.route(ChannelId::FoodA), "probe-a");
        assert_eq!(router.route(ChannelId::Smoker), "01-smoker");
        assert_eq!(router.route(ChannelId::FoodB), "03-food-B");
        assert_eq!(
            router.route(ChannelId::FoodA),
            settings.monitor_config(ChannelId::FoodA).unwrap().queue
        );
    }

    #[test]
    fn test_default_router_is_fixed_names() {
        assert_eq!(Settings::default().router(), Router::default());
    }

    #[test]
    fn test_empty_alerts_file_means_none() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(file, "[notify]\nalerts_file = \"\"").unwrap();

        let settings = Settings::load_with_env(Some(file.path()), env(&[])).unwrap();
        assert_eq!(settings.notify.alerts_file(), None);

        let blank = NotifySettings {
            alerts_file: Some(PathBuf::from("  ")),
            smtp: None,
        };
        assert_eq!(blank.alerts_file(), None);

        let set = NotifySettings {
            alerts_file: Some(PathBuf::from("/tmp/alerts.jsonl")),
            smtp: None,
        };
        assert_eq!(set.alerts_file(), Some(Path::new("/tmp/alerts.jsonl")));
    }

    #[test]
    fn test_environment_overrides() {
        let settings = Settings::load_with_env(
            None,
            env(&[
                ("SMOKEWATCH_PUBLISHER__INTERVAL", "2s"),
                ("SMOKEWATCH_MONITORS__SMOKER__THRESHOLD", "20"),
            ]),
        )
        .unwrap();

        assert_eq!(settings.publisher.interval().unwrap(), Duration::from_secs(2));
        assert_eq!(settings.monitors.smoker.threshold, 20.0);
        assert_eq!(settings.monitors.smoker.capacity, 5);
    }

    #[test]
    fn test_missing_file_is_error() {
        let err = Settings::load_with_env(Some(Path::new("/nonexistent/smokewatch.toml")), env(&[]))
            .unwrap_err();
        assert!(matches!(err, ConfigError::Load(_)));
    }

    #[test]
    fn test_rejects_zero_capacity() {
        let mut settings = Settings::default();
        settings.monitors.food_b.capacity = 0;

        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("monitors.food_b.capacity"));
        assert!(settings.monitor_config(ChannelId::FoodB).is_err());
    }

    #[test]
    fn test_rejects_negative_threshold() {
        let mut settings = Settings::default();
        settings.monitors.smoker.threshold = -1.0;
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_rejects_bad_interval() {
        let mut settings = Settings::default();
        settings.publisher.interval = "soon".to_string();
        let err = settings.validate().unwrap_err();
        assert!(err.to_string().contains("publisher.interval"));
    }
}
