use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::{error, info, warn};

use smokewatch::adapters::memory::MemoryBroker;
use smokewatch::adapters::Subscription;
use smokewatch::alert::{notifier_from_settings, sink_from_settings};
use smokewatch::types::ChannelId;
use smokewatch::{dashboard, logging, CsvSource, Monitor, PacingPublisher, Settings};

#[derive(Parser, Debug)]
#[command(name = "smokewatch")]
#[command(about = "Stream smoker temperatures to message queues and watch them for drops and stalls")]
#[command(version)]
struct Cli {
    /// Settings file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Log level when RUST_LOG is not set
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Emit logs as JSON lines
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Publish readings from a CSV file to the broker at a fixed pace
    Publish(PublishArgs),
    /// Watch one channel's queue for anomalies
    Monitor(MonitorArgs),
    /// Run the publisher and all three monitors in-process, without a broker
    Demo(DemoArgs),
}

#[derive(Args, Debug)]
struct PublishArgs {
    /// CSV file with the recorded readings
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Pause between time steps (e.g. "30s", "500ms")
    #[arg(short, long)]
    interval: Option<String>,

    /// Skip the dashboard prompt
    #[arg(long)]
    no_prompt: bool,
}

#[derive(Args, Debug)]
struct MonitorArgs {
    /// Channel to watch: smoker, food-a or food-b
    channel: ChannelId,

    /// Window capacity
    #[arg(long)]
    capacity: Option<usize>,

    /// Predicate threshold in degrees
    #[arg(long)]
    threshold: Option<f64>,
}

#[derive(Args, Debug)]
struct DemoArgs {
    /// CSV file with the recorded readings
    #[arg(short, long)]
    file: Option<PathBuf>,

    /// Pause between time steps (e.g. "100ms")
    #[arg(short, long)]
    interval: Option<String>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    logging::init(&cli.log_level, cli.log_json);

    let result = match Settings::load(cli.config.as_deref()) {
        Ok(settings) => match cli.command {
            Command::Publish(args) => publish(settings, args).await,
            Command::Monitor(args) => monitor(settings, args).await,
            Command::Demo(args) => demo(settings, args).await,
        },
        Err(e) => Err(e.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

/// Resolves on Ctrl+C. If the handler cannot be installed it never resolves.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        warn!("Failed to listen for Ctrl+C: {}", e);
        std::future::pending::<()>().await;
    }
}

fn apply_publisher_overrides(
    settings: &mut Settings,
    file: Option<PathBuf>,
    interval: Option<String>,
) -> Result<()> {
    if let Some(file) = file {
        settings.publisher.file = file;
    }
    if let Some(interval) = interval {
        settings.publisher.interval = interval;
    }
    settings.validate()?;
    Ok(())
}

fn open_source(settings: &Settings) -> Result<CsvSource<std::fs::File>> {
    let source = CsvSource::open(&settings.publisher.file, &settings.publisher.columns())?;
    Ok(source)
}

#[cfg(feature = "rabbitmq")]
async fn publish(mut settings: Settings, args: PublishArgs) -> Result<()> {
    use smokewatch::adapters::amqp::AmqpTransport;
    use smokewatch::adapters::redact_uri;

    apply_publisher_overrides(&mut settings, args.file, args.interval)?;
    let interval = settings.publisher.interval()?;

    if settings.publisher.offer_dashboard && !args.no_prompt {
        let url = settings.broker.dashboard_url.clone();
        tokio::task::spawn_blocking(move || dashboard::offer(&url))
            .await
            .context("dashboard prompt failed")?;
    }

    let mut source = open_source(&settings)?;
    let transport = AmqpTransport::connect(&settings.broker.url)
        .await
        .with_context(|| format!("cannot reach broker at {}", redact_uri(&settings.broker.url)))?;

    let report = PacingPublisher::new(transport, settings.router(), interval)
        .run(&mut source, shutdown_signal())
        .await?;
    if report.failed > 0 {
        warn!(failed = report.failed, "some readings were not published");
    }
    Ok(())
}

#[cfg(not(feature = "rabbitmq"))]
async fn publish(_settings: Settings, _args: PublishArgs) -> Result<()> {
    anyhow::bail!("smokewatch was built without the rabbitmq feature; try `smokewatch demo`")
}

#[cfg(feature = "rabbitmq")]
async fn monitor(mut settings: Settings, args: MonitorArgs) -> Result<()> {
    use smokewatch::adapters::amqp::AmqpSubscription;
    use smokewatch::adapters::redact_uri;

    let overrides = settings.monitors.get_mut(args.channel);
    if let Some(capacity) = args.capacity {
        overrides.capacity = capacity;
    }
    if let Some(threshold) = args.threshold {
        overrides.threshold = threshold;
    }

    let config = settings.monitor_config(args.channel)?;
    let sink = sink_from_settings(&settings.notify)?;
    let notifier = notifier_from_settings(&settings.notify)?;

    let mut subscription = AmqpSubscription::connect(&settings.broker.url, &config.queue)
        .await
        .with_context(|| format!("cannot reach broker at {}", redact_uri(&settings.broker.url)))?;
    let mut monitor = Monitor::new(config, sink, notifier);

    let outcome = tokio::select! {
        result = monitor.run(&mut subscription) => Some(result),
        _ = shutdown_signal() => None,
    };
    if outcome.is_none() {
        info!(channel = %args.channel, "interrupted, stopping monitor");
    }
    if let Err(e) = subscription.close().await {
        warn!("Failed to close subscription: {}", e);
    }

    let stats = monitor.stats();
    info!(
        channel = %args.channel,
        received = stats.received,
        rejected = stats.rejected,
        alerts = stats.alerts,
        "monitor stopped"
    );
    outcome.transpose()?;
    Ok(())
}

#[cfg(not(feature = "rabbitmq"))]
async fn monitor(_settings: Settings, _args: MonitorArgs) -> Result<()> {
    anyhow::bail!("smokewatch was built without the rabbitmq feature; try `smokewatch demo`")
}

async fn demo(mut settings: Settings, args: DemoArgs) -> Result<()> {
    apply_publisher_overrides(&mut settings, args.file, args.interval)?;
    let interval = settings.publisher.interval()?;
    let mut source = open_source(&settings)?;

    let sink = sink_from_settings(&settings.notify)?;
    let notifier = notifier_from_settings(&settings.notify)?;
    let broker = MemoryBroker::new();

    let mut monitors = Vec::new();
    for channel in ChannelId::ALL {
        let config = settings.monitor_config(channel)?;
        let mut subscription = broker.subscribe(&config.queue);
        let mut monitor = Monitor::new(config, Arc::clone(&sink), Arc::clone(&notifier));
        monitors.push(tokio::spawn(async move {
            let result = monitor.run(&mut subscription).await;
            (channel, result)
        }));
    }

    let report = PacingPublisher::new(broker.transport(), settings.router(), interval)
        .run(&mut source, shutdown_signal())
        .await;
    broker.close();

    for handle in monitors {
        let (channel, result) = handle.await.context("monitor task panicked")?;
        match result {
            Ok(stats) => info!(
                %channel,
                received = stats.received,
                rejected = stats.rejected,
                alerts = stats.alerts,
                "monitor finished"
            ),
            Err(e) => error!(%channel, "monitor failed: {}", e),
        }
    }

    let report = report?;
    info!(
        steps = report.steps,
        published = report.published,
        "demo complete"
    );
    Ok(())
}
