//! ==============================================================================
//! main.rs - sensor uplink entry point
//! ==============================================================================
//!
//! purpose:
//!     bridges a zigbee coordinator's serial output to a ThingSpeak channel.
//!     every line is parsed as it arrives; every cadence the newest reading
//!     is classified (normal / warning / high risk) and uploaded.
//!
//! responsibilities:
//!     - load configuration (file, env, cli flags)
//!     - initialize tracing
//!     - open the line source (uart or replay) and the publisher
//!     - serve the status endpoint in the background
//!     - run the ingestion loop until ctrl-c / sigterm
//!
//! architecture:
//!
//!     ┌─────────────────────────────────────────────────────────────┐
//!     │                     sensor-uplink                           │
//!     │  ┌──────────────────────┐        ┌──────────────────────┐   │
//!     │  │ ingestion loop       │        │ status server        │   │
//!     │  │ (200ms reads,        │ ─────> │ (port 3000, /api)    │   │
//!     │  │  15s uploads)        │ writes │ reads                │   │
//!     │  └──────────┬───────────┘        └──────────────────────┘   │
//!     └─────────────┼───────────────────────────────────────────────┘
//!                   │
//!          ┌────────┴────────┐
//!          ▼                 ▼
//!    serial / replay    ThingSpeak update api
//!
//! ==============================================================================

use anyhow::Result;
use clap::Parser;
use sensor_uplink::cli::Cli;
use sensor_uplink::config::{ConfigOrigin, UplinkConfig};
use sensor_uplink::domain::StatusSnapshot;
use sensor_uplink::publisher::{LogPublisher, Publisher, ThingSpeakPublisher};
use sensor_uplink::scheduler::{Scheduler, SchedulerSettings};
use sensor_uplink::server;
use sensor_uplink::transport::{LineSource, ReplaySource};
use std::path::Path;
use std::sync::Arc;
use tokio::signal;
use tokio::sync::{watch, RwLock};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    // step 1: load configuration
    let cli = Cli::parse();
    let (mut config, origin) = UplinkConfig::resolve(cli.config.as_deref())?;
    config.apply_env();
    cli.apply(&mut config);
    config.validate()?;

    // step 2: logging
    init_tracing(&config.logging.level);
    info!("=== Zigbee → ThingSpeak uplink ===");
    match &origin {
        ConfigOrigin::File(path) => info!(path = %path.display(), "config loaded"),
        ConfigOrigin::Defaults { skipped } => {
            for (path, reason) in skipped {
                warn!(path = %path.display(), %reason, "config file ignored");
            }
            warn!("no config file found - using defaults");
        }
    }
    config.log_summary();

    // step 3: shared state + shutdown fan-out
    let status = Arc::new(RwLock::new(StatusSnapshot::default()));
    let (stop_tx, stop_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        warn!("shutdown signal received");
        let _ = stop_tx.send(true);
    });

    // step 4: status server in background
    if config.status.enabled {
        let bind = config.status.bind.clone();
        let web_status = status.clone();
        let web_stop = stop_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = server::serve(&bind, web_status, stopped(web_stop)).await {
                error!(error = %format!("{:#}", e), "status server error");
            }
        });
    }

    // step 5: ingestion loop
    let source = open_source(&config).await?;
    let publisher = build_publisher(&config)?;
    info!("CTRL+C to stop");

    Scheduler::new(source, publisher, SchedulerSettings::from(&config), status)
        .run_until(stopped(stop_rx))
        .await;

    Ok(())
}

async fn open_source(config: &UplinkConfig) -> Result<Box<dyn LineSource>> {
    if let Some(path) = &config.serial.replay_file {
        return open_replay(path, config).await;
    }

    #[cfg(feature = "hardware")]
    {
        let uart = sensor_uplink::transport::UartSource::open(&config.serial.port, config.serial.baud)?;
        Ok(Box::new(uart))
    }

    #[cfg(not(feature = "hardware"))]
    {
        warn!(
            port = %config.serial.port,
            "built without the `hardware` feature; reading telemetry from stdin"
        );
        open_replay(Path::new("-"), config).await
    }
}

async fn open_replay(path: &Path, config: &UplinkConfig) -> Result<Box<dyn LineSource>> {
    let pace = config.replay_pace();
    if path == Path::new("-") {
        return Ok(Box::new(ReplaySource::stdin().with_pace(pace)));
    }
    Ok(Box::new(ReplaySource::open(path).await?.with_pace(pace)))
}

fn build_publisher(config: &UplinkConfig) -> Result<Box<dyn Publisher>> {
    if config.publish.dry_run {
        info!("dry run: uploads are logged, not sent");
        return Ok(Box::new(LogPublisher));
    }
    Ok(Box::new(ThingSpeakPublisher::from_config(config)?))
}

/// resolves once the shutdown flag flips (or its sender is gone)
async fn stopped(mut rx: watch::Receiver<bool>) {
    let _ = rx.wait_for(|stop| *stop).await;
}

/// Listen for shutdown signals (SIGTERM, SIGINT)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// Initialize tracing/logging; RUST_LOG wins over the configured level
fn init_tracing(level: &str) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("sensor_uplink={level},warn")));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}
