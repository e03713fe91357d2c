//! Drive a simulated scan session end to end.
//!
//! Detections are fed from a separate thread, the way a real detection
//! pipeline calls back, and results are printed in the host's wire form.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use futures::StreamExt;
use scanconf::ScanConfig;
use scanlens::{
    logging, BroadcastPublisher, Detection, FormatFilter, Rect, ScanBridge, ScanCoordinator,
    ScanMode, ScanRequestBuilder, SimulatedCamera, StaticPermission, Symbology,
};

/// Simulated scan session
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
struct Cli {
    /// Config file replacing ./scanlens.toml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Stream every detection instead of stopping at the first
    #[arg(long)]
    continuous: bool,

    /// Format filter: qr, linear or all (default from config)
    #[arg(short, long)]
    format: Option<String>,

    /// A decoded value the simulated pipeline reports, one batch each
    #[arg(short, long = "value")]
    values: Vec<String>,

    /// Cancel after this many batches
    #[arg(long)]
    cancel_after: Option<usize>,

    /// Simulate the user refusing camera access
    #[arg(long)]
    deny_permission: bool,

    /// Delay between batches
    #[arg(long, default_value = "50")]
    interval_ms: u64,

    /// Print the effective configuration and exit
    #[arg(long)]
    print_config: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let (config, sources) = ScanConfig::load_with_sources_from(cli.config.as_deref())
        .context("Failed to load configuration")?;

    if cli.print_config {
        print!("{}", config.to_toml()?);
        return Ok(());
    }

    logging::init(&config.telemetry.log_level).context("Failed to initialize logging")?;
    for file in &sources.files {
        tracing::info!("Loaded config from {}", file.display());
    }
    for var in &sources.env_overrides {
        tracing::info!("Config override from ${}", var);
    }

    let events = BroadcastPublisher::new(config.delivery.event_buffer);
    let mut event_rx = events.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = event_rx.recv().await {
            tracing::debug!(?event, "scan event");
        }
    });

    let permission = if cli.deny_permission {
        StaticPermission::denied()
    } else {
        StaticPermission::granted()
    };
    let bridge = ScanBridge::new(
        Arc::new(SimulatedCamera::new()),
        Arc::new(permission),
        &config,
        Arc::new(events),
    )
    .context("Invalid capture defaults in configuration")?;

    let mode = if cli.continuous {
        ScanMode::Continuous
    } else {
        ScanMode::SingleShot
    };
    let mut builder = ScanRequestBuilder::from_defaults(mode, &config.defaults)
        .context("Invalid request defaults in configuration")?;
    if let Some(format) = &cli.format {
        let filter: FormatFilter = format.parse().context("Invalid --format")?;
        builder = builder.format_filter(filter);
    }
    let request = builder.build().context("Invalid scan request")?;
    let filter = request.format_filter();

    let feeder = Feeder {
        values: cli.values.clone(),
        symbology: filter
            .symbologies()
            .first()
            .copied()
            .unwrap_or(Symbology::Unknown),
        cancel_after: cli.cancel_after,
        interval: Duration::from_millis(cli.interval_ms),
    };

    if cli.continuous {
        let (mut stream, pending) = bridge.open_stream(request)?;
        let coordinator = Arc::clone(bridge.coordinator());
        let feeding = tokio::task::spawn_blocking(move || feeder.run(&coordinator));

        let printer = tokio::spawn(async move {
            let mut count = 0usize;
            while let Some(value) = stream.next().await {
                println!("{}", value);
                count += 1;
            }
            count
        });

        feeding.await.context("Detection feeder panicked")?;
        bridge.close_stream()?;
        let count = printer.await.context("Stream printer panicked")?;
        let outcome = pending.await;
        tracing::info!(values = count, sentinel = outcome.is_sentinel(), "stream finished");
    } else {
        let pending = bridge.request(request)?;
        tracing::info!(scan.id = %pending.scan_id(), "waiting for result");
        let coordinator = Arc::clone(bridge.coordinator());
        let feeding = tokio::task::spawn_blocking(move || feeder.run(&coordinator));

        let outcome = pending.await;
        feeding.await.context("Detection feeder panicked")?;
        println!("{}", outcome.into_wire());
    }

    Ok(())
}

/// Plays the part of the detection pipeline and the host's cancel button
struct Feeder {
    values: Vec<String>,
    symbology: Symbology,
    cancel_after: Option<usize>,
    interval: Duration,
}

impl Feeder {
    fn run(self, coordinator: &ScanCoordinator) {
        for (i, value) in self.values.into_iter().enumerate() {
            if self.cancel_after == Some(i) {
                break;
            }
            let offset = i as f32 * 20.0;
            coordinator.on_detection_batch(vec![Detection::new(
                value,
                self.symbology,
                Rect::new(offset, offset, offset + 10.0, offset + 10.0),
            )]);
            std::thread::sleep(self.interval);
        }

        // Out of input: end whatever is still live.
        if let Err(e) = coordinator.cancel() {
            tracing::warn!("cancel failed: {}", e);
        }
    }
}
