// ------------------------------------------------------------
// Module declarations
// ------------------------------------------------------------
//
// Each module represents a well-defined responsibility:
//
// - config:   Configuration structs loaded from JSON (+ env overrides)
// - currency: The fixed currency rotation table
// - schema:   Quote wire body and outbound message envelope
// - synth:    Jitter sources and the quote synthesizer
// - error:    Per-cycle error type, tagged by kind
// - broker:   Broker / publisher seam and implementations
// - worker:   Rotation state and the publish-cycle runner
// - metrics:  Lock-free runtime counters
//
mod broker;
mod config;
mod currency;
mod error;
mod metrics;
mod schema;
mod synth;
mod worker;

use std::future::Future;
use std::io;

use log::{error, info, warn, LevelFilter};
use tokio::time::Duration;
use tokio_util::sync::CancellationToken;

use broker::get_broker;
use config::{config_path, Config, CONFIG_PATH_ENV};
use metrics::{report_loop, METRICS};
use synth::{QuoteSynthesizer, RngJitter};
use worker::runner::QuoteCycleRunner;

// ------------------------------------------------------------
// Application entry point
// ------------------------------------------------------------
//
// Responsibilities:
// - Load configuration
// - Initialize logging
// - Resolve the broker (Redis Streams or demo)
// - Start the metrics reporter
// - Run publish cycles until SIGINT / SIGTERM
//
// Only startup failures end the process with an error. Once the
// runner is started, per-cycle failures are logged and skipped.
//
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let path = config_path(
        std::env::args().nth(1),
        std::env::var(CONFIG_PATH_ENV).ok(),
    );
    let config = Config::load(&path)?;

    init_logger(config.debug_log());
    info!("Starting quote simulation (config: {})", path);
    info!("Topic = {}", config.broker.topic);

    let broker = get_broker(&config.broker)?;

    let shutdown = CancellationToken::new();
    tokio::spawn(wait_for_signal(shutdown.clone()));

    // --------------------------------------------------------
    // Metrics reporter (periodic, low-noise)
    // --------------------------------------------------------
    let reporter = tokio::spawn(report_loop(
        METRICS.clone(),
        Duration::from_secs(config.metrics_interval_secs.max(1)),
        shutdown.clone(),
    ));

    let runner = QuoteCycleRunner::new(
        broker,
        QuoteSynthesizer::new(config.source.clone(), RngJitter::from_os()),
        config.broker.topic.clone(),
        Duration::from_millis(config.interval_ms),
        METRICS.clone(),
    );
    runner.run(shutdown.clone()).await;

    shutdown.cancel();
    let _ = reporter.await;
    info!("{}", METRICS.summary());

    Ok(())
}

// ------------------------------------------------------------
// Logger
// ------------------------------------------------------------
//
// Default level is `info` (`debug` with `debug.log: true`);
// RUST_LOG still overrides both.
//
fn init_logger(debug: bool) {
    let level = if debug { LevelFilter::Debug } else { LevelFilter::Info };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();
}

// ------------------------------------------------------------
// Shutdown signals
// ------------------------------------------------------------
//
// Cancels `shutdown` on Ctrl-C, or on SIGTERM on Unix.
//
// A handler that cannot be registered never fires; the worker keeps
// running instead of stopping right after startup.
//
async fn wait_for_signal(shutdown: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = signal_or_pending("Ctrl-C", tokio::signal::ctrl_c()) => {}
                    _ = term.recv() => {}
                }
            }
            Err(e) => {
                warn!("SIGTERM handler unavailable: {}", e);
                signal_or_pending("Ctrl-C", tokio::signal::ctrl_c()).await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        signal_or_pending("Ctrl-C", tokio::signal::ctrl_c()).await;
    }

    info!("Shutdown requested");
    shutdown.cancel();
}

/// Resolves when `signal` fires; pends forever if it failed to register.
async fn signal_or_pending<F>(name: &str, signal: F)
where
    F: Future<Output = io::Result<()>>,
{
    if let Err(e) = signal.await {
        error!("{} handler unavailable, ignoring it: {}", name, e);
        std::future::pending::<()>().await;
    }
}
