//! Greenhouse edge controller: main entry point.
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                    Adapters (outer ring)                     │
//! │                                                              │
//! │  HostHardware        LogEventSink   JsonConfigFile           │
//! │  (Gpio+Pwm+Sensor)   (EventSink)    (ConfigPort)             │
//! │  Tcp/TlsTransport    SystemClock                             │
//! │  (Transport)         (Clock)                                 │
//! │                                                              │
//! │  ──────────────── Port Trait Boundary ─────────────────      │
//! │                                                              │
//! │  ┌────────────────────────────────────────────────────────┐  │
//! │  │                AppService (pure logic)                 │  │
//! │  │  MqttClient · CurtainController · DecisionManager      │  │
//! │  └────────────────────────────────────────────────────────┘  │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! Flags:
//! - `--auto-light` enables the light-driven curtain policy at startup
//!   (it is otherwise Disabled).
//!
//! A small tokio runtime runs beside the synchronous loop.  It carries the
//! broker connect attempts and the SIGINT/SIGTERM watcher; the loop itself
//! never awaits.  On either signal the loop stops, the client sends
//! DISCONNECT and both curtain motors are released.

use std::path::Path;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use anyhow::{Context, Result};
use env_logger::Env;
use log::{info, warn};
use tokio::signal::unix::{SignalKind, signal};

use greenhouse_edge::adapters::config_file::JsonConfigFile;
use greenhouse_edge::adapters::hardware::HostHardware;
use greenhouse_edge::adapters::log_sink::LogEventSink;
use greenhouse_edge::adapters::tcp_transport::TcpTransport;
use greenhouse_edge::adapters::time::SystemClock;
use greenhouse_edge::adapters::tls_transport::TlsTransport;
use greenhouse_edge::app::ports::Clock;
use greenhouse_edge::app::service::AppService;
use greenhouse_edge::mqtt::transport::Transport;

/// Raise `stop` on the first SIGINT or SIGTERM.
async fn watch_signals(stop: Arc<AtomicBool>) {
    match signal(SignalKind::terminate()) {
        Ok(mut sigterm) => {
            tokio::select! {
                _ = tokio::signal::ctrl_c() => info!("SIGINT received"),
                _ = sigterm.recv() => info!("SIGTERM received"),
            }
        }
        Err(e) => {
            warn!("SIGTERM handler not installed: {}", e);
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("SIGINT handler not installed: {}", e);
                return;
            }
            info!("SIGINT received");
        }
    }
    stop.store(true, Ordering::Release);
}

fn main() -> Result<()> {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("greenhouse-edge v{}", env!("CARGO_PKG_VERSION"));

    // ── Configuration ─────────────────────────────────────────
    let config_file = JsonConfigFile::from_env();
    let config = config_file
        .load_or_default()
        .with_context(|| format!("loading {}", config_file.path().display()))?;
    if config.device.device_secret.is_empty() {
        warn!("device.device_secret is empty; the broker will reject the connection");
    }

    // ── Runtime ───────────────────────────────────────────────
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .thread_name("greenhouse-io")
        .enable_all()
        .build()
        .context("starting I/O runtime")?;
    let stop = Arc::new(AtomicBool::new(false));
    runtime.spawn(watch_signals(Arc::clone(&stop)));

    // ── Adapters ──────────────────────────────────────────────
    let clock = SystemClock::new();
    let mut hw = HostHardware::from_config(&config.hardware);
    let mut sink = LogEventSink::new();
    let host = config.broker_host();
    let mqtt = &config.mqtt;
    let transport: Box<dyn Transport> = if mqtt.use_tls {
        info!("Broker {}:{} (TLS)", host, mqtt.port);
        Box::new(
            TlsTransport::new(
                runtime.handle().clone(),
                &host,
                mqtt.port,
                mqtt.connect_timeout_ms,
                mqtt.ca_file.as_deref().map(Path::new),
            )
            .map_err(greenhouse_edge::error::Error::from)
            .context("setting up TLS")?,
        )
    } else {
        info!("Broker {}:{}", host, mqtt.port);
        Box::new(TcpTransport::new(
            runtime.handle().clone(),
            host,
            mqtt.port,
            mqtt.connect_timeout_ms,
        ))
    };

    // ── Service ───────────────────────────────────────────────
    let mut service =
        AppService::new(&config, transport, clock.epoch_ms()).context("building service")?;
    service.start(&clock, &mut hw, &mut sink);

    if std::env::args().any(|arg| arg == "--auto-light") {
        if let Err(e) = service.enable_decision(&mut sink) {
            warn!("light automation not enabled: {}", e);
        }
    }

    // ── Event loop ────────────────────────────────────────────
    let period = Duration::from_millis(u64::from(config.hardware.loop_interval_ms));
    service.run_until_stopped(&clock, &mut hw, &mut sink, period, &stop);
    info!("greenhouse-edge stopped");
    Ok(())
}
