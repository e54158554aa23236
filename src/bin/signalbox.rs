//! signalbox supervisor
//!
//! Loads a layout, connects to the DCC-EX command station and serves the
//! sensor protocol until interrupted.
//!
//! # Usage
//!
//! ```bash
//! # Serve sensors on the default port (4000)
//! signalbox --layout layouts/main.yaml
//!
//! # Per-sensor thresholds and the HTTP API
//! signalbox --layout layouts/main.yaml --sensor-config sensors.yaml --web-port 8080
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use signalbox::config::{Config, ControlLoopConfig, DccConfig, SensorServerConfig, WebConfig};
use signalbox::config_store::ConfigStore;
use signalbox::services::{ControlLoop, SensorServer, SharedLayoutState};
use signalbox::{CommandStation, DccClient, LayoutController, LayoutLoader};

/// DCC layout supervisor: sector tracking and speed ramps
#[derive(Parser, Debug)]
#[command(name = "signalbox")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Layout definition (YAML)
    #[arg(short, long)]
    layout: PathBuf,

    /// Per-sensor settings file (YAML), created on first write
    #[arg(long)]
    sensor_config: Option<PathBuf>,

    /// Sensor server bind address
    #[arg(short, long, default_value = "0.0.0.0")]
    bind: String,

    /// Sensor server TCP port
    #[arg(short, long, default_value = "4000")]
    port: u16,

    /// Speed ramp tick interval in milliseconds
    #[arg(long, default_value = "100")]
    tick_ms: u64,

    /// Serve the HTTP API on this port (requires the `web` feature)
    #[arg(long)]
    web_port: Option<u16>,

    /// Log level when RUST_LOG is unset (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    fn config(&self) -> Config {
        let web = match self.web_port {
            Some(port) => WebConfig::default().with_port(port).with_enabled(true),
            None => WebConfig::default(),
        };

        Config::default()
            .with_sensor_server(
                SensorServerConfig::default()
                    .with_bind(&self.bind)
                    .with_port(self.port),
            )
            .with_control_loop(ControlLoopConfig::default().with_tick_interval_ms(self.tick_ms))
            .with_web(web)
    }
}

fn init_logging(level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .init();
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level);

    let mut config = args.config();

    let layout = LayoutLoader::load(&args.layout)
        .with_context(|| format!("failed to load layout {}", args.layout.display()))?;
    info!(%layout, "layout loaded");

    if let Some(endpoint) = layout.dcc() {
        config.dcc = DccConfig {
            host: endpoint.host.clone(),
            port: endpoint.port,
            ..config.dcc
        };
    }

    let mut dcc = DccClient::from_config(&config.dcc);
    if let Err(e) = dcc.connect() {
        warn!(error = %e, "command station unreachable, will retry on first command");
    }

    let controller = LayoutController::new(layout, dcc)
        .with_status_timeout(config.dcc.status_timeout())
        .with_track(&config.dcc.track);
    let state = Arc::new(SharedLayoutState::new(controller));

    let started = state
        .run(|c| c.start().map_err(|e| e.to_string()))
        .await
        .context("controller start panicked")?;
    if let Err(e) = started {
        warn!(error = e.as_str(), "track power on failed");
    }

    let ticker = ControlLoop::from_config(&config.control_loop).spawn(Arc::clone(&state));

    if config.web.enabled {
        spawn_web(Arc::clone(&state), &config.web);
    }

    let mut server = SensorServer::from_config(Arc::clone(&state), &config.sensor_server);
    if let Some(path) = &args.sensor_config {
        let store = ConfigStore::open(path);
        info!(path = %store.path().display(), "sensor config loaded");
        server = server.with_config_store(Arc::new(store));
    }

    let addr = config.sensor_server.listen_addr();
    tokio::select! {
        result = server.run(&addr) => {
            result.with_context(|| format!("sensor server on {}", addr))?;
        }
        result = tokio::signal::ctrl_c() => {
            result.context("failed to listen for Ctrl-C")?;
            info!("interrupted, shutting down");
            server.shutdown();
        }
    }

    ticker.abort();
    state
        .run(|c| c.dcc_mut().close())
        .await
        .context("closing command station connection")?;
    info!("stopped");

    Ok(())
}

#[cfg(feature = "web")]
fn spawn_web<D>(state: Arc<SharedLayoutState<D>>, web: &WebConfig)
where
    D: CommandStation + Send + 'static,
{
    use signalbox::services::{run_server, WebServerConfig};

    let config = WebServerConfig::from_config(web);
    tokio::spawn(async move {
        if let Err(e) = run_server(state, config).await {
            error!(error = %e, "web server failed");
        }
    });
}

#[cfg(not(feature = "web"))]
fn spawn_web<D>(_state: Arc<SharedLayoutState<D>>, web: &WebConfig)
where
    D: CommandStation + Send + 'static,
{
    error!(
        port = web.port,
        "HTTP API requested but signalbox was built without the `web` feature"
    );
}
