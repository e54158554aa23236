//! TCP server for sensor nodes.
//!
//! Each connection gets its own task reading [`SensorCommand`] lines. Every
//! command that touches the layout goes through
//! [`SharedLayoutState::run`], so triggers, ticks and status requests from
//! all connections are applied one at a time. An I/O error ends only the
//! connection it happened on.

use std::io;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tracing::{debug, error, info, info_span, warn, Instrument, Span};

use crate::config::{SensorServerConfig, DEFAULT_DETECTION_THRESHOLD};
use crate::config_store::ConfigStore;
use crate::traits::CommandStation;

use super::sensor_protocol::SensorCommand;
use super::shared::SharedLayoutState;

/// Reply to commands that succeeded.
pub const REPLY_OK: &str = "OK";
/// Reply to commands that failed.
pub const REPLY_ERROR: &str = "ERROR";

/// Per-connection command handling; each connection task owns a clone.
struct Handler<D: CommandStation> {
    state: Arc<SharedLayoutState<D>>,
    detection_threshold: i64,
    store: Option<Arc<ConfigStore>>,
}

impl<D: CommandStation> Clone for Handler<D> {
    fn clone(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            detection_threshold: self.detection_threshold,
            store: self.store.clone(),
        }
    }
}

impl<D: CommandStation + Send + 'static> Handler<D> {
    fn threshold_for(&self, sensor_id: &str) -> i64 {
        self.store
            .as_ref()
            .and_then(|store| store.detection_threshold(sensor_id))
            .unwrap_or(self.detection_threshold)
    }

    /// Apply one line; returns the reply to write, if any.
    async fn process_line(&self, line: &str) -> io::Result<Option<String>> {
        let command = match SensorCommand::parse(line) {
            Ok(command) => command,
            Err(e) => {
                warn!(line, error = %e, "malformed command");
                let reply = e
                    .command()
                    .filter(|c| *c == "SET_TARGET_SPEED")
                    .map(|_| REPLY_ERROR.to_string());
                return Ok(reply);
            }
        };

        match command {
            SensorCommand::Hello { node_id, firmware } => {
                info!(
                    node = node_id.as_str(),
                    firmware = firmware.as_str(),
                    "sensor node connected"
                );
                Ok(None)
            }

            SensorCommand::Reading { sensor_id, avg, .. } => {
                let Some(avg) = avg else {
                    warn!(sensor = sensor_id.as_str(), line, "reading without avg ignored");
                    return Ok(None);
                };
                let threshold = self.threshold_for(&sensor_id);
                info!(sensor = sensor_id.as_str(), avg, threshold, "reading");

                if avg < threshold {
                    self.state
                        .run(move |c| c.sensor_triggered(&sensor_id, None))
                        .await
                        .map_err(io::Error::other)?;
                }
                Ok(None)
            }

            SensorCommand::ManualSectorAdvance => {
                info!("manual sector advance requested");
                self.state
                    .run(|c| c.advance_sector())
                    .await
                    .map_err(io::Error::other)?;
                Ok(Some(REPLY_OK.to_string()))
            }

            SensorCommand::Status => {
                debug!("status requested");
                let status = self
                    .state
                    .run(|c| c.status())
                    .await
                    .map_err(io::Error::other)?;
                Ok(Some(serde_json::to_string(&status)?))
            }

            SensorCommand::SetTargetSpeed { address, speed } => {
                info!(address, speed, "set target speed requested");
                let ok = self
                    .state
                    .run(move |c| c.set_target_speed(address, speed))
                    .await
                    .map_err(io::Error::other)?;
                Ok(Some(if ok { REPLY_OK } else { REPLY_ERROR }.to_string()))
            }

            SensorCommand::Unknown(line) => {
                warn!(line = line.as_str(), "unknown command");
                Ok(None)
            }
        }
    }

    async fn handle_connection(&self, stream: TcpStream) -> io::Result<()> {
        let (reader, mut writer) = stream.into_split();
        let mut lines = BufReader::new(reader).lines();

        while let Some(line) = lines.next_line().await? {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            debug!(line, "raw line");

            if let Some(reply) = self.process_line(line).await? {
                writer.write_all(reply.as_bytes()).await?;
                writer.write_all(b"\n").await?;
                writer.flush().await?;
            }
        }
        Ok(())
    }
}

/// Sensor ingestion server.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use signalbox::hal::MockCommandStation;
/// # use signalbox::layout::Layout;
/// # use signalbox::services::{SensorServer, SharedLayoutState};
/// # use signalbox::LayoutController;
/// # async fn demo() -> std::io::Result<()> {
/// let controller = LayoutController::new(Layout::new("demo"), MockCommandStation::new());
/// let state = Arc::new(SharedLayoutState::new(controller));
///
/// let server = SensorServer::new(state);
/// server.run("0.0.0.0:4000").await
/// # }
/// ```
pub struct SensorServer<D: CommandStation> {
    handler: Handler<D>,
    shutdown: watch::Sender<bool>,
    span: Span,
}

impl<D: CommandStation + Send + 'static> SensorServer<D> {
    /// Server with the default detection threshold and no config store.
    pub fn new(state: Arc<SharedLayoutState<D>>) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            handler: Handler {
                state,
                detection_threshold: DEFAULT_DETECTION_THRESHOLD,
                store: None,
            },
            shutdown,
            span: info_span!("sensor_server"),
        }
    }

    /// Create from shared [`SensorServerConfig`].
    pub fn from_config(state: Arc<SharedLayoutState<D>>, config: &SensorServerConfig) -> Self {
        Self::new(state).with_detection_threshold(config.detection_threshold)
    }

    /// Reading below which a sensor without its own stored threshold triggers.
    pub fn with_detection_threshold(mut self, threshold: i64) -> Self {
        self.handler.detection_threshold = threshold;
        self
    }

    /// Look up per-sensor thresholds in `store`.
    pub fn with_config_store(mut self, store: Arc<ConfigStore>) -> Self {
        self.handler.store = Some(store);
        self
    }

    /// Log under the given span instead of the default `sensor_server` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Threshold used for sensors without a stored one.
    pub fn detection_threshold(&self) -> i64 {
        self.handler.detection_threshold
    }

    /// Stop accepting connections. Open connections run until their peers close.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// Bind `addr` and serve until [`shutdown`](Self::shutdown).
    pub async fn run(&self, addr: &str) -> io::Result<()> {
        let listener = TcpListener::bind(addr).await?;
        self.serve(listener).await
    }

    /// Serve an already bound listener until [`shutdown`](Self::shutdown).
    pub async fn serve(&self, listener: TcpListener) -> io::Result<()> {
        let span = self.span.clone();
        self.accept_loop(listener).instrument(span).await
    }

    async fn accept_loop(&self, listener: TcpListener) -> io::Result<()> {
        let mut shutdown = self.shutdown.subscribe();
        info!(addr = %listener.local_addr()?, "sensor server listening");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }
            tokio::select! {
                result = listener.accept() => match result {
                    Ok((stream, peer)) => self.spawn_connection(stream, peer),
                    Err(e) => error!(error = %e, "accept error"),
                },
                _ = shutdown.changed() => {}
            }
        }

        info!("sensor server stopped");
        Ok(())
    }

    fn spawn_connection(&self, stream: TcpStream, peer: SocketAddr) {
        info!(%peer, "client connected");
        let handler = self.handler.clone();
        let span = info_span!(parent: &self.span, "connection", %peer);

        tokio::spawn(
            async move {
                match handler.handle_connection(stream).await {
                    Ok(()) => debug!("client disconnected"),
                    Err(e) => warn!(error = %e, "connection error"),
                }
            }
            .instrument(span),
        );
    }
}
