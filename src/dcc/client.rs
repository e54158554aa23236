//! TCP client for a DCC-EX command station.
//!
//! [`DccClient`] owns at most one connection. Sends are fire-and-forget
//! lines; status queries write one line and wait a bounded time for one
//! answer. A broken connection is dropped and re-established on the next
//! use, and a failed send is retried exactly once on a fresh connection.

use std::io::{self, BufRead, BufReader, ErrorKind, Write};
use std::net::{TcpStream, ToSocketAddrs};
use std::time::Duration;

use tracing::{debug, info, info_span, warn, Span};

use crate::config::DccConfig;
use crate::traits::CommandStation;

/// Default timeout for establishing the TCP connection.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Errors from the DCC transport.
#[derive(Debug, thiserror::Error)]
pub enum DccError {
    /// The endpoint could not be resolved or reached.
    #[error("cannot connect to command station at {endpoint}: {source}")]
    Connect {
        /// `host:port` of the command station.
        endpoint: String,
        /// Underlying I/O error.
        #[source]
        source: io::Error,
    },

    /// Writing to an established connection failed.
    #[error("command station I/O error: {0}")]
    Io(#[from] io::Error),
}

/// An established connection. Writes go through the reader's inner stream so
/// buffered input is never lost between a query and its answer.
struct Connection {
    reader: BufReader<TcpStream>,
}

impl Connection {
    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let stream = self.reader.get_mut();
        stream.write_all(line.as_bytes())?;
        stream.write_all(b"\n")?;
        stream.flush()
    }

    /// Discard anything the command station broadcast since the last read.
    ///
    /// Returns `false` if the peer closed the connection.
    fn drain_pending(&mut self) -> io::Result<bool> {
        self.reader.get_ref().set_nonblocking(true)?;
        let mut scratch = String::new();
        let open = loop {
            scratch.clear();
            match self.reader.read_line(&mut scratch) {
                Ok(0) => break Ok(false),
                Ok(_) => debug!(line = scratch.trim_end(), "discarding unsolicited line"),
                Err(e) if e.kind() == ErrorKind::WouldBlock => break Ok(true),
                Err(e) if e.kind() == ErrorKind::Interrupted => {}
                Err(e) => break Err(e),
            }
        };
        self.reader.get_ref().set_nonblocking(false)?;
        open
    }

    /// Read one line, waiting at most `timeout`.
    ///
    /// `Ok(None)` means the timeout elapsed; EOF is reported as
    /// [`ErrorKind::UnexpectedEof`].
    fn read_line(&mut self, timeout: Duration) -> io::Result<Option<String>> {
        // a zero timeout is rejected by set_read_timeout
        let timeout = timeout.max(Duration::from_millis(1));
        self.reader.get_ref().set_read_timeout(Some(timeout))?;

        let mut line = String::new();
        match self.reader.read_line(&mut line) {
            Ok(0) => Err(io::Error::new(
                ErrorKind::UnexpectedEof,
                "command station closed the connection",
            )),
            Ok(_) => Ok(Some(line.trim_end_matches(['\r', '\n']).to_string())),
            Err(e) if matches!(e.kind(), ErrorKind::WouldBlock | ErrorKind::TimedOut) => Ok(None),
            Err(e) => Err(e),
        }
    }
}

/// DCC-EX command station client over TCP.
///
/// # Example
///
/// ```rust,no_run
/// use std::time::Duration;
/// use signalbox::dcc::DccClient;
/// use signalbox::traits::{CommandStation, Direction};
///
/// let mut dcc = DccClient::new("192.168.0.22", 2560);
/// dcc.connect().unwrap();
/// dcc.track_power_main().unwrap();
/// dcc.set_speed(2, 30, Direction::Forward).unwrap();
///
/// if let Some(status) = dcc.cab_status(2, Duration::from_secs(2)) {
///     println!("cab 2 at speed {} {}", status.speed, status.direction);
/// }
/// dcc.close();
/// ```
pub struct DccClient {
    host: String,
    port: u16,
    connect_timeout: Duration,
    connection: Option<Connection>,
    span: Span,
}

impl DccClient {
    /// Create a client for `host:port`. No connection is made until first use.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        let host = host.into();
        let span = info_span!("dcc", endpoint = %format!("{}:{}", host, port));
        Self {
            host,
            port,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            connection: None,
            span,
        }
    }

    /// Create from shared [`DccConfig`].
    pub fn from_config(config: &DccConfig) -> Self {
        Self::new(config.host.clone(), config.port)
    }

    /// Log under the given span instead of the default `dcc` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Set the TCP connect timeout.
    pub fn with_connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    /// `host:port` of the command station.
    pub fn endpoint(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Whether a connection is currently held.
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    fn ensure_connected(&mut self) -> Result<&mut Connection, DccError> {
        if self.connection.is_none() {
            let stream = self.open_stream()?;
            stream.set_nodelay(true).ok();
            info!("connected to command station");
            self.connection = Some(Connection {
                reader: BufReader::new(stream),
            });
        }
        match self.connection.as_mut() {
            Some(connection) => Ok(connection),
            None => Err(DccError::Io(io::Error::new(
                ErrorKind::NotConnected,
                "connection unavailable",
            ))),
        }
    }

    fn open_stream(&self) -> Result<TcpStream, DccError> {
        let connect_error = |source| DccError::Connect {
            endpoint: self.endpoint(),
            source,
        };

        let addrs = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(connect_error)?;

        let mut last_error =
            io::Error::new(ErrorKind::AddrNotAvailable, "host resolved to no addresses");
        for addr in addrs {
            match TcpStream::connect_timeout(&addr, self.connect_timeout) {
                Ok(stream) => return Ok(stream),
                Err(e) => last_error = e,
            }
        }
        Err(connect_error(last_error))
    }

    fn drop_connection(&mut self) {
        if let Some(connection) = self.connection.take() {
            // the peer may already be gone
            let _ = connection.reader.get_ref().shutdown(std::net::Shutdown::Both);
        }
    }

    fn write_line(&mut self, line: &str) -> Result<(), DccError> {
        let connection = self.ensure_connected()?;
        connection.write_line(line)?;
        Ok(())
    }

    fn exchange(&mut self, line: &str, timeout: Duration) -> Result<Option<String>, DccError> {
        let connection = self.ensure_connected()?;
        if !connection.drain_pending()? {
            return Err(DccError::Io(io::Error::new(
                ErrorKind::UnexpectedEof,
                "command station closed the connection",
            )));
        }
        connection.write_line(line)?;
        Ok(connection.read_line(timeout)?)
    }
}

impl CommandStation for DccClient {
    type Error = DccError;

    fn connect(&mut self) -> Result<(), DccError> {
        let span = self.span.clone();
        let _entered = span.enter();
        self.ensure_connected().map(|_| ())
    }

    fn close(&mut self) {
        let span = self.span.clone();
        let _entered = span.enter();
        if self.connection.is_some() {
            debug!("closing connection");
        }
        self.drop_connection();
    }

    fn send(&mut self, line: &str) -> Result<(), DccError> {
        let span = self.span.clone();
        let _entered = span.enter();

        debug!(line, "send");
        match self.write_line(line) {
            Ok(()) => Ok(()),
            Err(first) => {
                warn!(error = %first, line, "send failed; reconnecting");
                self.drop_connection();
                self.write_line(line).map_err(|second| {
                    warn!(error = %second, line, "send failed after reconnect");
                    self.drop_connection();
                    second
                })
            }
        }
    }

    fn send_and_receive(&mut self, line: &str, timeout: Duration) -> Option<String> {
        let span = self.span.clone();
        let _entered = span.enter();

        debug!(line, ?timeout, "send and receive");
        match self.exchange(line, timeout) {
            Ok(Some(response)) => {
                debug!(response = response.as_str(), "received");
                Some(response)
            }
            Ok(None) => {
                debug!(line, "no response before timeout");
                None
            }
            Err(e) => {
                warn!(error = %e, line, "send and receive failed");
                self.drop_connection();
                None
            }
        }
    }
}

impl Drop for DccClient {
    fn drop(&mut self) {
        self.drop_connection();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    fn unused_port() -> u16 {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        listener.local_addr().unwrap().port()
    }

    #[test]
    fn new_client_is_disconnected() {
        let client = DccClient::new("127.0.0.1", 2560);
        assert!(!client.is_connected());
        assert_eq!(client.endpoint(), "127.0.0.1:2560");
    }

    #[test]
    fn close_when_never_connected_is_harmless() {
        let mut client = DccClient::new("127.0.0.1", 2560);
        client.close();
        client.close();
        assert!(!client.is_connected());
    }

    #[test]
    fn send_to_refused_endpoint_errors_after_retry() {
        let mut client = DccClient::new("127.0.0.1", unused_port())
            .with_connect_timeout(Duration::from_millis(200));

        let err = client.send("<1 MAIN>").unwrap_err();
        assert!(matches!(err, DccError::Connect { .. }));
        assert!(!client.is_connected());
    }

    #[test]
    fn query_against_refused_endpoint_is_none() {
        let mut client = DccClient::new("127.0.0.1", unused_port())
            .with_connect_timeout(Duration::from_millis(200));

        assert!(client
            .send_and_receive("<t 3>", Duration::from_millis(50))
            .is_none());
        assert!(client.cab_status(3, Duration::from_millis(50)).is_none());
    }

    #[test]
    fn error_display_names_endpoint() {
        let err = DccError::Connect {
            endpoint: "10.0.0.1:2560".into(),
            source: io::Error::new(ErrorKind::ConnectionRefused, "refused"),
        };
        assert!(err.to_string().contains("10.0.0.1:2560"));
    }
}
