//! Mock implementations for testing without a command station.
//!
//! # Available Mocks
//!
//! | Mock | Trait | Purpose |
//! |------|-------|---------|
//! | [`MockCommandStation`] | [`CommandStation`] | Records wire lines, serves queued responses |
//!
//! # Example
//!
//! ```rust
//! use signalbox::hal::MockCommandStation;
//! use signalbox::layout::{Cab, CabConfig, Layout};
//! use signalbox::LayoutController;
//!
//! let mut layout = Layout::new("test");
//! layout.add_cab(Cab::new(CabConfig::new("Loco", 3)));
//!
//! let mut controller = LayoutController::new(layout, MockCommandStation::new());
//! controller.set_target_speed(3, 10);
//! controller.tick(1.0);
//!
//! // acceleration defaults to 5 units/s
//! assert_eq!(controller.dcc().sent, vec!["<t 3 5 1>"]);
//! ```
//!
//! [`CommandStation`]: crate::traits::CommandStation

use std::collections::VecDeque;
use std::time::Duration;

use crate::traits::CommandStation;

/// Error returned by [`MockCommandStation`] when failure is injected.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("mock command station offline")]
pub struct MockOffline;

/// Mock command station for testing.
///
/// Every line passed to `send` or `send_and_receive` is appended to
/// [`sent`](Self::sent). Responses queued with
/// [`queue_response`](Self::queue_response) are handed out in FIFO order by
/// `send_and_receive`; an empty queue behaves like a timeout.
///
/// # Example
///
/// ```rust
/// use std::time::Duration;
/// use signalbox::hal::MockCommandStation;
/// use signalbox::traits::CommandStation;
///
/// let mut station = MockCommandStation::new();
/// station.queue_response("<l 2 0 130 0>");
///
/// let status = station.cab_status(2, Duration::from_secs(2)).unwrap();
/// assert_eq!(status.speed, 2);
///
/// station.fail_sends(true);
/// assert!(station.send("<!>").is_err());
/// assert_eq!(station.sent.len(), 1); // failed sends are not recorded
/// ```
#[derive(Debug, Default)]
pub struct MockCommandStation {
    /// Every line successfully sent, in order.
    pub sent: Vec<String>,
    /// Pending responses for `send_and_receive`.
    pub responses: VecDeque<String>,
    /// Whether the mock is currently connected.
    pub connected: bool,
    /// Number of times `connect` established a connection.
    pub connect_count: usize,
    failing: bool,
}

impl MockCommandStation {
    /// Creates a new mock with no queued responses.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a response line for the next `send_and_receive`.
    pub fn queue_response(&mut self, line: impl Into<String>) {
        self.responses.push_back(line.into());
    }

    /// Make every subsequent send fail (or succeed again).
    pub fn fail_sends(&mut self, failing: bool) {
        self.failing = failing;
    }

    /// Lines sent that start with the given prefix.
    pub fn sent_matching(&self, prefix: &str) -> Vec<&str> {
        self.sent
            .iter()
            .filter(|line| line.starts_with(prefix))
            .map(String::as_str)
            .collect()
    }

    /// Forget recorded lines.
    pub fn clear_sent(&mut self) {
        self.sent.clear();
    }
}

impl CommandStation for MockCommandStation {
    type Error = MockOffline;

    fn connect(&mut self) -> Result<(), MockOffline> {
        if self.failing {
            return Err(MockOffline);
        }
        if !self.connected {
            self.connected = true;
            self.connect_count += 1;
        }
        Ok(())
    }

    fn close(&mut self) {
        self.connected = false;
    }

    fn send(&mut self, line: &str) -> Result<(), MockOffline> {
        self.connect()?;
        self.sent.push(line.to_string());
        Ok(())
    }

    fn send_and_receive(&mut self, line: &str, _timeout: Duration) -> Option<String> {
        self.send(line).ok()?;
        self.responses.pop_front()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn records_lines_and_connects_once() {
        let mut station = MockCommandStation::new();
        station.send("<1 MAIN>").unwrap();
        station.send("<t 3 5 1>").unwrap();

        assert_eq!(station.sent, vec!["<1 MAIN>", "<t 3 5 1>"]);
        assert!(station.connected);
        assert_eq!(station.connect_count, 1);
    }

    #[test]
    fn close_is_idempotent() {
        let mut station = MockCommandStation::new();
        station.close();
        station.connect().unwrap();
        station.close();
        station.close();
        assert!(!station.connected);
    }

    #[test]
    fn responses_are_fifo() {
        let mut station = MockCommandStation::new();
        station.queue_response("first");
        station.queue_response("second");

        let timeout = Duration::from_millis(1);
        assert_eq!(station.send_and_receive("<t 1>", timeout).as_deref(), Some("first"));
        assert_eq!(station.send_and_receive("<t 2>", timeout).as_deref(), Some("second"));
        assert_eq!(station.send_and_receive("<t 3>", timeout), None);
    }

    #[test]
    fn failure_injection() {
        let mut station = MockCommandStation::new();
        station.fail_sends(true);
        assert_eq!(station.send("<!>"), Err(MockOffline));
        assert!(station.send_and_receive("<t 1>", Duration::from_millis(1)).is_none());
        assert!(station.sent.is_empty());

        station.fail_sends(false);
        station.send("<!>").unwrap();
        assert_eq!(station.sent_matching("<!"), vec!["<!>"]);
    }
}
