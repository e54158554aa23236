//! Periodic driver for the speed ramp.
//!
//! [`ControlLoop`] ticks the shared controller at a fixed cadence whether or
//! not any sensor traffic arrives. Each tick passes the real time elapsed
//! since the previous one, so a late tick ramps further instead of drifting.

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{error, info, info_span, trace, Instrument, Span};

use crate::config::ControlLoopConfig;
use crate::traits::CommandStation;

use super::shared::SharedLayoutState;

/// Speed ramp driver.
///
/// # Example
///
/// ```rust,no_run
/// # use std::sync::Arc;
/// # use signalbox::hal::MockCommandStation;
/// # use signalbox::layout::Layout;
/// # use signalbox::services::{ControlLoop, SharedLayoutState};
/// # use signalbox::LayoutController;
/// # async fn demo() {
/// let controller = LayoutController::new(Layout::new("demo"), MockCommandStation::new());
/// let state = Arc::new(SharedLayoutState::new(controller));
///
/// let handle = ControlLoop::default().spawn(Arc::clone(&state));
/// // ...
/// handle.abort();
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct ControlLoop {
    interval: Duration,
    span: Span,
}

impl Default for ControlLoop {
    fn default() -> Self {
        Self::from_config(&ControlLoopConfig::default())
    }
}

impl ControlLoop {
    /// Tick every `interval` (at least 1ms).
    pub fn new(interval: Duration) -> Self {
        Self {
            interval: interval.max(Duration::from_millis(1)),
            span: info_span!("control_loop"),
        }
    }

    /// Create from shared [`ControlLoopConfig`].
    pub fn from_config(config: &ControlLoopConfig) -> Self {
        Self::new(config.tick_interval())
    }

    /// Log under the given span instead of the default `control_loop` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Tick interval.
    pub fn interval(&self) -> Duration {
        self.interval
    }

    /// Spawn the loop on the current tokio runtime.
    ///
    /// The task runs until aborted, or until a tick panics.
    pub fn spawn<D>(self, state: Arc<SharedLayoutState<D>>) -> JoinHandle<()>
    where
        D: CommandStation + Send + 'static,
    {
        let span = self.span.clone();
        tokio::spawn(self.run(state).instrument(span))
    }

    async fn run<D>(self, state: Arc<SharedLayoutState<D>>)
    where
        D: CommandStation + Send + 'static,
    {
        info!(interval_ms = self.interval.as_millis() as u64, "control loop started");

        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last = Instant::now();

        loop {
            ticker.tick().await;
            let now = Instant::now();
            let elapsed = now.duration_since(last).as_secs_f64();
            last = now;

            trace!(elapsed, "tick");
            if let Err(e) = state.run(move |c| c.tick(elapsed)).await {
                error!(error = %e, "control loop tick failed, stopping");
                break;
            }
        }
    }
}
