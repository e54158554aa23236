//! Shared state for every service driving one layout.
//!
//! `SharedLayoutState` provides thread-safe access to a single
//! `LayoutController` that is shared between the sensor server, the control
//! loop and the HTTP API.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use signalbox::hal::MockCommandStation;
//! use signalbox::layout::{Cab, CabConfig, Layout};
//! use signalbox::services::SharedLayoutState;
//! use signalbox::LayoutController;
//!
//! let mut layout = Layout::new("test");
//! layout.add_cab(Cab::new(CabConfig::new("Loco", 3)));
//! let state = Arc::new(SharedLayoutState::new(LayoutController::new(
//!     layout,
//!     MockCommandStation::new(),
//! )));
//!
//! // Sync callers lock through a closure
//! assert!(state.with_controller(|c| c.set_target_speed(3, 20)));
//!
//! // Reads get a snapshot
//! assert_eq!(state.status().cabs[0].target_speed, 20);
//! ```

use std::sync::{Arc, Mutex, PoisonError};

use tokio::task::JoinError;

use crate::controller::{LayoutController, LayoutStatus};
use crate::traits::CommandStation;

/// One controller behind one mutex.
///
/// # Thread Safety
///
/// - Uses `Mutex` (not `RwLock`) because the control loop writes on every
///   tick and status reads are brief.
/// - The lock is held for one logical operation. A status query to the
///   command station during `start` is the only network read made under it.
/// - A panic while holding the lock does not wedge the layout: the next
///   caller takes the guard from the poisoned mutex.
pub struct SharedLayoutState<D: CommandStation> {
    controller: Mutex<LayoutController<D>>,
}

impl<D: CommandStation> SharedLayoutState<D> {
    /// Wrap a controller.
    pub fn new(controller: LayoutController<D>) -> Self {
        Self {
            controller: Mutex::new(controller),
        }
    }

    /// Run `f` with exclusive access to the controller.
    ///
    /// Blocks the calling thread while the lock is contended. From async code
    /// use [`run`](Self::run) instead.
    pub fn with_controller<R, F>(&self, f: F) -> R
    where
        F: FnOnce(&mut LayoutController<D>) -> R,
    {
        let mut guard = self.controller.lock().unwrap_or_else(PoisonError::into_inner);
        f(&mut guard)
    }

    /// Point-in-time status snapshot.
    pub fn status(&self) -> LayoutStatus {
        self.with_controller(|c| c.status())
    }
}

impl<D: CommandStation + Send + 'static> SharedLayoutState<D> {
    /// Run `f` under the lock on tokio's blocking pool.
    ///
    /// Lock waits and command station I/O never stall the async workers.
    /// The error case only occurs if `f` panicked or the runtime is shutting
    /// down.
    pub async fn run<R, F>(self: &Arc<Self>, f: F) -> Result<R, JoinError>
    where
        F: FnOnce(&mut LayoutController<D>) -> R + Send + 'static,
        R: Send + 'static,
    {
        let state = Arc::clone(self);
        tokio::task::spawn_blocking(move || state.with_controller(f)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hal::MockCommandStation;
    use crate::layout::{Cab, CabConfig, Layout};

    fn state() -> Arc<SharedLayoutState<MockCommandStation>> {
        let mut layout = Layout::new("test");
        layout.add_cab(Cab::new(CabConfig::new("Loco", 3)));
        Arc::new(SharedLayoutState::new(LayoutController::new(
            layout,
            MockCommandStation::new(),
        )))
    }

    #[test]
    fn test_with_controller_mutates() {
        let state = state();
        assert!(state.with_controller(|c| c.set_target_speed(3, 40)));
        assert_eq!(state.status().cabs[0].target_speed, 40);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let state = state();
        let poisoner = Arc::clone(&state);
        let result = std::thread::spawn(move || {
            poisoner.with_controller(|_| panic!("boom"));
        })
        .join();
        assert!(result.is_err());

        assert!(state.with_controller(|c| c.set_target_speed(3, 7)));
        assert_eq!(state.status().cabs[0].target_speed, 7);
    }

    #[test]
    fn test_concurrent_access() {
        let state = state();
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let state = Arc::clone(&state);
                std::thread::spawn(move || {
                    for _ in 0..25 {
                        state.with_controller(|c| {
                            c.set_target_speed(3, i * 10);
                            c.tick(0.01);
                        });
                        let _ = state.status();
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        let target = state.status().cabs[0].target_speed;
        assert!([0, 10, 20, 30].contains(&target));
    }

    #[tokio::test]
    async fn test_run_on_blocking_pool() {
        let state = state();
        let ok = state.run(|c| c.set_target_speed(3, 12)).await.unwrap();
        assert!(ok);

        let sent = state
            .run(|c| {
                c.tick(1.0);
                c.dcc().sent.clone()
            })
            .await
            .unwrap();
        assert_eq!(sent, vec!["<t 3 5 1>"]);
    }
}
