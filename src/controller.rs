//! Layout controller: sector occupancy and speed ramping.
//!
//! This module provides [`LayoutController`], the single authority over a
//! layout's live state. It owns the [`Layout`] and a [`CommandStation`], and
//! everything that changes cab speed, target or location goes through it.
//!
//! # Overview
//!
//! The controller:
//! - Tracks which sector each cab occupies from proximity sensor triggers
//! - Rejects triggers that do not follow the sector cycle
//! - Ramps each cab's speed toward its target on every [`tick`](LayoutController::tick)
//! - Produces point-in-time [`LayoutStatus`] snapshots
//!
//! # Example
//!
//! ```rust
//! use signalbox::hal::MockCommandStation;
//! use signalbox::layout::{Cab, CabConfig, Layout, LayoutSector, ProximitySensor};
//! use signalbox::{LayoutController, TransitionOutcome};
//!
//! let mut layout = Layout::new("loop");
//! layout.add_cab(Cab::new(CabConfig::new("Santa Fe 3751", 2)));
//! layout.add_sector(LayoutSector::new(1, "Flat"));
//! layout.add_sector(LayoutSector::new(2, "Hill").with_speed_limit(Some(30)));
//! layout.add_proximity_sensor(ProximitySensor::new("end_of_flat", 1));
//! layout.add_proximity_sensor(ProximitySensor::new("end_of_hill", 2));
//!
//! let mut controller = LayoutController::new(layout, MockCommandStation::new());
//!
//! // First trigger places the cab
//! controller.sensor_triggered("end_of_flat", None);
//! // Next sector in the cycle is accepted and imposes its limit
//! let outcome = controller.sensor_triggered("end_of_hill", None);
//! assert!(outcome.is_applied());
//! assert_eq!(controller.primary_cab().unwrap().target_speed(), 30);
//!
//! // Call tick() from a periodic driver
//! controller.tick(0.1);
//! ```

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, info_span, warn, Span};

use crate::dcc::{MAIN_TRACK, MAX_SPEED};
use crate::layout::{Cab, Layout, LayoutSector, SectorId};
use crate::traits::CommandStation;

/// Default wait for a cab status answer during [`LayoutController::start`].
pub const DEFAULT_STATUS_TIMEOUT: Duration = Duration::from_secs(2);

// ============================================================================
// Transition Outcomes
// ============================================================================

/// Result of feeding a sensor trigger into the sector state machine.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransitionOutcome {
    /// The cab had no location and was placed in the sensor's sector.
    InitialAssignment {
        /// Sector the cab now occupies.
        sector: SectorId,
    },

    /// The cab was already in the sensor's sector; nothing changed.
    AlreadyInSector,

    /// The cab moved into the cyclic-next sector.
    Advanced {
        /// Sector the cab left.
        from: SectorId,
        /// Sector the cab entered.
        to: SectorId,
        /// Target speed imposed by the new sector, if it has a limit.
        target_speed: Option<u8>,
    },

    /// The trigger was ignored.
    Rejected(RejectReason),
}

impl TransitionOutcome {
    /// Whether the cab's location changed.
    pub fn is_applied(&self) -> bool {
        matches!(
            self,
            TransitionOutcome::InitialAssignment { .. } | TransitionOutcome::Advanced { .. }
        )
    }
}

/// Why a sensor trigger was ignored.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RejectReason {
    /// The layout has no cabs, or none at the requested address.
    NoCab,

    /// No proximity sensor has this id.
    UnknownSensor(String),

    /// The sensor (or the cab's location) names a sector not in the layout.
    UnknownSector(SectorId),

    /// The sensor's sector is not the one after the cab's location.
    InvalidTransition {
        /// Cab's current sector.
        from: SectorId,
        /// Sector the sensor reported.
        to: SectorId,
        /// Sector the cycle requires next.
        expected: SectorId,
    },
}

// ============================================================================
// Status Snapshot
// ============================================================================

/// Point-in-time copy of the whole layout, serialised as the `STATUS` reply.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LayoutStatus {
    /// Layout identity.
    pub layout: LayoutInfo,
    /// Every cab, in definition order.
    pub cabs: Vec<CabSnapshot>,
    /// Every sector, in cycle order.
    pub sectors: Vec<SectorSnapshot>,
    /// Every proximity sensor.
    pub sensors: Vec<SensorSnapshot>,
}

/// Layout identity block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LayoutInfo {
    /// Layout name.
    pub name: String,
}

/// Cab state at snapshot time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CabSnapshot {
    /// Display name.
    pub name: String,
    /// DCC address.
    pub address: u16,
    /// Current speed rounded to two decimals.
    pub current_speed: f64,
    /// Target speed.
    pub target_speed: u8,
    /// Direction wire bit: 1 forward, 0 reverse.
    pub direction: u8,
    /// `forward` or `reverse`.
    pub direction_name: String,
    /// Speed steps per second.
    pub acceleration: f64,
    /// Occupied sector, if known.
    pub location: Option<SectorSnapshot>,
}

/// Sector attributes at snapshot time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorSnapshot {
    /// Sector id.
    pub id: SectorId,
    /// Display name.
    pub name: String,
    /// Speed limit, if any.
    pub speed_limit: Option<u8>,
}

/// Sensor wiring at snapshot time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSnapshot {
    /// Sensor id.
    pub id: String,
    /// Sector whose exit the sensor watches.
    pub sector_id: SectorId,
}

impl From<&LayoutSector> for SectorSnapshot {
    fn from(sector: &LayoutSector) -> Self {
        Self {
            id: sector.id().clone(),
            name: sector.name().to_string(),
            speed_limit: sector.speed_limit(),
        }
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

// ============================================================================
// Layout Controller
// ============================================================================

/// Layout controller.
///
/// # Type Parameter
///
/// - `D`: The command station implementation ([`CommandStation`] trait)
///
/// # Thread Safety
///
/// The controller itself is not thread-safe. Services share it through
/// [`SharedLayoutState`](crate::services::SharedLayoutState), which holds it
/// behind one mutex for every sensor trigger, tick and status snapshot.
pub struct LayoutController<D: CommandStation> {
    layout: Layout,
    dcc: D,
    status_timeout: Duration,
    track: String,
    span: Span,
}

impl<D: CommandStation> LayoutController<D> {
    /// Create a controller over a fully built layout.
    pub fn new(layout: Layout, dcc: D) -> Self {
        let span = info_span!("controller", layout = %layout.name());
        Self {
            layout,
            dcc,
            status_timeout: DEFAULT_STATUS_TIMEOUT,
            track: MAIN_TRACK.to_string(),
            span,
        }
    }

    /// Log under the given span instead of the default `controller` span.
    pub fn with_span(mut self, span: Span) -> Self {
        self.span = span;
        self
    }

    /// Set how long [`start`](Self::start) waits for each cab status.
    pub fn with_status_timeout(mut self, timeout: Duration) -> Self {
        self.status_timeout = timeout;
        self
    }

    /// Set the track powered by `start` and cut by `emergency_stop`.
    pub fn with_track(mut self, track: &str) -> Self {
        self.track = track.to_string();
        self
    }

    /// The layout being controlled.
    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    /// The command station.
    pub fn dcc(&self) -> &D {
        &self.dcc
    }

    /// Mutable access to the command station.
    pub fn dcc_mut(&mut self) -> &mut D {
        &mut self.dcc
    }

    /// First cab in the layout, which sensor triggers move by default.
    pub fn primary_cab(&self) -> Option<&Cab> {
        self.layout.primary_cab()
    }

    /// Power the track, then adopt each cab's reported speed and direction.
    ///
    /// A cab whose status cannot be read keeps its constructed defaults.
    pub fn start(&mut self) -> Result<(), D::Error> {
        let span = self.span.clone();
        let _entered = span.enter();

        self.dcc.track_power_on(&self.track)?;

        let timeout = self.status_timeout;
        for cab in self.layout.cabs_mut() {
            info!(cab = cab.name(), address = cab.address(), "fetching cab status");
            match self.dcc.cab_status(cab.address(), timeout) {
                Some(status) => {
                    let speed = status.speed.min(MAX_SPEED);
                    cab.set_current_speed(f64::from(speed));
                    cab.set_target_speed(speed);
                    cab.set_direction(status.direction);
                    info!(
                        cab = cab.name(),
                        speed,
                        direction = %status.direction,
                        "cab status adopted"
                    );
                }
                None => warn!(cab = cab.name(), "could not fetch cab status, using defaults"),
            }
        }
        Ok(())
    }

    /// Cut track power to every decoder.
    pub fn emergency_stop(&mut self) -> Result<(), D::Error> {
        let span = self.span.clone();
        let _entered = span.enter();
        warn!(track = self.track.as_str(), "emergency stop");
        self.dcc.track_power_off(&self.track)
    }

    /// Advance every ramping cab by `elapsed` seconds.
    ///
    /// Each cab moves toward its target by at most `acceleration * elapsed`
    /// without overshooting, and the rounded speed is sent to the command
    /// station. Cabs already at target send nothing.
    pub fn tick(&mut self, elapsed: f64) {
        if !elapsed.is_finite() || elapsed <= 0.0 {
            return;
        }
        let span = self.span.clone();
        let _entered = span.enter();

        for cab in self.layout.cabs_mut() {
            if !cab.is_ramping() {
                continue;
            }

            let current = cab.current_speed();
            let target = f64::from(cab.target_speed());
            let max_delta = cab.acceleration() * elapsed;
            let next = if current < target {
                (current + max_delta).min(target)
            } else {
                (current - max_delta).max(target)
            };
            cab.set_current_speed(next);

            let wire_speed = next.round() as u8;
            if let Err(e) = self.dcc.set_speed(cab.address(), wire_speed, cab.direction()) {
                warn!(cab = cab.name(), error = %e, "failed to send speed");
            }
            debug!(
                cab = cab.name(),
                speed = round2(next),
                target = cab.target_speed(),
                "tick"
            );
        }
    }

    /// Set a cab's target speed, clamped to 0-127.
    ///
    /// Returns `false` if no cab has `address`. The speed itself changes on
    /// subsequent ticks.
    pub fn set_target_speed(&mut self, address: u16, speed: i64) -> bool {
        let span = self.span.clone();
        let _entered = span.enter();

        let Some(cab) = self
            .layout
            .cab_index(address)
            .and_then(|i| self.layout.cab_mut(i))
        else {
            warn!(address, "cannot set target speed: no cab at address");
            return false;
        };

        let speed = speed.clamp(0, i64::from(MAX_SPEED)) as u8;
        info!(
            cab = cab.name(),
            address,
            from = cab.target_speed(),
            to = speed,
            "setting target speed"
        );
        cab.set_target_speed(speed);
        true
    }

    /// Feed a proximity sensor trigger into the sector state machine.
    ///
    /// `cab` selects a cab by address; `None` means the primary cab.
    pub fn sensor_triggered(&mut self, sensor_id: &str, cab: Option<u16>) -> TransitionOutcome {
        let span = self.span.clone();
        let _entered = span.enter();

        let outcome = self.resolve_trigger(sensor_id, cab);
        match &outcome {
            TransitionOutcome::Rejected(RejectReason::InvalidTransition { from, to, expected }) => {
                warn!(
                    sensor = sensor_id,
                    %from,
                    %to,
                    %expected,
                    "invalid sector transition"
                );
            }
            TransitionOutcome::Rejected(reason) => {
                warn!(sensor = sensor_id, ?reason, "sensor trigger ignored");
            }
            TransitionOutcome::InitialAssignment { sector } => {
                debug!(sensor = sensor_id, %sector, "initial sector assignment");
            }
            TransitionOutcome::AlreadyInSector => {
                debug!(sensor = sensor_id, "already in sector, no action taken");
            }
            TransitionOutcome::Advanced {
                from,
                to,
                target_speed,
            } => {
                info!(sensor = sensor_id, %from, %to, ?target_speed, "cab entered sector");
            }
        }
        outcome
    }

    fn resolve_trigger(&mut self, sensor_id: &str, cab: Option<u16>) -> TransitionOutcome {
        let cab_index = match cab {
            Some(address) => self.layout.cab_index(address),
            None if self.layout.cabs().is_empty() => None,
            None => Some(0),
        };
        let Some(cab_index) = cab_index else {
            return TransitionOutcome::Rejected(RejectReason::NoCab);
        };

        let Some(sensor) = self.layout.find_sensor(sensor_id) else {
            return TransitionOutcome::Rejected(RejectReason::UnknownSensor(sensor_id.to_string()));
        };
        let Some(sector) = self.layout.find_sector(sensor.sector_id()) else {
            return TransitionOutcome::Rejected(RejectReason::UnknownSector(
                sensor.sector_id().clone(),
            ));
        };
        let sector_id = sector.id().clone();
        let speed_limit = sector.speed_limit();

        let location = self.layout.cabs()[cab_index].location().cloned();
        let Some(from) = location else {
            if let Some(cab) = self.layout.cab_mut(cab_index) {
                cab.set_location(Some(sector_id.clone()));
            }
            return TransitionOutcome::InitialAssignment { sector: sector_id };
        };

        if from == sector_id {
            return TransitionOutcome::AlreadyInSector;
        }

        let Some(expected) = self.layout.next_sector_after(&from).map(|s| s.id().clone()) else {
            return TransitionOutcome::Rejected(RejectReason::UnknownSector(from));
        };
        if expected != sector_id {
            return TransitionOutcome::Rejected(RejectReason::InvalidTransition {
                from,
                to: sector_id,
                expected,
            });
        }

        if let Some(cab) = self.layout.cab_mut(cab_index) {
            cab.set_location(Some(sector_id.clone()));
            if let Some(limit) = speed_limit {
                cab.set_target_speed(limit);
            }
        }
        TransitionOutcome::Advanced {
            from,
            to: sector_id,
            target_speed: speed_limit,
        }
    }

    /// Move the primary cab to the next sector without validation.
    ///
    /// An unplaced cab goes to the first sector. Only the location changes;
    /// the target speed is left alone. Returns the sector entered, or `None`
    /// if the layout has no cab or no sectors.
    pub fn advance_sector(&mut self) -> Option<SectorId> {
        let span = self.span.clone();
        let _entered = span.enter();

        let Some(location) = self.layout.primary_cab().map(|c| c.location().cloned()) else {
            warn!("manual sector advance ignored: layout has no cabs");
            return None;
        };
        let next = match &location {
            Some(current) => self.layout.next_sector_after(current),
            None => self.layout.sectors().first(),
        };
        let Some(next) = next else {
            warn!(from = ?location, "manual sector advance ignored: no sector to enter");
            return None;
        };
        let to = next.id().clone();

        if let Some(cab) = self.layout.cab_mut(0) {
            cab.set_location(Some(to.clone()));
            info!(cab = cab.name(), from = ?location, %to, "manual sector advance");
        }
        Some(to)
    }

    /// Copy the current state of every cab, sector and sensor.
    pub fn status(&self) -> LayoutStatus {
        let layout = &self.layout;
        LayoutStatus {
            layout: LayoutInfo {
                name: layout.name().to_string(),
            },
            cabs: layout
                .cabs()
                .iter()
                .map(|cab| CabSnapshot {
                    name: cab.name().to_string(),
                    address: cab.address(),
                    current_speed: round2(cab.current_speed()),
                    target_speed: cab.target_speed(),
                    direction: cab.direction().bit(),
                    direction_name: cab.direction().as_str().to_string(),
                    acceleration: cab.acceleration(),
                    location: cab
                        .location()
                        .and_then(|id| layout.find_sector(id))
                        .map(SectorSnapshot::from),
                })
                .collect(),
            sectors: layout.sectors().iter().map(SectorSnapshot::from).collect(),
            sensors: layout
                .proximity_sensors()
                .iter()
                .map(|sensor| SensorSnapshot {
                    id: sensor.id().to_string(),
                    sector_id: sensor.sector_id().clone(),
                })
                .collect(),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
