//! Passive layout model: cabs, sectors, proximity sensors.
//!
//! A [`Layout`] is built once (usually by [`crate::loader`]) and then handed
//! to the [`LayoutController`](crate::LayoutController), which is the only
//! code that mutates cab speed, target and location afterwards. The sets of
//! cabs, sectors and sensors never change after construction.
//!
//! Sectors are kept in a fixed order that the controller reads as a cycle:
//! the sector after the last one is the first.
//!
//! # Example
//!
//! ```rust
//! use signalbox::layout::{Cab, CabConfig, Layout, LayoutSector, ProximitySensor, SectorId};
//!
//! let mut layout = Layout::new("main");
//! layout.add_cab(Cab::new(CabConfig::new("Santa Fe 3751", 2)));
//! layout.add_sector(LayoutSector::new(1, "Round the Mountain"));
//! layout.add_sector(LayoutSector::new(2, "Hill Climb"));
//! layout.add_proximity_sensor(ProximitySensor::new("end_of_hill", 1));
//!
//! assert_eq!(layout.next_sector_after(&SectorId::from(2)).unwrap().name(), "Round the Mountain");
//! assert_eq!(layout.find_sensor("end_of_hill").unwrap().sector_id(), &SectorId::from(1));
//! ```

use core::fmt;

use serde::{Deserialize, Serialize};

use crate::dcc::MAX_SPEED;
use crate::traits::Direction;

/// Default cab acceleration, in speed steps per second.
pub const DEFAULT_ACCELERATION: f64 = 5.0;

/// Default sector speed limit.
pub const DEFAULT_SPEED_LIMIT: u8 = 10;

// ============================================================================
// Identifiers
// ============================================================================

/// Sector identifier.
///
/// Layout files may number their sectors or name them; both forms are kept
/// as written, so `1` and `"1"` are different ids.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SectorId {
    /// Numeric id.
    Number(i64),
    /// Textual id.
    Name(String),
}

impl fmt::Display for SectorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SectorId::Number(n) => write!(f, "{}", n),
            SectorId::Name(s) => f.write_str(s),
        }
    }
}

impl From<i64> for SectorId {
    fn from(n: i64) -> Self {
        SectorId::Number(n)
    }
}

impl From<i32> for SectorId {
    fn from(n: i32) -> Self {
        SectorId::Number(i64::from(n))
    }
}

impl From<&str> for SectorId {
    fn from(s: &str) -> Self {
        SectorId::Name(s.to_string())
    }
}

impl From<String> for SectorId {
    fn from(s: String) -> Self {
        SectorId::Name(s)
    }
}

/// Address and port of a command station, as named by a layout file.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DccEndpoint {
    /// Hostname or IP.
    pub host: String,
    /// TCP port.
    pub port: u16,
}

// ============================================================================
// Cab
// ============================================================================

/// Construction parameters for a [`Cab`].
#[derive(Clone, Debug, PartialEq)]
pub struct CabConfig {
    /// Display name.
    pub name: String,
    /// DCC bus address.
    pub address: u16,
    /// Speed steps per second; must be positive.
    pub acceleration: f64,
    /// Initial direction.
    pub direction: Direction,
    /// Initial speed, 0-127.
    pub speed: u8,
}

impl Default for CabConfig {
    fn default() -> Self {
        Self {
            name: String::new(),
            address: 0,
            acceleration: DEFAULT_ACCELERATION,
            direction: Direction::Forward,
            speed: 0,
        }
    }
}

impl CabConfig {
    /// Config for a named cab at `address` with default dynamics.
    pub fn new(name: impl Into<String>, address: u16) -> Self {
        Self {
            name: name.into(),
            address,
            ..Default::default()
        }
    }

    /// Set the acceleration.
    pub fn with_acceleration(mut self, acceleration: f64) -> Self {
        self.acceleration = acceleration;
        self
    }

    /// Set the initial direction.
    pub fn with_direction(mut self, direction: Direction) -> Self {
        self.direction = direction;
        self
    }

    /// Set the initial (current and target) speed.
    pub fn with_speed(mut self, speed: u8) -> Self {
        self.speed = speed;
        self
    }
}

/// A controllable locomotive.
#[derive(Clone, Debug)]
pub struct Cab {
    name: String,
    address: u16,
    current_speed: f64,
    target_speed: u8,
    acceleration: f64,
    direction: Direction,
    location: Option<SectorId>,
}

impl Cab {
    /// Build a cab. Speeds are clamped to 0-127 and a non-positive or
    /// non-finite acceleration falls back to [`DEFAULT_ACCELERATION`].
    pub fn new(config: CabConfig) -> Self {
        let acceleration = if config.acceleration.is_finite() && config.acceleration > 0.0 {
            config.acceleration
        } else {
            DEFAULT_ACCELERATION
        };
        let speed = config.speed.min(MAX_SPEED);
        Self {
            name: config.name,
            address: config.address,
            current_speed: f64::from(speed),
            target_speed: speed,
            acceleration,
            direction: config.direction,
            location: None,
        }
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// DCC bus address.
    pub fn address(&self) -> u16 {
        self.address
    }

    /// Speed currently commanded, 0.0-127.0.
    pub fn current_speed(&self) -> f64 {
        self.current_speed
    }

    /// Speed the control loop is ramping toward.
    pub fn target_speed(&self) -> u8 {
        self.target_speed
    }

    /// Speed steps per second.
    pub fn acceleration(&self) -> f64 {
        self.acceleration
    }

    /// Direction of travel.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Sector the cab occupies, if known.
    pub fn location(&self) -> Option<&SectorId> {
        self.location.as_ref()
    }

    /// Whether the cab still has to ramp toward its target.
    pub fn is_ramping(&self) -> bool {
        self.current_speed != f64::from(self.target_speed)
    }

    pub(crate) fn set_current_speed(&mut self, speed: f64) {
        self.current_speed = speed.clamp(0.0, f64::from(MAX_SPEED));
    }

    pub(crate) fn set_target_speed(&mut self, speed: u8) {
        self.target_speed = speed.min(MAX_SPEED);
    }

    pub(crate) fn set_direction(&mut self, direction: Direction) {
        self.direction = direction;
    }

    pub(crate) fn set_location(&mut self, sector: Option<SectorId>) {
        self.location = sector;
    }
}

// ============================================================================
// Sector
// ============================================================================

/// A fixed block of track. Sectors compare equal by id alone.
#[derive(Clone, Debug)]
pub struct LayoutSector {
    id: SectorId,
    name: String,
    speed_limit: Option<u8>,
}

impl LayoutSector {
    /// Sector with the default speed limit.
    pub fn new(id: impl Into<SectorId>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            speed_limit: Some(DEFAULT_SPEED_LIMIT),
        }
    }

    /// Set the speed limit, clamped to 1-127; `None` removes it.
    pub fn with_speed_limit(mut self, limit: Option<u8>) -> Self {
        self.speed_limit = limit.map(|l| l.clamp(1, MAX_SPEED));
        self
    }

    /// Sector id.
    pub fn id(&self) -> &SectorId {
        &self.id
    }

    /// Display name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Target speed imposed on cabs entering this sector.
    pub fn speed_limit(&self) -> Option<u8> {
        self.speed_limit
    }
}

impl PartialEq for LayoutSector {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for LayoutSector {}

impl fmt::Display for LayoutSector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Sector(name: {}, id: {})", self.name, self.id)
    }
}

// ============================================================================
// Proximity Sensor
// ============================================================================

/// Detector at the exit of a sector. Triggering it means a cab left
/// `sector_id` and entered the cyclic-next sector.
#[derive(Clone, Debug)]
pub struct ProximitySensor {
    id: String,
    sector_id: SectorId,
}

impl ProximitySensor {
    /// Sensor `id` watching the exit of `sector_id`.
    pub fn new(id: impl Into<String>, sector_id: impl Into<SectorId>) -> Self {
        Self {
            id: id.into(),
            sector_id: sector_id.into(),
        }
    }

    /// Sensor id, as reported by sensor nodes.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Sector this sensor belongs to.
    pub fn sector_id(&self) -> &SectorId {
        &self.sector_id
    }
}

impl PartialEq for ProximitySensor {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ProximitySensor {}

impl fmt::Display for ProximitySensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ProximitySensor(id: {}, sector_id: {})", self.id, self.sector_id)
    }
}

// ============================================================================
// Layout
// ============================================================================

/// Aggregate root owning every cab, sector and sensor.
///
/// Ids are expected to be unique; with duplicates, lookups return the first
/// match.
#[derive(Clone, Debug)]
pub struct Layout {
    name: String,
    cabs: Vec<Cab>,
    sectors: Vec<LayoutSector>,
    proximity_sensors: Vec<ProximitySensor>,
    dcc: Option<DccEndpoint>,
}

impl Layout {
    /// Empty layout.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cabs: Vec::new(),
            sectors: Vec::new(),
            proximity_sensors: Vec::new(),
            dcc: None,
        }
    }

    /// Append a cab. The first cab added is the primary cab.
    pub fn add_cab(&mut self, cab: Cab) {
        self.cabs.push(cab);
    }

    /// Append a sector to the cycle.
    pub fn add_sector(&mut self, sector: LayoutSector) {
        self.sectors.push(sector);
    }

    /// Append a proximity sensor.
    pub fn add_proximity_sensor(&mut self, sensor: ProximitySensor) {
        self.proximity_sensors.push(sensor);
    }

    /// Record the command station this layout is driven by.
    pub fn set_dcc(&mut self, dcc: DccEndpoint) {
        self.dcc = Some(dcc);
    }

    /// Layout name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Cabs in definition order.
    pub fn cabs(&self) -> &[Cab] {
        &self.cabs
    }

    /// Sectors in cycle order.
    pub fn sectors(&self) -> &[LayoutSector] {
        &self.sectors
    }

    /// Proximity sensors in definition order.
    pub fn proximity_sensors(&self) -> &[ProximitySensor] {
        &self.proximity_sensors
    }

    /// Command station endpoint, if the layout names one.
    pub fn dcc(&self) -> Option<&DccEndpoint> {
        self.dcc.as_ref()
    }

    /// Sector by id.
    pub fn find_sector(&self, id: &SectorId) -> Option<&LayoutSector> {
        self.sectors.iter().find(|s| &s.id == id)
    }

    /// Position of a sector in the cycle.
    pub fn sector_index(&self, id: &SectorId) -> Option<usize> {
        self.sectors.iter().position(|s| &s.id == id)
    }

    /// Sensor by id.
    pub fn find_sensor(&self, id: &str) -> Option<&ProximitySensor> {
        self.proximity_sensors.iter().find(|s| s.id == id)
    }

    /// Cab by DCC address.
    pub fn find_cab(&self, address: u16) -> Option<&Cab> {
        self.cabs.iter().find(|c| c.address == address)
    }

    /// First cab in definition order.
    pub fn primary_cab(&self) -> Option<&Cab> {
        self.cabs.first()
    }

    /// The sector following `id` in the cycle, wrapping after the last.
    ///
    /// `None` if `id` is not a sector of this layout.
    pub fn next_sector_after(&self, id: &SectorId) -> Option<&LayoutSector> {
        let index = self.sector_index(id)?;
        self.sectors.get((index + 1) % self.sectors.len())
    }

    pub(crate) fn cabs_mut(&mut self) -> &mut [Cab] {
        &mut self.cabs
    }

    pub(crate) fn cab_mut(&mut self, index: usize) -> Option<&mut Cab> {
        self.cabs.get_mut(index)
    }

    pub(crate) fn cab_index(&self, address: u16) -> Option<usize> {
        self.cabs.iter().position(|c| c.address == address)
    }
}

impl fmt::Display for Layout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Layout(name: {}, cabs: {}, sectors: {}, sensors: {})",
            self.name,
            self.cabs.len(),
            self.sectors.len(),
            self.proximity_sensors.len()
        )
    }
}

// ============================================================================
// Tests
// ============================================================================
