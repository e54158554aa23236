//! Declarative layout definitions.
//!
//! A layout file is YAML. [`LayoutLoader`] parses it into a
//! [`LayoutDefinition`] and drives one builder per entity kind to produce a
//! populated [`Layout`]:
//!
//! ```yaml
//! name: main
//! dcc:
//!   host: 192.168.0.22
//!   port: 2560
//! cabs:
//!   - name: Santa Fe 3751
//!     address: 2
//!     acceleration: 5
//! sectors:
//!   - { id: 1, name: "'Round the Mountain" }
//!   - { id: 2, name: Hill Climb, speed_limit: 20 }
//! proximity_sensors:
//!   - { id: end_of_hill, sector_id: 1 }
//! ```
//!
//! Omitted fields take defaults: cab name `""`, address 0, acceleration 5,
//! direction forward; sector name `""`, speed limit 10.
//!
//! The builders can also be used directly:
//!
//! ```rust
//! use signalbox::loader::{CabBuilder, LayoutBuilder, ProximitySensorBuilder, SectorBuilder};
//!
//! let layout = LayoutBuilder::new("bench")
//!     .cab(CabBuilder::new().name("Switcher").address(5).build().unwrap())
//!     .sector(SectorBuilder::new().id(1).name("Yard").build().unwrap())
//!     .proximity_sensor(
//!         ProximitySensorBuilder::new()
//!             .id("yard_exit")
//!             .sector_id(1)
//!             .build()
//!             .unwrap(),
//!     )
//!     .build();
//!
//! assert_eq!(layout.cabs()[0].acceleration(), 5.0);
//! assert_eq!(layout.sectors()[0].speed_limit(), Some(10));
//! ```

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn};

use crate::config::DccConfig;
use crate::layout::{
    Cab, CabConfig, DccEndpoint, Layout, LayoutSector, ProximitySensor, SectorId,
    DEFAULT_ACCELERATION, DEFAULT_SPEED_LIMIT,
};
use crate::traits::Direction;

/// Layout loading errors.
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// The layout file does not exist.
    #[error("layout file not found: {}", .0.display())]
    NotFound(PathBuf),

    /// The layout file could not be read.
    #[error("cannot read layout file {}: {source}", .path.display())]
    Io {
        /// Layout file path.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The file is not a valid layout definition.
    #[error("invalid layout definition: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// An entity has a missing or out-of-range field.
    #[error("invalid {entity}: {reason}")]
    Invalid {
        /// Entity kind, e.g. `cab`.
        entity: &'static str,
        /// What is wrong.
        reason: String,
    },
}

fn invalid(entity: &'static str, reason: impl Into<String>) -> LoadError {
    LoadError::Invalid {
        entity,
        reason: reason.into(),
    }
}

// ============================================================================
// Definition (file format)
// ============================================================================

/// Top-level layout file.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutDefinition {
    /// Layout name.
    pub name: String,
    /// Command station endpoint.
    pub dcc: Option<DccDefinition>,
    /// Cabs; the first is the primary cab.
    pub cabs: Vec<CabDefinition>,
    /// Sectors in cycle order.
    pub sectors: Vec<SectorDefinition>,
    /// Proximity sensors.
    pub proximity_sensors: Vec<ProximitySensorDefinition>,
}

/// `dcc` block.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DccDefinition {
    /// Command station host.
    pub host: Option<String>,
    /// Command station port.
    pub port: Option<u16>,
}

/// One `cabs` entry.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CabDefinition {
    /// Display name.
    pub name: Option<String>,
    /// DCC address.
    pub address: Option<u16>,
    /// Speed steps per second.
    pub acceleration: Option<f64>,
    /// Initial direction.
    pub direction: Option<Direction>,
}

/// One `sectors` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectorDefinition {
    /// Sector id, numeric or textual.
    pub id: SectorId,
    /// Display name.
    #[serde(default)]
    pub name: Option<String>,
    /// Speed limit.
    #[serde(default)]
    pub speed_limit: Option<u8>,
}

/// One `proximity_sensors` entry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProximitySensorDefinition {
    /// Sensor id as reported by sensor nodes.
    pub id: String,
    /// Sector whose exit the sensor watches.
    pub sector_id: SectorId,
}

// ============================================================================
// Builders
// ============================================================================

/// Collects cab fields.
#[derive(Clone, Debug, Default)]
pub struct CabBuilder {
    name: Option<String>,
    address: Option<u16>,
    acceleration: Option<f64>,
    direction: Option<Direction>,
}

impl CabBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// DCC address.
    pub fn address(mut self, address: u16) -> Self {
        self.address = Some(address);
        self
    }

    /// Speed steps per second.
    pub fn acceleration(mut self, acceleration: f64) -> Self {
        self.acceleration = Some(acceleration);
        self
    }

    /// Initial direction.
    pub fn direction(mut self, direction: Direction) -> Self {
        self.direction = Some(direction);
        self
    }

    /// Build the cab; acceleration must be positive.
    pub fn build(self) -> Result<Cab, LoadError> {
        let acceleration = self.acceleration.unwrap_or(DEFAULT_ACCELERATION);
        if !(acceleration.is_finite() && acceleration > 0.0) {
            return Err(invalid(
                "cab",
                format!("acceleration must be positive, got {}", acceleration),
            ));
        }
        let config = CabConfig::new(self.name.unwrap_or_default(), self.address.unwrap_or(0))
            .with_acceleration(acceleration)
            .with_direction(self.direction.unwrap_or_default());
        Ok(Cab::new(config))
    }
}

/// Collects sector fields.
#[derive(Clone, Debug, Default)]
pub struct SectorBuilder {
    id: Option<SectorId>,
    name: Option<String>,
    speed_limit: Option<u8>,
}

impl SectorBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sector id (required).
    pub fn id(mut self, id: impl Into<SectorId>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Display name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Speed limit, 1-127.
    pub fn speed_limit(mut self, limit: u8) -> Self {
        self.speed_limit = Some(limit);
        self
    }

    /// Build the sector.
    pub fn build(self) -> Result<LayoutSector, LoadError> {
        let id = self.id.ok_or_else(|| invalid("sector", "missing id"))?;
        let limit = self.speed_limit.unwrap_or(DEFAULT_SPEED_LIMIT);
        if limit == 0 {
            return Err(invalid("sector", format!("sector {} has speed limit 0", id)));
        }
        Ok(LayoutSector::new(id, self.name.unwrap_or_default()).with_speed_limit(Some(limit)))
    }
}

/// Collects proximity sensor fields.
#[derive(Clone, Debug, Default)]
pub struct ProximitySensorBuilder {
    id: Option<String>,
    sector_id: Option<SectorId>,
}

impl ProximitySensorBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sensor id (required).
    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Sector whose exit the sensor watches (required).
    pub fn sector_id(mut self, sector_id: impl Into<SectorId>) -> Self {
        self.sector_id = Some(sector_id.into());
        self
    }

    /// Build the sensor.
    pub fn build(self) -> Result<ProximitySensor, LoadError> {
        let id = self.id.ok_or_else(|| invalid("proximity sensor", "missing id"))?;
        let sector_id = self
            .sector_id
            .ok_or_else(|| invalid("proximity sensor", format!("{} has no sector_id", id)))?;
        Ok(ProximitySensor::new(id, sector_id))
    }
}

/// Collects the command station endpoint.
#[derive(Clone, Debug, Default)]
pub struct DccBuilder {
    host: Option<String>,
    port: Option<u16>,
}

impl DccBuilder {
    /// Empty builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Host name or IP.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = Some(host.into());
        self
    }

    /// TCP port.
    pub fn port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    /// Build the endpoint, filling gaps from [`DccConfig::default`].
    pub fn build(self) -> DccEndpoint {
        let defaults = DccConfig::default();
        DccEndpoint {
            host: self.host.unwrap_or(defaults.host),
            port: self.port.unwrap_or(defaults.port),
        }
    }
}

/// Assembles a [`Layout`] from built entities.
#[derive(Clone, Debug)]
pub struct LayoutBuilder {
    layout: Layout,
}

impl LayoutBuilder {
    /// Empty layout called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            layout: Layout::new(name),
        }
    }

    /// Command station endpoint.
    pub fn dcc(mut self, dcc: DccEndpoint) -> Self {
        self.layout.set_dcc(dcc);
        self
    }

    /// Append a cab.
    pub fn cab(mut self, cab: Cab) -> Self {
        self.layout.add_cab(cab);
        self
    }

    /// Append a sector.
    pub fn sector(mut self, sector: LayoutSector) -> Self {
        self.layout.add_sector(sector);
        self
    }

    /// Append a proximity sensor.
    pub fn proximity_sensor(mut self, sensor: ProximitySensor) -> Self {
        self.layout.add_proximity_sensor(sensor);
        self
    }

    /// Finish, logging duplicate ids and sensors wired to missing sectors.
    pub fn build(self) -> Layout {
        let layout = self.layout;

        let mut seen = HashSet::new();
        for sector in layout.sectors() {
            if !seen.insert(sector.id()) {
                warn!(sector = %sector.id(), "duplicate sector id");
            }
        }
        let mut seen = HashSet::new();
        for sensor in layout.proximity_sensors() {
            if !seen.insert(sensor.id()) {
                warn!(sensor = sensor.id(), "duplicate sensor id");
            }
            if layout.find_sector(sensor.sector_id()).is_none() {
                warn!(
                    sensor = sensor.id(),
                    sector = %sensor.sector_id(),
                    "sensor references unknown sector"
                );
            }
        }
        let mut seen = HashSet::new();
        for cab in layout.cabs() {
            if !seen.insert(cab.address()) {
                warn!(address = cab.address(), "duplicate cab address");
            }
        }

        layout
    }
}

impl LayoutDefinition {
    /// Parse a definition from YAML.
    pub fn from_yaml(yaml: &str) -> Result<Self, LoadError> {
        Ok(serde_yaml::from_str(yaml)?)
    }

    /// Drive the builders.
    pub fn build(self) -> Result<Layout, LoadError> {
        let mut builder = LayoutBuilder::new(self.name);

        if let Some(dcc) = self.dcc {
            let mut dcc_builder = DccBuilder::new();
            if let Some(host) = dcc.host {
                dcc_builder = dcc_builder.host(host);
            }
            if let Some(port) = dcc.port {
                dcc_builder = dcc_builder.port(port);
            }
            builder = builder.dcc(dcc_builder.build());
        }

        for def in self.cabs {
            let mut cab = CabBuilder::new();
            if let Some(name) = def.name {
                cab = cab.name(name);
            }
            if let Some(address) = def.address {
                cab = cab.address(address);
            }
            if let Some(acceleration) = def.acceleration {
                cab = cab.acceleration(acceleration);
            }
            if let Some(direction) = def.direction {
                cab = cab.direction(direction);
            }
            builder = builder.cab(cab.build()?);
        }

        for def in self.sectors {
            let mut sector = SectorBuilder::new().id(def.id);
            if let Some(name) = def.name {
                sector = sector.name(name);
            }
            if let Some(limit) = def.speed_limit {
                sector = sector.speed_limit(limit);
            }
            builder = builder.sector(sector.build()?);
        }

        for def in self.proximity_sensors {
            let sensor = ProximitySensorBuilder::new()
                .id(def.id)
                .sector_id(def.sector_id)
                .build()?;
            builder = builder.proximity_sensor(sensor);
        }

        Ok(builder.build())
    }
}

// ============================================================================
// Loader
// ============================================================================

/// Reads layout files.
pub struct LayoutLoader;

impl LayoutLoader {
    /// Load and build the layout at `path`.
    pub fn load(path: impl AsRef<Path>) -> Result<Layout, LoadError> {
        let path = path.as_ref();
        let span = info_span!("loader", path = %path.display());
        let _entered = span.enter();

        if !path.exists() {
            return Err(LoadError::NotFound(path.to_path_buf()));
        }
        info!("loading layout");

        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let layout = Self::from_yaml(&content)?;

        let cabs: Vec<&str> = layout.cabs().iter().map(|c| c.name()).collect();
        let sectors: Vec<&str> = layout.sectors().iter().map(|s| s.name()).collect();
        let sensors: Vec<&str> = layout.proximity_sensors().iter().map(|s| s.id()).collect();
        info!(layout = %layout, "loaded");
        info!(
            cabs = %cabs.join(", "),
            sectors = %sectors.join(", "),
            sensors = %sensors.join(", "),
            "layout contents"
        );
        Ok(layout)
    }

    /// Build a layout from YAML text.
    pub fn from_yaml(yaml: &str) -> Result<Layout, LoadError> {
        LayoutDefinition::from_yaml(yaml)?.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MAIN: &str = r#"
name: main
dcc:
  host: 192.168.0.22
  port: 2560
cabs:
  - name: Santa Fe 3751
    address: 2
    acceleration: 5
sectors:
  - { id: 1, name: "'Round the Mountain" }
  - { id: 2, name: Hill Climb }
  - { id: 3, name: Hill Descent, speed_limit: 25 }
proximity_sensors:
  - { id: end_of_hill, sector_id: 1 }
  - { id: beginning_of_hill, sector_id: 2 }
  - { id: crest_of_hill, sector_id: 3 }
"#;

    #[test]
    fn loads_full_definition() {
        let layout = LayoutLoader::from_yaml(MAIN).unwrap();

        assert_eq!(layout.name(), "main");
        assert_eq!(
            layout.dcc(),
            Some(&DccEndpoint {
                host: "192.168.0.22".into(),
                port: 2560
            })
        );
        assert_eq!(layout.cabs()[0].name(), "Santa Fe 3751");
        assert_eq!(layout.cabs()[0].address(), 2);
        assert_eq!(layout.sectors().len(), 3);
        assert_eq!(layout.sectors()[1].speed_limit(), Some(10));
        assert_eq!(layout.sectors()[2].speed_limit(), Some(25));
        assert_eq!(
            layout.find_sensor("crest_of_hill").unwrap().sector_id(),
            &SectorId::from(3)
        );
    }

    #[test]
    fn defaults_for_omitted_fields() {
        let layout =
            LayoutLoader::from_yaml("name: bare\ncabs: [{}]\nsectors: [{ id: yard }]\n").unwrap();

        let cab = &layout.cabs()[0];
        assert_eq!(cab.name(), "");
        assert_eq!(cab.address(), 0);
        assert_eq!(cab.acceleration(), 5.0);
        assert_eq!(cab.direction(), Direction::Forward);
        assert_eq!(layout.sectors()[0].id(), &SectorId::from("yard"));
        assert_eq!(layout.sectors()[0].name(), "");
        assert!(layout.dcc().is_none());
    }

    #[test]
    fn partial_dcc_block_uses_defaults() {
        let layout = LayoutLoader::from_yaml("name: x\ndcc: { host: station.local }\n").unwrap();
        assert_eq!(layout.dcc().unwrap().port, 2560);
    }

    #[test]
    fn rejects_bad_values() {
        let err = LayoutLoader::from_yaml("name: x\ncabs: [{ acceleration: 0 }]\n").unwrap_err();
        assert!(matches!(err, LoadError::Invalid { entity: "cab", .. }));

        let err =
            LayoutLoader::from_yaml("name: x\nsectors: [{ id: 1, speed_limit: 0 }]\n").unwrap_err();
        assert!(matches!(err, LoadError::Invalid { entity: "sector", .. }));

        let err = LayoutLoader::from_yaml("name: x\nsectors: [{ name: no id }]\n").unwrap_err();
        assert!(matches!(err, LoadError::Yaml(_)));
    }

    #[test]
    fn dangling_sensor_is_kept() {
        let layout =
            LayoutLoader::from_yaml("name: x\nproximity_sensors: [{ id: s9, sector_id: 9 }]\n")
                .unwrap();
        assert_eq!(layout.proximity_sensors().len(), 1);
    }

    #[test]
    fn builders_require_ids() {
        assert!(SectorBuilder::new().name("x").build().is_err());
        assert!(ProximitySensorBuilder::new().id("s").build().is_err());
        assert!(ProximitySensorBuilder::new().sector_id(1).build().is_err());
        assert!(CabBuilder::new().acceleration(-1.0).build().is_err());
    }

    #[test]
    fn missing_file() {
        let err = LayoutLoader::load("/definitely/not/here.yaml").unwrap_err();
        assert!(matches!(err, LoadError::NotFound(_)));
        assert!(err.to_string().contains("/definitely/not/here.yaml"));
    }
}
