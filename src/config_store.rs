//! Per-sensor tuning values persisted to a YAML file.
//!
//! The file maps sensor ids to partial settings; anything a sensor does not
//! set falls back to [`SensorSettings::default`].
//!
//! ```yaml
//! end_of_hill:
//!   trigger_delta: 250
//! crest_of_hill:
//!   detection_threshold: 1200
//!   debounce_ms: 40
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::config::DEFAULT_DETECTION_THRESHOLD;

/// Errors persisting the store.
#[derive(Debug, thiserror::Error)]
pub enum ConfigStoreError {
    /// The file could not be written.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The settings could not be serialised.
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Effective settings for one sensor.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSettings {
    /// Drop in reading that counts as a train arriving.
    pub trigger_delta: i64,
    /// Rise in reading that counts as the train gone.
    pub release_delta: i64,
    /// Minimum time between edges, in milliseconds.
    pub debounce_ms: u64,
    /// Absolute reading below which the sensor is triggered.
    pub detection_threshold: i64,
}

impl Default for SensorSettings {
    fn default() -> Self {
        Self {
            trigger_delta: 200,
            release_delta: 120,
            debounce_ms: 80,
            detection_threshold: DEFAULT_DETECTION_THRESHOLD,
        }
    }
}

/// Partial settings, as stored in the file and passed to [`ConfigStore::set`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SensorSettingsPatch {
    /// See [`SensorSettings::trigger_delta`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trigger_delta: Option<i64>,
    /// See [`SensorSettings::release_delta`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub release_delta: Option<i64>,
    /// See [`SensorSettings::debounce_ms`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub debounce_ms: Option<u64>,
    /// See [`SensorSettings::detection_threshold`].
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detection_threshold: Option<i64>,
}

impl SensorSettingsPatch {
    /// Set the trigger delta.
    pub fn with_trigger_delta(mut self, value: i64) -> Self {
        self.trigger_delta = Some(value);
        self
    }

    /// Set the release delta.
    pub fn with_release_delta(mut self, value: i64) -> Self {
        self.release_delta = Some(value);
        self
    }

    /// Set the debounce interval.
    pub fn with_debounce_ms(mut self, value: u64) -> Self {
        self.debounce_ms = Some(value);
        self
    }

    /// Set the detection threshold.
    pub fn with_detection_threshold(mut self, value: i64) -> Self {
        self.detection_threshold = Some(value);
        self
    }

    /// Overwrite the fields `other` sets.
    pub fn merge(&mut self, other: SensorSettingsPatch) {
        self.trigger_delta = other.trigger_delta.or(self.trigger_delta);
        self.release_delta = other.release_delta.or(self.release_delta);
        self.debounce_ms = other.debounce_ms.or(self.debounce_ms);
        self.detection_threshold = other.detection_threshold.or(self.detection_threshold);
    }

    /// Lay this patch over `base`.
    pub fn apply(&self, base: SensorSettings) -> SensorSettings {
        SensorSettings {
            trigger_delta: self.trigger_delta.unwrap_or(base.trigger_delta),
            release_delta: self.release_delta.unwrap_or(base.release_delta),
            debounce_ms: self.debounce_ms.unwrap_or(base.debounce_ms),
            detection_threshold: self.detection_threshold.unwrap_or(base.detection_threshold),
        }
    }
}

/// File-backed per-sensor settings, safe to share between connections.
///
/// # Example
///
/// ```rust
/// use signalbox::config_store::{ConfigStore, SensorSettingsPatch};
///
/// let dir = std::env::temp_dir().join("signalbox-doc-store");
/// std::fs::create_dir_all(&dir).unwrap();
/// let store = ConfigStore::open(dir.join("sensors.yaml"));
///
/// store.set("end_of_hill", SensorSettingsPatch::default().with_trigger_delta(250)).unwrap();
/// assert_eq!(store.get("end_of_hill").trigger_delta, 250);
/// assert_eq!(store.get("end_of_hill").debounce_ms, 80);
/// ```
#[derive(Debug)]
pub struct ConfigStore {
    path: PathBuf,
    configs: Mutex<BTreeMap<String, SensorSettingsPatch>>,
}

impl ConfigStore {
    /// Load the store from `path`.
    ///
    /// A missing, unreadable or malformed file gives an empty store.
    pub fn open(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let configs = load_file(&path);
        Self {
            path,
            configs: Mutex::new(configs),
        }
    }

    /// File this store persists to.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Settings for `sensor_id`, merged over the defaults.
    pub fn get(&self, sensor_id: &str) -> SensorSettings {
        let configs = self.configs.lock().unwrap_or_else(PoisonError::into_inner);
        configs
            .get(sensor_id)
            .map(|patch| patch.apply(SensorSettings::default()))
            .unwrap_or_default()
    }

    /// Detection threshold explicitly stored for `sensor_id`, if any.
    pub fn detection_threshold(&self, sensor_id: &str) -> Option<i64> {
        let configs = self.configs.lock().unwrap_or_else(PoisonError::into_inner);
        configs.get(sensor_id).and_then(|p| p.detection_threshold)
    }

    /// Merge `patch` into the stored settings for `sensor_id` and rewrite the file.
    pub fn set(&self, sensor_id: &str, patch: SensorSettingsPatch) -> Result<(), ConfigStoreError> {
        let mut configs = self.configs.lock().unwrap_or_else(PoisonError::into_inner);
        configs.entry(sensor_id.to_string()).or_default().merge(patch);

        let yaml = serde_yaml::to_string(&*configs)?;
        std::fs::write(&self.path, yaml)?;
        debug!(sensor = sensor_id, path = %self.path.display(), "sensor settings saved");
        Ok(())
    }
}

fn load_file(path: &Path) -> BTreeMap<String, SensorSettingsPatch> {
    if !path.exists() {
        return BTreeMap::new();
    }
    let parsed = std::fs::read_to_string(path)
        .map_err(ConfigStoreError::from)
        .and_then(|content| {
            Ok(serde_yaml::from_str::<Option<BTreeMap<String, SensorSettingsPatch>>>(&content)?)
        });
    match parsed {
        Ok(configs) => configs.unwrap_or_default(),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "failed to load sensor settings");
            BTreeMap::new()
        }
    }
}
