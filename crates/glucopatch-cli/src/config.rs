//! Configuration file management.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use glucopatch_core::uuids::{DEFAULT_NAME_PREFIX, GLUCOPATCH_SERVICE, READING_CHARACTERISTIC};
use glucopatch_core::{
    AxisFloors, ConnectionConfig, DiscoveryFilter, GattTarget, ScanOptions, SessionConfig,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Default scan duration in seconds.
pub const DEFAULT_SCAN_TIMEOUT_SECS: u64 = 5;

/// Configuration file structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Default device identifier or name
    #[serde(default)]
    pub device: Option<String>,

    /// Disable colored output
    #[serde(default)]
    pub no_color: bool,

    /// GATT service carrying readings
    #[serde(default = "default_service_uuid")]
    pub service_uuid: String,

    /// Characteristic that notifies readings
    #[serde(default = "default_characteristic_uuid")]
    pub characteristic_uuid: String,

    /// Scan duration in seconds
    #[serde(default = "default_scan_timeout")]
    pub scan_timeout_secs: u64,

    /// Timeout for each GATT step in seconds (library defaults when unset)
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,

    /// Keep at most this many readings in memory (unbounded when unset)
    #[serde(default)]
    pub max_readings: Option<usize>,

    /// Lowest upper bound of the glucose chart, in mg/dL
    #[serde(default = "default_glucose_floor")]
    pub glucose_floor: f64,

    /// Lowest upper bound of the temperature chart, in °C
    #[serde(default = "default_temperature_floor")]
    pub temperature_floor: f64,

    /// Which advertised devices count as patches
    #[serde(default)]
    pub filter: FilterConfig,
}

/// Discovery filter settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilterConfig {
    /// Advertised name prefix of a patch
    #[serde(default = "default_name_prefix")]
    pub name_prefix: String,

    /// Report every device in range regardless of name
    #[serde(default)]
    pub accept_all: bool,
}

fn default_service_uuid() -> String {
    GLUCOPATCH_SERVICE.to_string()
}

fn default_characteristic_uuid() -> String {
    READING_CHARACTERISTIC.to_string()
}

fn default_scan_timeout() -> u64 {
    DEFAULT_SCAN_TIMEOUT_SECS
}

fn default_glucose_floor() -> f64 {
    AxisFloors::default().glucose
}

fn default_temperature_floor() -> f64 {
    AxisFloors::default().temperature
}

fn default_name_prefix() -> String {
    DEFAULT_NAME_PREFIX.to_string()
}

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            name_prefix: default_name_prefix(),
            accept_all: false,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            device: None,
            no_color: false,
            service_uuid: default_service_uuid(),
            characteristic_uuid: default_characteristic_uuid(),
            scan_timeout_secs: default_scan_timeout(),
            connect_timeout_secs: None,
            max_readings: None,
            glucose_floor: default_glucose_floor(),
            temperature_floor: default_temperature_floor(),
            filter: FilterConfig::default(),
        }
    }
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Clone, Default)]
pub struct DiscoveryOverrides {
    pub timeout_secs: Option<u64>,
    pub accept_all: bool,
    pub name_prefix: Option<String>,
}

impl Config {
    /// Get the default config file path
    pub fn path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("glucopatch")
            .join("config.toml")
    }

    /// The explicit path if given, else [`Config::path`].
    pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
        explicit.map(Path::to_path_buf).unwrap_or_else(Self::path)
    }

    /// Load config from file, or return default if missing or unreadable
    pub fn load(explicit: Option<&Path>) -> Self {
        let path = Self::resolve_path(explicit);
        if path.exists() {
            match Self::load_from(&path) {
                Ok(config) => return config,
                Err(e) => eprintln!("Warning: {:#}", e),
            }
        }
        Self::default()
    }

    /// Load config from a file that must exist and parse.
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.display()))
    }

    /// Save config to file
    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }
        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Parsed service and characteristic UUIDs.
    pub fn gatt_target(&self) -> Result<GattTarget> {
        let service = Uuid::parse_str(&self.service_uuid)
            .with_context(|| format!("Invalid service_uuid '{}'", self.service_uuid))?;
        let characteristic = Uuid::parse_str(&self.characteristic_uuid).with_context(|| {
            format!(
                "Invalid characteristic_uuid '{}'",
                self.characteristic_uuid
            )
        })?;
        Ok(GattTarget {
            service,
            characteristic,
        })
    }

    /// The discovery filter after applying command-line overrides.
    pub fn discovery_filter(&self, overrides: &DiscoveryOverrides) -> DiscoveryFilter {
        if overrides.accept_all {
            return DiscoveryFilter::AcceptAll;
        }
        match &overrides.name_prefix {
            Some(prefix) => DiscoveryFilter::name_prefix(prefix.clone()),
            None if self.filter.accept_all => DiscoveryFilter::AcceptAll,
            None => DiscoveryFilter::name_prefix(self.filter.name_prefix.clone()),
        }
    }

    /// Scan options after applying command-line overrides.
    pub fn scan_options(&self, overrides: &DiscoveryOverrides) -> Result<ScanOptions> {
        let secs = overrides.timeout_secs.unwrap_or(self.scan_timeout_secs);
        Ok(ScanOptions::new()
            .duration_secs(secs)
            .filter(self.discovery_filter(overrides))
            .service(self.gatt_target()?.service))
    }

    /// Per-step connection timeouts.
    pub fn connection_config(&self) -> ConnectionConfig {
        match self.connect_timeout_secs {
            Some(secs) => {
                let timeout = Duration::from_secs(secs.max(1));
                ConnectionConfig::new()
                    .link_timeout(timeout)
                    .discovery_timeout(timeout)
                    .notify_timeout(timeout)
            }
            None => ConnectionConfig::default(),
        }
    }

    /// Build a full session configuration.
    pub fn session_config(&self, overrides: &DiscoveryOverrides) -> Result<SessionConfig> {
        Ok(SessionConfig::new()
            .scan(self.scan_options(overrides)?)
            .target(self.gatt_target()?)
            .connection(self.connection_config())
            .max_readings(self.max_readings))
    }

    pub fn axis_floors(&self) -> AxisFloors {
        AxisFloors {
            glucose: self.glucose_floor,
            temperature: self.temperature_floor,
        }
    }
}

/// Resolve device from arg (already merged with env by clap) or config.
pub fn resolve_device(device: Option<String>, config: &Config) -> Option<String> {
    device
        .filter(|d| !d.is_empty())
        .or_else(|| config.device.clone())
}
