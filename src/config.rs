use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;

/// Top-level configuration for one collection cycle.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Logging verbosity (trace, debug, info, warn, error). Default: "info".
    #[serde(default = "default_log_level")]
    #[allow(dead_code)]
    pub log_level: String,

    /// Stats services to poll, in order. Labels become the `server` tag.
    #[serde(default)]
    pub sources: Vec<SourceConfig>,

    /// InfluxDB write target.
    #[serde(default)]
    pub influxdb: InfluxConfig,
}

/// One stats service endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SourceConfig {
    /// Unique label, used verbatim as the `server` tag on written points.
    pub label: String,

    /// gRPC endpoint URI, e.g. "http://10.0.0.1:10085".
    pub address: String,
}

/// InfluxDB connection configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct InfluxConfig {
    /// HTTP API address, e.g. "http://localhost:8086".
    #[serde(default)]
    pub address: String,

    /// Target database name. Default: "traffic".
    #[serde(default = "default_database")]
    pub database: String,
}

// --- Default value functions ---

fn default_log_level() -> String {
    "info".to_string()
}

fn default_database() -> String {
    "traffic".to_string()
}

// --- Default trait impls ---

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            sources: Vec::new(),
            influxdb: InfluxConfig::default(),
        }
    }
}

impl Default for InfluxConfig {
    fn default() -> Self {
        Self {
            address: String::new(),
            database: default_database(),
        }
    }
}

// --- Validation and loading ---

impl Config {
    /// Load configuration from a YAML file.
    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;

        let cfg: Config = serde_yaml::from_str(&data)
            .with_context(|| format!("parsing config file {}", path.display()))?;

        cfg.validate()?;

        Ok(cfg)
    }

    /// Validate the configuration for required fields and consistency.
    pub fn validate(&self) -> Result<()> {
        if self.sources.is_empty() {
            bail!("at least one source is required");
        }

        let mut labels = HashSet::new();
        for source in &self.sources {
            if source.label.is_empty() {
                bail!("source label must not be empty");
            }
            if source.address.is_empty() {
                bail!("source {:?} has no address", source.label);
            }
            if !labels.insert(source.label.as_str()) {
                bail!("duplicate source label: {}", source.label);
            }
        }

        if self.influxdb.address.is_empty() {
            bail!("influxdb.address is required");
        }

        if self.influxdb.database.is_empty() {
            bail!("influxdb.database must not be empty");
        }

        Ok(())
    }
}
