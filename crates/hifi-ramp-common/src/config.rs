//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Shared primitives and utilities for the ramp controller."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationMilliSeconds};
use tracing::debug;

use crate::logging::LogFormat;

fn default_prefix() -> String {
    "HIFI:PSU".to_owned()
}

fn default_ramp_table_path() -> PathBuf {
    PathBuf::from("configs/ramp_table.txt")
}

fn default_constant() -> f64 {
    0.029
}

fn default_limit() -> f64 {
    5.0
}

fn default_max() -> f64 {
    0.4
}

fn default_mid() -> f64 {
    0.2
}

fn default_tolerance() -> f64 {
    0.01
}

fn default_initial_message() -> String {
    " ==> I'm the initial log message!".to_owned()
}

fn default_settle_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_evaluation_interval() -> Duration {
    Duration::from_millis(500)
}

fn default_zero_tolerance() -> f64 {
    0.0005
}

fn default_arrival_tolerance() -> f64 {
    1.0
}

fn default_logging_directory() -> PathBuf {
    PathBuf::from("target/logs")
}

fn default_log_format() -> LogFormat {
    LogFormat::StructuredJson
}

fn default_metrics_enabled() -> bool {
    true
}

fn default_metrics_listen() -> SocketAddr {
    SocketAddr::from(([0, 0, 0, 0], 9898))
}

fn default_metrics_path() -> String {
    "/metrics".to_owned()
}

fn default_log_level() -> String {
    "info".to_owned()
}

/// Primary configuration object for the ramp controller.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RampConfig {
    #[serde(default)]
    pub supply: SupplyConfig,
    #[serde(default)]
    pub defaults: DefaultsConfig,
    #[serde(default)]
    pub ramp: RampSettings,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Metadata describing where a [`RampConfig`] was loaded from.
#[derive(Debug, Clone)]
pub struct LoadedRampConfig {
    pub config: RampConfig,
    pub source: PathBuf,
}

impl RampConfig {
    pub const ENV_CONFIG_PATH: &'static str = "HIFI_RAMP_CONFIG";
    pub const ENV_RAMP_TABLE: &'static str = "HIFI_RAMP_TABLE";

    /// Load configuration from disk, respecting the `HIFI_RAMP_CONFIG` override.
    pub fn load<P: AsRef<Path>>(candidates: &[P]) -> Result<Self> {
        Ok(Self::load_with_source(candidates)?.config)
    }

    /// Load configuration from disk together with the effective source path.
    ///
    /// `HIFI_RAMP_TABLE` replaces the configured ramp table path when set.
    pub fn load_with_source<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedRampConfig> {
        let mut loaded = Self::locate(candidates)?;
        if let Ok(table) = std::env::var(Self::ENV_RAMP_TABLE) {
            if !table.trim().is_empty() {
                debug!(ramp_table = %table, "ramp table path overridden from environment");
                loaded.config.supply.ramp_table_path = PathBuf::from(table);
            }
        }
        Ok(loaded)
    }

    fn locate<P: AsRef<Path>>(candidates: &[P]) -> Result<LoadedRampConfig> {
        if let Ok(env_path) = std::env::var(Self::ENV_CONFIG_PATH) {
            if !env_path.trim().is_empty() {
                let path = PathBuf::from(env_path);
                let config = Self::from_path(&path)?;
                return Ok(LoadedRampConfig {
                    config,
                    source: path,
                });
            }
        }

        for candidate in candidates {
            if candidate.as_ref().exists() {
                let path = candidate.as_ref().to_path_buf();
                let config = Self::from_path(&path)?;
                return Ok(LoadedRampConfig {
                    config,
                    source: path,
                });
            }
        }

        Err(anyhow!(
            "no configuration files found. inspected: {}",
            candidates
                .iter()
                .map(|p| p.as_ref().display().to_string())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    }

    fn from_path(path: &Path) -> Result<Self> {
        debug!(config_path = %path.display(), "loading configuration");
        let contents = fs::read_to_string(path)
            .with_context(|| format!("unable to read config file {}", path.display()))?;
        contents
            .parse::<RampConfig>()
            .with_context(|| format!("invalid config file {}", path.display()))
    }

    /// Validate structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.supply.prefix.trim().is_empty() {
            return Err(anyhow!("supply.prefix must not be empty"));
        }
        if self.supply.ramp_table_path.as_os_str().is_empty() {
            return Err(anyhow!("supply.ramp_table_path must not be empty"));
        }
        self.defaults.validate()?;
        self.ramp.validate()?;
        self.metrics.validate()?;
        Ok(())
    }
}

impl std::str::FromStr for RampConfig {
    type Err = anyhow::Error;

    fn from_str(content: &str) -> std::result::Result<Self, Self::Err> {
        let config: RampConfig =
            toml::from_str(content).with_context(|| "failed to parse configuration")?;
        config.validate()?;
        Ok(config)
    }
}

/// Device addressing and the ramp table location.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SupplyConfig {
    /// PV prefix prepended to every record name (`<prefix>:OUTPUT`).
    #[serde(default = "default_prefix")]
    pub prefix: String,
    #[serde(default = "default_ramp_table_path")]
    pub ramp_table_path: PathBuf,
}

impl Default for SupplyConfig {
    fn default() -> Self {
        Self {
            prefix: default_prefix(),
            ramp_table_path: default_ramp_table_path(),
        }
    }
}

/// Values written to the supply during initialisation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DefaultsConfig {
    /// Initial calibration constant (Tesla per Amp).
    #[serde(default = "default_constant")]
    pub constant: f64,
    #[serde(default = "default_limit")]
    pub limit: f64,
    #[serde(default = "default_max")]
    pub max: f64,
    #[serde(default = "default_mid")]
    pub mid: f64,
    #[serde(default = "default_tolerance")]
    pub constant_tolerance: f64,
    #[serde(default = "default_tolerance")]
    pub setpoint_tolerance: f64,
    #[serde(default = "default_initial_message")]
    pub initial_message: String,
}

impl Default for DefaultsConfig {
    fn default() -> Self {
        Self {
            constant: default_constant(),
            limit: default_limit(),
            max: default_max(),
            mid: default_mid(),
            constant_tolerance: default_tolerance(),
            setpoint_tolerance: default_tolerance(),
            initial_message: default_initial_message(),
        }
    }
}

impl DefaultsConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.constant.is_finite() && self.constant > 0.0) {
            return Err(anyhow!("defaults.constant must be positive"));
        }
        if !(self.limit.is_finite() && self.limit > 0.0) {
            return Err(anyhow!("defaults.limit must be positive"));
        }
        if self.mid < 0.0 || self.mid > self.max {
            return Err(anyhow!(
                "defaults.mid ({}) must lie between zero and defaults.max ({})",
                self.mid,
                self.max
            ));
        }
        if self.max > self.limit {
            return Err(anyhow!(
                "defaults.max ({}) exceeds defaults.limit ({})",
                self.max,
                self.limit
            ));
        }
        if self.constant_tolerance <= 0.0 || self.setpoint_tolerance <= 0.0 {
            return Err(anyhow!("tolerances must be positive"));
        }
        Ok(())
    }
}

/// Timing and tolerances used while ramping.
#[serde_as]
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RampSettings {
    /// Wait before leaving a file state for idle.
    #[serde(default = "default_settle_delay", rename = "settle_delay_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub settle_delay: Duration,
    /// Period of the fallback re-evaluation tick.
    #[serde(default = "default_evaluation_interval", rename = "evaluation_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    pub evaluation_interval: Duration,
    /// Output magnitude (Tesla) treated as zero before a polarity flip.
    #[serde(default = "default_zero_tolerance")]
    pub zero_tolerance: f64,
    /// Distance (scaled units) at which an interim breakpoint counts as reached.
    #[serde(default = "default_arrival_tolerance")]
    pub arrival_tolerance: f64,
}

impl Default for RampSettings {
    fn default() -> Self {
        Self {
            settle_delay: default_settle_delay(),
            evaluation_interval: default_evaluation_interval(),
            zero_tolerance: default_zero_tolerance(),
            arrival_tolerance: default_arrival_tolerance(),
        }
    }
}

impl RampSettings {
    pub fn validate(&self) -> Result<()> {
        if self.evaluation_interval.is_zero() {
            return Err(anyhow!("ramp.evaluation_interval_ms must be non-zero"));
        }
        if self.zero_tolerance <= 0.0 || self.arrival_tolerance <= 0.0 {
            return Err(anyhow!("ramp tolerances must be positive"));
        }
        Ok(())
    }
}

/// Where and how the daemon writes its logs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_logging_directory")]
    pub directory: PathBuf,
    /// Console format. The per-device file is always JSON.
    #[serde(default = "default_log_format")]
    pub format: LogFormat,
    /// Log file name stem; derived from the supply prefix when unset.
    #[serde(default)]
    pub file_prefix: Option<String>,
    /// Filter directive used when neither `HIFI_RAMP_LOG` nor `RUST_LOG` is set.
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            directory: default_logging_directory(),
            format: default_log_format(),
            file_prefix: None,
            level: default_log_level(),
        }
    }
}

/// Prometheus exporter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    #[serde(default = "default_metrics_enabled")]
    pub enabled: bool,
    #[serde(default = "default_metrics_listen")]
    pub listen: SocketAddr,
    /// HTTP route serving the text exposition.
    #[serde(default = "default_metrics_path")]
    pub path: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: default_metrics_enabled(),
            listen: default_metrics_listen(),
            path: default_metrics_path(),
        }
    }
}

impl MetricsConfig {
    pub fn validate(&self) -> Result<()> {
        if !self.path.starts_with('/') || self.path.len() < 2 {
            return Err(anyhow!("metrics.path must be an absolute route such as /metrics"));
        }
        Ok(())
    }
}
