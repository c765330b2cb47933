//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Shared primitives and utilities for the ramp controller."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Shared primitives for the HiFi ramp controller workspace.
//! This crate exposes configuration loading and logging initialisation
//! consumed by the controller crates and the daemon.

pub mod config;
pub mod logging;

pub use config::{
    DefaultsConfig, LoadedRampConfig, LoggingConfig, MetricsConfig, RampConfig, RampSettings,
    SupplyConfig,
};
pub use logging::{init_tracing, log_file_prefix, LogFormat};
