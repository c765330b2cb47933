//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Shared primitives and utilities for the ramp controller."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use std::path::PathBuf;
use std::time::Duration;

use hifi_ramp_common::config::RampConfig;
use hifi_ramp_common::LogFormat;
use tempfile::tempdir;

#[test]
fn empty_document_uses_defaults() {
    let config: RampConfig = "".parse().unwrap();
    assert_eq!(config.supply.prefix, "HIFI:PSU");
    assert_eq!(config.defaults.constant, 0.029);
    assert_eq!(config.defaults.limit, 5.0);
    assert_eq!(config.defaults.max, 0.4);
    assert_eq!(config.defaults.mid, 0.2);
    assert_eq!(config.ramp.settle_delay, Duration::from_secs(1));
    assert_eq!(config.logging.format, LogFormat::StructuredJson);
}

#[test]
fn sections_override_defaults() {
    let config: RampConfig = r#"
        [supply]
        prefix = "IN:LARMOR:PSU"
        ramp_table_path = "/opt/ramp/table.txt"

        [defaults]
        mid = 0.3
        max = 0.6

        [ramp]
        settle_delay_ms = 250
        evaluation_interval_ms = 100

        [logging]
        format = "pretty"
    "#
    .parse()
    .unwrap();
    assert_eq!(config.supply.prefix, "IN:LARMOR:PSU");
    assert_eq!(
        config.supply.ramp_table_path,
        PathBuf::from("/opt/ramp/table.txt")
    );
    assert_eq!(config.defaults.mid, 0.3);
    assert_eq!(config.ramp.settle_delay, Duration::from_millis(250));
    assert_eq!(config.ramp.evaluation_interval, Duration::from_millis(100));
    assert_eq!(config.logging.format, LogFormat::Pretty);
}

#[test]
fn mid_above_max_is_rejected() {
    let err = "[defaults]\nmid = 0.5\nmax = 0.4\n"
        .parse::<RampConfig>()
        .unwrap_err();
    assert!(format!("{err:#}").contains("defaults.mid"));
}

#[test]
fn max_above_limit_is_rejected() {
    let result = "[defaults]\nmax = 6.0\nlimit = 5.0\n".parse::<RampConfig>();
    assert!(result.is_err());
}

#[test]
fn loads_first_existing_candidate() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let present = dir.path().join("ramp.toml");
    std::fs::write(&present, "[supply]\nprefix = \"TEST:PSU\"\n").unwrap();

    let loaded = RampConfig::load_with_source(&[missing, present.clone()]).unwrap();
    assert_eq!(loaded.source, present);
    assert_eq!(loaded.config.supply.prefix, "TEST:PSU");
}

#[test]
fn reports_inspected_candidates_when_none_exist() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("missing.toml");
    let err = RampConfig::load(&[missing]).unwrap_err();
    assert!(err.to_string().contains("missing.toml"));
}

#[test]
fn metrics_route_defaults_and_overrides() {
    let config: RampConfig = "".parse().unwrap();
    assert_eq!(config.metrics.path, "/metrics");
    assert_eq!(config.logging.level, "info");

    let config: RampConfig = "[metrics]\nenabled = false\npath = \"/ramp/metrics\"\n"
        .parse()
        .unwrap();
    assert!(!config.metrics.enabled);
    assert_eq!(config.metrics.path, "/ramp/metrics");
}

#[test]
fn relative_metrics_route_is_rejected() {
    let err = "[metrics]\npath = \"metrics\"\n"
        .parse::<RampConfig>()
        .unwrap_err();
    assert!(format!("{err:#}").contains("metrics.path"));
}
