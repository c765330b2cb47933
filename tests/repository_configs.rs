//! ---
//! ramp_section: "15-testing-qa-runbook"
//! ramp_subsection: "integration-tests"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Integration and validation tests for the ramp controller."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use std::fs;
use std::path::{Path, PathBuf};

use hifi_ramp_common::config::RampConfig;
use hifi_ramp_table::load_table;

fn repo_path(path: &str) -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("..").join(path)
}

fn read(path: &str) -> String {
    let full = repo_path(path);
    fs::read_to_string(&full)
        .unwrap_or_else(|err| panic!("failed to read {}: {}", full.display(), err))
}

#[test]
fn example_config_is_valid() {
    let config: RampConfig = read("configs/example.toml")
        .parse()
        .expect("example config should parse and validate");
    assert_eq!(config.supply.prefix, "IN:HIFI:PSU");
    assert_eq!(config.defaults.constant, 0.029);
    assert_eq!(config.ramp.settle_delay.as_secs(), 1);
    assert_eq!(
        config.supply.ramp_table_path,
        PathBuf::from("configs/ramp_table.txt")
    );
}

#[test]
fn shipped_ramp_table_loads_sorted() {
    let table = load_table(&repo_path("configs/ramp_table.txt")).unwrap();
    assert_eq!(table.valid_len(), 6);
    let targets: Vec<f64> = table.valid().map(|(_, row)| row.target).collect();
    assert!(targets.windows(2).all(|pair| pair[0] <= pair[1]));
    assert_eq!(table.initial_rate(), Some(0.5));
}

#[test]
fn shipped_table_stays_within_default_limit() {
    let config = RampConfig::default();
    let table = load_table(&repo_path("configs/ramp_table.txt")).unwrap();
    let highest = table
        .valid()
        .map(|(_, row)| row.target)
        .fold(0.0_f64, f64::max);
    assert!(highest / hifi_ramp_table::SCALE <= config.defaults.limit);
}
