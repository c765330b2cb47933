//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp control state machine and hardware boundary."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Process variable boundary between the controller and the supply.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// Value carried by a process variable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PvValue {
    Double(f64),
    Int(i64),
    Text(String),
    Array(Vec<f64>),
}

impl PvValue {
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            PvValue::Double(value) => Some(*value),
            PvValue::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            PvValue::Int(value) => Some(*value),
            PvValue::Double(value) if value.fract() == 0.0 => Some(*value as i64),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            PvValue::Text(value) => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&[f64]> {
        match self {
            PvValue::Array(values) => Some(values.as_slice()),
            _ => None,
        }
    }
}

impl From<f64> for PvValue {
    fn from(value: f64) -> Self {
        PvValue::Double(value)
    }
}

impl From<i64> for PvValue {
    fn from(value: i64) -> Self {
        PvValue::Int(value)
    }
}

impl From<&str> for PvValue {
    fn from(value: &str) -> Self {
        PvValue::Text(value.to_owned())
    }
}

impl From<String> for PvValue {
    fn from(value: String) -> Self {
        PvValue::Text(value)
    }
}

impl From<Vec<f64>> for PvValue {
    fn from(values: Vec<f64>) -> Self {
        PvValue::Array(values)
    }
}

/// How a setpoint write is committed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PutMode {
    /// The caller waits until the device acknowledges the write.
    Sync,
    /// Fire-and-forget; state progression continues immediately.
    Async,
}

#[derive(Debug, thiserror::Error)]
pub enum PvError {
    #[error("process variable {name} is not connected")]
    Disconnected { name: String },
    #[error("write to {name} rejected: {reason}")]
    Rejected { name: String, reason: String },
}

/// Hardware/monitoring boundary used by the controller.
///
/// Implementations expose the latest monitored value for each record and accept
/// synchronous or asynchronous setpoint writes.
#[async_trait]
pub trait ProcessVariables: Send + Sync {
    /// Write and wait until the value is committed.
    async fn put_sync(&self, name: &str, value: PvValue) -> Result<(), PvError>;

    /// Queue a write and return immediately.
    fn put_async(&self, name: &str, value: PvValue) -> Result<(), PvError>;

    /// Latest known value of a record.
    fn get(&self, name: &str) -> Option<PvValue>;

    fn get_f64(&self, name: &str) -> Option<f64> {
        self.get(name).and_then(|value| value.as_f64())
    }

    fn get_i64(&self, name: &str) -> Option<i64> {
        self.get(name).and_then(|value| value.as_i64())
    }

    fn get_text(&self, name: &str) -> Option<String> {
        self.get(name)
            .and_then(|value| value.as_str().map(str::to_owned))
    }
}

/// Fully qualified record names for one supply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PvNames {
    pub prefix: String,
    // readbacks
    pub output: String,
    pub output_mode: String,
    pub pause: String,
    pub direction: String,
    pub constant: String,
    pub mid: String,
    pub max: String,
    pub limit: String,
    pub ramp_rate: String,
    pub ramp_target: String,
    pub final_target: String,
    pub heater_status: String,
    pub read_file: String,
    pub write_file: String,
    // setpoints and published values
    pub max_sp: String,
    pub mid_sp: String,
    pub pause_sp: String,
    pub limit_sp: String,
    pub ramp_target_sp: String,
    pub direction_sp: String,
    pub constant_sp: String,
    pub ramp_rate_sp: String,
    pub output_mode_sp: String,
    pub heater_status_sp: String,
    pub log_message: String,
    pub table_targets: String,
    pub table_rates: String,
    pub table_directory: String,
    pub ramp_time: String,
}

impl PvNames {
    pub fn new(prefix: &str) -> Self {
        let pv = |suffix: &str| format!("{prefix}:{suffix}");
        Self {
            prefix: prefix.to_owned(),
            output: pv("OUTPUT"),
            output_mode: pv("OUTPUTMODE"),
            pause: pv("PAUSE"),
            direction: pv("DIRECTION"),
            constant: pv("CONSTANT"),
            mid: pv("MID"),
            max: pv("MAX"),
            limit: pv("LIMIT"),
            ramp_rate: pv("RAMPRATE"),
            ramp_target: pv("RAMPTARGET"),
            final_target: pv("MIDFINALTARGET"),
            heater_status: pv("HEATERSTATUS"),
            read_file: pv("READFILE"),
            write_file: pv("WRITEFILE"),
            max_sp: pv("MAX:SP"),
            mid_sp: pv("MID:SP"),
            pause_sp: pv("PAUSE:SP"),
            limit_sp: pv("LIMIT:SP"),
            ramp_target_sp: pv("RAMPTARGET:SP"),
            direction_sp: pv("DIRECTION:SP"),
            constant_sp: pv("CONSTANT:SP"),
            ramp_rate_sp: pv("RAMPRATE:SP"),
            output_mode_sp: pv("OUTPUTMODE:SP"),
            heater_status_sp: pv("HEATERSTATUS:SP"),
            log_message: pv("LOGMESSAGE"),
            table_targets: pv("RAMPTABLETARGETS"),
            table_rates: pv("RAMPTABLERATES"),
            table_directory: pv("RAMPTABLEDIRECTORY"),
            ramp_time: pv("RAMPTIME"),
        }
    }
}
