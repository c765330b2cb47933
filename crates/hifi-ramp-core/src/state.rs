//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp control state machine and hardware boundary."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, IntoStaticStr};

use crate::pv::{ProcessVariables, PvNames};

/// States of the ramp control machine.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, AsRefStr, IntoStaticStr,
)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum ControlState {
    Init,
    Init2,
    Init3,
    Idle,
    RampingActive,
    WriteRampTableFile,
    ReadRampTableFile,
}

/// Output polarity of the supply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum Direction {
    Positive,
    Negative,
}

impl Direction {
    /// Value written to the DIRECTION setpoint.
    pub fn setpoint(self) -> i64 {
        match self {
            Direction::Positive => 2,
            Direction::Negative => 1,
        }
    }

    pub fn from_setpoint(value: i64) -> Option<Self> {
        match value {
            2 => Some(Direction::Positive),
            1 => Some(Direction::Negative),
            _ => None,
        }
    }

    pub fn from_readback(text: &str) -> Option<Self> {
        match text {
            "POSITIVE" => Some(Direction::Positive),
            "NEGATIVE" => Some(Direction::Negative),
            _ => None,
        }
    }

    /// Polarity implied by a signed target; `None` for zero.
    pub fn of(value: f64) -> Option<Self> {
        if value > 0.0 {
            Some(Direction::Positive)
        } else if value < 0.0 {
            Some(Direction::Negative)
        } else {
            None
        }
    }
}

/// Setpoint the supply ramps toward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum RampTarget {
    Zero,
    Mid,
    Max,
}

impl RampTarget {
    pub fn setpoint(self) -> i64 {
        match self {
            RampTarget::Zero => 0,
            RampTarget::Mid => 1,
            RampTarget::Max => 2,
        }
    }

    pub fn from_setpoint(value: i64) -> Option<Self> {
        match value {
            0 => Some(RampTarget::Zero),
            1 => Some(RampTarget::Mid),
            2 => Some(RampTarget::Max),
            _ => None,
        }
    }

    pub fn from_readback(text: &str) -> Option<Self> {
        match text {
            "ZERO" => Some(RampTarget::Zero),
            "MID" => Some(RampTarget::Mid),
            "MAX" => Some(RampTarget::Max),
            _ => None,
        }
    }
}

/// Units the supply reports its output in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum OutputMode {
    Amps,
    Tesla,
}

impl OutputMode {
    pub fn setpoint(self) -> i64 {
        match self {
            OutputMode::Amps => 0,
            OutputMode::Tesla => 1,
        }
    }

    pub fn from_setpoint(value: i64) -> Option<Self> {
        match value {
            0 => Some(OutputMode::Amps),
            1 => Some(OutputMode::Tesla),
            _ => None,
        }
    }

    pub fn from_readback(text: &str) -> Option<Self> {
        match text {
            "AMPS" => Some(OutputMode::Amps),
            "TESLA" => Some(OutputMode::Tesla),
            _ => None,
        }
    }
}

/// Live control variables observed from the supply for one evaluation.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RampSession {
    /// Output magnitude in Tesla.
    pub current_output: Option<f64>,
    /// Signed final target in scaled units.
    pub final_target: Option<f64>,
    pub direction: Option<Direction>,
    pub paused: Option<bool>,
    pub constant: Option<f64>,
    pub limit: Option<f64>,
    pub output_mode: Option<OutputMode>,
    pub mid: Option<f64>,
    pub write_trigger: i64,
    pub read_trigger: i64,
}

impl RampSession {
    /// Snapshot the monitored readbacks.
    pub fn observe(pv: &dyn ProcessVariables, names: &PvNames) -> Self {
        Self {
            current_output: pv.get_f64(&names.output),
            final_target: pv.get_f64(&names.final_target),
            direction: pv
                .get_text(&names.direction)
                .and_then(|text| Direction::from_readback(&text)),
            paused: pv.get_text(&names.pause).and_then(|text| match text.as_str() {
                "ON" => Some(true),
                "OFF" => Some(false),
                _ => None,
            }),
            constant: pv.get_f64(&names.constant),
            limit: pv.get_f64(&names.limit),
            output_mode: pv
                .get_text(&names.output_mode)
                .and_then(|text| OutputMode::from_readback(&text)),
            mid: pv.get_f64(&names.mid),
            write_trigger: pv.get_i64(&names.write_file).unwrap_or_default(),
            read_trigger: pv.get_i64(&names.read_file).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn state_names_are_snake_case() {
        assert_eq!(ControlState::RampingActive.to_string(), "ramping_active");
        assert_eq!(ControlState::Init2.as_ref(), "init2");
        let name: &'static str = ControlState::WriteRampTableFile.into();
        assert_eq!(name, "write_ramp_table_file");
    }

    #[test]
    fn enum_codes_match_device() {
        assert_eq!(Direction::Positive.setpoint(), 2);
        assert_eq!(Direction::from_setpoint(1), Some(Direction::Negative));
        assert_eq!(RampTarget::Mid.setpoint(), 1);
        assert_eq!(OutputMode::Tesla.to_string(), "TESLA");
        assert_eq!(Direction::of(-3.0), Some(Direction::Negative));
        assert_eq!(Direction::of(0.0), None);
    }
}
