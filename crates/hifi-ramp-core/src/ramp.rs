//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp control state machine and hardware boundary."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Incremental, breakpoint-following ramp planning.
//!
//! The supply is never told to go straight to the final target. Each step aims at
//! the next breakpoint in the direction of travel so that a lost connection leaves
//! the magnet on a bounded segment. Polarity changes pass through zero.

use hifi_ramp_common::config::RampSettings;
use hifi_ramp_table::{BreakpointTable, RampTableError, SCALE};

use crate::state::Direction;

/// Inputs for one planning decision.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RampInputs {
    /// Output magnitude in Tesla.
    pub current_output: f64,
    /// Signed final target in scaled units.
    pub final_target: f64,
    /// Polarity the supply currently reports.
    pub direction: Option<Direction>,
    /// Safety ceiling in Tesla.
    pub limit: f64,
}

/// What the controller should do next while ramping.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RampAction {
    /// The output sits on the final target.
    Complete,
    /// The final target exceeds the safety limit.
    Refuse { requested: f64, limit: f64 },
    /// The final target has a sign but the supply reports no polarity.
    UnknownPolarity,
    /// Step down toward zero before reversing polarity. A setpoint of zero selects
    /// the supply's zero target.
    ApproachZero {
        setpoint: f64,
        rate: f64,
        breakpoint: Option<usize>,
    },
    /// Output is at zero; switch polarity.
    FlipPolarity(Direction),
    /// Ramp to an interim setpoint (scaled units) at the given rate.
    Step {
        setpoint: f64,
        rate: f64,
        breakpoint: Option<usize>,
    },
}

/// Decide the next ramp action for the observed inputs.
pub fn plan(
    table: &BreakpointTable,
    inputs: RampInputs,
    settings: &RampSettings,
) -> Result<RampAction, RampTableError> {
    let goal = inputs.final_target.abs();
    if goal / SCALE > inputs.limit {
        return Ok(RampAction::Refuse {
            requested: goal / SCALE,
            limit: inputs.limit,
        });
    }

    let output = inputs.current_output.abs();
    match (inputs.direction, Direction::of(inputs.final_target)) {
        (None, Some(_)) => return Ok(RampAction::UnknownPolarity),
        (Some(current), Some(desired)) if current != desired => {
            if output <= settings.zero_tolerance {
                return Ok(RampAction::FlipPolarity(desired));
            }
            let position = snap_to_breakpoint(table, output * SCALE, settings.arrival_tolerance);
            let (setpoint, rate, breakpoint) = next_step(table, position, 0.0)?;
            return Ok(RampAction::ApproachZero {
                setpoint,
                rate,
                breakpoint,
            });
        }
        _ => {}
    }

    let position = snap_to_breakpoint(table, output * SCALE, settings.arrival_tolerance);
    if (position - goal).abs() <= settings.arrival_tolerance {
        return Ok(RampAction::Complete);
    }

    let (setpoint, rate, breakpoint) = next_step(table, position, goal)?;
    Ok(RampAction::Step {
        setpoint,
        rate,
        breakpoint,
    })
}

/// Setpoint, rate and breakpoint index of the next segment from `position` toward
/// `goal`, both scaled magnitudes.
fn next_step(
    table: &BreakpointTable,
    position: f64,
    goal: f64,
) -> Result<(f64, f64, Option<usize>), RampTableError> {
    match table.find_nearest_breakpoint_scaled(position, goal) {
        Ok(index) => {
            let breakpoint = table.entries()[index];
            if goal > position {
                Ok((breakpoint.target.min(goal), breakpoint.rate, Some(index)))
            } else {
                Ok((
                    breakpoint.target.max(goal),
                    table.segment_rate(position)?,
                    Some(index),
                ))
            }
        }
        Err(RampTableError::TableOutOfRange) => {
            Ok((goal, table.segment_rate(position)?, None))
        }
        Err(err) => Err(err),
    }
}

/// Treat an output within `tolerance` of a breakpoint as sitting on it.
fn snap_to_breakpoint(table: &BreakpointTable, scaled: f64, tolerance: f64) -> f64 {
    table
        .valid()
        .map(|(_, row)| row.target)
        .find(|target| (target - scaled).abs() <= tolerance)
        .unwrap_or(scaled)
}
