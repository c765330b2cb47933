//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp control state machine and hardware boundary."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! In-memory stand-in for the supply's process variables.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use parking_lot::Mutex;
use tokio::sync::mpsc;
use tracing::{debug, trace};

use crate::pv::{ProcessVariables, PutMode, PvError, PvNames, PvValue};
use crate::state::{Direction, OutputMode, RampTarget};

/// Notification emitted whenever a monitored value changes.
#[derive(Debug, Clone, PartialEq)]
pub struct PvEvent {
    pub name: String,
    pub value: PvValue,
}

/// A write issued through the [`ProcessVariables`] boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct PutRecord {
    pub name: String,
    pub value: PvValue,
    pub mode: PutMode,
    pub at: DateTime<Utc>,
}

#[derive(Debug, Default)]
struct SupplyInner {
    values: IndexMap<String, PvValue>,
    journal: Vec<PutRecord>,
}

/// Simulated magnet supply.
///
/// Setpoint writes are echoed to their readbacks the way the device does
/// (`OUTPUTMODE:SP = 1` reads back as `TESLA`), and [`advance`](Self::advance)
/// moves the output toward the selected ramp target. Commits are instantaneous, so
/// synchronous and asynchronous writes only differ in the journal.
#[derive(Debug)]
pub struct SimulatedSupply {
    names: PvNames,
    inner: Mutex<SupplyInner>,
    events: mpsc::UnboundedSender<PvEvent>,
}

impl SimulatedSupply {
    /// Create a supply at zero output, paused, in amps mode.
    pub fn new(names: PvNames) -> (Self, mpsc::UnboundedReceiver<PvEvent>) {
        let (events, rx) = mpsc::unbounded_channel();
        let mut values = IndexMap::new();
        values.insert(names.output.clone(), PvValue::Double(0.0));
        values.insert(names.output_mode.clone(), PvValue::from("AMPS"));
        values.insert(names.pause.clone(), PvValue::from("ON"));
        values.insert(names.direction.clone(), PvValue::from("POSITIVE"));
        values.insert(names.constant.clone(), PvValue::Double(0.0));
        values.insert(names.mid.clone(), PvValue::Double(0.0));
        values.insert(names.max.clone(), PvValue::Double(0.0));
        values.insert(names.limit.clone(), PvValue::Double(0.0));
        values.insert(names.ramp_rate.clone(), PvValue::Double(0.0));
        values.insert(names.ramp_target.clone(), PvValue::from("ZERO"));
        values.insert(names.final_target.clone(), PvValue::Double(0.0));
        values.insert(names.heater_status.clone(), PvValue::from("OFF"));
        values.insert(names.read_file.clone(), PvValue::Int(0));
        values.insert(names.write_file.clone(), PvValue::Int(0));
        let supply = Self {
            names,
            inner: Mutex::new(SupplyInner {
                values,
                journal: Vec::new(),
            }),
            events,
        };
        (supply, rx)
    }

    pub fn names(&self) -> &PvNames {
        &self.names
    }

    /// Change a value from outside the controller (operator or device side).
    pub fn set(&self, name: &str, value: impl Into<PvValue>) {
        self.commit(name, value.into());
    }

    /// Writes issued through the boundary, oldest first.
    pub fn journal(&self) -> Vec<PutRecord> {
        self.inner.lock().journal.clone()
    }

    /// Writes issued to a single record, oldest first.
    pub fn writes_to(&self, name: &str) -> Vec<PutRecord> {
        self.inner
            .lock()
            .journal
            .iter()
            .filter(|record| record.name == name)
            .cloned()
            .collect()
    }

    pub fn clear_journal(&self) {
        self.inner.lock().journal.clear();
    }

    /// Move the output toward the selected target for `elapsed` of simulated time.
    ///
    /// The slew is `RAMPRATE * CONSTANT` Tesla per second. Paused supplies hold.
    pub fn advance(&self, elapsed: Duration) {
        let names = &self.names;
        let (output, goal, slew) = {
            let inner = self.inner.lock();
            let get = |name: &str| inner.values.get(name).and_then(PvValue::as_f64);
            let paused = inner.values.get(&names.pause).and_then(PvValue::as_str) == Some("ON");
            if paused {
                return;
            }
            let target = inner
                .values
                .get(&names.ramp_target)
                .and_then(PvValue::as_str)
                .and_then(RampTarget::from_readback)
                .unwrap_or(RampTarget::Zero);
            let goal = match target {
                RampTarget::Zero => 0.0,
                RampTarget::Mid => get(&names.mid).unwrap_or_default(),
                RampTarget::Max => get(&names.max).unwrap_or_default(),
            };
            let rate = get(&names.ramp_rate).unwrap_or_default();
            let constant = get(&names.constant).unwrap_or_default();
            (
                get(&names.output).unwrap_or_default(),
                goal.abs(),
                (rate * constant).abs(),
            )
        };
        if output == goal || slew == 0.0 {
            return;
        }
        let step = slew * elapsed.as_secs_f64();
        let next = if goal > output {
            (output + step).min(goal)
        } else {
            (output - step).max(goal)
        };
        trace!(output, next, goal, "simulated output advanced");
        self.commit(&names.output, PvValue::Double(next));
    }

    fn record(&self, name: &str, value: &PvValue, mode: PutMode) {
        self.inner.lock().journal.push(PutRecord {
            name: name.to_owned(),
            value: value.clone(),
            mode,
            at: Utc::now(),
        });
    }

    fn commit(&self, name: &str, value: PvValue) {
        let echo = self.readback_for(name, &value);
        {
            let mut inner = self.inner.lock();
            inner.values.insert(name.to_owned(), value.clone());
            if let Some((readback, echoed)) = &echo {
                inner.values.insert(readback.clone(), echoed.clone());
            }
        }
        self.notify(name, value);
        if let Some((readback, echoed)) = echo {
            self.notify(&readback, echoed);
        }
    }

    fn notify(&self, name: &str, value: PvValue) {
        if self
            .events
            .send(PvEvent {
                name: name.to_owned(),
                value,
            })
            .is_err()
        {
            debug!(pv = name, "no listener for value change");
        }
    }

    fn readback_for(&self, name: &str, value: &PvValue) -> Option<(String, PvValue)> {
        let n = &self.names;
        let code = || value.as_i64();
        let text = |s: &str| PvValue::from(s);
        let echo = if name == n.mid_sp {
            (n.mid.clone(), value.clone())
        } else if name == n.max_sp {
            (n.max.clone(), value.clone())
        } else if name == n.constant_sp {
            (n.constant.clone(), value.clone())
        } else if name == n.limit_sp {
            (n.limit.clone(), value.clone())
        } else if name == n.ramp_rate_sp {
            (n.ramp_rate.clone(), value.clone())
        } else if name == n.pause_sp {
            let on = code()? != 0;
            (n.pause.clone(), text(if on { "ON" } else { "OFF" }))
        } else if name == n.heater_status_sp {
            let on = code()? != 0;
            (n.heater_status.clone(), text(if on { "ON" } else { "OFF" }))
        } else if name == n.direction_sp {
            let direction = Direction::from_setpoint(code()?)?;
            (n.direction.clone(), PvValue::from(direction.to_string()))
        } else if name == n.ramp_target_sp {
            let target = RampTarget::from_setpoint(code()?)?;
            (n.ramp_target.clone(), PvValue::from(target.to_string()))
        } else if name == n.output_mode_sp {
            let mode = OutputMode::from_setpoint(code()?)?;
            (n.output_mode.clone(), PvValue::from(mode.to_string()))
        } else {
            return None;
        };
        Some(echo)
    }
}

#[async_trait]
impl ProcessVariables for SimulatedSupply {
    async fn put_sync(&self, name: &str, value: PvValue) -> Result<(), PvError> {
        self.record(name, &value, PutMode::Sync);
        self.commit(name, value);
        Ok(())
    }

    fn put_async(&self, name: &str, value: PvValue) -> Result<(), PvError> {
        self.record(name, &value, PutMode::Async);
        self.commit(name, value);
        Ok(())
    }

    fn get(&self, name: &str) -> Option<PvValue> {
        self.inner.lock().values.get(name).cloned()
    }
}
