//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp control state machine and hardware boundary."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Event-driven ramp control state machine.
//!
//! [`RampController::evaluate`] runs any pending entry action, observes the
//! supply, and takes at most one transition. The entry action of the new state
//! runs before `evaluate` returns. While ramping with no transition pending, one
//! incremental ramp step is planned per evaluation.
//!
//! A write rejected by the supply is logged and retried on the next evaluation;
//! the state is kept. Only table file failures escape `evaluate`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use hifi_ramp_common::config::{DefaultsConfig, RampConfig, RampSettings};
use hifi_ramp_logging::{
    log_system_event, ramp_debug, ramp_info, ramp_warn, LogContext, SystemEventOutcome,
};
use hifi_ramp_metrics::ControllerMetrics;
use hifi_ramp_table::{load_table, save_table, BreakpointTable, RampTableError, SCALE};

use crate::error::{ControllerError, Result};
use crate::pv::{ProcessVariables, PvNames, PvValue};
use crate::ramp::{plan, RampAction, RampInputs};
use crate::state::{ControlState, OutputMode, RampSession, RampTarget};

/// A state change taken during one evaluation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Transition {
    pub from: ControlState,
    pub to: ControlState,
}

/// Ramp controller for a single supply.
pub struct RampController {
    pv: Arc<dyn ProcessVariables>,
    names: PvNames,
    table_path: PathBuf,
    defaults: DefaultsConfig,
    settings: RampSettings,
    table: BreakpointTable,
    state: ControlState,
    entry_pending: bool,
    entered_at: Option<Instant>,
    tick: u64,
    last_command: Option<RampAction>,
    last_fault: Option<String>,
    metrics: Option<ControllerMetrics>,
}

impl std::fmt::Debug for RampController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RampController")
            .field("device", &self.names.prefix)
            .field("state", &self.state)
            .field("tick", &self.tick)
            .field("breakpoints", &self.table.valid_len())
            .finish()
    }
}

impl RampController {
    /// Create a controller in [`ControlState::Init`]. Nothing is written until the
    /// first [`evaluate`](Self::evaluate).
    pub fn new(pv: Arc<dyn ProcessVariables>, config: &RampConfig) -> Self {
        Self {
            pv,
            names: PvNames::new(&config.supply.prefix),
            table_path: config.supply.ramp_table_path.clone(),
            defaults: config.defaults.clone(),
            settings: config.ramp.clone(),
            table: BreakpointTable::new(),
            state: ControlState::Init,
            entry_pending: true,
            entered_at: None,
            tick: 0,
            last_command: None,
            last_fault: None,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: ControllerMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn state(&self) -> ControlState {
        self.state
    }

    pub fn table(&self) -> &BreakpointTable {
        &self.table
    }

    pub fn names(&self) -> &PvNames {
        &self.names
    }

    pub fn table_path(&self) -> &Path {
        &self.table_path
    }

    /// Number of evaluations performed so far.
    pub fn tick(&self) -> u64 {
        self.tick
    }

    /// Instant at which the current state's settle delay expires, if it waits on one.
    pub fn next_deadline(&self) -> Option<Instant> {
        match self.state {
            ControlState::WriteRampTableFile | ControlState::ReadRampTableFile => self
                .entered_at
                .map(|entered| entered + self.settings.settle_delay),
            _ => None,
        }
    }

    /// Run one evaluation of the state machine at `now`.
    ///
    /// Table file failures during initialisation or reload are returned and must
    /// be treated as fatal by the caller. Rejected writes are not returned: an
    /// interrupted entry action stays pending and an interrupted ramp step is
    /// planned again.
    pub async fn evaluate(&mut self, now: Instant) -> Result<Option<Transition>> {
        self.tick += 1;
        if self.entry_pending && !self.run_entry(now).await? {
            return Ok(None);
        }

        let session = RampSession::observe(self.pv.as_ref(), &self.names);
        if let Some(next) = self.guard(&session, now) {
            let transition = Transition {
                from: self.state,
                to: next,
            };
            self.transition(transition);
            if self.run_entry(now).await? {
                let announced = self.announce(next);
                self.tolerate("state announcement", announced)?;
            }
            return Ok(Some(transition));
        }

        if self.state == ControlState::RampingActive {
            let stepped = self.ramp_step(&session).await;
            self.tolerate("ramp step", stepped)?;
        }
        Ok(None)
    }

    /// Whether an entry action still has to run for the current state.
    pub fn entry_pending(&self) -> bool {
        self.entry_pending
    }

    async fn run_entry(&mut self, now: Instant) -> Result<bool> {
        self.entry_pending = true;
        let entered = self.enter(now).await;
        let complete = self.tolerate("entry action", entered)?;
        self.entry_pending = !complete;
        Ok(complete)
    }

    /// Swallow a rejected write so the next evaluation retries it.
    fn tolerate(&self, action: &str, outcome: Result<()>) -> Result<bool> {
        match outcome {
            Ok(()) => Ok(true),
            Err(ControllerError::Pv(err)) => {
                ramp_warn!(
                    context = self.context(),
                    "{action} interrupted: {err}; retrying on next evaluation"
                );
                if let Some(metrics) = &self.metrics {
                    metrics.inc_rejected_write();
                }
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    fn context(&self) -> LogContext<'_> {
        LogContext::new()
            .with_device(&self.names.prefix)
            .with_state(self.state.as_ref())
            .with_tick(self.tick)
    }

    fn guard(&self, session: &RampSession, now: Instant) -> Option<ControlState> {
        let defaults = &self.defaults;
        match self.state {
            ControlState::Init => session
                .constant
                .filter(|constant| (constant - defaults.constant).abs() < defaults.constant_tolerance)
                .map(|_| ControlState::Init2),
            ControlState::Init2 => (session.output_mode == Some(OutputMode::Tesla))
                .then_some(ControlState::Init3),
            ControlState::Init3 => session
                .mid
                .filter(|mid| (mid - defaults.mid).abs() < defaults.setpoint_tolerance)
                .map(|_| ControlState::Idle),
            ControlState::Idle => {
                if session.paused == Some(false) {
                    Some(ControlState::RampingActive)
                } else if session.write_trigger > 0 {
                    Some(ControlState::WriteRampTableFile)
                } else if session.read_trigger > 0 {
                    Some(ControlState::ReadRampTableFile)
                } else {
                    None
                }
            }
            ControlState::RampingActive => {
                (session.paused == Some(true)).then_some(ControlState::Idle)
            }
            ControlState::WriteRampTableFile | ControlState::ReadRampTableFile => {
                let settled = self
                    .entered_at
                    .map_or(true, |entered| {
                        now.saturating_duration_since(entered) >= self.settings.settle_delay
                    });
                settled.then_some(ControlState::Idle)
            }
        }
    }

    fn transition(&mut self, transition: Transition) {
        ramp_info!(
            context = self.context(),
            "state transition {} -> {}",
            transition.from,
            transition.to
        );
        if let Some(metrics) = &self.metrics {
            metrics.record_transition(transition.from.as_ref(), transition.to.as_ref());
        }
        self.state = transition.to;
        self.entered_at = None;
        self.last_command = None;
        self.last_fault = None;
    }

    fn announce(&self, state: ControlState) -> Result<()> {
        let message = match state {
            ControlState::Idle => "ramp controller idle",
            ControlState::RampingActive => "ramping active",
            ControlState::WriteRampTableFile => "writing ramp table file",
            ControlState::ReadRampTableFile => "reading ramp table file",
            ControlState::Init | ControlState::Init2 | ControlState::Init3 => return Ok(()),
        };
        self.pv
            .put_async(&self.names.log_message, PvValue::from(message))?;
        Ok(())
    }

    async fn enter(&mut self, now: Instant) -> Result<()> {
        match self.state {
            ControlState::Init => self.enter_init().await,
            ControlState::Init2 => {
                self.pv
                    .put_sync(
                        &self.names.output_mode_sp,
                        PvValue::Int(OutputMode::Tesla.setpoint()),
                    )
                    .await?;
                Ok(())
            }
            ControlState::Init3 => {
                self.pv
                    .put_sync(&self.names.max_sp, PvValue::Double(self.defaults.max))
                    .await?;
                self.pv
                    .put_sync(&self.names.mid_sp, PvValue::Double(self.defaults.mid))
                    .await?;
                Ok(())
            }
            ControlState::Idle | ControlState::RampingActive => Ok(()),
            ControlState::WriteRampTableFile => {
                self.persist_table()?;
                self.reload_table()?;
                self.publish_table().await?;
                self.pv
                    .put_sync(&self.names.write_file, PvValue::Int(0))
                    .await?;
                self.entered_at = Some(now);
                Ok(())
            }
            ControlState::ReadRampTableFile => {
                self.reload_table()?;
                self.publish_table().await?;
                self.pv
                    .put_sync(&self.names.read_file, PvValue::Int(0))
                    .await?;
                self.entered_at = Some(now);
                Ok(())
            }
        }
    }

    async fn enter_init(&mut self) -> Result<()> {
        let directory = self.table_path.display().to_string();
        self.pv
            .put_sync(&self.names.table_directory, PvValue::from(directory))
            .await?;

        let loaded = load_table(&self.table_path);
        self.table = self.record_table_operation("load", loaded)?;
        self.publish_table().await?;

        match self.table.initial_rate() {
            Some(rate) => {
                self.pv
                    .put_sync(&self.names.ramp_rate_sp, PvValue::Double(rate))
                    .await?;
            }
            None => ramp_warn!(
                context = self.context(),
                "ramp table {} holds no usable breakpoints; ramp rate left unchanged",
                self.table_path.display()
            ),
        }

        self.pv
            .put_async(&self.names.limit_sp, PvValue::Double(self.defaults.limit))?;
        self.pv
            .put_async(&self.names.constant_sp, PvValue::Double(self.defaults.constant))?;
        self.pv
            .put_sync(
                &self.names.ramp_target_sp,
                PvValue::Int(RampTarget::Mid.setpoint()),
            )
            .await?;
        self.pv
            .put_sync(&self.names.pause_sp, PvValue::Int(1))
            .await?;
        self.pv
            .put_sync(
                &self.names.log_message,
                PvValue::from(self.defaults.initial_message.as_str()),
            )
            .await?;
        Ok(())
    }

    /// Write the operator-visible table to disk.
    ///
    /// The published PV arrays take precedence over the in-memory table so that
    /// edits made on the arrays are persisted.
    fn persist_table(&mut self) -> Result<()> {
        let targets = self.pv.get(&self.names.table_targets);
        let rates = self.pv.get(&self.names.table_rates);
        let table = match (
            targets.as_ref().and_then(PvValue::as_array),
            rates.as_ref().and_then(PvValue::as_array),
        ) {
            (Some(targets), Some(rates)) => BreakpointTable::from_pv_arrays(targets, rates),
            _ => self.table.clone(),
        };
        let saved = save_table(&self.table_path, &table);
        let rows = self.record_table_operation("save", saved)?;
        ramp_debug!(
            context = self.context(),
            "wrote {rows} breakpoints to {}",
            self.table_path.display()
        );
        Ok(())
    }

    fn reload_table(&mut self) -> Result<()> {
        let mut table = std::mem::take(&mut self.table);
        let reloaded = table.reload(&self.table_path);
        self.table = table;
        self.record_table_operation("reload", reloaded)?;
        Ok(())
    }

    fn record_table_operation<T>(
        &self,
        operation: &str,
        outcome: std::result::Result<T, RampTableError>,
    ) -> Result<T> {
        if let Some(metrics) = &self.metrics {
            metrics.record_table_operation(operation, outcome.is_ok());
        }
        let event = format!("table.{operation}");
        match outcome {
            Ok(value) => {
                log_system_event(
                    Some(&self.context()),
                    &event,
                    &format!("ramp table {} ok", self.table_path.display()),
                    SystemEventOutcome::Success,
                );
                Ok(value)
            }
            Err(err) => {
                log_system_event(
                    Some(&self.context()),
                    &event,
                    &err.to_string(),
                    SystemEventOutcome::Fault,
                );
                Err(err.into())
            }
        }
    }

    async fn publish_table(&self) -> Result<()> {
        let (targets, rates) = self.table.to_pv_arrays();
        self.pv
            .put_sync(&self.names.table_targets, PvValue::Array(targets))
            .await?;
        self.pv
            .put_sync(&self.names.table_rates, PvValue::Array(rates))
            .await?;
        if let Some(metrics) = &self.metrics {
            metrics.set_breakpoints(self.table.valid_len());
        }
        Ok(())
    }

    async fn ramp_step(&mut self, session: &RampSession) -> Result<()> {
        let (Some(output), Some(final_target)) = (session.current_output, session.final_target)
        else {
            ramp_debug!(
                context = self.context(),
                "output or final target unavailable; holding"
            );
            return Ok(());
        };
        let limit = session
            .limit
            .filter(|limit| *limit > 0.0)
            .unwrap_or(self.defaults.limit);
        let inputs = RampInputs {
            current_output: output,
            final_target,
            direction: session.direction,
            limit,
        };

        let action = match plan(&self.table, inputs, &self.settings) {
            Ok(action) => action,
            Err(err) => return self.report_plan_fault(err),
        };
        self.last_fault = None;
        if self.last_command == Some(action) {
            return Ok(());
        }

        match action {
            RampAction::Complete => {
                ramp_info!(
                    context = self.context(),
                    "final target {final_target} reached"
                );
                self.pv
                    .put_async(&self.names.log_message, PvValue::from("ramp complete"))?;
            }
            RampAction::Refuse { requested, limit } => {
                ramp_warn!(
                    context = self.context(),
                    "final target {requested} T exceeds limit {limit} T; ramp refused"
                );
                self.pv.put_async(
                    &self.names.log_message,
                    PvValue::from(format!(
                        "target {requested} T exceeds limit {limit} T, not ramping"
                    )),
                )?;
            }
            RampAction::UnknownPolarity => {
                ramp_warn!(
                    context = self.context(),
                    "direction readback unavailable; holding before ramping to {final_target}"
                );
                self.pv.put_async(
                    &self.names.log_message,
                    PvValue::from("polarity unknown, not ramping"),
                )?;
            }
            RampAction::ApproachZero {
                setpoint,
                rate,
                breakpoint,
            } => {
                let physical = setpoint / SCALE;
                ramp_info!(
                    context = self.context(),
                    "polarity change requested; ramping down to {physical} T at rate {rate} (breakpoint {breakpoint:?})"
                );
                self.pv
                    .put_sync(&self.names.ramp_rate_sp, PvValue::Double(rate))
                    .await?;
                let target = if setpoint > 0.0 {
                    self.pv
                        .put_sync(&self.names.mid_sp, PvValue::Double(physical))
                        .await?;
                    RampTarget::Mid
                } else {
                    RampTarget::Zero
                };
                self.pv
                    .put_sync(&self.names.ramp_target_sp, PvValue::Int(target.setpoint()))
                    .await?;
                if let Some(metrics) = &self.metrics {
                    metrics.inc_ramp_step();
                }
            }
            RampAction::FlipPolarity(direction) => {
                ramp_info!(context = self.context(), "output at zero; switching to {direction}");
                self.pv
                    .put_sync(&self.names.direction_sp, PvValue::Int(direction.setpoint()))
                    .await?;
            }
            RampAction::Step {
                setpoint,
                rate,
                breakpoint,
            } => {
                let physical = setpoint / SCALE;
                ramp_info!(
                    context = self.context(),
                    "ramping to {physical} T at rate {rate} (breakpoint {breakpoint:?})"
                );
                self.pv
                    .put_sync(&self.names.ramp_rate_sp, PvValue::Double(rate))
                    .await?;
                self.pv
                    .put_sync(&self.names.mid_sp, PvValue::Double(physical))
                    .await?;
                self.pv
                    .put_sync(
                        &self.names.ramp_target_sp,
                        PvValue::Int(RampTarget::Mid.setpoint()),
                    )
                    .await?;
                if let Some(metrics) = &self.metrics {
                    metrics.inc_ramp_step();
                }
                self.pv.put_async(
                    &self.names.log_message,
                    PvValue::from(format!("ramping to {physical} T")),
                )?;
                self.publish_estimate(output, final_target, session.constant)?;
            }
        }
        self.last_command = Some(action);
        Ok(())
    }

    /// Report a planning failure once until it changes or planning recovers.
    fn report_plan_fault(&mut self, err: RampTableError) -> Result<()> {
        let fault = err.to_string();
        if self.last_fault.as_deref() == Some(fault.as_str()) {
            return Ok(());
        }
        ramp_warn!(context = self.context(), "cannot plan ramp step: {fault}");
        self.pv.put_async(
            &self.names.log_message,
            PvValue::from(format!("cannot ramp: {fault}")),
        )?;
        self.last_command = None;
        self.last_fault = Some(fault);
        Ok(())
    }

    fn publish_estimate(&self, output: f64, final_target: f64, constant: Option<f64>) -> Result<()> {
        let constant = constant.unwrap_or(self.defaults.constant);
        match self
            .table
            .duration_to_target(output.abs() * SCALE, final_target, constant)
        {
            Ok(estimate) => {
                self.pv
                    .put_async(&self.names.ramp_time, PvValue::Double(estimate))?;
                if let Some(metrics) = &self.metrics {
                    metrics.set_estimated_ramp_time(estimate);
                }
            }
            Err(err) => ramp_debug!(context = self.context(), "no ramp time estimate: {err}"),
        }
        Ok(())
    }
}
