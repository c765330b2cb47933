//! ---
//! ramp_section: "01-core-functionality"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Ramp control state machine and hardware boundary."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Event loop driving a [`RampController`].

use std::time::Duration;

use anyhow::{Context, Result};
use hifi_ramp_rt::{RateLimiter, SettleTimer};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, trace};

use crate::controller::RampController;
use crate::state::ControlState;

/// Upper bound on back-to-back transitions taken for a single wake-up.
const MAX_TRANSITIONS_PER_WAKE: usize = 8;

/// Owns the controller and wakes it on value changes, settle deadlines and a
/// periodic re-evaluation tick.
///
/// The periodic tick also retries writes the supply refused. Any error returned by
/// the controller is a table file failure and stops the loop.
#[derive(Debug)]
pub struct RampRuntime<E> {
    controller: RampController,
    events: mpsc::UnboundedReceiver<E>,
    evaluation_interval: Duration,
}

impl<E: std::fmt::Debug + Send + 'static> RampRuntime<E> {
    pub fn new(
        controller: RampController,
        events: mpsc::UnboundedReceiver<E>,
        evaluation_interval: Duration,
    ) -> Self {
        Self {
            controller,
            events,
            evaluation_interval,
        }
    }

    /// Start the loop on the current tokio runtime.
    pub fn spawn(self) -> RuntimeHandle {
        let (shutdown_tx, shutdown_rx) = broadcast::channel(4);
        let (state_tx, state_rx) = watch::channel(self.controller.state());
        let task = tokio::spawn(self.run(shutdown_rx, state_tx));
        RuntimeHandle {
            shutdown: shutdown_tx,
            task,
            state: state_rx,
        }
    }

    async fn run(
        mut self,
        mut shutdown: broadcast::Receiver<()>,
        state: watch::Sender<ControlState>,
    ) -> Result<()> {
        let device = self.controller.names().prefix.clone();
        let mut limiter = RateLimiter::new(self.evaluation_interval);
        let mut settle = SettleTimer::new();
        let mut events_open = true;
        info!(device = %device, "ramp runtime started");

        if let Err(err) = self.drive(&state, &mut settle).await {
            error!(device = %device, error = %err, "ramp controller stopped");
            return Err(err);
        }

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    debug!(device = %device, "ramp runtime shutdown signal received");
                    break;
                }
                event = self.events.recv(), if events_open => match event {
                    Some(event) => {
                        trace!(device = %device, ?event, "value change");
                        while self.events.try_recv().is_ok() {}
                    }
                    None => {
                        debug!(device = %device, "value change channel closed");
                        events_open = false;
                    }
                },
                _ = settle.expired() => {
                    trace!(device = %device, "settle delay elapsed");
                }
                _ = limiter.tick() => {}
            }

            if let Err(err) = self.drive(&state, &mut settle).await {
                error!(device = %device, error = %err, "ramp controller stopped");
                return Err(err);
            }
        }

        info!(device = %device, tick = self.controller.tick(), "ramp runtime stopped");
        Ok(())
    }

    async fn drive(
        &mut self,
        state: &watch::Sender<ControlState>,
        settle: &mut SettleTimer,
    ) -> Result<()> {
        for _ in 0..MAX_TRANSITIONS_PER_WAKE {
            let now = tokio::time::Instant::now().into_std();
            let transition = self
                .controller
                .evaluate(now)
                .await
                .context("ramp controller evaluation failed")?;
            match transition {
                Some(transition) => {
                    state.send_replace(transition.to);
                }
                None => break,
            }
        }
        match self.controller.next_deadline() {
            Some(deadline) => settle.arm(deadline),
            None => settle.disarm(),
        }
        Ok(())
    }
}

/// Handle used to observe and stop a spawned [`RampRuntime`].
#[derive(Debug)]
pub struct RuntimeHandle {
    shutdown: broadcast::Sender<()>,
    task: JoinHandle<Result<()>>,
    state: watch::Receiver<ControlState>,
}

impl RuntimeHandle {
    /// Most recently published controller state.
    pub fn state(&self) -> ControlState {
        *self.state.borrow()
    }

    /// Receiver notified on every state transition. Closes when the loop exits.
    pub fn subscribe_state(&self) -> watch::Receiver<ControlState> {
        self.state.clone()
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Signal shutdown and wait for the loop to exit.
    pub async fn shutdown(self) -> Result<()> {
        let _ = self.shutdown.send(());
        self.join().await
    }

    pub async fn join(self) -> Result<()> {
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}
