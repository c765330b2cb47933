//! ---
//! ramp_section: "03-logging-metrics"
//! ramp_subsection: "module"
//! ramp_type: "source"
//! ramp_scope: "code"
//! ramp_description: "Metrics collection and export utilities."
//! ramp_version: "v0.1.0"
//! ramp_owner: "tbd"
//! ---
//! Prometheus instrumentation for the ramp daemon and its `/metrics` exporter.

use std::net::{SocketAddr, TcpListener as StdTcpListener};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::http::{header, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use hifi_ramp_common::config::MetricsConfig;
use prometheus::{
    Gauge, Histogram, HistogramOpts, IntCounter, IntCounterVec, IntGauge, Opts, Registry,
    TextEncoder, TEXT_FORMAT,
};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{error, info};

/// Shared registry type used across the workspace.
pub type SharedRegistry = Arc<Registry>;

/// Produce a new shared registry.
pub fn new_registry() -> SharedRegistry {
    Arc::new(Registry::new())
}

/// Render every registered family in the text exposition format.
pub fn render(registry: &Registry) -> Result<String> {
    TextEncoder::new()
        .encode_to_string(&registry.gather())
        .context("failed to encode metrics")
}

/// Start the exporter described by `config` for the daemon driving `device`.
///
/// Returns `None` when the exporter is disabled. A listen port of 0 binds an
/// ephemeral port; [`MetricsExporter::addr`] reports the one chosen.
pub fn spawn_exporter(
    registry: SharedRegistry,
    config: &MetricsConfig,
    device: &str,
) -> Result<Option<MetricsExporter>> {
    if !config.enabled {
        info!(device, "metrics exporter disabled by configuration");
        return Ok(None);
    }
    config.validate()?;

    let app = Router::new().route(
        &config.path,
        get(move || metrics_handler(registry.clone())),
    );

    let std_listener = StdTcpListener::bind(config.listen)
        .with_context(|| format!("failed to bind metrics listener {}", config.listen))?;
    std_listener
        .set_nonblocking(true)
        .context("failed to configure metrics listener as non-blocking")?;
    let addr = std_listener
        .local_addr()
        .context("failed to read metrics listener address")?;
    let listener =
        TcpListener::from_std(std_listener).context("failed to register metrics listener")?;

    info!(device, address = %addr, route = %config.path, "metrics exporter listening");

    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let task: JoinHandle<Result<()>> = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .await
            .context("metrics exporter stopped with an error")
    });

    Ok(Some(MetricsExporter {
        addr,
        route: config.path.clone(),
        shutdown: Some(shutdown_tx),
        task,
    }))
}

async fn metrics_handler(registry: SharedRegistry) -> Response {
    match render(&registry) {
        Ok(body) => (
            [(header::CONTENT_TYPE, HeaderValue::from_static(TEXT_FORMAT))],
            body,
        )
            .into_response(),
        Err(err) => {
            error!(error = %err, "metrics scrape failed");
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics encoding error").into_response()
        }
    }
}

/// Running HTTP exporter.
#[derive(Debug)]
pub struct MetricsExporter {
    addr: SocketAddr,
    route: String,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<Result<()>>,
}

impl MetricsExporter {
    pub fn addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn route(&self) -> &str {
        &self.route
    }

    /// Stop accepting scrapes and wait for in-flight ones to finish.
    pub async fn shutdown(mut self) -> Result<()> {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        match self.task.await {
            Ok(result) => result,
            Err(join_err) => Err(anyhow::Error::new(join_err)),
        }
    }
}

/// Metrics recorded by the daemon process itself.
#[derive(Clone, Debug)]
pub struct DaemonMetrics {
    registry: SharedRegistry,
    starts_total: IntCounter,
    config_load_seconds: Histogram,
}

impl DaemonMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let starts_total = IntCounter::with_opts(Opts::new(
            "hifi_rampd_starts_total",
            "Total number of times the ramp daemon has initialised",
        ))?;
        registry.register(Box::new(starts_total.clone()))?;

        let buckets = prometheus::exponential_buckets(0.001, 2.0, 16)
            .context("failed to construct histogram buckets")?;
        let config_load_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "hifi_rampd_config_load_seconds",
                "Time spent loading and validating configuration",
            )
            .buckets(buckets),
        )?;
        registry.register(Box::new(config_load_seconds.clone()))?;

        Ok(Self {
            registry,
            starts_total,
            config_load_seconds,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn inc_start(&self) {
        self.starts_total.inc();
    }

    pub fn observe_config_load(&self, seconds: f64) {
        self.config_load_seconds.observe(seconds);
    }
}

/// Metrics published by the ramp controller state machine.
#[derive(Clone, Debug)]
pub struct ControllerMetrics {
    registry: SharedRegistry,
    transitions: IntCounterVec,
    table_operations: IntCounterVec,
    breakpoints: IntGauge,
    ramp_steps: IntCounter,
    rejected_writes: IntCounter,
    estimated_ramp_time: Gauge,
}

impl ControllerMetrics {
    pub fn new(registry: SharedRegistry) -> Result<Self> {
        let transitions = IntCounterVec::new(
            Opts::new(
                "hifi_ramp_state_transitions_total",
                "Count of controller state transitions by source and destination state",
            ),
            &["from", "to"],
        )?;
        registry.register(Box::new(transitions.clone()))?;

        let table_operations = IntCounterVec::new(
            Opts::new(
                "hifi_ramp_table_operations_total",
                "Count of ramp table file loads and saves by outcome",
            ),
            &["operation", "outcome"],
        )?;
        registry.register(Box::new(table_operations.clone()))?;

        let breakpoints = IntGauge::with_opts(Opts::new(
            "hifi_ramp_table_breakpoints",
            "Number of usable breakpoints in the loaded ramp table",
        ))?;
        registry.register(Box::new(breakpoints.clone()))?;

        let ramp_steps = IntCounter::with_opts(Opts::new(
            "hifi_ramp_steps_total",
            "Interim setpoints written while following the ramp table",
        ))?;
        registry.register(Box::new(ramp_steps.clone()))?;

        let rejected_writes = IntCounter::with_opts(Opts::new(
            "hifi_ramp_rejected_writes_total",
            "Setpoint writes refused by the supply and retried on a later evaluation",
        ))?;
        registry.register(Box::new(rejected_writes.clone()))?;

        let estimated_ramp_time = Gauge::with_opts(Opts::new(
            "hifi_ramp_estimated_time",
            "Latest estimate of the remaining ramp duration",
        ))?;
        registry.register(Box::new(estimated_ramp_time.clone()))?;

        Ok(Self {
            registry,
            transitions,
            table_operations,
            breakpoints,
            ramp_steps,
            rejected_writes,
            estimated_ramp_time,
        })
    }

    pub fn registry(&self) -> SharedRegistry {
        self.registry.clone()
    }

    pub fn record_transition(&self, from: &str, to: &str) {
        self.transitions.with_label_values(&[from, to]).inc();
    }

    pub fn record_table_operation(&self, operation: &str, success: bool) {
        let outcome = if success { "success" } else { "fault" };
        self.table_operations
            .with_label_values(&[operation, outcome])
            .inc();
    }

    pub fn set_breakpoints(&self, count: usize) {
        self.breakpoints.set(count as i64);
    }

    pub fn inc_ramp_step(&self) {
        self.ramp_steps.inc();
    }

    pub fn inc_rejected_write(&self) {
        self.rejected_writes.inc();
    }

    pub fn set_estimated_ramp_time(&self, value: f64) {
        self.estimated_ramp_time.set(value);
    }
}

pub use prometheus;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn controller_metrics_register_and_record() {
        let registry = new_registry();
        let metrics = ControllerMetrics::new(registry.clone()).unwrap();
        metrics.record_transition("init", "init2");
        metrics.record_table_operation("load", true);
        metrics.set_breakpoints(4);
        metrics.inc_ramp_step();
        metrics.set_estimated_ramp_time(12.5);

        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_owned())
            .collect();
        assert!(names.contains(&"hifi_ramp_state_transitions_total".to_owned()));
        assert!(names.contains(&"hifi_ramp_table_breakpoints".to_owned()));
    }

    #[test]
    fn duplicate_registration_fails() {
        let registry = new_registry();
        ControllerMetrics::new(registry.clone()).unwrap();
        assert!(ControllerMetrics::new(registry).is_err());
    }

    #[tokio::test]
    async fn handler_serves_text_exposition() {
        let registry = new_registry();
        let metrics = ControllerMetrics::new(registry.clone()).unwrap();
        metrics.inc_rejected_write();

        let response = metrics_handler(registry.clone()).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            response.headers()[header::CONTENT_TYPE].to_str().unwrap(),
            TEXT_FORMAT
        );
        let body = render(&registry).unwrap();
        assert!(body.contains("hifi_ramp_rejected_writes_total 1"));
    }

    #[tokio::test]
    async fn exporter_follows_metrics_config() {
        let disabled = MetricsConfig {
            enabled: false,
            ..MetricsConfig::default()
        };
        assert!(spawn_exporter(new_registry(), &disabled, "TEST")
            .unwrap()
            .is_none());

        let config = MetricsConfig {
            enabled: true,
            listen: SocketAddr::from(([127, 0, 0, 1], 0)),
            path: "/ramp/metrics".into(),
        };
        let exporter = spawn_exporter(new_registry(), &config, "TEST")
            .unwrap()
            .unwrap();
        assert_ne!(exporter.addr().port(), 0);
        assert_eq!(exporter.route(), "/ramp/metrics");
        exporter.shutdown().await.unwrap();
    }
}
