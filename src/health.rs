//! Health server for Kubernetes probes and Prometheus metrics.
//!
//! Provides:
//! - `/healthz` - Liveness probe (always returns 200 if server is running)
//! - `/readyz` - Readiness probe (returns 200 when ready to serve admission requests)
//! - `/metrics` - Prometheus metrics endpoint

use std::sync::Arc;

use axum::{
    Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::histogram::{Histogram, exponential_buckets};
use prometheus_client::registry::Registry;
use tokio::sync::RwLock;
use tracing::info;

use crate::webhooks::policies::ValidationReport;

/// Labels for admission request metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AdmissionLabels {
    pub operation: String,
    pub result: String,
}

impl EncodeLabelSet for AdmissionLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("operation", self.operation.as_str()).encode(encoder.encode_label())?;
        ("result", self.result.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for validation error metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct KindLabels {
    pub kind: String,
}

impl EncodeLabelSet for KindLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("kind", self.kind.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for pod lookup metrics
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct OutcomeLabels {
    pub outcome: String,
}

impl EncodeLabelSet for OutcomeLabels {
    fn encode(&self, mut encoder: LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("outcome", self.outcome.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared metrics for the webhook
pub struct Metrics {
    /// Admission requests by operation and result
    pub admission_requests_total: Family<AdmissionLabels, Counter>,
    /// Validation errors by kind
    pub validation_errors_total: Family<KindLabels, Counter>,
    /// Pod lookup latency
    pub pod_lookup_duration_seconds: Family<OutcomeLabels, Histogram>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

impl Metrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let admission_requests_total = Family::<AdmissionLabels, Counter>::default();
        registry.register(
            "cloneset_webhook_admission_requests",
            "Total number of CloneSet admission requests",
            admission_requests_total.clone(),
        );

        let validation_errors_total = Family::<KindLabels, Counter>::default();
        registry.register(
            "cloneset_webhook_validation_errors",
            "Total number of validation errors by kind",
            validation_errors_total.clone(),
        );

        let pod_lookup_duration_seconds =
            Family::<OutcomeLabels, Histogram>::new_with_constructor(|| {
                Histogram::new(exponential_buckets(0.001, 2.0, 15))
            });
        registry.register(
            "cloneset_webhook_pod_lookup_duration_seconds",
            "Duration of pod lookups against the API server in seconds",
            pod_lookup_duration_seconds.clone(),
        );

        Self {
            admission_requests_total,
            validation_errors_total,
            pod_lookup_duration_seconds,
            registry,
        }
    }

    /// Record one admission decision
    pub fn record_admission(&self, operation: &str, result: &str) {
        let labels = AdmissionLabels {
            operation: operation.to_string(),
            result: result.to_string(),
        };
        self.admission_requests_total.get_or_create(&labels).inc();
    }

    /// Count every error in a report by kind
    pub fn record_report(&self, report: &ValidationReport) {
        for error in report.violations.iter().chain(report.infrastructure.iter()) {
            let labels = KindLabels {
                kind: error.kind.as_str().to_string(),
            };
            self.validation_errors_total.get_or_create(&labels).inc();
        }
    }

    /// Record a pod lookup
    pub fn record_pod_lookup(&self, outcome: &str, duration_secs: f64) {
        let labels = OutcomeLabels {
            outcome: outcome.to_string(),
        };
        self.pod_lookup_duration_seconds
            .get_or_create(&labels)
            .observe(duration_secs);
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}

/// Shared state for the health server
pub struct HealthState {
    /// Whether the webhook is ready (TLS loaded and serving)
    ready: RwLock<bool>,
    /// Metrics registry
    pub metrics: Metrics,
}

impl Default for HealthState {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthState {
    /// Create a new health state (starts as not ready)
    pub fn new() -> Self {
        Self {
            ready: RwLock::new(false),
            metrics: Metrics::new(),
        }
    }

    /// Mark the webhook as ready or not ready
    pub async fn set_ready(&self, ready: bool) {
        *self.ready.write().await = ready;
    }

    /// Check if the webhook is ready
    pub async fn is_ready(&self) -> bool {
        *self.ready.read().await
    }
}

/// Liveness probe handler
///
/// Returns 200 OK if the process is alive.
async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

/// Readiness probe handler
///
/// Returns 503 Service Unavailable until the webhook server is up, and again
/// once shutdown has begun.
async fn readyz(State(state): State<Arc<HealthState>>) -> Response {
    if state.is_ready().await {
        (StatusCode::OK, "ready").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "not ready").into_response()
    }
}

/// Metrics handler
async fn metrics_handler(State(state): State<Arc<HealthState>>) -> impl IntoResponse {
    let body = state.metrics.encode();
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}

/// Create the health server router
pub fn create_router(state: Arc<HealthState>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Run the health server on `0.0.0.0:<port>`
pub async fn run_health_server(state: Arc<HealthState>, port: u16) -> Result<(), std::io::Error> {
    let app = create_router(state);

    let addr = std::net::SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Starting health server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
