//! Admission webhook server.
//!
//! Provides the HTTPS endpoint the API server calls for CloneSet admission.
//!
//! To enable the webhook:
//! 1. Deploy cert-manager for TLS certificates
//! 2. Create a ValidatingWebhookConfiguration pointing at `/validate-cloneset`
//! 3. Mount the TLS certificate secret to the webhook pod at /etc/webhook/certs/

use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use axum::{Json, Router, extract::State, http::StatusCode, response::IntoResponse, routing::post};
use axum_server::tls_rustls::RustlsConfig;
use kube::Resource;
use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::crd::CloneSet;
use crate::health::HealthState;
use crate::webhooks::policies::{CloneSetValidator, ValidationContext, ValidationReport};

/// Deny reason for configuration that violates policy
pub const REASON_INVALID: &str = "Invalid";
/// Deny reason when the cluster could not be consulted
pub const REASON_UPSTREAM_UNAVAILABLE: &str = "UpstreamUnavailable";

/// Shared state for webhook handlers
pub struct WebhookState {
    pub validator: CloneSetValidator,
    /// Optional health state for admission metrics
    pub health_state: Option<Arc<HealthState>>,
    /// Budget for cluster lookups within one request
    pub lookup_timeout: Duration,
}

impl WebhookState {
    pub fn new(
        validator: CloneSetValidator,
        health_state: Option<Arc<HealthState>>,
        lookup_timeout: Duration,
    ) -> Self {
        Self {
            validator,
            health_state,
            lookup_timeout,
        }
    }

    fn record_admission(&self, operation: &Operation, result: &str) {
        if let Some(state) = &self.health_state {
            state.metrics.record_admission(operation_name(operation), result);
        }
    }
}

fn operation_name(operation: &Operation) -> &'static str {
    match operation {
        Operation::Create => "CREATE",
        Operation::Update => "UPDATE",
        Operation::Delete => "DELETE",
        Operation::Connect => "CONNECT",
    }
}

/// Decide the deny reason and message for a report.
///
/// Returns `None` when the object may be admitted. Any infrastructure error
/// makes the reason [`REASON_UPSTREAM_UNAVAILABLE`] so callers know a retry
/// may succeed; policy violations are still listed alongside.
pub fn denial(report: &ValidationReport) -> Option<(&'static str, String)> {
    if report.is_allowed() {
        return None;
    }
    let reason = if report.infrastructure.is_empty() {
        REASON_INVALID
    } else {
        REASON_UPSTREAM_UNAVAILABLE
    };
    let message = report
        .violations
        .iter()
        .chain(report.infrastructure.iter())
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ");
    Some((reason, message))
}

/// Create a denial response with reason embedded in message.
/// kube-rs deny() only sets status.message, so we format as "[reason] message"
fn deny_with_reason<T: Resource<DynamicType = ()>>(
    request: &AdmissionRequest<T>,
    message: &str,
    reason: &str,
) -> AdmissionReview<kube::core::DynamicObject> {
    let full_message = format!("[{}] {}", reason, message);
    AdmissionResponse::from(request)
        .deny(full_message)
        .into_review()
}

/// Create the webhook router
pub fn create_webhook_router(state: Arc<WebhookState>) -> Router {
    Router::new()
        .route("/validate-cloneset", post(validate_cloneset))
        .with_state(state)
}

/// CloneSet validating admission handler
async fn validate_cloneset(
    State(state): State<Arc<WebhookState>>,
    Json(review): Json<AdmissionReview<CloneSet>>,
) -> impl IntoResponse {
    let request: AdmissionRequest<CloneSet> = match review.try_into() {
        Ok(req) => req,
        Err(e) => {
            error!(error = %e, "Failed to extract admission request");
            return (
                StatusCode::BAD_REQUEST,
                Json(
                    AdmissionResponse::invalid(format!("Invalid AdmissionReview: {}", e))
                        .into_review(),
                ),
            );
        }
    };

    let uid = &request.uid;
    debug!(
        uid = %uid,
        operation = ?request.operation,
        namespace = ?request.namespace,
        name = ?request.name,
        "Processing admission request"
    );

    // DELETE and CONNECT carry nothing to validate
    if matches!(request.operation, Operation::Delete | Operation::Connect) {
        info!(uid = %uid, operation = ?request.operation, "Admission request allowed");
        state.record_admission(&request.operation, "allowed");
        return (
            StatusCode::OK,
            Json(AdmissionResponse::from(&request).into_review()),
        );
    }

    let Some(resource) = request.object.as_ref() else {
        error!(uid = %uid, "Missing object in request");
        state.record_admission(&request.operation, "denied");
        return (
            StatusCode::OK,
            Json(deny_with_reason(
                &request,
                "Missing object in request",
                "InvalidRequest",
            )),
        );
    };

    // An UPDATE without an old object is validated as a create
    let old_resource = match request.operation {
        Operation::Update => request.old_object.as_ref(),
        _ => None,
    };
    let namespace = request
        .namespace
        .clone()
        .or_else(|| resource.metadata.namespace.clone())
        .unwrap_or_default();

    let ctx = ValidationContext {
        resource,
        old_resource,
        namespace: &namespace,
        deadline: Instant::now() + state.lookup_timeout,
    };
    let report = state.validator.validate(&ctx).await;
    if let Some(health) = &state.health_state {
        health.metrics.record_report(&report);
    }

    if let Some((reason, message)) = denial(&report) {
        warn!(uid = %uid, reason = %reason, message = %message, "Admission request denied");
        state.record_admission(&request.operation, "denied");
        return (
            StatusCode::OK,
            Json(deny_with_reason(&request, &message, reason)),
        );
    }

    info!(uid = %uid, "Admission request allowed");
    state.record_admission(&request.operation, "allowed");
    (
        StatusCode::OK,
        Json(AdmissionResponse::from(&request).into_review()),
    )
}

/// Errors that can occur when running the webhook server
#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("TLS configuration error: {0}")]
    TlsConfig(String),

    #[error("Webhook server error: {0}")]
    Server(String),
}

/// Run the webhook server with TLS on `0.0.0.0:<port>`
///
/// Certificates are PEM files. Returns when `handle` is told to shut down.
pub async fn run_webhook_server(
    state: Arc<WebhookState>,
    port: u16,
    cert_path: &Path,
    key_path: &Path,
    handle: axum_server::Handle,
) -> Result<(), WebhookError> {
    let app = create_webhook_router(state);

    let config = RustlsConfig::from_pem_file(cert_path, key_path)
        .await
        .map_err(|e| WebhookError::TlsConfig(e.to_string()))?;

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    info!(port, "Webhook server listening with TLS");

    axum_server::bind_rustls(addr, config)
        .handle(handle)
        .serve(app.into_make_service())
        .await
        .map_err(|e| WebhookError::Server(e.to_string()))?;

    Ok(())
}
