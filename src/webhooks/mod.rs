//! Webhook module for validating CloneSet admission requests.
//!
//! Validation policies are organized in tiers:
//! - Tier 1 (Field): Always enforced (replicas, selector, template, strategies)
//! - Tier 2 (Update): Only on UPDATE operations (immutability, in-place diff)

pub mod policies;
mod server;

pub use policies::{
    CloneSetValidator, ErrorKind, ErrorList, FieldError, ValidationContext, ValidationReport,
};
pub use server::{
    REASON_INVALID, REASON_UPSTREAM_UNAVAILABLE, WebhookError, WebhookState,
    create_webhook_router, denial, run_webhook_server,
};

// Re-export kube-rs admission types for contract testing
pub use kube::core::admission::{AdmissionRequest, AdmissionResponse, AdmissionReview, Operation};
