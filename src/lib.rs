//! cloneset-webhook library crate
//!
//! Admission-time validation for CloneSet workloads: the CRD types, the
//! validation engine, the pod reader it consults, and the HTTPS admission
//! boundary the binary serves.

pub mod client;
pub mod config;
pub mod crd;
pub mod health;
pub mod webhooks;

pub use client::{KubePodReader, LookupError, PodReader, PodRef};
pub use config::{ConfigError, WebhookConfig};
pub use health::HealthState;
pub use webhooks::policies::{
    BasicPodTemplateValidator, InfrastructurePolicy, PodTemplateValidator,
};
pub use webhooks::{
    CloneSetValidator, ErrorKind, ErrorList, FieldError, ValidationContext, ValidationReport,
    WebhookError, WebhookState, run_webhook_server,
};
