//! Validation policies for CloneSet admission webhooks.
//!
//! Policies are organized into tiers:
//! - Tier 1 (Field): Always enforced, one proposed spec at a time
//!   (replicas, selector, template, update strategy, scale targets)
//! - Tier 2 (Update): Only enforced on UPDATE operations (immutability and
//!   in-place update policy)
//!
//! Unlike a fail-fast gate, every policy runs on every request and all
//! violations are collected into a single [`ValidationReport`].

pub mod immutability;
pub mod replicas;
pub mod scale_strategy;
pub mod selector;
pub mod template;
pub mod update_strategy;

use std::fmt;
use std::sync::Arc;

use tokio::time::Instant;
use tracing::debug;

use crate::client::PodReader;
use crate::crd::CloneSet;

pub use scale_strategy::InfrastructurePolicy;
pub use template::{BasicPodTemplateValidator, PodTemplateValidator};

/// Classification of a validation failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// A numeric bound was violated.
    ValueRange,
    /// A value could not be parsed or is not a known enum value.
    Format,
    /// A reference to another object is dangling or duplicated.
    Reference,
    /// A field that must not change after creation changed.
    Immutability,
    /// Fields are individually valid but inconsistent with each other.
    PolicyConflict,
    /// The cluster could not be consulted (timeout, connectivity).
    Infrastructure,
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::ValueRange => "value-range",
            ErrorKind::Format => "format",
            ErrorKind::Reference => "reference",
            ErrorKind::Immutability => "immutability",
            ErrorKind::PolicyConflict => "policy-conflict",
            ErrorKind::Infrastructure => "infrastructure",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single violation, located by a dotted path relative to the spec root.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldError {
    pub field: String,
    pub kind: ErrorKind,
    pub message: String,
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Ordered accumulator of field errors.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ErrorList(Vec<FieldError>);

impl ErrorList {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a violation.
    pub fn push(&mut self, field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) {
        self.0.push(FieldError {
            field: field.into(),
            kind,
            message: message.into(),
        });
    }

    /// Append every error from `other`.
    pub fn extend(&mut self, other: ErrorList) {
        self.0.extend(other.0);
    }

    /// Append every error from `other`, re-rooting each field path under `prefix`.
    pub fn extend_prefixed(&mut self, prefix: &str, other: ErrorList) {
        self.0.extend(other.0.into_iter().map(|mut e| {
            e.field = if e.field.is_empty() {
                prefix.to_string()
            } else if e.field.starts_with('[') {
                format!("{}{}", prefix, e.field)
            } else {
                format!("{}.{}", prefix, e.field)
            };
            e
        }));
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, FieldError> {
        self.0.iter()
    }

    /// Whether any error of `kind` was recorded.
    pub fn has_kind(&self, kind: ErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind)
    }

    /// Whether any error of `kind` was recorded on `field`.
    pub fn has(&self, field: &str, kind: ErrorKind) -> bool {
        self.0.iter().any(|e| e.kind == kind && e.field == field)
    }

    pub fn into_vec(self) -> Vec<FieldError> {
        self.0
    }
}

impl<'a> IntoIterator for &'a ErrorList {
    type Item = &'a FieldError;
    type IntoIter = std::slice::Iter<'a, FieldError>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}

impl fmt::Display for ErrorList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, e) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", e)?;
        }
        Ok(())
    }
}

/// Outcome of validating one admission request.
///
/// Policy violations and infrastructure failures are kept apart so the
/// admission boundary can answer them differently.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ValidationReport {
    /// Violations of the declared configuration. Stable across retries.
    pub violations: ErrorList,
    /// Failures to consult the cluster. May clear on retry.
    pub infrastructure: ErrorList,
}

impl ValidationReport {
    /// Whether the object may be admitted.
    pub fn is_allowed(&self) -> bool {
        self.violations.is_empty() && self.infrastructure.is_empty()
    }

    /// Record a violation or an infrastructure failure, routed by kind.
    pub fn push(&mut self, field: impl Into<String>, kind: ErrorKind, message: impl Into<String>) {
        match kind {
            ErrorKind::Infrastructure => self.infrastructure.push(field, kind, message),
            _ => self.violations.push(field, kind, message),
        }
    }

    pub fn merge(&mut self, other: ValidationReport) {
        self.violations.extend(other.violations);
        self.infrastructure.extend(other.infrastructure);
    }
}

/// Context for validation
pub struct ValidationContext<'a> {
    /// The resource being validated
    pub resource: &'a CloneSet,
    /// The old resource (for UPDATE operations)
    pub old_resource: Option<&'a CloneSet>,
    /// The namespace of the resource
    pub namespace: &'a str,
    /// Point in time after which cluster lookups are abandoned
    pub deadline: Instant,
}

impl<'a> ValidationContext<'a> {
    /// Check if this is an UPDATE operation
    pub fn is_update(&self) -> bool {
        self.old_resource.is_some()
    }
}

/// The validation engine.
///
/// Holds only read-only collaborators, so one instance can serve any number
/// of concurrent requests.
#[derive(Clone)]
pub struct CloneSetValidator {
    pods: Arc<dyn PodReader>,
    templates: Arc<dyn PodTemplateValidator>,
    infrastructure_policy: InfrastructurePolicy,
}

impl CloneSetValidator {
    pub fn new(
        pods: Arc<dyn PodReader>,
        templates: Arc<dyn PodTemplateValidator>,
        infrastructure_policy: InfrastructurePolicy,
    ) -> Self {
        Self {
            pods,
            templates,
            infrastructure_policy,
        }
    }

    /// Validate a proposed object on CREATE.
    pub async fn validate_create(&self, ctx: &ValidationContext<'_>) -> ValidationReport {
        let spec = &ctx.resource.spec;

        // Tier 1: field policies, in declaration order
        let mut report = ValidationReport::default();
        report.violations.extend(validate_spec(spec, self.templates.as_ref()));
        scale_strategy::validate(
            &spec.scale_strategy.pods_to_delete,
            ctx.namespace,
            ctx.resource.metadata.uid.as_deref(),
            self.pods.as_ref(),
            &self.infrastructure_policy,
            ctx.deadline,
            &mut report,
        )
        .await;

        debug!(
            namespace = %ctx.namespace,
            violations = report.violations.len(),
            infrastructure = report.infrastructure.len(),
            "Field validation complete"
        );
        report
    }

    /// Validate a proposed object against the stored one on UPDATE.
    ///
    /// Falls back to CREATE validation when no old object is present.
    pub async fn validate_update(&self, ctx: &ValidationContext<'_>) -> ValidationReport {
        let mut report = self.validate_create(ctx).await;

        // Tier 2: update validations
        if let Some(old) = ctx.old_resource {
            report
                .violations
                .extend(immutability::validate(&ctx.resource.spec, &old.spec));
        }
        report
    }

    /// Dispatch on the presence of an old object.
    pub async fn validate(&self, ctx: &ValidationContext<'_>) -> ValidationReport {
        if ctx.is_update() {
            self.validate_update(ctx).await
        } else {
            self.validate_create(ctx).await
        }
    }
}

/// Run every check that needs nothing but the proposed spec.
pub fn validate_spec(
    spec: &crate::crd::CloneSetSpec,
    templates: &dyn PodTemplateValidator,
) -> ErrorList {
    let mut errors = ErrorList::new();
    replicas::validate(spec, &mut errors);
    selector::validate(spec, &mut errors);
    template::validate(&spec.template, templates, &mut errors);
    update_strategy::validate(&spec.update_strategy, &mut errors);
    errors
}
