//! Replica count validation policy.
//!
//! Tier 1 (Field): Always enforced
//!
//! Validates:
//! - `replicas`, when set, is not negative
//! - `revisionHistoryLimit`, when set, is not negative

use super::{ErrorKind, ErrorList};
use crate::crd::CloneSetSpec;

/// Validate replica-style counters on the spec
pub fn validate(spec: &CloneSetSpec, errors: &mut ErrorList) {
    if let Some(replicas) = spec.replicas
        && replicas < 0
    {
        errors.push(
            "replicas",
            ErrorKind::ValueRange,
            format!("must be greater than or equal to 0 (got {})", replicas),
        );
    }

    if let Some(limit) = spec.revision_history_limit
        && limit < 0
    {
        errors.push(
            "revisionHistoryLimit",
            ErrorKind::ValueRange,
            format!("must be greater than or equal to 0 (got {})", limit),
        );
    }
}
