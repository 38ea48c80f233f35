//! Immutability validation policy.
//!
//! Tier 2 (Update): Only enforced on UPDATE operations
//!
//! Validates:
//! - `selector` never changes after creation
//! - `revisionHistoryLimit` never changes once set on both sides
//! - Under `InPlaceOnly`, the pod template only changes in fields that can be
//!   updated without recreating the pod (container images)

use std::collections::BTreeSet;
use std::sync::LazyLock;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use serde::Serialize;
use serde_json::Value;

use super::{ErrorKind, ErrorList};
use crate::crd::{CloneSetSpec, UpdateStrategyType};

/// Validate an update of `old` into `new`
pub fn validate(new: &CloneSetSpec, old: &CloneSetSpec) -> ErrorList {
    let mut errors = ErrorList::new();

    match value_diff(&old.selector, &new.selector) {
        Ok(changed) if !changed.is_empty() => errors.push(
            "selector",
            ErrorKind::Immutability,
            "field is immutable",
        ),
        Ok(_) => {}
        Err(e) => errors.push(
            "selector",
            ErrorKind::Format,
            format!("unable to compare selectors: {}", e),
        ),
    }

    if let (Some(new_limit), Some(old_limit)) =
        (new.revision_history_limit, old.revision_history_limit)
        && new_limit != old_limit
    {
        errors.push(
            "revisionHistoryLimit",
            ErrorKind::Immutability,
            format!("field is immutable (was {}, got {})", old_limit, new_limit),
        );
    }

    // An unknown type is already reported by the update strategy policy
    match new.update_strategy.strategy_type() {
        Ok(UpdateStrategyType::InPlaceOnly) => {
            validate_in_place_template(&old.template, &new.template, &mut errors)
        }
        Ok(UpdateStrategyType::InPlaceIfPossible | UpdateStrategyType::Recreate) | Err(_) => {}
    }

    errors
}

fn validate_in_place_template(
    old: &PodTemplateSpec,
    new: &PodTemplateSpec,
    errors: &mut ErrorList,
) {
    let diff = match template_diff(old, new) {
        Ok(diff) => diff,
        Err(e) => {
            errors.push(
                "template",
                ErrorKind::Format,
                format!("unable to compare templates: {}", e),
            );
            return;
        }
    };

    let disallowed: Vec<&str> = diff.disallowed_in_place().collect();
    if !disallowed.is_empty() {
        errors.push(
            "template",
            ErrorKind::Immutability,
            format!(
                "only container images may be changed when updateStrategy.type is {} (disallowed changes: {})",
                UpdateStrategyType::InPlaceOnly,
                disallowed.join(", ")
            ),
        );
    }
}

/// Field paths that differ between two pod templates.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TemplateDiff {
    /// Dotted paths rooted at the template, e.g. `spec.containers[0].image`
    pub changed: Vec<String>,
}

impl TemplateDiff {
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty()
    }

    /// Changed paths that cannot be applied to a running pod.
    pub fn disallowed_in_place(&self) -> impl Iterator<Item = &str> {
        self.changed
            .iter()
            .map(String::as_str)
            .filter(|path| !is_in_place_updatable(path))
    }

    /// Whether every change can be applied without recreating the pod.
    pub fn in_place_updatable(&self) -> bool {
        self.disallowed_in_place().next().is_none()
    }
}

/// Whether a template field path can be updated in place
fn is_in_place_updatable(path: &str) -> bool {
    static IMAGE_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^spec\.containers\[[0-9]+\]\.image$").ok());
    IMAGE_RE.as_ref().is_some_and(|re| re.is_match(path))
}

/// Compute a structural diff of two pod templates.
///
/// Arrays are compared element by element when their lengths agree; a length
/// change reports the array itself. A missing field, an explicit null, an empty
/// list and an empty map are all the same value.
pub fn template_diff(
    old: &PodTemplateSpec,
    new: &PodTemplateSpec,
) -> Result<TemplateDiff, serde_json::Error> {
    Ok(TemplateDiff {
        changed: value_diff(old, new)?,
    })
}

fn value_diff<T: Serialize>(old: &T, new: &T) -> Result<Vec<String>, serde_json::Error> {
    let old = serde_json::to_value(old)?;
    let new = serde_json::to_value(new)?;
    let mut changed = Vec::new();
    diff_values("", &old, &new, &mut changed);
    Ok(changed)
}

fn is_unset(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        Value::Object(fields) => fields.is_empty(),
        _ => false,
    }
}

fn diff_values(path: &str, old: &Value, new: &Value, changed: &mut Vec<String>) {
    if is_unset(old) && is_unset(new) {
        return;
    }
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let keys: BTreeSet<&String> = a.keys().chain(b.keys()).collect();
            for key in keys {
                let child = if path.is_empty() {
                    key.clone()
                } else {
                    format!("{}.{}", path, key)
                };
                diff_values(
                    &child,
                    a.get(key).unwrap_or(&Value::Null),
                    b.get(key).unwrap_or(&Value::Null),
                    changed,
                );
            }
        }
        (Value::Array(a), Value::Array(b)) if a.len() == b.len() => {
            for (i, (x, y)) in a.iter().zip(b).enumerate() {
                diff_values(&format!("{}[{}]", path, i), x, y, changed);
            }
        }
        _ if old == new => {}
        _ => changed.push(if path.is_empty() {
            "<root>".to_string()
        } else {
            path.to_string()
        }),
    }
}
