//! Selector validation policy.
//!
//! Tier 1 (Field): Always enforced
//!
//! Validates:
//! - Selector syntax (label keys, values, expression operators)
//! - The selector is not empty
//! - The selector matches the template's own labels
//!
//! Also provides the label-syntax checks and selector compilation shared with
//! the template and update-priority policies.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::LazyLock;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use thiserror::Error;

use super::{ErrorKind, ErrorList};
use crate::crd::CloneSetSpec;

/// Maximum length of a label name (the part after an optional prefix) and of a label value
const LABEL_NAME_MAX_LENGTH: usize = 63;

/// Maximum length of a label key prefix (a DNS subdomain)
const LABEL_PREFIX_MAX_LENGTH: usize = 253;

/// Validate the CloneSet selector against its template
pub fn validate(spec: &CloneSetSpec, errors: &mut ErrorList) {
    let Some(selector) = spec.selector.as_ref() else {
        errors.push(
            "selector",
            ErrorKind::PolicyConflict,
            "selector is required: a CloneSet must select its own pods",
        );
        return;
    };

    let before = errors.len();
    validate_selector_syntax(selector, "selector", errors);
    if errors.len() > before {
        // A malformed selector cannot be compiled or compared
        return;
    }

    if is_empty(selector) {
        errors.push(
            "selector",
            ErrorKind::PolicyConflict,
            "empty selector is invalid: a CloneSet must select its own pods",
        );
        return;
    }

    let empty = BTreeMap::new();
    let labels = spec
        .template
        .metadata
        .as_ref()
        .and_then(|m| m.labels.as_ref())
        .unwrap_or(&empty);

    match CompiledSelector::compile(selector) {
        Ok(compiled) if !compiled.matches(labels) => errors.push(
            "template.metadata.labels",
            ErrorKind::PolicyConflict,
            format!(
                "selector \"{}\" does not match template labels \"{}\"",
                compiled,
                format_labels(labels)
            ),
        ),
        Ok(_) => {}
        Err(e) => errors.push("selector", ErrorKind::Format, e.to_string()),
    }
}

/// Whether a selector has neither labels nor expressions.
pub fn is_empty(selector: &LabelSelector) -> bool {
    selector.match_labels.as_ref().is_none_or(|m| m.is_empty())
        && selector
            .match_expressions
            .as_ref()
            .is_none_or(|e| e.is_empty())
}

/// Check a label selector's syntax, recording errors under `field`.
pub fn validate_selector_syntax(selector: &LabelSelector, field: &str, errors: &mut ErrorList) {
    if let Some(match_labels) = &selector.match_labels {
        validate_labels(match_labels, &format!("{}.matchLabels", field), errors);
    }

    for (i, req) in selector
        .match_expressions
        .iter()
        .flatten()
        .enumerate()
    {
        let path = format!("{}.matchExpressions[{}]", field, i);
        validate_label_key(&req.key, &format!("{}.key", path), errors);

        let values = req.values.as_deref().unwrap_or_default();
        match req.operator.as_str() {
            "In" | "NotIn" => {
                if values.is_empty() {
                    errors.push(
                        format!("{}.values", path),
                        ErrorKind::Format,
                        format!("must be specified when operator is {}", req.operator),
                    );
                }
                for (j, value) in values.iter().enumerate() {
                    validate_label_value(value, &format!("{}.values[{}]", path, j), errors);
                }
            }
            "Exists" | "DoesNotExist" => {
                if !values.is_empty() {
                    errors.push(
                        format!("{}.values", path),
                        ErrorKind::Format,
                        format!("may not be specified when operator is {}", req.operator),
                    );
                }
            }
            other => errors.push(
                format!("{}.operator", path),
                ErrorKind::Format,
                format!(
                    "unsupported operator \"{}\": supported values: \"In\", \"NotIn\", \"Exists\", \"DoesNotExist\"",
                    other
                ),
            ),
        }
    }
}

/// Check every key and value of a label map.
pub fn validate_labels(labels: &BTreeMap<String, String>, field: &str, errors: &mut ErrorList) {
    for (key, value) in labels {
        validate_label_key(key, field, errors);
        validate_label_value(value, field, errors);
    }
}

/// Check that `key` is a qualified name: `[prefix/]name`.
pub fn validate_label_key(key: &str, field: &str, errors: &mut ErrorList) {
    let (prefix, name) = match key.split_once('/') {
        Some((prefix, name)) => (Some(prefix), name),
        None => (None, key),
    };

    if let Some(prefix) = prefix {
        if prefix.is_empty() || prefix.len() > LABEL_PREFIX_MAX_LENGTH || !is_dns_subdomain(prefix)
        {
            errors.push(
                field,
                ErrorKind::Format,
                format!(
                    "invalid label key \"{}\": prefix must be a DNS subdomain of at most {} characters",
                    key, LABEL_PREFIX_MAX_LENGTH
                ),
            );
            return;
        }
    }

    if name.is_empty() || name.len() > LABEL_NAME_MAX_LENGTH || !is_label_name(name) {
        errors.push(
            field,
            ErrorKind::Format,
            format!(
                "invalid label key \"{}\": name must be at most {} characters of alphanumerics, '-', '_' or '.', starting and ending with an alphanumeric",
                key, LABEL_NAME_MAX_LENGTH
            ),
        );
    }
}

/// Check that `value` is empty or a valid label value.
pub fn validate_label_value(value: &str, field: &str, errors: &mut ErrorList) {
    if value.is_empty() {
        return;
    }
    if value.len() > LABEL_NAME_MAX_LENGTH || !is_label_name(value) {
        errors.push(
            field,
            ErrorKind::Format,
            format!(
                "invalid label value \"{}\": must be at most {} characters of alphanumerics, '-', '_' or '.', starting and ending with an alphanumeric",
                value, LABEL_NAME_MAX_LENGTH
            ),
        );
    }
}

/// Check if a string is a valid label name or value
fn is_label_name(s: &str) -> bool {
    // Pattern: ^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$
    static LABEL_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(r"^([A-Za-z0-9][-A-Za-z0-9_.]*)?[A-Za-z0-9]$").ok()
    });
    LABEL_RE.as_ref().is_some_and(|re| re.is_match(s))
}

/// Check if a string is a valid DNS-1123 subdomain
pub(crate) fn is_dns_subdomain(s: &str) -> bool {
    static SUBDOMAIN_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?(\.[a-z0-9]([-a-z0-9]*[a-z0-9])?)*$")
            .ok()
    });
    SUBDOMAIN_RE.as_ref().is_some_and(|re| re.is_match(s))
}

fn format_labels(labels: &BTreeMap<String, String>) -> String {
    labels
        .iter()
        .map(|(k, v)| format!("{}={}", k, v))
        .collect::<Vec<_>>()
        .join(",")
}

/// One AND-ed term of a compiled selector.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Requirement {
    Equals(String, String),
    In(String, BTreeSet<String>),
    NotIn(String, BTreeSet<String>),
    Exists(String),
    DoesNotExist(String),
}

impl Requirement {
    fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        match self {
            Requirement::Equals(key, value) => labels.get(key) == Some(value),
            Requirement::In(key, values) => labels.get(key).is_some_and(|v| values.contains(v)),
            Requirement::NotIn(key, values) => labels.get(key).is_none_or(|v| !values.contains(v)),
            Requirement::Exists(key) => labels.contains_key(key),
            Requirement::DoesNotExist(key) => !labels.contains_key(key),
        }
    }
}

impl fmt::Display for Requirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let join = |values: &BTreeSet<String>| {
            values.iter().map(String::as_str).collect::<Vec<_>>().join(",")
        };
        match self {
            Requirement::Equals(key, value) => write!(f, "{}={}", key, value),
            Requirement::In(key, values) => write!(f, "{} in ({})", key, join(values)),
            Requirement::NotIn(key, values) => write!(f, "{} notin ({})", key, join(values)),
            Requirement::Exists(key) => write!(f, "{}", key),
            Requirement::DoesNotExist(key) => write!(f, "!{}", key),
        }
    }
}

/// Failure to turn a label selector into a predicate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SelectorError {
    #[error("unsupported selector operator \"{0}\"")]
    UnsupportedOperator(String),
}

/// A label selector turned into a predicate over label maps.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CompiledSelector {
    requirements: Vec<Requirement>,
}

impl CompiledSelector {
    /// Compile a selector. Fails only on an unknown operator.
    pub fn compile(selector: &LabelSelector) -> Result<Self, SelectorError> {
        let mut requirements: Vec<Requirement> = selector
            .match_labels
            .iter()
            .flatten()
            .map(|(k, v)| Requirement::Equals(k.clone(), v.clone()))
            .collect();

        for req in selector.match_expressions.iter().flatten() {
            let values: BTreeSet<String> = req.values.iter().flatten().cloned().collect();
            let key = req.key.clone();
            requirements.push(match req.operator.as_str() {
                "In" => Requirement::In(key, values),
                "NotIn" => Requirement::NotIn(key, values),
                "Exists" => Requirement::Exists(key),
                "DoesNotExist" => Requirement::DoesNotExist(key),
                other => return Err(SelectorError::UnsupportedOperator(other.to_string())),
            });
        }

        Ok(Self { requirements })
    }

    /// Whether every requirement holds for `labels`. An empty selector matches everything.
    pub fn matches(&self, labels: &BTreeMap<String, String>) -> bool {
        self.requirements.iter().all(|r| r.matches(labels))
    }
}

impl fmt::Display for CompiledSelector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.requirements.iter().map(|r| r.to_string()).collect();
        f.write_str(&parts.join(","))
    }
}
