//! Pod template validation policy.
//!
//! Tier 1 (Field): Always enforced
//!
//! Structural pod validation is an injected capability
//! ([`PodTemplateValidator`]). This policy only invokes it and re-roots the
//! returned field paths under `template`. [`BasicPodTemplateValidator`] is the
//! implementation the webhook binary ships with.

use std::collections::{BTreeMap, HashSet};
use std::sync::LazyLock;

use k8s_openapi::api::core::v1::{Container, PodTemplateSpec, ResourceRequirements};
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;

use super::selector::validate_labels;
use super::{ErrorKind, ErrorList};

/// Maximum length of a DNS-1123 label (container names)
const DNS_LABEL_MAX_LENGTH: usize = 63;

const IMAGE_PULL_POLICIES: [&str; 3] = ["Always", "IfNotPresent", "Never"];
const RESTART_POLICIES: [&str; 3] = ["Always", "OnFailure", "Never"];
const DNS_POLICIES: [&str; 4] = ["ClusterFirstWithHostNet", "ClusterFirst", "Default", "None"];

/// Structural validation of a pod template.
///
/// Field paths in the returned list are relative to the template root
/// (e.g. `metadata.labels`, `spec.containers[0].image`).
pub trait PodTemplateValidator: Send + Sync {
    fn validate(&self, template: &PodTemplateSpec) -> ErrorList;
}

/// Run the structural validator and fold its errors in under `template`
pub fn validate(
    template: &PodTemplateSpec,
    validator: &dyn PodTemplateValidator,
    errors: &mut ErrorList,
) {
    errors.extend_prefixed("template", validator.validate(template));
}

/// Default structural checks for pod templates.
#[derive(Clone, Copy, Debug, Default)]
pub struct BasicPodTemplateValidator;

impl PodTemplateValidator for BasicPodTemplateValidator {
    fn validate(&self, template: &PodTemplateSpec) -> ErrorList {
        let mut errors = ErrorList::new();

        if let Some(labels) = template.metadata.as_ref().and_then(|m| m.labels.as_ref()) {
            validate_labels(labels, "metadata.labels", &mut errors);
        }

        let Some(spec) = template.spec.as_ref() else {
            errors.push("spec", ErrorKind::Format, "Required value");
            return errors;
        };

        if spec.containers.is_empty() {
            errors.push("spec.containers", ErrorKind::Format, "Required value");
        }
        let mut seen = HashSet::new();
        for (i, container) in spec.containers.iter().enumerate() {
            let path = format!("spec.containers[{}]", i);
            validate_container(container, &path, &mut errors);
            if !seen.insert(container.name.as_str()) {
                errors.push(
                    format!("{}.name", path),
                    ErrorKind::Format,
                    format!("Duplicate value: \"{}\"", container.name),
                );
            }
        }

        if let Some(policy) = spec.restart_policy.as_deref() {
            check_supported(policy, &RESTART_POLICIES, "spec.restartPolicy", &mut errors);
        }
        if let Some(policy) = spec.dns_policy.as_deref() {
            check_supported(policy, &DNS_POLICIES, "spec.dnsPolicy", &mut errors);
        }

        errors
    }
}

fn validate_container(container: &Container, path: &str, errors: &mut ErrorList) {
    if container.name.is_empty() {
        errors.push(format!("{}.name", path), ErrorKind::Format, "Required value");
    } else if container.name.len() > DNS_LABEL_MAX_LENGTH || !is_dns_label(&container.name) {
        errors.push(
            format!("{}.name", path),
            ErrorKind::Format,
            format!(
                "Invalid value: \"{}\": must be a lowercase RFC 1123 label of at most {} characters",
                container.name, DNS_LABEL_MAX_LENGTH
            ),
        );
    }

    if container.image.as_deref().is_none_or(|i| i.trim().is_empty()) {
        errors.push(format!("{}.image", path), ErrorKind::Format, "Required value");
    }

    if let Some(policy) = container.image_pull_policy.as_deref() {
        check_supported(
            policy,
            &IMAGE_PULL_POLICIES,
            &format!("{}.imagePullPolicy", path),
            errors,
        );
    }

    if let Some(resources) = &container.resources {
        validate_resources(resources, &format!("{}.resources", path), errors);
    }
}

fn validate_resources(resources: &ResourceRequirements, path: &str, errors: &mut ErrorList) {
    let sections: [(&str, &Option<BTreeMap<String, Quantity>>); 2] =
        [("requests", &resources.requests), ("limits", &resources.limits)];
    for (section, quantities) in sections {
        for (name, quantity) in quantities.iter().flatten() {
            if !is_valid_quantity(&quantity.0) {
                errors.push(
                    format!("{}.{}[{}]", path, section, name),
                    ErrorKind::Format,
                    format!(
                        "invalid quantity '{}'. Expected format: <number><suffix> (e.g., 100m, 0.5, 256Mi)",
                        quantity.0
                    ),
                );
            }
        }
    }
}

fn check_supported(value: &str, supported: &[&str], field: &str, errors: &mut ErrorList) {
    if !supported.contains(&value) {
        errors.push(
            field,
            ErrorKind::Format,
            format!(
                "Unsupported value: \"{}\": supported values: {}",
                value,
                supported
                    .iter()
                    .map(|s| format!("\"{}\"", s))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }
}

/// Check if a string is a valid DNS-1123 label
fn is_dns_label(s: &str) -> bool {
    static LABEL_RE: LazyLock<Option<regex::Regex>> =
        LazyLock::new(|| regex::Regex::new(r"^[a-z0-9]([-a-z0-9]*[a-z0-9])?$").ok());
    LABEL_RE.as_ref().is_some_and(|re| re.is_match(s))
}

/// Check if a resource quantity string is valid
fn is_valid_quantity(quantity: &str) -> bool {
    // Pattern: signed decimal followed by a binary SI, decimal SI or exponent suffix
    static QUANTITY_RE: LazyLock<Option<regex::Regex>> = LazyLock::new(|| {
        regex::Regex::new(
            r"^[+-]?([0-9]+(\.[0-9]*)?|\.[0-9]+)(Ki|Mi|Gi|Ti|Pi|Ei|m|k|M|G|T|P|E|[eE][+-]?[0-9]+)?$",
        )
        .ok()
    });
    QUANTITY_RE.as_ref().is_some_and(|re| re.is_match(quantity))
}
