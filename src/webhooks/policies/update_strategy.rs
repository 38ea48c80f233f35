//! Update strategy validation policy.
//!
//! Tier 1 (Field): Always enforced
//!
//! Validates:
//! - `type` is one of Recreate, InPlaceIfPossible, InPlaceOnly
//! - `partition` is not negative
//! - `maxUnavailable` is at least 1, or a parseable non-negative percentage
//! - every `priorityStrategy.weightPriority` selector is well formed
//!
//! Percentages above 100% are accepted; they cannot stall an update.
//!
//! Also defines the update order that `priorityStrategy` implies.

use std::cmp::Ordering;

use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use super::selector::{CompiledSelector, validate_selector_syntax};
use super::{ErrorKind, ErrorList};
use crate::client::PodRef;
use crate::crd::{CloneSetUpdateStrategy, UpdatePriorityStrategy, UpdateStrategyType};

/// Smallest absolute maxUnavailable that lets an update make progress
pub const MIN_MAX_UNAVAILABLE: i32 = 1;

/// Validate the update strategy
pub fn validate(strategy: &CloneSetUpdateStrategy, errors: &mut ErrorList) {
    if strategy.strategy_type().is_err() {
        errors.push(
            "updateStrategy.type",
            ErrorKind::Format,
            format!(
                "Unsupported value: \"{}\": supported values: {}",
                strategy.type_,
                UpdateStrategyType::ALL
                    .iter()
                    .map(|t| format!("\"{}\"", t))
                    .collect::<Vec<_>>()
                    .join(", ")
            ),
        );
    }

    if let Some(partition) = strategy.partition
        && partition < 0
    {
        errors.push(
            "updateStrategy.partition",
            ErrorKind::ValueRange,
            format!("must be greater than or equal to 0 (got {})", partition),
        );
    }

    if let Some(max_unavailable) = &strategy.max_unavailable {
        validate_max_unavailable(max_unavailable, errors);
    }

    if let Some(priority) = &strategy.priority_strategy {
        for (i, term) in priority.weight_priority.iter().enumerate() {
            validate_selector_syntax(
                &term.match_selector,
                &format!("updateStrategy.priorityStrategy.weightPriority[{}].matchSelector", i),
                errors,
            );
        }
    }
}

fn validate_max_unavailable(value: &IntOrString, errors: &mut ErrorList) {
    const FIELD: &str = "updateStrategy.maxUnavailable";
    match value {
        IntOrString::Int(count) => {
            if *count < MIN_MAX_UNAVAILABLE {
                errors.push(
                    FIELD,
                    ErrorKind::ValueRange,
                    format!(
                        "must be at least {} so the update can make progress (got {})",
                        MIN_MAX_UNAVAILABLE, count
                    ),
                );
            }
        }
        IntOrString::String(raw) => match parse_percent(raw) {
            Some(percent) if percent < 0 => errors.push(
                FIELD,
                ErrorKind::ValueRange,
                format!("percentage must not be negative (got {})", raw),
            ),
            Some(_) => {}
            None => errors.push(
                FIELD,
                ErrorKind::Format,
                format!("invalid value \"{}\": must be an integer or a percentage like \"25%\"", raw),
            ),
        },
    }
}

/// Parse `"<int>%"`. Returns `None` when the string is not a percentage.
pub fn parse_percent(raw: &str) -> Option<i64> {
    raw.strip_suffix('%')?.parse::<i64>().ok()
}

impl UpdatePriorityStrategy {
    /// Update priority of a pod: the summed weight of every matching term.
    ///
    /// `None` when no term matches. Terms whose selector does not compile never match.
    pub fn priority(&self, pod: &PodRef) -> Option<i64> {
        self.weight_priority
            .iter()
            .filter(|term| {
                CompiledSelector::compile(&term.match_selector)
                    .is_ok_and(|selector| selector.matches(&pod.labels))
            })
            .map(|term| i64::from(term.weight))
            .reduce(|a, b| a + b)
    }

    /// Order two pods for update: higher priority first, unmatched last, then by name.
    pub fn compare(&self, a: &PodRef, b: &PodRef) -> Ordering {
        order((self.priority(a), &a.name), (self.priority(b), &b.name))
    }

    /// Sort pods into the order they should be updated.
    pub fn sort_pods(&self, pods: &mut [PodRef]) {
        // Priorities are computed once per pod, not once per comparison
        let mut keyed: Vec<(Option<i64>, PodRef)> = pods
            .iter()
            .map(|pod| (self.priority(pod), pod.clone()))
            .collect();
        keyed.sort_by(|(pa, a), (pb, b)| order((*pa, &a.name), (*pb, &b.name)));
        for (slot, (_, pod)) in pods.iter_mut().zip(keyed) {
            *slot = pod;
        }
    }
}

fn order(a: (Option<i64>, &str), b: (Option<i64>, &str)) -> Ordering {
    let by_priority = match (a.0, b.0) {
        (Some(pa), Some(pb)) => pb.cmp(&pa),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    };
    by_priority.then_with(|| a.1.cmp(b.1))
}
