//! Scale strategy validation policy.
//!
//! Tier 1 (Field): Always enforced
//!
//! Validates that every `scaleStrategy.podsToDelete` entry is a non-empty,
//! unique name of a pod that exists in the object's namespace and is
//! controlled by this CloneSet.
//!
//! This is the only policy that talks to the cluster. A lookup that cannot be
//! answered (timeout, API server down) is reported with
//! [`ErrorKind::Infrastructure`], never as a missing pod.

use std::collections::HashSet;
use std::time::Duration;

use futures::stream::{self, StreamExt};
use tokio::time::{Instant, timeout_at};
use tracing::warn;

use super::{ErrorKind, ValidationReport};
use crate::client::{LookupError, PodReader, PodRef};

/// Upper bound on pod lookups in flight for one request
const MAX_CONCURRENT_LOOKUPS: usize = 8;

/// What to do when the cluster cannot be consulted.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum InfrastructurePolicy {
    /// Fail closed on the first failed lookup
    #[default]
    Deny,
    /// Retry transient failures while the admission deadline allows, then fail closed
    Retry {
        /// Retries after the first failed attempt
        attempts: u32,
        backoff: Duration,
    },
}

impl InfrastructurePolicy {
    fn retries(&self) -> u32 {
        match self {
            InfrastructurePolicy::Deny => 0,
            InfrastructurePolicy::Retry { attempts, .. } => *attempts,
        }
    }

    fn backoff(&self) -> Duration {
        match self {
            InfrastructurePolicy::Deny => Duration::ZERO,
            InfrastructurePolicy::Retry { backoff, .. } => *backoff,
        }
    }
}

enum Entry<'a> {
    Empty,
    Duplicate(&'a str),
    Lookup(&'a str),
}

/// Validate the pods designated for deletion
///
/// `owner_uid` is the UID of the CloneSet. When it is known, every listed pod
/// must name it as its controller.
pub async fn validate(
    pods_to_delete: &[String],
    namespace: &str,
    owner_uid: Option<&str>,
    reader: &dyn PodReader,
    policy: &InfrastructurePolicy,
    deadline: Instant,
    report: &mut ValidationReport,
) {
    let mut seen = HashSet::new();
    let entries: Vec<Entry<'_>> = pods_to_delete
        .iter()
        .map(|name| {
            if name.is_empty() {
                Entry::Empty
            } else if !seen.insert(name.as_str()) {
                Entry::Duplicate(name)
            } else {
                Entry::Lookup(name)
            }
        })
        .collect();

    let lookups: Vec<_> = entries
        .iter()
        .filter_map(|entry| match entry {
            Entry::Lookup(name) => Some(lookup_pod(reader, namespace, name, policy, deadline)),
            Entry::Empty | Entry::Duplicate(_) => None,
        })
        .collect();
    // Results come back in list order
    let results: Vec<_> = stream::iter(lookups)
        .buffered(MAX_CONCURRENT_LOOKUPS)
        .collect()
        .await;
    let mut results = results.into_iter();

    for (i, entry) in entries.iter().enumerate() {
        let field = format!("scaleStrategy.podsToDelete[{}]", i);
        match entry {
            Entry::Empty => report.push(field, ErrorKind::Format, "pod name must not be empty"),
            Entry::Duplicate(name) => report.push(
                field,
                ErrorKind::Reference,
                format!("pod \"{}\" listed twice", name),
            ),
            Entry::Lookup(name) => match results.next() {
                Some(Ok(Some(pod)))
                    if owner_uid.is_some_and(|uid| pod.controller_uid.as_deref() != Some(uid)) =>
                {
                    report.push(
                        field,
                        ErrorKind::Reference,
                        format!("pod \"{}\" is not owned by this CloneSet", name),
                    )
                }
                Some(Ok(Some(_))) | None => {}
                Some(Ok(None)) => report.push(
                    field,
                    ErrorKind::Reference,
                    format!("pod \"{}\" does not exist in namespace \"{}\"", name, namespace),
                ),
                Some(Err(e)) => report.push(
                    field,
                    ErrorKind::Infrastructure,
                    format!("unable to verify pod \"{}\": {}", name, e),
                ),
            },
        }
    }
}

/// Look up one pod, bounded by `deadline` and retried per `policy`
async fn lookup_pod(
    reader: &dyn PodReader,
    namespace: &str,
    name: &str,
    policy: &InfrastructurePolicy,
    deadline: Instant,
) -> Result<Option<PodRef>, LookupError> {
    let mut retries_left = policy.retries();
    loop {
        let result = match timeout_at(deadline, reader.get_pod(namespace, name)).await {
            Ok(result) => result,
            Err(_) => Err(LookupError::Timeout),
        };

        match result {
            Err(e) if e.is_retryable() && retries_left > 0 => {
                let backoff = policy.backoff();
                if Instant::now() + backoff >= deadline {
                    return Err(e);
                }
                retries_left -= 1;
                warn!(
                    namespace = %namespace,
                    pod = %name,
                    error = %e,
                    retries_left,
                    "Pod lookup failed, retrying"
                );
                tokio::time::sleep(backoff).await;
            }
            other => return other,
        }
    }
}
