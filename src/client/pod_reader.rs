//! Read-only pod lookups against the cluster.
//!
//! The scale-target policy only needs to know whether a named pod exists.
//! [`PodReader`] is the seam that makes this testable without a cluster;
//! [`KubePodReader`] is the production implementation.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Pod;
use kube::{Api, Client, ResourceExt};
use thiserror::Error;
use tracing::{debug, warn};

use crate::health::HealthState;

/// The parts of a pod the webhook cares about.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PodRef {
    pub name: String,
    pub namespace: String,
    pub labels: BTreeMap<String, String>,
    /// UID of the controlling owner, if any
    pub controller_uid: Option<String>,
}

impl From<Pod> for PodRef {
    fn from(pod: Pod) -> Self {
        let controller_uid = pod
            .owner_references()
            .iter()
            .find(|o| o.controller == Some(true))
            .map(|o| o.uid.clone());
        Self {
            name: pod.name_any(),
            namespace: pod.namespace().unwrap_or_default(),
            labels: pod.labels().clone(),
            controller_uid,
        }
    }
}

/// Failure to consult the cluster. Never means "not found".
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// The admission deadline passed before the lookup finished
    #[error("pod lookup did not complete before the admission deadline")]
    Timeout,

    /// The API server could not be reached or answered with a server error
    #[error("API server unavailable: {0}")]
    Unavailable(String),

    /// The API server refused the lookup (e.g. forbidden)
    #[error("pod lookup rejected: {0}")]
    Rejected(String),
}

impl LookupError {
    /// Check if retrying the lookup may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            LookupError::Unavailable(_) => true,
            LookupError::Timeout | LookupError::Rejected(_) => false,
        }
    }
}

impl From<kube::Error> for LookupError {
    fn from(e: kube::Error) -> Self {
        match &e {
            kube::Error::Api(resp) if resp.code >= 500 || resp.code == 429 => {
                LookupError::Unavailable(e.to_string())
            }
            kube::Error::Api(_) => LookupError::Rejected(e.to_string()),
            _ => LookupError::Unavailable(e.to_string()),
        }
    }
}

/// Read-only access to pods.
#[async_trait]
pub trait PodReader: Send + Sync {
    /// Look up a pod by namespace and name.
    ///
    /// `Ok(None)` means the pod does not exist; `Err` means the answer is unknown.
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodRef>, LookupError>;
}

/// [`PodReader`] backed by the Kubernetes API.
#[derive(Clone)]
pub struct KubePodReader {
    client: Client,
    /// Optional health state for lookup metrics
    health_state: Option<Arc<HealthState>>,
}

impl KubePodReader {
    pub fn new(client: Client, health_state: Option<Arc<HealthState>>) -> Self {
        Self {
            client,
            health_state,
        }
    }
}

#[async_trait]
impl PodReader for KubePodReader {
    async fn get_pod(&self, namespace: &str, name: &str) -> Result<Option<PodRef>, LookupError> {
        let api: Api<Pod> = Api::namespaced(self.client.clone(), namespace);
        let started = Instant::now();
        let result = api.get_opt(name).await;
        let elapsed = started.elapsed().as_secs_f64();

        let outcome = match &result {
            Ok(Some(_)) => "found",
            Ok(None) => "not_found",
            Err(_) => "error",
        };
        if let Some(state) = &self.health_state {
            state.metrics.record_pod_lookup(outcome, elapsed);
        }

        match result {
            Ok(pod) => {
                debug!(namespace = %namespace, pod = %name, outcome, "Pod lookup");
                Ok(pod.map(PodRef::from))
            }
            Err(e) => {
                warn!(namespace = %namespace, pod = %name, error = %e, "Pod lookup failed");
                Err(e.into())
            }
        }
    }
}
