//! CloneSet Custom Resource Definition.
//!
//! A CloneSet manages a set of identical pods that can be updated either by
//! recreating them or in place. Only the fields the admission webhook needs
//! are modelled; unknown fields in an incoming object are ignored on decode.

use std::fmt;
use std::str::FromStr;

use k8s_openapi::api::core::v1::PodTemplateSpec;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::LabelSelector;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// CloneSet is a replica-managed workload whose pods can be updated in place.
///
/// Example:
/// ```yaml
/// apiVersion: apps.kruise.io/v1alpha1
/// kind: CloneSet
/// metadata:
///   name: sample
/// spec:
///   replicas: 3
///   selector:
///     matchLabels:
///       app: sample
///   template:
///     metadata:
///       labels:
///         app: sample
///     spec:
///       containers:
///         - name: main
///           image: nginx:alpine
///   updateStrategy:
///     type: InPlaceIfPossible
///     maxUnavailable: 1
/// ```
#[derive(CustomResource, Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "apps.kruise.io",
    version = "v1alpha1",
    kind = "CloneSet",
    plural = "clonesets",
    shortname = "clone",
    status = "CloneSetStatus",
    namespaced,
    printcolumn = r#"{"name":"Desired", "type":"integer", "jsonPath":".spec.replicas"}"#,
    printcolumn = r#"{"name":"Updated", "type":"integer", "jsonPath":".status.updatedReplicas"}"#,
    printcolumn = r#"{"name":"Ready", "type":"integer", "jsonPath":".status.readyReplicas"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct CloneSetSpec {
    /// Desired number of pods. Defaulted elsewhere when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,

    /// Label query over the pods this CloneSet owns.
    /// Must match the labels of `template`. Immutable after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selector: Option<LabelSelector>,

    /// Pod template the CloneSet stamps out.
    #[serde(default)]
    pub template: PodTemplateSpec,

    /// How existing pods are moved to a new revision.
    #[serde(default)]
    pub update_strategy: CloneSetUpdateStrategy,

    /// Scale-down behaviour.
    #[serde(default)]
    pub scale_strategy: CloneSetScaleStrategy,

    /// Number of old revisions retained. Immutable after creation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revision_history_limit: Option<i32>,
}

/// Update strategy for a CloneSet.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloneSetUpdateStrategy {
    /// One of `Recreate`, `InPlaceIfPossible`, `InPlaceOnly`.
    /// Kept as the raw wire string so that unknown values can be reported.
    #[serde(rename = "type", default)]
    pub type_: String,

    /// Number of replicas kept at the previous revision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub partition: Option<i32>,

    /// Maximum pods unavailable during an update, as a count or a percentage.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<IntOrString>,

    /// Order in which pods are picked for update.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority_strategy: Option<UpdatePriorityStrategy>,
}

impl CloneSetUpdateStrategy {
    /// Parse the declared strategy type.
    pub fn strategy_type(&self) -> Result<UpdateStrategyType, UnknownStrategyType> {
        self.type_.parse()
    }
}

/// The closed set of update strategy types.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum UpdateStrategyType {
    /// Always delete and recreate pods.
    Recreate,
    /// Update in place when only in-place-updatable fields changed, otherwise recreate.
    InPlaceIfPossible,
    /// Only ever update in place.
    InPlaceOnly,
}

impl UpdateStrategyType {
    /// All variants in declaration order.
    pub const ALL: [UpdateStrategyType; 3] = [
        UpdateStrategyType::Recreate,
        UpdateStrategyType::InPlaceIfPossible,
        UpdateStrategyType::InPlaceOnly,
    ];

    /// Wire spelling of the variant.
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateStrategyType::Recreate => "Recreate",
            UpdateStrategyType::InPlaceIfPossible => "InPlaceIfPossible",
            UpdateStrategyType::InPlaceOnly => "InPlaceOnly",
        }
    }
}

impl fmt::Display for UpdateStrategyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a strategy type string is empty or not recognised.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown update strategy type \"{0}\"")]
pub struct UnknownStrategyType(pub String);

impl FromStr for UpdateStrategyType {
    type Err = UnknownStrategyType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        UpdateStrategyType::ALL
            .into_iter()
            .find(|t| t.as_str() == s)
            .ok_or_else(|| UnknownStrategyType(s.to_string()))
    }
}

/// Weighted ordering of pods during an update.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePriorityStrategy {
    /// Terms evaluated against each pod's labels. Higher total weight updates first.
    #[serde(default)]
    pub weight_priority: Vec<UpdatePriorityWeightTerm>,
}

/// A selector paired with the weight a matching pod receives.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePriorityWeightTerm {
    pub weight: i32,
    pub match_selector: LabelSelector,
}

/// Scale strategy for a CloneSet.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CloneSetScaleStrategy {
    /// Pods to remove first when scaling down.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub pods_to_delete: Vec<String>,
}

/// Observed state of a CloneSet. Written by the controller only.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CloneSetStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
    #[serde(default)]
    pub replicas: i32,
    #[serde(default)]
    pub ready_replicas: i32,
    #[serde(default)]
    pub updated_replicas: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub update_revision: Option<String>,
}
