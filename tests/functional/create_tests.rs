//! CREATE-path scenarios.

use std::sync::Arc;

use cloneset_webhook::webhooks::policies::{ErrorKind, InfrastructurePolicy};
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;

use crate::common::fixtures::{
    CloneSetBuilder, StubPodReader, pod_template, selector, validate_create, validator,
};

/// Reference scenario: a valid object with an existing pod to delete is accepted.
#[tokio::test]
async fn test_reference_scenario_accepts() {
    let reader = Arc::new(StubPodReader::with_pods(&["p0"]));
    let v = validator(reader.clone(), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default().pods_to_delete(&["p0"]).build();

    let report = validate_create(&v, &cs).await;
    assert!(report.is_allowed(), "{}", report.violations);
    assert_eq!(reader.calls(), 1);
}

#[tokio::test]
async fn test_duplicate_pod_to_delete() {
    let v = validator(Arc::new(StubPodReader::with_pods(&["p0"])), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default().pods_to_delete(&["p0", "p0"]).build();

    let report = validate_create(&v, &cs).await;
    assert_eq!(report.violations.len(), 1);
    assert!(
        report
            .violations
            .has("scaleStrategy.podsToDelete[1]", ErrorKind::Reference)
    );
    assert!(report.infrastructure.is_empty());
}

#[tokio::test]
async fn test_missing_pod_to_delete() {
    let v = validator(Arc::new(StubPodReader::with_pods(&["p0"])), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default().pods_to_delete(&["p0", "p1"]).build();

    let report = validate_create(&v, &cs).await;
    assert_eq!(report.violations.len(), 1);
    assert!(
        report
            .violations
            .has("scaleStrategy.podsToDelete[1]", ErrorKind::Reference)
    );
}

#[tokio::test]
async fn test_pod_owned_by_another_workload() {
    let reader = StubPodReader::with_pods(&["p0"]).owned_by(&["p1"], "some-other-workload");
    let v = validator(Arc::new(reader), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default().pods_to_delete(&["p0", "p1"]).build();

    let report = validate_create(&v, &cs).await;
    assert!(report.infrastructure.is_empty());
    assert_eq!(report.violations.len(), 1);
    let error = report.violations.iter().next().unwrap();
    assert_eq!(error.field, "scaleStrategy.podsToDelete[1]");
    assert_eq!(error.kind, ErrorKind::Reference);
    assert!(error.message.contains("not owned by this CloneSet"));
}

#[tokio::test]
async fn test_max_unavailable_zero() {
    let v = validator(Arc::new(StubPodReader::with_pods(&["p0"])), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default()
        .pods_to_delete(&["p0"])
        .max_unavailable(IntOrString::Int(0))
        .build();

    let report = validate_create(&v, &cs).await;
    assert_eq!(report.violations.len(), 1);
    assert!(
        report
            .violations
            .has("updateStrategy.maxUnavailable", ErrorKind::ValueRange)
    );
}

#[tokio::test]
async fn test_max_unavailable_percentages() {
    let v = validator(Arc::new(StubPodReader::default()), InfrastructurePolicy::Deny);

    for ok in ["50%", "100%", "150%"] {
        let cs = CloneSetBuilder::default()
            .max_unavailable(IntOrString::String(ok.to_string()))
            .build();
        let report = validate_create(&v, &cs).await;
        assert!(report.is_allowed(), "{} rejected: {}", ok, report.violations);
    }

    let cs = CloneSetBuilder::default()
        .max_unavailable(IntOrString::String("half".to_string()))
        .build();
    let report = validate_create(&v, &cs).await;
    assert!(
        report
            .violations
            .has("updateStrategy.maxUnavailable", ErrorKind::Format)
    );
}

#[tokio::test]
async fn test_negative_replicas() {
    let v = validator(Arc::new(StubPodReader::default()), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default().replicas(-1).build();

    let report = validate_create(&v, &cs).await;
    assert!(report.violations.has("replicas", ErrorKind::ValueRange));
}

#[tokio::test]
async fn test_empty_strategy_type() {
    let v = validator(Arc::new(StubPodReader::default()), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default().strategy("").build();

    let report = validate_create(&v, &cs).await;
    assert_eq!(report.violations.len(), 1);
    assert!(report.violations.has("updateStrategy.type", ErrorKind::Format));
}

#[tokio::test]
async fn test_selector_template_mismatch() {
    let v = validator(Arc::new(StubPodReader::default()), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default()
        .selector(Some(selector(&[("a", "c")])))
        .build();

    let report = validate_create(&v, &cs).await;
    assert!(
        report
            .violations
            .has("template.metadata.labels", ErrorKind::PolicyConflict)
    );
}

#[tokio::test]
async fn test_missing_and_empty_selector() {
    let v = validator(Arc::new(StubPodReader::default()), InfrastructurePolicy::Deny);

    let report = validate_create(&v, &CloneSetBuilder::default().selector(None).build()).await;
    assert!(report.violations.has("selector", ErrorKind::PolicyConflict));

    let report =
        validate_create(&v, &CloneSetBuilder::default().selector(Some(selector(&[]))).build())
            .await;
    assert!(report.violations.has("selector", ErrorKind::PolicyConflict));
}

#[tokio::test]
async fn test_invalid_template_labels() {
    let v = validator(Arc::new(StubPodReader::default()), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default()
        .template(pod_template(
            &[("NoUppercaseOrSpecialCharsLike=Equals", "b")],
            "image",
            "IfNotPresent",
        ))
        .build();

    let report = validate_create(&v, &cs).await;
    assert!(report.violations.has("template.metadata.labels", ErrorKind::Format));
}

/// Every independent violation is reported in one pass.
#[tokio::test]
async fn test_all_violations_collected() {
    let v = validator(Arc::new(StubPodReader::with_pods(&["p0"])), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default()
        .replicas(-1)
        .partition(-1)
        .max_unavailable(IntOrString::Int(0))
        .strategy("Sometimes")
        .revision_history_limit(-3)
        .pods_to_delete(&["p0", "p0", "missing"])
        .build();

    let report = validate_create(&v, &cs).await;
    let fields: Vec<_> = report.violations.iter().map(|e| e.field.as_str()).collect();
    assert_eq!(
        fields,
        vec![
            "replicas",
            "revisionHistoryLimit",
            "updateStrategy.type",
            "updateStrategy.partition",
            "updateStrategy.maxUnavailable",
            "scaleStrategy.podsToDelete[1]",
            "scaleStrategy.podsToDelete[2]",
        ]
    );
}

/// Validating the same object twice yields the same report.
#[tokio::test]
async fn test_create_is_idempotent() {
    let v = validator(Arc::new(StubPodReader::with_pods(&["p0"])), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default()
        .replicas(-2)
        .pods_to_delete(&["p0", "ghost"])
        .build();

    let first = validate_create(&v, &cs).await;
    let second = validate_create(&v, &cs).await;
    assert_eq!(first, second);
    assert!(!first.is_allowed());
}
