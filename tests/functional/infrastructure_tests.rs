//! Cluster lookup failures: classification, retries and deadlines.

use std::sync::Arc;
use std::time::Duration;

use cloneset_webhook::webhooks::denial;
use cloneset_webhook::webhooks::policies::{ErrorKind, InfrastructurePolicy};
use cloneset_webhook::webhooks::{REASON_INVALID, REASON_UPSTREAM_UNAVAILABLE};

use crate::common::fixtures::{
    CloneSetBuilder, StubPodReader, validate_create, validate_with_deadline, validator,
};

#[tokio::test]
async fn test_unavailable_is_not_a_reference_error() {
    let v = validator(
        Arc::new(StubPodReader::with_pods(&["p0"]).failing(u32::MAX)),
        InfrastructurePolicy::Deny,
    );
    let cs = CloneSetBuilder::default().pods_to_delete(&["p0"]).build();

    let report = validate_create(&v, &cs).await;
    assert!(report.violations.is_empty());
    assert!(report.infrastructure.has_kind(ErrorKind::Infrastructure));
    assert!(!report.is_allowed());

    let (reason, _) = denial(&report).unwrap();
    assert_eq!(reason, REASON_UPSTREAM_UNAVAILABLE);
}

/// A refused lookup is never retried and never read as "pod missing".
#[tokio::test]
async fn test_rejected_lookup_is_infrastructure() {
    let reader = Arc::new(StubPodReader::with_pods(&["p0"]).rejecting());
    let v = validator(
        reader.clone(),
        InfrastructurePolicy::Retry {
            attempts: 3,
            backoff: Duration::from_millis(10),
        },
    );
    let cs = CloneSetBuilder::default().pods_to_delete(&["p0"]).build();

    let report = validate_create(&v, &cs).await;
    assert!(report.violations.is_empty());
    assert_eq!(report.infrastructure.len(), 1);
    assert_eq!(reader.calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_hanging_lookup_times_out() {
    let reader = Arc::new(StubPodReader::with_pods(&["p0"]).hanging());
    let v = validator(reader.clone(), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default()
        .replicas(-1)
        .pods_to_delete(&["p0"])
        .build();

    let report = validate_with_deadline(&v, &cs, None, Duration::from_millis(250)).await;

    // Policy violations are still reported alongside the timeout
    assert!(report.violations.has("replicas", ErrorKind::ValueRange));
    assert!(
        report
            .infrastructure
            .has("scaleStrategy.podsToDelete[0]", ErrorKind::Infrastructure)
    );
    let (reason, message) = denial(&report).unwrap();
    assert_eq!(reason, REASON_UPSTREAM_UNAVAILABLE);
    assert!(message.contains("replicas"));
}

#[tokio::test(start_paused = true)]
async fn test_retry_policy_recovers() {
    let reader = Arc::new(StubPodReader::with_pods(&["p0", "p1"]).failing(2));
    let v = validator(
        reader.clone(),
        InfrastructurePolicy::Retry {
            attempts: 2,
            backoff: Duration::from_millis(100),
        },
    );
    let cs = CloneSetBuilder::default().pods_to_delete(&["p0", "p1"]).build();

    let report = validate_create(&v, &cs).await;
    assert!(report.is_allowed(), "{}", report.infrastructure);
    assert_eq!(reader.calls(), 4);
}

#[tokio::test]
async fn test_deny_policy_does_not_retry() {
    let reader = Arc::new(StubPodReader::with_pods(&["p0"]).failing(1));
    let v = validator(reader.clone(), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default().pods_to_delete(&["p0"]).build();

    let report = validate_create(&v, &cs).await;
    assert_eq!(report.infrastructure.len(), 1);
    assert_eq!(reader.calls(), 1);
}

#[tokio::test]
async fn test_policy_only_denial_reason() {
    let v = validator(Arc::new(StubPodReader::default()), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default().pods_to_delete(&["ghost"]).build();

    let report = validate_create(&v, &cs).await;
    let (reason, message) = denial(&report).unwrap();
    assert_eq!(reason, REASON_INVALID);
    assert!(message.starts_with("scaleStrategy.podsToDelete[0]: pod \"ghost\" does not exist"));
}
