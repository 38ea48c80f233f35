//! Update ordering from `priorityStrategy`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::Arc;

use cloneset_webhook::PodRef;
use cloneset_webhook::crd::{UpdatePriorityStrategy, UpdatePriorityWeightTerm};
use cloneset_webhook::webhooks::policies::{ErrorKind, InfrastructurePolicy};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{LabelSelector, LabelSelectorRequirement};

use crate::common::fixtures::{CloneSetBuilder, StubPodReader, selector, validate_create, validator};

fn pod(name: &str, labels: &[(&str, &str)]) -> PodRef {
    PodRef {
        name: name.to_string(),
        namespace: "default".to_string(),
        labels: labels
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect::<BTreeMap<_, _>>(),
        controller_uid: None,
    }
}

fn term(weight: i32, match_selector: LabelSelector) -> UpdatePriorityWeightTerm {
    UpdatePriorityWeightTerm {
        weight,
        match_selector,
    }
}

#[test]
fn test_weighted_order() {
    let priority = UpdatePriorityStrategy {
        weight_priority: vec![
            term(100, selector(&[("zone", "a")])),
            term(
                10,
                LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key: "tier".to_string(),
                        operator: "In".to_string(),
                        values: Some(vec!["web".to_string(), "api".to_string()]),
                    }]),
                    ..Default::default()
                },
            ),
        ],
    };

    let mut pods = vec![
        pod("p3", &[]),
        pod("p2", &[("tier", "api")]),
        pod("p1", &[("zone", "a")]),
        pod("p0", &[("zone", "a"), ("tier", "web")]),
        pod("p4", &[("tier", "web")]),
    ];
    priority.sort_pods(&mut pods);

    let names: Vec<_> = pods.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["p0", "p1", "p2", "p4", "p3"]);
    assert_eq!(priority.priority(&pods[0]), Some(110));
    assert_eq!(priority.compare(&pods[4], &pods[0]), Ordering::Greater);
}

#[test]
fn test_no_terms_orders_by_name() {
    let priority = UpdatePriorityStrategy::default();
    let mut pods = vec![pod("b", &[]), pod("c", &[]), pod("a", &[])];
    priority.sort_pods(&mut pods);
    let names: Vec<_> = pods.iter().map(|p| p.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn test_malformed_priority_selector_rejected() {
    let v = validator(Arc::new(StubPodReader::default()), InfrastructurePolicy::Deny);
    let cs = CloneSetBuilder::default()
        .priority(UpdatePriorityStrategy {
            weight_priority: vec![term(
                10,
                LabelSelector {
                    match_expressions: Some(vec![LabelSelectorRequirement {
                        key: "tier".to_string(),
                        operator: "Near".to_string(),
                        values: None,
                    }]),
                    ..Default::default()
                },
            )],
        })
        .build();

    let report = validate_create(&v, &cs).await;
    assert!(report.violations.has(
        "updateStrategy.priorityStrategy.weightPriority[0].matchSelector.matchExpressions[0].operator",
        ErrorKind::Format
    ));
}
