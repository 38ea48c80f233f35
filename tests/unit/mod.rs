// Test code is allowed to panic on failure
#![allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]

//! Unit tests for cloneset-webhook.
//!
//! These tests run without a Kubernetes cluster and test individual
//! components in isolation.

mod crd_tests {
    use cloneset_webhook::crd::{CloneSet, UpdateStrategyType};
    use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
    use kube::CustomResourceExt;

    #[test]
    fn test_crd_metadata() {
        let crd = CloneSet::crd();
        assert_eq!(crd.spec.group, "apps.kruise.io");
        assert_eq!(crd.spec.names.kind, "CloneSet");
        assert_eq!(crd.spec.names.plural, "clonesets");
        assert_eq!(crd.spec.scope, "Namespaced");
        assert_eq!(crd.spec.versions[0].name, "v1alpha1");
    }

    #[test]
    fn test_decode_admission_object() {
        let cs: CloneSet = serde_json::from_value(serde_json::json!({
            "apiVersion": "apps.kruise.io/v1alpha1",
            "kind": "CloneSet",
            "metadata": {"name": "sample", "namespace": "default"},
            "spec": {
                "replicas": 3,
                "selector": {"matchLabels": {"app": "sample"}},
                "template": {
                    "metadata": {"labels": {"app": "sample"}},
                    "spec": {"containers": [{"name": "main", "image": "nginx:alpine"}]}
                },
                "updateStrategy": {"type": "InPlaceOnly", "maxUnavailable": "20%"},
                "scaleStrategy": {"podsToDelete": ["sample-abcde"]},
                "revisionHistoryLimit": 10
            }
        }))
        .unwrap();

        assert_eq!(cs.spec.replicas, Some(3));
        assert_eq!(
            cs.spec.update_strategy.strategy_type(),
            Ok(UpdateStrategyType::InPlaceOnly)
        );
        assert_eq!(
            cs.spec.update_strategy.max_unavailable,
            Some(IntOrString::String("20%".to_string()))
        );
        assert_eq!(cs.spec.scale_strategy.pods_to_delete, vec!["sample-abcde"]);
        assert_eq!(cs.spec.revision_history_limit, Some(10));
    }

    #[test]
    fn test_strategy_type_display() {
        for t in UpdateStrategyType::ALL {
            assert_eq!(t.to_string().parse::<UpdateStrategyType>(), Ok(t));
        }
        assert!("inplaceonly".parse::<UpdateStrategyType>().is_err());
    }
}

mod error_tests {
    use cloneset_webhook::LookupError;
    use cloneset_webhook::webhooks::policies::{ErrorKind, ErrorList};

    #[test]
    fn test_error_kind_names() {
        assert_eq!(ErrorKind::ValueRange.to_string(), "value-range");
        assert_eq!(ErrorKind::PolicyConflict.to_string(), "policy-conflict");
        assert_eq!(ErrorKind::Infrastructure.to_string(), "infrastructure");
    }

    #[test]
    fn test_error_list_accumulates_in_order() {
        let mut errors = ErrorList::new();
        errors.push("replicas", ErrorKind::ValueRange, "a");
        errors.push("selector", ErrorKind::PolicyConflict, "b");
        errors.push("updateStrategy.type", ErrorKind::Format, "c");

        let fields: Vec<_> = errors.iter().map(|e| e.field.as_str()).collect();
        assert_eq!(fields, vec!["replicas", "selector", "updateStrategy.type"]);
        assert!(errors.has_kind(ErrorKind::Format));
        assert!(!errors.has_kind(ErrorKind::Reference));
    }

    #[test]
    fn test_lookup_error_messages() {
        assert!(LookupError::Timeout.to_string().contains("deadline"));
        assert_eq!(
            LookupError::Unavailable("connection refused".to_string()).to_string(),
            "API server unavailable: connection refused"
        );
    }
}

mod template_diff_tests {
    use cloneset_webhook::webhooks::policies::immutability::template_diff;
    use k8s_openapi::api::core::v1::{Container, PodSpec, PodTemplateSpec};

    fn template(containers: &[(&str, &str)]) -> PodTemplateSpec {
        PodTemplateSpec {
            metadata: None,
            spec: Some(PodSpec {
                containers: containers
                    .iter()
                    .map(|(name, image)| Container {
                        name: name.to_string(),
                        image: Some(image.to_string()),
                        ..Default::default()
                    })
                    .collect(),
                ..Default::default()
            }),
        }
    }

    #[test]
    fn test_multiple_image_changes_are_in_place() {
        let old = template(&[("a", "img:1"), ("b", "img:1")]);
        let new = template(&[("a", "img:2"), ("b", "img:2")]);
        let diff = template_diff(&old, &new).unwrap();
        assert_eq!(
            diff.changed,
            vec!["spec.containers[0].image", "spec.containers[1].image"]
        );
        assert!(diff.in_place_updatable());
    }

    #[test]
    fn test_container_rename_is_not_in_place() {
        let old = template(&[("a", "img:1")]);
        let new = template(&[("b", "img:1")]);
        let diff = template_diff(&old, &new).unwrap();
        assert_eq!(
            diff.disallowed_in_place().collect::<Vec<_>>(),
            vec!["spec.containers[0].name"]
        );
    }
}

mod config_tests {
    use std::time::Duration;

    use cloneset_webhook::InfrastructurePolicy;
    use cloneset_webhook::WebhookConfig;

    #[test]
    fn test_retry_policy_defaults() {
        let config = WebhookConfig::from_vars(|name| match name {
            "POD_LOOKUP_POLICY" => Some("retry".to_string()),
            _ => None,
        })
        .unwrap();
        assert_eq!(
            config.infrastructure_policy,
            InfrastructurePolicy::Retry {
                attempts: 2,
                backoff: Duration::from_millis(200),
            }
        );
    }

    #[test]
    fn test_invalid_timeout() {
        let result = WebhookConfig::from_vars(|name| match name {
            "POD_LOOKUP_TIMEOUT_MS" => Some("-1".to_string()),
            _ => None,
        });
        assert!(result.is_err());
    }
}
