// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Unit tests for `certificate.rs`

#[cfg(test)]
mod tests {
    use super::super::*;
    use crate::crd::KymaSpec;
    use crate::gateway_secret::cabundle::GatewaySecretRotator;
    use crate::gateway_secret::{GatewaySecretConfig, GatewaySecretHandler};
    use crate::renewal::format_time_annotation;
    use crate::testing::{data_str, secret, FakeCertificateAuthority, FakeCredentialStore};
    use chrono::{DateTime, Duration as ChronoDuration};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
    use std::collections::BTreeMap;

    const NS: &str = "istio-system";

    struct Fixture {
        authority: Arc<FakeCertificateAuthority>,
        store: Arc<FakeCredentialStore>,
        manager: SkrCertificateManager,
    }

    fn fixture_with(config: CertificateManagerConfig) -> Fixture {
        let authority = Arc::new(FakeCertificateAuthority::new());
        let store = Arc::new(FakeCredentialStore::new());
        let manager = SkrCertificateManager::new(authority.clone(), store.clone(), config);
        Fixture {
            authority,
            store,
            manager,
        }
    }

    fn fixture() -> Fixture {
        fixture_with(CertificateManagerConfig {
            renew_buffer: Duration::from_secs(600),
            ..Default::default()
        })
    }

    fn kyma(annotations: &[(&str, &str)]) -> Kyma {
        let mut kyma = Kyma::new("kyma-1", KymaSpec::default());
        kyma.metadata.labels = Some(BTreeMap::from([(
            "kyma-project.io/runtime-id".to_string(),
            "rt-1".to_string(),
        )]));
        kyma.metadata.annotations = Some(
            annotations
                .iter()
                .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
                .collect(),
        );
        kyma
    }

    fn gateway_modified_at(time: DateTime<Utc>) -> Secret {
        let mut gateway = secret("klm-istio-gateway", NS, &[("ca.crt", "bundle")]);
        gateway.metadata.annotations = Some(BTreeMap::from([(
            "lastModifiedAt".to_string(),
            format_time_annotation(time),
        )]));
        gateway
    }

    fn skr_secret_created_at(time: DateTime<Utc>) -> Secret {
        let mut skr = secret(
            "kyma-1-webhook-tls",
            NS,
            &[("tls.crt", "skr-crt"), ("tls.key", "skr-key")],
        );
        skr.metadata.creation_timestamp = Some(Time(time));
        skr
    }

    #[test]
    fn test_certificate_name_uses_template() {
        let f = fixture();
        assert_eq!(f.manager.certificate_name("kyma-1"), "kyma-1-webhook-tls");

        let custom = fixture_with(CertificateManagerConfig {
            naming_template: "skr-%s-cert".to_string(),
            ..Default::default()
        });
        assert_eq!(custom.manager.certificate_name("kyma-1"), "skr-kyma-1-cert");
    }

    #[tokio::test]
    async fn test_create_skr_certificate() {
        let f = fixture_with(CertificateManagerConfig {
            additional_dns_names: vec!["extra.example.com".to_string(), "  ".to_string()],
            ..Default::default()
        });

        f.manager
            .create_skr_certificate(&kyma(&[("skr-domain", "skr.example.com")]))
            .await
            .unwrap();

        let issued = f.authority.issued("kyma-1-webhook-tls").unwrap();
        assert_eq!(issued.namespace, "istio-system");
        assert_eq!(issued.common_name, "rt-1");
        assert_eq!(
            issued.dns_names,
            vec![
                "skr.example.com",
                "extra.example.com",
                "skr-webhook.kyma-system.svc.cluster.local",
                "skr-webhook.kyma-system.svc",
            ]
        );
    }

    #[tokio::test]
    async fn test_create_without_domain_annotation() {
        let f = fixture();

        let err = f.manager.create_skr_certificate(&kyma(&[])).await.unwrap_err();

        assert!(matches!(err, CertificateError::DomainAnnotationMissing { .. }));
        assert_eq!(err.to_string(), "domain annotation is missing (Kyma: kyma-1)");
        assert!(f.authority.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_with_empty_domain_annotation() {
        let f = fixture();

        let err = f
            .manager
            .create_skr_certificate(&kyma(&[("skr-domain", "")]))
            .await
            .unwrap_err();

        assert!(matches!(err, CertificateError::DomainAnnotationEmpty { .. }));
        assert!(f.authority.calls().is_empty());
    }

    #[tokio::test]
    async fn test_create_failure_is_wrapped() {
        let f = fixture();
        f.authority.fail("create");

        let err = f
            .manager
            .create_skr_certificate(&kyma(&[("skr-domain", "skr.example.com")]))
            .await
            .unwrap_err();

        assert!(err.to_string().starts_with("failed to create SKR certificate"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[tokio::test]
    async fn test_delete_removes_record_then_secret() {
        let f = fixture();
        f.store.insert(skr_secret_created_at(Utc::now()));

        f.manager.delete_skr_certificate("kyma-1").await.unwrap();

        assert_eq!(f.authority.calls(), vec!["delete kyma-1-webhook-tls"]);
        assert_eq!(f.store.calls(), vec!["delete kyma-1-webhook-tls"]);
        assert!(f.store.stored("kyma-1-webhook-tls", NS).is_none());
    }

    #[tokio::test]
    async fn test_failed_record_delete_keeps_secret() {
        let f = fixture();
        f.store.insert(skr_secret_created_at(Utc::now()));
        f.authority.fail("delete");

        let err = f.manager.delete_skr_certificate("kyma-1").await.unwrap_err();

        assert!(err.to_string().starts_with("failed to delete SKR certificate:"));
        assert!(f.store.calls().is_empty());
        assert!(f.store.stored("kyma-1-webhook-tls", NS).is_some());
    }

    #[tokio::test]
    async fn test_failed_secret_delete_is_wrapped() {
        let f = fixture();
        f.store.fail("delete");

        let err = f.manager.delete_skr_certificate("kyma-1").await.unwrap_err();

        assert!(err
            .to_string()
            .starts_with("failed to delete SKR certificate secret"));
    }

    #[tokio::test]
    async fn test_renew_deletes_secret_created_before_bundling() {
        let f = fixture();
        let t0 = Utc::now() - ChronoDuration::days(1);
        f.store.insert(gateway_modified_at(t0 + ChronoDuration::hours(1)));
        f.store.insert(skr_secret_created_at(t0));

        f.manager.renew_skr_certificate("kyma-1").await.unwrap();

        assert!(f.store.stored("kyma-1-webhook-tls", NS).is_none());
        assert!(f.authority.calls().is_empty());
    }

    #[tokio::test]
    async fn test_renew_keeps_secret_created_after_bundling() {
        let f = fixture();
        let t0 = Utc::now() - ChronoDuration::days(1);
        f.store.insert(gateway_modified_at(t0 - ChronoDuration::hours(1)));
        f.store.insert(skr_secret_created_at(t0));

        f.manager.renew_skr_certificate("kyma-1").await.unwrap();

        assert!(f.store.stored("kyma-1-webhook-tls", NS).is_some());
        assert_eq!(f.store.count("delete"), 0);
    }

    #[tokio::test]
    async fn test_renew_when_last_modified_at_missing() {
        let f = fixture();
        f.store
            .insert(secret("klm-istio-gateway", NS, &[("ca.crt", "bundle")]));
        f.store.insert(skr_secret_created_at(Utc::now()));

        f.manager.renew_skr_certificate("kyma-1").await.unwrap();

        assert_eq!(f.store.count("delete"), 1);
    }

    #[tokio::test]
    async fn test_renew_in_reissue_mode_calls_authority() {
        let f = fixture_with(CertificateManagerConfig {
            renewal_mode: RenewalMode::Reissue,
            ..Default::default()
        });
        let t0 = Utc::now() - ChronoDuration::days(1);
        f.store.insert(gateway_modified_at(t0 + ChronoDuration::hours(1)));
        f.store.insert(skr_secret_created_at(t0));

        f.manager.renew_skr_certificate("kyma-1").await.unwrap();

        assert_eq!(f.authority.calls(), vec!["renew kyma-1-webhook-tls"]);
        assert!(f.store.stored("kyma-1-webhook-tls", NS).is_some());
    }

    #[tokio::test]
    async fn test_renew_missing_gateway_secret() {
        let f = fixture();
        f.store.insert(skr_secret_created_at(Utc::now()));

        let err = f.manager.renew_skr_certificate("kyma-1").await.unwrap_err();

        assert!(err.to_string().starts_with("failed to get gateway secret"));
        assert!(err.repository_error().unwrap().is_not_found());
        assert_eq!(f.store.count("delete"), 0);
    }

    #[tokio::test]
    async fn test_renew_while_secret_is_being_reissued() {
        let f = fixture();
        f.store.insert(gateway_modified_at(Utc::now()));

        f.manager.renew_skr_certificate("kyma-1").await.unwrap();

        assert_eq!(f.store.count("delete"), 0);
        assert!(f.authority.calls().is_empty());
    }

    #[tokio::test]
    async fn test_delete_drops_renewal_gauge_series() {
        let f = fixture_with(CertificateManagerConfig {
            renew_buffer: Duration::from_secs(600),
            naming_template: "%s-gauge-tls".to_string(),
            ..Default::default()
        });
        f.authority.set_renewal_time(
            "kyma-gauge-test-gauge-tls",
            Utc::now() - ChronoDuration::hours(1),
        );
        assert!(f
            .manager
            .is_skr_certificate_renewal_overdue("kyma-gauge-test")
            .await
            .unwrap());
        let series = "kyma=\"kyma-gauge-test\"";
        assert!(metrics::gather_metrics().unwrap().contains(series));

        f.manager
            .delete_skr_certificate("kyma-gauge-test")
            .await
            .unwrap();

        assert!(!metrics::gather_metrics().unwrap().contains(series));
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_renewal_gauge_series() {
        let f = fixture();
        f.authority.set_renewal_time(
            "kyma-gauge-kept-webhook-tls",
            Utc::now() - ChronoDuration::hours(1),
        );
        f.manager
            .is_skr_certificate_renewal_overdue("kyma-gauge-kept")
            .await
            .unwrap();
        f.authority.fail("delete");

        assert!(f
            .manager
            .delete_skr_certificate("kyma-gauge-kept")
            .await
            .is_err());
        assert!(metrics::gather_metrics()
            .unwrap()
            .contains("kyma=\"kyma-gauge-kept\""));
    }

    #[tokio::test]
    async fn test_renewal_overdue() {
        let f = fixture();
        f.authority.set_renewal_time(
            "kyma-1-webhook-tls",
            Utc::now() - ChronoDuration::minutes(11),
        );

        assert!(f
            .manager
            .is_skr_certificate_renewal_overdue("kyma-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_renewal_not_yet_overdue() {
        let f = fixture();
        f.authority.set_renewal_time(
            "kyma-1-webhook-tls",
            Utc::now() - ChronoDuration::minutes(9),
        );

        assert!(!f
            .manager
            .is_skr_certificate_renewal_overdue("kyma-1")
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_renewal_time_unavailable() {
        let f = fixture();

        let err = f
            .manager
            .is_skr_certificate_renewal_overdue("kyma-1")
            .await
            .unwrap_err();

        assert!(err
            .to_string()
            .starts_with("failed to get SKR certificate renewal time"));
    }

    #[tokio::test]
    async fn test_secret_getters() {
        let f = fixture();
        f.store.insert(skr_secret_created_at(Utc::now()));
        f.store.insert(gateway_modified_at(Utc::now()));

        let skr = f.manager.get_skr_certificate_secret("kyma-1").await.unwrap();
        assert_eq!(skr.metadata.name.as_deref(), Some("kyma-1-webhook-tls"));

        let data = f.manager.get_skr_certificate_secret_data("kyma-1").await.unwrap();
        assert_eq!(data.tls_crt, b"skr-crt");

        let gateway = f.manager.get_gateway_certificate_secret_data().await.unwrap();
        assert_eq!(gateway.ca_crt, b"bundle");
        assert!(gateway.last_modified_at.is_some());

        let missing = f.manager.get_skr_certificate_secret("kyma-2").await.unwrap_err();
        assert!(missing.repository_error().unwrap().is_not_found());
    }

    #[tokio::test]
    async fn test_skr_certificate_exists() {
        let f = fixture();
        assert!(!f.manager.skr_certificate_exists("kyma-1").await.unwrap());

        f.manager
            .create_skr_certificate(&kyma(&[("skr-domain", "skr.example.com")]))
            .await
            .unwrap();
        assert!(f.manager.skr_certificate_exists("kyma-1").await.unwrap());
    }

    #[tokio::test]
    async fn test_rotation_end_to_end() {
        let authority = Arc::new(FakeCertificateAuthority::new());
        let store = Arc::new(FakeCredentialStore::new());
        let rotator = GatewaySecretRotator::new(
            authority.clone(),
            store.clone(),
            GatewaySecretConfig::default(),
        );
        let manager = SkrCertificateManager::new(
            authority.clone(),
            store.clone(),
            CertificateManagerConfig::default(),
        );
        let root = |generation: &str| {
            let crt = format!("crt-{generation}");
            let key = format!("key-{generation}");
            let ca = format!("ca-{generation}");
            secret(
                "klm-watcher",
                NS,
                &[("tls.crt", crt.as_str()), ("tls.key", key.as_str()), ("ca.crt", ca.as_str())],
            )
        };
        let now = Utc::now();

        // Bootstrap: the first CA seeds the gateway secret
        authority.set_validity(
            "klm-watcher-serving",
            now - ChronoDuration::days(60),
            now + ChronoDuration::days(30),
        );
        rotator.manage_gateway_secret(&root("v1")).await.unwrap();

        // CA rotation: the new CA is bundled, the served pair stays
        authority.set_validity(
            "klm-watcher-serving",
            now - ChronoDuration::minutes(1),
            now + ChronoDuration::days(90),
        );
        // Seeding happened a day before the new CA was issued
        let mut gateway = store.stored("klm-istio-gateway", NS).unwrap();
        gateway.metadata.annotations.as_mut().unwrap().insert(
            "lastModifiedAt".to_string(),
            format_time_annotation(now - ChronoDuration::days(1)),
        );
        store.insert(gateway);
        rotator.manage_gateway_secret(&root("v2")).await.unwrap();

        let gateway = store.stored("klm-istio-gateway", NS).unwrap();
        assert_eq!(data_str(&gateway, "ca.crt"), "ca-v2ca-v1");
        assert_eq!(data_str(&gateway, "tls.crt"), "crt-v1");

        // The tenant certificate predates the bundling and is re-issued
        store.insert(skr_secret_created_at(now - ChronoDuration::hours(1)));
        manager.renew_skr_certificate("kyma-1").await.unwrap();
        assert!(store.stored("kyma-1-webhook-tls", NS).is_none());

        // Nearing expiration of the served CA switches the leaf pair
        let mut gateway = store.stored("klm-istio-gateway", NS).unwrap();
        gateway.metadata.annotations.as_mut().unwrap().insert(
            "currentCAExpiration".to_string(),
            format_time_annotation(now + ChronoDuration::hours(1)),
        );
        store.insert(gateway);
        rotator.manage_gateway_secret(&root("v2")).await.unwrap();

        let gateway = store.stored("klm-istio-gateway", NS).unwrap();
        assert_eq!(data_str(&gateway, "tls.crt"), "crt-v2");
        assert_eq!(data_str(&gateway, "tls.key"), "key-v2");
        assert_eq!(data_str(&gateway, "ca.crt"), "ca-v2ca-v1");
    }
}
