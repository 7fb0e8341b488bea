// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`CertificateAuthority`] adapter for cert-manager (`cert-manager.io/v1`).
//!
//! Only the fields the watcher certificate chain uses are modelled. Records
//! are written with server-side apply so that configuration changes (e.g., a
//! new duration) converge on existing certificates.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client, CustomResource};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use tracing::{debug, info};

use super::{CertificateAuthority, CertificateValues, RepositoryResult};
use crate::constants::{
    DEFAULT_COUNTRY, DEFAULT_LOCALITY, DEFAULT_ORGANIZATION, DEFAULT_ORGANIZATIONAL_UNIT,
    DEFAULT_PROVINCE, FIELD_MANAGER,
};
use crate::duration::format_go_duration;
use crate::errors::RepositoryError;
use crate::labels::certificate_secret_labels;

/// Kind name used in error messages and issuer references
pub const CERTIFICATE_KIND: &str = "Certificate";

/// Kind of issuer SKR certificates are signed by
pub const ISSUER_KIND: &str = "Issuer";

/// Condition type cert-manager reacts to when re-issuing
pub const CONDITION_ISSUING: &str = "Issuing";

/// Reason recorded on a manually triggered re-issuance
pub const REASON_MANUALLY_TRIGGERED: &str = "ManuallyTriggered";

/// A cert-manager certificate request.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "cert-manager.io",
    version = "v1",
    kind = "Certificate",
    namespaced,
    status = "CertificateStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<X509Subject>,
    /// Go-style duration (e.g., `1441h0m0s`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    pub secret_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_template: Option<SecretTemplate>,
    pub issuer_ref: IssuerRef,
    #[serde(default, rename = "isCA")]
    pub is_ca: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub usages: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKey>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct X509Subject {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizational_units: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub organizations: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub localities: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub provinces: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub countries: Vec<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SecretTemplate {
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct IssuerRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PrivateKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rotation_policy: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub encoding: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<u32>,
}

/// Status reported by cert-manager.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStatus {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<CertificateCondition>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_before: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub not_after: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renewal_time: Option<Time>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateCondition {
    #[serde(rename = "type")]
    pub r#type: String,
    pub status: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_transition_time: Option<Time>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observed_generation: Option<i64>,
}

/// cert-manager backed certificate repository.
#[derive(Clone)]
pub struct CertManagerRepository {
    client: Client,
    issuer_name: String,
    values: CertificateValues,
}

impl CertManagerRepository {
    /// Create a repository issuing certificates through `issuer_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidConfig`] if the certificate namespace is empty.
    pub fn new(
        client: Client,
        issuer_name: impl Into<String>,
        values: CertificateValues,
    ) -> RepositoryResult<Self> {
        values.validate()?;
        Ok(Self {
            client,
            issuer_name: issuer_name.into(),
            values,
        })
    }

    fn api(&self, namespace: &str) -> Api<Certificate> {
        Api::namespaced(self.client.clone(), namespace)
    }

    async fn get_certificate(&self, name: &str, namespace: &str) -> RepositoryResult<Certificate> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| RepositoryError::from_kube("get", CERTIFICATE_KIND, name, namespace, e))
    }
}

/// Desired state of an SKR client certificate.
#[must_use]
pub fn build_certificate_spec(
    name: &str,
    common_name: &str,
    dns_names: &[String],
    issuer_name: &str,
    values: &CertificateValues,
) -> CertificateSpec {
    CertificateSpec {
        common_name: Some(common_name.to_string()),
        subject: Some(X509Subject {
            organizational_units: vec![DEFAULT_ORGANIZATIONAL_UNIT.to_string()],
            organizations: vec![DEFAULT_ORGANIZATION.to_string()],
            localities: vec![DEFAULT_LOCALITY.to_string()],
            provinces: vec![DEFAULT_PROVINCE.to_string()],
            countries: vec![DEFAULT_COUNTRY.to_string()],
        }),
        duration: Some(format_go_duration(values.duration)),
        renew_before: Some(format_go_duration(values.renew_before)),
        dns_names: dns_names.to_vec(),
        secret_name: name.to_string(),
        secret_template: Some(SecretTemplate {
            labels: certificate_secret_labels(),
            annotations: BTreeMap::new(),
        }),
        issuer_ref: IssuerRef {
            name: issuer_name.to_string(),
            kind: Some(ISSUER_KIND.to_string()),
            group: None,
        },
        is_ca: false,
        usages: vec![
            "digital signature".to_string(),
            "key encipherment".to_string(),
        ],
        private_key: Some(PrivateKey {
            rotation_policy: Some("Always".to_string()),
            encoding: Some("PKCS1".to_string()),
            algorithm: Some("RSA".to_string()),
            size: Some(values.key_size),
        }),
    }
}

/// Renewal time from a cert-manager status.
///
/// # Errors
///
/// Returns [`RepositoryError::NoRenewalTime`] if the status has none.
pub fn renewal_time_from_status(
    certificate: &Certificate,
    name: &str,
    namespace: &str,
) -> RepositoryResult<DateTime<Utc>> {
    certificate
        .status
        .as_ref()
        .and_then(|status| status.renewal_time.as_ref())
        .map(|time| time.0)
        .filter(|time| time.timestamp() != 0)
        .ok_or_else(|| RepositoryError::NoRenewalTime {
            name: name.to_string(),
            namespace: namespace.to_string(),
            reason: "status.renewalTime is not set".to_string(),
        })
}

/// Validity window from a cert-manager status.
///
/// # Errors
///
/// Returns [`RepositoryError::NoNotBefore`] or [`RepositoryError::NoNotAfter`]
/// if the corresponding timestamp is missing.
pub fn validity_from_status(
    certificate: &Certificate,
    name: &str,
    namespace: &str,
) -> RepositoryResult<(DateTime<Utc>, DateTime<Utc>)> {
    let status = certificate.status.as_ref();

    let not_before = status
        .and_then(|s| s.not_before.as_ref())
        .ok_or_else(|| RepositoryError::NoNotBefore {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })?;
    let not_after = status
        .and_then(|s| s.not_after.as_ref())
        .ok_or_else(|| RepositoryError::NoNotAfter {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })?;

    Ok((not_before.0, not_after.0))
}

/// Status condition that makes cert-manager re-issue the certificate.
#[must_use]
pub fn manual_issuing_condition(generation: Option<i64>, now: DateTime<Utc>) -> CertificateCondition {
    CertificateCondition {
        r#type: CONDITION_ISSUING.to_string(),
        status: "True".to_string(),
        reason: Some(REASON_MANUALLY_TRIGGERED.to_string()),
        message: Some("Certificate re-issuance manually triggered".to_string()),
        last_transition_time: Some(Time(now)),
        observed_generation: generation,
    }
}

#[async_trait]
impl CertificateAuthority for CertManagerRepository {
    async fn create(
        &self,
        name: &str,
        namespace: &str,
        common_name: &str,
        dns_names: &[String],
    ) -> RepositoryResult<()> {
        let spec = build_certificate_spec(name, common_name, dns_names, &self.issuer_name, &self.values);
        let mut certificate = Certificate::new(name, spec);
        certificate.metadata.namespace = Some(namespace.to_string());

        debug!("Applying cert-manager Certificate {}/{}", namespace, name);
        self.api(namespace)
            .patch(
                name,
                &PatchParams::apply(FIELD_MANAGER).force(),
                &Patch::Apply(&certificate),
            )
            .await
            .map_err(|e| RepositoryError::from_kube("patch", CERTIFICATE_KIND, name, namespace, e))?;
        Ok(())
    }

    async fn delete(&self, name: &str, namespace: &str) -> RepositoryResult<()> {
        match self.api(namespace).delete(name, &DeleteParams::default()).await {
            Ok(_) => Ok(()),
            Err(e) => {
                match RepositoryError::from_kube("delete", CERTIFICATE_KIND, name, namespace, e) {
                    not_found if not_found.is_not_found() => Ok(()),
                    other => Err(other),
                }
            }
        }
    }

    async fn get_renewal_time(
        &self,
        name: &str,
        namespace: &str,
    ) -> RepositoryResult<DateTime<Utc>> {
        let certificate = self.get_certificate(name, namespace).await?;
        renewal_time_from_status(&certificate, name, namespace)
    }

    async fn get_validity(
        &self,
        name: &str,
        namespace: &str,
    ) -> RepositoryResult<(DateTime<Utc>, DateTime<Utc>)> {
        let certificate = self.get_certificate(name, namespace).await?;
        validity_from_status(&certificate, name, namespace)
    }

    async fn renew(&self, name: &str) -> RepositoryResult<()> {
        let namespace = self.values.namespace.as_str();
        let certificate = self.get_certificate(name, namespace).await?;
        let condition = manual_issuing_condition(certificate.metadata.generation, Utc::now());

        let patch = json!({ "status": { "conditions": [condition] } });
        self.api(namespace)
            .patch_status(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| {
                RepositoryError::from_kube("patch status", CERTIFICATE_KIND, name, namespace, e)
            })?;

        info!("Triggered re-issuance of cert-manager Certificate {}/{}", namespace, name);
        Ok(())
    }

    async fn exists(&self, name: &str) -> RepositoryResult<bool> {
        let namespace = self.values.namespace.as_str();
        self.api(namespace)
            .get_opt(name)
            .await
            .map(|certificate| certificate.is_some())
            .map_err(|e| RepositoryError::from_kube("get", CERTIFICATE_KIND, name, namespace, e))
    }
}

#[cfg(test)]
#[path = "certmanager_tests.rs"]
mod certmanager_tests;
