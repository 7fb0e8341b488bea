// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`CertificateAuthority`] adapter for Gardener cert-management
//! (`cert.gardener.cloud/v1alpha1`).
//!
//! Gardener does not report `notBefore`/`notAfter` as structured fields. The
//! validity window is parsed from the status message, which reads
//! `certificate (SN ...) valid from <t> to <t>`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::Time;
use kube::api::{DeleteParams, Patch, PatchParams};
use kube::{Api, Client, CustomResource};
use regex::Regex;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::BTreeMap;
use std::sync::LazyLock;
use tracing::{debug, info};

use super::{CertificateAuthority, CertificateValues, RepositoryResult};
use crate::constants::FIELD_MANAGER;
use crate::duration::format_go_duration;
use crate::errors::RepositoryError;
use crate::labels::certificate_secret_labels;

/// Kind name used in error messages
pub const CERTIFICATE_KIND: &str = "Certificate";

/// Layout of timestamps inside the Gardener status message
const VALIDITY_TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.f %z UTC";

#[allow(clippy::unwrap_used)]
static VALIDITY_REGEX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"valid from (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)? [+-]\d{4} UTC) to (\d{4}-\d{2}-\d{2} \d{2}:\d{2}:\d{2}(?:\.\d+)? [+-]\d{4} UTC)",
    )
    .unwrap()
});

/// A Gardener cert-management certificate request.
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[kube(
    group = "cert.gardener.cloud",
    version = "v1alpha1",
    kind = "Certificate",
    namespaced,
    status = "CertificateStatus"
)]
#[serde(rename_all = "camelCase")]
pub struct CertificateSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub common_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew_before: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secret_name: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secret_labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer_ref: Option<IssuerRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub private_key: Option<PrivateKey>,
    /// Triggers an immediate renewal when set
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub renew: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ensure_renewed_after: Option<Time>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct IssuerRef {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
pub struct PrivateKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub algorithm: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<i32>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CertificateStatus {
    /// RFC 3339 expiration timestamp
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiration_date: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

/// Gardener backed certificate repository.
#[derive(Clone)]
pub struct GardenerRepository {
    client: Client,
    issuer_name: String,
    issuer_namespace: String,
    values: CertificateValues,
    key_size: i32,
}

impl GardenerRepository {
    /// Create a repository issuing certificates through the issuer
    /// `issuer_namespace/issuer_name`.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidConfig`] if the key size does not fit
    /// an `i32` or the certificate namespace is empty.
    pub fn new(
        client: Client,
        issuer_name: impl Into<String>,
        issuer_namespace: impl Into<String>,
        values: CertificateValues,
    ) -> RepositoryResult<Self> {
        let key_size = i32::try_from(values.key_size).map_err(|_| {
            RepositoryError::InvalidConfig(format!(
                "key size {} is out of range for int32",
                values.key_size
            ))
        })?;
        values.validate()?;

        Ok(Self {
            client,
            issuer_name: issuer_name.into(),
            issuer_namespace: issuer_namespace.into(),
            values,
            key_size,
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

    fn build_spec(&self, name: &str, common_name: &str, dns_names: &[String]) -> CertificateSpec {
        CertificateSpec {
            common_name: Some(common_name.to_string()),
            duration: Some(format_go_duration(self.values.duration)),
            renew_before: Some(format_go_duration(self.values.renew_before)),
            dns_names: dns_names.to_vec(),
            secret_name: Some(name.to_string()),
            secret_labels: certificate_secret_labels(),
            issuer_ref: Some(IssuerRef {
                name: self.issuer_name.clone(),
                namespace: Some(self.issuer_namespace.clone()),
            }),
            private_key: Some(PrivateKey {
                algorithm: Some("RSA".to_string()),
                size: Some(self.key_size),
            }),
            renew: None,
            ensure_renewed_after: None,
        }
    }
}

/// Extract `(not_before, not_after)` from a Gardener status message.
///
/// # Errors
///
/// Returns [`RepositoryError::InvalidValidity`] if the message carries no
/// parsable validity window.
pub fn parse_validity(
    message: &str,
    name: &str,
    namespace: &str,
) -> RepositoryResult<(DateTime<Utc>, DateTime<Utc>)> {
    let invalid = |reason: String| RepositoryError::InvalidValidity {
        name: name.to_string(),
        namespace: namespace.to_string(),
        reason,
    };

    let captures = VALIDITY_REGEX
        .captures(message)
        .ok_or_else(|| invalid("input string does not contain valid dates".to_string()))?;

    let parse = |index: usize, field: &str| {
        let raw = captures.get(index).map(|m| m.as_str()).unwrap_or_default();
        DateTime::parse_from_str(raw, VALIDITY_TIME_FORMAT)
            .map(|time| time.with_timezone(&Utc))
            .map_err(|e| invalid(format!("failed to parse {field} date '{raw}': {e}")))
    };

    Ok((parse(1, "notBefore")?, parse(2, "notAfter")?))
}

/// Validity window of an issued certificate.
///
/// # Errors
///
/// Returns [`RepositoryError::NoNotBefore`] while the certificate has no
/// status message (not issued yet), and [`RepositoryError::InvalidValidity`]
/// if the message cannot be parsed.
pub fn validity_from_status(
    certificate: &Certificate,
    name: &str,
    namespace: &str,
) -> RepositoryResult<(DateTime<Utc>, DateTime<Utc>)> {
    let message = certificate
        .status
        .as_ref()
        .and_then(|status| status.message.as_deref())
        .ok_or_else(|| RepositoryError::NoNotBefore {
            name: name.to_string(),
            namespace: namespace.to_string(),
        })?;

    parse_validity(message, name, namespace)
}

/// Expiration date minus the renew-before window.
///
/// # Errors
///
/// Returns [`RepositoryError::NoRenewalTime`] if the status has no parsable
/// expiration date.
pub fn renewal_time_from_status(
    certificate: &Certificate,
    renew_before: std::time::Duration,
    name: &str,
    namespace: &str,
) -> RepositoryResult<DateTime<Utc>> {
    let no_renewal_time = |reason: String| RepositoryError::NoRenewalTime {
        name: name.to_string(),
        namespace: namespace.to_string(),
        reason,
    };

    let raw = certificate
        .status
        .as_ref()
        .and_then(|status| status.expiration_date.as_deref())
        .ok_or_else(|| no_renewal_time("no expiration date".to_string()))?;

    let expiration = DateTime::parse_from_rfc3339(raw)
        .map(|time| time.with_timezone(&Utc))
        .map_err(|e| no_renewal_time(format!("failed to parse expiration date '{raw}': {e}")))?;

    let before = chrono::Duration::from_std(renew_before).unwrap_or(chrono::Duration::MAX);
    Ok(expiration
        .checked_sub_signed(before)
        .unwrap_or(DateTime::<Utc>::MIN_UTC))
}

#[async_trait]
impl CertificateAuthority for GardenerRepository {
    async fn create(
        &self,
        name: &str,
        namespace: &str,
        common_name: &str,
        dns_names: &[String],
    ) -> RepositoryResult<()> {
        let mut certificate = Certificate::new(name, self.build_spec(name, common_name, dns_names));
        certificate.metadata.namespace = Some(namespace.to_string());

        debug!("Applying Gardener Certificate {}/{}", namespace, name);
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
        renewal_time_from_status(&certificate, self.values.renew_before, name, namespace)
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
        let patch = json!({ "spec": { "renew": true, "ensureRenewedAfter": null } });

        self.api(namespace)
            .patch(name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| RepositoryError::from_kube("patch", CERTIFICATE_KIND, name, namespace, e))?;

        info!("Requested renewal of Gardener Certificate {}/{}", namespace, name);
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
#[path = "gardener_tests.rs"]
mod gardener_tests;
