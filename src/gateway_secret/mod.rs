// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Lifecycle of the shared Istio gateway secret `klm-istio-gateway`.
//!
//! The gateway terminates mTLS for every SKR watcher. Its trust bundle must
//! accept client certificates signed by the previous CA generation while the
//! tenants are moved to the new one, so rotation happens in two steps:
//!
//! 1. **Bundling** - when a new CA is issued, its certificate is prepended to
//!    `ca.crt` and `lastModifiedAt` is stamped. SKR certificates created
//!    before that instant are re-issued by the SKR certificate manager.
//!    Expired CA certificates are dropped from the bundle on every pass.
//! 2. **Switching** - shortly before the CA whose leaf pair is served
//!    expires, the gateway starts serving the leaf pair of the newest CA.
//!
//! Two strategies implement [`GatewaySecretHandler`]:
//!
//! - [`cabundle::GatewaySecretRotator`] - the bundling strategy above
//! - [`legacy::LegacyGatewaySecretHandler`] - copies the root secret
//!   wholesale whenever a new CA appears (short trust outage for tenants)

pub mod bundler;
pub mod cabundle;
pub mod legacy;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use std::collections::BTreeMap;
use std::time::Duration;

use crate::constants::{
    CA_CERTIFICATE_NAME, DEFAULT_CERT_SWITCH_BEFORE_EXPIRATION, GATEWAY_SECRET_NAME,
    ISTIO_NAMESPACE, LAST_MODIFIED_AT_ANNOTATION,
};
use crate::errors::{CertificateError, RepositoryError};
use crate::renewal::set_time_annotation;
use crate::repository::CertificateAuthority;

/// A strategy for keeping the gateway secret in sync with the root secret.
#[async_trait]
pub trait GatewaySecretHandler: Send + Sync {
    /// Reconcile the gateway secret against a freshly fetched root secret.
    ///
    /// Performs at most one create or one update of the gateway secret.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::CaCertificateNotReady`] before any mutation
    /// if the CA certificate has no validity window yet, and
    /// [`CertificateError::Repository`] for failed reads and writes.
    async fn manage_gateway_secret(&self, root_secret: &Secret) -> Result<(), CertificateError>;
}

/// Settings shared by both gateway secret strategies.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewaySecretConfig {
    /// Name of the CA certificate record the root secret is issued from
    pub ca_certificate_name: String,
    /// Namespace of the root secret, the CA record and the gateway secret
    pub namespace: String,
    /// How long before the served CA expires the leaf pair is switched
    pub switch_cert_before_expiration: Duration,
}

impl Default for GatewaySecretConfig {
    fn default() -> Self {
        Self {
            ca_certificate_name: CA_CERTIFICATE_NAME.to_string(),
            namespace: ISTIO_NAMESPACE.to_string(),
            switch_cert_before_expiration: DEFAULT_CERT_SWITCH_BEFORE_EXPIRATION,
        }
    }
}

/// Read the CA validity window, treating an unissued CA as not ready.
pub(crate) async fn ca_validity(
    authority: &dyn CertificateAuthority,
    config: &GatewaySecretConfig,
) -> Result<(DateTime<Utc>, DateTime<Utc>), CertificateError> {
    let (not_before, not_after) = match authority
        .get_validity(&config.ca_certificate_name, &config.namespace)
        .await
    {
        Ok(validity) => validity,
        Err(RepositoryError::NoNotBefore { .. } | RepositoryError::NoNotAfter { .. }) => {
            return Err(CertificateError::CaCertificateNotReady);
        }
        Err(e) => {
            return Err(CertificateError::repository(
                "failed to get CA certificate validity",
                e,
            ));
        }
    };

    if not_before.timestamp() == 0 || not_after.timestamp() == 0 {
        return Err(CertificateError::CaCertificateNotReady);
    }
    Ok((not_before, not_after))
}

/// Bytes stored under `key`, if any.
pub(crate) fn data_of<'a>(secret: &'a Secret, key: &str) -> Option<&'a [u8]> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| bytes.0.as_slice())
}

/// Store `value` under `key`, creating the data map if needed.
pub(crate) fn set_data(secret: &mut Secret, key: &str, value: Vec<u8>) {
    secret
        .data
        .get_or_insert_with(BTreeMap::new)
        .insert(key.to_string(), ByteString(value));
}

/// Copy `keys` from the root secret, leaving keys the root lacks untouched.
pub(crate) fn copy_keys(target: &mut Secret, root_secret: &Secret, keys: &[&str]) {
    for key in keys {
        if let Some(value) = data_of(root_secret, key) {
            set_data(target, key, value.to_vec());
        }
    }
}

/// A new gateway secret seeded from the root secret, stamped `lastModifiedAt = now`.
pub(crate) fn seed_gateway_secret(
    namespace: &str,
    root_secret: &Secret,
    keys: &[&str],
    now: DateTime<Utc>,
) -> Secret {
    let mut secret = Secret {
        metadata: ObjectMeta {
            name: Some(GATEWAY_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        ..Default::default()
    };
    copy_keys(&mut secret, root_secret, keys);
    set_time_annotation(&mut secret, LAST_MODIFIED_AT_ANNOTATION, now);
    secret
}
