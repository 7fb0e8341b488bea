// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed views of certificate secret payloads.
//!
//! Callers that hand key material to a runtime (e.g., when syncing the SKR
//! webhook secret) need the raw bytes of specific keys. These views fail with
//! [`CertificateError::MissingSecretData`] instead of yielding empty buffers.

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;

use crate::constants::{CA_CRT, LAST_MODIFIED_AT_ANNOTATION, TLS_CRT, TLS_KEY};
use crate::errors::CertificateError;
use crate::renewal::parse_time_annotation;

/// Key material of an issued client certificate.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateSecretData {
    pub tls_crt: Vec<u8>,
    pub tls_key: Vec<u8>,
    /// Issuing CA, when the CA controller publishes it
    pub ca_crt: Option<Vec<u8>>,
}

impl CertificateSecretData {
    /// Extract `tls.crt` and `tls.key` from a certificate secret.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::MissingSecretData`] if either key is absent.
    pub fn from_secret(secret: &Secret) -> Result<Self, CertificateError> {
        Ok(Self {
            tls_crt: required(secret, TLS_CRT)?,
            tls_key: required(secret, TLS_KEY)?,
            ca_crt: optional(secret, CA_CRT),
        })
    }
}

/// Trust bundle served by the gateway.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GatewaySecretData {
    /// Concatenated CA certificates, newest first
    pub ca_crt: Vec<u8>,
    /// Time of the last bundling, if recorded and parsable
    pub last_modified_at: Option<DateTime<Utc>>,
}

impl GatewaySecretData {
    /// Extract `ca.crt` and `lastModifiedAt` from the gateway secret.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::MissingSecretData`] if `ca.crt` is absent.
    pub fn from_secret(secret: &Secret) -> Result<Self, CertificateError> {
        Ok(Self {
            ca_crt: required(secret, CA_CRT)?,
            last_modified_at: parse_time_annotation(secret, LAST_MODIFIED_AT_ANNOTATION),
        })
    }
}

fn optional(secret: &Secret, key: &str) -> Option<Vec<u8>> {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| bytes.0.clone())
}

fn required(secret: &Secret, key: &'static str) -> Result<Vec<u8>, CertificateError> {
    optional(secret, key).ok_or_else(|| CertificateError::MissingSecretData {
        name: secret.metadata.name.clone().unwrap_or_default(),
        key,
    })
}

#[cfg(test)]
#[path = "secret_data_tests.rs"]
mod secret_data_tests;
