// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Accessors for the objects the certificate engine reads and writes.
//!
//! The engine never talks to the Kubernetes API directly. It goes through two
//! traits so that the CA controller in use (cert-manager or Gardener
//! cert-management) is a swappable adapter and tests can use in-memory fakes:
//!
//! - [`CertificateAuthority`] - certificate records owned by the CA controller
//! - [`CredentialStore`] - secrets holding issued key material
//!
//! # Adapters
//!
//! - [`certmanager::CertManagerRepository`] - `cert-manager.io/v1` certificates
//! - [`gardener::GardenerRepository`] - `cert.gardener.cloud/v1alpha1` certificates
//! - [`secret::KubeCredentialStore`] - core `v1` secrets

pub mod certmanager;
pub mod gardener;
pub mod secret;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use std::time::Duration;

use crate::errors::RepositoryError;

/// Result type returned by repository calls.
pub type RepositoryResult<T> = Result<T, RepositoryError>;

/// Certificate records managed by an external CA controller.
///
/// Implementations only describe the desired certificate and read back what
/// the CA controller reports; signing happens elsewhere.
#[async_trait]
pub trait CertificateAuthority: Send + Sync {
    /// Request issuance of a certificate. Repeated calls converge on the same record.
    async fn create(
        &self,
        name: &str,
        namespace: &str,
        common_name: &str,
        dns_names: &[String],
    ) -> RepositoryResult<()>;

    /// Delete a certificate record. A missing record is not an error.
    async fn delete(&self, name: &str, namespace: &str) -> RepositoryResult<()>;

    /// Renewal time the CA controller assigned to the certificate.
    async fn get_renewal_time(&self, name: &str, namespace: &str)
        -> RepositoryResult<DateTime<Utc>>;

    /// Validity window `(not_before, not_after)` of the issued certificate.
    async fn get_validity(
        &self,
        name: &str,
        namespace: &str,
    ) -> RepositoryResult<(DateTime<Utc>, DateTime<Utc>)>;

    /// Ask the CA controller to re-issue the certificate now.
    ///
    /// Operates in the namespace the adapter was configured with.
    async fn renew(&self, name: &str) -> RepositoryResult<()>;

    /// Whether the certificate record exists in the adapter namespace.
    async fn exists(&self, name: &str) -> RepositoryResult<bool>;
}

/// Named credential records with byte payloads and string annotations.
#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Fetch a secret. A missing secret yields [`RepositoryError::NotFound`].
    async fn get(&self, name: &str, namespace: &str) -> RepositoryResult<Secret>;

    /// Create a secret from its own metadata name and namespace.
    async fn create(&self, secret: &Secret) -> RepositoryResult<()>;

    /// Replace a secret. A stale `resourceVersion` yields [`RepositoryError::Conflict`].
    async fn update(&self, secret: &Secret) -> RepositoryResult<()>;

    /// Delete a secret. A missing secret is not an error.
    async fn delete(&self, name: &str, namespace: &str) -> RepositoryResult<()>;
}

/// Issuance parameters shared by all CA controller adapters.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateValues {
    /// Namespace certificate records live in
    pub namespace: String,
    /// Lifetime of issued certificates
    pub duration: Duration,
    /// How long before expiry the CA controller renews
    pub renew_before: Duration,
    /// RSA key size
    pub key_size: u32,
}

impl CertificateValues {
    /// Reject values no adapter can work with.
    ///
    /// # Errors
    ///
    /// Returns [`RepositoryError::InvalidConfig`] if the namespace is empty.
    pub fn validate(&self) -> RepositoryResult<()> {
        if self.namespace.is_empty() {
            return Err(RepositoryError::InvalidConfig(
                "certificate namespace must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
