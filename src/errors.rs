// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Error types for the watcher certificate engine.
//!
//! This module provides two layers of errors:
//! - [`RepositoryError`] for failures of the credential store and CA record
//!   accessors (Kubernetes API errors, missing status fields)
//! - [`CertificateError`] for the rotation engine itself: precondition
//!   failures raised before any mutation, and repository failures wrapped
//!   with a stable prefix naming the failing operation
//!
//! Unparsable timestamp annotations never surface as errors. They are
//! resolved by choosing the conservative action (bundle, switch, renew).

use thiserror::Error;

/// HTTP status code returned by the API server for a missing object
const HTTP_NOT_FOUND: u16 = 404;

/// HTTP status code returned by the API server for a stale `resourceVersion`
const HTTP_CONFLICT: u16 = 409;

/// Errors returned by [`crate::repository::CredentialStore`] and
/// [`crate::repository::CertificateAuthority`] implementations.
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// The requested object does not exist
    #[error("{kind} {namespace}/{name} not found")]
    NotFound {
        /// Resource kind (e.g., `Secret`, `Certificate`)
        kind: String,
        /// Object name
        name: String,
        /// Object namespace
        namespace: String,
    },

    /// The object was modified since it was read (optimistic concurrency)
    ///
    /// The caller is expected to retry the whole operation.
    #[error("{kind} {namespace}/{name} was modified concurrently, retry required")]
    Conflict {
        /// Resource kind
        kind: String,
        /// Object name
        name: String,
        /// Object namespace
        namespace: String,
    },

    /// The CA controller has not assigned a renewal time yet
    #[error("certificate {namespace}/{name} has no renewal time: {reason}")]
    NoRenewalTime {
        /// Certificate name
        name: String,
        /// Certificate namespace
        namespace: String,
        /// What is missing or malformed
        reason: String,
    },

    /// The certificate status carries no NotBefore timestamp
    #[error("certificate {namespace}/{name} has no notBefore")]
    NoNotBefore {
        /// Certificate name
        name: String,
        /// Certificate namespace
        namespace: String,
    },

    /// The certificate status carries no NotAfter timestamp
    #[error("certificate {namespace}/{name} has no notAfter")]
    NoNotAfter {
        /// Certificate name
        name: String,
        /// Certificate namespace
        namespace: String,
    },

    /// The validity window reported by the CA controller could not be parsed
    #[error("certificate {namespace}/{name} has an invalid validity: {reason}")]
    InvalidValidity {
        /// Certificate name
        name: String,
        /// Certificate namespace
        namespace: String,
        /// Parse failure details
        reason: String,
    },

    /// The repository was constructed with an unusable configuration
    #[error("invalid certificate repository configuration: {0}")]
    InvalidConfig(String),

    /// An object could not be turned into a request body
    #[error("failed to serialize {kind} {name}: {source}")]
    Serialization {
        /// Resource kind
        kind: String,
        /// Object name
        name: String,
        /// Underlying serializer error
        #[source]
        source: serde_json::Error,
    },

    /// Any other Kubernetes API failure
    #[error("{verb} {kind} {namespace}/{name} failed: {source}")]
    Api {
        /// Operation that failed (get, create, update, delete, patch)
        verb: &'static str,
        /// Resource kind
        kind: String,
        /// Object name
        name: String,
        /// Object namespace
        namespace: String,
        /// Underlying client error
        #[source]
        source: kube::Error,
    },
}

impl RepositoryError {
    /// Map a [`kube::Error`] onto the repository taxonomy.
    ///
    /// HTTP 404 becomes [`RepositoryError::NotFound`], HTTP 409 becomes
    /// [`RepositoryError::Conflict`], everything else is kept as
    /// [`RepositoryError::Api`].
    #[must_use]
    pub fn from_kube(
        verb: &'static str,
        kind: &str,
        name: &str,
        namespace: &str,
        err: kube::Error,
    ) -> Self {
        match &err {
            kube::Error::Api(status) if status.code == HTTP_NOT_FOUND => Self::NotFound {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            kube::Error::Api(status) if status.code == HTTP_CONFLICT => Self::Conflict {
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            },
            _ => Self::Api {
                verb,
                kind: kind.to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
                source: err,
            },
        }
    }

    /// Whether the object does not exist
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Whether the write lost an optimistic-concurrency race
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Errors returned by the gateway secret handlers and the SKR certificate manager.
#[derive(Error, Debug)]
pub enum CertificateError {
    /// The watcher-serving CA certificate has not been issued yet
    ///
    /// Returned before any mutation when the CA record has no (or a zero)
    /// validity window.
    #[error("watcher-serving ca certificate is not ready")]
    CaCertificateNotReady,

    /// The Kyma has no `skr-domain` annotation
    #[error("domain annotation is missing (Kyma: {kyma})")]
    DomainAnnotationMissing {
        /// Kyma name
        kyma: String,
    },

    /// The Kyma `skr-domain` annotation is present but blank
    #[error("domain annotation is empty (Kyma: {kyma})")]
    DomainAnnotationEmpty {
        /// Kyma name
        kyma: String,
    },

    /// A certificate secret lacks a required payload key
    #[error("secret {name} is missing data key {key}")]
    MissingSecretData {
        /// Secret name
        name: String,
        /// Missing payload key
        key: &'static str,
    },

    /// A repository call failed; `context` names the failing operation
    #[error("{context}: {source}")]
    Repository {
        /// Stable, human-readable operation prefix
        context: &'static str,
        /// Original repository error
        #[source]
        source: RepositoryError,
    },
}

impl CertificateError {
    /// Wrap a repository failure with an operation prefix.
    #[must_use]
    pub fn repository(context: &'static str, source: RepositoryError) -> Self {
        Self::Repository { context, source }
    }

    /// The wrapped repository error, if any
    #[must_use]
    pub fn repository_error(&self) -> Option<&RepositoryError> {
        match self {
            Self::Repository { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Extension for attaching an operation prefix to repository results.
pub trait RepositoryResultExt<T> {
    /// Wrap the error in [`CertificateError::Repository`] with `context`.
    ///
    /// # Errors
    ///
    /// Returns the wrapped error when `self` is `Err`.
    fn context(self, context: &'static str) -> Result<T, CertificateError>;
}

impl<T> RepositoryResultExt<T> for Result<T, RepositoryError> {
    fn context(self, context: &'static str) -> Result<T, CertificateError> {
        self.map_err(|source| CertificateError::repository(context, source))
    }
}

#[cfg(test)]
#[path = "errors_tests.rs"]
mod errors_tests;
