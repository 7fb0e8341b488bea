// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Per-tenant SKR client certificates.
//!
//! Every Kyma gets one client certificate, signed by the watcher CA, that the
//! SKR watcher presents to the gateway. [`SkrCertificateManager`] issues it,
//! tears it down, and re-issues it once the gateway trust bundle has been
//! rotated past the CA generation it was signed by.
//!
//! Operations are keyed by Kyma name; the certificate record and its secret
//! share the name produced by the naming template (default `%s-webhook-tls`).

use chrono::Utc;
use clap::ValueEnum;
use k8s_openapi::api::core::v1::Secret;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::constants::{
    DEFAULT_SELF_SIGNED_CERT_RENEW_BUFFER, DEFAULT_SKR_CERTIFICATE_NAMING_TEMPLATE,
    DEFAULT_SKR_NAMESPACE, DEFAULT_SKR_SERVICE_NAME, GATEWAY_SECRET_NAME, ISTIO_NAMESPACE,
};
use crate::crd::Kyma;
use crate::errors::{CertificateError, RepositoryResultExt};
use crate::metrics;
use crate::renewal::{is_renewal_overdue, skr_secret_requires_renewal};
use crate::repository::{CertificateAuthority, CredentialStore};
use crate::secret_data::{CertificateSecretData, GatewaySecretData};

/// Placeholder in the naming template replaced by the Kyma name
pub const NAMING_TEMPLATE_PLACEHOLDER: &str = "%s";

/// Cluster-local suffixes of the SKR watcher service
const SERVICE_SUFFIXES: &[&str] = &["svc.cluster.local", "svc"];

/// How a stale SKR certificate is re-issued.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum RenewalMode {
    /// Delete the certificate secret; the CA controller re-issues it.
    #[default]
    DeleteSecret,
    /// Ask the CA controller to re-issue through the certificate record.
    Reissue,
}

/// Settings of the SKR certificate manager.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CertificateManagerConfig {
    /// Name of the watcher service in the SKR
    pub skr_service_name: String,
    /// Namespace of the watcher service in the SKR
    pub skr_namespace: String,
    /// Namespace certificate records and secrets live in
    pub certificate_namespace: String,
    /// Extra DNS names added to every SKR certificate
    pub additional_dns_names: Vec<String>,
    /// Name of the gateway secret
    pub gateway_secret_name: String,
    /// Certificate name template with exactly one `%s`
    pub naming_template: String,
    /// Grace period after the renewal time before renewal counts as overdue
    pub renew_buffer: Duration,
    pub renewal_mode: RenewalMode,
}

impl Default for CertificateManagerConfig {
    fn default() -> Self {
        Self {
            skr_service_name: DEFAULT_SKR_SERVICE_NAME.to_string(),
            skr_namespace: DEFAULT_SKR_NAMESPACE.to_string(),
            certificate_namespace: ISTIO_NAMESPACE.to_string(),
            additional_dns_names: Vec::new(),
            gateway_secret_name: GATEWAY_SECRET_NAME.to_string(),
            naming_template: DEFAULT_SKR_CERTIFICATE_NAMING_TEMPLATE.to_string(),
            renew_buffer: DEFAULT_SELF_SIGNED_CERT_RENEW_BUFFER,
            renewal_mode: RenewalMode::default(),
        }
    }
}

/// Issues, renews and deletes SKR client certificates.
pub struct SkrCertificateManager {
    authority: Arc<dyn CertificateAuthority>,
    store: Arc<dyn CredentialStore>,
    config: CertificateManagerConfig,
}

impl SkrCertificateManager {
    #[must_use]
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        store: Arc<dyn CredentialStore>,
        config: CertificateManagerConfig,
    ) -> Self {
        Self {
            authority,
            store,
            config,
        }
    }

    /// Name of the certificate record and secret of a Kyma.
    #[must_use]
    pub fn certificate_name(&self, kyma_name: &str) -> String {
        self.config
            .naming_template
            .replacen(NAMING_TEMPLATE_PLACEHOLDER, kyma_name, 1)
    }

    /// DNS names an SKR certificate is issued for.
    ///
    /// Order: the `skr-domain` annotation, the additional names, then the
    /// cluster-local names of the SKR watcher service.
    ///
    /// # Errors
    ///
    /// Returns [`CertificateError::DomainAnnotationMissing`] or
    /// [`CertificateError::DomainAnnotationEmpty`] if the Kyma carries no usable domain.
    pub fn dns_names(&self, kyma: &Kyma) -> Result<Vec<String>, CertificateError> {
        let kyma_name = kyma.metadata.name.clone().unwrap_or_default();
        let domain = kyma
            .skr_domain()
            .ok_or_else(|| CertificateError::DomainAnnotationMissing {
                kyma: kyma_name.clone(),
            })?;
        if domain.trim().is_empty() {
            return Err(CertificateError::DomainAnnotationEmpty { kyma: kyma_name });
        }

        let mut dns_names = vec![domain.to_string()];
        dns_names.extend(
            self.config
                .additional_dns_names
                .iter()
                .map(|name| name.trim())
                .filter(|name| !name.is_empty())
                .map(str::to_string),
        );
        dns_names.extend(SERVICE_SUFFIXES.iter().map(|suffix| {
            format!(
                "{}.{}.{}",
                self.config.skr_service_name, self.config.skr_namespace, suffix
            )
        }));
        Ok(dns_names)
    }

    /// Request a client certificate for a Kyma, signed by the watcher CA.
    ///
    /// # Errors
    ///
    /// Returns a domain annotation error before any authority call, or the
    /// wrapped authority failure.
    pub async fn create_skr_certificate(&self, kyma: &Kyma) -> Result<(), CertificateError> {
        let kyma_name = kyma.metadata.name.clone().unwrap_or_default();
        let dns_names = self.dns_names(kyma)?;
        let name = self.certificate_name(&kyma_name);
        let common_name = kyma.runtime_id().unwrap_or_default();

        let result = self
            .authority
            .create(
                &name,
                &self.config.certificate_namespace,
                common_name,
                &dns_names,
            )
            .await
            .context("failed to create SKR certificate");
        record("create", &result);
        result?;

        debug!("Requested SKR certificate {} for Kyma {}", name, kyma_name);
        Ok(())
    }

    /// Delete the certificate record of a Kyma, then its secret.
    ///
    /// The secret is kept if the record could not be deleted.
    ///
    /// # Errors
    ///
    /// Returns the first wrapped repository failure.
    pub async fn delete_skr_certificate(&self, kyma_name: &str) -> Result<(), CertificateError> {
        let name = self.certificate_name(kyma_name);
        let namespace = &self.config.certificate_namespace;

        let result = async {
            self.authority
                .delete(&name, namespace)
                .await
                .context("failed to delete SKR certificate")?;
            self.store
                .delete(&name, namespace)
                .await
                .context("failed to delete SKR certificate secret")
        }
        .await;
        record("delete", &result);
        result?;

        metrics::remove_self_signed_cert_not_renewed(kyma_name);
        info!("Deleted SKR certificate {} for Kyma {}", name, kyma_name);
        Ok(())
    }

    /// Re-issue the SKR certificate if it predates the last gateway bundling.
    ///
    /// A missing certificate secret means the CA controller is already
    /// re-issuing it, which is not an error.
    ///
    /// # Errors
    ///
    /// Returns wrapped failures reading either secret or re-issuing.
    pub async fn renew_skr_certificate(&self, kyma_name: &str) -> Result<(), CertificateError> {
        let name = self.certificate_name(kyma_name);
        let namespace = &self.config.certificate_namespace;

        let gateway_secret = self
            .store
            .get(&self.config.gateway_secret_name, namespace)
            .await
            .context("failed to get gateway secret")?;
        let skr_secret = match self.store.get(&name, namespace).await {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => {
                debug!("SKR certificate secret {} is being re-issued", name);
                metrics::record_skr_certificate_operation("renew", "skipped");
                return Ok(());
            }
            Err(e) => {
                return Err(CertificateError::repository(
                    "failed to get SKR certificate secret",
                    e,
                ));
            }
        };

        if !skr_secret_requires_renewal(&gateway_secret, &skr_secret) {
            debug!("SKR certificate {} is newer than the gateway trust bundle", name);
            metrics::record_skr_certificate_operation("renew", "skipped");
            return Ok(());
        }

        info!("SKR certificate {} needs renewal", name);
        let result = match self.config.renewal_mode {
            RenewalMode::DeleteSecret => self
                .store
                .delete(&name, namespace)
                .await
                .context("failed to delete SKR certificate secret"),
            RenewalMode::Reissue => self
                .authority
                .renew(&name)
                .await
                .context("failed to renew SKR certificate"),
        };
        record("renew", &result);
        result?;

        info!("SKR certificate {} renewed", name);
        Ok(())
    }

    /// Whether the CA controller missed the renewal time by more than the buffer.
    ///
    /// # Errors
    ///
    /// Returns the wrapped failure reading the renewal time.
    pub async fn is_skr_certificate_renewal_overdue(
        &self,
        kyma_name: &str,
    ) -> Result<bool, CertificateError> {
        let name = self.certificate_name(kyma_name);
        let renewal_time = self
            .authority
            .get_renewal_time(&name, &self.config.certificate_namespace)
            .await
            .context("failed to get SKR certificate renewal time")?;

        let overdue = is_renewal_overdue(renewal_time, Utc::now(), self.config.renew_buffer);
        if overdue {
            warn!(
                "SKR certificate {} was due for renewal at {} and has not been renewed",
                name, renewal_time
            );
        }
        metrics::set_self_signed_cert_not_renewed(kyma_name, overdue);
        Ok(overdue)
    }

    /// The certificate secret of a Kyma.
    ///
    /// # Errors
    ///
    /// Returns the wrapped read failure; a missing secret keeps its
    /// [`crate::errors::RepositoryError::NotFound`] source.
    pub async fn get_skr_certificate_secret(
        &self,
        kyma_name: &str,
    ) -> Result<Secret, CertificateError> {
        self.store
            .get(
                &self.certificate_name(kyma_name),
                &self.config.certificate_namespace,
            )
            .await
            .context("failed to get SKR certificate secret")
    }

    /// The gateway secret.
    ///
    /// # Errors
    ///
    /// Returns the wrapped read failure.
    pub async fn get_gateway_certificate_secret(&self) -> Result<Secret, CertificateError> {
        self.store
            .get(
                &self.config.gateway_secret_name,
                &self.config.certificate_namespace,
            )
            .await
            .context("failed to get gateway certificate secret")
    }

    /// Key material of the certificate secret of a Kyma.
    ///
    /// # Errors
    ///
    /// Returns the wrapped read failure or [`CertificateError::MissingSecretData`].
    pub async fn get_skr_certificate_secret_data(
        &self,
        kyma_name: &str,
    ) -> Result<CertificateSecretData, CertificateError> {
        let secret = self.get_skr_certificate_secret(kyma_name).await?;
        CertificateSecretData::from_secret(&secret)
    }

    /// Trust bundle of the gateway secret.
    ///
    /// # Errors
    ///
    /// Returns the wrapped read failure or [`CertificateError::MissingSecretData`].
    pub async fn get_gateway_certificate_secret_data(
        &self,
    ) -> Result<GatewaySecretData, CertificateError> {
        let secret = self.get_gateway_certificate_secret().await?;
        GatewaySecretData::from_secret(&secret)
    }

    /// Whether the certificate record of a Kyma exists.
    ///
    /// # Errors
    ///
    /// Returns the wrapped authority failure.
    pub async fn skr_certificate_exists(&self, kyma_name: &str) -> Result<bool, CertificateError> {
        self.authority
            .exists(&self.certificate_name(kyma_name))
            .await
            .context("failed to check SKR certificate existence")
    }
}

fn record<T>(operation: &str, result: &Result<T, CertificateError>) {
    let status = if result.is_ok() { "success" } else { "error" };
    metrics::record_skr_certificate_operation(operation, status);
}

#[cfg(test)]
#[path = "certificate_tests.rs"]
mod certificate_tests;
