// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Command-line configuration of the certificate controller.
//!
//! Durations accept Go-style strings (`1441h`, `10m`, `1h30m`), see
//! [`crate::duration::parse_duration`].

use anyhow::{bail, Result};
use clap::{Parser, ValueEnum};
use std::time::Duration;

use crate::certificate::{CertificateManagerConfig, RenewalMode, NAMING_TEMPLATE_PLACEHOLDER};
use crate::constants::{
    CA_CERTIFICATE_NAME, DEFAULT_ISSUER_NAME, DEFAULT_SELF_SIGNED_CERT_KEY_SIZE,
    DEFAULT_SKR_CERTIFICATE_NAMING_TEMPLATE, DEFAULT_SKR_NAMESPACE, DEFAULT_SKR_SERVICE_NAME,
    GATEWAY_SECRET_NAME, ISTIO_NAMESPACE, METRICS_SERVER_PORT, SUPPORTED_KEY_SIZES,
};
use crate::duration::parse_duration;
use crate::gateway_secret::GatewaySecretConfig;
use crate::repository::CertificateValues;

/// CA controller that issues the watcher certificates.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum CertificateManagement {
    #[default]
    #[value(name = "cert-manager.io/v1")]
    CertManager,
    #[value(name = "cert.gardener.cloud/v1alpha1")]
    Gardener,
}

/// Watcher certificate controller settings.
#[derive(Clone, Debug, Parser)]
#[command(name = "klm-certs", version, about)]
pub struct Config {
    /// Namespace of the root secret, the gateway secret and all certificates
    #[arg(long, default_value = ISTIO_NAMESPACE)]
    pub istio_namespace: String,

    /// CA controller API used to issue certificates
    #[arg(long, value_enum, default_value = "cert-manager.io/v1")]
    pub certificate_management: CertificateManagement,

    /// Issuer SKR certificates are signed by
    #[arg(long, default_value = DEFAULT_ISSUER_NAME)]
    pub self_signed_cert_issuer_name: String,

    /// Namespace of the issuer (Gardener only)
    #[arg(long, default_value = ISTIO_NAMESPACE)]
    pub self_signed_cert_issuer_namespace: String,

    /// Lifetime of SKR certificates
    #[arg(long, value_parser = parse_duration, default_value = "1441h")]
    pub self_signed_cert_duration: Duration,

    /// How long before expiry the CA controller renews SKR certificates
    #[arg(long, value_parser = parse_duration, default_value = "1440h")]
    pub self_signed_cert_renew_before: Duration,

    /// Grace period after the renewal time before renewal counts as overdue
    #[arg(long, value_parser = parse_duration, default_value = "24h")]
    pub self_signed_cert_renew_buffer: Duration,

    /// RSA key size of SKR certificates
    #[arg(long, default_value_t = DEFAULT_SELF_SIGNED_CERT_KEY_SIZE)]
    pub self_signed_cert_key_size: u32,

    /// Name template of SKR certificates; `%s` is replaced by the Kyma name
    #[arg(long, default_value = DEFAULT_SKR_CERTIFICATE_NAMING_TEMPLATE)]
    pub self_signed_cert_naming_template: String,

    /// How long before the served CA expires the gateway switches to the new one
    #[arg(long, value_parser = parse_duration, default_value = "24h")]
    pub istio_gateway_cert_switch_before_expiration_time: Duration,

    /// Requeue interval after a successful gateway secret pass
    #[arg(long, value_parser = parse_duration, default_value = "5m")]
    pub istio_gateway_secret_requeue_success_interval: Duration,

    /// Requeue interval after a failed gateway secret pass
    #[arg(long, value_parser = parse_duration, default_value = "2s")]
    pub istio_gateway_secret_requeue_error_interval: Duration,

    /// Mirror the root secret instead of bundling CA generations
    #[arg(long)]
    pub legacy_strategy_for_istio_gateway_secret: bool,

    /// Name of the watcher service in the SKR
    #[arg(long, default_value = DEFAULT_SKR_SERVICE_NAME)]
    pub skr_service_name: String,

    /// Namespace of the watcher service in the SKR
    #[arg(long, default_value = DEFAULT_SKR_NAMESPACE)]
    pub skr_namespace: String,

    /// Extra DNS names for SKR certificates (comma separated)
    #[arg(long, value_delimiter = ',')]
    pub additional_dns_names: Vec<String>,

    /// How stale SKR certificates are re-issued
    #[arg(long, value_enum, default_value = "delete-secret")]
    pub skr_certificate_renewal_mode: RenewalMode,

    /// Port of the Prometheus metrics endpoint
    #[arg(long, default_value_t = METRICS_SERVER_PORT)]
    pub metrics_port: u16,
}

impl Config {
    /// Reject settings the certificate engine cannot work with.
    ///
    /// # Errors
    ///
    /// Returns an error for an unsupported key size or a naming template
    /// without exactly one `%s`.
    pub fn validate(&self) -> Result<()> {
        if !SUPPORTED_KEY_SIZES.contains(&self.self_signed_cert_key_size) {
            bail!(
                "unsupported key size {}, supported: {:?}",
                self.self_signed_cert_key_size,
                SUPPORTED_KEY_SIZES
            );
        }

        let placeholders = self
            .self_signed_cert_naming_template
            .matches(NAMING_TEMPLATE_PLACEHOLDER)
            .count();
        if placeholders != 1 {
            bail!(
                "naming template '{}' must contain exactly one {}",
                self.self_signed_cert_naming_template,
                NAMING_TEMPLATE_PLACEHOLDER
            );
        }

        if self.istio_namespace.is_empty() {
            bail!("istio namespace must not be empty");
        }
        Ok(())
    }

    /// Issuance parameters for the CA controller adapter.
    #[must_use]
    pub fn certificate_values(&self) -> CertificateValues {
        CertificateValues {
            namespace: self.istio_namespace.clone(),
            duration: self.self_signed_cert_duration,
            renew_before: self.self_signed_cert_renew_before,
            key_size: self.self_signed_cert_key_size,
        }
    }

    /// Settings of the SKR certificate manager.
    #[must_use]
    pub fn certificate_manager_config(&self) -> CertificateManagerConfig {
        CertificateManagerConfig {
            skr_service_name: self.skr_service_name.clone(),
            skr_namespace: self.skr_namespace.clone(),
            certificate_namespace: self.istio_namespace.clone(),
            additional_dns_names: self.additional_dns_names.clone(),
            gateway_secret_name: GATEWAY_SECRET_NAME.to_string(),
            naming_template: self.self_signed_cert_naming_template.clone(),
            renew_buffer: self.self_signed_cert_renew_buffer,
            renewal_mode: self.skr_certificate_renewal_mode,
        }
    }

    /// Settings of the gateway secret handlers.
    #[must_use]
    pub fn gateway_secret_config(&self) -> GatewaySecretConfig {
        GatewaySecretConfig {
            ca_certificate_name: CA_CERTIFICATE_NAME.to_string(),
            namespace: self.istio_namespace.clone(),
            switch_cert_before_expiration: self.istio_gateway_cert_switch_before_expiration_time,
        }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod config_tests;
