// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Zero-downtime rotation of the gateway secret through CA bundling.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use std::sync::Arc;
use tracing::{debug, info};

use super::bundler::{contains_certificate, drop_expired_certificates};
use super::{
    ca_validity, copy_keys, data_of, seed_gateway_secret, set_data, GatewaySecretConfig,
    GatewaySecretHandler,
};
use crate::constants::{
    CA_CRT, CURRENT_CA_EXPIRATION_ANNOTATION, GATEWAY_SECRET_NAME, LAST_MODIFIED_AT_ANNOTATION,
    TEMP_CA_CRT, TLS_CRT, TLS_KEY,
};
use crate::errors::{CertificateError, RepositoryResultExt};
use crate::metrics;
use crate::renewal::{
    parse_time_annotation, requires_bundling, requires_switching, set_time_annotation,
};
use crate::repository::{CertificateAuthority, CredentialStore};

/// Gateway secret handler that bundles CA generations before switching.
pub struct GatewaySecretRotator {
    authority: Arc<dyn CertificateAuthority>,
    store: Arc<dyn CredentialStore>,
    config: GatewaySecretConfig,
}

impl GatewaySecretRotator {
    #[must_use]
    pub fn new(
        authority: Arc<dyn CertificateAuthority>,
        store: Arc<dyn CredentialStore>,
        config: GatewaySecretConfig,
    ) -> Self {
        Self {
            authority,
            store,
            config,
        }
    }

    async fn create_from_root_secret(
        &self,
        root_secret: &Secret,
        not_after: chrono::DateTime<Utc>,
    ) -> Result<(), CertificateError> {
        let mut gateway_secret = seed_gateway_secret(
            &self.config.namespace,
            root_secret,
            &[TLS_CRT, TLS_KEY, CA_CRT],
            Utc::now(),
        );
        set_data(
            &mut gateway_secret,
            TEMP_CA_CRT,
            data_of(root_secret, CA_CRT).unwrap_or_default().to_vec(),
        );
        set_time_annotation(&mut gateway_secret, CURRENT_CA_EXPIRATION_ANNOTATION, not_after);

        self.store
            .create(&gateway_secret)
            .await
            .context("failed to create gateway secret")?;

        info!(
            "Created gateway secret {}/{} from root secret",
            self.config.namespace, GATEWAY_SECRET_NAME
        );
        metrics::record_gateway_secret_operation("seed");
        Ok(())
    }
}

/// Prepend the root CA to the gateway trust bundle and stage it in `temp.ca.crt`.
///
/// The root CA is not prepended again if the bundle already contains it.
/// Returns whether `ca.crt` changed.
pub fn bundle_ca_certificate(gateway_secret: &mut Secret, root_secret: &Secret) -> bool {
    let root_ca = data_of(root_secret, CA_CRT).unwrap_or_default().to_vec();
    let previous = data_of(gateway_secret, CA_CRT).unwrap_or_default();

    let changed = !contains_certificate(previous, &root_ca);
    if changed {
        let mut bundle = Vec::with_capacity(root_ca.len() + previous.len());
        bundle.extend_from_slice(&root_ca);
        bundle.extend_from_slice(previous);
        set_data(gateway_secret, CA_CRT, bundle);
    }

    set_data(gateway_secret, TEMP_CA_CRT, root_ca);
    changed
}

#[async_trait]
impl GatewaySecretHandler for GatewaySecretRotator {
    async fn manage_gateway_secret(&self, root_secret: &Secret) -> Result<(), CertificateError> {
        let (not_before, not_after) = ca_validity(self.authority.as_ref(), &self.config).await?;

        let mut gateway_secret = match self
            .store
            .get(GATEWAY_SECRET_NAME, &self.config.namespace)
            .await
        {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => {
                return self.create_from_root_secret(root_secret, not_after).await;
            }
            Err(e) => return Err(CertificateError::repository("failed to get gateway secret", e)),
        };

        // Secrets written by the legacy strategy have no staged CA yet
        if data_of(&gateway_secret, TEMP_CA_CRT).is_none() {
            let staged = data_of(root_secret, CA_CRT).unwrap_or_default().to_vec();
            set_data(&mut gateway_secret, TEMP_CA_CRT, staged);
        }

        let now = Utc::now();
        let last_modified_at = parse_time_annotation(&gateway_secret, LAST_MODIFIED_AT_ANNOTATION);
        if requires_bundling(last_modified_at, not_before) {
            let changed = bundle_ca_certificate(&mut gateway_secret, root_secret);
            set_time_annotation(&mut gateway_secret, LAST_MODIFIED_AT_ANNOTATION, now);
            info!(
                "Bundled CA issued at {} into gateway secret (ca.crt changed: {})",
                not_before, changed
            );
            metrics::record_gateway_secret_operation("bundle");
        } else {
            debug!("Gateway secret trust bundle already contains the current CA");
        }

        let pruned = drop_expired_certificates(
            data_of(&gateway_secret, CA_CRT).unwrap_or_default(),
            now,
        );
        if let Some(bundle) = pruned {
            set_data(&mut gateway_secret, CA_CRT, bundle);
            info!("Dropped expired CA certificates from gateway trust bundle");
            metrics::record_gateway_secret_operation("drop_expired");
        }

        let current_ca_expiration =
            parse_time_annotation(&gateway_secret, CURRENT_CA_EXPIRATION_ANNOTATION);
        if requires_switching(
            current_ca_expiration,
            now,
            self.config.switch_cert_before_expiration,
        ) {
            copy_keys(&mut gateway_secret, root_secret, &[TLS_CRT, TLS_KEY]);
            set_time_annotation(&mut gateway_secret, CURRENT_CA_EXPIRATION_ANNOTATION, not_after);
            info!(
                "Switched gateway certificate to CA expiring at {}",
                not_after
            );
            metrics::record_gateway_secret_operation("switch");
        }

        self.store
            .update(&gateway_secret)
            .await
            .context("failed to update gateway secret")
    }
}

#[cfg(test)]
#[path = "cabundle_tests.rs"]
mod cabundle_tests;
