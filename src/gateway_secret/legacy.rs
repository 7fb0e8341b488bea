// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Previous gateway secret strategy: copy the root secret when a new CA appears.
//!
//! Tenants holding certificates from the previous CA lose trust until they
//! are re-issued.

use async_trait::async_trait;
use chrono::Utc;
use k8s_openapi::api::core::v1::Secret;
use std::sync::Arc;
use tracing::{debug, info};

use super::{ca_validity, copy_keys, seed_gateway_secret, GatewaySecretConfig, GatewaySecretHandler};
use crate::constants::{CA_CRT, GATEWAY_SECRET_NAME, LAST_MODIFIED_AT_ANNOTATION, TLS_CRT, TLS_KEY};
use crate::errors::{CertificateError, RepositoryResultExt};
use crate::metrics;
use crate::renewal::{parse_time_annotation, requires_bundling, set_time_annotation};
use crate::repository::{CertificateAuthority, CredentialStore};

const ROOT_SECRET_KEYS: &[&str] = &[TLS_CRT, TLS_KEY, CA_CRT];

/// Gateway secret handler that mirrors the root secret.
pub struct LegacyGatewaySecretHandler {
    authority: Arc<dyn CertificateAuthority>,
    store: Arc<dyn CredentialStore>,
    config: GatewaySecretConfig,
}

impl LegacyGatewaySecretHandler {
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
}

#[async_trait]
impl GatewaySecretHandler for LegacyGatewaySecretHandler {
    async fn manage_gateway_secret(&self, root_secret: &Secret) -> Result<(), CertificateError> {
        let mut gateway_secret = match self
            .store
            .get(GATEWAY_SECRET_NAME, &self.config.namespace)
            .await
        {
            Ok(secret) => secret,
            Err(e) if e.is_not_found() => {
                let seeded = seed_gateway_secret(
                    &self.config.namespace,
                    root_secret,
                    ROOT_SECRET_KEYS,
                    Utc::now(),
                );
                self.store
                    .create(&seeded)
                    .await
                    .context("failed to create gateway secret")?;
                info!("Created gateway secret {}/{}", self.config.namespace, GATEWAY_SECRET_NAME);
                metrics::record_gateway_secret_operation("seed");
                return Ok(());
            }
            Err(e) => return Err(CertificateError::repository("failed to get gateway secret", e)),
        };

        let (not_before, _) = ca_validity(self.authority.as_ref(), &self.config).await?;
        let last_modified_at = parse_time_annotation(&gateway_secret, LAST_MODIFIED_AT_ANNOTATION);
        if !requires_bundling(last_modified_at, not_before) {
            debug!("Gateway secret is up to date with the root secret");
            return Ok(());
        }

        copy_keys(&mut gateway_secret, root_secret, ROOT_SECRET_KEYS);
        set_time_annotation(&mut gateway_secret, LAST_MODIFIED_AT_ANNOTATION, Utc::now());
        self.store
            .update(&gateway_secret)
            .await
            .context("failed to update gateway secret")?;

        info!("Replaced gateway secret with root secret issued at {}", not_before);
        metrics::record_gateway_secret_operation("legacy_sync");
        Ok(())
    }
}

#[cfg(test)]
#[path = "legacy_tests.rs"]
mod legacy_tests;
