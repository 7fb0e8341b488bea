// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! [`CredentialStore`] backed by core `v1` Kubernetes secrets.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Secret;
use kube::api::{DeleteParams, PostParams};
use kube::{Api, Client};
use tracing::debug;

use super::{CredentialStore, RepositoryResult};
use crate::constants::SECRET_KIND;
use crate::errors::RepositoryError;

/// Credential store that reads and writes `Secret` objects.
#[derive(Clone)]
pub struct KubeCredentialStore {
    client: Client,
}

impl KubeCredentialStore {
    #[must_use]
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn api(&self, namespace: &str) -> Api<Secret> {
        Api::namespaced(self.client.clone(), namespace)
    }
}

/// Name and namespace of a secret about to be written.
fn secret_key(secret: &Secret) -> RepositoryResult<(&str, &str)> {
    let name = secret.metadata.name.as_deref().ok_or_else(|| {
        RepositoryError::InvalidConfig("secret to write has no name".to_string())
    })?;
    let namespace = secret.metadata.namespace.as_deref().ok_or_else(|| {
        RepositoryError::InvalidConfig(format!("secret {name} to write has no namespace"))
    })?;
    Ok((name, namespace))
}

#[async_trait]
impl CredentialStore for KubeCredentialStore {
    async fn get(&self, name: &str, namespace: &str) -> RepositoryResult<Secret> {
        self.api(namespace)
            .get(name)
            .await
            .map_err(|e| RepositoryError::from_kube("get", SECRET_KIND, name, namespace, e))
    }

    async fn create(&self, secret: &Secret) -> RepositoryResult<()> {
        let (name, namespace) = secret_key(secret)?;
        debug!("Creating Secret {}/{}", namespace, name);

        self.api(namespace)
            .create(&PostParams::default(), secret)
            .await
            .map_err(|e| RepositoryError::from_kube("create", SECRET_KIND, name, namespace, e))?;
        Ok(())
    }

    async fn update(&self, secret: &Secret) -> RepositoryResult<()> {
        let (name, namespace) = secret_key(secret)?;
        debug!("Replacing Secret {}/{}", namespace, name);

        // PUT keeps the resourceVersion read earlier; a concurrent write is a 409.
        self.api(namespace)
            .replace(name, &PostParams::default(), secret)
            .await
            .map_err(|e| RepositoryError::from_kube("update", SECRET_KIND, name, namespace, e))?;
        Ok(())
    }

    async fn delete(&self, name: &str, namespace: &str) -> RepositoryResult<()> {
        debug!("Deleting Secret {}/{}", namespace, name);

        match self
            .api(namespace)
            .delete(name, &DeleteParams::default())
            .await
        {
            Ok(_) => Ok(()),
            Err(e) => match RepositoryError::from_kube("delete", SECRET_KIND, name, namespace, e) {
                not_found if not_found.is_not_found() => Ok(()),
                other => Err(other),
            },
        }
    }
}
