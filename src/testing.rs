// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! In-memory fakes of the repository traits for unit tests.
//!
//! Both fakes record every call as `"<op> <name>"` so tests can assert the
//! exact sequence of API interactions, and accept injected failures per
//! operation.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::Secret;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::ByteString;
use rcgen::{date_time_ymd, BasicConstraints, CertificateParams, DnType, IsCa, KeyPair};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Mutex;

use crate::errors::RepositoryError;
use crate::repository::{CertificateAuthority, CredentialStore, RepositoryResult};

fn injected(op: &str) -> RepositoryError {
    RepositoryError::InvalidConfig(format!("injected {op} failure"))
}

/// Build a secret from string payloads.
pub fn secret(name: &str, namespace: &str, data: &[(&str, &str)]) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            ..Default::default()
        },
        data: Some(
            data.iter()
                .map(|(k, v)| ((*k).to_string(), ByteString(v.as_bytes().to_vec())))
                .collect(),
        ),
        ..Default::default()
    }
}

/// A self-signed CA certificate in PEM form expiring at `year`-01-01.
pub fn ca_certificate_pem(common_name: &str, year: i32) -> String {
    let mut params = CertificateParams::new(Vec::<String>::new()).unwrap();
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.not_before = date_time_ymd(year - 1, 1, 1);
    params.not_after = date_time_ymd(year, 1, 1);
    let key_pair = KeyPair::generate().unwrap();
    params.self_signed(&key_pair).unwrap().pem()
}

/// Payload of `key` as UTF-8, empty if absent.
pub fn data_str(secret: &Secret, key: &str) -> String {
    secret
        .data
        .as_ref()
        .and_then(|data| data.get(key))
        .map(|bytes| String::from_utf8_lossy(&bytes.0).into_owned())
        .unwrap_or_default()
}

/// Value of annotation `key`, empty if absent.
pub fn annotation(secret: &Secret, key: &str) -> String {
    secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(key))
        .cloned()
        .unwrap_or_default()
}

/// Credential store keeping secrets in a map keyed by `(namespace, name)`.
#[derive(Default)]
pub struct FakeCredentialStore {
    secrets: Mutex<BTreeMap<(String, String), Secret>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<&'static str>>,
    conflict_on_update: Mutex<bool>,
}

impl FakeCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a secret without recording a call.
    pub fn insert(&self, secret: Secret) {
        let key = (
            secret.metadata.namespace.clone().unwrap_or_default(),
            secret.metadata.name.clone().unwrap_or_default(),
        );
        self.secrets.lock().unwrap().insert(key, secret);
    }

    /// Read a secret without recording a call.
    pub fn stored(&self, name: &str, namespace: &str) -> Option<Secret> {
        self.secrets
            .lock()
            .unwrap()
            .get(&(namespace.to_string(), name.to_string()))
            .cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Number of recorded calls of `op` (e.g., `"update"`).
    pub fn count(&self, op: &str) -> usize {
        let prefix = format!("{op} ");
        self.calls
            .lock()
            .unwrap()
            .iter()
            .filter(|call| call.starts_with(&prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().unwrap().clear();
    }

    /// Make every subsequent `op` call fail.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    /// Make every subsequent update fail with [`RepositoryError::Conflict`].
    pub fn conflict_on_update(&self) {
        *self.conflict_on_update.lock().unwrap() = true;
    }

    fn record(&self, op: &'static str, name: &str) -> RepositoryResult<()> {
        self.calls.lock().unwrap().push(format!("{op} {name}"));
        if self.failing.lock().unwrap().contains(op) {
            return Err(injected(op));
        }
        Ok(())
    }
}

#[async_trait]
impl CredentialStore for FakeCredentialStore {
    async fn get(&self, name: &str, namespace: &str) -> RepositoryResult<Secret> {
        self.record("get", name)?;
        self.stored(name, namespace)
            .ok_or_else(|| RepositoryError::NotFound {
                kind: "Secret".to_string(),
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn create(&self, secret: &Secret) -> RepositoryResult<()> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        self.record("create", &name)?;
        let mut created = secret.clone();
        created.metadata.resource_version = Some("1".to_string());
        self.insert(created);
        Ok(())
    }

    async fn update(&self, secret: &Secret) -> RepositoryResult<()> {
        let name = secret.metadata.name.clone().unwrap_or_default();
        let namespace = secret.metadata.namespace.clone().unwrap_or_default();
        self.record("update", &name)?;

        let Some(current) = self.stored(&name, &namespace) else {
            return Err(RepositoryError::NotFound {
                kind: "Secret".to_string(),
                name,
                namespace,
            });
        };
        if *self.conflict_on_update.lock().unwrap()
            || current.metadata.resource_version != secret.metadata.resource_version
        {
            return Err(RepositoryError::Conflict {
                kind: "Secret".to_string(),
                name,
                namespace,
            });
        }

        let version = current
            .metadata
            .resource_version
            .as_deref()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(0);
        let mut updated = secret.clone();
        updated.metadata.resource_version = Some((version + 1).to_string());
        self.insert(updated);
        Ok(())
    }

    async fn delete(&self, name: &str, namespace: &str) -> RepositoryResult<()> {
        self.record("delete", name)?;
        self.secrets
            .lock()
            .unwrap()
            .remove(&(namespace.to_string(), name.to_string()));
        Ok(())
    }
}

/// A certificate request recorded by [`FakeCertificateAuthority::create`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct IssuedCertificate {
    pub namespace: String,
    pub common_name: String,
    pub dns_names: Vec<String>,
}

/// Certificate authority with scripted validity windows and renewal times.
#[derive(Default)]
pub struct FakeCertificateAuthority {
    issued: Mutex<BTreeMap<String, IssuedCertificate>>,
    validity: Mutex<BTreeMap<String, (DateTime<Utc>, DateTime<Utc>)>>,
    renewal_times: Mutex<BTreeMap<String, DateTime<Utc>>>,
    calls: Mutex<Vec<String>>,
    failing: Mutex<BTreeSet<&'static str>>,
}

impl FakeCertificateAuthority {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_validity(&self, name: &str, not_before: DateTime<Utc>, not_after: DateTime<Utc>) {
        self.validity
            .lock()
            .unwrap()
            .insert(name.to_string(), (not_before, not_after));
    }

    pub fn set_renewal_time(&self, name: &str, renewal: DateTime<Utc>) {
        self.renewal_times
            .lock()
            .unwrap()
            .insert(name.to_string(), renewal);
    }

    pub fn issued(&self, name: &str) -> Option<IssuedCertificate> {
        self.issued.lock().unwrap().get(name).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    /// Make every subsequent `op` call fail.
    pub fn fail(&self, op: &'static str) {
        self.failing.lock().unwrap().insert(op);
    }

    fn record(&self, op: &'static str, name: &str) -> RepositoryResult<()> {
        self.calls.lock().unwrap().push(format!("{op} {name}"));
        if self.failing.lock().unwrap().contains(op) {
            return Err(injected(op));
        }
        Ok(())
    }
}

#[async_trait]
impl CertificateAuthority for FakeCertificateAuthority {
    async fn create(
        &self,
        name: &str,
        namespace: &str,
        common_name: &str,
        dns_names: &[String],
    ) -> RepositoryResult<()> {
        self.record("create", name)?;
        self.issued.lock().unwrap().insert(
            name.to_string(),
            IssuedCertificate {
                namespace: namespace.to_string(),
                common_name: common_name.to_string(),
                dns_names: dns_names.to_vec(),
            },
        );
        Ok(())
    }

    async fn delete(&self, name: &str, _namespace: &str) -> RepositoryResult<()> {
        self.record("delete", name)?;
        self.issued.lock().unwrap().remove(name);
        Ok(())
    }

    async fn get_renewal_time(
        &self,
        name: &str,
        namespace: &str,
    ) -> RepositoryResult<DateTime<Utc>> {
        self.record("get_renewal_time", name)?;
        self.renewal_times
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .ok_or_else(|| RepositoryError::NoRenewalTime {
                name: name.to_string(),
                namespace: namespace.to_string(),
                reason: "not scripted".to_string(),
            })
    }

    async fn get_validity(
        &self,
        name: &str,
        namespace: &str,
    ) -> RepositoryResult<(DateTime<Utc>, DateTime<Utc>)> {
        self.record("get_validity", name)?;
        self.validity
            .lock()
            .unwrap()
            .get(name)
            .copied()
            .ok_or_else(|| RepositoryError::NoNotBefore {
                name: name.to_string(),
                namespace: namespace.to_string(),
            })
    }

    async fn renew(&self, name: &str) -> RepositoryResult<()> {
        self.record("renew", name)
    }

    async fn exists(&self, name: &str) -> RepositoryResult<bool> {
        self.record("exists", name)?;
        Ok(self.issued.lock().unwrap().contains_key(name))
    }
}
