// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

#![allow(unexpected_cfgs)]

//! # klm-certs - Watcher mTLS Certificate Rotation for Kyma
//!
//! The SKR watchers of every managed Kyma runtime call back into the control
//! plane through an Istio gateway secured with mutual TLS. This library keeps
//! that certificate chain valid across CA rotations without a trust outage.
//!
//! ## Overview
//!
//! - The **gateway secret** (`klm-istio-gateway`) bundles the new CA into its
//!   trust store as soon as it is issued and switches the served leaf pair
//!   only shortly before the old CA expires
//! - Each Kyma owns an **SKR client certificate** that is re-issued once it
//!   predates the last bundling
//!
//! All rotation state lives in annotations on the secrets themselves, so any
//! replica can pick up where another left off.
//!
//! ## Modules
//!
//! - [`gateway_secret`] - gateway secret handlers (CA bundling and legacy)
//! - [`certificate`] - per-Kyma SKR certificate manager
//! - [`repository`] - CA controller and secret accessors with Kubernetes adapters
//! - [`renewal`] - timestamp decisions shared by both
//! - [`secret_data`] - typed views of certificate payloads
//! - [`crd`] - the `Kyma` custom resource
//! - [`config`] - command-line configuration
//! - [`metrics`] - Prometheus metrics
//!
//! ## Example
//!
//! ```rust,no_run
//! use klm_certs::certificate::{CertificateManagerConfig, SkrCertificateManager};
//! use klm_certs::repository::certmanager::CertManagerRepository;
//! use klm_certs::repository::secret::KubeCredentialStore;
//! use klm_certs::repository::CertificateValues;
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! # async fn run() -> anyhow::Result<()> {
//! let client = kube::Client::try_default().await?;
//! let values = CertificateValues {
//!     namespace: "istio-system".to_string(),
//!     duration: Duration::from_secs(1441 * 3600),
//!     renew_before: Duration::from_secs(1440 * 3600),
//!     key_size: 4096,
//! };
//! let authority = Arc::new(CertManagerRepository::new(client.clone(), "klm-watcher-selfsigned", values)?);
//! let store = Arc::new(KubeCredentialStore::new(client));
//!
//! let manager = SkrCertificateManager::new(authority, store, CertificateManagerConfig::default());
//! manager.renew_skr_certificate("kyma-sample").await?;
//! # Ok(())
//! # }
//! ```

pub mod certificate;
pub mod config;
pub mod constants;
pub mod crd;
pub mod duration;
pub mod errors;
pub mod gateway_secret;
pub mod labels;
pub mod metrics;
pub mod renewal;
pub mod repository;
pub mod secret_data;

#[cfg(test)]
pub(crate) mod testing;
