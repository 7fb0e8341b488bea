// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Typed view of the `Kyma` custom resource.
//!
//! Only the parts the certificate engine reads are modelled: the
//! `skr-domain` annotation and the `kyma-project.io/runtime-id` label. The
//! resource itself is owned and reconciled elsewhere.
//!
//! # Example
//!
//! ```rust,no_run
//! use klm_certs::crd::{Kyma, KymaSpec};
//!
//! let kyma = Kyma::new("kyma-sample", KymaSpec::default());
//! assert_eq!(kyma.runtime_id(), None);
//! ```

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::constants::{RUNTIME_ID_LABEL, SKR_DOMAIN_ANNOTATION};

/// `Kyma` describes one managed runtime (SKR) and the modules installed in it.
///
/// # Example
///
/// ```yaml
/// apiVersion: operator.kyma-project.io/v1beta2
/// kind: Kyma
/// metadata:
///   name: kyma-sample
///   namespace: kcp-system
///   labels:
///     kyma-project.io/runtime-id: 5a8a1f0c-runtime
///   annotations:
///     skr-domain: skr.example.com
/// spec:
///   channel: regular
/// ```
#[derive(CustomResource, Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[kube(
    group = "operator.kyma-project.io",
    version = "v1beta2",
    kind = "Kyma",
    namespaced,
    doc = "Kyma represents a managed Kyma runtime and the modules enabled in it."
)]
#[kube(status = "KymaStatus")]
#[serde(rename_all = "camelCase")]
pub struct KymaSpec {
    /// Release channel modules are taken from (e.g., "regular", "fast").
    #[serde(default)]
    pub channel: String,

    /// Modules enabled in the runtime.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub modules: Vec<KymaModule>,
}

/// A module enabled in a runtime.
#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct KymaModule {
    pub name: String,

    /// Overrides the Kyma channel for this module.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<String>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct KymaStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl Kyma {
    /// Runtime identifier from the `kyma-project.io/runtime-id` label.
    #[must_use]
    pub fn runtime_id(&self) -> Option<&str> {
        self.labels().get(RUNTIME_ID_LABEL).map(String::as_str)
    }

    /// SKR domain from the `skr-domain` annotation.
    #[must_use]
    pub fn skr_domain(&self) -> Option<&str> {
        self.annotations()
            .get(SKR_DOMAIN_ANNOTATION)
            .map(String::as_str)
    }
}

#[cfg(test)]
#[path = "crd_tests.rs"]
mod crd_tests;
