// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Labels stamped on objects produced for the watcher certificate chain.

use std::collections::BTreeMap;

/// Label marking an object as managed by the lifecycle manager
pub const MANAGED_BY: &str = "operator.kyma-project.io/managed-by";

/// Value for [`MANAGED_BY`]
pub const MANAGED_BY_LIFECYCLE_MANAGER: &str = "lifecycle-manager";

/// Standard label for the tool managing the object
pub const K8S_MANAGED_BY: &str = "app.kubernetes.io/managed-by";

/// Standard label for the name of the higher-level application
pub const K8S_PART_OF: &str = "app.kubernetes.io/part-of";

/// Value for [`K8S_PART_OF`]
pub const PART_OF_WATCHER: &str = "kyma-watcher";

/// Labels the CA controller copies onto every issued certificate secret.
#[must_use]
pub fn certificate_secret_labels() -> BTreeMap<String, String> {
    BTreeMap::from([
        (
            MANAGED_BY.to_string(),
            MANAGED_BY_LIFECYCLE_MANAGER.to_string(),
        ),
        (
            K8S_MANAGED_BY.to_string(),
            MANAGED_BY_LIFECYCLE_MANAGER.to_string(),
        ),
        (K8S_PART_OF.to_string(), PART_OF_WATCHER.to_string()),
    ])
}
