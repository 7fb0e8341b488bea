// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Global constants for the watcher certificate engine.
//!
//! Fixed object names, payload keys and annotation keys are part of the
//! contract with the Istio ingress gateway and the SKR watcher, so they are
//! not configurable. Defaults for configurable values live here as well.

use std::time::Duration;

// ============================================================================
// Fixed Object Identifiers
// ============================================================================

/// Name of the shared Gateway Secret that terminates inbound mTLS
pub const GATEWAY_SECRET_NAME: &str = "klm-istio-gateway";

/// Namespace of the Istio control plane (Gateway Secret and CA live here)
pub const ISTIO_NAMESPACE: &str = "istio-system";

/// Name of the root secret produced by the CA controller
pub const ROOT_SECRET_NAME: &str = "klm-watcher";

/// Name of the CA certificate record whose validity window drives rotation
pub const CA_CERTIFICATE_NAME: &str = "klm-watcher-serving";

/// Kind of the Kubernetes `Secret` resource
pub const SECRET_KIND: &str = "Secret";

// ============================================================================
// Secret Payload Keys
// ============================================================================

/// Serving leaf certificate
pub const TLS_CRT: &str = "tls.crt";

/// Serving leaf private key
pub const TLS_KEY: &str = "tls.key";

/// Trust bundle used to validate client certificates
pub const CA_CRT: &str = "ca.crt";

/// Staging slot for the CA bytes bundled most recently
pub const TEMP_CA_CRT: &str = "temp.ca.crt";

// ============================================================================
// Annotation and Label Keys
// ============================================================================

/// RFC3339 timestamp of the last CA bundling write on the Gateway Secret
pub const LAST_MODIFIED_AT_ANNOTATION: &str = "lastModifiedAt";

/// RFC3339 NotAfter of the CA generation whose leaf pair is being served
pub const CURRENT_CA_EXPIRATION_ANNOTATION: &str = "currentCAExpiration";

/// Kyma annotation carrying the SKR domain used as primary DNS name
pub const SKR_DOMAIN_ANNOTATION: &str = "skr-domain";

/// Kyma label carrying the runtime identifier used as certificate common name
pub const RUNTIME_ID_LABEL: &str = "kyma-project.io/runtime-id";

/// Field manager used for server-side apply of certificate records
pub const FIELD_MANAGER: &str = "lifecycle-manager";

// ============================================================================
// Certificate Subject Defaults
// ============================================================================

pub const DEFAULT_ORGANIZATIONAL_UNIT: &str = "BTP Kyma Runtime";
pub const DEFAULT_ORGANIZATION: &str = "SAP SE";
pub const DEFAULT_LOCALITY: &str = "Walldorf";
pub const DEFAULT_PROVINCE: &str = "Baden-Wuerttemberg";
pub const DEFAULT_COUNTRY: &str = "DE";

// ============================================================================
// Certificate Configuration Defaults
// ============================================================================

/// Default SKR certificate naming template (`%s` is replaced by the Kyma name)
pub const DEFAULT_SKR_CERTIFICATE_NAMING_TEMPLATE: &str = "%s-webhook-tls";

/// Name of the SKR watcher webhook service
pub const DEFAULT_SKR_SERVICE_NAME: &str = "skr-webhook";

/// Namespace the SKR watcher webhook runs in
pub const DEFAULT_SKR_NAMESPACE: &str = "kyma-system";

/// Name of the issuer signing SKR certificates
pub const DEFAULT_ISSUER_NAME: &str = "klm-watcher-selfsigned";

/// Grace period after the renewal time before a renewal counts as overdue
pub const DEFAULT_SELF_SIGNED_CERT_RENEW_BUFFER: Duration = Duration::from_secs(24 * 3600);

/// RSA key size of SKR certificates
pub const DEFAULT_SELF_SIGNED_CERT_KEY_SIZE: u32 = 4096;

/// Key sizes accepted for SKR certificates
pub const SUPPORTED_KEY_SIZES: &[u32] = &[4096];

/// How long before the served CA expires the gateway switches its leaf pair
pub const DEFAULT_CERT_SWITCH_BEFORE_EXPIRATION: Duration = Duration::from_secs(24 * 3600);

// ============================================================================
// Controller Constants
// ============================================================================

/// Number of worker threads for Tokio runtime
pub const TOKIO_WORKER_THREADS: usize = 4;

// ============================================================================
// Metrics Server Constants
// ============================================================================

/// Port for Prometheus metrics HTTP server
pub const METRICS_SERVER_PORT: u16 = 8080;

/// Path for Prometheus metrics endpoint
pub const METRICS_SERVER_PATH: &str = "/metrics";

/// Bind address for metrics HTTP server
pub const METRICS_SERVER_BIND_ADDRESS: &str = "0.0.0.0";
