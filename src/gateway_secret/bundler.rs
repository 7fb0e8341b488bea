// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! PEM edits of the gateway trust bundle.
//!
//! The bundle in `ca.crt` is a concatenation of PEM `CERTIFICATE` blocks,
//! newest first. Payloads that are not PEM are compared as raw bytes and
//! never rewritten.

use chrono::{DateTime, Utc};
use pem::{EncodeConfig, LineEnding, Pem};
use tracing::warn;
use x509_parser::prelude::{FromDer, X509Certificate};

/// PEM tag of an X.509 certificate block
const CERTIFICATE_TAG: &str = "CERTIFICATE";

/// Whether every certificate of `certificate` is already in `bundle`.
///
/// PEM blocks match anywhere in the bundle, not only at its start.
#[must_use]
pub fn contains_certificate(bundle: &[u8], certificate: &[u8]) -> bool {
    if certificate.is_empty() {
        return true;
    }

    match (pem::parse_many(certificate), pem::parse_many(bundle)) {
        (Ok(new_blocks), Ok(existing)) if !new_blocks.is_empty() => new_blocks.iter().all(|block| {
            existing
                .iter()
                .any(|candidate| candidate.contents() == block.contents())
        }),
        _ => bundle
            .windows(certificate.len())
            .any(|window| window == certificate),
    }
}

/// The bundle without certificates whose NotAfter is before `now`.
///
/// Returns `None` if nothing expired or the bundle cannot be read as PEM
/// certificates, in which case it must be left as is.
#[must_use]
pub fn drop_expired_certificates(bundle: &[u8], now: DateTime<Utc>) -> Option<Vec<u8>> {
    let blocks = pem::parse_many(bundle).ok()?;
    let total = blocks.len();

    let mut unexpired = Vec::with_capacity(total);
    for block in blocks {
        let Some(not_after) = not_after_of(&block) else {
            warn!("Gateway trust bundle holds an unreadable certificate, not pruning it");
            return None;
        };
        if not_after >= now.timestamp() {
            unexpired.push(block);
        }
    }

    if unexpired.len() == total {
        return None;
    }

    let config = EncodeConfig::new().set_line_ending(LineEnding::LF);
    let pruned: String = unexpired
        .iter()
        .map(|block| pem::encode_config(block, config))
        .collect();
    Some(pruned.into_bytes())
}

/// NotAfter of a certificate block as a Unix timestamp.
fn not_after_of(block: &Pem) -> Option<i64> {
    if block.tag() != CERTIFICATE_TAG {
        return None;
    }
    let (_, certificate) = X509Certificate::from_der(block.contents()).ok()?;
    Some(certificate.validity().not_after.timestamp())
}

#[cfg(test)]
#[path = "bundler_tests.rs"]
mod bundler_tests;
