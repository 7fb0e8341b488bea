// Copyright (c) 2025 Erick Bourgeois, firestoned
// SPDX-License-Identifier: MIT

//! Timestamp decisions shared by the gateway secret handlers and the SKR
//! certificate manager.
//!
//! Every rotation decision is re-derived from RFC3339 annotations stored on
//! the objects themselves. A missing or unparsable annotation always selects
//! the conservative action, so these helpers return `bool` and never fail.

use chrono::{DateTime, SecondsFormat, Utc};
use k8s_openapi::api::core::v1::Secret;
use std::time::Duration;

use crate::constants::LAST_MODIFIED_AT_ANNOTATION;

/// Read an RFC3339 annotation from a secret.
///
/// Returns `None` if the annotation is absent or does not parse.
#[must_use]
pub fn parse_time_annotation(secret: &Secret, annotation: &str) -> Option<DateTime<Utc>> {
    secret
        .metadata
        .annotations
        .as_ref()
        .and_then(|annotations| annotations.get(annotation))
        .and_then(|value| DateTime::parse_from_rfc3339(value).ok())
        .map(|parsed| parsed.with_timezone(&Utc))
}

/// Format a timestamp for an annotation (RFC3339, second precision).
#[must_use]
pub fn format_time_annotation(time: DateTime<Utc>) -> String {
    time.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Write an RFC3339 annotation onto a secret, creating the map if needed.
pub fn set_time_annotation(secret: &mut Secret, annotation: &str, time: DateTime<Utc>) {
    secret
        .metadata
        .annotations
        .get_or_insert_with(Default::default)
        .insert(annotation.to_string(), format_time_annotation(time));
}

/// Whether the gateway trust bundle must absorb a new CA generation.
///
/// Bundling is skipped only when `last_modified_at` is known and the CA was
/// not issued after it.
#[must_use]
pub fn requires_bundling(
    last_modified_at: Option<DateTime<Utc>>,
    ca_not_before: DateTime<Utc>,
) -> bool {
    last_modified_at.is_none_or(|last_modified| ca_not_before > last_modified)
}

/// Whether the gateway must start serving the leaf pair of the newest CA.
///
/// Switching is required when the expiration is unknown or `now` is past
/// `current_ca_expiration - switch_before`.
#[must_use]
pub fn requires_switching(
    current_ca_expiration: Option<DateTime<Utc>>,
    now: DateTime<Utc>,
    switch_before: Duration,
) -> bool {
    current_ca_expiration.is_none_or(|expiration| now > subtract(expiration, switch_before))
}

/// Whether a certificate renewal is overdue (`now > renewal_time + buffer`).
#[must_use]
pub fn is_renewal_overdue(
    renewal_time: DateTime<Utc>,
    now: DateTime<Utc>,
    renew_buffer: Duration,
) -> bool {
    now > add(renewal_time, renew_buffer)
}

/// Whether an SKR certificate secret predates the latest gateway CA bundling.
///
/// The secret is stale if the gateway `lastModifiedAt` annotation is missing
/// or unparsable, if the SKR secret has no creation timestamp, or if it was
/// created before the gateway was last modified.
#[must_use]
pub fn skr_secret_requires_renewal(gateway_secret: &Secret, skr_secret: &Secret) -> bool {
    let Some(gateway_last_modified) =
        parse_time_annotation(gateway_secret, LAST_MODIFIED_AT_ANNOTATION)
    else {
        return true;
    };

    skr_secret
        .metadata
        .creation_timestamp
        .as_ref()
        .is_none_or(|created| created.0 < gateway_last_modified)
}

fn add(time: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| time.checked_add_signed(delta))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}

fn subtract(time: DateTime<Utc>, duration: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(duration)
        .ok()
        .and_then(|delta| time.checked_sub_signed(delta))
        .unwrap_or(DateTime::<Utc>::MIN_UTC)
}

#[cfg(test)]
#[path = "renewal_tests.rs"]
mod renewal_tests;
