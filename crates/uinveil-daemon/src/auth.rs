//! Bearer-token and license-key authorization for the signing endpoints.
//!
//! A request is authorized when all of these hold:
//! - `Authorization: Bearer <token>` names a configured token
//! - the `license` query parameter has the form `<id>:<key>`
//! - the token's permissions list `<id>`
//! - `<key>` matches the license's key

use axum::http::{HeaderMap, header};
use secrecy::ExposeSecret;
use tracing::debug;
use uinveil::signature::constant_time_eq;
use uinveil_common::License;

use crate::error::{DaemonError, Result};
use crate::registry::Registry;

/// Extracts the token from an `Authorization: Bearer` header.
///
/// The scheme is matched case-insensitively.
#[must_use]
pub fn bearer_token(headers: &HeaderMap) -> Option<&str> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, token) = value.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

/// Splits a `license` query value into id and key at the first `:`.
#[must_use]
pub fn split_license(value: &str) -> Option<(&str, &str)> {
    value.split_once(':')
}

/// Resolves the license a request may sign for.
///
/// # Errors
///
/// Returns [`DaemonError::Unauthorized`] if any check fails. The cause is only
/// logged at debug level.
pub fn authorize<'a>(
    registry: &'a Registry,
    headers: &HeaderMap,
    license_param: Option<&str>,
) -> Result<&'a License> {
    let Some(token) = bearer_token(headers) else {
        debug!("Missing bearer token");
        return Err(DaemonError::Unauthorized);
    };

    let Some(auth) = registry.authentication(token) else {
        debug!("Unknown bearer token");
        return Err(DaemonError::Unauthorized);
    };

    let Some((license_id, license_key)) = license_param.and_then(split_license) else {
        debug!("Missing or malformed license parameter");
        return Err(DaemonError::Unauthorized);
    };

    if !auth.allows(license_id) {
        debug!(license = %license_id, "Token not permitted for license");
        return Err(DaemonError::Unauthorized);
    }

    let Some(license) = registry.license(license_id) else {
        debug!(license = %license_id, "Unknown license");
        return Err(DaemonError::Unauthorized);
    };

    if !constant_time_eq(license.key.expose_secret().as_bytes(), license_key.as_bytes()) {
        debug!(license = %license_id, "License key mismatch");
        return Err(DaemonError::Unauthorized);
    }

    Ok(license)
}
