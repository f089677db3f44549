//! Keyed signature tokens.
//!
//! A token is a two-character prefix followed by the unpadded base64url
//! HMAC-SHA256 digest. The prefix is derived from the first two digest bytes,
//! so it must be reproduced exactly for string equality, but it adds no
//! security beyond the digest itself.

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::cipher::PREFIX_LEN;
use crate::error::{CloakError, Result};

type HmacSha256 = Hmac<Sha256>;

/// Digits, lowercase, then uppercase: index `n` is the base-62 digit for `n`.
pub(crate) const BASE62: &[u8; 62] =
    b"0123456789abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ";

/// Signs `data` with `secret`.
///
/// # Errors
///
/// Returns [`CloakError::Configuration`] if the HMAC cannot be keyed.
///
/// # Examples
///
/// ```
/// let token = uinveil::sign(r#"{"uin":"100"}"#, "secret_to_sign")?;
/// assert!(uinveil::verify(r#"{"uin":"100"}"#, "secret_to_sign", &token));
/// # Ok::<(), uinveil::CloakError>(())
/// ```
pub fn sign(data: &str, secret: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|e| CloakError::Configuration(format!("Invalid signing secret: {e}")))?;
    mac.update(data.as_bytes());
    let digest = mac.finalize().into_bytes();

    let mut token = String::with_capacity(PREFIX_LEN + 43);
    token.extend(
        digest
            .iter()
            .take(PREFIX_LEN)
            .map(|b| char::from(BASE62[usize::from(b % 62)])),
    );
    token.push_str(&URL_SAFE_NO_PAD.encode(digest));
    Ok(token)
}

/// Checks `token` against a fresh signature of `data`.
///
/// The whole token, prefix included, must match. Never fails: any error
/// while signing counts as a mismatch.
#[must_use]
pub fn verify(data: &str, secret: &str, token: &str) -> bool {
    sign(data, secret).is_ok_and(|expected| constant_time_eq(expected.as_bytes(), token.as_bytes()))
}

/// Constant-time byte comparison.
///
/// Slices of different length compare unequal; lengths are not secret.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.ct_eq(b).into()
}
