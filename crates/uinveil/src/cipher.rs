//! Reversible cipher tokens carrying the trusted materials.
//!
//! Token layout before the base64url step:
//!
//! ```text
//! SHA1(plain ^ salt) ^ xor_key | salt ^ xor_key | AES-128-CBC(plain ^ xor_key) ^ salt
//!        20 bytes              |    4 bytes     |        16n bytes
//! ```
//!
//! Two random characters are prepended to the base64url text. They carry no
//! information and are skipped on decode.

use std::fmt;

use aes::cipher::block_padding::Pkcs7;
use aes::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::engine::{DecodePaddingMode, GeneralPurpose, GeneralPurposeConfig};
use rand::rngs::OsRng;
use rand::{Rng, RngCore};
use secrecy::ExposeSecret;
use sha1::{Digest, Sha1};
use uinveil_common::SiteConfig;

use crate::error::{CloakError, Result};
use crate::signature::{BASE62, constant_time_eq};

type Aes128CbcEnc = cbc::Encryptor<aes::Aes128>;
type Aes128CbcDec = cbc::Decryptor<aes::Aes128>;

const BLOCK_SIZE: usize = 16;
const INTEGRITY_LEN: usize = 20;
const SALT_LEN: usize = 4;

/// Length of the cosmetic prefix on cipher and signature tokens.
pub const PREFIX_LEN: usize = 2;

/// Accepts base64url with or without trailing `=`.
const URL_SAFE_LENIENT: GeneralPurpose = GeneralPurpose::new(
    &alphabet::URL_SAFE,
    GeneralPurposeConfig::new()
        .with_encode_padding(false)
        .with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

/// Static key material, derived once at startup.
#[derive(Clone)]
pub struct CipherKeys {
    aes_key: [u8; BLOCK_SIZE],
    aes_iv: [u8; BLOCK_SIZE],
    xor_key: Vec<u8>,
}

impl CipherKeys {
    /// Builds key material from raw key, IV and XOR mask bytes.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::Configuration`] if the key or IV is 16 bytes or
    /// longer (it cannot be padded to one AES-128 block) or the XOR key is empty.
    pub fn new(aes_key: &[u8], aes_iv: &[u8], xor_key: &[u8]) -> Result<Self> {
        if xor_key.is_empty() {
            return Err(CloakError::Configuration(
                "xor_key must not be empty".to_string(),
            ));
        }

        Ok(Self {
            aes_key: pad_block(aes_key, "aes_key")?,
            aes_iv: pad_block(aes_iv, "aes_iv")?,
            xor_key: xor_key.to_vec(),
        })
    }

    /// Builds key material from the site configuration.
    ///
    /// # Errors
    ///
    /// See [`CipherKeys::new`].
    pub fn from_site(site: &SiteConfig) -> Result<Self> {
        Self::new(
            site.aes_key.expose_secret().as_bytes(),
            site.aes_iv.expose_secret().as_bytes(),
            &site.xor_key,
        )
    }
}

impl fmt::Debug for CipherKeys {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CipherKeys")
            .field("aes_key", &"[REDACTED]")
            .field("aes_iv", &"[REDACTED]")
            .field("xor_key", &"[REDACTED]")
            .finish()
    }
}

/// Pads `data` to one AES block, PKCS#7 style: every pad byte holds the pad length.
fn pad_block(data: &[u8], name: &str) -> Result<[u8; BLOCK_SIZE]> {
    if data.len() >= BLOCK_SIZE {
        return Err(CloakError::Configuration(format!(
            "{name} must be shorter than {BLOCK_SIZE} bytes, got {}",
            data.len()
        )));
    }

    let pad = u8::try_from(BLOCK_SIZE - data.len())
        .map_err(|e| CloakError::Configuration(e.to_string()))?;
    let mut block = [pad; BLOCK_SIZE];
    block[..data.len()].copy_from_slice(data);
    Ok(block)
}

/// XORs `data` with `key` repeated to the length of `data`.
fn xor_cycle(data: &[u8], key: &[u8]) -> Vec<u8> {
    data.iter()
        .zip(key.iter().cycle())
        .map(|(d, k)| d ^ k)
        .collect()
}

/// Two characters from the upper part of the base62 alphabet (`q-z`, `A-Z`).
fn random_prefix() -> String {
    let mut rng = rand::thread_rng();
    (0..PREFIX_LEN)
        .map(|_| char::from(BASE62[rng.gen_range(26..BASE62.len())]))
        .collect()
}

/// Encodes and decodes cipher tokens.
///
/// Holds no mutable state; clone it freely or share it behind an `Arc`.
///
/// # Examples
///
/// ```
/// use uinveil::{CipherCodec, CipherKeys};
///
/// let keys = CipherKeys::new(b"123456789", b"123456789", &[0xCF, 0xBA, 0x8D, 0x01])?;
/// let codec = CipherCodec::new(keys);
///
/// let token = codec.encode(r#"{"uin":"10001"}"#);
/// assert_eq!(codec.decode(&token)?, r#"{"uin":"10001"}"#);
/// # Ok::<(), uinveil::CloakError>(())
/// ```
#[derive(Debug, Clone)]
pub struct CipherCodec {
    keys: CipherKeys,
}

impl CipherCodec {
    /// Creates a codec over fixed key material.
    #[must_use]
    pub const fn new(keys: CipherKeys) -> Self {
        Self { keys }
    }

    /// Encrypts `plaintext` under a fresh random salt.
    #[must_use]
    pub fn encode(&self, plaintext: &str) -> String {
        let mut salt = [0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        self.encode_with_salt(plaintext, salt)
    }

    fn encode_with_salt(&self, plaintext: &str, salt: [u8; SALT_LEN]) -> String {
        let plain = plaintext.as_bytes();
        let integrity = Sha1::digest(xor_cycle(plain, &salt));

        let ciphertext = Aes128CbcEnc::new(&self.keys.aes_key.into(), &self.keys.aes_iv.into())
            .encrypt_padded_vec_mut::<Pkcs7>(&xor_cycle(plain, &self.keys.xor_key));

        let mut blob = Vec::with_capacity(INTEGRITY_LEN + SALT_LEN + ciphertext.len());
        blob.extend(xor_cycle(&integrity, &self.keys.xor_key));
        blob.extend(xor_cycle(&salt, &self.keys.xor_key));
        blob.extend(xor_cycle(&ciphertext, &salt));

        format!("{}{}", random_prefix(), URL_SAFE_NO_PAD.encode(blob))
    }

    /// Decrypts a token and checks its integrity hash.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::Integrity`] for every failure: a short or
    /// non-base64 token, a ciphertext that is not whole AES blocks, bad padding,
    /// an integrity mismatch, or plaintext that is not UTF-8.
    pub fn decode(&self, token: &str) -> Result<String> {
        let body = token
            .char_indices()
            .nth(PREFIX_LEN)
            .map(|(start, _)| &token[start..])
            .ok_or(CloakError::Integrity)?;
        let blob = URL_SAFE_LENIENT
            .decode(body)
            .map_err(|_| CloakError::Integrity)?;

        if blob.len() < INTEGRITY_LEN + SALT_LEN + BLOCK_SIZE
            || (blob.len() - INTEGRITY_LEN - SALT_LEN) % BLOCK_SIZE != 0
        {
            return Err(CloakError::Integrity);
        }

        let (masked_integrity, rest) = blob.split_at(INTEGRITY_LEN);
        let (masked_salt, masked_ciphertext) = rest.split_at(SALT_LEN);

        let integrity = xor_cycle(masked_integrity, &self.keys.xor_key);
        let salt = xor_cycle(masked_salt, &self.keys.xor_key);
        let ciphertext = xor_cycle(masked_ciphertext, &salt);

        let masked_plain =
            Aes128CbcDec::new(&self.keys.aes_key.into(), &self.keys.aes_iv.into())
                .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                .map_err(|_| CloakError::Integrity)?;
        let plain = xor_cycle(&masked_plain, &self.keys.xor_key);

        let expected = Sha1::digest(xor_cycle(&plain, &salt));
        if !constant_time_eq(&expected, &integrity) {
            return Err(CloakError::Integrity);
        }

        String::from_utf8(plain).map_err(|_| CloakError::Integrity)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use proptest::prelude::*;

    use super::*;

    const XOR_KEY: [u8; 4] = [0xCF, 0xBA, 0x8D, 0x01];

    fn codec() -> CipherCodec {
        CipherCodec::new(CipherKeys::new(b"123456789", b"123456789", &XOR_KEY).unwrap())
    }

    fn blob_of(token: &str) -> Vec<u8> {
        URL_SAFE_NO_PAD.decode(&token[PREFIX_LEN..]).unwrap()
    }

    fn token_of(blob: &[u8]) -> String {
        format!("zz{}", URL_SAFE_NO_PAD.encode(blob))
    }

    #[test]
    fn test_pad_block() {
        let block = pad_block(b"123456789", "aes_key").unwrap();
        assert_eq!(&block[..9], b"123456789");
        assert!(block[9..].iter().all(|&b| b == 7));

        let empty = pad_block(b"", "aes_iv").unwrap();
        assert!(empty.iter().all(|&b| b == 16));

        assert!(pad_block(&[0u8; 15], "aes_key").is_ok());
        assert!(pad_block(&[0u8; 16], "aes_key").is_err());
    }

    #[test]
    fn test_key_validation() {
        assert!(matches!(
            CipherKeys::new(b"0123456789abcdef", b"iv", &XOR_KEY),
            Err(CloakError::Configuration(_))
        ));
        assert!(matches!(
            CipherKeys::new(b"key", b"0123456789abcdefg", &XOR_KEY),
            Err(CloakError::Configuration(_))
        ));
        assert!(matches!(
            CipherKeys::new(b"key", b"iv", &[]),
            Err(CloakError::Configuration(_))
        ));
    }

    #[test]
    fn test_keys_debug_redacted() {
        let keys = CipherKeys::new(b"123456789", b"123456789", &XOR_KEY).unwrap();
        let debug = format!("{keys:?}");
        assert!(debug.contains("[REDACTED]"));
    }

    #[test]
    fn test_from_site() {
        let site = SiteConfig::new("123456789", "123456789", XOR_KEY.to_vec());
        let codec = CipherCodec::new(CipherKeys::from_site(&site).unwrap());
        let token = codec.encode("hello");
        assert_eq!(codec.decode(&token).unwrap(), "hello");
    }

    #[test]
    fn test_roundtrip() {
        let codec = codec();
        let plaintext = r#"{"uin":"10001"}"#;
        let token = codec.encode(plaintext);
        assert_eq!(codec.decode(&token).unwrap(), plaintext);
    }

    #[test]
    fn test_encodings_are_salted() {
        let codec = codec();
        let a = codec.encode(r#"{"uin":"10001"}"#);
        let b = codec.encode(r#"{"uin":"10001"}"#);
        assert_ne!(a[PREFIX_LEN..], b[PREFIX_LEN..]);
    }

    #[test]
    fn test_token_layout() {
        let codec = codec();
        let token = codec.encode_with_salt("0123456789abcdef", [1, 2, 3, 4]);

        assert!(token[..PREFIX_LEN].chars().all(|c| matches!(c, 'q'..='z' | 'A'..='Z')));
        assert!(!token.contains('='));
        assert!(!token.contains('+'));
        assert!(!token.contains('/'));

        // 16 bytes of plaintext need a full padding block
        assert_eq!(blob_of(&token).len(), INTEGRITY_LEN + SALT_LEN + 32);
    }

    #[test]
    fn test_salt_is_masked_with_xor_key() {
        let codec = codec();
        let salt = [9, 8, 7, 6];
        let blob = blob_of(&codec.encode_with_salt("x", salt));
        assert_eq!(
            xor_cycle(&blob[INTEGRITY_LEN..INTEGRITY_LEN + SALT_LEN], &XOR_KEY),
            salt
        );
    }

    #[test]
    fn test_prefix_ignored_on_decode() {
        let codec = codec();
        let token = codec.encode("payload");
        let swapped = format!("00{}", &token[PREFIX_LEN..]);
        assert_eq!(codec.decode(&swapped).unwrap(), "payload");

        // The prefix is counted in characters, not bytes
        let wide = format!("é𝄞{}", &token[PREFIX_LEN..]);
        assert_eq!(codec.decode(&wide).unwrap(), "payload");
    }

    #[test]
    fn test_padded_base64_accepted() {
        let codec = codec();
        let token = codec.encode("payload");
        let blob = blob_of(&token);
        let padded = format!(
            "ab{}",
            base64::engine::general_purpose::URL_SAFE.encode(&blob)
        );
        assert_eq!(codec.decode(&padded).unwrap(), "payload");
    }

    #[test]
    fn test_malformed_tokens() {
        let codec = codec();
        for token in ["", "a", "ab", "ab!!!!", "abAAAA", "ab𝄞x"] {
            assert!(matches!(codec.decode(token), Err(CloakError::Integrity)));
        }

        // Whole header but ciphertext not a multiple of the block size
        let short = token_of(&[0u8; INTEGRITY_LEN + SALT_LEN + 15]);
        assert!(matches!(codec.decode(&short), Err(CloakError::Integrity)));
    }

    #[test]
    fn test_wrong_keys_fail_closed() {
        let token = codec().encode(r#"{"uin":"10001"}"#);
        let other = CipherCodec::new(CipherKeys::new(b"other", b"123456789", &XOR_KEY).unwrap());
        assert!(matches!(other.decode(&token), Err(CloakError::Integrity)));
    }

    #[test]
    fn test_every_byte_is_tamper_evident() {
        let codec = codec();
        let blob = blob_of(&codec.encode(r#"{"uin":"10001","spec":640}"#));

        for i in 0..blob.len() {
            let mut tampered = blob.clone();
            tampered[i] ^= 0x01;
            assert!(
                matches!(codec.decode(&token_of(&tampered)), Err(CloakError::Integrity)),
                "flipping byte {i} was not detected"
            );
        }
    }

    proptest! {
        #[test]
        fn prop_roundtrip(plaintext in ".{0,200}") {
            let codec = codec();
            let token = codec.encode(&plaintext);
            prop_assert_eq!(codec.decode(&token).unwrap(), plaintext);
        }

        #[test]
        fn prop_tamper_detected(
            plaintext in "[ -~]{1,64}",
            index in any::<prop::sample::Index>(),
            mask in 1u8..=255,
        ) {
            let codec = codec();
            let mut blob = blob_of(&codec.encode(&plaintext));
            let i = index.index(blob.len());
            blob[i] ^= mask;
            prop_assert!(codec.decode(&token_of(&blob)).is_err());
        }
    }
}
