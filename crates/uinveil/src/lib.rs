//! # uinveil
//!
//! Cloaks a user identifier inside a signed, tamper-evident URL.
//!
//! A trusted caller hands over *materials* (parameters that must include the
//! identifier). The materials are encrypted into a cipher token, a signature
//! token is computed over a policy-selected subset, and both travel in the URL.
//! Later, an untrusted client presents the URL back; the tokens are checked and
//! the original parameters are recovered for the upstream request.
//!
//! - [`cipher`]: reversible AES-128-CBC tokens with a SHA1 integrity check
//! - [`signature`]: HMAC-SHA256 tokens over canonical JSON
//! - [`canonical`]: order-independent JSON serialization
//! - [`policy`]: how untrusted extras combine with materials
//!
//! ## Example
//!
//! ```
//! use uinveil::{License, ParamValue, Params, PolicyEngine, ProxyConfig, SiteConfig};
//!
//! let site = SiteConfig::new("123456789", "123456789", vec![0xCF, 0xBA, 0x8D]);
//! let engine = PolicyEngine::new(&site, &ProxyConfig::default())?;
//! let license = License::new("test", "license-key", "secret_to_sign");
//!
//! let mut materials = Params::new();
//! materials.insert("uin".to_string(), ParamValue::from("100"));
//!
//! let tokens = engine.collect_sign(&license, &materials, &Params::new())?;
//! let verified = engine.verify_request(&license, &tokens.cipher, &tokens.sign, &Params::new())?;
//! assert_eq!(verified.mixed["dst_uin"], ParamValue::from("100"));
//! # Ok::<(), uinveil::CloakError>(())
//! ```

pub mod canonical;
pub mod cipher;
pub mod error;
pub mod policy;
pub mod signature;

pub use canonical::{canonicalize, canonicalize_params};
pub use cipher::{CipherCodec, CipherKeys};
pub use error::{CloakError, Result};
pub use policy::{LICENSE_PARAM, PolicyEngine};
pub use signature::{sign, verify};

// Re-export the shared types so callers need only one dependency
pub use uinveil_common::{
    Authentication, CollectedParams, ExtraParamPolicy, License, ParamValue, Params,
    Permissions, ProxyConfig, SearchSets, SignPolicy, SignedTokens, SiteConfig,
    VerifiedRequest, parse_query,
};
