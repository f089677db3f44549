//! # uinveil-common
//!
//! Shared types for cloaking a user identifier inside signed, tamper-evident URLs.
//!
//! This crate holds the data that flows between the core codecs, the daemon and
//! the CLI:
//! - Parameter maps (materials, extras, mixed sets) and their query-string forms
//! - Site, proxy, license and authentication configuration
//! - Results of the signing pipeline
//!
//! ## Example
//!
//! ```
//! use uinveil_common::{ExtraParamPolicy, License, ParamValue, Params, SignPolicy, parse_query};
//!
//! let license = License::new("test", "license-key", "secret_to_sign")
//!     .with_extra_param_policy(ExtraParamPolicy::Allow)
//!     .with_sign_policy(SignPolicy::Uin);
//!
//! let mut materials = Params::new();
//! materials.insert("uin".to_string(), ParamValue::from("10001"));
//!
//! let extra = parse_query("spec=100&t=1700000000");
//! assert_eq!(extra["spec"], ParamValue::from("100"));
//! # let _ = (license, materials);
//! ```

/// Licenses, policies and bearer-token permissions.
pub mod license;
/// Primitive parameter maps and query-string helpers.
pub mod params;
pub mod result;
/// Site and upstream proxy settings.
pub mod site;

pub use license::{Authentication, ExtraParamPolicy, License, Permissions, SignPolicy};
pub use params::{
    ParamValue, Params, encode_query, params_to_json, params_to_query, parse_query,
};
pub use result::{
    CollectedParams, ErrorBody, SearchSets, SignedTokens, SignedUrl, VerifiedRequest,
};
pub use site::{ProxyConfig, SiteConfig};
