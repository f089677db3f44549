//! Licenses, their parameter policies, and bearer-token permissions.

use std::fmt;
use std::str::FromStr;

use secrecy::SecretString;
use serde::{Deserialize, Serialize};

/// How untrusted extra parameters combine with trusted materials.
///
/// `Allow` and `Overwrite` differ in precedence: under `Allow` an extra
/// parameter can only add a key the materials do not have, under `Overwrite`
/// it replaces any material except the identifier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtraParamPolicy {
    /// Drop all extra parameters.
    #[default]
    Ignore,
    /// Reject the request if any extra parameter remains.
    Deny,
    /// Add extra parameters that the materials do not define.
    Allow,
    /// Let extra parameters replace materials, except the identifier.
    Overwrite,
}

impl fmt::Display for ExtraParamPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Deny => write!(f, "deny"),
            Self::Allow => write!(f, "allow"),
            Self::Overwrite => write!(f, "overwrite"),
        }
    }
}

impl FromStr for ExtraParamPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "ignore" => Ok(Self::Ignore),
            "deny" => Ok(Self::Deny),
            "allow" => Ok(Self::Allow),
            "overwrite" => Ok(Self::Overwrite),
            _ => anyhow::bail!("Unknown extra param policy: {s}"),
        }
    }
}

/// Which parameters feed the signature.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignPolicy {
    /// Only the identifier.
    Uin,
    /// All trusted materials.
    #[default]
    Important,
    /// The mixed set, including extras admitted by the extra policy.
    All,
}

impl fmt::Display for SignPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Uin => write!(f, "uin"),
            Self::Important => write!(f, "important"),
            Self::All => write!(f, "all"),
        }
    }
}

impl FromStr for SignPolicy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "uin" => Ok(Self::Uin),
            "important" => Ok(Self::Important),
            "all" => Ok(Self::All),
            _ => anyhow::bail!("Unknown sign policy: {s}"),
        }
    }
}

/// A tenant allowed to mint signed URLs.
///
/// `key` is only compared at the HTTP boundary; `secret` keys the signature.
#[derive(Debug, Clone, Deserialize)]
pub struct License {
    /// Public license identifier, carried in every signed URL
    pub id: String,

    /// Credential presented alongside the id when requesting signatures
    pub key: SecretString,

    /// HMAC key for signature tokens
    pub secret: SecretString,

    /// Extra parameter policy (default: `ignore`)
    #[serde(default)]
    pub extra_param_policy: ExtraParamPolicy,

    /// Signature policy (default: `important`)
    #[serde(default)]
    pub sign_policy: SignPolicy,
}

impl License {
    /// Creates a license with default policies.
    #[must_use]
    pub fn new(id: impl Into<String>, key: &str, secret: &str) -> Self {
        Self {
            id: id.into(),
            key: SecretString::new(key.into()),
            secret: SecretString::new(secret.into()),
            extra_param_policy: ExtraParamPolicy::default(),
            sign_policy: SignPolicy::default(),
        }
    }

    /// Sets the extra parameter policy.
    #[must_use]
    pub fn with_extra_param_policy(mut self, policy: ExtraParamPolicy) -> Self {
        self.extra_param_policy = policy;
        self
    }

    /// Sets the signature policy.
    #[must_use]
    pub fn with_sign_policy(mut self, policy: SignPolicy) -> Self {
        self.sign_policy = policy;
        self
    }
}

/// A bearer token and the licenses it may act for.
#[derive(Debug, Clone, Deserialize)]
pub struct Authentication {
    /// Bearer token presented in the `Authorization` header
    pub token: SecretString,

    #[serde(default)]
    pub permissions: Permissions,
}

/// Permissions granted to a bearer token.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Permissions {
    /// License ids this token may sign for (default: none)
    #[serde(default)]
    pub allow_license: Vec<String>,
}

impl Authentication {
    /// Whether this token may act for `license_id`.
    #[must_use]
    pub fn allows(&self, license_id: &str) -> bool {
        self.permissions.allow_license.iter().any(|id| id == license_id)
    }
}
