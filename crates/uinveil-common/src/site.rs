//! Site and upstream proxy settings.
//!
//! Every field except the key material has a default, so a minimal `[site]`
//! table only needs `aes_key`, `aes_iv` and `xor_key`.

use secrecy::SecretString;
use serde::Deserialize;

/// Parameter names and key material of the public site.
#[derive(Debug, Clone, Deserialize)]
pub struct SiteConfig {
    /// Query parameter carrying the cipher token (default: `C`)
    #[serde(default = "default_cipher_param")]
    pub cipher_param: String,

    /// Query parameter carrying the signature token (default: `S`)
    #[serde(default = "default_sign_param")]
    pub sign_param: String,

    /// Materials key holding the user identifier (default: `uin`)
    #[serde(default = "default_uin_param")]
    pub uin_param: String,

    /// Extra parameters dropped before mixing (default: `t`, `_`)
    #[serde(default = "default_ignore_params")]
    pub ignore_params: Vec<String>,

    /// Header whose query-string value carries extra parameters.
    ///
    /// An empty string disables header extras entirely.
    #[serde(default = "default_extra_param_header")]
    pub extra_param_header: String,

    /// AES key string, padded to 16 bytes at startup
    pub aes_key: SecretString,

    /// AES IV string, padded to 16 bytes at startup
    pub aes_iv: SecretString,

    /// XOR mask applied to the integrity hash, salt and plaintext
    pub xor_key: Vec<u8>,
}

impl SiteConfig {
    /// Creates a site configuration with default parameter names.
    #[must_use]
    pub fn new(aes_key: &str, aes_iv: &str, xor_key: Vec<u8>) -> Self {
        Self {
            cipher_param: default_cipher_param(),
            sign_param: default_sign_param(),
            uin_param: default_uin_param(),
            ignore_params: default_ignore_params(),
            extra_param_header: default_extra_param_header(),
            aes_key: SecretString::new(aes_key.into()),
            aes_iv: SecretString::new(aes_iv.into()),
            xor_key,
        }
    }

    /// Whether `name` is listed in `ignore_params`.
    #[must_use]
    pub fn is_ignored(&self, name: &str) -> bool {
        self.ignore_params.iter().any(|p| p == name)
    }
}

/// Upstream provider the daemon forwards verified requests to.
#[derive(Debug, Clone, Deserialize)]
pub struct ProxyConfig {
    /// Upstream endpoint (default: `https://thirdqq.qlogo.cn/headimg_dl`)
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Query string merged under every upstream request (default: `spec=640&img_type=jpg`)
    #[serde(default = "default_search")]
    pub default_search: String,

    /// Upstream name of the identifier parameter (default: `dst_uin`)
    #[serde(default = "default_proxy_uin_param")]
    pub uin_param: String,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            default_search: default_search(),
            uin_param: default_proxy_uin_param(),
        }
    }
}

fn default_cipher_param() -> String {
    "C".to_string()
}

fn default_sign_param() -> String {
    "S".to_string()
}

fn default_uin_param() -> String {
    "uin".to_string()
}

fn default_ignore_params() -> Vec<String> {
    vec!["t".to_string(), "_".to_string()]
}

fn default_extra_param_header() -> String {
    "X-Form-Extra".to_string()
}

fn default_base_url() -> String {
    "https://thirdqq.qlogo.cn/headimg_dl".to_string()
}

fn default_search() -> String {
    "spec=640&img_type=jpg".to_string()
}

fn default_proxy_uin_param() -> String {
    "dst_uin".to_string()
}
