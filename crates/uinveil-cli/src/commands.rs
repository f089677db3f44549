//! Command implementations for the CLI.

use std::path::Path;

use anyhow::{Context, Result, bail};
use uinveil::{PolicyEngine, canonicalize};
use uinveil_common::{
    CollectedParams, License, Params, SignedTokens, SignedUrl, VerifiedRequest, parse_query,
};
use uinveil_daemon::DaemonConfig;

/// Loaded configuration and the engine derived from it.
pub struct Session {
    config: DaemonConfig,
    engine: PolicyEngine,
}

impl Session {
    /// Loads configuration from `path`, or the default location.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => DaemonConfig::config_path()?,
        };
        log::debug!("Loading configuration from {}", path.display());

        let config = DaemonConfig::load_from(&path)
            .with_context(|| format!("Failed to load {}", path.display()))?;
        Self::new(config)
    }

    /// Builds a session from an already validated configuration.
    pub fn new(config: DaemonConfig) -> Result<Self> {
        let engine = PolicyEngine::new(&config.site, &config.proxy)
            .context("Unusable key material")?;
        Ok(Self { config, engine })
    }

    fn license(&self, id: &str) -> Result<&License> {
        self.config
            .get_license(id)
            .with_context(|| format!("Unknown license '{id}'"))
    }

    /// Encrypts arbitrary plaintext into a cipher token.
    pub fn encode(&self, plaintext: &str) -> String {
        self.engine.cipher().encode(plaintext)
    }

    /// Decrypts a cipher token.
    pub fn decode(&self, token: &str) -> Result<String> {
        Ok(self.engine.cipher().decode(token)?)
    }

    /// Signs materials for a license.
    pub fn sign(&self, license: &str, materials: &str, extra: Option<&str>) -> Result<SignedTokens> {
        let license = self.license(license)?;
        Ok(self
            .engine
            .collect_sign(license, &parse_materials(materials)?, &parse_extra(extra))?)
    }

    /// Runs the full collect pipeline.
    pub fn collect(
        &self,
        license: &str,
        materials: &str,
        extra: Option<&str>,
    ) -> Result<CollectedParams> {
        let license = self.license(license)?;
        Ok(self
            .engine
            .collect_all(license, &parse_materials(materials)?, &parse_extra(extra))?)
    }

    /// Builds a shareable signed URL.
    pub fn url(
        &self,
        license: &str,
        prefix: &str,
        materials: &str,
        extra: Option<&str>,
    ) -> Result<SignedUrl> {
        let collected = self.collect(license, materials, extra)?;
        Ok(SignedUrl {
            url: self.engine.signed_url(prefix, &collected),
        })
    }

    /// Checks a cipher/signature pair the way `GET /avatar` does.
    pub fn verify(
        &self,
        license: &str,
        cipher: &str,
        sign: &str,
        extra: Option<&str>,
    ) -> Result<VerifiedRequest> {
        let license = self.license(license)?;
        Ok(self
            .engine
            .verify_request(license, cipher, sign, &parse_extra(extra))?)
    }
}

/// Canonical JSON of an arbitrary JSON document.
pub fn canon(json: &str) -> Result<String> {
    let value: serde_json::Value = serde_json::from_str(json).context("Input is not valid JSON")?;
    Ok(canonicalize(&value))
}

fn parse_materials(json: &str) -> Result<Params> {
    let value: serde_json::Value =
        serde_json::from_str(json).context("Materials are not valid JSON")?;
    if !value.is_object() {
        bail!("Materials must be a JSON object");
    }
    serde_json::from_value(value).context("Materials values must be strings, numbers, booleans or null")
}

fn parse_extra(extra: Option<&str>) -> Params {
    extra.map(parse_query).unwrap_or_default()
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use uinveil_common::ParamValue;

    use super::*;

    fn session() -> Session {
        let config = DaemonConfig::from_toml(
            r#"
[site]
aes_key = "123456789"
aes_iv = "987654321"
xor_key = [207, 186, 141, 1]

[[license]]
id = "test"
key = "a9a6446b"
secret = "secret_to_sign"
extra_param_policy = "allow"
            "#,
        )
        .unwrap();
        Session::new(config).unwrap()
    }

    #[test]
    fn test_encode_decode() {
        let session = session();
        let token = session.encode(r#"{"uin":"100"}"#);
        assert_eq!(session.decode(&token).unwrap(), r#"{"uin":"100"}"#);
        assert!(session.decode("xxnotatoken").is_err());
    }

    #[test]
    fn test_canon() {
        assert_eq!(canon(r#"{"b":1,"a":{"d":2,"c":3}}"#).unwrap(), r#"{"a":{"c":3,"d":2},"b":1}"#);
        assert!(canon("{").is_err());
    }

    #[test]
    fn test_sign_then_verify() {
        let session = session();
        let tokens = session
            .sign("test", r#"{"uin":"100"}"#, Some("spec=100&t=1"))
            .unwrap();

        let verified = session
            .verify("test", &tokens.cipher, &tokens.sign, Some("spec=100"))
            .unwrap();
        assert_eq!(verified.mixed["dst_uin"], ParamValue::from("100"));
        assert_eq!(verified.mixed["spec"], ParamValue::from("100"));
    }

    #[test]
    fn test_url() {
        let session = session();
        let signed = session
            .url("test", "https://cdn.example", r#"{"uin":"100"}"#, None)
            .unwrap();
        assert!(signed.url.starts_with("https://cdn.example/avatar?dst_uin=100&C="));
    }

    #[test]
    fn test_collect() {
        let collected = session()
            .collect("test", r#"{"uin":100}"#, Some("foo=bar"))
            .unwrap();
        assert_eq!(collected.search.mixin["dst_uin"], ParamValue::from(100_i64));
        assert_eq!(collected.search.mixin["foo"], ParamValue::from("bar"));
    }

    #[test]
    fn test_rejects_bad_input() {
        let session = session();
        assert!(session.sign("ghost", r#"{"uin":"100"}"#, None).is_err());
        assert!(session.sign("test", r#"["uin"]"#, None).is_err());
        assert!(session.sign("test", r#"{"uin":{"nested":1}}"#, None).is_err());
        assert!(session.sign("test", r#"{"other":"x"}"#, None).is_err());
    }
}
