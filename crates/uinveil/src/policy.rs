//! Parameter policy engine.
//!
//! Combines trusted materials with untrusted extra parameters according to a
//! license's [`ExtraParamPolicy`], selects the signing input according to its
//! [`SignPolicy`], and drives both codecs to mint or check a signed request.

use secrecy::ExposeSecret;
use uinveil_common::{
    CollectedParams, ExtraParamPolicy, License, ParamValue, Params, ProxyConfig, SearchSets,
    SignPolicy, SignedTokens, SiteConfig, VerifiedRequest, encode_query, parse_query,
};

use crate::canonical::canonicalize_params;
use crate::cipher::{CipherCodec, CipherKeys};
use crate::error::{CloakError, Result};
use crate::signature;

/// Query parameter naming the license in signed URLs.
pub const LICENSE_PARAM: &str = "license";

/// Applies site and proxy configuration to materials and extras.
///
/// Built once at startup; all operations take `&self` and are safe to call
/// from many threads at once.
#[derive(Debug, Clone)]
pub struct PolicyEngine {
    site: SiteConfig,
    proxy_uin_param: String,
    default_search: Params,
    cipher: CipherCodec,
}

impl PolicyEngine {
    /// Derives key material and default parameters from configuration.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::Configuration`] if the cipher keys are unusable.
    pub fn new(site: &SiteConfig, proxy: &ProxyConfig) -> Result<Self> {
        let cipher = CipherCodec::new(CipherKeys::from_site(site)?);
        Ok(Self::with_codec(site, proxy, cipher))
    }

    /// Builds an engine around an existing cipher codec.
    #[must_use]
    pub fn with_codec(site: &SiteConfig, proxy: &ProxyConfig, cipher: CipherCodec) -> Self {
        Self {
            site: site.clone(),
            proxy_uin_param: proxy.uin_param.clone(),
            default_search: parse_query(&proxy.default_search),
            cipher,
        }
    }

    /// The site configuration this engine was built from.
    #[must_use]
    pub const fn site(&self) -> &SiteConfig {
        &self.site
    }

    /// Whether `name` is one of the query params `signed_url` writes itself.
    fn is_reserved(&self, name: &str) -> bool {
        name == self.site.cipher_param || name == self.site.sign_param || name == LICENSE_PARAM
    }

    /// The cipher codec used for materials.
    #[must_use]
    pub const fn cipher(&self) -> &CipherCodec {
        &self.cipher
    }

    /// Renames the identifier and merges `extra` into `materials` under `policy`.
    ///
    /// Parameters listed in `ignore_params` are removed from `extra` first, as
    /// are the names `signed_url` reserves for itself (the cipher and sign
    /// params and `license`).
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::Validation`] if the identifier is missing or is not
    /// a string or number, or if extras remain under [`ExtraParamPolicy::Deny`].
    pub fn mixin(
        &self,
        materials: &Params,
        extra: &Params,
        policy: ExtraParamPolicy,
    ) -> Result<Params> {
        let mut extra = extra.clone();
        extra.retain(|name, _| !self.site.is_ignored(name) && !self.is_reserved(name));

        let mut mixed = materials.clone();
        let uin = match mixed.remove(&self.site.uin_param) {
            Some(value) if value.is_identifier() => value,
            _ => {
                return Err(CloakError::Validation(format!(
                    "missing uin param: {}",
                    self.site.uin_param
                )));
            }
        };
        mixed.insert(self.proxy_uin_param.clone(), uin.clone());

        match policy {
            ExtraParamPolicy::Ignore => {}
            ExtraParamPolicy::Deny => {
                if !extra.is_empty() {
                    return Err(CloakError::Validation("extra not allowed".to_string()));
                }
            }
            ExtraParamPolicy::Allow => {
                for (name, value) in extra {
                    mixed.entry(name).or_insert(value);
                }
            }
            ExtraParamPolicy::Overwrite => {
                mixed.extend(extra);
                mixed.insert(self.proxy_uin_param.clone(), uin);
            }
        }

        Ok(mixed)
    }

    /// Overlays `mixed` on the proxy's default search parameters.
    #[must_use]
    pub fn collect_search(&self, mixed: &Params) -> Params {
        let mut search = self.default_search.clone();
        search.extend(mixed.iter().map(|(k, v)| (k.clone(), v.clone())));
        search
    }

    /// Canonical JSON that the signature covers.
    ///
    /// # Errors
    ///
    /// Returns [`CloakError::Validation`] if `policy` is [`SignPolicy::Uin`]
    /// and `materials` has no identifier.
    pub fn select_sign_data(
        &self,
        materials: &Params,
        mixed: &Params,
        policy: SignPolicy,
    ) -> Result<String> {
        match policy {
            SignPolicy::Uin => {
                let uin = materials.get(&self.site.uin_param).ok_or_else(|| {
                    CloakError::Validation(format!(
                        "missing uin param: {}",
                        self.site.uin_param
                    ))
                })?;
                let only_uin = Params::from([(self.site.uin_param.clone(), uin.clone())]);
                Ok(canonicalize_params(&only_uin))
            }
            SignPolicy::Important => Ok(canonicalize_params(materials)),
            SignPolicy::All => Ok(canonicalize_params(mixed)),
        }
    }

    /// Signs an already mixed parameter set.
    ///
    /// # Errors
    ///
    /// Propagates serialization, validation and signing errors.
    pub fn sign_mixed(
        &self,
        license: &License,
        materials: &Params,
        mixed: &Params,
    ) -> Result<SignedTokens> {
        let cipher = self.cipher.encode(&serde_json::to_string(materials)?);
        let data = self.select_sign_data(materials, mixed, license.sign_policy)?;
        let sign = signature::sign(&data, license.secret.expose_secret())?;

        Ok(SignedTokens {
            license_id: license.id.clone(),
            cipher,
            sign,
        })
    }

    /// Mixes `extra` under the license's policy and signs the result.
    ///
    /// # Errors
    ///
    /// See [`PolicyEngine::mixin`] and [`PolicyEngine::sign_mixed`].
    pub fn collect_sign(
        &self,
        license: &License,
        materials: &Params,
        extra: &Params,
    ) -> Result<SignedTokens> {
        let mixed = self.mixin(materials, extra, license.extra_param_policy)?;
        self.sign_mixed(license, materials, &mixed)
    }

    /// Entries of `extra` named in `ignore_params`.
    #[must_use]
    pub fn ignored_params(&self, extra: &Params) -> Params {
        extra
            .iter()
            .filter(|(name, _)| self.site.is_ignored(name))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Runs the full signing pipeline and reports every intermediate set.
    ///
    /// # Errors
    ///
    /// See [`PolicyEngine::collect_sign`].
    pub fn collect_all(
        &self,
        license: &License,
        materials: &Params,
        extra: &Params,
    ) -> Result<CollectedParams> {
        let ignored = self.ignored_params(extra);
        let mixed = self.mixin(materials, extra, license.extra_param_policy)?;
        let tokens = self.sign_mixed(license, materials, &mixed)?;
        let final_search = self.collect_search(&mixed);

        Ok(CollectedParams {
            license_id: tokens.license_id,
            search: SearchSets {
                material: materials.clone(),
                extra: extra.clone(),
                ignored,
                mixin: mixed,
                final_search,
            },
            cipher: tokens.cipher,
            sign: tokens.sign,
        })
    }

    /// Builds the shareable `{prefix}/avatar?...` URL for a collected request.
    ///
    /// Ignored and mixed parameters come first (mixed wins on a shared name),
    /// followed by the cipher, signature and license parameters.
    #[must_use]
    pub fn signed_url(&self, prefix: &str, collected: &CollectedParams) -> String {
        let mut visible = collected.search.ignored.clone();
        visible.extend(
            collected
                .search
                .mixin
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        visible.retain(|name, _| !self.is_reserved(name));

        let query = encode_query(
            visible
                .iter()
                .map(|(k, v)| (k.as_str(), v.to_string()))
                .chain([
                    (self.site.cipher_param.as_str(), collected.cipher.clone()),
                    (self.site.sign_param.as_str(), collected.sign.clone()),
                    (LICENSE_PARAM, collected.license_id.clone()),
                ]),
        );

        format!("{prefix}/avatar?{query}")
    }

    /// Checks an inbound cipher/signature pair and recovers the upstream parameters.
    ///
    /// `extra` holds the request's remaining query parameters. Entries that
    /// merely repeat a materials-derived parameter (a signed URL carries its
    /// mixed set for visibility) are dropped before mixing.
    ///
    /// # Errors
    ///
    /// - [`CloakError::Integrity`] if the cipher does not decode to materials
    ///   containing the identifier
    /// - [`CloakError::Validation`] if the extras violate the license policy
    /// - [`CloakError::SignatureMismatch`] if the signature does not match
    pub fn verify_request(
        &self,
        license: &License,
        cipher: &str,
        sign: &str,
        extra: &Params,
    ) -> Result<VerifiedRequest> {
        let plaintext = self.cipher.decode(cipher)?;
        let materials: Params =
            serde_json::from_str(&plaintext).map_err(|_| CloakError::Integrity)?;
        if !materials.contains_key(&self.site.uin_param) {
            return Err(CloakError::Integrity);
        }

        let derived = self.mixin(&materials, &Params::new(), ExtraParamPolicy::Ignore)?;
        let extra: Params = extra
            .iter()
            .filter(|(name, value)| !is_echo(&derived, name, value))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();

        let mixed = self.mixin(&materials, &extra, license.extra_param_policy)?;
        let data = self.select_sign_data(&materials, &mixed, license.sign_policy)?;
        if !signature::verify(&data, license.secret.expose_secret(), sign) {
            return Err(CloakError::SignatureMismatch);
        }

        Ok(VerifiedRequest {
            final_search: self.collect_search(&mixed),
            materials,
            mixed,
        })
    }
}

/// Whether `derived` already holds `name` with the same query rendering.
fn is_echo(derived: &Params, name: &str, value: &ParamValue) -> bool {
    derived
        .get(name)
        .is_some_and(|d| d.to_string() == value.to_string())
}
