//! Results of the signing pipeline, serialized as the HTTP response bodies.

use serde::{Deserialize, Serialize};

use crate::params::Params;

/// The cipher/signature pair minted for a license.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedTokens {
    pub license_id: String,
    pub cipher: String,
    pub sign: String,
}

/// Every parameter set produced while collecting a signed request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchSets {
    /// Materials exactly as received
    pub material: Params,

    /// Extra parameters exactly as received
    pub extra: Params,

    /// Extra parameters that matched `ignore_params`; echoed into URLs only
    pub ignored: Params,

    /// Materials after the identifier rename and extra-policy merge
    pub mixin: Params,

    /// `mixin` overlaid on the proxy's default search
    #[serde(rename = "final")]
    pub final_search: Params,
}

/// Full output of the collect pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CollectedParams {
    pub license_id: String,
    pub search: SearchSets,
    pub cipher: String,
    pub sign: String,
}

impl CollectedParams {
    /// Returns just the token pair.
    #[must_use]
    pub fn tokens(&self) -> SignedTokens {
        SignedTokens {
            license_id: self.license_id.clone(),
            cipher: self.cipher.clone(),
            sign: self.sign.clone(),
        }
    }
}

/// Parameters recovered from a verified inbound request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerifiedRequest {
    /// Materials decoded from the cipher token
    pub materials: Params,

    /// Materials mixed with the request's extra parameters
    pub mixed: Params,

    /// Parameter set to send upstream
    pub final_search: Params,
}

/// Body of the `/avatar/url` response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedUrl {
    pub url: String,
}

/// JSON error body returned by the signing endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorBody {
    pub code: u16,
    pub message: String,
}
