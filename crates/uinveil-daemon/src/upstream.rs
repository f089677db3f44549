//! Outbound fetch of the avatar from the upstream provider.

use std::time::Duration;

use axum::body::Body;
use axum::http::header;
use axum::response::Response;
use reqwest::Client;
use tracing::{debug, instrument};
use uinveil_common::{Params, ProxyConfig, params_to_query};
use url::Url;

use crate::config::UpstreamSettings;
use crate::error::{DaemonError, Result};

/// Response headers copied from the upstream reply.
static FORWARDED_HEADERS: [header::HeaderName; 6] = [
    header::CONTENT_TYPE,
    header::CONTENT_LENGTH,
    header::CACHE_CONTROL,
    header::EXPIRES,
    header::LAST_MODIFIED,
    header::ETAG,
];

/// HTTP client bound to the configured upstream endpoint.
#[derive(Debug, Clone)]
pub struct Upstream {
    client: Client,
    base_url: Url,
}

impl Upstream {
    /// Builds the client with the configured timeouts.
    ///
    /// # Errors
    ///
    /// Returns an error if `base_url` is invalid or the client cannot be built.
    pub fn new(proxy: &ProxyConfig, settings: &UpstreamSettings) -> Result<Self> {
        let base_url = Url::parse(&proxy.base_url)
            .map_err(|e| DaemonError::Config(format!("Invalid proxy.base_url: {e}")))?;

        let client = Client::builder()
            .connect_timeout(Duration::from_secs(settings.connect_timeout_secs))
            .timeout(Duration::from_secs(settings.timeout_secs))
            .build()?;

        Ok(Self { client, base_url })
    }

    /// The upstream URL for a final parameter set.
    ///
    /// Any query on `base_url` is replaced.
    #[must_use]
    pub fn url_for(&self, search: &Params) -> Url {
        let mut url = self.base_url.clone();
        let query = params_to_query(search);
        url.set_query((!query.is_empty()).then_some(query.as_str()));
        url
    }

    /// Fetches the resource and relays status, selected headers and a streamed body.
    ///
    /// Redirects are followed. Upstream error statuses are relayed as-is.
    ///
    /// # Errors
    ///
    /// Returns [`DaemonError::Upstream`] if no response could be obtained.
    #[instrument(skip_all)]
    pub async fn fetch(&self, search: &Params) -> Result<Response> {
        let url = self.url_for(search);
        let upstream = self.client.get(url).send().await?;
        debug!(status = %upstream.status(), "Upstream responded");

        let status = upstream.status();
        let headers = upstream.headers().clone();

        let mut response = Response::new(Body::from_stream(upstream.bytes_stream()));
        *response.status_mut() = status;
        for name in &FORWARDED_HEADERS {
            if let Some(value) = headers.get(name) {
                response.headers_mut().insert(name.clone(), value.clone());
            }
        }

        Ok(response)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use uinveil_common::ParamValue;

    use super::*;

    fn upstream(base_url: &str) -> Upstream {
        let proxy = ProxyConfig {
            base_url: base_url.to_string(),
            ..ProxyConfig::default()
        };
        Upstream::new(&proxy, &UpstreamSettings::default()).unwrap()
    }

    #[test]
    fn test_url_for() {
        let upstream = upstream("https://example.com/headimg_dl?stale=1");
        let search = Params::from([
            ("dst_uin".to_string(), ParamValue::from("100")),
            ("spec".to_string(), ParamValue::from("640")),
        ]);

        assert_eq!(
            upstream.url_for(&search).as_str(),
            "https://example.com/headimg_dl?dst_uin=100&spec=640"
        );
        assert_eq!(
            upstream.url_for(&Params::new()).as_str(),
            "https://example.com/headimg_dl"
        );
    }

    #[test]
    fn test_invalid_base_url() {
        let proxy = ProxyConfig {
            base_url: "::".to_string(),
            ..ProxyConfig::default()
        };
        assert!(matches!(
            Upstream::new(&proxy, &UpstreamSettings::default()),
            Err(DaemonError::Config(_))
        ));
    }
}
