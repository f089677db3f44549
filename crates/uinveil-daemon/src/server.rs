//! HTTP server for minting signed URLs and proxying verified requests.
//!
//! Routes:
//! - `GET /avatar`: verify a signed URL and relay the upstream avatar
//! - `POST /avatar/collect`: every intermediate parameter set plus tokens
//! - `POST /avatar/sign`: just the tokens
//! - `POST /avatar/url`: a ready-to-share signed URL
//! - `GET /healthz`: liveness

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, header};
use axum::response::Response;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{Value, json};
use tokio::net::TcpListener;
use tokio::sync::broadcast;
use tracing::{Span, debug, info, instrument, warn};
use uinveil::{LICENSE_PARAM, PolicyEngine};
use uinveil_common::{
    CollectedParams, License, Params, SignedTokens, SignedUrl, parse_query,
};

use crate::auth;
use crate::config::DaemonConfig;
use crate::error::{DaemonError, PlainError, Result};
use crate::registry::Registry;
use crate::upstream::Upstream;

/// Shared, immutable request-handling state.
#[derive(Clone)]
pub struct AppState {
    /// Codecs and parameter policies
    engine: Arc<PolicyEngine>,

    /// Licenses and bearer tokens
    registry: Arc<Registry>,

    /// Outbound client
    upstream: Arc<Upstream>,
}

impl AppState {
    /// Derives key material and lookup tables from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the key material or upstream client is unusable.
    pub fn from_config(config: &DaemonConfig) -> Result<Self> {
        Ok(Self {
            engine: Arc::new(PolicyEngine::new(&config.site, &config.proxy)?),
            registry: Arc::new(Registry::from_config(config)),
            upstream: Arc::new(Upstream::new(&config.proxy, &config.upstream)?),
        })
    }
}

/// Builds the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/avatar", get(get_avatar))
        .route("/avatar/collect", post(collect))
        .route("/avatar/sign", post(sign))
        .route("/avatar/url", post(signed_url))
        .with_state(state)
}

/// Serves until a shutdown signal is broadcast.
///
/// # Errors
///
/// Returns an error if the state cannot be built or the port cannot be bound.
pub async fn run(config: &DaemonConfig, mut shutdown_rx: broadcast::Receiver<()>) -> Result<()> {
    let state = AppState::from_config(config)?;
    let licenses = state.registry.license_count();

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));
    let listener = TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    info!(addr = %local_addr, licenses, "Listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move {
            let _ = shutdown_rx.recv().await;
            info!("Shutting down HTTP server");
        })
        .await?;

    Ok(())
}

async fn healthz() -> Json<Value> {
    Json(json!({"status": "ok"}))
}

/// Verifies a signed URL and relays the upstream response.
#[instrument(skip_all, fields(license = tracing::field::Empty))]
async fn get_avatar(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
) -> std::result::Result<Response, PlainError> {
    let mut params = parse_query(query.as_deref().unwrap_or_default());
    let site = state.engine.site();

    let (Some(license_id), Some(cipher), Some(sign)) = (
        params.remove(LICENSE_PARAM),
        params.remove(&site.cipher_param),
        params.remove(&site.sign_param),
    ) else {
        return Err(DaemonError::BadRequest("Missing parameter".to_string()).into());
    };

    let license_id = license_id.to_string();
    Span::current().record("license", license_id.as_str());

    let Some(license) = state.registry.license(&license_id) else {
        debug!("Unknown license");
        return Err(DaemonError::InvalidLicense.into());
    };

    let verified = state
        .engine
        .verify_request(license, &cipher.to_string(), &sign.to_string(), &params)
        .map_err(|e| {
            if e.is_forbidden() {
                warn!(error = %e, "Rejected signed URL");
            }
            DaemonError::from(e)
        })?;

    Ok(state.upstream.fetch(&verified.final_search).await?)
}

/// Authorized materials and extras of a signing request.
struct Prepared<'a> {
    license: &'a License,
    materials: Params,
    extra: Params,
}

/// Authorizes a signing request and parses its body and extra header.
fn prepare<'a>(
    state: &'a AppState,
    query: &Params,
    headers: &HeaderMap,
    body: &Bytes,
) -> Result<Prepared<'a>> {
    let license_param = query.get(LICENSE_PARAM).map(ToString::to_string);
    let license = auth::authorize(&state.registry, headers, license_param.as_deref())
        .inspect_err(|_| warn!("Rejected unauthorized signing request"))?;
    Span::current().record("license", license.id.as_str());

    let site = state.engine.site();
    let materials = parse_body(headers, body)?;
    if !materials.contains_key(&site.uin_param) {
        return Err(DaemonError::MissingParameter(site.uin_param.clone()));
    }

    Ok(Prepared {
        license,
        materials,
        extra: extra_params(headers, &site.extra_param_header),
    })
}

/// Reads materials from a JSON or urlencoded form body.
fn parse_body(headers: &HeaderMap, body: &Bytes) -> Result<Params> {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| DaemonError::BadRequest("Content-Type is not provided".to_string()))?;

    let mime = content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase();

    match mime.as_str() {
        "application/json" => serde_json::from_slice(body)
            .map_err(|e| DaemonError::BadRequest(format!("Invalid JSON body: {e}"))),
        "multipart/form-data" => Err(DaemonError::BadRequest(
            "multipart bodies are not supported".to_string(),
        )),
        _ => Ok(parse_query(&String::from_utf8_lossy(body))),
    }
}

/// Parses extra parameters from the configured header; empty when disabled or absent.
fn extra_params(headers: &HeaderMap, header_name: &str) -> Params {
    if header_name.is_empty() {
        return Params::new();
    }

    headers
        .get(header_name)
        .and_then(|v| v.to_str().ok())
        .map(parse_query)
        .unwrap_or_default()
}

#[instrument(skip_all, fields(license = tracing::field::Empty))]
async fn collect(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<CollectedParams>> {
    let query = parse_query(query.as_deref().unwrap_or_default());
    let prepared = prepare(&state, &query, &headers, &body)?;

    let collected = state
        .engine
        .collect_all(prepared.license, &prepared.materials, &prepared.extra)?;
    debug!("Collected signed parameters");

    Ok(Json(collected))
}

#[instrument(skip_all, fields(license = tracing::field::Empty))]
async fn sign(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SignedTokens>> {
    let query = parse_query(query.as_deref().unwrap_or_default());
    let prepared = prepare(&state, &query, &headers, &body)?;

    let tokens = state
        .engine
        .collect_sign(prepared.license, &prepared.materials, &prepared.extra)?;
    debug!("Signed materials");

    Ok(Json(tokens))
}

#[instrument(skip_all, fields(license = tracing::field::Empty))]
async fn signed_url(
    State(state): State<AppState>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<SignedUrl>> {
    let query = parse_query(query.as_deref().unwrap_or_default());
    let prepared = prepare(&state, &query, &headers, &body)?;

    let collected = state
        .engine
        .collect_all(prepared.license, &prepared.materials, &prepared.extra)?;
    let prefix = query.get("prefix").map(ToString::to_string).unwrap_or_default();
    debug!(prefix = %prefix, "Built signed URL");

    Ok(Json(SignedUrl {
        url: state.engine.signed_url(&prefix, &collected),
    }))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use axum::body::{Body, to_bytes};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;
    use uinveil_common::{ErrorBody, ParamValue};
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    use super::*;

    const AUTH: &str = "Bearer token-abc";

    fn config(base_url: &str, extra_param_policy: &str) -> DaemonConfig {
        DaemonConfig::from_toml(&format!(
            r#"
[site]
aes_key = "123456789"
aes_iv = "987654321"
xor_key = [207, 186, 141, 1]

[proxy]
base_url = "{base_url}/headimg_dl"

[[license]]
id = "test"
key = "a9a6446b"
secret = "secret_to_sign"
extra_param_policy = "{extra_param_policy}"

[[authentication]]
token = "token-abc"
permissions = {{ allow_license = ["test"] }}
            "#
        ))
        .unwrap()
    }

    fn app(base_url: &str, extra_param_policy: &str) -> Router {
        router(AppState::from_config(&config(base_url, extra_param_policy)).unwrap())
    }

    fn post_json(uri: &str, body: &str) -> Request<Body> {
        Request::post(uri)
            .header(header::AUTHORIZATION, AUTH)
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap()
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    async fn body_bytes(response: Response) -> Bytes {
        to_bytes(response.into_body(), usize::MAX).await.unwrap()
    }

    async fn json_body<T: serde::de::DeserializeOwned>(response: Response) -> T {
        serde_json::from_slice(&body_bytes(response).await).unwrap()
    }

    async fn mock_upstream() -> MockServer {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/headimg_dl"))
            .and(query_param("dst_uin", "100"))
            .and(query_param("spec", "640"))
            .and(query_param("img_type", "jpg"))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_raw(b"\x89PNG".to_vec(), "image/png")
                    .insert_header("cache-control", "max-age=300"),
            )
            .mount(&server)
            .await;
        server
    }

    #[tokio::test]
    async fn test_healthz() {
        let response = app("http://127.0.0.1:9", "ignore")
            .oneshot(get("/healthz"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body: Value = json_body(response).await;
        assert_eq!(body, json!({"status": "ok"}));
    }

    #[tokio::test]
    async fn test_collect() {
        let request = Request::post("/avatar/collect?license=test:a9a6446b")
            .header(header::AUTHORIZATION, AUTH)
            .header(header::CONTENT_TYPE, "application/json; charset=utf-8")
            .header("X-Form-Extra", "t=1700000000&spec=100")
            .body(Body::from(r#"{"uin":"100"}"#))
            .unwrap();

        let response = app("http://127.0.0.1:9", "allow")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let collected: CollectedParams = json_body(response).await;
        assert_eq!(collected.license_id, "test");
        assert_eq!(collected.search.ignored["t"], ParamValue::from("1700000000"));
        assert_eq!(collected.search.mixin["dst_uin"], ParamValue::from("100"));
        assert_eq!(collected.search.mixin["spec"], ParamValue::from("100"));
        assert_eq!(collected.search.final_search["img_type"], ParamValue::from("jpg"));
        assert!(!collected.cipher.is_empty());
    }

    #[tokio::test]
    async fn test_sign_form_body() {
        let request = Request::post("/avatar/sign?license=test:a9a6446b")
            .header(header::AUTHORIZATION, AUTH)
            .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .body(Body::from("uin=100"))
            .unwrap();

        let response = app("http://127.0.0.1:9", "ignore")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let tokens: SignedTokens = json_body(response).await;
        assert_eq!(tokens.license_id, "test");
        assert!(uinveil::verify(r#"{"uin":"100"}"#, "secret_to_sign", &tokens.sign));
    }

    #[tokio::test]
    async fn test_unauthorized() {
        let app = app("http://127.0.0.1:9", "ignore");

        let no_token = Request::post("/avatar/sign?license=test:a9a6446b")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"uin":"100"}"#))
            .unwrap();
        let wrong_key = post_json("/avatar/sign?license=test:nope", r#"{"uin":"100"}"#);
        let no_license = post_json("/avatar/sign", r#"{"uin":"100"}"#);

        for request in [no_token, wrong_key, no_license] {
            let response = app.clone().oneshot(request).await.unwrap();
            assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
            assert_eq!(response.headers()[header::WWW_AUTHENTICATE], "Bearer");
            let body: ErrorBody = json_body(response).await;
            assert_eq!(body.code, 401);
        }
    }

    #[tokio::test]
    async fn test_missing_identifier() {
        let response = app("http://127.0.0.1:9", "ignore")
            .oneshot(post_json("/avatar/sign?license=test:a9a6446b", r#"{"other":"x"}"#))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.message, "Missing parameter: uin");
    }

    #[tokio::test]
    async fn test_missing_content_type() {
        let request = Request::post("/avatar/sign?license=test:a9a6446b")
            .header(header::AUTHORIZATION, AUTH)
            .body(Body::from(r#"{"uin":"100"}"#))
            .unwrap();
        let response = app("http://127.0.0.1:9", "ignore")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn test_deny_policy_rejects_extra_header() {
        let request = Request::post("/avatar/sign?license=test:a9a6446b")
            .header(header::AUTHORIZATION, AUTH)
            .header(header::CONTENT_TYPE, "application/json")
            .header("X-Form-Extra", "foo=bar")
            .body(Body::from(r#"{"uin":"100"}"#))
            .unwrap();
        let response = app("http://127.0.0.1:9", "deny")
            .oneshot(request)
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        let body: ErrorBody = json_body(response).await;
        assert_eq!(body.message, "extra not allowed");
    }

    #[tokio::test]
    async fn test_signed_url_round_trip() {
        let upstream = mock_upstream().await;
        let app = app(&upstream.uri(), "ignore");

        let response = app
            .clone()
            .oneshot(post_json(
                "/avatar/url?license=test:a9a6446b&prefix=",
                r#"{"uin":"100"}"#,
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let signed: SignedUrl = json_body(response).await;
        assert!(signed.url.starts_with("/avatar?dst_uin=100&C="));

        let response = app.oneshot(get(&signed.url)).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()[header::CONTENT_TYPE], "image/png");
        assert_eq!(response.headers()[header::CACHE_CONTROL], "max-age=300");
        assert_eq!(&body_bytes(response).await[..], b"\x89PNG");
    }

    #[tokio::test]
    async fn test_signed_url_prefix() {
        let response = app("http://127.0.0.1:9", "ignore")
            .oneshot(post_json(
                "/avatar/url?license=test:a9a6446b&prefix=https%3A%2F%2Fcdn.example",
                r#"{"uin":"100"}"#,
            ))
            .await
            .unwrap();
        let signed: SignedUrl = json_body(response).await;
        assert!(signed.url.starts_with("https://cdn.example/avatar?"));
        assert!(signed.url.ends_with("&license=test"));
    }

    #[tokio::test]
    async fn test_avatar_missing_parameter() {
        let response = app("http://127.0.0.1:9", "ignore")
            .oneshot(get("/avatar?license=test&C=abc"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(&body_bytes(response).await[..], b"Missing parameter");
    }

    #[tokio::test]
    async fn test_avatar_unknown_license() {
        let response = app("http://127.0.0.1:9", "ignore")
            .oneshot(get("/avatar?license=ghost&C=abc&S=def"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::FORBIDDEN);
        assert_eq!(&body_bytes(response).await[..], b"Invalid license");
    }

    #[tokio::test]
    async fn test_avatar_forged() {
        let app = app("http://127.0.0.1:9", "ignore");

        let response = app
            .clone()
            .oneshot(post_json("/avatar/sign?license=test:a9a6446b", r#"{"uin":"100"}"#))
            .await
            .unwrap();
        let tokens: SignedTokens = json_body(response).await;

        let bad_sign = format!("/avatar?license=test&C={}&S=xx{}", tokens.cipher, "A".repeat(43));
        let bad_cipher = format!("/avatar?license=test&C=xxAAAA&S={}", tokens.sign);

        for uri in [bad_sign, bad_cipher] {
            let response = app.clone().oneshot(get(&uri)).await.unwrap();
            assert_eq!(response.status(), StatusCode::FORBIDDEN);
            assert_eq!(&body_bytes(response).await[..], b"Forbidden");
        }
    }

    #[tokio::test]
    async fn test_avatar_upstream_unreachable() {
        let app = app("http://127.0.0.1:9", "ignore");

        let response = app
            .clone()
            .oneshot(post_json("/avatar/sign?license=test:a9a6446b", r#"{"uin":"100"}"#))
            .await
            .unwrap();
        let tokens: SignedTokens = json_body(response).await;

        let uri = format!("/avatar?license=test&C={}&S={}", tokens.cipher, tokens.sign);
        let response = app.oneshot(get(&uri)).await.unwrap();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
