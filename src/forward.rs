use crate::error::AppError;
use axum::http::StatusCode;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;

/// Path root most OpenAI-compatible APIs expect ("/v1").
pub const VERSION_PREFIX: &str = "/v1";

pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.0-flash";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Delete,
    Patch,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Delete => reqwest::Method::DELETE,
            HttpMethod::Patch => reqwest::Method::PATCH,
        }
    }
}

/// One forwarded call against an OpenAI-compatible upstream. Built fresh per
/// request; nothing here outlives the response.
#[derive(Debug, Clone, Deserialize)]
pub struct UpstreamRequest {
    #[serde(alias = "baseUrl", default)]
    pub base_url: String,
    #[serde(alias = "apiKey", default)]
    pub api_key: String,
    #[serde(default)]
    pub endpoint: String,
    #[serde(default)]
    pub method: HttpMethod,
    #[serde(default)]
    pub body: Option<Value>,
}

impl UpstreamRequest {
    pub fn validate(&self) -> Result<(), AppError> {
        if self.base_url.trim().is_empty() || self.api_key.trim().is_empty() {
            return Err(AppError::new(
                StatusCode::BAD_REQUEST,
                "invalid_input",
                "Base URL and API Key are required",
            ));
        }
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ForwardError {
    #[error("upstream request could not be completed: {0}")]
    Network(#[from] reqwest::Error),
}

/// Joins base URL and endpoint without duplicating the version prefix: a
/// trailing "/v1" on the base is stripped, a missing "/v1" on the endpoint is
/// prepended. Idempotent over its own output.
///
/// An endpoint without a leading slash glues the prefix straight onto the
/// host segment ("/v1models"). That matches the observed upstream-tester
/// behavior and is pinned by test; we warn instead of second-guessing it.
pub fn canonicalize_url(base_url: &str, endpoint: &str) -> String {
    let base = base_url.strip_suffix(VERSION_PREFIX).unwrap_or(base_url);
    if endpoint.starts_with(VERSION_PREFIX) {
        format!("{base}{endpoint}")
    } else {
        if !endpoint.starts_with('/') {
            tracing::warn!(
                endpoint,
                "endpoint has no leading slash; version prefix will be glued onto the host segment"
            );
        }
        format!("{base}{VERSION_PREFIX}{endpoint}")
    }
}

/// Relays an `UpstreamRequest` to the target API with bearer auth. The key is
/// sent to the upstream host only; the log line below carries a short prefix
/// and sits at trace level, below the default filter.
pub async fn send(
    client: &reqwest::Client,
    request: &UpstreamRequest,
    timeout_ms: u64,
) -> Result<reqwest::Response, ForwardError> {
    let url = canonicalize_url(&request.base_url, &request.endpoint);
    tracing::trace!(
        url = %url,
        method = ?request.method,
        key_prefix = %key_prefix(&request.api_key),
        "forwarding upstream request"
    );

    let mut builder = client
        .request(request.method.into(), &url)
        .timeout(Duration::from_millis(timeout_ms))
        .bearer_auth(&request.api_key)
        .header(axum::http::header::CONTENT_TYPE, "application/json");

    if request.method != HttpMethod::Get {
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }
    }

    Ok(builder.send().await?)
}

/// Relays a generation request to the Gemini `generateContent` endpoint for
/// the given model, passing the key as the `key` query parameter.
pub async fn send_gemini_generate(
    client: &reqwest::Client,
    gemini_base_url: &str,
    api_key: &str,
    model: &str,
    body: &Value,
    timeout_ms: u64,
) -> Result<reqwest::Response, ForwardError> {
    let base = gemini_base_url.trim_end_matches('/');
    let url = format!("{base}/models/{model}:generateContent");
    tracing::trace!(url = %url, key_prefix = %key_prefix(api_key), "forwarding gemini request");
    Ok(client
        .post(url)
        .timeout(Duration::from_millis(timeout_ms))
        .query(&[("key", api_key)])
        .json(body)
        .send()
        .await?)
}

/// Key-validation leg of the Gemini diagnosis: lists models for the key.
pub async fn send_gemini_list_models(
    client: &reqwest::Client,
    gemini_base_url: &str,
    api_key: &str,
    timeout_ms: u64,
) -> Result<reqwest::Response, ForwardError> {
    let base = gemini_base_url.trim_end_matches('/');
    let url = format!("{base}/models");
    Ok(client
        .get(url)
        .timeout(Duration::from_millis(timeout_ms))
        .query(&[("key", api_key)])
        .send()
        .await?)
}

fn key_prefix(api_key: &str) -> String {
    let prefix: String = api_key.chars().take(8).collect();
    format!("{prefix}...")
}
