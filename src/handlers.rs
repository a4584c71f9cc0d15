use crate::app::AppState;
use crate::error::{AppError, AppResult};
use crate::forward::{self, DEFAULT_GEMINI_MODEL, ForwardError, HttpMethod, UpstreamRequest};
use crate::models;
use crate::normalize::{self, ParseMode};
use axum::Json;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::IntoResponse;
use serde::Deserialize;
use serde_json::{Value, json};

const DEFAULT_LIST_ENDPOINT: &str = "/v1/models";

/// POST /api/custom — forward a caller-described request to an
/// OpenAI-compatible upstream, normalize the body, mirror the status.
pub async fn custom_forward(
    State(state): State<AppState>,
    Json(request): Json<UpstreamRequest>,
) -> AppResult<impl IntoResponse> {
    relay_custom(&state, &request).await
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    #[serde(alias = "baseUrl", default)]
    pub base_url: Option<String>,
    #[serde(alias = "apiKey", default)]
    pub api_key: Option<String>,
    #[serde(default)]
    pub endpoint: Option<String>,
}

impl ListQuery {
    fn into_request(self) -> UpstreamRequest {
        UpstreamRequest {
            base_url: self.base_url.unwrap_or_default(),
            api_key: self.api_key.unwrap_or_default(),
            endpoint: self
                .endpoint
                .unwrap_or_else(|| DEFAULT_LIST_ENDPOINT.to_string()),
            method: HttpMethod::Get,
            body: None,
        }
    }
}

/// GET /api/custom — list variant of the forwarder: credentials arrive as
/// query parameters, the method is fixed to GET.
pub async fn custom_list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    relay_custom(&state, &query.into_request()).await
}

/// GET /api/custom/models — list variant plus server-side model extraction:
/// answers `{"models": [..]}` built from whatever shape the upstream used.
pub async fn custom_models(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> AppResult<impl IntoResponse> {
    let (status, Json(body)) = relay_custom(&state, &query.into_request()).await?;
    if !status.is_success() {
        return Ok((status, Json(body)));
    }
    let models = models::extract_model_ids(&body);
    Ok((StatusCode::OK, Json(json!({ "models": models }))))
}

async fn relay_custom(
    state: &AppState,
    request: &UpstreamRequest,
) -> AppResult<(StatusCode, Json<Value>)> {
    request.validate()?;
    let response = forward::send(&state.http, request, state.runtime.request_timeout_ms)
        .await
        .map_err(network_error)?;
    mirror_response(response).await
}

/// POST /api/gemini — relay a generation request to the Gemini API for the
/// model named in `X-Model`, authenticated by the key in `X-API-Key`.
pub async fn gemini_generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<impl IntoResponse> {
    let (api_key, model) = gemini_credentials(&headers)?;
    let response = forward::send_gemini_generate(
        &state.http,
        &state.runtime.gemini_base_url,
        &api_key,
        &model,
        &body,
        state.runtime.request_timeout_ms,
    )
    .await
    .map_err(network_error)?;
    mirror_response(response).await
}

/// POST /api/gemini/diagnose — run the generation call and a key-validation
/// call in parallel and report both outcomes. A failed leg is recorded in its
/// own report; it neither cancels nor masks the other.
pub async fn gemini_diagnose(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(body): Json<Value>,
) -> AppResult<impl IntoResponse> {
    let (api_key, model) = gemini_credentials(&headers)?;
    let timeout_ms = state.runtime.request_timeout_ms;
    let base = &state.runtime.gemini_base_url;

    let (generation, key_check) = tokio::join!(
        forward::send_gemini_generate(&state.http, base, &api_key, &model, &body, timeout_ms),
        forward::send_gemini_list_models(&state.http, base, &api_key, timeout_ms),
    );
    let generation = leg_report(generation).await;
    let key_check = leg_report(key_check).await;

    let success = generation["success"] == json!(true) && key_check["success"] == json!(true);
    Ok(Json(json!({
        "success": success,
        "model": model,
        "generation": generation,
        "key_check": key_check,
    })))
}

fn gemini_credentials(headers: &HeaderMap) -> Result<(String, String), AppError> {
    let api_key = header_value(headers, "x-api-key").ok_or_else(|| {
        AppError::new(
            StatusCode::BAD_REQUEST,
            "invalid_input",
            "API Key is required",
        )
    })?;
    let model =
        header_value(headers, "x-model").unwrap_or_else(|| DEFAULT_GEMINI_MODEL.to_string());
    Ok((api_key, model))
}

fn header_value(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
}

/// Mirrors an upstream response to the caller: the upstream status verbatim,
/// the body run through the normalizer. Upstream errors are surfaced with
/// their payload, never swallowed.
async fn mirror_response(response: reqwest::Response) -> AppResult<(StatusCode, Json<Value>)> {
    let status = response.status();
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    let text = response.text().await.map_err(|err| {
        network_error(ForwardError::Network(err))
    })?;
    let body = normalize::normalize(&content_type, &text, ParseMode::Lenient).map_err(|err| {
        AppError::new(
            StatusCode::INTERNAL_SERVER_ERROR,
            "normalize_failed",
            "Internal server error",
        )
        .with_details(err.to_string())
    })?;
    Ok((status, Json(body)))
}

/// Independent outcome record for one leg of the diagnosis fan-out. A
/// connection that dies mid-body fails the leg with the underlying message;
/// a 2xx status line alone does not count as success.
async fn leg_report(result: Result<reqwest::Response, ForwardError>) -> Value {
    match result {
        Ok(response) => {
            let status = response.status();
            let content_type = response
                .headers()
                .get(header::CONTENT_TYPE)
                .and_then(|value| value.to_str().ok())
                .unwrap_or_default()
                .to_string();
            let text = match response.text().await {
                Ok(text) => text,
                Err(err) => {
                    return json!({
                        "success": false,
                        "status": status.as_u16(),
                        "error": err.to_string(),
                    });
                }
            };
            let body =
                normalize::normalize(&content_type, &text, ParseMode::Lenient).unwrap_or(Value::Null);
            json!({
                "success": status.is_success(),
                "status": status.as_u16(),
                "body": body,
            })
        }
        Err(err) => json!({
            "success": false,
            "error": err.to_string(),
        }),
    }
}

fn network_error(err: ForwardError) -> AppError {
    AppError::new(
        StatusCode::INTERNAL_SERVER_ERROR,
        "upstream_unreachable",
        "Internal server error",
    )
    .with_details(err.to_string())
}
