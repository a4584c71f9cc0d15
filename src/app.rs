use crate::error::{AppError, AppResult};
use axum::Router;
use axum::routing::{get, post};
use std::sync::Arc;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

const DEFAULT_GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta";

#[derive(Clone)]
pub struct AppState {
    pub runtime: Arc<RuntimeConfig>,
    pub http: reqwest::Client,
}

#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub listen: String,
    pub request_timeout_ms: u64,
    pub gemini_base_url: String,
}

impl RuntimeConfig {
    pub fn from_env() -> Self {
        let listen = std::env::var("APIPROBE_LISTEN")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| "0.0.0.0:8080".to_string());
        let request_timeout_ms = std::env::var("APIPROBE_TIMEOUT_MS")
            .ok()
            .and_then(|v| v.trim().parse::<u64>().ok())
            .filter(|v| *v > 0)
            .unwrap_or(30_000);
        let gemini_base_url = std::env::var("APIPROBE_GEMINI_BASE_URL")
            .ok()
            .filter(|v| !v.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_GEMINI_BASE_URL.to_string());
        Self {
            listen,
            request_timeout_ms,
            gemini_base_url,
        }
    }
}

pub fn load_state() -> AppResult<AppState> {
    load_state_with_runtime(RuntimeConfig::from_env())
}

pub fn load_state_with_runtime(runtime: RuntimeConfig) -> AppResult<AppState> {
    let http = reqwest::Client::builder()
        .user_agent("apiprobe/0.1")
        .build()
        .map_err(|err| {
            AppError::new(
                axum::http::StatusCode::BAD_REQUEST,
                "http_client_init_failed",
                err.to_string(),
            )
        })?;
    Ok(AppState {
        runtime: Arc::new(runtime),
        http,
    })
}

pub fn build_app(state: AppState) -> Router {
    Router::new()
        .route(
            "/api/custom",
            post(crate::handlers::custom_forward).get(crate::handlers::custom_list),
        )
        .route("/api/custom/models", get(crate::handlers::custom_models))
        .route("/api/gemini", post(crate::handlers::gemini_generate))
        .route(
            "/api/gemini/diagnose",
            post(crate::handlers::gemini_diagnose),
        )
        .with_state(state)
        .layer(SetRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
            MakeRequestUuid,
        ))
        .layer(PropagateRequestIdLayer::new(
            axum::http::header::HeaderName::from_static("x-request-id"),
        ))
        .layer(TraceLayer::new_for_http())
}
