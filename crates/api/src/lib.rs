mod config;
mod rate_limit;

use std::sync::Arc;

use anyhow::{Context, Result};
use axum::extract::rejection::JsonRejection;
use axum::extract::{Json, Path as AxumPath, State};
use axum::http::{header, HeaderValue, Method, Request, StatusCode};
use axum::middleware::{self, Next};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{body::Body, Router};
use faq_agents::FaqAgent;
use faq_core::{ChatInput, FaqCatalog, IntentMatcher};
use faq_ml::{Fallback, TextGenerator};
use faq_observability::AppMetrics;
use faq_storage::Store;
use serde::{Deserialize, Serialize};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer};
use tower_http::trace::TraceLayer;

pub use crate::config::{ApiConfig, DEFAULT_MAX_QUERY_CHARS};
use crate::rate_limit::IpRateLimiter;

const MAX_FEEDBACK_COMMENT_LEN: usize = 1_000;

pub type Agent = FaqAgent<Store, Fallback>;

#[derive(Clone)]
pub struct ApiState {
    pub agent: Arc<Agent>,
    pub metrics: Arc<AppMetrics>,
    pub api_key: String,
    pub limiter: IpRateLimiter,
    pub allowed_origins: Arc<Vec<String>>,
    pub max_query_chars: usize,
    pub storage_backend: &'static str,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    timestamp_utc: String,
    metrics: faq_observability::MetricsSnapshot,
    fallback_model: String,
    storage: &'static str,
}

#[derive(Debug, Clone, Deserialize)]
struct ChatRequest {
    session_id: Option<String>,
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct MatchRequest {
    text: String,
}

#[derive(Debug, Clone, Deserialize)]
struct FeedbackRequest {
    session_id: Option<String>,
    helpful: bool,
    comment: Option<String>,
}

pub async fn build_app(config: ApiConfig) -> Result<Router> {
    let metrics = AppMetrics::shared();

    let catalog = match config.catalog_path.as_ref() {
        Some(path) => FaqCatalog::from_json_file(path)?,
        None => FaqCatalog::unfv_default(),
    };
    let matcher = Arc::new(IntentMatcher::new(catalog).context("invalid FAQ catalog")?);

    let store = match config.database_url.as_deref() {
        Some(database_url) => Store::sqlite(database_url).await?,
        None => Store::memory(),
    };
    let storage_backend = store.backend_name();

    tracing::info!(
        intents = matcher.intent_count(),
        storage = storage_backend,
        fallback = %config.fallback.model_name(),
        "faq catalog loaded"
    );

    let agent = Arc::new(FaqAgent::new(
        matcher,
        Arc::new(config.fallback),
        Arc::new(store),
        metrics.clone(),
    ));

    let state = ApiState {
        agent,
        metrics,
        api_key: config.api_key,
        limiter: IpRateLimiter::new(config.rate_limit_window, config.rate_limit_max),
        allowed_origins: Arc::new(config.allowed_origins),
        max_query_chars: config.max_query_chars,
        storage_backend,
    };

    Ok(build_router(state))
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/v1/faq", get(faq_catalog))
        .route("/v1/chat", post(chat))
        .route("/v1/match", post(match_query))
        .route("/v1/sessions/:session_id", get(session_history))
        .route("/v1/sessions/:session_id/reset", post(session_reset))
        .route("/v1/feedback", post(feedback_submit))
        .route("/v1/feedback/summary", get(feedback_summary))
        .layer(build_cors_layer(&state.allowed_origins))
        .layer(middleware::from_fn(security_headers_middleware))
        .layer(TraceLayer::new_for_http())
        .layer(SetRequestIdLayer::x_request_id(MakeRequestUuid))
        .layer(PropagateRequestIdLayer::x_request_id())
        .layer(RequestBodyLimitLayer::new(16 * 1024))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            api_key_middleware,
        ))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            rate_limit_middleware,
        ))
        .with_state(state)
}

async fn health(State(state): State<ApiState>) -> impl IntoResponse {
    let payload = HealthResponse {
        status: "ok",
        timestamp_utc: chrono::Utc::now().to_rfc3339(),
        metrics: state.metrics.snapshot(),
        fallback_model: state.agent.fallback_model().to_string(),
        storage: state.storage_backend,
    };
    (StatusCode::OK, Json(payload))
}

async fn faq_catalog(State(state): State<ApiState>) -> impl IntoResponse {
    (StatusCode::OK, Json(state.agent.catalog_overview()))
}

async fn chat(
    State(state): State<ApiState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_json(rejection),
    };
    let text = match validate_query(&request.text, state.max_query_chars) {
        Ok(text) => text,
        Err(response) => return response,
    };

    let input = ChatInput {
        session_id: request.session_id,
        text,
    };

    match state.agent.handle_chat(input).await {
        Ok(reply) => (StatusCode::OK, Json(reply)).into_response(),
        Err(error) => {
            tracing::error!(error = %error, "chat turn failed");
            error_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "chat_failed",
                &error.to_string(),
            )
        }
    }
}

async fn match_query(
    State(state): State<ApiState>,
    payload: Result<Json<MatchRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_json(rejection),
    };
    match validate_query(&request.text, state.max_query_chars) {
        Ok(text) => (StatusCode::OK, Json(state.agent.inspect(&text))).into_response(),
        Err(response) => response,
    }
}

async fn session_history(
    State(state): State<ApiState>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    match state.agent.history(&session_id).await {
        Ok(Some(session)) => (StatusCode::OK, Json(session)).into_response(),
        Ok(None) => error_response(
            StatusCode::NOT_FOUND,
            "session_not_found",
            "no conversation with this session id",
        ),
        Err(error) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "history_failed",
            &error.to_string(),
        ),
    }
}

async fn session_reset(
    State(state): State<ApiState>,
    AxumPath(session_id): AxumPath<String>,
) -> Response {
    match state.agent.reset_session(&session_id).await {
        Ok(removed) => (
            StatusCode::OK,
            Json(serde_json::json!({
                "session_id": session_id,
                "cleared": removed
            })),
        )
            .into_response(),
        Err(error) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "reset_failed",
            &error.to_string(),
        ),
    }
}

async fn feedback_submit(
    State(state): State<ApiState>,
    payload: Result<Json<FeedbackRequest>, JsonRejection>,
) -> Response {
    let Json(request) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return invalid_json(rejection),
    };
    if request
        .comment
        .as_deref()
        .is_some_and(|comment| comment.chars().count() > MAX_FEEDBACK_COMMENT_LEN)
    {
        return error_response(
            StatusCode::BAD_REQUEST,
            "comment_too_long",
            "feedback comment exceeds 1000 characters",
        );
    }

    match state
        .agent
        .submit_feedback(request.session_id, request.helpful, request.comment)
        .await
    {
        Ok(record) => (StatusCode::OK, Json(record)).into_response(),
        Err(error) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "feedback_failed",
            &error.to_string(),
        ),
    }
}

async fn feedback_summary(State(state): State<ApiState>) -> Response {
    match state.agent.feedback_summary().await {
        Ok(summary) => (StatusCode::OK, Json(summary)).into_response(),
        Err(error) => error_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "feedback_summary_failed",
            &error.to_string(),
        ),
    }
}

fn validate_query(raw: &str, max_chars: usize) -> Result<String, Response> {
    let text = raw.trim();
    if text.is_empty() {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "empty_text",
            "write a question before sending",
        ));
    }
    if text.chars().count() > max_chars {
        return Err(error_response(
            StatusCode::BAD_REQUEST,
            "text_too_long",
            &format!("questions are limited to {} characters", max_chars),
        ));
    }
    Ok(text.to_string())
}

fn error_response(status: StatusCode, error: &str, message: &str) -> Response {
    (
        status,
        Json(serde_json::json!({
            "error": error,
            "message": message
        })),
    )
        .into_response()
}

fn invalid_json(rejection: JsonRejection) -> Response {
    tracing::debug!(status = %rejection.status(), "request body rejected");
    error_response(
        StatusCode::BAD_REQUEST,
        "invalid_json",
        &rejection.body_text(),
    )
}

fn is_public_endpoint(path: &str) -> bool {
    matches!(path, "/health")
}

async fn api_key_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let header_key = request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();

    if header_key != state.api_key {
        return error_response(
            StatusCode::UNAUTHORIZED,
            "unauthorized",
            "missing or invalid x-api-key",
        );
    }

    next.run(request).await
}

async fn rate_limit_middleware(
    State(state): State<ApiState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    if request.method() == Method::OPTIONS || is_public_endpoint(request.uri().path()) {
        return next.run(request).await;
    }

    let ip = request_ip(&request);
    if !state.limiter.allow(&ip) {
        let mut response = error_response(
            StatusCode::TOO_MANY_REQUESTS,
            "rate_limited",
            "rate limit exceeded for this IP",
        );
        if let Ok(value) = HeaderValue::from_str(&state.limiter.window().as_secs().to_string()) {
            response.headers_mut().insert(header::RETRY_AFTER, value);
        }
        return response;
    }

    next.run(request).await
}

fn request_ip(request: &Request<Body>) -> String {
    request
        .headers()
        .get("x-forwarded-for")
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
        .unwrap_or_else(|| "local".to_string())
}

fn build_cors_layer(allowed_origins: &Arc<Vec<String>>) -> CorsLayer {
    let origins = allowed_origins
        .iter()
        .filter_map(|origin| HeaderValue::from_str(origin).ok())
        .collect::<Vec<_>>();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST, Method::OPTIONS])
        .allow_headers([
            header::CONTENT_TYPE,
            header::HeaderName::from_static("x-api-key"),
        ])
}

async fn security_headers_middleware(request: Request<Body>, next: Next) -> Response {
    let mut response = next.run(request).await;

    response.headers_mut().insert(
        header::X_CONTENT_TYPE_OPTIONS,
        HeaderValue::from_static("nosniff"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("x-frame-options"),
        HeaderValue::from_static("DENY"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("referrer-policy"),
        HeaderValue::from_static("strict-origin-when-cross-origin"),
    );
    response.headers_mut().insert(
        header::HeaderName::from_static("content-security-policy"),
        HeaderValue::from_static("default-src 'none'; frame-ancestors 'none'; base-uri 'none'"),
    );

    response
}
