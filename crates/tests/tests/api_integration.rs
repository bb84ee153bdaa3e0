use std::time::Duration;

use axum::body::{to_bytes, Body};
use axum::http::{Request, StatusCode};
use axum::Router;
use faq_api::{build_app, ApiConfig};
use faq_ml::{CannedTextGenerator, Fallback};
use serde_json::{json, Value};
use tower::ServiceExt;

const API_KEY: &str = "dev-faq-key";

async fn app_with(fallback: Fallback) -> Router {
    build_app(ApiConfig {
        fallback,
        ..ApiConfig::default()
    })
    .await
    .expect("app should build")
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .method("GET")
        .uri(uri)
        .header("x-api-key", API_KEY)
        .body(Body::empty())
        .unwrap()
}

async fn json_body(response: axum::response::Response) -> Value {
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&body).unwrap()
}

#[tokio::test]
async fn health_is_public() {
    let app = app_with(Fallback::Disabled).await;

    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    let parsed = json_body(response).await;
    assert_eq!(parsed["status"], "ok");
    assert_eq!(parsed["storage"], "memory");
}

#[tokio::test]
async fn chat_requires_api_key() {
    let app = app_with(Fallback::Disabled).await;

    let request = Request::builder()
        .method("POST")
        .uri("/v1/chat")
        .header("content-type", "application/json")
        .body(Body::from(json!({ "text": "certificado de notas" }).to_string()))
        .unwrap();

    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn chat_answers_catalog_question() {
    let app = app_with(Fallback::Disabled).await;

    let response = app
        .oneshot(post_json(
            "/v1/chat",
            json!({ "text": "¿Cómo solicitar mi certificado de egresado?" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["source"], "faq");
    assert_eq!(parsed["intent"], "certificado de egresado");
    assert!(parsed["reply_text"]
        .as_str()
        .unwrap()
        .contains("formulario en la página web de la Oficina de Egresados"));
    assert!(parsed["session_id"].as_str().is_some());
}

#[tokio::test]
async fn unknown_topic_uses_generative_fallback() {
    let app = app_with(Fallback::Canned(CannedTextGenerator::new(
        "Consulta con la oficina.",
    )))
    .await;

    let response = app
        .oneshot(post_json("/v1/chat", json!({ "text": "¿Qué tal el clima hoy?" })))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["source"], "generated");
    assert!(parsed["intent"].is_null());
    assert!(parsed["reply_text"]
        .as_str()
        .unwrap()
        .contains("Consulta con la oficina."));
}

#[tokio::test]
async fn chat_rejects_empty_and_oversized_text() {
    let app = app_with(Fallback::Disabled).await;

    let empty = app
        .clone()
        .oneshot(post_json("/v1/chat", json!({ "text": "   " })))
        .await
        .unwrap();
    assert_eq!(empty.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(empty).await["error"], "empty_text");

    let long = app
        .oneshot(post_json("/v1/chat", json!({ "text": "a".repeat(201) })))
        .await
        .unwrap();
    assert_eq!(long.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(long).await["error"], "text_too_long");
}

#[tokio::test]
async fn match_endpoint_reports_normalized_text() {
    let app = app_with(Fallback::Disabled).await;

    let response = app
        .oneshot(post_json(
            "/v1/match",
            json!({ "text": "Quiero saber los requisitos para graduarme" }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["normalized"], "requisitos graduarme");
    assert_eq!(parsed["result"]["outcome"], "matched");
    assert_eq!(parsed["result"]["intent"], "requisitos para graduarse");
}

#[tokio::test]
async fn session_history_and_reset_flow() {
    let app = app_with(Fallback::Disabled).await;

    let first = app
        .clone()
        .oneshot(post_json(
            "/v1/chat",
            json!({ "session_id": "alumno-1", "text": "constancia de estudios" }),
        ))
        .await
        .unwrap();
    assert_eq!(first.status(), StatusCode::OK);

    let history = app
        .clone()
        .oneshot(get("/v1/sessions/alumno-1"))
        .await
        .unwrap();
    assert_eq!(history.status(), StatusCode::OK);
    let parsed = json_body(history).await;
    assert_eq!(parsed["turns"].as_array().unwrap().len(), 1);

    let reset = app
        .clone()
        .oneshot(post_json("/v1/sessions/alumno-1/reset", json!({})))
        .await
        .unwrap();
    assert_eq!(reset.status(), StatusCode::OK);
    assert_eq!(json_body(reset).await["cleared"], true);

    let missing = app
        .oneshot(get("/v1/sessions/alumno-1"))
        .await
        .unwrap();
    assert_eq!(missing.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn feedback_is_counted() {
    let app = app_with(Fallback::Disabled).await;

    for helpful in [true, false, true] {
        let response = app
            .clone()
            .oneshot(post_json("/v1/feedback", json!({ "helpful": helpful })))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);
    }

    let summary = app
        .oneshot(get("/v1/feedback/summary"))
        .await
        .unwrap();
    assert_eq!(summary.status(), StatusCode::OK);
    assert_eq!(
        json_body(summary).await,
        json!({ "helpful": 2, "not_helpful": 1 })
    );
}

#[tokio::test]
async fn faq_listing_includes_suggestions() {
    let app = app_with(Fallback::Disabled).await;

    let response = app.oneshot(get("/v1/faq")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let parsed = json_body(response).await;
    assert_eq!(parsed["intents"].as_array().unwrap().len(), 6);
    assert_eq!(parsed["intents"][0]["intent"], "certificado de egresado");
    assert_eq!(parsed["suggested_questions"].as_array().unwrap().len(), 2);
}

#[tokio::test]
async fn rate_limit_applies_per_client() {
    let app = build_app(ApiConfig {
        fallback: Fallback::Disabled,
        rate_limit_max: 2,
        rate_limit_window: Duration::from_secs(60),
        ..ApiConfig::default()
    })
    .await
    .expect("app should build");

    let mut statuses = Vec::new();
    for _ in 0..3 {
        let request = Request::builder()
            .uri("/v1/faq")
            .header("x-api-key", API_KEY)
            .header("x-forwarded-for", "200.48.0.7")
            .body(Body::empty())
            .unwrap();
        statuses.push(app.clone().oneshot(request).await.unwrap().status());
    }

    assert_eq!(
        statuses,
        vec![StatusCode::OK, StatusCode::OK, StatusCode::TOO_MANY_REQUESTS]
    );
}

#[tokio::test]
async fn malformed_bodies_get_json_errors() {
    let app = app_with(Fallback::Disabled).await;

    let mistyped = app
        .clone()
        .oneshot(post_json("/v1/chat", json!({ "txt": 1 })))
        .await
        .unwrap();
    assert_eq!(mistyped.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(mistyped).await["error"], "invalid_json");

    let broken = Request::builder()
        .method("POST")
        .uri("/v1/feedback")
        .header("content-type", "application/json")
        .header("x-api-key", API_KEY)
        .body(Body::from("{\"helpful\": "))
        .unwrap();
    let response = app.clone().oneshot(broken).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json_body(response).await["error"], "invalid_json");

    let plain_text = Request::builder()
        .method("POST")
        .uri("/v1/match")
        .header("x-api-key", API_KEY)
        .body(Body::from("certificado de notas"))
        .unwrap();
    let response = app.oneshot(plain_text).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let parsed = json_body(response).await;
    assert_eq!(parsed["error"], "invalid_json");
    assert!(parsed["message"].as_str().is_some());
}
