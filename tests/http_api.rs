use std::{num::NonZeroU64, sync::Arc};

use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use serde_json::Value;
use tower::ServiceExt;

use cambio::{
    config::{self, CliArgs, Overrides, Settings},
    infra::http::build_router,
};

fn test_settings() -> Settings {
    let cli = CliArgs {
        config_file: None,
        overrides: Overrides::default(),
    };
    config::load(&cli).expect("default settings should load")
}

fn router() -> Router {
    build_router(Arc::new(test_settings()))
}

fn post(path: &str, body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(path)
        .body(body.into())
        .expect("request")
}

async fn body_string(response: axum::response::Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("collect body")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

async fn error_message(response: axum::response::Response) -> String {
    let body = body_string(response).await;
    let value: Value = serde_json::from_str(&body).expect("error envelope is json");
    value["error"]
        .as_str()
        .expect("error field is a string")
        .to_owned()
}

#[tokio::test]
async fn health_returns_no_content() {
    let response = router()
        .oneshot(
            Request::builder()
                .uri("/_health")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn csv_to_json_converts_typed_columns() {
    let response = router()
        .oneshot(post("/csv2json", "name,age,active\nada,36,true\ngrace,,false\n"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let content_type = response
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_owned();
    assert!(content_type.starts_with("application/json"));

    let rows: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(rows[0]["name"], "ada");
    assert_eq!(rows[0]["age"], 36);
    assert_eq!(rows[0]["active"], true);
    assert_eq!(rows[1]["age"], Value::Null);
}

#[tokio::test]
async fn csv_to_json_rejects_empty_body() {
    let response = router().oneshot(post("/csv2json", "")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "request body is empty");
}

#[tokio::test]
async fn csv_to_json_pads_short_rows_with_null() {
    let response = router()
        .oneshot(post("/csv2json", "a,b,c\n1,2\n"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let rows: Value = serde_json::from_str(&body_string(response).await).unwrap();
    assert_eq!(rows[0]["a"], 1);
    assert_eq!(rows[0]["c"], Value::Null);
}

#[tokio::test]
async fn json_to_csv_round_trips_array_of_objects() {
    let response = router()
        .oneshot(post(
            "/json2csv",
            r#"[{"name":"ada","age":36},{"name":"grace","city":"nyc"}]"#,
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let csv = body_string(response).await;
    let mut lines = csv.lines();
    assert_eq!(lines.next(), Some("name,age,city"));
    assert_eq!(lines.next(), Some("ada,36,"));
    assert_eq!(lines.next(), Some("grace,,nyc"));
}

#[tokio::test]
async fn json_to_csv_rejects_scalar_input() {
    let response = router().oneshot(post("/json2csv", "42")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn md2html_keeps_raw_html_by_default() {
    let response = router()
        .oneshot(post("/md2html", "# Title\n\n<div class=\"x\">kept</div>\n"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("<h1>Title</h1>"));
    assert!(html.contains("<div class=\"x\">kept</div>"));
}

#[tokio::test]
async fn md2html_strips_scripts_when_sanitize_requested() {
    let response = router()
        .oneshot(post(
            "/md2html?sanitize=true",
            "# Title\n\n<script>alert(1)</script>\n\nbody text\n",
        ))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_string(response).await;
    assert!(html.contains("body text"));
    assert!(!html.contains("<script>"));
}

#[tokio::test]
async fn html2pdf_rejects_empty_body() {
    let response = router().oneshot(post("/html2pdf", "  \n")).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(error_message(response).await, "request body is empty");
}

#[tokio::test]
async fn dbf2json_rejects_empty_body() {
    let response = router()
        .oneshot(post("/dbf2json", Body::empty()))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn dbf2json_rejects_garbage_bytes() {
    let response = router()
        .oneshot(post("/dbf2json", Body::from(vec![0xffu8; 64])))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn url2pdf_blocks_loopback_targets() {
    let response = router()
        .oneshot(post("/url2pdf", "http://127.0.0.1/admin"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = error_message(response).await;
    assert!(message.contains("non-public"), "got: {message}");
}

#[tokio::test]
async fn url2pdf_blocks_metadata_endpoint() {
    let response = router()
        .oneshot(post("/url2pdf", "http://169.254.169.254/latest/meta-data/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn url2pdf_blocks_private_range_targets() {
    let response = router()
        .oneshot(post("/url2pdf", "https://192.168.1.10/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn url2pdf_rejects_non_http_schemes() {
    let response = router()
        .oneshot(post("/url2pdf", "ftp://example.com/file.txt"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let message = error_message(response).await;
    assert!(message.contains("only http and https"), "got: {message}");
}

#[tokio::test]
async fn url2jpg_rejects_malformed_url() {
    let response = router()
        .oneshot(post("/url2jpg", "not a url"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn url2jpg_rejects_zero_dimensions() {
    let response = router()
        .oneshot(post("/url2jpg?width=0", "https://example.com/"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(
        error_message(response).await,
        "width and height must be positive"
    );
}

#[tokio::test]
async fn oversized_bodies_are_refused() {
    let mut settings = test_settings();
    settings.limits.max_request_bytes = NonZeroU64::new(64).unwrap();
    let router = build_router(Arc::new(settings));

    let response = router
        .oneshot(post("/csv2json", "a,b\n".repeat(100)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::PAYLOAD_TOO_LARGE);
}

#[tokio::test]
async fn unknown_routes_return_not_found() {
    let response = router()
        .oneshot(post("/xml2json", "<a/>"))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}
