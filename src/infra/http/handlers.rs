use std::time::Instant;

use axum::{
    body::Bytes,
    extract::{Query, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use tracing::info;

use crate::application::{convert, webpage};

use super::{AppState, error::ApiError};

const JSON_UTF8: &str = "application/json; charset=utf-8";
const CSV_UTF8: &str = "text/csv; charset=utf-8";
const HTML_UTF8: &str = "text/html; charset=utf-8";

pub async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}

pub async fn csv_to_json(body: Bytes) -> Result<Response, ApiError> {
    let source = "http::csv2json";
    let body = String::from_utf8_lossy(&body);
    let csv = require_text(source, &body)?;
    let started = Instant::now();
    let json = convert::tabular::csv_to_json(csv).map_err(|err| ApiError::from_convert(source, err))?;
    finish_conversion("csv2json", started, json.len());
    Ok(text_response(JSON_UTF8, json))
}

pub async fn json_to_csv(body: Bytes) -> Result<Response, ApiError> {
    let source = "http::json2csv";
    let body = String::from_utf8_lossy(&body);
    let json = require_text(source, &body)?;
    let started = Instant::now();
    let csv = convert::tabular::json_to_csv(json).map_err(|err| ApiError::from_convert(source, err))?;
    finish_conversion("json2csv", started, csv.len());
    Ok(text_response(CSV_UTF8, csv))
}

#[derive(Debug, Deserialize)]
pub struct MarkdownQuery {
    sanitize: Option<bool>,
}

pub async fn markdown_to_html(
    Query(query): Query<MarkdownQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let source = "http::md2html";
    let body = String::from_utf8_lossy(&body);
    let markdown = require_text(source, &body)?;
    let started = Instant::now();
    let html = convert::markdown::markdown_to_html(markdown, query.sanitize.unwrap_or(false))
        .map_err(|err| ApiError::from_convert(source, err))?;
    finish_conversion("md2html", started, html.len());
    Ok(text_response(HTML_UTF8, html))
}

pub async fn html_to_pdf(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let source = "http::html2pdf";
    let body = String::from_utf8_lossy(&body);
    let html = require_text(source, &body)?.to_owned();
    let started = Instant::now();
    // PDF layout is CPU-bound, keep it off the async workers.
    let fonts = state.settings.fonts.clone();
    let pdf = tokio::task::spawn_blocking(move || convert::document::html_to_pdf(&html, &fonts))
        .await
        .map_err(|err| {
            ApiError::from_convert(
                source,
                convert::ConvertError::compose(format!("composition task failed: {err}")),
            )
        })?
        .map_err(|err| ApiError::from_convert(source, err))?;
    finish_conversion("html2pdf", started, pdf.len());
    Ok(attachment_response("application/pdf", "document.pdf", pdf))
}

pub async fn dbf_to_json(body: Bytes) -> Result<Response, ApiError> {
    let source = "http::dbf2json";
    if body.is_empty() {
        return Err(ApiError::bad_request(source, "request body is empty"));
    }
    let started = Instant::now();
    let json =
        convert::dbf::dbf_to_json(&body).map_err(|err| ApiError::from_convert(source, err))?;
    finish_conversion("dbf2json", started, json.len());
    Ok(text_response(JSON_UTF8, json))
}

pub async fn url_to_pdf(
    State(state): State<AppState>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let source = "http::url2pdf";
    let body = String::from_utf8_lossy(&body);
    let url = require_text(source, &body)?;
    let request = webpage::pdf_request(url.to_owned(), &state.settings.render);
    let started = Instant::now();
    let pdf = webpage::render(
        &request,
        &state.settings.render,
        &state.settings.fetch,
        &state.settings.fonts,
    )
    .await
    .map_err(|err| ApiError::from_render(source, err))?;
    finish_conversion("url2pdf", started, pdf.len());
    Ok(attachment_response("application/pdf", "webpage.pdf", pdf))
}

#[derive(Debug, Deserialize)]
pub struct ScreenshotQuery {
    width: Option<u32>,
    height: Option<u32>,
}

pub async fn url_to_jpeg(
    State(state): State<AppState>,
    Query(query): Query<ScreenshotQuery>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let source = "http::url2jpg";
    let body = String::from_utf8_lossy(&body);
    let url = require_text(source, &body)?;
    if query.width == Some(0) || query.height == Some(0) {
        return Err(ApiError::bad_request(
            source,
            "width and height must be positive",
        ));
    }
    let request = webpage::jpeg_request(
        url.to_owned(),
        query.width,
        query.height,
        &state.settings.render,
    );
    let started = Instant::now();
    let jpeg = webpage::render(
        &request,
        &state.settings.render,
        &state.settings.fetch,
        &state.settings.fonts,
    )
    .await
    .map_err(|err| ApiError::from_render(source, err))?;
    finish_conversion("url2jpg", started, jpeg.len());
    Ok(attachment_response("image/jpeg", "webpage.jpg", jpeg))
}

fn require_text<'a>(source: &'static str, body: &'a str) -> Result<&'a str, ApiError> {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return Err(ApiError::bad_request(source, "request body is empty"));
    }
    Ok(trimmed)
}

fn finish_conversion(operation: &'static str, started: Instant, output_bytes: usize) {
    let elapsed_ms = started.elapsed().as_millis();
    metrics::counter!("cambio_convert_total", "operation" => operation).increment(1);
    metrics::histogram!("cambio_convert_ms", "operation" => operation).record(elapsed_ms as f64);
    info!(
        target = "cambio::http::convert",
        operation = operation,
        elapsed_ms = elapsed_ms as u64,
        output_bytes = output_bytes,
        "conversion completed"
    );
}

fn text_response(content_type: &'static str, body: impl Into<axum::body::Body>) -> Response {
    ([(header::CONTENT_TYPE, content_type)], body.into()).into_response()
}

fn attachment_response(content_type: &'static str, filename: &str, bytes: Vec<u8>) -> Response {
    (
        [
            (header::CONTENT_TYPE, content_type.to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{filename}\""),
            ),
        ],
        bytes,
    )
        .into_response()
}
