//! URL to document rendering pipeline.
//!
//! A render request passes through five stages in strict order: address
//! validation, headless browser fetch, markup sanitization, asset
//! resolution, and document composition. Stages own their intermediate
//! values exclusively; nothing is shared across requests except the
//! process-wide font registry.

pub mod assets;
pub mod browser;
pub mod compose;
pub mod fonts;
pub mod sanitize;
pub mod types;
pub mod validate;

use std::time::Instant;

use tracing::info;

use crate::config::{FetchSettings, FontSettings, RenderSettings};

use self::types::{OutputKind, PageContent, RenderRequest, WebRenderError};

/// Runs the full pipeline for one request and returns the output artifact
/// bytes (PDF or JPEG depending on the request kind).
pub async fn render(
    request: &RenderRequest,
    render_settings: &RenderSettings,
    fetch_settings: &FetchSettings,
    font_settings: &FontSettings,
) -> Result<Vec<u8>, WebRenderError> {
    let url = validate::validate_url(request.url.as_str()).await?;

    let started = Instant::now();
    let page = browser::fetch_page(&url, request, render_settings, fetch_settings).await?;
    metrics::histogram!("cambio_render_fetch_ms").record(started.elapsed().as_millis() as f64);

    match page.content {
        PageContent::Image(bytes) => {
            info!(
                url = %page.origin,
                elapsed_ms = page.elapsed.as_millis() as u64,
                bytes = bytes.len(),
                "screenshot captured"
            );
            Ok(bytes)
        }
        PageContent::Markup(html) => {
            let markup = sanitize::sanitize(&html, Some(&page.origin));
            let assets = assets::resolve(&markup.image_urls, fetch_settings).await;

            let images = assets.len();

            let compose_started = Instant::now();
            // PDF layout is CPU-bound, keep it off the async workers.
            let fonts = font_settings.clone();
            let pdf =
                tokio::task::spawn_blocking(move || compose::compose(&markup, &assets, &fonts))
                    .await
                    .map_err(|err| {
                        WebRenderError::render(format!("composition task failed: {err}"))
                    })??;
            metrics::histogram!("cambio_render_compose_ms")
                .record(compose_started.elapsed().as_millis() as f64);

            info!(
                url = %page.origin,
                elapsed_ms = started.elapsed().as_millis() as u64,
                images = images,
                bytes = pdf.len(),
                "document composed"
            );
            Ok(pdf)
        }
    }
}

/// Convenience constructor for the PDF path.
pub fn pdf_request(url: String, settings: &RenderSettings) -> RenderRequest {
    RenderRequest {
        url,
        kind: OutputKind::Pdf,
        width: settings.screenshot_width.get(),
        height: settings.screenshot_height.get(),
    }
}

/// Convenience constructor for the JPEG path with optional dimension
/// overrides from query parameters.
pub fn jpeg_request(
    url: String,
    width: Option<u32>,
    height: Option<u32>,
    settings: &RenderSettings,
) -> RenderRequest {
    RenderRequest {
        url,
        kind: OutputKind::Jpeg,
        width: width.unwrap_or_else(|| settings.screenshot_width.get()),
        height: height.unwrap_or_else(|| settings.screenshot_height.get()),
    }
}
