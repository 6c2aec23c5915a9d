//! End-to-end render checks that need a chromium binary and outbound
//! network access. Run them explicitly:
//!
//! ```text
//! cargo test --test live_render -- --ignored
//! ```

use serial_test::serial;

use cambio::{
    application::webpage::{self, types::WebRenderError},
    config::{self, CliArgs, Overrides, Settings},
};

fn live_settings() -> Settings {
    let cli = CliArgs {
        config_file: None,
        overrides: Overrides::default(),
    };
    config::load(&cli).expect("default settings should load")
}

async fn render(request: webpage::types::RenderRequest) -> Result<Vec<u8>, WebRenderError> {
    let settings = live_settings();
    webpage::render(&request, &settings.render, &settings.fetch, &settings.fonts).await
}

#[tokio::test]
#[serial]
#[ignore = "needs chromium and network access"]
async fn renders_example_com_to_pdf() {
    let settings = live_settings();
    let request = webpage::pdf_request("https://example.com/".to_owned(), &settings.render);

    let pdf = render(request).await.expect("render should succeed");
    assert!(pdf.starts_with(b"%PDF-"), "output is not a PDF");
    assert!(pdf.len() > 1_000, "PDF suspiciously small: {}", pdf.len());
}

#[tokio::test]
#[serial]
#[ignore = "needs chromium and network access"]
async fn screenshot_honors_requested_width() {
    let settings = live_settings();
    let request = webpage::jpeg_request(
        "https://example.com/".to_owned(),
        Some(800),
        Some(600),
        &settings.render,
    );

    let jpeg = render(request).await.expect("render should succeed");
    let dimensions = imagesize::blob_size(&jpeg).expect("output is not a JPEG");
    assert_eq!(dimensions.width, 800);
}

#[tokio::test]
#[serial]
#[ignore = "needs network access"]
async fn metadata_endpoint_is_rejected_before_fetch() {
    let settings = live_settings();
    let request = webpage::pdf_request(
        "http://169.254.169.254/latest/meta-data/".to_owned(),
        &settings.render,
    );

    let err = render(request).await.expect_err("must be rejected");
    assert!(matches!(err, WebRenderError::Validation { .. }), "got: {err}");
}

#[tokio::test]
#[serial]
#[ignore = "needs network access"]
async fn unresolvable_domain_is_a_validation_error() {
    let settings = live_settings();
    let request = webpage::pdf_request(
        "https://definitely-does-not-exist.invalid/".to_owned(),
        &settings.render,
    );

    let err = render(request).await.expect_err("must fail");
    assert!(matches!(err, WebRenderError::Validation { .. }), "got: {err}");
}
