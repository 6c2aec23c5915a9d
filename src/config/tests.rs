use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = Overrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn request_limit_defaults_to_10_mib() {
    let raw = RawSettings::default();
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(
        settings.limits.max_request_bytes.get(),
        DEFAULT_MAX_REQUEST_BYTES
    );
}

#[test]
fn render_defaults_match_documented_values() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert_eq!(settings.render.page_load_timeout, Duration::from_secs(30));
    assert_eq!(settings.render.network_idle_timeout, Duration::from_secs(10));
    assert_eq!(settings.render.screenshot_width.get(), 1920);
    assert_eq!(settings.render.screenshot_height.get(), 1080);
    assert_eq!(settings.render.jpeg_quality, 90);
    assert!(settings.render.chromium_path.is_none());
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = Overrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn zero_jpeg_quality_is_rejected() {
    let mut raw = RawSettings::default();
    raw.render.jpeg_quality = Some(0);
    let err = Settings::from_raw(raw).expect_err("quality 0 must be rejected");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "render.jpeg_quality",
            ..
        }
    ));
}

#[test]
fn parse_render_arguments() {
    let args = CliArgs::parse_from([
        "cambio",
        "--server-port",
        "8080",
        "--render-jpeg-quality",
        "75",
        "--render-chromium-path",
        "/usr/bin/chromium",
    ]);

    assert_eq!(args.overrides.server_port, Some(8080));
    assert_eq!(args.overrides.jpeg_quality, Some(75));
    assert_eq!(
        args.overrides.chromium_path.as_deref(),
        Some(std::path::Path::new("/usr/bin/chromium"))
    );
}
