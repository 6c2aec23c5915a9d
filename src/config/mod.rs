//! Configuration layer: typed settings with layered precedence (file → env → CLI).

use std::{
    net::SocketAddr,
    num::{NonZeroU32, NonZeroU64},
    path::PathBuf,
    str::FromStr,
    time::Duration,
};

use clap::{Args, Parser, builder::BoolishValueParser};
use config::{Config, Environment, File};
use serde::Deserialize;
use thiserror::Error;
use tracing::level_filters::LevelFilter;

#[cfg(test)]
mod tests;

const DEFAULT_CONFIG_BASENAME: &str = "config/default";
const LOCAL_CONFIG_BASENAME: &str = "cambio";
const DEFAULT_HOST: &str = "127.0.0.1";
const DEFAULT_PORT: u16 = 3000;
const DEFAULT_MAX_REQUEST_BYTES: u64 = 10 * 1024 * 1024;
const DEFAULT_PAGE_LOAD_TIMEOUT_MS: u64 = 30_000;
const DEFAULT_NETWORK_IDLE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_SETTLE_DELAY_MS: u64 = 2_000;
const DEFAULT_SCROLL_DELAY_MS: u64 = 1_000;
const DEFAULT_SCREENSHOT_WIDTH: u32 = 1920;
const DEFAULT_SCREENSHOT_HEIGHT: u32 = 1080;
const DEFAULT_JPEG_QUALITY: u8 = 90;
const DEFAULT_IMAGE_TIMEOUT_MS: u64 = 10_000;
const DEFAULT_MAX_IMAGE_BYTES: u64 = 5 * 1024 * 1024;
const DEFAULT_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko)";

/// Command-line arguments for the cambio binary.
#[derive(Debug, Parser)]
#[command(name = "cambio", version, about = "cambio conversion server")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "CAMBIO_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(flatten)]
    pub overrides: Overrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct Overrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the maximum request body size in bytes.
    #[arg(long = "limits-max-request-bytes", value_name = "BYTES")]
    pub max_request_bytes: Option<u64>,

    /// Override the overall page-load timeout in milliseconds.
    #[arg(long = "render-page-load-timeout-ms", value_name = "MS")]
    pub page_load_timeout_ms: Option<u64>,

    /// Override the network-idle wait timeout in milliseconds.
    #[arg(long = "render-network-idle-timeout-ms", value_name = "MS")]
    pub network_idle_timeout_ms: Option<u64>,

    /// Override the default screenshot width in pixels.
    #[arg(long = "render-screenshot-width", value_name = "PIXELS")]
    pub screenshot_width: Option<u32>,

    /// Override the default screenshot height in pixels.
    #[arg(long = "render-screenshot-height", value_name = "PIXELS")]
    pub screenshot_height: Option<u32>,

    /// Override the JPEG compression quality (1-100).
    #[arg(long = "render-jpeg-quality", value_name = "QUALITY")]
    pub jpeg_quality: Option<u8>,

    /// Override the Chromium executable used for page rendering.
    #[arg(long = "render-chromium-path", value_name = "PATH")]
    pub chromium_path: Option<PathBuf>,

    /// Override the per-image download timeout in milliseconds.
    #[arg(long = "fetch-image-timeout-ms", value_name = "MS")]
    pub image_timeout_ms: Option<u64>,

    /// Override the per-image download size ceiling in bytes.
    #[arg(long = "fetch-max-image-bytes", value_name = "BYTES")]
    pub max_image_bytes: Option<u64>,
}

/// Fully-resolved deployment settings after precedence resolution and validation.
#[derive(Debug, Clone)]
pub struct Settings {
    pub server: ServerSettings,
    pub logging: LoggingSettings,
    pub limits: LimitSettings,
    pub render: RenderSettings,
    pub fetch: FetchSettings,
    pub fonts: FontSettings,
}

#[derive(Debug, Clone)]
pub struct ServerSettings {
    pub addr: SocketAddr,
}

#[derive(Debug, Clone)]
pub struct LoggingSettings {
    pub level: LevelFilter,
    pub format: LogFormat,
}

#[derive(Debug, Clone, Copy)]
pub enum LogFormat {
    Json,
    Compact,
}

#[derive(Debug, Clone)]
pub struct LimitSettings {
    pub max_request_bytes: NonZeroU64,
}

/// Budgets and output parameters for the headless-browser pipeline.
#[derive(Debug, Clone)]
pub struct RenderSettings {
    pub page_load_timeout: Duration,
    pub network_idle_timeout: Duration,
    pub settle_delay: Duration,
    pub scroll_delay: Duration,
    pub screenshot_width: NonZeroU32,
    pub screenshot_height: NonZeroU32,
    pub jpeg_quality: u8,
    pub chromium_path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub image_timeout: Duration,
    pub max_image_bytes: NonZeroU64,
    pub user_agent: String,
}

#[derive(Debug, Clone)]
pub struct FontSettings {
    /// Directories scanned for usable font files, configured paths first,
    /// platform defaults last.
    pub search_paths: Vec<PathBuf>,
}

impl Default for FontSettings {
    fn default() -> Self {
        Self {
            search_paths: default_font_directories(),
        }
    }
}

#[cfg(target_os = "windows")]
fn default_font_directories() -> Vec<PathBuf> {
    vec![PathBuf::from(r"C:\Windows\Fonts")]
}

#[cfg(not(target_os = "windows"))]
fn default_font_directories() -> Vec<PathBuf> {
    [
        "/usr/share/fonts/truetype/dejavu",
        "/usr/share/fonts/truetype/liberation",
        "/usr/share/fonts/truetype/noto",
        "/usr/share/fonts/TTF",
    ]
    .iter()
    .map(PathBuf::from)
    .collect()
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("failed to build configuration: {0}")]
    Build(#[from] config::ConfigError),
    #[error("invalid configuration for `{key}`: {reason}")]
    Invalid { key: &'static str, reason: String },
}

impl LoadError {
    fn invalid(key: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            key,
            reason: reason.into(),
        }
    }
}

/// Load settings using the configured precedence (file → environment → CLI).
pub fn load(cli: &CliArgs) -> Result<Settings, LoadError> {
    let mut builder = Config::builder()
        .add_source(File::with_name(DEFAULT_CONFIG_BASENAME).required(false))
        .add_source(File::with_name(LOCAL_CONFIG_BASENAME).required(false));

    if let Some(path) = cli.config_file.as_ref() {
        builder = builder.add_source(File::from(path.as_path()).required(true));
    }

    builder = builder.add_source(Environment::with_prefix("CAMBIO").separator("__"));

    let mut raw: RawSettings = builder.build()?.try_deserialize()?;
    raw.apply_overrides(&cli.overrides);
    Settings::from_raw(raw)
}

/// Load settings after parsing command-line arguments.
pub fn load_with_cli() -> Result<(CliArgs, Settings), LoadError> {
    let cli = CliArgs::parse();
    let settings = load(&cli)?;
    Ok((cli, settings))
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawSettings {
    server: RawServerSettings,
    logging: RawLoggingSettings,
    limits: RawLimitSettings,
    render: RawRenderSettings,
    fetch: RawFetchSettings,
    fonts: RawFontSettings,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawServerSettings {
    host: Option<String>,
    port: Option<u16>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLoggingSettings {
    level: Option<String>,
    json: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawLimitSettings {
    max_request_bytes: Option<u64>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawRenderSettings {
    page_load_timeout_ms: Option<u64>,
    network_idle_timeout_ms: Option<u64>,
    settle_delay_ms: Option<u64>,
    scroll_delay_ms: Option<u64>,
    screenshot_width: Option<u32>,
    screenshot_height: Option<u32>,
    jpeg_quality: Option<u8>,
    chromium_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFetchSettings {
    image_timeout_ms: Option<u64>,
    max_image_bytes: Option<u64>,
    user_agent: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
struct RawFontSettings {
    search_paths: Option<Vec<PathBuf>>,
}

impl RawSettings {
    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(host) = overrides.server_host.as_ref() {
            self.server.host = Some(host.clone());
        }
        if let Some(port) = overrides.server_port {
            self.server.port = Some(port);
        }
        if let Some(level) = overrides.log_level.as_ref() {
            self.logging.level = Some(level.clone());
        }
        if let Some(json) = overrides.log_json {
            self.logging.json = Some(json);
        }
        if let Some(bytes) = overrides.max_request_bytes {
            self.limits.max_request_bytes = Some(bytes);
        }
        if let Some(ms) = overrides.page_load_timeout_ms {
            self.render.page_load_timeout_ms = Some(ms);
        }
        if let Some(ms) = overrides.network_idle_timeout_ms {
            self.render.network_idle_timeout_ms = Some(ms);
        }
        if let Some(width) = overrides.screenshot_width {
            self.render.screenshot_width = Some(width);
        }
        if let Some(height) = overrides.screenshot_height {
            self.render.screenshot_height = Some(height);
        }
        if let Some(quality) = overrides.jpeg_quality {
            self.render.jpeg_quality = Some(quality);
        }
        if let Some(path) = overrides.chromium_path.as_ref() {
            self.render.chromium_path = Some(path.clone());
        }
        if let Some(ms) = overrides.image_timeout_ms {
            self.fetch.image_timeout_ms = Some(ms);
        }
        if let Some(bytes) = overrides.max_image_bytes {
            self.fetch.max_image_bytes = Some(bytes);
        }
    }
}

impl Settings {
    fn from_raw(raw: RawSettings) -> Result<Self, LoadError> {
        let RawSettings {
            server,
            logging,
            limits,
            render,
            fetch,
            fonts,
        } = raw;

        Ok(Self {
            server: build_server_settings(server)?,
            logging: build_logging_settings(logging)?,
            limits: build_limit_settings(limits)?,
            render: build_render_settings(render)?,
            fetch: build_fetch_settings(fetch)?,
            fonts: build_font_settings(fonts),
        })
    }
}

fn build_server_settings(server: RawServerSettings) -> Result<ServerSettings, LoadError> {
    let host = server.host.unwrap_or_else(|| DEFAULT_HOST.to_string());
    let port = server.port.unwrap_or(DEFAULT_PORT);
    if port == 0 {
        return Err(LoadError::invalid(
            "server.port",
            "port must be greater than zero",
        ));
    }

    let addr = parse_socket_addr(&host, port)
        .map_err(|reason| LoadError::invalid("server.addr", reason))?;

    Ok(ServerSettings { addr })
}

fn build_logging_settings(logging: RawLoggingSettings) -> Result<LoggingSettings, LoadError> {
    let level = match logging.level {
        Some(level) => LevelFilter::from_str(level.as_str()).map_err(|err| {
            LoadError::invalid("logging.level", format!("failed to parse: {err}"))
        })?,
        None => LevelFilter::INFO,
    };

    let format = if logging.json.unwrap_or(false) {
        LogFormat::Json
    } else {
        LogFormat::Compact
    };

    Ok(LoggingSettings { level, format })
}

fn build_limit_settings(limits: RawLimitSettings) -> Result<LimitSettings, LoadError> {
    let value = limits.max_request_bytes.unwrap_or(DEFAULT_MAX_REQUEST_BYTES);
    let max_request_bytes = NonZeroU64::new(value).ok_or_else(|| {
        LoadError::invalid("limits.max_request_bytes", "must be greater than zero")
    })?;
    usize::try_from(value).map_err(|_| {
        LoadError::invalid(
            "limits.max_request_bytes",
            "value exceeds supported range for usize",
        )
    })?;

    Ok(LimitSettings { max_request_bytes })
}

fn build_render_settings(render: RawRenderSettings) -> Result<RenderSettings, LoadError> {
    let page_load_ms = render
        .page_load_timeout_ms
        .unwrap_or(DEFAULT_PAGE_LOAD_TIMEOUT_MS);
    if page_load_ms == 0 {
        return Err(LoadError::invalid(
            "render.page_load_timeout_ms",
            "must be greater than zero",
        ));
    }

    let idle_ms = render
        .network_idle_timeout_ms
        .unwrap_or(DEFAULT_NETWORK_IDLE_TIMEOUT_MS);
    let settle_ms = render.settle_delay_ms.unwrap_or(DEFAULT_SETTLE_DELAY_MS);
    let scroll_ms = render.scroll_delay_ms.unwrap_or(DEFAULT_SCROLL_DELAY_MS);

    let width = render.screenshot_width.unwrap_or(DEFAULT_SCREENSHOT_WIDTH);
    let height = render.screenshot_height.unwrap_or(DEFAULT_SCREENSHOT_HEIGHT);
    let screenshot_width = NonZeroU32::new(width)
        .ok_or_else(|| LoadError::invalid("render.screenshot_width", "must be greater than zero"))?;
    let screenshot_height = NonZeroU32::new(height).ok_or_else(|| {
        LoadError::invalid("render.screenshot_height", "must be greater than zero")
    })?;

    let jpeg_quality = render.jpeg_quality.unwrap_or(DEFAULT_JPEG_QUALITY);
    if jpeg_quality == 0 || jpeg_quality > 100 {
        return Err(LoadError::invalid(
            "render.jpeg_quality",
            "quality must be between 1 and 100",
        ));
    }

    Ok(RenderSettings {
        page_load_timeout: Duration::from_millis(page_load_ms),
        network_idle_timeout: Duration::from_millis(idle_ms),
        settle_delay: Duration::from_millis(settle_ms),
        scroll_delay: Duration::from_millis(scroll_ms),
        screenshot_width,
        screenshot_height,
        jpeg_quality,
        chromium_path: render.chromium_path,
    })
}

fn build_fetch_settings(fetch: RawFetchSettings) -> Result<FetchSettings, LoadError> {
    let timeout_ms = fetch.image_timeout_ms.unwrap_or(DEFAULT_IMAGE_TIMEOUT_MS);
    if timeout_ms == 0 {
        return Err(LoadError::invalid(
            "fetch.image_timeout_ms",
            "must be greater than zero",
        ));
    }

    let max_bytes = fetch.max_image_bytes.unwrap_or(DEFAULT_MAX_IMAGE_BYTES);
    let max_image_bytes = NonZeroU64::new(max_bytes)
        .ok_or_else(|| LoadError::invalid("fetch.max_image_bytes", "must be greater than zero"))?;

    let user_agent = fetch
        .user_agent
        .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string());

    Ok(FetchSettings {
        image_timeout: Duration::from_millis(timeout_ms),
        max_image_bytes,
        user_agent,
    })
}

fn build_font_settings(fonts: RawFontSettings) -> FontSettings {
    let mut search_paths = fonts.search_paths.unwrap_or_default();
    search_paths.extend(default_font_directories());
    FontSettings { search_paths }
}

fn parse_socket_addr(host: &str, port: u16) -> Result<SocketAddr, String> {
    format!("{host}:{port}")
        .parse()
        .map_err(|err| format!("failed to parse `{host}:{port}`: {err}"))
}
