//! Headless browser driving.
//!
//! Every request gets its own browser process, released on every exit path.
//! Navigation runs under its own deadline and fails fast; the settling
//! phases afterwards (network quiescence, lazy-load scroll, final delay)
//! are best effort and never fail the request on their own.

use std::time::{Duration, Instant};

use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::emulation::SetDeviceMetricsOverrideParams;
use chromiumoxide::cdp::browser_protocol::page::CaptureScreenshotFormat;
use chromiumoxide::page::{Page, ScreenshotParams};
use futures::StreamExt as _;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};
use url::Url;

use crate::config::{FetchSettings, RenderSettings};

use super::types::{OutputKind, PageContent, RenderRequest, RenderedPage, WebRenderError};
use super::validate;

/// How often the network-quiescence poll samples the page's resource count.
const IDLE_POLL_INTERVAL: Duration = Duration::from_millis(500);

pub async fn fetch_page(
    url: &Url,
    request: &RenderRequest,
    render: &RenderSettings,
    fetch: &FetchSettings,
) -> Result<RenderedPage, WebRenderError> {
    let started = Instant::now();
    let guard = launch(request, render).await?;

    let result = drive(&guard.browser, url, request, render, fetch).await;
    guard.shutdown().await;

    let (content, origin) = result?;
    Ok(RenderedPage {
        content,
        origin,
        elapsed: started.elapsed(),
    })
}

struct BrowserGuard {
    browser: Browser,
    handler_task: JoinHandle<()>,
}

impl BrowserGuard {
    async fn shutdown(mut self) {
        if let Err(err) = self.browser.close().await {
            debug!(error = %err, "browser close reported an error");
        }
    }
}

// Cancellation safety: if the request future is dropped mid-render the
// handler task must not outlive the guard. The browser's own Drop reaps
// the chromium child.
impl Drop for BrowserGuard {
    fn drop(&mut self) {
        self.handler_task.abort();
    }
}

async fn launch(request: &RenderRequest, render: &RenderSettings) -> Result<BrowserGuard, WebRenderError> {
    let mut builder = BrowserConfig::builder()
        .no_sandbox()
        .window_size(request.width, request.height);
    if let Some(path) = &render.chromium_path {
        builder = builder.chrome_executable(path);
    }
    let config = builder
        .build()
        .map_err(|err| WebRenderError::resource(format!("browser config rejected: {err}")))?;

    let (browser, mut handler) = Browser::launch(config).await.map_err(|err| {
        WebRenderError::resource(format!(
            "chromium launch failed: {err}; is a chromium binary installed?"
        ))
    })?;

    let handler_task = tokio::spawn(async move {
        while let Some(event) = handler.next().await {
            if let Err(err) = event {
                debug!(error = %err, "browser event error");
            }
        }
    });

    Ok(BrowserGuard {
        browser,
        handler_task,
    })
}

async fn drive(
    browser: &Browser,
    url: &Url,
    request: &RenderRequest,
    render: &RenderSettings,
    fetch: &FetchSettings,
) -> Result<(PageContent, Url), WebRenderError> {
    let page = browser
        .new_page("about:blank")
        .await
        .map_err(|err| WebRenderError::resource(format!("page creation failed: {err}")))?;

    page.set_user_agent(fetch.user_agent.clone())
        .await
        .map_err(|err| WebRenderError::resource(format!("user agent override failed: {err}")))?;

    navigate(&page, url, render.page_load_timeout).await?;
    wait_for_network_idle(&page, render.network_idle_timeout).await;
    scroll_to_bottom(&page, render.scroll_delay).await;
    sleep(render.settle_delay).await;

    // A page may redirect after validation passed; the landing URL has to
    // clear the same address checks as the submitted one.
    let origin = effective_url(&page, url).await;
    let origin = validate::validate_url(origin.as_str()).await?;

    let content = match request.kind {
        OutputKind::Pdf => {
            let html = page
                .content()
                .await
                .map_err(|err| WebRenderError::fetch(format!("content extraction failed: {err}")))?;
            PageContent::Markup(html)
        }
        OutputKind::Jpeg => PageContent::Image(screenshot(&page, request, render).await?),
    };

    Ok((content, origin))
}

async fn navigate(page: &Page, url: &Url, budget: Duration) -> Result<(), WebRenderError> {
    let navigation = async {
        page.goto(url.as_str()).await?;
        page.wait_for_navigation().await?;
        Ok::<(), chromiumoxide::error::CdpError>(())
    };

    match timeout(budget, navigation).await {
        Ok(Ok(())) => Ok(()),
        Ok(Err(err)) => Err(WebRenderError::fetch(format!(
            "navigation to {url} failed: {err}"
        ))),
        Err(_) => Err(WebRenderError::fetch(format!(
            "navigation to {url} did not complete within {}s",
            budget.as_secs()
        ))),
    }
}

/// Polls the page's resource entry count until it holds still for one poll
/// interval, up to the configured budget. Quiescence is a heuristic; running
/// out of budget is not an error.
async fn wait_for_network_idle(page: &Page, budget: Duration) {
    let deadline = Instant::now() + budget;
    let mut previous: Option<u64> = None;

    while Instant::now() < deadline {
        sleep(IDLE_POLL_INTERVAL).await;

        let count = match page
            .evaluate("performance.getEntriesByType('resource').length")
            .await
            .map(|result| result.into_value::<u64>())
        {
            Ok(Ok(count)) => count,
            _ => {
                debug!("resource count probe failed, skipping network-idle wait");
                return;
            }
        };

        if previous == Some(count) {
            debug!(resources = count, "network settled");
            return;
        }
        previous = Some(count);
    }

    debug!("network-idle budget exhausted, continuing anyway");
}

async fn scroll_to_bottom(page: &Page, delay: Duration) {
    if let Err(err) = page
        .evaluate("window.scrollTo(0, document.body.scrollHeight)")
        .await
    {
        debug!(error = %err, "lazy-load scroll failed");
        return;
    }
    sleep(delay).await;
}

async fn effective_url(page: &Page, requested: &Url) -> Url {
    match page.url().await {
        Ok(Some(current)) => match Url::parse(&current) {
            Ok(url) => url,
            Err(err) => {
                warn!(current, error = %err, "landing URL unparsable, keeping requested URL");
                requested.clone()
            }
        },
        _ => requested.clone(),
    }
}

async fn screenshot(
    page: &Page,
    request: &RenderRequest,
    render: &RenderSettings,
) -> Result<Vec<u8>, WebRenderError> {
    let viewport = SetDeviceMetricsOverrideParams::builder()
        .width(i64::from(request.width))
        .height(i64::from(request.height))
        .device_scale_factor(1.0)
        .mobile(false)
        .build()
        .map_err(|err| WebRenderError::render(format!("viewport override rejected: {err}")))?;
    page.execute(viewport)
        .await
        .map_err(|err| WebRenderError::render(format!("viewport override failed: {err}")))?;

    let params = ScreenshotParams::builder()
        .format(CaptureScreenshotFormat::Jpeg)
        .quality(i64::from(render.jpeg_quality))
        .full_page(true)
        .build();

    let bytes = page
        .screenshot(params)
        .await
        .map_err(|err| WebRenderError::render(format!("screenshot capture failed: {err}")))?;
    if bytes.is_empty() {
        return Err(WebRenderError::render("screenshot capture returned no data"));
    }
    Ok(bytes)
}
