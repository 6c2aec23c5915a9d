use std::time::Duration;

use thiserror::Error;
use url::Url;

/// Which artifact the pipeline should produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputKind {
    Pdf,
    Jpeg,
}

/// One inbound render request, immutable for its lifetime.
#[derive(Debug, Clone)]
pub struct RenderRequest {
    pub url: String,
    pub kind: OutputKind,
    pub width: u32,
    pub height: u32,
}

/// What the browser handed back for a page.
#[derive(Debug)]
pub enum PageContent {
    /// Fully rendered post-JavaScript markup (PDF path).
    Markup(String),
    /// Encoded full-page capture (JPEG path).
    Image(Vec<u8>),
}

/// Output of the browser stage, owned exclusively until the next stage
/// consumes it.
#[derive(Debug)]
pub struct RenderedPage {
    pub content: PageContent,
    pub origin: Url,
    pub elapsed: Duration,
}

/// Sanitized markup plus every absolute image URL discovered in it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedMarkup {
    pub html: String,
    pub image_urls: Vec<Url>,
}

#[derive(Debug, Error)]
pub enum WebRenderError {
    #[error("URL not allowed: {reason}")]
    Validation { reason: String },
    #[error("page fetch failed: {0}")]
    Fetch(String),
    #[error("document rendering failed: {0}")]
    Render(String),
    #[error("browser runtime unavailable: {0}")]
    Resource(String),
}

impl WebRenderError {
    pub fn validation(reason: impl Into<String>) -> Self {
        Self::Validation {
            reason: reason.into(),
        }
    }

    pub fn fetch(message: impl Into<String>) -> Self {
        Self::Fetch(message.into())
    }

    pub fn render(message: impl Into<String>) -> Self {
        Self::Render(message.into())
    }

    pub fn resource(message: impl Into<String>) -> Self {
        Self::Resource(message.into())
    }

    /// Whether the failure is attributable to the submitted URL rather than
    /// the service itself.
    pub fn is_input_fault(&self) -> bool {
        matches!(
            self,
            WebRenderError::Validation { .. } | WebRenderError::Fetch(_)
        )
    }
}
