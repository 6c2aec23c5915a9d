//! Direct HTML to PDF conversion.
//!
//! Takes submitted markup straight through the sanitizer and composer
//! without any network stage: no page fetch, no image resolution. Image
//! tags therefore render as nothing, matching the no-fetch contract of
//! this endpoint.

use crate::application::webpage::assets::AssetSet;
use crate::application::webpage::types::WebRenderError;
use crate::application::webpage::{compose, sanitize};
use crate::config::FontSettings;

use super::ConvertError;

pub fn html_to_pdf(html: &str, fonts: &FontSettings) -> Result<Vec<u8>, ConvertError> {
    if html.trim().is_empty() {
        return Err(ConvertError::input("HTML content not provided"));
    }

    let markup = sanitize::sanitize(html, None);
    compose::compose(&markup, &AssetSet::empty(), fonts).map_err(|err| match err {
        WebRenderError::Resource(message) => ConvertError::compose(message),
        other => ConvertError::compose(other.to_string()),
    })
}

#[cfg(test)]
mod tests {
    use super::html_to_pdf;
    use crate::config::FontSettings;

    #[test]
    fn empty_markup_is_rejected() {
        let fonts = FontSettings::default();
        assert!(html_to_pdf("  \n", &fonts).is_err());
    }
}
