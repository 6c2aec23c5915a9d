//! Markup sanitization for the static document composer.
//!
//! The composer executes no script and understands only a small CSS subset,
//! so everything it cannot handle is stripped up front: stylesheet links,
//! script and style blocks, at-rules, modern CSS functions, structural
//! pseudo-selectors, vendor prefixes, and dynamic properties. Each removal
//! rule is a pure string transformation; the full pipeline is deterministic
//! and idempotent. Malformed input is never an error, unrecognized content
//! passes through unchanged.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use url::Url;

use super::types::SanitizedMarkup;

/// Minimal styling injected so output stays legible after the page's own
/// styling has been removed.
const BASE_STYLESHEET: &str = "@page { margin: 2cm; }
body { font-family: Helvetica, Arial, sans-serif; font-size: 12pt; line-height: 1.6; }
h1 { font-size: 24pt; margin-bottom: 10pt; }
p { margin-bottom: 8pt; }
table { border-collapse: collapse; width: 100%; }
th, td { border: 1pt solid gray; padding: 4pt; text-align: left; }";

pub fn sanitize(html: &str, base_url: Option<&Url>) -> SanitizedMarkup {
    let mut html = strip_resource_tags(html);
    html = strip_script_blocks(&html);
    html = strip_style_blocks(&html);
    html = strip_at_rules(&html);
    html = strip_css_functions(&html);
    html = strip_complex_selectors(&html);
    html = strip_dynamic_properties(&html);
    html = normalize_css_whitespace(&html);
    html = neutralize_external_links(&html);
    html = strip_style_attributes(&html);

    let (html, image_urls) = absolutize_images(&html, base_url);
    let html = inject_base_stylesheet(&html);

    SanitizedMarkup { html, image_urls }
}

static LINK_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?is)<link[^>]*/?>").unwrap());

/// Drops every `<link>` tag so no external stylesheet or preload is chased.
fn strip_resource_tags(html: &str) -> String {
    LINK_TAG.replace_all(html, "").into_owned()
}

static SCRIPT_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script[^>]*>.*?</script>").unwrap());

fn strip_script_blocks(html: &str) -> String {
    SCRIPT_BLOCK.replace_all(html, "").into_owned()
}

static STYLE_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style[^>]*>.*?</style>").unwrap());

fn strip_style_blocks(html: &str) -> String {
    STYLE_BLOCK.replace_all(html, "").into_owned()
}

static KEYFRAMES_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)@keyframes\s+\w+\s*\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").unwrap()
});
static AT_RULE_BLOCK: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)@[a-z-]+\s*[^{]*\{[^{}]*(?:\{[^{}]*\}[^{}]*)*\}").unwrap()
});
static AT_IMPORT: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)@import[^;]+;").unwrap());
static AT_RULE_REMNANT: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)@[a-z-]+\s*[^;{]*[;{]?").unwrap());

/// Removes `@media`, `@keyframes`, `@import`, `@font-face` and any other
/// at-rule, block form first, then bare declarations and remnants.
fn strip_at_rules(html: &str) -> String {
    let html = KEYFRAMES_BLOCK.replace_all(html, "");
    let html = AT_RULE_BLOCK.replace_all(&html, "");
    let html = AT_IMPORT.replace_all(&html, "");
    AT_RULE_REMNANT.replace_all(&html, "").into_owned()
}

static VAR_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)var\([^)]+\)").unwrap());
static CALC_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)calc\([^)]+\)").unwrap());
static RGB_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)rgba?\([^)]+\)").unwrap());
static HSL_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)hsla?\([^)]+\)").unwrap());
static URL_FN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)url\([^)]+\)").unwrap());
static CUSTOM_PROPERTY: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)--[a-z0-9-]+\s*:[^;]+;").unwrap());

fn strip_css_functions(html: &str) -> String {
    let html = VAR_FN.replace_all(html, "");
    let html = CALC_FN.replace_all(&html, "0");
    let html = RGB_FN.replace_all(&html, "");
    let html = HSL_FN.replace_all(&html, "");
    let html = URL_FN.replace_all(&html, "");
    CUSTOM_PROPERTY.replace_all(&html, "").into_owned()
}

static NOT_SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i):not\([^)]+\)").unwrap());
static NTH_SELECTOR: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i):nth-[a-z]+\([^)]+\)").unwrap());
static FUNCTIONAL_PSEUDO: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i):[a-z-]+\([^)]+\)").unwrap());
static ATTRIBUTE_SELECTOR: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[[^\]]*\]").unwrap());

fn strip_complex_selectors(html: &str) -> String {
    let html = NOT_SELECTOR.replace_all(html, "");
    let html = NTH_SELECTOR.replace_all(&html, "");
    let html = FUNCTIONAL_PSEUDO.replace_all(&html, "");
    ATTRIBUTE_SELECTOR.replace_all(&html, "").into_owned()
}

static DYNAMIC_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)(?:animation|transition|transform|content)\s*:[^;]+;").unwrap()
});
static VENDOR_PROPERTY: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?is)-(?:webkit|moz|o|ms)-[a-z-]+\s*:[^;]+;").unwrap()
});

fn strip_dynamic_properties(html: &str) -> String {
    let html = VENDOR_PROPERTY.replace_all(html, "");
    DYNAMIC_PROPERTY.replace_all(&html, "").into_owned()
}

static WS_AFTER_OPEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"([:;{])\s*[\n\r\t]+").unwrap());
static WS_BEFORE_CLOSE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\n\r\t]+\s*([;}])").unwrap());
static WS_MID_DECLARATION: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?s):([^;{}]*?)[\n\r\t]+([^;{}]*?)([;}])").unwrap());
static SPACE_AFTER_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"([:;{])\s+").unwrap());
static SPACE_BEFORE_CLOSE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+([;}])").unwrap());

/// Collapses newlines and runs of whitespace around retained CSS tokens so
/// later regex passes see one canonical form regardless of source
/// formatting.
fn normalize_css_whitespace(html: &str) -> String {
    let html = WS_AFTER_OPEN.replace_all(html, "${1} ");
    let html = WS_BEFORE_CLOSE.replace_all(&html, "${1}");
    let html = WS_MID_DECLARATION.replace_all(&html, ":${1} ${2}${3}");
    let html = SPACE_AFTER_OPEN.replace_all(&html, "${1} ");
    SPACE_BEFORE_CLOSE.replace_all(&html, "${1}").into_owned()
}

static EXTERNAL_HREF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)href=["']https?://[^"']+["']"#).unwrap());

fn neutralize_external_links(html: &str) -> String {
    EXTERNAL_HREF.replace_all(html, "href=\"\"").into_owned()
}

static STYLE_ATTRIBUTE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?i)\s+style=["'][^"']*["']"#).unwrap());

fn strip_style_attributes(html: &str) -> String {
    STYLE_ATTRIBUTE.replace_all(html, "").into_owned()
}

static IMG_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(?is)<img([^>]*?)src=["']([^"']+)["']([^>]*?)>"#).unwrap());

/// Serialized markup escapes `&` in attribute values as `&amp;`; a DOM
/// reader of the rewritten tag sees the decoded form, so sources must be
/// decoded here or multi-parameter URLs never match their fetched asset.
fn decode_src_entities(src: &str) -> String {
    if !src.contains('&') {
        return src.to_string();
    }
    src.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}

/// Rewrites image sources to absolute, entity-decoded form against the page
/// origin and collects every absolute http(s) image URL for the asset
/// resolver. The rewritten `src` text is always the `Url` serialization, so
/// the composer's decoded attribute lookup matches the asset map key.
fn absolutize_images(html: &str, base_url: Option<&Url>) -> (String, Vec<Url>) {
    let mut discovered: Vec<Url> = Vec::new();

    let rewritten = IMG_TAG.replace_all(html, |caps: &Captures<'_>| {
        let before = &caps[1];
        let src = decode_src_entities(&caps[2]);
        let after = &caps[3];

        if src.starts_with("data:") || src.starts_with('#') {
            return caps[0].to_string();
        }

        let absolute = if src.starts_with("http://") || src.starts_with("https://") {
            Url::parse(&src).ok()
        } else {
            base_url.and_then(|base| base.join(&src).ok())
        };

        match absolute {
            Some(absolute) => {
                let tag = format!("<img{before}src=\"{absolute}\"{after}>");
                if !discovered.contains(&absolute) {
                    discovered.push(absolute);
                }
                tag
            }
            None => caps[0].to_string(),
        }
    });

    (rewritten.into_owned(), discovered)
}

static HEAD_OPEN: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)<head[^>]*>").unwrap());

fn inject_base_stylesheet(html: &str) -> String {
    let block = format!("<style>{BASE_STYLESHEET}</style>");
    if let Some(found) = HEAD_OPEN.find(html) {
        let mut out = String::with_capacity(html.len() + block.len());
        out.push_str(&html[..found.end()]);
        out.push_str(&block);
        out.push_str(&html[found.end()..]);
        out
    } else {
        format!("{block}{html}")
    }
}
