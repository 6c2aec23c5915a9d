//! Markdown to HTML conversion with optional sanitization.

use std::collections::HashSet;

use ammonia::Builder as AmmoniaBuilder;
use comrak::options::Options;

use super::ConvertError;

const DOCUMENT_STYLE: &str = r#"body {
    font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Oxygen, Ubuntu, Cantarell, sans-serif;
    max-width: 800px;
    margin: 0 auto;
    padding: 20px;
    line-height: 1.6;
}
code {
    background-color: #f4f4f4;
    padding: 2px 4px;
    border-radius: 3px;
}
pre {
    background-color: #f4f4f4;
    padding: 10px;
    border-radius: 5px;
    overflow-x: auto;
}
table {
    border-collapse: collapse;
    width: 100%;
}
th, td {
    border: 1px solid #ddd;
    padding: 8px;
    text-align: left;
}
th {
    background-color: #f2f2f2;
}"#;

/// Renders Markdown into a complete standalone HTML document.
///
/// With `sanitize` set, the rendered fragment is filtered down to a fixed
/// allowlist of tags and attributes before the document shell is applied.
pub fn markdown_to_html(markdown: &str, sanitize: bool) -> Result<String, ConvertError> {
    let options = comrak_options();
    let mut body = comrak::markdown_to_html(markdown, &options);

    if sanitize {
        body = build_sanitizer().clean(&body).to_string();
    }

    Ok(wrap_document(&body))
}

fn comrak_options() -> Options<'static> {
    let mut options = Options::default();

    let ext = &mut options.extension;
    ext.strikethrough = true;
    ext.table = true;
    ext.autolink = true;
    ext.tasklist = true;
    ext.footnotes = true;

    let render = &mut options.render;
    render.github_pre_lang = true;
    render.r#unsafe = true;

    options
}

fn build_sanitizer() -> AmmoniaBuilder<'static> {
    let mut builder = AmmoniaBuilder::default();

    let tags: HashSet<&'static str> = HashSet::from([
        "p", "h1", "h2", "h3", "h4", "h5", "h6", "strong", "em", "ul", "ol", "li", "a", "code",
        "pre", "table", "thead", "tbody", "tr", "td", "th", "blockquote", "img",
    ]);
    builder.tags(tags);
    builder.generic_attributes(HashSet::new());
    builder.add_tag_attributes("a", &["href", "title"]);
    builder.add_tag_attributes("img", &["src", "alt", "title"]);
    builder.add_url_schemes(["http", "https", "mailto"].iter().copied());

    builder
}

fn wrap_document(body: &str) -> String {
    format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Converted Markdown</title>
    <style>
{DOCUMENT_STYLE}
    </style>
</head>
<body>
{body}
</body>
</html>"#
    )
}

#[cfg(test)]
mod tests {
    use super::markdown_to_html;

    #[test]
    fn produces_a_complete_document() {
        let html = markdown_to_html("# Title\n\nHello.", false).unwrap();

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<h1>Title</h1>"));
        assert!(html.contains("<p>Hello.</p>"));
        assert!(html.ends_with("</html>"));
    }

    #[test]
    fn tables_and_strikethrough_render() {
        let md = "| a | b |\n|---|---|\n| 1 | 2 |\n\n~~gone~~";
        let html = markdown_to_html(md, false).unwrap();

        assert!(html.contains("<table>"));
        assert!(html.contains("<del>gone</del>"));
    }

    #[test]
    fn raw_html_survives_without_sanitization() {
        let html = markdown_to_html("<div onclick=\"x()\">raw</div>", false).unwrap();
        assert!(html.contains("onclick"));
    }

    #[test]
    fn sanitization_strips_disallowed_markup() {
        let html = markdown_to_html("<script>alert(1)</script>\n\n**kept**", true).unwrap();

        assert!(!html.to_lowercase().contains("<script"));
        assert!(html.contains("<strong>kept</strong>"));
    }

    #[test]
    fn sanitization_keeps_links_and_images() {
        let md = "[site](https://example.com) ![alt](https://example.com/a.png)";
        let html = markdown_to_html(md, true).unwrap();

        assert!(html.contains(r#"href="https://example.com""#));
        assert!(html.contains(r#"src="https://example.com/a.png""#));
    }
}
