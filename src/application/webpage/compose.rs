//! Static document composition.
//!
//! Walks the sanitized markup as a DOM tree and emits typed layout
//! elements: headings, paragraphs, lists, framed tables, and images looked
//! up in the pre-resolved asset map. No script runs and no network is
//! touched here; anything the walk does not recognize is flattened into
//! plain paragraphs rather than dropped.

use genpdf::elements::{
    Break, FrameCellDecorator, Image, Paragraph, TableLayout,
};
use genpdf::style::Style;
use genpdf::{Alignment, Document, Margins, SimplePageDecorator};
use html5ever::tendril::TendrilSink as _;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{ParseOpts, parse_document};
use markup5ever_rcdom::{Handle, NodeData, RcDom};
use tracing::{debug, warn};

use crate::config::FontSettings;

use super::assets::AssetSet;
use super::fonts;
use super::types::{SanitizedMarkup, WebRenderError};

const BASE_FONT_SIZE: u8 = 12;
const PAGE_MARGIN_MM: f64 = 20.0;

pub fn compose(
    markup: &SanitizedMarkup,
    assets: &AssetSet,
    font_settings: &FontSettings,
) -> Result<Vec<u8>, WebRenderError> {
    let Some(fonts) = fonts::registry(font_settings) else {
        return Err(WebRenderError::resource(
            "no usable font family found on this host; install DejaVu Sans, Liberation Sans, or Noto Sans",
        ));
    };
    debug!(family = fonts.name, "composing document");

    let mut doc = Document::new(fonts.family.clone());
    doc.set_font_size(BASE_FONT_SIZE);
    let mut decorator = SimplePageDecorator::new();
    decorator.set_margins(Margins::trbl(
        PAGE_MARGIN_MM,
        PAGE_MARGIN_MM,
        PAGE_MARGIN_MM,
        PAGE_MARGIN_MM,
    ));
    doc.set_page_decorator(decorator);

    let opts = ParseOpts {
        tree_builder: TreeBuilderOpts {
            scripting_enabled: false,
            ..TreeBuilderOpts::default()
        },
        ..ParseOpts::default()
    };
    let dom = parse_document(RcDom::default(), opts)
        .from_utf8()
        .read_from(&mut markup.html.as_bytes())
        .map_err(|err| WebRenderError::render(format!("markup parse failed: {err}")))?;

    let mut composer = Composer {
        assets,
        blocks: 0,
    };
    composer.walk_children(&mut doc, &dom.document);
    if composer.blocks == 0 {
        doc.push(Paragraph::new(""));
    }

    let mut bytes = Vec::new();
    doc.render(&mut bytes)
        .map_err(|err| WebRenderError::render(err.to_string()))?;
    Ok(bytes)
}

struct Composer<'a> {
    assets: &'a AssetSet,
    blocks: usize,
}

impl Composer<'_> {
    /// Walks a container, turning runs of consecutive inline nodes into
    /// paragraphs and dispatching block children to their own renderers.
    fn walk_children(&mut self, doc: &mut Document, handle: &Handle) {
        let mut inline_run: Vec<Handle> = Vec::new();

        for child in handle.children.borrow().iter() {
            let block_tag = match &child.data {
                NodeData::Element { name, .. } => {
                    let tag = name.local.to_string();
                    is_block_tag(&tag).then_some(tag)
                }
                _ => None,
            };

            match block_tag {
                Some(tag) => {
                    self.flush_inline_run(doc, &mut inline_run);
                    self.render_block(doc, &tag, child);
                }
                None => inline_run.push(child.clone()),
            }
        }

        self.flush_inline_run(doc, &mut inline_run);
    }

    fn flush_inline_run(&mut self, doc: &mut Document, run: &mut Vec<Handle>) {
        if run.is_empty() {
            return;
        }
        let mut spans = Vec::new();
        for node in run.drain(..) {
            inline_spans(&node, Style::new(), &mut spans);
        }
        self.push_paragraph(doc, spans);
    }

    fn render_block(&mut self, doc: &mut Document, tag: &str, handle: &Handle) {
        match tag {
            "head" | "script" | "style" | "noscript" | "template" | "iframe" => {}
            "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => self.render_heading(doc, tag, handle),
            "p" | "blockquote" | "figcaption" => {
                let mut spans = Vec::new();
                inline_spans(handle, Style::new(), &mut spans);
                self.push_paragraph(doc, spans);
            }
            "br" | "hr" => {
                doc.push(Break::new(1.0));
                self.blocks += 1;
            }
            "ul" => self.render_list(doc, handle, false),
            "ol" => self.render_list(doc, handle, true),
            "table" => self.render_table(doc, handle),
            "img" => self.render_image(doc, handle),
            "pre" => self.render_preformatted(doc, handle),
            // html, body, div, section and the rest are plain containers
            _ => self.walk_children(doc, handle),
        }
    }

    fn render_heading(&mut self, doc: &mut Document, tag: &str, handle: &Handle) {
        let size = match tag {
            "h1" => 24,
            "h2" => 20,
            "h3" => 16,
            "h4" => 14,
            "h5" => 12,
            _ => 11,
        };
        let style = Style::new().with_font_size(size).bold();

        let mut spans = Vec::new();
        inline_spans(handle, style, &mut spans);
        if spans.is_empty() {
            return;
        }

        doc.push(Break::new(0.5));
        doc.push(paragraph_from(spans));
        doc.push(Break::new(0.5));
        self.blocks += 1;
    }

    fn render_list(&mut self, doc: &mut Document, handle: &Handle, ordered: bool) {
        let mut index = 0usize;
        for child in handle.children.borrow().iter() {
            if !element_has_tag(child, "li") {
                continue;
            }
            index += 1;

            let mut spans = vec![(
                if ordered {
                    format!("{index}. ")
                } else {
                    "- ".to_string()
                },
                Style::new(),
            )];
            inline_spans(child, Style::new(), &mut spans);
            if spans.len() > 1 {
                doc.push(paragraph_from(spans));
                self.blocks += 1;
            }
        }
        if index > 0 {
            doc.push(Break::new(0.5));
        }
    }

    fn render_table(&mut self, doc: &mut Document, handle: &Handle) {
        let rows = collect_table_rows(handle);
        let columns = rows.iter().map(Vec::len).max().unwrap_or(0);
        if columns == 0 {
            return;
        }

        let mut table = TableLayout::new(vec![1; columns]);
        table.set_cell_decorator(FrameCellDecorator::new(true, true, false));

        let mut pushed = 0usize;
        for cells in &rows {
            let mut row = table.row();
            for cell in cells {
                let style = if cell.header {
                    Style::new().bold()
                } else {
                    Style::new()
                };
                let mut spans = Vec::new();
                inline_spans(&cell.handle, style, &mut spans);
                row.push_element(paragraph_from(spans));
            }
            for _ in cells.len()..columns {
                row.push_element(Paragraph::new(""));
            }
            match row.push() {
                Ok(()) => pushed += 1,
                Err(err) => warn!(error = %err, "table row dropped"),
            }
        }

        if pushed > 0 {
            doc.push(Break::new(0.5));
            doc.push(table);
            doc.push(Break::new(0.5));
            self.blocks += 1;
        }
    }

    fn render_image(&mut self, doc: &mut Document, handle: &Handle) {
        let Some(src) = attribute(handle, "src") else {
            return;
        };
        // Omission policy: an unresolved image renders as nothing.
        let Some(path) = self.assets.path_for(&src) else {
            debug!(src, "image has no resolved asset, omitted");
            return;
        };

        match Image::from_path(path) {
            Ok(image) => {
                doc.push(Break::new(0.5));
                doc.push(image.with_alignment(Alignment::Center));
                doc.push(Break::new(0.5));
                self.blocks += 1;
            }
            Err(err) => {
                warn!(src, error = %err, "image could not be embedded, omitted");
            }
        }
    }

    fn render_preformatted(&mut self, doc: &mut Document, handle: &Handle) {
        let mut text = String::new();
        raw_text(handle, &mut text);
        let trimmed = text.trim_matches('\n');
        if trimmed.is_empty() {
            return;
        }

        for line in trimmed.lines() {
            doc.push(Paragraph::new(line.to_string()));
        }
        doc.push(Break::new(0.5));
        self.blocks += 1;
    }

    fn push_paragraph(&mut self, doc: &mut Document, spans: Vec<(String, Style)>) {
        if spans.is_empty() {
            return;
        }
        doc.push(paragraph_from(spans));
        doc.push(Break::new(0.5));
        self.blocks += 1;
    }
}

struct TableCell {
    handle: Handle,
    header: bool,
}

fn collect_table_rows(table: &Handle) -> Vec<Vec<TableCell>> {
    let mut rows = Vec::new();
    collect_rows_into(table, &mut rows);
    rows
}

fn collect_rows_into(handle: &Handle, rows: &mut Vec<Vec<TableCell>>) {
    for child in handle.children.borrow().iter() {
        let NodeData::Element { name, .. } = &child.data else {
            continue;
        };
        match name.local.as_ref() {
            "thead" | "tbody" | "tfoot" => collect_rows_into(child, rows),
            "tr" => {
                let mut cells = Vec::new();
                for cell in child.children.borrow().iter() {
                    if element_has_tag(cell, "td") {
                        cells.push(TableCell {
                            handle: cell.clone(),
                            header: false,
                        });
                    } else if element_has_tag(cell, "th") {
                        cells.push(TableCell {
                            handle: cell.clone(),
                            header: true,
                        });
                    }
                }
                if !cells.is_empty() {
                    rows.push(cells);
                }
            }
            _ => {}
        }
    }
}

/// Flattens a node into styled text spans, deriving bold/italic from the
/// usual inline emphasis tags.
fn inline_spans(handle: &Handle, style: Style, out: &mut Vec<(String, Style)>) {
    match &handle.data {
        NodeData::Text { contents } => {
            let text = collapse_whitespace(&contents.borrow());
            if !text.trim().is_empty() {
                out.push((text, style));
            }
        }
        NodeData::Element { name, .. } => {
            let derived = match name.local.as_ref() {
                "strong" | "b" => style.bold(),
                "em" | "i" => style.italic(),
                "script" | "style" => return,
                _ => style,
            };
            for child in handle.children.borrow().iter() {
                inline_spans(child, derived, out);
            }
        }
        _ => {}
    }
}

fn raw_text(handle: &Handle, out: &mut String) {
    match &handle.data {
        NodeData::Text { contents } => out.push_str(&contents.borrow()),
        _ => {
            for child in handle.children.borrow().iter() {
                raw_text(child, out);
            }
        }
    }
}

fn paragraph_from(spans: Vec<(String, Style)>) -> Paragraph {
    let mut paragraph = Paragraph::default();
    for (text, style) in spans {
        paragraph.push_styled(text, style);
    }
    paragraph
}

fn element_has_tag(handle: &Handle, tag: &str) -> bool {
    matches!(&handle.data, NodeData::Element { name, .. } if name.local.as_ref() == tag)
}

fn attribute(handle: &Handle, wanted: &str) -> Option<String> {
    let NodeData::Element { attrs, .. } = &handle.data else {
        return None;
    };
    attrs
        .borrow()
        .iter()
        .find(|attr| attr.name.local.as_ref() == wanted)
        .map(|attr| attr.value.to_string())
}

fn is_block_tag(tag: &str) -> bool {
    matches!(
        tag,
        "html"
            | "head"
            | "body"
            | "div"
            | "main"
            | "section"
            | "article"
            | "aside"
            | "header"
            | "footer"
            | "nav"
            | "p"
            | "blockquote"
            | "figure"
            | "figcaption"
            | "h1"
            | "h2"
            | "h3"
            | "h4"
            | "h5"
            | "h6"
            | "ul"
            | "ol"
            | "table"
            | "pre"
            | "img"
            | "br"
            | "hr"
            | "form"
            | "fieldset"
            | "script"
            | "style"
            | "noscript"
            | "template"
            | "iframe"
    )
}

fn collapse_whitespace(text: &str) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.is_empty() {
        return collapsed;
    }

    let mut out = String::with_capacity(collapsed.len() + 2);
    if text.starts_with(|c: char| c.is_whitespace()) {
        out.push(' ');
    }
    out.push_str(&collapsed);
    if text.ends_with(|c: char| c.is_whitespace()) {
        out.push(' ');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::collapse_whitespace;

    #[test]
    fn interior_whitespace_collapses_to_single_spaces() {
        assert_eq!(collapse_whitespace("a\n  b\t c"), "a b c");
    }

    #[test]
    fn boundary_whitespace_is_preserved_as_one_space() {
        assert_eq!(collapse_whitespace("  hello "), " hello ");
        assert_eq!(collapse_whitespace("word"), "word");
    }

    #[test]
    fn whitespace_only_text_collapses_to_nothing() {
        assert_eq!(collapse_whitespace(" \n\t "), "");
    }
}
