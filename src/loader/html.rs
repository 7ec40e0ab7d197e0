//! Markup-to-text extraction built on `scraper`.
//!
//! Paragraph-level elements become blank-line separated paragraphs and line-level elements end
//! with a single newline, so the chunker's separator ladder (`\n\n`, `\n`, ` `) maps onto the
//! document's own structure. Script, style and hidden inline-XBRL header content is dropped.

use scraper::{ElementRef, Html, Node};

const SKIPPED_ELEMENTS: &[&str] = &[
    "script", "style", "noscript", "head", "title", "template", "svg", "ix:header",
];

const PARAGRAPH_ELEMENTS: &[&str] = &[
    "address",
    "article",
    "aside",
    "blockquote",
    "center",
    "div",
    "dl",
    "figure",
    "footer",
    "form",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "header",
    "hr",
    "main",
    "nav",
    "ol",
    "p",
    "pre",
    "section",
    "table",
    "ul",
];

const LINE_ELEMENTS: &[&str] = &["br", "dd", "dt", "li", "tr", "caption"];

const CELL_ELEMENTS: &[&str] = &["td", "th"];

/// Extract normalized plain text from an HTML document.
///
/// Returns an empty string when the markup carries no visible text.
pub fn extract_text(markup: &str) -> String {
    let document = Html::parse_document(markup);
    let mut raw = String::with_capacity(markup.len() / 4);
    collect_text(document.root_element(), &mut raw);
    normalize_whitespace(&raw)
}

fn collect_text(element: ElementRef<'_>, out: &mut String) {
    let name = element.value().name();
    if SKIPPED_ELEMENTS.contains(&name) || is_hidden(element) {
        return;
    }

    let paragraph = PARAGRAPH_ELEMENTS.contains(&name);
    if paragraph {
        out.push_str("\n\n");
    }

    for child in element.children() {
        match child.value() {
            Node::Text(text) => out.push_str(text),
            Node::Element(_) => {
                if let Some(child) = ElementRef::wrap(child) {
                    collect_text(child, out);
                }
            }
            _ => {}
        }
    }

    if paragraph {
        out.push_str("\n\n");
    } else if LINE_ELEMENTS.contains(&name) {
        out.push('\n');
    } else if CELL_ELEMENTS.contains(&name) {
        out.push(' ');
    }
}

fn is_hidden(element: ElementRef<'_>) -> bool {
    element
        .value()
        .attr("style")
        .map(|style| {
            let compact: String = style
                .chars()
                .filter(|c| !c.is_whitespace())
                .collect::<String>()
                .to_lowercase();
            compact.contains("display:none")
        })
        .unwrap_or(false)
}

/// Collapse intra-line whitespace, trim lines, and fold blank-line runs into one paragraph break.
pub(crate) fn normalize_whitespace(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut paragraph_break = false;

    for line in raw.split('\n') {
        let mut words = line.split_whitespace();
        let Some(first) = words.next() else {
            if !out.is_empty() {
                paragraph_break = true;
            }
            continue;
        };

        if !out.is_empty() {
            out.push_str(if paragraph_break { "\n\n" } else { "\n" });
        }
        out.push_str(first);
        for word in words {
            out.push(' ');
            out.push_str(word);
        }
        paragraph_break = false;
    }

    out
}
