//! HTML-to-text rendering for fetched pages.
//!
//! Turns a raw HTML document into compact, model-ready text: the main content
//! region is selected, tables are flattened into pipe rows, the result is
//! converted with `htmd`, and a series of cleanup passes strips leftover markup,
//! image references and excess whitespace.

mod cleanup;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use heirdesk_shared::{HeirdeskError, Result};

/// Tags whose content is never visible text.
const SKIP_TAGS: [&str; 10] = [
    "script", "style", "nav", "header", "footer", "iframe", "noscript", "svg", "form", "button",
];

/// Result of rendering an HTML page.
#[derive(Debug, Clone)]
pub struct RenderedPage {
    /// Cleaned visible text (Markdown-flavoured).
    pub text: String,
    /// Document `<title>` or first H1, when present.
    pub title: Option<String>,
}

impl RenderedPage {
    /// Whether the page rendered to nothing readable.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// Render an HTML document to visible text.
///
/// `base_url` is used to absolutize relative links so that form and PDF
/// links stay meaningful to the reader.
#[instrument(skip(html), fields(len = html.len()))]
pub fn render(html: &str, base_url: Option<&Url>) -> Result<RenderedPage> {
    let doc = Html::parse_document(html);
    let title = extract_title(&doc);

    let content_html = extract_content_html(&doc).unwrap_or_else(|| html.to_string());
    let content_html = flatten_tables(&content_html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(&content_html)
        .map_err(|e| HeirdeskError::parse(format!("htmd conversion failed: {e}")))?;

    let text = cleanup::run_pipeline(&raw, base_url);

    debug!(raw_len = raw.len(), text_len = text.len(), "page rendered");

    Ok(RenderedPage { text, title })
}

// ---------------------------------------------------------------------------
// Content selection
// ---------------------------------------------------------------------------

/// Pick the main content region, falling back to `<body>`.
fn extract_content_html(doc: &Html) -> Option<String> {
    // Known content containers in priority order
    let selectors = [
        "main",
        "[role=\"main\"]",
        "#main",
        "#contents",
        "#content",
        "article",
        ".content",
        "body",
    ];

    for sel_str in &selectors {
        if let Ok(selector) = Selector::parse(sel_str) {
            if let Some(el) = doc.select(&selector).next() {
                if !el.text().all(|t| t.trim().is_empty()) {
                    return Some(el.inner_html());
                }
            }
        }
    }

    None
}

fn extract_title(doc: &Html) -> Option<String> {
    ["title", "h1"].iter().find_map(|sel_str| {
        let selector = Selector::parse(sel_str).ok()?;
        let text = doc
            .select(&selector)
            .next()?
            .text()
            .collect::<String>()
            .trim()
            .to_string();
        (!text.is_empty()).then_some(text)
    })
}

// ---------------------------------------------------------------------------
// Table flattening
// ---------------------------------------------------------------------------

/// Replace `<table>` elements with one `cell | cell` line per row.
///
/// `htmd` 0.1 drops table structure, and procedure pages keep their
/// document checklists in tables.
fn flatten_tables(html: &str) -> String {
    let doc = Html::parse_fragment(html);
    let Ok(table_sel) = Selector::parse("table") else {
        return html.to_string();
    };

    let mut result = html.to_string();
    for table in doc.select(&table_sel) {
        let rows = table_rows(&table);
        if rows.is_empty() {
            continue;
        }
        let flattened = format!("<p>{}</p>", rows.join("<br>"));
        result = result.replacen(&table.html(), &flattened, 1);
    }
    result
}

fn table_rows(table: &ElementRef) -> Vec<String> {
    let (Ok(tr_sel), Ok(cell_sel)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return Vec::new();
    };

    table
        .select(&tr_sel)
        .filter_map(|tr| {
            let cells: Vec<String> = tr
                .select(&cell_sel)
                .map(|cell| {
                    cell.text()
                        .map(str::trim)
                        .filter(|t| !t.is_empty())
                        .collect::<Vec<_>>()
                        .join(" ")
                })
                .filter(|c| !c.is_empty())
                .collect();
            (!cells.is_empty()).then(|| cells.join(" | "))
        })
        .collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
