//! Markdown conversion in both directions, plus text helpers for guides.
//!
//! - [`html_to_markdown`]: extracted article HTML → Markdown via `htmd`, followed
//!   by the cleanup passes in [`cleanup`].
//! - [`render_html`]: Markdown → HTML via `pulldown-cmark`, with raw HTML dropped.
//! - [`text`]: tag stripping, word counts, reading time, first image.

mod cleanup;
mod render;
pub mod text;

use scraper::{ElementRef, Html, Selector};
use tracing::{debug, instrument};
use url::Url;

use drivedb_shared::{DriveDbError, Result};

pub use render::render_html;
pub use text::{first_image, plain_text, reading_time, strip_tags, truncate_words, word_count};

/// Tags whose content never belongs in an article body.
const SKIP_TAGS: [&str; 7] = ["script", "style", "nav", "iframe", "noscript", "svg", "form"];

/// Convert article HTML to clean Markdown.
///
/// `source_url` is used to absolutize relative links and images; pass `None`
/// when the origin is unknown.
#[instrument(skip(html), fields(len = html.len()))]
pub fn html_to_markdown(html: &str, source_url: Option<&str>) -> Result<String> {
    if html.trim().is_empty() {
        return Ok(String::new());
    }

    let html = tables_to_markdown(html);

    let converter = htmd::HtmlToMarkdown::builder()
        .skip_tags(SKIP_TAGS.to_vec())
        .build();

    let raw = converter
        .convert(&html)
        .map_err(|e| DriveDbError::Conversion(format!("htmd conversion failed: {e}")))?;

    let base = source_url.and_then(|u| Url::parse(u).ok());
    let markdown = cleanup::tidy(&raw, base.as_ref());

    debug!(raw_len = raw.len(), final_len = markdown.len(), "article converted");
    Ok(markdown)
}

// ---------------------------------------------------------------------------
// Tables
// ---------------------------------------------------------------------------

/// Replace `<table>` elements with pipe tables before handing the HTML to
/// `htmd`, which has no table support.
fn tables_to_markdown(html: &str) -> String {
    let Ok(table_sel) = Selector::parse("table") else {
        return html.to_string();
    };
    let doc = Html::parse_fragment(html);

    let mut out = html.to_string();
    for table in doc.select(&table_sel) {
        let rendered = pipe_table(&table);
        out = out.replacen(&table.html(), &rendered, 1);
    }
    out
}

fn pipe_table(table: &ElementRef) -> String {
    let (Ok(tr), Ok(cell)) = (Selector::parse("tr"), Selector::parse("th, td")) else {
        return String::new();
    };

    let rows: Vec<Vec<String>> = table
        .select(&tr)
        .map(|row| {
            row.select(&cell)
                .map(|c| c.text().collect::<String>().split_whitespace().collect::<Vec<_>>().join(" "))
                .collect::<Vec<_>>()
        })
        .filter(|cells| !cells.is_empty())
        .collect();

    let width = rows.iter().map(Vec::len).max().unwrap_or(0);
    if width == 0 {
        return String::new();
    }

    let line = |cells: &[String]| {
        let padded: Vec<&str> = (0..width)
            .map(|i| cells.get(i).map_or("", String::as_str))
            .collect();
        format!("| {} |\n", padded.join(" | "))
    };

    let mut md = String::from("\n\n");
    md.push_str(&line(&rows[0]));
    md.push_str(&format!("|{}\n", " --- |".repeat(width)));
    for row in &rows[1..] {
        md.push_str(&line(row));
    }
    md.push('\n');
    md
}
