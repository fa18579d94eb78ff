//! Merge policy for articles fetched from the two extraction services.
//!
//! Each field prefers the primary service's value and falls back to the
//! secondary's, independently per field. The order is fixed regardless of
//! which response arrived first.

use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, warn};
use url::Url;

use drivedb_extract::{ExtractedArticle, SourcePair};
use drivedb_markdown::html_to_markdown;
use drivedb_shared::{DriveDbError, Guide, Result};

/// A normalized article ready to be applied to a guide.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedArticle {
    pub title: String,
    pub markdown: Option<String>,
    pub source_image_url: Option<String>,
    pub author_name: Option<String>,
    pub excerpt: Option<String>,
    pub published_at: DateTime<Utc>,
    pub reference_domain: Option<String>,
}

impl MergedArticle {
    /// Overwrite the fetched fields of `guide`.
    pub fn apply_to(self, guide: &mut Guide) {
        guide.title = Some(self.title);
        guide.markdown = self.markdown;
        guide.source_image_url = self.source_image_url;
        guide.author_name = self.author_name;
        guide.excerpt = self.excerpt;
        guide.published_at = Some(self.published_at);
        guide.reference_domain = self.reference_domain;
    }
}

/// Merge both services' answers for `source_url`.
///
/// A failed service counts as an empty answer; only when both fail is the
/// merge aborted.
pub fn merge_sources(pair: SourcePair, source_url: &str, now: DateTime<Utc>) -> Result<MergedArticle> {
    let (primary, secondary) = match (pair.primary, pair.secondary) {
        (Err(a), Err(b)) => {
            return Err(DriveDbError::Network(format!(
                "both extraction services failed for {source_url}: {a}; {b}"
            )));
        }
        (a, b) => (a.unwrap_or_default(), b.unwrap_or_default()),
    };
    merge(&primary, &secondary, source_url, now)
}

/// Field-by-field merge of two successful answers.
pub fn merge(
    primary: &ExtractedArticle,
    secondary: &ExtractedArticle,
    source_url: &str,
    now: DateTime<Utc>,
) -> Result<MergedArticle> {
    let reference_domain = primary.domain.clone().or_else(|| host_of(source_url));

    let title = primary
        .title
        .clone()
        .or_else(|| secondary.title.clone())
        .unwrap_or_else(|| {
            format!(
                "Untitled Guide from {}",
                reference_domain.as_deref().unwrap_or_default()
            )
        });

    let markdown = match primary.content.as_deref().or(secondary.content.as_deref()) {
        Some(html) => Some(html_to_markdown(html, Some(source_url))?),
        None => {
            warn!(%source_url, "no article content from either service");
            None
        }
    };

    let published_at = primary
        .date_published
        .as_deref()
        .and_then(parse_published)
        .unwrap_or(now);

    debug!(%title, has_content = markdown.is_some(), "article merged");
    Ok(MergedArticle {
        title,
        markdown,
        source_image_url: primary.lead_image_url.clone(),
        author_name: primary.author.clone().or_else(|| primary.domain.clone()),
        excerpt: primary.excerpt.clone(),
        published_at,
        reference_domain,
    })
}

fn host_of(url: &str) -> Option<String> {
    Url::parse(url).ok()?.host_str().map(str::to_string)
}

/// RFC 3339 timestamps or bare `YYYY-MM-DD` dates.
fn parse_published(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0).map(|dt| dt.and_utc());
    }
    debug!(%raw, "unparseable publication date");
    None
}
