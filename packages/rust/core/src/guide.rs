//! Guide save pipeline and derived guide attributes.
//!
//! Saving runs explicit stages in a fixed order:
//! validate → fetch (only when the source URL changed) → match author →
//! render → persist → dispatch image job → normalize slug.

use chrono::{DateTime, Datelike, Utc};
use tracing::{debug, info, instrument, warn};

use drivedb_extract::Extractor;
use drivedb_markdown as markdown;
use drivedb_shared::{
    Author, DriveDbError, Guide, GuideSummary, ImageJob, Result, User, ValidationErrors,
};
use drivedb_storage::{GUIDE_ITEM_TYPE, Storage};

use crate::article::merge_sources;
use crate::render::MarkdownRenderer;
use crate::slug::{guide_slug, needs_normalizing};

const BLANK: &str = "can't be blank";

/// What a [`GuidePipeline::save`] call did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaveReport {
    /// The guide was inserted rather than updated.
    pub created: bool,
    /// The article was fetched from its source URL.
    pub fetched: bool,
    /// Id of the queued image download, if one was dispatched.
    pub image_job: Option<i64>,
    /// The slug was regenerated after the write.
    pub slug_normalized: bool,
}

/// Collaborators needed to save guides.
#[derive(Debug, Clone, Copy)]
pub struct GuidePipeline<'a> {
    pub storage: &'a Storage,
    pub extractor: &'a Extractor,
    pub renderer: &'a MarkdownRenderer,
}

impl GuidePipeline<'_> {
    /// Save `guide`. `previous` is the stored version for updates, `None` for
    /// a new guide.
    ///
    /// Validation failures return [`DriveDbError::Validation`] and nothing is
    /// written.
    #[instrument(skip_all, fields(guide = %guide.id, created = previous.is_none()))]
    pub async fn save(
        &self,
        guide: &mut Guide,
        previous: Option<&Guide>,
        whodunnit: Option<&str>,
    ) -> Result<SaveReport> {
        let created = previous.is_none();
        self.validate(guide, created).await?;

        let fetch_url = source_changed(guide, previous);
        if let Some(url) = &fetch_url {
            info!(%url, "fetching article");
            let pair = self.extractor.fetch_both(url).await;
            merge_sources(pair, url, Utc::now())?.apply_to(guide);
            self.match_author(guide).await?;
        }

        if let Some(md) = guide.markdown.as_deref().filter(|m| !m.trim().is_empty()) {
            guide.markup = Some(self.renderer.render(md).await);
        }

        guide.updated_at = Utc::now();
        if created {
            self.storage.insert_guide(guide, whodunnit).await?;
        } else {
            self.storage.update_guide(guide, whodunnit).await?;
        }

        let image_job = match guide.source_image_url {
            Some(_) => self.dispatch_image_job(guide).await,
            None => None,
        };

        let slug_normalized = needs_normalizing(guide);
        if slug_normalized {
            guide.slug = guide_slug(guide);
            debug!(slug = ?guide.slug, "slug regenerated");
            self.storage.update_guide(guide, whodunnit).await?;
        }

        Ok(SaveReport {
            created,
            fetched: fetch_url.is_some(),
            image_job,
            slug_normalized,
        })
    }

    /// Title and body are required on create unless the guide is fetched;
    /// a source URL may only be used once.
    async fn validate(&self, guide: &Guide, created: bool) -> Result<()> {
        if !created {
            return Ok(());
        }
        let mut errors = ValidationErrors::new();
        match guide.article_source_url.as_deref().filter(|u| !u.trim().is_empty()) {
            Some(url) => {
                if self.storage.guide_source_exists(url).await? {
                    errors.add("article_source_url", "has already been taken");
                }
            }
            None => {
                if is_blank(guide.title.as_deref()) {
                    errors.add("title", BLANK);
                }
                if is_blank(guide.markdown.as_deref()) {
                    errors.add("markdown", BLANK);
                }
            }
        }
        errors.into_result()
    }

    /// Link the guide to the user whose GitHub or Slack name is the author.
    async fn match_author(&self, guide: &mut Guide) -> Result<()> {
        let Some(name) = guide.author_name.as_deref() else {
            return Ok(());
        };
        if let Some(user) = self.storage.find_user_by_username(name).await? {
            debug!(user = %user.id, "author matched a registered user");
            guide.user_id = Some(user.id);
        }
        Ok(())
    }

    /// Best effort: a failed enqueue is logged, never propagated.
    async fn dispatch_image_job(&self, guide: &Guide) -> Option<i64> {
        let job = ImageJob {
            record_id: guide.id.to_string(),
            record_type: GUIDE_ITEM_TYPE.into(),
        };
        match self.storage.enqueue_image_job(&job).await {
            Ok(id) => Some(id),
            Err(e) => {
                warn!(error = %e, "failed to dispatch image download");
                None
            }
        }
    }

    /// Public JSON projection of a stored guide.
    pub async fn summary(&self, guide: &Guide) -> Result<GuideSummary> {
        summary(self.storage, guide).await
    }
}

/// Source URL to fetch, when it was set or changed by this save.
fn source_changed(guide: &Guide, previous: Option<&Guide>) -> Option<String> {
    let url = guide.article_source_url.as_deref().filter(|u| !u.trim().is_empty())?;
    match previous {
        Some(prev) if prev.article_source_url.as_deref() == Some(url) => None,
        _ => Some(url.to_string()),
    }
}

fn is_blank(value: Option<&str>) -> bool {
    value.is_none_or(|v| v.trim().is_empty())
}

// ---------------------------------------------------------------------------
// Derived attributes
// ---------------------------------------------------------------------------

/// Display identity: explicit author name, then the linked user, then anonymous.
pub fn author(guide: &Guide, user: Option<&User>) -> Author {
    if let Some(name) = guide.author_name.as_deref().filter(|n| !n.trim().is_empty()) {
        return Author {
            name: name.to_string(),
            image: None,
        };
    }
    match user {
        Some(user) => Author {
            name: user.discord_username.clone().unwrap_or_default(),
            image: user.avatar_url.clone(),
        },
        None => Author {
            name: "Anonymous".into(),
            image: None,
        },
    }
}

/// `{id, image, title, body, slug, author}` with the latest attached image.
pub async fn summary(storage: &Storage, guide: &Guide) -> Result<GuideSummary> {
    let user = match guide.user_id {
        Some(id) => storage.get_user(id).await?,
        None => None,
    };
    Ok(GuideSummary {
        id: guide.id,
        image: storage.latest_guide_image(guide.id).await?,
        title: guide.title.clone(),
        body: plain_text(guide),
        slug: guide.slug.clone(),
        author: author(guide, user.as_ref()),
    })
}

/// Record an image downloaded for a guide. Called back by the image worker.
pub async fn attach_image(storage: &Storage, guide: &Guide, url: &str) -> Result<i64> {
    if url.trim().is_empty() {
        return Err(DriveDbError::invalid("image", BLANK));
    }
    storage.attach_guide_image(guide.id, url).await
}

/// `Mar 04` this year, `Mar 04, 2019` otherwise.
pub fn friendly_date(guide: &Guide, now: DateTime<Utc>) -> String {
    if guide.created_at.year() == now.year() {
        guide.created_at.format("%b %d").to_string()
    } else {
        guide.created_at.format("%b %d, %Y").to_string()
    }
}

pub fn plain_text(guide: &Guide) -> String {
    guide.markup.as_deref().map(markdown::plain_text).unwrap_or_default()
}

pub fn word_count(guide: &Guide) -> usize {
    guide.markup.as_deref().map_or(0, markdown::word_count)
}

/// Minutes, at 200 words per minute.
pub fn reading_time(guide: &Guide) -> usize {
    markdown::reading_time(word_count(guide))
}

pub fn first_image(guide: &Guide) -> Option<String> {
    guide.markdown.as_deref().and_then(markdown::first_image)
}
