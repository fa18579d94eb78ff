//! Stable, hash-suffixed slugs.
//!
//! Every record gets a short content hash derived from its identifier. Guide
//! slugs end with it; configuration slugs lead with it. [`needs_normalizing`]
//! is the post-commit check that decides whether a slug must be regenerated.

use std::fmt::Display;

use sha2::{Digest, Sha256};

use drivedb_shared::{Guide, VehicleConfig, parameterize};

/// Number of hex characters kept from the id hash.
const HASH_LEN: usize = 8;

/// First [`HASH_LEN`] hex characters of `sha256(id)`.
pub fn hash_suffix(id: impl Display) -> String {
    let mut hasher = Sha256::new();
    hasher.update(id.to_string().as_bytes());
    let mut hex = format!("{:x}", hasher.finalize());
    hex.truncate(HASH_LEN);
    hex
}

/// Slug of a configuration, or `None` while it has no type.
pub fn config_slug(config: &VehicleConfig) -> Option<String> {
    let config_type = config.config_type?;
    Some(parameterize(&format!(
        "{} {} {} {} {}",
        hash_suffix(config.id),
        config.year_range_str(),
        config.make.name,
        config.model.name,
        config_type.name()
    )))
}

/// Slug of a guide, or `None` while it is unpublished.
pub fn guide_slug(guide: &Guide) -> Option<String> {
    if !guide.is_published() {
        return None;
    }
    let title = guide.title.as_deref().unwrap_or_default();
    Some(parameterize(&format!("{title} {}", hash_suffix(guide.id))))
}

/// Whether a guide's current slug lacks its hash suffix (or is the bare hash).
pub fn needs_normalizing(guide: &Guide) -> bool {
    let suffix = hash_suffix(guide.id);
    match guide.slug.as_deref() {
        None | Some("") => guide_slug(guide).is_some(),
        Some(slug) => !slug.ends_with(&suffix) || slug == suffix,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use drivedb_shared::NEW_GUIDE_TITLE;

    #[test]
    fn hash_is_stable_and_short() {
        let a = hash_suffix("abc");
        assert_eq!(a, hash_suffix("abc"));
        assert_eq!(a.len(), HASH_LEN);
        assert_eq!(a, "ba7816bf");
        assert_ne!(a, hash_suffix("abd"));
    }

    #[test]
    fn guide_slug_ends_with_hash() {
        let guide = Guide {
            title: Some("Installing the Giraffe!".into()),
            ..Guide::new()
        };
        let slug = guide_slug(&guide).unwrap();
        assert!(slug.starts_with("installing-the-giraffe-"));
        assert!(slug.ends_with(&hash_suffix(guide.id)));
    }

    #[test]
    fn unpublished_guides_have_no_slug() {
        let guide = Guide {
            title: Some(NEW_GUIDE_TITLE.into()),
            ..Guide::new()
        };
        assert!(guide_slug(&guide).is_none());
        assert!(!needs_normalizing(&guide));
    }

    #[test]
    fn normalizing_detects_foreign_slugs() {
        let mut guide = Guide {
            title: Some("Mounting".into()),
            ..Guide::new()
        };
        assert!(needs_normalizing(&guide));

        guide.slug = guide_slug(&guide);
        assert!(!needs_normalizing(&guide));

        guide.slug = Some("mounting".into());
        assert!(needs_normalizing(&guide));

        guide.slug = Some(hash_suffix(guide.id));
        assert!(needs_normalizing(&guide));
    }
}
