//! Plain-text helpers over rendered markup and Markdown sources.

use std::sync::LazyLock;

use regex::Regex;
use scraper::Html;

/// Average reading speed used for [`reading_time`].
const WORDS_PER_MINUTE: usize = 200;

/// Text content of an HTML fragment, whitespace-collapsed.
pub fn strip_tags(html: &str) -> String {
    let fragment = Html::parse_fragment(html);
    fragment
        .root_element()
        .text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

/// Truncate at a word boundary so that the result, including `omission`,
/// fits in `limit` characters.
pub fn truncate_words(text: &str, limit: usize, omission: &str) -> String {
    if text.chars().count() <= limit {
        return text.to_string();
    }

    let budget = limit.saturating_sub(omission.chars().count());
    let mut out = String::new();
    for word in text.split(' ') {
        let next = if out.is_empty() {
            word.chars().count()
        } else {
            out.chars().count() + 1 + word.chars().count()
        };
        if next > budget {
            break;
        }
        if !out.is_empty() {
            out.push(' ');
        }
        out.push_str(word);
    }
    out.push_str(omission);
    out
}

/// Teaser text: tags stripped, 250 characters max, cut on a word boundary.
pub fn plain_text(markup: &str) -> String {
    truncate_words(&strip_tags(markup), 250, " ...")
}

/// Number of words in rendered markup.
pub fn word_count(markup: &str) -> usize {
    strip_tags(markup).split_whitespace().count()
}

/// Minutes to read `words` words, rounded up.
pub fn reading_time(words: usize) -> usize {
    words.div_ceil(WORDS_PER_MINUTE)
}

/// URL of the first Markdown image, if any.
pub fn first_image(markdown: &str) -> Option<String> {
    static IMAGE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"!\[[^\]]*\]\((.*?)\s*("(?:.*[^"])")?\s*\)"#).expect("valid regex")
    });
    IMAGE_RE
        .captures(markdown)
        .map(|caps| caps[1].to_string())
        .filter(|url| !url.is_empty())
}
