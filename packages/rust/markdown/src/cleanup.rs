//! Cleanup passes applied to converted article Markdown.
//!
//! Each pass is a plain `&str -> String` function; [`tidy`] runs them in order.
//! Fenced code blocks are left untouched by every line-oriented pass.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

/// Run all passes over freshly converted Markdown.
pub(crate) fn tidy(md: &str, base: Option<&Url>) -> String {
    let md = fix_fence_languages(md);
    let md = outside_fences(&md, strip_layout_tags);
    let md = outside_fences(&md, drop_empty_links);
    let md = absolutize(&md, base);
    let md = collapse_blank_lines(&md);
    finish(&md)
}

/// Apply `pass` to each line that is not inside a fenced code block.
fn outside_fences(md: &str, pass: fn(&str) -> String) -> String {
    let mut fenced = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                fenced = !fenced;
                line.to_string()
            } else if fenced {
                line.to_string()
            } else {
                pass(line)
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// ```` ```language-js ```` → ```` ```js ````.
fn fix_fence_languages(md: &str) -> String {
    static FENCE_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^```(?:language-|lang-|highlight-)(\w+)").expect("valid regex")
    });
    FENCE_RE.replace_all(md, "```$1").into_owned()
}

/// Remove wrapper tags that `htmd` passes through verbatim.
fn strip_layout_tags(line: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|picture|source)(?:\s[^>]*)?/?>")
            .expect("valid regex")
    });
    TAG_RE.replace_all(line, "").into_owned()
}

/// Drop links with no text (share buttons, icon anchors), keeping images.
fn drop_empty_links(line: &str) -> String {
    static EMPTY_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(^|[^!])\[\s*\]\([^)]*\)").expect("valid regex"));
    EMPTY_RE.replace_all(line, "$1").into_owned()
}

/// Resolve relative link and image targets against the article URL.
fn absolutize(md: &str, base: Option<&Url>) -> String {
    static TARGET_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"(!?\[[^\]]*\])\(([^)\s]+)([^)]*)\)").expect("valid regex"));

    let Some(base) = base else {
        return md.to_string();
    };

    TARGET_RE
        .replace_all(md, |caps: &Captures| {
            let (label, href, rest) = (&caps[1], &caps[2], &caps[3]);
            let keep = href.starts_with('#')
                || href.starts_with("mailto:")
                || Url::parse(href).is_ok();
            if keep {
                return caps[0].to_string();
            }
            match base.join(href) {
                Ok(resolved) => format!("{label}({resolved}{rest})"),
                Err(_) => caps[0].to_string(),
            }
        })
        .into_owned()
}

/// Collapse runs of blank lines to a single blank line.
fn collapse_blank_lines(md: &str) -> String {
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n(?:[ \t]*\n){2,}").expect("valid regex"));
    BLANKS_RE.replace_all(md, "\n\n").into_owned()
}

/// Trim trailing spaces per line, leading blank lines, and end with one newline.
fn finish(md: &str) -> String {
    let trimmed = md
        .lines()
        .map(str::trim_end)
        .collect::<Vec<_>>()
        .join("\n");
    let body = trimmed.trim_matches('\n');
    if body.is_empty() {
        String::new()
    } else {
        format!("{body}\n")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fence_language_prefix_removed() {
        assert_eq!(
            fix_fence_languages("```language-python\nprint(1)\n```"),
            "```python\nprint(1)\n```"
        );
    }

    #[test]
    fn layout_tags_removed_outside_fences_only() {
        let input = "<div class=\"note\">Unplug the camera</div>\n```html\n<div>kept</div>\n```";
        let result = outside_fences(input, strip_layout_tags);
        assert!(result.starts_with("Unplug the camera\n"));
        assert!(result.contains("<div>kept</div>"));
    }

    #[test]
    fn empty_links_dropped_images_kept() {
        assert_eq!(drop_empty_links("Share [](https://x.test/share) now"), "Share  now");
        assert_eq!(drop_empty_links("![](img.png)"), "![](img.png)");
    }

    #[test]
    fn absolutize_skips_absolute_and_anchors() {
        let base = Url::parse("https://blog.example.com/posts/one").unwrap();
        let md = "[a](https://other.test/x) [b](#top) [c](../two) ![d](/i.png \"title\")";
        let out = absolutize(md, Some(&base));
        assert!(out.contains("[a](https://other.test/x)"));
        assert!(out.contains("[b](#top)"));
        assert!(out.contains("[c](https://blog.example.com/two)"));
        assert!(out.contains("![d](https://blog.example.com/i.png \"title\")"));
    }

    #[test]
    fn blank_runs_collapse() {
        assert_eq!(collapse_blank_lines("a\n\n\n\n b"), "a\n\n b");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn finish_normalizes_edges() {
        assert_eq!(finish("\n\nText  \nMore\t\n\n\n"), "Text\nMore\n");
        assert_eq!(finish("\n \n"), "");
    }
}
