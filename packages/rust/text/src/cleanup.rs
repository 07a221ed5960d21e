//! Post-conversion cleanup pipeline for rendered page text.
//!
//! Each pass is a function `&str -> String` applied in sequence.

use std::sync::LazyLock;

use regex::Regex;
use url::Url;

/// Run the full cleanup pipeline on raw converted text.
pub(crate) fn run_pipeline(text: &str, base_url: Option<&Url>) -> String {
    let mut result = text.to_string();

    result = drop_images(&result);
    result = strip_leftover_html(&result);
    result = resolve_links(&result, base_url);
    result = normalize_whitespace(&result);
    result = clean_blank_lines(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Pass 1: Drop image references
// ---------------------------------------------------------------------------

/// Remove `![alt](src)` references; alt text on banner images is noise.
fn drop_images(text: &str) -> String {
    static IMG_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"!\[[^\]]*\]\([^)]*\)").expect("valid regex"));

    IMG_RE.replace_all(text, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 2: Strip leftover HTML tags
// ---------------------------------------------------------------------------

/// Remove stray block tags that survived the conversion, keeping inner text.
fn strip_leftover_html(text: &str) -> String {
    static HTML_TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"</?(?:div|span|section|article|aside|figure|figcaption|details|summary|font|center)(?:\s[^>]*)?>")
            .expect("valid regex")
    });

    HTML_TAG_RE.replace_all(text, "").to_string()
}

// ---------------------------------------------------------------------------
// Pass 3: Resolve relative links
// ---------------------------------------------------------------------------

/// Resolve relative URLs in `[text](url)` links against a base URL.
fn resolve_links(text: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return text.to_string();
    };

    static LINK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\[([^\]]*)\]\(([^)]+)\)").expect("valid regex"));

    LINK_RE
        .replace_all(text, |caps: &regex::Captures| {
            let label = &caps[1];
            let href = &caps[2];

            if href.starts_with("http://")
                || href.starts_with("https://")
                || href.starts_with('#')
                || href.starts_with("mailto:")
                || href.starts_with("tel:")
            {
                return format!("[{label}]({href})");
            }

            match base.join(href) {
                Ok(resolved) => format!("[{label}]({resolved})"),
                Err(_) => format!("[{label}]({href})"),
            }
        })
        .to_string()
}

// ---------------------------------------------------------------------------
// Pass 4: Normalize whitespace
// ---------------------------------------------------------------------------

/// Trim trailing whitespace and drop lines that are whitespace only.
fn normalize_whitespace(text: &str) -> String {
    text.lines()
        .map(|line| line.trim_end())
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Pass 5: Collapse blank lines
// ---------------------------------------------------------------------------

/// Collapse runs of blank lines into a single blank line.
fn clean_blank_lines(text: &str) -> String {
    static MULTI_BLANK_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n{3,}").expect("valid regex"));

    MULTI_BLANK_RE.replace_all(text, "\n\n").to_string()
}

// ---------------------------------------------------------------------------
// Pass 6: Ensure trailing newline
// ---------------------------------------------------------------------------

fn ensure_trailing_newline(text: &str) -> String {
    let trimmed = text.trim_matches('\n');
    format!("{trimmed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drop_images_removes_references() {
        let input = "Before ![banner](/img/top.png) after";
        assert_eq!(drop_images(input), "Before  after");
    }

    #[test]
    fn strip_leftover_html_keeps_content() {
        let input = "<div class=\"note\">Bring your seal</div>";
        assert_eq!(strip_leftover_html(input), "Bring your seal");
    }

    #[test]
    fn resolve_links_relative_resolved() {
        let base = Url::parse("https://bank.example/souzoku/index.html").unwrap();
        let input = "[Form](/pdf/form.pdf)";
        assert_eq!(
            resolve_links(input, Some(&base)),
            "[Form](https://bank.example/pdf/form.pdf)"
        );
    }

    #[test]
    fn resolve_links_keeps_tel() {
        let base = Url::parse("https://bank.example/").unwrap();
        let input = "[0120-000-000](tel:0120000000)";
        assert_eq!(resolve_links(input, Some(&base)), input);
    }

    #[test]
    fn blank_lines_collapse_to_one() {
        let input = "Line 1\n\n\n\n\nLine 2";
        assert_eq!(clean_blank_lines(input), "Line 1\n\nLine 2");
    }

    #[test]
    fn pipeline_output_ends_with_single_newline() {
        let input = "\n\nText   \n\n\n\n";
        assert_eq!(run_pipeline(input, None), "Text\n");
    }
}
