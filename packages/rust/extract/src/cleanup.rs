//! Post-conversion cleanup for markdown produced from web pages.
//!
//! Each pass is `&str -> String`, applied in a fixed order.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use url::Url;

/// Run every pass over converted markdown.
pub(crate) fn run_pipeline(md: &str, base_url: Option<&Url>) -> String {
    let mut result = md.replace("\r\n", "\n");

    result = normalize_headings(&result);
    result = collapse_blank_lines(&result);
    result = fix_code_fence_languages(&result);
    result = strip_leftover_html(&result);
    result = resolve_references(&result, base_url);
    result = trim_line_ends(&result);
    result = ensure_trailing_newline(&result);

    result
}

// ---------------------------------------------------------------------------
// Headings
// ---------------------------------------------------------------------------

/// Keep the first H1; later ones become H2. Fenced code is left alone.
fn normalize_headings(md: &str) -> String {
    static H_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"^(#{1,6})\s+(.+)$").expect("valid regex"));

    let mut seen_h1 = false;
    let mut in_fence = false;

    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                return line.to_string();
            }
            match H_RE.captures(line) {
                Some(caps) if &caps[1] == "#" => {
                    if seen_h1 {
                        format!("## {}", &caps[2])
                    } else {
                        seen_h1 = true;
                        line.to_string()
                    }
                }
                _ => line.to_string(),
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Blank lines
// ---------------------------------------------------------------------------

/// At most one empty line between blocks.
fn collapse_blank_lines(md: &str) -> String {
    static BLANKS_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"\n[ \t]*\n(?:[ \t]*\n)+").expect("valid regex"));

    BLANKS_RE.replace_all(md, "\n\n").into_owned()
}

// ---------------------------------------------------------------------------
// Code fences
// ---------------------------------------------------------------------------

/// ```` ```language-js ```` → ```` ```js ````.
fn fix_code_fence_languages(md: &str) -> String {
    static LANG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r"(?m)^(\s*)```(?:language-|lang-|highlight-|hljs-)([\w+-]+)")
            .expect("valid regex")
    });

    LANG_RE.replace_all(md, "$1```$2").into_owned()
}

// ---------------------------------------------------------------------------
// Leftover HTML
// ---------------------------------------------------------------------------

/// Drop layout tags htmd passes through. Inner text stays; fenced code is
/// not touched.
fn strip_leftover_html(md: &str) -> String {
    static TAG_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(
            r"</?(?:div|span|section|article|aside|header|footer|figure|figcaption|details|summary|main|font|center|picture|source)(?:\s[^>]*)?/?>",
        )
        .expect("valid regex")
    });

    let mut in_fence = false;
    md.lines()
        .map(|line| {
            if line.trim_start().starts_with("```") {
                in_fence = !in_fence;
                return line.to_string();
            }
            if in_fence {
                line.to_string()
            } else {
                TAG_RE.replace_all(line, "").into_owned()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

// ---------------------------------------------------------------------------
// Links and images
// ---------------------------------------------------------------------------

/// Make `[t](u)` and `![a](u)` targets absolute against the page URL.
fn resolve_references(md: &str, base_url: Option<&Url>) -> String {
    let Some(base) = base_url else {
        return md.to_string();
    };

    static REF_RE: LazyLock<Regex> = LazyLock::new(|| {
        Regex::new(r#"(!?)\[([^\]]*)\]\(\s*([^)\s]+)((?:\s+"[^"]*")?)\s*\)"#).expect("valid regex")
    });

    REF_RE
        .replace_all(md, |caps: &Captures| {
            let bang = &caps[1];
            let text = &caps[2];
            let target = &caps[3];
            let title = &caps[4];
            let resolved = resolve_target(base, target).unwrap_or_else(|| target.to_string());
            format!("{bang}[{text}]({resolved}{title})")
        })
        .into_owned()
}

/// `None` when the target should be left as written.
pub(crate) fn resolve_target(base: &Url, target: &str) -> Option<String> {
    let lower = target.to_ascii_lowercase();
    if target.starts_with('#')
        || lower.starts_with("http://")
        || lower.starts_with("https://")
        || lower.starts_with("mailto:")
        || lower.starts_with("tel:")
        || lower.starts_with("data:")
        || lower.starts_with("javascript:")
    {
        return None;
    }
    base.join(target).ok().map(String::from)
}

// ---------------------------------------------------------------------------
// Whitespace
// ---------------------------------------------------------------------------

fn trim_line_ends(md: &str) -> String {
    md.lines().map(str::trim_end).collect::<Vec<_>>().join("\n")
}

fn ensure_trailing_newline(md: &str) -> String {
    let trimmed = md.trim_matches('\n');
    format!("{trimmed}\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://bench.example.com/reports/2024/index.html").unwrap()
    }

    #[test]
    fn second_h1_is_demoted() {
        let out = normalize_headings("# Results\n\ntext\n\n# Method\n");
        assert_eq!(out, "# Results\n\ntext\n\n## Method");
    }

    #[test]
    fn hashes_inside_fences_are_not_headings() {
        let input = "# Title\n```sh\n# comment\n```";
        assert_eq!(normalize_headings(input), input);
    }

    #[test]
    fn blank_runs_collapse_to_one() {
        assert_eq!(collapse_blank_lines("a\n\n\n  \n\nb"), "a\n\nb");
        assert_eq!(collapse_blank_lines("a\n\nb"), "a\n\nb");
    }

    #[test]
    fn fence_language_prefixes() {
        assert_eq!(fix_code_fence_languages("```language-python\nx\n```"), "```python\nx\n```");
        assert_eq!(fix_code_fence_languages("```rust\n```"), "```rust\n```");
    }

    #[test]
    fn layout_tags_removed_outside_fences() {
        let out = strip_leftover_html("<div class=\"x\">kept</div>\n```html\n<div>code</div>\n```");
        assert!(out.starts_with("kept\n"));
        assert!(out.contains("<div>code</div>"));
    }

    #[test]
    fn relative_link_and_image_resolved() {
        let out = resolve_references("[next](../2023/) and ![chart](/img/qps.png)", Some(&base()));
        assert_eq!(
            out,
            "[next](https://bench.example.com/reports/2023/) and ![chart](https://bench.example.com/img/qps.png)"
        );
    }

    #[test]
    fn protocol_relative_image() {
        let out = resolve_references("![x](//cdn.example.com/a.png)", Some(&base()));
        assert_eq!(out, "![x](https://cdn.example.com/a.png)");
    }

    #[test]
    fn absolute_anchor_and_mailto_untouched() {
        let input = "[a](https://other.org/x) [b](#results) [c](mailto:team@example.com)";
        assert_eq!(resolve_references(input, Some(&base())), input);
    }

    #[test]
    fn link_title_preserved() {
        let out = resolve_references(r#"[d](docs.html "Docs")"#, Some(&base()));
        assert_eq!(out, r#"[d](https://bench.example.com/reports/2024/docs.html "Docs")"#);
    }

    #[test]
    fn no_base_leaves_links() {
        assert_eq!(resolve_references("[a](/b)", None), "[a](/b)");
    }

    #[test]
    fn pipeline_output_shape() {
        let input = "\n\n# Title   \n\n\n\n<span>Body</span>\n\n```lang-js\nx\n```\n\n\n";
        let out = run_pipeline(input, Some(&base()));
        assert_eq!(out, "# Title\n\nBody\n\n```js\nx\n```\n");
    }

    #[test]
    fn pipeline_is_idempotent() {
        let input = "# T\n\n[l](/x)\n\n\n\nend";
        let once = run_pipeline(input, Some(&base()));
        assert_eq!(run_pipeline(&once, Some(&base())), once);
    }
}
