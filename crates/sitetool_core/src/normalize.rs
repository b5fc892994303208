use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::Serialize;

use crate::attrs::domain_base;
use crate::filesystem::{collect_files, relative_from_root};
use crate::prettify::VOID_ELEMENTS;

/// Extensions of files whose markup the transforms rewrite.
pub const PAGE_FILE_SUFFIXES: &[&str] = &[".html", ".htm", ".php", ".asp"];

const URL_ATTRS: &str = "data-lazyload|data-image-src|data-src|href|src";
const SKIPPED_PREFIXES: &[&str] = &[
    "/",
    "http://",
    "https://",
    "//",
    "#",
    "javascript:",
    "data:",
    "mailto:",
    "tel:",
    "{",
];

// Attribute names are anchored on the preceding whitespace so e.g. a bare
// `href` alternative never matches the tail of `data-href`.
static URL_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(
        r#"(?i)(\s)({URL_ATTRS})\s*=\s*("([^"]*)"|'([^']*)')"#
    ))
    .expect("static pattern")
});
static LEGACY_EXTENSION_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.(asp|php)\.html($|\?|#)").expect("static pattern"));
static VOID_CLOSE_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(&format!(r"(?i)</(?:{})>", VOID_ELEMENTS.join("|"))).expect("static pattern")
});

#[derive(Debug, Clone, Serialize)]
pub struct NormalizeReport {
    pub renamed_files: usize,
    pub updated_files: usize,
}

/// Normalize a mirrored tree: rename `*.asp.html`/`*.php.html` pages to
/// `*.html`, root every relative URL attribute at the site root, strip the
/// configured domain from same-site absolute URLs, update references to the
/// renamed extensions, and drop bogus closing tags on void elements. Only
/// matched attribute values are rewritten; all other bytes stay untouched.
pub fn normalize_tree(site_root: &Path, domain: Option<&str>) -> Result<NormalizeReport> {
    let base = match domain {
        Some(domain) => Some(domain_base(domain)?),
        None => None,
    };

    let mut renamed_files = 0usize;
    let legacy = collect_files(site_root, |name| {
        let lower = name.to_ascii_lowercase();
        lower.ends_with(".asp.html") || lower.ends_with(".php.html")
    })?;
    for path in legacy {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let clean = LEGACY_EXTENSION_RE.replace(&name, ".html$2").to_string();
        let target = path.with_file_name(&clean);
        fs::rename(&path, &target)
            .with_context(|| format!("failed to rename {}", path.display()))?;
        renamed_files += 1;
    }

    let mut updated_files = 0usize;
    let pages = collect_files(site_root, is_page_file_name)?;
    for path in pages {
        let relative = relative_from_root(site_root, &path)?;
        let relative_dir = match relative.rsplit_once('/') {
            Some((dir, _)) => dir.to_string(),
            None => String::new(),
        };
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;

        let rewritten = URL_ATTR_RE.replace_all(&content, |caps: &Captures| {
            let lead = &caps[1];
            let attr = &caps[2];
            let (quote, value) = match caps.get(4) {
                Some(value) => ('"', value.as_str()),
                None => ('\'', caps.get(5).map(|m| m.as_str()).unwrap_or("")),
            };
            match rewrite_url_value(value, &relative_dir, base.as_deref()) {
                Some(new_value) => format!("{lead}{attr}={quote}{new_value}{quote}"),
                None => caps[0].to_string(),
            }
        });
        let cleaned = VOID_CLOSE_RE.replace_all(&rewritten, "").to_string();

        if cleaned != content {
            fs::write(&path, cleaned)
                .with_context(|| format!("failed to write {}", path.display()))?;
            updated_files += 1;
        }
    }

    Ok(NormalizeReport {
        renamed_files,
        updated_files,
    })
}

pub(crate) fn is_page_file_name(name: &str) -> bool {
    let lower = name.to_ascii_lowercase();
    PAGE_FILE_SUFFIXES
        .iter()
        .any(|suffix| lower.ends_with(suffix))
}

/// Rewrite one URL attribute value, or None when it is left alone. Absolute
/// paths, foreign absolute URLs, anchors, and special URIs are preserved;
/// relative paths are rooted at the site root using the owning file's
/// directory; same-domain absolute URLs lose their domain prefix.
fn rewrite_url_value(value: &str, relative_dir: &str, base: Option<&str>) -> Option<String> {
    if value.trim().is_empty() {
        return None;
    }

    let mut new_value = value.to_string();
    if !SKIPPED_PREFIXES
        .iter()
        .any(|prefix| value.starts_with(prefix))
    {
        new_value = root_relative_value(value, relative_dir);
    } else if let Some(base) = base
        && let Some(rest) = value.strip_prefix(base)
    {
        new_value = if rest.starts_with('/') {
            rest.to_string()
        } else {
            format!("/{rest}")
        };
    }

    new_value = LEGACY_EXTENSION_RE
        .replace_all(&new_value, ".html$2")
        .to_string();
    new_value = collapse_duplicate_slashes(&new_value);

    (new_value != value).then_some(new_value)
}

fn root_relative_value(value: &str, relative_dir: &str) -> String {
    let mut up = 0usize;
    let mut rest = value;
    while let Some(stripped) = rest.strip_prefix("../") {
        up += 1;
        rest = stripped;
    }
    if up > 0 {
        let parts: Vec<&str> = if relative_dir.is_empty() {
            Vec::new()
        } else {
            relative_dir.split('/').collect()
        };
        if parts.len() < up {
            return value.to_string();
        }
        let kept = &parts[..parts.len() - up];
        return if kept.is_empty() {
            format!("/{rest}")
        } else {
            format!("/{}/{rest}", kept.join("/"))
        };
    }

    let rest = value.strip_prefix("./").unwrap_or(value);
    if relative_dir.is_empty() {
        format!("/{rest}")
    } else {
        format!("/{relative_dir}/{rest}")
    }
}

fn collapse_duplicate_slashes(value: &str) -> String {
    static MULTI_SLASH_RE: LazyLock<Regex> =
        LazyLock::new(|| Regex::new(r"//+").expect("static pattern"));
    if let Some((scheme, rest)) = value.split_once("://") {
        format!("{scheme}://{}", MULTI_SLASH_RE.replace_all(rest, "/"))
    } else if let Some(rest) = value.strip_prefix("//") {
        // Protocol-relative URLs keep their leading double slash.
        format!("//{}", MULTI_SLASH_RE.replace_all(rest, "/"))
    } else {
        MULTI_SLASH_RE.replace_all(value, "/").to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{normalize_tree, rewrite_url_value};

    #[test]
    fn relative_values_are_rooted_at_the_site() {
        assert_eq!(
            rewrite_url_value("img/pic.png", "docs", None),
            Some("/docs/img/pic.png".to_string())
        );
        assert_eq!(
            rewrite_url_value("./img/pic.png", "docs", None),
            Some("/docs/img/pic.png".to_string())
        );
        assert_eq!(
            rewrite_url_value("img/pic.png", "", None),
            Some("/img/pic.png".to_string())
        );
    }

    #[test]
    fn parent_traversal_climbs_the_owning_directory() {
        assert_eq!(
            rewrite_url_value("../style.css", "docs/deep", None),
            Some("/docs/style.css".to_string())
        );
        assert_eq!(
            rewrite_url_value("../../style.css", "docs/deep", None),
            Some("/style.css".to_string())
        );
        // More parents than directories: left alone.
        assert_eq!(rewrite_url_value("../../x.css", "docs", None), None);
    }

    #[test]
    fn absolute_and_special_values_are_preserved() {
        for value in [
            "/already/rooted.css",
            "https://cdn.example.net/lib.js",
            "//cdn.example.net/lib.js",
            "#section",
            "javascript:void(0)",
            "mailto:info@example.org",
            "tel:+3901234567",
            "{template}",
        ] {
            assert_eq!(rewrite_url_value(value, "docs", None), None, "{value}");
        }
    }

    #[test]
    fn same_domain_absolute_urls_become_site_relative() {
        assert_eq!(
            rewrite_url_value(
                "https://www.example.org/about.html",
                "docs",
                Some("https://www.example.org"),
            ),
            Some("/about.html".to_string())
        );
    }

    #[test]
    fn legacy_extensions_are_rewritten_inside_values() {
        assert_eq!(
            rewrite_url_value("/pages/home.php.html", "", None),
            Some("/pages/home.html".to_string())
        );
        assert_eq!(
            rewrite_url_value("page.asp.html?id=2", "docs", None),
            Some("/docs/page.html?id=2".to_string())
        );
    }

    #[test]
    fn normalize_tree_renames_and_rewrites() {
        let temp = tempdir().expect("tempdir");
        fs::create_dir_all(temp.path().join("docs")).expect("mkdir");
        fs::write(temp.path().join("docs/page.asp.html"), "<p>old</p>").expect("write");
        fs::write(
            temp.path().join("docs/index.html"),
            "<a href=\"page.asp.html\">Page</a><img src=\"img/pic.png\"></br>",
        )
        .expect("write");

        let report = normalize_tree(temp.path(), None).expect("normalize");
        assert_eq!(report.renamed_files, 1);
        assert_eq!(report.updated_files, 1);
        assert!(temp.path().join("docs/page.html").exists());
        assert!(!temp.path().join("docs/page.asp.html").exists());

        let content = fs::read_to_string(temp.path().join("docs/index.html")).expect("read");
        assert_eq!(
            content,
            "<a href=\"/docs/page.html\">Page</a><img src=\"/docs/img/pic.png\">"
        );
    }

    #[test]
    fn domain_prefix_is_stripped_when_configured() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join("index.html"),
            "<a href=\"https://www.example.org/contact.html\">Contact</a>",
        )
        .expect("write");

        let report =
            normalize_tree(temp.path(), Some("https://www.example.org")).expect("normalize");
        assert_eq!(report.updated_files, 1);
        let content = fs::read_to_string(temp.path().join("index.html")).expect("read");
        assert_eq!(content, "<a href=\"/contact.html\">Contact</a>");
    }
}
