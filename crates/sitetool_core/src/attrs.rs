use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow};
use regex::{Captures, Regex};
use serde::Serialize;
use url::Url;

use crate::filesystem::collect_files;
use crate::normalize::is_page_file_name;

static PAGE_SUFFIX_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)\.((asp|php)\.)?html$").expect("static pattern"));

#[derive(Debug, Clone, Serialize)]
pub struct AttrScanReport {
    pub inspected_files: usize,
    pub updated_files: usize,
    /// Absolute URLs of every resource discovered in the scanned attributes,
    /// sorted and deduplicated. Fetching them is the caller's business.
    pub discovered_urls: Vec<String>,
}

/// Scan the configured lazy-loading attributes of every page file for values
/// that look like URLs. Each discovery is reported in absolute form; values
/// that are same-domain absolute URLs are rewritten to site-relative paths
/// in place.
pub fn scan_resource_attrs(
    site_root: &Path,
    domain: &str,
    attr_names: &[String],
) -> Result<AttrScanReport> {
    let domain_url =
        Url::parse(domain).with_context(|| format!("invalid domain: {domain}"))?;
    let base = domain_base(domain)?;
    let attr_re = attr_pattern(attr_names)?;

    let mut discovered: BTreeSet<String> = BTreeSet::new();
    let mut inspected_files = 0usize;
    let mut updated_files = 0usize;

    for path in collect_files(site_root, is_page_file_name)? {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        inspected_files += 1;

        let rewritten = attr_re.replace_all(&content, |caps: &Captures| {
            let lead = &caps[1];
            let attr = &caps[2];
            let (quote, value) = match caps.get(4) {
                Some(value) => ('"', value.as_str()),
                None => ('\'', caps.get(5).map(|m| m.as_str()).unwrap_or("")),
            };
            if !is_probably_url(value) {
                return caps[0].to_string();
            }
            if let Ok(absolute) = domain_url.join(value) {
                discovered.insert(absolute.to_string());
            }
            match site_relative_value(value, &base) {
                Some(relative) => format!("{lead}{attr}={quote}{relative}{quote}"),
                None => caps[0].to_string(),
            }
        });

        if rewritten != content {
            fs::write(&path, rewritten.as_ref())
                .with_context(|| format!("failed to write {}", path.display()))?;
            updated_files += 1;
        }
    }

    Ok(AttrScanReport {
        inspected_files,
        updated_files,
        discovered_urls: discovered.into_iter().collect(),
    })
}

/// Whether a raw attribute value plausibly references a resource: absolute
/// URLs, anything rooted or path-like, and page-file names.
pub fn is_probably_url(value: &str) -> bool {
    if value.is_empty() || value.contains(' ') {
        return false;
    }
    if Url::parse(value).is_ok() {
        return true;
    }
    if ["//", "http://", "https://", "/", "./", "../"]
        .iter()
        .any(|prefix| value.starts_with(prefix))
    {
        return true;
    }
    if value.contains('/') {
        return true;
    }
    PAGE_SUFFIX_RE.is_match(value)
}

/// `scheme://host[:port]` of a configured domain.
pub(crate) fn domain_base(domain: &str) -> Result<String> {
    let url = Url::parse(domain).with_context(|| format!("invalid domain: {domain}"))?;
    let host = url
        .host_str()
        .ok_or_else(|| anyhow!("domain has no host: {domain}"))?;
    Ok(match url.port() {
        Some(port) => format!("{}://{host}:{port}", url.scheme()),
        None => format!("{}://{host}", url.scheme()),
    })
}

fn site_relative_value(value: &str, base: &str) -> Option<String> {
    if !value.starts_with(base) {
        return None;
    }
    let parsed = Url::parse(value).ok()?;
    let mut relative = parsed.path().to_string();
    if let Some(query) = parsed.query() {
        relative.push('?');
        relative.push_str(query);
    }
    if let Some(fragment) = parsed.fragment() {
        relative.push('#');
        relative.push_str(fragment);
    }
    Some(relative)
}

fn attr_pattern(attr_names: &[String]) -> Result<Regex> {
    let mut names: Vec<String> = attr_names
        .iter()
        .map(|name| regex::escape(name.trim()))
        .filter(|name| !name.is_empty())
        .collect();
    if names.is_empty() {
        anyhow::bail!("no attribute names to scan");
    }
    // Longest first so e.g. data-image-src is never shadowed by data-src;
    // anchored on the preceding whitespace so a configured `src` never
    // matches the tail of `data-src`.
    names.sort_by(|left, right| right.len().cmp(&left.len()).then(left.cmp(right)));
    let pattern = format!(
        r#"(?i)(\s)({})\s*=\s*("([^"]*)"|'([^']*)')"#,
        names.join("|")
    );
    Regex::new(&pattern).context("failed to build attribute pattern")
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{domain_base, is_probably_url, scan_resource_attrs};

    #[test]
    fn url_like_values_are_recognized() {
        for value in [
            "https://www.example.org/img.png",
            "//cdn.example.net/lib.js",
            "/img/banner.jpg",
            "./thumb.jpg",
            "../shared/bg.png",
            "img/photo.jpg",
            "page.html",
            "page.asp.html",
            "mailto:info@example.org",
        ] {
            assert!(is_probably_url(value), "{value}");
        }
    }

    #[test]
    fn plain_text_values_are_not_urls() {
        for value in ["", "hero image", "banner", "42"] {
            assert!(!is_probably_url(value), "{value:?}");
        }
    }

    #[test]
    fn domain_base_keeps_scheme_host_and_port() {
        assert_eq!(
            domain_base("https://www.example.org/some/path").expect("base"),
            "https://www.example.org"
        );
        assert_eq!(
            domain_base("http://localhost:8080").expect("base"),
            "http://localhost:8080"
        );
        assert!(domain_base("not a domain").is_err());
    }

    #[test]
    fn scan_reports_absolute_urls_and_rewrites_same_domain_values() {
        let temp = tempdir().expect("tempdir");
        fs::write(
            temp.path().join("index.html"),
            "<img data-src=\"img/hero.jpg\" alt=\"hero\">\
             <div data-image-src=\"https://www.example.org/img/bg.png?v=2\"></div>\
             <span data-src=\"just a caption\"></span>",
        )
        .expect("write");

        let report = scan_resource_attrs(
            temp.path(),
            "https://www.example.org",
            &["data-src".to_string(), "data-image-src".to_string()],
        )
        .expect("scan");

        assert_eq!(report.inspected_files, 1);
        assert_eq!(report.updated_files, 1);
        assert_eq!(
            report.discovered_urls,
            vec![
                "https://www.example.org/img/bg.png?v=2".to_string(),
                "https://www.example.org/img/hero.jpg".to_string(),
            ]
        );

        let content = fs::read_to_string(temp.path().join("index.html")).expect("read");
        assert!(content.contains("data-image-src=\"/img/bg.png?v=2\""));
        assert!(content.contains("data-src=\"img/hero.jpg\""));
        assert!(content.contains("just a caption"));
    }

    #[test]
    fn scan_requires_at_least_one_attribute() {
        let temp = tempdir().expect("tempdir");
        let result = scan_resource_attrs(temp.path(), "https://www.example.org", &[]);
        assert!(result.is_err());
    }
}
