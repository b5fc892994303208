use std::collections::BTreeSet;
use std::fs;
use std::path::Path;
use std::sync::LazyLock;

use anyhow::{Context, Result};
use regex::{Captures, Regex};
use serde::Serialize;

use crate::filesystem::collect_files;

// Anchored on the preceding whitespace so `href` never matches inside
// `data-href`.
static REFERENCE_ATTR_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)(\s)(data-src|data-href|href|src)\s*=\s*("([^"]*)"|'([^']*)')"#)
        .expect("static pattern")
});

#[derive(Debug, Clone, Serialize)]
pub struct RenameReport {
    pub renamed_files: usize,
    pub updated_files: usize,
}

/// Rename every `.html` page to `.php` and update all references to renamed
/// files across the tree. References are updated first so no link ever
/// points at a name that no longer exists.
pub fn rename_html_to_php(site_root: &Path) -> Result<RenameReport> {
    let html_files: BTreeSet<String> = collect_files(site_root, |name| name.ends_with(".html"))?
        .iter()
        .filter_map(|path| path.file_name().and_then(|name| name.to_str()))
        .map(ToString::to_string)
        .collect();

    let mut updated_files = 0usize;
    let referencing = collect_files(site_root, |name| {
        name.ends_with(".html") || name.ends_with(".php")
    })?;
    for path in referencing {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let updated = REFERENCE_ATTR_RE.replace_all(&content, |caps: &Captures| {
            let lead = &caps[1];
            let attr = &caps[2];
            let (quote, value) = match caps.get(4) {
                Some(value) => ('"', value.as_str()),
                None => ('\'', caps.get(5).map(|m| m.as_str()).unwrap_or("")),
            };
            match rewrite_reference(value, &html_files) {
                Some(new_value) => format!("{lead}{attr}={quote}{new_value}{quote}"),
                None => caps[0].to_string(),
            }
        });
        if updated != content {
            fs::write(&path, updated.as_ref())
                .with_context(|| format!("failed to write {}", path.display()))?;
            updated_files += 1;
        }
    }

    let mut renamed_files = 0usize;
    for path in collect_files(site_root, |name| name.ends_with(".html"))? {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default();
        let renamed = format!("{}.php", &name[..name.len() - ".html".len()]);
        let target = path.with_file_name(renamed);
        fs::rename(&path, &target)
            .with_context(|| format!("failed to rename {}", path.display()))?;
        renamed_files += 1;
    }

    Ok(RenameReport {
        renamed_files,
        updated_files,
    })
}

/// Replace the referenced file name inside `value` when it names a local
/// `.html` page; query strings and fragments are ignored for the lookup but
/// preserved in the value.
fn rewrite_reference(value: &str, html_files: &BTreeSet<String>) -> Option<String> {
    let path_part = value.split(['?', '#']).next().unwrap_or(value);
    let file_name = path_part.rsplit('/').next().unwrap_or(path_part);
    if file_name.is_empty() || !html_files.contains(file_name) {
        return None;
    }
    let renamed = format!("{}.php", &file_name[..file_name.len() - ".html".len()]);
    Some(value.replace(file_name, &renamed))
}
