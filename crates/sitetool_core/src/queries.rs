use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;

use crate::filesystem::collect_files;

#[derive(Debug, Clone, Serialize)]
pub struct QueryFixReport {
    pub renamed_files: usize,
    pub deleted_files: usize,
    pub updated_files: usize,
}

/// Clean up files whose names carry a `@`-encoded query-string suffix
/// (`page@id=3.html` -> `page.html`). When the clean name already exists the
/// suffixed file is deleted instead of renamed; every reference in page and
/// stylesheet files is updated to keep links intact.
pub fn fix_query_strings(site_root: &Path) -> Result<QueryFixReport> {
    let mut mapping: BTreeMap<String, String> = BTreeMap::new();
    let mut renamed_files = 0usize;
    let mut deleted_files = 0usize;

    for path in collect_files(site_root, |name| name.contains('@'))? {
        let name = path
            .file_name()
            .and_then(|name| name.to_str())
            .unwrap_or_default()
            .to_string();
        let clean = name
            .split('@')
            .next()
            .unwrap_or(name.as_str())
            .to_string();
        let target = path.with_file_name(&clean);
        if target.exists() {
            fs::remove_file(&path)
                .with_context(|| format!("failed to remove {}", path.display()))?;
            deleted_files += 1;
        } else {
            fs::rename(&path, &target)
                .with_context(|| format!("failed to rename {}", path.display()))?;
            renamed_files += 1;
        }
        mapping.insert(name, clean);
    }

    let mut updated_files = 0usize;
    if !mapping.is_empty() {
        let referencing = collect_files(site_root, |name| {
            let lower = name.to_ascii_lowercase();
            lower.ends_with(".html") || lower.ends_with(".css")
        })?;
        for path in referencing {
            let content = fs::read_to_string(&path)
                .with_context(|| format!("failed to read {}", path.display()))?;
            let mut updated = content.clone();
            for (old_name, new_name) in &mapping {
                updated = updated.replace(old_name, new_name);
            }
            if updated != content {
                fs::write(&path, updated)
                    .with_context(|| format!("failed to write {}", path.display()))?;
                updated_files += 1;
            }
        }
    }

    Ok(QueryFixReport {
        renamed_files,
        deleted_files,
        updated_files,
    })
}
