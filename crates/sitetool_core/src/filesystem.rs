use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Serialize;
use sha2::{Digest, Sha256};
use walkdir::WalkDir;

/// One page file loaded for a run. `content` is the live buffer: the rewrite
/// engine mutates it and mirrors every mutation to disk immediately.
#[derive(Debug, Clone)]
pub struct PageFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub content: String,
}

impl PageFile {
    /// Lowercased final path segment, used by the filename-based rewrite tiers.
    pub fn file_name(&self) -> String {
        self.relative_path
            .rsplit('/')
            .next()
            .unwrap_or(&self.relative_path)
            .to_ascii_lowercase()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ScanStats {
    pub total_files: usize,
    pub total_bytes: u64,
    pub by_extension: BTreeMap<String, usize>,
}

/// Load every page file under `site_root` whose extension is in `extensions`,
/// sorted by relative path. The sort fixes the processing order for the whole
/// run; extraction, clustering, and rewriting all inherit it.
pub fn load_pages(site_root: &Path, extensions: &[String]) -> Result<Vec<PageFile>> {
    let mut pages = Vec::new();
    for entry in WalkDir::new(site_root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", site_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if !has_extension(path, extensions) {
            continue;
        }
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        pages.push(PageFile {
            path: path.to_path_buf(),
            relative_path: relative_from_root(site_root, path)?,
            content,
        });
    }
    pages.sort_by(|left, right| left.relative_path.cmp(&right.relative_path));
    Ok(pages)
}

/// Collect the relative paths of files under `site_root` matching a predicate
/// on the file name, sorted. Used by the rename-style transforms.
pub fn collect_files<F>(site_root: &Path, matches: F) -> Result<Vec<PathBuf>>
where
    F: Fn(&str) -> bool,
{
    let mut files = Vec::new();
    for entry in WalkDir::new(site_root).follow_links(false) {
        let entry = entry.with_context(|| format!("failed to walk {}", site_root.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy().to_string();
        if matches(&name) {
            files.push(entry.path().to_path_buf());
        }
    }
    files.sort();
    Ok(files)
}

pub fn scan_stats(site_root: &Path, extensions: &[String]) -> Result<ScanStats> {
    let pages = load_pages(site_root, extensions)?;
    let mut by_extension: BTreeMap<String, usize> = BTreeMap::new();
    let mut total_bytes = 0u64;
    for page in &pages {
        let extension = Path::new(&page.relative_path)
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("")
            .to_string();
        *by_extension.entry(extension).or_insert(0) += 1;
        total_bytes += page.content.len() as u64;
    }
    Ok(ScanStats {
        total_files: pages.len(),
        total_bytes,
        by_extension,
    })
}

pub fn write_page_content(path: &Path, content: &str) -> Result<()> {
    fs::write(path, content).with_context(|| format!("failed to write {}", path.display()))
}

/// Lowercase hex SHA-256 of `text`.
pub fn content_fingerprint(text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(text.as_bytes());
    let digest = hasher.finalize();
    let mut output = String::with_capacity(digest.len() * 2);
    for byte in digest {
        output.push_str(&format!("{byte:02x}"));
    }
    output
}

pub fn relative_from_root(site_root: &Path, path: &Path) -> Result<String> {
    let relative = path
        .strip_prefix(site_root)
        .with_context(|| format!("path escapes site root: {}", path.display()))?;
    Ok(relative.to_string_lossy().replace('\\', "/"))
}

fn has_extension(path: &Path, extensions: &[String]) -> bool {
    let name = path.file_name().and_then(|name| name.to_str()).unwrap_or("");
    extensions
        .iter()
        .any(|ext| name.ends_with(&format!(".{ext}")))
}
