use std::path::Path;

use anyhow::{Result, bail};
use serde::Serialize;

use crate::cluster::build_clusters;
use crate::config::{
    DEFAULT_MIN_BLOCK_SIZE, DEFAULT_MIN_OCCURRENCES, DEFAULT_PAGE_EXTENSIONS,
    DEFAULT_SIMILARITY_THRESHOLD,
};
use crate::extract::extract_blocks;
use crate::filesystem::load_pages;
use crate::includes::{IncludeArtifact, materialize_includes};
use crate::rewrite::{ReplacementRecord, apply_includes};

#[derive(Debug, Clone)]
pub struct RefactorOptions {
    pub min_block_size: usize,
    pub similarity_threshold: f64,
    pub min_occurrences: usize,
    pub page_extensions: Vec<String>,
}

impl Default for RefactorOptions {
    fn default() -> Self {
        Self {
            min_block_size: DEFAULT_MIN_BLOCK_SIZE,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            min_occurrences: DEFAULT_MIN_OCCURRENCES,
            page_extensions: DEFAULT_PAGE_EXTENSIONS
                .iter()
                .map(|ext| ext.to_string())
                .collect(),
        }
    }
}

/// Aggregate outcome of one refactoring run.
#[derive(Debug, Clone, Serialize)]
pub struct RefactorReport {
    pub files_scanned: usize,
    pub blocks_extracted: usize,
    pub clusters_retained: usize,
    pub replacements: usize,
    pub artifacts: Vec<IncludeArtifact>,
    pub records: Vec<ReplacementRecord>,
    pub warnings: Vec<String>,
}

/// Run the full pipeline over `site_root`: scan pages, extract candidate
/// blocks, cluster them, materialize one artifact per retained cluster, and
/// rewrite every member occurrence. Extraction and clustering work on the
/// load-time snapshot; rewriting works on the live buffers.
pub fn run_refactor(site_root: &Path, options: &RefactorOptions) -> Result<RefactorReport> {
    if !(0.0..=1.0).contains(&options.similarity_threshold) {
        bail!(
            "similarity threshold must be within [0, 1], got {}",
            options.similarity_threshold
        );
    }
    if options.min_occurrences < 2 {
        bail!(
            "minimum occurrences must be at least 2, got {}",
            options.min_occurrences
        );
    }

    let mut pages = load_pages(site_root, &options.page_extensions)?;

    let mut blocks = Vec::new();
    for (index, page) in pages.iter().enumerate() {
        blocks.extend(extract_blocks(index, &page.content, options.min_block_size));
    }

    let clusters = build_clusters(
        &blocks,
        options.similarity_threshold,
        options.min_occurrences,
    );
    let artifacts = materialize_includes(site_root, &blocks, &clusters)?;
    let outcome = apply_includes(&mut pages, &blocks, &clusters, &artifacts)?;

    Ok(RefactorReport {
        files_scanned: pages.len(),
        blocks_extracted: blocks.len(),
        clusters_retained: clusters.len(),
        replacements: outcome.replacements,
        artifacts,
        records: outcome.records,
        warnings: outcome.warnings,
    })
}
