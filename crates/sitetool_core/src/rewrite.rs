use std::collections::BTreeMap;
use std::iter;
use std::ops::Range;
use std::sync::LazyLock;

use anyhow::Result;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;

use crate::cluster::BlockCluster;
use crate::extract::{BlockKind, CandidateBlock};
use crate::filesystem::{PageFile, write_page_content};
use crate::includes::{IncludeArtifact, include_statement};
use crate::similarity::similarity_ratio;

const STRUCTURAL_MATCH_THRESHOLD: f64 = 0.8;
const LINK_SET_OVERLAP: f64 = 0.7;
const MIN_MENU_LINKS: usize = 3;
const NAV_FILE_SIZE_CEILING: usize = 5000;
const NAV_FILE_HINT: &str = "navigation";

static LINK_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<link[^>]+>").expect("static pattern"));
static META_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"<meta[^>]+>").expect("static pattern"));
static MENU_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(nav|menu)").expect("static pattern"));

static ANY_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("*"));
static ANCHOR_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("a"));
static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("script"));
static MENU_CONTAINER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("nav, div, ul"));
static NAV_UL_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("nav, ul"));

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

/// One strategy in the fallback chain used to locate an occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReplacementTier {
    Exact,
    LinkPattern,
    StructuralFingerprint,
    AttributeMatch,
    FuzzyWhitespace,
    LinkSet,
    NavigationFile,
}

impl ReplacementTier {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::LinkPattern => "link-pattern",
            Self::StructuralFingerprint => "structural-fingerprint",
            Self::AttributeMatch => "attribute-match",
            Self::FuzzyWhitespace => "fuzzy-whitespace",
            Self::LinkSet => "link-set",
            Self::NavigationFile => "navigation-file",
        }
    }
}

/// Per-occurrence outcome; `tier: None` means no tier matched and the
/// occurrence was left unmodified.
#[derive(Debug, Clone, Serialize)]
pub struct ReplacementRecord {
    pub cluster_id: String,
    pub relative_path: String,
    pub tier: Option<ReplacementTier>,
}

#[derive(Debug, Clone, Default)]
pub struct RewriteOutcome {
    pub replacements: usize,
    pub records: Vec<ReplacementRecord>,
    pub warnings: Vec<String>,
}

/// A tier locates an occurrence in the page's current text and returns the
/// byte span to replace, or None to fall through to the next tier.
type TierFn = fn(&CandidateBlock, &str, &str) -> Option<Range<usize>>;

const TIERS: &[(ReplacementTier, TierFn)] = &[
    (ReplacementTier::Exact, tier_exact),
    (ReplacementTier::LinkPattern, tier_link_pattern),
    (ReplacementTier::StructuralFingerprint, tier_structural_fingerprint),
    (ReplacementTier::AttributeMatch, tier_attribute_match),
    (ReplacementTier::FuzzyWhitespace, tier_fuzzy_whitespace),
    (ReplacementTier::LinkSet, tier_link_set),
    (ReplacementTier::NavigationFile, tier_navigation_file),
];

/// Replace every member occurrence of every retained cluster with the
/// reference statement for its artifact. Pages mutate in place and every
/// successful replacement is written to disk immediately, so later
/// occurrences always match against the latest content. Iteration order is
/// fixed: clusters in formation order, members in cluster order.
pub fn apply_includes(
    pages: &mut [PageFile],
    blocks: &[CandidateBlock],
    clusters: &[BlockCluster],
    artifacts: &[IncludeArtifact],
) -> Result<RewriteOutcome> {
    let mut outcome = RewriteOutcome::default();

    for (cluster, artifact) in clusters.iter().zip(artifacts.iter()) {
        let statement = include_statement(&artifact.relative_path);
        for &member in &cluster.members {
            let block = &blocks[member];
            let page = &mut pages[block.page];
            let located = locate_occurrence(block, &page.file_name(), &page.content);
            match located {
                Some((tier, span)) => {
                    page.content.replace_range(span, &statement);
                    write_page_content(&page.path, &page.content)?;
                    outcome.replacements += 1;
                    outcome.records.push(ReplacementRecord {
                        cluster_id: cluster.id.clone(),
                        relative_path: page.relative_path.clone(),
                        tier: Some(tier),
                    });
                }
                None => {
                    outcome.warnings.push(format!(
                        "could not locate {} block of cluster {} in {}",
                        block.kind.as_str(),
                        cluster.id,
                        page.relative_path
                    ));
                    outcome.records.push(ReplacementRecord {
                        cluster_id: cluster.id.clone(),
                        relative_path: page.relative_path.clone(),
                        tier: None,
                    });
                }
            }
        }
    }

    Ok(outcome)
}

fn locate_occurrence(
    block: &CandidateBlock,
    file_name: &str,
    text: &str,
) -> Option<(ReplacementTier, Range<usize>)> {
    for (tier, locate) in TIERS {
        if let Some(span) = locate(block, file_name, text) {
            return Some((*tier, span));
        }
    }
    None
}

/// Tier 1: verbatim substring, first occurrence.
fn tier_exact(block: &CandidateBlock, _file_name: &str, text: &str) -> Option<Range<usize>> {
    text.find(&block.content)
        .map(|start| start..start + block.content.len())
}

/// Tier 2: the block's constituent `<link>` tags joined by flexible
/// whitespace.
fn tier_link_pattern(block: &CandidateBlock, _file_name: &str, text: &str) -> Option<Range<usize>> {
    if !matches!(block.kind, BlockKind::CssLinkGroup | BlockKind::LinkGroup) {
        return None;
    }
    let tags: Vec<&str> = LINK_TAG_RE
        .find_iter(&block.content)
        .map(|found| found.as_str())
        .collect();
    if tags.is_empty() {
        return None;
    }
    find_spaced_tag_sequence(&tags, text)
}

/// Tier 3: structural fingerprint (link targets + classes + ids) scored
/// against every same-tag element of the re-parsed file.
fn tier_structural_fingerprint(
    block: &CandidateBlock,
    _file_name: &str,
    text: &str,
) -> Option<Range<usize>> {
    if !matches!(
        block.kind,
        BlockKind::Navigation | BlockKind::Header | BlockKind::Footer
    ) {
        return None;
    }
    let fragment = Html::parse_fragment(&block.content);
    let root = first_element(&fragment)?;
    let target = element_fingerprint(&root);
    let tag_selector = Selector::parse(root.value().name()).ok()?;

    let document = Html::parse_document(text);
    let mut best_score = 0.0f64;
    let mut best_html: Option<String> = None;
    for candidate in document.select(&tag_selector) {
        let score = similarity_ratio(&target, &element_fingerprint(&candidate));
        if score > best_score || best_html.is_none() {
            best_score = score;
            best_html = Some(candidate.html());
        }
    }
    let serialized = best_html?;
    if best_score < STRUCTURAL_MATCH_THRESHOLD {
        return None;
    }
    text.find(&serialized)
        .map(|start| start..start + serialized.len())
}

/// Tier 4: script elements matched by exact attribute set; meta groups by a
/// whitespace-tolerant pattern over their constituent tags.
fn tier_attribute_match(
    block: &CandidateBlock,
    _file_name: &str,
    text: &str,
) -> Option<Range<usize>> {
    match block.kind {
        BlockKind::Script => {
            let fragment = Html::parse_fragment(&block.content);
            let script = fragment.select(&SCRIPT_SELECTOR).next()?;
            let wanted: BTreeMap<&str, &str> = script.value().attrs().collect();
            let document = Html::parse_document(text);
            for candidate in document.select(&SCRIPT_SELECTOR) {
                let attrs: BTreeMap<&str, &str> = candidate.value().attrs().collect();
                if attrs != wanted {
                    continue;
                }
                let serialized = candidate.html();
                if let Some(start) = text.find(&serialized) {
                    return Some(start..start + serialized.len());
                }
            }
            None
        }
        BlockKind::MetaTagGroup => {
            let tags: Vec<&str> = META_TAG_RE
                .find_iter(&block.content)
                .map(|found| found.as_str())
                .collect();
            if tags.is_empty() {
                return None;
            }
            find_spaced_tag_sequence(&tags, text)
        }
        _ => None,
    }
}

/// Tier 5: whitespace-normalized fuzzy scan. The normalized hit position is
/// mapped back through a normalized-byte -> original-byte index map and the
/// candidate span must re-normalize to an exact match. A navigation block
/// whose owning file is itself a small navigation fragment replaces the
/// whole file instead.
fn tier_fuzzy_whitespace(
    block: &CandidateBlock,
    file_name: &str,
    text: &str,
) -> Option<Range<usize>> {
    let normalized_block = collapse_whitespace(&block.content);
    if normalized_block.is_empty() {
        return None;
    }
    let (normalized_text, index_map) = normalize_with_map(text);
    let position = normalized_text.find(&normalized_block)?;

    if block.kind == BlockKind::Navigation
        && file_name.contains(NAV_FILE_HINT)
        && text.len() * 2 <= block.content.len() * 3
    {
        return Some(0..text.len());
    }

    let start = index_map[position];
    let last = index_map[position + normalized_block.len() - 1];
    let end = last + text[last..].chars().next()?.len_utf8();
    let candidate = text.get(start..end)?;
    (collapse_whitespace(candidate) == normalized_block).then_some(start..end)
}

/// Tier 6: link-set containment for navigation blocks with enough menu
/// entries to be distinctive.
fn tier_link_set(block: &CandidateBlock, _file_name: &str, text: &str) -> Option<Range<usize>> {
    if block.kind != BlockKind::Navigation {
        return None;
    }
    let fragment = Html::parse_fragment(&block.content);
    let items = menu_links(&first_element(&fragment)?);
    if items.len() < MIN_MENU_LINKS {
        return None;
    }

    let document = Html::parse_document(text);
    let mut candidates: Vec<ElementRef> = document
        .select(&MENU_CONTAINER_SELECTOR)
        .filter(|element| {
            element
                .value()
                .attr("class")
                .is_some_and(|class| MENU_CLASS_RE.is_match(class))
        })
        .collect();
    if candidates.is_empty() {
        candidates = document.select(&NAV_UL_SELECTOR).collect();
    }

    for candidate in candidates {
        let links = menu_links(&candidate);
        let matched = items.iter().filter(|item| links.contains(item)).count();
        let ratio = matched as f64 / items.len() as f64;
        if ratio < LINK_SET_OVERLAP {
            continue;
        }
        let serialized = candidate.html();
        if let Some(start) = text.find(&serialized) {
            return Some(start..start + serialized.len());
        }
    }
    None
}

/// Tier 7: final fallback for files that are themselves navigation
/// fragments.
fn tier_navigation_file(
    block: &CandidateBlock,
    file_name: &str,
    text: &str,
) -> Option<Range<usize>> {
    if block.kind != BlockKind::Navigation {
        return None;
    }
    (file_name.contains(NAV_FILE_HINT) && text.len() < NAV_FILE_SIZE_CEILING)
        .then_some(0..text.len())
}

fn find_spaced_tag_sequence(tags: &[&str], text: &str) -> Option<Range<usize>> {
    let pattern = tags
        .iter()
        .map(|tag| regex::escape(tag))
        .collect::<Vec<_>>()
        .join(r"\s*");
    let re = Regex::new(&format!("(?s){pattern}")).ok()?;
    re.find(text).map(|found| found.range())
}

fn first_element(fragment: &Html) -> Option<ElementRef<'_>> {
    fragment
        .root_element()
        .children()
        .find_map(ElementRef::wrap)
}

/// Sorted `|`-joined anchor hrefs, class names, and ids of an element and
/// all its descendants.
fn element_fingerprint(element: &ElementRef) -> String {
    let mut parts: Vec<String> = Vec::new();
    for node in iter::once(*element).chain(element.select(&ANY_SELECTOR)) {
        let value = node.value();
        if value.name() == "a" {
            parts.push(value.attr("href").unwrap_or("").to_string());
        }
        for class in value.classes() {
            parts.push(class.to_string());
        }
        if let Some(id) = value.id() {
            parts.push(id.to_string());
        }
    }
    parts.sort();
    parts.join("|")
}

/// (href, visible label) pairs for every anchor under `element`.
fn menu_links(element: &ElementRef) -> Vec<(String, String)> {
    iter::once(*element)
        .chain(element.select(&ANY_SELECTOR))
        .filter(|node| node.value().name() == "a")
        .map(|anchor| {
            (
                anchor.value().attr("href").unwrap_or("").to_string(),
                anchor.text().collect::<String>().trim().to_string(),
            )
        })
        .collect()
}

pub(crate) fn collapse_whitespace(text: &str) -> String {
    let mut output = String::with_capacity(text.len());
    let mut in_whitespace = false;
    for ch in text.chars() {
        if ch.is_whitespace() {
            if !in_whitespace {
                output.push(' ');
                in_whitespace = true;
            }
        } else {
            in_whitespace = false;
            output.push(ch);
        }
    }
    output
}

/// Whitespace-collapsed copy of `text` plus, per normalized byte, the byte
/// offset of the owning character in the original.
fn normalize_with_map(text: &str) -> (String, Vec<usize>) {
    let mut normalized = String::with_capacity(text.len());
    let mut map = Vec::with_capacity(text.len());
    let mut in_whitespace = false;
    for (offset, ch) in text.char_indices() {
        if ch.is_whitespace() {
            if !in_whitespace {
                normalized.push(' ');
                map.push(offset);
                in_whitespace = true;
            }
        } else {
            in_whitespace = false;
            normalized.push(ch);
            for _ in 0..ch.len_utf8() {
                map.push(offset);
            }
        }
    }
    (normalized, map)
}
