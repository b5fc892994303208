use std::sync::LazyLock;

use regex::Regex;
use scraper::{ElementRef, Html, Selector};

use crate::filesystem::content_fingerprint;

/// Block type tags, named after what the duplicated fragment is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Script,
    Navigation,
    Header,
    Footer,
    CssLinkGroup,
    LinkGroup,
    MetaTagGroup,
    PhpCode,
}

impl BlockKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Script => "script",
            Self::Navigation => "navigation",
            Self::Header => "header",
            Self::Footer => "footer",
            Self::CssLinkGroup => "css_links",
            Self::LinkGroup => "link_group",
            Self::MetaTagGroup => "meta_tags",
            Self::PhpCode => "php_code",
        }
    }
}

/// A typed span of text extracted from one page as a potential duplication
/// target. Immutable once created; `page` indexes the run's page list.
#[derive(Debug, Clone)]
pub struct CandidateBlock {
    pub kind: BlockKind,
    pub content: String,
    pub fingerprint: String,
    pub page: usize,
}

static SCRIPT_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("script"));
static NAV_DIV_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("nav, div"));
static HEADER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("header"));
static FOOTER_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("footer"));
static HEAD_SELECTOR: LazyLock<Selector> = LazyLock::new(|| selector("head"));

static NAV_CLASS_RE: LazyLock<Regex> =
    LazyLock::new(|| regex(r"(?i)(nav|menu|header|footer)"));
/// Stylesheet sequences known to repeat verbatim across mirrored pages,
/// matched on raw text so broken markup around them doesn't matter.
const KNOWN_STYLESHEET_SEQUENCES: &[&str] = &[
    r#"(?s)<link\s+href="/css/style\.css"[^>]*>\s*<link\s+href="/css/responsive\.css"[^>]*>\s*<link\s+href="/css/fotorama\.dev\.css"[^>]*>\s*<link\s+href="/images/favicon\.ico"[^>]*>"#,
];
static KNOWN_STYLESHEET_RES: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    KNOWN_STYLESHEET_SEQUENCES
        .iter()
        .map(|pattern| regex(pattern))
        .collect()
});
static LINK_RUN_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?s)(<link[^>]+>\s*){3,}"));
static PHP_BLOCK_RE: LazyLock<Regex> = LazyLock::new(|| regex(r"(?s)<\?php\s+(.+?)\s+\?>"));

fn selector(css: &'static str) -> Selector {
    Selector::parse(css).expect("static selector")
}

fn regex(pattern: &str) -> Regex {
    Regex::new(pattern).expect("static pattern")
}

/// Extract every candidate block from one page's content. All sources are
/// attempted independently; a page can contribute blocks from several of
/// them, possibly overlapping. Order is deterministic: structural scan in
/// document order, then head groups, then raw-text patterns, then code
/// blocks.
pub fn extract_blocks(page: usize, content: &str, min_block_size: usize) -> Vec<CandidateBlock> {
    let mut blocks = Vec::new();

    let document = Html::parse_document(content);

    for script in document.select(&SCRIPT_SELECTOR) {
        push_block(&mut blocks, BlockKind::Script, script.html(), page, min_block_size);
    }

    for element in document.select(&NAV_DIV_SELECTOR) {
        if element
            .value()
            .attr("class")
            .is_some_and(|class| NAV_CLASS_RE.is_match(class))
        {
            push_block(
                &mut blocks,
                BlockKind::Navigation,
                element.html(),
                page,
                min_block_size,
            );
        }
    }

    if let Some(header) = document.select(&HEADER_SELECTOR).next() {
        push_block(&mut blocks, BlockKind::Header, header.html(), page, min_block_size);
    }
    if let Some(footer) = document.select(&FOOTER_SELECTOR).next() {
        push_block(&mut blocks, BlockKind::Footer, footer.html(), page, min_block_size);
    }

    if let Some(head) = document.select(&HEAD_SELECTOR).next() {
        for run in adjacent_runs(&head, |element| {
            element.value().name() == "link" && is_stylesheet_or_icon(element)
        }) {
            push_block(&mut blocks, BlockKind::CssLinkGroup, run, page, min_block_size);
        }
        for run in adjacent_runs(&head, |element| element.value().name() == "meta") {
            push_block(&mut blocks, BlockKind::MetaTagGroup, run, page, min_block_size);
        }
    }

    for pattern in KNOWN_STYLESHEET_RES.iter() {
        for found in pattern.find_iter(content) {
            push_block(
                &mut blocks,
                BlockKind::CssLinkGroup,
                found.as_str().to_string(),
                page,
                min_block_size,
            );
        }
    }
    for found in LINK_RUN_RE.find_iter(content) {
        push_block(
            &mut blocks,
            BlockKind::LinkGroup,
            found.as_str().to_string(),
            page,
            min_block_size,
        );
    }

    for captures in PHP_BLOCK_RE.captures_iter(content) {
        if let Some(code) = captures.get(1)
            && code.as_str().chars().count() >= min_block_size
        {
            let wrapped = format!("<?php {} ?>", code.as_str());
            let fingerprint = content_fingerprint(&wrapped);
            blocks.push(CandidateBlock {
                kind: BlockKind::PhpCode,
                content: wrapped,
                fingerprint,
                page,
            });
        }
    }

    blocks
}

fn push_block(
    blocks: &mut Vec<CandidateBlock>,
    kind: BlockKind,
    content: String,
    page: usize,
    min_block_size: usize,
) {
    if content.chars().count() < min_block_size {
        return;
    }
    let fingerprint = content_fingerprint(&content);
    blocks.push(CandidateBlock {
        kind,
        content,
        fingerprint,
        page,
    });
}

/// Runs of two or more qualifying sibling elements under `parent`, with only
/// whitespace text between them. Any other node breaks the run.
fn adjacent_runs<F>(parent: &ElementRef, qualifies: F) -> Vec<String>
where
    F: Fn(&ElementRef) -> bool,
{
    let mut runs = Vec::new();
    let mut group: Vec<String> = Vec::new();
    for node in parent.children() {
        if let Some(text) = node.value().as_text() {
            if text.trim().is_empty() {
                continue;
            }
            close_run(&mut group, &mut runs);
            continue;
        }
        match ElementRef::wrap(node) {
            Some(element) if qualifies(&element) => group.push(element.html()),
            _ => close_run(&mut group, &mut runs),
        }
    }
    close_run(&mut group, &mut runs);
    runs
}

fn close_run(group: &mut Vec<String>, runs: &mut Vec<String>) {
    if group.len() >= 2 {
        runs.push(group.concat());
    }
    group.clear();
}

fn is_stylesheet_or_icon(element: &ElementRef) -> bool {
    let value = element.value();
    if value.attr("rel") == Some("stylesheet") {
        return true;
    }
    if value.attr("type") == Some("image/x-icon") {
        return true;
    }
    value
        .attr("href")
        .is_some_and(|href| href.contains(".css") || href.contains("favicon"))
}
