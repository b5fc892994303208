use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use ego_tree::NodeRef;
use scraper::{Html, Node};
use serde::Serialize;

use crate::filesystem::collect_files;
use crate::normalize::is_page_file_name;

/// Elements with no closing tag.
pub const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];

const INDENT: &str = "  ";

#[derive(Debug, Clone, Serialize)]
pub struct PrettifyReport {
    pub processed_files: usize,
}

/// Re-indent every page file under `site_root` from its best-effort parse
/// tree. Lossy for pathological markup (the tree wins over the bytes), which
/// matches what the mirrored pages can tolerate.
pub fn prettify_tree(site_root: &Path) -> Result<PrettifyReport> {
    let mut processed_files = 0usize;
    for path in collect_files(site_root, is_page_file_name)? {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let pretty = prettify_markup(&content);
        if pretty != content {
            fs::write(&path, pretty)
                .with_context(|| format!("failed to write {}", path.display()))?;
        }
        processed_files += 1;
    }
    Ok(PrettifyReport { processed_files })
}

/// One node per line, two spaces per depth, void elements without closing
/// tags. `<?php ... ?>` spans survive: the parser files them as comments
/// starting with `?`, and those are re-emitted in their original form.
pub fn prettify_markup(content: &str) -> String {
    let document = Html::parse_document(content);
    let mut output = String::with_capacity(content.len());
    for child in document.tree.root().children() {
        render_node(child, 0, &mut output);
    }
    output
}

fn render_node(node: NodeRef<'_, Node>, depth: usize, output: &mut String) {
    match node.value() {
        Node::Document | Node::Fragment => {
            for child in node.children() {
                render_node(child, depth, output);
            }
        }
        Node::Doctype(doctype) => push_line(output, depth, &format!("<!DOCTYPE {}>", doctype.name())),
        Node::Comment(comment) => {
            let text: &str = comment;
            if text.starts_with('?') {
                push_line(output, depth, &format!("<{text}>"));
            } else {
                push_line(output, depth, &format!("<!--{text}-->"));
            }
        }
        Node::Text(text) => {
            let trimmed = text.trim();
            if !trimmed.is_empty() {
                push_line(output, depth, trimmed);
            }
        }
        Node::ProcessingInstruction(instruction) => {
            push_line(
                output,
                depth,
                &format!("<?{} {}?>", &instruction.target, &instruction.data),
            );
        }
        Node::Element(element) => {
            let name = element.name();
            let mut open = format!("<{name}");
            for (attr, value) in element.attrs() {
                open.push_str(&format!(" {attr}=\"{value}\""));
            }
            open.push('>');
            push_line(output, depth, &open);
            if !VOID_ELEMENTS.contains(&name) {
                for child in node.children() {
                    render_node(child, depth + 1, output);
                }
                push_line(output, depth, &format!("</{name}>"));
            }
        }
    }
}

fn push_line(output: &mut String, depth: usize, line: &str) {
    for _ in 0..depth {
        output.push_str(INDENT);
    }
    output.push_str(line);
    output.push('\n');
}

#[cfg(test)]
mod tests {
    use std::fs;

    use tempfile::tempdir;

    use super::{prettify_markup, prettify_tree};

    #[test]
    fn documents_are_reindented_one_node_per_line() {
        let pretty =
            prettify_markup("<html><head><title>Hi</title></head><body><p>Para</p><br></body></html>");
        assert_eq!(
            pretty,
            "<html>\n  <head>\n    <title>\n      Hi\n    </title>\n  </head>\n  <body>\n    <p>\n      Para\n    </p>\n    <br>\n  </body>\n</html>\n"
        );
    }

    #[test]
    fn void_elements_get_no_closing_tag() {
        let pretty = prettify_markup("<body><img src=\"/img/a.png\"><hr></body>");
        assert!(pretty.contains("<img src=\"/img/a.png\">\n"));
        assert!(pretty.contains("<hr>\n"));
        assert!(!pretty.contains("</img>"));
        assert!(!pretty.contains("</hr>"));
    }

    #[test]
    fn doctype_is_preserved() {
        let pretty = prettify_markup("<!DOCTYPE html><html><body></body></html>");
        assert!(pretty.starts_with("<!DOCTYPE html>\n"));
    }

    #[test]
    fn php_spans_survive_prettifying() {
        let pretty = prettify_markup("<html><body><?php include 'includes/header.php'; ?></body></html>");
        assert!(
            pretty.contains("<?php include 'includes/header.php'; ?>\n"),
            "{pretty}"
        );
        assert!(!pretty.contains("<!--?php"));
    }

    #[test]
    fn comments_are_kept_as_comments() {
        let pretty = prettify_markup("<body><!-- keep me --><p>x</p></body>");
        assert!(pretty.contains("<!-- keep me -->\n"));
    }

    #[test]
    fn prettify_tree_touches_every_page_file() {
        let temp = tempdir().expect("tempdir");
        fs::write(temp.path().join("a.php"), "<div><p>one</p></div>").expect("write");
        fs::write(temp.path().join("b.html"), "<div><p>two</p></div>").expect("write");
        fs::write(temp.path().join("notes.txt"), "leave me").expect("write");

        let report = prettify_tree(temp.path()).expect("prettify");
        assert_eq!(report.processed_files, 2);
        let notes = fs::read_to_string(temp.path().join("notes.txt")).expect("read");
        assert_eq!(notes, "leave me");
        let page = fs::read_to_string(temp.path().join("a.php")).expect("read");
        assert!(page.contains("<p>\n"));
    }
}
