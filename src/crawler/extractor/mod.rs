
use scraper::{Html, Node};
use tracing::debug;

/// Elements whose text is never part of the readable page
const SKIPPED_ELEMENTS: [&str; 9] = [
    "script", "style", "noscript", "template", "iframe", "nav", "header", "footer", "svg",
];

/// Readable content of an HTML page
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedPage {
    pub title: Option<String>,
    /// Visible text, one line per text block
    pub text: String,
}

/// Strip markup and boilerplate regions from an HTML document
#[inline]
pub fn extract_text(html: &str) -> ExtractedPage {
    let document = Html::parse_document(html);

    let mut title = None;
    let mut lines = Vec::new();

    for node in document.root_element().descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };
        let Some(parent) = node.parent().and_then(|p| p.value().as_element().map(|e| e.name()))
        else {
            continue;
        };

        let content = collapse_whitespace(text);
        if content.is_empty() {
            continue;
        }

        if parent == "title" {
            title.get_or_insert(content);
            continue;
        }

        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|e| SKIPPED_ELEMENTS.contains(&e.name()) || e.name() == "head")
        });
        if !skipped {
            lines.push(content);
        }
    }

    let text = lines.join("\n");
    debug!(
        "Extracted {} chars of text (title {:?})",
        text.len(),
        title
    );

    ExtractedPage { title, text }
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}
