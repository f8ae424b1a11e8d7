//! Turns a page into an ordered list of role-tagged message texts.

use crate::converter;
use crate::dom::{self, Element};
use crate::error::ExtractError;
use crate::locator::{self, Role};
use serde::Serialize;

const FALLBACK_TITLE: &str = "gemini-chat";
const TITLE_MAX_CHARS: usize = 80;

/// One message of the conversation. Built once, never changed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConversationEntry {
    role: Role,
    text: String,
    sequence_index: usize,
}

impl ConversationEntry {
    pub fn new(role: Role, text: impl Into<String>, sequence_index: usize) -> Self {
        Self {
            role,
            text: text.into(),
            sequence_index,
        }
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn sequence_index(&self) -> usize {
        self.sequence_index
    }
}

/// Result of a successful extraction run. Zero entries is a valid outcome.
#[derive(Debug, Clone, Default)]
pub struct Extraction {
    pub entries: Vec<ConversationEntry>,
    /// Name of the locator strategy that found the messages.
    pub strategy: Option<&'static str>,
    /// Elements whose conversion failed and were left out.
    pub skipped: usize,
}

impl Extraction {
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// First line of the first user message, shortened.
    pub fn title(&self) -> String {
        self.entries
            .iter()
            .find(|e| e.role == Role::Submitted)
            .and_then(|e| e.text.lines().find(|l| !l.trim().is_empty()))
            .map(|line| {
                let line = line.trim().trim_start_matches('#').trim();
                line.chars().take(TITLE_MAX_CHARS).collect::<String>()
            })
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| FALLBACK_TITLE.to_string())
    }
}

/// Locate and convert every message under `root`.
///
/// A message whose conversion fails is skipped and counted; the rest of the
/// conversation is still returned.
pub fn extract(root: &Element) -> Result<Extraction, ExtractError> {
    let Some((strategy, found)) = locator::find(root)? else {
        tracing::info!("no conversation elements found");
        return Ok(Extraction::default());
    };

    let mut extraction = Extraction {
        strategy: Some(strategy.name()),
        ..Extraction::default()
    };
    for (position, (role, element)) in found.into_iter().enumerate() {
        match converter::convert(element) {
            Ok(text) if text.trim().is_empty() => {}
            Ok(text) => {
                let index = extraction.entries.len();
                extraction
                    .entries
                    .push(ConversationEntry::new(role, text, index));
            }
            Err(e) => {
                tracing::warn!(position, %role, error = %e, "skipping message that failed to convert");
                extraction.skipped += 1;
            }
        }
    }
    Ok(extraction)
}

/// Extract, logging any failure and returning no entries instead.
pub fn extract_entries(root: &Element) -> Vec<ConversationEntry> {
    match extract(root) {
        Ok(extraction) => extraction.entries,
        Err(e) => {
            tracing::error!(error = %e, "conversation extraction failed");
            Vec::new()
        }
    }
}

/// Parse `html` and extract its conversation.
pub fn extract_html(html: &str) -> Result<Extraction, ExtractError> {
    let root = dom::parse_html(html);
    extract(&root)
}

/// Page-structure report for `html`.
pub fn inspect_html(html: &str) -> Result<Vec<locator::StructureCount>, ExtractError> {
    let root = dom::parse_html(html);
    Ok(locator::inspect(&root)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::MAX_RENDER_DEPTH;

    #[test]
    fn test_extract_html_interleaves_roles() {
        let html = r#"
            <div id="chat-history">
              <user-query><div class="query-text"><p>How do I print?</p></div></user-query>
              <model-response>
                <message-content><p>Use <code>print</code>:</p>
                <pre><code class="language-python">print(1)</code></pre></message-content>
                <message-actions><button>Copy</button></message-actions>
              </model-response>
              <user-query><p>Thanks</p></user-query>
              <model-response><p>Copy</p></model-response>
            </div>"#;
        let extraction = extract_html(html).unwrap();
        assert_eq!(extraction.strategy, Some("message-tags"));
        let entries = &extraction.entries;
        assert_eq!(entries.len(), 3, "the boilerplate-only response is dropped");
        assert_eq!(entries[0].role(), Role::Submitted);
        assert_eq!(entries[0].text(), "How do I print?");
        assert_eq!(entries[1].role(), Role::Produced);
        assert_eq!(
            entries[1].text(),
            "Use `print`:\n\n```python\nprint(1)\n```"
        );
        assert_eq!(entries[2].text(), "Thanks");
        let indexes: Vec<_> = entries.iter().map(|e| e.sequence_index()).collect();
        assert_eq!(indexes, [0, 1, 2]);
        assert_eq!(extraction.title(), "How do I print?");
    }

    #[test]
    fn test_failed_message_is_skipped_not_fatal() {
        let mut deep = Element::new("span").with_text("deep");
        for _ in 0..MAX_RENDER_DEPTH + 1 {
            deep = Element::new("span").with_child(deep);
        }
        let root = Element::new("main")
            .with_child(Element::new("user-query").with_text("question"))
            .with_child(Element::new("model-response").with_child(deep))
            .with_child(Element::new("user-query").with_text("follow-up"));

        let extraction = extract(&root).unwrap();
        assert_eq!(extraction.skipped, 1);
        let texts: Vec<_> = extraction.entries.iter().map(|e| e.text()).collect();
        assert_eq!(texts, ["question", "follow-up"]);
        assert_eq!(extraction.entries[1].sequence_index(), 1);
    }

    #[test]
    fn test_empty_page_is_not_an_error() {
        let extraction = extract_html("<p>nothing to see</p>").unwrap();
        assert!(extraction.is_empty());
        assert_eq!(extraction.strategy, None);
        assert_eq!(extraction.title(), "gemini-chat");
    }

    #[test]
    fn test_title_is_shortened() {
        let long = "x".repeat(200);
        let extraction = Extraction {
            entries: vec![
                ConversationEntry::new(Role::Produced, "ignored", 0),
                ConversationEntry::new(Role::Submitted, format!("# {long}\nmore"), 1),
            ],
            ..Extraction::default()
        };
        assert_eq!(extraction.title().chars().count(), 80);
    }
}
