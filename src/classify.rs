//! Input classification: which source material a generation request supplies.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Source composition of a generation request. Exactly one applies to any request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InputMode {
    DocumentsAndLinks,
    DocumentsAndWeb,
    DocumentsOnly,
    LinksOnly,
    WebOnly,
    /// Nothing attached; the lesson name is the only input
    #[serde(rename = "none")]
    TopicOnly,
}

impl InputMode {
    /// Classify by attachments. First match wins:
    /// documents+links, documents+web, documents, links, web, nothing.
    pub fn classify(has_documents: bool, has_links: bool, web_search_enabled: bool) -> Self {
        if has_documents && has_links {
            InputMode::DocumentsAndLinks
        } else if has_documents && web_search_enabled {
            InputMode::DocumentsAndWeb
        } else if has_documents {
            InputMode::DocumentsOnly
        } else if has_links {
            InputMode::LinksOnly
        } else if web_search_enabled {
            InputMode::WebOnly
        } else {
            InputMode::TopicOnly
        }
    }

    /// Whether a retrieval index is built for this mode
    pub fn uses_retrieval(self) -> bool {
        !matches!(self, InputMode::WebOnly | InputMode::TopicOnly)
    }

    pub fn includes_documents(self) -> bool {
        matches!(
            self,
            InputMode::DocumentsAndLinks | InputMode::DocumentsAndWeb | InputMode::DocumentsOnly
        )
    }

    pub fn includes_links(self) -> bool {
        matches!(self, InputMode::DocumentsAndLinks | InputMode::LinksOnly)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            InputMode::DocumentsAndLinks => "documents_and_links",
            InputMode::DocumentsAndWeb => "documents_and_web",
            InputMode::DocumentsOnly => "documents_only",
            InputMode::LinksOnly => "links_only",
            InputMode::WebOnly => "web_only",
            InputMode::TopicOnly => "none",
        }
    }
}

impl fmt::Display for InputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
