use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::markup;

/// One indexed document, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Card {
    pub path: String,
    pub title: String,
    pub summary: String,
    /// Full document content. Only used to build index entries.
    pub body: String,
    pub hash: String,
    /// Milliseconds since the Unix epoch, assigned when the write was accepted.
    pub updated_at: u64,
}

/// Card content as produced by a loader, before the store stamps it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardContent {
    pub path: String,
    pub title: String,
    pub summary: String,
    pub body: String,
    pub hash: String,
}

impl CardContent {
    /// Build a card from a raw markdown or HTML document.
    ///
    /// HTML takes its title from the first `<h1>` and its summary from the
    /// first `<p>`; markdown from the first `# ` heading and the first plain
    /// paragraph. The title falls back to the path.
    ///
    /// # Examples
    ///
    /// ```
    /// use deckdb::card::CardContent;
    ///
    /// let card = CardContent::from_document(
    ///     "/guide.md",
    ///     "# Guide\n\nStart here.\n",
    /// );
    /// assert_eq!(card.title, "Guide");
    /// assert_eq!(card.summary, "Start here.");
    /// ```
    pub fn from_document(path: &str, raw: &str) -> Self {
        let (title, summary) = if markup::looks_like_html(path, raw) {
            (
                markup::first_element_text(raw, "h1"),
                markup::first_element_text(raw, "p"),
            )
        } else {
            (
                markup::markdown_title(raw),
                markup::markdown_summary(raw),
            )
        };

        Self {
            path: path.to_string(),
            title: title.unwrap_or_else(|| path.to_string()),
            summary: summary.unwrap_or_default(),
            body: raw.to_string(),
            hash: content_hash(raw),
        }
    }

    pub(crate) fn into_card(self, updated_at: u64) -> Card {
        Card {
            path: self.path,
            title: self.title,
            summary: self.summary,
            body: self.body,
            hash: self.hash,
            updated_at,
        }
    }
}

/// A card known to exist at the source: its path and content fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CardMeta {
    pub path: String,
    pub hash: String,
}

impl CardMeta {
    pub fn new(path: impl Into<String>, hash: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            hash: hash.into(),
        }
    }
}

/// Lowercase hex SHA-256 of a document.
pub fn content_hash(raw: &str) -> String {
    hex::encode(Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn markdown_document() {
        let card = CardContent::from_document(
            "/widgets.md",
            "# Widgets\n\nWidgets are great gadgets.\n\nMore text.",
        );
        assert_eq!(card.title, "Widgets");
        assert_eq!(card.summary, "Widgets are great gadgets.");
        assert!(card.body.contains("More text."));
    }

    #[test]
    fn html_document() {
        let card = CardContent::from_document(
            "/widgets.html",
            "<h1>Widgets <em>v2</em></h1><p>All about &amp; widgets</p>",
        );
        assert_eq!(card.title, "Widgets v2");
        assert_eq!(card.summary, "All about & widgets");
    }

    #[test]
    fn title_falls_back_to_path() {
        let card = CardContent::from_document("/notes.md", "just text");
        assert_eq!(card.title, "/notes.md");
        assert_eq!(card.summary, "just text");
    }

    #[test]
    fn hash_is_sha256_hex() {
        assert_eq!(
            content_hash(""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
        let card = CardContent::from_document("/a.md", "abc");
        assert_eq!(card.hash.len(), 64);
    }

    #[test]
    fn card_serializes_camel_case() {
        let card = CardContent::from_document("/a.md", "# A").into_card(7);
        let json = serde_json::to_value(&card).unwrap();
        assert_eq!(json["updatedAt"], 7);
        assert_eq!(json["path"], "/a.md");
    }
}
