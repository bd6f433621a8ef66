//! Document value type and identity.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Language used when rendering a document for a human recipient.
pub const RENDER_LANGUAGE: &str = "en";

/// Placeholder used when no English title is available.
pub const MISSING_TITLE: &str = "<No english title available>";

/// A document found on a topic listing.
///
/// Equality and hashing are derived from `symbol` and `title` content, so
/// two separately fetched values describing the same item compare equal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Document {
    /// Short document code, e.g. `IPBES/10/9`.
    pub symbol: String,
    /// Titles keyed by language tag.
    pub title: BTreeMap<String, String>,
}

impl Document {
    /// Create a document with a single title in the given language.
    pub fn new(
        symbol: impl Into<String>,
        language: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        let mut titles = BTreeMap::new();
        titles.insert(language.into(), title.into());
        Self {
            symbol: symbol.into(),
            title: titles,
        }
    }

    /// Create a document with an English title.
    pub fn english(symbol: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(symbol, RENDER_LANGUAGE, title)
    }

    /// Add or replace the title for a language.
    pub fn with_title(mut self, language: impl Into<String>, title: impl Into<String>) -> Self {
        self.title.insert(language.into(), title.into());
        self
    }

    /// Get the title for a language.
    pub fn title(&self, language: &str) -> Option<&str> {
        self.title.get(language).map(String::as_str)
    }

    /// Stable identity key, identical across processes and restarts.
    pub fn key(&self) -> DocumentKey {
        let mut hasher = Sha256::new();
        hash_field(&mut hasher, &self.symbol);
        for (language, text) in &self.title {
            hash_field(&mut hasher, language);
            hash_field(&mut hasher, text);
        }
        DocumentKey(hex::encode(hasher.finalize()))
    }

    /// Render the notification text, e.g. `[IPBES/1] 'Report A'`.
    pub fn render(&self) -> String {
        format!(
            "[{}] '{}'",
            self.symbol,
            self.title(RENDER_LANGUAGE).unwrap_or(MISSING_TITLE)
        )
    }
}

// Length prefix keeps ("ab", "c") and ("a", "bc") apart.
fn hash_field(hasher: &mut Sha256, field: &str) {
    hasher.update((field.len() as u64).to_le_bytes());
    hasher.update(field.as_bytes());
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.render())
    }
}

/// Hex-encoded SHA-256 identity of a [`Document`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DocumentKey(String);

impl DocumentKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for DocumentKey {
    fn from(s: String) -> Self {
        DocumentKey(s)
    }
}

impl fmt::Display for DocumentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
