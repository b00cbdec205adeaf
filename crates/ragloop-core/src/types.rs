use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Key/value metadata attached to a chunk (e.g. `source`, `page`, `start_index`).
pub type Metadata = BTreeMap<String, String>;

/// Stable document identity derived from content and origin.
///
/// Verdicts are keyed by this id rather than by list position, so reordering
/// search results never shuffles relevance judgments.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
pub struct DocumentId(pub String);

impl DocumentId {
    /// Digest of `content|source|page`.
    pub fn derive(content: &str, metadata: &Metadata) -> Self {
        let source = metadata.get("source").map(String::as_str).unwrap_or("");
        let page = metadata.get("page").map(String::as_str).unwrap_or("");
        let mut hasher = Sha256::new();
        hasher.update(content.as_bytes());
        hasher.update(b"|");
        hasher.update(source.as_bytes());
        hasher.update(b"|");
        hasher.update(page.as_bytes());
        Self(format!("{:x}", hasher.finalize()))
    }

    /// Shortened form for log lines.
    pub fn short(&self) -> &str {
        &self.0[..self.0.len().min(12)]
    }
}

impl std::fmt::Display for DocumentId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A retrieved chunk. Immutable once produced by a search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: DocumentId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
    /// Similarity score reported by the vector store (higher is closer).
    pub score: f32,
}

impl Document {
    pub fn new(content: impl Into<String>, metadata: Metadata, score: f32) -> Self {
        let content = content.into();
        Self {
            id: DocumentId::derive(&content, &metadata),
            content,
            metadata,
            score,
        }
    }

    /// Human-readable origin, e.g. `notes.md p.3`.
    pub fn source_label(&self) -> String {
        let source = self.metadata.get("source").map(String::as_str).unwrap_or("unknown");
        match self.metadata.get("page") {
            Some(page) => format!("{} p.{}", source, page),
            None => source.to_string(),
        }
    }
}

/// A chunk on its way into the vector store.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewDocument {
    pub id: DocumentId,
    pub content: String,
    #[serde(default)]
    pub metadata: Metadata,
}

impl NewDocument {
    pub fn new(content: impl Into<String>, metadata: Metadata) -> Self {
        let content = content.into();
        Self {
            id: DocumentId::derive(&content, &metadata),
            content,
            metadata,
        }
    }
}

/// Role in a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// A chat message sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<DateTime<Utc>>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }

    pub fn assistant(text: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: text.into(),
            timestamp: Some(Utc::now()),
        }
    }
}

/// Stop reason from the LLM.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

/// A streaming delta from the LLM.
#[derive(Debug, Clone)]
pub enum StreamDelta {
    /// A chunk of text content.
    TextDelta(String),

    /// The response is complete.
    Stop(StopReason),

    /// Usage information.
    Usage {
        input_tokens: u64,
        output_tokens: u64,
    },
}
