use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::node::{Document, Node};

const DEFAULT_SCHEMA: &str = "notitap";
const DEFAULT_VERSION: u32 = 1;

fn default_schema() -> String {
    DEFAULT_SCHEMA.to_string()
}

fn default_version() -> u32 {
    DEFAULT_VERSION
}

#[derive(Debug, thiserror::Error)]
pub enum DocumentError {
    #[error("malformed document JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("unsupported document schema {schema:?} version {version}")]
    Unsupported { schema: String, version: u32 },
    #[error("not a document: the root has neither `content` nor `document`")]
    Unrecognized,
}

/// Persisted form of a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    #[serde(default = "default_schema")]
    pub schema: String,
    #[serde(default = "default_version")]
    pub version: u32,
    pub document: Document,
}

impl StoredDocument {
    pub fn from_document(document: Document) -> Self {
        Self {
            schema: default_schema(),
            version: default_version(),
            document,
        }
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    pub fn to_json_pretty(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json_str(s: &str) -> Result<Self, DocumentError> {
        let value: Value = serde_json::from_str(s)?;
        if value.get("document").is_none() && value.get("content").is_none() {
            tracing::warn!("document root has neither content nor document");
            return Err(DocumentError::Unrecognized);
        }
        let stored = match Stored::deserialize(value)? {
            Stored::Envelope(stored) => stored,
            Stored::Bare(document) => Self::from_document(document),
        };
        stored.check()?;
        Ok(stored)
    }

    fn check(&self) -> Result<(), DocumentError> {
        if self.schema != DEFAULT_SCHEMA || self.version > DEFAULT_VERSION {
            return Err(DocumentError::Unsupported {
                schema: self.schema.clone(),
                version: self.version,
            });
        }
        Ok(())
    }
}

// Documents saved before the envelope existed are a bare `{"content": [...]}`.
#[derive(Deserialize)]
#[serde(untagged)]
enum Stored {
    Envelope(StoredDocument),
    Bare(Document),
}

pub fn serialize(doc: &Document) -> Result<String, DocumentError> {
    Ok(StoredDocument::from_document(doc.clone()).to_json()?)
}

pub fn serialize_pretty(doc: &Document) -> Result<String, DocumentError> {
    Ok(StoredDocument::from_document(doc.clone()).to_json_pretty()?)
}

pub fn deserialize(s: &str) -> Result<Document, DocumentError> {
    StoredDocument::from_json_str(s).map(StoredDocument::into_document)
}

/// Loads whatever can be loaded. A document that cannot be read at all
/// becomes a single notice paragraph; a top-level block that cannot be read
/// becomes a notice paragraph in its place and its siblings load normally.
pub fn load_or_notice(s: &str) -> Document {
    let value: Value = match serde_json::from_str(s) {
        Ok(value) => value,
        Err(err) => {
            tracing::warn!(error = %err, "document is not valid JSON; showing notice");
            return notice_document();
        }
    };

    let Value::Object(mut root) = value else {
        tracing::warn!("document root is not an object; showing notice");
        return notice_document();
    };
    let body = match root.remove("document") {
        Some(Value::Object(document)) => {
            let schema = root.get("schema").and_then(Value::as_str).unwrap_or(DEFAULT_SCHEMA);
            let version = root
                .get("version")
                .and_then(Value::as_u64)
                .unwrap_or(u64::from(DEFAULT_VERSION));
            if schema != DEFAULT_SCHEMA || version > u64::from(DEFAULT_VERSION) {
                tracing::warn!(schema, version, "unsupported document schema; showing notice");
                return notice_document();
            }
            document
        }
        Some(_) => {
            tracing::warn!("document envelope has no document object; showing notice");
            return notice_document();
        }
        None => root,
    };

    let blocks = match body.get("content") {
        Some(Value::Array(blocks)) => blocks,
        None => {
            tracing::warn!("document has no content array; loading it empty");
            return Document::default();
        }
        Some(_) => {
            tracing::warn!("document content is not an array; showing notice");
            return notice_document();
        }
    };

    let content = blocks
        .iter()
        .enumerate()
        .map(|(ix, block)| match Node::deserialize(block) {
            Ok(node) => node,
            Err(err) => {
                tracing::warn!(index = ix, error = %err, "malformed block replaced by notice");
                Node::wrapped(Node::notice())
            }
        })
        .collect();
    Document { content }
}

fn notice_document() -> Document {
    Document::from_blocks([Node::notice()])
}
