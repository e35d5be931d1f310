use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::core::Selection;
use crate::node::{Marks, Node, NodeAttrs};

pub type Path = Vec<usize>;

/// Primitive edit steps. Paths inside one transaction are already mapped
/// through the steps that precede them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Op {
    InsertText {
        #[serde(default)]
        path: Path,
        offset: usize,
        text: String,
    },
    RemoveText {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
    },
    InsertNode {
        #[serde(default)]
        path: Path,
        node: Node,
    },
    RemoveNode {
        #[serde(default)]
        path: Path,
    },
    /// Replaces `range` of the children of the container at `path`
    /// (the document root when `path` is empty) with `content`.
    ReplaceChildren {
        #[serde(default)]
        path: Path,
        range: Range<usize>,
        content: Vec<Node>,
    },
    SetNodeAttrs {
        #[serde(default)]
        path: Path,
        attrs: NodeAttrs,
    },
    SetTextMarks {
        #[serde(default)]
        path: Path,
        marks: Marks,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionMeta {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
    /// Composition state change carried by this transaction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub composing: Option<bool>,
    #[serde(default = "default_add_to_history")]
    pub add_to_history: bool,
}

fn default_add_to_history() -> bool {
    true
}

impl Default for TransactionMeta {
    fn default() -> Self {
        Self {
            source: None,
            composing: None,
            add_to_history: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    #[serde(default)]
    pub ops: Vec<Op>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selection_after: Option<Selection>,
    #[serde(default)]
    pub meta: TransactionMeta,
}

impl Transaction {
    pub fn new(ops: Vec<Op>) -> Self {
        Self {
            ops,
            selection_after: None,
            meta: TransactionMeta::default(),
        }
    }

    pub fn selection_after(mut self, selection_after: Selection) -> Self {
        self.selection_after = Some(selection_after);
        self
    }

    pub fn source(mut self, source: impl Into<String>) -> Self {
        self.meta.source = Some(source.into());
        self
    }

    pub fn composing(mut self, composing: bool) -> Self {
        self.meta.composing = Some(composing);
        self
    }

    pub fn without_history(mut self) -> Self {
        self.meta.add_to_history = false;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    pub fn source_str(&self) -> &str {
        self.meta.source.as_deref().unwrap_or("unknown")
    }
}
