use std::collections::{HashMap, HashSet};

use crate::core::EditorState;
use crate::node::{Document, HeadingAttrs, NodeAttrs};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{AppendTransaction, EditorPlugin, PluginStage};

/// Lowercases and joins whitespace-separated words with `-`. Nothing else is
/// added or removed, so punctuation survives.
pub fn slugify(text: &str) -> String {
    text.split_whitespace()
        .collect::<Vec<_>>()
        .join("-")
        .to_lowercase()
}

/// Hands out unique slugs for one pass over the document. The first
/// occurrence of a base keeps it; later ones get the next free `-N`.
#[derive(Debug, Default)]
pub struct SlugAllocator {
    taken: HashSet<String>,
    next_suffix: HashMap<String, usize>,
}

impl SlugAllocator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn allocate(&mut self, base: &str) -> String {
        if self.taken.insert(base.to_string()) {
            return base.to_string();
        }
        let next = self.next_suffix.entry(base.to_string()).or_insert(1);
        loop {
            let candidate = format!("{base}-{next}");
            *next += 1;
            if self.taken.insert(candidate.clone()) {
                return candidate;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeadingIdentity {
    pub path: Path,
    pub id: Option<String>,
    pub base_text: String,
}

/// Ids for every heading in document order. Headings without any slug
/// characters get no id.
pub fn compute_heading_ids(doc: &Document) -> Vec<HeadingIdentity> {
    let mut slugs = SlugAllocator::new();
    doc.headings()
        .into_iter()
        .map(|(path, heading)| {
            let base_text: String = heading.content.iter().map(|n| n.text_content()).collect();
            let slug = slugify(&base_text);
            let id = (!slug.is_empty()).then(|| slugs.allocate(&slug));
            HeadingIdentity {
                path,
                id,
                base_text,
            }
        })
        .collect()
}

pub(crate) struct HeadingIdentityPlugin;

impl EditorPlugin for HeadingIdentityPlugin {
    fn id(&self) -> &'static str {
        "heading.identity"
    }

    fn append_passes(&self) -> Vec<Box<dyn AppendTransaction>> {
        vec![Box::new(AssignHeadingIds)]
    }
}

struct AssignHeadingIds;

impl AppendTransaction for AssignHeadingIds {
    fn id(&self) -> &'static str {
        "heading.assign_ids"
    }

    fn stage(&self) -> PluginStage {
        PluginStage::Identity
    }

    fn append(
        &self,
        _old: &EditorState,
        new: &EditorState,
        _tx: &Transaction,
    ) -> Option<Transaction> {
        // Text under an open IME composition is provisional.
        if new.composing {
            return None;
        }

        let headings = new.doc.headings();
        let ops: Vec<Op> = compute_heading_ids(&new.doc)
            .into_iter()
            .zip(headings)
            .filter(|(computed, (_, heading))| {
                heading.attrs.id != computed.id
                    || heading.attrs.base_text.as_deref() != Some(computed.base_text.as_str())
            })
            .map(|(computed, (_, heading))| Op::SetNodeAttrs {
                path: computed.path,
                attrs: NodeAttrs::Heading(HeadingAttrs {
                    level: heading.attrs.level,
                    id: computed.id,
                    base_text: Some(computed.base_text),
                }),
            })
            .collect();

        if ops.is_empty() {
            return None;
        }
        tracing::debug!(count = ops.len(), "reassigning heading ids");
        Some(Transaction::new(ops).source("heading.assign_ids").without_history())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slugify_joins_words_and_lowercases() {
        assert_eq!(slugify("  Getting   Started "), "getting-started");
        assert_eq!(slugify("Q&A: Part 2"), "q&a:-part-2");
        assert_eq!(slugify("\t\n"), "");
    }

    #[test]
    fn allocator_suffixes_repeats_in_order() {
        let mut slugs = SlugAllocator::new();
        let ids: Vec<_> = ["intro", "intro", "intro"]
            .iter()
            .map(|base| slugs.allocate(base))
            .collect();
        assert_eq!(ids, ["intro", "intro-1", "intro-2"]);
    }

    #[test]
    fn allocator_skips_suffixes_taken_by_literal_text() {
        let mut slugs = SlugAllocator::new();
        assert_eq!(slugs.allocate("intro-1"), "intro-1");
        assert_eq!(slugs.allocate("intro"), "intro");
        assert_eq!(slugs.allocate("intro"), "intro-2");
    }
}
