use std::ops::Range;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::node::{Document, Node, NodeAttrs, TextNode};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{CommandError, PluginRegistry};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Point {
    #[serde(default)]
    pub path: Path,
    pub offset: usize,
}

impl Point {
    pub fn new(path: Path, offset: usize) -> Self {
        Self { path, offset }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Selection {
    pub anchor: Point,
    pub focus: Point,
}

impl Selection {
    pub fn collapsed(point: Point) -> Self {
        Self {
            anchor: point.clone(),
            focus: point,
        }
    }

    pub fn is_collapsed(&self) -> bool {
        self.anchor == self.focus
    }
}

/// Immutable editor snapshot. The document is shared between snapshots and
/// only copied when a transaction writes to it.
#[derive(Debug, Clone, PartialEq)]
pub struct EditorState {
    pub doc: Arc<Document>,
    pub selection: Selection,
    pub composing: bool,
}

impl EditorState {
    pub fn new(doc: Document, selection: Selection) -> Self {
        Self {
            doc: Arc::new(doc),
            selection,
            composing: false,
        }
    }

    /// Applies `ops` to a copy of this snapshot without running any plugin
    /// passes. Used by commands that need to look at an intermediate state.
    pub fn preview(&self, ops: &[Op]) -> Result<EditorState, ApplyError> {
        let mut next = self.clone();
        let doc = Arc::make_mut(&mut next.doc);
        for op in ops.iter().cloned() {
            apply_op_to(doc, &mut next.selection, op)?;
        }
        Ok(next)
    }

    /// The top-level block containing the selection focus.
    pub fn focus_block(&self) -> Option<usize> {
        self.selection.focus.path.first().copied()
    }
}

#[derive(Debug, Clone)]
pub struct UndoRecord {
    pub inverse_ops: Vec<Op>,
    pub selection_before: Selection,
    pub selection_after: Selection,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct EditorConfig {
    pub max_undo: usize,
    pub max_append_iterations: usize,
}

impl EditorConfig {
    pub fn with_defaults(mut self) -> Self {
        if self.max_undo == 0 {
            self.max_undo = 200;
        }
        if self.max_append_iterations == 0 {
            self.max_append_iterations = 100;
        }
        self
    }
}

/// What subscribers receive after every committed transaction.
#[derive(Debug)]
pub struct EditorUpdate<'a> {
    pub state: &'a EditorState,
    /// The dispatched transaction with every appended step folded in.
    pub transaction: &'a Transaction,
    pub doc_changed: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&EditorUpdate<'_>) + Send>;

pub struct Editor {
    state: EditorState,
    registry: PluginRegistry,
    config: EditorConfig,
    undo_stack: Vec<UndoRecord>,
    redo_stack: Vec<UndoRecord>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_listener: u64,
}

struct Prepared {
    next: EditorState,
    published: Transaction,
    inverse_ops: Vec<Op>,
}

impl Editor {
    pub fn new(doc: Document, selection: Selection, registry: PluginRegistry) -> Self {
        Self::with_config(doc, selection, registry, EditorConfig::default())
    }

    pub fn with_config(
        doc: Document,
        selection: Selection,
        registry: PluginRegistry,
        config: EditorConfig,
    ) -> Self {
        let mut editor = Self {
            state: EditorState::new(doc, selection),
            registry,
            config: config.with_defaults(),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            listeners: Vec::new(),
            next_listener: 0,
        };
        let init = Transaction::default().source("editor:init").without_history();
        if let Err(err) = editor.apply(init) {
            tracing::warn!(error = %err, "initial normalization failed");
        }
        editor
    }

    pub fn with_default_plugins() -> Self {
        let doc = Document::from_blocks([Node::paragraph("")]);
        let selection = Selection::collapsed(Point::new(vec![0, 0, 0], 0));
        Self::new(doc, selection, PluginRegistry::notitap())
    }

    /// Loads a stored document, isolating unreadable blocks, and places the
    /// cursor at the first text position.
    pub fn from_json(json: &str, registry: PluginRegistry) -> Self {
        let doc = crate::serde_value::load_or_notice(json);
        let selection = Selection::collapsed(
            first_text_point(&doc).unwrap_or_else(|| Point::new(vec![0], 0)),
        );
        Self::new(doc, selection, registry)
    }

    pub fn to_json(&self) -> Result<String, crate::serde_value::DocumentError> {
        crate::serde_value::serialize(&self.state.doc)
    }

    pub fn state(&self) -> &EditorState {
        &self.state
    }

    pub fn doc(&self) -> &Document {
        &self.state.doc
    }

    pub fn selection(&self) -> &Selection {
        &self.state.selection
    }

    pub fn is_composing(&self) -> bool {
        self.state.composing
    }

    pub fn registry(&self) -> &PluginRegistry {
        &self.registry
    }

    pub fn set_selection(&mut self, selection: Selection) {
        let tx = Transaction::default()
            .selection_after(selection)
            .source("selection")
            .without_history();
        // A selection-only transaction carries no steps that could fail.
        let _ = self.apply(tx);
    }

    pub fn composition_start(&mut self) {
        let tx = Transaction::default()
            .composing(true)
            .source("composition:start")
            .without_history();
        let _ = self.apply(tx);
    }

    pub fn composition_end(&mut self) {
        let tx = Transaction::default()
            .composing(false)
            .source("composition:end")
            .without_history();
        let _ = self.apply(tx);
    }

    pub fn subscribe(
        &mut self,
        listener: impl FnMut(&EditorUpdate<'_>) + Send + 'static,
    ) -> SubscriptionId {
        let id = SubscriptionId(self.next_listener);
        self.next_listener += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.listeners.len();
        self.listeners.retain(|(listener_id, _)| *listener_id != id);
        self.listeners.len() != before
    }

    pub fn can_undo(&self) -> bool {
        !self.undo_stack.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo_stack.is_empty()
    }

    pub fn undo(&mut self) -> bool {
        let Some(record) = self.undo_stack.pop() else {
            return false;
        };
        match self.replay(&record.inverse_ops, record.selection_before.clone(), "history:undo") {
            Ok(redo_ops) => {
                self.redo_stack.push(UndoRecord {
                    inverse_ops: redo_ops,
                    selection_before: record.selection_before,
                    selection_after: record.selection_after,
                });
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "undo failed; dropping history entry");
                false
            }
        }
    }

    pub fn redo(&mut self) -> bool {
        let Some(record) = self.redo_stack.pop() else {
            return false;
        };
        match self.replay(&record.inverse_ops, record.selection_after.clone(), "history:redo") {
            Ok(undo_ops) => {
                self.undo_stack.push(UndoRecord {
                    inverse_ops: undo_ops,
                    selection_before: record.selection_before,
                    selection_after: record.selection_after,
                });
                true
            }
            Err(err) => {
                tracing::warn!(error = %err, "redo failed; dropping history entry");
                false
            }
        }
    }

    /// Applies a transaction atomically: either every step (including the
    /// ones appended by plugins) lands and subscribers see one update, or the
    /// snapshot is left untouched and nobody is notified.
    pub fn apply(&mut self, tx: Transaction) -> Result<(), ApplyError> {
        let Prepared {
            next,
            published,
            mut inverse_ops,
        } = match self.prepare(&tx) {
            Ok(prepared) => prepared,
            Err(err) => {
                tracing::warn!(source = tx.source_str(), error = %err, "rejected transaction");
                return Err(err);
            }
        };

        let doc_changed = !inverse_ops.is_empty();
        if tx.meta.add_to_history && doc_changed {
            inverse_ops.reverse();
            self.undo_stack.push(UndoRecord {
                inverse_ops,
                selection_before: self.state.selection.clone(),
                selection_after: next.selection.clone(),
            });
            self.redo_stack.clear();
            if self.undo_stack.len() > self.config.max_undo {
                self.undo_stack.remove(0);
            }
        }

        tracing::trace!(
            source = tx.source_str(),
            ops = published.ops.len(),
            "committed transaction"
        );
        self.commit(next, published, doc_changed);
        Ok(())
    }

    pub fn run_command(
        &mut self,
        id: &str,
        args: Option<serde_json::Value>,
    ) -> Result<(), CommandError> {
        let Some(command) = self.registry.command(id) else {
            return Err(CommandError::new(format!("Unknown command: {id}")));
        };
        (command.handler)(self, args)
    }

    fn prepare(&self, tx: &Transaction) -> Result<Prepared, ApplyError> {
        let old_state = &self.state;
        let mut next = old_state.clone();
        let mut inverse_ops = Vec::new();

        if !tx.ops.is_empty() {
            let doc = Arc::make_mut(&mut next.doc);
            for op in tx.ops.iter().cloned() {
                inverse_ops.push(apply_op_to(doc, &mut next.selection, op)?);
            }
        }
        if let Some(selection) = &tx.selection_after {
            next.selection = selection.clone();
        }
        if let Some(composing) = tx.meta.composing {
            next.composing = composing;
        }

        let mut published = tx.clone();
        let mut converged = false;
        for _ in 0..self.config.max_append_iterations {
            let mut appended = false;
            for pass in self.registry.append_passes() {
                let Some(extra) = pass.append(old_state, &next, tx) else {
                    continue;
                };
                if extra.ops.is_empty() {
                    continue;
                }
                tracing::debug!(pass = pass.id(), ops = extra.ops.len(), "appending steps");
                let doc = Arc::make_mut(&mut next.doc);
                for op in extra.ops.iter().cloned() {
                    inverse_ops.push(apply_op_to(doc, &mut next.selection, op)?);
                }
                if let Some(selection) = extra.selection_after {
                    next.selection = selection;
                }
                published.ops.extend(extra.ops);
                appended = true;
            }
            if !appended {
                converged = true;
                break;
            }
        }
        if !converged {
            return Err(ApplyError::AppendDidNotConverge);
        }

        next.selection = normalize_selection(&next.doc, &next.selection);
        published.selection_after = Some(next.selection.clone());
        Ok(Prepared {
            next,
            published,
            inverse_ops,
        })
    }

    fn replay(
        &mut self,
        ops: &[Op],
        selection: Selection,
        source: &str,
    ) -> Result<Vec<Op>, ApplyError> {
        let mut next = self.state.clone();
        let mut inverse = Vec::with_capacity(ops.len());
        {
            let doc = Arc::make_mut(&mut next.doc);
            for op in ops.iter().cloned() {
                inverse.push(apply_op_to(doc, &mut next.selection, op)?);
            }
        }
        inverse.reverse();
        next.selection = normalize_selection(&next.doc, &selection);

        let published = Transaction::new(ops.to_vec())
            .selection_after(next.selection.clone())
            .source(source)
            .without_history();
        self.commit(next, published, true);
        Ok(inverse)
    }

    fn commit(&mut self, next: EditorState, published: Transaction, doc_changed: bool) {
        self.state = next;
        let update = EditorUpdate {
            state: &self.state,
            transaction: &published,
            doc_changed,
        };
        for (_, listener) in self.listeners.iter_mut() {
            listener(&update);
        }
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ApplyError {
    #[error("path {path:?} is out of bounds")]
    OutOfBounds { path: Path },
    #[error("offset {offset} is out of bounds for text of length {len} at {path:?}")]
    OffsetOutOfBounds {
        path: Path,
        offset: usize,
        len: usize,
    },
    #[error("offset {offset} is not on a character boundary at {path:?}")]
    NotCharBoundary { path: Path, offset: usize },
    #[error("invalid path {path:?}: {reason}")]
    InvalidPath { path: Path, reason: &'static str },
    #[error("attributes do not apply to {kind} at {path:?}")]
    AttrsMismatch { path: Path, kind: &'static str },
    #[error("invalid attributes: {0}")]
    InvalidAttrs(String),
    #[error("append passes did not converge")]
    AppendDidNotConverge,
}

fn apply_op_to(doc: &mut Document, selection: &mut Selection, op: Op) -> Result<Op, ApplyError> {
    match op {
        Op::InsertText { path, offset, text } => {
            let leaf = node_text_mut(doc, &path)?;
            check_offset(&leaf.text, &path, offset)?;
            leaf.text.insert_str(offset, &text);
            transform_selection_insert_text(selection, &path, offset, text.len());
            Ok(Op::RemoveText {
                path,
                range: offset..offset + text.len(),
            })
        }
        Op::RemoveText { path, range } => {
            let leaf = node_text_mut(doc, &path)?;
            if range.start > range.end {
                return Err(ApplyError::OffsetOutOfBounds {
                    path,
                    offset: range.start,
                    len: leaf.text.len(),
                });
            }
            check_offset(&leaf.text, &path, range.start)?;
            check_offset(&leaf.text, &path, range.end)?;
            let removed: String = leaf.text.drain(range.clone()).collect();
            transform_selection_remove_text(selection, &path, range.clone());
            Ok(Op::InsertText {
                path,
                offset: range.start,
                text: removed,
            })
        }
        Op::InsertNode { path, node } => {
            let (parent, index) = split_path(&path)?;
            let children = children_mut(doc, parent)?;
            if index > children.len() {
                return Err(ApplyError::OutOfBounds { path });
            }
            children.insert(index, node);
            transform_selection_insert_node(selection, &path);
            Ok(Op::RemoveNode { path })
        }
        Op::RemoveNode { path } => {
            let (parent, index) = split_path(&path)?;
            let children = children_mut(doc, parent)?;
            if index >= children.len() {
                return Err(ApplyError::OutOfBounds { path });
            }
            let removed = children.remove(index);
            transform_selection_remove_node(selection, &path, &removed, doc);
            Ok(Op::InsertNode {
                path,
                node: removed,
            })
        }
        Op::ReplaceChildren {
            path,
            range,
            content,
        } => {
            let children = children_mut(doc, &path)?;
            if range.start > range.end || range.end > children.len() {
                return Err(ApplyError::OutOfBounds { path });
            }
            let inserted = content.len();
            let removed: Vec<Node> = children.splice(range.clone(), content).collect();
            transform_selection_replace_children(selection, &path, range.clone(), inserted);
            Ok(Op::ReplaceChildren {
                path,
                range: range.start..range.start + inserted,
                content: removed,
            })
        }
        Op::SetNodeAttrs { path, attrs } => {
            let node = node_mut(doc, &path)?;
            let previous = match (node, attrs) {
                (Node::Heading(heading), NodeAttrs::Heading(attrs)) => {
                    NodeAttrs::Heading(std::mem::replace(&mut heading.attrs, attrs))
                }
                (Node::Media(media), NodeAttrs::Media(attrs)) => {
                    for (name, dim) in [("width", attrs.width), ("height", attrs.height)] {
                        if let Some(px) = dim.px()
                            && !(px.is_finite() && px > 0.0)
                        {
                            return Err(ApplyError::InvalidAttrs(format!(
                                "media {name} must be positive, got {px}"
                            )));
                        }
                    }
                    NodeAttrs::Media(std::mem::replace(&mut media.attrs, attrs))
                }
                (node, _) => {
                    return Err(ApplyError::AttrsMismatch {
                        kind: node.type_name(),
                        path,
                    });
                }
            };
            Ok(Op::SetNodeAttrs {
                path,
                attrs: previous,
            })
        }
        Op::SetTextMarks { path, marks } => {
            let leaf = node_text_mut(doc, &path)?;
            let previous = std::mem::replace(&mut leaf.marks, marks);
            Ok(Op::SetTextMarks {
                path,
                marks: previous,
            })
        }
    }
}

fn check_offset(text: &str, path: &[usize], offset: usize) -> Result<(), ApplyError> {
    if offset > text.len() {
        return Err(ApplyError::OffsetOutOfBounds {
            path: path.to_vec(),
            offset,
            len: text.len(),
        });
    }
    if !text.is_char_boundary(offset) {
        return Err(ApplyError::NotCharBoundary {
            path: path.to_vec(),
            offset,
        });
    }
    Ok(())
}

fn split_path(path: &[usize]) -> Result<(&[usize], usize), ApplyError> {
    match path.split_last() {
        Some((&index, parent)) => Ok((parent, index)),
        None => Err(ApplyError::InvalidPath {
            path: Vec::new(),
            reason: "empty path",
        }),
    }
}

fn node_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut Node, ApplyError> {
    let (&first, rest) = path.split_first().ok_or(ApplyError::InvalidPath {
        path: Vec::new(),
        reason: "empty path",
    })?;
    let mut node = doc
        .content
        .get_mut(first)
        .ok_or_else(|| ApplyError::OutOfBounds {
            path: path.to_vec(),
        })?;
    for &ix in rest {
        node = node
            .children_mut()
            .ok_or_else(|| ApplyError::InvalidPath {
                path: path.to_vec(),
                reason: "descends into a leaf",
            })?
            .get_mut(ix)
            .ok_or_else(|| ApplyError::OutOfBounds {
                path: path.to_vec(),
            })?;
    }
    Ok(node)
}

fn children_mut<'a>(doc: &'a mut Document, parent: &[usize]) -> Result<&'a mut Vec<Node>, ApplyError> {
    if parent.is_empty() {
        return Ok(&mut doc.content);
    }
    node_mut(doc, parent)?
        .children_mut()
        .ok_or_else(|| ApplyError::InvalidPath {
            path: parent.to_vec(),
            reason: "node has no children",
        })
}

fn node_text_mut<'a>(doc: &'a mut Document, path: &[usize]) -> Result<&'a mut TextNode, ApplyError> {
    match node_mut(doc, path)? {
        Node::Text(leaf) => Ok(leaf),
        _ => Err(ApplyError::InvalidPath {
            path: path.to_vec(),
            reason: "expected a text leaf",
        }),
    }
}

fn clamp_to_char_boundary(s: &str, mut ix: usize) -> usize {
    ix = ix.min(s.len());
    while ix > 0 && !s.is_char_boundary(ix) {
        ix -= 1;
    }
    ix
}

fn transform_selection_insert_text(
    selection: &mut Selection,
    path: &[usize],
    offset: usize,
    len: usize,
) {
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path == path && point.offset >= offset {
            point.offset = point.offset.saturating_add(len);
        }
    }
}

fn transform_selection_remove_text(selection: &mut Selection, path: &[usize], range: Range<usize>) {
    let removed_len = range.end.saturating_sub(range.start);
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path != path || point.offset <= range.start {
            continue;
        }
        if point.offset >= range.end {
            point.offset = point.offset.saturating_sub(removed_len);
        } else {
            point.offset = range.start;
        }
    }
}

fn transform_selection_insert_node(selection: &mut Selection, path: &[usize]) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        if point.path[depth] >= index {
            point.path[depth] += 1;
        }
    }
}

fn transform_selection_remove_node(
    selection: &mut Selection,
    path: &[usize],
    removed: &Node,
    doc_after_remove: &Document,
) {
    let Some((&index, parent_path)) = path.split_last() else {
        return;
    };

    // When a text leaf is removed right after a sibling that now ends with
    // its text (a merge), points inside it move into the sibling.
    let merge_prefix_len = match (removed, index.checked_sub(1)) {
        (Node::Text(removed_text), Some(left_index)) => {
            let mut left_path = parent_path.to_vec();
            left_path.push(left_index);
            match doc_after_remove.node(&left_path) {
                Some(Node::Text(left_text))
                    if left_text.marks == removed_text.marks
                        && left_text.text.ends_with(&removed_text.text) =>
                {
                    Some(left_text.text.len().saturating_sub(removed_text.text.len()))
                }
                _ => None,
            }
        }
        _ => None,
    };

    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix > index {
            point.path[depth] = ix - 1;
            continue;
        }
        if ix < index {
            continue;
        }

        if let (Some(prefix), Node::Text(removed_text), Some(left_index)) =
            (merge_prefix_len, removed, index.checked_sub(1))
        {
            point.path.truncate(depth + 1);
            point.path[depth] = left_index;
            point.offset = (prefix + point.offset).min(prefix + removed_text.text.len());
        } else {
            point.path.truncate(depth + 1);
            point.path[depth] = index.saturating_sub(1);
            point.offset = 0;
        }
    }
}

/// Points inside the replaced range keep their path while the replacement
/// still has a child at that index (block conversions keep their shape);
/// otherwise they collapse onto the last replacement child.
fn transform_selection_replace_children(
    selection: &mut Selection,
    parent_path: &[usize],
    range: Range<usize>,
    inserted: usize,
) {
    let removed = range.end - range.start;
    for point in [&mut selection.anchor, &mut selection.focus] {
        if point.path.len() <= parent_path.len() || !point.path.starts_with(parent_path) {
            continue;
        }
        let depth = parent_path.len();
        let ix = point.path[depth];
        if ix >= range.end {
            point.path[depth] = ix - removed + inserted;
        } else if ix >= range.start && ix >= range.start + inserted {
            point.path.truncate(depth + 1);
            point.path[depth] = (range.start + inserted).saturating_sub(1);
            point.offset = 0;
        }
    }
}

pub(crate) fn first_text_point(doc: &Document) -> Option<Point> {
    let mut path = Vec::new();
    first_text_descendant(&doc.content, &mut path)
}

fn first_text_descendant(children: &[Node], path: &mut Path) -> Option<Point> {
    for (ix, child) in children.iter().enumerate() {
        path.push(ix);
        match child {
            Node::Text(_) => return Some(Point::new(path.clone(), 0)),
            node => {
                if let Some(children) = node.children()
                    && let Some(point) = first_text_descendant(children, path)
                {
                    return Some(point);
                }
            }
        }
        path.pop();
    }
    None
}

fn last_text_descendant(children: &[Node], path: &mut Path) -> Option<Point> {
    for (ix, child) in children.iter().enumerate().rev() {
        path.push(ix);
        match child {
            Node::Text(t) => return Some(Point::new(path.clone(), t.text.len())),
            node => {
                if let Some(children) = node.children()
                    && let Some(point) = last_text_descendant(children, path)
                {
                    return Some(point);
                }
            }
        }
        path.pop();
    }
    None
}

pub(crate) fn normalize_selection(doc: &Document, selection: &Selection) -> Selection {
    let fallback = first_text_point(doc).unwrap_or_else(|| Point::new(vec![0], 0));
    let anchor = normalize_point_to_existing_text(doc, &selection.anchor).unwrap_or_else(|| fallback.clone());
    let focus = normalize_point_to_existing_text(doc, &selection.focus).unwrap_or(fallback);
    Selection { anchor, focus }
}

/// Resolves a possibly stale point to a text position. Indices are clamped
/// level by level; a point that lands on a leaf without text moves to the
/// nearest text in the following blocks, then the preceding ones.
fn normalize_point_to_existing_text(doc: &Document, point: &Point) -> Option<Point> {
    let mut resolved_path = Vec::new();
    let mut children = doc.content.as_slice();

    for &wanted in &point.path {
        if children.is_empty() {
            break;
        }
        let ix = wanted.min(children.len() - 1);
        resolved_path.push(ix);
        match &children[ix] {
            Node::Text(t) => {
                return Some(Point::new(
                    resolved_path,
                    clamp_to_char_boundary(&t.text, point.offset),
                ));
            }
            Node::HardBreak => {
                // Start of the line after the break.
                if let Some(next) = children[ix + 1..].iter().position(|n| matches!(n, Node::Text(_)))
                    && let Some(last) = resolved_path.last_mut()
                {
                    *last = ix + 1 + next;
                    return Some(Point::new(resolved_path, 0));
                }
                break;
            }
            node => match node.children() {
                Some(next) => children = next,
                None => break,
            },
        }
    }

    if let Some(node) = doc.node(&resolved_path)
        && let Some(children) = node.children()
    {
        let mut path = resolved_path.clone();
        if let Some(point) = first_text_descendant(children, &mut path) {
            return Some(point);
        }
    }

    let top = resolved_path.first().copied().unwrap_or(0);
    let mut path = Vec::new();
    if let Some(after) = doc.content.get(top..)
        && let Some(point) = first_text_descendant_from(after, top, &mut path)
    {
        return Some(point);
    }
    path.clear();
    last_text_descendant(&doc.content[..top.min(doc.content.len())], &mut path)
}

fn first_text_descendant_from(children: &[Node], start: usize, path: &mut Path) -> Option<Point> {
    let mut point = first_text_descendant(children, path)?;
    if let Some(first) = point.path.first_mut() {
        *first += start;
    }
    Some(point)
}
