use std::collections::HashMap;
use std::sync::{Arc, LazyLock};

use regex::Regex;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::core::{Editor, EditorState, Point, Selection};
use crate::fuzzy;
use crate::heading_id::HeadingIdentityPlugin;
use crate::node::{
    Alignment, Container, Document, HeadingAttrs, HeadingLevel, HeadingNode, ListKind, MarkKind, Marks, MediaAttrs,
    MediaType, Node, NodeAttrs, TextNode,
};
use crate::ops::{Op, Path, Transaction};

#[derive(Debug, Clone, thiserror::Error)]
#[error("{message}")]
pub struct CommandError {
    message: String,
}

impl CommandError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

type CommandHandler =
    Arc<dyn Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync>;

#[derive(Clone)]
pub struct CommandSpec {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub keywords: Vec<String>,
    pub args_example: Option<Value>,
    pub handler: CommandHandler,
}

impl CommandSpec {
    pub fn new(
        id: impl Into<String>,
        label: impl Into<String>,
        handler: impl Fn(&mut Editor, Option<Value>) -> Result<(), CommandError> + Send + Sync + 'static,
    ) -> Self {
        Self {
            id: id.into(),
            label: label.into(),
            description: None,
            keywords: Vec::new(),
            args_example: None,
            handler: Arc::new(handler),
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn keywords<I, S>(mut self, keywords: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.keywords = keywords.into_iter().map(Into::into).collect();
        self
    }

    pub fn args_example(mut self, args_example: Value) -> Self {
        self.args_example = Some(args_example);
        self
    }
}

/// Order in which append passes are offered a transaction. Structural
/// repairs run before identity assignment so ids are computed over the
/// repaired tree; observers see the final shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum PluginStage {
    Normalize,
    Identity,
    Observe,
}

/// A pass that may follow a transaction with another one. Returning `None`
/// (or an empty transaction) means the pass is satisfied.
pub trait AppendTransaction: Send + Sync {
    fn id(&self) -> &'static str;

    fn stage(&self) -> PluginStage {
        PluginStage::Normalize
    }

    fn append(&self, old: &EditorState, new: &EditorState, tx: &Transaction)
    -> Option<Transaction>;
}

/// Document-only repair. Ops must be valid when applied in order, so passes
/// emit them back to front.
pub trait NormalizePass: Send + Sync {
    fn id(&self) -> &'static str;
    fn run(&self, doc: &Document) -> Vec<Op>;
}

struct Normalizer(Box<dyn NormalizePass>);

impl AppendTransaction for Normalizer {
    fn id(&self) -> &'static str {
        self.0.id()
    }

    fn append(
        &self,
        _old: &EditorState,
        new: &EditorState,
        _tx: &Transaction,
    ) -> Option<Transaction> {
        let ops = self.0.run(&new.doc);
        (!ops.is_empty()).then(|| {
            Transaction::new(ops)
                .source(format!("normalize:{}", self.0.id()))
                .without_history()
        })
    }
}

pub trait EditorPlugin: Send + Sync {
    fn id(&self) -> &'static str;
    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        Vec::new()
    }
    fn append_passes(&self) -> Vec<Box<dyn AppendTransaction>> {
        Vec::new()
    }
    fn commands(&self) -> Vec<CommandSpec> {
        Vec::new()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RegistryError {
    #[error("duplicate command id: {0}")]
    DuplicateCommand(String),
    #[error("duplicate plugin id: {0}")]
    DuplicatePlugin(String),
}

#[derive(Default)]
pub struct PluginRegistry {
    plugin_ids: Vec<&'static str>,
    append_passes: Vec<Box<dyn AppendTransaction>>,
    commands: HashMap<String, CommandSpec>,
}

impl PluginRegistry {
    pub fn new(
        plugins: impl IntoIterator<Item = Box<dyn EditorPlugin>>,
    ) -> Result<Self, RegistryError> {
        let mut registry = Self::default();
        for plugin in plugins {
            registry.register_plugin(plugin)?;
        }
        Ok(registry)
    }

    /// Structural normalization only.
    pub fn core() -> Self {
        Self::from_builtin(vec![Box::new(CoreNormalizePlugin)])
    }

    /// The full editor: structure, heading ids and every block command.
    pub fn notitap() -> Self {
        Self::from_builtin(vec![
            Box::new(CoreNormalizePlugin),
            Box::new(TrailingParagraphPlugin),
            Box::new(HeadingIdentityPlugin),
            Box::new(BlockCommandsPlugin),
            Box::new(ListPlugin),
            Box::new(BlockquotePlugin),
            Box::new(MarksCommandsPlugin),
            Box::new(MediaPlugin),
        ])
    }

    fn from_builtin(plugins: Vec<Box<dyn EditorPlugin>>) -> Self {
        let mut registry = Self::default();
        for plugin in plugins {
            if let Err(err) = registry.register_plugin(plugin) {
                tracing::error!(error = %err, "builtin plugin rejected");
            }
        }
        registry
    }

    pub fn register_plugin(&mut self, plugin: Box<dyn EditorPlugin>) -> Result<(), RegistryError> {
        if self.plugin_ids.contains(&plugin.id()) {
            return Err(RegistryError::DuplicatePlugin(plugin.id().to_string()));
        }
        let commands = plugin.commands();
        if let Some(cmd) = commands.iter().find(|cmd| self.commands.contains_key(&cmd.id)) {
            return Err(RegistryError::DuplicateCommand(cmd.id.clone()));
        }

        self.plugin_ids.push(plugin.id());
        for pass in plugin.normalize_passes() {
            self.append_passes.push(Box::new(Normalizer(pass)));
        }
        self.append_passes.extend(plugin.append_passes());
        // Stable: registration order is kept within a stage.
        self.append_passes.sort_by_key(|pass| pass.stage());

        for cmd in commands {
            self.commands.insert(cmd.id.clone(), cmd);
        }
        Ok(())
    }

    pub fn append_passes(&self) -> &[Box<dyn AppendTransaction>] {
        &self.append_passes
    }

    pub fn commands(&self) -> &HashMap<String, CommandSpec> {
        &self.commands
    }

    pub fn command(&self, id: &str) -> Option<CommandSpec> {
        self.commands.get(id).cloned()
    }

    /// Commands ranked against `query` by label, keywords and id. An empty
    /// query lists every command sorted by id.
    pub fn search_commands(&self, query: &str) -> Vec<&CommandSpec> {
        let mut all: Vec<&CommandSpec> = self.commands.values().collect();
        all.sort_by(|a, b| a.id.cmp(&b.id));
        let query = query.trim();
        if query.is_empty() {
            return all;
        }

        let mut ranked: Vec<(i64, &CommandSpec)> = all
            .into_iter()
            .filter_map(|cmd| {
                std::iter::once(cmd.label.as_str())
                    .chain(cmd.keywords.iter().map(String::as_str))
                    .chain(std::iter::once(cmd.id.as_str()))
                    .filter_map(|candidate| fuzzy::score(query, candidate))
                    .max()
                    .filter(|score| *score > fuzzy::MIN_SCORE)
                    .map(|score| (score, cmd))
            })
            .collect();
        ranked.sort_by(|a, b| b.0.cmp(&a.0));
        ranked.into_iter().map(|(_, cmd)| cmd).collect()
    }
}

struct CoreNormalizePlugin;

impl EditorPlugin for CoreNormalizePlugin {
    fn id(&self) -> &'static str {
        "core.normalize"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![
            Box::new(EnsureNonEmptyDocument),
            Box::new(WrapTopLevelBlocks),
            Box::new(NormalizeContainers),
            Box::new(EnsureTextBlockHasTextLeaf),
            Box::new(MergeAdjacentTextLeaves),
        ]
    }
}

/// Keeps a paragraph at the end of the document.
struct TrailingParagraphPlugin;

impl EditorPlugin for TrailingParagraphPlugin {
    fn id(&self) -> &'static str {
        "trailing_paragraph"
    }

    fn normalize_passes(&self) -> Vec<Box<dyn NormalizePass>> {
        vec![Box::new(EnsureTrailingParagraph)]
    }
}

struct EnsureTrailingParagraph;

impl NormalizePass for EnsureTrailingParagraph {
    fn id(&self) -> &'static str {
        "trailing_paragraph.ensure"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        // Wrappers that are still being repaired are left to the core passes.
        match doc.content.last() {
            Some(Node::BlockWrapper(w)) => match w.content.as_slice() {
                [Node::Paragraph(_)] => Vec::new(),
                [_] => vec![Op::InsertNode {
                    path: vec![doc.content.len()],
                    node: Node::wrapped(Node::paragraph("")),
                }],
                _ => Vec::new(),
            },
            _ => Vec::new(),
        }
    }
}

struct EnsureNonEmptyDocument;

impl NormalizePass for EnsureNonEmptyDocument {
    fn id(&self) -> &'static str {
        "core.ensure_non_empty_document"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        if doc.content.is_empty() {
            return vec![Op::InsertNode {
                path: vec![0],
                node: Node::wrapped(Node::paragraph("")),
            }];
        }
        Vec::new()
    }
}

/// Every top-level block sits in exactly one `dBlock`, and `dBlock`s
/// appear nowhere else.
struct WrapTopLevelBlocks;

impl NormalizePass for WrapTopLevelBlocks {
    fn id(&self) -> &'static str {
        "core.wrap_top_level_blocks"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        let mut ops = Vec::new();

        for (ix, node) in doc.content.iter().enumerate().rev() {
            let replace = |content: Vec<Node>| Op::ReplaceChildren {
                path: Vec::new(),
                range: ix..ix + 1,
                content,
            };
            match node {
                Node::BlockWrapper(wrapper) => match wrapper.content.as_slice() {
                    [] => ops.push(Op::RemoveNode { path: vec![ix] }),
                    [Node::BlockWrapper(inner)] => ops.push(replace(vec![Node::BlockWrapper(
                        inner.clone(),
                    )])),
                    [Node::Text(_) | Node::HardBreak | Node::ListItem(_)] => {
                        ops.push(replace(vec![Node::wrapped(as_block(
                            wrapper.content[0].clone(),
                        ))]))
                    }
                    [single] => unwrap_nested_wrappers(single, &mut vec![ix, 0], &mut ops),
                    many => ops.push(replace(
                        many.iter()
                            .cloned()
                            .map(|child| match child {
                                Node::BlockWrapper(_) => child,
                                child => Node::wrapped(as_block(child)),
                            })
                            .collect(),
                    )),
                },
                bare => ops.push(replace(vec![Node::wrapped(as_block(bare.clone()))])),
            }
        }

        ops
    }
}

/// Turns nodes that cannot stand as a block on their own into one.
fn as_block(node: Node) -> Node {
    match node {
        Node::Text(_) | Node::HardBreak => Node::Paragraph(Container::new(vec![node])),
        Node::ListItem(_) => Node::list(ListKind::Bullet, vec![node]),
        node => node,
    }
}

fn unwrap_nested_wrappers(node: &Node, path: &mut Path, ops: &mut Vec<Op>) {
    let Some(children) = node.children() else {
        return;
    };
    for (ix, child) in children.iter().enumerate().rev() {
        path.push(ix);
        if let Node::BlockWrapper(inner) = child {
            let (parent, _) = path.split_at(path.len() - 1);
            ops.push(Op::ReplaceChildren {
                path: parent.to_vec(),
                range: ix..ix + 1,
                content: inner.content.clone(),
            });
        } else {
            unwrap_nested_wrappers(child, path, ops);
        }
        path.pop();
    }
}

/// Lists hold list items, list items and blockquotes hold blocks, and
/// empty lists and blockquotes disappear.
struct NormalizeContainers;

impl NormalizePass for NormalizeContainers {
    fn id(&self) -> &'static str {
        "core.normalize_containers"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Path, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate().rev() {
                path.push(ix);
                let fix = match node {
                    Node::BulletList(c) | Node::OrderedList(c) if c.content.is_empty() => {
                        Some(Op::RemoveNode { path: path.clone() })
                    }
                    Node::Blockquote(c) if c.content.is_empty() => {
                        Some(Op::RemoveNode { path: path.clone() })
                    }
                    Node::BulletList(c) | Node::OrderedList(c) => c
                        .content
                        .iter()
                        .rposition(|item| !matches!(item, Node::ListItem(_)))
                        .map(|bad| {
                            let item = c.content[bad].clone();
                            let blocks = match item {
                                Node::BulletList(_) | Node::OrderedList(_) => vec![item],
                                item => vec![as_block(item)],
                            };
                            Op::ReplaceChildren {
                                path: path.clone(),
                                range: bad..bad + 1,
                                content: vec![Node::list_item(blocks)],
                            }
                        }),
                    Node::ListItem(c) if c.content.is_empty() => Some(Op::InsertNode {
                        path: child_path(path, 0),
                        node: Node::paragraph(""),
                    }),
                    Node::ListItem(c) | Node::Blockquote(c) => c
                        .content
                        .iter()
                        .rposition(Node::is_inline)
                        .map(|bad| Op::ReplaceChildren {
                            path: path.clone(),
                            range: bad..bad + 1,
                            content: vec![as_block(c.content[bad].clone())],
                        }),
                    _ => None,
                };
                match fix {
                    Some(op) => ops.push(op),
                    None => {
                        if let Some(children) = node.children() {
                            walk(children, path, ops);
                        }
                    }
                }
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.content, &mut Vec::new(), &mut ops);
        ops
    }
}

/// Paragraphs and headings contain only text leaves and hard breaks, with
/// at least one text leaf on each side of every break.
struct EnsureTextBlockHasTextLeaf;

impl NormalizePass for EnsureTextBlockHasTextLeaf {
    fn id(&self) -> &'static str {
        "core.ensure_text_block_has_text_leaf"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Path, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate().rev() {
                path.push(ix);
                if node.is_text_block() {
                    repair_inline_content(node.children().unwrap_or(&[]), path, ops);
                } else if let Some(children) = node.children() {
                    walk(children, path, ops);
                }
                path.pop();
            }
        }

        let mut ops = Vec::new();
        walk(&doc.content, &mut Vec::new(), &mut ops);
        ops
    }
}

fn repair_inline_content(content: &[Node], path: &Path, ops: &mut Vec<Op>) {
    let mut end = content.len();
    loop {
        let start = content[..end]
            .iter()
            .rposition(|n| matches!(n, Node::HardBreak))
            .map_or(0, |brk| brk + 1);
        let segment = &content[start..end];

        // Keep a non-empty leaf if there is one, else the first leaf.
        let keep = segment
            .iter()
            .position(|n| matches!(n, Node::Text(t) if !t.text.is_empty()))
            .or_else(|| segment.iter().position(|n| matches!(n, Node::Text(_))));
        for (ix, child) in segment.iter().enumerate().rev() {
            let drop = match child {
                Node::Text(t) => t.text.is_empty() && Some(ix) != keep,
                _ => true,
            };
            if drop {
                ops.push(Op::RemoveNode {
                    path: child_path(path, start + ix),
                });
            }
        }
        if keep.is_none() {
            ops.push(Op::InsertNode {
                path: child_path(path, start),
                node: Node::text(""),
            });
        }

        if start == 0 {
            break;
        }
        end = start - 1;
    }
}

struct MergeAdjacentTextLeaves;

impl NormalizePass for MergeAdjacentTextLeaves {
    fn id(&self) -> &'static str {
        "core.merge_adjacent_text_leaves"
    }

    fn run(&self, doc: &Document) -> Vec<Op> {
        fn walk(children: &[Node], path: &mut Path, ops: &mut Vec<Op>) {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                if node.is_text_block() {
                    merge_block(node.children().unwrap_or(&[]), path, ops);
                } else if let Some(children) = node.children() {
                    walk(children, path, ops);
                }
                path.pop();
            }
        }

        fn merge_block(children: &[Node], path: &Path, ops: &mut Vec<Op>) {
            let mut ix = children.len();
            while ix > 0 {
                ix -= 1;
                let Node::Text(right) = &children[ix] else {
                    continue;
                };

                let mut start = ix;
                while start > 0 {
                    let Some(Node::Text(left)) = children.get(start - 1) else {
                        break;
                    };
                    if left.marks != right.marks {
                        break;
                    }
                    start -= 1;
                }
                if start == ix {
                    continue;
                }

                let Some(Node::Text(first)) = children.get(start) else {
                    continue;
                };
                let appended: String = children[start + 1..=ix]
                    .iter()
                    .filter_map(|n| match n {
                        Node::Text(t) => Some(t.text.as_str()),
                        _ => None,
                    })
                    .collect();

                if !appended.is_empty() {
                    ops.push(Op::InsertText {
                        path: child_path(path, start),
                        offset: first.text.len(),
                        text: appended,
                    });
                }
                for remove_ix in (start + 1..=ix).rev() {
                    ops.push(Op::RemoveNode {
                        path: child_path(path, remove_ix),
                    });
                }
                ix = start;
            }
        }

        let mut ops = Vec::new();
        walk(&doc.content, &mut Vec::new(), &mut ops);
        ops
    }
}

fn child_path(parent: &[usize], ix: usize) -> Path {
    let mut path = parent.to_vec();
    path.push(ix);
    path
}

fn apply_command(editor: &mut Editor, tx: Result<Transaction, String>, what: &str) -> Result<(), CommandError> {
    let tx = tx.map_err(CommandError::new)?;
    if tx.ops.is_empty() {
        return Ok(());
    }
    editor
        .apply(tx)
        .map_err(|e| CommandError::new(format!("Failed to {what}: {e}")))
}

struct BlockCommandsPlugin;

impl EditorPlugin for BlockCommandsPlugin {
    fn id(&self) -> &'static str {
        "block.commands"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("block.set_paragraph", "Paragraph", |editor, _args| {
                let tx = set_paragraph(editor.state());
                apply_command(editor, tx, "set paragraph")
            })
            .description("Convert the active text block into a paragraph.")
            .keywords(["paragraph", "text", "body"]),
            CommandSpec::new("block.set_heading", "Set heading", |editor, args| {
                let level = heading_level_arg(args.as_ref())?;
                let tx = set_heading(editor.state(), level);
                apply_command(editor, tx, "set heading")
            })
            .description("Convert the active text block into a heading.")
            .keywords(["heading", "title", "h1", "h2", "h3"])
            .args_example(serde_json::json!({ "level": 2 })),
            CommandSpec::new("block.toggle_heading", "Toggle heading", |editor, args| {
                let level = heading_level_arg(args.as_ref())?;
                let tx = toggle_heading(editor.state(), level);
                apply_command(editor, tx, "toggle heading")
            })
            .description("Turn the active block into a heading, or back into a paragraph.")
            .keywords(["heading", "title", "toggle"])
            .args_example(serde_json::json!({ "level": 1 })),
            CommandSpec::new("block.insert_wrapper", "Insert block", |editor, _args| {
                let tx = insert_block_after_focus(editor.state(), Node::paragraph(""));
                apply_command(editor, tx, "insert block")
            })
            .description("Insert an empty block below the current one.")
            .keywords(["block", "insert", "new"]),
            CommandSpec::new("block.split", "Split block", |editor, _args| {
                let tx = split_block(editor.state());
                apply_command(editor, tx, "split block")
            })
            .description("Move everything after the cursor into a new block (Enter).")
            .keywords(["enter", "split", "newline"]),
            CommandSpec::new("block.hard_break", "Line break", |editor, _args| {
                let tx = insert_hard_break(editor.state());
                apply_command(editor, tx, "insert line break")
            })
            .description("Break the line without leaving the block (Shift-Enter).")
            .keywords(["break", "newline", "shift enter"]),
        ]
    }
}

fn heading_level_arg(args: Option<&Value>) -> Result<HeadingLevel, CommandError> {
    let level = args
        .and_then(|v| v.get("level"))
        .and_then(|v| v.as_u64())
        .unwrap_or(1);
    u8::try_from(level)
        .ok()
        .and_then(HeadingLevel::new)
        .ok_or_else(|| CommandError::new(format!("Heading level must be 1, 2 or 3, got {level}")))
}

/// The paragraph or heading holding the selection focus.
fn focus_text_block(state: &EditorState) -> Result<(Path, &Node), String> {
    let focus = &state.selection.focus;
    let Some((_, block_path)) = focus.path.split_last() else {
        return Err("No active block".into());
    };
    match state.doc.node(block_path) {
        Some(node) if node.is_text_block() => Ok((block_path.to_vec(), node)),
        Some(_) => Err("Active block is not a text block".into()),
        None => Err("No active block".into()),
    }
}

fn replace_block(path: &[usize], node: Node) -> Op {
    let (ix, parent) = match path.split_last() {
        Some((&ix, parent)) => (ix, parent.to_vec()),
        None => (0, Vec::new()),
    };
    Op::ReplaceChildren {
        path: parent,
        range: ix..ix + 1,
        content: vec![node],
    }
}

fn text_content_of(node: &Node) -> Vec<Node> {
    node.children().map(<[Node]>::to_vec).unwrap_or_default()
}

pub(crate) fn set_paragraph(state: &EditorState) -> Result<Transaction, String> {
    let (path, node) = focus_text_block(state)?;
    if matches!(node, Node::Paragraph(_)) {
        return Ok(Transaction::default());
    }
    let paragraph = Node::Paragraph(Container::new(text_content_of(node)));
    Ok(Transaction::new(vec![replace_block(&path, paragraph)])
        .selection_after(state.selection.clone())
        .source("command:block.set_paragraph"))
}

pub(crate) fn set_heading(state: &EditorState, level: HeadingLevel) -> Result<Transaction, String> {
    let (path, node) = focus_text_block(state)?;
    if let Node::Heading(h) = node
        && h.attrs.level == level
    {
        return Ok(Transaction::default());
    }
    let heading = Node::Heading(HeadingNode {
        attrs: HeadingAttrs::new(level),
        content: text_content_of(node),
    });
    Ok(Transaction::new(vec![replace_block(&path, heading)])
        .selection_after(state.selection.clone())
        .source("command:block.set_heading"))
}

fn toggle_heading(state: &EditorState, level: HeadingLevel) -> Result<Transaction, String> {
    let (_, node) = focus_text_block(state)?;
    match node {
        Node::Heading(h) if h.attrs.level == level => set_paragraph(state),
        _ => set_heading(state, level),
    }
}

/// Splits a text block's inline content around a selection. The selected
/// range is dropped; marks on both halves are kept.
fn split_inline(children: &[Node], start: (usize, usize), end: (usize, usize)) -> Option<(Vec<Node>, Vec<Node>)> {
    let (Node::Text(first), Node::Text(last)) = (children.get(start.0)?, children.get(end.0)?) else {
        return None;
    };
    let mut head = children.get(..start.0)?.to_vec();
    head.push(Node::Text(TextNode {
        text: first.text.get(..start.1)?.to_string(),
        marks: first.marks,
    }));
    let mut tail = vec![Node::Text(TextNode {
        text: last.text.get(end.1..)?.to_string(),
        marks: last.marks,
    })];
    tail.extend_from_slice(children.get(end.0 + 1..)?);
    Some((head, tail))
}

fn is_blank(content: &[Node]) -> bool {
    content
        .iter()
        .all(|n| matches!(n, Node::Text(t) if t.text.is_empty()))
}

/// The text block holding a selection that does not leave it, with the
/// leaf index and offset of both ends in document order.
fn selected_text_block(state: &EditorState) -> Result<(Path, &Node, (usize, usize), (usize, usize)), String> {
    let (start, end) = ordered_selection_points(&state.selection);
    let (Some((&start_leaf, start_block)), Some((&end_leaf, end_block))) =
        (start.path.split_last(), end.path.split_last())
    else {
        return Err("No active block".into());
    };
    if start_block != end_block {
        return Err("Selection spans several blocks".into());
    }
    match state.doc.node(start_block) {
        Some(node) if node.is_text_block() => Ok((
            start_block.to_vec(),
            node,
            (start_leaf, start.offset),
            (end_leaf, end.offset),
        )),
        _ => Err("Active block is not a text block".into()),
    }
}

/// Enter: the text after the selection moves into a new block below. Inside
/// a list the item is split, and an empty item is lifted out of its list.
pub(crate) fn split_block(state: &EditorState) -> Result<Transaction, String> {
    let (block_path, block, start, end) = selected_text_block(state)?;
    let children = block.children().unwrap_or(&[]);
    let (head, tail) = split_inline(children, start, end).ok_or("Selection is not inside text")?;

    let head_block = match block {
        Node::Heading(h) => Node::Heading(HeadingNode {
            attrs: h.attrs.clone(),
            content: head,
        }),
        _ => Node::Paragraph(Container::new(head)),
    };
    // A heading only continues when text follows the cursor.
    let tail_block = match block {
        Node::Heading(h) if !is_blank(&tail) => Node::Heading(HeadingNode {
            attrs: HeadingAttrs::new(h.attrs.level),
            content: tail,
        }),
        _ => Node::Paragraph(Container::new(tail)),
    };

    // [.., list, item, block]
    if let [list_path @ .., item_ix, block_ix] = block_path.as_slice()
        && let (Some(list), Some(Node::ListItem(item))) = (
            state.doc.node(list_path),
            state.doc.node(&block_path[..block_path.len() - 1]),
        )
        && let Some(kind) = list.list_kind()
    {
        if block.text_content().is_empty() {
            return toggle_list(state, kind).map(|tx| tx.source("command:block.split"));
        }
        let mut first = item.content[..*block_ix].to_vec();
        first.push(head_block);
        let mut second = vec![tail_block];
        second.extend_from_slice(&item.content[block_ix + 1..]);

        let mut cursor = list_path.to_vec();
        cursor.extend([item_ix + 1, 0, 0]);
        return Ok(Transaction::new(vec![Op::ReplaceChildren {
            path: list_path.to_vec(),
            range: *item_ix..item_ix + 1,
            content: vec![Node::list_item(first), Node::list_item(second)],
        }])
        .selection_after(Selection::collapsed(Point::new(cursor, 0)))
        .source("command:block.split"));
    }

    let replacement = BlockReplacement::new(&block_path, vec![head_block, tail_block]);
    let cursor = child_path(&replacement.block_path(1), 0);
    Ok(Transaction::new(vec![replacement.op])
        .selection_after(Selection::collapsed(Point::new(cursor, 0)))
        .source("command:block.split"))
}

/// Shift-Enter: replaces the selection with a hard break.
pub(crate) fn insert_hard_break(state: &EditorState) -> Result<Transaction, String> {
    let (block_path, block, start, end) = selected_text_block(state)?;
    let children = block.children().unwrap_or(&[]);
    let (mut content, tail) = split_inline(children, start, end).ok_or("Selection is not inside text")?;

    content.push(Node::HardBreak);
    let cursor = child_path(&block_path, content.len());
    content.extend(tail);
    Ok(Transaction::new(vec![Op::ReplaceChildren {
        path: block_path,
        range: 0..children.len(),
        content,
    }])
    .selection_after(Selection::collapsed(Point::new(cursor, 0)))
    .source("command:block.hard_break"))
}

/// Inserts `block` in a new top-level wrapper below the focused one and
/// moves the cursor into it when it holds text.
pub(crate) fn insert_block_after_focus(state: &EditorState, block: Node) -> Result<Transaction, String> {
    let index = state
        .focus_block()
        .map(|ix| ix + 1)
        .unwrap_or(state.doc.content.len())
        .min(state.doc.content.len());
    let cursor = block.is_text_block().then(|| Point::new(vec![index, 0, 0], 0));
    let mut tx = Transaction::new(vec![Op::InsertNode {
        path: vec![index],
        node: Node::wrapped(block),
    }])
    .source("command:block.insert");
    if let Some(point) = cursor {
        tx = tx.selection_after(Selection::collapsed(point));
    }
    Ok(tx)
}

/// Replacement of one block by several, keeping the one-block-per-wrapper
/// shape at the top level.
struct BlockReplacement {
    op: Op,
    parent: Path,
    first: usize,
    count: usize,
    top_level: bool,
}

impl BlockReplacement {
    fn new(path: &[usize], blocks: Vec<Node>) -> Self {
        let top_level = path.len() == 2 && path[1] == 0;
        let count = blocks.len();
        if top_level {
            let w = path[0];
            Self {
                op: Op::ReplaceChildren {
                    path: Vec::new(),
                    range: w..w + 1,
                    content: blocks.into_iter().map(Node::wrapped).collect(),
                },
                parent: Vec::new(),
                first: w,
                count,
                top_level,
            }
        } else {
            let (ix, parent) = match path.split_last() {
                Some((&ix, parent)) => (ix, parent.to_vec()),
                None => (0, Vec::new()),
            };
            Self {
                op: Op::ReplaceChildren {
                    path: parent.clone(),
                    range: ix..ix + 1,
                    content: blocks,
                },
                parent,
                first: ix,
                count,
                top_level,
            }
        }
    }

    /// Shifts points that sit in siblings after the replaced block.
    fn shift_following(&self, point: &Point) -> Option<Point> {
        let depth = self.parent.len();
        let ix = *point.path.get(depth)?;
        if !point.path.starts_with(&self.parent) || ix <= self.first {
            return None;
        }
        let mut path = point.path.clone();
        path[depth] = ix + self.count - 1;
        Some(Point::new(path, point.offset))
    }

    fn block_path(&self, i: usize) -> Path {
        let mut path = self.parent.clone();
        path.push(self.first + i);
        if self.top_level {
            path.push(0);
        }
        path
    }
}

fn rebase(point: &Point, old_prefix: &[usize], new_prefix: &[usize]) -> Option<Point> {
    let rest = point.path.strip_prefix(old_prefix)?;
    let mut path = new_prefix.to_vec();
    path.extend_from_slice(rest);
    Some(Point::new(path, point.offset))
}

fn map_selection(selection: &Selection, f: impl Fn(&Point) -> Option<Point>) -> Selection {
    Selection {
        anchor: f(&selection.anchor).unwrap_or_else(|| selection.anchor.clone()),
        focus: f(&selection.focus).unwrap_or_else(|| selection.focus.clone()),
    }
}

struct ListPlugin;

impl EditorPlugin for ListPlugin {
    fn id(&self) -> &'static str {
        "list"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("list.toggle_bullet", "Bullet list", |editor, _args| {
                let tx = toggle_list(editor.state(), ListKind::Bullet);
                apply_command(editor, tx, "toggle bullet list")
            })
            .description("Wrap the active block in a bullet list, or lift it out.")
            .keywords(["list", "bullet", "unordered", "ul"]),
            CommandSpec::new("list.toggle_ordered", "Ordered list", |editor, _args| {
                let tx = toggle_list(editor.state(), ListKind::Ordered);
                apply_command(editor, tx, "toggle ordered list")
            })
            .description("Wrap the active block in an ordered list, or lift it out.")
            .keywords(["list", "ordered", "numbered", "ol"]),
        ]
    }
}

pub(crate) fn toggle_list(state: &EditorState, kind: ListKind) -> Result<Transaction, String> {
    let (block_path, block) = focus_text_block(state)?;
    let source = match kind {
        ListKind::Bullet => "command:list.toggle_bullet",
        ListKind::Ordered => "command:list.toggle_ordered",
    };

    // [.., list, item, block]
    let enclosing = (block_path.len() >= 3)
        .then(|| {
            let item_path = &block_path[..block_path.len() - 1];
            let list_path = &block_path[..block_path.len() - 2];
            match (state.doc.node(list_path), state.doc.node(item_path)) {
                (Some(list), Some(Node::ListItem(_))) => {
                    list.list_kind().map(|k| (list_path.to_vec(), list, k))
                }
                _ => None,
            }
        })
        .flatten();

    let Some((list_path, list, current)) = enclosing else {
        let wrapped = Node::list(kind, vec![Node::list_item(vec![block.clone()])]);
        let mut new_prefix = block_path.clone();
        new_prefix.extend([0, 0]);
        let selection = map_selection(&state.selection, |p| rebase(p, &block_path, &new_prefix));
        return Ok(Transaction::new(vec![replace_block(&block_path, wrapped)])
            .selection_after(selection)
            .source(source));
    };

    let items = list.children().unwrap_or(&[]);
    if current != kind {
        let switched = Node::list(kind, items.to_vec());
        return Ok(Transaction::new(vec![replace_block(&list_path, switched)])
            .selection_after(state.selection.clone())
            .source(source));
    }

    // Lift the item out, splitting the list around it.
    let item_ix = block_path[block_path.len() - 2];
    let before = &items[..item_ix];
    let after = &items[item_ix + 1..];
    let lifted = items[item_ix].children().unwrap_or(&[]).to_vec();

    let mut blocks = Vec::new();
    if !before.is_empty() {
        blocks.push(Node::list(kind, before.to_vec()));
    }
    let lifted_start = blocks.len();
    let lifted_len = lifted.len();
    blocks.extend(lifted);
    if !after.is_empty() {
        blocks.push(Node::list(kind, after.to_vec()));
    }

    let replacement = BlockReplacement::new(&list_path, blocks);
    let selection = map_selection(&state.selection, |p| {
        let Some(rest) = p.path.strip_prefix(list_path.as_slice()) else {
            return replacement.shift_following(p);
        };
        let (&ix, tail) = rest.split_first()?;
        let (new_block, tail): (Path, &[usize]) = if ix < item_ix {
            let mut path = replacement.block_path(0);
            path.push(ix);
            (path, tail)
        } else if ix == item_ix {
            let (&child, tail) = tail.split_first()?;
            (replacement.block_path(lifted_start + child), tail)
        } else {
            let mut path = replacement.block_path(lifted_start + lifted_len);
            path.push(ix - item_ix - 1);
            (path, tail)
        };
        let mut path = new_block;
        path.extend_from_slice(tail);
        Some(Point::new(path, p.offset))
    });

    Ok(Transaction::new(vec![replacement.op])
        .selection_after(selection)
        .source(source))
}

struct BlockquotePlugin;

impl EditorPlugin for BlockquotePlugin {
    fn id(&self) -> &'static str {
        "blockquote"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("blockquote.toggle", "Blockquote", |editor, _args| {
                let tx = toggle_blockquote(editor.state());
                apply_command(editor, tx, "toggle blockquote")
            })
            .description("Wrap the active block in a blockquote, or unwrap it.")
            .keywords(["quote", "blockquote", "citation"]),
        ]
    }
}

fn nearest_blockquote_path(doc: &Document, point_path: &[usize]) -> Option<Path> {
    (1..point_path.len())
        .rev()
        .map(|len| &point_path[..len])
        .find(|path| matches!(doc.node(path), Some(Node::Blockquote(_))))
        .map(<[usize]>::to_vec)
}

pub(crate) fn toggle_blockquote(state: &EditorState) -> Result<Transaction, String> {
    let (block_path, block) = focus_text_block(state)?;

    if let Some(quote_path) = nearest_blockquote_path(&state.doc, &block_path) {
        let children = state
            .doc
            .node(&quote_path)
            .and_then(Node::children)
            .unwrap_or(&[])
            .to_vec();
        let replacement = BlockReplacement::new(&quote_path, children);
        let selection = map_selection(&state.selection, |p| {
            let Some(rest) = p.path.strip_prefix(quote_path.as_slice()) else {
                return replacement.shift_following(p);
            };
            let (&child, tail) = rest.split_first()?;
            let mut path = replacement.block_path(child);
            path.extend_from_slice(tail);
            Some(Point::new(path, p.offset))
        });
        return Ok(Transaction::new(vec![replacement.op])
            .selection_after(selection)
            .source("command:blockquote.unwrap"));
    }

    let quote = Node::Blockquote(Container::new(vec![block.clone()]));
    let mut new_prefix = block_path.clone();
    new_prefix.push(0);
    let selection = map_selection(&state.selection, |p| rebase(p, &block_path, &new_prefix));
    Ok(Transaction::new(vec![replace_block(&block_path, quote)])
        .selection_after(selection)
        .source("command:blockquote.wrap"))
}

struct MarksCommandsPlugin;

impl EditorPlugin for MarksCommandsPlugin {
    fn id(&self) -> &'static str {
        "marks.commands"
    }

    fn commands(&self) -> Vec<CommandSpec> {
        [
            (MarkKind::Bold, "marks.toggle_bold", "Bold"),
            (MarkKind::Italic, "marks.toggle_italic", "Italic"),
            (MarkKind::Strike, "marks.toggle_strike", "Strikethrough"),
            (MarkKind::Underline, "marks.toggle_underline", "Underline"),
        ]
        .into_iter()
        .map(|(mark, id, label)| {
            CommandSpec::new(id, label, move |editor, _args| {
                let tx = toggle_mark(editor.state(), mark);
                apply_command(editor, tx, "toggle mark")
            })
            .description(format!("Toggle {} on the selected text.", label.to_lowercase()))
        })
        .collect()
    }
}

fn ordered_selection_points(sel: &Selection) -> (Point, Point) {
    let mut start = sel.anchor.clone();
    let mut end = sel.focus.clone();
    if (end.path.as_slice(), end.offset) < (start.path.as_slice(), start.offset) {
        std::mem::swap(&mut start, &mut end);
    }
    (start, end)
}

fn point_global_offset(children: &[Node], child_ix: usize, offset: usize) -> usize {
    children
        .iter()
        .take(child_ix)
        .filter_map(|n| match n {
            Node::Text(t) => Some(t.text.len()),
            _ => None,
        })
        .sum::<usize>()
        + match children.get(child_ix) {
            Some(Node::Text(t)) => offset.min(t.text.len()),
            _ => 0,
        }
}

fn point_for_global_offset(block_path: &[usize], children: &[Node], global: usize) -> Point {
    let mut remaining = global;
    for (child_ix, node) in children.iter().enumerate() {
        let Node::Text(t) = node else {
            continue;
        };
        if remaining < t.text.len() {
            return Point::new(child_path(block_path, child_ix), remaining);
        }
        if remaining == t.text.len() {
            if matches!(children.get(child_ix + 1), Some(Node::Text(_))) {
                return Point::new(child_path(block_path, child_ix + 1), 0);
            }
            return Point::new(child_path(block_path, child_ix), remaining);
        }
        remaining -= t.text.len();
    }
    Point::new(child_path(block_path, children.len().saturating_sub(1)), 0)
}

fn apply_marks_in_block(
    children: &[Node],
    start: usize,
    end: usize,
    apply: &dyn Fn(Marks) -> Marks,
) -> Vec<Node> {
    let mut out = Vec::new();
    let mut cursor = 0usize;

    for node in children {
        let Node::Text(t) = node else {
            out.push(node.clone());
            continue;
        };
        let node_start = cursor;
        let node_end = cursor + t.text.len();
        cursor = node_end;

        if end <= node_start || start >= node_end {
            out.push(node.clone());
            continue;
        }

        let sel_start = start.saturating_sub(node_start).min(t.text.len());
        let sel_end = (end - node_start).min(t.text.len());
        let (Some(prefix), Some(middle), Some(suffix)) = (
            t.text.get(..sel_start),
            t.text.get(sel_start..sel_end),
            t.text.get(sel_end..),
        ) else {
            out.push(node.clone());
            continue;
        };
        for (text, marks) in [(prefix, t.marks), (middle, apply(t.marks)), (suffix, t.marks)] {
            if !text.is_empty() {
                out.push(Node::Text(TextNode {
                    text: text.to_string(),
                    marks,
                }));
            }
        }
    }

    if out.is_empty() {
        out.push(Node::text(""));
    }
    out
}

fn toggle_mark(state: &EditorState, mark: MarkKind) -> Result<Transaction, String> {
    let sel = &state.selection;
    if sel.is_collapsed() {
        return Ok(Transaction::default());
    }
    let (start, end) = ordered_selection_points(sel);
    let (Some((&start_leaf, start_block)), Some((&end_leaf, end_block))) =
        (start.path.split_last(), end.path.split_last())
    else {
        return Err("No active block".into());
    };
    if start_block != end_block {
        return Err("Marks can only be toggled inside one block".into());
    }
    let children = match state.doc.node(start_block) {
        Some(node) if node.is_text_block() => node.children().unwrap_or(&[]),
        _ => return Err("Active block is not a text block".into()),
    };

    let start_g = point_global_offset(children, start_leaf, start.offset);
    let end_g = point_global_offset(children, end_leaf, end.offset);
    let anchor_g = point_global_offset(
        children,
        sel.anchor.path.last().copied().unwrap_or(0),
        sel.anchor.offset,
    );
    let focus_g = point_global_offset(
        children,
        sel.focus.path.last().copied().unwrap_or(0),
        sel.focus.offset,
    );

    let mut cursor = 0usize;
    let all_set = children.iter().all(|node| {
        let Node::Text(t) = node else {
            return true;
        };
        let (node_start, node_end) = (cursor, cursor + t.text.len());
        cursor = node_end;
        node_end <= start_g || node_start >= end_g || t.marks.has(mark)
    });

    let content = apply_marks_in_block(children, start_g, end_g, &|marks| marks.with(mark, !all_set));
    let selection = Selection {
        anchor: point_for_global_offset(start_block, &content, anchor_g),
        focus: point_for_global_offset(start_block, &content, focus_g),
    };
    Ok(Transaction::new(vec![Op::ReplaceChildren {
        path: start_block.to_vec(),
        range: 0..children.len(),
        content,
    }])
    .selection_after(selection)
    .source("command:marks.toggle"))
}

struct MediaPlugin;

#[derive(Debug, Deserialize)]
struct InsertMediaArgs {
    src: String,
    media_type: MediaType,
    #[serde(default)]
    alt: Option<String>,
}

#[derive(Debug, Deserialize)]
struct MediaPathArgs {
    path: Path,
    #[serde(default)]
    align: Option<Alignment>,
}

fn parse_args<T: DeserializeOwned>(args: Option<Value>) -> Result<T, CommandError> {
    serde_json::from_value(args.unwrap_or(Value::Null))
        .map_err(|e| CommandError::new(format!("Invalid arguments: {e}")))
}

impl EditorPlugin for MediaPlugin {
    fn id(&self) -> &'static str {
        "media"
    }

    fn append_passes(&self) -> Vec<Box<dyn AppendTransaction>> {
        vec![Box::new(MarkdownMediaRule)]
    }

    fn commands(&self) -> Vec<CommandSpec> {
        vec![
            CommandSpec::new("media.insert", "Insert media", |editor, args| {
                let args: InsertMediaArgs = parse_args(args)?;
                let mut attrs = MediaAttrs::new(args.src, args.media_type);
                attrs.alt = args.alt;
                let tx = insert_block_after_focus(editor.state(), Node::media(attrs));
                apply_command(editor, tx, "insert media")
            })
            .description("Insert an image or video below the current block.")
            .keywords(["image", "video", "media", "picture"])
            .args_example(serde_json::json!({ "src": "https://example.com/a.png", "media_type": "img" })),
            CommandSpec::new("media.set_align", "Align media", |editor, args| {
                let args: MediaPathArgs = parse_args(args)?;
                let align = args
                    .align
                    .ok_or_else(|| CommandError::new("Missing `align` argument"))?;
                let tx = set_media_align(editor.doc(), &args.path, align);
                apply_command(editor, tx, "align media")
            })
            .description("Align a media node to the start, center or end.")
            .keywords(["align", "media", "image"])
            .args_example(serde_json::json!({ "path": [0, 0], "align": "center" })),
            CommandSpec::new("media.delete", "Delete media", |editor, args| {
                let args: MediaPathArgs = parse_args(args)?;
                let tx = delete_media(editor.doc(), &args.path);
                apply_command(editor, tx, "delete media")
            })
            .description("Remove a media node.")
            .keywords(["delete", "remove", "media"])
            .args_example(serde_json::json!({ "path": [0, 0] })),
            CommandSpec::new("dropzone.insert", "Upload media", |editor, _args| {
                let tx = insert_block_after_focus(editor.state(), Node::DropZone)
                    .map(|tx| tx.source("command:dropzone.insert"));
                apply_command(editor, tx, "insert drop zone")
            })
            .description("Insert a drop zone that turns dropped files into media.")
            .keywords(["upload", "media", "image", "video", "drop"]),
        ]
    }
}

pub(crate) fn set_media_align(doc: &Document, path: &[usize], align: Alignment) -> Result<Transaction, String> {
    let Some(Node::Media(media)) = doc.node(path) else {
        return Err(format!("No media node at {path:?}"));
    };
    let mut attrs = media.attrs.clone();
    attrs.align = align;
    attrs.float = None;
    Ok(Transaction::new(vec![Op::SetNodeAttrs {
        path: path.to_vec(),
        attrs: NodeAttrs::Media(attrs),
    }])
    .source("command:media.set_align"))
}

/// Removes a media node; a media node alone in its top-level wrapper takes
/// the wrapper with it.
pub(crate) fn delete_media(doc: &Document, path: &[usize]) -> Result<Transaction, String> {
    if !matches!(doc.node(path), Some(Node::Media(_))) {
        return Err(format!("No media node at {path:?}"));
    }
    let target = match path {
        [w, 0] if doc.content.get(*w).and_then(Node::children).map(<[Node]>::len) == Some(1) => {
            vec![*w]
        }
        path => path.to_vec(),
    };
    Ok(Transaction::new(vec![Op::RemoveNode { path: target }]).source("command:media.delete"))
}

/// `![alt](src "title")` typed at the end of a line.
static MARKDOWN_MEDIA: LazyLock<Option<Regex>> = LazyLock::new(|| {
    let pattern = r#"(?:^|\s)(!\[([^\]]*)\]\((\S+?)(?:\s+["']([^"']+)["'])?\))$"#;
    Regex::new(pattern)
        .map_err(|e| tracing::warn!(pattern, error = %e, "invalid media input rule"))
        .ok()
});

/// Turns markdown image syntax typed into a text block into a media node.
/// The block is split around it and the cursor lands in the block after.
struct MarkdownMediaRule;

impl AppendTransaction for MarkdownMediaRule {
    fn id(&self) -> &'static str {
        "media.markdown_input"
    }

    fn append(&self, _old: &EditorState, new: &EditorState, tx: &Transaction) -> Option<Transaction> {
        let focus = &new.selection.focus;
        let typed = tx
            .ops
            .iter()
            .any(|op| matches!(op, Op::InsertText { path, .. } if *path == focus.path));
        if !typed || !new.selection.is_collapsed() || new.composing {
            return None;
        }

        let (&leaf_ix, block_path) = focus.path.split_last()?;
        let block = new.doc.node(block_path).filter(|n| n.is_text_block())?;
        let children = block.children()?;
        let Some(Node::Text(leaf)) = children.get(leaf_ix) else {
            return None;
        };
        let caps = MARKDOWN_MEDIA.as_ref()?.captures(leaf.text.get(..focus.offset)?)?;
        let syntax = caps.get(1)?;
        let src = caps.get(3)?.as_str();

        let media_type = mime_guess::from_path(src)
            .first()
            .and_then(|mime| MediaType::from_mime(mime.essence_str()))
            .unwrap_or(MediaType::Img);
        let mut attrs = MediaAttrs::new(src, media_type);
        attrs.alt = caps.get(2).map(|m| m.as_str().to_string()).filter(|alt| !alt.is_empty());
        attrs.title = caps.get(4).map(|m| m.as_str().to_string());

        let (head, tail) = split_inline(children, (leaf_ix, syntax.start()), (leaf_ix, focus.offset))?;
        let mut blocks = Vec::new();
        if !is_blank(&head) {
            blocks.push(match block {
                Node::Heading(h) => Node::Heading(HeadingNode {
                    attrs: h.attrs.clone(),
                    content: head,
                }),
                _ => Node::Paragraph(Container::new(head)),
            });
        }
        blocks.push(Node::media(attrs));
        blocks.push(Node::Paragraph(Container::new(tail)));

        tracing::debug!(src, ?media_type, "markdown media input");
        let replacement = BlockReplacement::new(block_path, blocks);
        let cursor = child_path(&replacement.block_path(replacement.count - 1), 0);
        Some(
            Transaction::new(vec![replacement.op])
                .selection_after(Selection::collapsed(Point::new(cursor, 0)))
                .source("input:media"),
        )
    }
}
