use std::fmt;
use std::ops::Range;
use std::sync::Arc;

use serde::Deserialize;

use crate::core::{Editor, EditorState};
use crate::fuzzy;
use crate::node::{Document, HeadingLevel, ListKind, Node};
use crate::ops::{Op, Path, Transaction};
use crate::plugin::{self, CommandError};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SlashConfig {
    pub trigger: char,
}

impl Default for SlashConfig {
    fn default() -> Self {
        Self { trigger: '/' }
    }
}

/// The trigger character plus the query typed after it, as a byte range of
/// one text leaf.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerRange {
    pub path: Path,
    pub range: Range<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IconRef(pub String);

impl IconRef {
    pub fn new(name: impl Into<String>) -> Self {
        Self(name.into())
    }
}

pub type SlashCommand =
    Arc<dyn Fn(&EditorState, &TriggerRange) -> Result<Transaction, CommandError> + Send + Sync>;

#[derive(Clone)]
pub struct SlashMenuItem {
    pub title: String,
    pub shortcut: Option<String>,
    pub icon: IconRef,
    pub command: SlashCommand,
}

impl fmt::Debug for SlashMenuItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SlashMenuItem")
            .field("title", &self.title)
            .field("shortcut", &self.shortcut)
            .field("icon", &self.icon)
            .finish_non_exhaustive()
    }
}

impl SlashMenuItem {
    pub fn new(
        title: impl Into<String>,
        icon: IconRef,
        command: impl Fn(&EditorState, &TriggerRange) -> Result<Transaction, CommandError>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        Self {
            title: title.into(),
            shortcut: None,
            icon,
            command: Arc::new(command),
        }
    }

    pub fn shortcut(mut self, shortcut: impl Into<String>) -> Self {
        self.shortcut = Some(shortcut.into());
        self
    }
}

#[derive(Debug, Clone)]
pub struct CommandPaletteSession {
    pub query: String,
    pub items: Vec<SlashMenuItem>,
    pub selected_index: usize,
    pub range: TriggerRange,
}

impl CommandPaletteSession {
    pub fn selected(&self) -> Option<&SlashMenuItem> {
        self.items.get(self.selected_index)
    }

    pub fn titles(&self) -> Vec<&str> {
        self.items.iter().map(|item| item.title.as_str()).collect()
    }

    fn move_by(&mut self, up: bool) {
        let n = self.items.len();
        if n == 0 {
            return;
        }
        self.selected_index = if up {
            (self.selected_index + n - 1) % n
        } else {
            (self.selected_index + 1) % n
        };
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SlashEvent {
    Unchanged,
    Opened,
    Updated,
    Closed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaletteKey {
    Up,
    Down,
    Enter,
    Escape,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyOutcome {
    /// No palette is open; the key belongs to the editor.
    NotOpen,
    Moved(usize),
    Executed,
    Dismissed,
    /// Enter with nothing to run; the palette stays open.
    NoItems,
}

pub struct SlashEngine {
    config: SlashConfig,
    items: Vec<SlashMenuItem>,
    session: Option<CommandPaletteSession>,
    // Trigger position the user dismissed; it does not reopen until the
    // cursor leaves it.
    dismissed: Option<(Path, usize)>,
}

impl SlashEngine {
    pub fn new(items: Vec<SlashMenuItem>, config: SlashConfig) -> Self {
        Self {
            config,
            items,
            session: None,
            dismissed: None,
        }
    }

    pub fn with_default_items() -> Self {
        Self::new(default_items(), SlashConfig::default())
    }

    pub fn items(&self) -> &[SlashMenuItem] {
        &self.items
    }

    pub fn session(&self) -> Option<&CommandPaletteSession> {
        self.session.as_ref()
    }

    pub fn is_open(&self) -> bool {
        self.session.is_some()
    }

    pub fn close(&mut self) -> bool {
        match self.session.take() {
            Some(session) => {
                self.dismissed = Some((session.range.path, session.range.range.start));
                true
            }
            None => false,
        }
    }

    /// Brings the palette in line with the editor after a transaction.
    pub fn sync(&mut self, state: &EditorState) -> SlashEvent {
        let trigger = self.locate_trigger(state);

        let still_dismissed = match (&self.dismissed, &trigger) {
            (Some((path, start)), Some(t)) => t.path == *path && t.range.start == *start,
            _ => false,
        };
        if !still_dismissed {
            self.dismissed = None;
        }

        if self.session.is_none() {
            let Some(range) = trigger else {
                return SlashEvent::Unchanged;
            };
            let opens =
                range.range.len() == self.config.trigger.len_utf8() && self.dismissed.is_none();
            if !opens {
                return SlashEvent::Unchanged;
            }
            tracing::debug!(path = ?range.path, "slash palette opened");
            self.session = Some(CommandPaletteSession {
                query: String::new(),
                items: self.items.clone(),
                selected_index: 0,
                range,
            });
            return SlashEvent::Opened;
        }
        let Some(session) = self.session.as_mut() else {
            return SlashEvent::Unchanged;
        };

        match trigger {
            Some(range)
                if range.path == session.range.path
                    && range.range.start == session.range.range.start =>
            {
                let query = query_of(state, &range, self.config.trigger).unwrap_or_default();
                session.range = range;
                if query == session.query {
                    return SlashEvent::Unchanged;
                }
                session.items = fuzzy::filter(&query, &self.items, |item| item.title.as_str());
                session.query = query;
                session.selected_index = 0;
                SlashEvent::Updated
            }
            _ => {
                self.session = None;
                SlashEvent::Closed
            }
        }
    }

    pub fn handle_key(&mut self, key: PaletteKey, editor: &mut Editor) -> Result<KeyOutcome, CommandError> {
        let Some(session) = self.session.as_mut() else {
            return Ok(KeyOutcome::NotOpen);
        };
        match key {
            PaletteKey::Up | PaletteKey::Down => {
                session.move_by(key == PaletteKey::Up);
                Ok(KeyOutcome::Moved(session.selected_index))
            }
            PaletteKey::Escape => {
                self.close();
                Ok(KeyOutcome::Dismissed)
            }
            PaletteKey::Enter => {
                let Some(item) = session.selected().cloned() else {
                    return Ok(KeyOutcome::NoItems);
                };
                let range = session.range.clone();
                self.close();
                let tx = (item.command)(editor.state(), &range)?;
                editor
                    .apply(tx)
                    .map_err(|e| CommandError::new(format!("{} failed: {e}", item.title)))?;
                Ok(KeyOutcome::Executed)
            }
        }
    }

    /// The trigger and query before a collapsed cursor: the trigger must sit
    /// at the start of the line or after whitespace, and the query may not
    /// contain whitespace.
    fn locate_trigger(&self, state: &EditorState) -> Option<TriggerRange> {
        let selection = &state.selection;
        if !selection.is_collapsed() {
            return None;
        }
        let focus = &selection.focus;
        let Some(Node::Text(leaf)) = state.doc.node(&focus.path) else {
            return None;
        };
        let before = leaf.text.get(..focus.offset)?;
        let start = before.rfind(self.config.trigger)?;
        let query = &before[start + self.config.trigger.len_utf8()..];
        if query.chars().any(char::is_whitespace) {
            return None;
        }
        let preceded_ok = match before[..start].chars().next_back() {
            Some(ch) => ch.is_whitespace(),
            // Differently marked text before the leaf still counts.
            None => previous_inline_char(&state.doc, &focus.path).is_none_or(char::is_whitespace),
        };
        preceded_ok.then(|| TriggerRange {
            path: focus.path.clone(),
            range: start..focus.offset,
        })
    }
}

/// Last character of the inline content before the leaf at `path`; a hard
/// break reads as a newline.
fn previous_inline_char(doc: &Document, path: &[usize]) -> Option<char> {
    let (&leaf_ix, block_path) = path.split_last()?;
    let siblings = doc.node(block_path)?.children()?;
    siblings.get(..leaf_ix)?.iter().rev().find_map(|node| match node {
        Node::Text(t) => t.text.chars().next_back(),
        Node::HardBreak => Some('\n'),
        _ => None,
    })
}

fn query_of(state: &EditorState, range: &TriggerRange, trigger: char) -> Option<String> {
    let Some(Node::Text(leaf)) = state.doc.node(&range.path) else {
        return None;
    };
    let text = leaf.text.get(range.range.clone())?;
    Some(text.strip_prefix(trigger)?.trim().to_lowercase())
}

/// Removes the trigger text, then builds the item's own change against the
/// state that removal leaves behind.
pub fn replace_trigger(
    state: &EditorState,
    range: &TriggerRange,
    source: &str,
    build: impl FnOnce(&EditorState) -> Result<Transaction, String>,
) -> Result<Transaction, CommandError> {
    let remove = Op::RemoveText {
        path: range.path.clone(),
        range: range.range.clone(),
    };
    let after = state
        .preview(std::slice::from_ref(&remove))
        .map_err(|e| CommandError::new(format!("Trigger text is gone: {e}")))?;
    let follow = build(&after).map_err(CommandError::new)?;

    let mut ops = vec![remove];
    ops.extend(follow.ops);
    Ok(Transaction::new(ops)
        .selection_after(follow.selection_after.unwrap_or(after.selection))
        .source(source))
}

fn heading_item(title: &str, level: HeadingLevel, shortcut: &str, icon: &str) -> SlashMenuItem {
    SlashMenuItem::new(title, IconRef::new(icon), move |state, range| {
        replace_trigger(state, range, "slash:heading", |s| plugin::set_heading(s, level))
    })
    .shortcut(shortcut)
}

fn list_item(title: &str, kind: ListKind, shortcut: &str, icon: &str) -> SlashMenuItem {
    SlashMenuItem::new(title, IconRef::new(icon), move |state, range| {
        replace_trigger(state, range, "slash:list", |s| plugin::toggle_list(s, kind))
    })
    .shortcut(shortcut)
}

/// An empty paragraph becomes the drop zone; otherwise the zone goes below it.
fn drop_zone_at_cursor(state: &EditorState) -> Result<Transaction, String> {
    let focus = state.focus_block().ok_or("No active block")?;
    let empty_paragraph = matches!(
        state.doc.content.get(focus).and_then(Node::children),
        Some([Node::Paragraph(p)]) if p.content.iter().all(|n| n.text_content().is_empty())
    );
    if !empty_paragraph {
        return plugin::insert_block_after_focus(state, Node::DropZone);
    }
    Ok(Transaction::new(vec![Op::ReplaceChildren {
        path: Vec::new(),
        range: focus..focus + 1,
        content: vec![Node::wrapped(Node::DropZone)],
    }]))
}

pub fn default_items() -> Vec<SlashMenuItem> {
    vec![
        heading_item("Heading 1", HeadingLevel::H1, "#", "heading-1"),
        heading_item("Heading 2", HeadingLevel::H2, "##", "heading-2"),
        heading_item("Heading 3", HeadingLevel::H3, "###", "heading-3"),
        list_item("Ordered List", ListKind::Ordered, "1. L", "list-ordered"),
        list_item("Bullet List", ListKind::Bullet, "- L", "list"),
        SlashMenuItem::new("Blockquote", IconRef::new("quote"), |state, range| {
            replace_trigger(state, range, "slash:blockquote", plugin::toggle_blockquote)
        })
        .shortcut(">"),
        SlashMenuItem::new("Upload Media", IconRef::new("image"), |state, range| {
            replace_trigger(state, range, "slash:dropzone", drop_zone_at_cursor)
        }),
    ]
}
