use super::{InsertTarget, MediaError, MediaFile};
use crate::core::{Editor, EditorState};
use crate::node::{Document, Node};
use crate::ops::{Op, Transaction};

/// Type entry browsers put in a drag payload that carries files.
pub const FILES_TYPE: &str = "Files";

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ClientPoint {
    pub x: f64,
    pub y: f64,
}

impl ClientPoint {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn contains(&self, point: ClientPoint) -> bool {
        point.x >= self.x && point.x <= self.right() && point.y >= self.y && point.y <= self.bottom()
    }
}

#[derive(Debug, Clone, Default)]
pub struct DragPayload {
    pub types: Vec<String>,
    pub files: Vec<MediaFile>,
}

impl DragPayload {
    pub fn files(files: Vec<MediaFile>) -> Self {
        Self {
            types: vec![FILES_TYPE.to_string()],
            files,
        }
    }

    pub fn has_files(&self) -> bool {
        self.types.iter().any(|t| t == FILES_TYPE)
    }
}

/// Maps an editor-local point to a top-level insertion index.
pub trait PositionResolver {
    fn resolve(&self, doc: &Document, local: ClientPoint) -> Option<usize>;
}

/// Rendered geometry of the top-level blocks, in editor-local coordinates.
#[derive(Debug, Clone, Default)]
pub struct BlockLayout {
    pub content: Rect,
    pub blocks: Vec<Rect>,
}

impl PositionResolver for BlockLayout {
    fn resolve(&self, doc: &Document, local: ClientPoint) -> Option<usize> {
        if !self.content.contains(local) {
            return None;
        }
        let len = doc.content.len().min(self.blocks.len());
        let index = self.blocks[..len]
            .iter()
            .position(|block| local.y < block.bottom())
            .map(|ix| {
                let block = &self.blocks[ix];
                if local.y < block.y + block.height / 2.0 {
                    ix
                } else {
                    ix + 1
                }
            })
            .unwrap_or(doc.content.len());
        Some(index)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DropRequest {
    pub files: Vec<MediaFile>,
    pub target: InsertTarget,
}

/// Drag state of the editor box. `editor_rect` is in client coordinates.
#[derive(Debug, Clone, Default)]
pub struct DropTarget {
    editor_rect: Rect,
    drag_active: bool,
}

impl DropTarget {
    pub fn new(editor_rect: Rect) -> Self {
        Self {
            editor_rect,
            drag_active: false,
        }
    }

    pub fn set_editor_rect(&mut self, rect: Rect) {
        self.editor_rect = rect;
    }

    pub fn is_drag_active(&self) -> bool {
        self.drag_active
    }

    /// Returns whether the drag is ours to handle. Drags without files are
    /// left to the editor's own block reordering.
    pub fn drag_enter(&mut self, payload: &DragPayload) -> bool {
        if !payload.has_files() {
            return false;
        }
        self.drag_active = true;
        true
    }

    pub fn drag_over(&mut self, payload: &DragPayload) -> bool {
        self.drag_enter(payload)
    }

    /// Leave events also fire when crossing into child elements; only a
    /// pointer outside the editor box ends the drag.
    pub fn drag_leave(&mut self, pointer: ClientPoint) {
        if !self.editor_rect.contains(pointer) {
            self.drag_active = false;
        }
    }

    pub fn drop(
        &mut self,
        payload: DragPayload,
        at: ClientPoint,
        doc: &Document,
        resolver: &dyn PositionResolver,
    ) -> Option<DropRequest> {
        if !payload.has_files() {
            return None;
        }
        self.drag_active = false;

        let files = accepted(payload.files);
        if files.is_empty() {
            return None;
        }
        let local = ClientPoint::new(at.x - self.editor_rect.x, at.y - self.editor_rect.y);
        let target = resolver
            .resolve(doc, local)
            .map(InsertTarget::At)
            .unwrap_or(InsertTarget::End);
        tracing::debug!(files = files.len(), ?target, "files dropped");
        Some(DropRequest { files, target })
    }
}

fn accepted(files: Vec<MediaFile>) -> Vec<MediaFile> {
    files.into_iter().filter(|f| f.media_type().is_some()).collect()
}

/// Pasted files go below the block holding the cursor.
pub fn paste_request(state: &EditorState, files: Vec<MediaFile>) -> Option<DropRequest> {
    let files = accepted(files);
    if files.is_empty() {
        return None;
    }
    let target = state
        .focus_block()
        .filter(|&ix| ix < state.doc.content.len())
        .map(|ix| InsertTarget::At(ix + 1))
        .unwrap_or(InsertTarget::End);
    Some(DropRequest { files, target })
}

/// Replaces the drop zone at top-level `index` with the uploads of `files`:
/// the zone is removed now and the uploads land where it was. Without any
/// acceptable file the zone stays.
pub fn claim_drop_zone(
    editor: &mut Editor,
    index: usize,
    files: Vec<MediaFile>,
) -> Result<Option<DropRequest>, MediaError> {
    let is_zone = matches!(
        editor.doc().content.get(index).and_then(Node::children),
        Some([Node::DropZone])
    );
    if !is_zone {
        return Err(MediaError::NotADropZone(index));
    }
    let files = accepted(files);
    if files.is_empty() {
        return Ok(None);
    }

    editor.apply(
        Transaction::new(vec![Op::RemoveNode { path: vec![index] }]).source("media:drop_zone"),
    )?;
    Ok(Some(DropRequest {
        files,
        target: InsertTarget::At(index),
    }))
}
