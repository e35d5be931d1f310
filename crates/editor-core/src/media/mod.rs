//! Media upload, placement and resizing.
//!
//! Files arrive from a drop, a paste or a drop-zone block, are uploaded
//! through a host-supplied [`UploadFn`], and each resolved URL becomes a
//! `resizableMedia` node inserted through [`Editor::apply`](crate::Editor::apply).

mod drop;
mod resize;
mod upload;

use bytes::Bytes;
use serde::Deserialize;

use crate::core::ApplyError;
use crate::node::{DEFAULT_MEDIA_WIDTH, MediaType};

pub use drop::{
    BlockLayout, ClientPoint, DragPayload, DropRequest, DropTarget, FILES_TYPE, PositionResolver,
    Rect, claim_drop_zone, paste_request,
};
pub use resize::{AspectRatio, MIN_MEDIA_WIDTH, MediaAction, MediaView, ResizeGesture};
pub use upload::{BatchReport, MediaUploader, Placement, UploadBatch, UploadFn, UploadResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct MediaConfig {
    pub default_width: f64,
    pub min_width: f64,
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            default_width: DEFAULT_MEDIA_WIDTH,
            min_width: MIN_MEDIA_WIDTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MediaFile {
    pub name: String,
    pub mime: String,
    pub bytes: Bytes,
}

impl MediaFile {
    /// An empty `mime` is guessed from the file name.
    pub fn new(name: impl Into<String>, mime: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        let name = name.into();
        let mut mime = mime.into();
        if mime.trim().is_empty() {
            mime = mime_guess::from_path(&name)
                .first_or_octet_stream()
                .essence_str()
                .to_string();
        }
        Self {
            name,
            mime,
            bytes: bytes.into(),
        }
    }

    /// `None` for anything that is not an image or a video.
    pub fn media_type(&self) -> Option<MediaType> {
        MediaType::from_mime(&self.mime)
    }
}

/// Where uploaded media goes, as a top-level block index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertTarget {
    At(usize),
    End,
}

#[derive(Debug, thiserror::Error)]
pub enum MediaError {
    #[error("no drop zone at top-level block {0}")]
    NotADropZone(usize),
    #[error("no media node at {0:?}")]
    NotMedia(Vec<usize>),
    #[error("media command failed: {0}")]
    Command(String),
    #[error(transparent)]
    Apply(#[from] ApplyError),
}
