use super::{MediaConfig, MediaError};
use crate::core::Editor;
use crate::node::{Alignment, Dimension, Node, NodeAttrs};
use crate::ops::{Op, Path, Transaction};
use crate::plugin;

pub const MIN_MEDIA_WIDTH: f64 = 100.0;

/// Width over height of the loaded media.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AspectRatio(f64);

impl AspectRatio {
    /// Falls back to square when the natural size is unknown.
    pub fn from_natural(width: f64, height: f64) -> Self {
        if width.is_finite() && height.is_finite() && width > 0.0 && height > 0.0 {
            Self(width / height)
        } else {
            Self(1.0)
        }
    }

    pub fn get(self) -> f64 {
        self.0
    }

    pub fn height_for(self, width: f64) -> f64 {
        width / self.0
    }
}

/// One drag of a resize handle.
#[derive(Debug, Clone, PartialEq)]
pub struct ResizeGesture {
    path: Path,
    start_x: f64,
    start_width: f64,
    min_width: f64,
    max_width: f64,
    ratio: AspectRatio,
}

impl ResizeGesture {
    pub fn begin(
        path: Path,
        start_x: f64,
        start_width: f64,
        container_width: f64,
        ratio: AspectRatio,
    ) -> Self {
        Self {
            path,
            start_x,
            start_width,
            min_width: MIN_MEDIA_WIDTH,
            max_width: container_width.max(MIN_MEDIA_WIDTH),
            ratio,
        }
    }

    pub fn with_min_width(mut self, min_width: f64) -> Self {
        self.min_width = min_width;
        self.max_width = self.max_width.max(min_width);
        self
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn size_at(&self, client_x: f64) -> (f64, f64) {
        let width = (self.start_width + (client_x - self.start_x)).clamp(self.min_width, self.max_width);
        (width, self.ratio.height_for(width))
    }

    /// Attribute update for the pointer at `client_x`; emitted on every move.
    pub fn update(&self, editor: &Editor, client_x: f64) -> Result<Transaction, MediaError> {
        let Some(Node::Media(media)) = editor.doc().node(&self.path) else {
            return Err(MediaError::NotMedia(self.path.clone()));
        };
        let (width, height) = self.size_at(client_x);
        let mut attrs = media.attrs.clone();
        attrs.width = Dimension::Px(width);
        attrs.height = Dimension::Px(height);
        Ok(Transaction::new(vec![Op::SetNodeAttrs {
            path: self.path.clone(),
            attrs: NodeAttrs::Media(attrs),
        }])
        .source("media:resize"))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaAction {
    Align(Alignment),
    Delete,
}

/// View-side state of one rendered media node: the aspect ratio captured
/// at load and the gesture in progress.
#[derive(Debug, Clone)]
pub struct MediaView {
    path: Path,
    container_width: f64,
    min_width: f64,
    ratio: Option<AspectRatio>,
    gesture: Option<ResizeGesture>,
}

impl MediaView {
    pub fn new(path: Path, container_width: f64) -> Self {
        Self {
            path,
            container_width,
            min_width: MIN_MEDIA_WIDTH,
            ratio: None,
            gesture: None,
        }
    }

    pub fn with_config(path: Path, container_width: f64, config: &MediaConfig) -> Self {
        Self {
            min_width: config.min_width,
            ..Self::new(path, container_width)
        }
    }

    pub fn path(&self) -> &[usize] {
        &self.path
    }

    pub fn aspect_ratio(&self) -> Option<AspectRatio> {
        self.ratio
    }

    pub fn is_resizing(&self) -> bool {
        self.gesture.is_some()
    }

    /// Only the first load counts; the ratio never changes afterwards.
    pub fn on_load(&mut self, natural_width: f64, natural_height: f64) {
        if self.ratio.is_none() {
            self.ratio = Some(AspectRatio::from_natural(natural_width, natural_height));
        }
    }

    pub fn mouse_down(&mut self, client_x: f64, rendered_width: f64) {
        self.gesture = Some(
            ResizeGesture::begin(
                self.path.clone(),
                client_x,
                rendered_width,
                self.container_width,
                self.ratio.unwrap_or(AspectRatio(1.0)),
            )
            .with_min_width(self.min_width),
        );
    }

    /// Applies the new size when a gesture is running; returns whether it did.
    pub fn mouse_move(&mut self, editor: &mut Editor, client_x: f64) -> Result<bool, MediaError> {
        let Some(gesture) = &self.gesture else {
            return Ok(false);
        };
        let tx = gesture.update(editor, client_x)?;
        editor.apply(tx)?;
        Ok(true)
    }

    pub fn mouse_up(&mut self) {
        self.gesture = None;
    }

    pub fn perform(&mut self, editor: &mut Editor, action: MediaAction) -> Result<(), MediaError> {
        let tx = match action {
            MediaAction::Align(align) => plugin::set_media_align(editor.doc(), &self.path, align),
            MediaAction::Delete => plugin::delete_media(editor.doc(), &self.path),
        }
        .map_err(MediaError::Command)?;
        editor.apply(tx)?;
        if action == MediaAction::Delete {
            self.gesture = None;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn drag_keeps_aspect_ratio() {
        let gesture = ResizeGesture::begin(vec![0, 0], 10.0, 400.0, 800.0, AspectRatio::from_natural(800.0, 400.0));
        assert_eq!(gesture.size_at(110.0), (500.0, 250.0));
    }

    #[test]
    fn width_is_clamped_to_min_and_container() {
        let gesture = ResizeGesture::begin(vec![0, 0], 0.0, 400.0, 600.0, AspectRatio::from_natural(4.0, 3.0));
        assert_eq!(gesture.size_at(-1000.0).0, MIN_MEDIA_WIDTH);
        assert_eq!(gesture.size_at(1000.0).0, 600.0);
    }

    #[test]
    fn unknown_natural_size_is_square() {
        assert_eq!(AspectRatio::from_natural(0.0, 0.0).get(), 1.0);
        assert_eq!(AspectRatio::from_natural(f64::NAN, 10.0).get(), 1.0);
    }
}
