use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use futures_util::future::{BoxFuture, FutureExt};
use futures_util::stream::{FuturesUnordered, StreamExt};

use super::{InsertTarget, MediaConfig, MediaFile};
use crate::core::Editor;
use crate::node::{Dimension, MediaAttrs, MediaType, Node};
use crate::ops::{Op, Transaction};

/// Host-supplied upload: takes a file, resolves to a fetchable URL.
pub trait UploadFn: Send + Sync {
    fn upload(&self, file: MediaFile) -> BoxFuture<'static, anyhow::Result<String>>;
}

impl<F, Fut> UploadFn for F
where
    F: Fn(MediaFile) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<String>> + Send + 'static,
{
    fn upload(&self, file: MediaFile) -> BoxFuture<'static, anyhow::Result<String>> {
        (self)(file).boxed()
    }
}

#[derive(Debug)]
pub struct UploadResult {
    pub file_name: String,
    pub media_type: MediaType,
    pub url: anyhow::Result<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Inserted(usize),
    Failed,
    Discarded,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub inserted: usize,
    pub failed: usize,
    pub discarded: usize,
}

/// Owns the upload function and the generation that outstanding batches
/// are checked against.
#[derive(Clone)]
pub struct MediaUploader {
    upload: Arc<dyn UploadFn>,
    config: MediaConfig,
    generation: Arc<AtomicU64>,
}

impl MediaUploader {
    pub fn new(upload: impl UploadFn + 'static, config: MediaConfig) -> Self {
        Self {
            upload: Arc::new(upload),
            config,
            generation: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Starts one upload per accepted file. Files that are neither images
    /// nor videos are skipped.
    pub fn begin(&self, files: Vec<MediaFile>, target: InsertTarget) -> UploadBatch {
        let pending = FuturesUnordered::new();
        for file in files {
            let Some(media_type) = file.media_type() else {
                tracing::debug!(file = %file.name, mime = %file.mime, "ignoring non-media file");
                continue;
            };
            let file_name = file.name.clone();
            let upload = self.upload.upload(file);
            pending.push(
                async move {
                    UploadResult {
                        file_name,
                        media_type,
                        url: upload.await,
                    }
                }
                .boxed(),
            );
        }

        UploadBatch {
            generation: self.generation.load(Ordering::SeqCst),
            current: Arc::clone(&self.generation),
            pending,
            target,
            inserted: 0,
            default_width: self.config.default_width,
        }
    }

    /// Marks every outstanding batch stale; their late results are dropped.
    pub fn teardown(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }
}

pub struct UploadBatch {
    generation: u64,
    current: Arc<AtomicU64>,
    pending: FuturesUnordered<BoxFuture<'static, UploadResult>>,
    target: InsertTarget,
    inserted: usize,
    default_width: f64,
}

impl UploadBatch {
    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    pub fn is_stale(&self) -> bool {
        self.current.load(Ordering::SeqCst) != self.generation
    }

    /// The next upload to finish, in resolution order.
    pub async fn next(&mut self) -> Option<UploadResult> {
        self.pending.next().await
    }

    /// Inserts one finished upload. Successful uploads of a batch stack
    /// below each other starting at the batch target; a target that no
    /// longer exists falls back to the document end.
    pub fn place(&mut self, editor: &mut Editor, result: UploadResult) -> Placement {
        if self.is_stale() {
            tracing::debug!(file = %result.file_name, "discarding upload for a torn-down editor");
            return Placement::Discarded;
        }
        let url = match result.url {
            Ok(url) => url,
            Err(err) => {
                tracing::warn!(file = %result.file_name, error = %err, "media upload failed");
                return Placement::Failed;
            }
        };

        let len = editor.doc().content.len();
        let index = match self.target {
            InsertTarget::At(ix) if ix + self.inserted <= len => ix + self.inserted,
            InsertTarget::At(ix) => {
                tracing::debug!(requested = ix, len, "upload target is gone; appending");
                len
            }
            InsertTarget::End => len,
        };

        let mut attrs = MediaAttrs::new(url, result.media_type);
        attrs.width = Dimension::Px(self.default_width);
        let tx = Transaction::new(vec![Op::InsertNode {
            path: vec![index],
            node: Node::wrapped(Node::media(attrs)),
        }])
        .source("media:upload");

        match editor.apply(tx) {
            Ok(()) => {
                self.inserted += 1;
                Placement::Inserted(index)
            }
            Err(err) => {
                tracing::warn!(file = %result.file_name, error = %err, "could not insert uploaded media");
                Placement::Failed
            }
        }
    }

    /// Drives every upload to completion, inserting each as it resolves.
    pub async fn run(mut self, editor: &mut Editor) -> BatchReport {
        let mut report = BatchReport::default();
        while let Some(result) = self.next().await {
            match self.place(editor, result) {
                Placement::Inserted(_) => report.inserted += 1,
                Placement::Failed => report.failed += 1,
                Placement::Discarded => report.discarded += 1,
            }
        }
        report
    }
}
