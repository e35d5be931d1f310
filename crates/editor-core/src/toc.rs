//! Table of contents: heading extraction for the authoring side and
//! active-heading tracking for the read-only viewer.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};
use web_time::{Duration, Instant};

use crate::core::EditorUpdate;
use crate::node::Document;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TocItem {
    /// Empty when the heading has no id yet.
    pub id: String,
    pub level: u8,
    pub text: String,
}

/// Every heading in document order.
pub fn extract_toc(doc: &Document) -> Vec<TocItem> {
    doc.headings()
        .into_iter()
        .map(|(_, heading)| TocItem {
            id: heading.attrs.id.clone().unwrap_or_default(),
            level: heading.attrs.level.get(),
            text: heading.content.iter().map(|n| n.text_content()).collect(),
        })
        .collect()
}

/// Part of the viewport a heading has to overlap to count as visible,
/// given as fractions trimmed off the top and the bottom.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct ViewportBand {
    pub top: f64,
    pub bottom: f64,
}

impl Default for ViewportBand {
    fn default() -> Self {
        Self {
            top: 0.1,
            bottom: 0.7,
        }
    }
}

impl ViewportBand {
    /// Whether a box spanning `top..bottom` (viewport coordinates) overlaps
    /// the band of a viewport `viewport_height` tall.
    pub fn intersects(&self, top: f64, bottom: f64, viewport_height: f64) -> bool {
        let band_top = viewport_height * self.top;
        let band_bottom = viewport_height * (1.0 - self.bottom);
        bottom > band_top && top < band_bottom
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct TocConfig {
    pub debounce_ms: u64,
    pub settle_delay_ms: u64,
    pub band: ViewportBand,
}

impl Default for TocConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            settle_delay_ms: 100,
            band: ViewportBand::default(),
        }
    }
}

impl TocConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }
}

/// Debounced extraction. Each transaction pushes the deadline back; the
/// list is rebuilt once the editor has been quiet for the whole window.
#[derive(Debug, Clone)]
pub struct TocIndexer {
    debounce: Duration,
    items: Vec<TocItem>,
    deadline: Option<Instant>,
}

impl TocIndexer {
    pub fn new(doc: &Document) -> Self {
        Self::with_config(doc, &TocConfig::default())
    }

    pub fn with_config(doc: &Document, config: &TocConfig) -> Self {
        Self {
            debounce: config.debounce(),
            items: extract_toc(doc),
            deadline: None,
        }
    }

    pub fn items(&self) -> &[TocItem] {
        &self.items
    }

    pub fn is_pending(&self) -> bool {
        self.deadline.is_some()
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn on_transaction(&mut self, now: Instant) {
        self.deadline = Some(now + self.debounce);
    }

    /// Editor listener hook. Selection-only updates leave the deadline alone.
    pub fn on_update(&mut self, update: &EditorUpdate<'_>, now: Instant) {
        if update.doc_changed {
            self.on_transaction(now);
        }
    }

    /// Re-extracts if the deadline has passed. Returns whether the list
    /// changed.
    pub fn poll(&mut self, now: Instant, doc: &Document) -> bool {
        match self.deadline {
            Some(deadline) if now >= deadline => {
                self.deadline = None;
                let items = extract_toc(doc);
                if items == self.items {
                    return false;
                }
                tracing::debug!(headings = items.len(), "table of contents rebuilt");
                self.items = items;
                true
            }
            _ => false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollRequest {
    pub id: String,
    /// Percent-encoded, without the leading `#`.
    pub fragment: String,
    pub smooth: bool,
}

impl ScrollRequest {
    fn to(id: &str) -> Self {
        Self {
            id: id.to_string(),
            fragment: urlencoding::encode(id).into_owned(),
            smooth: true,
        }
    }
}

/// Rendered position of one heading anchor, in viewport coordinates.
#[derive(Debug, Clone, PartialEq)]
pub struct HeadingAnchor {
    pub id: String,
    pub top: f64,
    pub bottom: f64,
}

/// Viewer-side active heading.
#[derive(Debug, Clone)]
pub struct ActiveHeadingTracker {
    config: TocConfig,
    ids: Vec<String>,
    intersecting: HashSet<String>,
    active: Option<String>,
    pending: Option<(String, Instant)>,
}

impl ActiveHeadingTracker {
    pub fn new(items: &[TocItem], config: TocConfig) -> Self {
        Self {
            config,
            ids: items
                .iter()
                .filter(|item| !item.id.is_empty())
                .map(|item| item.id.clone())
                .collect(),
            intersecting: HashSet::new(),
            active: None,
            pending: None,
        }
    }

    pub fn active(&self) -> Option<&str> {
        self.active.as_deref()
    }

    /// Applies intersection changes. The first intersecting heading in
    /// document order becomes active; with none intersecting the previous
    /// one stays. Returns whether the active heading changed.
    pub fn update<'a>(&mut self, changes: impl IntoIterator<Item = (&'a str, bool)>) -> bool {
        for (id, visible) in changes {
            if visible {
                self.intersecting.insert(id.to_string());
            } else {
                self.intersecting.remove(id);
            }
        }
        let Some(first) = self.ids.iter().find(|id| self.intersecting.contains(*id)) else {
            return false;
        };
        if self.active.as_ref() == Some(first) {
            return false;
        }
        self.active = Some(first.clone());
        true
    }

    /// Recomputes intersection from rendered anchor positions.
    pub fn observe(&mut self, anchors: &[HeadingAnchor], viewport_height: f64) -> bool {
        let band = self.config.band;
        self.update(anchors.iter().map(|anchor| {
            (
                anchor.id.as_str(),
                band.intersects(anchor.top, anchor.bottom, viewport_height),
            )
        }))
    }

    /// Marks `id` active ahead of the observer and asks the host to scroll.
    pub fn click(&mut self, id: &str) -> Option<ScrollRequest> {
        let id = id.strip_prefix('#').unwrap_or(id);
        if id.is_empty() {
            tracing::warn!("table of contents entry has no id");
            return None;
        }
        self.active = Some(id.to_string());
        Some(ScrollRequest::to(id))
    }

    /// Schedules the scroll for a location fragment present at load.
    pub fn load_with_fragment(&mut self, fragment: &str, now: Instant) {
        let raw = fragment.strip_prefix('#').unwrap_or(fragment);
        if raw.is_empty() {
            return;
        }
        let id = match urlencoding::decode(raw) {
            Ok(id) => id.into_owned(),
            Err(err) => {
                tracing::warn!(fragment = raw, error = %err, "undecodable location fragment");
                raw.to_string()
            }
        };
        self.pending = Some((id, now + self.config.settle_delay()));
    }

    /// The scheduled initial scroll, once the settle delay has passed.
    pub fn poll(&mut self, now: Instant) -> Option<ScrollRequest> {
        let due = matches!(&self.pending, Some((_, at)) if now >= *at);
        if !due {
            return None;
        }
        let (id, _) = self.pending.take()?;
        if !self.ids.contains(&id) {
            tracing::warn!(id = %id, "location fragment matches no heading");
            return None;
        }
        self.active = Some(id.clone());
        Some(ScrollRequest::to(&id))
    }
}
