use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::ops::Path;

pub const NOTICE_TEXT: &str = "This content could not be loaded.";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Document {
    #[serde(default)]
    pub content: Vec<Node>,
}

/// A node of the document tree. The `type` tags match the names the
/// persisted documents already use (`dBlock`, `resizableMedia`, `hardBreak`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Node {
    #[serde(rename = "dBlock")]
    BlockWrapper(Container),
    #[serde(rename = "paragraph")]
    Paragraph(Container),
    #[serde(rename = "heading")]
    Heading(HeadingNode),
    #[serde(rename = "bulletList")]
    BulletList(Container),
    #[serde(rename = "orderedList")]
    OrderedList(Container),
    #[serde(rename = "listItem")]
    ListItem(Container),
    #[serde(rename = "blockquote")]
    Blockquote(Container),
    #[serde(rename = "resizableMedia")]
    Media(MediaNode),
    #[serde(rename = "dropZone")]
    DropZone,
    #[serde(rename = "hardBreak")]
    HardBreak,
    #[serde(rename = "text")]
    Text(TextNode),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct Container {
    #[serde(default)]
    pub content: Vec<Node>,
}

impl Container {
    pub fn new(content: Vec<Node>) -> Self {
        Self { content }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HeadingNode {
    pub attrs: HeadingAttrs,
    #[serde(default)]
    pub content: Vec<Node>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HeadingAttrs {
    pub level: HeadingLevel,
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "baseText")]
    pub base_text: Option<String>,
}

impl HeadingAttrs {
    pub fn new(level: HeadingLevel) -> Self {
        Self {
            level,
            id: None,
            base_text: None,
        }
    }
}

/// Heading levels are limited to 1..=3.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct HeadingLevel(u8);

impl HeadingLevel {
    pub const H1: Self = Self(1);
    pub const H2: Self = Self(2);
    pub const H3: Self = Self(3);

    pub fn new(level: u8) -> Option<Self> {
        (1..=3).contains(&level).then_some(Self(level))
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl TryFrom<u8> for HeadingLevel {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value).ok_or_else(|| format!("heading level out of range: {value}"))
    }
}

impl From<HeadingLevel> for u8 {
    fn from(value: HeadingLevel) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaNode {
    pub attrs: MediaAttrs,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaAttrs {
    pub src: String,
    #[serde(rename = "media-type")]
    pub media_type: MediaType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub alt: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default = "default_media_width")]
    pub width: Dimension,
    #[serde(default)]
    pub height: Dimension,
    #[serde(default, rename = "dataAlign")]
    pub align: Alignment,
    #[serde(default, rename = "dataFloat")]
    pub float: Option<Float>,
}

pub const DEFAULT_MEDIA_WIDTH: f64 = 400.0;

fn default_media_width() -> Dimension {
    Dimension::Px(DEFAULT_MEDIA_WIDTH)
}

impl MediaAttrs {
    pub fn new(src: impl Into<String>, media_type: MediaType) -> Self {
        Self {
            src: src.into(),
            media_type,
            alt: None,
            title: None,
            width: default_media_width(),
            height: Dimension::Auto,
            align: Alignment::default(),
            float: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Img,
    Video,
}

impl MediaType {
    /// Classifies a MIME type; anything that is neither image nor video is rejected.
    pub fn from_mime(mime: &str) -> Option<Self> {
        let mime = mime.trim().to_ascii_lowercase();
        if mime.starts_with("image/") {
            Some(Self::Img)
        } else if mime.starts_with("video/") {
            Some(Self::Video)
        } else {
            None
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Alignment {
    #[default]
    Start,
    Center,
    End,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Float {
    Left,
    Right,
}

/// A media dimension: a positive pixel length or `"auto"`.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub enum Dimension {
    #[default]
    Auto,
    Px(f64),
}

impl Dimension {
    pub fn px(self) -> Option<f64> {
        match self {
            Dimension::Px(v) => Some(v),
            Dimension::Auto => None,
        }
    }
}

impl Serialize for Dimension {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Dimension::Auto => serializer.serialize_str("auto"),
            Dimension::Px(v) => serializer.serialize_f64(*v),
        }
    }
}

impl<'de> Deserialize<'de> for Dimension {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Number(f64),
            Text(String),
        }

        let px = |v: f64| -> Result<Dimension, D::Error> {
            if v.is_finite() && v > 0.0 {
                Ok(Dimension::Px(v))
            } else {
                Err(serde::de::Error::custom(format!(
                    "dimension must be positive, got {v}"
                )))
            }
        };

        match Raw::deserialize(deserializer)? {
            Raw::Number(v) => px(v),
            Raw::Text(s) if s.trim() == "auto" => Ok(Dimension::Auto),
            Raw::Text(s) => {
                let v = s
                    .trim()
                    .trim_end_matches("px")
                    .parse::<f64>()
                    .map_err(|_| serde::de::Error::custom(format!("invalid dimension: {s:?}")))?;
                px(v)
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextNode {
    pub text: String,
    #[serde(default, skip_serializing_if = "Marks::is_empty")]
    pub marks: Marks,
}

/// Inline formatting of a text leaf. Stored as the mark array editors write
/// (`[{"type": "bold"}]`); the older object form still loads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Marks {
    pub bold: bool,
    pub italic: bool,
    pub strike: bool,
    pub underline: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MarkKind {
    Bold,
    Italic,
    Strike,
    Underline,
}

impl MarkKind {
    pub const ALL: [MarkKind; 4] = [
        MarkKind::Bold,
        MarkKind::Italic,
        MarkKind::Strike,
        MarkKind::Underline,
    ];

    pub fn name(self) -> &'static str {
        match self {
            MarkKind::Bold => "bold",
            MarkKind::Italic => "italic",
            MarkKind::Strike => "strike",
            MarkKind::Underline => "underline",
        }
    }

    fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|mark| mark.name() == name)
    }
}

impl Serialize for Marks {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        use serde::ser::SerializeSeq as _;

        #[derive(Serialize)]
        struct Mark {
            #[serde(rename = "type")]
            kind: &'static str,
        }

        let on: Vec<MarkKind> = MarkKind::ALL.into_iter().filter(|m| self.has(*m)).collect();
        let mut seq = serializer.serialize_seq(Some(on.len()))?;
        for mark in on {
            seq.serialize_element(&Mark { kind: mark.name() })?;
        }
        seq.end()
    }
}

impl<'de> Deserialize<'de> for Marks {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        struct Mark {
            #[serde(rename = "type")]
            kind: String,
        }

        #[derive(Deserialize)]
        struct Flags {
            #[serde(default)]
            bold: bool,
            #[serde(default)]
            italic: bool,
            #[serde(default)]
            strike: bool,
            #[serde(default)]
            underline: bool,
        }

        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            List(Vec<Mark>),
            Flags(Flags),
        }

        Ok(match Raw::deserialize(deserializer)? {
            Raw::List(list) => list.into_iter().fold(Marks::default(), |marks, mark| {
                match MarkKind::from_name(&mark.kind) {
                    Some(kind) => marks.with(kind, true),
                    None => {
                        tracing::warn!(mark = %mark.kind, "dropping unsupported mark");
                        marks
                    }
                }
            }),
            Raw::Flags(f) => Marks {
                bold: f.bold,
                italic: f.italic,
                strike: f.strike,
                underline: f.underline,
            },
        })
    }
}

impl Marks {
    pub fn is_empty(&self) -> bool {
        *self == Marks::default()
    }

    pub fn has(&self, mark: MarkKind) -> bool {
        match mark {
            MarkKind::Bold => self.bold,
            MarkKind::Italic => self.italic,
            MarkKind::Strike => self.strike,
            MarkKind::Underline => self.underline,
        }
    }

    pub fn with(mut self, mark: MarkKind, on: bool) -> Self {
        match mark {
            MarkKind::Bold => self.bold = on,
            MarkKind::Italic => self.italic = on,
            MarkKind::Strike => self.strike = on,
            MarkKind::Underline => self.underline = on,
        }
        self
    }
}

/// Attribute sets addressable by a `SetNodeAttrs` step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum NodeAttrs {
    Heading(HeadingAttrs),
    Media(MediaAttrs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListKind {
    Bullet,
    Ordered,
}

impl Node {
    pub fn text(text: impl Into<String>) -> Self {
        Node::Text(TextNode {
            text: text.into(),
            marks: Marks::default(),
        })
    }

    pub fn paragraph(text: impl Into<String>) -> Self {
        Node::Paragraph(Container::new(vec![Node::text(text)]))
    }

    pub fn heading(level: HeadingLevel, text: impl Into<String>) -> Self {
        Node::Heading(HeadingNode {
            attrs: HeadingAttrs::new(level),
            content: vec![Node::text(text)],
        })
    }

    pub fn media(attrs: MediaAttrs) -> Self {
        Node::Media(MediaNode { attrs })
    }

    pub fn list(kind: ListKind, items: Vec<Node>) -> Self {
        match kind {
            ListKind::Bullet => Node::BulletList(Container::new(items)),
            ListKind::Ordered => Node::OrderedList(Container::new(items)),
        }
    }

    pub fn list_item(blocks: Vec<Node>) -> Self {
        Node::ListItem(Container::new(blocks))
    }

    pub fn wrapped(block: Node) -> Self {
        Node::BlockWrapper(Container::new(vec![block]))
    }

    /// Placeholder paragraph used where content failed to load.
    pub fn notice() -> Self {
        Node::paragraph(NOTICE_TEXT)
    }

    pub fn type_name(&self) -> &'static str {
        match self {
            Node::BlockWrapper(_) => "dBlock",
            Node::Paragraph(_) => "paragraph",
            Node::Heading(_) => "heading",
            Node::BulletList(_) => "bulletList",
            Node::OrderedList(_) => "orderedList",
            Node::ListItem(_) => "listItem",
            Node::Blockquote(_) => "blockquote",
            Node::Media(_) => "resizableMedia",
            Node::DropZone => "dropZone",
            Node::HardBreak => "hardBreak",
            Node::Text(_) => "text",
        }
    }

    pub fn children(&self) -> Option<&[Node]> {
        match self {
            Node::BlockWrapper(c)
            | Node::Paragraph(c)
            | Node::BulletList(c)
            | Node::OrderedList(c)
            | Node::ListItem(c)
            | Node::Blockquote(c) => Some(&c.content),
            Node::Heading(h) => Some(&h.content),
            Node::Media(_) | Node::DropZone | Node::HardBreak | Node::Text(_) => None,
        }
    }

    pub fn children_mut(&mut self) -> Option<&mut Vec<Node>> {
        match self {
            Node::BlockWrapper(c)
            | Node::Paragraph(c)
            | Node::BulletList(c)
            | Node::OrderedList(c)
            | Node::ListItem(c)
            | Node::Blockquote(c) => Some(&mut c.content),
            Node::Heading(h) => Some(&mut h.content),
            Node::Media(_) | Node::DropZone | Node::HardBreak | Node::Text(_) => None,
        }
    }

    /// Paragraphs and headings: blocks whose children are inline nodes.
    pub fn is_text_block(&self) -> bool {
        matches!(self, Node::Paragraph(_) | Node::Heading(_))
    }

    /// Text leaves and hard breaks.
    pub fn is_inline(&self) -> bool {
        matches!(self, Node::Text(_) | Node::HardBreak)
    }

    pub fn list_kind(&self) -> Option<ListKind> {
        match self {
            Node::BulletList(_) => Some(ListKind::Bullet),
            Node::OrderedList(_) => Some(ListKind::Ordered),
            _ => None,
        }
    }

    pub fn attrs(&self) -> Option<NodeAttrs> {
        match self {
            Node::Heading(h) => Some(NodeAttrs::Heading(h.attrs.clone())),
            Node::Media(m) => Some(NodeAttrs::Media(m.attrs.clone())),
            _ => None,
        }
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        self.collect_text(&mut out);
        out
    }

    fn collect_text(&self, out: &mut String) {
        match self {
            Node::Text(t) => out.push_str(&t.text),
            Node::HardBreak => out.push('\n'),
            node => {
                for child in node.children().unwrap_or(&[]) {
                    child.collect_text(out);
                }
            }
        }
    }
}

impl Document {
    pub fn new(content: Vec<Node>) -> Self {
        Self { content }
    }

    /// A document whose top-level blocks are each wrapped in a `dBlock`.
    pub fn from_blocks(blocks: impl IntoIterator<Item = Node>) -> Self {
        Self {
            content: blocks.into_iter().map(Node::wrapped).collect(),
        }
    }

    pub fn node(&self, path: &[usize]) -> Option<&Node> {
        let (&first, rest) = path.split_first()?;
        let mut node = self.content.get(first)?;
        for &ix in rest {
            node = node.children()?.get(ix)?;
        }
        Some(node)
    }

    pub fn children_at(&self, parent_path: &[usize]) -> Option<&[Node]> {
        if parent_path.is_empty() {
            return Some(&self.content);
        }
        self.node(parent_path)?.children()
    }

    /// Depth-first, document-order walk over every node.
    pub fn walk(&self, mut f: impl FnMut(&[usize], &Node)) {
        fn walk_children(children: &[Node], path: &mut Path, f: &mut dyn FnMut(&[usize], &Node)) {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                f(path.as_slice(), node);
                if let Some(children) = node.children() {
                    walk_children(children, path, f);
                }
                path.pop();
            }
        }

        walk_children(&self.content, &mut Vec::new(), &mut f);
    }

    /// Headings in document order, with their paths.
    pub fn headings(&self) -> Vec<(Path, &HeadingNode)> {
        fn collect<'a>(children: &'a [Node], path: &mut Path, out: &mut Vec<(Path, &'a HeadingNode)>) {
            for (ix, node) in children.iter().enumerate() {
                path.push(ix);
                match node {
                    Node::Heading(h) => out.push((path.clone(), h)),
                    node => {
                        if let Some(children) = node.children() {
                            collect(children, path, out);
                        }
                    }
                }
                path.pop();
            }
        }

        let mut out = Vec::new();
        collect(&self.content, &mut Vec::new(), &mut out);
        out
    }

    pub fn text_content(&self) -> String {
        self.content.iter().map(Node::text_content).collect()
    }
}
