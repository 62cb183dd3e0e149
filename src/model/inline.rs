//! Segment content: mixed text and inline markup.
//!
//! A segment is an ordered sequence of items, each either a text run or an
//! inline element. Order is significant and preserved exactly. The item
//! set is closed, so descent and emission use exhaustive matches instead of
//! dynamic dispatch. Inline elements own nested segments (sub-flow text
//! recurses through `<sub>`), and the recursion terminates because XML
//! nesting is finite and acyclic.

use super::{Assoc, Pos};

/// Ordered mixed content of a `<seg>` or of a nested inline element.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Segment {
    pub items: Vec<InlineItem>,
}

impl Segment {
    pub fn new() -> Self {
        Segment { items: Vec::new() }
    }

    /// A segment holding a single text run.
    pub fn from_text(text: impl Into<String>) -> Self {
        Segment { items: vec![InlineItem::Text(text.into())] }
    }

    pub fn push(&mut self, item: InlineItem) {
        self.items.push(item);
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Concatenation of the directly-owned text runs, markup stripped.
    pub fn plain_text(&self) -> String {
        let mut out = String::new();
        for item in &self.items {
            if let InlineItem::Text(text) = item {
                out.push_str(text);
            }
        }
        out
    }
}

/// One item of segment content.
#[derive(Debug, Clone, PartialEq)]
pub enum InlineItem {
    /// A text run.
    Text(String),
    /// Begin paired tag.
    Bpt(Bpt),
    /// End paired tag.
    Ept(Ept),
    /// Isolated tag whose pair falls outside this segment.
    It(It),
    /// Standalone placeholder.
    Ph(Ph),
    /// Highlight span.
    Hi(Hi),
    /// Deprecated unknown tag, round-tripped for compatibility.
    Ut(Ut),
    /// Sub-flow, legal only inside code-bearing inline elements.
    Sub(Sub),
}

impl InlineItem {
    /// The element tag, or `None` for a text run.
    pub fn tag(&self) -> Option<&'static str> {
        match self {
            InlineItem::Text(_) => None,
            InlineItem::Bpt(_) => Some("bpt"),
            InlineItem::Ept(_) => Some("ept"),
            InlineItem::It(_) => Some("it"),
            InlineItem::Ph(_) => Some("ph"),
            InlineItem::Hi(_) => Some("hi"),
            InlineItem::Ut(_) => Some("ut"),
            InlineItem::Sub(_) => Some("sub"),
        }
    }
}

/// `<bpt>`: opens a paired sequence of native codes. Matched by the `<ept>`
/// carrying the same `i` within the same segment.
#[derive(Debug, Clone, PartialEq)]
pub struct Bpt {
    /// Pairing index, unique per side within a segment.
    pub i: u32,
    /// Correlation id, opaque, scoped to the segment.
    pub x: Option<u32>,
    /// User-defined tag type (`type` attribute).
    pub kind: Option<String>,
    /// Native code data and `<sub>` flows.
    pub content: Segment,
}

impl Bpt {
    pub fn new(i: u32) -> Self {
        Bpt { i, x: None, kind: None, content: Segment::new() }
    }
}

/// `<ept>`: closes the paired sequence opened by the `<bpt>` with the same `i`.
#[derive(Debug, Clone, PartialEq)]
pub struct Ept {
    pub i: u32,
    pub content: Segment,
}

impl Ept {
    pub fn new(i: u32) -> Self {
        Ept { i, content: Segment::new() }
    }
}

/// `<it>`: a begin/end code whose counterpart is not in this segment.
#[derive(Debug, Clone, PartialEq)]
pub struct It {
    pub pos: Pos,
    pub x: Option<u32>,
    pub kind: Option<String>,
    pub content: Segment,
}

impl It {
    pub fn new(pos: Pos) -> Self {
        It { pos, x: None, kind: None, content: Segment::new() }
    }
}

/// `<ph>`: a standalone native code (image tag, cross-reference, ...).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ph {
    pub x: Option<u32>,
    pub assoc: Option<Assoc>,
    pub kind: Option<String>,
    pub content: Segment,
}

impl Ph {
    pub fn new() -> Self {
        Ph::default()
    }
}

/// `<hi>`: a highlighted span of segment text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Hi {
    pub x: Option<u32>,
    pub kind: Option<String>,
    pub content: Segment,
}

impl Hi {
    pub fn new() -> Self {
        Hi::default()
    }
}

/// `<ut>`: deprecated since TMX 1.4 but still accepted and re-emitted.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Ut {
    pub x: Option<u32>,
    pub content: Segment,
}

impl Ut {
    pub fn new() -> Self {
        Ut::default()
    }
}

/// `<sub>`: sub-flow text embedded in native code, itself a full segment.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Sub {
    pub datatype: Option<String>,
    pub kind: Option<String>,
    pub content: Segment,
}

impl Sub {
    pub fn new() -> Self {
        Sub::default()
    }
}
