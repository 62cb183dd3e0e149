//! Pluggable XML tree backends.
//!
//! The deserializer, serializer, and streaming reader are generic over a
//! backend that provides a minimal element-tree capability set: read a tag,
//! read attributes, walk ordered mixed content, and build new elements.
//! Codec logic never touches a concrete tree representation, so a document
//! parsed through one backend serializes identically through another.
//!
//! Two backends ship with the crate: [`simple::SimpleBackend`], a
//! reference-counted node tree, and [`arena::ArenaBackend`], a flat arena
//! with index handles and an interned string buffer.

pub mod arena;
pub mod simple;

pub use arena::ArenaBackend;
pub use simple::SimpleBackend;

/// One item of an element's ordered mixed content.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlItem<N> {
    Element(N),
    Text(String),
}

/// The capability set every XML tree backend provides.
///
/// `Node` is a cheap-to-clone handle, not the node data itself; cloning a
/// handle never copies the subtree. All read accessors return owned values
/// so handle lifetimes never leak into codec code. Mutators take `&self`
/// and `&Node` since handles use interior mutability.
pub trait XmlBackend {
    type Node: Clone;

    /// The element's tag name.
    fn tag(&self, node: &Self::Node) -> String;

    /// The value of a single attribute, if present.
    fn attr(&self, node: &Self::Node, name: &str) -> Option<String>;

    /// All attributes in document order.
    fn attrs(&self, node: &Self::Node) -> Vec<(String, String)>;

    /// The element's mixed content in document order. Adjacent text is
    /// returned coalesced into single items.
    fn items(&self, node: &Self::Node) -> Vec<XmlItem<Self::Node>>;

    /// Creates a detached element.
    fn make_element(&self, tag: &str) -> Self::Node;

    /// Sets an attribute, replacing any previous value for `name`.
    fn set_attr(&self, node: &Self::Node, name: &str, value: &str);

    /// Appends a child element.
    fn append_child(&self, parent: &Self::Node, child: &Self::Node);

    /// Appends a text run, merging with a trailing text run if one exists.
    fn append_text(&self, node: &Self::Node, text: &str);

    /// Child elements only, text skipped.
    fn child_elements(&self, node: &Self::Node) -> Vec<Self::Node> {
        self.items(node)
            .into_iter()
            .filter_map(|item| match item {
                XmlItem::Element(child) => Some(child),
                XmlItem::Text(_) => None,
            })
            .collect()
    }

    /// Concatenation of the element's direct text runs.
    fn text(&self, node: &Self::Node) -> String {
        let mut out = String::new();
        for item in self.items(node) {
            if let XmlItem::Text(text) = item {
                out.push_str(&text);
            }
        }
        out
    }
}
