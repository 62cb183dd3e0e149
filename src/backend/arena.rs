//! Flat-arena element tree backend.
//!
//! All nodes of a document live in one table and all strings in one
//! interned buffer; a node handle is the arena plus an index. Compared to
//! the per-node allocation of the simple backend this keeps large
//! documents in a handful of contiguous buffers, at the cost of never
//! reclaiming individual subtrees before the arena itself drops.

use std::cell::RefCell;
use std::rc::Rc;

use super::{XmlBackend, XmlItem};

/// A slice of the arena's string buffer.
#[derive(Debug, Clone, Copy)]
struct StrRef {
    off: u32,
    len: u32,
}

#[derive(Debug, Clone, Copy)]
enum RawItem {
    Element(u32),
    Text(StrRef),
}

#[derive(Debug)]
struct RawNode {
    tag: StrRef,
    attrs: Vec<(StrRef, StrRef)>,
    items: Vec<RawItem>,
}

#[derive(Debug, Default)]
struct Arena {
    nodes: Vec<RawNode>,
    strings: String,
}

impl Arena {
    fn intern(&mut self, value: &str) -> StrRef {
        let off = self.strings.len() as u32;
        self.strings.push_str(value);
        StrRef { off, len: value.len() as u32 }
    }

    fn resolve(&self, sref: StrRef) -> &str {
        &self.strings[sref.off as usize..(sref.off + sref.len) as usize]
    }
}

/// Handle to one element of an [`ArenaBackend`] arena.
#[derive(Debug, Clone)]
pub struct ArenaNode {
    arena: Rc<RefCell<Arena>>,
    index: u32,
}

/// Arena-backed backend. All nodes it creates share one arena, so trees
/// built through one `ArenaBackend` instance may be attached to each other
/// freely.
#[derive(Debug, Clone, Default)]
pub struct ArenaBackend {
    arena: Rc<RefCell<Arena>>,
}

impl ArenaBackend {
    pub fn new() -> Self {
        ArenaBackend::default()
    }
}

impl XmlBackend for ArenaBackend {
    type Node = ArenaNode;

    fn tag(&self, node: &ArenaNode) -> String {
        let arena = node.arena.borrow();
        arena.resolve(arena.nodes[node.index as usize].tag).to_string()
    }

    fn attr(&self, node: &ArenaNode, name: &str) -> Option<String> {
        let arena = node.arena.borrow();
        arena.nodes[node.index as usize]
            .attrs
            .iter()
            .find(|(k, _)| arena.resolve(*k) == name)
            .map(|(_, v)| arena.resolve(*v).to_string())
    }

    fn attrs(&self, node: &ArenaNode) -> Vec<(String, String)> {
        let arena = node.arena.borrow();
        arena.nodes[node.index as usize]
            .attrs
            .iter()
            .map(|(k, v)| (arena.resolve(*k).to_string(), arena.resolve(*v).to_string()))
            .collect()
    }

    fn items(&self, node: &ArenaNode) -> Vec<XmlItem<ArenaNode>> {
        let arena = node.arena.borrow();
        arena.nodes[node.index as usize]
            .items
            .iter()
            .map(|item| match item {
                RawItem::Element(index) => XmlItem::Element(ArenaNode {
                    arena: node.arena.clone(),
                    index: *index,
                }),
                RawItem::Text(sref) => XmlItem::Text(arena.resolve(*sref).to_string()),
            })
            .collect()
    }

    fn make_element(&self, tag: &str) -> ArenaNode {
        let mut arena = self.arena.borrow_mut();
        let tag = arena.intern(tag);
        let index = arena.nodes.len() as u32;
        arena.nodes.push(RawNode { tag, attrs: Vec::new(), items: Vec::new() });
        ArenaNode { arena: self.arena.clone(), index }
    }

    fn set_attr(&self, node: &ArenaNode, name: &str, value: &str) {
        let mut arena = node.arena.borrow_mut();
        let value = arena.intern(value);
        let existing = arena.nodes[node.index as usize]
            .attrs
            .iter()
            .position(|(k, _)| arena.resolve(*k) == name);
        match existing {
            Some(pos) => arena.nodes[node.index as usize].attrs[pos].1 = value,
            None => {
                let name = arena.intern(name);
                arena.nodes[node.index as usize].attrs.push((name, value));
            }
        }
    }

    fn append_child(&self, parent: &ArenaNode, child: &ArenaNode) {
        debug_assert!(Rc::ptr_eq(&parent.arena, &child.arena));
        let mut arena = parent.arena.borrow_mut();
        arena.nodes[parent.index as usize]
            .items
            .push(RawItem::Element(child.index));
    }

    fn append_text(&self, node: &ArenaNode, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut arena = node.arena.borrow_mut();
        // Extend the previous run in place when it ends at the tip of the
        // string buffer, the common case while parsing.
        let buffer_end = arena.strings.len() as u32;
        if let Some(RawItem::Text(last)) = arena.nodes[node.index as usize].items.last().copied() {
            if last.off + last.len == buffer_end {
                arena.strings.push_str(text);
                if let Some(RawItem::Text(last)) =
                    arena.nodes[node.index as usize].items.last_mut()
                {
                    last.len += text.len() as u32;
                }
                return;
            }
        }
        let sref = arena.intern(text);
        arena.nodes[node.index as usize].items.push(RawItem::Text(sref));
    }
}

impl PartialEq for ArenaNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.arena, &other.arena) && self.index == other.index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_coalescing_across_interleaved_builds() {
        let backend = ArenaBackend::new();
        let node = backend.make_element("seg");
        backend.append_text(&node, "Hello, ");
        backend.append_text(&node, "world");
        assert_eq!(backend.items(&node).len(), 1);
        assert_eq!(backend.text(&node), "Hello, world");

        // Interning another string in between breaks buffer adjacency;
        // the runs must still read back in order.
        let other = backend.make_element("ph");
        backend.append_text(&other, "x");
        backend.append_text(&node, "!");
        assert_eq!(backend.text(&node), "Hello, world!");
    }

    #[test]
    fn test_attr_replacement() {
        let backend = ArenaBackend::new();
        let node = backend.make_element("tuv");
        backend.set_attr(&node, "xml:lang", "en");
        backend.set_attr(&node, "datatype", "plaintext");
        backend.set_attr(&node, "xml:lang", "en-GB");
        assert_eq!(backend.attr(&node, "xml:lang"), Some("en-GB".to_string()));
        assert_eq!(backend.attrs(&node).len(), 2);
    }

    #[test]
    fn test_shared_arena_attachment() {
        let backend = ArenaBackend::new();
        let root = backend.make_element("body");
        let tu = backend.make_element("tu");
        backend.append_child(&root, &tu);
        let children = backend.child_elements(&root);
        assert_eq!(children.len(), 1);
        assert_eq!(children[0], tu);
    }
}
