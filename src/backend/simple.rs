//! Reference-counted element tree backend.
//!
//! Each node is an `Rc<RefCell<..>>` so handles are cheap to clone and
//! subtrees can be built detached and attached later. Trees are strictly
//! parent-to-child owned; there are no parent back-pointers, so dropping a
//! root drops the whole subtree without cycles.

use std::cell::RefCell;
use std::rc::Rc;

use super::{XmlBackend, XmlItem};

#[derive(Debug)]
struct SimpleElement {
    tag: String,
    attrs: Vec<(String, String)>,
    items: Vec<XmlItem<SimpleNode>>,
}

/// Handle to one element of a [`SimpleBackend`] tree.
#[derive(Debug, Clone)]
pub struct SimpleNode(Rc<RefCell<SimpleElement>>);

/// The default backend. Stateless; every tree it builds is self-contained.
#[derive(Debug, Clone, Copy, Default)]
pub struct SimpleBackend;

impl SimpleBackend {
    pub fn new() -> Self {
        SimpleBackend
    }
}

impl XmlBackend for SimpleBackend {
    type Node = SimpleNode;

    fn tag(&self, node: &SimpleNode) -> String {
        node.0.borrow().tag.clone()
    }

    fn attr(&self, node: &SimpleNode, name: &str) -> Option<String> {
        node.0
            .borrow()
            .attrs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.clone())
    }

    fn attrs(&self, node: &SimpleNode) -> Vec<(String, String)> {
        node.0.borrow().attrs.clone()
    }

    fn items(&self, node: &SimpleNode) -> Vec<XmlItem<SimpleNode>> {
        node.0.borrow().items.clone()
    }

    fn make_element(&self, tag: &str) -> SimpleNode {
        SimpleNode(Rc::new(RefCell::new(SimpleElement {
            tag: tag.to_string(),
            attrs: Vec::new(),
            items: Vec::new(),
        })))
    }

    fn set_attr(&self, node: &SimpleNode, name: &str, value: &str) {
        let mut inner = node.0.borrow_mut();
        if let Some(entry) = inner.attrs.iter_mut().find(|(k, _)| k == name) {
            entry.1 = value.to_string();
        } else {
            inner.attrs.push((name.to_string(), value.to_string()));
        }
    }

    fn append_child(&self, parent: &SimpleNode, child: &SimpleNode) {
        parent.0.borrow_mut().items.push(XmlItem::Element(child.clone()));
    }

    fn append_text(&self, node: &SimpleNode, text: &str) {
        if text.is_empty() {
            return;
        }
        let mut inner = node.0.borrow_mut();
        if let Some(XmlItem::Text(last)) = inner.items.last_mut() {
            last.push_str(text);
        } else {
            inner.items.push(XmlItem::Text(text.to_string()));
        }
    }
}

// Handle equality, not structural equality.
impl PartialEq for SimpleNode {
    fn eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}
