//! XML output for backend trees.
//!
//! Emits compact, deterministic XML: attributes in stored order, ` />` for
//! childless elements, entities escaped in both text and attribute values.
//! No whitespace is ever inserted inside an element, so segment text
//! survives a write/read cycle byte-for-byte.

use std::io::Write;

use crate::backend::{XmlBackend, XmlItem};

/// Writes a full document: XML declaration, the tree, a trailing newline.
pub fn write_document<B: XmlBackend, W: Write>(
    backend: &B,
    root: &B::Node,
    writer: &mut W,
) -> std::io::Result<()> {
    write!(writer, "<?xml version=\"1.0\" encoding=\"UTF-8\"?>")?;
    write_element(backend, root, writer)?;
    writeln!(writer)?;
    writer.flush()
}

/// Writes a full document into a string.
pub fn write_to_string<B: XmlBackend>(backend: &B, root: &B::Node) -> std::io::Result<String> {
    let mut out = Vec::new();
    write_document(backend, root, &mut out)?;
    Ok(String::from_utf8_lossy(&out).to_string())
}

fn write_element<B: XmlBackend, W: Write>(
    backend: &B,
    node: &B::Node,
    writer: &mut W,
) -> std::io::Result<()> {
    let tag = backend.tag(node);
    write!(writer, "<{}", tag)?;
    for (name, value) in backend.attrs(node) {
        write!(writer, " {}=\"{}\"", name, to_entities(&value))?;
    }

    let items = backend.items(node);
    if items.is_empty() {
        return write!(writer, " />");
    }

    write!(writer, ">")?;
    for item in items {
        match item {
            XmlItem::Element(child) => write_element(backend, &child, writer)?,
            XmlItem::Text(text) => write!(writer, "{}", to_entities(&text))?,
        }
    }
    write!(writer, "</{}>", tag)
}

/// Converts special characters to XML entities.
fn to_entities(s: &str) -> String {
    let mut result = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => result.push_str("&amp;"),
            '<' => result.push_str("&lt;"),
            '>' => result.push_str("&gt;"),
            '\'' => result.push_str("&apos;"),
            '"' => result.push_str("&quot;"),
            _ => result.push(c),
        }
    }
    result
}
