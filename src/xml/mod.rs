//! XML event input and serialized output.
//!
//! [`reader::EventReader`] turns a byte stream into open/close element
//! events while building backend subtrees, optionally detaching everything
//! outside a set of watched tags so completed subtrees can be dropped as
//! they are consumed. [`writer`] prints a backend tree back to bytes.

pub mod reader;
pub mod writer;

pub use reader::{read_tree, EventReader, NodeEvent, TreeEvents};
pub use writer::{write_document, write_to_string};
