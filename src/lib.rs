//! TMX 1.4b translation memory reader and writer.
//!
//! This library parses and generates Translation Memory eXchange
//! documents. It keeps the XML tree representation behind a backend
//! abstraction, resolves every grammar violation through a configurable
//! policy instead of hard-coding strictness, and offers both whole-document
//! and streaming access.
//!
//! # Overview
//!
//! - [`model`] is the plain object model: [`Tmx`], [`Header`], [`Tu`],
//!   [`Tuv`], and the inline markup of a [`Segment`].
//! - [`backend`] defines the tree capability set with two implementations,
//!   a reference-counted tree and a flat arena.
//! - [`Deserializer`] and [`Serializer`] map between trees and the model,
//!   consulting a [`DeserializationPolicy`] or [`SerializationPolicy`].
//! - [`TmxReader`] streams translation units with bounded memory.
//!
//! # Example
//!
//! ```
//! use tmx_rs::{parse_str, to_xml_string, DeserializationPolicy, SerializationPolicy};
//!
//! let xml = r#"<tmx version="1.4">
//!   <header creationtool="demo" creationtoolversion="1" segtype="sentence"
//!           o-tmf="tmx" adminlang="en" srclang="en" datatype="plaintext" />
//!   <body>
//!     <tu tuid="1">
//!       <tuv xml:lang="en"><seg>Hello, world!</seg></tuv>
//!       <tuv xml:lang="fr"><seg>Bonjour, le monde!</seg></tuv>
//!     </tu>
//!   </body>
//! </tmx>"#;
//!
//! let tmx = parse_str(xml, &DeserializationPolicy::default()).unwrap();
//! assert_eq!(tmx.body[0].variant("fr").unwrap().seg.plain_text(), "Bonjour, le monde!");
//!
//! let out = to_xml_string(&tmx, &SerializationPolicy::default()).unwrap();
//! assert!(out.contains("srclang=\"en\""));
//! ```

pub mod backend;
pub mod deserializer;
pub mod error;
pub mod model;
pub mod policy;
pub mod serializer;
pub mod stream;
pub mod xml;

pub use backend::{ArenaBackend, SimpleBackend, XmlBackend, XmlItem};
pub use deserializer::Deserializer;
pub use error::{DeserializationError, SerializationError, ViolationKind};
pub use model::{
    Assoc, Bpt, Ept, Header, Hi, InlineItem, It, Map, Note, ParseLiteralError, Ph, Pos, Prop,
    Segment, Segtype, Sub, Tmx, Tu, Tuv, Ude, Ut,
};
pub use policy::{Behavior, DeserializationPolicy, PolicyValue, SerializationPolicy};
pub use serializer::Serializer;
pub use stream::TmxReader;

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

/// Parses a whole TMX document from a byte source using the default
/// [`SimpleBackend`].
pub fn parse<R: BufRead>(
    source: R,
    policy: &DeserializationPolicy,
) -> Result<Tmx, DeserializationError> {
    parse_with(SimpleBackend::new(), source, policy)
}

/// Parses a whole TMX document through an explicit backend.
pub fn parse_with<B: XmlBackend, R: BufRead>(
    backend: B,
    source: R,
    policy: &DeserializationPolicy,
) -> Result<Tmx, DeserializationError>
where
    B: Clone,
{
    let root = xml::read_tree(backend.clone(), source, policy.encoding_mismatch.clone())?;
    Deserializer::new(backend, policy.clone()).deserialize(&root)
}

/// Parses a whole TMX document from a string.
pub fn parse_str(xml: &str, policy: &DeserializationPolicy) -> Result<Tmx, DeserializationError> {
    parse(xml.as_bytes(), policy)
}

/// Parses a whole TMX document from a file.
pub fn parse_file<P: AsRef<Path>>(
    path: P,
    policy: &DeserializationPolicy,
) -> Result<Tmx, DeserializationError> {
    let file = File::open(path)?;
    parse(BufReader::new(file), policy)
}

/// Serializes a document into a writer using the default [`SimpleBackend`].
pub fn write_document<W: Write>(
    tmx: &Tmx,
    policy: &SerializationPolicy,
    writer: &mut W,
) -> Result<(), SerializationError> {
    let backend = SimpleBackend::new();
    let root = Serializer::new(backend, policy.clone()).serialize(tmx)?;
    xml::write_document(&SimpleBackend::new(), &root, writer)?;
    Ok(())
}

/// Serializes a document into a string.
pub fn to_xml_string(tmx: &Tmx, policy: &SerializationPolicy) -> Result<String, SerializationError> {
    let mut out = Vec::new();
    write_document(tmx, policy, &mut out)?;
    Ok(String::from_utf8_lossy(&out).to_string())
}

/// Serializes a document into a file.
pub fn write_file<P: AsRef<Path>>(
    tmx: &Tmx,
    policy: &SerializationPolicy,
    path: P,
) -> Result<(), SerializationError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    write_document(tmx, policy, &mut writer)
}
