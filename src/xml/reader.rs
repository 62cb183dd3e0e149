//! Streaming XML reader producing element events and backend subtrees.
//!
//! The reader walks quick-xml's event stream and maintains a stack of open
//! elements. For every element it emits an `Open` event when the start tag
//! arrives and a `Close` event, carrying the completed backend subtree,
//! when the end tag arrives. Text is appended to the innermost open
//! element verbatim; no whitespace normalization happens at this layer
//! since segment text is significant.
//!
//! With a tag filter installed, subtrees rooted at a watched tag are built
//! but never attached to their parent, so the consumer of a `Close` event
//! holds the only reference and memory stays proportional to the largest
//! watched subtree rather than to the document.

use std::collections::VecDeque;
use std::io::BufRead;

use quick_xml::escape::unescape;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

use crate::backend::XmlBackend;
use crate::error::DeserializationError;
use crate::policy::{Behavior, PolicyValue};

/// One element boundary observed in the stream.
#[derive(Debug, Clone)]
pub enum NodeEvent<N> {
    /// A start tag. `depth` is zero for the document root.
    Open { tag: String, depth: usize },
    /// A matching end tag. `node` is the completed subtree.
    Close { tag: String, depth: usize, node: N },
}

struct Frame<N> {
    node: N,
    tag: String,
    watched: bool,
}

/// Pull reader over an XML byte stream.
pub struct EventReader<B: XmlBackend, R: BufRead> {
    backend: B,
    reader: Reader<R>,
    filter: Vec<String>,
    stack: Vec<Frame<B::Node>>,
    watched_open: usize,
    pending: VecDeque<NodeEvent<B::Node>>,
    buf: Vec<u8>,
    encoding_policy: PolicyValue,
    done: bool,
}

impl<B: XmlBackend, R: BufRead> EventReader<B, R> {
    pub fn new(backend: B, source: R) -> Self {
        let mut reader = Reader::from_reader(source);
        // Segment text is significant, keep it byte-for-byte.
        reader.config_mut().trim_text_start = false;
        reader.config_mut().trim_text_end = false;
        EventReader {
            backend,
            reader,
            filter: Vec::new(),
            stack: Vec::new(),
            watched_open: 0,
            pending: VecDeque::new(),
            buf: Vec::new(),
            encoding_policy: PolicyValue::raise(),
            done: false,
        }
    }

    /// Detaches subtrees rooted at the given tags from their parents.
    pub fn with_filter(mut self, tags: &[&str]) -> Self {
        self.filter = tags.iter().map(|t| t.to_string()).collect();
        self
    }

    /// How a declared-vs-supported encoding mismatch is resolved.
    pub fn with_encoding_policy(mut self, policy: PolicyValue) -> Self {
        self.encoding_policy = policy;
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Slash-joined tags of the currently open elements.
    fn path(&self) -> String {
        let tags: Vec<&str> = self.stack.iter().map(|f| f.tag.as_str()).collect();
        tags.join("/")
    }

    fn structural(&self, message: impl Into<String>) -> DeserializationError {
        DeserializationError::Structural { path: self.path(), message: message.into() }
    }

    fn open_element(&mut self, e: &BytesStart) -> Result<NodeEvent<B::Node>, DeserializationError> {
        let tag = self
            .reader
            .decoder()
            .decode(e.name().as_ref())
            .map_err(|err| self.structural(err.to_string()))?
            .to_string();
        let node = self.backend.make_element(&tag);
        for attr in e.attributes() {
            let attr = attr.map_err(|err| self.structural(format!("bad attribute: {}", err)))?;
            let key = self
                .reader
                .decoder()
                .decode(attr.key.as_ref())
                .map_err(|err| self.structural(err.to_string()))?
                .to_string();
            let value = attr
                .unescape_value()
                .map_err(|err| self.structural(err.to_string()))?;
            self.backend.set_attr(&node, &key, &value);
        }

        let attach = self.filter.is_empty() || self.watched_open > 0;
        if attach {
            if let Some(parent) = self.stack.last() {
                self.backend.append_child(&parent.node, &node);
            }
        }

        let watched = self.filter.iter().any(|t| *t == tag);
        if watched {
            self.watched_open += 1;
        }
        let depth = self.stack.len();
        self.stack.push(Frame { node, tag: tag.clone(), watched });
        Ok(NodeEvent::Open { tag, depth })
    }

    fn close_element(&mut self) -> Result<NodeEvent<B::Node>, DeserializationError> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| self.structural("closing tag with no open element"))?;
        if frame.watched {
            self.watched_open -= 1;
        }
        Ok(NodeEvent::Close { tag: frame.tag, depth: self.stack.len(), node: frame.node })
    }

    fn append_text(&mut self, text: &str) -> Result<(), DeserializationError> {
        match self.stack.last() {
            Some(frame) => {
                // Same rule as element attachment: with a filter active,
                // content outside any watched subtree lands on a node that
                // is never released, so drop it instead of accumulating.
                if self.filter.is_empty() || self.watched_open > 0 {
                    self.backend.append_text(&frame.node, text);
                }
                Ok(())
            }
            None if text.trim().is_empty() => Ok(()),
            None => Err(self.structural("text outside the document root")),
        }
    }

    fn check_declaration(
        &mut self,
        declared: Option<String>,
    ) -> Result<(), DeserializationError> {
        let declared = match declared {
            Some(enc) => enc,
            None => return Ok(()),
        };
        if declared.eq_ignore_ascii_case("utf-8") || declared.eq_ignore_ascii_case("us-ascii") {
            return Ok(());
        }
        let message = format!("declared encoding '{}' is not supported, expected UTF-8", declared);
        match &self.encoding_policy.behavior {
            Behavior::Raise => Err(DeserializationError::Encoding { message }),
            Behavior::Ignore => Ok(()),
            Behavior::Warn | Behavior::Default(_) => {
                log::log!(self.encoding_policy.level, "{}", message);
                Ok(())
            }
        }
    }
}

impl<B: XmlBackend, R: BufRead> Iterator for EventReader<B, R> {
    type Item = Result<NodeEvent<B::Node>, DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some(event) = self.pending.pop_front() {
            return Some(Ok(event));
        }
        if self.done {
            return None;
        }
        // The event borrows the buffer, so take it out of self while the
        // event is alive to keep &mut self available for the handlers.
        let mut buf = std::mem::take(&mut self.buf);
        let item = loop {
            buf.clear();
            match self.reader.read_event_into(&mut buf) {
                Ok(Event::Start(ref e)) => break Some(self.open_element(e)),
                Ok(Event::End(_)) => break Some(self.close_element()),
                Ok(Event::Empty(ref e)) => {
                    let open = match self.open_element(e) {
                        Ok(event) => event,
                        Err(err) => break Some(Err(err)),
                    };
                    match self.close_element() {
                        Ok(close) => self.pending.push_back(close),
                        Err(err) => break Some(Err(err)),
                    }
                    break Some(Ok(open));
                }
                Ok(Event::Text(ref e)) => {
                    let raw = match std::str::from_utf8(e.as_ref()) {
                        Ok(raw) => raw,
                        Err(err) => {
                            self.done = true;
                            break Some(Err(DeserializationError::Encoding {
                                message: err.to_string(),
                            }));
                        }
                    };
                    let text = match unescape(raw) {
                        Ok(text) => text,
                        Err(err) => break Some(Err(self.structural(err.to_string()))),
                    };
                    if let Err(err) = self.append_text(&text) {
                        break Some(Err(err));
                    }
                }
                Ok(Event::CData(ref e)) => {
                    let text = String::from_utf8_lossy(e.as_ref()).to_string();
                    if let Err(err) = self.append_text(&text) {
                        break Some(Err(err));
                    }
                }
                Ok(Event::GeneralRef(ref e)) => {
                    let name = String::from_utf8_lossy(e.as_ref()).to_string();
                    match resolve_reference(&name) {
                        Some(text) => {
                            if let Err(err) = self.append_text(&text) {
                                break Some(Err(err));
                            }
                        }
                        None => log::warn!("skipping unresolvable entity reference &{};", name),
                    }
                }
                Ok(Event::Decl(ref e)) => {
                    let declared = e
                        .encoding()
                        .and_then(|enc| enc.ok())
                        .map(|enc| String::from_utf8_lossy(enc.as_ref()).to_string());
                    if let Err(err) = self.check_declaration(declared) {
                        self.done = true;
                        break Some(Err(err));
                    }
                }
                Ok(Event::Comment(_)) | Ok(Event::PI(_)) | Ok(Event::DocType(_)) => {}
                Ok(Event::Eof) => {
                    self.done = true;
                    if !self.stack.is_empty() {
                        break Some(Err(self.structural("unexpected end of document")));
                    }
                    break None;
                }
                Err(err) => {
                    self.done = true;
                    break Some(Err(self.structural(format!("XML parse error: {}", err))));
                }
            }
        };
        self.buf = buf;
        item
    }
}

/// Resolves a predefined or numeric character reference.
fn resolve_reference(name: &str) -> Option<String> {
    match name {
        "amp" => return Some("&".to_string()),
        "lt" => return Some("<".to_string()),
        "gt" => return Some(">".to_string()),
        "apos" => return Some("'".to_string()),
        "quot" => return Some("\"".to_string()),
        _ => {}
    }
    let digits = name.strip_prefix('#')?;
    let code = match digits.strip_prefix('x').or_else(|| digits.strip_prefix('X')) {
        Some(hex) => u32::from_str_radix(hex, 16).ok()?,
        None => digits.parse::<u32>().ok()?,
    };
    char::from_u32(code).map(|c| c.to_string())
}

/// Materializes a whole document and returns its root element.
pub fn read_tree<B: XmlBackend, R: BufRead>(
    backend: B,
    source: R,
    encoding_policy: PolicyValue,
) -> Result<B::Node, DeserializationError> {
    let reader = EventReader::new(backend, source).with_encoding_policy(encoding_policy);
    let mut root: Option<B::Node> = None;
    for event in reader {
        match event? {
            NodeEvent::Close { depth: 0, node, .. } => {
                if root.is_some() {
                    return Err(DeserializationError::Structural {
                        path: String::new(),
                        message: "multiple root elements".to_string(),
                    });
                }
                root = Some(node);
            }
            _ => {}
        }
    }
    root.ok_or_else(|| DeserializationError::Structural {
        path: String::new(),
        message: "document has no root element".to_string(),
    })
}

enum Step<N> {
    Enter(N, usize),
    Exit(N, usize),
}

/// Replays a materialized tree through the same event contract the
/// streaming reader uses, so consumers need only one code path.
pub struct TreeEvents<B: XmlBackend> {
    backend: B,
    agenda: Vec<Step<B::Node>>,
}

impl<B: XmlBackend> TreeEvents<B> {
    pub fn new(backend: B, root: B::Node) -> Self {
        TreeEvents { backend, agenda: vec![Step::Enter(root, 0)] }
    }
}

impl<B: XmlBackend> Iterator for TreeEvents<B> {
    type Item = Result<NodeEvent<B::Node>, DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        match self.agenda.pop()? {
            Step::Enter(node, depth) => {
                let tag = self.backend.tag(&node);
                let children = self.backend.child_elements(&node);
                self.agenda.push(Step::Exit(node, depth));
                for child in children.into_iter().rev() {
                    self.agenda.push(Step::Enter(child, depth + 1));
                }
                Some(Ok(NodeEvent::Open { tag, depth }))
            }
            Step::Exit(node, depth) => {
                let tag = self.backend.tag(&node);
                Some(Ok(NodeEvent::Close { tag, depth, node }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{SimpleBackend, XmlBackend};

    fn collect_tags(xml: &str) -> Vec<String> {
        let reader = EventReader::new(SimpleBackend::new(), xml.as_bytes());
        reader
            .map(|event| match event.unwrap() {
                NodeEvent::Open { tag, .. } => format!("+{}", tag),
                NodeEvent::Close { tag, .. } => format!("-{}", tag),
            })
            .collect()
    }

    #[test]
    fn test_event_order() {
        let tags = collect_tags("<a><b/><c>x</c></a>");
        assert_eq!(tags, vec!["+a", "+b", "-b", "+c", "-c", "-a"]);
    }

    #[test]
    fn test_close_carries_subtree() {
        let backend = SimpleBackend::new();
        let reader = EventReader::new(backend, "<tu tuid=\"1\"><seg>Hi</seg></tu>".as_bytes());
        let backend = SimpleBackend::new();
        let mut root = None;
        for event in reader {
            if let NodeEvent::Close { depth: 0, node, .. } = event.unwrap() {
                root = Some(node);
            }
        }
        let root = root.unwrap();
        assert_eq!(backend.attr(&root, "tuid"), Some("1".to_string()));
        let seg = &backend.child_elements(&root)[0];
        assert_eq!(backend.text(seg), "Hi");
    }

    #[test]
    fn test_filter_detaches_watched_subtrees() {
        let backend = SimpleBackend::new();
        let xml = "<body><tu><seg>a</seg></tu><tu><seg>b</seg></tu></body>";
        let reader = EventReader::new(backend, xml.as_bytes()).with_filter(&["tu"]);
        let backend = SimpleBackend::new();
        let mut tus = Vec::new();
        let mut body = None;
        for event in reader {
            match event.unwrap() {
                NodeEvent::Close { tag, node, .. } if tag == "tu" => tus.push(node),
                NodeEvent::Close { tag, node, .. } if tag == "body" => body = Some(node),
                _ => {}
            }
        }
        assert_eq!(tus.len(), 2);
        // Watched subtrees stay complete internally.
        assert_eq!(backend.text(&backend.child_elements(&tus[1])[0]), "b");
        // But the body never accumulated them.
        assert!(backend.child_elements(&body.unwrap()).is_empty());
    }

    #[test]
    fn test_filter_drops_text_between_watched_subtrees() {
        let backend = SimpleBackend::new();
        // Pretty-printed input: indentation sits between the tu elements.
        let mut xml = String::from("<body>\n");
        for i in 0..50 {
            xml.push_str(&format!("    <tu><seg>unit {}</seg></tu>\n", i));
        }
        xml.push_str("</body>");
        let reader = EventReader::new(backend, std::io::Cursor::new(xml)).with_filter(&["tu"]);
        let backend = SimpleBackend::new();
        let mut body = None;
        let mut tus = 0usize;
        for event in reader {
            match event.unwrap() {
                NodeEvent::Close { tag, node, .. } if tag == "body" => body = Some(node),
                NodeEvent::Close { tag, .. } if tag == "tu" => tus += 1,
                _ => {}
            }
        }
        assert_eq!(tus, 50);
        // The inter-unit whitespace must not pile up on the detached body.
        let body = body.unwrap();
        assert!(backend.items(&body).is_empty());
        assert_eq!(backend.text(&body), "");
    }

    #[test]
    fn test_text_preserved_verbatim() {
        let backend = SimpleBackend::new();
        let root =
            read_tree(backend, "<seg>  two  spaces &amp; a tail </seg>".as_bytes(), PolicyValue::raise())
                .unwrap();
        let backend = SimpleBackend::new();
        assert_eq!(backend.text(&root), "  two  spaces & a tail ");
    }

    #[test]
    fn test_numeric_character_reference() {
        assert_eq!(resolve_reference("#163"), Some("\u{a3}".to_string()));
        assert_eq!(resolve_reference("#xA3"), Some("\u{a3}".to_string()));
        assert_eq!(resolve_reference("nbsp"), None);
    }

    #[test]
    fn test_declared_encoding_mismatch_raises() {
        let xml = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><tmx/>";
        let mut reader = EventReader::new(SimpleBackend::new(), xml.as_bytes());
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, DeserializationError::Encoding { .. }));
    }

    #[test]
    fn test_declared_encoding_mismatch_ignored() {
        let xml = "<?xml version=\"1.0\" encoding=\"ISO-8859-1\"?><tmx/>";
        let reader = EventReader::new(SimpleBackend::new(), xml.as_bytes())
            .with_encoding_policy(PolicyValue::ignore());
        assert_eq!(reader.count(), 2);
    }

    #[test]
    fn test_truncated_document_is_structural() {
        let reader = EventReader::new(SimpleBackend::new(), "<a><b>".as_bytes());
        let last = reader.last().unwrap();
        assert!(last.is_err());
    }

    #[test]
    fn test_tree_events_replay() {
        let backend = SimpleBackend::new();
        let root = read_tree(backend, "<a><b/><c>x</c></a>".as_bytes(), PolicyValue::raise()).unwrap();
        let events = TreeEvents::new(SimpleBackend::new(), root);
        let tags: Vec<String> = events
            .map(|event| match event.unwrap() {
                NodeEvent::Open { tag, .. } => format!("+{}", tag),
                NodeEvent::Close { tag, .. } => format!("-{}", tag),
            })
            .collect();
        assert_eq!(tags, vec!["+a", "+b", "-b", "+c", "-c", "-a"]);
    }
}
