//! Streaming access to translation units.
//!
//! [`TmxReader`] yields one [`Tu`] at a time without materializing the
//! document. It drives an event source with `header` and `tu` watched, so
//! everything between translation units is discarded as soon as it closes
//! and memory stays proportional to the largest single unit. The same
//! iterator can replay an already-materialized tree, which keeps one code
//! path for both access modes.

use std::io::BufRead;

use crate::backend::XmlBackend;
use crate::deserializer::Deserializer;
use crate::error::DeserializationError;
use crate::model::{Header, Tu};
use crate::policy::DeserializationPolicy;
use crate::xml::{EventReader, NodeEvent, TreeEvents};

type EventSource<N> = Box<dyn Iterator<Item = Result<NodeEvent<N>, DeserializationError>>>;

/// Pull iterator over the `<tu>` elements of a TMX stream.
pub struct TmxReader<B: XmlBackend> {
    deserializer: Deserializer<B>,
    source: EventSource<B::Node>,
    header: Option<Header>,
    tu_index: usize,
    saw_root: bool,
    done: bool,
}

impl<B> TmxReader<B>
where
    B: XmlBackend + Clone + 'static,
    B::Node: 'static,
{
    /// Streams from a byte source.
    pub fn new<R: BufRead + 'static>(backend: B, source: R, policy: DeserializationPolicy) -> Self {
        let events = EventReader::new(backend.clone(), source)
            .with_filter(&["header", "tu"])
            .with_encoding_policy(policy.encoding_mismatch.clone());
        TmxReader {
            deserializer: Deserializer::new(backend, policy),
            source: Box::new(events),
            header: None,
            tu_index: 0,
            saw_root: false,
            done: false,
        }
    }

    /// Replays a materialized `<tmx>` tree.
    pub fn from_tree(backend: B, root: B::Node, policy: DeserializationPolicy) -> Self {
        let events = TreeEvents::new(backend.clone(), root);
        TmxReader {
            deserializer: Deserializer::new(backend, policy),
            source: Box::new(events),
            header: None,
            tu_index: 0,
            saw_root: false,
            done: false,
        }
    }
}

impl<B: XmlBackend> TmxReader<B> {
    /// The document header, available once the stream has passed it.
    pub fn header(&self) -> Option<&Header> {
        self.header.as_ref()
    }

    fn fail(&mut self, err: DeserializationError) -> Option<Result<Tu, DeserializationError>> {
        self.done = true;
        Some(Err(err))
    }
}

impl<B: XmlBackend> Iterator for TmxReader<B> {
    type Item = Result<Tu, DeserializationError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        loop {
            let event = match self.source.next() {
                Some(Ok(event)) => event,
                Some(Err(err)) => return self.fail(err),
                None => {
                    self.done = true;
                    if !self.saw_root {
                        return Some(Err(DeserializationError::Structural {
                            path: String::new(),
                            message: "document has no tmx root element".to_string(),
                        }));
                    }
                    return None;
                }
            };
            match event {
                NodeEvent::Open { tag, depth: 0 } => {
                    if tag != "tmx" {
                        return self.fail(DeserializationError::Structural {
                            path: tag.clone(),
                            message: format!("expected root element 'tmx', found '{}'", tag),
                        });
                    }
                    self.saw_root = true;
                }
                NodeEvent::Close { tag, depth: 1, node } if tag == "header" => {
                    if self.header.is_some() {
                        // Keep the first; the full deserializer consults the
                        // multiple_header policy, streaming just logs.
                        log::warn!("tmx: more than one header element, keeping the first");
                        continue;
                    }
                    match self.deserializer.header(&node, "tmx/header") {
                        Ok(header) => self.header = Some(header),
                        Err(err) => return self.fail(err),
                    }
                }
                NodeEvent::Close { tag, depth: 2, node } if tag == "tu" => {
                    let path = format!("tmx/body/tu[{}]", self.tu_index);
                    self.tu_index += 1;
                    let result = self.deserializer.tu(&node, &path);
                    if result.is_err() {
                        self.done = true;
                    }
                    return Some(result);
                }
                _ => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimpleBackend;
    use crate::policy::PolicyValue;
    use crate::xml::read_tree;

    const DOC: &str = concat!(
        "<tmx version=\"1.4\">",
        "<header creationtool=\"t\" creationtoolversion=\"1\" segtype=\"sentence\" ",
        "o-tmf=\"tmx\" adminlang=\"en\" srclang=\"en\" datatype=\"plaintext\" />",
        "<body>",
        "<tu tuid=\"1\"><tuv xml:lang=\"en\"><seg>one</seg></tuv></tu>",
        "<tu tuid=\"2\"><tuv xml:lang=\"en\"><seg>two</seg></tuv></tu>",
        "<tu tuid=\"3\"><tuv xml:lang=\"en\"><seg>three</seg></tuv></tu>",
        "</body>",
        "</tmx>",
    );

    #[test]
    fn test_streaming_yields_each_tu() {
        let mut reader = TmxReader::new(
            SimpleBackend::new(),
            DOC.as_bytes(),
            DeserializationPolicy::default(),
        );
        let mut texts = Vec::new();
        for tu in reader.by_ref() {
            let tu = tu.unwrap();
            texts.push(tu.variants[0].seg.plain_text());
        }
        assert_eq!(texts, vec!["one", "two", "three"]);
        assert_eq!(reader.header().unwrap().srclang, "en");
    }

    #[test]
    fn test_header_available_after_first_tu() {
        let mut reader = TmxReader::new(
            SimpleBackend::new(),
            DOC.as_bytes(),
            DeserializationPolicy::default(),
        );
        assert!(reader.header().is_none());
        reader.next().unwrap().unwrap();
        assert_eq!(reader.header().unwrap().creationtool, "t");
    }

    #[test]
    fn test_replay_from_materialized_tree() {
        let root = read_tree(SimpleBackend::new(), DOC.as_bytes(), PolicyValue::raise()).unwrap();
        let reader = TmxReader::from_tree(
            SimpleBackend::new(),
            root,
            DeserializationPolicy::default(),
        );
        let tuids: Vec<String> = reader
            .map(|tu| tu.unwrap().tuid.unwrap())
            .collect();
        assert_eq!(tuids, vec!["1", "2", "3"]);
    }

    #[test]
    fn test_wrong_root_is_structural() {
        let mut reader = TmxReader::new(
            SimpleBackend::new(),
            "<xliff></xliff>".as_bytes(),
            DeserializationPolicy::default(),
        );
        let err = reader.next().unwrap().unwrap_err();
        assert!(matches!(err, DeserializationError::Structural { .. }));
        assert!(reader.next().is_none());
    }

    #[test]
    fn test_bad_tu_stops_iteration() {
        let doc = DOC.replace("<tuv xml:lang=\"en\"><seg>two</seg></tuv>", "<tuv><seg>two</seg></tuv>");
        let reader = TmxReader::new(
            SimpleBackend::new(),
            std::io::Cursor::new(doc),
            DeserializationPolicy::strict(),
        );
        let results: Vec<_> = reader.collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(results[1].is_err());
    }

    #[test]
    fn test_large_generated_stream() {
        let mut doc = String::from(
            "<tmx version=\"1.4\"><header creationtool=\"t\" creationtoolversion=\"1\" \
             segtype=\"sentence\" o-tmf=\"tmx\" adminlang=\"en\" srclang=\"en\" \
             datatype=\"plaintext\" /><body>",
        );
        for i in 0..500 {
            doc.push_str(&format!(
                "<tu tuid=\"{0}\"><tuv xml:lang=\"en\"><seg>unit {0}</seg></tuv></tu>",
                i
            ));
        }
        doc.push_str("</body></tmx>");

        let reader = TmxReader::new(
            SimpleBackend::new(),
            std::io::Cursor::new(doc),
            DeserializationPolicy::default(),
        );
        let mut count = 0usize;
        for (i, tu) in reader.enumerate() {
            let tu = tu.unwrap();
            assert_eq!(tu.tuid.as_deref(), Some(i.to_string().as_str()));
            count += 1;
        }
        assert_eq!(count, 500);
    }
}
