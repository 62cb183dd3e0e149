//! Mapping from the TMX object model back to backend trees.
//!
//! Attribute emission follows the DTD's declaration order for every
//! element, and children are emitted in grammar order (notes, then props,
//! then udes/variants/seg), so output is deterministic regardless of which
//! backend builds the tree. Grammar checks run against the in-memory model
//! before the corresponding subtree is built and are resolved through the
//! active [`SerializationPolicy`].

use std::collections::{HashMap, HashSet};

use crate::backend::XmlBackend;
use crate::error::SerializationError;
use crate::model::{
    format_date, Header, InlineItem, Map, Note, Prop, Segment, Tmx, Tu, Tuv, Ude,
};
use crate::policy::{Behavior, PolicyValue, SerializationPolicy};

/// Content model for one level of segment emission.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allow {
    Markup,
    SubOnly,
}

/// Maps the TMX object model to backend trees.
pub struct Serializer<B: XmlBackend> {
    backend: B,
    policy: SerializationPolicy,
}

impl<B: XmlBackend> Serializer<B> {
    pub fn new(backend: B, policy: SerializationPolicy) -> Self {
        Serializer { backend, policy }
    }

    pub fn policy(&self) -> &SerializationPolicy {
        &self.policy
    }

    /// Builds the `<tmx>` element tree for a document.
    pub fn serialize(&self, tmx: &Tmx) -> Result<B::Node, SerializationError> {
        let root = self.backend.make_element("tmx");
        // Output is always TMX 1.4 regardless of the parsed version.
        self.backend.set_attr(&root, "version", "1.4");
        let header = self.header(&tmx.header, "tmx/header")?;
        self.backend.append_child(&root, &header);

        let body = self.backend.make_element("body");
        for (index, tu) in tmx.body.iter().enumerate() {
            let path = format!("tmx/body/tu[{}]", index);
            let node = self.tu(tu, &path)?;
            self.backend.append_child(&body, &node);
        }
        self.backend.append_child(&root, &body);
        Ok(root)
    }

    fn header(&self, header: &Header, path: &str) -> Result<B::Node, SerializationError> {
        for (name, value) in [
            ("creationtool", &header.creationtool),
            ("creationtoolversion", &header.creationtoolversion),
            ("o-tmf", &header.o_tmf),
            ("adminlang", &header.adminlang),
            ("srclang", &header.srclang),
            ("datatype", &header.datatype),
        ] {
            if value.is_empty() {
                self.violation(
                    &self.policy.missing_required_field,
                    SerializationError::Attribute {
                        path: path.to_string(),
                        message: format!("required attribute '{}' is empty", name),
                    },
                )?;
            }
        }

        let node = self.backend.make_element("header");
        self.backend.set_attr(&node, "creationtool", &header.creationtool);
        self.backend.set_attr(&node, "creationtoolversion", &header.creationtoolversion);
        self.backend.set_attr(&node, "segtype", header.segtype.as_str());
        self.backend.set_attr(&node, "o-tmf", &header.o_tmf);
        self.backend.set_attr(&node, "adminlang", &header.adminlang);
        self.backend.set_attr(&node, "srclang", &header.srclang);
        self.backend.set_attr(&node, "datatype", &header.datatype);
        self.set_opt(&node, "o-encoding", header.o_encoding.as_deref());
        self.set_date(&node, "creationdate", header.creationdate.as_ref());
        self.set_opt(&node, "creationid", header.creationid.as_deref());
        self.set_date(&node, "changedate", header.changedate.as_ref());
        self.set_opt(&node, "changeid", header.changeid.as_deref());

        for note in &header.notes {
            let child = self.note(note);
            self.backend.append_child(&node, &child);
        }
        for prop in &header.props {
            let child = self.prop(prop);
            self.backend.append_child(&node, &child);
        }
        for ude in &header.udes {
            let child = self.ude(ude, &format!("{}/ude", path))?;
            self.backend.append_child(&node, &child);
        }
        Ok(node)
    }

    fn tu(&self, tu: &Tu, path: &str) -> Result<B::Node, SerializationError> {
        if tu.variants.is_empty() {
            self.violation(
                &self.policy.empty_variants,
                SerializationError::Structural {
                    path: path.to_string(),
                    message: "tu has no language variants".to_string(),
                },
            )?;
        }

        let node = self.backend.make_element("tu");
        self.set_opt(&node, "tuid", tu.tuid.as_deref());
        self.set_opt(&node, "o-encoding", tu.o_encoding.as_deref());
        self.set_opt(&node, "datatype", tu.datatype.as_deref());
        self.set_u32(&node, "usagecount", tu.usagecount);
        self.set_date(&node, "lastusagedate", tu.lastusagedate.as_ref());
        self.set_opt(&node, "creationtool", tu.creationtool.as_deref());
        self.set_opt(&node, "creationtoolversion", tu.creationtoolversion.as_deref());
        self.set_date(&node, "creationdate", tu.creationdate.as_ref());
        self.set_opt(&node, "creationid", tu.creationid.as_deref());
        self.set_date(&node, "changedate", tu.changedate.as_ref());
        if let Some(segtype) = tu.segtype {
            self.backend.set_attr(&node, "segtype", segtype.as_str());
        }
        self.set_opt(&node, "changeid", tu.changeid.as_deref());
        self.set_opt(&node, "o-tmf", tu.o_tmf.as_deref());
        self.set_opt(&node, "srclang", tu.srclang.as_deref());

        for note in &tu.notes {
            let child = self.note(note);
            self.backend.append_child(&node, &child);
        }
        for prop in &tu.props {
            let child = self.prop(prop);
            self.backend.append_child(&node, &child);
        }
        for (index, tuv) in tu.variants.iter().enumerate() {
            let child = self.tuv(tuv, &format!("{}/tuv[{}]", path, index))?;
            self.backend.append_child(&node, &child);
        }
        Ok(node)
    }

    fn tuv(&self, tuv: &Tuv, path: &str) -> Result<B::Node, SerializationError> {
        if tuv.lang.is_empty() {
            self.violation(
                &self.policy.missing_required_field,
                SerializationError::Attribute {
                    path: path.to_string(),
                    message: "required attribute 'xml:lang' is empty".to_string(),
                },
            )?;
        }

        let node = self.backend.make_element("tuv");
        self.backend.set_attr(&node, "xml:lang", &tuv.lang);
        self.set_opt(&node, "o-encoding", tuv.o_encoding.as_deref());
        self.set_opt(&node, "datatype", tuv.datatype.as_deref());
        self.set_u32(&node, "usagecount", tuv.usagecount);
        self.set_date(&node, "lastusagedate", tuv.lastusagedate.as_ref());
        self.set_opt(&node, "creationtool", tuv.creationtool.as_deref());
        self.set_opt(&node, "creationtoolversion", tuv.creationtoolversion.as_deref());
        self.set_date(&node, "creationdate", tuv.creationdate.as_ref());
        self.set_opt(&node, "creationid", tuv.creationid.as_deref());
        self.set_date(&node, "changedate", tuv.changedate.as_ref());
        self.set_opt(&node, "changeid", tuv.changeid.as_deref());
        self.set_opt(&node, "o-tmf", tuv.o_tmf.as_deref());

        for note in &tuv.notes {
            let child = self.note(note);
            self.backend.append_child(&node, &child);
        }
        for prop in &tuv.props {
            let child = self.prop(prop);
            self.backend.append_child(&node, &child);
        }

        let seg_path = format!("{}/seg", path);
        let seg = self.backend.make_element("seg");
        self.check_segment_refs(&tuv.seg, &seg_path)?;
        self.emit_segment(&seg, &tuv.seg, &seg_path, Allow::Markup)?;
        self.backend.append_child(&node, &seg);
        Ok(node)
    }

    fn note(&self, note: &Note) -> B::Node {
        let node = self.backend.make_element("note");
        self.set_opt(&node, "xml:lang", note.lang.as_deref());
        self.set_opt(&node, "o-encoding", note.o_encoding.as_deref());
        self.backend.append_text(&node, &note.text);
        node
    }

    fn prop(&self, prop: &Prop) -> B::Node {
        let node = self.backend.make_element("prop");
        self.backend.set_attr(&node, "type", &prop.kind);
        self.set_opt(&node, "xml:lang", prop.lang.as_deref());
        self.set_opt(&node, "o-encoding", prop.o_encoding.as_deref());
        self.backend.append_text(&node, &prop.text);
        node
    }

    fn ude(&self, ude: &Ude, path: &str) -> Result<B::Node, SerializationError> {
        if ude.base.is_none() && ude.maps.iter().any(|m| m.code.is_some()) {
            self.violation(
                &self.policy.ude_base_missing,
                SerializationError::Attribute {
                    path: path.to_string(),
                    message: format!("ude '{}' has code-bearing maps but no base", ude.name),
                },
            )?;
        }
        let node = self.backend.make_element("ude");
        self.backend.set_attr(&node, "name", &ude.name);
        self.set_opt(&node, "base", ude.base.as_deref());
        for map in &ude.maps {
            let child = self.map(map);
            self.backend.append_child(&node, &child);
        }
        Ok(node)
    }

    fn map(&self, map: &Map) -> B::Node {
        let node = self.backend.make_element("map");
        self.backend.set_attr(&node, "unicode", &map.unicode);
        self.set_opt(&node, "code", map.code.as_deref());
        self.set_opt(&node, "ent", map.ent.as_deref());
        self.set_opt(&node, "subst", map.subst.as_deref());
        node
    }

    fn emit_segment(
        &self,
        parent: &B::Node,
        segment: &Segment,
        path: &str,
        allow: Allow,
    ) -> Result<(), SerializationError> {
        for item in &segment.items {
            let admitted = match (allow, item) {
                (_, InlineItem::Text(_)) => true,
                (Allow::Markup, InlineItem::Sub(_)) => false,
                (Allow::Markup, _) => true,
                (Allow::SubOnly, InlineItem::Sub(_)) => true,
                (Allow::SubOnly, _) => false,
            };
            if !admitted {
                self.violation(
                    &self.policy.invalid_content,
                    SerializationError::Structural {
                        path: path.to_string(),
                        message: format!(
                            "inline element '{}' not allowed here",
                            item.tag().unwrap_or("text")
                        ),
                    },
                )?;
                continue;
            }
            match item {
                InlineItem::Text(text) => self.backend.append_text(parent, text),
                InlineItem::Bpt(bpt) => {
                    let node = self.backend.make_element("bpt");
                    self.backend.set_attr(&node, "i", &bpt.i.to_string());
                    self.set_u32(&node, "x", bpt.x);
                    self.set_opt(&node, "type", bpt.kind.as_deref());
                    self.emit_segment(&node, &bpt.content, path, Allow::SubOnly)?;
                    self.backend.append_child(parent, &node);
                }
                InlineItem::Ept(ept) => {
                    let node = self.backend.make_element("ept");
                    self.backend.set_attr(&node, "i", &ept.i.to_string());
                    self.emit_segment(&node, &ept.content, path, Allow::SubOnly)?;
                    self.backend.append_child(parent, &node);
                }
                InlineItem::It(it) => {
                    let node = self.backend.make_element("it");
                    self.backend.set_attr(&node, "pos", it.pos.as_str());
                    self.set_u32(&node, "x", it.x);
                    self.set_opt(&node, "type", it.kind.as_deref());
                    self.emit_segment(&node, &it.content, path, Allow::SubOnly)?;
                    self.backend.append_child(parent, &node);
                }
                InlineItem::Ph(ph) => {
                    let node = self.backend.make_element("ph");
                    self.set_u32(&node, "x", ph.x);
                    if let Some(assoc) = ph.assoc {
                        self.backend.set_attr(&node, "assoc", assoc.as_str());
                    }
                    self.set_opt(&node, "type", ph.kind.as_deref());
                    self.emit_segment(&node, &ph.content, path, Allow::SubOnly)?;
                    self.backend.append_child(parent, &node);
                }
                InlineItem::Hi(hi) => {
                    let node = self.backend.make_element("hi");
                    self.set_u32(&node, "x", hi.x);
                    self.set_opt(&node, "type", hi.kind.as_deref());
                    self.emit_segment(&node, &hi.content, path, Allow::Markup)?;
                    self.backend.append_child(parent, &node);
                }
                InlineItem::Ut(ut) => {
                    let node = self.backend.make_element("ut");
                    self.set_u32(&node, "x", ut.x);
                    self.emit_segment(&node, &ut.content, path, Allow::SubOnly)?;
                    self.backend.append_child(parent, &node);
                }
                InlineItem::Sub(sub) => {
                    let node = self.backend.make_element("sub");
                    self.set_opt(&node, "datatype", sub.datatype.as_deref());
                    self.set_opt(&node, "type", sub.kind.as_deref());
                    // A sub-flow opens a fresh pairing scope.
                    self.check_segment_refs(&sub.content, &format!("{}/sub", path))?;
                    self.emit_segment(&node, &sub.content, path, Allow::Markup)?;
                    self.backend.append_child(parent, &node);
                }
            }
        }
        Ok(())
    }

    /// Checks bpt/ept matching within one segment scope, `hi` included.
    fn check_segment_refs(&self, segment: &Segment, path: &str) -> Result<(), SerializationError> {
        let mut bpt: HashMap<u32, u32> = HashMap::new();
        let mut ept: HashMap<u32, u32> = HashMap::new();
        count_pair_indices(segment, &mut bpt, &mut ept);

        let all: HashSet<u32> = bpt.keys().chain(ept.keys()).copied().collect();
        for i in all {
            let opens = bpt.get(&i).copied().unwrap_or(0);
            let closes = ept.get(&i).copied().unwrap_or(0);
            if opens > 1 || closes > 1 {
                self.violation(
                    &self.policy.duplicate_index,
                    SerializationError::Reference {
                        path: path.to_string(),
                        message: format!("duplicate pairing index {}", i),
                    },
                )?;
            } else if opens != closes {
                self.violation(
                    &self.policy.unmatched_pair,
                    SerializationError::Reference {
                        path: path.to_string(),
                        message: format!("pairing index {} has no counterpart", i),
                    },
                )?;
            }
        }
        Ok(())
    }

    fn violation(
        &self,
        value: &PolicyValue,
        err: SerializationError,
    ) -> Result<(), SerializationError> {
        match &value.behavior {
            Behavior::Raise => Err(err),
            Behavior::Ignore => Ok(()),
            Behavior::Warn | Behavior::Default(_) => {
                log::log!(value.level, "{}", err);
                Ok(())
            }
        }
    }

    fn set_opt(&self, node: &B::Node, name: &str, value: Option<&str>) {
        if let Some(value) = value {
            self.backend.set_attr(node, name, value);
        }
    }

    fn set_u32(&self, node: &B::Node, name: &str, value: Option<u32>) {
        if let Some(value) = value {
            self.backend.set_attr(node, name, &value.to_string());
        }
    }

    fn set_date(&self, node: &B::Node, name: &str, value: Option<&chrono::DateTime<chrono::Utc>>) {
        if let Some(value) = value {
            self.backend.set_attr(node, name, &format_date(value));
        }
    }
}

fn count_pair_indices(segment: &Segment, bpt: &mut HashMap<u32, u32>, ept: &mut HashMap<u32, u32>) {
    for item in &segment.items {
        match item {
            InlineItem::Bpt(b) => *bpt.entry(b.i).or_insert(0) += 1,
            InlineItem::Ept(e) => *ept.entry(e.i).or_insert(0) += 1,
            InlineItem::Hi(hi) => count_pair_indices(&hi.content, bpt, ept),
            _ => {}
        }
    }
}
