//! Recursive-descent mapping from backend trees to the TMX object model.
//!
//! Each element kind has one handler that validates its tag, attributes,
//! and children against the TMX 1.4b grammar. Every violation is resolved
//! through the active [`DeserializationPolicy`] before anything is dropped
//! or substituted, so strictness is entirely a caller decision. Handlers
//! carry a slash-joined path with child indices (`tmx/body/tu[3]/tuv[1]`)
//! that ends up in every error and log line.

use std::collections::{HashMap, HashSet};

use crate::backend::{XmlBackend, XmlItem};
use crate::error::DeserializationError;
use crate::model::{
    parse_date, Assoc, Bpt, Ept, Header, Hi, InlineItem, It, Map, Note, Ph, Pos, Prop, Segment,
    Segtype, Sub, Tmx, Tu, Tuv, Ude, Ut,
};
use crate::policy::{Behavior, DeserializationPolicy, PolicyValue};

const TMX_ATTRS: &[&str] = &["version"];
const HEADER_ATTRS: &[&str] = &[
    "creationtool",
    "creationtoolversion",
    "segtype",
    "o-tmf",
    "adminlang",
    "srclang",
    "datatype",
    "o-encoding",
    "creationdate",
    "creationid",
    "changedate",
    "changeid",
];
const NOTE_ATTRS: &[&str] = &["xml:lang", "lang", "o-encoding"];
const PROP_ATTRS: &[&str] = &["type", "xml:lang", "lang", "o-encoding"];
const UDE_ATTRS: &[&str] = &["name", "base"];
const MAP_ATTRS: &[&str] = &["unicode", "code", "ent", "subst"];
const TU_ATTRS: &[&str] = &[
    "tuid",
    "o-encoding",
    "datatype",
    "usagecount",
    "lastusagedate",
    "creationtool",
    "creationtoolversion",
    "creationdate",
    "creationid",
    "changedate",
    "segtype",
    "changeid",
    "o-tmf",
    "srclang",
];
const TUV_ATTRS: &[&str] = &[
    "xml:lang",
    "lang",
    "o-encoding",
    "datatype",
    "usagecount",
    "lastusagedate",
    "creationtool",
    "creationtoolversion",
    "creationdate",
    "creationid",
    "changedate",
    "changeid",
    "o-tmf",
];
const BPT_ATTRS: &[&str] = &["i", "x", "type"];
const EPT_ATTRS: &[&str] = &["i"];
const IT_ATTRS: &[&str] = &["pos", "x", "type"];
const PH_ATTRS: &[&str] = &["x", "assoc", "type"];
const HI_ATTRS: &[&str] = &["x", "type"];
const UT_ATTRS: &[&str] = &["x"];
const SUB_ATTRS: &[&str] = &["datatype", "type"];

/// Content model for one level of segment descent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Allow {
    /// seg, hi, sub: text plus bpt/ept/it/ph/hi/ut.
    Markup,
    /// bpt, ept, it, ph, ut: text plus sub.
    SubOnly,
}

/// Maps backend trees to the TMX object model.
pub struct Deserializer<B: XmlBackend> {
    backend: B,
    policy: DeserializationPolicy,
}

impl<B: XmlBackend> Deserializer<B> {
    pub fn new(backend: B, policy: DeserializationPolicy) -> Self {
        Deserializer { backend, policy }
    }

    pub fn policy(&self) -> &DeserializationPolicy {
        &self.policy
    }

    /// Maps a `<tmx>` root element to a [`Tmx`] document.
    pub fn deserialize(&self, root: &B::Node) -> Result<Tmx, DeserializationError> {
        let tag = self.backend.tag(root);
        if tag != "tmx" {
            return Err(DeserializationError::Structural {
                path: tag.clone(),
                message: format!("expected root element 'tmx', found '{}'", tag),
            });
        }
        let path = "tmx";
        self.check_unknown_attrs(root, TMX_ATTRS, path)?;
        let version = self.require_attr(root, "version", path, "1.4")?;

        let mut header: Option<Header> = None;
        let mut body: Vec<Tu> = Vec::new();
        for item in self.backend.items(root) {
            match item {
                XmlItem::Text(text) => self.check_stray_text(&text, path)?,
                XmlItem::Element(child) => match self.backend.tag(&child).as_str() {
                    "header" => {
                        if header.is_some() {
                            self.resolve(
                                &self.policy.multiple_header,
                                DeserializationError::Structural {
                                    path: format!("{}/header", path),
                                    message: "more than one header element".to_string(),
                                },
                            )?;
                            // Keep the first.
                            continue;
                        }
                        header = Some(self.header(&child, &format!("{}/header", path))?);
                    }
                    "body" => {
                        let body_path = format!("{}/body", path);
                        let mut index = 0usize;
                        for body_item in self.backend.items(&child) {
                            match body_item {
                                XmlItem::Text(text) => self.check_stray_text(&text, &body_path)?,
                                XmlItem::Element(grandchild) => {
                                    let tag = self.backend.tag(&grandchild);
                                    if tag == "tu" {
                                        let tu_path = format!("{}/tu[{}]", body_path, index);
                                        body.push(self.tu(&grandchild, &tu_path)?);
                                        index += 1;
                                    } else {
                                        self.unexpected(&tag, &body_path)?;
                                    }
                                }
                            }
                        }
                    }
                    other => self.unexpected(other, path)?,
                },
            }
        }

        let header = match header {
            Some(header) => header,
            None => {
                self.resolve(
                    &self.policy.missing_header,
                    DeserializationError::Structural {
                        path: path.to_string(),
                        message: "document has no header element".to_string(),
                    },
                )?;
                // Placeholder so permissive callers still get a document.
                Header::new("unknown", "unknown", Segtype::Sentence, "unknown", "*all*", "*all*", "unknown")
            }
        };

        let mut tmx = Tmx::new(header);
        tmx.version = version;
        tmx.body = body;
        Ok(tmx)
    }

    /// Maps a `<header>` element.
    pub fn header(&self, node: &B::Node, path: &str) -> Result<Header, DeserializationError> {
        self.check_tag(node, "header", path)?;
        self.check_unknown_attrs(node, HEADER_ATTRS, path)?;

        let mut header = Header::new(
            self.require_attr(node, "creationtool", path, "")?,
            self.require_attr(node, "creationtoolversion", path, "")?,
            self.required_segtype(node, path)?,
            self.require_attr(node, "o-tmf", path, "")?,
            self.require_attr(node, "adminlang", path, "")?,
            self.require_attr(node, "srclang", path, "")?,
            self.require_attr(node, "datatype", path, "")?,
        );
        header.o_encoding = self.backend.attr(node, "o-encoding");
        header.creationdate = self.date_attr(node, "creationdate", path)?;
        header.creationid = self.backend.attr(node, "creationid");
        header.changedate = self.date_attr(node, "changedate", path)?;
        header.changeid = self.backend.attr(node, "changeid");

        for item in self.backend.items(node) {
            match item {
                XmlItem::Text(text) => self.check_stray_text(&text, path)?,
                XmlItem::Element(child) => match self.backend.tag(&child).as_str() {
                    "note" => {
                        if let Some(note) = self.note(&child, &format!("{}/note", path))? {
                            header.notes.push(note);
                        }
                    }
                    "prop" => {
                        if let Some(prop) = self.prop(&child, &format!("{}/prop", path))? {
                            header.props.push(prop);
                        }
                    }
                    "ude" => {
                        if let Some(ude) = self.ude(&child, &format!("{}/ude", path))? {
                            header.udes.push(ude);
                        }
                    }
                    other => self.unexpected(other, path)?,
                },
            }
        }
        Ok(header)
    }

    /// Maps a `<tu>` element.
    pub fn tu(&self, node: &B::Node, path: &str) -> Result<Tu, DeserializationError> {
        self.check_tag(node, "tu", path)?;
        self.check_unknown_attrs(node, TU_ATTRS, path)?;

        let mut tu = Tu::new();
        tu.tuid = self.backend.attr(node, "tuid");
        tu.o_encoding = self.backend.attr(node, "o-encoding");
        tu.datatype = self.backend.attr(node, "datatype");
        tu.usagecount = self.u32_attr(node, "usagecount", path)?;
        tu.lastusagedate = self.date_attr(node, "lastusagedate", path)?;
        tu.creationtool = self.backend.attr(node, "creationtool");
        tu.creationtoolversion = self.backend.attr(node, "creationtoolversion");
        tu.creationdate = self.date_attr(node, "creationdate", path)?;
        tu.creationid = self.backend.attr(node, "creationid");
        tu.changedate = self.date_attr(node, "changedate", path)?;
        tu.segtype = self.optional_segtype(node, path)?;
        tu.changeid = self.backend.attr(node, "changeid");
        tu.o_tmf = self.backend.attr(node, "o-tmf");
        tu.srclang = self.backend.attr(node, "srclang");

        let mut index = 0usize;
        for item in self.backend.items(node) {
            match item {
                XmlItem::Text(text) => self.check_stray_text(&text, path)?,
                XmlItem::Element(child) => match self.backend.tag(&child).as_str() {
                    "note" => {
                        if let Some(note) = self.note(&child, &format!("{}/note", path))? {
                            tu.notes.push(note);
                        }
                    }
                    "prop" => {
                        if let Some(prop) = self.prop(&child, &format!("{}/prop", path))? {
                            tu.props.push(prop);
                        }
                    }
                    "tuv" => {
                        let tuv_path = format!("{}/tuv[{}]", path, index);
                        tu.variants.push(self.tuv(&child, &tuv_path)?);
                        index += 1;
                    }
                    other => self.unexpected(other, path)?,
                },
            }
        }
        Ok(tu)
    }

    /// Maps a `<tuv>` element.
    fn tuv(&self, node: &B::Node, path: &str) -> Result<Tuv, DeserializationError> {
        self.check_unknown_attrs(node, TUV_ATTRS, path)?;
        let lang = match self.lang_attr(node) {
            Some(lang) => lang,
            None => {
                let resolved = self.resolve(
                    &self.policy.missing_required_attribute,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: "missing required attribute 'xml:lang'".to_string(),
                    },
                )?;
                resolved.unwrap_or_default()
            }
        };

        let mut tuv = Tuv::new(lang);
        tuv.o_encoding = self.backend.attr(node, "o-encoding");
        tuv.datatype = self.backend.attr(node, "datatype");
        tuv.usagecount = self.u32_attr(node, "usagecount", path)?;
        tuv.lastusagedate = self.date_attr(node, "lastusagedate", path)?;
        tuv.creationtool = self.backend.attr(node, "creationtool");
        tuv.creationtoolversion = self.backend.attr(node, "creationtoolversion");
        tuv.creationdate = self.date_attr(node, "creationdate", path)?;
        tuv.creationid = self.backend.attr(node, "creationid");
        tuv.changedate = self.date_attr(node, "changedate", path)?;
        tuv.changeid = self.backend.attr(node, "changeid");
        tuv.o_tmf = self.backend.attr(node, "o-tmf");

        let mut seg: Option<Segment> = None;
        for item in self.backend.items(node) {
            match item {
                XmlItem::Text(text) => self.check_stray_text(&text, path)?,
                XmlItem::Element(child) => match self.backend.tag(&child).as_str() {
                    "note" => {
                        if let Some(note) = self.note(&child, &format!("{}/note", path))? {
                            tuv.notes.push(note);
                        }
                    }
                    "prop" => {
                        if let Some(prop) = self.prop(&child, &format!("{}/prop", path))? {
                            tuv.props.push(prop);
                        }
                    }
                    "seg" => {
                        let seg_path = format!("{}/seg", path);
                        if seg.is_some() {
                            self.resolve(
                                &self.policy.multiple_seg,
                                DeserializationError::Structural {
                                    path: seg_path,
                                    message: "more than one seg element".to_string(),
                                },
                            )?;
                            continue;
                        }
                        seg = Some(self.segment(&child, &seg_path)?);
                    }
                    other => self.unexpected(other, path)?,
                },
            }
        }

        tuv.seg = match seg {
            Some(seg) => seg,
            None => {
                self.resolve(
                    &self.policy.missing_seg,
                    DeserializationError::Structural {
                        path: path.to_string(),
                        message: "tuv has no seg element".to_string(),
                    },
                )?;
                Segment::new()
            }
        };
        Ok(tuv)
    }

    /// Maps a `<seg>` element and enforces segment-scoped reference rules.
    pub fn segment(&self, node: &B::Node, path: &str) -> Result<Segment, DeserializationError> {
        self.check_unknown_attrs(node, &[], path)?;
        let mut segment = self.inline_content(node, path, Allow::Markup)?;
        self.check_segment_refs(&mut segment, path)?;
        Ok(segment)
    }

    fn inline_content(
        &self,
        node: &B::Node,
        path: &str,
        allow: Allow,
    ) -> Result<Segment, DeserializationError> {
        let mut segment = Segment::new();
        for item in self.backend.items(node) {
            match item {
                XmlItem::Text(text) => segment.push(InlineItem::Text(text)),
                XmlItem::Element(child) => {
                    let tag = self.backend.tag(&child);
                    let admitted = match allow {
                        Allow::Markup => {
                            matches!(tag.as_str(), "bpt" | "ept" | "it" | "ph" | "hi" | "ut")
                        }
                        Allow::SubOnly => tag == "sub",
                    };
                    if !admitted {
                        self.resolve(
                            &self.policy.unexpected_element,
                            DeserializationError::Structural {
                                path: path.to_string(),
                                message: format!("element '{}' not allowed here", tag),
                            },
                        )?;
                        continue;
                    }
                    let child_path = format!("{}/{}", path, tag);
                    if let Some(item) = self.inline_element(&child, &tag, &child_path)? {
                        segment.push(item);
                    }
                }
            }
        }
        Ok(segment)
    }

    /// Maps one inline element. Returns `None` when a policy dropped it.
    fn inline_element(
        &self,
        node: &B::Node,
        tag: &str,
        path: &str,
    ) -> Result<Option<InlineItem>, DeserializationError> {
        match tag {
            "bpt" => {
                self.check_unknown_attrs(node, BPT_ATTRS, path)?;
                let i = match self.required_u32(node, "i", path)? {
                    Some(i) => i,
                    None => return Ok(None),
                };
                let mut bpt = Bpt::new(i);
                bpt.x = self.u32_attr(node, "x", path)?;
                bpt.kind = self.backend.attr(node, "type");
                bpt.content = self.inline_content(node, path, Allow::SubOnly)?;
                Ok(Some(InlineItem::Bpt(bpt)))
            }
            "ept" => {
                self.check_unknown_attrs(node, EPT_ATTRS, path)?;
                let i = match self.required_u32(node, "i", path)? {
                    Some(i) => i,
                    None => return Ok(None),
                };
                let mut ept = Ept::new(i);
                ept.content = self.inline_content(node, path, Allow::SubOnly)?;
                Ok(Some(InlineItem::Ept(ept)))
            }
            "it" => {
                self.check_unknown_attrs(node, IT_ATTRS, path)?;
                let raw = self.require_attr(node, "pos", path, "begin")?;
                let pos = match Pos::parse(&raw) {
                    Some(pos) => pos,
                    None => {
                        let resolved = self.resolve(
                            &self.policy.invalid_attribute_value,
                            DeserializationError::Attribute {
                                path: path.to_string(),
                                message: format!("invalid value '{}' for 'pos'", raw),
                            },
                        )?;
                        match resolved.as_deref().and_then(Pos::parse) {
                            Some(pos) => pos,
                            None => return Ok(None),
                        }
                    }
                };
                let mut it = It::new(pos);
                it.x = self.u32_attr(node, "x", path)?;
                it.kind = self.backend.attr(node, "type");
                it.content = self.inline_content(node, path, Allow::SubOnly)?;
                Ok(Some(InlineItem::It(it)))
            }
            "ph" => {
                self.check_unknown_attrs(node, PH_ATTRS, path)?;
                let mut ph = Ph::new();
                ph.x = self.u32_attr(node, "x", path)?;
                ph.assoc = self.assoc_attr(node, path)?;
                ph.kind = self.backend.attr(node, "type");
                ph.content = self.inline_content(node, path, Allow::SubOnly)?;
                Ok(Some(InlineItem::Ph(ph)))
            }
            "hi" => {
                self.check_unknown_attrs(node, HI_ATTRS, path)?;
                let mut hi = Hi::new();
                hi.x = self.u32_attr(node, "x", path)?;
                hi.kind = self.backend.attr(node, "type");
                hi.content = self.inline_content(node, path, Allow::Markup)?;
                Ok(Some(InlineItem::Hi(hi)))
            }
            "ut" => {
                self.check_unknown_attrs(node, UT_ATTRS, path)?;
                let mut ut = Ut::new();
                ut.x = self.u32_attr(node, "x", path)?;
                ut.content = self.inline_content(node, path, Allow::SubOnly)?;
                Ok(Some(InlineItem::Ut(ut)))
            }
            "sub" => {
                self.check_unknown_attrs(node, SUB_ATTRS, path)?;
                let mut sub = Sub::new();
                sub.datatype = self.backend.attr(node, "datatype");
                sub.kind = self.backend.attr(node, "type");
                sub.content = self.inline_content(node, path, Allow::Markup)?;
                Ok(Some(InlineItem::Sub(sub)))
            }
            other => {
                self.resolve(
                    &self.policy.unexpected_element,
                    DeserializationError::Structural {
                        path: path.to_string(),
                        message: format!("unexpected inline element '{}'", other),
                    },
                )?;
                Ok(None)
            }
        }
    }

    fn note(&self, node: &B::Node, path: &str) -> Result<Option<Note>, DeserializationError> {
        self.check_unknown_attrs(node, NOTE_ATTRS, path)?;
        let text = match self.element_text(node, path)? {
            Some(text) => text,
            None => return Ok(None),
        };
        let mut note = Note::new(text);
        note.lang = self.lang_attr(node);
        note.o_encoding = self.backend.attr(node, "o-encoding");
        Ok(Some(note))
    }

    fn prop(&self, node: &B::Node, path: &str) -> Result<Option<Prop>, DeserializationError> {
        self.check_unknown_attrs(node, PROP_ATTRS, path)?;
        let kind = self.require_attr(node, "type", path, "")?;
        let text = match self.element_text(node, path)? {
            Some(text) => text,
            None => return Ok(None),
        };
        let mut prop = Prop::new(kind, text);
        prop.lang = self.lang_attr(node);
        prop.o_encoding = self.backend.attr(node, "o-encoding");
        Ok(Some(prop))
    }

    fn ude(&self, node: &B::Node, path: &str) -> Result<Option<Ude>, DeserializationError> {
        self.check_unknown_attrs(node, UDE_ATTRS, path)?;
        let name = self.require_attr(node, "name", path, "")?;
        let mut ude = Ude::new(name);
        ude.base = self.backend.attr(node, "base");

        for item in self.backend.items(node) {
            match item {
                XmlItem::Text(text) => self.check_stray_text(&text, path)?,
                XmlItem::Element(child) => match self.backend.tag(&child).as_str() {
                    "map" => {
                        if let Some(map) = self.map(&child, &format!("{}/map", path))? {
                            ude.maps.push(map);
                        }
                    }
                    other => self.unexpected(other, path)?,
                },
            }
        }

        // base is required as soon as any map carries a native code.
        if ude.base.is_none() && ude.maps.iter().any(|m| m.code.is_some()) {
            let resolved = self.resolve(
                &self.policy.missing_required_attribute,
                DeserializationError::Attribute {
                    path: path.to_string(),
                    message: "ude with code-bearing maps requires 'base'".to_string(),
                },
            )?;
            ude.base = resolved;
        }
        Ok(Some(ude))
    }

    fn map(&self, node: &B::Node, path: &str) -> Result<Option<Map>, DeserializationError> {
        self.check_unknown_attrs(node, MAP_ATTRS, path)?;
        let unicode = match self.backend.attr(node, "unicode") {
            Some(unicode) => unicode,
            None => {
                let resolved = self.resolve(
                    &self.policy.missing_required_attribute,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: "missing required attribute 'unicode'".to_string(),
                    },
                )?;
                match resolved {
                    Some(value) => value,
                    None => return Ok(None),
                }
            }
        };
        let mut map = Map::new(unicode);
        map.code = self.backend.attr(node, "code");
        map.ent = self.backend.attr(node, "ent");
        map.subst = self.backend.attr(node, "subst");
        Ok(Some(map))
    }

    // ---- attribute helpers ----

    /// Resolves a violation through its policy entry. `Ok(Some(..))` carries
    /// a substituted value, `Ok(None)` means drop-and-continue.
    fn resolve(
        &self,
        value: &PolicyValue,
        err: DeserializationError,
    ) -> Result<Option<String>, DeserializationError> {
        match &value.behavior {
            Behavior::Raise => Err(err),
            Behavior::Ignore => Ok(None),
            Behavior::Warn => {
                log::log!(value.level, "{}", err);
                Ok(None)
            }
            Behavior::Default(fallback) => {
                log::log!(value.level, "{} (substituting '{}')", err, fallback);
                Ok(Some(fallback.clone()))
            }
        }
    }

    fn unexpected(&self, tag: &str, path: &str) -> Result<(), DeserializationError> {
        self.resolve(
            &self.policy.unexpected_element,
            DeserializationError::Structural {
                path: path.to_string(),
                message: format!("unexpected element '{}'", tag),
            },
        )?;
        Ok(())
    }

    fn check_tag(&self, node: &B::Node, expected: &str, path: &str) -> Result<(), DeserializationError> {
        let tag = self.backend.tag(node);
        if tag == expected {
            Ok(())
        } else {
            Err(DeserializationError::Structural {
                path: path.to_string(),
                message: format!("expected element '{}', found '{}'", expected, tag),
            })
        }
    }

    /// Non-whitespace text where the grammar allows no text at all.
    fn check_stray_text(&self, text: &str, path: &str) -> Result<(), DeserializationError> {
        if text.trim().is_empty() {
            return Ok(());
        }
        self.resolve(
            &self.policy.extra_text,
            DeserializationError::Structural {
                path: path.to_string(),
                message: format!("unexpected text '{}'", text.trim()),
            },
        )?;
        Ok(())
    }

    fn check_unknown_attrs(
        &self,
        node: &B::Node,
        known: &[&str],
        path: &str,
    ) -> Result<(), DeserializationError> {
        for (name, _) in self.backend.attrs(node) {
            if !known.contains(&name.as_str()) {
                self.resolve(
                    &self.policy.unknown_attribute,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: format!("unknown attribute '{}'", name),
                    },
                )?;
            }
        }
        Ok(())
    }

    fn require_attr(
        &self,
        node: &B::Node,
        name: &str,
        path: &str,
        fallback: &str,
    ) -> Result<String, DeserializationError> {
        if let Some(value) = self.backend.attr(node, name) {
            return Ok(value);
        }
        let resolved = self.resolve(
            &self.policy.missing_required_attribute,
            DeserializationError::Attribute {
                path: path.to_string(),
                message: format!("missing required attribute '{}'", name),
            },
        )?;
        Ok(resolved.unwrap_or_else(|| fallback.to_string()))
    }

    /// `xml:lang` preferred, bare `lang` tolerated.
    fn lang_attr(&self, node: &B::Node) -> Option<String> {
        self.backend
            .attr(node, "xml:lang")
            .or_else(|| self.backend.attr(node, "lang"))
    }

    fn u32_attr(
        &self,
        node: &B::Node,
        name: &str,
        path: &str,
    ) -> Result<Option<u32>, DeserializationError> {
        let raw = match self.backend.attr(node, name) {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match raw.parse::<u32>() {
            Ok(value) => Ok(Some(value)),
            Err(_) => {
                let resolved = self.resolve(
                    &self.policy.invalid_attribute_value,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: format!("invalid value '{}' for '{}'", raw, name),
                    },
                )?;
                Ok(resolved.and_then(|v| v.parse().ok()))
            }
        }
    }

    /// A numeric attribute the grammar requires. `None` means the element
    /// itself should be dropped.
    fn required_u32(
        &self,
        node: &B::Node,
        name: &str,
        path: &str,
    ) -> Result<Option<u32>, DeserializationError> {
        match self.backend.attr(node, name) {
            Some(_) => self.u32_attr(node, name, path),
            None => {
                let resolved = self.resolve(
                    &self.policy.missing_required_attribute,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: format!("missing required attribute '{}'", name),
                    },
                )?;
                Ok(resolved.and_then(|v| v.parse().ok()))
            }
        }
    }

    fn date_attr(
        &self,
        node: &B::Node,
        name: &str,
        path: &str,
    ) -> Result<Option<chrono::DateTime<chrono::Utc>>, DeserializationError> {
        let raw = match self.backend.attr(node, name) {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match parse_date(&raw) {
            Some(date) => Ok(Some(date)),
            None => {
                let resolved = self.resolve(
                    &self.policy.invalid_attribute_value,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: format!("invalid date '{}' for '{}'", raw, name),
                    },
                )?;
                Ok(resolved.as_deref().and_then(parse_date))
            }
        }
    }

    fn required_segtype(&self, node: &B::Node, path: &str) -> Result<Segtype, DeserializationError> {
        let raw = self.require_attr(node, "segtype", path, "sentence")?;
        match Segtype::parse(&raw) {
            Some(segtype) => Ok(segtype),
            None => {
                let resolved = self.resolve(
                    &self.policy.invalid_attribute_value,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: format!("invalid value '{}' for 'segtype'", raw),
                    },
                )?;
                Ok(resolved
                    .as_deref()
                    .and_then(Segtype::parse)
                    .unwrap_or(Segtype::Sentence))
            }
        }
    }

    fn optional_segtype(
        &self,
        node: &B::Node,
        path: &str,
    ) -> Result<Option<Segtype>, DeserializationError> {
        let raw = match self.backend.attr(node, "segtype") {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match Segtype::parse(&raw) {
            Some(segtype) => Ok(Some(segtype)),
            None => {
                let resolved = self.resolve(
                    &self.policy.invalid_attribute_value,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: format!("invalid value '{}' for 'segtype'", raw),
                    },
                )?;
                Ok(resolved.as_deref().and_then(Segtype::parse))
            }
        }
    }

    fn assoc_attr(&self, node: &B::Node, path: &str) -> Result<Option<Assoc>, DeserializationError> {
        let raw = match self.backend.attr(node, "assoc") {
            Some(raw) => raw,
            None => return Ok(None),
        };
        match Assoc::parse(&raw) {
            Some(assoc) => Ok(Some(assoc)),
            None => {
                let resolved = self.resolve(
                    &self.policy.invalid_attribute_value,
                    DeserializationError::Attribute {
                        path: path.to_string(),
                        message: format!("invalid value '{}' for 'assoc'", raw),
                    },
                )?;
                Ok(resolved.as_deref().and_then(Assoc::parse))
            }
        }
    }

    /// Text content of a text-only element. `None` drops the element.
    fn element_text(&self, node: &B::Node, path: &str) -> Result<Option<String>, DeserializationError> {
        for child in self.backend.child_elements(node) {
            self.unexpected(&self.backend.tag(&child), path)?;
        }
        let text = self.backend.text(node);
        if !text.is_empty() {
            return Ok(Some(text));
        }
        let resolved = self.resolve(
            &self.policy.missing_text,
            DeserializationError::Structural {
                path: path.to_string(),
                message: "element requires text content".to_string(),
            },
        )?;
        match resolved {
            Some(value) => Ok(Some(value)),
            // Warn keeps the element with empty text, ignore drops it.
            None if matches!(self.policy.missing_text.behavior, Behavior::Warn) => {
                Ok(Some(String::new()))
            }
            None => Ok(None),
        }
    }

    // ---- segment reference checks ----

    /// Enforces bpt/ept matching and `x` uniqueness within one segment
    /// scope. `hi` shares its parent scope; each `sub` opens a fresh one.
    fn check_segment_refs(&self, segment: &mut Segment, path: &str) -> Result<(), DeserializationError> {
        self.check_pairs(segment, path)?;
        self.check_correlations(segment, path)?;
        self.descend_sub_flows(segment, path)
    }

    fn check_pairs(&self, segment: &mut Segment, path: &str) -> Result<(), DeserializationError> {
        let mut bpt: HashMap<u32, u32> = HashMap::new();
        let mut ept: HashMap<u32, u32> = HashMap::new();
        count_pair_indices(segment, &mut bpt, &mut ept);

        let mut valid: HashSet<u32> = HashSet::new();
        let mut first_violation: Option<String> = None;
        let all: HashSet<u32> = bpt.keys().chain(ept.keys()).copied().collect();
        for i in all {
            let opens = bpt.get(&i).copied().unwrap_or(0);
            let closes = ept.get(&i).copied().unwrap_or(0);
            if opens == 1 && closes == 1 {
                valid.insert(i);
            } else if first_violation.is_none() {
                first_violation = Some(if opens > 1 || closes > 1 {
                    format!("duplicate pairing index {}", i)
                } else if opens == 0 {
                    format!("ept with index {} has no matching bpt", i)
                } else {
                    format!("bpt with index {} has no matching ept", i)
                });
            }
        }

        if let Some(message) = first_violation {
            self.resolve(
                &self.policy.unmatched_pair,
                DeserializationError::Reference { path: path.to_string(), message },
            )?;
            drop_invalid_pairs(segment, &valid);
        }
        Ok(())
    }

    fn check_correlations(&self, segment: &mut Segment, path: &str) -> Result<(), DeserializationError> {
        let mut seen: HashSet<u32> = HashSet::new();
        let mut duplicate: Option<u32> = None;
        visit_correlations(segment, &mut |x| {
            if let Some(value) = *x {
                if !seen.insert(value) {
                    if duplicate.is_none() {
                        duplicate = Some(value);
                    }
                    return true;
                }
            }
            false
        });

        if let Some(value) = duplicate {
            self.resolve(
                &self.policy.duplicate_correlation,
                DeserializationError::Reference {
                    path: path.to_string(),
                    message: format!("duplicate correlation id {}", value),
                },
            )?;
            if self.policy.duplicate_correlation.behavior == Behavior::Ignore {
                let mut seen: HashSet<u32> = HashSet::new();
                visit_correlations(segment, &mut |x| {
                    if let Some(value) = *x {
                        if !seen.insert(value) {
                            *x = None;
                        }
                    }
                    false
                });
            }
        }
        Ok(())
    }

    fn descend_sub_flows(&self, segment: &mut Segment, path: &str) -> Result<(), DeserializationError> {
        for item in &mut segment.items {
            match item {
                InlineItem::Hi(hi) => self.descend_sub_flows(&mut hi.content, path)?,
                InlineItem::Bpt(Bpt { content, .. })
                | InlineItem::Ept(Ept { content, .. })
                | InlineItem::It(It { content, .. })
                | InlineItem::Ph(Ph { content, .. })
                | InlineItem::Ut(Ut { content, .. }) => {
                    for inner in &mut content.items {
                        if let InlineItem::Sub(sub) = inner {
                            let sub_path = format!("{}/sub", path);
                            self.check_segment_refs(&mut sub.content, &sub_path)?;
                        }
                    }
                }
                _ => {}
            }
        }
        Ok(())
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

fn drop_invalid_pairs(segment: &mut Segment, valid: &HashSet<u32>) {
    segment.items.retain(|item| match item {
        InlineItem::Bpt(b) => valid.contains(&b.i),
        InlineItem::Ept(e) => valid.contains(&e.i),
        _ => true,
    });
    for item in &mut segment.items {
        if let InlineItem::Hi(hi) = item {
            drop_invalid_pairs(&mut hi.content, valid);
        }
    }
}

/// Visits every `x` attribute in segment scope. The visitor returns true
/// on a duplicate; visiting continues regardless.
fn visit_correlations(segment: &mut Segment, visit: &mut impl FnMut(&mut Option<u32>) -> bool) {
    for item in &mut segment.items {
        match item {
            InlineItem::Bpt(b) => {
                visit(&mut b.x);
            }
            InlineItem::It(it) => {
                visit(&mut it.x);
            }
            InlineItem::Ph(ph) => {
                visit(&mut ph.x);
            }
            InlineItem::Ut(ut) => {
                visit(&mut ut.x);
            }
            InlineItem::Hi(hi) => {
                visit(&mut hi.x);
                visit_correlations(&mut hi.content, visit);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::SimpleBackend;
    use crate::xml::read_tree;

    fn parse(xml: &str, policy: DeserializationPolicy) -> Result<Tmx, DeserializationError> {
        let root = read_tree(SimpleBackend::new(), xml.as_bytes(), PolicyValue::raise())?;
        Deserializer::new(SimpleBackend::new(), policy).deserialize(&root)
    }

    const MINIMAL: &str = concat!(
        "<tmx version=\"1.4\">",
        "<header creationtool=\"t\" creationtoolversion=\"1\" segtype=\"sentence\" ",
        "o-tmf=\"tmx\" adminlang=\"en\" srclang=\"en\" datatype=\"plaintext\" />",
        "<body>",
        "<tu tuid=\"1\">",
        "<tuv xml:lang=\"en\"><seg>Hello, world!</seg></tuv>",
        "<tuv xml:lang=\"fr\"><seg>Bonjour, le monde!</seg></tuv>",
        "</tu>",
        "</body>",
        "</tmx>",
    );

    #[test]
    fn test_minimal_document() {
        let tmx = parse(MINIMAL, DeserializationPolicy::strict()).unwrap();
        assert_eq!(tmx.version, "1.4");
        assert_eq!(tmx.header.srclang, "en");
        assert_eq!(tmx.body.len(), 1);
        let tu = &tmx.body[0];
        assert_eq!(tu.tuid.as_deref(), Some("1"));
        assert_eq!(tu.variant("en").unwrap().seg.plain_text(), "Hello, world!");
        assert_eq!(tu.variant("fr").unwrap().seg.plain_text(), "Bonjour, le monde!");
    }

    #[test]
    fn test_missing_srclang_raises_by_default() {
        let xml = MINIMAL.replace(" srclang=\"en\"", "");
        let err = parse(&xml, DeserializationPolicy::default()).unwrap_err();
        assert!(matches!(err, DeserializationError::Attribute { .. }));
        assert!(err.path().unwrap().contains("header"));
    }

    #[test]
    fn test_missing_srclang_substituted_by_policy() {
        let xml = MINIMAL.replace(" srclang=\"en\"", "");
        let mut policy = DeserializationPolicy::default();
        policy.missing_required_attribute = PolicyValue::default_to("en");
        let tmx = parse(&xml, policy).unwrap();
        assert_eq!(tmx.header.srclang, "en");
    }

    #[test]
    fn test_inline_markup_round_into_model() {
        let xml = MINIMAL.replace(
            "<seg>Hello, world!</seg>",
            "<seg>a<bpt i=\"1\" x=\"7\" type=\"bold\">&lt;b&gt;</bpt>b<ept i=\"1\">&lt;/b&gt;</ept>c</seg>",
        );
        let tmx = parse(&xml, DeserializationPolicy::strict()).unwrap();
        let seg = &tmx.body[0].variant("en").unwrap().seg;
        assert_eq!(seg.items.len(), 5);
        match &seg.items[1] {
            InlineItem::Bpt(bpt) => {
                assert_eq!(bpt.i, 1);
                assert_eq!(bpt.x, Some(7));
                assert_eq!(bpt.kind.as_deref(), Some("bold"));
                assert_eq!(bpt.content.plain_text(), "<b>");
            }
            other => panic!("unexpected item {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_ept_raises_when_strict() {
        let xml = MINIMAL.replace(
            "<seg>Hello, world!</seg>",
            "<seg>text<ept i=\"2\">[/b]</ept></seg>",
        );
        let err = parse(&xml, DeserializationPolicy::strict()).unwrap_err();
        match err {
            DeserializationError::Reference { path, message } => {
                assert!(path.ends_with("seg"), "path was {}", path);
                assert!(message.contains("no matching bpt"));
            }
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unmatched_ept_dropped_when_lenient() {
        let xml = MINIMAL.replace(
            "<seg>Hello, world!</seg>",
            "<seg>text<ept i=\"2\">[/b]</ept></seg>",
        );
        let tmx = parse(&xml, DeserializationPolicy::lenient()).unwrap();
        let seg = &tmx.body[0].variant("en").unwrap().seg;
        assert_eq!(seg.items, vec![InlineItem::Text("text".to_string())]);
    }

    #[test]
    fn test_duplicate_correlation_cleared_when_ignored() {
        let xml = MINIMAL.replace(
            "<seg>Hello, world!</seg>",
            "<seg><ph x=\"3\">%s</ph><ph x=\"3\">%d</ph></seg>",
        );
        let mut policy = DeserializationPolicy::default();
        policy.duplicate_correlation = PolicyValue::ignore();
        let tmx = parse(&xml, policy).unwrap();
        let seg = &tmx.body[0].variant("en").unwrap().seg;
        match (&seg.items[0], &seg.items[1]) {
            (InlineItem::Ph(first), InlineItem::Ph(second)) => {
                assert_eq!(first.x, Some(3));
                assert_eq!(second.x, None);
            }
            other => panic!("unexpected items {:?}", other),
        }
    }

    #[test]
    fn test_sub_opens_fresh_pairing_scope() {
        let xml = MINIMAL.replace(
            "<seg>Hello, world!</seg>",
            concat!(
                "<seg><bpt i=\"1\">&lt;a <sub>link<bpt i=\"1\">[</bpt>x<ept i=\"1\">]</ept></sub>&gt;</bpt>",
                "t<ept i=\"1\">&lt;/a&gt;</ept></seg>",
            ),
        );
        // Index 1 appears in both scopes and is legal in each.
        parse(&xml, DeserializationPolicy::strict()).unwrap();
    }

    #[test]
    fn test_sub_directly_in_seg_is_rejected() {
        let xml = MINIMAL.replace(
            "<seg>Hello, world!</seg>",
            "<seg><sub>flow</sub>rest</seg>",
        );
        let err = parse(&xml, DeserializationPolicy::strict()).unwrap_err();
        assert!(matches!(err, DeserializationError::Structural { .. }));
        let tmx = parse(&xml, DeserializationPolicy::lenient()).unwrap();
        let seg = &tmx.body[0].variant("en").unwrap().seg;
        assert_eq!(seg.items, vec![InlineItem::Text("rest".to_string())]);
    }

    #[test]
    fn test_multiple_header_keeps_first() {
        let xml = MINIMAL.replace(
            "<body>",
            concat!(
                "<header creationtool=\"second\" creationtoolversion=\"2\" segtype=\"block\" ",
                "o-tmf=\"x\" adminlang=\"de\" srclang=\"de\" datatype=\"html\" /><body>",
            ),
        );
        let tmx = parse(&xml, DeserializationPolicy::default()).unwrap();
        assert_eq!(tmx.header.creationtool, "t");
        assert!(parse(&xml, DeserializationPolicy::strict()).is_err());
    }

    #[test]
    fn test_header_dates_and_metadata() {
        let xml = MINIMAL.replace(
            "datatype=\"plaintext\" />",
            concat!(
                "datatype=\"plaintext\" creationdate=\"20020125T191234Z\" creationid=\"bob\">",
                "<note xml:lang=\"en\">a note</note>",
                "<prop type=\"domain\">software</prop>",
                "<ude name=\"MacRoman\" base=\"Macintosh\"><map unicode=\"#xF8FF\" code=\"#xF0\" /></ude>",
                "</header>",
            ),
        );
        let tmx = parse(&xml, DeserializationPolicy::strict()).unwrap();
        let header = &tmx.header;
        assert_eq!(header.creationid.as_deref(), Some("bob"));
        assert_eq!(crate::model::format_date(&header.creationdate.unwrap()), "20020125T191234Z");
        assert_eq!(header.notes[0].text, "a note");
        assert_eq!(header.props[0].kind, "domain");
        assert_eq!(header.udes[0].maps[0].code.as_deref(), Some("#xF0"));
    }

    #[test]
    fn test_ude_code_without_base() {
        let xml = MINIMAL.replace(
            "datatype=\"plaintext\" />",
            concat!(
                "datatype=\"plaintext\">",
                "<ude name=\"m\"><map unicode=\"#xF8FF\" code=\"#xF0\" /></ude>",
                "</header>",
            ),
        );
        assert!(parse(&xml, DeserializationPolicy::default()).is_err());
        let tmx = parse(&xml, DeserializationPolicy::lenient()).unwrap();
        assert!(tmx.header.udes[0].base.is_none());
    }

    #[test]
    fn test_unknown_attribute_policy() {
        let xml = MINIMAL.replace("<tu tuid=\"1\">", "<tu tuid=\"1\" mystery=\"?\">");
        assert!(parse(&xml, DeserializationPolicy::strict()).is_err());
        let tmx = parse(&xml, DeserializationPolicy::default()).unwrap();
        assert_eq!(tmx.body[0].tuid.as_deref(), Some("1"));
    }

    #[test]
    fn test_missing_seg_lenient_gives_empty_segment() {
        let xml = MINIMAL.replace("<seg>Hello, world!</seg>", "");
        assert!(parse(&xml, DeserializationPolicy::strict()).is_err());
        let tmx = parse(&xml, DeserializationPolicy::lenient()).unwrap();
        assert!(tmx.body[0].variant("en").unwrap().seg.is_empty());
    }

    #[test]
    fn test_multiple_seg_keeps_first() {
        let xml = MINIMAL.replace(
            "<seg>Hello, world!</seg>",
            "<seg>Hello, world!</seg><seg>stale duplicate</seg>",
        );
        let err = parse(&xml, DeserializationPolicy::strict()).unwrap_err();
        match err {
            DeserializationError::Structural { path, message } => {
                assert_eq!(path, "tmx/body/tu[0]/tuv[0]/seg");
                assert!(message.contains("more than one seg"));
            }
            other => panic!("unexpected error {:?}", other),
        }
        // Non-raise resolutions keep the first seg and drop the rest.
        let tmx = parse(&xml, DeserializationPolicy::default()).unwrap();
        let seg = &tmx.body[0].variant("en").unwrap().seg;
        assert_eq!(seg.plain_text(), "Hello, world!");
        let tmx = parse(&xml, DeserializationPolicy::lenient()).unwrap();
        assert_eq!(
            tmx.body[0].variant("en").unwrap().seg.plain_text(),
            "Hello, world!"
        );
    }

    #[test]
    fn test_error_path_names_offending_tu() {
        let xml = MINIMAL.replace(
            "<tuv xml:lang=\"fr\">",
            "<tuv>",
        );
        let err = parse(&xml, DeserializationPolicy::strict()).unwrap_err();
        assert_eq!(err.path(), Some("tmx/body/tu[0]/tuv[1]"));
    }

    #[test]
    fn test_bad_usagecount_warn_drops_value() {
        let xml = MINIMAL.replace("<tu tuid=\"1\">", "<tu tuid=\"1\" usagecount=\"lots\">");
        let tmx = parse(&xml, DeserializationPolicy::default()).unwrap();
        assert_eq!(tmx.body[0].usagecount, None);
    }
}
