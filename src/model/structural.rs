//! Document-level TMX elements: the root, header, and translation units.

use chrono::{DateTime, Utc};

use super::{Segment, Segtype};

/// The `<tmx>` root element.
#[derive(Debug, Clone, PartialEq)]
pub struct Tmx {
    /// Always "1.4" on output regardless of the parsed value.
    pub version: String,
    pub header: Header,
    pub body: Vec<Tu>,
}

impl Tmx {
    pub fn new(header: Header) -> Self {
        Tmx { version: "1.4".to_string(), header, body: Vec::new() }
    }
}

/// The `<header>` element: file-wide metadata and defaults.
#[derive(Debug, Clone, PartialEq)]
pub struct Header {
    pub creationtool: String,
    pub creationtoolversion: String,
    pub segtype: Segtype,
    /// The `o-tmf` attribute: original translation memory format.
    pub o_tmf: String,
    pub adminlang: String,
    /// Source language for the whole file, or `*all*`.
    pub srclang: String,
    pub datatype: String,
    pub o_encoding: Option<String>,
    pub creationdate: Option<DateTime<Utc>>,
    pub creationid: Option<String>,
    pub changedate: Option<DateTime<Utc>>,
    pub changeid: Option<String>,
    pub notes: Vec<Note>,
    pub props: Vec<Prop>,
    pub udes: Vec<Ude>,
}

impl Header {
    /// A header with the required identity fields set and everything else empty.
    pub fn new(
        creationtool: impl Into<String>,
        creationtoolversion: impl Into<String>,
        segtype: Segtype,
        o_tmf: impl Into<String>,
        adminlang: impl Into<String>,
        srclang: impl Into<String>,
        datatype: impl Into<String>,
    ) -> Self {
        Header {
            creationtool: creationtool.into(),
            creationtoolversion: creationtoolversion.into(),
            segtype,
            o_tmf: o_tmf.into(),
            adminlang: adminlang.into(),
            srclang: srclang.into(),
            datatype: datatype.into(),
            o_encoding: None,
            creationdate: None,
            creationid: None,
            changedate: None,
            changeid: None,
            notes: Vec::new(),
            props: Vec::new(),
            udes: Vec::new(),
        }
    }
}

/// A `<tu>` element: one translation unit holding language variants.
///
/// Every attribute is optional; defaults for `srclang` and `segtype` come
/// from the header at interpretation time, not at parse time.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Tu {
    pub tuid: Option<String>,
    pub o_encoding: Option<String>,
    pub datatype: Option<String>,
    pub usagecount: Option<u32>,
    pub lastusagedate: Option<DateTime<Utc>>,
    pub creationtool: Option<String>,
    pub creationtoolversion: Option<String>,
    pub creationdate: Option<DateTime<Utc>>,
    pub creationid: Option<String>,
    pub changedate: Option<DateTime<Utc>>,
    pub segtype: Option<Segtype>,
    pub changeid: Option<String>,
    pub o_tmf: Option<String>,
    pub srclang: Option<String>,
    pub notes: Vec<Note>,
    pub props: Vec<Prop>,
    pub variants: Vec<Tuv>,
}

impl Tu {
    pub fn new() -> Self {
        Tu::default()
    }

    /// The variant carrying the given language, matched case-insensitively
    /// as language tags compare.
    pub fn variant(&self, lang: &str) -> Option<&Tuv> {
        self.variants.iter().find(|v| v.lang.eq_ignore_ascii_case(lang))
    }
}

/// A `<tuv>` element: the text of a translation unit in one language.
#[derive(Debug, Clone, PartialEq)]
pub struct Tuv {
    /// The `xml:lang` attribute. Required.
    pub lang: String,
    pub o_encoding: Option<String>,
    pub datatype: Option<String>,
    pub usagecount: Option<u32>,
    pub lastusagedate: Option<DateTime<Utc>>,
    pub creationtool: Option<String>,
    pub creationtoolversion: Option<String>,
    pub creationdate: Option<DateTime<Utc>>,
    pub creationid: Option<String>,
    pub changedate: Option<DateTime<Utc>>,
    pub changeid: Option<String>,
    pub o_tmf: Option<String>,
    pub notes: Vec<Note>,
    pub props: Vec<Prop>,
    pub seg: Segment,
}

impl Tuv {
    pub fn new(lang: impl Into<String>) -> Self {
        Tuv {
            lang: lang.into(),
            o_encoding: None,
            datatype: None,
            usagecount: None,
            lastusagedate: None,
            creationtool: None,
            creationtoolversion: None,
            creationdate: None,
            creationid: None,
            changedate: None,
            changeid: None,
            o_tmf: None,
            notes: Vec::new(),
            props: Vec::new(),
            seg: Segment::new(),
        }
    }
}

/// A `<note>` element: free-form comment text.
#[derive(Debug, Clone, PartialEq)]
pub struct Note {
    pub text: String,
    pub lang: Option<String>,
    pub o_encoding: Option<String>,
}

impl Note {
    pub fn new(text: impl Into<String>) -> Self {
        Note { text: text.into(), lang: None, o_encoding: None }
    }
}

/// A `<prop>` element: a tool-specific property.
#[derive(Debug, Clone, PartialEq)]
pub struct Prop {
    pub text: String,
    /// The `type` attribute. Required.
    pub kind: String,
    pub lang: Option<String>,
    pub o_encoding: Option<String>,
}

impl Prop {
    pub fn new(kind: impl Into<String>, text: impl Into<String>) -> Self {
        Prop { kind: kind.into(), text: text.into(), lang: None, o_encoding: None }
    }
}

/// A `<ude>` element: a user-defined encoding with its character maps.
#[derive(Debug, Clone, PartialEq)]
pub struct Ude {
    pub name: String,
    /// Required whenever any map carries a `code`.
    pub base: Option<String>,
    pub maps: Vec<Map>,
}

impl Ude {
    pub fn new(name: impl Into<String>) -> Self {
        Ude { name: name.into(), base: None, maps: Vec::new() }
    }
}

/// A `<map/>` entry of a user-defined encoding.
#[derive(Debug, Clone, PartialEq)]
pub struct Map {
    pub unicode: String,
    pub code: Option<String>,
    pub ent: Option<String>,
    pub subst: Option<String>,
}

impl Map {
    pub fn new(unicode: impl Into<String>) -> Self {
        Map { unicode: unicode.into(), code: None, ent: None, subst: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{InlineItem, Segtype};

    fn header() -> Header {
        Header::new("tmx-rs", "0.1", Segtype::Sentence, "tmx", "en", "en", "plaintext")
    }

    #[test]
    fn test_tmx_new_pins_version() {
        let tmx = Tmx::new(header());
        assert_eq!(tmx.version, "1.4");
        assert!(tmx.body.is_empty());
    }

    #[test]
    fn test_tu_variant_lookup_is_case_insensitive() {
        let mut tu = Tu::new();
        let mut tuv = Tuv::new("en-US");
        tuv.seg = Segment::from_text("Hello");
        tu.variants.push(tuv);
        tu.variants.push(Tuv::new("fr"));

        let found = tu.variant("EN-us").unwrap();
        assert_eq!(found.seg.items, vec![InlineItem::Text("Hello".to_string())]);
        assert!(tu.variant("de").is_none());
    }

    #[test]
    fn test_tu_defaults_are_all_unset() {
        let tu = Tu::default();
        assert!(tu.tuid.is_none());
        assert!(tu.segtype.is_none());
        assert!(tu.srclang.is_none());
        assert!(tu.variants.is_empty());
    }
}
