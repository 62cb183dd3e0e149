//! The TMX 1.4b object model.
//!
//! Plain recursive data structures mapping 1-to-1 to TMX elements. The
//! model carries no behavior beyond construction helpers and derives
//! structural equality so round-trips can be verified directly. Ownership
//! is strictly tree-shaped: no shared or back-references anywhere.

pub mod inline;
pub mod structural;

pub use inline::{Bpt, Ept, Hi, InlineItem, It, Ph, Segment, Sub, Ut};
pub use structural::{Header, Map, Note, Prop, Tmx, Tu, Tuv, Ude};

use chrono::{DateTime, NaiveDateTime, Utc};
use thiserror::Error;

/// A boundary enum literal that matches none of the allowed values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unrecognized literal '{0}'")]
pub struct ParseLiteralError(pub String);

/// Segmentation level declared in a header or overridden on a tu.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Segtype {
    Block,
    Paragraph,
    Sentence,
    Phrase,
}

impl Segtype {
    /// The case-sensitive attribute literal.
    pub fn as_str(self) -> &'static str {
        match self {
            Segtype::Block => "block",
            Segtype::Paragraph => "paragraph",
            Segtype::Sentence => "sentence",
            Segtype::Phrase => "phrase",
        }
    }

    /// Parses the attribute literal. Case-sensitive.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "block" => Some(Segtype::Block),
            "paragraph" => Some(Segtype::Paragraph),
            "sentence" => Some(Segtype::Sentence),
            "phrase" => Some(Segtype::Phrase),
            _ => None,
        }
    }
}

impl std::str::FromStr for Segtype {
    type Err = ParseLiteralError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Segtype::parse(value).ok_or_else(|| ParseLiteralError(value.to_string()))
    }
}

impl std::fmt::Display for Segtype {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Position of an isolated tag (`<it>`): whether the paired code it stands
/// in for opens or closes outside this segment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Pos {
    Begin,
    End,
}

impl Pos {
    pub fn as_str(self) -> &'static str {
        match self {
            Pos::Begin => "begin",
            Pos::End => "end",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "begin" => Some(Pos::Begin),
            "end" => Some(Pos::End),
            _ => None,
        }
    }
}

impl std::str::FromStr for Pos {
    type Err = ParseLiteralError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Pos::parse(value).ok_or_else(|| ParseLiteralError(value.to_string()))
    }
}

impl std::fmt::Display for Pos {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Association of a placeholder (`<ph>`) with the surrounding text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Assoc {
    /// Belongs to the text before the placeholder.
    P,
    /// Belongs to the text after the placeholder.
    F,
    /// Belongs to both sides.
    B,
}

impl Assoc {
    pub fn as_str(self) -> &'static str {
        match self {
            Assoc::P => "p",
            Assoc::F => "f",
            Assoc::B => "b",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "p" => Some(Assoc::P),
            "f" => Some(Assoc::F),
            "b" => Some(Assoc::B),
            _ => None,
        }
    }
}

impl std::str::FromStr for Assoc {
    type Err = ParseLiteralError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Assoc::parse(value).ok_or_else(|| ParseLiteralError(value.to_string()))
    }
}

impl std::fmt::Display for Assoc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// TMX timestamp format: `YYYYMMDDThhmmssZ`, always UTC, seconds precision.
const DATE_FORMAT: &str = "%Y%m%dT%H%M%SZ";

/// Parses a TMX date attribute value.
pub fn parse_date(value: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(value, DATE_FORMAT)
        .ok()
        .map(|dt| dt.and_utc())
}

/// Formats a date the canonical TMX way, locale-independent.
pub fn format_date(value: &DateTime<Utc>) -> String {
    value.format(DATE_FORMAT).to_string()
}
