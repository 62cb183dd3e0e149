//! Recovery policies for grammar violations.
//!
//! A policy is a table mapping each violation kind to a [`Behavior`] and a
//! logging severity. Deserialization and serialization each have their own
//! policy type since their violation vocabularies are disjoint. Policy
//! instances are plain mutable structs: fields may be reassigned between
//! calls by whichever caller owns the instance. Every parse/serialize call
//! takes its policy as an argument; there is no process-wide default.

use log::Level;

/// How a single violation kind is resolved.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Behavior {
    /// Abort and propagate a typed error.
    Raise,
    /// Drop the offending value or node and continue silently.
    Ignore,
    /// Log at the configured severity and continue with a best-effort value.
    Warn,
    /// Substitute the supplied fallback value and continue.
    Default(String),
}

/// A behavior paired with the severity used when it logs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PolicyValue {
    pub behavior: Behavior,
    pub level: Level,
}

impl PolicyValue {
    /// Abort on this violation.
    pub fn raise() -> Self {
        PolicyValue { behavior: Behavior::Raise, level: Level::Error }
    }

    /// Drop the offending value/node silently.
    pub fn ignore() -> Self {
        PolicyValue { behavior: Behavior::Ignore, level: Level::Debug }
    }

    /// Log and continue with a best-effort value.
    pub fn warn() -> Self {
        PolicyValue { behavior: Behavior::Warn, level: Level::Warn }
    }

    /// Substitute `fallback` and continue, logging at warn severity.
    pub fn default_to(fallback: impl Into<String>) -> Self {
        PolicyValue { behavior: Behavior::Default(fallback.into()), level: Level::Warn }
    }

    /// Overrides the logging severity.
    pub fn with_level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }
}

/// Policy consulted by the deserializer and the streaming reader.
///
/// The shipped default is permissive for segment and body content and
/// strict for header identity fields, which are required for any later
/// regeneration of the file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeserializationPolicy {
    /// Unknown or misplaced element tag encountered during descent.
    pub unexpected_element: PolicyValue,
    /// Required attribute absent from an element.
    pub missing_required_attribute: PolicyValue,
    /// Attribute not declared by the DTD for this element.
    pub unknown_attribute: PolicyValue,
    /// Attribute present but not parseable (bad enum literal, number, date).
    pub invalid_attribute_value: PolicyValue,
    /// Text-bearing element (note, prop) without text content.
    pub missing_text: PolicyValue,
    /// Text where the grammar allows none (inside header, tu, tuv).
    pub extra_text: PolicyValue,
    /// `<tmx>` without a `<header>` child.
    pub missing_header: PolicyValue,
    /// More than one `<header>`; non-raise resolutions keep the first.
    pub multiple_header: PolicyValue,
    /// `<tuv>` without a `<seg>` child; non-raise resolutions use an empty segment.
    pub missing_seg: PolicyValue,
    /// More than one `<seg>` in a `<tuv>`; non-raise resolutions keep the first.
    pub multiple_seg: PolicyValue,
    /// Bpt without matching ept, ept without matching bpt, or duplicate
    /// bpt/ept index inside one segment; non-raise resolutions drop the
    /// offending inline element.
    pub unmatched_pair: PolicyValue,
    /// Duplicate `x` correlation id inside one segment. `ignore` clears the
    /// duplicate value, `warn` keeps it.
    pub duplicate_correlation: PolicyValue,
    /// XML declaration names an encoding the reader cannot honor.
    pub encoding_mismatch: PolicyValue,
}

impl Default for DeserializationPolicy {
    fn default() -> Self {
        DeserializationPolicy {
            unexpected_element: PolicyValue::warn(),
            missing_required_attribute: PolicyValue::raise(),
            unknown_attribute: PolicyValue::warn(),
            invalid_attribute_value: PolicyValue::warn(),
            missing_text: PolicyValue::warn(),
            extra_text: PolicyValue::warn(),
            missing_header: PolicyValue::raise(),
            multiple_header: PolicyValue::warn(),
            missing_seg: PolicyValue::warn(),
            multiple_seg: PolicyValue::warn(),
            unmatched_pair: PolicyValue::warn(),
            duplicate_correlation: PolicyValue::warn(),
            encoding_mismatch: PolicyValue::raise(),
        }
    }
}

impl DeserializationPolicy {
    /// Every violation aborts the parse.
    pub fn strict() -> Self {
        DeserializationPolicy {
            unexpected_element: PolicyValue::raise(),
            missing_required_attribute: PolicyValue::raise(),
            unknown_attribute: PolicyValue::raise(),
            invalid_attribute_value: PolicyValue::raise(),
            missing_text: PolicyValue::raise(),
            extra_text: PolicyValue::raise(),
            missing_header: PolicyValue::raise(),
            multiple_header: PolicyValue::raise(),
            missing_seg: PolicyValue::raise(),
            multiple_seg: PolicyValue::raise(),
            unmatched_pair: PolicyValue::raise(),
            duplicate_correlation: PolicyValue::raise(),
            encoding_mismatch: PolicyValue::raise(),
        }
    }

    /// Every violation is dropped silently where a recovery exists.
    ///
    /// A missing header still raises: there is no usable document without
    /// one. I/O errors are always fatal regardless of policy.
    pub fn lenient() -> Self {
        DeserializationPolicy {
            unexpected_element: PolicyValue::ignore(),
            missing_required_attribute: PolicyValue::ignore(),
            unknown_attribute: PolicyValue::ignore(),
            invalid_attribute_value: PolicyValue::ignore(),
            missing_text: PolicyValue::ignore(),
            extra_text: PolicyValue::ignore(),
            missing_header: PolicyValue::raise(),
            multiple_header: PolicyValue::ignore(),
            missing_seg: PolicyValue::ignore(),
            multiple_seg: PolicyValue::ignore(),
            unmatched_pair: PolicyValue::ignore(),
            duplicate_correlation: PolicyValue::ignore(),
            encoding_mismatch: PolicyValue::ignore(),
        }
    }
}

/// Policy consulted by the serializer.
///
/// Output is strict by default: serialization never silently emits data
/// that violates the grammar unless a specific check is downgraded here.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SerializationPolicy {
    /// Required header/element field is empty.
    pub missing_required_field: PolicyValue,
    /// `Tu` with no `Tuv` children (grammar requires one or more).
    pub empty_variants: PolicyValue,
    /// Bpt without ept or ept without bpt inside one segment.
    pub unmatched_pair: PolicyValue,
    /// Two bpt (or two ept) elements sharing an index inside one segment.
    pub duplicate_index: PolicyValue,
    /// `Ude` whose maps declare `code` but which carries no `base`.
    pub ude_base_missing: PolicyValue,
    /// Inline content not allowed in its context (e.g. `Sub` directly in a seg).
    pub invalid_content: PolicyValue,
}

impl Default for SerializationPolicy {
    fn default() -> Self {
        SerializationPolicy {
            missing_required_field: PolicyValue::raise(),
            empty_variants: PolicyValue::raise(),
            unmatched_pair: PolicyValue::raise(),
            duplicate_index: PolicyValue::raise(),
            ude_base_missing: PolicyValue::raise(),
            invalid_content: PolicyValue::raise(),
        }
    }
}

impl SerializationPolicy {
    /// Every check logs instead of aborting. Output may violate the grammar.
    pub fn lenient() -> Self {
        SerializationPolicy {
            missing_required_field: PolicyValue::warn(),
            empty_variants: PolicyValue::warn(),
            unmatched_pair: PolicyValue::warn(),
            duplicate_index: PolicyValue::warn(),
            ude_base_missing: PolicyValue::warn(),
            invalid_content: PolicyValue::warn(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_policy_is_strict_on_header_identity() {
        let policy = DeserializationPolicy::default();
        assert_eq!(policy.missing_required_attribute.behavior, Behavior::Raise);
        assert_eq!(policy.missing_header.behavior, Behavior::Raise);
        // Segment content is permissive.
        assert_eq!(policy.unexpected_element.behavior, Behavior::Warn);
        assert_eq!(policy.unmatched_pair.behavior, Behavior::Warn);
    }

    #[test]
    fn test_policy_is_mutable_between_calls() {
        let mut policy = DeserializationPolicy::default();
        policy.missing_required_attribute = PolicyValue::default_to("en");
        match &policy.missing_required_attribute.behavior {
            Behavior::Default(value) => assert_eq!(value, "en"),
            other => panic!("unexpected behavior {:?}", other),
        }
    }

    #[test]
    fn test_serialization_default_all_raise() {
        let policy = SerializationPolicy::default();
        assert_eq!(policy.duplicate_index.behavior, Behavior::Raise);
        assert_eq!(policy.ude_base_missing.behavior, Behavior::Raise);
    }

    #[test]
    fn test_with_level() {
        let value = PolicyValue::warn().with_level(Level::Info);
        assert_eq!(value.level, Level::Info);
        assert_eq!(value.behavior, Behavior::Warn);
    }
}
