//! Error attribution: which component a failed verdict points at.
//!
//! Attribution is a keyword classification over the concatenated,
//! lowercased failure messages. The sets are checked in a strict
//! priority order and are pairwise disjoint, so the answer is stable
//! regardless of how many messages matched.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Keywords attributing a failure to `parse_artifacts`.
pub const PARSE_ROUTINE_KEYWORDS: &[&str] =
    &["parse_artifacts", "schema", "type-safety", "parsed item"];

/// Keywords attributing a failure to `validate_logic`.
pub const MATCH_ROUTINE_KEYWORDS: &[&str] =
    &["validate_logic", "is_match", "default_match", "regex_mode"];

/// Keywords attributing a failure to `check_existence`.
pub const EXISTENCE_ROUTINE_KEYWORDS: &[&str] =
    &["check_existence", "evidence", "passthrough"];

/// Keywords attributing a failure to the specification itself.
pub const SPECIFICATION_KEYWORDS: &[&str] = &["consistency", "specification"];

/// The component a failed validation is attributed to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorSource {
    ParseRoutine,
    MatchRoutine,
    ExistenceRoutine,
    Specification,
    Unknown,
}

impl ErrorSource {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ParseRoutine => "parse_routine",
            Self::MatchRoutine => "match_routine",
            Self::ExistenceRoutine => "existence_routine",
            Self::Specification => "specification",
            Self::Unknown => "unknown",
        }
    }
}

impl fmt::Display for ErrorSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Attribute a set of failure messages to one component.
///
/// Messages are joined and lowercased, then the keyword sets are tried
/// in priority order: parse routine, match routine, existence routine,
/// specification. No hit means `Unknown`.
pub fn attribute(errors: &[String]) -> ErrorSource {
    let haystack = errors.join(" ").to_lowercase();
    let hit = |keywords: &[&str]| keywords.iter().any(|keyword| haystack.contains(keyword));
    if hit(PARSE_ROUTINE_KEYWORDS) {
        ErrorSource::ParseRoutine
    } else if hit(MATCH_ROUTINE_KEYWORDS) {
        ErrorSource::MatchRoutine
    } else if hit(EXISTENCE_ROUTINE_KEYWORDS) {
        ErrorSource::ExistenceRoutine
    } else if hit(SPECIFICATION_KEYWORDS) {
        ErrorSource::Specification
    } else {
        ErrorSource::Unknown
    }
}
