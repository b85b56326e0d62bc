//! Report envelopes shared by the orchestrator and the harness.
//!
//! Reports are the gate's only output: one structured verdict per call,
//! content-addressed by the SHA-256 digest of the artifact text so a
//! consumer can tie a verdict back to the exact source it judged.
//! `gate_results` holds only gates that were actually evaluated; a
//! skipped gate is absent, never `false`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub const VALIDATION_REPORT_SCHEMA_VERSION: &str = "matchgate.validation-report.v1";
pub const PARTIAL_REPORT_SCHEMA_VERSION: &str = "matchgate.partial-report.v1";

/// The fixed set of named boolean checks contributing to a verdict.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
pub enum GateName {
    /// All three required routines are declared.
    #[serde(rename = "signature")]
    Signature,
    /// Parsed items carry exactly the contract key set.
    #[serde(rename = "schema")]
    Schema,
    /// Parsed item `value` fields are string-typed.
    #[serde(rename = "type-safety")]
    TypeSafety,
    /// `check_existence` returns its evidence sequence unchanged.
    #[serde(rename = "evidence-passthrough")]
    EvidencePassthrough,
    /// Behavior vector 1: a `none` option value must not fault.
    #[serde(rename = "none-safety")]
    NoneSafety,
    /// Behavior vector 2: alternation matches any non-empty candidate.
    #[serde(rename = "alternatives")]
    Alternatives,
    /// Behavior vector 3: an invalid regex is reported, not raised.
    #[serde(rename = "bad-regex-handling")]
    BadRegexHandling,
    /// Behavior vector 4: alternation candidates match literally.
    #[serde(rename = "literal-alternation")]
    LiteralAlternation,
    /// Behavior vector 5: wildcard syntax outranks literal matching.
    #[serde(rename = "wildcard-precedence")]
    WildcardPrecedence,
    /// Behavior vector 6: `default_match` selects contains vs exact.
    #[serde(rename = "default-match-strategy")]
    DefaultMatchStrategy,
    /// Behavior vector 7: an unknown regex mode falls back to search.
    #[serde(rename = "invalid-mode-fallback")]
    InvalidModeFallback,
    /// Artifact/specification textual cross-check.
    #[serde(rename = "consistency")]
    Consistency,
}

impl GateName {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Signature => "signature",
            Self::Schema => "schema",
            Self::TypeSafety => "type-safety",
            Self::EvidencePassthrough => "evidence-passthrough",
            Self::NoneSafety => "none-safety",
            Self::Alternatives => "alternatives",
            Self::BadRegexHandling => "bad-regex-handling",
            Self::LiteralAlternation => "literal-alternation",
            Self::WildcardPrecedence => "wildcard-precedence",
            Self::DefaultMatchStrategy => "default-match-strategy",
            Self::InvalidModeFallback => "invalid-mode-fallback",
            Self::Consistency => "consistency",
        }
    }
}

impl fmt::Display for GateName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str((*self).as_str())
    }
}

/// Aggregated verdict for one full validation call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationReport {
    pub schema_version: String,
    /// SHA-256 of the artifact source text, hex-encoded.
    pub artifact_digest: String,
    pub valid: bool,
    /// Ordered failure messages; empty iff `valid`.
    pub errors: Vec<String>,
    /// Only gates that were actually evaluated.
    pub gate_results: BTreeMap<GateName, bool>,
}

impl ValidationReport {
    pub fn new(artifact_source: &str) -> Self {
        Self {
            schema_version: VALIDATION_REPORT_SCHEMA_VERSION.to_string(),
            artifact_digest: artifact_digest(artifact_source),
            valid: false,
            errors: Vec::new(),
            gate_results: BTreeMap::new(),
        }
    }

    /// Set `valid` from the invariant `valid == errors.is_empty()`.
    pub fn finalize(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }
}

/// Verdict of a narrow single-routine validator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartialReport {
    pub schema_version: String,
    /// The routine this report is scoped to.
    pub routine: String,
    pub artifact_digest: String,
    pub valid: bool,
    pub errors: Vec<String>,
    pub gate_results: BTreeMap<GateName, bool>,
}

impl PartialReport {
    pub fn new(routine: &str, artifact_source: &str) -> Self {
        Self {
            schema_version: PARTIAL_REPORT_SCHEMA_VERSION.to_string(),
            routine: routine.to_string(),
            artifact_digest: artifact_digest(artifact_source),
            valid: false,
            errors: Vec::new(),
            gate_results: BTreeMap::new(),
        }
    }

    pub fn finalize(mut self) -> Self {
        self.valid = self.errors.is_empty();
        self
    }
}

/// Hex-encoded SHA-256 of the artifact source text.
pub fn artifact_digest(source: &str) -> String {
    hex::encode(Sha256::digest(source.as_bytes()))
}
