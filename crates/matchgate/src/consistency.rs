//! Artifact/specification consistency cross-check.
//!
//! The behavior battery proves the artifact against a fixed oracle; this
//! stage proves it against the free-text specification it was synthesized
//! from. The check is a coarse textual one: when the specification
//! demands regex support, the artifact text has to mention regex at all.
//! Anything finer belongs in the battery, where semantics are executable.

use tracing::debug;

/// Pattern prefix the specification uses to demand regex support.
pub const REGEX_DIRECTIVE: &str = "regex:";

/// Outcome of the consistency stage.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsistencyOutcome {
    pub consistent: bool,
    pub errors: Vec<String>,
}

/// Check the artifact text against the specification text.
///
/// A specification without the regex directive makes no demand, so the
/// check passes trivially. With the directive present, the artifact must
/// contain `regex` (case-insensitive); this covers both the directive
/// string itself and `regex.`-style capability calls.
pub fn check(artifact_source: &str, spec_text: &str) -> ConsistencyOutcome {
    if !spec_text.contains(REGEX_DIRECTIVE) {
        return ConsistencyOutcome {
            consistent: true,
            errors: Vec::new(),
        };
    }
    if artifact_source.to_lowercase().contains("regex") {
        return ConsistencyOutcome {
            consistent: true,
            errors: Vec::new(),
        };
    }
    debug!("specification demands regex support the artifact never mentions");
    ConsistencyOutcome {
        consistent: false,
        errors: vec![
            "consistency: specification uses regex patterns but the artifact has no regex handling"
                .to_string(),
        ],
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn silent_specification_is_trivially_consistent() {
        let outcome = check("fn f() { return 1; }", "match any line containing `deploy`");
        assert!(outcome.consistent);
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn regex_demand_without_regex_handling_is_inconsistent() {
        let outcome = check(
            "fn validate_logic(t, p, o) { return none; }",
            "patterns may use regex:^deploy",
        );
        assert!(!outcome.consistent);
        assert!(outcome.errors[0].contains("no regex handling"));
    }

    #[test]
    fn regex_mention_satisfies_the_demand_case_insensitively() {
        let outcome = check(
            "fn f(p) { return Regex_helper(p); }",
            "patterns may use regex:^deploy",
        );
        assert!(outcome.consistent);
    }

    #[test]
    fn capability_call_counts_as_regex_handling() {
        let outcome = check(
            "import regex;\nfn f(p, t) { return regex.search(p, t); }",
            "use regex:a+ to match",
        );
        assert!(outcome.consistent);
    }
}
