//! Sandboxed conformance harness: the fixed oracle battery.
//!
//! Three stages drive the artifact's routines inside the sandbox:
//! a shape test over `parse_artifacts`, seven behavior vectors over
//! `validate_logic`, and an evidence-passthrough test over
//! `check_existence`. Every call site is individually guarded, so an
//! artifact fault becomes a gate failure and never a harness crash.
//! Gates for routines absent from the namespace are not evaluated and
//! stay absent from the gate map.

use std::collections::BTreeMap;

use tracing::debug;

use crate::sandbox::{EvalError, Sandbox};
use crate::value::Value;
use crate::verdict::GateName;

/// Exact key set every parsed item must carry.
pub const PARSED_ITEM_KEYS: &[&str] = &[
    "value",
    "source_file",
    "line_number",
    "matched_content",
    "parsed_fields",
];

/// Fixed representative input for the `parse_artifacts` shape test.
pub const SHAPE_TEST_INPUT: &str =
    "checklist.txt:1: deploy requires a rollback plan\nchecklist.txt:2: secrets stay out of logs\n";

/// Gate outcomes and failure messages from one harness run.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct HarnessOutcome {
    pub gate_results: BTreeMap<GateName, bool>,
    pub errors: Vec<String>,
}

impl HarnessOutcome {
    fn pass(&mut self, gate: GateName) {
        self.gate_results.insert(gate, true);
    }

    fn fail(&mut self, gate: GateName, message: String) {
        self.gate_results.insert(gate, false);
        self.errors.push(message);
    }
}

/// Run the full battery against one loaded sandbox.
pub fn run(sandbox: &Sandbox<'_>) -> HarnessOutcome {
    let mut outcome = HarnessOutcome::default();
    run_shape_test(sandbox, &mut outcome);
    run_behavior_battery(sandbox, &mut outcome);
    run_evidence_passthrough(sandbox, &mut outcome);
    debug!(
        gates = outcome.gate_results.len(),
        failures = outcome.errors.len(),
        "conformance harness finished"
    );
    outcome
}

/// Shape test: one fixed call to `parse_artifacts`.
///
/// A fault fails both dependent gates. A non-empty result must be a
/// sequence of items with exactly the contract key set (`schema`) and a
/// string-typed `value` field (`type-safety`); an empty sequence is
/// vacuously accepted.
pub fn run_shape_test(sandbox: &Sandbox<'_>, outcome: &mut HarnessOutcome) {
    if !sandbox.has_routine("parse_artifacts") {
        return;
    }
    let result = sandbox.call("parse_artifacts", vec![Value::str(SHAPE_TEST_INPUT)]);
    let items = match result {
        Err(error) => {
            let message = format!("parse_artifacts shape test raised: {error}");
            outcome.fail(GateName::Schema, message.clone());
            outcome.fail(GateName::TypeSafety, message);
            return;
        }
        Ok(Value::List(items)) => items,
        Ok(other) => {
            let message = format!(
                "schema: parse_artifacts must return a list of parsed items, got {}",
                other.type_name()
            );
            outcome.fail(GateName::Schema, message);
            outcome.fail(
                GateName::TypeSafety,
                "type-safety: parsed item `value` fields could not be checked".to_string(),
            );
            return;
        }
    };

    let mut expected: Vec<&str> = PARSED_ITEM_KEYS.to_vec();
    expected.sort_unstable();

    let mut schema_error = None;
    let mut type_error = None;
    for (index, item) in items.iter().enumerate() {
        let Some(entries) = item.as_map() else {
            schema_error.get_or_insert(format!(
                "schema: parsed item {index} must be a map, got {}",
                item.type_name()
            ));
            type_error.get_or_insert(format!(
                "type-safety: parsed item {index} has no `value` field to check"
            ));
            continue;
        };
        let keys: Vec<&str> = entries.keys().map(String::as_str).collect();
        if keys != expected {
            schema_error.get_or_insert(format!(
                "schema: parsed item {index} key set mismatch: expected [{}], got [{}]",
                expected.join(", "),
                keys.join(", ")
            ));
        }
        match entries.get("value") {
            Some(Value::Str(_)) => {}
            Some(other) => {
                type_error.get_or_insert(format!(
                    "type-safety: parsed item {index} `value` must be a string, got {}",
                    other.type_name()
                ));
            }
            None => {
                type_error.get_or_insert(format!(
                    "type-safety: parsed item {index} has no `value` field"
                ));
            }
        }
    }

    match schema_error {
        Some(message) => outcome.fail(GateName::Schema, message),
        None => outcome.pass(GateName::Schema),
    }
    match type_error {
        Some(message) => outcome.fail(GateName::TypeSafety, message),
        None => outcome.pass(GateName::TypeSafety),
    }
}

/// The seven behavior vectors, each evaluated in isolation.
pub fn run_behavior_battery(sandbox: &Sandbox<'_>, outcome: &mut HarnessOutcome) {
    if !sandbox.has_routine("validate_logic") {
        return;
    }

    // Vector 1: a `none` parsed_fields option must not fault.
    match call_validate(sandbox, "abc", "a", &[("parsed_fields", Value::None)]) {
        Ok(_) => outcome.pass(GateName::NoneSafety),
        Err(error) => outcome.fail(
            GateName::NoneSafety,
            format!("validate_logic vector none-safety: raised with parsed_fields=none: {error}"),
        ),
    }

    // Vector 2: empty alternation candidates are skipped, non-empty ones match.
    check_vector(
        outcome,
        GateName::Alternatives,
        call_validate(sandbox, "abc", "|a||", &[]),
        |fields| {
            if fields.is_match && fields.kind == "alternatives" {
                None
            } else {
                Some(format!(
                    "expected is_match=true kind=alternatives, got is_match={} kind={}",
                    fields.is_match, fields.kind
                ))
            }
        },
    );

    // Vector 3: an invalid regex is reported by value, not raised.
    check_vector(
        outcome,
        GateName::BadRegexHandling,
        call_validate(sandbox, "abc", "regex:[", &[("regex_mode", Value::str("search"))]),
        |fields| {
            if !fields.is_match && fields.reason.to_lowercase().contains("invalid") {
                None
            } else {
                Some(format!(
                    "expected is_match=false with `invalid` in reason, got is_match={} reason={}",
                    fields.is_match, fields.reason
                ))
            }
        },
    );

    // Vector 4: alternation candidates match literally, never as directives.
    check_vector(
        outcome,
        GateName::LiteralAlternation,
        call_validate(sandbox, "regex:^a", "regex:^a|zzz", &[]),
        |fields| {
            if fields.is_match {
                None
            } else {
                Some("expected the left candidate to match literally".to_string())
            }
        },
    );

    // Vector 5: wildcard syntax outranks the default literal strategy.
    check_vector(
        outcome,
        GateName::WildcardPrecedence,
        call_validate(sandbox, "abc", "a*c", &[]),
        |fields| {
            if fields.kind == "wildcard" {
                None
            } else {
                Some(format!("expected kind=wildcard, got kind={}", fields.kind))
            }
        },
    );

    // Vector 6: default_match selects the contains vs exact strategy.
    // Both sub-cases always run so a failing report carries both
    // diagnostics for the retry loop.
    let contains_failure = vector_failure(
        call_validate(sandbox, "abc", "b", &[("default_match", Value::str("contains"))]),
        |fields| {
            if fields.is_match && fields.kind == "contains" {
                None
            } else {
                Some(format!(
                    "expected is_match=true kind=contains, got is_match={} kind={}",
                    fields.is_match, fields.kind
                ))
            }
        },
    );
    let exact_failure = vector_failure(
        call_validate(sandbox, "abc", "b", &[("default_match", Value::str("exact"))]),
        |fields| {
            if !fields.is_match && fields.kind == "exact" {
                None
            } else {
                Some(format!(
                    "expected is_match=false kind=exact, got is_match={} kind={}",
                    fields.is_match, fields.kind
                ))
            }
        },
    );
    if contains_failure.is_none() && exact_failure.is_none() {
        outcome.pass(GateName::DefaultMatchStrategy);
    } else {
        for failure in [contains_failure, exact_failure].into_iter().flatten() {
            outcome.fail(
                GateName::DefaultMatchStrategy,
                format!("validate_logic vector {}: {failure}", GateName::DefaultMatchStrategy),
            );
        }
    }

    // Vector 7: an unknown regex mode falls back to search, not a fault.
    check_vector(
        outcome,
        GateName::InvalidModeFallback,
        call_validate(
            sandbox,
            "abc",
            "regex:^a",
            &[("regex_mode", Value::str("INVALID_MODE"))],
        ),
        |fields| {
            if fields.is_match {
                None
            } else {
                Some("expected fallback to search mode to match".to_string())
            }
        },
    );
}

/// Evidence passthrough: `check_existence` must return its input
/// sequence unchanged under the `evidence` key.
pub fn run_evidence_passthrough(sandbox: &Sandbox<'_>, outcome: &mut HarnessOutcome) {
    if !sandbox.has_routine("check_existence") {
        return;
    }
    let evidence = Value::List(vec![Value::map([("value", Value::str("test"))])]);
    match sandbox.call("check_existence", vec![evidence.clone()]) {
        Err(error) => outcome.fail(
            GateName::EvidencePassthrough,
            format!("check_existence raised: {error}"),
        ),
        Ok(result) => {
            let returned = result.as_map().and_then(|entries| entries.get("evidence"));
            match returned {
                Some(returned) if *returned == evidence => {
                    outcome.pass(GateName::EvidencePassthrough);
                }
                Some(_) => outcome.fail(
                    GateName::EvidencePassthrough,
                    "check_existence evidence passthrough mismatch: input sequence was altered"
                        .to_string(),
                ),
                None => outcome.fail(
                    GateName::EvidencePassthrough,
                    "check_existence result is missing the `evidence` sequence".to_string(),
                ),
            }
        }
    }
}

struct MatchFields {
    is_match: bool,
    kind: String,
    reason: String,
}

/// Extract the MatchResult contract fields, or describe what is wrong.
fn match_fields(value: &Value) -> Result<MatchFields, String> {
    let Some(entries) = value.as_map() else {
        return Err(format!("result must be a map, got {}", value.type_name()));
    };
    let is_match = entries
        .get("is_match")
        .and_then(Value::as_bool)
        .ok_or("result is missing a boolean `is_match` field")?;
    let kind = entries
        .get("kind")
        .and_then(Value::as_str)
        .ok_or("result is missing a string `kind` field")?;
    let reason = entries
        .get("reason")
        .and_then(Value::as_str)
        .ok_or("result is missing a string `reason` field")?;
    Ok(MatchFields {
        is_match,
        kind: kind.to_string(),
        reason: reason.to_string(),
    })
}

fn call_validate(
    sandbox: &Sandbox<'_>,
    text: &str,
    pattern: &str,
    options: &[(&'static str, Value)],
) -> Result<Value, EvalError> {
    let options = Value::map(options.iter().cloned());
    sandbox.call(
        "validate_logic",
        vec![Value::str(text), Value::str(pattern), options],
    )
}

/// Evaluate one vector result against its contract and record the gate.
fn check_vector(
    outcome: &mut HarnessOutcome,
    gate: GateName,
    result: Result<Value, EvalError>,
    contract: impl Fn(&MatchFields) -> Option<String>,
) {
    match vector_failure(result, contract) {
        Some(failure) => {
            outcome.fail(gate, format!("validate_logic vector {gate}: {failure}"));
        }
        None => outcome.pass(gate),
    }
}

/// A vector's failure message, if its result misses the contract.
fn vector_failure(
    result: Result<Value, EvalError>,
    contract: impl Fn(&MatchFields) -> Option<String>,
) -> Option<String> {
    match &result {
        Err(error) => Some(format!("raised: {error}")),
        Ok(value) => match match_fields(value) {
            Err(contract_error) => Some(contract_error),
            Ok(fields) => contract(&fields),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;
    use crate::sandbox::ExecBudget;

    const REFERENCE_ARTIFACT: &str = include_str!("../tests/fixtures/reference_artifact.ms");

    fn outcome_for(source: &str) -> HarnessOutcome {
        let program = parse_program(source).expect("parse");
        let sandbox = Sandbox::load(&program, ExecBudget::default()).expect("load");
        run(&sandbox)
    }

    #[test]
    fn reference_artifact_passes_every_gate() {
        let outcome = outcome_for(REFERENCE_ARTIFACT);
        assert_eq!(outcome.errors, Vec::<String>::new());
        // The harness evaluates exactly these ten gates; signature and
        // consistency belong to the orchestrator.
        let gates: Vec<GateName> = outcome.gate_results.keys().copied().collect();
        assert_eq!(
            gates,
            vec![
                GateName::Schema,
                GateName::TypeSafety,
                GateName::EvidencePassthrough,
                GateName::NoneSafety,
                GateName::Alternatives,
                GateName::BadRegexHandling,
                GateName::LiteralAlternation,
                GateName::WildcardPrecedence,
                GateName::DefaultMatchStrategy,
                GateName::InvalidModeFallback,
            ]
        );
        assert!(outcome.gate_results.values().all(|&passed| passed));
    }

    #[test]
    fn gates_for_missing_routines_are_absent_not_false() {
        let outcome = outcome_for("fn validate_logic(t, p, o) { return {\"is_match\": false, \"kind\": \"exact\", \"reason\": \"\"}; }");
        assert!(!outcome.gate_results.contains_key(&GateName::Schema));
        assert!(!outcome.gate_results.contains_key(&GateName::TypeSafety));
        assert!(!outcome
            .gate_results
            .contains_key(&GateName::EvidencePassthrough));
        // The battery itself still ran.
        assert!(outcome.gate_results.contains_key(&GateName::NoneSafety));
    }

    #[test]
    fn shape_fault_fails_both_dependent_gates() {
        let outcome = outcome_for("fn parse_artifacts(raw) { return missing(raw); }");
        assert_eq!(outcome.gate_results.get(&GateName::Schema), Some(&false));
        assert_eq!(outcome.gate_results.get(&GateName::TypeSafety), Some(&false));
        assert!(outcome.errors[0].contains("parse_artifacts shape test raised"));
    }

    #[test]
    fn empty_parse_result_is_vacuously_accepted() {
        let outcome = outcome_for("fn parse_artifacts(raw) { return []; }");
        assert_eq!(outcome.gate_results.get(&GateName::Schema), Some(&true));
        assert_eq!(outcome.gate_results.get(&GateName::TypeSafety), Some(&true));
    }

    #[test]
    fn extra_keys_fail_schema_and_keep_type_safety_independent() {
        let source = r#"
fn parse_artifacts(raw) {
    return [{
        "value": "v",
        "source_file": "f",
        "line_number": 1,
        "matched_content": "v",
        "parsed_fields": {},
        "extra": true
    }];
}
"#;
        let outcome = outcome_for(source);
        assert_eq!(outcome.gate_results.get(&GateName::Schema), Some(&false));
        assert_eq!(outcome.gate_results.get(&GateName::TypeSafety), Some(&true));
        assert!(outcome.errors[0].contains("key set mismatch"));
    }

    #[test]
    fn non_string_value_fails_type_safety_only() {
        let source = r#"
fn parse_artifacts(raw) {
    return [{
        "value": 7,
        "source_file": "f",
        "line_number": 1,
        "matched_content": "v",
        "parsed_fields": {}
    }];
}
"#;
        let outcome = outcome_for(source);
        assert_eq!(outcome.gate_results.get(&GateName::Schema), Some(&true));
        assert_eq!(outcome.gate_results.get(&GateName::TypeSafety), Some(&false));
        assert!(outcome.errors[0].contains("`value` must be a string"));
    }

    #[test]
    fn one_failing_vector_does_not_block_the_others() {
        // Always-contains matcher: several vectors fail, all are reported.
        let source = r#"
fn validate_logic(text, pattern, options) {
    return {"is_match": true, "kind": "contains", "reason": "always"};
}
"#;
        let outcome = outcome_for(source);
        assert_eq!(outcome.gate_results.get(&GateName::NoneSafety), Some(&true));
        assert_eq!(
            outcome.gate_results.get(&GateName::Alternatives),
            Some(&false)
        );
        assert_eq!(
            outcome.gate_results.get(&GateName::BadRegexHandling),
            Some(&false)
        );
        assert_eq!(
            outcome.gate_results.get(&GateName::WildcardPrecedence),
            Some(&false)
        );
        assert_eq!(
            outcome.gate_results.get(&GateName::DefaultMatchStrategy),
            Some(&false)
        );
        // Vector 4 and 7 only require is_match=true.
        assert_eq!(
            outcome.gate_results.get(&GateName::LiteralAlternation),
            Some(&true)
        );
        assert_eq!(
            outcome.gate_results.get(&GateName::InvalidModeFallback),
            Some(&true)
        );
    }

    #[test]
    fn default_match_vector_reports_both_subcase_failures() {
        // Neither the contains nor the exact sub-case is satisfied;
        // both diagnostics must land in the report.
        let source = r#"
fn validate_logic(text, pattern, options) {
    return {"is_match": false, "kind": "other", "reason": "stub"};
}
"#;
        let outcome = outcome_for(source);
        assert_eq!(
            outcome.gate_results.get(&GateName::DefaultMatchStrategy),
            Some(&false)
        );
        let strategy_errors: Vec<&String> = outcome
            .errors
            .iter()
            .filter(|error| error.contains("default-match-strategy"))
            .collect();
        assert_eq!(strategy_errors.len(), 2);
        assert!(strategy_errors[0].contains("kind=contains"));
        assert!(strategy_errors[1].contains("kind=exact"));
    }

    #[test]
    fn malformed_match_result_fails_with_contract_message() {
        let outcome = outcome_for("fn validate_logic(t, p, o) { return [1, 2]; }");
        assert!(outcome
            .errors
            .iter()
            .all(|error| error.contains("result must be a map")));
    }

    #[test]
    fn looping_validate_logic_fails_gates_without_hanging() {
        let source = r#"
fn validate_logic(text, pattern, options) {
    while true { let x = 1; }
}
"#;
        let program = parse_program(source).expect("parse");
        let sandbox = Sandbox::load(&program, ExecBudget { max_steps: 2_000 }).expect("load");
        let mut outcome = HarnessOutcome::default();
        run_behavior_battery(&sandbox, &mut outcome);
        assert_eq!(outcome.gate_results.get(&GateName::NoneSafety), Some(&false));
        assert!(outcome.errors[0].contains("budget exhausted"));
    }

    #[test]
    fn passthrough_detects_altered_evidence() {
        let outcome = outcome_for(
            "fn check_existence(evidence) { return {\"evidence\": []}; }",
        );
        assert_eq!(
            outcome.gate_results.get(&GateName::EvidencePassthrough),
            Some(&false)
        );
        assert!(outcome.errors[0].contains("passthrough mismatch"));
    }

    #[test]
    fn passthrough_allows_extra_result_keys() {
        let source = r#"
fn check_existence(evidence) {
    return {"evidence": evidence, "count": len(evidence)};
}
"#;
        let outcome = outcome_for(source);
        assert_eq!(
            outcome.gate_results.get(&GateName::EvidencePassthrough),
            Some(&true)
        );
    }
}
