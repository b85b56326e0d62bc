//! Gate orchestrator: the pipeline that turns artifact text into a verdict.
//!
//! `validate` runs the full pipeline: parse, structural safety scan,
//! sandboxed conformance battery, consistency cross-check. A syntax
//! error or a CRITICAL scan finding aborts before anything executes,
//! leaving `gate_results` empty. The narrow entry points rerun the same
//! pipeline scoped to a single routine, for callers retrying one
//! synthesized routine at a time.

use tracing::{debug, warn};

use crate::conformance::{self, HarnessOutcome};
use crate::consistency;
use crate::parser::parse_program;
use crate::safety_scan;
use crate::sandbox::{ExecBudget, Sandbox};
use crate::verdict::{GateName, PartialReport, ValidationReport};

/// Validate one artifact against the specification it was synthesized from.
pub fn validate(artifact_source: &str, spec_text: &str) -> ValidationReport {
    let mut report = ValidationReport::new(artifact_source);

    let program = match parse_program(artifact_source) {
        Ok(program) => program,
        Err(error) => {
            warn!(code = error.code.as_str(), "artifact rejected before scanning");
            report.errors.push(format!("artifact syntax error: {error}"));
            return report.finalize();
        }
    };

    let scan = safety_scan::scan(&program);
    if scan.is_critical() {
        warn!(
            findings = scan.critical_findings.len(),
            "artifact rejected by safety scan"
        );
        for finding in &scan.critical_findings {
            report
                .errors
                .push(format!("critical safety finding: {finding}"));
        }
        return report.finalize();
    }

    report
        .gate_results
        .insert(GateName::Signature, scan.has_required_routines());
    for routine in &scan.missing_routines {
        report
            .errors
            .push(format!("signature: required routine `{routine}` is not declared"));
    }

    match Sandbox::load(&program, ExecBudget::default()) {
        Ok(sandbox) => {
            debug!("sandbox loaded, running conformance battery");
            let outcome = conformance::run(&sandbox);
            report.gate_results.extend(outcome.gate_results);
            report.errors.extend(outcome.errors);
        }
        Err(error) => {
            warn!(code = error.code(), "artifact namespace failed to load");
            report
                .errors
                .push(format!("artifact failed to load: {error}"));
        }
    }

    let consistency = consistency::check(artifact_source, spec_text);
    report
        .gate_results
        .insert(GateName::Consistency, consistency.consistent);
    report.errors.extend(consistency.errors);

    let report = report.finalize();
    debug!(
        valid = report.valid,
        gates = report.gate_results.len(),
        errors = report.errors.len(),
        "validation finished"
    );
    report
}

/// Validate only the `parse_artifacts` routine of an artifact.
pub fn validate_parse_routine(artifact_source: &str) -> PartialReport {
    validate_routine(
        artifact_source,
        "parse_artifacts",
        conformance::run_shape_test,
    )
}

/// Validate only the `validate_logic` routine of an artifact.
pub fn validate_match_routine(artifact_source: &str) -> PartialReport {
    validate_routine(
        artifact_source,
        "validate_logic",
        conformance::run_behavior_battery,
    )
}

fn validate_routine(
    artifact_source: &str,
    routine: &str,
    stage: impl Fn(&Sandbox<'_>, &mut HarnessOutcome),
) -> PartialReport {
    let mut report = PartialReport::new(routine, artifact_source);

    let program = match parse_program(artifact_source) {
        Ok(program) => program,
        Err(error) => {
            report.errors.push(format!("artifact syntax error: {error}"));
            return report.finalize();
        }
    };

    let scan = safety_scan::scan(&program);
    if scan.is_critical() {
        for finding in &scan.critical_findings {
            report
                .errors
                .push(format!("critical safety finding: {finding}"));
        }
        return report.finalize();
    }

    let declared = !scan.missing_routines.iter().any(|missing| missing == routine);
    report.gate_results.insert(GateName::Signature, declared);
    if !declared {
        report
            .errors
            .push(format!("signature: required routine `{routine}` is not declared"));
        return report.finalize();
    }

    match Sandbox::load(&program, ExecBudget::default()) {
        Ok(sandbox) => {
            let mut outcome = HarnessOutcome::default();
            stage(&sandbox, &mut outcome);
            report.gate_results.extend(outcome.gate_results);
            report.errors.extend(outcome.errors);
        }
        Err(error) => {
            report
                .errors
                .push(format!("artifact failed to load: {error}"));
        }
    }

    report.finalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    const REFERENCE_ARTIFACT: &str = include_str!("../tests/fixtures/reference_artifact.ms");

    #[test]
    fn syntax_error_yields_invalid_with_empty_gates() {
        let report = validate("fn broken( {", "any spec");
        assert!(!report.valid);
        assert!(report.gate_results.is_empty());
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].contains("syntax error"));
    }

    #[test]
    fn critical_finding_yields_invalid_with_empty_gates() {
        let report = validate("import os;\nfn f() { return 1; }", "any spec");
        assert!(!report.valid);
        assert!(report.gate_results.is_empty());
        assert!(report.errors[0].contains("critical safety finding"));
        assert!(report.errors[0].contains("forbidden import `os`"));
    }

    #[test]
    fn signature_gate_fails_without_aborting_the_pipeline() {
        let report = validate("fn validate_logic(t, p, o) { return none; }", "any spec");
        assert_eq!(report.gate_results.get(&GateName::Signature), Some(&false));
        // The declared routine still ran its vectors.
        assert!(report.gate_results.contains_key(&GateName::NoneSafety));
        // Gates for the missing routines stay absent.
        assert!(!report.gate_results.contains_key(&GateName::Schema));
        assert!(!report
            .gate_results
            .contains_key(&GateName::EvidencePassthrough));
    }

    #[test]
    fn parse_routine_validator_scopes_to_shape_gates() {
        let report = validate_parse_routine(REFERENCE_ARTIFACT);
        assert!(report.valid);
        assert_eq!(report.routine, "parse_artifacts");
        assert_eq!(report.gate_results.len(), 3);
        assert_eq!(report.gate_results.get(&GateName::Signature), Some(&true));
        assert_eq!(report.gate_results.get(&GateName::Schema), Some(&true));
        assert_eq!(report.gate_results.get(&GateName::TypeSafety), Some(&true));
    }

    #[test]
    fn match_routine_validator_reports_missing_routine() {
        let report = validate_match_routine("fn parse_artifacts(raw) { return []; }");
        assert!(!report.valid);
        assert_eq!(report.gate_results.get(&GateName::Signature), Some(&false));
        assert_eq!(report.gate_results.len(), 1);
        assert!(report.errors[0].contains("`validate_logic` is not declared"));
    }
}
