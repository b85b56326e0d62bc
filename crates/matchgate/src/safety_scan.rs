//! Structural safety scan over parsed artifact text.
//!
//! The scanner walks the full syntax tree before anything executes and
//! flags two classes of CRITICAL finding: calls to bare names that would
//! perform file I/O, console output, or dynamic code evaluation, and
//! imports of modules granting operating-system, process, or
//! filesystem-path access. Either class would let an artifact step
//! outside the namespace-level sandbox, so a single finding aborts the
//! pipeline before the harness stage.
//!
//! The forbidden sets are deliberately small and fixed. Capabilities
//! outside them are a documented gap, not a license to expand scope.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::ast::{Expr, Program, Stmt};

/// Bare-name calls that are never allowed in artifact text.
pub const FORBIDDEN_CALLS: &[&str] = &[
    "open",
    "read_file",
    "write_file",
    "print",
    "println",
    "eval",
    "exec",
];

/// Module imports that are never allowed in artifact text.
pub const FORBIDDEN_IMPORTS: &[&str] = &[
    "os",
    "sys",
    "env",
    "process",
    "subprocess",
    "path",
    "shutil",
    "socket",
    "net",
];

/// The three routines every artifact must declare.
pub const REQUIRED_ROUTINES: &[&str] = &["parse_artifacts", "validate_logic", "check_existence"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    ForbiddenCall,
    ForbiddenImport,
}

impl fmt::Display for FindingKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForbiddenCall => f.write_str("forbidden call"),
            Self::ForbiddenImport => f.write_str("forbidden import"),
        }
    }
}

/// One CRITICAL finding: enough to abort the pipeline on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CriticalFinding {
    pub kind: FindingKind,
    pub name: String,
    pub line: u32,
}

impl fmt::Display for CriticalFinding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} `{}` at line {}", self.kind, self.name, self.line)
    }
}

/// Result of scanning one parsed artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanReport {
    pub critical_findings: Vec<CriticalFinding>,
    /// Required routines absent from the artifact, in canonical order.
    pub missing_routines: Vec<String>,
}

impl ScanReport {
    pub fn has_required_routines(&self) -> bool {
        self.missing_routines.is_empty()
    }

    pub fn is_critical(&self) -> bool {
        !self.critical_findings.is_empty()
    }
}

/// Scan a parsed artifact for critical findings and missing routines.
pub fn scan(program: &Program) -> ScanReport {
    let mut findings = Vec::new();
    for stmt in &program.statements {
        walk_stmt(stmt, &mut findings);
    }

    let declared = program.routine_names();
    let missing_routines = REQUIRED_ROUTINES
        .iter()
        .filter(|required| !declared.contains(required))
        .map(|required| (*required).to_string())
        .collect();

    ScanReport {
        critical_findings: findings,
        missing_routines,
    }
}

fn walk_stmt(stmt: &Stmt, findings: &mut Vec<CriticalFinding>) {
    match stmt {
        Stmt::Import { module, span } => {
            if FORBIDDEN_IMPORTS.contains(&module.as_str()) {
                findings.push(CriticalFinding {
                    kind: FindingKind::ForbiddenImport,
                    name: module.clone(),
                    line: span.line,
                });
            }
            // Imports outside both the forbidden set and the injected
            // capability set are inert at runtime and left to fail
            // their own gates.
        }
        Stmt::Fn(decl) => {
            for stmt in &decl.body {
                walk_stmt(stmt, findings);
            }
        }
        Stmt::Let { expr, .. } | Stmt::Assign { expr, .. } => walk_expr(expr, findings),
        Stmt::If {
            cond,
            then_branch,
            else_branch,
            ..
        } => {
            walk_expr(cond, findings);
            for stmt in then_branch.iter().chain(else_branch) {
                walk_stmt(stmt, findings);
            }
        }
        Stmt::For {
            iterable, body, ..
        } => {
            walk_expr(iterable, findings);
            for stmt in body {
                walk_stmt(stmt, findings);
            }
        }
        Stmt::While { cond, body, .. } => {
            walk_expr(cond, findings);
            for stmt in body {
                walk_stmt(stmt, findings);
            }
        }
        Stmt::Return { expr, .. } => {
            if let Some(expr) = expr {
                walk_expr(expr, findings);
            }
        }
        Stmt::Expr { expr, .. } => walk_expr(expr, findings),
    }
}

fn walk_expr(expr: &Expr, findings: &mut Vec<CriticalFinding>) {
    match expr {
        Expr::NoneLit(_) | Expr::Bool(..) | Expr::Int(..) | Expr::Str(..) | Expr::Ident(..) => {}
        Expr::List(items, _) => {
            for item in items {
                walk_expr(item, findings);
            }
        }
        Expr::Map(entries, _) => {
            for (_, value) in entries {
                walk_expr(value, findings);
            }
        }
        Expr::Call {
            target,
            name,
            args,
            span,
        } => {
            if target.is_none() && FORBIDDEN_CALLS.contains(&name.as_str()) {
                findings.push(CriticalFinding {
                    kind: FindingKind::ForbiddenCall,
                    name: name.clone(),
                    line: span.line,
                });
            }
            if let Some(target) = target {
                walk_expr(target, findings);
            }
            for arg in args {
                walk_expr(arg, findings);
            }
        }
        Expr::Index { target, index, .. } => {
            walk_expr(target, findings);
            walk_expr(index, findings);
        }
        Expr::Unary { operand, .. } => walk_expr(operand, findings),
        Expr::Binary { lhs, rhs, .. } => {
            walk_expr(lhs, findings);
            walk_expr(rhs, findings);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn scan_source(source: &str) -> ScanReport {
        scan(&parse_program(source).expect("parse"))
    }

    const COMPLETE_STUB: &str = r#"
fn parse_artifacts(raw) { return []; }
fn validate_logic(text, pattern, options) { return {"is_match": false, "kind": "exact", "reason": ""}; }
fn check_existence(evidence) { return {"evidence": evidence}; }
"#;

    #[test]
    fn complete_stub_scans_clean() {
        let report = scan_source(COMPLETE_STUB);
        assert!(!report.is_critical());
        assert!(report.has_required_routines());
    }

    #[test]
    fn forbidden_import_is_critical_with_line() {
        let report = scan_source("import regex;\nimport os;\nfn f() { return 1; }");
        assert_eq!(report.critical_findings.len(), 1);
        let finding = &report.critical_findings[0];
        assert_eq!(finding.kind, FindingKind::ForbiddenImport);
        assert_eq!(finding.name, "os");
        assert_eq!(finding.line, 2);
    }

    #[test]
    fn forbidden_call_is_found_anywhere_in_the_tree() {
        let report = scan_source(
            "fn f(x) { if x == 1 { let y = [open(\"secrets\")]; return y; } return none; }",
        );
        assert_eq!(report.critical_findings.len(), 1);
        assert_eq!(report.critical_findings[0].kind, FindingKind::ForbiddenCall);
        assert_eq!(report.critical_findings[0].name, "open");
    }

    #[test]
    fn method_calls_with_forbidden_names_are_not_bare_calls() {
        // `item.print()` would fail at runtime as an unknown method;
        // only bare-name calls reach ambient capabilities.
        let report = scan_source("fn f(item) { return item.print(); }");
        assert!(!report.is_critical());
    }

    #[test]
    fn missing_routines_are_listed_in_canonical_order() {
        let report = scan_source("fn validate_logic(t, p, o) { return none; }");
        assert_eq!(
            report.missing_routines,
            vec!["parse_artifacts", "check_existence"]
        );
        assert!(!report.has_required_routines());
    }

    #[test]
    fn injected_capabilities_are_never_forbidden() {
        for allowed in crate::sandbox::INJECTED_CAPABILITIES {
            assert!(!FORBIDDEN_IMPORTS.contains(allowed));
        }
    }

    #[test]
    fn multiple_findings_accumulate() {
        let report =
            scan_source("import subprocess;\nfn f() { exec(\"rm\"); return eval(\"1\"); }");
        assert_eq!(report.critical_findings.len(), 3);
    }
}
