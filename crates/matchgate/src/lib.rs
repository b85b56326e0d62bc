//! Trust gate for automatically synthesized matcher artifacts.
//!
//! An artifact is matcher-script source text declaring three routines:
//! `parse_artifacts`, `validate_logic`, and `check_existence`. Nothing
//! about an artifact is trusted. Every validation call runs the same
//! pipeline:
//!
//! - parse the text into a syntax tree (`parser`),
//! - scan the tree for forbidden calls and imports (`safety_scan`),
//! - execute the routines against a fixed oracle battery inside a
//!   capability-limited, step-budgeted interpreter (`sandbox`,
//!   `conformance`),
//! - cross-check the artifact against its specification text
//!   (`consistency`),
//! - emit a content-addressed report (`verdict`), with failures
//!   attributable to a component (`attribution`).
//!
//! The pipeline never panics and never escapes to the host: a
//! malformed, hostile, or looping artifact produces an invalid verdict,
//! not a fault in the caller.

#![forbid(unsafe_code)]

pub mod ast;
pub mod attribution;
pub mod conformance;
pub mod consistency;
pub mod gate;
pub mod parser;
pub mod safety_scan;
pub mod sandbox;
pub mod value;
pub mod verdict;

pub use attribution::{attribute, ErrorSource};
pub use gate::{validate, validate_match_routine, validate_parse_routine};
pub use parser::{parse_program, ParseError};
pub use sandbox::{EvalError, ExecBudget, Sandbox};
pub use verdict::{GateName, PartialReport, ValidationReport};
