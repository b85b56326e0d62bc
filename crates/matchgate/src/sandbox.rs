//! Capability-limited execution namespace for matcher-script artifacts.
//!
//! The sandbox is a tree-walking interpreter over `crate::ast`. The
//! namespace exposes exactly two injected capability handles, a
//! regular-expression engine (`regex`) and a glob matcher (`wildcard`),
//! plus a whitelist of pure primitives (`len`, `str`, `range`, type
//! tests) and a small method surface on built-in values. There is no
//! ambient import system, filesystem, network, process, or clock access.
//!
//! Every routine invocation runs under a deterministic step budget so a
//! looping artifact exhausts its fuel instead of hanging the caller.
//! Capability calls report failure by value (`regex.is_valid`, matching
//! functions returning `none` for an invalid pattern); interpreter
//! faults surface as [`EvalError`] and are caught at every harness call
//! site.

use std::collections::BTreeMap;

use globset::Glob;
use regex::Regex;
use thiserror::Error;

use crate::ast::{BinOp, Expr, FnDecl, Program, Stmt, UnaryOp};
use crate::value::Value;

/// Module names whose `import` lines are accepted and ignored because
/// the corresponding capability is injected directly.
pub const INJECTED_CAPABILITIES: &[&str] = &["regex", "wildcard"];

/// Routine calls deeper than this fail deterministically instead of
/// overflowing the host stack.
pub const MAX_CALL_DEPTH: u32 = 64;

/// Largest sequence `range` will materialize.
const MAX_RANGE_LEN: i64 = 65_536;

/// Deterministic per-invocation step budget.
///
/// A fuel counter is used instead of a wall-clock timeout so verdicts
/// are reproducible across hosts. The default bounds each routine call,
/// not the whole validation run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExecBudget {
    pub max_steps: u64,
}

impl Default for ExecBudget {
    fn default() -> Self {
        Self { max_steps: 200_000 }
    }
}

/// Fault raised by sandboxed execution. Never escapes the gate: every
/// harness call site converts it into a gate failure message.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EvalError {
    #[error("unknown name `{name}` at line {line}")]
    UnknownName { name: String, line: u32 },
    #[error("routine `{name}` is not defined in the artifact")]
    UnknownRoutine { name: String },
    #[error("routine `{name}` expects {expected} arguments, got {actual}")]
    ArityMismatch {
        name: String,
        expected: usize,
        actual: usize,
    },
    #[error("type mismatch at line {line}: expected {expected}, got {actual}")]
    TypeMismatch {
        expected: String,
        actual: String,
        line: u32,
    },
    #[error("unknown method `{method}` on {target} at line {line}")]
    UnknownMethod {
        target: String,
        method: String,
        line: u32,
    },
    #[error("index {index} out of range for length {len} at line {line}")]
    IndexOutOfRange { index: i64, len: usize, line: u32 },
    #[error("missing key `{key}` at line {line}")]
    MissingKey { key: String, line: u32 },
    #[error("invalid operation at line {line}: {message}")]
    InvalidOperation { message: String, line: u32 },
    #[error("execution budget exhausted after {max_steps} steps")]
    BudgetExhausted { max_steps: u64 },
    #[error("call depth exceeded the limit of {max_depth}")]
    CallDepthExceeded { max_depth: u32 },
}

impl EvalError {
    /// Stable code for log events and tests.
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownName { .. } => "unknown_name",
            Self::UnknownRoutine { .. } => "unknown_routine",
            Self::ArityMismatch { .. } => "arity_mismatch",
            Self::TypeMismatch { .. } => "type_mismatch",
            Self::UnknownMethod { .. } => "unknown_method",
            Self::IndexOutOfRange { .. } => "index_out_of_range",
            Self::MissingKey { .. } => "missing_key",
            Self::InvalidOperation { .. } => "invalid_operation",
            Self::BudgetExhausted { .. } => "budget_exhausted",
            Self::CallDepthExceeded { .. } => "call_depth_exceeded",
        }
    }
}

/// One artifact's routines bound into a shared namespace.
///
/// The namespace is built fresh per validation call and never reused, so
/// no state leaks between artifacts. Routine declarations may reference
/// each other and themselves.
#[derive(Debug)]
pub struct Sandbox<'p> {
    functions: BTreeMap<String, &'p FnDecl>,
    globals: BTreeMap<String, Value>,
    budget: ExecBudget,
}

impl<'p> Sandbox<'p> {
    /// Bind all top-level declarations of `program` into one namespace.
    ///
    /// Capability imports are ignored (injected directly); top-level
    /// `let` bindings are evaluated under the budget and become
    /// read-only globals. Any fault during that evaluation is a load
    /// failure the orchestrator records without aborting the pipeline.
    pub fn load(program: &'p Program, budget: ExecBudget) -> Result<Self, EvalError> {
        let mut functions: BTreeMap<String, &'p FnDecl> = BTreeMap::new();
        for stmt in &program.statements {
            if let Stmt::Fn(decl) = stmt {
                functions.insert(decl.name.clone(), decl);
            }
        }
        let mut globals: BTreeMap<String, Value> = BTreeMap::new();
        for stmt in &program.statements {
            if let Stmt::Let { name, expr, .. } = stmt {
                let value = {
                    let mut machine = Machine {
                        functions: &functions,
                        globals: &globals,
                        fuel: budget.max_steps,
                        max_steps: budget.max_steps,
                        depth: 0,
                    };
                    let mut env = BTreeMap::new();
                    machine.eval(expr, &mut env)?
                };
                globals.insert(name.clone(), value);
            }
        }
        Ok(Self {
            functions,
            globals,
            budget,
        })
    }

    pub fn has_routine(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Invoke one artifact routine under a fresh step budget.
    pub fn call(&self, name: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let Some(decl) = self.functions.get(name) else {
            return Err(EvalError::UnknownRoutine {
                name: name.to_string(),
            });
        };
        let mut machine = Machine {
            functions: &self.functions,
            globals: &self.globals,
            fuel: self.budget.max_steps,
            max_steps: self.budget.max_steps,
            depth: 0,
        };
        machine.call_decl(decl, args)
    }
}

enum Flow {
    Normal,
    Return(Value),
}

struct Machine<'a> {
    functions: &'a BTreeMap<String, &'a FnDecl>,
    globals: &'a BTreeMap<String, Value>,
    fuel: u64,
    max_steps: u64,
    depth: u32,
}

type Env = BTreeMap<String, Value>;

impl<'a> Machine<'a> {
    fn tick(&mut self) -> Result<(), EvalError> {
        if self.fuel == 0 {
            return Err(EvalError::BudgetExhausted {
                max_steps: self.max_steps,
            });
        }
        self.fuel -= 1;
        Ok(())
    }

    fn call_decl(&mut self, decl: &FnDecl, args: Vec<Value>) -> Result<Value, EvalError> {
        if self.depth >= MAX_CALL_DEPTH {
            return Err(EvalError::CallDepthExceeded {
                max_depth: MAX_CALL_DEPTH,
            });
        }
        if decl.params.len() != args.len() {
            return Err(EvalError::ArityMismatch {
                name: decl.name.clone(),
                expected: decl.params.len(),
                actual: args.len(),
            });
        }
        self.depth += 1;
        let mut env: Env = decl.params.iter().cloned().zip(args).collect();
        let flow = self.exec_block(&decl.body, &mut env);
        self.depth -= 1;
        match flow? {
            Flow::Return(value) => Ok(value),
            Flow::Normal => Ok(Value::None),
        }
    }

    fn exec_block(&mut self, stmts: &[Stmt], env: &mut Env) -> Result<Flow, EvalError> {
        for stmt in stmts {
            self.tick()?;
            match stmt {
                Stmt::Import { .. } | Stmt::Fn(_) => {
                    // Nested declarations and imports inside a body are
                    // inert; the scanner has already vetted them.
                }
                Stmt::Let { name, expr, .. } => {
                    let value = self.eval(expr, env)?;
                    env.insert(name.clone(), value);
                }
                Stmt::Assign { name, expr, span } => {
                    let value = self.eval(expr, env)?;
                    if !env.contains_key(name) {
                        return Err(EvalError::UnknownName {
                            name: name.clone(),
                            line: span.line,
                        });
                    }
                    env.insert(name.clone(), value);
                }
                Stmt::If {
                    cond,
                    then_branch,
                    else_branch,
                    ..
                } => {
                    let branch = if self.eval_bool(cond, env)? {
                        then_branch
                    } else {
                        else_branch
                    };
                    if let Flow::Return(value) = self.exec_block(branch, env)? {
                        return Ok(Flow::Return(value));
                    }
                }
                Stmt::For {
                    var,
                    iterable,
                    body,
                    ..
                } => {
                    let sequence = self.eval(iterable, env)?;
                    let Value::List(items) = sequence else {
                        return Err(EvalError::TypeMismatch {
                            expected: "list".to_string(),
                            actual: sequence.type_name().to_string(),
                            line: iterable.span().line,
                        });
                    };
                    for item in items {
                        self.tick()?;
                        env.insert(var.clone(), item);
                        if let Flow::Return(value) = self.exec_block(body, env)? {
                            return Ok(Flow::Return(value));
                        }
                    }
                }
                Stmt::While { cond, body, .. } => loop {
                    self.tick()?;
                    if !self.eval_bool(cond, env)? {
                        break;
                    }
                    if let Flow::Return(value) = self.exec_block(body, env)? {
                        return Ok(Flow::Return(value));
                    }
                },
                Stmt::Return { expr, .. } => {
                    let value = match expr {
                        Some(expr) => self.eval(expr, env)?,
                        None => Value::None,
                    };
                    return Ok(Flow::Return(value));
                }
                Stmt::Expr { expr, .. } => {
                    self.eval(expr, env)?;
                }
            }
        }
        Ok(Flow::Normal)
    }

    fn eval_bool(&mut self, expr: &Expr, env: &mut Env) -> Result<bool, EvalError> {
        let value = self.eval(expr, env)?;
        value.as_bool().ok_or_else(|| EvalError::TypeMismatch {
            expected: "bool".to_string(),
            actual: value.type_name().to_string(),
            line: expr.span().line,
        })
    }

    fn eval(&mut self, expr: &Expr, env: &mut Env) -> Result<Value, EvalError> {
        self.tick()?;
        match expr {
            Expr::NoneLit(_) => Ok(Value::None),
            Expr::Bool(flag, _) => Ok(Value::Bool(*flag)),
            Expr::Int(number, _) => Ok(Value::Int(*number)),
            Expr::Str(text, _) => Ok(Value::Str(text.clone())),
            Expr::List(items, _) => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(item, env)?);
                }
                Ok(Value::List(values))
            }
            Expr::Map(entries, _) => {
                let mut map = BTreeMap::new();
                for (key, value_expr) in entries {
                    let value = self.eval(value_expr, env)?;
                    map.insert(key.clone(), value);
                }
                Ok(Value::Map(map))
            }
            Expr::Ident(name, span) => {
                if let Some(value) = env.get(name) {
                    return Ok(value.clone());
                }
                if let Some(value) = self.globals.get(name) {
                    return Ok(value.clone());
                }
                Err(EvalError::UnknownName {
                    name: name.clone(),
                    line: span.line,
                })
            }
            Expr::Call {
                target: None,
                name,
                args,
                span,
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                if let Some(decl) = self.functions.get(name) {
                    return self.call_decl(decl, values);
                }
                self.call_builtin(name, values, span.line)
            }
            Expr::Call {
                target: Some(target),
                name,
                args,
                span,
            } => {
                let mut values = Vec::with_capacity(args.len());
                for arg in args {
                    values.push(self.eval(arg, env)?);
                }
                // Capability handles are names, not values: they only
                // appear as the receiver of a method call and cannot be
                // shadowed from inside the artifact namespace.
                if let Expr::Ident(receiver, _) = target.as_ref() {
                    if !env.contains_key(receiver) && !self.globals.contains_key(receiver) {
                        match receiver.as_str() {
                            "regex" => return self.call_regex(name, values, span.line),
                            "wildcard" => return self.call_wildcard(name, values, span.line),
                            _ => {}
                        }
                    }
                }
                let receiver = self.eval(target, env)?;
                self.call_method(receiver, name, values, span.line)
            }
            Expr::Index {
                target,
                index,
                span,
            } => {
                let container = self.eval(target, env)?;
                let key = self.eval(index, env)?;
                self.index(container, key, span.line)
            }
            Expr::Unary { op, operand, span } => {
                let value = self.eval(operand, env)?;
                match op {
                    UnaryOp::Not => value
                        .as_bool()
                        .map(|flag| Value::Bool(!flag))
                        .ok_or_else(|| EvalError::TypeMismatch {
                            expected: "bool".to_string(),
                            actual: value.type_name().to_string(),
                            line: span.line,
                        }),
                    UnaryOp::Neg => match value {
                        Value::Int(number) => {
                            number.checked_neg().map(Value::Int).ok_or_else(|| {
                                EvalError::InvalidOperation {
                                    message: "integer negation overflow".to_string(),
                                    line: span.line,
                                }
                            })
                        }
                        other => Err(EvalError::TypeMismatch {
                            expected: "int".to_string(),
                            actual: other.type_name().to_string(),
                            line: span.line,
                        }),
                    },
                }
            }
            Expr::Binary { op, lhs, rhs, span } => match op {
                BinOp::And => {
                    if !self.eval_bool(lhs, env)? {
                        return Ok(Value::Bool(false));
                    }
                    Ok(Value::Bool(self.eval_bool(rhs, env)?))
                }
                BinOp::Or => {
                    if self.eval_bool(lhs, env)? {
                        return Ok(Value::Bool(true));
                    }
                    Ok(Value::Bool(self.eval_bool(rhs, env)?))
                }
                _ => {
                    let left = self.eval(lhs, env)?;
                    let right = self.eval(rhs, env)?;
                    self.binary(*op, left, right, span.line)
                }
            },
        }
    }

    fn binary(&mut self, op: BinOp, left: Value, right: Value, line: u32) -> Result<Value, EvalError> {
        match op {
            BinOp::Eq => Ok(Value::Bool(left == right)),
            BinOp::Ne => Ok(Value::Bool(left != right)),
            BinOp::Lt | BinOp::Le | BinOp::Gt | BinOp::Ge => match (&left, &right) {
                (Value::Int(a), Value::Int(b)) => {
                    let result = match op {
                        BinOp::Lt => a < b,
                        BinOp::Le => a <= b,
                        BinOp::Gt => a > b,
                        _ => a >= b,
                    };
                    Ok(Value::Bool(result))
                }
                _ => Err(EvalError::TypeMismatch {
                    expected: "int".to_string(),
                    actual: format!("{} and {}", left.type_name(), right.type_name()),
                    line,
                }),
            },
            BinOp::In | BinOp::NotIn => {
                let contained = self.membership(&left, &right, line)?;
                Ok(Value::Bool(if op == BinOp::In {
                    contained
                } else {
                    !contained
                }))
            }
            BinOp::Add => match (left, right) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_add(b)
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::InvalidOperation {
                        message: "integer addition overflow".to_string(),
                        line,
                    }),
                (Value::Str(mut a), Value::Str(b)) => {
                    a.push_str(&b);
                    Ok(Value::Str(a))
                }
                (Value::List(mut a), Value::List(b)) => {
                    a.extend(b);
                    Ok(Value::List(a))
                }
                (left, right) => Err(EvalError::TypeMismatch {
                    expected: "matching int, string, or list operands".to_string(),
                    actual: format!("{} and {}", left.type_name(), right.type_name()),
                    line,
                }),
            },
            BinOp::Sub => match (left, right) {
                (Value::Int(a), Value::Int(b)) => a
                    .checked_sub(b)
                    .map(Value::Int)
                    .ok_or_else(|| EvalError::InvalidOperation {
                        message: "integer subtraction overflow".to_string(),
                        line,
                    }),
                (left, right) => Err(EvalError::TypeMismatch {
                    expected: "int".to_string(),
                    actual: format!("{} and {}", left.type_name(), right.type_name()),
                    line,
                }),
            },
            BinOp::And | BinOp::Or => unreachable!("short-circuit ops are handled in eval"),
        }
    }

    fn membership(&self, needle: &Value, haystack: &Value, line: u32) -> Result<bool, EvalError> {
        match (needle, haystack) {
            (Value::Str(sub), Value::Str(text)) => Ok(text.contains(sub.as_str())),
            (any, Value::List(items)) => Ok(items.contains(any)),
            (Value::Str(key), Value::Map(entries)) => Ok(entries.contains_key(key)),
            (needle, haystack) => Err(EvalError::TypeMismatch {
                expected: "string-in-string, element-in-list, or key-in-map".to_string(),
                actual: format!("{} in {}", needle.type_name(), haystack.type_name()),
                line,
            }),
        }
    }

    fn index(&self, container: Value, key: Value, line: u32) -> Result<Value, EvalError> {
        match (container, key) {
            (Value::List(items), Value::Int(index)) => {
                let position = usize::try_from(index).ok().filter(|i| *i < items.len());
                match position {
                    Some(position) => Ok(items[position].clone()),
                    None => Err(EvalError::IndexOutOfRange {
                        index,
                        len: items.len(),
                        line,
                    }),
                }
            }
            (Value::Str(text), Value::Int(index)) => {
                let position = usize::try_from(index).ok();
                let ch = position.and_then(|i| text.chars().nth(i));
                match ch {
                    Some(ch) => Ok(Value::Str(ch.to_string())),
                    None => Err(EvalError::IndexOutOfRange {
                        index,
                        len: text.chars().count(),
                        line,
                    }),
                }
            }
            (Value::Map(entries), Value::Str(key)) => {
                entries.get(&key).cloned().ok_or(EvalError::MissingKey { key, line })
            }
            (container, key) => Err(EvalError::TypeMismatch {
                expected: "list[int], string[int], or map[string]".to_string(),
                actual: format!("{}[{}]", container.type_name(), key.type_name()),
                line,
            }),
        }
    }

    // -----------------------------------------------------------------
    // Whitelisted primitives
    // -----------------------------------------------------------------

    fn call_builtin(&mut self, name: &str, args: Vec<Value>, line: u32) -> Result<Value, EvalError> {
        match name {
            "len" => {
                let [value] = take_args::<1>(name, args)?;
                let length = match &value {
                    Value::Str(text) => text.chars().count(),
                    Value::List(items) => items.len(),
                    Value::Map(entries) => entries.len(),
                    other => {
                        return Err(EvalError::TypeMismatch {
                            expected: "string, list, or map".to_string(),
                            actual: other.type_name().to_string(),
                            line,
                        });
                    }
                };
                Ok(Value::Int(length as i64))
            }
            "str" => {
                let [value] = take_args::<1>(name, args)?;
                Ok(Value::Str(value.to_string()))
            }
            "range" => {
                let (start, end) = match args.len() {
                    1 => {
                        let [end] = take_args::<1>(name, args)?;
                        (Value::Int(0), end)
                    }
                    _ => {
                        let [start, end] = take_args::<2>(name, args)?;
                        (start, end)
                    }
                };
                let (Value::Int(start), Value::Int(end)) = (&start, &end) else {
                    return Err(EvalError::TypeMismatch {
                        expected: "int bounds".to_string(),
                        actual: format!("{} and {}", start.type_name(), end.type_name()),
                        line,
                    });
                };
                let span = end.saturating_sub(*start);
                if span > MAX_RANGE_LEN {
                    return Err(EvalError::InvalidOperation {
                        message: format!("range longer than {MAX_RANGE_LEN} elements"),
                        line,
                    });
                }
                Ok(Value::List((*start..*end).map(Value::Int).collect()))
            }
            "is_str" | "is_int" | "is_bool" | "is_list" | "is_map" | "is_none" => {
                let [value] = take_args::<1>(name, args)?;
                let matches = match name {
                    "is_str" => matches!(value, Value::Str(_)),
                    "is_int" => matches!(value, Value::Int(_)),
                    "is_bool" => matches!(value, Value::Bool(_)),
                    "is_list" => matches!(value, Value::List(_)),
                    "is_map" => matches!(value, Value::Map(_)),
                    _ => matches!(value, Value::None),
                };
                Ok(Value::Bool(matches))
            }
            _ => Err(EvalError::UnknownName {
                name: name.to_string(),
                line,
            }),
        }
    }

    fn call_method(
        &mut self,
        receiver: Value,
        method: &str,
        args: Vec<Value>,
        line: u32,
    ) -> Result<Value, EvalError> {
        match (&receiver, method) {
            (Value::Str(text), "trim") => {
                take_args::<0>(method, args)?;
                Ok(Value::Str(text.trim().to_string()))
            }
            (Value::Str(text), "lower") => {
                take_args::<0>(method, args)?;
                Ok(Value::Str(text.to_lowercase()))
            }
            (Value::Str(text), "upper") => {
                take_args::<0>(method, args)?;
                Ok(Value::Str(text.to_uppercase()))
            }
            (Value::Str(text), "split") => {
                let [separator] = take_args::<1>(method, args)?;
                let Value::Str(separator) = separator else {
                    return Err(EvalError::TypeMismatch {
                        expected: "string separator".to_string(),
                        actual: separator.type_name().to_string(),
                        line,
                    });
                };
                if separator.is_empty() {
                    return Err(EvalError::InvalidOperation {
                        message: "split separator must not be empty".to_string(),
                        line,
                    });
                }
                Ok(Value::List(
                    text.split(separator.as_str())
                        .map(|part| Value::Str(part.to_string()))
                        .collect(),
                ))
            }
            (Value::Str(text), "starts_with") => {
                let [prefix] = take_args::<1>(method, args)?;
                let Value::Str(prefix) = prefix else {
                    return Err(EvalError::TypeMismatch {
                        expected: "string prefix".to_string(),
                        actual: prefix.type_name().to_string(),
                        line,
                    });
                };
                Ok(Value::Bool(text.starts_with(prefix.as_str())))
            }
            (Value::Str(text), "ends_with") => {
                let [suffix] = take_args::<1>(method, args)?;
                let Value::Str(suffix) = suffix else {
                    return Err(EvalError::TypeMismatch {
                        expected: "string suffix".to_string(),
                        actual: suffix.type_name().to_string(),
                        line,
                    });
                };
                Ok(Value::Bool(text.ends_with(suffix.as_str())))
            }
            (Value::Str(text), "replace") => {
                let [from, to] = take_args::<2>(method, args)?;
                let (Value::Str(from), Value::Str(to)) = (&from, &to) else {
                    return Err(EvalError::TypeMismatch {
                        expected: "string arguments".to_string(),
                        actual: format!("{} and {}", from.type_name(), to.type_name()),
                        line,
                    });
                };
                Ok(Value::Str(text.replace(from.as_str(), to)))
            }
            (Value::Str(text), "substring") => {
                let (start, end) = match args.len() {
                    1 => {
                        let [start] = take_args::<1>(method, args)?;
                        (start, None)
                    }
                    _ => {
                        let [start, end] = take_args::<2>(method, args)?;
                        (start, Some(end))
                    }
                };
                let Value::Int(start) = start else {
                    return Err(EvalError::TypeMismatch {
                        expected: "int start".to_string(),
                        actual: start.type_name().to_string(),
                        line,
                    });
                };
                let end = match end {
                    None => None,
                    Some(Value::Int(end)) => Some(end),
                    Some(other) => {
                        return Err(EvalError::TypeMismatch {
                            expected: "int end".to_string(),
                            actual: other.type_name().to_string(),
                            line,
                        });
                    }
                };
                if start < 0 || end.is_some_and(|end| end < 0) {
                    return Err(EvalError::InvalidOperation {
                        message: "substring bounds must be non-negative".to_string(),
                        line,
                    });
                }
                let chars: Vec<char> = text.chars().collect();
                let start = (start as usize).min(chars.len());
                let end = end
                    .map(|end| (end as usize).min(chars.len()))
                    .unwrap_or(chars.len());
                let slice = if start < end { &chars[start..end] } else { &[] };
                Ok(Value::Str(slice.iter().collect()))
            }
            (Value::Map(entries), "get") => {
                let (key, default) = match args.len() {
                    1 => {
                        let [key] = take_args::<1>(method, args)?;
                        (key, Value::None)
                    }
                    _ => {
                        let [key, default] = take_args::<2>(method, args)?;
                        (key, default)
                    }
                };
                let Value::Str(key) = key else {
                    return Err(EvalError::TypeMismatch {
                        expected: "string key".to_string(),
                        actual: key.type_name().to_string(),
                        line,
                    });
                };
                Ok(entries.get(&key).cloned().unwrap_or(default))
            }
            (Value::Map(entries), "keys") => {
                take_args::<0>(method, args)?;
                Ok(Value::List(
                    entries.keys().map(|key| Value::Str(key.clone())).collect(),
                ))
            }
            (receiver, method) => Err(EvalError::UnknownMethod {
                target: receiver.type_name().to_string(),
                method: method.to_string(),
                line,
            }),
        }
    }

    // -----------------------------------------------------------------
    // Injected capabilities
    // -----------------------------------------------------------------

    fn call_regex(&mut self, method: &str, args: Vec<Value>, line: u32) -> Result<Value, EvalError> {
        match method {
            "is_valid" => {
                let [pattern] = take_args::<1>(method, args)?;
                let pattern = expect_str(pattern, "regex pattern", line)?;
                Ok(Value::Bool(Regex::new(&pattern).is_ok()))
            }
            "search" => self.regex_match(args, line, |pattern| pattern.to_string()),
            "match_start" => self.regex_match(args, line, |pattern| format!("^(?:{pattern})")),
            "full_match" => self.regex_match(args, line, |pattern| format!("^(?:{pattern})$")),
            _ => Err(EvalError::UnknownMethod {
                target: "regex".to_string(),
                method: method.to_string(),
                line,
            }),
        }
    }

    /// Shared matcher for the three regex entry points. An invalid
    /// pattern yields `none` rather than a fault so artifacts can
    /// handle it as a value.
    fn regex_match(
        &mut self,
        args: Vec<Value>,
        line: u32,
        wrap: impl Fn(&str) -> String,
    ) -> Result<Value, EvalError> {
        let [pattern, text] = take_args::<2>("regex match", args)?;
        let pattern = expect_str(pattern, "regex pattern", line)?;
        let text = expect_str(text, "regex input", line)?;
        if Regex::new(&pattern).is_err() {
            return Ok(Value::None);
        }
        match Regex::new(&wrap(&pattern)) {
            Ok(compiled) => Ok(Value::Bool(compiled.is_match(&text))),
            Err(_) => Ok(Value::None),
        }
    }

    fn call_wildcard(
        &mut self,
        method: &str,
        args: Vec<Value>,
        line: u32,
    ) -> Result<Value, EvalError> {
        match method {
            "matches" => {
                let [pattern, text] = take_args::<2>(method, args)?;
                let pattern = expect_str(pattern, "wildcard pattern", line)?;
                let text = expect_str(text, "wildcard input", line)?;
                // Invalid globs are reported as a non-match, not a fault.
                let matched = Glob::new(&pattern)
                    .map(|glob| glob.compile_matcher().is_match(text.as_str()))
                    .unwrap_or(false);
                Ok(Value::Bool(matched))
            }
            _ => Err(EvalError::UnknownMethod {
                target: "wildcard".to_string(),
                method: method.to_string(),
                line,
            }),
        }
    }
}

fn take_args<const N: usize>(name: &str, args: Vec<Value>) -> Result<[Value; N], EvalError> {
    let actual = args.len();
    args.try_into().map_err(|_| EvalError::ArityMismatch {
        name: name.to_string(),
        expected: N,
        actual,
    })
}

fn expect_str(value: Value, what: &str, line: u32) -> Result<String, EvalError> {
    match value {
        Value::Str(text) => Ok(text),
        other => Err(EvalError::TypeMismatch {
            expected: what.to_string(),
            actual: other.type_name().to_string(),
            line,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_program;

    fn sandbox_for(source: &str) -> (Program, ExecBudget) {
        (parse_program(source).expect("parse"), ExecBudget::default())
    }

    fn call(source: &str, routine: &str, args: Vec<Value>) -> Result<Value, EvalError> {
        let program = parse_program(source).expect("parse");
        let sandbox = Sandbox::load(&program, ExecBudget::default()).expect("load");
        sandbox.call(routine, args)
    }

    #[test]
    fn routines_share_one_namespace() {
        let source = r#"
fn outer(x) { return helper(x) + 1; }
fn helper(x) { return x + 1; }
"#;
        let result = call(source, "outer", vec![Value::Int(1)]).expect("call");
        assert_eq!(result, Value::Int(3));
    }

    #[test]
    fn self_recursion_works_within_depth_limit() {
        let source = r#"
fn count_down(n) {
    if n <= 0 { return 0; }
    return count_down(n - 1);
}
"#;
        let result = call(source, "count_down", vec![Value::Int(10)]).expect("call");
        assert_eq!(result, Value::Int(0));
    }

    #[test]
    fn runaway_recursion_hits_depth_limit() {
        let source = "fn spin(n) { return spin(n + 1); }";
        let error = call(source, "spin", vec![Value::Int(0)]).expect_err("must fault");
        assert_eq!(error.code(), "call_depth_exceeded");
    }

    #[test]
    fn infinite_loop_exhausts_budget_instead_of_hanging() {
        let source = "fn spin() { while true { let x = 1; } }";
        let program = parse_program(source).expect("parse");
        let sandbox = Sandbox::load(&program, ExecBudget { max_steps: 1_000 }).expect("load");
        let error = sandbox.call("spin", Vec::new()).expect_err("must fault");
        assert_eq!(error.code(), "budget_exhausted");
    }

    #[test]
    fn capability_imports_are_ignored_at_execution_time() {
        let source = r#"
import regex;
import wildcard;
fn probe(text) { return regex.search("^a", text); }
"#;
        let result = call(source, "probe", vec![Value::str("abc")]).expect("call");
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn invalid_regex_pattern_is_reported_by_value() {
        let source = r#"
fn probe(text) {
    if regex.is_valid("[") { return "valid"; }
    return regex.search("[", text);
}
"#;
        let result = call(source, "probe", vec![Value::str("abc")]).expect("call");
        assert_eq!(result, Value::None);
    }

    #[test]
    fn anchored_and_full_regex_modes() {
        let source = r#"
fn modes(text) {
    return [
        regex.match_start("a", text),
        regex.match_start("b", text),
        regex.full_match("a.c", text),
    ];
}
"#;
        let result = call(source, "modes", vec![Value::str("abc")]).expect("call");
        assert_eq!(
            result,
            Value::List(vec![
                Value::Bool(true),
                Value::Bool(false),
                Value::Bool(true)
            ])
        );
    }

    #[test]
    fn wildcard_capability_matches_globs() {
        let source = "fn probe(text) { return wildcard.matches(\"a*c\", text); }";
        assert_eq!(
            call(source, "probe", vec![Value::str("abc")]).expect("call"),
            Value::Bool(true)
        );
        assert_eq!(
            call(source, "probe", vec![Value::str("zzz")]).expect("call"),
            Value::Bool(false)
        );
    }

    #[test]
    fn string_methods_cover_the_matching_surface() {
        let source = r#"
fn probe(p) {
    return [
        p.trim().lower(),
        p.split("|"),
        p.substring(1, 3),
        p.starts_with(" A"),
    ];
}
"#;
        let result = call(source, "probe", vec![Value::str(" A|b ")]).expect("call");
        assert_eq!(
            result,
            Value::List(vec![
                Value::str("a|b"),
                Value::List(vec![Value::str(" A"), Value::str("b ")]),
                Value::str("A|"),
                Value::Bool(true),
            ])
        );
    }

    #[test]
    fn split_preserves_empty_segments() {
        let source = "fn probe(p) { return p.split(\"|\"); }";
        let result = call(source, "probe", vec![Value::str("|a||")]).expect("call");
        assert_eq!(
            result,
            Value::List(vec![
                Value::str(""),
                Value::str("a"),
                Value::str(""),
                Value::str(""),
            ])
        );
    }

    #[test]
    fn map_get_returns_default_for_absent_keys() {
        let source = r#"
fn probe(options) {
    return [options.get("regex_mode", "search"), options.get("missing")];
}
"#;
        let result = call(
            source,
            "probe",
            vec![Value::map([("other", Value::Int(1))])],
        )
        .expect("call");
        assert_eq!(
            result,
            Value::List(vec![Value::str("search"), Value::None])
        );
    }

    #[test]
    fn membership_operator_covers_strings_lists_and_maps() {
        let source = r#"
fn probe(text) {
    return ["|" in text, "a" not in text, 2 in [1, 2], "k" in {"k": 1}];
}
"#;
        let result = call(source, "probe", vec![Value::str("x|y")]).expect("call");
        assert_eq!(
            result,
            Value::List(vec![
                Value::Bool(true),
                Value::Bool(true),
                Value::Bool(true),
                Value::Bool(true),
            ])
        );
    }

    #[test]
    fn top_level_constants_become_globals() {
        let source = r#"
let marker = "regex:";
fn probe(p) { return p.starts_with(marker); }
"#;
        let result = call(source, "probe", vec![Value::str("regex:^a")]).expect("call");
        assert_eq!(result, Value::Bool(true));
    }

    #[test]
    fn unknown_routine_is_a_distinct_fault() {
        let (program, budget) = sandbox_for("fn present() { return 1; }");
        let sandbox = Sandbox::load(&program, budget).expect("load");
        assert!(sandbox.has_routine("present"));
        let error = sandbox.call("absent", Vec::new()).expect_err("must fault");
        assert_eq!(error.code(), "unknown_routine");
    }

    #[test]
    fn assignment_to_undeclared_name_faults() {
        let error = call("fn f() { x = 1; }", "f", Vec::new()).expect_err("must fault");
        assert_eq!(error.code(), "unknown_name");
    }

    #[test]
    fn fresh_namespace_per_call_keeps_results_identical() {
        let source = r#"
fn tally(items) {
    let total = 0;
    for item in items { total = total + item; }
    return total;
}
"#;
        let args = vec![Value::List(vec![Value::Int(1), Value::Int(2)])];
        let first = call(source, "tally", args.clone()).expect("call");
        let second = call(source, "tally", args).expect("call");
        assert_eq!(first, second);
    }
}
