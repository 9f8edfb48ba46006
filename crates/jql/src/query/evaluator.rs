//! Local evaluation of expression trees.
//!
//! The [`Interpreter`] walks a tree and produces a [`Value`]. It serves two
//! purposes: folding closed subtrees to constants before translation, and
//! running the in-memory operators (`select`, `count`, ...) over search
//! results once they have been spliced back into the tree.
//!
//! Anything that cannot run locally (remote pseudo-functions, the remote
//! source, unbound parameters, unknown functions) yields
//! [`EvalError::Unsupported`]. Callers treat that as "leave this subtree to the
//! compiler"; every other error is a genuine failure.

use super::methods;
use crate::expr::{BinaryOp, Expr, ExprRef, TypeRef, Value};
use chrono::{NaiveDate, NaiveDateTime};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by local evaluation
#[derive(Debug, Clone, Error, PartialEq)]
pub enum EvalError {
    /// The subtree cannot be evaluated in-process
    #[error("cannot evaluate {0} locally")]
    Unsupported(String),

    #[error("type mismatch in {operation}: {detail}")]
    TypeMismatch { operation: String, detail: String },

    #[error("division by zero")]
    DivisionByZero,

    #[error("function '{name}' failed: {message}")]
    Function { name: String, message: String },
}

impl EvalError {
    pub fn is_unsupported(&self) -> bool {
        matches!(self, EvalError::Unsupported(_))
    }

    fn mismatch(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        EvalError::TypeMismatch {
            operation: operation.into(),
            detail: detail.into(),
        }
    }
}

/// A local function or constructor
pub type LocalFn = Arc<dyn Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync>;

/// Registry of functions and constructors the interpreter may invoke.
///
/// Instance-style calls receive their target as the first argument.
#[derive(Clone)]
pub struct Functions {
    methods: HashMap<String, LocalFn>,
    constructors: HashMap<String, LocalFn>,
}

impl Default for Functions {
    fn default() -> Self {
        let mut functions = Self::empty();
        functions
            .register("to_upper", |args| {
                Ok(Value::Str(str_arg("to_upper", args, 0)?.to_uppercase()))
            })
            .register("to_lower", |args| {
                Ok(Value::Str(str_arg("to_lower", args, 0)?.to_lowercase()))
            })
            .register("trim", |args| {
                Ok(Value::Str(str_arg("trim", args, 0)?.trim().to_string()))
            })
            .register("to_string", |args| {
                Ok(Value::Str(arg("to_string", args, 0)?.to_string()))
            })
            .register("concat", |args| {
                Ok(Value::Str(args.iter().map(|a| a.to_string()).collect()))
            })
            .register("len", |args| match arg("len", args, 0)? {
                Value::Str(s) => Ok(Value::Int(s.chars().count() as i64)),
                Value::Array(items) => Ok(Value::Int(items.len() as i64)),
                other => Err(EvalError::mismatch("len", format!("{} has no length", other.kind()))),
            })
            .register("starts_with", |args| {
                let text = str_arg("starts_with", args, 0)?;
                let prefix = str_arg("starts_with", args, 1)?;
                Ok(Value::Bool(text.starts_with(prefix)))
            })
            .register("add_days", |args| match arg("add_days", args, 0)? {
                Value::Date(date) => add_days(*date, int_arg("add_days", args, 1)?),
                other => Err(EvalError::mismatch("add_days", format!("expected date, got {}", other.kind()))),
            });
        functions
            .register_constructor("date", |args| {
                let date = ymd("date", args)?;
                Ok(Value::from(date))
            })
            .register_constructor("date_time", |args| {
                let date = ymd("date_time", args)?;
                let (h, mi, s) = (
                    int_arg("date_time", args, 3)?,
                    int_arg("date_time", args, 4)?,
                    int_arg("date_time", args, 5)?,
                );
                let time = u32::try_from(h)
                    .ok()
                    .zip(u32::try_from(mi).ok())
                    .zip(u32::try_from(s).ok())
                    .and_then(|((h, mi), s)| date.and_hms_opt(h, mi, s))
                    .ok_or_else(|| function_error("date_time", "invalid time of day"))?;
                Ok(Value::Date(time))
            });
        functions
    }
}

impl fmt::Debug for Functions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut methods: Vec<_> = self.methods.keys().collect();
        methods.sort();
        let mut constructors: Vec<_> = self.constructors.keys().collect();
        constructors.sort();
        f.debug_struct("Functions")
            .field("methods", &methods)
            .field("constructors", &constructors)
            .finish()
    }
}

impl Functions {
    /// Registry without the built-ins
    pub fn empty() -> Self {
        Self {
            methods: HashMap::new(),
            constructors: HashMap::new(),
        }
    }

    pub fn register<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.methods.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn register_constructor<F>(&mut self, name: &str, f: F) -> &mut Self
    where
        F: Fn(&[Value]) -> Result<Value, EvalError> + Send + Sync + 'static,
    {
        self.constructors.insert(name.to_string(), Arc::new(f));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.methods.contains_key(name)
    }

    pub fn call(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match self.methods.get(name) {
            Some(f) => f(args),
            None => Err(EvalError::Unsupported(format!("function '{}'", name))),
        }
    }

    pub fn construct(&self, name: &str, args: &[Value]) -> Result<Value, EvalError> {
        match self.constructors.get(name) {
            Some(f) => f(args),
            None => Err(EvalError::Unsupported(format!("constructor '{}'", name))),
        }
    }
}

fn function_error(name: &str, message: impl Into<String>) -> EvalError {
    EvalError::Function {
        name: name.to_string(),
        message: message.into(),
    }
}

fn arg<'v>(name: &str, args: &'v [Value], index: usize) -> Result<&'v Value, EvalError> {
    args.get(index)
        .ok_or_else(|| function_error(name, format!("missing argument {}", index + 1)))
}

fn str_arg<'v>(name: &str, args: &'v [Value], index: usize) -> Result<&'v str, EvalError> {
    match arg(name, args, index)? {
        Value::Str(s) => Ok(s),
        other => Err(EvalError::mismatch(name, format!("expected string, got {}", other.kind()))),
    }
}

fn int_arg(name: &str, args: &[Value], index: usize) -> Result<i64, EvalError> {
    match arg(name, args, index)? {
        Value::Int(i) => Ok(*i),
        other => Err(EvalError::mismatch(name, format!("expected int, got {}", other.kind()))),
    }
}

fn ymd(name: &str, args: &[Value]) -> Result<NaiveDate, EvalError> {
    let (y, m, d) = (int_arg(name, args, 0)?, int_arg(name, args, 1)?, int_arg(name, args, 2)?);
    i32::try_from(y)
        .ok()
        .zip(u32::try_from(m).ok())
        .zip(u32::try_from(d).ok())
        .and_then(|((y, m), d)| NaiveDate::from_ymd_opt(y, m, d))
        .ok_or_else(|| function_error(name, format!("invalid date {}-{}-{}", y, m, d)))
}

fn add_days(date: NaiveDateTime, days: i64) -> Result<Value, EvalError> {
    chrono::Duration::try_days(days)
        .and_then(|delta| date.checked_add_signed(delta))
        .map(Value::Date)
        .ok_or_else(|| function_error("add_days", "date out of range"))
}

/// Lambda parameter bindings, innermost first
struct Scope<'s> {
    name: &'s str,
    value: &'s Value,
    parent: Option<&'s Scope<'s>>,
}

impl<'s> Scope<'s> {
    fn get(&self, name: &str) -> Option<&'s Value> {
        if self.name == name {
            Some(self.value)
        } else {
            self.parent.and_then(|parent| parent.get(name))
        }
    }
}

/// Tree-walking evaluator
pub struct Interpreter<'a> {
    functions: &'a Functions,
}

impl<'a> Interpreter<'a> {
    pub fn new(functions: &'a Functions) -> Self {
        Self { functions }
    }

    /// Evaluate a closed expression
    pub fn eval(&self, expr: &Expr) -> Result<Value, EvalError> {
        self.eval_in(expr, None)
    }

    fn eval_in(&self, expr: &Expr, scope: Option<&Scope<'_>>) -> Result<Value, EvalError> {
        match expr {
            Expr::Constant { value, .. } => match value {
                Value::Source(source) => Err(EvalError::Unsupported(format!(
                    "the remote {} source",
                    source.entity
                ))),
                other => Ok(other.clone()),
            },
            Expr::Parameter(param) => scope
                .and_then(|s| s.get(&param.name))
                .cloned()
                .ok_or_else(|| EvalError::Unsupported(format!("unbound parameter '{}'", param.name))),
            Expr::Member { target, member, .. } => match self.eval_in(target, scope)? {
                Value::Record(record) => record
                    .get(&member.name)
                    .cloned()
                    .ok_or_else(|| EvalError::Unsupported(format!("member '{}'", member))),
                other => Err(EvalError::mismatch(
                    format!("member '{}'", member),
                    format!("target is {}", other.kind()),
                )),
            },
            Expr::Convert { operand, ty } => convert(self.eval_in(operand, scope)?, ty),
            Expr::Binary { op, left, right } => self.eval_binary(*op, left, right, scope),
            Expr::Call {
                target,
                method,
                args,
            } => {
                if method.remote {
                    return Err(EvalError::Unsupported(format!(
                        "remote function '{}'",
                        method.name
                    )));
                }
                if is_sequence_operator(&method.name) {
                    return self.eval_sequence(expr, &method.name, target.as_ref(), args, scope);
                }
                let values = target
                    .iter()
                    .chain(args.iter())
                    .map(|e| self.eval_in(e, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions.call(&method.name, &values)
            }
            Expr::New { constructor, args } => {
                let values = args
                    .iter()
                    .map(|e| self.eval_in(e, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                self.functions.construct(constructor, &values)
            }
            Expr::Lambda { .. } | Expr::Quote { .. } => {
                Err(EvalError::Unsupported("a lambda as a value".to_string()))
            }
        }
    }

    fn eval_binary(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        scope: Option<&Scope<'_>>,
    ) -> Result<Value, EvalError> {
        match op {
            BinaryOp::And | BinaryOp::AndAlso => {
                if !self.eval_bool(op, left, scope)? {
                    return Ok(Value::Bool(false));
                }
                Ok(Value::Bool(self.eval_bool(op, right, scope)?))
            }
            BinaryOp::Or | BinaryOp::OrElse => {
                if self.eval_bool(op, left, scope)? {
                    return Ok(Value::Bool(true));
                }
                Ok(Value::Bool(self.eval_bool(op, right, scope)?))
            }
            _ => {
                let l = self.eval_in(left, scope)?;
                let r = self.eval_in(right, scope)?;
                match op {
                    BinaryOp::Equal => Ok(Value::Bool(l.loosely_equals(&r))),
                    BinaryOp::NotEqual => Ok(Value::Bool(!l.loosely_equals(&r))),
                    BinaryOp::LessThan
                    | BinaryOp::LessThanOrEqual
                    | BinaryOp::GreaterThan
                    | BinaryOp::GreaterThanOrEqual => relational(op, &l, &r),
                    _ => arithmetic(op, l, r),
                }
            }
        }
    }

    fn eval_bool(&self, op: BinaryOp, expr: &Expr, scope: Option<&Scope<'_>>) -> Result<bool, EvalError> {
        let value = self.eval_in(expr, scope)?;
        value
            .as_bool()
            .ok_or_else(|| EvalError::mismatch(op.name(), format!("expected bool, got {}", value.kind())))
    }

    /// Apply a one-parameter (possibly quoted) lambda to `arg`
    fn apply(&self, lambda: &Expr, arg: &Value, scope: Option<&Scope<'_>>) -> Result<Value, EvalError> {
        let (params, body) = match lambda {
            Expr::Quote { operand } => return self.apply(operand, arg, scope),
            Expr::Lambda { params, body } => (params, body),
            other => {
                return Err(EvalError::mismatch(
                    "lambda application",
                    format!("{} is not a lambda", other.kind()),
                ))
            }
        };
        let param = params
            .first()
            .ok_or_else(|| EvalError::mismatch("lambda application", "lambda has no parameter"))?;
        let inner = Scope {
            name: &param.name,
            value: arg,
            parent: scope,
        };
        self.eval_in(body, Some(&inner))
    }

    fn eval_sequence(
        &self,
        call: &Expr,
        name: &str,
        target: Option<&ExprRef>,
        args: &[ExprRef],
        scope: Option<&Scope<'_>>,
    ) -> Result<Value, EvalError> {
        if matches!(
            name,
            methods::ORDER_BY
                | methods::ORDER_BY_DESCENDING
                | methods::THEN_BY
                | methods::THEN_BY_DESCENDING
        ) {
            return self.eval_ordering(call, scope);
        }

        let (source, rest) = receiver(target, args)
            .ok_or_else(|| EvalError::mismatch(name, "missing source sequence"))?;
        let items = self.sequence(name, source, scope)?;
        let lambda = rest.first();

        match name {
            methods::WHERE => {
                let predicate = lambda.ok_or_else(|| EvalError::mismatch(name, "missing predicate"))?;
                let mut kept = Vec::new();
                for item in items {
                    if self.test(name, predicate, &item, scope)? {
                        kept.push(item);
                    }
                }
                Ok(Value::Array(kept))
            }
            methods::SELECT => {
                let projection =
                    lambda.ok_or_else(|| EvalError::mismatch(name, "missing projection"))?;
                items
                    .iter()
                    .map(|item| self.apply(projection, item, scope))
                    .collect::<Result<Vec<_>, _>>()
                    .map(Value::Array)
            }
            methods::SKIP | methods::TAKE => {
                let count = lambda
                    .map(|e| self.eval_in(e, scope))
                    .transpose()?
                    .and_then(|v| v.as_int())
                    .and_then(|n| usize::try_from(n).ok())
                    .ok_or_else(|| EvalError::mismatch(name, "expected a non-negative count"))?;
                let paged = if name == methods::SKIP {
                    items.into_iter().skip(count).collect()
                } else {
                    items.into_iter().take(count).collect()
                };
                Ok(Value::Array(paged))
            }
            methods::COUNT => {
                let matching = self.filtered(name, items, lambda, scope)?;
                Ok(Value::Int(matching.len() as i64))
            }
            methods::ANY => {
                let matching = self.filtered(name, items, lambda, scope)?;
                Ok(Value::Bool(!matching.is_empty()))
            }
            methods::FIRST => self
                .filtered(name, items, lambda, scope)?
                .into_iter()
                .next()
                .ok_or_else(|| function_error(name, "sequence contains no elements")),
            methods::FIRST_OR_DEFAULT => Ok(self
                .filtered(name, items, lambda, scope)?
                .into_iter()
                .next()
                .unwrap_or(Value::Null)),
            methods::TO_LIST => Ok(Value::Array(items)),
            methods::DISTINCT => {
                let mut unique: Vec<Value> = Vec::new();
                for item in items {
                    if !unique.iter().any(|u| u.loosely_equals(&item)) {
                        unique.push(item);
                    }
                }
                Ok(Value::Array(unique))
            }
            other => Err(EvalError::Unsupported(format!("sequence operator '{}'", other))),
        }
    }

    /// Sort by the whole `order_by(..).then_by(..)` chain ending at `call`
    fn eval_ordering(&self, call: &Expr, scope: Option<&Scope<'_>>) -> Result<Value, EvalError> {
        let mut keys: Vec<(&Expr, bool)> = Vec::new();
        let mut current = call;
        let source = loop {
            let Expr::Call {
                target,
                method,
                args,
            } = current
            else {
                break current;
            };
            let descending = match method.name.as_str() {
                methods::THEN_BY | methods::ORDER_BY => false,
                methods::THEN_BY_DESCENDING | methods::ORDER_BY_DESCENDING => true,
                _ => break current,
            };
            let (source, rest) = receiver(target.as_ref(), args)
                .ok_or_else(|| EvalError::mismatch(method.name.as_str(), "missing source sequence"))?;
            let key = rest
                .first()
                .ok_or_else(|| EvalError::mismatch(method.name.as_str(), "missing key selector"))?;
            keys.push((key, descending));
            current = source;
            if matches!(
                method.name.as_str(),
                methods::ORDER_BY | methods::ORDER_BY_DESCENDING
            ) {
                break current;
            }
        };
        keys.reverse();

        let items = self.sequence(methods::ORDER_BY, source, scope)?;
        let mut keyed = items
            .into_iter()
            .map(|item| -> Result<(Vec<Value>, Value), EvalError> {
                let item_keys = keys
                    .iter()
                    .map(|(key, _)| self.apply(key, &item, scope))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((item_keys, item))
            })
            .collect::<Result<Vec<_>, EvalError>>()?;

        keyed.sort_by(|(a, _), (b, _)| {
            for (i, (_, descending)) in keys.iter().enumerate() {
                let ordering = a[i].compare(&b[i]);
                let ordering = if *descending { ordering.reverse() } else { ordering };
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        Ok(Value::Array(keyed.into_iter().map(|(_, item)| item).collect()))
    }

    fn sequence(&self, operation: &str, source: &Expr, scope: Option<&Scope<'_>>) -> Result<Vec<Value>, EvalError> {
        match self.eval_in(source, scope)? {
            Value::Array(items) => Ok(items),
            other => Err(EvalError::mismatch(
                operation,
                format!("expected a sequence, got {}", other.kind()),
            )),
        }
    }

    fn test(&self, operation: &str, predicate: &Expr, item: &Value, scope: Option<&Scope<'_>>) -> Result<bool, EvalError> {
        let result = self.apply(predicate, item, scope)?;
        result.as_bool().ok_or_else(|| {
            EvalError::mismatch(operation, format!("predicate returned {}", result.kind()))
        })
    }

    fn filtered(
        &self,
        operation: &str,
        items: Vec<Value>,
        predicate: Option<&ExprRef>,
        scope: Option<&Scope<'_>>,
    ) -> Result<Vec<Value>, EvalError> {
        let Some(predicate) = predicate else {
            return Ok(items);
        };
        let mut kept = Vec::new();
        for item in items {
            if self.test(operation, predicate, &item, scope)? {
                kept.push(item);
            }
        }
        Ok(kept)
    }
}

fn is_sequence_operator(name: &str) -> bool {
    methods::is_translated(name) || methods::is_in_memory(name)
}

/// Split a call into its receiver and remaining arguments
pub(crate) fn receiver<'e>(
    target: Option<&'e ExprRef>,
    args: &'e [ExprRef],
) -> Option<(&'e Expr, &'e [ExprRef])> {
    match target {
        Some(target) => Some((target.as_ref(), args)),
        None => args.split_first().map(|(first, rest)| (first.as_ref(), rest)),
    }
}

fn convert(value: Value, ty: &TypeRef) -> Result<Value, EvalError> {
    let out_of_range = |i: i64| EvalError::mismatch("convert", format!("{} does not fit {:?}", i, ty));
    match (ty.underlying(), value) {
        (_, Value::Null) => Ok(Value::Null),
        (TypeRef::Float, Value::Int(i)) => Ok(Value::Float(i as f64)),
        (TypeRef::Int16, Value::Int(i)) => i16::try_from(i).map(|_| Value::Int(i)).map_err(|_| out_of_range(i)),
        (TypeRef::Int32, Value::Int(i)) => i32::try_from(i).map(|_| Value::Int(i)).map_err(|_| out_of_range(i)),
        (TypeRef::Int16 | TypeRef::Int32 | TypeRef::Int64, Value::Float(f)) => {
            Ok(Value::Int(f.trunc() as i64))
        }
        (TypeRef::String, Value::Str(s)) => Ok(Value::Str(s)),
        (TypeRef::String, other) => Ok(Value::Str(other.to_string())),
        (_, other) => Ok(other),
    }
}

fn relational(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, EvalError> {
    if l.is_null() || r.is_null() {
        return Ok(Value::Bool(false));
    }
    let comparable = matches!(
        (l, r),
        (Value::Int(_) | Value::Float(_), Value::Int(_) | Value::Float(_))
            | (Value::Str(_), Value::Str(_))
            | (Value::Date(_), Value::Date(_))
    );
    if !comparable {
        return Err(EvalError::mismatch(
            op.name(),
            format!("cannot compare {} with {}", l.kind(), r.kind()),
        ));
    }
    let ordering = l.compare(r);
    let result = match op {
        BinaryOp::LessThan => ordering == Ordering::Less,
        BinaryOp::LessThanOrEqual => ordering != Ordering::Greater,
        BinaryOp::GreaterThan => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    };
    Ok(Value::Bool(result))
}

fn arithmetic(op: BinaryOp, l: Value, r: Value) -> Result<Value, EvalError> {
    match (op, l, r) {
        (BinaryOp::Add, Value::Str(a), b) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Add, a, Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (BinaryOp::Add, Value::Date(d), Value::Int(days)) => add_days(d, days),
        (BinaryOp::Subtract, Value::Date(d), Value::Int(days)) => match days.checked_neg() {
            Some(days) => add_days(d, days),
            None => Err(function_error("add_days", "date out of range")),
        },
        (op, Value::Int(a), Value::Int(b)) => integer_arithmetic(op, a, b),
        (op, Value::Int(a), Value::Float(b)) => float_arithmetic(op, a as f64, b),
        (op, Value::Float(a), Value::Int(b)) => float_arithmetic(op, a, b as f64),
        (op, Value::Float(a), Value::Float(b)) => float_arithmetic(op, a, b),
        (op, a, b) => Err(EvalError::mismatch(
            op.name(),
            format!("cannot apply to {} and {}", a.kind(), b.kind()),
        )),
    }
}

fn integer_arithmetic(op: BinaryOp, a: i64, b: i64) -> Result<Value, EvalError> {
    if matches!(op, BinaryOp::Divide | BinaryOp::Modulo) && b == 0 {
        return Err(EvalError::DivisionByZero);
    }
    let result = match op {
        BinaryOp::Add => a.checked_add(b),
        BinaryOp::Subtract => a.checked_sub(b),
        BinaryOp::Multiply => a.checked_mul(b),
        BinaryOp::Divide => a.checked_div(b),
        BinaryOp::Modulo => a.checked_rem(b),
        other => return Err(EvalError::mismatch(other.name(), "not an arithmetic operator")),
    };
    result
        .map(Value::Int)
        .ok_or_else(|| EvalError::mismatch(op.name(), "integer overflow"))
}

fn float_arithmetic(op: BinaryOp, a: f64, b: f64) -> Result<Value, EvalError> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Subtract => a - b,
        BinaryOp::Multiply => a * b,
        BinaryOp::Divide => a / b,
        BinaryOp::Modulo => a % b,
        other => return Err(EvalError::mismatch(other.name(), "not an arithmetic operator")),
    };
    Ok(Value::Float(result))
}
