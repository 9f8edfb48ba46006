//! Translation of expression trees into search-language text.
//!
//! [`JqlCompiler`] walks a (partially evaluated) tree once and accumulates:
//!
//! - the filter clause, from `where` predicates
//! - the order clause, from `order_by` / `then_by` key selectors
//! - `startAt` / `maxResults`, from `skip` / `take`, outside the text
//!
//! The final text is the filter followed by the order clause. A compiler
//! holds per-query state and is consumed by [`JqlCompiler::compile`], so each
//! query gets a fresh one.
//!
//! # Example
//!
//! ```
//! use jql::domain::{Entity, Issue};
//! use jql::expr::{pseudo, ExprExt, Query};
//! use jql::query::{Functions, JqlCompiler};
//!
//! let query = Query::of::<Issue>()
//!     .filter(|i| i.field("assignee").equals(pseudo::current_user()))
//!     .order_by(|i| i.field("created"))
//!     .take(50);
//!
//! let functions = Functions::default();
//! let compiled = JqlCompiler::new(Issue::field_table(), &functions)
//!     .compile(query.expr())
//!     .unwrap();
//! assert_eq!(compiled.jql, "assignee = currentUser() order by created");
//! assert_eq!(compiled.max_results, Some(50));
//! ```

use super::evaluator::{receiver, Functions, Interpreter};
use super::literal::{LiteralFormatter, Separator};
use super::methods;
use super::observer::{CompileObserver, NoopObserver};
use crate::errors::JqlError;
use crate::expr::{BinaryOp, Expr, ExprRef, Method, TypeRef, Value};
use crate::fields::{resolve_field, CompareFlags, FieldLookup};
use schemars::JsonSchema;
use serde::Serialize;

/// Output formatting switches
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    /// Emit `(a ORb)` with no space after `OR`, as older clients did
    pub legacy_or_spacing: bool,
    /// Backslash-escape `"` and `\` inside quoted literals
    pub escape_quotes: bool,
}

/// Query text plus the paging side channel
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CompiledQuery {
    pub jql: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub start_at: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_results: Option<u32>,
}

static NOOP: NoopObserver = NoopObserver;

/// Single-use compiler from expression trees to query text
pub struct JqlCompiler<'a> {
    fields: &'a dyn FieldLookup,
    functions: &'a Functions,
    options: CompilerOptions,
    observer: &'a dyn CompileObserver,
    formatter: LiteralFormatter,
    separator: Separator,
    out: String,
    filter: Option<String>,
    order: String,
    start_at: Option<u32>,
    max_results: Option<u32>,
    depth: usize,
}

impl<'a> JqlCompiler<'a> {
    pub fn new(fields: &'a dyn FieldLookup, functions: &'a Functions) -> Self {
        Self {
            fields,
            functions,
            options: CompilerOptions::default(),
            observer: &NOOP,
            formatter: LiteralFormatter::default(),
            separator: Separator::default(),
            out: String::new(),
            filter: None,
            order: String::new(),
            start_at: None,
            max_results: None,
            depth: 0,
        }
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self.formatter = LiteralFormatter::new(options.escape_quotes);
        self
    }

    pub fn with_observer(mut self, observer: &'a dyn CompileObserver) -> Self {
        self.observer = observer;
        self
    }

    /// Compile `expr`. Any error aborts the whole query.
    pub fn compile(mut self, expr: &Expr) -> Result<CompiledQuery, JqlError> {
        self.visit(expr)?;

        // a bare predicate (no `where`) is left in the working buffer
        let mut jql = self.filter.take().unwrap_or_default();
        jql.push_str(&self.out);
        jql.push_str(&self.order);

        let compiled = CompiledQuery {
            jql,
            start_at: self.start_at,
            max_results: self.max_results,
        };
        self.observer.finish(&compiled);
        Ok(compiled)
    }

    fn push(&mut self, fragment: &str) {
        if fragment.is_empty() {
            return;
        }
        self.observer.emit(fragment);
        self.out.push_str(fragment);
    }

    /// Compile into a scratch buffer and return its text
    fn capture(
        &mut self,
        f: impl FnOnce(&mut Self) -> Result<(), JqlError>,
    ) -> Result<String, JqlError> {
        let saved = std::mem::take(&mut self.out);
        let result = f(self);
        let captured = std::mem::replace(&mut self.out, saved);
        result.map(|()| captured)
    }

    fn visit(&mut self, expr: &Expr) -> Result<(), JqlError> {
        self.observer.enter(expr, self.depth);
        self.depth += 1;
        let result = self.dispatch(expr);
        self.depth -= 1;
        result
    }

    fn dispatch(&mut self, expr: &Expr) -> Result<(), JqlError> {
        if let Some((value, ty)) = expr.as_constant() {
            return self.visit_constant(value, ty);
        }
        match expr {
            Expr::Binary { op, left, right } => self.visit_binary(*op, left, right),
            Expr::Call {
                target,
                method,
                args,
            } => self.visit_call(expr, target.as_ref(), method, args),
            Expr::Member { member, .. } => {
                let fields = self.fields;
                if let Some(descriptor) = fields.lookup(member) {
                    self.push(&descriptor.remote_name);
                    return Ok(());
                }
                // not a field: a captured value reached through member syntax
                match Interpreter::new(self.functions).eval(expr) {
                    Ok(value) => {
                        let ty = match expr.static_type() {
                            TypeRef::Any => value.type_of(),
                            declared => declared,
                        };
                        self.visit_constant(&value, &ty)
                    }
                    Err(err) if err.is_unsupported() => Err(JqlError::Schema(format!(
                        "'{}' is not a searchable field",
                        member
                    ))),
                    Err(err) => Err(JqlError::Evaluation(err)),
                }
            }
            Expr::New { constructor, args } => self.visit_new(constructor, args),
            Expr::Convert { operand, .. } | Expr::Quote { operand } => self.visit(operand),
            Expr::Lambda { body, .. } => self.visit(body),
            Expr::Parameter(param) => Err(JqlError::unsupported(
                param.name.as_str(),
                "a bare parameter has no query-language translation",
            )),
            Expr::Constant { value, ty } => self.visit_constant(value, ty),
        }
    }

    fn visit_constant(&mut self, value: &Value, ty: &TypeRef) -> Result<(), JqlError> {
        match value {
            Value::Source(_) | Value::Null => {}
            Value::Array(items) => {
                if !items.is_empty() {
                    let lead = self.separator.next();
                    let rendered = self
                        .formatter
                        .array(items, &ty.element_type(), &mut self.separator);
                    self.push(lead);
                    self.push(&rendered);
                }
            }
            scalar => {
                let lead = self.separator.next();
                let literal = self.formatter.scalar(scalar, ty);
                self.push(lead);
                self.push(&literal);
            }
        }
        Ok(())
    }

    fn visit_binary(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> Result<(), JqlError> {
        match op {
            BinaryOp::And | BinaryOp::AndAlso => {
                self.push("(");
                self.visit(left)?;
                self.push(" AND ");
                self.visit(right)?;
                self.push(")");
                Ok(())
            }
            BinaryOp::Or | BinaryOp::OrElse => {
                self.push("(");
                self.visit(left)?;
                self.push(if self.options.legacy_or_spacing {
                    " OR"
                } else {
                    " OR "
                });
                self.visit(right)?;
                self.push(")");
                Ok(())
            }
            BinaryOp::Equal => self.visit_equality(false, left, right),
            BinaryOp::NotEqual => self.visit_equality(true, left, right),
            BinaryOp::LessThan
            | BinaryOp::LessThanOrEqual
            | BinaryOp::GreaterThan
            | BinaryOp::GreaterThanOrEqual => {
                let operator = match op {
                    BinaryOp::LessThan => " < ",
                    BinaryOp::LessThanOrEqual => " <= ",
                    BinaryOp::GreaterThan => " > ",
                    _ => " >= ",
                };
                self.visit(left)?;
                self.push(operator);
                self.separator.reset();
                self.visit(right)
            }
            other => Err(JqlError::unsupported(
                other.name(),
                "operator has no query-language translation",
            )),
        }
    }

    fn visit_equality(&mut self, negated: bool, left: &Expr, right: &Expr) -> Result<(), JqlError> {
        let field = resolve_field(left, self.fields)?;
        if let Some((Value::Array(_), _)) = right.as_constant() {
            let symbol = if negated { BinaryOp::NotEqual } else { BinaryOp::Equal };
            return Err(JqlError::unsupported(
                symbol.name(),
                "a list operand needs in / not_in",
            ));
        }
        self.visit(left)?;

        let date_field = field.ty.is_date() || left.static_type().is_date();
        let suffix = match right.as_constant() {
            Some((Value::Null, ty)) if date_field || ty.is_date() => {
                Some(if negated { " is not empty" } else { " is empty" })
            }
            Some((Value::Null, _)) => Some(if negated { " is not null" } else { " is null" }),
            Some((Value::Str(s), _)) if s.is_empty() => {
                Some(if negated { " is not empty" } else { " is empty" })
            }
            _ => None,
        };
        if let Some(suffix) = suffix {
            self.push(suffix);
            return Ok(());
        }

        let operator = match (field.allows(CompareFlags::CONTAINS), negated) {
            (true, false) => " ~ ",
            (true, true) => " !~ ",
            (false, false) => " = ",
            (false, true) => " != ",
        };
        self.push(operator);
        self.separator.reset();
        self.visit(right)
    }

    fn visit_new(&mut self, constructor: &str, args: &[ExprRef]) -> Result<(), JqlError> {
        let values = args
            .iter()
            .map(|arg| {
                arg.as_constant().map(|(value, _)| value.clone()).ok_or_else(|| {
                    JqlError::unsupported(constructor, "constructor arguments must be constants")
                })
            })
            .collect::<Result<Vec<_>, _>>()?;
        let value = self
            .functions
            .construct(constructor, &values)
            .map_err(|err| {
                if err.is_unsupported() {
                    JqlError::unsupported(constructor, "no constructor registered under this name")
                } else {
                    JqlError::Evaluation(err)
                }
            })?;
        let ty = value.type_of();
        self.visit_constant(&value, &ty)
    }

    fn visit_call(
        &mut self,
        call: &Expr,
        target: Option<&ExprRef>,
        method: &Method,
        args: &[ExprRef],
    ) -> Result<(), JqlError> {
        let name = method.name.as_str();
        if method.remote {
            if name == methods::CUSTOM_FIELD {
                let field = resolve_field(call, self.fields)?;
                self.push(&field.remote_name);
                return Ok(());
            }
            return self.visit_remote_function(name, target, args);
        }

        match name {
            methods::WHERE => self.visit_where(target, args),
            methods::ORDER_BY
            | methods::ORDER_BY_DESCENDING
            | methods::THEN_BY
            | methods::THEN_BY_DESCENDING => self.visit_ordering(name, target, args),
            methods::SKIP | methods::TAKE => self.visit_paging(name, target, args),
            methods::IS_EMPTY | methods::IS_NOT_EMPTY | methods::IS_NULL | methods::IS_NOT_NULL => {
                let (subject, _) = split_receiver(name, target, args)?;
                self.visit(subject)?;
                self.push(match name {
                    methods::IS_EMPTY => " is empty",
                    methods::IS_NOT_EMPTY => " is not empty",
                    methods::IS_NULL => " is null",
                    _ => " is not null",
                });
                Ok(())
            }
            methods::IN | methods::NOT_IN | methods::WAS_IN | methods::WAS_NOT_IN => {
                self.visit_membership(name, target, args)
            }
            methods::WAS | methods::WAS_NOT | methods::CHANGED => {
                self.visit_history(name, target, args)
            }
            methods::DURING
            | methods::AFTER
            | methods::BEFORE
            | methods::BY
            | methods::ON
            | methods::FROM
            | methods::TO => self.visit_qualifier(name, target, args),
            _ if methods::is_in_memory(name) => {
                // applied to the results after the search
                let (source, _) = split_receiver(name, target, args)?;
                self.visit(source)
            }
            _ => Err(JqlError::unsupported(
                name,
                "method has no query-language translation",
            )),
        }
    }

    fn visit_where(&mut self, target: Option<&ExprRef>, args: &[ExprRef]) -> Result<(), JqlError> {
        let (source, rest) = split_receiver(methods::WHERE, target, args)?;
        self.visit(source)?;

        let predicate = rest
            .first()
            .ok_or_else(|| JqlError::unsupported(methods::WHERE, "missing predicate"))?;
        self.separator.reset();
        let clause = self.capture(|c| c.visit(predicate.lambda_body()))?;

        self.filter = Some(match self.filter.take() {
            Some(previous) => format!("({} AND {})", previous, clause),
            None => clause,
        });
        Ok(())
    }

    fn visit_ordering(
        &mut self,
        name: &str,
        target: Option<&ExprRef>,
        args: &[ExprRef],
    ) -> Result<(), JqlError> {
        let (source, rest) = split_receiver(name, target, args)?;
        self.visit(source)?;

        let key = rest
            .first()
            .ok_or_else(|| JqlError::unsupported(name, "missing key selector"))?;
        let key = self.capture(|c| c.visit(key.lambda_body()))?;

        let then = matches!(name, methods::THEN_BY | methods::THEN_BY_DESCENDING);
        let mut order = if then && !self.order.is_empty() {
            format!("{}, {}", self.order, key)
        } else {
            format!(" order by {}", key)
        };
        if matches!(name, methods::ORDER_BY_DESCENDING | methods::THEN_BY_DESCENDING) {
            order.push_str(" desc");
        }
        self.order = order;
        Ok(())
    }

    fn visit_paging(
        &mut self,
        name: &str,
        target: Option<&ExprRef>,
        args: &[ExprRef],
    ) -> Result<(), JqlError> {
        let (source, rest) = split_receiver(name, target, args)?;
        self.visit(source)?;

        let count = rest
            .first()
            .and_then(|arg| arg.as_constant())
            .and_then(|(value, _)| value.as_int())
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| {
                JqlError::unsupported(name, "expected a constant non-negative integer")
            })?;

        let slot = if name == methods::SKIP {
            &mut self.start_at
        } else {
            &mut self.max_results
        };
        if slot.is_some() {
            return Err(JqlError::unsupported(name, "may appear at most once per query"));
        }
        *slot = Some(count);
        Ok(())
    }

    fn visit_membership(
        &mut self,
        name: &str,
        target: Option<&ExprRef>,
        args: &[ExprRef],
    ) -> Result<(), JqlError> {
        let (field, items) = split_receiver(name, target, args)?;
        let all_empty = items
            .iter()
            .all(|item| matches!(item.as_constant(), Some((Value::Array(values), _)) if values.is_empty()));
        if all_empty {
            return Err(JqlError::unsupported(name, "expected at least one value"));
        }

        self.visit(field)?;
        self.push(match name {
            methods::IN => " in (",
            methods::NOT_IN => " not in (",
            methods::WAS_IN => " was in (",
            _ => " was not in (",
        });
        self.separator.reset();
        for item in items {
            // constants place their own separator
            if item.as_constant().is_none() {
                let lead = self.separator.next();
                self.push(lead);
            }
            self.visit(item)?;
        }
        self.push(")");
        Ok(())
    }

    fn visit_history(
        &mut self,
        name: &str,
        target: Option<&ExprRef>,
        args: &[ExprRef],
    ) -> Result<(), JqlError> {
        let (field, rest) = split_receiver(name, target, args)?;
        self.visit(field)?;

        let qualifiers = if name == methods::CHANGED {
            self.push(" changed");
            rest
        } else {
            let (value, qualifiers) = rest
                .split_first()
                .ok_or_else(|| JqlError::unsupported(name, "expected a value"))?;
            self.push(if name == methods::WAS { " was " } else { " was not " });
            self.separator.reset();
            if matches!(value.as_constant(), Some((Value::Null, _))) {
                self.push("empty");
            } else {
                self.visit(value)?;
            }
            qualifiers
        };

        for qualifier in qualifiers {
            self.push(" ");
            self.separator.reset();
            self.visit(qualifier)?;
        }
        Ok(())
    }

    /// `during (a b)`, `after x`, `by x`, ... optionally preceded by the
    /// predicate they qualify
    fn visit_qualifier(
        &mut self,
        name: &str,
        target: Option<&ExprRef>,
        args: &[ExprRef],
    ) -> Result<(), JqlError> {
        let arity = if name == methods::DURING { 2 } else { 1 };
        let (subject, bounds) = match target {
            Some(target) => (Some(target), args),
            None if args.len() > arity => (args.first(), &args[1..]),
            None => (None, args),
        };
        if bounds.len() != arity {
            return Err(JqlError::unsupported(
                name,
                format!("expected {} argument(s), got {}", arity, bounds.len()),
            ));
        }

        if let Some(subject) = subject {
            self.visit(subject)?;
            self.push(" ");
        }
        self.push(name);
        self.push(" ");
        self.separator.reset();

        if name == methods::DURING {
            // no separator of its own between the bounds
            self.push("(");
            self.visit(&bounds[0])?;
            self.visit(&bounds[1])?;
            self.push(")");
            Ok(())
        } else {
            self.visit(&bounds[0])
        }
    }

    fn visit_remote_function(
        &mut self,
        name: &str,
        target: Option<&ExprRef>,
        args: &[ExprRef],
    ) -> Result<(), JqlError> {
        let operands: Vec<&ExprRef> = target.into_iter().chain(args.iter()).collect();
        if operands.len() > 1 {
            return Err(JqlError::unsupported(
                name,
                "remote functions take at most one argument",
            ));
        }

        self.push(methods::remote_function_name(name).unwrap_or(name));
        self.push("(");
        if let Some(arg) = operands.first() {
            self.separator.reset();
            self.visit(arg)?;
        }
        self.push(")");
        Ok(())
    }
}

fn split_receiver<'e>(
    name: &str,
    target: Option<&'e ExprRef>,
    args: &'e [ExprRef],
) -> Result<(&'e Expr, &'e [ExprRef]), JqlError> {
    receiver(target, args).ok_or_else(|| JqlError::unsupported(name, "missing receiver"))
}
