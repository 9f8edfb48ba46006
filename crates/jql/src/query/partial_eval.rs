//! Constant folding of closed subtrees.
//!
//! Two passes over the tree:
//!
//! 1. The nominator walks bottom-up and collects every node that depends
//!    neither on a lambda parameter nor on the remote search source.
//! 2. The subtree evaluator walks top-down. At the first nominated node of a
//!    branch it stops and replaces the whole subtree with its value.
//!
//! Constants and remote pseudo-function calls are never evaluated: the former
//! are already values, the latter only exist on the search server (their
//! arguments are still folded). A subtree the interpreter reports as
//! [`EvalError::Unsupported`] is left in place and its children are folded
//! individually instead.

use super::evaluator::{EvalError, Functions, Interpreter};
use crate::errors::JqlError;
use crate::expr::{map_children, Expr, ExprRef, TypeRef, Value};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::trace;

/// Node identities (Arc pointers) safe to fold
type Candidates = HashSet<*const Expr>;

struct Nominator {
    candidates: Candidates,
}

impl Nominator {
    fn nominate(expr: &ExprRef) -> Candidates {
        let mut nominator = Self {
            candidates: HashSet::new(),
        };
        nominator.visit(expr);
        nominator.candidates
    }

    /// Returns whether `expr` can be evaluated without the bound parameter
    fn visit(&mut self, expr: &ExprRef) -> bool {
        let mut closed = true;
        for child in expr.children() {
            // every child is visited so closed subtrees under an open parent
            // are still nominated
            closed &= self.visit(child);
        }
        let closed = closed
            && !matches!(
                expr.as_ref(),
                Expr::Parameter(_)
                    | Expr::Constant {
                        value: Value::Source(_),
                        ..
                    }
            );
        if closed {
            self.candidates.insert(Arc::as_ptr(expr));
        }
        closed
    }
}

struct SubtreeEvaluator<'a> {
    candidates: Candidates,
    interpreter: Interpreter<'a>,
}

impl SubtreeEvaluator<'_> {
    fn visit(&self, expr: &ExprRef) -> Result<ExprRef, JqlError> {
        if self.candidates.contains(&Arc::as_ptr(expr)) {
            self.fold(expr)
        } else {
            map_children(expr, |child| self.visit(child))
        }
    }

    fn fold(&self, expr: &ExprRef) -> Result<ExprRef, JqlError> {
        match expr.as_ref() {
            Expr::Constant { .. } => Ok(expr.clone()),
            Expr::Call { method, .. } if method.remote => {
                map_children(expr, |child| self.visit(child))
            }
            _ => match self.interpreter.eval(expr) {
                Ok(value) => {
                    let ty = match expr.static_type() {
                        TypeRef::Any => value.type_of(),
                        declared => declared,
                    };
                    Ok(Arc::new(Expr::Constant { value, ty }))
                }
                Err(EvalError::Unsupported(what)) => {
                    trace!(node = expr.kind(), %what, "left for the compiler");
                    map_children(expr, |child| self.visit(child))
                }
                Err(err) => Err(JqlError::Evaluation(err)),
            },
        }
    }
}

/// Folds every closed subtree of a query to a constant
pub struct PartialEvaluator<'a> {
    functions: &'a Functions,
}

impl<'a> PartialEvaluator<'a> {
    pub fn new(functions: &'a Functions) -> Self {
        Self { functions }
    }

    /// Return `expr` with closed subtrees replaced by constants.
    ///
    /// Subtrees that were already constant, or that could not be evaluated,
    /// keep their identity.
    pub fn evaluate(&self, expr: &ExprRef) -> Result<ExprRef, JqlError> {
        let evaluator = SubtreeEvaluator {
            candidates: Nominator::nominate(expr),
            interpreter: Interpreter::new(self.functions),
        };
        evaluator.visit(expr)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Issue;
    use crate::expr::{pseudo, ExprExt, Query};

    fn fold(expr: &ExprRef) -> Result<ExprRef, JqlError> {
        let functions = Functions::default();
        PartialEvaluator::new(&functions).evaluate(expr)
    }

    fn where_body(query: &ExprRef) -> ExprRef {
        match query.as_ref() {
            Expr::Call { args, .. } => match args[1].lambda_body() {
                Expr::Binary { right, .. } => right.clone(),
                other => panic!("expected comparison, got {:?}", other),
            },
            other => panic!("expected where call, got {:?}", other),
        }
    }

    #[test]
    fn test_local_method_call_is_folded() {
        let name = Expr::local("name", "major").invoke("to_upper", vec![]);
        let query = Query::of::<Issue>().filter(|i| i.field("priority").equals(&name));

        let folded = fold(query.expr()).unwrap();
        let right = where_body(&folded);
        assert_eq!(right.as_constant().map(|(v, _)| v.clone()), Some(Value::from("MAJOR")));
    }

    #[test]
    fn test_parameter_dependent_expression_is_not_folded() {
        let query = Query::of::<Issue>().filter(|i| i.field("votes").equals(i.field("watchers")));
        let folded = fold(query.expr()).unwrap();
        assert!(Arc::ptr_eq(query.expr(), &folded));
    }

    #[test]
    fn test_remote_function_is_kept_but_argument_folded() {
        let group = Expr::local("group", "jira-").plus("users");
        let query =
            Query::of::<Issue>().filter(|i| i.field("assignee").in_list(pseudo::members_of(&group)));

        let folded = fold(query.expr()).unwrap();
        let Expr::Call { args, .. } = folded.as_ref() else {
            panic!("expected where call");
        };
        let Expr::Call { args: in_args, .. } = args[1].lambda_body() else {
            panic!("expected in call");
        };
        match in_args[0].as_ref() {
            Expr::Call { method, args, .. } => {
                assert!(method.remote);
                assert_eq!(args[0].as_constant().map(|(v, _)| v.clone()), Some(Value::from("jira-users")));
            }
            other => panic!("expected remote call, got {:?}", other),
        }
    }

    #[test]
    fn test_zero_argument_remote_function_keeps_identity() {
        let call = pseudo::current_user();
        let folded = fold(&call).unwrap();
        assert!(Arc::ptr_eq(&call, &folded));
    }

    #[test]
    fn test_source_chain_is_never_evaluated() {
        let query = Query::of::<Issue>().skip(5).take(10);
        let folded = fold(query.expr()).unwrap();
        assert!(Arc::ptr_eq(query.expr(), &folded));
    }

    #[test]
    fn test_folded_constant_keeps_declared_type() {
        let null_date = Expr::convert(Expr::constant(Value::Null), TypeRef::nullable(TypeRef::Date));
        let folded = fold(&null_date).unwrap();
        match folded.as_ref() {
            Expr::Constant { value, ty } => {
                assert!(value.is_null());
                assert!(ty.is_date());
            }
            other => panic!("expected constant, got {:?}", other),
        }
    }

    #[test]
    fn test_evaluation_failure_propagates() {
        let broken = Expr::local("n", 1).plus(Expr::binary(
            crate::expr::BinaryOp::Divide,
            Expr::constant(1),
            Expr::constant(0),
        ));
        let query = Query::of::<Issue>().filter(|i| i.field("votes").equals(&broken));
        assert_eq!(
            fold(query.expr()).unwrap_err(),
            JqlError::Evaluation(EvalError::DivisionByZero)
        );
    }

    #[test]
    fn test_unknown_function_backs_off() {
        let unknown = Expr::constant("x").invoke("no_such_function", vec![Expr::local("n", 2).plus(3)]);
        let folded = fold(&unknown).unwrap();
        match folded.as_ref() {
            Expr::Call { method, args, .. } => {
                assert_eq!(method.name, "no_such_function");
                assert_eq!(args[0].as_constant().map(|(v, _)| v.clone()), Some(Value::Int(5)));
            }
            other => panic!("expected call, got {:?}", other),
        }
    }
}
