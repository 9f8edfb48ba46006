//! Splicing search results back into a query tree.
//!
//! After the search server has applied the filter, ordering and paging, the
//! tree still describes those steps. [`ResultBinder`] replaces the remote
//! source, and every call the server already carried out, with a constant
//! holding the returned records. What remains (projections, counts, ...) is
//! then run by the interpreter.

use super::methods;
use crate::expr::{map_children, Expr, ExprRef, TypeRef, Value};
use std::convert::Infallible;
use std::sync::Arc;

pub struct ResultBinder {
    results: ExprRef,
}

impl ResultBinder {
    pub fn new(results: Vec<Value>, element: TypeRef) -> Self {
        Self {
            results: Arc::new(Expr::Constant {
                value: Value::Array(results),
                ty: TypeRef::sequence(element),
            }),
        }
    }

    pub fn bind(&self, expr: &ExprRef) -> ExprRef {
        if self.is_replaced(expr) {
            return self.results.clone();
        }
        match map_children(expr, |child| Ok::<_, Infallible>(self.bind(child))) {
            Ok(bound) => bound,
            Err(never) => match never {},
        }
    }

    fn is_replaced(&self, expr: &Expr) -> bool {
        match expr {
            Expr::Constant {
                value: Value::Source(_),
                ..
            } => true,
            Expr::Constant { ty, .. } => ty.is_queryable(),
            Expr::Call { method, .. } => !method.remote && methods::is_translated(&method.name),
            _ => false,
        }
    }
}

/// Entity name of the first remote source in `expr`
pub fn source_entity(expr: &Expr) -> Option<String> {
    match expr {
        Expr::Constant {
            value: Value::Source(source),
            ..
        } => Some(source.entity.clone()),
        Expr::Constant {
            ty: TypeRef::Queryable { entity },
            ..
        } => Some(entity.clone()),
        other => other.children().into_iter().find_map(|c| source_entity(c)),
    }
}
