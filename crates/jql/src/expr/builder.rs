//! Fluent construction of query trees.

use super::{BinaryOp, Expr, ExprRef, Method, Param, TypeRef, Value};
use crate::domain::Entity;
use crate::query::methods;
use chrono::{NaiveDate, NaiveDateTime};
use std::sync::Arc;

/// Anything usable as an operand: an existing node or a constant value
pub trait IntoExpr {
    fn into_expr(self) -> ExprRef;
}

impl IntoExpr for ExprRef {
    fn into_expr(self) -> ExprRef {
        self
    }
}

impl IntoExpr for &ExprRef {
    fn into_expr(self) -> ExprRef {
        self.clone()
    }
}

macro_rules! constant_operand {
    ($($ty:ty),* $(,)?) => {
        $(
            impl IntoExpr for $ty {
                fn into_expr(self) -> ExprRef {
                    Expr::constant(self)
                }
            }
        )*
    };
}

constant_operand!(
    Value,
    &str,
    String,
    bool,
    i32,
    i64,
    u32,
    f64,
    NaiveDate,
    NaiveDateTime,
    Vec<&str>,
    Vec<String>,
    Vec<i32>,
    Vec<i64>,
    Vec<Value>,
);

/// Combinators for composing predicates and field references
pub trait ExprExt {
    /// Access a property of the current node
    fn field(&self, name: &str) -> ExprRef;
    fn typed_field(&self, name: &str, ty: TypeRef) -> ExprRef;
    /// Free-form custom field reference, e.g. `issue.custom_field("Story Points")`
    fn custom_field(&self, name: &str) -> ExprRef;

    fn equals(&self, rhs: impl IntoExpr) -> ExprRef;
    fn not_equals(&self, rhs: impl IntoExpr) -> ExprRef;
    fn less_than(&self, rhs: impl IntoExpr) -> ExprRef;
    fn less_or_equal(&self, rhs: impl IntoExpr) -> ExprRef;
    fn greater_than(&self, rhs: impl IntoExpr) -> ExprRef;
    fn greater_or_equal(&self, rhs: impl IntoExpr) -> ExprRef;
    fn and(&self, rhs: impl IntoExpr) -> ExprRef;
    fn or(&self, rhs: impl IntoExpr) -> ExprRef;
    fn plus(&self, rhs: impl IntoExpr) -> ExprRef;
    fn minus(&self, rhs: impl IntoExpr) -> ExprRef;
    fn convert_to(&self, ty: TypeRef) -> ExprRef;

    /// Call a local method on this node
    fn invoke(&self, method: &str, args: Vec<ExprRef>) -> ExprRef;

    fn is_empty(&self) -> ExprRef;
    fn is_not_empty(&self) -> ExprRef;
    fn is_null(&self) -> ExprRef;
    fn is_not_null(&self) -> ExprRef;

    fn in_list(&self, values: impl IntoExpr) -> ExprRef;
    fn not_in(&self, values: impl IntoExpr) -> ExprRef;
    fn was_in(&self, values: impl IntoExpr) -> ExprRef;
    fn was_not_in(&self, values: impl IntoExpr) -> ExprRef;

    fn was(&self, value: impl IntoExpr) -> ExprRef;
    fn was_not(&self, value: impl IntoExpr) -> ExprRef;
    fn changed(&self) -> ExprRef;

    fn during(&self, from: impl IntoExpr, to: impl IntoExpr) -> ExprRef;
    fn after(&self, value: impl IntoExpr) -> ExprRef;
    fn before(&self, value: impl IntoExpr) -> ExprRef;
    fn by(&self, value: impl IntoExpr) -> ExprRef;
    fn on(&self, value: impl IntoExpr) -> ExprRef;
    fn from(&self, value: impl IntoExpr) -> ExprRef;
    fn to(&self, value: impl IntoExpr) -> ExprRef;
}

fn method_call(target: &ExprRef, name: &str, args: Vec<ExprRef>) -> ExprRef {
    Expr::call(target.clone(), Method::local(name), args)
}

impl ExprExt for ExprRef {
    fn field(&self, name: &str) -> ExprRef {
        Expr::member(self.clone(), name)
    }

    fn typed_field(&self, name: &str, ty: TypeRef) -> ExprRef {
        Expr::typed_member(self.clone(), name, ty)
    }

    fn custom_field(&self, name: &str) -> ExprRef {
        Expr::call(
            self.clone(),
            Method::remote(methods::CUSTOM_FIELD),
            vec![Expr::constant(name)],
        )
    }

    fn equals(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::Equal, self.clone(), rhs.into_expr())
    }

    fn not_equals(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::NotEqual, self.clone(), rhs.into_expr())
    }

    fn less_than(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::LessThan, self.clone(), rhs.into_expr())
    }

    fn less_or_equal(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::LessThanOrEqual, self.clone(), rhs.into_expr())
    }

    fn greater_than(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::GreaterThan, self.clone(), rhs.into_expr())
    }

    fn greater_or_equal(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::GreaterThanOrEqual, self.clone(), rhs.into_expr())
    }

    fn and(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::AndAlso, self.clone(), rhs.into_expr())
    }

    fn or(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::OrElse, self.clone(), rhs.into_expr())
    }

    fn plus(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::Add, self.clone(), rhs.into_expr())
    }

    fn minus(&self, rhs: impl IntoExpr) -> ExprRef {
        Expr::binary(BinaryOp::Subtract, self.clone(), rhs.into_expr())
    }

    fn convert_to(&self, ty: TypeRef) -> ExprRef {
        Expr::convert(self.clone(), ty)
    }

    fn invoke(&self, method: &str, args: Vec<ExprRef>) -> ExprRef {
        method_call(self, method, args)
    }

    fn is_empty(&self) -> ExprRef {
        method_call(self, methods::IS_EMPTY, vec![])
    }

    fn is_not_empty(&self) -> ExprRef {
        method_call(self, methods::IS_NOT_EMPTY, vec![])
    }

    fn is_null(&self) -> ExprRef {
        method_call(self, methods::IS_NULL, vec![])
    }

    fn is_not_null(&self) -> ExprRef {
        method_call(self, methods::IS_NOT_NULL, vec![])
    }

    fn in_list(&self, values: impl IntoExpr) -> ExprRef {
        method_call(self, methods::IN, vec![values.into_expr()])
    }

    fn not_in(&self, values: impl IntoExpr) -> ExprRef {
        method_call(self, methods::NOT_IN, vec![values.into_expr()])
    }

    fn was_in(&self, values: impl IntoExpr) -> ExprRef {
        method_call(self, methods::WAS_IN, vec![values.into_expr()])
    }

    fn was_not_in(&self, values: impl IntoExpr) -> ExprRef {
        method_call(self, methods::WAS_NOT_IN, vec![values.into_expr()])
    }

    fn was(&self, value: impl IntoExpr) -> ExprRef {
        method_call(self, methods::WAS, vec![value.into_expr()])
    }

    fn was_not(&self, value: impl IntoExpr) -> ExprRef {
        method_call(self, methods::WAS_NOT, vec![value.into_expr()])
    }

    fn changed(&self) -> ExprRef {
        method_call(self, methods::CHANGED, vec![])
    }

    fn during(&self, from: impl IntoExpr, to: impl IntoExpr) -> ExprRef {
        method_call(
            self,
            methods::DURING,
            vec![from.into_expr(), to.into_expr()],
        )
    }

    fn after(&self, value: impl IntoExpr) -> ExprRef {
        method_call(self, methods::AFTER, vec![value.into_expr()])
    }

    fn before(&self, value: impl IntoExpr) -> ExprRef {
        method_call(self, methods::BEFORE, vec![value.into_expr()])
    }

    fn by(&self, value: impl IntoExpr) -> ExprRef {
        method_call(self, methods::BY, vec![value.into_expr()])
    }

    fn on(&self, value: impl IntoExpr) -> ExprRef {
        method_call(self, methods::ON, vec![value.into_expr()])
    }

    fn from(&self, value: impl IntoExpr) -> ExprRef {
        method_call(self, methods::FROM, vec![value.into_expr()])
    }

    fn to(&self, value: impl IntoExpr) -> ExprRef {
        method_call(self, methods::TO, vec![value.into_expr()])
    }
}

/// A query over the remote search source of one entity type.
///
/// Sequence operators are recorded as static calls whose first argument is
/// the upstream query, the same shape a hand-built tree would have.
#[derive(Debug, Clone)]
pub struct Query {
    expr: ExprRef,
    entity: String,
}

impl Query {
    /// Query over the search source of `E`
    pub fn of<E: Entity>() -> Self {
        Self::source(E::NAME)
    }

    pub fn source(entity: impl Into<String>) -> Self {
        let entity = entity.into();
        Self {
            expr: Expr::source(entity.clone()),
            entity,
        }
    }

    /// Wrap an already-built tree rooted at the source of `entity`
    pub fn from_expr(expr: ExprRef, entity: impl Into<String>) -> Self {
        Self {
            expr,
            entity: entity.into(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn expr(&self) -> &ExprRef {
        &self.expr
    }

    pub fn into_expr(self) -> ExprRef {
        self.expr
    }

    /// Quoted single-parameter lambda over the entity
    fn lambda(&self, f: impl FnOnce(&ExprRef) -> ExprRef) -> ExprRef {
        let param = Param {
            name: self.entity.to_lowercase(),
            ty: TypeRef::record(self.entity.clone()),
        };
        let item = Arc::new(Expr::Parameter(param.clone()));
        let body = f(&item);
        Expr::quote(Expr::lambda(vec![param], body))
    }

    fn chain(self, method: &str, args: Vec<ExprRef>) -> Self {
        let mut all = Vec::with_capacity(args.len() + 1);
        all.push(self.expr);
        all.extend(args);
        Self {
            expr: Expr::static_call(Method::local(method), all),
            entity: self.entity,
        }
    }

    pub fn filter(self, predicate: impl FnOnce(&ExprRef) -> ExprRef) -> Self {
        let lambda = self.lambda(predicate);
        self.chain(methods::WHERE, vec![lambda])
    }

    pub fn order_by(self, key: impl FnOnce(&ExprRef) -> ExprRef) -> Self {
        let lambda = self.lambda(key);
        self.chain(methods::ORDER_BY, vec![lambda])
    }

    pub fn order_by_descending(self, key: impl FnOnce(&ExprRef) -> ExprRef) -> Self {
        let lambda = self.lambda(key);
        self.chain(methods::ORDER_BY_DESCENDING, vec![lambda])
    }

    pub fn then_by(self, key: impl FnOnce(&ExprRef) -> ExprRef) -> Self {
        let lambda = self.lambda(key);
        self.chain(methods::THEN_BY, vec![lambda])
    }

    pub fn then_by_descending(self, key: impl FnOnce(&ExprRef) -> ExprRef) -> Self {
        let lambda = self.lambda(key);
        self.chain(methods::THEN_BY_DESCENDING, vec![lambda])
    }

    pub fn skip(self, count: u32) -> Self {
        self.chain(
            methods::SKIP,
            vec![Expr::typed_constant(count, TypeRef::Int32)],
        )
    }

    pub fn take(self, count: u32) -> Self {
        self.chain(
            methods::TAKE,
            vec![Expr::typed_constant(count, TypeRef::Int32)],
        )
    }

    /// In-memory projection, applied to the search results
    pub fn select(self, projection: impl FnOnce(&ExprRef) -> ExprRef) -> Self {
        let lambda = self.lambda(projection);
        self.chain(methods::SELECT, vec![lambda])
    }

    pub fn count(self) -> ExprRef {
        self.chain(methods::COUNT, vec![]).expr
    }

    pub fn any(self) -> ExprRef {
        self.chain(methods::ANY, vec![]).expr
    }

    pub fn first(self) -> ExprRef {
        self.chain(methods::FIRST, vec![]).expr
    }

    pub fn first_or_default(self) -> ExprRef {
        self.chain(methods::FIRST_OR_DEFAULT, vec![]).expr
    }

    pub fn distinct(self) -> Self {
        self.chain(methods::DISTINCT, vec![])
    }

    pub fn to_list(self) -> ExprRef {
        self.chain(methods::TO_LIST, vec![]).expr
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Issue;

    #[test]
    fn test_filter_builds_quoted_lambda_over_source() {
        let query = Query::of::<Issue>().filter(|i| i.field("status").equals("Open"));
        match query.expr().as_ref() {
            Expr::Call {
                target: None,
                method,
                args,
            } => {
                assert_eq!(method.name, methods::WHERE);
                assert!(matches!(args[0].as_ref(), Expr::Constant { value: Value::Source(_), .. }));
                assert!(matches!(args[1].as_ref(), Expr::Quote { .. }));
            }
            other => panic!("expected where call, got {:?}", other),
        }
    }

    #[test]
    fn test_paging_arguments_are_int32_constants() {
        let query = Query::of::<Issue>().skip(10);
        match query.expr().as_ref() {
            Expr::Call { args, .. } => {
                assert_eq!(args[1].as_constant(), Some((&Value::Int(10), &TypeRef::Int32)));
            }
            other => panic!("expected skip call, got {:?}", other),
        }
    }

    #[test]
    fn test_custom_field_is_remote_call() {
        let item = Expr::parameter("issue", TypeRef::record("Issue"));
        match item.custom_field("Story Points").as_ref() {
            Expr::Call { method, .. } => assert!(method.remote),
            other => panic!("expected call, got {:?}", other),
        }
    }
}
