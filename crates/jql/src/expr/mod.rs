//! Query expression trees.
//!
//! A composed query is an immutable tree of [`Expr`] nodes shared through
//! [`ExprRef`] (`Arc<Expr>`). Rewriting passes never mutate a node: they build
//! new parents around unchanged children, so node identity (the `Arc` pointer)
//! is stable for every subtree a pass leaves alone.
//!
//! Trees are usually built with the fluent [`Query`] builder and the
//! [`ExprExt`] combinators rather than by hand:
//!
//! ```
//! use jql::domain::Issue;
//! use jql::expr::{ExprExt, Query};
//!
//! let query = Query::of::<Issue>()
//!     .filter(|issue| issue.field("priority").equals("Major"))
//!     .order_by(|issue| issue.field("created"))
//!     .take(25);
//! assert_eq!(query.entity(), "Issue");
//! ```

mod builder;
pub mod pseudo;
mod value;

pub use builder::{ExprExt, IntoExpr, Query};
pub use value::{Record, SourceRef, TypeRef, Value};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Shared, immutable handle to an expression node
pub type ExprRef = Arc<Expr>;

/// Binary operators understood by the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum BinaryOp {
    And,
    AndAlso,
    Or,
    OrElse,
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
}

impl BinaryOp {
    pub fn name(self) -> &'static str {
        match self {
            BinaryOp::And => "And",
            BinaryOp::AndAlso => "AndAlso",
            BinaryOp::Or => "Or",
            BinaryOp::OrElse => "OrElse",
            BinaryOp::Equal => "Equal",
            BinaryOp::NotEqual => "NotEqual",
            BinaryOp::LessThan => "LessThan",
            BinaryOp::LessThanOrEqual => "LessThanOrEqual",
            BinaryOp::GreaterThan => "GreaterThan",
            BinaryOp::GreaterThanOrEqual => "GreaterThanOrEqual",
            BinaryOp::Add => "Add",
            BinaryOp::Subtract => "Subtract",
            BinaryOp::Multiply => "Multiply",
            BinaryOp::Divide => "Divide",
            BinaryOp::Modulo => "Modulo",
        }
    }
}

/// Identifier of a property on a domain type, e.g. `Issue.priority`
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema)]
pub struct MemberId {
    pub owner: String,
    pub name: String,
}

impl MemberId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for MemberId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.owner.is_empty() {
            write!(f, "{}", self.name)
        } else {
            write!(f, "{}.{}", self.owner, self.name)
        }
    }
}

/// A method referenced by a call node.
///
/// `remote` marks pseudo-functions that only exist on the search server
/// (`currentUser()`, `membersOf(..)`). They are never evaluated locally.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Method {
    pub name: String,
    #[serde(default)]
    pub remote: bool,
}

impl Method {
    pub fn local(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: false,
        }
    }

    pub fn remote(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            remote: true,
        }
    }
}

/// A lambda parameter
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Param {
    pub name: String,
    #[serde(default)]
    pub ty: TypeRef,
}

/// One node of a query expression tree
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum Expr {
    Binary {
        op: BinaryOp,
        left: ExprRef,
        right: ExprRef,
    },
    /// Method call; `target` is absent for static/extension-style calls
    Call {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        target: Option<ExprRef>,
        method: Method,
        #[serde(default)]
        args: Vec<ExprRef>,
    },
    Member {
        target: ExprRef,
        member: MemberId,
        #[serde(default)]
        ty: TypeRef,
    },
    Constant {
        value: Value,
        #[serde(default)]
        ty: TypeRef,
    },
    Convert {
        operand: ExprRef,
        ty: TypeRef,
    },
    New {
        constructor: String,
        #[serde(default)]
        args: Vec<ExprRef>,
    },
    Lambda {
        params: Vec<Param>,
        body: ExprRef,
    },
    Parameter(Param),
    Quote {
        operand: ExprRef,
    },
}

impl Expr {
    /// Constant whose declared type is inferred from the value
    pub fn constant(value: impl Into<Value>) -> ExprRef {
        let value = value.into();
        let ty = value.type_of();
        Arc::new(Expr::Constant { value, ty })
    }

    pub fn typed_constant(value: impl Into<Value>, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Constant {
            value: value.into(),
            ty,
        })
    }

    /// Placeholder for the remote search source of `entity`
    pub fn source(entity: impl Into<String>) -> ExprRef {
        let entity = entity.into();
        Arc::new(Expr::Constant {
            value: Value::Source(SourceRef {
                entity: entity.clone(),
            }),
            ty: TypeRef::queryable(entity),
        })
    }

    pub fn parameter(name: impl Into<String>, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Parameter(Param {
            name: name.into(),
            ty,
        }))
    }

    /// Member access; the owner is taken from the target's record type
    pub fn member(target: ExprRef, name: impl Into<String>) -> ExprRef {
        Self::typed_member(target, name, TypeRef::Any)
    }

    pub fn typed_member(target: ExprRef, name: impl Into<String>, ty: TypeRef) -> ExprRef {
        let owner = target
            .static_type()
            .record_name()
            .unwrap_or_default()
            .to_string();
        Arc::new(Expr::Member {
            target,
            member: MemberId::new(owner, name),
            ty,
        })
    }

    /// A captured local variable: member access on a closure record
    pub fn local(name: impl Into<String>, value: impl Into<Value>) -> ExprRef {
        let value = value.into();
        let ty = value.type_of();
        Self::typed_local(name, value, ty)
    }

    pub fn typed_local(name: impl Into<String>, value: impl Into<Value>, ty: TypeRef) -> ExprRef {
        let name = name.into();
        let closure = Record::new("closure").with(name.clone(), value);
        let target = Expr::typed_constant(closure, TypeRef::record("closure"));
        Self::typed_member(target, name, ty)
    }

    pub fn binary(op: BinaryOp, left: ExprRef, right: ExprRef) -> ExprRef {
        Arc::new(Expr::Binary { op, left, right })
    }

    /// Instance-style call on `target`
    pub fn call(target: ExprRef, method: Method, args: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::Call {
            target: Some(target),
            method,
            args,
        })
    }

    /// Static/extension-style call
    pub fn static_call(method: Method, args: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::Call {
            target: None,
            method,
            args,
        })
    }

    pub fn convert(operand: ExprRef, ty: TypeRef) -> ExprRef {
        Arc::new(Expr::Convert { operand, ty })
    }

    pub fn construct(constructor: impl Into<String>, args: Vec<ExprRef>) -> ExprRef {
        Arc::new(Expr::New {
            constructor: constructor.into(),
            args,
        })
    }

    pub fn lambda(params: Vec<Param>, body: ExprRef) -> ExprRef {
        Arc::new(Expr::Lambda { params, body })
    }

    pub fn quote(operand: ExprRef) -> ExprRef {
        Arc::new(Expr::Quote { operand })
    }

    /// Short node-kind name for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Expr::Binary { .. } => "binary",
            Expr::Call { .. } => "call",
            Expr::Member { .. } => "member",
            Expr::Constant { .. } => "constant",
            Expr::Convert { .. } => "convert",
            Expr::New { .. } => "new",
            Expr::Lambda { .. } => "lambda",
            Expr::Parameter(_) => "parameter",
            Expr::Quote { .. } => "quote",
        }
    }

    /// Declared type where the node carries one, `Any` otherwise
    pub fn static_type(&self) -> TypeRef {
        match self {
            Expr::Constant { ty, .. } | Expr::Convert { ty, .. } | Expr::Member { ty, .. } => {
                ty.clone()
            }
            Expr::Parameter(param) => param.ty.clone(),
            Expr::Binary { op, .. } => match op {
                BinaryOp::Add
                | BinaryOp::Subtract
                | BinaryOp::Multiply
                | BinaryOp::Divide
                | BinaryOp::Modulo => TypeRef::Any,
                _ => TypeRef::Bool,
            },
            Expr::Quote { operand } => operand.static_type(),
            _ => TypeRef::Any,
        }
    }

    /// Direct children in evaluation order
    pub fn children(&self) -> Vec<&ExprRef> {
        match self {
            Expr::Binary { left, right, .. } => vec![left, right],
            Expr::Call { target, args, .. } => target.iter().chain(args.iter()).collect(),
            Expr::Member { target, .. } => vec![target],
            Expr::Convert { operand, .. } | Expr::Quote { operand } => vec![operand],
            Expr::New { args, .. } => args.iter().collect(),
            Expr::Lambda { body, .. } => vec![body],
            Expr::Constant { .. } | Expr::Parameter(_) => Vec::new(),
        }
    }

    /// Body of a (possibly quoted) lambda, or the expression itself
    pub fn lambda_body(&self) -> &Expr {
        match self {
            Expr::Quote { operand } => operand.lambda_body(),
            Expr::Lambda { body, .. } => body,
            other => other,
        }
    }

    /// The constant under at most one conversion, with its declared type.
    /// The conversion's type wins when present.
    pub fn as_constant(&self) -> Option<(&Value, &TypeRef)> {
        match self {
            Expr::Constant { value, ty } => Some((value, ty)),
            Expr::Convert { operand, ty } => match operand.as_ref() {
                Expr::Constant { value, ty: inner } => {
                    if matches!(ty, TypeRef::Any) {
                        Some((value, inner))
                    } else {
                        Some((value, ty))
                    }
                }
                _ => None,
            },
            _ => None,
        }
    }
}

/// Rebuild `expr` with each direct child replaced by `f(child)`.
///
/// Returns the original handle when every child comes back pointer-identical.
pub fn map_children<E, F>(expr: &ExprRef, mut f: F) -> Result<ExprRef, E>
where
    F: FnMut(&ExprRef) -> Result<ExprRef, E>,
{
    let mut changed = false;
    let mut map = |child: &ExprRef| -> Result<ExprRef, E> {
        let mapped = f(child)?;
        changed |= !Arc::ptr_eq(child, &mapped);
        Ok(mapped)
    };

    let rebuilt = match expr.as_ref() {
        Expr::Binary { op, left, right } => Expr::Binary {
            op: *op,
            left: map(left)?,
            right: map(right)?,
        },
        Expr::Call {
            target,
            method,
            args,
        } => Expr::Call {
            target: target.as_ref().map(&mut map).transpose()?,
            method: method.clone(),
            args: args.iter().map(&mut map).collect::<Result<_, _>>()?,
        },
        Expr::Member { target, member, ty } => Expr::Member {
            target: map(target)?,
            member: member.clone(),
            ty: ty.clone(),
        },
        Expr::Convert { operand, ty } => Expr::Convert {
            operand: map(operand)?,
            ty: ty.clone(),
        },
        Expr::New { constructor, args } => Expr::New {
            constructor: constructor.clone(),
            args: args.iter().map(&mut map).collect::<Result<_, _>>()?,
        },
        Expr::Lambda { params, body } => Expr::Lambda {
            params: params.clone(),
            body: map(body)?,
        },
        Expr::Quote { operand } => Expr::Quote {
            operand: map(operand)?,
        },
        Expr::Constant { .. } | Expr::Parameter(_) => return Ok(expr.clone()),
    };

    if changed {
        Ok(Arc::new(rebuilt))
    } else {
        Ok(expr.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::convert::Infallible;

    #[test]
    fn test_member_owner_comes_from_record_type() {
        let issue = Expr::parameter("issue", TypeRef::record("Issue"));
        let member = Expr::member(issue, "priority");
        match member.as_ref() {
            Expr::Member { member, .. } => {
                assert_eq!(member, &MemberId::new("Issue", "priority"));
            }
            other => panic!("expected member, got {:?}", other),
        }
    }

    #[test]
    fn test_local_is_member_on_closure_constant() {
        let local = Expr::local("limit", 10);
        match local.as_ref() {
            Expr::Member { target, member, ty } => {
                assert_eq!(member.owner, "closure");
                assert_eq!(ty, &TypeRef::Int64);
                assert!(matches!(target.as_ref(), Expr::Constant { .. }));
            }
            other => panic!("expected member, got {:?}", other),
        }
    }

    #[test]
    fn test_map_children_preserves_identity_when_unchanged() {
        let tree = Expr::binary(BinaryOp::Add, Expr::constant(1), Expr::constant(2));
        let mapped = map_children(&tree, |c| Ok::<_, Infallible>(c.clone())).unwrap();
        assert!(Arc::ptr_eq(&tree, &mapped));
    }

    #[test]
    fn test_map_children_rebuilds_changed_parent() {
        let tree = Expr::binary(BinaryOp::Add, Expr::constant(1), Expr::constant(2));
        let mapped =
            map_children(&tree, |_| Ok::<_, Infallible>(Expr::constant(7))).unwrap();
        assert!(!Arc::ptr_eq(&tree, &mapped));
        assert_eq!(
            mapped.children().iter().map(|c| c.as_constant().unwrap().0.clone()).collect::<Vec<_>>(),
            vec![Value::Int(7), Value::Int(7)]
        );
    }

    #[test]
    fn test_as_constant_prefers_conversion_type() {
        let converted = Expr::convert(
            Expr::constant(Value::Null),
            TypeRef::nullable(TypeRef::Date),
        );
        let (value, ty) = converted.as_constant().unwrap();
        assert!(value.is_null());
        assert!(ty.is_date());
    }

    #[test]
    fn test_tree_roundtrips_through_json() {
        let tree = Expr::binary(
            BinaryOp::Equal,
            Expr::member(Expr::parameter("issue", TypeRef::record("Issue")), "status"),
            Expr::constant("Open"),
        );
        let json = serde_json::to_string(&tree).unwrap();
        let back: ExprRef = serde_json::from_str(&json).unwrap();
        assert_eq!(tree, back);
    }
}
