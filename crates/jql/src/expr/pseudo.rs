//! Markers for functions that only exist on the search server.
//!
//! Each helper builds a call tagged `remote`. The partial evaluator never runs
//! these locally and the compiler emits them as `name(..)` in the query text:
//!
//! ```
//! use jql::expr::{pseudo, ExprExt, Query};
//! use jql::domain::Issue;
//!
//! let query = Query::of::<Issue>()
//!     .filter(|issue| issue.field("assignee").equals(pseudo::current_user()));
//! # let _ = query;
//! ```

use super::builder::IntoExpr;
use super::{Expr, ExprRef, Method};

/// Remote call with at most one argument
pub fn remote(name: &str, arg: Option<ExprRef>) -> ExprRef {
    Expr::static_call(Method::remote(name), arg.into_iter().collect())
}

macro_rules! remote_functions {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name() -> ExprRef {
                remote(stringify!($name), None)
            }
        )*
    };
}

macro_rules! remote_functions_with_arg {
    ($($(#[$doc:meta])* $name:ident),* $(,)?) => {
        $(
            $(#[$doc])*
            pub fn $name(arg: impl IntoExpr) -> ExprRef {
                remote(stringify!($name), Some(arg.into_expr()))
            }
        )*
    };
}

remote_functions!(
    /// The user running the search
    current_user,
    now,
    current_login,
    last_login,
    start_of_day,
    start_of_week,
    start_of_month,
    start_of_year,
    end_of_day,
    end_of_week,
    end_of_month,
    end_of_year,
    open_sprints,
    closed_sprints,
    future_sprints,
    issue_history,
    watched_issues,
    voted_issues,
);

remote_functions_with_arg!(
    /// Members of the named group
    members_of,
    released_versions,
    unreleased_versions,
    latest_released_version,
    earliest_unreleased_version,
    linked_issues,
    components_lead_by_user,
    projects_lead_by_user,
);

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;

    #[test]
    fn test_zero_argument_marker() {
        match current_user().as_ref() {
            Expr::Call {
                target: None,
                method,
                args,
            } => {
                assert_eq!(method.name, "current_user");
                assert!(method.remote);
                assert!(args.is_empty());
            }
            other => panic!("expected call, got {:?}", other),
        }
    }

    #[test]
    fn test_marker_with_argument() {
        match members_of("jira-developers").as_ref() {
            Expr::Call { args, .. } => {
                assert_eq!(args.len(), 1);
                assert_eq!(
                    args[0].as_constant().map(|(v, _)| v.clone()),
                    Some(Value::from("jira-developers"))
                );
            }
            other => panic!("expected call, got {:?}", other),
        }
    }
}
