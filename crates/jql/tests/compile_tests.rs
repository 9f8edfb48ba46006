//! Compilation of composed queries into JQL text and paging parameters.

use chrono::NaiveDate;
use jql::domain::{Entity, Issue};
use jql::errors::JqlError;
use jql::expr::{pseudo, Expr, ExprExt, ExprRef, Query, TypeRef, Value};
use jql::fields::{CompareFlags, FieldTable};
use jql::query::{CompiledQuery, CompilerOptions, Functions, JqlCompiler, PartialEvaluator};

fn compile(expr: &ExprRef) -> Result<CompiledQuery, JqlError> {
    let functions = Functions::default();
    let folded = PartialEvaluator::new(&functions).evaluate(expr)?;
    JqlCompiler::new(Issue::field_table(), &functions).compile(&folded)
}

fn jql(query: Query) -> String {
    compile(query.expr()).unwrap().jql
}

#[test]
fn test_empty_string_compiles_to_is_empty() {
    let query = Query::of::<Issue>().filter(|i| i.field("assignee").equals(""));
    assert_eq!(jql(query), "assignee is empty");

    let query = Query::of::<Issue>().filter(|i| i.field("assignee").not_equals(""));
    assert_eq!(jql(query), "assignee is not empty");
}

#[test]
fn test_null_date_is_empty_other_null_is_null() {
    let query = Query::of::<Issue>().filter(|i| {
        i.typed_field("due_date", TypeRef::nullable(TypeRef::Date))
            .equals(Value::Null)
    });
    assert_eq!(jql(query), "due is empty");

    // the declared type comes from the field table when the builder has none
    let query = Query::of::<Issue>().filter(|i| i.field("due_date").equals(Value::Null));
    assert_eq!(jql(query), "due is empty");
    let query = Query::of::<Issue>().filter(|i| i.field("resolution_date").not_equals(Value::Null));
    assert_eq!(jql(query), "resolved is not empty");

    let query = Query::of::<Issue>().filter(|i| {
        i.typed_field("votes", TypeRef::nullable(TypeRef::Int32))
            .equals(Value::Null)
    });
    assert_eq!(jql(query), "votes is null");

    let query = Query::of::<Issue>().filter(|i| {
        i.typed_field("resolution", TypeRef::nullable(TypeRef::String))
            .not_equals(Value::Null)
    });
    assert_eq!(jql(query), "resolution is not null");
}

#[test]
fn test_contains_flag_selects_tilde_operators() {
    let query = Query::of::<Issue>().filter(|i| i.field("summary").equals("x"));
    assert_eq!(jql(query), "summary ~ \"x\"");

    let query = Query::of::<Issue>().filter(|i| i.field("summary").not_equals("x"));
    assert_eq!(jql(query), "summary !~ \"x\"");

    let query = Query::of::<Issue>().filter(|i| i.field("status").not_equals("x"));
    assert_eq!(jql(query), "status != \"x\"");
}

#[test]
fn test_two_where_calls_are_conjoined() {
    let query = Query::of::<Issue>()
        .filter(|i| i.field("project").equals("CORE"))
        .filter(|i| i.field("status").equals("Open"));
    assert_eq!(jql(query), "(project = \"CORE\" AND status = \"Open\")");
}

#[test]
fn test_order_by_then_by_descending() {
    let query = Query::of::<Issue>()
        .filter(|i| i.field("project").equals("CORE"))
        .order_by(|i| i.field("priority"))
        .then_by_descending(|i| i.field("updated"));
    assert_eq!(
        jql(query),
        "project = \"CORE\" order by priority, updated desc"
    );
}

#[test]
fn test_paging_does_not_touch_text() {
    let base = Query::of::<Issue>().filter(|i| i.field("status").equals("Open"));
    let plain = compile(base.expr()).unwrap();
    let paged = compile(base.skip(10).take(25).expr()).unwrap();

    assert_eq!(plain.jql, paged.jql);
    assert_eq!(paged.start_at, Some(10));
    assert_eq!(paged.max_results, Some(25));
    assert_eq!(plain.start_at, None);
    assert_eq!(plain.max_results, None);
}

#[test]
fn test_in_list_of_integers() {
    let query = Query::of::<Issue>().filter(|i| i.field("votes").in_list(vec![1, 2, 3]));
    assert_eq!(jql(query), "votes in (1, 2, 3)");
}

#[test]
fn test_empty_in_list_fails_before_search() {
    let query = Query::of::<Issue>().filter(|i| i.field("votes").in_list(Vec::<i64>::new()));
    let err = compile(query.expr()).unwrap_err();
    assert!(matches!(err, JqlError::UnsupportedOperation { ref symbol, .. } if symbol == "in"));
}

#[test]
fn test_captured_method_call_is_folded() {
    let mut functions = Functions::default();
    functions.register("shout", |args| {
        Ok(Value::Str(format!("{}!", args[0])))
    });

    let team = Expr::local("team", "core");
    let query = Query::of::<Issue>().filter(|i| {
        i.field("labels")
            .equals(team.invoke("to_upper", vec![]).invoke("shout", vec![]))
    });

    let folded = PartialEvaluator::new(&functions)
        .evaluate(query.expr())
        .unwrap();
    let compiled = JqlCompiler::new(Issue::field_table(), &functions)
        .compile(&folded)
        .unwrap();
    assert_eq!(compiled.jql, "labels = \"CORE!\"");
}

#[test]
fn test_parameter_dependent_call_is_not_folded() {
    // to_upper on a field depends on the issue, so it reaches the compiler
    let query =
        Query::of::<Issue>().filter(|i| i.field("summary").invoke("to_upper", vec![]).equals("X"));
    let err = compile(query.expr()).unwrap_err();
    assert!(matches!(
        err,
        JqlError::Schema(_) | JqlError::UnsupportedOperation { .. }
    ));
}

#[test]
fn test_priority_either_or() {
    let fields = FieldTable::new().with("Issue", "priority", "priority", CompareFlags::COMPARABLE);
    let functions = Functions::default();
    let query = Query::of::<Issue>().filter(|i| {
        i.field("priority")
            .equals("Major")
            .or(i.field("priority").equals("Minor"))
    });

    let compiled = JqlCompiler::new(&fields, &functions)
        .compile(query.expr())
        .unwrap();
    assert_eq!(compiled.jql, "(priority = \"Major\" OR priority = \"Minor\")");
}

#[test]
fn test_legacy_or_spacing() {
    let functions = Functions::default();
    let query = Query::of::<Issue>().filter(|i| {
        i.field("priority")
            .equals("Major")
            .or(i.field("priority").equals("Minor"))
    });

    let compiled = JqlCompiler::new(Issue::field_table(), &functions)
        .with_options(CompilerOptions {
            legacy_or_spacing: true,
            ..CompilerOptions::default()
        })
        .compile(query.expr())
        .unwrap();
    assert_eq!(compiled.jql, "(priority = \"Major\" ORpriority = \"Minor\")");
}

#[test]
fn test_current_user_assignment_end_to_end() {
    let query = Query::of::<Issue>()
        .filter(|i| i.field("assignee").equals(pseudo::current_user()))
        .order_by(|i| i.field("created"))
        .skip(0)
        .take(50);

    let compiled = compile(query.expr()).unwrap();
    assert_eq!(compiled.jql, "assignee = currentUser() order by created");
    assert!(compiled.jql.ends_with(" order by created"));
    assert_eq!(compiled.start_at, Some(0));
    assert_eq!(compiled.max_results, Some(50));
}

#[test]
fn test_during_with_remote_bounds_has_no_separator() {
    let query = Query::of::<Issue>().filter(|i| {
        i.field("status")
            .was("Open")
            .during(pseudo::start_of_month(), pseudo::end_of_month())
    });
    assert_eq!(
        jql(query),
        "status was \"Open\" during (startOfMonth()endOfMonth())"
    );
}

#[test]
fn test_folded_date_window() {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    let query = Query::of::<Issue>().filter(|i| {
        i.field("created")
            .greater_or_equal(Expr::local("start", start))
            .and(i.field("created").less_than(Expr::local("start", start).plus(7)))
    });
    assert_eq!(
        jql(query),
        "(created >= \"2024/01/01\" AND created < \"2024/01/08\")"
    );
}

#[test]
fn test_unknown_field_is_schema_error() {
    let query = Query::of::<Issue>().filter(|i| i.field("title").equals("x"));
    let err = compile(query.expr()).unwrap_err();
    assert!(matches!(err, JqlError::Schema(_)), "got {:?}", err);
}

#[test]
fn test_unsupported_method_names_the_symbol() {
    let query = Query::of::<Issue>().filter(|i| i.field("summary").invoke("sounds_like", vec![]));
    let err = compile(query.expr()).unwrap_err();
    match err {
        JqlError::UnsupportedOperation { symbol, .. } => assert_eq!(symbol, "sounds_like"),
        other => panic!("expected unsupported operation, got {:?}", other),
    }
}

#[test]
fn test_in_memory_tail_compiles_like_its_source() {
    let base = Query::of::<Issue>().filter(|i| i.field("status").equals("Open"));
    let counted = base.clone().count();
    assert_eq!(compile(&counted).unwrap().jql, compile(base.expr()).unwrap().jql);
}
