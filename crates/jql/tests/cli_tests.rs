//! Tests for the `jql` binary: compile, fields, schema, errors and config.

use assert_cmd::Command;
use jql::domain::Issue;
use jql::expr::{pseudo, ExprExt, ExprRef, Query};
use predicates::prelude::*;
use std::path::PathBuf;
use tempfile::TempDir;

fn jql_cmd(dir: &TempDir) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("jql"));
    cmd.current_dir(dir.path()).env_remove("JQL_CONFIG");
    cmd
}

/// Serialize `expr` into `name` inside `dir`
fn write_tree(dir: &TempDir, name: &str, expr: &ExprRef) -> PathBuf {
    let path = dir.path().join(name);
    std::fs::write(&path, serde_json::to_string_pretty(expr).unwrap()).unwrap();
    path
}

fn my_open_issues() -> ExprRef {
    Query::of::<Issue>()
        .filter(|i| i.field("assignee").equals(pseudo::current_user()))
        .order_by(|i| i.field("created"))
        .skip(0)
        .take(50)
        .into_expr()
}

#[test]
fn test_compile_from_file() {
    let dir = TempDir::new().unwrap();
    let path = write_tree(&dir, "query.json", &my_open_issues());

    jql_cmd(&dir)
        .arg("compile")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "assignee = currentUser() order by created",
        ))
        .stdout(predicate::str::contains("startAt: 0"))
        .stdout(predicate::str::contains("maxResults: 50"));
}

#[test]
fn test_compile_from_stdin_quiet() {
    let dir = TempDir::new().unwrap();
    let query = Query::of::<Issue>().filter(|i| i.field("summary").equals("crash"));
    let json = serde_json::to_string(query.expr()).unwrap();

    jql_cmd(&dir)
        .args(["compile", "-", "--quiet"])
        .write_stdin(json)
        .assert()
        .success()
        .stdout("summary ~ \"crash\"\n");
}

#[test]
fn test_compile_json_output() {
    let dir = TempDir::new().unwrap();
    let path = write_tree(&dir, "query.json", &my_open_issues());

    let output = jql_cmd(&dir)
        .args(["compile", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["jql"], "assignee = currentUser() order by created");
    assert_eq!(json["data"]["startAt"], 0);
    assert_eq!(json["data"]["maxResults"], 50);
    assert_eq!(json["metadata"]["command"], "compile");
}

#[test]
fn test_folding_can_be_disabled() {
    let dir = TempDir::new().unwrap();
    let team = jql::expr::Expr::local("team", "core");
    let query = Query::of::<Issue>()
        .filter(|i| i.field("labels").equals(team.invoke("to_upper", vec![])));
    let path = write_tree(&dir, "query.json", query.expr());

    jql_cmd(&dir)
        .args(["compile", "-q"])
        .arg(&path)
        .assert()
        .success()
        .stdout("labels = \"CORE\"\n");

    jql_cmd(&dir)
        .args(["compile", "--no-fold"])
        .arg(&path)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("to_upper"));
}

#[test]
fn test_unknown_field_exits_with_translation_code() {
    let dir = TempDir::new().unwrap();
    let query = Query::of::<Issue>().filter(|i| i.field("title").equals("x"));
    let path = write_tree(&dir, "query.json", query.expr());

    jql_cmd(&dir)
        .arg("compile")
        .arg(&path)
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Schema error"))
        .stderr(predicate::str::contains("To fix:"));
}

#[test]
fn test_unsupported_operation_json_error() {
    let dir = TempDir::new().unwrap();
    let query =
        Query::of::<Issue>().filter(|i| i.field("summary").invoke("sounds_like", vec![]));
    let path = write_tree(&dir, "query.json", query.expr());

    let output = jql_cmd(&dir)
        .args(["compile", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(4));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "UNSUPPORTED_OPERATION");
    assert_eq!(json["error"]["details"]["symbol"], "sounds_like");
    assert!(json["error"]["suggestions"].is_array());
}

#[test]
fn test_malformed_tree_is_parse_error() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("query.json");
    std::fs::write(&path, "{\"node\": \"nonsense\"}").unwrap();

    let output = jql_cmd(&dir)
        .args(["compile", "--json"])
        .arg(&path)
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(2));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["error"]["code"], "PARSE_ERROR");
}

#[test]
fn test_missing_input_file_is_io_error() {
    let dir = TempDir::new().unwrap();

    jql_cmd(&dir)
        .args(["compile", "does-not-exist.json"])
        .assert()
        .code(10)
        .stderr(predicate::str::contains("does-not-exist.json"));
}

#[test]
fn test_config_adds_fields_and_options() {
    let dir = TempDir::new().unwrap();
    std::fs::write(
        dir.path().join("jql.toml"),
        r#"
[compiler]
legacy_or_spacing = true

[paging]
max_results = 100

[fields.Issue.story_points]
remote = "cf[10004]"
flags = ["comparable", "sortable"]
"#,
    )
    .unwrap();

    let query = Query::of::<Issue>().filter(|i| {
        i.field("story_points")
            .greater_than(5)
            .or(i.field("priority").equals("Major"))
    });
    let path = write_tree(&dir, "query.json", query.expr());

    jql_cmd(&dir)
        .arg("compile")
        .arg(&path)
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "(cf[10004] > 5 ORpriority = \"Major\")",
        ))
        .stdout(predicate::str::contains("maxResults: 100"));

    jql_cmd(&dir)
        .arg("fields")
        .assert()
        .success()
        .stdout(predicate::str::contains("Issue.story_points"))
        .stdout(predicate::str::contains("cf[10004]"));
}

#[test]
fn test_explicit_config_path() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("custom.toml");
    std::fs::write(&config, "[paging]\nstart_at = 20\n").unwrap();
    let query = Query::of::<Issue>().filter(|i| i.field("status").equals("Open"));
    let path = write_tree(&dir, "query.json", query.expr());

    jql_cmd(&dir)
        .arg("compile")
        .arg(&path)
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("startAt: 20"));
}

#[test]
fn test_malformed_config_is_config_error() {
    let dir = TempDir::new().unwrap();
    std::fs::write(dir.path().join("jql.toml"), "[broken syntax").unwrap();

    jql_cmd(&dir)
        .arg("fields")
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to load configuration"));
}

#[test]
fn test_fields_json_lists_issue_fields() {
    let dir = TempDir::new().unwrap();

    let output = jql_cmd(&dir).args(["fields", "--json"]).output().unwrap();
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    let fields = json["data"]["fields"].as_array().unwrap();
    assert_eq!(json["data"]["count"], fields.len());
    let due = fields
        .iter()
        .find(|f| f["property"] == "Issue.due_date")
        .unwrap();
    assert_eq!(due["remote"], "due");
}

#[test]
fn test_schema_describes_expression_nodes() {
    let dir = TempDir::new().unwrap();

    jql_cmd(&dir)
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"title\": \"Expr\""))
        .stdout(predicate::str::contains("\"node\""));
}
