//! Searchable domain types.
//!
//! An [`Entity`] names its remote search source and carries the static field
//! table the compiler resolves properties against. [`Issue`] is the entity the
//! search endpoint returns.

use crate::expr::{Record, TypeRef, Value};
use crate::fields::{CompareFlags, FieldTable};
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A type that can be searched remotely
pub trait Entity {
    /// Type name used for the source placeholder and as field-table owner
    const NAME: &'static str;

    /// Remote field metadata, built once
    fn field_table() -> &'static FieldTable;

    /// Value form used when results are spliced back into a query tree
    fn to_record(&self) -> Record;
}

/// An issue as returned by a search
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Issue {
    /// Issue key, e.g. `CORE-42`
    pub key: String,
    pub summary: String,
    pub description: Option<String>,
    pub environment: Option<String>,
    pub project: String,
    pub issue_type: String,
    pub status: String,
    pub priority: Option<String>,
    pub resolution: Option<String>,
    pub assignee: Option<String>,
    pub reporter: Option<String>,
    pub created: Option<NaiveDateTime>,
    pub updated: Option<NaiveDateTime>,
    pub due_date: Option<NaiveDateTime>,
    pub resolution_date: Option<NaiveDateTime>,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub components: Vec<String>,
    #[serde(default)]
    pub fix_versions: Vec<String>,
    #[serde(default)]
    pub affects_versions: Vec<String>,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub watchers: i64,
    pub sprint: Option<String>,
}

impl Issue {
    pub fn new(key: impl Into<String>, summary: impl Into<String>) -> Self {
        let key = key.into();
        let project = key
            .split_once('-')
            .map(|(project, _)| project.to_string())
            .unwrap_or_default();
        Self {
            key,
            summary: summary.into(),
            project,
            issue_type: "Task".to_string(),
            status: "Open".to_string(),
            ..Self::default()
        }
    }
}

static ISSUE_FIELDS: OnceLock<FieldTable> = OnceLock::new();

fn issue_fields() -> FieldTable {
    use CompareFlags as F;

    let ordered = F::COMPARABLE | F::SORTABLE;
    let tracked = ordered | F::WAS | F::WAS_INCLUDE | F::CHANGED;
    let text = F::CONTAINS;
    let list = F::INCLUDE | F::CHECK;
    let date = || TypeRef::nullable(TypeRef::Date);

    FieldTable::new()
        .with(Issue::NAME, "key", "key", ordered | F::INCLUDE)
        .with(Issue::NAME, "summary", "summary", text)
        .with(Issue::NAME, "description", "description", text)
        .with(Issue::NAME, "environment", "environment", text)
        .with(Issue::NAME, "project", "project", ordered | F::INCLUDE)
        .with(Issue::NAME, "issue_type", "issuetype", ordered | F::INCLUDE)
        .with(Issue::NAME, "status", "status", tracked)
        .with(Issue::NAME, "priority", "priority", tracked)
        .with(Issue::NAME, "resolution", "resolution", tracked)
        .with(Issue::NAME, "assignee", "assignee", tracked)
        .with(Issue::NAME, "reporter", "reporter", tracked)
        .with_typed(Issue::NAME, "created", "created", ordered, date())
        .with_typed(Issue::NAME, "updated", "updated", ordered, date())
        .with_typed(Issue::NAME, "due_date", "due", ordered, date())
        .with_typed(Issue::NAME, "resolution_date", "resolved", ordered, date())
        .with(Issue::NAME, "labels", "labels", list)
        .with(Issue::NAME, "components", "component", list)
        .with(Issue::NAME, "fix_versions", "fixVersion", list | F::WAS | F::CHANGED)
        .with(Issue::NAME, "affects_versions", "affectedVersion", list)
        .with(Issue::NAME, "votes", "votes", ordered)
        .with(Issue::NAME, "watchers", "watchers", ordered)
        .with(Issue::NAME, "sprint", "sprint", list)
}

impl Entity for Issue {
    const NAME: &'static str = "Issue";

    fn field_table() -> &'static FieldTable {
        ISSUE_FIELDS.get_or_init(issue_fields)
    }

    fn to_record(&self) -> Record {
        Record::new(Self::NAME)
            .with_display(self.key.clone())
            .with("key", self.key.clone())
            .with("summary", self.summary.clone())
            .with("description", self.description.clone())
            .with("environment", self.environment.clone())
            .with("project", self.project.clone())
            .with("issue_type", self.issue_type.clone())
            .with("status", self.status.clone())
            .with("priority", self.priority.clone())
            .with("resolution", self.resolution.clone())
            .with("assignee", self.assignee.clone())
            .with("reporter", self.reporter.clone())
            .with("created", self.created)
            .with("updated", self.updated)
            .with("due_date", self.due_date)
            .with("resolution_date", self.resolution_date)
            .with("labels", self.labels.clone())
            .with("components", self.components.clone())
            .with("fix_versions", self.fix_versions.clone())
            .with("affects_versions", self.affects_versions.clone())
            .with("votes", self.votes)
            .with("watchers", self.watchers)
            .with("sprint", self.sprint.clone())
    }
}

/// Whether a named domain object is identified by `id`.
///
/// Matches the record's display form or its `name`, `key` or `id` field.
pub fn equals_name(record: &Record, id: &str) -> bool {
    record.display.as_deref() == Some(id)
        || ["name", "key", "id"]
            .iter()
            .any(|field| record.get(field).and_then(Value::as_str) == Some(id))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::MemberId;
    use crate::fields::FieldLookup;

    #[test]
    fn test_issue_table_maps_remote_names() {
        let table = Issue::field_table();
        let due = table.lookup(&MemberId::new("Issue", "due_date")).unwrap();
        assert_eq!(due.remote_name, "due");
        let summary = table.lookup(&MemberId::new("Issue", "summary")).unwrap();
        assert!(summary.allows(CompareFlags::CONTAINS));
        assert!(table.lookup(&MemberId::new("Issue", "title")).is_none());
    }

    #[test]
    fn test_date_fields_declare_nullable_date() {
        let table = Issue::field_table();
        for name in ["created", "updated", "due_date", "resolution_date"] {
            let field = table.lookup(&MemberId::new("Issue", name)).unwrap();
            assert_eq!(field.ty, TypeRef::nullable(TypeRef::Date), "{}", name);
        }
        let votes = table.lookup(&MemberId::new("Issue", "votes")).unwrap();
        assert!(!votes.ty.is_date());
    }

    #[test]
    fn test_issue_table_is_built_once() {
        assert!(std::ptr::eq(Issue::field_table(), Issue::field_table()));
    }

    #[test]
    fn test_new_issue_derives_project_from_key() {
        let issue = Issue::new("CORE-7", "Crash on start");
        assert_eq!(issue.project, "CORE");
        assert_eq!(issue.status, "Open");
    }

    #[test]
    fn test_record_carries_every_field() {
        let mut issue = Issue::new("CORE-7", "Crash on start");
        issue.votes = 4;
        issue.labels = vec!["ui".into()];
        let record = issue.to_record();
        assert_eq!(record.to_string(), "CORE-7");
        assert_eq!(record.get("votes"), Some(&Value::Int(4)));
        assert_eq!(record.get("labels"), Some(&Value::from(vec!["ui"])));
        assert_eq!(record.get("assignee"), Some(&Value::Null));
        assert_eq!(record.fields.len(), Issue::field_table().len());
    }

    #[test]
    fn test_equals_name() {
        let user = Record::new("User").with("name", "alice").with_display("Alice Smith");
        assert!(equals_name(&user, "alice"));
        assert!(equals_name(&user, "Alice Smith"));
        assert!(!equals_name(&user, "bob"));
    }
}
