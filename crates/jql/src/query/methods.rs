//! Method vocabulary shared by the builder, compiler, interpreter and
//! result binder.

pub const WHERE: &str = "where";
pub const ORDER_BY: &str = "order_by";
pub const ORDER_BY_DESCENDING: &str = "order_by_descending";
pub const THEN_BY: &str = "then_by";
pub const THEN_BY_DESCENDING: &str = "then_by_descending";
pub const SKIP: &str = "skip";
pub const TAKE: &str = "take";

pub const SELECT: &str = "select";
pub const COUNT: &str = "count";
pub const ANY: &str = "any";
pub const FIRST: &str = "first";
pub const FIRST_OR_DEFAULT: &str = "first_or_default";
pub const TO_LIST: &str = "to_list";
pub const DISTINCT: &str = "distinct";

pub const IS_EMPTY: &str = "is_empty";
pub const IS_NOT_EMPTY: &str = "is_not_empty";
pub const IS_NULL: &str = "is_null";
pub const IS_NOT_NULL: &str = "is_not_null";

pub const IN: &str = "in";
pub const NOT_IN: &str = "not_in";
pub const WAS_IN: &str = "was_in";
pub const WAS_NOT_IN: &str = "was_not_in";

pub const WAS: &str = "was";
pub const WAS_NOT: &str = "was_not";
pub const CHANGED: &str = "changed";

pub const DURING: &str = "during";
pub const AFTER: &str = "after";
pub const BEFORE: &str = "before";
pub const BY: &str = "by";
pub const ON: &str = "on";
pub const FROM: &str = "from";
pub const TO: &str = "to";

pub const CUSTOM_FIELD: &str = "custom_field";

/// Operators whose effect is carried out by the search server
pub const TRANSLATED: &[&str] = &[
    WHERE,
    ORDER_BY,
    ORDER_BY_DESCENDING,
    THEN_BY,
    THEN_BY_DESCENDING,
    SKIP,
    TAKE,
];

/// Operators applied to the results in memory; the compiler passes through them
pub const IN_MEMORY: &[&str] = &[SELECT, COUNT, ANY, FIRST, FIRST_OR_DEFAULT, TO_LIST, DISTINCT];

/// Remote pseudo-functions: method name → query-language function name
pub const REMOTE_FUNCTIONS: &[(&str, &str)] = &[
    ("current_user", "currentUser"),
    ("members_of", "membersOf"),
    ("now", "now"),
    ("current_login", "currentLogin"),
    ("last_login", "lastLogin"),
    ("start_of_day", "startOfDay"),
    ("start_of_week", "startOfWeek"),
    ("start_of_month", "startOfMonth"),
    ("start_of_year", "startOfYear"),
    ("end_of_day", "endOfDay"),
    ("end_of_week", "endOfWeek"),
    ("end_of_month", "endOfMonth"),
    ("end_of_year", "endOfYear"),
    ("open_sprints", "openSprints"),
    ("closed_sprints", "closedSprints"),
    ("future_sprints", "futureSprints"),
    ("released_versions", "releasedVersions"),
    ("unreleased_versions", "unreleasedVersions"),
    ("latest_released_version", "latestReleasedVersion"),
    ("earliest_unreleased_version", "earliestUnreleasedVersion"),
    ("issue_history", "issueHistory"),
    ("watched_issues", "watchedIssues"),
    ("voted_issues", "votedIssues"),
    ("linked_issues", "linkedIssues"),
    ("components_lead_by_user", "componentsLeadByUser"),
    ("projects_lead_by_user", "projectsLeadByUser"),
];

pub fn is_translated(method: &str) -> bool {
    TRANSLATED.contains(&method)
}

pub fn is_in_memory(method: &str) -> bool {
    IN_MEMORY.contains(&method)
}

/// Query-language name of a remote pseudo-function
pub fn remote_function_name(method: &str) -> Option<&'static str> {
    REMOTE_FUNCTIONS
        .iter()
        .find(|(name, _)| *name == method)
        .map(|(_, remote)| *remote)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_function_names() {
        assert_eq!(remote_function_name("current_user"), Some("currentUser"));
        assert_eq!(
            remote_function_name("earliest_unreleased_version"),
            Some("earliestUnreleasedVersion")
        );
        assert_eq!(remote_function_name("where"), None);
    }

    #[test]
    fn test_translated_and_in_memory_are_disjoint() {
        assert!(TRANSLATED.iter().all(|m| !is_in_memory(m)));
        assert!(is_translated(TAKE));
        assert!(is_in_memory(SELECT));
    }
}
