//! Configuration file loading and parsing.
//!
//! Settings live in `jql.toml`. Every section and key is optional; a missing
//! file yields the defaults.
//!
//! ```toml
//! [compiler]
//! legacy_or_spacing = false
//! escape_quotes = false
//!
//! [paging]
//! start_at = 0
//! max_results = 500
//!
//! [fields.Issue.story_points]
//! remote = "cf[10004]"
//! flags = ["comparable", "sortable"]
//! ```

use crate::fields::{CompareFlags, FieldDescriptor, FieldTable};
use crate::expr::MemberId;
use crate::provider::PagingDefaults;
use crate::query::CompilerOptions;
use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// Default configuration file name
pub const CONFIG_FILE: &str = "jql.toml";

/// Root configuration structure loaded from `jql.toml`.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct JqlConfig {
    /// Output formatting (optional).
    pub compiler: Option<CompilerConfig>,
    /// Paging defaults for queries without skip/take (optional).
    pub paging: Option<PagingConfig>,
    /// Extra field metadata, keyed by owner type then property name (optional).
    pub fields: Option<BTreeMap<String, BTreeMap<String, FieldConfig>>>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompilerConfig {
    /// Emit `OR` without a trailing space (default: false).
    pub legacy_or_spacing: Option<bool>,
    /// Escape quotes inside literals (default: false).
    pub escape_quotes: Option<bool>,
}

impl CompilerConfig {
    pub fn legacy_or_spacing(&self) -> bool {
        self.legacy_or_spacing.unwrap_or(false)
    }

    pub fn escape_quotes(&self) -> bool {
        self.escape_quotes.unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PagingConfig {
    /// Default start offset (default: 0).
    pub start_at: Option<u32>,
    /// Default page size (default: 500).
    pub max_results: Option<u32>,
}

/// One field declaration
#[derive(Debug, Clone, Deserialize)]
pub struct FieldConfig {
    /// Remote search field name
    pub remote: String,
    /// Capability names: comparable, sortable, contains, include, check,
    /// was, was_include, changed
    #[serde(default)]
    pub flags: Vec<String>,
}

impl JqlConfig {
    /// Load configuration from `path` if it exists.
    ///
    /// Returns the default config if the file doesn't exist.
    /// Returns an error if the file exists but is malformed.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(JqlConfig::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;

        Self::from_toml_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: JqlConfig = toml::from_str(content)?;
        Ok(config)
    }

    pub fn compiler_options(&self) -> CompilerOptions {
        let compiler = self.compiler.clone().unwrap_or_default();
        CompilerOptions {
            legacy_or_spacing: compiler.legacy_or_spacing(),
            escape_quotes: compiler.escape_quotes(),
        }
    }

    pub fn paging_defaults(&self) -> PagingDefaults {
        let defaults = PagingDefaults::default();
        match &self.paging {
            Some(paging) => PagingDefaults {
                start_at: paging.start_at.unwrap_or(defaults.start_at),
                max_results: paging.max_results.unwrap_or(defaults.max_results),
            },
            None => defaults,
        }
    }

    /// Field table declared in `[fields]`; fails on an unknown flag name
    pub fn field_table(&self) -> Result<FieldTable> {
        let mut table = FieldTable::new();
        let Some(owners) = &self.fields else {
            return Ok(table);
        };

        for (owner, members) in owners {
            for (name, field) in members {
                let mut flags = CompareFlags::NONE;
                for flag in &field.flags {
                    flags |= CompareFlags::from_name(flag).ok_or_else(|| {
                        anyhow!("Unknown flag '{}' on field {}.{}", flag, owner, name)
                    })?;
                }
                table.insert(
                    MemberId::new(owner.as_str(), name.as_str()),
                    FieldDescriptor::new(field.remote.as_str(), flags),
                );
            }
        }
        Ok(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::FieldLookup;
    use tempfile::TempDir;

    #[test]
    fn test_parse_minimal_config() {
        let config = JqlConfig::from_toml_str("[compiler]\nescape_quotes = true\n").unwrap();
        assert!(config.compiler.is_some());
        assert!(config.paging.is_none());
        assert!(config.compiler_options().escape_quotes);
        assert!(!config.compiler_options().legacy_or_spacing);
    }

    #[test]
    fn test_paging_defaults_fill_missing_keys() {
        let config = JqlConfig::from_toml_str("[paging]\nmax_results = 50\n").unwrap();
        assert_eq!(
            config.paging_defaults(),
            PagingDefaults {
                start_at: 0,
                max_results: 50
            }
        );
        assert_eq!(JqlConfig::default().paging_defaults().max_results, 500);
    }

    #[test]
    fn test_field_table_from_config() {
        let config = JqlConfig::from_toml_str(
            r#"
[fields.Issue.story_points]
remote = "cf[10004]"
flags = ["comparable", "sortable"]

[fields.Issue.team]
remote = "Team"
"#,
        )
        .unwrap();
        let table = config.field_table().unwrap();
        assert_eq!(table.len(), 2);
        let points = table.lookup(&MemberId::new("Issue", "story_points")).unwrap();
        assert_eq!(points.remote_name, "cf[10004]");
        assert!(points.allows(CompareFlags::SORTABLE));
        let team = table.lookup(&MemberId::new("Issue", "team")).unwrap();
        assert_eq!(team.flags, CompareFlags::NONE);
    }

    #[test]
    fn test_unknown_flag_is_error() {
        let config = JqlConfig::from_toml_str(
            "[fields.Issue.x]\nremote = \"x\"\nflags = [\"fuzzy\"]\n",
        )
        .unwrap();
        let err = config.field_table().unwrap_err();
        assert!(err.to_string().contains("'fuzzy'"));
    }

    #[test]
    fn test_load_missing_config() {
        let temp_dir = TempDir::new().unwrap();
        let config = JqlConfig::load(&temp_dir.path().join(CONFIG_FILE)).unwrap();
        assert!(config.compiler.is_none());
        assert!(config.fields.is_none());
    }

    #[test]
    fn test_load_existing_config() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[compiler]\nlegacy_or_spacing = true\n").unwrap();

        let config = JqlConfig::load(&path).unwrap();
        assert!(config.compiler_options().legacy_or_spacing);
    }

    #[test]
    fn test_malformed_toml_returns_error() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join(CONFIG_FILE);
        std::fs::write(&path, "[broken syntax").unwrap();

        let err = JqlConfig::load(&path).unwrap_err();
        assert!(err.to_string().contains("Failed to parse"));
    }
}
