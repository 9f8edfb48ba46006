//! Structured output formatting for CLI commands.
//!
//! Success and error results share one JSON envelope so scripts can rely on
//! `success`, `data`/`error` and `metadata` being present.

use chrono::Utc;
use schemars::JsonSchema;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::fmt::Display;
use std::io::{self, Write};

use crate::errors::JqlError;
use crate::fields::FieldTable;

/// Version of the JSON output format
const OUTPUT_VERSION: &str = "0.1.0";

/// Controls output verbosity
pub struct OutputContext {
    quiet: bool,
    json: bool,
}

impl OutputContext {
    pub fn new(quiet: bool, json: bool) -> Self {
        Self { quiet, json }
    }

    /// Print essential output (always shown unless --json)
    pub fn print_data(&self, msg: impl Display) -> io::Result<()> {
        if !self.json {
            writeln_safe(&format!("{}", msg))
        } else {
            Ok(())
        }
    }

    /// Print informational message (suppressed by --quiet or --json)
    pub fn print_info(&self, msg: impl Display) -> io::Result<()> {
        if !self.quiet && !self.json {
            writeln_safe(&format!("{}", msg))
        } else {
            Ok(())
        }
    }

    /// Print error (always shown to stderr)
    pub fn print_error(&self, msg: impl Display) -> io::Result<()> {
        writeln_safe_stderr(&format!("{}", msg))
    }

    pub fn is_json(&self) -> bool {
        self.json
    }
}

/// println that exits quietly on a closed pipe
fn writeln_safe(msg: &str) -> io::Result<()> {
    match writeln!(io::stdout(), "{}", msg) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => std::process::exit(0),
        Err(e) => Err(e),
    }
}

fn writeln_safe_stderr(msg: &str) -> io::Result<()> {
    match writeln!(io::stderr(), "{}", msg) {
        Ok(_) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::BrokenPipe => std::process::exit(0),
        Err(e) => Err(e),
    }
}

/// Wrapper for successful command output with metadata
#[derive(Debug, Serialize)]
pub struct JsonOutput<T: Serialize> {
    pub success: bool,
    pub data: T,
    pub metadata: Metadata,
}

impl<T: Serialize> JsonOutput<T> {
    pub fn success(data: T, command: impl Into<String>) -> Self {
        Self {
            success: true,
            data,
            metadata: Metadata::new(command),
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

/// Wrapper for error output with suggestions
#[derive(Debug, Serialize)]
pub struct JsonError {
    pub success: bool,
    pub error: ErrorDetail,
    pub metadata: Metadata,
}

impl JsonError {
    pub fn new(
        code: impl Into<String>,
        message: impl Into<String>,
        command: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            error: ErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
                suggestions: Vec::new(),
            },
            metadata: Metadata::new(command),
        }
    }

    pub fn with_details(mut self, details: Value) -> Self {
        self.error.details = Some(details);
        self
    }

    pub fn with_suggestions(mut self, suggestions: Vec<String>) -> Self {
        self.error.suggestions.extend(suggestions);
        self
    }

    /// Envelope for a translation error, carrying its remedies
    pub fn from_jql_error(err: &JqlError, command: impl Into<String>) -> Self {
        let error = Self::new(err.code(), err.to_string(), command)
            .with_suggestions(err.to_actionable().remedies().to_vec());
        match err {
            JqlError::UnsupportedOperation { symbol, .. } => {
                error.with_details(serde_json::json!({ "symbol": symbol }))
            }
            _ => error,
        }
    }

    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    pub fn exit_code(&self) -> ExitCode {
        ErrorCode::to_exit_code(&self.error.code)
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorDetail {
    /// Error code (e.g., "SCHEMA_ERROR", "PARSE_ERROR")
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<Value>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

/// Process exit codes for the `jql` binary
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum ExitCode {
    Success = 0,
    GenericError = 1,
    /// Unreadable input or bad arguments
    InvalidArgument = 2,
    /// The expression cannot be translated
    TranslationFailed = 4,
    /// File system or other external failure
    ExternalError = 10,
}

impl ExitCode {
    pub fn code(self) -> i32 {
        self as i32
    }
}

/// Error codes used in JSON error envelopes
pub struct ErrorCode;

impl ErrorCode {
    pub const SCHEMA_ERROR: &'static str = "SCHEMA_ERROR";
    pub const UNSUPPORTED_OPERATION: &'static str = "UNSUPPORTED_OPERATION";
    pub const EVALUATION_FAILED: &'static str = "EVALUATION_FAILED";
    pub const INVALID_ARGUMENT: &'static str = "INVALID_ARGUMENT";
    pub const PARSE_ERROR: &'static str = "PARSE_ERROR";
    pub const CONFIG_ERROR: &'static str = "CONFIG_ERROR";
    pub const IO_ERROR: &'static str = "IO_ERROR";

    pub fn to_exit_code(code: &str) -> ExitCode {
        match code {
            Self::SCHEMA_ERROR | Self::UNSUPPORTED_OPERATION | Self::EVALUATION_FAILED => {
                ExitCode::TranslationFailed
            }
            Self::INVALID_ARGUMENT | Self::PARSE_ERROR | Self::CONFIG_ERROR => {
                ExitCode::InvalidArgument
            }
            Self::IO_ERROR => ExitCode::ExternalError,
            _ => ExitCode::GenericError,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct Metadata {
    #[serde(serialize_with = "serialize_timestamp")]
    pub timestamp: chrono::DateTime<Utc>,
    pub version: String,
    pub command: String,
}

impl Metadata {
    fn new(command: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            version: OUTPUT_VERSION.to_string(),
            command: command.into(),
        }
    }
}

fn serialize_timestamp<S>(dt: &chrono::DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error>
where
    S: Serializer,
{
    serializer.serialize_str(&dt.to_rfc3339())
}

/// One row of the `fields` command
#[derive(Debug, Serialize, JsonSchema)]
pub struct FieldEntry {
    pub property: String,
    pub remote: String,
    pub flags: Vec<String>,
}

/// Response for the `fields` command
#[derive(Debug, Serialize, JsonSchema)]
pub struct FieldsResponse {
    pub fields: Vec<FieldEntry>,
    pub count: usize,
}

impl FieldsResponse {
    pub fn from_table(table: &FieldTable) -> Self {
        let fields: Vec<FieldEntry> = table
            .iter()
            .map(|(member, descriptor)| FieldEntry {
                property: member.to_string(),
                remote: descriptor.remote_name.clone(),
                flags: descriptor
                    .flags
                    .names()
                    .into_iter()
                    .map(String::from)
                    .collect(),
            })
            .collect();
        let count = fields.len();
        Self { fields, count }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fields::CompareFlags;
    use serde_json::json;

    #[test]
    fn test_json_output_success() {
        let output = JsonOutput::success(json!({"jql": "status = \"Open\""}), "compile");

        assert!(output.success);
        assert_eq!(output.data["jql"], "status = \"Open\"");
        assert_eq!(output.metadata.version, "0.1.0");
        assert_eq!(output.metadata.command, "compile");
    }

    #[test]
    fn test_json_output_serialization() {
        let output = JsonOutput::success(json!({"count": 2}), "fields");

        let json_str = output.to_json_string().unwrap();
        assert!(json_str.contains("\"success\": true"));
        assert!(json_str.contains("\"timestamp\":"));
        assert!(json_str.contains("\"command\": \"fields\""));
    }

    #[test]
    fn test_error_from_unsupported_operation() {
        let err = JqlError::unsupported("sounds_like", "method has no query-language translation");
        let error = JsonError::from_jql_error(&err, "compile");

        assert!(!error.success);
        assert_eq!(error.error.code, ErrorCode::UNSUPPORTED_OPERATION);
        assert_eq!(error.error.details, Some(json!({"symbol": "sounds_like"})));
        assert!(!error.error.suggestions.is_empty());
        assert_eq!(error.exit_code(), ExitCode::TranslationFailed);
    }

    #[test]
    fn test_exit_code_mapping() {
        assert_eq!(ErrorCode::to_exit_code(ErrorCode::PARSE_ERROR), ExitCode::InvalidArgument);
        assert_eq!(ErrorCode::to_exit_code(ErrorCode::IO_ERROR), ExitCode::ExternalError);
        assert_eq!(ErrorCode::to_exit_code("SOMETHING_ELSE"), ExitCode::GenericError);
        assert_eq!(ExitCode::TranslationFailed.code(), 4);
    }

    #[test]
    fn test_fields_response_lists_flags() {
        let table = FieldTable::new().with(
            "Issue",
            "priority",
            "priority",
            CompareFlags::COMPARABLE | CompareFlags::SORTABLE,
        );
        let response = FieldsResponse::from_table(&table);
        assert_eq!(response.count, 1);
        assert_eq!(response.fields[0].property, "Issue.priority");
        assert_eq!(response.fields[0].flags, vec!["comparable", "sortable"]);
    }
}
