//! Translation errors and their actionable rendering.
//!
//! [`JqlError`] is what the compiler and partial evaluator return. Every
//! variant aborts the query before anything is sent to the search server.
//! [`ActionableError`] wraps a message with possible causes and remediation
//! steps for display on the command line.

use crate::query::EvalError;
use std::fmt;
use thiserror::Error;

/// Errors raised while translating an expression into query text
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JqlError {
    /// A compared member could not be mapped to a remote field
    #[error("Schema error: {0}")]
    Schema(String),

    /// The tree contains a method or operator without a translation
    #[error("Unsupported operation '{symbol}': {reason}")]
    UnsupportedOperation { symbol: String, reason: String },

    /// Local evaluation of a closed subtree failed
    #[error("Evaluation failed: {0}")]
    Evaluation(#[from] EvalError),
}

impl JqlError {
    pub fn unsupported(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        JqlError::UnsupportedOperation {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Stable machine-readable code for JSON error output
    pub fn code(&self) -> &'static str {
        match self {
            JqlError::Schema(_) => "SCHEMA_ERROR",
            JqlError::UnsupportedOperation { .. } => "UNSUPPORTED_OPERATION",
            JqlError::Evaluation(_) => "EVALUATION_FAILED",
        }
    }

    /// Attach likely causes and fixes
    pub fn to_actionable(&self) -> ActionableError {
        match self {
            JqlError::Schema(_) => ActionableError::new(self.to_string())
                .with_cause("The property has no field metadata")
                .with_cause("The field table was loaded for a different entity type")
                .with_remedy("List known fields: jql fields")
                .with_remedy("Declare the field under [fields.<Owner>.<name>] in jql.toml"),
            JqlError::UnsupportedOperation { symbol, .. } => {
                ActionableError::new(self.to_string())
                    .with_cause(format!("'{}' has no query-language translation", symbol))
                    .with_cause("A local computation could not be folded to a constant")
                    .with_remedy("Move the computation out of the query and capture its result")
                    .with_remedy("Apply in-memory operators after the search (select, count, first)")
            }
            JqlError::Evaluation(_) => ActionableError::new(self.to_string())
                .with_cause("A captured value or local function failed while folding constants")
                .with_remedy("Check the arguments passed to local functions in the query"),
        }
    }
}

/// An error with diagnostic context and remediation steps.
///
/// # Example
///
/// ```
/// use jql::errors::ActionableError;
///
/// let error = ActionableError::new("Field 'Issue.sprint' is not searchable")
///     .with_cause("The property has no field metadata")
///     .with_remedy("List known fields: jql fields");
///
/// assert!(error.to_error_message().contains("To fix:"));
/// ```
#[derive(Debug, Clone)]
pub struct ActionableError {
    error: String,
    causes: Vec<String>,
    remediation: Vec<String>,
}

impl ActionableError {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            causes: Vec::new(),
            remediation: Vec::new(),
        }
    }

    /// Add a possible cause (diagnostic hint).
    pub fn with_cause(mut self, cause: impl Into<String>) -> Self {
        self.causes.push(cause.into());
        self
    }

    /// Add a remediation step.
    pub fn with_remedy(mut self, remedy: impl Into<String>) -> Self {
        self.remediation.push(remedy.into());
        self
    }

    pub fn causes(&self) -> &[String] {
        &self.causes
    }

    pub fn remedies(&self) -> &[String] {
        &self.remediation
    }

    /// Convert to a formatted error message suitable for display.
    pub fn to_error_message(&self) -> String {
        let mut msg = format!("Error: {}\n", self.error);

        if !self.causes.is_empty() {
            msg.push_str("\nPossible causes:\n");
            for cause in &self.causes {
                msg.push_str(&format!("  • {}\n", cause));
            }
        }

        if !self.remediation.is_empty() {
            msg.push_str("\nTo fix:\n");
            for remedy in &self.remediation {
                msg.push_str(&format!("  • {}\n", remedy));
            }
        }

        msg
    }
}

impl fmt::Display for ActionableError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_error_message())
    }
}

impl std::error::Error for ActionableError {}
