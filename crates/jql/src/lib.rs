//! JQL Query Compiler Library
//!
//! Compose issue queries as expression trees, translate them into JQL search
//! text with paging parameters, and finish any in-memory operators against
//! the records a search returns.

pub mod cli;
pub mod config;
pub mod domain;
pub mod errors;
pub mod expr;
pub mod fields;
pub mod output;
pub mod provider;
pub mod query;

// Re-export commonly used types
pub use domain::{Entity, Issue};
pub use errors::JqlError;
pub use expr::{Expr, ExprExt, ExprRef, Query};
pub use output::{ExitCode, JsonError, JsonOutput};
pub use provider::{InMemorySearchExecutor, QueryProvider, SearchExecutor, SearchRequest};
pub use query::{CompiledQuery, JqlCompiler};
