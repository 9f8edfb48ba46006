//! Command-line interface definitions using clap.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// JQL query compiler
///
/// Compiles issue query expression trees (JSON) into JQL search text.
///
/// Exit Codes:
///   0  - Command succeeded
///   1  - Generic error occurred
///   2  - Invalid arguments, unreadable input or configuration
///   4  - The expression cannot be translated
///  10  - External failure (file system)
#[derive(Parser)]
#[command(name = "jql")]
#[command(about = "Compile issue query expressions into JQL", long_about = None)]
pub struct Cli {
    /// Suppress non-essential output (for scripting)
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Configuration file
    #[arg(long, global = true, env = "JQL_CONFIG", default_value = "jql.toml")]
    pub config: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Compile an expression tree into query text and paging parameters
    ///
    /// Closed subexpressions are folded to constants first.
    Compile {
        /// Path to the expression JSON, or '-' for stdin
        input: String,

        /// Compile the tree as given, without constant folding
        #[arg(long)]
        no_fold: bool,
    },

    /// List searchable fields and their capabilities
    Fields,

    /// Print the JSON schema of expression trees
    Schema,
}

impl Commands {
    pub fn name(&self) -> &'static str {
        match self {
            Commands::Compile { .. } => "compile",
            Commands::Fields => "fields",
            Commands::Schema => "schema",
        }
    }
}
