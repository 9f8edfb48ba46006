//! JQL Query Compiler
//!
//! Reads a JSON expression tree, folds its closed subexpressions and prints
//! the JQL text together with the paging parameters the search would use.

use anyhow::{Context, Result};
use clap::Parser;
use jql::cli::{Cli, Commands};
use jql::config::JqlConfig;
use jql::domain::{Entity, Issue};
use jql::errors::JqlError;
use jql::expr::{Expr, ExprRef};
use jql::fields::FieldTable;
use jql::output::{ErrorCode, ExitCode, FieldsResponse, JsonError, JsonOutput, OutputContext};
use jql::query::{Functions, JqlCompiler, PartialEvaluator, TracingObserver};
use std::io::Read;
use tracing::debug;
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_env("JQL_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

/// Stable error code for a failed command
fn error_code(error: &anyhow::Error) -> &'static str {
    for cause in error.chain() {
        if let Some(err) = cause.downcast_ref::<JqlError>() {
            return err.code();
        }
        if cause.downcast_ref::<serde_json::Error>().is_some() {
            return ErrorCode::PARSE_ERROR;
        }
        if cause.downcast_ref::<toml::de::Error>().is_some() {
            return ErrorCode::CONFIG_ERROR;
        }
        if cause.downcast_ref::<std::io::Error>().is_some() {
            return ErrorCode::IO_ERROR;
        }
    }
    "GENERIC_ERROR"
}

fn report(error: &anyhow::Error, command: &str, output: &OutputContext) -> ExitCode {
    let translation = error.chain().find_map(|c| c.downcast_ref::<JqlError>());

    let json_error = match translation {
        Some(err) => JsonError::from_jql_error(err, command),
        None => JsonError::new(error_code(error), format!("{:#}", error), command),
    };
    let exit_code = json_error.exit_code();

    let printed = if output.is_json() {
        match json_error.to_json_string() {
            Ok(json) => {
                println!("{}", json);
                true
            }
            Err(_) => false,
        }
    } else {
        let message = match translation {
            Some(err) => err.to_actionable().to_error_message(),
            None => format!("Error: {:#}", error),
        };
        output.print_error(message).is_ok()
    };
    if !printed {
        eprintln!("Error: {:#}", error);
    }
    exit_code
}

fn main() {
    let cli = Cli::parse();
    init_tracing();

    let output = OutputContext::new(cli.quiet, cli.json);
    let exit_code = match run(&cli, &output) {
        Ok(()) => ExitCode::Success,
        Err(e) => report(&e, cli.command.name(), &output),
    };

    if exit_code != ExitCode::Success {
        std::process::exit(exit_code.code());
    }
}

fn run(cli: &Cli, output: &OutputContext) -> Result<()> {
    let config = JqlConfig::load(&cli.config).context("Failed to load configuration")?;

    match &cli.command {
        Commands::Compile { input, no_fold } => {
            let tree = read_tree(input)?;
            let fields = field_table(&config)?;
            let functions = Functions::default();

            let tree = if *no_fold {
                tree
            } else {
                PartialEvaluator::new(&functions).evaluate(&tree)?
            };
            let compiled = JqlCompiler::new(&fields, &functions)
                .with_options(config.compiler_options())
                .with_observer(&TracingObserver)
                .compile(&tree)?;

            if output.is_json() {
                let json = JsonOutput::success(&compiled, "compile").to_json_string()?;
                println!("{}", json);
            } else {
                let paging = config.paging_defaults();
                output.print_data(&compiled.jql)?;
                output.print_info(format!(
                    "startAt: {}",
                    compiled.start_at.unwrap_or(paging.start_at)
                ))?;
                output.print_info(format!(
                    "maxResults: {}",
                    compiled.max_results.unwrap_or(paging.max_results)
                ))?;
            }
        }
        Commands::Fields => {
            let fields = field_table(&config)?;
            let response = FieldsResponse::from_table(&fields);
            if output.is_json() {
                println!("{}", JsonOutput::success(&response, "fields").to_json_string()?);
            } else {
                for entry in &response.fields {
                    output.print_data(format!(
                        "{:<28} {:<18} {}",
                        entry.property,
                        entry.remote,
                        entry.flags.join("|")
                    ))?;
                }
                output.print_info(format!("\n{} field(s)", response.count))?;
            }
        }
        Commands::Schema => {
            let schema = schemars::schema_for!(Expr);
            println!("{}", serde_json::to_string_pretty(&schema)?);
        }
    }

    Ok(())
}

/// Issue fields plus any declared in configuration
fn field_table(config: &JqlConfig) -> Result<FieldTable> {
    let mut fields = Issue::field_table().clone();
    let configured = config
        .field_table()
        .context("Invalid [fields] configuration")?;
    debug!(count = configured.len(), "configured fields");
    fields.merge(&configured);
    Ok(fields)
}

fn read_tree(input: &str) -> Result<ExprRef> {
    let text = if input == "-" {
        let mut text = String::new();
        std::io::stdin()
            .read_to_string(&mut text)
            .context("Failed to read expression from stdin")?;
        text
    } else {
        std::fs::read_to_string(input).with_context(|| format!("Failed to read {}", input))?
    };
    let tree: ExprRef =
        serde_json::from_str(&text).context("Failed to parse expression tree JSON")?;
    Ok(tree)
}
