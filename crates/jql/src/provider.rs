//! Query execution against a search backend.
//!
//! [`QueryProvider`] owns the field-metadata cache and drives one query
//! through folding, compilation, the remote search, and in-memory completion.
//! The transport itself is abstracted behind [`SearchExecutor`] so the
//! provider can run against any backend, including [`InMemorySearchExecutor`]
//! in tests.

use crate::expr::{ExprRef, Record, TypeRef, Value};
use crate::fields::FieldTable;
use crate::query::{
    source_entity, CompiledQuery, CompilerOptions, Functions, Interpreter, JqlCompiler,
    PartialEvaluator, ResultBinder, TracingObserver,
};
use anyhow::{Context, Result};
use serde::Serialize;
use std::sync::{Arc, Mutex, RwLock};
use tracing::debug;

/// Parameters of one remote search call
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchRequest {
    pub jql: String,
    pub start_at: u32,
    pub max_results: u32,
}

/// Runs a search request remotely
pub trait SearchExecutor {
    fn search(&self, request: &SearchRequest) -> Result<Vec<Record>>;
}

/// Supplies the field metadata table
pub trait FieldSource {
    fn fetch_fields(&self) -> Result<FieldTable>;
}

/// Field source backed by a prebuilt table
#[derive(Debug, Clone)]
pub struct StaticFields(pub FieldTable);

impl FieldSource for StaticFields {
    fn fetch_fields(&self) -> Result<FieldTable> {
        Ok(self.0.clone())
    }
}

/// Paging used when a query has no `skip` / `take`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PagingDefaults {
    pub start_at: u32,
    pub max_results: u32,
}

impl Default for PagingDefaults {
    fn default() -> Self {
        Self {
            start_at: 0,
            max_results: 500,
        }
    }
}

/// Entry point for running expression-tree queries.
///
/// The field table is fetched on first use and cached. Two threads racing on
/// the first query may both fetch; the first stored table wins.
pub struct QueryProvider<S: SearchExecutor, F: FieldSource> {
    executor: S,
    field_source: F,
    functions: Functions,
    options: CompilerOptions,
    paging: PagingDefaults,
    fields: RwLock<Option<Arc<FieldTable>>>,
}

impl<S: SearchExecutor, F: FieldSource> QueryProvider<S, F> {
    pub fn new(executor: S, field_source: F) -> Self {
        Self {
            executor,
            field_source,
            functions: Functions::default(),
            options: CompilerOptions::default(),
            paging: PagingDefaults::default(),
            fields: RwLock::new(None),
        }
    }

    pub fn with_functions(mut self, functions: Functions) -> Self {
        self.functions = functions;
        self
    }

    pub fn with_options(mut self, options: CompilerOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_paging(mut self, paging: PagingDefaults) -> Self {
        self.paging = paging;
        self
    }

    pub fn executor(&self) -> &S {
        &self.executor
    }

    /// Cached field table, fetched on first call
    pub fn fields(&self) -> Result<Arc<FieldTable>> {
        if let Some(table) = self
            .fields
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .as_ref()
        {
            return Ok(table.clone());
        }

        debug!("field cache miss, fetching field metadata");
        let fetched = Arc::new(
            self.field_source
                .fetch_fields()
                .context("Failed to fetch field metadata")?,
        );
        let mut cache = self
            .fields
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Ok(cache.get_or_insert(fetched).clone())
    }

    /// Fold and compile `expr` without searching
    pub fn compile(&self, expr: &ExprRef) -> Result<CompiledQuery> {
        let folded = PartialEvaluator::new(&self.functions).evaluate(expr)?;
        let fields = self.fields()?;
        let compiled = JqlCompiler::new(fields.as_ref(), &self.functions)
            .with_options(self.options)
            .with_observer(&TracingObserver)
            .compile(&folded)?;
        Ok(compiled)
    }

    /// Run `expr`: search remotely, then apply the in-memory remainder.
    ///
    /// Translation errors abort before any search request is made.
    pub fn execute(&self, expr: &ExprRef) -> Result<Value> {
        let folded = PartialEvaluator::new(&self.functions).evaluate(expr)?;
        let fields = self.fields()?;
        let compiled = JqlCompiler::new(fields.as_ref(), &self.functions)
            .with_options(self.options)
            .with_observer(&TracingObserver)
            .compile(&folded)?;

        let request = SearchRequest {
            jql: compiled.jql,
            start_at: compiled.start_at.unwrap_or(self.paging.start_at),
            max_results: compiled.max_results.unwrap_or(self.paging.max_results),
        };
        debug!(
            jql = %request.jql,
            start_at = request.start_at,
            max_results = request.max_results,
            "executing search"
        );
        let records = self
            .executor
            .search(&request)
            .with_context(|| format!("Search failed for query: {}", request.jql))?;
        debug!(count = records.len(), "search returned");

        let element = source_entity(&folded)
            .map(TypeRef::record)
            .unwrap_or_default();
        let results = records.into_iter().map(Value::Record).collect();
        let bound = ResultBinder::new(results, element).bind(&folded);

        let value = Interpreter::new(&self.functions)
            .eval(&bound)
            .context("Failed to apply in-memory operators to search results")?;
        Ok(value)
    }
}

/// Search backend over a fixed record set, recording every request
#[derive(Debug, Default)]
pub struct InMemorySearchExecutor {
    records: Vec<Record>,
    requests: Mutex<Vec<SearchRequest>>,
}

impl InMemorySearchExecutor {
    pub fn new(records: Vec<Record>) -> Self {
        Self {
            records,
            requests: Mutex::new(Vec::new()),
        }
    }

    pub fn requests(&self) -> Vec<SearchRequest> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }
}

impl SearchExecutor for InMemorySearchExecutor {
    /// Applies paging only; the query text is not interpreted
    fn search(&self, request: &SearchRequest) -> Result<Vec<Record>> {
        self.requests
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(request.clone());
        Ok(self
            .records
            .iter()
            .skip(request.start_at as usize)
            .take(request.max_results as usize)
            .cloned()
            .collect())
    }
}
