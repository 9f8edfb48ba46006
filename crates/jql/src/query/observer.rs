//! Hooks into the compiler's walk, for diagnostics.

use super::compiler::CompiledQuery;
use crate::expr::Expr;
use tracing::{debug, trace};

/// Receives compiler progress. All methods default to doing nothing.
pub trait CompileObserver {
    /// A node is about to be compiled at `depth`
    fn enter(&self, _node: &Expr, _depth: usize) {}

    /// A fragment was appended to the query text
    fn emit(&self, _fragment: &str) {}

    fn finish(&self, _query: &CompiledQuery) {}
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl CompileObserver for NoopObserver {}

/// Forwards compiler progress to `tracing`
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingObserver;

impl CompileObserver for TracingObserver {
    fn enter(&self, node: &Expr, depth: usize) {
        trace!(depth, node = node.kind(), "compile");
    }

    fn emit(&self, fragment: &str) {
        trace!(fragment, "emit");
    }

    fn finish(&self, query: &CompiledQuery) {
        debug!(
            jql = %query.jql,
            start_at = ?query.start_at,
            max_results = ?query.max_results,
            "compiled query"
        );
    }
}
