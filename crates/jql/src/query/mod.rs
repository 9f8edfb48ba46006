//! From expression trees to search requests and back.
//!
//! The pipeline for one query:
//!
//! 1. [`PartialEvaluator`] folds everything that does not depend on the
//!    current item (captured locals, local function calls, arithmetic).
//! 2. [`JqlCompiler`] turns the folded tree into query text plus paging.
//! 3. The search runs remotely (see [`crate::provider`]).
//! 4. [`ResultBinder`] splices the returned records into the tree and the
//!    [`Interpreter`] runs whatever the server could not (`select`, `count`).

mod compiler;
mod evaluator;
mod literal;
pub mod methods;
mod observer;
mod partial_eval;
mod rebind;

pub use compiler::{CompiledQuery, CompilerOptions, JqlCompiler};
pub use evaluator::{EvalError, Functions, Interpreter, LocalFn};
pub use literal::{LiteralFormatter, Separator};
pub use observer::{CompileObserver, NoopObserver, TracingObserver};
pub use partial_eval::PartialEvaluator;
pub use rebind::{source_entity, ResultBinder};
