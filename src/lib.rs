//! Compiles attribute grammars into predictive LL(1) tables.
//!
//! A grammar arrives as [`Declarations`]: named token regexes and rules whose
//! action code refers to child attributes as `$0`, `$1`, ... Compilation
//! validates it (start state, left recursion, rule prefixes), computes FIRST
//! and FOLLOW sets and builds the predictive table. The resulting
//! [`CompiledGrammar`] tokenizes and parses input, evaluating actions bottom-up
//! into a single value.
//!
//! ```ignore
//! let decls = GrammarBuilder::new()
//!     .token("NUM", r"\d+")
//!     .token("PLUS", r"\+")
//!     .rule("s", "NUM PLUS NUM", "int($0) + int($2)")
//!     .build();
//!
//! let grammar = ll1_attr::compile(&decls)?;
//! assert_eq!(grammar.parse("2+3")?, Value::Int(5));
//! ```

pub mod action;
pub mod analyzer;
pub mod builder;
pub mod config;
pub mod error;
pub mod model;
pub mod parser;

pub use action::{ActionEvaluator, ExprEvaluator, Program, Value};
pub use config::CompileOptions;
pub use error::{ActionError, GrammarError, ParseError};
pub use model::{
    grammar::{Declarations, Grammar, GrammarBuilder},
    types::{Symbol, Terminal, EOF, EPSILON, START},
};
pub use parser::{
    ll1::CompiledGrammar,
    types::{ParseStep, PredictiveTable, Token},
};

/// Compiles with the built-in expression evaluator and default options.
pub fn compile(decls: &Declarations) -> Result<CompiledGrammar, GrammarError> {
    CompiledGrammar::new(decls, ExprEvaluator, CompileOptions::default())
}

pub fn compile_with<E: ActionEvaluator>(
    decls: &Declarations,
    evaluator: E,
    options: CompileOptions,
) -> Result<CompiledGrammar<E>, GrammarError> {
    CompiledGrammar::new(decls, evaluator, options)
}
