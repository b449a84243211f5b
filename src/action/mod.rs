//! The boundary between the grammar engine and the language of rule actions.
//!
//! The engine only ever hands an evaluator a snippet of code plus the ordered
//! attributes of a rule's children, and expects exactly one value back.

pub mod interpreter;

use crate::error::ActionError;

pub use interpreter::{ExprEvaluator, Program, Value};

pub trait ActionEvaluator {
    type Value;

    /// Action code in whatever form `evaluate` runs it. Prepared once per rule
    /// while compiling and reused by every parse.
    type Program;

    /// Attribute of a matched token.
    fn leaf(&self, text: &str) -> Self::Value;

    fn prepare(&self, code: &str) -> Result<Self::Program, ActionError>;

    /// Runs `program` with `children[i]` bound to `$i`.
    fn evaluate(
        &self,
        program: &Self::Program,
        children: Vec<Self::Value>,
    ) -> Result<Self::Value, ActionError>;

    /// Static check of a prepared rule action; `arity` is the number of
    /// children the rule produces.
    fn check(&self, _program: &Self::Program, _arity: usize) -> Result<(), ActionError> {
        Ok(())
    }
}
