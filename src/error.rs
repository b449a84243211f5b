use thiserror::Error;

/// Errors raised while turning declarations into a [`crate::CompiledGrammar`].
///
/// Compilation stops at the first one; no partially built grammar is returned.
#[derive(Debug, Error)]
pub enum GrammarError {
    #[error("multiple definitions of token {0}")]
    DuplicateTokenDeclaration(String),

    #[error("unknown token/rule {name} referenced in state {state}")]
    UnknownSymbol { state: String, name: String },

    #[error("start rule \"{}\" is not defined", crate::model::types::START)]
    MissingStartState,

    #[error("left recursion in state {0}")]
    LeftRecursionDetected(String),

    #[error("two rules of state {0} start with the same symbol")]
    AmbiguousRulePrefix(String),

    #[error("token {name} has an invalid pattern: {source}")]
    InvalidPattern {
        name: String,
        #[source]
        source: regex::Error,
    },

    #[error("{0} is a reserved name")]
    ReservedName(String),

    #[error("{0} is declared both as a token and as a state")]
    ConflictingSymbol(String),

    #[error("state {0} has a rule without symbols, use EPS for an empty rule")]
    EmptyRule(String),

    #[error("invalid action code in state {state}: {source}")]
    InvalidAction {
        state: String,
        #[source]
        source: ActionError,
    },

    #[error("more than one rule of state {state} can start with {token}")]
    OverlappingFirstSets { state: String, token: String },
}

/// Errors raised by a single `parse` call. The compiled grammar stays usable.
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("unable to match any token on position {position} (found {found:?})")]
    TokenizationFailure { position: usize, found: char },

    #[error("parse error at position {position}: expected {expected}, found {found}")]
    UnexpectedToken {
        position: usize,
        offset: usize,
        found: String,
        expected: String,
    },

    #[error("nesting deeper than {limit} states at position {position}")]
    RecursionLimit { position: usize, limit: usize },

    #[error("state {state} re-entered at position {position} without consuming input")]
    NoProgress { state: String, position: usize },

    #[error("action of state {state} failed: {source}")]
    Action {
        state: String,
        #[source]
        source: ActionError,
    },
}

impl ParseError {
    /// Token-stream index (or byte offset, for tokenization failures) the error points at.
    pub fn position(&self) -> Option<usize> {
        match self {
            ParseError::TokenizationFailure { position, .. } => Some(*position),
            ParseError::UnexpectedToken { position, .. }
            | ParseError::RecursionLimit { position, .. }
            | ParseError::NoProgress { position, .. } => Some(*position),
            ParseError::Action { .. } => None,
        }
    }
}

/// Failures of an [`crate::ActionEvaluator`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ActionError {
    #[error("syntax error at {offset}: {message}")]
    Syntax { offset: usize, message: String },

    #[error("child ${index} requested but the rule has {len} children")]
    MissingChild { index: usize, len: usize },

    #[error("unknown variable {0}")]
    UnknownVariable(String),

    #[error("unknown function {0}")]
    UnknownFunction(String),

    #[error("type error: {0}")]
    Type(String),

    #[error("division by zero")]
    DivisionByZero,

    #[error("integer overflow")]
    Overflow,

    #[error("cannot convert {0:?} to a number")]
    InvalidNumber(String),

    #[error("action code produced no value")]
    NoValue,
}
