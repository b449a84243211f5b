use std::collections::HashMap;

use tabled::Tabled;

use crate::model::types::Terminal;

/// One element of a token stream. The stream always ends with a
/// `Terminal::EOF` token carrying empty text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    pub kind: Terminal,
    pub text: String,
    pub offset: usize, // byte offset into the input
}

impl Token {
    pub fn name(&self) -> &str {
        self.kind.name()
    }
}

/// `(state, lookahead token) -> rule index`, plus the empty-production rule
/// of each nullable state. Read-only once built.
#[derive(Debug, Clone, Default)]
pub struct PredictiveTable {
    entries: HashMap<(String, String), usize>,
    empty: HashMap<String, usize>,
}

impl PredictiveTable {
    pub(crate) fn insert(&mut self, state: &str, token: &str, alternative: usize) {
        self.entries
            .insert((state.to_string(), token.to_string()), alternative);
    }

    pub(crate) fn insert_empty(&mut self, state: &str, alternative: usize) {
        self.empty.insert(state.to_string(), alternative);
    }

    pub fn get(&self, state: &str, token: &str) -> Option<usize> {
        self.entries
            .get(&(state.to_string(), token.to_string()))
            .copied()
    }

    pub fn empty_production(&self, state: &str) -> Option<usize> {
        self.empty.get(state).copied()
    }

    /// Tokens with an entry for `state`, sorted.
    pub fn expected(&self, state: &str) -> Vec<&str> {
        let mut tokens: Vec<&str> = self
            .entries
            .keys()
            .filter(|(s, _)| s == state)
            .map(|(_, token)| token.as_str())
            .collect();
        tokens.sort();
        tokens
    }

    pub fn len(&self) -> usize {
        self.entries.len() + self.empty.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A single step of the tree/attribute engine, recorded by
/// [`crate::CompiledGrammar::parse_with_trace`].
#[derive(Debug, Clone)]
pub struct ParseStep {
    pub depth: usize,
    pub symbol: String,
    pub position: usize,
    pub lookahead: String,
    pub action: String,
}

#[derive(Tabled)]
pub struct TraceRow {
    #[tabled(rename = "Step")]
    pub step: usize,

    #[tabled(rename = "Symbol")]
    pub symbol: String,

    #[tabled(rename = "Position")]
    pub position: usize,

    #[tabled(rename = "Lookahead")]
    pub lookahead: String,

    #[tabled(rename = "Action")]
    pub action: String,
}
