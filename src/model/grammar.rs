use std::collections::HashMap;

use log::debug;
use regex::Regex;
use tabled::{builder, Table};

use crate::{
    analyzer,
    error::GrammarError,
    model::types::{Alternative, Production, Symbol, EOF, EPSILON, START},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TokenDecl {
    pub name: String,
    pub pattern: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDecl {
    pub state: String,
    pub symbols: Vec<String>,
    pub action: String,
}

/// The structured hand-off from a grammar-file front end: token declarations
/// and rules, both in declaration order, symbols still unresolved.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Declarations {
    pub tokens: Vec<TokenDecl>,
    pub rules: Vec<RuleDecl>,
}

impl Declarations {
    pub fn push_token(&mut self, name: impl Into<String>, pattern: impl Into<String>) {
        self.tokens.push(TokenDecl {
            name: name.into(),
            pattern: pattern.into(),
        });
    }

    pub fn push_rule(
        &mut self,
        state: impl Into<String>,
        symbols: Vec<String>,
        action: impl Into<String>,
    ) {
        self.rules.push(RuleDecl {
            state: state.into(),
            symbols,
            action: action.into(),
        });
    }
}

/// Fluent construction of [`Declarations`]; rule symbols are given as one
/// whitespace separated string.
///
/// ```ignore
/// let decls = GrammarBuilder::new()
///     .token("NUM", r"\d+")
///     .token("PLUS", r"\+")
///     .rule("s", "NUM PLUS NUM", "int($0) + int($2)")
///     .build();
/// ```
#[derive(Debug, Default)]
pub struct GrammarBuilder {
    decls: Declarations,
}

impl GrammarBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn token(mut self, name: &str, pattern: &str) -> Self {
        self.decls.push_token(name, pattern);
        self
    }

    pub fn rule(mut self, state: &str, symbols: &str, action: &str) -> Self {
        let symbols = symbols.split_whitespace().map(str::to_string).collect();
        self.decls.push_rule(state, symbols, action);
        self
    }

    pub fn build(self) -> Declarations {
        self.decls
    }
}

/// A declared token with its pattern compiled for "match at cursor" use.
#[derive(Debug, Clone)]
pub struct TokenDef {
    pub name: String,
    pub pattern: String,
    pub regex: Regex,
}

/// The Symbol Table: tokens and states with every rule symbol resolved.
/// Immutable once built.
#[derive(Debug, Clone)]
pub struct Grammar {
    pub tokens: Vec<TokenDef>,
    pub productions: Vec<Production>,
    pub s: String,
    pub has_e_rules: bool,

    token_index: HashMap<String, usize>,
    state_index: HashMap<String, usize>,
}

impl Grammar {
    /// Builds the symbol table from front-end declarations.
    ///
    /// Checks, in order: start state presence, token names and patterns,
    /// state names, empty rules and finally that every rule symbol is known.
    pub fn from_declarations(decls: &Declarations) -> Result<Self, GrammarError> {
        analyzer::ll1::validate_start(decls)?;

        let mut tokens: Vec<TokenDef> = vec![];
        let mut token_index: HashMap<String, usize> = HashMap::new();

        for decl in &decls.tokens {
            if decl.name == EPSILON || decl.name == EOF || decl.name == START {
                return Err(GrammarError::ReservedName(decl.name.clone()));
            }

            if token_index.contains_key(&decl.name) {
                return Err(GrammarError::DuplicateTokenDeclaration(decl.name.clone()));
            }

            let regex = Regex::new(&decl.pattern).map_err(|source| {
                GrammarError::InvalidPattern {
                    name: decl.name.clone(),
                    source,
                }
            })?;

            token_index.insert(decl.name.clone(), tokens.len());
            tokens.push(TokenDef {
                name: decl.name.clone(),
                pattern: decl.pattern.clone(),
                regex,
            });
        }

        // states keep the order in which they are first mentioned as a lhs
        let mut state_index: HashMap<String, usize> = HashMap::new();
        let mut raw_rules: Vec<(String, Vec<&RuleDecl>)> = vec![];

        for rule in &decls.rules {
            if rule.state == EPSILON || rule.state == EOF {
                return Err(GrammarError::ReservedName(rule.state.clone()));
            }

            if token_index.contains_key(&rule.state) {
                return Err(GrammarError::ConflictingSymbol(rule.state.clone()));
            }

            if rule.symbols.is_empty() {
                return Err(GrammarError::EmptyRule(rule.state.clone()));
            }

            let index = *state_index.entry(rule.state.clone()).or_insert_with(|| {
                raw_rules.push((rule.state.clone(), vec![]));
                raw_rules.len() - 1
            });

            raw_rules[index].1.push(rule);
        }

        let resolve = |state: &str, name: &str| -> Result<Symbol, GrammarError> {
            if name == EPSILON {
                Ok(Symbol::Epsilon)
            } else if token_index.contains_key(name) {
                Ok(Symbol::Token(name.to_string()))
            } else if state_index.contains_key(name) {
                Ok(Symbol::State(name.to_string()))
            } else {
                Err(GrammarError::UnknownSymbol {
                    state: state.to_string(),
                    name: name.to_string(),
                })
            }
        };

        let mut productions: Vec<Production> = vec![];
        let mut has_e_rules = false;

        for (lhs, rules) in &raw_rules {
            let mut production = Production {
                lhs: lhs.clone(),
                alternatives: vec![],
            };

            for rule in rules {
                let symbols = rule
                    .symbols
                    .iter()
                    .map(|name| resolve(lhs, name))
                    .collect::<Result<Vec<_>, _>>()?;

                if symbols.contains(&Symbol::Epsilon) {
                    has_e_rules = true;
                }

                production.alternatives.push(Alternative {
                    symbols,
                    action: rule.action.clone(),
                });
            }

            productions.push(production);
        }

        debug!(
            "symbol table ready: {} tokens, {} states",
            tokens.len(),
            productions.len()
        );

        Ok(Grammar {
            tokens,
            productions,
            s: START.to_string(),
            has_e_rules,
            token_index,
            state_index,
        })
    }

    pub fn is_token(&self, name: &str) -> bool {
        self.token_index.contains_key(name)
    }

    pub fn is_state(&self, name: &str) -> bool {
        self.state_index.contains_key(name)
    }

    pub fn production(&self, state: &str) -> Option<&Production> {
        self.state_index.get(state).map(|i| &self.productions[*i])
    }

    /// Whether the state declares a literal `[EPS]` rule.
    pub fn has_epsilon_rule(&self, state: &str) -> bool {
        self.production(state)
            .map(|p| p.epsilon_alternative().is_some())
            .unwrap_or(false)
    }

    fn display_states(&self) -> String {
        if self.productions.is_empty() {
            "None".to_string()
        } else {
            let mut list: Vec<_> = self.productions.iter().map(|p| p.lhs.clone()).collect();
            list.sort();
            list.join(", ")
        }
    }

    fn display_tokens(&self) -> String {
        if self.tokens.is_empty() {
            "None".to_string()
        } else {
            let list: Vec<_> = self.tokens.iter().map(|t| t.name.clone()).collect();
            list.join(", ")
        }
    }

    pub fn to_vertical_table(&self) -> Table {
        let mut builder = builder::Builder::default();

        let headers = ["Start Symbol", "Has ε-Rules", "States", "Tokens"];
        let headers_values = [
            self.s.clone(),
            self.has_e_rules.to_string(),
            self.display_states(),
            self.display_tokens(),
        ];

        for (header, value) in headers.iter().zip(headers_values.iter()) {
            builder.push_record([header.to_string(), value.to_string()]);
        }

        for token in &self.tokens {
            builder.push_record([format!("Token {}", token.name), token.pattern.clone()]);
        }

        let mut productions_lines: Vec<(String, String)> = self
            .productions
            .iter()
            .map(|p| (format!("Production for {}", p.lhs), p.to_string()))
            .collect();
        productions_lines.sort();

        for (key, value) in productions_lines {
            builder.push_record([key, value]);
        }

        builder.build()
    }
}
