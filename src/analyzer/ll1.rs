use std::collections::{HashMap, HashSet};

use log::debug;

use crate::{
    builder::common::{starts_with, FirstSets},
    error::GrammarError,
    model::{
        grammar::{Declarations, Grammar},
        types::{Symbol, START},
    },
};

/// Fails unless the reserved start state has at least one rule.
///
/// Runs on raw declarations so that it takes precedence over every other check.
pub fn validate_start(decls: &Declarations) -> Result<(), GrammarError> {
    if decls.rules.iter().any(|rule| rule.state == START) {
        Ok(())
    } else {
        Err(GrammarError::MissingStartState)
    }
}

/// Builds the "can start with" graph between states.
///
/// An edge `A -> B` exists when `B` is the first symbol of a rule of `A`, or
/// when every symbol before `B` is a state declaring an `EPS` rule.
fn left_corner_graph(grammar: &Grammar) -> HashMap<&str, Vec<&str>> {
    let mut graph: HashMap<&str, Vec<&str>> = HashMap::new();

    for production in &grammar.productions {
        let edges = graph.entry(production.lhs.as_str()).or_default();

        for alternative in &production.alternatives {
            for symbol in &alternative.symbols {
                let state = match symbol {
                    Symbol::Epsilon => continue,
                    Symbol::Token(_) => break,
                    Symbol::State(state) => state.as_str(),
                };

                if !edges.contains(&state) {
                    edges.push(state);
                }

                if !grammar.has_epsilon_rule(state) {
                    break;
                }
            }
        }
    }

    graph
}

/// Rejects any cycle among "can start with" edges.
pub fn validate_left_recursion(grammar: &Grammar) -> Result<(), GrammarError> {
    fn dfs<'g>(
        v: &'g str,
        graph: &HashMap<&'g str, Vec<&'g str>>,
        on_path: &mut HashSet<&'g str>,
        done: &mut HashSet<&'g str>,
    ) -> Result<(), GrammarError> {
        if on_path.contains(v) {
            return Err(GrammarError::LeftRecursionDetected(v.to_string()));
        }
        if done.contains(v) {
            return Ok(());
        }

        on_path.insert(v);
        for child in graph.get(v).into_iter().flatten() {
            dfs(*child, graph, on_path, done)?;
        }
        on_path.remove(v);
        done.insert(v);

        Ok(())
    }

    let graph = left_corner_graph(grammar);
    let mut done: HashSet<&str> = HashSet::new();

    for production in &grammar.productions {
        let mut on_path: HashSet<&str> = HashSet::new();
        dfs(&production.lhs, &graph, &mut on_path, &mut done)?;
    }

    Ok(())
}

/// Rejects two rules of one state whose first symbols are identical.
///
/// Only literal first symbols are compared; see [`validate_first_set_overlap`]
/// for the check that looks through FIRST sets.
pub fn validate_rule_prefixes(grammar: &Grammar) -> Result<(), GrammarError> {
    for production in &grammar.productions {
        let alternatives = &production.alternatives;

        for i in 0..alternatives.len() {
            for j in (i + 1)..alternatives.len() {
                if alternatives[i].symbols.first() == alternatives[j].symbols.first() {
                    return Err(GrammarError::AmbiguousRulePrefix(production.lhs.clone()));
                }
            }
        }
    }

    Ok(())
}

/// Rejects a state where more than one rule qualifies for the same lookahead.
pub fn validate_first_set_overlap(
    grammar: &Grammar,
    first_sets: &FirstSets,
) -> Result<(), GrammarError> {
    for production in &grammar.productions {
        for token in &grammar.tokens {
            let candidates = production
                .alternatives
                .iter()
                .filter(|alt| starts_with(&token.name, &alt.symbols, first_sets))
                .count();

            if candidates > 1 {
                return Err(GrammarError::OverlappingFirstSets {
                    state: production.lhs.clone(),
                    token: token.name.clone(),
                });
            }
        }
    }

    Ok(())
}

/// Structural checks that need no FIRST/FOLLOW sets.
pub fn validate(grammar: &Grammar) -> Result<(), GrammarError> {
    validate_left_recursion(grammar)?;
    validate_rule_prefixes(grammar)?;

    debug!("grammar passed structural validation");
    Ok(())
}
