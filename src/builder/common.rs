use std::collections::{HashMap, HashSet};

use log::trace;
use tabled::Table;

use crate::model::{
    grammar::Grammar,
    types::{Symbol, Terminal},
};

/// FIRST set of every state; `Terminal::Epsilon` marks a nullable state.
pub type FirstSets = HashMap<String, HashSet<Terminal>>;

/// FOLLOW set of every state; `Terminal::EOF` marks "may end the input".
pub type FollowSets = HashMap<String, HashSet<Terminal>>;

pub fn calculate_all_first_sets(grammar: &Grammar) -> FirstSets {
    let mut first_sets: FirstSets = HashMap::new();

    for production in &grammar.productions {
        first_sets.insert(production.lhs.clone(), HashSet::new());
    }

    let mut changed = true;
    let mut pass = 0;

    while changed {
        changed = false;
        pass += 1;

        for production in &grammar.productions {
            let mut new_first_set = HashSet::new();

            for alternative in &production.alternatives {
                let (first_of_alternative, _) =
                    calculate_first_of_sequence(&alternative.symbols, &first_sets);
                new_first_set.extend(first_of_alternative);
            }

            let current_set = first_sets.entry(production.lhs.clone()).or_default();
            let old_size = current_set.len();

            current_set.extend(new_first_set);

            if current_set.len() > old_size {
                changed = true;
            }
        }

        trace!("FIRST pass {} done, changed: {}", pass, changed);
    }

    first_sets
}

/// FIRST of a symbol sequence, walking left to right until a symbol that
/// cannot vanish. The flag is true (and the set holds `Epsilon`) when the
/// whole sequence can derive the empty string, including the empty sequence.
pub fn calculate_first_of_sequence(
    sequence: &[Symbol],
    current_first_sets: &FirstSets,
) -> (HashSet<Terminal>, bool) {
    let mut terminals: HashSet<Terminal> = HashSet::new();
    let mut is_sequence_nullable = true;

    for x_i in sequence {
        match x_i {
            Symbol::Epsilon => continue,
            Symbol::Token(name) => {
                terminals.insert(Terminal::Token(name.clone()));
                is_sequence_nullable = false;
                break;
            }
            Symbol::State(state) => match current_first_sets.get(state) {
                Some(first_xi) => {
                    terminals.extend(first_xi.iter().filter(|t| **t != Terminal::Epsilon).cloned());
                    if !first_xi.contains(&Terminal::Epsilon) {
                        is_sequence_nullable = false;
                        break;
                    }
                }
                None => {
                    is_sequence_nullable = false;
                    break;
                }
            },
        }
    }

    if is_sequence_nullable {
        terminals.insert(Terminal::Epsilon);
    }

    (terminals, is_sequence_nullable)
}

pub fn calculate_all_follow_sets(grammar: &Grammar, all_first_sets: &FirstSets) -> FollowSets {
    let mut follow_sets: FollowSets = HashMap::new();

    for production in &grammar.productions {
        follow_sets.insert(production.lhs.clone(), HashSet::new());
    }

    follow_sets
        .entry(grammar.s.clone())
        .or_default()
        .insert(Terminal::EOF);

    let mut changed = true;
    let mut pass = 0;

    while changed {
        changed = false;
        pass += 1;

        for production in &grammar.productions {
            for alternative in &production.alternatives {
                let symbols = &alternative.symbols;

                for (i, symbol_b) in symbols.iter().enumerate() {
                    let b = match symbol_b {
                        Symbol::State(b) => b,
                        _ => continue,
                    };

                    let beta = &symbols[i + 1..];
                    let (first_beta, beta_nullable) =
                        calculate_first_of_sequence(beta, all_first_sets);

                    let mut new_symbols_to_add: HashSet<Terminal> = first_beta
                        .into_iter()
                        .filter(|t| *t != Terminal::Epsilon)
                        .collect();

                    if beta_nullable {
                        if let Some(follow_a) = follow_sets.get(&production.lhs) {
                            new_symbols_to_add.extend(follow_a.iter().cloned());
                        }
                    }

                    let follow_b = follow_sets.entry(b.clone()).or_default();
                    let initial_size = follow_b.len();

                    follow_b.extend(new_symbols_to_add);

                    if follow_b.len() > initial_size {
                        changed = true;
                    }
                }
            }
        }

        trace!("FOLLOW pass {} done, changed: {}", pass, changed);
    }

    follow_sets
}

/// Whether a rule with these symbols can legally begin with `token`.
///
/// `EPS` symbols are skipped, and a state is looked through while its FIRST
/// set holds epsilon.
pub fn starts_with(token: &str, symbols: &[Symbol], first_sets: &FirstSets) -> bool {
    let target = Terminal::token(token);

    for symbol in symbols {
        match symbol {
            Symbol::Epsilon => continue,
            Symbol::Token(name) => return name == token,
            Symbol::State(state) => {
                let first = match first_sets.get(state) {
                    Some(first) => first,
                    None => return false,
                };

                if first.contains(&target) {
                    return true;
                }
                if !first.contains(&Terminal::Epsilon) {
                    return false;
                }
            }
        }
    }

    false
}

fn sorted_terminals(set: &HashSet<Terminal>) -> String {
    let mut terminals = set.iter().collect::<Vec<_>>();
    terminals.sort();
    terminals
        .iter()
        .map(|t| t.to_string())
        .collect::<Vec<String>>()
        .join(" ")
}

pub fn to_first_set_table(first_sets: &FirstSets) -> Table {
    let mut builder = tabled::builder::Builder::default();
    builder.push_record(vec!["FIRST SET OF", "T"]);

    let mut sorted_first_set: Vec<_> = first_sets.iter().collect();
    sorted_first_set.sort_by_key(|(state, _)| *state);

    for (state, set) in sorted_first_set {
        builder.push_record(vec![
            format!("FIRST({})", state),
            format!(
                "{} (is_nullable: {})",
                sorted_terminals(set),
                set.contains(&Terminal::Epsilon)
            ),
        ]);
    }

    builder.build()
}

pub fn to_follow_set_table(follow_sets: &FollowSets) -> Table {
    let mut builder = tabled::builder::Builder::default();
    builder.push_record(vec!["FOLLOW SET OF", "T"]);

    let mut sorted_follow_set: Vec<_> = follow_sets.iter().collect();
    sorted_follow_set.sort_by_key(|(state, _)| *state);

    for (state, set) in sorted_follow_set {
        builder.push_record(vec![format!("FOLLOW({})", state), sorted_terminals(set)]);
    }

    builder.build()
}
