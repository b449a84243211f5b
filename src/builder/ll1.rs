use log::{debug, warn};
use tabled::Table;

use crate::{
    builder::common::{calculate_first_of_sequence, starts_with, FirstSets, FollowSets},
    model::{grammar::Grammar, types::Terminal},
    parser::types::PredictiveTable,
};

/// Builds the predictive table.
///
/// For every state and declared token the first rule (in declaration order)
/// that can start with the token is recorded. Nullable states also get an
/// empty-production entry: their `EPS` rule, or the first rule that can vanish.
pub fn build_parsing_table(grammar: &Grammar, first_sets: &FirstSets) -> PredictiveTable {
    let mut table = PredictiveTable::default();

    for production in &grammar.productions {
        for token in &grammar.tokens {
            let mut candidates = production
                .alternatives
                .iter()
                .enumerate()
                .filter(|(_, alt)| starts_with(&token.name, &alt.symbols, first_sets))
                .map(|(index, _)| index);

            let chosen = match candidates.next() {
                Some(index) => index,
                None => continue,
            };

            let shadowed: Vec<usize> = candidates.collect();
            if !shadowed.is_empty() {
                warn!(
                    "state {}: rules {:?} also start with {}, rule {} wins",
                    production.lhs, shadowed, token.name, chosen
                );
            }

            table.insert(&production.lhs, &token.name, chosen);
        }

        let nullable = first_sets
            .get(&production.lhs)
            .map(|first| first.contains(&Terminal::Epsilon))
            .unwrap_or(false);

        if nullable {
            let empty = production.epsilon_alternative().or_else(|| {
                production.alternatives.iter().position(|alt| {
                    calculate_first_of_sequence(&alt.symbols, first_sets).1
                })
            });

            if let Some(index) = empty {
                table.insert_empty(&production.lhs, index);
            }
        }
    }

    debug!("predictive table built with {} entries", table.len());

    table
}

pub fn to_printable_table(
    grammar: &Grammar,
    table: &PredictiveTable,
    follow_sets: &FollowSets,
) -> Table {
    let mut builder = tabled::builder::Builder::default();

    let mut columns: Vec<Terminal> = grammar
        .tokens
        .iter()
        .map(|t| Terminal::token(&t.name))
        .collect();
    columns.push(Terminal::EOF);

    let mut header = vec!["PARSING TABLE (STATE/TOKEN)".to_string()];
    for t in &columns {
        header.push(format!("{}", t));
    }
    builder.push_record(header);

    let mut productions: Vec<_> = grammar.productions.iter().collect();
    productions.sort_by(|a, b| a.lhs.cmp(&b.lhs));

    for production in productions {
        let nt = &production.lhs;
        let mut row = vec![nt.clone()];

        for t in &columns {
            let entry = match t {
                Terminal::Token(name) => table.get(nt, name),
                _ => None,
            };

            let follows = follow_sets
                .get(nt)
                .map(|follow| follow.contains(t))
                .unwrap_or(false);

            let cell = match (entry, table.empty_production(nt)) {
                (Some(index), _) => {
                    format!("{} → {}", nt, production.alternatives[index])
                }
                (None, Some(index)) if follows => {
                    format!("{} → {}", nt, production.alternatives[index])
                }
                _ => "-".to_string(),
            };

            row.push(cell);
        }

        builder.push_record(row);
    }

    builder.build()
}

#[cfg(test)]
pub mod tests {
    use super::*;
    use crate::{
        builder::common::{calculate_all_first_sets, calculate_all_follow_sets},
        model::grammar::GrammarBuilder,
    };

    fn list_grammar() -> Grammar {
        let decls = GrammarBuilder::new()
            .token("NUM", r"\d+")
            .token("COMMA", ",")
            .rule("s", "NUM rest", "")
            .rule("rest", "COMMA NUM rest", "")
            .rule("rest", "EPS", "")
            .build();

        Grammar::from_declarations(&decls).unwrap()
    }

    #[test]
    fn selects_rule_per_lookahead() {
        let grammar = list_grammar();
        let first_sets = calculate_all_first_sets(&grammar);
        let table = build_parsing_table(&grammar, &first_sets);

        assert_eq!(table.get("s", "NUM"), Some(0));
        assert_eq!(table.get("s", "COMMA"), None);
        assert_eq!(table.get("rest", "COMMA"), Some(0));
        assert_eq!(table.get("rest", "NUM"), None);
        assert_eq!(table.empty_production("rest"), Some(1));
        assert_eq!(table.empty_production("s"), None);
        assert_eq!(table.expected("rest"), vec!["COMMA"]);
    }

    #[test]
    fn looks_through_nullable_prefix() {
        let decls = GrammarBuilder::new()
            .token("a", "a")
            .token("b", "b")
            .rule("s", "opt b", "")
            .rule("opt", "a", "")
            .rule("opt", "EPS", "")
            .build();
        let grammar = Grammar::from_declarations(&decls).unwrap();
        let first_sets = calculate_all_first_sets(&grammar);
        let table = build_parsing_table(&grammar, &first_sets);

        assert_eq!(table.get("s", "a"), Some(0));
        assert_eq!(table.get("s", "b"), Some(0));
        assert_eq!(table.get("opt", "b"), None);
        assert_eq!(table.empty_production("opt"), Some(1));
    }

    #[test]
    fn nullable_state_without_eps_rule_uses_vanishing_rule() {
        let decls = GrammarBuilder::new()
            .token("a", "a")
            .rule("s", "wrap", "")
            .rule("wrap", "inner", "")
            .rule("inner", "a", "")
            .rule("inner", "EPS", "")
            .build();
        let grammar = Grammar::from_declarations(&decls).unwrap();
        let first_sets = calculate_all_first_sets(&grammar);
        let table = build_parsing_table(&grammar, &first_sets);

        assert_eq!(table.empty_production("wrap"), Some(0));
        assert_eq!(table.empty_production("s"), Some(0));
    }

    #[test]
    fn first_declared_rule_wins_on_overlap() {
        let decls = GrammarBuilder::new()
            .token("NUM", r"\d+")
            .rule("s", "a", "")
            .rule("s", "b", "")
            .rule("a", "NUM", "")
            .rule("b", "NUM", "")
            .build();
        let grammar = Grammar::from_declarations(&decls).unwrap();
        let first_sets = calculate_all_first_sets(&grammar);
        let table = build_parsing_table(&grammar, &first_sets);

        assert_eq!(table.get("s", "NUM"), Some(0));
    }

    #[test]
    fn printable_table_shows_empty_production_under_follow() {
        let grammar = list_grammar();
        let first_sets = calculate_all_first_sets(&grammar);
        let follow_sets = calculate_all_follow_sets(&grammar, &first_sets);
        let table = build_parsing_table(&grammar, &first_sets);

        let printed = to_printable_table(&grammar, &table, &follow_sets).to_string();

        assert!(printed.contains("PARSING TABLE (STATE/TOKEN)"));
        assert!(printed.contains("rest → COMMA NUM rest"));
        assert!(printed.contains("rest → ε"));
        assert!(printed.contains("s → NUM rest"));
    }
}
