use log::trace;
use regex::Match;

use crate::{
    error::ParseError,
    model::{grammar::TokenDef, types::Terminal},
    parser::types::Token,
};

/// Greedy, ordered tokenizer: at every position the declared patterns are
/// tried in declaration order and the first non-empty match wins.
pub struct Tokenizer<'g> {
    tokens: &'g [TokenDef],
}

impl<'g> Tokenizer<'g> {
    pub fn new(tokens: &'g [TokenDef]) -> Self {
        Tokenizer { tokens }
    }

    /// Patterns are matched against the whole input at the cursor, so `^` and
    /// `\b` see the text before it.
    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, ParseError> {
        let mut tokens = vec![];
        let mut cur_pos = 0;

        // leftmost match of every pattern from the last search; nothing matches
        // between that search position and the cached start
        let mut upcoming: Vec<Option<Match>> = self
            .tokens
            .iter()
            .map(|def| def.regex.find_at(input, 0))
            .collect();

        while cur_pos != input.len() {
            let mut found = None;

            for (def, next) in self.tokens.iter().zip(upcoming.iter_mut()) {
                if matches!(next, Some(m) if m.start() < cur_pos) {
                    *next = def.regex.find_at(input, cur_pos);
                }

                // zero-length matches would never advance the cursor
                if let Some(m) = next.filter(|m| m.start() == cur_pos && m.end() > cur_pos) {
                    found = Some((def, m.end()));
                    break;
                }
            }

            let (def, end) = match found {
                Some(found) => found,
                None => {
                    return Err(ParseError::TokenizationFailure {
                        position: cur_pos,
                        found: input[cur_pos..].chars().next().unwrap_or_default(),
                    })
                }
            };

            trace!("token {} {:?} at {}", def.name, &input[cur_pos..end], cur_pos);

            tokens.push(Token {
                kind: Terminal::Token(def.name.clone()),
                text: input[cur_pos..end].to_string(),
                offset: cur_pos,
            });
            cur_pos = end;
        }

        tokens.push(Token {
            kind: Terminal::EOF,
            text: String::new(),
            offset: cur_pos,
        });

        Ok(tokens)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::grammar::{Grammar, GrammarBuilder};
    use rstest::rstest;

    fn grammar(tokens: &[(&str, &str)]) -> Grammar {
        let mut builder = GrammarBuilder::new();
        for (name, pattern) in tokens {
            builder = builder.token(name, pattern);
        }
        let first = tokens[0].0;
        Grammar::from_declarations(&builder.rule("s", first, "").build()).unwrap()
    }

    fn kinds(tokens: &[Token]) -> Vec<(String, String)> {
        tokens
            .iter()
            .map(|t| (t.name().to_string(), t.text.clone()))
            .collect()
    }

    #[test]
    fn splits_sum_into_tokens() {
        let g = grammar(&[("NUM", r"\d+"), ("PLUS", r"\+")]);
        let tokens = Tokenizer::new(&g.tokens).tokenize("12+3").unwrap();

        assert_eq!(
            kinds(&tokens),
            vec![
                ("NUM".to_string(), "12".to_string()),
                ("PLUS".to_string(), "+".to_string()),
                ("NUM".to_string(), "3".to_string()),
                ("$".to_string(), String::new()),
            ]
        );
        assert_eq!(tokens[3].kind, Terminal::EOF);
        assert_eq!(tokens[2].offset, 3);
    }

    #[rstest]
    #[case::keyword_first(&[("IF", "if"), ("ID", "[a-z]+")], "iffy", vec!["IF", "ID", "$"])]
    #[case::identifier_first(&[("ID", "[a-z]+"), ("IF", "if")], "iffy", vec!["ID", "$"])]
    #[case::empty_input(&[("ID", "[a-z]+")], "", vec!["$"])]
    fn first_declared_pattern_wins(
        #[case] decls: &[(&str, &str)],
        #[case] input: &str,
        #[case] expected: Vec<&str>,
    ) {
        let g = grammar(decls);
        let tokens = Tokenizer::new(&g.tokens).tokenize(input).unwrap();
        let names: Vec<&str> = tokens.iter().map(|t| t.name()).collect();

        assert_eq!(names, expected);
    }

    #[test]
    fn reports_position_of_unmatched_input() {
        let g = grammar(&[("NUM", r"\d+"), ("PLUS", r"\+")]);
        let err = Tokenizer::new(&g.tokens).tokenize("1+x").unwrap_err();

        assert!(matches!(
            err,
            ParseError::TokenizationFailure { position: 2, found: 'x' }
        ));
    }

    #[rstest]
    #[case::boundary_inside_word(&[("WORD", r"\b[a-z]+"), ("NUM", r"\d+"), ("TAIL", "[a-z]+")], "1ab", vec!["NUM", "TAIL", "$"])]
    #[case::boundary_at_start(&[("WORD", r"\b[a-z]+"), ("NUM", r"\d+"), ("TAIL", "[a-z]+")], "ab", vec!["WORD", "$"])]
    #[case::caret_is_input_start(&[("FIRST", "^a"), ("A", "a")], "aaa", vec!["FIRST", "A", "A", "$"])]
    fn assertions_see_preceding_input(
        #[case] decls: &[(&str, &str)],
        #[case] input: &str,
        #[case] expected: Vec<&str>,
    ) {
        let g = grammar(decls);
        let tokens = Tokenizer::new(&g.tokens).tokenize(input).unwrap();
        let names: Vec<&str> = tokens.iter().map(|t| t.name()).collect();

        assert_eq!(names, expected);
    }

    #[test]
    fn later_pattern_match_does_not_hide_earlier_position() {
        // KW's first match lies ahead of the cursor while other tokens are read
        let g = grammar(&[("KW", "end"), ("ID", "[a-df-z]+"), ("SP", " ")]);
        let tokens = Tokenizer::new(&g.tokens).tokenize("abc end xyz").unwrap();

        assert_eq!(
            kinds(&tokens),
            vec![
                ("ID".to_string(), "abc".to_string()),
                ("SP".to_string(), " ".to_string()),
                ("KW".to_string(), "end".to_string()),
                ("SP".to_string(), " ".to_string()),
                ("ID".to_string(), "xyz".to_string()),
                ("$".to_string(), String::new()),
            ]
        );
    }

    #[test]
    fn skips_patterns_matching_empty_string() {
        let g = grammar(&[("WS", r"\s*"), ("NUM", r"\d+")]);
        let tokens = Tokenizer::new(&g.tokens).tokenize("1 2").unwrap();
        let names: Vec<&str> = tokens.iter().map(|t| t.name()).collect();

        assert_eq!(names, vec!["NUM", "WS", "NUM", "$"]);
    }
}
