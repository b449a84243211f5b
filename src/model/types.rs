use std::fmt::Display;

/// Marker for the empty production.
pub const EPSILON: &str = "EPS";

/// Name of the start state every grammar must declare.
pub const START: &str = "s";

/// Name of the sentinel token closing every token stream.
pub const EOF: &str = "$";

/// Anything that may appear in a FIRST or FOLLOW set, or as a lookahead.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Terminal {
    Token(String),
    Epsilon,
    EOF,
}

impl Terminal {
    pub fn token(name: &str) -> Self {
        Terminal::Token(name.to_string())
    }

    pub fn name(&self) -> &str {
        match self {
            Terminal::Token(name) => name,
            Terminal::Epsilon => EPSILON,
            Terminal::EOF => EOF,
        }
    }
}

impl Display for Terminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Terminal::Token(name) => write!(f, "{}", name),
            Terminal::Epsilon => write!(f, "ε"),
            Terminal::EOF => write!(f, "$"),
        }
    }
}

/// A resolved rule symbol.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Symbol {
    Token(String),
    State(String),
    Epsilon,
}

impl Display for Symbol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Symbol::Token(name) | Symbol::State(name) => write!(f, "{}", name),
            Symbol::Epsilon => write!(f, "ε"),
        }
    }
}

/// One way of expanding a state: its symbols and the action code run on reduction.
#[derive(Debug, Clone, PartialEq)]
pub struct Alternative {
    pub symbols: Vec<Symbol>,
    pub action: String,
}

impl Alternative {
    /// True for the literal `[EPS]` rule.
    pub fn is_epsilon(&self) -> bool {
        self.symbols.as_slice() == [Symbol::Epsilon]
    }
}

impl Display for Alternative {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let symbols = self
            .symbols
            .iter()
            .map(|sym| sym.to_string())
            .collect::<Vec<_>>()
            .join(" ");

        write!(f, "{}", symbols)
    }
}

#[derive(Debug, Clone)]
pub struct Production {
    pub lhs: String,                    // left-hand side
    pub alternatives: Vec<Alternative>, // represents the '|'
}

impl Production {
    pub fn epsilon_alternative(&self) -> Option<usize> {
        self.alternatives.iter().position(|alt| alt.is_epsilon())
    }
}

impl Display for Production {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let alts_str: Vec<String> = self.alternatives.iter().map(|alt| alt.to_string()).collect();

        let rhs = if alts_str.is_empty() {
            "ε".to_string()
        } else {
            alts_str.join(" | ")
        };

        write!(f, "{} -> {}", self.lhs, rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn displays_production_with_epsilon_alternative() {
        let production = Production {
            lhs: "list".to_string(),
            alternatives: vec![
                Alternative {
                    symbols: vec![Symbol::Token("NUM".into()), Symbol::State("list".into())],
                    action: String::new(),
                },
                Alternative {
                    symbols: vec![Symbol::Epsilon],
                    action: String::new(),
                },
            ],
        };

        assert_eq!(production.to_string(), "list -> NUM list | ε");
        assert_eq!(production.epsilon_alternative(), Some(1));
    }

    #[test]
    fn orders_tokens_before_markers() {
        let mut terminals = vec![Terminal::EOF, Terminal::Epsilon, Terminal::token("B"), Terminal::token("A")];
        terminals.sort();

        assert_eq!(
            terminals,
            vec![Terminal::token("A"), Terminal::token("B"), Terminal::Epsilon, Terminal::EOF]
        );
    }
}
