use std::collections::{HashMap, HashSet};

use log::{debug, trace};
use tabled::Table;

use crate::{
    action::{ActionEvaluator, ExprEvaluator},
    analyzer,
    builder::{
        self,
        common::{calculate_all_first_sets, calculate_all_follow_sets, FirstSets, FollowSets},
    },
    config::CompileOptions,
    error::{ActionError, GrammarError, ParseError},
    model::{
        grammar::{Declarations, Grammar},
        types::{Symbol, Terminal},
    },
    parser::{
        lexer::Tokenizer,
        types::{ParseStep, PredictiveTable, Token, TraceRow},
    },
};

/// A validated grammar together with its FIRST/FOLLOW sets, predictive table
/// and action evaluator. Immutable; any number of `parse` calls may share it.
pub struct CompiledGrammar<E: ActionEvaluator = ExprEvaluator> {
    grammar: Grammar,
    first_sets: FirstSets,
    follow_sets: FollowSets,
    table: PredictiveTable,
    // prepared actions, per state in alternative order
    programs: HashMap<String, Vec<E::Program>>,
    evaluator: E,
    options: CompileOptions,
}

impl<E: ActionEvaluator> CompiledGrammar<E> {
    pub fn new(
        decls: &Declarations,
        evaluator: E,
        options: CompileOptions,
    ) -> Result<Self, GrammarError> {
        let grammar = Grammar::from_declarations(decls)?;
        analyzer::ll1::validate(&grammar)?;

        let first_sets = calculate_all_first_sets(&grammar);
        let follow_sets = calculate_all_follow_sets(&grammar, &first_sets);

        if options.reject_first_set_overlap {
            analyzer::ll1::validate_first_set_overlap(&grammar, &first_sets)?;
        }

        let table = builder::ll1::build_parsing_table(&grammar, &first_sets);

        let mut programs = HashMap::with_capacity(grammar.productions.len());
        for production in &grammar.productions {
            let invalid = |source: ActionError| GrammarError::InvalidAction {
                state: production.lhs.clone(),
                source,
            };

            let mut prepared = Vec::with_capacity(production.alternatives.len());
            for alternative in &production.alternatives {
                let program = evaluator.prepare(&alternative.action).map_err(invalid)?;

                if options.check_actions {
                    let arity = alternative
                        .symbols
                        .iter()
                        .filter(|sym| **sym != Symbol::Epsilon)
                        .count();
                    evaluator.check(&program, arity).map_err(invalid)?;
                }

                prepared.push(program);
            }
            programs.insert(production.lhs.clone(), prepared);
        }

        debug!(
            "compiled grammar: {} tokens, {} states, {} table entries",
            grammar.tokens.len(),
            grammar.productions.len(),
            table.len()
        );

        Ok(CompiledGrammar {
            grammar,
            first_sets,
            follow_sets,
            table,
            programs,
            evaluator,
            options,
        })
    }

    pub fn grammar(&self) -> &Grammar {
        &self.grammar
    }

    pub fn table(&self) -> &PredictiveTable {
        &self.table
    }

    pub fn evaluator(&self) -> &E {
        &self.evaluator
    }

    pub fn options(&self) -> &CompileOptions {
        &self.options
    }

    /// FIRST set of a token or state.
    pub fn first(&self, symbol: &str) -> Option<HashSet<Terminal>> {
        if self.grammar.is_token(symbol) {
            return Some(HashSet::from([Terminal::token(symbol)]));
        }
        self.first_sets.get(symbol).cloned()
    }

    pub fn follow(&self, state: &str) -> Option<&HashSet<Terminal>> {
        self.follow_sets.get(state)
    }

    pub fn tokenize(&self, input: &str) -> Result<Vec<Token>, ParseError> {
        Tokenizer::new(&self.grammar.tokens).tokenize(input)
    }

    /// Tokenizes `input` and evaluates the start symbol's attribute.
    pub fn parse(&self, input: &str) -> Result<E::Value, ParseError> {
        let tokens = self.tokenize(input)?;
        let mut run = Run::new(self, &tokens, false);
        run.start()
    }

    /// Like [`CompiledGrammar::parse`], also returning every step taken, up to
    /// and including the failing one.
    pub fn parse_with_trace(&self, input: &str) -> (Result<E::Value, ParseError>, Vec<ParseStep>) {
        let tokens = match self.tokenize(input) {
            Ok(tokens) => tokens,
            Err(e) => return (Err(e), vec![]),
        };

        let mut run = Run::new(self, &tokens, true);
        let result = run.start();
        (result, run.trace)
    }

    pub fn trace_as_table(trace: &[ParseStep]) -> Table {
        let rows: Vec<TraceRow> = trace
            .iter()
            .enumerate()
            .map(|(i, step)| TraceRow {
                step: i + 1,
                symbol: format!("{}{}", "  ".repeat(step.depth), step.symbol),
                position: step.position,
                lookahead: step.lookahead.clone(),
                action: step.action.clone(),
            })
            .collect();

        Table::new(rows)
    }

    pub fn to_first_set_table(&self) -> Table {
        builder::common::to_first_set_table(&self.first_sets)
    }

    pub fn to_follow_set_table(&self) -> Table {
        builder::common::to_follow_set_table(&self.follow_sets)
    }

    pub fn to_parsing_table(&self) -> Table {
        builder::ll1::to_printable_table(&self.grammar, &self.table, &self.follow_sets)
    }
}

/// State of one `parse` call: the token stream and the single cursor threaded
/// through every recursive visit.
struct Run<'a, E: ActionEvaluator> {
    compiled: &'a CompiledGrammar<E>,
    tokens: &'a [Token],
    cursor: usize,
    // states currently being expanded, with the cursor they were entered at
    active: HashSet<(&'a str, usize)>,
    tracing: bool,
    trace: Vec<ParseStep>,
}

impl<'a, E: ActionEvaluator> Run<'a, E> {
    fn new(compiled: &'a CompiledGrammar<E>, tokens: &'a [Token], tracing: bool) -> Self {
        Run {
            compiled,
            tokens,
            cursor: 0,
            active: HashSet::new(),
            tracing,
            trace: vec![],
        }
    }

    // the stream always ends with EOF and EOF is never consumed
    fn lookahead(&self) -> &'a Token {
        &self.tokens[self.cursor.min(self.tokens.len() - 1)]
    }

    fn record(&mut self, depth: usize, symbol: &str, action: impl FnOnce() -> String) {
        if self.tracing {
            let lookahead = self.lookahead();
            self.trace.push(ParseStep {
                depth,
                symbol: symbol.to_string(),
                position: self.cursor,
                lookahead: lookahead.name().to_string(),
                action: action(),
            });
        }
    }

    fn unexpected(&mut self, depth: usize, symbol: &str, expected: String) -> ParseError {
        let lookahead = self.lookahead();
        let found = match lookahead.kind {
            Terminal::EOF => "end of input".to_string(),
            _ => format!("{} {:?}", lookahead.name(), lookahead.text),
        };

        self.record(depth, symbol, || format!("error: expected {}", expected));

        ParseError::UnexpectedToken {
            position: self.cursor,
            offset: lookahead.offset,
            found,
            expected,
        }
    }

    fn start(&mut self) -> Result<E::Value, ParseError> {
        let compiled = self.compiled;
        let start = compiled.grammar.s.as_str();
        let value = self.visit_state(start, 0)?;

        if compiled.options.require_end_of_input && self.lookahead().kind != Terminal::EOF {
            return Err(self.unexpected(0, start, "end of input".to_string()));
        }

        debug!("parsed {} tokens", self.cursor);
        Ok(value)
    }

    fn visit_token(&mut self, name: &str, depth: usize) -> Result<E::Value, ParseError> {
        let lookahead = self.lookahead();

        if lookahead.kind.name() != name || lookahead.kind == Terminal::EOF {
            return Err(self.unexpected(depth, name, name.to_string()));
        }

        self.record(depth, name, || format!("match {:?}", lookahead.text));
        self.cursor += 1;

        Ok(self.compiled.evaluator.leaf(&lookahead.text))
    }

    fn visit_state(&mut self, state: &'a str, depth: usize) -> Result<E::Value, ParseError> {
        let compiled = self.compiled;
        let entered_at = self.cursor;

        if depth > compiled.options.max_depth {
            self.record(depth, state, || "error: recursion limit".to_string());
            return Err(ParseError::RecursionLimit {
                position: entered_at,
                limit: compiled.options.max_depth,
            });
        }

        // the same state at the same cursor picks the same rule again
        if !self.active.insert((state, entered_at)) {
            self.record(depth, state, || "error: no progress".to_string());
            return Err(ParseError::NoProgress {
                state: state.to_string(),
                position: entered_at,
            });
        }

        let lookahead = self.lookahead();

        let selected = match &lookahead.kind {
            Terminal::Token(name) => compiled.table.get(state, name),
            _ => None,
        };

        let (index, via_follow) = match selected {
            Some(index) => (index, false),
            None => {
                let follows = compiled
                    .follow_sets
                    .get(state)
                    .map(|follow| follow.contains(&lookahead.kind))
                    .unwrap_or(false);

                match compiled.table.empty_production(state) {
                    Some(index) if follows => (index, true),
                    _ => {
                        let expected = self.expected(state);
                        return Err(self.unexpected(depth, state, expected));
                    }
                }
            }
        };

        let prepared = compiled.grammar.production(state).and_then(|production| {
            let program = compiled.programs.get(state)?.get(index)?;
            Some((production.alternatives.get(index)?, program))
        });
        let (alternative, program) = match prepared {
            Some(prepared) => prepared,
            None => return Err(self.unexpected(depth, state, "a declared state".to_string())),
        };

        trace!("expand {} -> {} at {}", state, alternative, self.cursor);
        self.record(depth, state, || {
            if via_follow {
                format!("{} -> {} (follow)", state, alternative)
            } else {
                format!("{} -> {}", state, alternative)
            }
        });

        let mut children = Vec::with_capacity(alternative.symbols.len());
        for symbol in &alternative.symbols {
            match symbol {
                Symbol::Epsilon => continue,
                Symbol::Token(name) => children.push(self.visit_token(name, depth + 1)?),
                Symbol::State(child) => children.push(self.visit_state(child, depth + 1)?),
            }
        }
        self.active.remove(&(state, entered_at));

        compiled
            .evaluator
            .evaluate(program, children)
            .map_err(|source| ParseError::Action {
                state: state.to_string(),
                source,
            })
    }

    fn expected(&self, state: &str) -> String {
        let mut expected: Vec<String> = self
            .compiled
            .table
            .expected(state)
            .into_iter()
            .map(str::to_string)
            .collect();

        if self.compiled.table.empty_production(state).is_some() {
            if let Some(follow) = self.compiled.follow_sets.get(state) {
                let mut follow: Vec<&Terminal> = follow.iter().collect();
                follow.sort();
                for t in follow {
                    let name = t.name().to_string();
                    if !expected.contains(&name) {
                        expected.push(name);
                    }
                }
            }
        }

        match expected.len() {
            0 => "nothing".to_string(),
            1 => expected.remove(0),
            _ => format!("one of {}", expected.join(", ")),
        }
    }
}

#[cfg(test)]
pub mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::{
        action::{Program, Value},
        model::grammar::GrammarBuilder,
    };

    fn compile(builder: GrammarBuilder) -> CompiledGrammar {
        CompiledGrammar::new(&builder.build(), ExprEvaluator, CompileOptions::default()).unwrap()
    }

    fn sum() -> CompiledGrammar {
        compile(
            GrammarBuilder::new()
                .token("NUM", r"\d+")
                .token("PLUS", r"\+")
                .rule("s", "NUM PLUS NUM", "int($0) + int($2)"),
        )
    }

    #[test]
    fn evaluates_signed_sum() {
        assert_eq!(sum().parse("2+3").unwrap(), Value::Int(5));
    }

    #[test]
    fn incomplete_sum_fails_after_plus() {
        let err = sum().parse("2+").unwrap_err();

        assert!(matches!(
            err,
            ParseError::UnexpectedToken { position: 2, offset: 2, ref expected, .. } if expected == "NUM"
        ));
    }

    #[test]
    fn grammar_survives_failed_parse() {
        let grammar = sum();

        assert!(grammar.parse("2+x").is_err());
        assert!(grammar.parse("+").is_err());
        assert_eq!(grammar.parse("10+32").unwrap(), Value::Int(42));
    }

    #[test]
    fn rejects_trailing_input() {
        let grammar = compile(
            GrammarBuilder::new()
                .token("NUM", r"\d+")
                .token("SEMI", ";")
                .rule("s", "NUM", "$0"),
        );

        let err = grammar.parse("1;").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { position: 1, ref expected, .. } if expected == "end of input"
        ));
    }

    #[test]
    fn trailing_input_is_ignored_when_not_required() {
        let decls = GrammarBuilder::new()
            .token("NUM", r"\d+")
            .token("SEMI", ";")
            .rule("s", "NUM", "$0")
            .build();
        let options = CompileOptions {
            require_end_of_input: false,
            ..CompileOptions::default()
        };
        let grammar = CompiledGrammar::new(&decls, ExprEvaluator, options).unwrap();

        assert_eq!(grammar.parse("1;").unwrap(), Value::from("1"));
    }

    /// Counts how often actions are prepared and how often the empty-list
    /// action runs.
    #[derive(Default)]
    struct CountingEvaluator {
        prepared: Cell<usize>,
        empty_calls: Cell<usize>,
    }

    impl ActionEvaluator for CountingEvaluator {
        type Value = Value;
        type Program = (String, Program);

        fn leaf(&self, text: &str) -> Value {
            ExprEvaluator.leaf(text)
        }

        fn prepare(&self, code: &str) -> Result<Self::Program, ActionError> {
            self.prepared.set(self.prepared.get() + 1);
            Ok((code.to_string(), ExprEvaluator.prepare(code)?))
        }

        fn evaluate(
            &self,
            (code, program): &Self::Program,
            children: Vec<Value>,
        ) -> Result<Value, ActionError> {
            if code == "0" {
                assert!(children.is_empty());
                self.empty_calls.set(self.empty_calls.get() + 1);
            }
            ExprEvaluator.evaluate(program, children)
        }
    }

    fn counted_list() -> CompiledGrammar<CountingEvaluator> {
        let decls = GrammarBuilder::new()
            .token("NUM", r"\d")
            .token("SEMI", ";")
            .rule("s", "list SEMI", "$0")
            .rule("list", "NUM list", "int($0) + $1")
            .rule("list", "EPS", "0")
            .build();

        CompiledGrammar::new(&decls, CountingEvaluator::default(), CompileOptions::default())
            .unwrap()
    }

    #[test]
    fn epsilon_action_runs_once_without_consuming() {
        let grammar = counted_list();

        let (result, trace) = grammar.parse_with_trace("123;");
        assert_eq!(result.unwrap(), Value::Int(6));
        assert_eq!(grammar.evaluator().empty_calls.get(), 1);

        let empty_step = trace
            .iter()
            .position(|step| step.action.ends_with("(follow)"))
            .expect("no epsilon step recorded");
        assert_eq!(trace[empty_step].position, 3);
        assert_eq!(trace[empty_step + 1].position, 3);
        assert_eq!(trace[empty_step + 1].symbol, "SEMI");
    }

    #[test]
    fn epsilon_action_on_empty_list() {
        let grammar = counted_list();

        assert_eq!(grammar.parse(";").unwrap(), Value::Int(0));
        assert_eq!(grammar.evaluator().empty_calls.get(), 1);
    }

    #[test]
    fn actions_are_prepared_once_per_rule() {
        let grammar = counted_list();
        assert_eq!(grammar.evaluator().prepared.get(), 3);

        for input in ["1;", "12;", "123;"] {
            grammar.parse(input).unwrap();
        }
        assert_eq!(grammar.evaluator().prepared.get(), 3);
    }

    fn number_list(options: CompileOptions) -> CompiledGrammar {
        let decls = GrammarBuilder::new()
            .token("NUM", r"\d")
            .rule("s", "list", "$0")
            .rule("list", "NUM list", "int($0) + $1")
            .rule("list", "EPS", "0")
            .build();

        CompiledGrammar::new(&decls, ExprEvaluator, options).unwrap()
    }

    #[test]
    fn long_list_hits_recursion_limit() {
        let grammar = number_list(CompileOptions::default());

        assert_eq!(grammar.parse(&"1".repeat(400)).unwrap(), Value::Int(400));

        let err = grammar.parse(&"1".repeat(20_000)).unwrap_err();
        assert!(matches!(
            err,
            ParseError::RecursionLimit { limit: 512, .. }
        ), "{:?}", err);

        // still usable afterwards
        assert_eq!(grammar.parse("11").unwrap(), Value::Int(2));
    }

    #[test]
    fn recursion_limit_follows_options() {
        let grammar = number_list(CompileOptions {
            max_depth: 10,
            ..CompileOptions::default()
        });

        assert_eq!(grammar.parse("11111").unwrap(), Value::Int(5));
        assert!(matches!(
            grammar.parse(&"1".repeat(20)),
            Err(ParseError::RecursionLimit { position: 10, limit: 10 })
        ));
    }

    #[test]
    fn raised_limit_parses_long_list_on_large_stack() {
        let grammar = number_list(CompileOptions {
            max_depth: 5_000,
            ..CompileOptions::default()
        });

        let value = std::thread::scope(|scope| {
            std::thread::Builder::new()
                .stack_size(256 * 1024 * 1024)
                .spawn_scoped(scope, || grammar.parse(&"1".repeat(4_000)))
                .unwrap()
                .join()
                .unwrap()
        });
        assert_eq!(value.unwrap(), Value::Int(4_000));
    }

    #[test]
    fn hidden_left_recursion_fails_without_progress() {
        // W can vanish only through V, so left recursion through W is not
        // rejected at compile time
        let decls = GrammarBuilder::new()
            .token("x", "x")
            .token("y", "y")
            .rule("s", "W s x", "")
            .rule("s", "x", "")
            .rule("W", "V", "")
            .rule("V", "y", "")
            .rule("V", "EPS", "")
            .build();
        let grammar = CompiledGrammar::new(&decls, ExprEvaluator, CompileOptions::default()).unwrap();

        let (result, trace) = grammar.parse_with_trace("x");
        assert!(matches!(
            result,
            Err(ParseError::NoProgress { ref state, position: 0 }) if state == "s"
        ));
        assert_eq!(trace.last().unwrap().action, "error: no progress");
    }

    #[test]
    fn unexpected_token_lists_alternatives() {
        let grammar = counted_list();

        let err = grammar.parse("12").unwrap_err();
        assert!(matches!(
            err,
            ParseError::UnexpectedToken { position: 2, ref expected, ref found, .. }
                if expected == "one of NUM, SEMI" && found == "end of input"
        ));
    }

    #[test]
    fn action_errors_name_the_state() {
        let decls = GrammarBuilder::new()
            .token("NUM", r"\d+")
            .rule("s", "NUM", "int($0) / 0")
            .build();
        let grammar = CompiledGrammar::new(&decls, ExprEvaluator, CompileOptions::default()).unwrap();

        assert!(matches!(
            grammar.parse("4"),
            Err(ParseError::Action { ref state, source: ActionError::DivisionByZero }) if state == "s"
        ));
    }

    #[test]
    fn compile_rejects_broken_action() {
        let decls = GrammarBuilder::new()
            .token("NUM", r"\d+")
            .rule("s", "NUM", "$1")
            .build();

        assert!(matches!(
            CompiledGrammar::new(&decls, ExprEvaluator, CompileOptions::default()),
            Err(GrammarError::InvalidAction { ref state, source: ActionError::MissingChild { index: 1, len: 1 } }) if state == "s"
        ));
    }

    #[test]
    fn strict_option_rejects_overlapping_first_sets() {
        let decls = GrammarBuilder::new()
            .token("NUM", r"\d+")
            .rule("s", "a", "$0")
            .rule("s", "b", "$0")
            .rule("a", "NUM", "$0")
            .rule("b", "NUM", "$0")
            .build();

        let lenient = CompiledGrammar::new(&decls, ExprEvaluator, CompileOptions::default()).unwrap();
        assert_eq!(lenient.parse("7").unwrap(), Value::from("7"));

        let strict = CompileOptions {
            reject_first_set_overlap: true,
            ..CompileOptions::default()
        };
        assert!(matches!(
            CompiledGrammar::new(&decls, ExprEvaluator, strict),
            Err(GrammarError::OverlappingFirstSets { .. })
        ));
    }

    #[test]
    fn exposes_first_and_follow() {
        let grammar = counted_list();

        assert_eq!(grammar.first("NUM"), Some(HashSet::from([Terminal::token("NUM")])));
        assert_eq!(
            grammar.first("list"),
            Some(HashSet::from([Terminal::token("NUM"), Terminal::Epsilon]))
        );
        assert_eq!(
            grammar.follow("list"),
            Some(&HashSet::from([Terminal::token("SEMI")]))
        );
        assert_eq!(grammar.first("missing"), None);
    }

    #[test]
    fn trace_table_lists_steps() {
        let grammar = sum();
        let (result, trace) = grammar.parse_with_trace("1+1");

        assert!(result.is_ok());
        assert_eq!(trace.len(), 4);

        let table = CompiledGrammar::<ExprEvaluator>::trace_as_table(&trace).to_string();
        assert!(table.contains("Lookahead"));
        assert!(table.contains("s -> NUM PLUS NUM"));
        assert!(table.contains("match \"+\""));
    }

    #[test]
    fn failing_trace_ends_with_error_step() {
        let (result, trace) = sum().parse_with_trace("1+");

        assert!(result.is_err());
        assert!(trace.last().unwrap().action.starts_with("error: expected NUM"));
    }
}
