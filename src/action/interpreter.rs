//! A small expression language for rule actions.
//!
//! A program is a list of statements separated by `;` or newlines:
//! `name = expr`, `return expr`, or a bare expression. Its value is the first
//! `return`, otherwise the last bare expression. `$i` is the i-th child.

use std::{cmp::Ordering, collections::HashMap, fmt::Display};

use logos::{Lexer, Logos};
use serde::Serialize;

use crate::{action::ActionEvaluator, error::ActionError};

/// Attribute values produced by [`ExprEvaluator`]. Leaves are `Str`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum Value {
    Int(i64),
    Float(f64),
    Str(String),
    Bool(bool),
}

impl Value {
    fn type_name(&self) -> &'static str {
        match self {
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "str",
            Value::Bool(_) => "bool",
        }
    }

    fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Int(i) => write!(f, "{}", i),
            Value::Float(x) => write!(f, "{}", x),
            Value::Str(s) => write!(f, "{}", s),
            Value::Bool(b) => write!(f, "{}", b),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Str(value.to_string())
    }
}

/// Binary arithmetic operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

/// Comparison operations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Neq,
    Lt,
    Lte,
    Gt,
    Gte,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Literal(Value),
    Child(usize),
    Var(String),
    Neg(Box<Expr>),
    Not(Box<Expr>),
    BinOp {
        op: BinOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Cmp {
        op: CmpOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Cond {
        cond: Box<Expr>,
        then: Box<Expr>,
        otherwise: Box<Expr>,
    },
    Call {
        name: String,
        args: Vec<Expr>,
    },
}

#[derive(Debug, Clone, PartialEq)]
enum Stmt {
    Assign { name: String, expr: Expr },
    Return(Expr),
    Expr(Expr),
}

/// Tokens of the action language. Spaces, tabs and `#` comments are skipped;
/// newlines separate statements like `;`.
#[derive(Logos, Debug, Clone, PartialEq)]
#[logos(skip r"[ \t\r\f]+")]
#[logos(skip r"#[^\n]*")]
enum Tok {
    #[regex(r"[0-9]+", |lex| lex.slice().parse::<i64>().ok())]
    Int(i64),
    #[regex(r"[0-9]+\.[0-9]+", |lex| lex.slice().parse::<f64>().ok())]
    Float(f64),
    #[regex(r#""([^"\\]|\\.)*""#, unquote)]
    #[regex(r"'([^'\\]|\\.)*'", unquote)]
    Str(String),
    #[regex(r"[A-Za-z_][A-Za-z0-9_]*", |lex| lex.slice().to_string())]
    Ident(String),
    #[regex(r"\$[0-9]+", |lex| lex.slice()[1..].parse::<usize>().ok())]
    Child(usize),

    #[token("||")]
    OrOr,
    #[token("&&")]
    AndAnd,
    #[token("==")]
    EqEq,
    #[token("!=")]
    NotEq,
    #[token("<=")]
    LtEq,
    #[token(">=")]
    GtEq,
    #[token("<")]
    Lt,
    #[token(">")]
    Gt,
    #[token("+")]
    Plus,
    #[token("-")]
    Minus,
    #[token("*")]
    Star,
    #[token("/")]
    Slash,
    #[token("%")]
    Percent,
    #[token("!")]
    Bang,
    #[token("=")]
    Assign,
    #[token("?")]
    Question,
    #[token(":")]
    Colon,
    #[token("(")]
    LParen,
    #[token(")")]
    RParen,
    #[token(",")]
    Comma,

    #[token(";")]
    #[token("\n")]
    Sep,
}

/// Strips the quotes of a string literal and resolves `\n`, `\t` and `\<any>`.
fn unquote(lex: &mut Lexer<Tok>) -> String {
    let slice = lex.slice();
    let mut value = String::with_capacity(slice.len());
    let mut chars = slice[1..slice.len() - 1].chars();

    while let Some(c) = chars.next() {
        if c != '\\' {
            value.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => value.push('\n'),
            Some('t') => value.push('\t'),
            Some(other) => value.push(other),
            None => {}
        }
    }

    value
}

fn syntax(offset: usize, message: impl Into<String>) -> ActionError {
    ActionError::Syntax {
        offset,
        message: message.into(),
    }
}

fn lex(code: &str) -> Result<Vec<(Tok, usize)>, ActionError> {
    let mut lexer = Tok::lexer(code);
    let mut out = vec![];

    while let Some(tok) = lexer.next() {
        let offset = lexer.span().start;
        match tok {
            Ok(tok) => out.push((tok, offset)),
            Err(()) => return Err(syntax(offset, format!("unexpected {:?}", lexer.slice()))),
        }
    }

    Ok(out)
}

struct Parser {
    toks: Vec<(Tok, usize)>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.pos).map(|(tok, _)| tok)
    }

    fn offset(&self) -> usize {
        self.toks.get(self.pos).map(|(_, o)| *o).unwrap_or(self.end)
    }

    fn eat(&mut self, tok: &Tok) -> bool {
        if self.peek() == Some(tok) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect(&mut self, tok: &Tok, text: &str) -> Result<(), ActionError> {
        if self.eat(tok) {
            Ok(())
        } else {
            Err(syntax(self.offset(), format!("expected '{}'", text)))
        }
    }

    fn program(&mut self) -> Result<Vec<Stmt>, ActionError> {
        let mut stmts = vec![];

        loop {
            while self.eat(&Tok::Sep) {}
            if self.peek().is_none() {
                return Ok(stmts);
            }

            stmts.push(self.statement()?);

            match self.peek() {
                None | Some(Tok::Sep) => {}
                Some(_) => return Err(syntax(self.offset(), "expected end of statement")),
            }
        }
    }

    fn statement(&mut self) -> Result<Stmt, ActionError> {
        if let Some(Tok::Ident(name)) = self.peek() {
            if name == "return" {
                self.pos += 1;
                return Ok(Stmt::Return(self.expr()?));
            }

            if self.toks.get(self.pos + 1).map(|(tok, _)| tok) == Some(&Tok::Assign) {
                let name = name.clone();
                self.pos += 2;
                return Ok(Stmt::Assign {
                    name,
                    expr: self.expr()?,
                });
            }
        }

        Ok(Stmt::Expr(self.expr()?))
    }

    fn expr(&mut self) -> Result<Expr, ActionError> {
        let cond = self.or()?;

        if self.eat(&Tok::Question) {
            let then = self.expr()?;
            self.expect(&Tok::Colon, ":")?;
            let otherwise = self.expr()?;
            return Ok(Expr::Cond {
                cond: Box::new(cond),
                then: Box::new(then),
                otherwise: Box::new(otherwise),
            });
        }

        Ok(cond)
    }

    fn or(&mut self) -> Result<Expr, ActionError> {
        let mut left = self.and()?;
        while self.eat(&Tok::OrOr) {
            left = Expr::Or(Box::new(left), Box::new(self.and()?));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, ActionError> {
        let mut left = self.comparison()?;
        while self.eat(&Tok::AndAnd) {
            left = Expr::And(Box::new(left), Box::new(self.comparison()?));
        }
        Ok(left)
    }

    fn comparison(&mut self) -> Result<Expr, ActionError> {
        let left = self.additive()?;

        let op = match self.peek() {
            Some(Tok::EqEq) => CmpOp::Eq,
            Some(Tok::NotEq) => CmpOp::Neq,
            Some(Tok::Lt) => CmpOp::Lt,
            Some(Tok::LtEq) => CmpOp::Lte,
            Some(Tok::Gt) => CmpOp::Gt,
            Some(Tok::GtEq) => CmpOp::Gte,
            _ => return Ok(left),
        };
        self.pos += 1;

        Ok(Expr::Cmp {
            op,
            left: Box::new(left),
            right: Box::new(self.additive()?),
        })
    }

    fn additive(&mut self) -> Result<Expr, ActionError> {
        let mut left = self.multiplicative()?;

        loop {
            let op = match self.peek() {
                Some(Tok::Plus) => BinOp::Add,
                Some(Tok::Minus) => BinOp::Sub,
                _ => return Ok(left),
            };
            self.pos += 1;

            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(self.multiplicative()?),
            };
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ActionError> {
        let mut left = self.unary()?;

        loop {
            let op = match self.peek() {
                Some(Tok::Star) => BinOp::Mul,
                Some(Tok::Slash) => BinOp::Div,
                Some(Tok::Percent) => BinOp::Rem,
                _ => return Ok(left),
            };
            self.pos += 1;

            left = Expr::BinOp {
                op,
                left: Box::new(left),
                right: Box::new(self.unary()?),
            };
        }
    }

    fn unary(&mut self) -> Result<Expr, ActionError> {
        if self.eat(&Tok::Minus) {
            return Ok(Expr::Neg(Box::new(self.unary()?)));
        }
        if self.eat(&Tok::Bang) {
            return Ok(Expr::Not(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ActionError> {
        let offset = self.offset();
        let tok = match self.toks.get(self.pos) {
            Some((tok, _)) => tok.clone(),
            None => return Err(syntax(offset, "unexpected end of action code")),
        };
        self.pos += 1;

        match tok {
            Tok::Int(i) => Ok(Expr::Literal(Value::Int(i))),
            Tok::Float(x) => Ok(Expr::Literal(Value::Float(x))),
            Tok::Str(s) => Ok(Expr::Literal(Value::Str(s))),
            Tok::Child(index) => Ok(Expr::Child(index)),
            Tok::Ident(name) if name == "true" => Ok(Expr::Literal(Value::Bool(true))),
            Tok::Ident(name) if name == "false" => Ok(Expr::Literal(Value::Bool(false))),
            Tok::Ident(name) => {
                if !self.eat(&Tok::LParen) {
                    return Ok(Expr::Var(name));
                }

                let mut args = vec![];
                if !self.eat(&Tok::RParen) {
                    loop {
                        args.push(self.expr()?);
                        if self.eat(&Tok::RParen) {
                            break;
                        }
                        self.expect(&Tok::Comma, ",")?;
                    }
                }

                Ok(Expr::Call { name, args })
            }
            Tok::LParen => {
                let inner = self.expr()?;
                self.expect(&Tok::RParen, ")")?;
                Ok(inner)
            }
            _ => Err(syntax(offset, "expected an expression")),
        }
    }
}

fn parse(code: &str) -> Result<Vec<Stmt>, ActionError> {
    let mut parser = Parser {
        toks: lex(code)?,
        pos: 0,
        end: code.len(),
    };
    parser.program()
}

fn type_error(what: &str, values: &[&Value]) -> ActionError {
    let types: Vec<&str> = values.iter().map(|v| v.type_name()).collect();
    ActionError::Type(format!("cannot apply {} to {}", what, types.join(" and ")))
}

fn arithmetic(op: BinOp, left: Value, right: Value) -> Result<Value, ActionError> {
    match (op, &left, &right) {
        (BinOp::Add, Value::Str(a), Value::Str(b)) => Ok(Value::Str(format!("{}{}", a, b))),
        (_, Value::Int(a), Value::Int(b)) => {
            let (a, b) = (*a, *b);
            let result = match op {
                BinOp::Add => a.checked_add(b),
                BinOp::Sub => a.checked_sub(b),
                BinOp::Mul => a.checked_mul(b),
                BinOp::Div | BinOp::Rem if b == 0 => return Err(ActionError::DivisionByZero),
                BinOp::Div => a.checked_div(b),
                BinOp::Rem => a.checked_rem(b),
            };
            result.map(Value::Int).ok_or(ActionError::Overflow)
        }
        _ => {
            let (a, b) = match (left.as_f64(), right.as_f64()) {
                (Some(a), Some(b)) => (a, b),
                _ => return Err(type_error(&format!("{:?}", op), &[&left, &right])),
            };
            if matches!(op, BinOp::Div | BinOp::Rem) && b == 0.0 {
                return Err(ActionError::DivisionByZero);
            }
            Ok(Value::Float(match op {
                BinOp::Add => a + b,
                BinOp::Sub => a - b,
                BinOp::Mul => a * b,
                BinOp::Div => a / b,
                BinOp::Rem => a % b,
            }))
        }
    }
}

fn compare(op: CmpOp, left: &Value, right: &Value) -> Result<bool, ActionError> {
    let ordering = match (left, right) {
        (Value::Str(a), Value::Str(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
    };

    match (op, ordering) {
        (CmpOp::Eq, ordering) => Ok(ordering == Some(Ordering::Equal)),
        (CmpOp::Neq, ordering) => Ok(ordering != Some(Ordering::Equal)),
        (_, None) => Err(type_error(&format!("{:?}", op), &[left, right])),
        (CmpOp::Lt, Some(o)) => Ok(o == Ordering::Less),
        (CmpOp::Lte, Some(o)) => Ok(o != Ordering::Greater),
        (CmpOp::Gt, Some(o)) => Ok(o == Ordering::Greater),
        (CmpOp::Gte, Some(o)) => Ok(o != Ordering::Less),
    }
}

fn call(name: &str, mut args: Vec<Value>) -> Result<Value, ActionError> {
    let arg = match (name, args.len()) {
        ("int" | "float" | "str" | "len", 1) => args.remove(0),
        ("int" | "float" | "str" | "len", n) => {
            return Err(ActionError::Type(format!(
                "{}() takes 1 argument, {} given",
                name, n
            )))
        }
        _ => return Err(ActionError::UnknownFunction(name.to_string())),
    };

    match (name, arg) {
        ("int", Value::Int(i)) => Ok(Value::Int(i)),
        ("int", Value::Float(x)) => float_to_int(x),
        ("int", Value::Bool(b)) => Ok(Value::Int(b as i64)),
        ("int", Value::Str(s)) => s
            .trim()
            .parse()
            .map(Value::Int)
            .map_err(|_| ActionError::InvalidNumber(s)),
        ("float", Value::Str(s)) => s
            .trim()
            .parse()
            .map(Value::Float)
            .map_err(|_| ActionError::InvalidNumber(s)),
        ("float", Value::Bool(b)) => Ok(Value::Float(if b { 1.0 } else { 0.0 })),
        ("float", other) => Ok(Value::Float(other.as_f64().unwrap_or_default())),
        ("str", other) => Ok(Value::Str(other.to_string())),
        ("len", Value::Str(s)) => Ok(Value::Int(s.chars().count() as i64)),
        (_, other) => Err(type_error(name, &[&other])),
    }
}

fn float_to_int(x: f64) -> Result<Value, ActionError> {
    let x = x.trunc();
    if !x.is_finite() {
        return Err(ActionError::InvalidNumber(x.to_string()));
    }
    // i64::MAX as f64 rounds up to 2^63
    if x < i64::MIN as f64 || x >= i64::MAX as f64 {
        return Err(ActionError::Overflow);
    }
    Ok(Value::Int(x as i64))
}

struct Scope<'c> {
    children: &'c [Value],
    locals: HashMap<String, Value>,
}

impl Scope<'_> {
    fn truth(&mut self, expr: &Expr, what: &str) -> Result<bool, ActionError> {
        match self.eval(expr)? {
            Value::Bool(b) => Ok(b),
            other => Err(type_error(what, &[&other])),
        }
    }

    fn eval(&mut self, expr: &Expr) -> Result<Value, ActionError> {
        match expr {
            Expr::Literal(value) => Ok(value.clone()),
            Expr::Child(index) => {
                self.children
                    .get(*index)
                    .cloned()
                    .ok_or(ActionError::MissingChild {
                        index: *index,
                        len: self.children.len(),
                    })
            }
            Expr::Var(name) => self
                .locals
                .get(name)
                .cloned()
                .ok_or_else(|| ActionError::UnknownVariable(name.clone())),
            Expr::Neg(inner) => match self.eval(inner)? {
                Value::Int(i) => i.checked_neg().map(Value::Int).ok_or(ActionError::Overflow),
                Value::Float(x) => Ok(Value::Float(-x)),
                other => Err(type_error("-", &[&other])),
            },
            Expr::Not(inner) => Ok(Value::Bool(!self.truth(inner, "!")?)),
            Expr::BinOp { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                arithmetic(*op, left, right)
            }
            Expr::Cmp { op, left, right } => {
                let left = self.eval(left)?;
                let right = self.eval(right)?;
                compare(*op, &left, &right).map(Value::Bool)
            }
            Expr::And(left, right) => {
                Ok(Value::Bool(self.truth(left, "&&")? && self.truth(right, "&&")?))
            }
            Expr::Or(left, right) => {
                Ok(Value::Bool(self.truth(left, "||")? || self.truth(right, "||")?))
            }
            Expr::Cond {
                cond,
                then,
                otherwise,
            } => {
                if self.truth(cond, "?:")? {
                    self.eval(then)
                } else {
                    self.eval(otherwise)
                }
            }
            Expr::Call { name, args } => {
                let args = args
                    .iter()
                    .map(|arg| self.eval(arg))
                    .collect::<Result<Vec<_>, _>>()?;
                call(name, args)
            }
        }
    }

    fn run(&mut self, program: &[Stmt]) -> Result<Value, ActionError> {
        let mut last = None;

        for stmt in program {
            match stmt {
                Stmt::Assign { name, expr } => {
                    let value = self.eval(expr)?;
                    self.locals.insert(name.clone(), value);
                }
                Stmt::Return(expr) => return self.eval(expr),
                Stmt::Expr(expr) => last = Some(self.eval(expr)?),
            }
        }

        last.ok_or(ActionError::NoValue)
    }
}

fn max_child(expr: &Expr) -> Option<usize> {
    match expr {
        Expr::Literal(_) | Expr::Var(_) => None,
        Expr::Child(index) => Some(*index),
        Expr::Neg(inner) | Expr::Not(inner) => max_child(inner),
        Expr::BinOp { left, right, .. }
        | Expr::Cmp { left, right, .. }
        | Expr::And(left, right)
        | Expr::Or(left, right) => max_child(left).max(max_child(right)),
        Expr::Cond {
            cond,
            then,
            otherwise,
        } => max_child(cond).max(max_child(then)).max(max_child(otherwise)),
        Expr::Call { args, .. } => args.iter().filter_map(max_child).max(),
    }
}

/// Parsed action code, built once per rule while compiling.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    stmts: Vec<Stmt>,
}

impl Program {
    fn highest_child(&self) -> Option<usize> {
        self.stmts
            .iter()
            .filter_map(|stmt| match stmt {
                Stmt::Assign { expr, .. } | Stmt::Return(expr) | Stmt::Expr(expr) => {
                    max_child(expr)
                }
            })
            .max()
    }
}

/// The default [`ActionEvaluator`].
#[derive(Debug, Clone, Copy, Default)]
pub struct ExprEvaluator;

impl ActionEvaluator for ExprEvaluator {
    type Value = Value;
    type Program = Program;

    fn leaf(&self, text: &str) -> Value {
        Value::Str(text.to_string())
    }

    fn prepare(&self, code: &str) -> Result<Program, ActionError> {
        Ok(Program { stmts: parse(code)? })
    }

    fn evaluate(&self, program: &Program, children: Vec<Value>) -> Result<Value, ActionError> {
        // blank or comment-only code
        if program.stmts.is_empty() {
            return Ok(Value::Str(String::new()));
        }

        let mut scope = Scope {
            children: &children,
            locals: HashMap::new(),
        };
        scope.run(&program.stmts)
    }

    fn check(&self, program: &Program, arity: usize) -> Result<(), ActionError> {
        match program.highest_child() {
            Some(index) if index >= arity => Err(ActionError::MissingChild { index, len: arity }),
            _ => Ok(()),
        }
    }
}
