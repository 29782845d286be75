//! Expression parsing and per-observation evaluation.
//!
//! Expressions combine variable references, numeric and string literals,
//! arithmetic (`+ - * / ^`), comparisons (`== != < <= > >=`), logical
//! operators (`and`/`&`, `or`/`|`, `not`/`!`) and function calls. The same
//! evaluator drives `generate`, `replace`, `keep if`/`drop if` and
//! regression sample selection.
//!
//! Precedence, tightest first: unary minus and `not`, `^` (right
//! associative), `* /`, `+ -`, comparisons, `and`, `or`.
//!
//! Missing values propagate through arithmetic, comparisons and function
//! calls. `and`/`or` follow three-valued logic: `missing and false` is
//! false, `missing or true` is true, anything else involving missing is
//! missing. Comparisons and logical operators yield the integers 1 and 0.
//!
//! # Example
//!
//! ```
//! use u_statkit::dataset::Dataset;
//! use u_statkit::expr::Expression;
//! use u_statkit::types::{ScalarType, Value};
//!
//! let mut ds = Dataset::new();
//! ds.add_values("foreign", ScalarType::Integer, vec![0.into(), 1.into(), 1.into(), 0.into()]).unwrap();
//!
//! let expr = Expression::parse("foreign == 1").unwrap();
//! assert_eq!(expr.mask(&ds).unwrap(), vec![false, true, true, false]);
//!
//! let constant = Expression::parse("2 + 3 * 4").unwrap();
//! assert_eq!(constant.evaluate(&ds, 0).unwrap(), Value::Int(14));
//! ```

use std::fmt;
use std::str::FromStr;

use crate::dataset::Dataset;
use crate::error::{StatError, StatResult};
use crate::types::Value;

// ── AST ───────────────────────────────────────────────────────────────

/// Unary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    /// Arithmetic negation.
    Neg,
    /// Logical negation.
    Not,
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
}

impl BinaryOp {
    fn symbol(self) -> &'static str {
        match self {
            Self::Add => "+",
            Self::Sub => "-",
            Self::Mul => "*",
            Self::Div => "/",
            Self::Pow => "^",
            Self::Eq => "==",
            Self::Ne => "!=",
            Self::Lt => "<",
            Self::Le => "<=",
            Self::Gt => ">",
            Self::Ge => ">=",
            Self::And => "and",
            Self::Or => "or",
        }
    }
}

/// Built-in scalar functions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Function {
    /// Natural logarithm (`log` or `ln`).
    Log,
    /// Base-10 logarithm.
    Log10,
    Exp,
    Abs,
    Sqrt,
    Round,
    Floor,
    Ceil,
    Min,
    Max,
    /// 1 if the argument is missing, else 0.
    Missing,
}

impl Function {
    /// Looks up a function by (case-insensitive) name.
    pub fn from_name(name: &str) -> Option<Self> {
        Some(match name.to_ascii_lowercase().as_str() {
            "log" | "ln" => Self::Log,
            "log10" => Self::Log10,
            "exp" => Self::Exp,
            "abs" => Self::Abs,
            "sqrt" => Self::Sqrt,
            "round" => Self::Round,
            "floor" => Self::Floor,
            "ceil" => Self::Ceil,
            "min" => Self::Min,
            "max" => Self::Max,
            "missing" => Self::Missing,
            _ => return None,
        })
    }

    /// Canonical name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Log => "log",
            Self::Log10 => "log10",
            Self::Exp => "exp",
            Self::Abs => "abs",
            Self::Sqrt => "sqrt",
            Self::Round => "round",
            Self::Floor => "floor",
            Self::Ceil => "ceil",
            Self::Min => "min",
            Self::Max => "max",
            Self::Missing => "missing",
        }
    }

    /// Number of arguments the function takes.
    pub fn arity(self) -> usize {
        match self {
            Self::Min | Self::Max => 2,
            _ => 1,
        }
    }
}

/// Parsed expression tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// Numeric, string or missing literal.
    Literal(Value),
    /// Reference to a dataset column.
    Variable(String),
    Unary(UnaryOp, Box<Expr>),
    Binary(BinaryOp, Box<Expr>, Box<Expr>),
    Call(Function, Vec<Expr>),
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Literal(Value::Str(s)) => write!(f, "\"{s}\""),
            Self::Literal(v) => write!(f, "{v}"),
            Self::Variable(name) => write!(f, "{name}"),
            Self::Unary(UnaryOp::Neg, e) => write!(f, "-({e})"),
            Self::Unary(UnaryOp::Not, e) => write!(f, "not ({e})"),
            Self::Binary(op, l, r) => write!(f, "({l} {} {r})", op.symbol()),
            Self::Call(func, args) => {
                write!(f, "{}(", func.name())?;
                for (i, a) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{a}")?;
                }
                write!(f, ")")
            }
        }
    }
}

// ── Tokens ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Int(i64),
    Num(f64),
    Str(String),
    Ident(String),
    MissingLit,
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Not,
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone)]
struct Token {
    kind: TokenKind,
    pos: usize,
}

fn syntax(position: usize, message: impl Into<String>) -> StatError {
    StatError::ExpressionSyntax {
        position,
        message: message.into(),
    }
}

fn tokenize(input: &str) -> StatResult<Vec<Token>> {
    let bytes = input.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let b = bytes[i];
        if b.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        let start = i;

        // Two-character operators
        if i + 1 < bytes.len() {
            let kind = match &bytes[i..i + 2] {
                b"==" => Some(TokenKind::Eq),
                b"!=" | b"~=" => Some(TokenKind::Ne),
                b"<=" => Some(TokenKind::Le),
                b">=" => Some(TokenKind::Ge),
                b"&&" => Some(TokenKind::And),
                b"||" => Some(TokenKind::Or),
                _ => None,
            };
            if let Some(kind) = kind {
                tokens.push(Token { kind, pos: start });
                i += 2;
                continue;
            }
        }

        let single = match b {
            b'+' => Some(TokenKind::Plus),
            b'-' => Some(TokenKind::Minus),
            b'*' => Some(TokenKind::Star),
            b'/' => Some(TokenKind::Slash),
            b'^' => Some(TokenKind::Caret),
            b'<' => Some(TokenKind::Lt),
            b'>' => Some(TokenKind::Gt),
            b'&' => Some(TokenKind::And),
            b'|' => Some(TokenKind::Or),
            b'!' | b'~' => Some(TokenKind::Not),
            b'(' => Some(TokenKind::LParen),
            b')' => Some(TokenKind::RParen),
            b',' => Some(TokenKind::Comma),
            _ => None,
        };
        if let Some(kind) = single {
            tokens.push(Token { kind, pos: start });
            i += 1;
            continue;
        }

        match b {
            b'=' => return Err(syntax(start, "'=' is not a comparison; use '=='")),
            b'"' | b'\'' => {
                i += 1;
                while i < bytes.len() && bytes[i] != b {
                    i += 1;
                }
                if i >= bytes.len() {
                    return Err(syntax(start, "unterminated string literal"));
                }
                let text = input[start + 1..i].to_string();
                tokens.push(Token {
                    kind: TokenKind::Str(text),
                    pos: start,
                });
                i += 1;
            }
            b'.' if !bytes.get(i + 1).is_some_and(u8::is_ascii_digit) => {
                tokens.push(Token {
                    kind: TokenKind::MissingLit,
                    pos: start,
                });
                i += 1;
            }
            _ if b.is_ascii_digit() || b == b'.' => {
                let mut integral = true;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                if i < bytes.len() && bytes[i] == b'.' {
                    integral = false;
                    i += 1;
                    while i < bytes.len() && bytes[i].is_ascii_digit() {
                        i += 1;
                    }
                }
                if i < bytes.len() && (bytes[i] == b'e' || bytes[i] == b'E') {
                    let mut j = i + 1;
                    if j < bytes.len() && (bytes[j] == b'+' || bytes[j] == b'-') {
                        j += 1;
                    }
                    if j < bytes.len() && bytes[j].is_ascii_digit() {
                        integral = false;
                        i = j;
                        while i < bytes.len() && bytes[i].is_ascii_digit() {
                            i += 1;
                        }
                    }
                }
                let text = &input[start..i];
                let kind = match (integral, text.parse::<i64>()) {
                    (true, Ok(v)) => TokenKind::Int(v),
                    _ => TokenKind::Num(
                        text.parse::<f64>()
                            .map_err(|_| syntax(start, format!("invalid number '{text}'")))?,
                    ),
                };
                tokens.push(Token { kind, pos: start });
            }
            _ if b.is_ascii_alphabetic() || b == b'_' => {
                while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                    i += 1;
                }
                let word = &input[start..i];
                let kind = match word.to_ascii_lowercase().as_str() {
                    "and" => TokenKind::And,
                    "or" => TokenKind::Or,
                    "not" => TokenKind::Not,
                    _ => TokenKind::Ident(word.to_string()),
                };
                tokens.push(Token { kind, pos: start });
            }
            _ => {
                let ch = input[start..].chars().next().unwrap_or('?');
                return Err(syntax(start, format!("unexpected character '{ch}'")));
            }
        }
    }

    Ok(tokens)
}

// ── Parser ────────────────────────────────────────────────────────────

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
    end: usize,
}

impl<'a> Parser<'a> {
    fn peek(&self) -> Option<&TokenKind> {
        self.tokens.get(self.pos).map(|t| &t.kind)
    }

    fn position(&self) -> usize {
        self.tokens.get(self.pos).map_or(self.end, |t| t.pos)
    }

    fn advance(&mut self) -> Option<&'a Token> {
        let t = self.tokens.get(self.pos);
        if t.is_some() {
            self.pos += 1;
        }
        t
    }

    fn expect(&mut self, expected: TokenKind, what: &str) -> StatResult<()> {
        if self.peek() == Some(&expected) {
            self.pos += 1;
            Ok(())
        } else {
            Err(syntax(self.position(), format!("expected {what}")))
        }
    }

    fn parse_or(&mut self) -> StatResult<Expr> {
        let mut lhs = self.parse_and()?;
        while self.peek() == Some(&TokenKind::Or) {
            self.pos += 1;
            let rhs = self.parse_and()?;
            lhs = Expr::Binary(BinaryOp::Or, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_and(&mut self) -> StatResult<Expr> {
        let mut lhs = self.parse_cmp()?;
        while self.peek() == Some(&TokenKind::And) {
            self.pos += 1;
            let rhs = self.parse_cmp()?;
            lhs = Expr::Binary(BinaryOp::And, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn parse_cmp(&mut self) -> StatResult<Expr> {
        let mut lhs = self.parse_add()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Eq) => BinaryOp::Eq,
                Some(TokenKind::Ne) => BinaryOp::Ne,
                Some(TokenKind::Lt) => BinaryOp::Lt,
                Some(TokenKind::Le) => BinaryOp::Le,
                Some(TokenKind::Gt) => BinaryOp::Gt,
                Some(TokenKind::Ge) => BinaryOp::Ge,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_add()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_add(&mut self) -> StatResult<Expr> {
        let mut lhs = self.parse_mul()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Plus) => BinaryOp::Add,
                Some(TokenKind::Minus) => BinaryOp::Sub,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_mul()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_mul(&mut self) -> StatResult<Expr> {
        let mut lhs = self.parse_pow()?;
        loop {
            let op = match self.peek() {
                Some(TokenKind::Star) => BinaryOp::Mul,
                Some(TokenKind::Slash) => BinaryOp::Div,
                _ => return Ok(lhs),
            };
            self.pos += 1;
            let rhs = self.parse_pow()?;
            lhs = Expr::Binary(op, Box::new(lhs), Box::new(rhs));
        }
    }

    fn parse_pow(&mut self) -> StatResult<Expr> {
        let base = self.parse_unary()?;
        if self.peek() == Some(&TokenKind::Caret) {
            self.pos += 1;
            let exponent = self.parse_pow()?;
            return Ok(Expr::Binary(BinaryOp::Pow, Box::new(base), Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_unary(&mut self) -> StatResult<Expr> {
        let op = match self.peek() {
            Some(TokenKind::Minus) => UnaryOp::Neg,
            Some(TokenKind::Not) => UnaryOp::Not,
            _ => return self.parse_primary(),
        };
        self.pos += 1;
        let operand = self.parse_unary()?;
        Ok(Expr::Unary(op, Box::new(operand)))
    }

    fn parse_primary(&mut self) -> StatResult<Expr> {
        let pos = self.position();
        let token = self
            .advance()
            .ok_or_else(|| syntax(pos, "unexpected end of expression"))?;
        match &token.kind {
            TokenKind::Int(v) => Ok(Expr::Literal(Value::Int(*v))),
            TokenKind::Num(v) => Ok(Expr::Literal(Value::Float(*v))),
            TokenKind::Str(s) => Ok(Expr::Literal(Value::Str(s.clone()))),
            TokenKind::MissingLit => Ok(Expr::Literal(Value::Missing)),
            TokenKind::LParen => {
                let inner = self.parse_or()?;
                self.expect(TokenKind::RParen, "')'")?;
                Ok(inner)
            }
            TokenKind::Ident(name) if self.peek() == Some(&TokenKind::LParen) => {
                let func = Function::from_name(name)
                    .ok_or_else(|| syntax(pos, format!("unknown function '{name}'")))?;
                self.pos += 1;
                let mut args = Vec::new();
                if self.peek() != Some(&TokenKind::RParen) {
                    args.push(self.parse_or()?);
                    while self.peek() == Some(&TokenKind::Comma) {
                        self.pos += 1;
                        args.push(self.parse_or()?);
                    }
                }
                self.expect(TokenKind::RParen, "')' after function arguments")?;
                if args.len() != func.arity() {
                    return Err(syntax(
                        pos,
                        format!(
                            "{}() takes {} argument(s), got {}",
                            func.name(),
                            func.arity(),
                            args.len()
                        ),
                    ));
                }
                Ok(Expr::Call(func, args))
            }
            TokenKind::Ident(name) => Ok(Expr::Variable(name.clone())),
            other => Err(syntax(pos, format!("unexpected token {other:?}"))),
        }
    }
}

// ── Expression ────────────────────────────────────────────────────────

/// A parsed expression, ready to be evaluated against a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct Expression {
    source: String,
    root: Expr,
}

impl Expression {
    /// Parses expression text.
    pub fn parse(text: &str) -> StatResult<Self> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err(syntax(0, "empty expression"));
        }
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
            end: text.len(),
        };
        let root = parser.parse_or()?;
        if parser.pos < tokens.len() {
            let t = &tokens[parser.pos];
            return Err(syntax(t.pos, format!("unexpected token {:?}", t.kind)));
        }
        Ok(Self {
            source: text.to_string(),
            root,
        })
    }

    /// An expression consisting of a single variable reference.
    pub fn variable(name: &str) -> Self {
        Self {
            source: name.to_string(),
            root: Expr::Variable(name.to_string()),
        }
    }

    /// The original text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// The root of the parse tree.
    pub fn root(&self) -> &Expr {
        &self.root
    }

    /// Variable names referenced, in order of first appearance.
    pub fn variables(&self) -> Vec<&str> {
        fn walk<'e>(e: &'e Expr, out: &mut Vec<&'e str>) {
            match e {
                Expr::Literal(_) => {}
                Expr::Variable(name) => {
                    if !out.contains(&name.as_str()) {
                        out.push(name);
                    }
                }
                Expr::Unary(_, inner) => walk(inner, out),
                Expr::Binary(_, l, r) => {
                    walk(l, out);
                    walk(r, out);
                }
                Expr::Call(_, args) => args.iter().for_each(|a| walk(a, out)),
            }
        }
        let mut out = Vec::new();
        walk(&self.root, &mut out);
        out
    }

    /// Evaluates the expression for observation `row`.
    pub fn evaluate(&self, dataset: &Dataset, row: usize) -> StatResult<Value> {
        if row >= dataset.n_obs() && !(dataset.n_obs() == 0 && row == 0) {
            return Err(StatError::IndexOutOfRange {
                index: row,
                len: dataset.n_obs(),
            });
        }
        eval(&self.root, dataset, row)
    }

    /// Evaluates the expression for every observation, in order.
    ///
    /// The first failing observation aborts the pass; its index is attached
    /// via [`StatError::AtRow`].
    pub fn evaluate_all(&self, dataset: &Dataset) -> StatResult<Vec<Value>> {
        (0..dataset.n_obs())
            .map(|row| eval(&self.root, dataset, row).map_err(|e| e.at_row(row)))
            .collect()
    }

    /// Evaluates the expression as a filter.
    ///
    /// Non-zero numbers select the observation; zero and missing do not.
    pub fn mask(&self, dataset: &Dataset) -> StatResult<Vec<bool>> {
        (0..dataset.n_obs())
            .map(|row| {
                eval(&self.root, dataset, row)
                    .and_then(|v| truth(&v))
                    .map(|t| t.unwrap_or(false))
                    .map_err(|e| e.at_row(row))
            })
            .collect()
    }
}

impl FromStr for Expression {
    type Err = StatError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for Expression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.source)
    }
}

// ── Evaluation ────────────────────────────────────────────────────────

/// Truth value of a scalar; `None` for missing.
fn truth(v: &Value) -> StatResult<Option<bool>> {
    match v {
        Value::Missing => Ok(None),
        Value::Int(i) => Ok(Some(*i != 0)),
        Value::Float(f) => Ok(Some(*f != 0.0)),
        Value::Str(_) => Err(StatError::TypeMismatch {
            message: "string used as a condition".into(),
        }),
    }
}

fn flag(b: bool) -> Value {
    Value::Int(i64::from(b))
}

fn eval(e: &Expr, ds: &Dataset, row: usize) -> StatResult<Value> {
    match e {
        Expr::Literal(v) => Ok(v.clone()),
        Expr::Variable(name) => ds
            .column_by_name(name)
            .ok_or_else(|| StatError::UnknownVariable { name: name.clone() })?
            .value(row)
            .ok_or(StatError::IndexOutOfRange {
                index: row,
                len: ds.n_obs(),
            }),
        Expr::Unary(UnaryOp::Neg, inner) => match eval(inner, ds, row)? {
            Value::Missing => Ok(Value::Missing),
            Value::Int(i) => Ok(i.checked_neg().map_or(Value::Float(-(i as f64)), Value::Int)),
            Value::Float(f) => Ok(Value::Float(-f)),
            Value::Str(_) => Err(StatError::TypeMismatch {
                message: "cannot negate a string".into(),
            }),
        },
        Expr::Unary(UnaryOp::Not, inner) => {
            let v = eval(inner, ds, row)?;
            Ok(truth(&v)?.map_or(Value::Missing, |t| flag(!t)))
        }
        Expr::Binary(BinaryOp::And, l, r) => {
            let lt = truth(&eval(l, ds, row)?)?;
            if lt == Some(false) {
                return Ok(flag(false));
            }
            let rt = truth(&eval(r, ds, row)?)?;
            Ok(match (lt, rt) {
                (_, Some(false)) => flag(false),
                (Some(true), Some(true)) => flag(true),
                _ => Value::Missing,
            })
        }
        Expr::Binary(BinaryOp::Or, l, r) => {
            let lt = truth(&eval(l, ds, row)?)?;
            if lt == Some(true) {
                return Ok(flag(true));
            }
            let rt = truth(&eval(r, ds, row)?)?;
            Ok(match (lt, rt) {
                (_, Some(true)) => flag(true),
                (Some(false), Some(false)) => flag(false),
                _ => Value::Missing,
            })
        }
        Expr::Binary(op, l, r) => {
            let lhs = eval(l, ds, row)?;
            let rhs = eval(r, ds, row)?;
            binary(*op, lhs, rhs)
        }
        Expr::Call(func, args) => {
            let values = args
                .iter()
                .map(|a| eval(a, ds, row))
                .collect::<StatResult<Vec<_>>>()?;
            call(*func, &values)
        }
    }
}

fn binary(op: BinaryOp, lhs: Value, rhs: Value) -> StatResult<Value> {
    if lhs.is_missing() || rhs.is_missing() {
        return Ok(Value::Missing);
    }
    match (lhs, rhs) {
        (Value::Str(a), Value::Str(b)) => string_binary(op, a, b),
        (Value::Str(_), _) | (_, Value::Str(_)) => Err(StatError::TypeMismatch {
            message: format!("'{}' between string and number", op.symbol()),
        }),
        (Value::Int(a), Value::Int(b)) => int_binary(op, a, b),
        (a, b) => {
            let x = a.as_f64().unwrap_or(f64::NAN);
            let y = b.as_f64().unwrap_or(f64::NAN);
            float_binary(op, x, y)
        }
    }
}

fn string_binary(op: BinaryOp, a: String, b: String) -> StatResult<Value> {
    Ok(match op {
        BinaryOp::Add => Value::Str(a + &b),
        BinaryOp::Eq => flag(a == b),
        BinaryOp::Ne => flag(a != b),
        BinaryOp::Lt => flag(a < b),
        BinaryOp::Le => flag(a <= b),
        BinaryOp::Gt => flag(a > b),
        BinaryOp::Ge => flag(a >= b),
        _ => {
            return Err(StatError::TypeMismatch {
                message: format!("'{}' is not defined for strings", op.symbol()),
            })
        }
    })
}

fn int_binary(op: BinaryOp, a: i64, b: i64) -> StatResult<Value> {
    let widened = || float_binary(op, a as f64, b as f64);
    match op {
        BinaryOp::Add => a.checked_add(b).map_or_else(widened, |v| Ok(Value::Int(v))),
        BinaryOp::Sub => a.checked_sub(b).map_or_else(widened, |v| Ok(Value::Int(v))),
        BinaryOp::Mul => a.checked_mul(b).map_or_else(widened, |v| Ok(Value::Int(v))),
        BinaryOp::Eq => Ok(flag(a == b)),
        BinaryOp::Ne => Ok(flag(a != b)),
        BinaryOp::Lt => Ok(flag(a < b)),
        BinaryOp::Le => Ok(flag(a <= b)),
        BinaryOp::Gt => Ok(flag(a > b)),
        BinaryOp::Ge => Ok(flag(a >= b)),
        _ => widened(),
    }
}

fn float_binary(op: BinaryOp, a: f64, b: f64) -> StatResult<Value> {
    let result = match op {
        BinaryOp::Add => a + b,
        BinaryOp::Sub => a - b,
        BinaryOp::Mul => a * b,
        BinaryOp::Div => {
            if b == 0.0 {
                return Err(StatError::DivisionByZero);
            }
            a / b
        }
        BinaryOp::Pow => {
            let p = a.powf(b);
            if !p.is_finite() {
                return Err(StatError::Domain {
                    function: "^",
                    value: a,
                });
            }
            p
        }
        BinaryOp::Eq => return Ok(flag(a == b)),
        BinaryOp::Ne => return Ok(flag(a != b)),
        BinaryOp::Lt => return Ok(flag(a < b)),
        BinaryOp::Le => return Ok(flag(a <= b)),
        BinaryOp::Gt => return Ok(flag(a > b)),
        BinaryOp::Ge => return Ok(flag(a >= b)),
        BinaryOp::And | BinaryOp::Or => unreachable!("logical operators are evaluated lazily"),
    };
    if !result.is_finite() {
        return Err(StatError::NumericalInstability {
            quantity: "arithmetic result",
        });
    }
    Ok(Value::Float(result))
}

fn call(func: Function, args: &[Value]) -> StatResult<Value> {
    if func == Function::Missing {
        return Ok(flag(args.first().map_or(true, Value::is_missing)));
    }
    if args.iter().any(Value::is_missing) {
        return Ok(Value::Missing);
    }
    if args.iter().any(|a| matches!(a, Value::Str(_))) {
        return Err(StatError::TypeMismatch {
            message: format!("{}() expects numeric arguments", func.name()),
        });
    }

    match (func, args) {
        (Function::Abs, [Value::Int(i)]) => {
            return Ok(i.checked_abs().map_or(Value::Float((*i as f64).abs()), Value::Int))
        }
        (Function::Min, [Value::Int(a), Value::Int(b)]) => return Ok(Value::Int(*a.min(b))),
        (Function::Max, [Value::Int(a), Value::Int(b)]) => return Ok(Value::Int(*a.max(b))),
        _ => {}
    }

    let x = args.first().and_then(Value::as_f64).unwrap_or(f64::NAN);
    let domain = |value: f64| StatError::Domain {
        function: func.name(),
        value,
    };
    let result = match func {
        Function::Log if x <= 0.0 => return Err(domain(x)),
        Function::Log => x.ln(),
        Function::Log10 if x <= 0.0 => return Err(domain(x)),
        Function::Log10 => x.log10(),
        Function::Sqrt if x < 0.0 => return Err(domain(x)),
        Function::Sqrt => x.sqrt(),
        Function::Exp => x.exp(),
        Function::Abs => x.abs(),
        Function::Round => x.round(),
        Function::Floor => x.floor(),
        Function::Ceil => x.ceil(),
        Function::Min | Function::Max => {
            let y = args.get(1).and_then(Value::as_f64).unwrap_or(f64::NAN);
            if func == Function::Min {
                x.min(y)
            } else {
                x.max(y)
            }
        }
        Function::Missing => unreachable!("handled above"),
    };
    if !result.is_finite() {
        return Err(domain(x));
    }
    Ok(Value::Float(result))
}

// ── Tests ─────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScalarType;

    fn auto() -> Dataset {
        let mut ds = Dataset::new();
        ds.add_values(
            "price",
            ScalarType::Integer,
            vec![4099.into(), 4749.into(), Value::Missing, 4816.into()],
        )
        .unwrap();
        ds.add_values(
            "foreign",
            ScalarType::Integer,
            vec![0.into(), 1.into(), 1.into(), 0.into()],
        )
        .unwrap();
        ds.add_values(
            "make",
            ScalarType::String,
            vec!["AMC".into(), "Audi".into(), "BMW".into(), "Buick".into()],
        )
        .unwrap();
        ds
    }

    fn eval_const(text: &str) -> StatResult<Value> {
        Expression::parse(text)?.evaluate(&Dataset::new(), 0)
    }

    // ── Parsing ──────────────────────────────────────────────────

    #[test]
    fn precedence() {
        assert_eq!(eval_const("2 + 3 * 4").unwrap(), Value::Int(14));
        assert_eq!(eval_const("(2 + 3) * 4").unwrap(), Value::Int(20));
        assert_eq!(eval_const("2 * 3 ^ 2").unwrap(), Value::Float(18.0));
        assert_eq!(eval_const("2 ^ 3 ^ 2").unwrap(), Value::Float(512.0));
        assert_eq!(eval_const("-2 ^ 2").unwrap(), Value::Float(4.0));
        assert_eq!(eval_const("1 + 1 == 2 and 3 > 2").unwrap(), Value::Int(1));
        assert_eq!(eval_const("0 and 1 or 1").unwrap(), Value::Int(1));
    }

    #[test]
    fn parse_tree_shape() {
        let e = Expression::parse("a + b * c").unwrap();
        assert_eq!(e.root().to_string(), "(a + (b * c))");
        let e = Expression::parse("not x == 1").unwrap();
        assert_eq!(e.root().to_string(), "(not (x) == 1)");
    }

    #[test]
    fn alternative_spellings() {
        assert_eq!(eval_const("1 & 0 | 1").unwrap(), Value::Int(1));
        assert_eq!(eval_const("1 && !0").unwrap(), Value::Int(1));
        assert_eq!(eval_const("3 ~= 3").unwrap(), Value::Int(0));
        assert_eq!(eval_const("NOT 0").unwrap(), Value::Int(1));
    }

    #[test]
    fn number_literals() {
        assert_eq!(eval_const("1.5e2").unwrap(), Value::Float(150.0));
        assert_eq!(eval_const(".5").unwrap(), Value::Float(0.5));
        assert_eq!(eval_const("7").unwrap(), Value::Int(7));
        assert_eq!(eval_const(".").unwrap(), Value::Missing);
    }

    #[test]
    fn syntax_errors() {
        for bad in ["", "1 +", "(1 + 2", "1 2", "x = 1", "'open", "log()", "min(1)", "foo(1)", "#"] {
            let err = Expression::parse(bad).unwrap_err();
            assert!(
                matches!(err, StatError::ExpressionSyntax { .. }),
                "{bad:?} gave {err:?}"
            );
        }
    }

    #[test]
    fn syntax_error_position() {
        match Expression::parse("price + * 2").unwrap_err() {
            StatError::ExpressionSyntax { position, .. } => assert_eq!(position, 8),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn referenced_variables() {
        let e = Expression::parse("log(price) + price * foreign").unwrap();
        assert_eq!(e.variables(), vec!["price", "foreign"]);
    }

    // ── Evaluation ───────────────────────────────────────────────

    #[test]
    fn variable_resolution() {
        let ds = auto();
        let e = Expression::parse("price + 1").unwrap();
        assert_eq!(e.evaluate(&ds, 0).unwrap(), Value::Int(4100));

        let err = Expression::parse("mpg").unwrap().evaluate(&ds, 0).unwrap_err();
        assert!(matches!(err, StatError::UnknownVariable { .. }));
    }

    #[test]
    fn comparison_mask() {
        let ds = auto();
        let e = Expression::parse("foreign == 1").unwrap();
        assert_eq!(e.mask(&ds).unwrap(), vec![false, true, true, false]);
    }

    #[test]
    fn missing_propagates() {
        let ds = auto();
        let values = Expression::parse("price * 2").unwrap().evaluate_all(&ds).unwrap();
        assert_eq!(values[2], Value::Missing);
        let cmp = Expression::parse("price > 0").unwrap().evaluate(&ds, 2).unwrap();
        assert_eq!(cmp, Value::Missing);
        assert_eq!(eval_const("log(.)").unwrap(), Value::Missing);
        assert_eq!(eval_const("-.").unwrap(), Value::Missing);
        assert_eq!(eval_const("not .").unwrap(), Value::Missing);
    }

    #[test]
    fn overflow_is_an_error() {
        assert!(matches!(
            eval_const("1e308 * 10").unwrap_err(),
            StatError::NumericalInstability { .. }
        ));
        assert!(matches!(
            eval_const("-1e308 - 1e308").unwrap_err(),
            StatError::NumericalInstability { .. }
        ));
    }

    #[test]
    fn three_valued_logic() {
        assert_eq!(eval_const(". and 0").unwrap(), Value::Int(0));
        assert_eq!(eval_const("0 and .").unwrap(), Value::Int(0));
        assert_eq!(eval_const(". and 1").unwrap(), Value::Missing);
        assert_eq!(eval_const(". or 1").unwrap(), Value::Int(1));
        assert_eq!(eval_const("1 or .").unwrap(), Value::Int(1));
        assert_eq!(eval_const(". or 0").unwrap(), Value::Missing);
    }

    #[test]
    fn short_circuit_skips_rhs() {
        assert_eq!(eval_const("0 and 1 / 0").unwrap(), Value::Int(0));
        assert_eq!(eval_const("1 or 1 / 0").unwrap(), Value::Int(1));
    }

    #[test]
    fn missing_filter_is_false() {
        let ds = auto();
        let mask = Expression::parse("price > 4500").unwrap().mask(&ds).unwrap();
        assert_eq!(mask, vec![false, true, false, true]);
    }

    #[test]
    fn division_by_zero_reports_row() {
        let ds = auto();
        let err = Expression::parse("price / 0").unwrap().evaluate_all(&ds).unwrap_err();
        assert_eq!(err.row(), Some(0));
        assert_eq!(err.innermost(), &StatError::DivisionByZero);

        let err = Expression::parse("price / (foreign - 1)")
            .unwrap()
            .evaluate_all(&ds)
            .unwrap_err();
        assert_eq!(err.row(), Some(1));
    }

    #[test]
    fn integer_arithmetic() {
        assert_eq!(eval_const("7 / 2").unwrap(), Value::Float(3.5));
        assert_eq!(eval_const("7 - 9").unwrap(), Value::Int(-2));
        assert_eq!(
            eval_const("9223372036854775807 + 1").unwrap(),
            Value::Float(9_223_372_036_854_775_808.0)
        );
    }

    #[test]
    fn functions() {
        let v = eval_const("log(10)").unwrap().as_f64().unwrap();
        assert!((v - std::f64::consts::LN_10).abs() < 1e-12);
        assert_eq!(eval_const("sqrt(16)").unwrap(), Value::Float(4.0));
        assert_eq!(eval_const("abs(-3)").unwrap(), Value::Int(3));
        assert_eq!(eval_const("abs(-3.5)").unwrap(), Value::Float(3.5));
        assert_eq!(eval_const("exp(0)").unwrap(), Value::Float(1.0));
        assert_eq!(eval_const("round(2.6)").unwrap(), Value::Float(3.0));
        assert_eq!(eval_const("floor(-1.5)").unwrap(), Value::Float(-2.0));
        assert_eq!(eval_const("ceil(1.2)").unwrap(), Value::Float(2.0));
        assert_eq!(eval_const("min(3, 2)").unwrap(), Value::Int(2));
        assert_eq!(eval_const("max(1.5, 2)").unwrap(), Value::Float(2.0));
        let v = eval_const("log10(1000)").unwrap().as_f64().unwrap();
        assert!((v - 3.0).abs() < 1e-12);
        assert_eq!(eval_const("missing(.)").unwrap(), Value::Int(1));
        assert_eq!(eval_const("missing(3)").unwrap(), Value::Int(0));
        assert_eq!(eval_const("LN(1)").unwrap(), Value::Float(0.0));
    }

    #[test]
    fn function_domain_errors() {
        for bad in ["log(0)", "log(-1)", "sqrt(-4)", "log10(0)", "exp(1000)"] {
            let err = eval_const(bad).unwrap_err();
            assert!(matches!(err, StatError::Domain { .. }), "{bad} gave {err:?}");
        }
        assert!(matches!(
            eval_const("(-8) ^ 0.5").unwrap_err(),
            StatError::Domain { .. }
        ));
    }

    #[test]
    fn strings() {
        let ds = auto();
        let e = Expression::parse("make == \"Audi\"").unwrap();
        assert_eq!(e.mask(&ds).unwrap(), vec![false, true, false, false]);
        let e = Expression::parse("make + '!'").unwrap();
        assert_eq!(e.evaluate(&ds, 2).unwrap(), Value::Str("BMW!".into()));
        assert_eq!(eval_const("'a' < 'b'").unwrap(), Value::Int(1));

        for bad in ["make * 2", "make + 1", "-make", "log(make)"] {
            let err = Expression::parse(bad).unwrap().evaluate(&ds, 0).unwrap_err();
            assert!(matches!(err, StatError::TypeMismatch { .. }), "{bad}");
        }
        let err = Expression::parse("make").unwrap().mask(&ds).unwrap_err();
        assert!(matches!(err.innermost(), StatError::TypeMismatch { .. }));
    }

    #[test]
    fn row_out_of_range() {
        let ds = auto();
        let err = Expression::parse("1").unwrap().evaluate(&ds, 10).unwrap_err();
        assert!(matches!(err, StatError::IndexOutOfRange { .. }));
    }

    #[test]
    fn from_str_and_display() {
        let e: Expression = "price / 2".parse().unwrap();
        assert_eq!(e.to_string(), "price / 2");
        assert_eq!(e.source(), "price / 2");
    }
}
