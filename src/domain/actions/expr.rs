//! Expression language used by step operands, guards and conditions.
//!
//! ```text
//! status in ('draft', 'pending') and total <= $budget
//! line.qty > 0 or self.priority is not null
//! coalesce(closed_at, now())
//! ```
//!
//! Parsing produces unresolved [`Expr::Path`] nodes; the action compiler
//! replaces them with [`Expr::Column`] once names are bound.

use serde_json::Value;
use thiserror::Error;

use super::ir::TableRef;
use crate::domain::types::PrimitiveKind;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message} at offset {offset}")]
pub struct ExprError {
    pub offset: usize,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    /// Kept as written to avoid float round-off in rendered code.
    Decimal(String),
    Text(String),
}

impl Literal {
    pub fn kind(&self) -> Option<PrimitiveKind> {
        match self {
            Literal::Null => None,
            Literal::Bool(_) => Some(PrimitiveKind::Boolean),
            Literal::Int(_) => Some(PrimitiveKind::Integer),
            Literal::Decimal(_) => Some(PrimitiveKind::Decimal),
            Literal::Text(_) => Some(PrimitiveKind::Text),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Literal::Null => Value::Null,
            Literal::Bool(b) => Value::Bool(*b),
            Literal::Int(i) => Value::from(*i),
            Literal::Decimal(d) => d
                .parse::<f64>()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map_or_else(|| Value::String(d.clone()), Value::Number),
            Literal::Text(s) => Value::String(s.clone()),
        }
    }
}

/// Which row a resolved column belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Scope {
    /// The row the action was invoked on.
    Row,
    /// The row being filtered or mutated by the enclosing step.
    Target,
    /// The current element of a `foreach`.
    Var(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    And,
    Or,
    Add,
    Sub,
    Mul,
    Div,
}

impl BinaryOp {
    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Eq => "=",
            BinaryOp::Ne => "<>",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::And => "AND",
            BinaryOp::Or => "OR",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
        }
    }

    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, BinaryOp::And | BinaryOp::Or)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Func {
    Now,
    Today,
    Coalesce,
    Lower,
    Upper,
}

impl Func {
    fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "now" => Some(Func::Now),
            "today" => Some(Func::Today),
            "coalesce" => Some(Func::Coalesce),
            "lower" => Some(Func::Lower),
            "upper" => Some(Func::Upper),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Func::Now => "now",
            Func::Today => "today",
            Func::Coalesce => "coalesce",
            Func::Lower => "lower",
            Func::Upper => "upper",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// Dotted name as written, before resolution.
    Path(Vec<String>),
    /// `$name` action input.
    Input(String),
    Column {
        scope: Scope,
        column: String,
    },
    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
    },
    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
    },
    InList {
        expr: Box<Expr>,
        list: Vec<Expr>,
        negated: bool,
    },
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    Call {
        func: Func,
        args: Vec<Expr>,
    },
    /// Surrogate key of the `table` row whose external id is `id`.
    ///
    /// Produced by the compiler when a relation is assigned by external id.
    KeyOf {
        table: TableRef,
        id: Box<Expr>,
    },
}

impl Expr {
    pub fn parse(source: &str) -> Result<Expr, ExprError> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens,
            pos: 0,
            end: source.len(),
        };
        let expr = parser.or()?;
        match parser.peek() {
            None => Ok(expr),
            Some(tok) => Err(ExprError {
                offset: tok.offset,
                message: format!("unexpected {}", tok.kind.describe()),
            }),
        }
    }

    pub fn column(scope: Scope, column: impl Into<String>) -> Self {
        Expr::Column {
            scope,
            column: column.into(),
        }
    }

    pub fn text(value: impl Into<String>) -> Self {
        Expr::Literal(Literal::Text(value.into()))
    }

    pub fn now() -> Self {
        Expr::Call {
            func: Func::Now,
            args: Vec::new(),
        }
    }

    pub fn as_literal(&self) -> Option<&Literal> {
        match self {
            Expr::Literal(lit) => Some(lit),
            _ => None,
        }
    }

    /// Every node, parents before children.
    pub fn walk<'e>(&'e self, f: &mut impl FnMut(&'e Expr)) {
        f(self);
        match self {
            Expr::Literal(_) | Expr::Path(_) | Expr::Input(_) | Expr::Column { .. } => {}
            Expr::Unary { expr, .. } | Expr::IsNull { expr, .. } => expr.walk(f),
            Expr::KeyOf { id, .. } => id.walk(f),
            Expr::Binary { lhs, rhs, .. } => {
                lhs.walk(f);
                rhs.walk(f);
            }
            Expr::InList { expr, list, .. } => {
                expr.walk(f);
                list.iter().for_each(|e| e.walk(f));
            }
            Expr::Call { args, .. } => args.iter().for_each(|e| e.walk(f)),
        }
    }

    /// Unresolved dotted names, in source order.
    pub fn paths(&self) -> Vec<&[String]> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if let Expr::Path(segments) = e {
                out.push(segments.as_slice());
            }
        });
        out
    }

    pub fn is_resolved(&self) -> bool {
        self.paths().is_empty()
    }
}

#[derive(Debug, Clone, PartialEq)]
enum TokenKind {
    Ident(String),
    Input(String),
    Int(i64),
    Decimal(String),
    Str(String),
    Sym(&'static str),
}

impl TokenKind {
    fn describe(&self) -> String {
        match self {
            TokenKind::Ident(s) => format!("'{}'", s),
            TokenKind::Input(s) => format!("'${}'", s),
            TokenKind::Int(i) => i.to_string(),
            TokenKind::Decimal(d) => d.clone(),
            TokenKind::Str(s) => format!("string '{}'", s),
            TokenKind::Sym(s) => format!("'{}'", s),
        }
    }

    fn is_keyword(&self, keyword: &str) -> bool {
        matches!(self, TokenKind::Ident(s) if s.eq_ignore_ascii_case(keyword))
    }
}

#[derive(Debug, Clone, PartialEq)]
struct Token {
    kind: TokenKind,
    offset: usize,
}

const SYMBOLS: [&str; 14] = [
    "<=", ">=", "<>", "!=", "=", "<", ">", "+", "-", "*", "/", "(", ")", ",",
];

fn tokenize(source: &str) -> Result<Vec<Token>, ExprError> {
    let bytes = source.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;
    while i < bytes.len() {
        let c = bytes[i] as char;
        let start = i;
        if c.is_ascii_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' || c == '$' {
            i += 1;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            let word = &source[start..i];
            let kind = match word.strip_prefix('$') {
                Some("") => {
                    return Err(ExprError {
                        offset: start,
                        message: "expected input name after '$'".to_string(),
                    })
                }
                Some(name) => TokenKind::Input(name.to_string()),
                None => TokenKind::Ident(word.to_string()),
            };
            tokens.push(Token { kind, offset: start });
            continue;
        }
        if c == '.' {
            tokens.push(Token {
                kind: TokenKind::Sym("."),
                offset: start,
            });
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            while i < bytes.len() && bytes[i].is_ascii_digit() {
                i += 1;
            }
            let is_decimal = i + 1 < bytes.len() && bytes[i] == b'.' && bytes[i + 1].is_ascii_digit();
            if is_decimal {
                i += 1;
                while i < bytes.len() && bytes[i].is_ascii_digit() {
                    i += 1;
                }
                tokens.push(Token {
                    kind: TokenKind::Decimal(source[start..i].to_string()),
                    offset: start,
                });
            } else {
                let value = source[start..i].parse::<i64>().map_err(|_| ExprError {
                    offset: start,
                    message: "integer literal out of range".to_string(),
                })?;
                tokens.push(Token {
                    kind: TokenKind::Int(value),
                    offset: start,
                });
            }
            continue;
        }
        if c == '\'' {
            let mut text = String::new();
            i += 1;
            loop {
                match source[i..].chars().next() {
                    None => {
                        return Err(ExprError {
                            offset: start,
                            message: "unterminated string literal".to_string(),
                        })
                    }
                    Some('\'') if bytes.get(i + 1) == Some(&b'\'') => {
                        text.push('\'');
                        i += 2;
                    }
                    Some('\'') => {
                        i += 1;
                        break;
                    }
                    Some(ch) => {
                        text.push(ch);
                        i += ch.len_utf8();
                    }
                }
            }
            tokens.push(Token {
                kind: TokenKind::Str(text),
                offset: start,
            });
            continue;
        }
        match SYMBOLS.iter().find(|s| source[i..].starts_with(**s)) {
            Some(sym) => {
                tokens.push(Token {
                    kind: TokenKind::Sym(sym),
                    offset: start,
                });
                i += sym.len();
            }
            None => {
                let ch = source[i..].chars().next().unwrap_or(c);
                return Err(ExprError {
                    offset: start,
                    message: format!("unexpected character '{}'", ch),
                });
            }
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    end: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn offset(&self) -> usize {
        self.peek().map_or(self.end, |t| t.offset)
    }

    fn error(&self, message: impl Into<String>) -> ExprError {
        ExprError {
            offset: self.offset(),
            message: message.into(),
        }
    }

    fn eat_sym(&mut self, sym: &str) -> bool {
        if matches!(self.peek(), Some(Token { kind: TokenKind::Sym(s), .. }) if *s == sym) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek().is_some_and(|t| t.kind.is_keyword(keyword)) {
            self.pos += 1;
            true
        } else {
            false
        }
    }

    fn expect_sym(&mut self, sym: &str) -> Result<(), ExprError> {
        if self.eat_sym(sym) {
            Ok(())
        } else {
            Err(self.error(format!("expected '{}'", sym)))
        }
    }

    fn or(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.and()?;
        while self.eat_keyword("or") {
            let rhs = self.and()?;
            lhs = binary(BinaryOp::Or, lhs, rhs);
        }
        Ok(lhs)
    }

    fn and(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.not()?;
        while self.eat_keyword("and") {
            let rhs = self.not()?;
            lhs = binary(BinaryOp::And, lhs, rhs);
        }
        Ok(lhs)
    }

    fn not(&mut self) -> Result<Expr, ExprError> {
        if self.eat_keyword("not") {
            let expr = self.not()?;
            return Ok(Expr::Unary {
                op: UnaryOp::Not,
                expr: Box::new(expr),
            });
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Expr, ExprError> {
        let lhs = self.additive()?;

        if self.eat_keyword("is") {
            let negated = self.eat_keyword("not");
            if !self.eat_keyword("null") {
                return Err(self.error("expected 'null'"));
            }
            return Ok(Expr::IsNull {
                expr: Box::new(lhs),
                negated,
            });
        }

        let negated = self.eat_keyword("not");
        if self.eat_keyword("in") {
            self.expect_sym("(")?;
            let mut list = vec![self.or()?];
            while self.eat_sym(",") {
                list.push(self.or()?);
            }
            self.expect_sym(")")?;
            return Ok(Expr::InList {
                expr: Box::new(lhs),
                list,
                negated,
            });
        }
        if negated {
            return Err(self.error("expected 'in' after 'not'"));
        }

        let op = match self.peek() {
            Some(Token {
                kind: TokenKind::Sym(s),
                ..
            }) => match *s {
                "=" => Some(BinaryOp::Eq),
                "<>" | "!=" => Some(BinaryOp::Ne),
                "<" => Some(BinaryOp::Lt),
                "<=" => Some(BinaryOp::Le),
                ">" => Some(BinaryOp::Gt),
                ">=" => Some(BinaryOp::Ge),
                _ => None,
            },
            _ => None,
        };
        match op {
            Some(op) => {
                self.pos += 1;
                let rhs = self.additive()?;
                Ok(binary(op, lhs, rhs))
            }
            None => Ok(lhs),
        }
    }

    fn additive(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.multiplicative()?;
        loop {
            let op = if self.eat_sym("+") {
                BinaryOp::Add
            } else if self.eat_sym("-") {
                BinaryOp::Sub
            } else {
                return Ok(lhs);
            };
            let rhs = self.multiplicative()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn multiplicative(&mut self) -> Result<Expr, ExprError> {
        let mut lhs = self.unary()?;
        loop {
            let op = if self.eat_sym("*") {
                BinaryOp::Mul
            } else if self.eat_sym("/") {
                BinaryOp::Div
            } else {
                return Ok(lhs);
            };
            let rhs = self.unary()?;
            lhs = binary(op, lhs, rhs);
        }
    }

    fn unary(&mut self) -> Result<Expr, ExprError> {
        if self.eat_sym("-") {
            let expr = self.unary()?;
            return Ok(match expr {
                Expr::Literal(Literal::Int(i)) => Expr::Literal(Literal::Int(-i)),
                Expr::Literal(Literal::Decimal(d)) => Expr::Literal(Literal::Decimal(format!("-{}", d))),
                other => Expr::Unary {
                    op: UnaryOp::Neg,
                    expr: Box::new(other),
                },
            });
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Expr, ExprError> {
        let Some(token) = self.peek().cloned() else {
            return Err(self.error("unexpected end of expression"));
        };
        self.pos += 1;
        match token.kind {
            TokenKind::Int(i) => Ok(Expr::Literal(Literal::Int(i))),
            TokenKind::Decimal(d) => Ok(Expr::Literal(Literal::Decimal(d))),
            TokenKind::Str(s) => Ok(Expr::Literal(Literal::Text(s))),
            TokenKind::Input(name) => Ok(Expr::Input(name)),
            TokenKind::Sym("(") => {
                let expr = self.or()?;
                self.expect_sym(")")?;
                Ok(expr)
            }
            TokenKind::Ident(word) => {
                match word.to_ascii_lowercase().as_str() {
                    "null" => return Ok(Expr::Literal(Literal::Null)),
                    "true" => return Ok(Expr::Literal(Literal::Bool(true))),
                    "false" => return Ok(Expr::Literal(Literal::Bool(false))),
                    "and" | "or" | "not" | "in" | "is" => {
                        return Err(ExprError {
                            offset: token.offset,
                            message: format!("unexpected keyword '{}'", word),
                        })
                    }
                    _ => {}
                }
                if self.eat_sym("(") {
                    let func = Func::from_name(&word).ok_or_else(|| ExprError {
                        offset: token.offset,
                        message: format!("unknown function '{}'", word),
                    })?;
                    let mut args = Vec::new();
                    if !self.eat_sym(")") {
                        args.push(self.or()?);
                        while self.eat_sym(",") {
                            args.push(self.or()?);
                        }
                        self.expect_sym(")")?;
                    }
                    return Ok(Expr::Call { func, args });
                }
                let mut segments = vec![word];
                while self.eat_sym(".") {
                    match self.peek().cloned() {
                        Some(Token {
                            kind: TokenKind::Ident(next),
                            ..
                        }) => {
                            self.pos += 1;
                            segments.push(next);
                        }
                        _ => return Err(self.error("expected a name after '.'")),
                    }
                }
                Ok(Expr::Path(segments))
            }
            other => Err(ExprError {
                offset: token.offset,
                message: format!("unexpected {}", other.describe()),
            }),
        }
    }
}

fn binary(op: BinaryOp, lhs: Expr, rhs: Expr) -> Expr {
    Expr::Binary {
        op,
        lhs: Box::new(lhs),
        rhs: Box::new(rhs),
    }
}
