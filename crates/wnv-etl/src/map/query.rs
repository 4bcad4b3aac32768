//! The where-clause subset accepted as a layer definition query.
//!
//! ```text
//! expr      := and ( OR and )*
//! and       := unary ( AND unary )*
//! unary     := NOT unary | '(' expr ')' | predicate
//! predicate := field ( cmp literal | IS [NOT] NULL | [NOT] IN '(' literal ( ',' literal )* ')' )
//! cmp       := = | <> | != | < | <= | > | >=
//! ```
//!
//! Evaluation uses SQL three-valued logic: comparisons against a missing or null attribute
//! are unknown, and a feature is shown only when the whole expression is true.

use std::cmp::Ordering;
use std::fmt;

use serde_json::Value;

use crate::gdb::Feature;

/// Limits that keep parsing and evaluation recursion bounded.
const MAX_NESTING: usize = 64;
const MAX_TOKENS: usize = 1024;

#[derive(Debug, Clone, PartialEq)]
pub struct DefinitionQuery {
    text: String,
    expr: Expr,
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Or(Box<Expr>, Box<Expr>),
    And(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    Compare {
        field: String,
        op: CompareOp,
        value: Literal,
    },
    IsNull {
        field: String,
        negated: bool,
    },
    In {
        field: String,
        values: Vec<Literal>,
        negated: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CompareOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Text(String),
    Number(f64),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Ident(String),
    Text(String),
    Number(f64),
    Op(CompareOp),
    LParen,
    RParen,
    Comma,
}

impl DefinitionQuery {
    pub fn parse(text: &str) -> Result<Self, String> {
        let tokens = tokenize(text)?;
        if tokens.is_empty() {
            return Err("query is empty".to_string());
        }
        if tokens.len() > MAX_TOKENS {
            return Err(format!("query is longer than {MAX_TOKENS} tokens"));
        }
        let mut parser = Parser {
            tokens,
            pos: 0,
            depth: 0,
        };
        let expr = parser.expr()?;
        if let Some(token) = parser.peek() {
            return Err(format!("unexpected {} after end of expression", describe(token)));
        }
        Ok(Self {
            text: text.trim().to_string(),
            expr,
        })
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Field names referenced by the query, in order of appearance.
    pub fn fields(&self) -> Vec<&str> {
        let mut fields = Vec::new();
        collect_fields(&self.expr, &mut fields);
        fields
    }

    pub fn matches(&self, feature: &Feature) -> bool {
        eval(&self.expr, feature) == Some(true)
    }
}

impl fmt::Display for DefinitionQuery {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.text)
    }
}

fn collect_fields<'a>(expr: &'a Expr, fields: &mut Vec<&'a str>) {
    match expr {
        Expr::Or(left, right) | Expr::And(left, right) => {
            collect_fields(left, fields);
            collect_fields(right, fields);
        }
        Expr::Not(inner) => collect_fields(inner, fields),
        Expr::Compare { field, .. } | Expr::IsNull { field, .. } | Expr::In { field, .. } => {
            if !fields.iter().any(|seen| seen.eq_ignore_ascii_case(field)) {
                fields.push(field);
            }
        }
    }
}

fn eval(expr: &Expr, feature: &Feature) -> Option<bool> {
    match expr {
        Expr::Or(left, right) => match (eval(left, feature), eval(right, feature)) {
            (Some(true), _) | (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        Expr::And(left, right) => match (eval(left, feature), eval(right, feature)) {
            (Some(false), _) | (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Expr::Not(inner) => eval(inner, feature).map(|value| !value),
        Expr::IsNull { field, negated } => {
            let is_null = matches!(feature.attribute(field), None | Some(Value::Null));
            Some(is_null != *negated)
        }
        Expr::Compare { field, op, value } => {
            let ordering = compare(feature.attribute(field)?, value)?;
            Some(match op {
                CompareOp::Eq => ordering == Ordering::Equal,
                CompareOp::Ne => ordering != Ordering::Equal,
                CompareOp::Lt => ordering == Ordering::Less,
                CompareOp::Le => ordering != Ordering::Greater,
                CompareOp::Gt => ordering == Ordering::Greater,
                CompareOp::Ge => ordering != Ordering::Less,
            })
        }
        Expr::In {
            field,
            values,
            negated,
        } => {
            let attribute = feature.attribute(field)?;
            let mut unknown = false;
            for value in values {
                match compare(attribute, value) {
                    Some(Ordering::Equal) => return Some(!*negated),
                    Some(_) => {}
                    None => unknown = true,
                }
            }
            if unknown {
                None
            } else {
                Some(*negated)
            }
        }
    }
}

/// Orders an attribute against a literal; `None` when either side is null or incomparable.
fn compare(attribute: &Value, literal: &Literal) -> Option<Ordering> {
    match (attribute, literal) {
        (Value::Null, _) => None,
        (Value::Number(number), Literal::Number(expected)) => number.as_f64()?.partial_cmp(expected),
        (Value::String(text), Literal::Number(expected)) => {
            text.trim().parse::<f64>().ok()?.partial_cmp(expected)
        }
        (Value::String(text), Literal::Text(expected)) => Some(text.as_str().cmp(expected)),
        (Value::Bool(flag), Literal::Number(expected)) => {
            f64::from(u8::from(*flag)).partial_cmp(expected)
        }
        (other, Literal::Text(expected)) => Some(other.to_string().as_str().cmp(expected)),
        _ => None,
    }
}

fn describe(token: &Token) -> String {
    match token {
        Token::Ident(name) => format!("'{name}'"),
        Token::Text(text) => format!("string '{text}'"),
        Token::Number(number) => format!("number {number}"),
        Token::Op(_) => "operator".to_string(),
        Token::LParen => "'('".to_string(),
        Token::RParen => "')'".to_string(),
        Token::Comma => "','".to_string(),
    }
}

fn tokenize(text: &str) -> Result<Vec<Token>, String> {
    let chars: Vec<char> = text.chars().collect();
    let mut tokens = Vec::new();
    let mut pos = 0;

    while pos < chars.len() {
        let c = chars[pos];
        match c {
            c if c.is_whitespace() => pos += 1,
            '(' => {
                tokens.push(Token::LParen);
                pos += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                pos += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                pos += 1;
            }
            '=' => {
                tokens.push(Token::Op(CompareOp::Eq));
                pos += 1;
            }
            '!' if chars.get(pos + 1) == Some(&'=') => {
                tokens.push(Token::Op(CompareOp::Ne));
                pos += 2;
            }
            '<' => {
                let (op, width) = match chars.get(pos + 1) {
                    Some('>') => (CompareOp::Ne, 2),
                    Some('=') => (CompareOp::Le, 2),
                    _ => (CompareOp::Lt, 1),
                };
                tokens.push(Token::Op(op));
                pos += width;
            }
            '>' => {
                let (op, width) = match chars.get(pos + 1) {
                    Some('=') => (CompareOp::Ge, 2),
                    _ => (CompareOp::Gt, 1),
                };
                tokens.push(Token::Op(op));
                pos += width;
            }
            '\'' => {
                let mut value = String::new();
                pos += 1;
                loop {
                    match chars.get(pos) {
                        None => return Err("unterminated string literal".to_string()),
                        // '' is an escaped quote
                        Some('\'') if chars.get(pos + 1) == Some(&'\'') => {
                            value.push('\'');
                            pos += 2;
                        }
                        Some('\'') => {
                            pos += 1;
                            break;
                        }
                        Some(other) => {
                            value.push(*other);
                            pos += 1;
                        }
                    }
                }
                tokens.push(Token::Text(value));
            }
            '"' => {
                let end = chars[pos + 1..]
                    .iter()
                    .position(|c| *c == '"')
                    .ok_or_else(|| "unterminated quoted field name".to_string())?;
                let name: String = chars[pos + 1..pos + 1 + end].iter().collect();
                tokens.push(Token::Ident(name));
                pos += end + 2;
            }
            c if c.is_ascii_digit() || c == '.' || c == '-' || c == '+' => {
                let start = pos;
                pos += 1;
                while pos < chars.len()
                    && (chars[pos].is_ascii_digit()
                        || chars[pos] == '.'
                        || chars[pos] == 'e'
                        || chars[pos] == 'E'
                        || (matches!(chars[pos], '-' | '+')
                            && matches!(chars[pos - 1], 'e' | 'E')))
                {
                    pos += 1;
                }
                let literal: String = chars[start..pos].iter().collect();
                let number = literal
                    .parse::<f64>()
                    .map_err(|_| format!("invalid number '{literal}'"))?;
                tokens.push(Token::Number(number));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = pos;
                while pos < chars.len() && (chars[pos].is_alphanumeric() || chars[pos] == '_') {
                    pos += 1;
                }
                tokens.push(Token::Ident(chars[start..pos].iter().collect()));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
    depth: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        self.pos += 1;
        token
    }

    fn peek_keyword(&self, keyword: &str) -> bool {
        matches!(self.peek(), Some(Token::Ident(word)) if word.eq_ignore_ascii_case(keyword))
    }

    fn eat_keyword(&mut self, keyword: &str) -> bool {
        let found = self.peek_keyword(keyword);
        if found {
            self.pos += 1;
        }
        found
    }

    fn expect(&mut self, expected: Token, label: &str) -> Result<(), String> {
        match self.next() {
            Some(token) if token == expected => Ok(()),
            Some(token) => Err(format!("expected {label}, found {}", describe(&token))),
            None => Err(format!("expected {label}, found end of query")),
        }
    }

    fn expr(&mut self) -> Result<Expr, String> {
        let mut left = self.and()?;
        while self.eat_keyword("OR") {
            let right = self.and()?;
            left = Expr::Or(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Expr, String> {
        let mut left = self.unary()?;
        while self.eat_keyword("AND") {
            let right = self.unary()?;
            left = Expr::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Expr, String> {
        if self.depth >= MAX_NESTING {
            return Err(format!("NOT and parentheses nest deeper than {MAX_NESTING} levels"));
        }
        if self.eat_keyword("NOT") {
            self.depth += 1;
            let inner = self.unary();
            self.depth -= 1;
            return Ok(Expr::Not(Box::new(inner?)));
        }
        if self.peek() == Some(&Token::LParen) {
            self.pos += 1;
            self.depth += 1;
            let inner = self.expr();
            self.depth -= 1;
            let inner = inner?;
            self.expect(Token::RParen, "')'")?;
            return Ok(inner);
        }
        self.predicate()
    }

    fn predicate(&mut self) -> Result<Expr, String> {
        let field = match self.next() {
            Some(Token::Ident(name)) if !is_reserved(&name) => name,
            Some(token) => return Err(format!("expected a field name, found {}", describe(&token))),
            None => return Err("expected a field name, found end of query".to_string()),
        };

        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            if !self.eat_keyword("NULL") {
                return Err(format!("expected NULL after IS on field '{field}'"));
            }
            return Ok(Expr::IsNull { field, negated });
        }

        let negated = self.eat_keyword("NOT");
        if self.eat_keyword("IN") {
            self.expect(Token::LParen, "'(' after IN")?;
            let mut values = vec![self.literal()?];
            while self.peek() == Some(&Token::Comma) {
                self.pos += 1;
                values.push(self.literal()?);
            }
            self.expect(Token::RParen, "')' closing IN list")?;
            return Ok(Expr::In {
                field,
                values,
                negated,
            });
        }
        if negated {
            return Err(format!("expected IN after NOT on field '{field}'"));
        }

        let op = match self.next() {
            Some(Token::Op(op)) => op,
            Some(token) => {
                return Err(format!(
                    "expected a comparison after '{field}', found {}",
                    describe(&token)
                ))
            }
            None => return Err(format!("expected a comparison after '{field}'")),
        };
        let value = self.literal()?;
        Ok(Expr::Compare { field, op, value })
    }

    fn literal(&mut self) -> Result<Literal, String> {
        match self.next() {
            Some(Token::Text(text)) => Ok(Literal::Text(text)),
            Some(Token::Number(number)) => Ok(Literal::Number(number)),
            Some(token) => Err(format!("expected a literal, found {}", describe(&token))),
            None => Err("expected a literal, found end of query".to_string()),
        }
    }
}

fn is_reserved(word: &str) -> bool {
    ["AND", "OR", "NOT", "IS", "NULL", "IN"]
        .iter()
        .any(|reserved| word.eq_ignore_ascii_case(reserved))
}
