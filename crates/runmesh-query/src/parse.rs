//! Recursive-descent parser for the SQL-like predicate and select language.
//!
//! ```text
//! select    := SELECT cols FROM ident [WHERE expr] [ORDER BY order (, order)*] [LIMIT n]
//! cols      := '*' | ident (, ident)*
//! order     := ident [ASC | DESC]
//! expr      := and (OR and)*
//! and       := unary (AND unary)*
//! unary     := NOT unary | '(' expr ')' | ident IS [NOT] NULL | ident op literal
//! literal   := number | 'string' | TRUE | FALSE | NULL
//! ```
//!
//! Identifiers may contain dots (`Metrics.score`) or be double-quoted.

use runmesh_core::types::Scalar;

use crate::error::{QueryError, Result};
use crate::ops::OrderBy;
use crate::predicate::{CmpOp, Predicate};
use crate::select::Select;

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Quoted(String),
    Str(String),
    Int(i64),
    Float(f64),
    Op(CmpOp),
    LParen,
    RParen,
    Comma,
    Star,
}

#[derive(Debug, Clone)]
struct Token {
    tok: Tok,
    pos: usize,
}

fn err<T>(pos: usize, msg: impl Into<String>) -> Result<T> {
    Err(QueryError::Parse {
        pos,
        msg: msg.into(),
    })
}

fn tokenize(input: &str) -> Result<Vec<Token>> {
    let chars: Vec<char> = input.chars().collect();
    let mut out = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        let tok = match c {
            '(' => {
                i += 1;
                Tok::LParen
            }
            ')' => {
                i += 1;
                Tok::RParen
            }
            ',' => {
                i += 1;
                Tok::Comma
            }
            '*' => {
                i += 1;
                Tok::Star
            }
            '=' => {
                i += if chars.get(i + 1) == Some(&'=') { 2 } else { 1 };
                Tok::Op(CmpOp::Eq)
            }
            '!' => {
                if chars.get(i + 1) != Some(&'=') {
                    return err(i, "expected '!='");
                }
                i += 2;
                Tok::Op(CmpOp::Ne)
            }
            '<' => match chars.get(i + 1) {
                Some('=') => {
                    i += 2;
                    Tok::Op(CmpOp::Le)
                }
                Some('>') => {
                    i += 2;
                    Tok::Op(CmpOp::Ne)
                }
                _ => {
                    i += 1;
                    Tok::Op(CmpOp::Lt)
                }
            },
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    i += 2;
                    Tok::Op(CmpOp::Ge)
                } else {
                    i += 1;
                    Tok::Op(CmpOp::Gt)
                }
            }
            '\'' | '"' => {
                // '' (or "") inside the literal is an escaped quote
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        None => return err(start, "unterminated quoted text"),
                        Some(&ch) if ch == quote => {
                            if chars.get(i + 1) == Some(&quote) {
                                s.push(quote);
                                i += 2;
                            } else {
                                i += 1;
                                break;
                            }
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                    }
                }
                if quote == '\'' {
                    Tok::Str(s)
                } else {
                    Tok::Quoted(s)
                }
            }
            c if c.is_ascii_digit() || (c == '-' && chars.get(i + 1).map_or(false, |d| d.is_ascii_digit())) => {
                i += 1;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.' || chars[i] == 'e' || chars[i] == 'E') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                if let Ok(v) = text.parse::<i64>() {
                    Tok::Int(v)
                } else if let Ok(v) = text.parse::<f64>() {
                    Tok::Float(v)
                } else {
                    return err(start, format!("bad number '{}'", text));
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_' || chars[i] == '.') {
                    i += 1;
                }
                Tok::Ident(chars[start..i].iter().collect())
            }
            other => return err(i, format!("unexpected character '{}'", other)),
        };
        out.push(Token { tok, pos: start });
    }
    Ok(out)
}

struct Parser {
    toks: Vec<Token>,
    idx: usize,
    end: usize,
}

impl Parser {
    fn new(input: &str) -> Result<Self> {
        Ok(Self {
            toks: tokenize(input)?,
            idx: 0,
            end: input.len(),
        })
    }

    fn peek(&self) -> Option<&Tok> {
        self.toks.get(self.idx).map(|t| &t.tok)
    }

    fn pos(&self) -> usize {
        self.toks.get(self.idx).map(|t| t.pos).unwrap_or(self.end)
    }

    fn next(&mut self) -> Option<Tok> {
        let t = self.toks.get(self.idx).map(|t| t.tok.clone());
        if t.is_some() {
            self.idx += 1;
        }
        t
    }

    fn at_keyword(&self, kw: &str) -> bool {
        matches!(self.peek(), Some(Tok::Ident(s)) if s.eq_ignore_ascii_case(kw))
    }

    fn eat_keyword(&mut self, kw: &str) -> bool {
        if self.at_keyword(kw) {
            self.idx += 1;
            true
        } else {
            false
        }
    }

    fn expect_keyword(&mut self, kw: &str) -> Result<()> {
        if self.eat_keyword(kw) {
            Ok(())
        } else {
            err(self.pos(), format!("expected {}", kw))
        }
    }

    fn ident(&mut self) -> Result<String> {
        let pos = self.pos();
        match self.next() {
            Some(Tok::Ident(s)) if !is_reserved(&s) => Ok(s),
            Some(Tok::Quoted(s)) => Ok(s),
            _ => err(pos, "expected column name"),
        }
    }

    fn finish(&self) -> Result<()> {
        if self.idx < self.toks.len() {
            return err(self.pos(), "unexpected trailing input");
        }
        Ok(())
    }

    fn expr(&mut self) -> Result<Predicate> {
        let mut left = self.and()?;
        while self.eat_keyword("OR") {
            let right = self.and()?;
            left = left.or(right);
        }
        Ok(left)
    }

    fn and(&mut self) -> Result<Predicate> {
        let mut left = self.unary()?;
        while self.eat_keyword("AND") {
            let right = self.unary()?;
            left = Predicate::And(Box::new(left), Box::new(right));
        }
        Ok(left)
    }

    fn unary(&mut self) -> Result<Predicate> {
        if self.eat_keyword("NOT") {
            return Ok(self.unary()?.negate());
        }
        if self.peek() == Some(&Tok::LParen) {
            self.idx += 1;
            let inner = self.expr()?;
            if self.next() != Some(Tok::RParen) {
                return err(self.pos(), "expected ')'");
            }
            return Ok(inner);
        }

        let column = self.ident()?;
        if self.eat_keyword("IS") {
            let negated = self.eat_keyword("NOT");
            self.expect_keyword("NULL")?;
            return Ok(Predicate::IsNull { column, negated });
        }

        let pos = self.pos();
        let op = match self.next() {
            Some(Tok::Op(op)) => op,
            _ => return err(pos, "expected comparison operator"),
        };
        let value = self.literal()?;
        Ok(Predicate::Cmp { column, op, value })
    }

    fn literal(&mut self) -> Result<Scalar> {
        let pos = self.pos();
        match self.next() {
            Some(Tok::Int(v)) => Ok(Scalar::I64(v)),
            Some(Tok::Float(v)) => Ok(Scalar::F64(v)),
            Some(Tok::Str(s)) => Ok(Scalar::Str(s)),
            Some(Tok::Ident(s)) if s.eq_ignore_ascii_case("TRUE") => Ok(Scalar::Bool(true)),
            Some(Tok::Ident(s)) if s.eq_ignore_ascii_case("FALSE") => Ok(Scalar::Bool(false)),
            Some(Tok::Ident(s)) if s.eq_ignore_ascii_case("NULL") => Ok(Scalar::Null),
            _ => err(pos, "expected literal"),
        }
    }

    fn select(&mut self) -> Result<Select> {
        self.expect_keyword("SELECT")?;

        let mut columns = Vec::new();
        if self.peek() == Some(&Tok::Star) {
            self.idx += 1;
        } else {
            columns.push(self.ident()?);
            while self.peek() == Some(&Tok::Comma) {
                self.idx += 1;
                columns.push(self.ident()?);
            }
        }

        self.expect_keyword("FROM")?;
        let from = self.ident()?;

        let filter = if self.eat_keyword("WHERE") {
            self.expr()?
        } else {
            Predicate::True
        };

        let mut order_by = Vec::new();
        if self.eat_keyword("ORDER") {
            self.expect_keyword("BY")?;
            loop {
                let column = self.ident()?;
                let descending = if self.eat_keyword("DESC") {
                    true
                } else {
                    self.eat_keyword("ASC");
                    false
                };
                order_by.push(OrderBy { column, descending });
                if self.peek() == Some(&Tok::Comma) {
                    self.idx += 1;
                } else {
                    break;
                }
            }
        }

        let limit = if self.eat_keyword("LIMIT") {
            let pos = self.pos();
            match self.next() {
                Some(Tok::Int(n)) if n >= 0 => Some(n as usize),
                _ => return err(pos, "LIMIT expects a non-negative integer"),
            }
        } else {
            None
        };

        Ok(Select {
            columns,
            from,
            filter,
            order_by,
            limit,
        })
    }
}

const RESERVED: [&str; 14] = [
    "AND", "OR", "NOT", "IS", "NULL", "TRUE", "FALSE", "SELECT", "FROM", "WHERE", "ORDER", "BY",
    "LIMIT", "DESC",
];

fn is_reserved(s: &str) -> bool {
    RESERVED.iter().any(|k| k.eq_ignore_ascii_case(s))
}

/// Parse a boolean predicate such as `score >= 0.5 AND NOT (name = 'x')`.
pub fn parse_predicate(input: &str) -> Result<Predicate> {
    let mut p = Parser::new(input)?;
    if p.peek().is_none() {
        return err(0, "empty predicate");
    }
    let pred = p.expr()?;
    p.finish()?;
    Ok(pred)
}

/// Parse `SELECT cols FROM kind [WHERE ..] [ORDER BY ..] [LIMIT n]`.
pub fn parse_select(input: &str) -> Result<Select> {
    let mut p = Parser::new(input)?;
    let sel = p.select()?;
    p.finish()?;
    Ok(sel)
}
