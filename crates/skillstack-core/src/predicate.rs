//! Restricted predicate expression language.
//!
//! Rule bodies are stored as strings. Historically those strings were
//! executable lambdas; here they are compiled into a small expression AST
//! and interpreted, so loading a rule file never executes code.
//!
//! Grammar (lowest precedence first):
//!
//! ```text
//! expr   := and_e (("|" | "or") and_e)*
//! and_e  := unary (("&" | "and") unary)*
//! unary  := "not" unary | "(" expr ")" | cmp
//! cmp    := field (("==" | "!=" | "<" | "<=" | ">" | ">=") literal
//!                 | "in" "[" literals "]")
//! field  := IDENT | "vars" "." "get" "(" STRING ")"
//! ```
//!
//! The `vars.get('...')` field form is accepted so rule files written
//! against the original system keep compiling. Evaluation is total: a
//! missing field or a type mismatch makes the enclosing comparison false,
//! never an error.

use std::collections::BTreeMap;

use thiserror::Error;

use crate::model::FieldValue;

/// Compilation failure for a serialized predicate expression.
#[derive(Debug, Clone, Error)]
pub enum CompileError {
    #[error("empty predicate expression")]
    Empty,
    #[error("unexpected character '{ch}' at position {pos}")]
    UnexpectedChar { ch: char, pos: usize },
    #[error("unterminated string literal starting at position {pos}")]
    UnterminatedString { pos: usize },
    #[error("unexpected token '{token}' at position {pos}")]
    UnexpectedToken { token: String, pos: usize },
    #[error("unexpected end of expression")]
    UnexpectedEnd,
}

/// A compiled, safely evaluatable predicate over a record's fields.
#[derive(Debug, Clone, PartialEq)]
pub struct Predicate {
    root: Expr,
}

impl Predicate {
    /// Evaluate against a record's field mapping. Never fails: a
    /// comparison over a missing field or incompatible types is simply
    /// not satisfied.
    pub fn evaluate(&self, fields: &BTreeMap<String, FieldValue>) -> bool {
        eval(&self.root, fields)
    }
}

/// Compile a serialized expression into a [`Predicate`].
///
/// A leading `lambda <ident>:` is stripped first: legacy rule files store
/// their bodies in that form, and only the body is parsed. Error
/// positions are relative to the body.
pub fn compile(expr: &str) -> Result<Predicate, CompileError> {
    let tokens = tokenize(strip_lambda_prefix(expr))?;
    if tokens.is_empty() {
        return Err(CompileError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let root = parser.expr()?;
    if let Some((tok, at)) = parser.peek() {
        return Err(CompileError::UnexpectedToken {
            token: tok.describe(),
            pos: at,
        });
    }
    Ok(Predicate { root })
}

/// Strip a legacy `lambda <ident>:` prefix, returning the body.
fn strip_lambda_prefix(expr: &str) -> &str {
    let trimmed = expr.trim_start();
    if let Some(rest) = trimmed.strip_prefix("lambda") {
        if rest.starts_with(char::is_whitespace) {
            if let Some((params, body)) = rest.split_once(':') {
                let params = params.trim();
                if params.chars().all(|c| c.is_alphanumeric() || c == '_') {
                    return body;
                }
            }
        }
    }
    expr
}

#[derive(Debug, Clone, PartialEq)]
enum Expr {
    Cmp {
        field: String,
        op: CmpOp,
        value: Literal,
    },
    In {
        field: String,
        set: Vec<Literal>,
    },
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CmpOp {
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
}

#[derive(Debug, Clone, PartialEq)]
enum Literal {
    Number(f64),
    Str(String),
}

// ---------------------------------------------------------------------------
// Tokenizer
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
enum Tok {
    Ident(String),
    Number(f64),
    Str(String),
    Op(CmpOp),
    And,
    Or,
    Not,
    In,
    LParen,
    RParen,
    LBracket,
    RBracket,
    Comma,
    Dot,
}

impl Tok {
    fn describe(&self) -> String {
        match self {
            Tok::Ident(s) => s.clone(),
            Tok::Number(n) => n.to_string(),
            Tok::Str(s) => format!("'{s}'"),
            Tok::Op(CmpOp::Eq) => "==".into(),
            Tok::Op(CmpOp::Ne) => "!=".into(),
            Tok::Op(CmpOp::Lt) => "<".into(),
            Tok::Op(CmpOp::Le) => "<=".into(),
            Tok::Op(CmpOp::Gt) => ">".into(),
            Tok::Op(CmpOp::Ge) => ">=".into(),
            Tok::And => "&".into(),
            Tok::Or => "|".into(),
            Tok::Not => "not".into(),
            Tok::In => "in".into(),
            Tok::LParen => "(".into(),
            Tok::RParen => ")".into(),
            Tok::LBracket => "[".into(),
            Tok::RBracket => "]".into(),
            Tok::Comma => ",".into(),
            Tok::Dot => ".".into(),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Tok, usize)>, CompileError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let at = i;
        match c {
            c if c.is_whitespace() => i += 1,
            '(' => {
                tokens.push((Tok::LParen, at));
                i += 1;
            }
            ')' => {
                tokens.push((Tok::RParen, at));
                i += 1;
            }
            '[' => {
                tokens.push((Tok::LBracket, at));
                i += 1;
            }
            ']' => {
                tokens.push((Tok::RBracket, at));
                i += 1;
            }
            ',' => {
                tokens.push((Tok::Comma, at));
                i += 1;
            }
            '.' => {
                tokens.push((Tok::Dot, at));
                i += 1;
            }
            '&' => {
                tokens.push((Tok::And, at));
                i += 1;
            }
            '|' => {
                tokens.push((Tok::Or, at));
                i += 1;
            }
            '=' if chars.get(i + 1) == Some(&'=') => {
                tokens.push((Tok::Op(CmpOp::Eq), at));
                i += 2;
            }
            '!' if chars.get(i + 1) == Some(&'=') => {
                tokens.push((Tok::Op(CmpOp::Ne), at));
                i += 2;
            }
            '<' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push((Tok::Op(CmpOp::Le), at));
                    i += 2;
                } else {
                    tokens.push((Tok::Op(CmpOp::Lt), at));
                    i += 1;
                }
            }
            '>' => {
                if chars.get(i + 1) == Some(&'=') {
                    tokens.push((Tok::Op(CmpOp::Ge), at));
                    i += 2;
                } else {
                    tokens.push((Tok::Op(CmpOp::Gt), at));
                    i += 1;
                }
            }
            '\'' | '"' => {
                let quote = c;
                let mut s = String::new();
                i += 1;
                loop {
                    match chars.get(i) {
                        Some(&ch) if ch == quote => {
                            i += 1;
                            break;
                        }
                        Some(&ch) => {
                            s.push(ch);
                            i += 1;
                        }
                        None => return Err(CompileError::UnterminatedString { pos: at }),
                    }
                }
                tokens.push((Tok::Str(s), at));
            }
            c if c.is_ascii_digit() || c == '-' => {
                let mut s = String::new();
                s.push(c);
                i += 1;
                while let Some(&ch) = chars.get(i) {
                    if ch.is_ascii_digit() || ch == '.' {
                        s.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                let n: f64 = s
                    .parse()
                    .map_err(|_| CompileError::UnexpectedChar { ch: c, pos: at })?;
                tokens.push((Tok::Number(n), at));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut s = String::new();
                while let Some(&ch) = chars.get(i) {
                    if ch.is_alphanumeric() || ch == '_' {
                        s.push(ch);
                        i += 1;
                    } else {
                        break;
                    }
                }
                let tok = match s.as_str() {
                    "and" => Tok::And,
                    "or" => Tok::Or,
                    "not" => Tok::Not,
                    "in" => Tok::In,
                    _ => Tok::Ident(s),
                };
                tokens.push((tok, at));
            }
            other => return Err(CompileError::UnexpectedChar { ch: other, pos: at }),
        }
    }

    Ok(tokens)
}

// ---------------------------------------------------------------------------
// Parser
// ---------------------------------------------------------------------------

struct Parser {
    tokens: Vec<(Tok, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(&Tok, usize)> {
        self.tokens.get(self.pos).map(|(t, at)| (t, *at))
    }

    fn next(&mut self) -> Result<(Tok, usize), CompileError> {
        let item = self
            .tokens
            .get(self.pos)
            .cloned()
            .ok_or(CompileError::UnexpectedEnd)?;
        self.pos += 1;
        Ok(item)
    }

    fn expect(&mut self, want: &Tok) -> Result<(), CompileError> {
        let (tok, at) = self.next()?;
        if &tok == want {
            Ok(())
        } else {
            Err(CompileError::UnexpectedToken {
                token: tok.describe(),
                pos: at,
            })
        }
    }

    fn expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.and_expr()?;
        while matches!(self.peek(), Some((Tok::Or, _))) {
            self.pos += 1;
            let rhs = self.and_expr()?;
            lhs = Expr::Or(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn and_expr(&mut self) -> Result<Expr, CompileError> {
        let mut lhs = self.unary()?;
        while matches!(self.peek(), Some((Tok::And, _))) {
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Expr::And(Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Expr, CompileError> {
        match self.peek() {
            Some((Tok::Not, _)) => {
                self.pos += 1;
                Ok(Expr::Not(Box::new(self.unary()?)))
            }
            Some((Tok::LParen, _)) => {
                self.pos += 1;
                let inner = self.expr()?;
                self.expect(&Tok::RParen)?;
                Ok(inner)
            }
            _ => self.comparison(),
        }
    }

    fn comparison(&mut self) -> Result<Expr, CompileError> {
        let field = self.field_ref()?;
        let (tok, at) = self.next()?;
        match tok {
            Tok::Op(op) => {
                let value = self.literal()?;
                Ok(Expr::Cmp { field, op, value })
            }
            Tok::In => {
                let set = self.literal_list()?;
                Ok(Expr::In { field, set })
            }
            other => Err(CompileError::UnexpectedToken {
                token: other.describe(),
                pos: at,
            }),
        }
    }

    /// A field reference: a bare identifier or the legacy
    /// `vars.get('field')` form.
    fn field_ref(&mut self) -> Result<String, CompileError> {
        let (tok, at) = self.next()?;
        let name = match tok {
            Tok::Ident(name) => name,
            other => {
                return Err(CompileError::UnexpectedToken {
                    token: other.describe(),
                    pos: at,
                })
            }
        };

        if name == "vars" && matches!(self.peek(), Some((Tok::Dot, _))) {
            self.pos += 1;
            let (method, mat) = self.next()?;
            if method != Tok::Ident("get".to_string()) {
                return Err(CompileError::UnexpectedToken {
                    token: method.describe(),
                    pos: mat,
                });
            }
            self.expect(&Tok::LParen)?;
            let (arg, aat) = self.next()?;
            let field = match arg {
                Tok::Str(s) => s,
                other => {
                    return Err(CompileError::UnexpectedToken {
                        token: other.describe(),
                        pos: aat,
                    })
                }
            };
            self.expect(&Tok::RParen)?;
            Ok(field)
        } else {
            Ok(name)
        }
    }

    fn literal(&mut self) -> Result<Literal, CompileError> {
        let (tok, at) = self.next()?;
        match tok {
            Tok::Number(n) => Ok(Literal::Number(n)),
            Tok::Str(s) => Ok(Literal::Str(s)),
            other => Err(CompileError::UnexpectedToken {
                token: other.describe(),
                pos: at,
            }),
        }
    }

    /// A literal set for `in`, bracketed with `[...]` or `(...)`.
    fn literal_list(&mut self) -> Result<Vec<Literal>, CompileError> {
        let (open, at) = self.next()?;
        let close = match open {
            Tok::LBracket => Tok::RBracket,
            Tok::LParen => Tok::RParen,
            other => {
                return Err(CompileError::UnexpectedToken {
                    token: other.describe(),
                    pos: at,
                })
            }
        };

        let mut items = Vec::new();
        if self.peek().map(|(t, _)| t) == Some(&close) {
            self.pos += 1;
            return Ok(items);
        }
        loop {
            items.push(self.literal()?);
            let (tok, at) = self.next()?;
            if tok == close {
                break;
            }
            if tok != Tok::Comma {
                return Err(CompileError::UnexpectedToken {
                    token: tok.describe(),
                    pos: at,
                });
            }
        }
        Ok(items)
    }
}

// ---------------------------------------------------------------------------
// Evaluation
// ---------------------------------------------------------------------------

fn eval(expr: &Expr, fields: &BTreeMap<String, FieldValue>) -> bool {
    match expr {
        Expr::And(a, b) => eval(a, fields) && eval(b, fields),
        Expr::Or(a, b) => eval(a, fields) || eval(b, fields),
        Expr::Not(e) => !eval(e, fields),
        Expr::Cmp { field, op, value } => fields
            .get(field)
            .and_then(|v| eval_cmp(v, *op, value))
            .unwrap_or(false),
        Expr::In { field, set } => fields
            .get(field)
            .map(|v| set.iter().any(|lit| literal_eq(v, lit)))
            .unwrap_or(false),
    }
}

/// Compare a field value against a literal. `None` means the comparison is
/// not defined for these types, which the caller treats as not satisfied.
fn eval_cmp(value: &FieldValue, op: CmpOp, lit: &Literal) -> Option<bool> {
    match lit {
        Literal::Number(n) => {
            let x = value.as_f64()?;
            Some(match op {
                CmpOp::Eq => x == *n,
                CmpOp::Ne => x != *n,
                CmpOp::Lt => x < *n,
                CmpOp::Le => x <= *n,
                CmpOp::Gt => x > *n,
                CmpOp::Ge => x >= *n,
            })
        }
        Literal::Str(s) => {
            let x = value.as_str()?;
            Some(match op {
                CmpOp::Eq => x == s,
                CmpOp::Ne => x != s,
                CmpOp::Lt => x < s.as_str(),
                CmpOp::Le => x <= s.as_str(),
                CmpOp::Gt => x > s.as_str(),
                CmpOp::Ge => x >= s.as_str(),
            })
        }
    }
}

fn literal_eq(value: &FieldValue, lit: &Literal) -> bool {
    match lit {
        Literal::Number(n) => value.as_f64() == Some(*n),
        Literal::Str(s) => value.as_str() == Some(s.as_str()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fields(pairs: &[(&str, FieldValue)]) -> BTreeMap<String, FieldValue> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.clone()))
            .collect()
    }

    #[test]
    fn simple_equality() {
        let p = compile("trecho_outro_genero_9 == 0").unwrap();
        assert!(p.evaluate(&fields(&[("trecho_outro_genero_9", FieldValue::Int(0))])));
        assert!(!p.evaluate(&fields(&[("trecho_outro_genero_9", FieldValue::Int(1))])));
    }

    #[test]
    fn legacy_lambda_prefix_is_stripped() {
        let p = compile("lambda vars: (vars.get('trecho_outro_genero_9') == 0)").unwrap();
        assert!(p.evaluate(&fields(&[("trecho_outro_genero_9", FieldValue::Int(0))])));
        assert!(!p.evaluate(&fields(&[("trecho_outro_genero_9", FieldValue::Int(2))])));

        // "lambda" as an ordinary field name still works.
        let p = compile("lambda == 1").unwrap();
        assert!(p.evaluate(&fields(&[("lambda", FieldValue::Int(1))])));
    }

    #[test]
    fn legacy_vars_get_form() {
        let p = compile(
            "(vars.get('trecho_outro_genero_9') == 0) & (vars.get('num_pontuacao_eixo_2')>=120)",
        )
        .unwrap();
        assert!(p.evaluate(&fields(&[
            ("trecho_outro_genero_9", FieldValue::Int(0)),
            ("num_pontuacao_eixo_2", FieldValue::Int(150)),
        ])));
        assert!(!p.evaluate(&fields(&[
            ("trecho_outro_genero_9", FieldValue::Int(0)),
            ("num_pontuacao_eixo_2", FieldValue::Int(100)),
        ])));
    }

    #[test]
    fn missing_field_is_false_not_an_error() {
        let p = compile("absent_field >= 10").unwrap();
        assert!(!p.evaluate(&fields(&[("other", FieldValue::Int(99))])));
    }

    #[test]
    fn type_mismatch_is_false() {
        let p = compile("score >= 10").unwrap();
        assert!(!p.evaluate(&fields(&[("score", FieldValue::Str("ten".into()))])));

        let p = compile("label == 'good'").unwrap();
        assert!(!p.evaluate(&fields(&[("label", FieldValue::Int(3))])));
    }

    #[test]
    fn membership_over_string_list() {
        let p = compile("categoria in ['A', 'B']").unwrap();
        assert!(p.evaluate(&fields(&[("categoria", FieldValue::Str("A".into()))])));
        assert!(!p.evaluate(&fields(&[("categoria", FieldValue::Str("C".into()))])));
        assert!(!p.evaluate(&fields(&[("outra", FieldValue::Str("A".into()))])));
    }

    #[test]
    fn membership_over_number_tuple() {
        let p = compile("nota in (100, 200)").unwrap();
        assert!(p.evaluate(&fields(&[("nota", FieldValue::Int(200))])));
        assert!(!p.evaluate(&fields(&[("nota", FieldValue::Int(150))])));
    }

    #[test]
    fn boolean_combinators() {
        let p = compile("a == 1 | b == 1").unwrap();
        assert!(p.evaluate(&fields(&[("b", FieldValue::Int(1))])));

        let p = compile("not a == 1 and b == 1").unwrap();
        assert!(p.evaluate(&fields(&[
            ("a", FieldValue::Int(2)),
            ("b", FieldValue::Int(1)),
        ])));
    }

    #[test]
    fn precedence_and_binds_tighter_than_or() {
        // a | b & c parses as a | (b & c)
        let p = compile("a == 1 | b == 1 & c == 1").unwrap();
        assert!(p.evaluate(&fields(&[("a", FieldValue::Int(1))])));
        assert!(!p.evaluate(&fields(&[("b", FieldValue::Int(1))])));
    }

    #[test]
    fn negative_and_float_literals() {
        let p = compile("delta >= -1.5").unwrap();
        assert!(p.evaluate(&fields(&[("delta", FieldValue::Float(-1.0))])));
        assert!(!p.evaluate(&fields(&[("delta", FieldValue::Float(-2.0))])));
    }

    #[test]
    fn int_and_float_fields_compare_numerically() {
        let p = compile("x == 3").unwrap();
        assert!(p.evaluate(&fields(&[("x", FieldValue::Float(3.0))])));
        assert!(p.evaluate(&fields(&[("x", FieldValue::Int(3))])));
    }

    #[test]
    fn compile_errors() {
        assert!(matches!(compile(""), Err(CompileError::Empty)));
        assert!(matches!(compile("   "), Err(CompileError::Empty)));
        assert!(matches!(compile("x =="), Err(CompileError::UnexpectedEnd)));
        assert!(matches!(
            compile("x == 1)"),
            Err(CompileError::UnexpectedToken { .. })
        ));
        assert!(matches!(
            compile("x ? 1"),
            Err(CompileError::UnexpectedChar { ch: '?', .. })
        ));
        assert!(matches!(
            compile("x == 'abc"),
            Err(CompileError::UnterminatedString { .. })
        ));
        assert!(matches!(
            compile("vars.fetch('x') == 1"),
            Err(CompileError::UnexpectedToken { .. })
        ));
    }

    #[test]
    fn error_reports_position() {
        let err = compile("x ? 1").unwrap_err();
        assert!(err.to_string().contains("position 2"));
    }
}
