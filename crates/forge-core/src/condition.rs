//! Condition predicates over the pipeline context.
//!
//! Conditions are authored as short string expressions in the pipeline YAML
//! (`ref == "refs/heads/main" && event == "push"`) and parsed into an
//! expression tree when the definition is loaded. An ill-formed predicate or
//! an unknown field is a definition-time error; evaluation is pure and total.

use crate::context::{EventKind, PipelineContext};
use crate::error::Error;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Parsed predicate expression.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expr {
    /// `ref == "literal"`
    RefEquals(String),
    /// `event == "push"`
    EventIs(EventKind),
    Not(Box<Expr>),
    All(Vec<Expr>),
    Any(Vec<Expr>),
}

impl Expr {
    pub fn evaluate(&self, ctx: &PipelineContext) -> bool {
        match self {
            Expr::RefEquals(literal) => ctx.git_ref == *literal,
            Expr::EventIs(kind) => ctx.event == *kind,
            Expr::Not(inner) => !inner.evaluate(ctx),
            Expr::All(parts) => parts.iter().all(|e| e.evaluate(ctx)),
            Expr::Any(parts) => parts.iter().any(|e| e.evaluate(ctx)),
        }
    }
}

/// A condition gating whether a job runs.
///
/// Serializes as the source string; deserializing parses and validates it, so
/// a pipeline with a bad condition fails to load.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Condition {
    raw: String,
    expr: Expr,
}

impl Condition {
    pub fn parse(input: &str) -> Result<Self, Error> {
        let tokens = tokenize(input).map_err(|message| Error::InvalidCondition {
            expr: input.to_string(),
            message,
        })?;
        let mut parser = Parser { tokens, pos: 0 };
        let expr = parser.parse_or().map_err(|message| Error::InvalidCondition {
            expr: input.to_string(),
            message,
        })?;
        if parser.pos != parser.tokens.len() {
            return Err(Error::InvalidCondition {
                expr: input.to_string(),
                message: "unexpected trailing input".to_string(),
            });
        }
        Ok(Self {
            raw: input.to_string(),
            expr,
        })
    }

    pub fn evaluate(&self, ctx: &PipelineContext) -> bool {
        self.expr.evaluate(ctx)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    pub fn expr(&self) -> &Expr {
        &self.expr
    }
}

impl fmt::Display for Condition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

impl TryFrom<String> for Condition {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Condition::parse(&value)
    }
}

impl From<Condition> for String {
    fn from(condition: Condition) -> Self {
        condition.raw
    }
}

impl schemars::JsonSchema for Condition {
    fn schema_name() -> String {
        "Condition".to_string()
    }

    fn json_schema(generator: &mut schemars::r#gen::SchemaGenerator) -> schemars::schema::Schema {
        String::json_schema(generator)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Ident(String),
    Str(String),
    EqEq,
    NotEq,
    AndAnd,
    OrOr,
    Bang,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                chars.next();
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            '=' => {
                chars.next();
                if chars.next() == Some('=') {
                    tokens.push(Token::EqEq);
                } else {
                    return Err("expected '=='".to_string());
                }
            }
            '!' => {
                chars.next();
                if chars.peek() == Some(&'=') {
                    chars.next();
                    tokens.push(Token::NotEq);
                } else {
                    tokens.push(Token::Bang);
                }
            }
            '&' => {
                chars.next();
                if chars.next() == Some('&') {
                    tokens.push(Token::AndAnd);
                } else {
                    return Err("expected '&&'".to_string());
                }
            }
            '|' => {
                chars.next();
                if chars.next() == Some('|') {
                    tokens.push(Token::OrOr);
                } else {
                    return Err("expected '||'".to_string());
                }
            }
            '"' | '\'' => {
                let quote = c;
                chars.next();
                let mut literal = String::new();
                loop {
                    match chars.next() {
                        Some(ch) if ch == quote => break,
                        Some(ch) => literal.push(ch),
                        None => return Err("unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::Str(literal));
            }
            c if c.is_ascii_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => return Err(format!("unexpected character '{other}'")),
        }
    }

    if tokens.is_empty() {
        return Err("empty condition".to_string());
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<Token>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<Token> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    // or := and ('||' and)*
    fn parse_or(&mut self) -> Result<Expr, String> {
        let mut parts = vec![self.parse_and()?];
        while self.peek() == Some(&Token::OrOr) {
            self.next();
            parts.push(self.parse_and()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::Any(parts)
        })
    }

    // and := unary ('&&' unary)*
    fn parse_and(&mut self) -> Result<Expr, String> {
        let mut parts = vec![self.parse_unary()?];
        while self.peek() == Some(&Token::AndAnd) {
            self.next();
            parts.push(self.parse_unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Expr::All(parts)
        })
    }

    // unary := '!' unary | '(' or ')' | comparison
    fn parse_unary(&mut self) -> Result<Expr, String> {
        match self.peek() {
            Some(Token::Bang) => {
                self.next();
                Ok(Expr::Not(Box::new(self.parse_unary()?)))
            }
            Some(Token::LParen) => {
                self.next();
                let inner = self.parse_or()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err("expected ')'".to_string()),
                }
            }
            _ => self.parse_comparison(),
        }
    }

    // comparison := field ('==' | '!=') string
    fn parse_comparison(&mut self) -> Result<Expr, String> {
        let field = match self.next() {
            Some(Token::Ident(name)) => name,
            other => return Err(format!("expected a field name, found {other:?}")),
        };
        let negated = match self.next() {
            Some(Token::EqEq) => false,
            Some(Token::NotEq) => true,
            other => return Err(format!("expected '==' or '!=', found {other:?}")),
        };
        let literal = match self.next() {
            Some(Token::Str(value)) => value,
            other => return Err(format!("expected a quoted literal, found {other:?}")),
        };

        let comparison = match field.as_str() {
            "ref" => Expr::RefEquals(literal),
            "event" => {
                let kind: EventKind = literal.parse()?;
                Expr::EventIs(kind)
            }
            other => return Err(format!("unknown field '{other}' (expected ref or event)")),
        };

        Ok(if negated {
            Expr::Not(Box::new(comparison))
        } else {
            comparison
        })
    }
}
