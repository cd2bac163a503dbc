use std::fmt;
use std::iter::Peekable;
use std::str::Chars;

use crate::error::{ProberError, Result};
use crate::model::metric::MetricGroups;

pub trait Expression: Send + Sync + fmt::Debug {
    fn evaluate(&self, groups: &MetricGroups<'_>) -> Result<f64>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Op {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, PartialEq)]
enum Node {
    Number(f64),
    Metric(String),
    Neg(Box<Node>),
    Binary(Op, Box<Node>, Box<Node>),
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ident(String),
    Op(Op),
    LParen,
    RParen,
}

/// Arithmetic over metric names. A name evaluates to the sum of every point
/// in its group, so `disk.used / disk.total` works across per-device series.
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    source: String,
    root: Node,
}

impl Formula {
    pub fn parse(source: &str) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            tokens: &tokens,
            pos: 0,
        };
        let root = parser.expr()?;
        if parser.pos != tokens.len() {
            return Err(ProberError::Parse(format!(
                "unexpected trailing input in expression: {source}"
            )));
        }
        Ok(Self {
            source: source.to_string(),
            root,
        })
    }

    pub fn metric_names(&self) -> Vec<&str> {
        let mut out = Vec::new();
        collect_names(&self.root, &mut out);
        out
    }
}

impl Expression for Formula {
    fn evaluate(&self, groups: &MetricGroups<'_>) -> Result<f64> {
        let value = eval(&self.root, groups)?;
        if !value.is_finite() {
            return Err(ProberError::ExpressionEval(format!(
                "{} produced a non-finite value",
                self.source
            )));
        }
        Ok(value)
    }
}

fn collect_names<'a>(node: &'a Node, out: &mut Vec<&'a str>) {
    match node {
        Node::Number(_) => {}
        Node::Metric(name) => {
            if !out.contains(&name.as_str()) {
                out.push(name);
            }
        }
        Node::Neg(inner) => collect_names(inner, out),
        Node::Binary(_, lhs, rhs) => {
            collect_names(lhs, out);
            collect_names(rhs, out);
        }
    }
}

fn eval(node: &Node, groups: &MetricGroups<'_>) -> Result<f64> {
    match node {
        Node::Number(v) => Ok(*v),
        Node::Metric(name) => match groups.get(name.as_str()) {
            Some(points) if !points.is_empty() => Ok(points.iter().map(|p| p.value).sum()),
            _ => Err(ProberError::ExpressionEval(format!(
                "metric {name} not present in batch"
            ))),
        },
        Node::Neg(inner) => Ok(-eval(inner, groups)?),
        Node::Binary(op, lhs, rhs) => {
            let l = eval(lhs, groups)?;
            let r = eval(rhs, groups)?;
            match op {
                Op::Add => Ok(l + r),
                Op::Sub => Ok(l - r),
                Op::Mul => Ok(l * r),
                Op::Div => {
                    if r == 0.0 {
                        return Err(ProberError::ExpressionEval("division by zero".to_string()));
                    }
                    Ok(l / r)
                }
            }
        }
    }
}

fn tokenize(source: &str) -> Result<Vec<Token>> {
    let mut tokens = Vec::new();
    let mut chars = source.chars().peekable();
    while let Some(&c) = chars.peek() {
        match c {
            ' ' | '\t' | '\n' => {
                chars.next();
            }
            '+' => {
                chars.next();
                tokens.push(Token::Op(Op::Add));
            }
            '-' => {
                chars.next();
                tokens.push(Token::Op(Op::Sub));
            }
            '*' => {
                chars.next();
                tokens.push(Token::Op(Op::Mul));
            }
            '/' => {
                chars.next();
                tokens.push(Token::Op(Op::Div));
            }
            '(' => {
                chars.next();
                tokens.push(Token::LParen);
            }
            ')' => {
                chars.next();
                tokens.push(Token::RParen);
            }
            c if c.is_ascii_digit() || c == '.' => tokens.push(number(&mut chars)?),
            '\'' => {
                chars.next();
                let mut ident = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => break,
                        Some(c) => ident.push(c),
                        None => {
                            return Err(ProberError::Parse(format!(
                                "unterminated quoted name in expression: {source}"
                            )));
                        }
                    }
                }
                if ident.is_empty() {
                    return Err(ProberError::Parse(format!(
                        "empty quoted name in expression: {source}"
                    )));
                }
                tokens.push(Token::Ident(ident));
            }
            c if c.is_alphabetic() || c == '_' => {
                let mut ident = String::new();
                while let Some(&c) = chars.peek() {
                    if c.is_alphanumeric() || c == '_' || c == '.' {
                        ident.push(c);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::Ident(ident));
            }
            other => {
                return Err(ProberError::Parse(format!(
                    "unexpected character {other:?} in expression: {source}"
                )));
            }
        }
    }
    if tokens.is_empty() {
        return Err(ProberError::Parse("empty expression".to_string()));
    }
    Ok(tokens)
}

fn number(chars: &mut Peekable<Chars<'_>>) -> Result<Token> {
    let mut raw = String::new();
    while let Some(&c) = chars.peek() {
        if c.is_ascii_digit() || c == '.' {
            raw.push(c);
            chars.next();
        } else {
            break;
        }
    }
    raw.parse::<f64>()
        .map(Token::Number)
        .map_err(|e| ProberError::Parse(format!("invalid number {raw}: {e}")))
}

struct Parser<'a> {
    tokens: &'a [Token],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.pos)
    }

    fn next(&mut self) -> Option<&Token> {
        let token = self.tokens.get(self.pos);
        self.pos += 1;
        token
    }

    fn expr(&mut self) -> Result<Node> {
        let mut lhs = self.term()?;
        while let Some(Token::Op(op @ (Op::Add | Op::Sub))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.term()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn term(&mut self) -> Result<Node> {
        let mut lhs = self.unary()?;
        while let Some(Token::Op(op @ (Op::Mul | Op::Div))) = self.peek() {
            let op = *op;
            self.pos += 1;
            let rhs = self.unary()?;
            lhs = Node::Binary(op, Box::new(lhs), Box::new(rhs));
        }
        Ok(lhs)
    }

    fn unary(&mut self) -> Result<Node> {
        if let Some(Token::Op(Op::Sub)) = self.peek() {
            self.pos += 1;
            return Ok(Node::Neg(Box::new(self.unary()?)));
        }
        self.primary()
    }

    fn primary(&mut self) -> Result<Node> {
        match self.next().cloned() {
            Some(Token::Number(v)) => Ok(Node::Number(v)),
            Some(Token::Ident(name)) => Ok(Node::Metric(name)),
            Some(Token::LParen) => {
                let inner = self.expr()?;
                match self.next() {
                    Some(Token::RParen) => Ok(inner),
                    _ => Err(ProberError::Parse("missing closing parenthesis".to_string())),
                }
            }
            Some(other) => Err(ProberError::Parse(format!("unexpected token {other:?}"))),
            None => Err(ProberError::Parse(
                "unexpected end of expression".to_string(),
            )),
        }
    }
}
