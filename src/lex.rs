use std::fmt::Display;

use miette::{NamedSource, SourceSpan};

/// The four arithmetic operators of the prefix language.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Sum,
    Sub,
    Mul,
    Div,
}

impl Op {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "sum" => Some(Op::Sum),
            "sub" => Some(Op::Sub),
            "mul" => Some(Op::Mul),
            "div" => Some(Op::Div),
            _ => None,
        }
    }

    pub fn from_symbol(symbol: char) -> Option<Self> {
        match symbol {
            '+' => Some(Op::Sum),
            '-' => Some(Op::Sub),
            '*' => Some(Op::Mul),
            '/' => Some(Op::Div),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Op::Sum => "sum",
            Op::Sub => "sub",
            Op::Mul => "mul",
            Op::Div => "div",
        }
    }

    pub fn symbol(self) -> char {
        match self {
            Op::Sum => '+',
            Op::Sub => '-',
            Op::Mul => '*',
            Op::Div => '/',
        }
    }

    /// Division follows IEEE-754, so a zero divisor yields `inf` or `NaN`.
    pub fn apply(self, lhs: f64, rhs: f64) -> f64 {
        match self {
            Op::Sum => lhs + rhs,
            Op::Sub => lhs - rhs,
            Op::Mul => lhs * rhs,
            Op::Div => lhs / rhs,
        }
    }
}

impl Display for Op {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TokenKind {
    Operator(Op),
    Number,
    Invalid,
}

impl TokenKind {
    pub fn classify(literal: &str) -> Self {
        if let Some(op) = Op::from_name(literal) {
            TokenKind::Operator(op)
        } else if !literal.is_empty() && literal.bytes().all(|b| b.is_ascii_digit()) {
            TokenKind::Number
        } else {
            TokenKind::Invalid
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Token<'de> {
    pub kind: TokenKind,
    pub literal: &'de str,
    /// Byte offset of the literal in the whole input.
    pub offset: usize,
}

impl Token<'_> {
    pub fn span(&self) -> SourceSpan {
        SourceSpan::from(self.offset..self.offset + self.literal.len())
    }
}

impl Display for Token<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let lit = self.literal;
        match self.kind {
            TokenKind::Operator(op) => write!(f, "OPERATOR {lit} {}", op.symbol()),
            TokenKind::Number => write!(f, "NUMBER {lit} {lit}"),
            TokenKind::Invalid => write!(f, "INVALID {lit} null"),
        }
    }
}

pub(crate) fn named_source(filename: Option<&str>, whole: &str) -> NamedSource<String> {
    NamedSource::new(filename.unwrap_or("<input>"), whole.to_string())
}

/// Splits input on whitespace, yielding every non-empty piece as a classified [`Token`].
pub struct Lexer<'de> {
    rest: &'de str,
    byte: usize,
}

impl<'de> Lexer<'de> {
    pub fn new(input: &'de str) -> Self {
        Lexer {
            rest: input,
            byte: 0,
        }
    }
}

impl<'de> Iterator for Lexer<'de> {
    type Item = Token<'de>;

    fn next(&mut self) -> Option<Self::Item> {
        let trimmed = self.rest.trim_start();
        self.byte += self.rest.len() - trimmed.len();
        self.rest = trimmed;
        if self.rest.is_empty() {
            return None;
        }

        let end = self.rest.find(char::is_whitespace).unwrap_or(self.rest.len());
        let literal = &self.rest[..end];
        let offset = self.byte;
        self.rest = &self.rest[end..];
        self.byte += end;

        Some(Token {
            kind: TokenKind::classify(literal),
            literal,
            offset,
        })
    }
}

pub fn tokenize(input: &str) -> Vec<&str> {
    Lexer::new(input).map(|token| token.literal).collect()
}
