use miette::{Context, Error, IntoDiagnostic, LabeledSpan, SourceSpan, miette};

use crate::{lex::Op, parse::TokenTree};

#[derive(Debug, Clone, Copy, PartialEq)]
enum Symbol {
    LeftParen,
    RightParen,
    Op(Op),
    Number(f64),
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct Scanned {
    symbol: Symbol,
    span: SourceSpan,
}

/// Character scanner for infix text such as `(1 + (5 - 2))`.
struct Scanner<'de> {
    whole: &'de str,
    rest: &'de str,
    byte: usize,
}

impl<'de> Scanner<'de> {
    fn new(input: &'de str) -> Self {
        Scanner {
            whole: input,
            rest: input,
            byte: 0,
        }
    }
}

impl Iterator for Scanner<'_> {
    type Item = Result<Scanned, Error>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let mut chars = self.rest.chars();
            let c = chars.next()?;
            let cur = self.rest;
            let start = self.byte;
            self.rest = chars.as_str();
            self.byte += c.len_utf8();

            let process = |symbol: Symbol| {
                Some(Ok(Scanned {
                    symbol,
                    span: SourceSpan::from(start..start + c.len_utf8()),
                }))
            };

            match c {
                '(' => return process(Symbol::LeftParen),
                ')' => return process(Symbol::RightParen),
                '0'..='9' => {}
                c if c.is_whitespace() => continue,
                c => {
                    if let Some(op) = Op::from_symbol(c) {
                        return process(Symbol::Op(op));
                    }
                    return Some(Err(miette!(
                        labels = vec![LabeledSpan::at(start..self.byte, "this character")],
                        "Unexpected character '{c}' in expression"
                    )
                    .with_source_code(self.whole.to_string())));
                }
            }

            let end = cur.find(|c: char| !c.is_ascii_digit()).unwrap_or(cur.len());
            let literal = &cur[..end];
            let extra_bytes = literal.len() - c.len_utf8();
            self.byte += extra_bytes;
            self.rest = &self.rest[extra_bytes..];

            let n = match literal.parse() {
                Ok(n) => n,
                Err(e) => {
                    return Some(Err(miette!(
                        code = "ParseFloatError",
                        labels = vec![LabeledSpan::at(start..self.byte, "this numeric literal")],
                        "{e}",
                    )
                    .with_source_code(self.whole.to_string())));
                }
            };

            return Some(Ok(Scanned {
                symbol: Symbol::Number(n),
                span: SourceSpan::from(start..self.byte),
            }));
        }
    }
}

/// One parenthesized group being folded: the value so far and the operator
/// waiting for its right operand.
#[derive(Debug, Clone, Copy)]
struct Group {
    acc: Option<f64>,
    pending: Option<Op>,
    open: Option<SourceSpan>,
}

impl Group {
    fn new(open: Option<SourceSpan>) -> Self {
        Group {
            acc: None,
            pending: None,
            open,
        }
    }

    /// The folded value, if the group is not waiting for an operand.
    fn value(&self) -> Option<f64> {
        match (self.acc, self.pending) {
            (Some(acc), None) => Some(acc),
            _ => None,
        }
    }

    fn feed(&mut self, operand: f64) {
        self.acc = Some(match (self.acc, self.pending.take()) {
            (Some(acc), Some(op)) => {
                log::trace!("{acc} {} {operand}", op.symbol());
                op.apply(acc, operand)
            }
            _ => operand,
        });
    }
}

/// Evaluates fully parenthesized infix text. Operators inside a group are
/// applied strictly left to right; there is no precedence between them.
pub struct Evaluator<'de> {
    whole: &'de str,
    symbols: Vec<Scanned>,
}

impl<'de> Evaluator<'de> {
    pub fn new(whole: &'de str) -> Result<Self, Error> {
        let symbols = Scanner::new(whole).collect::<Result<Vec<_>, _>>()?;
        Ok(Evaluator { whole, symbols })
    }

    pub fn evaluate(self) -> Result<f64, Error> {
        let mut current = Group::new(None);
        let mut enclosing = Vec::new();

        for scanned in &self.symbols {
            let expects_operand = current.value().is_none();
            match scanned.symbol {
                Symbol::Number(n) if expects_operand => current.feed(n),
                Symbol::LeftParen if expects_operand => {
                    let inner = Group::new(Some(scanned.span));
                    enclosing.push(std::mem::replace(&mut current, inner));
                }
                Symbol::Number(_) | Symbol::LeftParen => {
                    return Err(self.unexpected(scanned.span, "expected an operator"));
                }
                Symbol::Op(op) if !expects_operand => current.pending = Some(op),
                Symbol::Op(_) => {
                    return Err(self.unexpected(scanned.span, "expected a number or `(`"));
                }
                Symbol::RightParen => {
                    let Some(value) = current.value() else {
                        return Err(self.unexpected(scanned.span, "expected a number or `(`"));
                    };
                    let Some(outer) = enclosing.pop() else {
                        return Err(self.unexpected(scanned.span, "no group to close"));
                    };
                    current = outer;
                    current.feed(value);
                }
            }
        }

        if let Some(open) = current.open {
            return Err(miette!(
                labels = vec![LabeledSpan::at(open, "this group is never closed")],
                "unbalanced parenthesis"
            )
            .with_source_code(self.whole.to_string()));
        }
        let Some(value) = current.value() else {
            return Err(self.eof("expected a number or `(`"));
        };
        log::debug!("evaluated {} symbols to {value}", self.symbols.len());
        Ok(value)
    }

    fn unexpected(&self, span: SourceSpan, message: &str) -> Error {
        miette!(labels = vec![LabeledSpan::at(span, "here")], "{message}")
            .with_source_code(self.whole.to_string())
    }

    fn eof(&self, message: &str) -> Error {
        miette!(
            labels = vec![LabeledSpan::at_offset(self.whole.len(), "input ends here")],
            "Unexpected end of expression: {message}"
        )
        .with_source_code(self.whole.to_string())
    }
}

pub fn evaluate(expression: &str) -> Result<f64, Error> {
    Evaluator::new(expression)?.evaluate()
}

/// An operator node whose children are still being folded.
struct Fold<'a, 'de> {
    op: Op,
    children: std::slice::Iter<'a, TokenTree<'de>>,
    acc: Option<f64>,
}

impl Fold<'_, '_> {
    fn absorb(&mut self, value: f64) {
        self.acc = Some(match self.acc {
            Some(acc) => self.op.apply(acc, value),
            None => value,
        });
    }
}

fn operand(n: &str) -> Result<f64, Error> {
    n.parse()
        .into_diagnostic()
        .wrap_err_with(|| format!("`{n}` is not a number"))
}

impl TokenTree<'_> {
    /// Folds the tree directly, applying each operator left to right over its children.
    pub fn evaluate(&self) -> Result<f64, Error> {
        let (op, children) = match self {
            TokenTree::Atom(n) => return operand(n),
            TokenTree::Cons(op, children) => (*op, children),
        };

        let mut stack = vec![Fold {
            op,
            children: children.iter(),
            acc: None,
        }];
        let mut result = None;
        while let Some(top) = stack.last_mut() {
            match top.children.next() {
                Some(TokenTree::Atom(n)) => top.absorb(operand(n)?),
                Some(TokenTree::Cons(op, children)) => stack.push(Fold {
                    op: *op,
                    children: children.iter(),
                    acc: None,
                }),
                None => {
                    let op = top.op;
                    let Some(value) = top.acc else {
                        return Err(miette!("`{op}` has no operands"));
                    };
                    stack.pop();
                    match stack.last_mut() {
                        Some(parent) => parent.absorb(value),
                        None => result = Some(value),
                    }
                }
            }
        }

        result.ok_or_else(|| miette!("`{op}` has no operands"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn groups_combine_left_to_right() {
        assert_eq!(evaluate("(1 + 2 + 3)").unwrap(), 6.0);
        assert_eq!(evaluate("(10 - 4 - 3)").unwrap(), 3.0);
        assert_eq!(evaluate("(8 / 2 / 2)").unwrap(), 2.0);
        assert_eq!(evaluate("(1 + (5 - 2))").unwrap(), 4.0);
    }

    #[test]
    fn no_precedence_between_operators() {
        assert_eq!(evaluate("1 + 2 * 3").unwrap(), 9.0);
        assert_eq!(evaluate("1 + (2 * 3)").unwrap(), 7.0);
        assert_eq!(evaluate("2 * 3 - 8 / 4").unwrap(), -0.5);
    }

    #[test]
    fn division_is_floating_point() {
        assert_eq!(evaluate("(7 / 2)").unwrap(), 3.5);
        assert_eq!(evaluate("(2 * (4 / 0))").unwrap(), f64::INFINITY);
        assert!(evaluate("(0 / 0)").unwrap().is_nan());
    }

    #[test]
    fn single_value_group_is_identity() {
        assert_eq!(evaluate("(5)").unwrap(), 5.0);
        assert_eq!(evaluate("((((42))))").unwrap(), 42.0);
    }

    #[test]
    fn malformed_text_is_reported() {
        for input in [
            "", "(1 + 2", "1 +", "1 $ 2", "1 2", ")", "(1 + 2))", "* 3", "()", "(1 +)", "2 (3)",
        ] {
            assert!(evaluate(input).is_err(), "{input:?} should not evaluate");
        }
    }

    #[test]
    fn decimals_are_not_numbers() {
        let e = evaluate("(1.5 + 2)").unwrap_err();
        assert_eq!(e.to_string(), "Unexpected character '.' in expression");
    }

    #[test]
    fn unbalanced_paren_message() {
        let e = evaluate("(1 + (2").unwrap_err();
        assert_eq!(e.to_string(), "unbalanced parenthesis");
    }

    #[test]
    fn deep_nesting_does_not_recurse() {
        let depth = 20_000;
        let text = format!("{}1{}", "(1 + ".repeat(depth), ")".repeat(depth));
        assert_eq!(evaluate(&text).unwrap(), (depth + 1) as f64);
    }

    #[test]
    fn tree_fold_matches_arithmetic() {
        let tree = TokenTree::Cons(
            Op::Sub,
            vec![
                TokenTree::Atom("10"),
                TokenTree::Atom("4"),
                TokenTree::Cons(Op::Div, vec![TokenTree::Atom("9"), TokenTree::Atom("3")]),
            ],
        );
        assert_eq!(tree.evaluate().unwrap(), 3.0);
        assert!(TokenTree::Cons(Op::Sum, vec![]).evaluate().is_err());
        let empty_inner = TokenTree::Cons(Op::Sum, vec![TokenTree::Cons(Op::Mul, vec![])]);
        assert!(empty_inner.evaluate().is_err());
    }
}
