use std::{collections::VecDeque, fmt::Display};

use miette::{Diagnostic, NamedSource, SourceSpan};
use thiserror::Error;

use crate::lex::{Lexer, Op, Token, TokenKind, named_source};

#[derive(Error, Debug, Diagnostic)]
pub enum GrammarError {
    #[error("expression must start with an operator")]
    #[diagnostic(
        code(prefix_calc::missing_operator),
        help("start the expression with one of `sum`, `sub`, `mul` or `div`")
    )]
    MissingOperator {
        #[source_code]
        src: NamedSource<String>,

        #[label("expected an operator here")]
        bad_token: SourceSpan,
    },

    #[error("expression must end with a number")]
    #[diagnostic(
        code(prefix_calc::missing_operand),
        help("every operator needs at least one number after it")
    )]
    MissingOperand {
        #[source_code]
        src: NamedSource<String>,

        #[label("expected a number here")]
        bad_token: SourceSpan,
    },

    #[error("unrecognized token '{token}'")]
    #[diagnostic(
        code(prefix_calc::unknown_token),
        help("only `sum`, `sub`, `mul`, `div` and non-negative integers are allowed")
    )]
    UnknownToken {
        #[source_code]
        src: NamedSource<String>,

        #[label("this token")]
        bad_token: SourceSpan,

        token: String,
    },

    #[error("two operators in a row")]
    #[diagnostic(
        code(prefix_calc::consecutive_operators),
        help("put at least one number between `{previous}` and `{token}`")
    )]
    ConsecutiveOperators {
        #[source_code]
        src: NamedSource<String>,

        #[label("follows another operator")]
        bad_token: SourceSpan,

        previous: Op,
        token: Op,
    },
}

impl GrammarError {
    pub fn span(&self) -> SourceSpan {
        match self {
            GrammarError::MissingOperator { bad_token, .. }
            | GrammarError::MissingOperand { bad_token, .. }
            | GrammarError::UnknownToken { bad_token, .. }
            | GrammarError::ConsecutiveOperators { bad_token, .. } => *bad_token,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Validity {
    NoInput,
    Valid,
    Invalid,
}

/// Outcome of checking the token sequence against the positional rules.
#[derive(Debug)]
pub enum Verdict {
    NoInput,
    Valid,
    Invalid(GrammarError),
}

impl Verdict {
    pub fn validity(&self) -> Validity {
        match self {
            Verdict::NoInput => Validity::NoInput,
            Verdict::Valid => Validity::Valid,
            Verdict::Invalid(_) => Validity::Invalid,
        }
    }

    pub fn message(&self) -> String {
        match self {
            Verdict::NoInput => String::new(),
            Verdict::Valid => "expression valid!".to_string(),
            Verdict::Invalid(e) => format!("invalid expression: {e}"),
        }
    }
}

/// Each operator owns the numbers that follow it and, once another operator
/// appears, that operator's whole subtree as its last child.
#[derive(Debug, Clone, PartialEq)]
pub enum TokenTree<'de> {
    Atom(&'de str),
    Cons(Op, Vec<TokenTree<'de>>),
}

/// The value held by a single node, without its children.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeValue<'de> {
    Operator(Op),
    Number(&'de str),
}

impl Display for NodeValue<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeValue::Operator(op) => write!(f, "{op}"),
            NodeValue::Number(n) => write!(f, "{n}"),
        }
    }
}

impl<'de> TokenTree<'de> {
    pub fn value(&self) -> NodeValue<'de> {
        match self {
            TokenTree::Atom(n) => NodeValue::Number(*n),
            TokenTree::Cons(op, _) => NodeValue::Operator(*op),
        }
    }

    pub fn children(&self) -> &[TokenTree<'de>] {
        match self {
            TokenTree::Atom(_) => &[],
            TokenTree::Cons(_, children) => children,
        }
    }

    /// Node values grouped by depth, in breadth-first order.
    pub fn layers(&self) -> Vec<Vec<NodeValue<'de>>> {
        let mut layers = Vec::new();
        let mut queue = VecDeque::from([self]);
        while !queue.is_empty() {
            let mut layer = Vec::with_capacity(queue.len());
            for _ in 0..queue.len() {
                let Some(node) = queue.pop_front() else {
                    break;
                };
                layer.push(node.value());
                queue.extend(node.children());
            }
            layers.push(layer);
        }
        layers
    }

    pub fn expression(&self) -> String {
        Infix(self).to_string()
    }
}

/// Frees deep trees without recursing once per level.
impl Drop for TokenTree<'_> {
    fn drop(&mut self) {
        let TokenTree::Cons(_, children) = self else {
            return;
        };
        let mut pending = std::mem::take(children);
        while let Some(mut node) = pending.pop() {
            if let TokenTree::Cons(_, children) = &mut node {
                pending.append(children);
            }
        }
    }
}

/// Renders the tree back into the prefix token stream it was built from.
impl Display for TokenTree<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stack = vec![self];
        let mut first = true;
        while let Some(node) = stack.pop() {
            if !first {
                write!(f, " ")?;
            }
            first = false;
            write!(f, "{}", node.value())?;
            stack.extend(node.children().iter().rev());
        }
        Ok(())
    }
}

/// Fully parenthesized infix form, e.g. `(1 + (5 - 2))`.
pub struct Infix<'a, 'de>(pub &'a TokenTree<'de>);

enum Piece<'a, 'de> {
    Tree(&'a TokenTree<'de>),
    Separator(Op),
    Close,
}

impl Display for Infix<'_, '_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut stack = vec![Piece::Tree(self.0)];
        while let Some(piece) = stack.pop() {
            match piece {
                Piece::Tree(TokenTree::Atom(n)) => write!(f, "{n}")?,
                Piece::Tree(TokenTree::Cons(op, children)) if children.is_empty() => {
                    write!(f, "{op}")?
                }
                Piece::Tree(TokenTree::Cons(op, children)) => {
                    write!(f, "(")?;
                    stack.push(Piece::Close);
                    for (i, child) in children.iter().enumerate().rev() {
                        stack.push(Piece::Tree(child));
                        if i > 0 {
                            stack.push(Piece::Separator(*op));
                        }
                    }
                }
                Piece::Separator(op) => write!(f, " {} ", op.symbol())?,
                Piece::Close => write!(f, ")")?,
            }
        }
        Ok(())
    }
}

pub struct Parser<'de> {
    filename: Option<&'de str>,
    whole: &'de str,
    tokens: Vec<Token<'de>>,
}

impl<'de> Parser<'de> {
    pub fn new(filename: Option<&'de str>, whole: &'de str) -> Self {
        Parser {
            filename,
            whole,
            tokens: Lexer::new(whole).collect(),
        }
    }

    pub fn tokens(&self) -> &[Token<'de>] {
        &self.tokens
    }

    pub fn validate(&self) -> Verdict {
        let verdict = match self.check() {
            Ok(verdict) => verdict,
            Err(e) => Verdict::Invalid(e),
        };
        log::debug!(
            "validated {} tokens: {:?}",
            self.tokens.len(),
            verdict.validity()
        );
        verdict
    }

    fn check(&self) -> Result<Verdict, GrammarError> {
        let Some(last) = self.tokens.len().checked_sub(1) else {
            return Ok(Verdict::NoInput);
        };

        for (i, token) in self.tokens.iter().enumerate() {
            if i == last && token.kind != TokenKind::Number {
                return Err(GrammarError::MissingOperand {
                    src: self.source(),
                    bad_token: token.span(),
                });
            }

            if i == 0 {
                if !matches!(token.kind, TokenKind::Operator(_)) {
                    return Err(GrammarError::MissingOperator {
                        src: self.source(),
                        bad_token: token.span(),
                    });
                }
                continue;
            }

            match (self.tokens[i - 1].kind, token.kind) {
                (_, TokenKind::Invalid) => {
                    return Err(GrammarError::UnknownToken {
                        src: self.source(),
                        bad_token: token.span(),
                        token: token.literal.to_string(),
                    });
                }
                (TokenKind::Operator(previous), TokenKind::Operator(op)) => {
                    return Err(GrammarError::ConsecutiveOperators {
                        src: self.source(),
                        bad_token: token.span(),
                        previous,
                        token: op,
                    });
                }
                _ => {}
            }
        }

        Ok(Verdict::Valid)
    }

    /// Validates the tokens and builds the tree. `Ok(None)` means there was no input.
    pub fn parse(&self) -> Result<Option<TokenTree<'de>>, GrammarError> {
        match self.validate() {
            Verdict::NoInput => Ok(None),
            Verdict::Invalid(e) => Err(e),
            Verdict::Valid => Ok(self.build()),
        }
    }

    /// Builds the tree without checking the grammar; call [`Parser::validate`] first.
    pub fn build(&self) -> Option<TokenTree<'de>> {
        let (first, rest) = self.tokens.split_first()?;
        let TokenKind::Operator(root_op) = first.kind else {
            return None;
        };

        let mut root_children = Vec::new();
        let mut cursor = &mut root_children;
        for token in rest {
            match token.kind {
                TokenKind::Operator(op) => {
                    log::trace!("descending into `{op}` at byte {}", token.offset);
                    cursor.push(TokenTree::Cons(op, Vec::new()));
                    let Some(TokenTree::Cons(_, children)) = cursor.last_mut() else {
                        unreachable!("an operator node was just pushed")
                    };
                    cursor = children;
                }
                TokenKind::Number | TokenKind::Invalid => {
                    cursor.push(TokenTree::Atom(token.literal));
                }
            }
        }

        Some(TokenTree::Cons(root_op, root_children))
    }

    fn source(&self) -> NamedSource<String> {
        named_source(self.filename, self.whole)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree(input: &str) -> TokenTree<'_> {
        Parser::new(None, input)
            .parse()
            .expect("valid input")
            .expect("non-empty input")
    }

    fn error(input: &str) -> GrammarError {
        match Parser::new(None, input).validate() {
            Verdict::Invalid(e) => e,
            other => panic!("expected {input:?} to be invalid, got {other:?}"),
        }
    }

    #[test]
    fn blank_input_is_no_input() {
        assert!(matches!(Parser::new(None, "").validate(), Verdict::NoInput));
        assert!(matches!(Parser::new(None, "   \t").validate(), Verdict::NoInput));
        assert_eq!(Parser::new(None, " ").validate().message(), "");
        assert_eq!(Parser::new(None, "").parse().ok().flatten(), None);
    }

    #[test]
    fn accepts_well_formed_expressions() {
        for input in ["sum 1 2 3", "sub 10 4", "sum 1 sub 5 2", "mul 2 div 4 0", "div 0 0"] {
            let verdict = Parser::new(None, input).validate();
            assert!(matches!(verdict, Verdict::Valid), "{input:?}: {verdict:?}");
            assert_eq!(verdict.message(), "expression valid!");
        }
    }

    #[test]
    fn single_token_is_always_invalid() {
        assert!(matches!(error("5"), GrammarError::MissingOperator { .. }));
        assert!(matches!(error("sum"), GrammarError::MissingOperand { .. }));
        assert!(matches!(error("x"), GrammarError::MissingOperand { .. }));
    }

    #[test]
    fn rejects_consecutive_operators() {
        let e = error("sum sum 1 2");
        assert!(matches!(
            e,
            GrammarError::ConsecutiveOperators {
                previous: Op::Sum,
                token: Op::Sum,
                ..
            }
        ));
        assert_eq!(e.span(), SourceSpan::from(4..7));
    }

    #[test]
    fn rejects_unknown_tokens() {
        let e = error("sum 1 x 2");
        assert!(matches!(e, GrammarError::UnknownToken { ref token, .. } if token == "x"));
        assert_eq!(e.span(), SourceSpan::from(6..7));
        assert!(matches!(error("sum -1 2"), GrammarError::UnknownToken { .. }));
        assert!(matches!(error("sum 1.5 2"), GrammarError::UnknownToken { .. }));
    }

    #[test]
    fn rejects_bad_ends() {
        assert!(matches!(error("1 sum 2"), GrammarError::MissingOperator { .. }));
        assert!(matches!(error("sum 1 2 sub"), GrammarError::MissingOperand { .. }));
        assert!(matches!(error("sum 1 x"), GrammarError::MissingOperand { .. }));
    }

    #[test]
    fn invalid_message_names_the_reason() {
        let verdict = Parser::new(None, "sum sum 1 2").validate();
        assert_eq!(verdict.validity(), Validity::Invalid);
        assert_eq!(verdict.message(), "invalid expression: two operators in a row");
    }

    #[test]
    fn operators_own_the_rest_of_the_stream() {
        assert_eq!(
            tree("sum 1 sub 5 2"),
            TokenTree::Cons(
                Op::Sum,
                vec![
                    TokenTree::Atom("1"),
                    TokenTree::Cons(Op::Sub, vec![TokenTree::Atom("5"), TokenTree::Atom("2")]),
                ]
            )
        );

        // the trailing `4` belongs to `mul`, not to `sum`
        assert_eq!(
            tree("sum 1 mul 2 3 4"),
            TokenTree::Cons(
                Op::Sum,
                vec![
                    TokenTree::Atom("1"),
                    TokenTree::Cons(
                        Op::Mul,
                        vec![
                            TokenTree::Atom("2"),
                            TokenTree::Atom("3"),
                            TokenTree::Atom("4"),
                        ]
                    ),
                ]
            )
        );
    }

    #[test]
    fn layers_are_breadth_first() {
        let layers = tree("sum 1 sub 2 3").layers();
        assert_eq!(
            layers,
            vec![
                vec![NodeValue::Operator(Op::Sum)],
                vec![NodeValue::Number("1"), NodeValue::Operator(Op::Sub)],
                vec![NodeValue::Number("2"), NodeValue::Number("3")],
            ]
        );
    }

    #[test]
    fn infix_expressions() {
        assert_eq!(tree("sum 1 2 3").expression(), "(1 + 2 + 3)");
        assert_eq!(tree("sub 10 4").expression(), "(10 - 4)");
        assert_eq!(tree("sum 1 sub 5 2").expression(), "(1 + (5 - 2))");
        assert_eq!(tree("mul 2 div 4 0").expression(), "(2 * (4 / 0))");
        assert_eq!(tree("div 007 2").expression(), "(007 / 2)");
    }

    #[test]
    fn single_operand_group() {
        assert_eq!(TokenTree::Cons(Op::Sub, vec![TokenTree::Atom("5")]).expression(), "(5)");
    }

    #[test]
    fn deep_trees_print_without_recursing() {
        let depth = 20_000;
        let input = format!("{}1", "sub 1 ".repeat(depth));
        let tree = tree(&input);
        assert_eq!(tree.layers().len(), depth + 1);

        let expression = tree.expression();
        assert!(expression.starts_with("(1 - (1 - "));
        assert!(expression.ends_with(&format!("(1 - 1){}", ")".repeat(depth - 1))));
        assert_eq!(tree.to_string(), input.trim_end());
    }

    #[test]
    fn prefix_display_reproduces_tokens() {
        let input = "  mul 2\t3 div 4   sum 1 1 ";
        let printed = tree(input).to_string();
        assert_eq!(printed, "mul 2 3 div 4 sum 1 1");
        assert_eq!(crate::lex::tokenize(&printed), crate::lex::tokenize(input));
    }
}
