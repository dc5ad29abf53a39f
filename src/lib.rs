pub mod eval;
pub mod lex;
pub mod parse;

pub use eval::{Evaluator, evaluate};
pub use lex::{Lexer, Op, Token, TokenKind, tokenize};
pub use parse::{GrammarError, Infix, NodeValue, Parser, TokenTree, Validity, Verdict};

/// Every artifact derived from one input string.
///
/// `tree`, `layers`, `expression` and `result` are only present when the
/// input is valid; `tokens` is always filled in.
#[derive(Debug)]
pub struct CompileResult<'de> {
    pub validity: Validity,
    pub validation_message: String,
    pub diagnostic: Option<GrammarError>,
    pub tokens: Vec<&'de str>,
    pub tree: Option<TokenTree<'de>>,
    pub layers: Option<Vec<Vec<NodeValue<'de>>>>,
    pub expression: Option<String>,
    pub result: Option<f64>,
}

/// Runs the whole pipeline: tokenize, validate, build, serialize, generate and evaluate.
pub fn compile(input: &str) -> miette::Result<CompileResult<'_>> {
    compile_named(None, input)
}

/// Like [`compile`], with `filename` used to label diagnostics.
pub fn compile_named<'de>(
    filename: Option<&'de str>,
    input: &'de str,
) -> miette::Result<CompileResult<'de>> {
    let parser = Parser::new(filename, input);
    let tokens = parser.tokens().iter().map(|token| token.literal).collect();

    let verdict = parser.validate();
    let validity = verdict.validity();
    let validation_message = verdict.message();

    let mut compiled = CompileResult {
        validity,
        validation_message,
        diagnostic: None,
        tokens,
        tree: None,
        layers: None,
        expression: None,
        result: None,
    };

    match verdict {
        Verdict::NoInput => {}
        Verdict::Invalid(e) => compiled.diagnostic = Some(e),
        Verdict::Valid => {
            let Some(tree) = parser.build() else {
                unreachable!("validated tokens start with an operator")
            };
            let expression = tree.expression();
            log::debug!("generated `{expression}`");
            let result = evaluate(&expression)?;

            compiled.layers = Some(tree.layers());
            compiled.tree = Some(tree);
            compiled.expression = Some(expression);
            compiled.result = Some(result);
        }
    }

    Ok(compiled)
}
