use std::fs;
use std::io::Read;
use std::path::{Path, PathBuf};

use clap::Parser;
use clap::Subcommand;
use miette::IntoDiagnostic;
use miette::WrapErr;
use prefix_calc::{CompileResult, Lexer, Validity};

#[derive(Parser, Debug)]
#[command(version, about = "Compile prefix arithmetic like `sum 1 sub 5 2`")]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Print every token with its classification
    Tokenize { filename: PathBuf },
    /// Print the tree in prefix form followed by its layers
    Parse { filename: PathBuf },
    /// Print the fully parenthesized infix expression
    Expr { filename: PathBuf },
    /// Print the numeric result
    Evaluate { filename: PathBuf },
    /// Print every compiled artifact
    Compile { filename: PathBuf },
}

/// Reads the expression from `filename`, or from stdin when it is `-`.
fn read_source(filename: &Path) -> miette::Result<String> {
    if filename == Path::new("-") {
        let mut input = String::new();
        std::io::stdin()
            .read_to_string(&mut input)
            .into_diagnostic()
            .wrap_err("reading stdin failed")?;
        return Ok(input);
    }
    fs::read_to_string(filename)
        .into_diagnostic()
        .wrap_err_with(|| format!("reading `{}` failed", filename.display()))
}

fn compile_or_exit<'de>(
    filename: &'de str,
    contents: &'de str,
) -> miette::Result<CompileResult<'de>> {
    let mut compiled = prefix_calc::compile_named(Some(filename), contents)?;
    if let Some(diagnostic) = compiled.diagnostic.take() {
        eprintln!("{:?}", miette::Report::new(diagnostic));
        std::process::exit(65);
    }
    Ok(compiled)
}

fn main() -> miette::Result<()> {
    env_logger::init();

    let args = Args::parse();

    match args.command {
        Commands::Tokenize { filename } => {
            let file_contents = read_source(&filename)?;
            for token in Lexer::new(&file_contents) {
                println!("{token}");
            }
            println!("EOF  null");
        }
        Commands::Parse { filename } => {
            let file_contents = read_source(&filename)?;
            let name = filename.display().to_string();
            let compiled = compile_or_exit(&name, &file_contents)?;
            if let (Some(tree), Some(layers)) = (&compiled.tree, &compiled.layers) {
                println!("{tree}");
                for layer in layers {
                    let values: Vec<String> = layer.iter().map(|v| v.to_string()).collect();
                    println!("{}", values.join(" "));
                }
            }
        }
        Commands::Expr { filename } => {
            let file_contents = read_source(&filename)?;
            let name = filename.display().to_string();
            if let Some(expression) = compile_or_exit(&name, &file_contents)?.expression {
                println!("{expression}");
            }
        }
        Commands::Evaluate { filename } => {
            let file_contents = read_source(&filename)?;
            let name = filename.display().to_string();
            if let Some(result) = compile_or_exit(&name, &file_contents)?.result {
                println!("{result}");
            }
        }
        Commands::Compile { filename } => {
            let file_contents = read_source(&filename)?;
            let name = filename.display().to_string();
            let mut compiled = prefix_calc::compile_named(Some(&name), &file_contents)?;

            let validity = match compiled.validity {
                Validity::NoInput => "no input",
                Validity::Valid => "valid",
                Validity::Invalid => "invalid",
            };
            println!("validity: {validity}");
            println!("message: {}", compiled.validation_message);
            println!("tokens: [{}]", compiled.tokens.join(", "));
            if let Some(tree) = &compiled.tree {
                println!("tree: {tree}");
            }
            if let Some(layers) = &compiled.layers {
                for (depth, layer) in layers.iter().enumerate() {
                    let values: Vec<String> = layer.iter().map(|v| v.to_string()).collect();
                    println!("layer {depth}: [{}]", values.join(", "));
                }
            }
            if let Some(expression) = &compiled.expression {
                println!("expression: {expression}");
            }
            if let Some(result) = compiled.result {
                println!("result: {result}");
            }
            if let Some(diagnostic) = compiled.diagnostic.take() {
                eprintln!("{:?}", miette::Report::new(diagnostic));
                std::process::exit(65);
            }
        }
    }
    Ok(())
}
