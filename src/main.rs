use std::path::PathBuf;

use clap::{CommandFactory, Parser as ClapParser, error::ErrorKind};
use colored::Colorize;

use siriusc::{
    SourceFile, SourceFileOrigin,
    frontend::{lexer, parser::Parser},
    middle::{
        analyze::SemanticAnalyzer,
        optimization,
        tac::{ast_lowering::TacGenerator, pretty_print::pretty_print_tac, render_lines},
    },
};

#[derive(Debug, ClapParser)]
#[command(version, about, long_about = None)]
pub struct Args {
    source_files: Vec<PathBuf>,

    /// Dump the token list before parsing
    #[arg(long)]
    tokens: bool,

    /// Dump the syntax tree after parsing
    #[arg(long)]
    ast: bool,

    /// Skip the optimization advisor
    #[arg(long)]
    no_advice: bool,
}

fn main() {
    let args = Args::parse();

    if args.source_files.is_empty() {
        Args::command()
            .error(ErrorKind::MissingRequiredArgument, "Missing source files!")
            .exit();
    }

    for source_file in &args.source_files {
        if !source_file.exists() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Source file '{}' does not exist!", source_file.display()),
                )
                .exit()
        }

        if !source_file.is_file() {
            Args::command()
                .error(
                    ErrorKind::InvalidValue,
                    format!("Input path '{}' is not a file!", source_file.display()),
                )
                .exit()
        }
    }

    /* Read in source files */

    let source_files = args
        .source_files
        .iter()
        .map(|path| {
            let contents = std::fs::read_to_string(path)
                .expect("Failed to read input file (or invalid UTF-8)");

            SourceFile {
                contents,
                origin: SourceFileOrigin::File(path.clone()),
            }
        })
        .collect::<Vec<_>>();

    for source_file in &source_files {
        if compile(source_file, &args).is_err() {
            std::process::exit(1);
        }
    }
}

fn compile(source_file: &SourceFile, args: &Args) -> Result<(), ()> {
    let tokens = match lexer::tokenize(source_file) {
        Ok(tokens) => tokens,
        Err(error) => {
            eprintln!("{} {error} ({})", "error:".red().bold(), source_file.origin);
            return Err(());
        }
    };

    if args.tokens {
        for token in &tokens {
            println!(
                "{:?} `{}` (line {}, column {})",
                token.kind,
                source_file.value_of_span(token.span),
                token.line,
                token.column
            );
        }
    }

    let program = match Parser::parse(source_file, tokens) {
        Ok(program) => program,
        Err(error) => {
            eprintln!("{} {error} ({})", "error:".red().bold(), source_file.origin);
            return Err(());
        }
    };

    if args.ast {
        println!("{program:#?}");
    }

    // Semantic errors come back as a complete list so the user can fix many
    // issues per run instead of one at a time
    let errors = SemanticAnalyzer::analyze(source_file, &program);

    if !errors.is_empty() {
        for error in &errors {
            eprintln!("{} {error} ({})", "error:".red().bold(), source_file.origin);
        }

        return Err(());
    }

    let instructions = TacGenerator::generate(&program);

    pretty_print_tac(&instructions);

    if !args.no_advice {
        let advice = optimization::advise(&render_lines(&instructions));

        if !advice.is_empty() {
            println!();
            println!("{}", "optimization advice:".bold());

            for advisory in &advice {
                println!("  {} {advisory}", "-".cyan());
            }
        }
    }

    Ok(())
}
