//! Command-line interface.

use std::collections::HashSet;
use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::analysis;
use crate::error::PieError;
use crate::interpreter::Interpreter;
use crate::lexer;
use crate::parser;
use crate::preprocessor;
use crate::registry::OperatorRegistry;

#[derive(Parser)]
#[command(name = "pie")]
#[command(about = "Interpreter for the Pie expression language", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Disable ANSI colors in diagnostic output.
    #[arg(long, global = true)]
    pub no_color: bool,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run a Pie source file (pass `-` to read from stdin).
    Run {
        path: String,
        /// Evaluate this source string instead of reading a file.
        #[arg(short = 'e', long)]
        eval: Option<String>,
    },
    /// Scope-check a Pie source file without evaluating it.
    Check { path: String },
}

/// Entry point for the CLI; `main` turns an `Err` into a printed diagnostic
/// and a non-zero exit code.
pub fn run_cli() -> Result<(), String> {
    let cli = Cli::parse();
    let color = !cli.no_color;

    match cli.command {
        Commands::Run { path, eval } => cmd_run(&path, eval, color),
        Commands::Check { path } => cmd_check(&path, color),
    }
}

fn cmd_run(path: &str, eval: Option<String>, color: bool) -> Result<(), String> {
    let source = match eval {
        Some(src) => src,
        None => read_source(path)?,
    };

    let mut include_set = HashSet::new();
    let preprocessed =
        preprocessor::preprocess(source, &PathBuf::from(path), &mut include_set, false)
            .map_err(|e| e.0)?;

    let tokens = lexer::lex(&preprocessed).map_err(|e| render(&e, &preprocessed, color))?;
    let (items, registry) = parser::parse(tokens).map_err(|e| render(&e, &preprocessed, color))?;

    let mut interp = Interpreter::new(registry);
    match interp.run_program(&items) {
        Ok(Some(value)) => {
            println!("{}", value);
            Ok(())
        }
        Ok(None) => Ok(()),
        Err(e) => Err(render(&e, &preprocessed, color)),
    }
}

fn cmd_check(path: &str, color: bool) -> Result<(), String> {
    let source = read_source(path)?;
    let mut include_set = HashSet::new();
    let preprocessed =
        preprocessor::preprocess(source, &PathBuf::from(path), &mut include_set, false)
            .map_err(|e| e.0)?;

    let tokens = lexer::lex(&preprocessed).map_err(|e| render(&e, &preprocessed, color))?;
    let (items, _registry): (Vec<_>, OperatorRegistry) =
        parser::parse(tokens).map_err(|e| render(&e, &preprocessed, color))?;

    analysis::check_program(&items).map_err(|e| render(&e, &preprocessed, color))?;
    println!("ok");
    Ok(())
}

fn read_source(path: &str) -> Result<String, String> {
    if path == "-" {
        let mut buf = String::new();
        io::stdin()
            .read_to_string(&mut buf)
            .map_err(|e| format!("failed to read stdin: {}", e))?;
        Ok(buf)
    } else {
        fs::read_to_string(path).map_err(|e| format!("failed to read '{}': {}", path, e))
    }
}

fn render(err: &PieError, source: &str, color: bool) -> String {
    err.render(source, color)
}

/// Writes a rendered diagnostic to stderr, used by `main` so it never
/// competes with a program's own stdout for terminal ordering.
pub fn eprint_error(s: &str) {
    let _ = writeln!(io::stderr(), "{}", s);
}
