use clap::{Parser as ClapParser, Subcommand};
use kolt::bench;
use kolt::interpreter::Interpreter;
use kolt::optimizer::optimize;
use kolt::parser::{
    Input, ParseError, Parser, Spanned, Statement, Stream, Token, lexer, parser, resolve, span_at,
};
use kolt::report;
use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

#[derive(ClapParser)]
#[command(name = "kolt")]
#[command(about = "Kolt language CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a Kolt file
    Run {
        /// Path to .kolt file
        file: PathBuf,
        /// Skip constant folding and dead-code elimination
        #[arg(long)]
        no_optimize: bool,
        /// Arguments handed to the program's main function
        args: Vec<String>,
    },
    /// Evaluate inline Kolt code
    Eval {
        /// The code to evaluate
        code: String,
        /// Skip constant folding and dead-code elimination
        #[arg(long)]
        no_optimize: bool,
    },
    /// Check that a file lexes, parses and resolves
    Check {
        /// Path to .kolt file
        file: PathBuf,
        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },
    /// Time a million variable reads across nested scopes
    Bench,
}

fn main() {
    env_logger::Builder::from_default_env().init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run {
            file,
            no_optimize,
            args,
        } => {
            if !has_kolt_extension(&file) {
                eprintln!("Error: Kolt only supports .kolt files");
                std::process::exit(1);
            }
            match fs::read_to_string(&file) {
                Ok(code) => {
                    run_code(&code, &file.display().to_string(), !no_optimize, &args);
                }
                Err(e) => {
                    eprintln!("Error reading file: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Eval { code, no_optimize } => {
            run_code(&code, "<eval>", !no_optimize, &[]);
        }
        Commands::Check { file, json } => {
            if !has_kolt_extension(&file) {
                eprintln!("Error: Kolt only supports .kolt files");
                std::process::exit(1);
            }
            match fs::read_to_string(&file) {
                Ok(code) => check_code(&code, &file.display().to_string(), json),
                Err(e) => {
                    eprintln!("Error reading file: {e}");
                    std::process::exit(1);
                }
            }
        }
        Commands::Bench => run_bench(),
    }
}

fn has_kolt_extension(file: &Path) -> bool {
    file.extension().is_some_and(|extension| extension == "kolt")
}

fn run_code(code: &str, filename: &str, optimize_enabled: bool, args: &[String]) {
    let Some(statements) = parse_code(code, filename) else {
        std::process::exit(1);
    };
    let statements = if optimize_enabled {
        optimize(statements)
    } else {
        statements
    };

    let resolved = match resolve(statements) {
        Ok(resolved) => resolved,
        Err(errors) => {
            report_diagnostics(filename, code, &errors);
            std::process::exit(1);
        }
    };
    report::write_warning_reports(filename, code, &resolved.warnings, &mut io::stderr()).ok();

    let mut interpreter = Interpreter::new();
    if let Err(error) = interpreter.interpret(&resolved.statements, args) {
        eprintln!("Runtime error: {error}");
        std::process::exit(1);
    }
}

/// Lexes and parses `code`, printing annotated reports for anything wrong.
/// Comments are stripped between the two stages.
fn parse_code<'code>(code: &'code str, filename: &str) -> Option<Vec<Spanned<Statement<'code>>>> {
    let (tokens, lex_errors) = lexer().parse(code).into_output_errors();
    if !lex_errors.is_empty() {
        report_diagnostics(filename, code, &lex_errors);
        return None;
    }
    let Some(mut tokens) = tokens else {
        eprintln!("No tokens from lexer");
        return None;
    };

    tokens.retain(|token| !matches!(token.node, Token::Comment(_)));
    // An owning input: the statements must outlive the token buffer
    let input = Stream::from_iter(tokens)
        .map(span_at(code.len()), |Spanned { node, span }| (node, span));

    let (statements, parse_errors) = parser().parse(input).into_output_errors();
    if !parse_errors.is_empty() {
        report_diagnostics(filename, code, &parse_errors);
        return None;
    }
    let Some(statements) = statements else {
        eprintln!("No statements from parser");
        return None;
    };
    Some(statements)
}

fn check_code(code: &str, filename: &str, json: bool) {
    // Check reports on the code as written, so the optimizer stays out
    let Some(statements) = parse_code(code, filename) else {
        if json {
            println!(
                "{}",
                serde_json::json!({
                    "status": "error",
                    "error": "Parsing failed"
                })
            );
        }
        std::process::exit(1);
    };

    match resolve(statements) {
        Ok(resolved) => {
            report::write_warning_reports(filename, code, &resolved.warnings, &mut io::stderr())
                .ok();
            if json {
                let warnings: Vec<String> = resolved
                    .warnings
                    .iter()
                    .map(|warning| warning.to_string())
                    .collect();
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "ok",
                        "statements": resolved.statements.len(),
                        "warnings": warnings,
                    })
                );
            } else {
                eprintln!(
                    "Check OK: {} top-level statements, {} warnings",
                    resolved.statements.len(),
                    resolved.warnings.len()
                );
            }
        }
        Err(errors) => {
            report_diagnostics(filename, code, &errors);
            if json {
                println!(
                    "{}",
                    serde_json::json!({
                        "status": "error",
                        "error": format!("{} resolve errors", errors.len())
                    })
                );
            }
            std::process::exit(1);
        }
    }
}

fn run_bench() {
    match bench::run() {
        Ok(report) => {
            log::debug!(
                "{} scoped reads took {}ms",
                report.iterations,
                report.elapsed_ms
            );
        }
        Err(error) => {
            eprintln!("Benchmark error: {error}");
            std::process::exit(1);
        }
    }
}

fn report_diagnostics<T: fmt::Display>(
    filename: &str,
    code: &str,
    errors: &[ParseError<'_, T>],
) {
    report::write_error_reports(filename, code, errors, &mut io::stderr()).ok();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_kolt_files_pass_the_extension_gate() {
        assert!(has_kolt_extension(Path::new("demos/benchmark_scope.kolt")));
        assert!(!has_kolt_extension(Path::new("script.kt")));
        assert!(!has_kolt_extension(Path::new("no_extension")));
        assert!(!has_kolt_extension(Path::new("archive.kolt.bak")));
    }
}
