//! antvm-validate - Pre-execution validation tool for worker programs
//!
//! # Usage
//!
//! ```bash
//! # Validate all .ant / .antm files in a directory (assembly only)
//! antvm-validate programs/
//!
//! # Also lint: unused labels, jumps off the end, loops that never yield
//! antvm-validate --lint programs/
//!
//! # Verbose output with step and label counts
//! antvm-validate -v programs/worker.ant
//! ```
//!
//! # Exit Codes
//!
//! - 0: All files validated successfully
//! - 1: One or more files failed to assemble or load
//! - 2: Invalid arguments or IO error

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;

use antvm::validate::{
    validate_directory_with_lint, validate_file_with_lint, DiagnosticLevel, ValidationResult,
    ValidationSummary,
};

#[derive(Parser, Debug)]
#[command(name = "antvm-validate")]
#[command(about = "Validate ant worker program files (.ant, .antm)")]
struct Args {
    /// Files or directories to validate (recursive for directories)
    #[arg(required = true)]
    paths: Vec<PathBuf>,

    /// Show step and label counts
    #[arg(short, long)]
    verbose: bool,

    /// Run lint checks after assembly
    #[arg(short, long)]
    lint: bool,
}

fn main() -> ExitCode {
    let args = match Args::try_parse() {
        Ok(args) => args,
        Err(e) if e.use_stderr() => {
            let _ = e.print();
            return ExitCode::from(2);
        }
        Err(e) => {
            // --help and --version
            let _ = e.print();
            return ExitCode::SUCCESS;
        }
    };

    let mut all_results = Vec::new();

    for path in &args.paths {
        if !path.exists() {
            eprintln!("Error: Path does not exist: {}", path.display());
            return ExitCode::from(2);
        }

        if path.is_file() {
            let result = validate_file_with_lint(path, args.lint);
            print_result(&result, args.verbose);
            all_results.push(result);
        } else if path.is_dir() {
            match validate_directory_with_lint(path, args.lint) {
                Ok(results) => {
                    for result in &results {
                        print_result(result, args.verbose);
                    }
                    all_results.extend(results);
                }
                Err(e) => {
                    eprintln!("Error reading directory {}: {}", path.display(), e);
                    return ExitCode::from(2);
                }
            }
        }
    }

    let summary = ValidationSummary::from_results(&all_results);
    eprintln!();
    summary.print_report();

    if summary.failed > 0 {
        ExitCode::FAILURE
    } else {
        ExitCode::SUCCESS
    }
}

fn print_result(result: &ValidationResult, verbose: bool) {
    match result {
        ValidationResult::Ok {
            path,
            machine_code,
            diagnostics,
        } => {
            let warned = diagnostics.iter().any(|d| d.level == DiagnosticLevel::Warning);
            let marker = if warned { "!" } else { "+" };

            if verbose {
                println!(
                    "{} {} ({} steps, {} labels, {} bytes)",
                    marker,
                    path.display(),
                    machine_code.step_count().unwrap_or(0),
                    machine_code.labels.len(),
                    machine_code.code.len()
                );
            } else {
                println!("{} {}", marker, path.display());
            }

            for d in diagnostics {
                eprintln!("    {}", d);
            }
        }
        ValidationResult::Err { path, error } => {
            eprintln!("x {}", path.display());
            match error.line {
                Some(line) => eprintln!("  line {}: {}", line, error.message),
                None => eprintln!("  {}", error.message),
            }
            if let Some(snippet) = &error.snippet {
                eprintln!("  | {}", snippet);
            }
        }
    }
}
