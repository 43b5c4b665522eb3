//! Validation utilities for worker program files
//!
//! Provides batch validation with detailed error reporting. Two levels:
//! - Assembly (always runs): syntax, operands, labels
//! - Lint (with `--lint`): unused labels, jumps off the end, loops that
//!   never yield to the world
//!
//! Text listings use the `.ant` extension, serialized machine code `.antm`.
//!
//! # Example
//!
//! ```ignore
//! use antvm::validate::{validate_directory, ValidationResult};
//!
//! for result in &validate_directory("programs")? {
//!     match result {
//!         ValidationResult::Ok { path, machine_code, .. } => {
//!             println!("+ {}: {} bytes", path.display(), machine_code.code.len());
//!         }
//!         ValidationResult::Err { path, error } => {
//!             eprintln!("x {}: {}", path.display(), error);
//!         }
//!     }
//! }
//! ```

use crate::vm::{assemble_source, decode, load_from_file, target_operand, AssemblerError, MachineCode};
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

/// Assembly listing extension
pub const SOURCE_EXTENSION: &str = "ant";
/// Serialized machine code extension
pub const BINARY_EXTENSION: &str = "antm";

/// Result of validating a single file
#[derive(Debug)]
pub enum ValidationResult {
    /// File assembled (or loaded) successfully
    Ok {
        path: PathBuf,
        machine_code: MachineCode,
        /// Lint findings (empty if lint did not run)
        diagnostics: Vec<Diagnostic>,
    },
    /// File failed to assemble or load
    Err {
        path: PathBuf,
        error: ValidationError,
    },
}

impl ValidationResult {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn is_err(&self) -> bool {
        !self.is_ok()
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::Ok { path, .. } => path,
            Self::Err { path, .. } => path,
        }
    }

    /// Lint diagnostics (empty for Err variant)
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::Ok { diagnostics, .. } => diagnostics,
            Self::Err { .. } => &[],
        }
    }
}

/// Validation error with context
#[derive(Debug, Clone)]
pub struct ValidationError {
    /// Line number (if available)
    pub line: Option<usize>,
    pub message: String,
    /// Offending source line (if available)
    pub snippet: Option<String>,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(line) = self.line {
            write!(f, "line {}: {}", line, self.message)?;
        } else {
            write!(f, "{}", self.message)?;
        }
        if let Some(snippet) = &self.snippet {
            write!(f, "\n  | {}", snippet)?;
        }
        Ok(())
    }
}

impl From<AssemblerError> for ValidationError {
    fn from(e: AssemblerError) -> Self {
        Self {
            line: Some(e.line),
            message: e.message,
            snippet: None,
        }
    }
}

impl From<std::io::Error> for ValidationError {
    fn from(e: std::io::Error) -> Self {
        Self {
            line: None,
            message: e.to_string(),
            snippet: None,
        }
    }
}

/// Lint severity
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    /// Runs, but probably not as intended
    Warning,
    /// Worth knowing, no action needed
    Info,
}

/// A single lint finding
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    /// Step index the finding refers to (if any)
    pub step: Option<usize>,
    pub message: String,
}

impl Diagnostic {
    fn warning(step: Option<usize>, message: String) -> Self {
        Self {
            level: DiagnosticLevel::Warning,
            step,
            message,
        }
    }

    fn info(step: Option<usize>, message: String) -> Self {
        Self {
            level: DiagnosticLevel::Info,
            step,
            message,
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.level {
            DiagnosticLevel::Warning => "WARN",
            DiagnosticLevel::Info => "INFO",
        };
        match self.step {
            Some(step) => write!(f, "[{}] step {}: {}", level, step, self.message),
            None => write!(f, "[{}] {}", level, self.message),
        }
    }
}

/// Static checks over assembled machine code
pub fn lint(machine_code: &MachineCode) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();
    let mut targets = BTreeSet::new();
    let mut world_steps = 0;
    let mut backward_jump = false;
    let mut steps = 0;

    for (step, decoded) in decode(&machine_code.code).enumerate() {
        let Ok(decoded) = decoded else {
            // Malformed bytecode is reported by assembly/loading
            return diagnostics;
        };
        steps += 1;
        if decoded.def.ticks > 0 {
            world_steps += 1;
        }
        if decoded.def.opcode.takes_target() {
            let target = target_operand(decoded.bytes);
            targets.insert(target);
            if target as usize <= step {
                backward_jump = true;
            }
        }
    }

    for target in &targets {
        if *target as usize >= steps {
            diagnostics.push(Diagnostic::info(
                Some(*target as usize),
                format!("jump to step {} past the last step ends the program", target),
            ));
        }
    }

    for (name, step) in machine_code.labels.iter() {
        if !targets.contains(&step) {
            diagnostics.push(Diagnostic::warning(
                Some(step as usize),
                format!("label '{}' is never jumped to", name),
            ));
        }
    }

    if world_steps == 0 && backward_jump {
        diagnostics.push(Diagnostic::warning(
            None,
            "program loops without MOVE, DIG or CHK and spends its step budget every tick"
                .to_string(),
        ));
    }

    diagnostics
}

/// Validate a single file (assembly only)
pub fn validate_file<P: AsRef<Path>>(path: P) -> ValidationResult {
    validate_file_with_lint(path, false)
}

/// Validate a single file, optionally linting it.
///
/// `.antm` files are loaded as serialized machine code, anything else is
/// assembled as text.
pub fn validate_file_with_lint<P: AsRef<Path>>(path: P, run_lint: bool) -> ValidationResult {
    let path = path.as_ref().to_path_buf();

    let loaded = if path.extension().map_or(false, |e| e == BINARY_EXTENSION) {
        load_from_file(&path).map_err(|e| ValidationError {
            line: None,
            message: format!("{:#}", e),
            snippet: None,
        })
    } else {
        assemble_file(&path)
    };

    match loaded {
        Ok(machine_code) => {
            let diagnostics = if run_lint {
                lint(&machine_code)
            } else {
                Vec::new()
            };
            ValidationResult::Ok {
                path,
                machine_code,
                diagnostics,
            }
        }
        Err(error) => ValidationResult::Err { path, error },
    }
}

fn assemble_file(path: &Path) -> Result<MachineCode, ValidationError> {
    let source = std::fs::read_to_string(path)?;
    assemble_source(&source).map_err(|e| {
        let snippet = source
            .lines()
            .nth(e.line.saturating_sub(1))
            .map(|s| s.trim().to_string());
        ValidationError {
            snippet,
            ..ValidationError::from(e)
        }
    })
}

/// Validate all program files in a directory (recursive, assembly only)
pub fn validate_directory<P: AsRef<Path>>(dir: P) -> std::io::Result<Vec<ValidationResult>> {
    validate_directory_with_lint(dir, false)
}

/// Validate all program files in a directory, optionally linting them
pub fn validate_directory_with_lint<P: AsRef<Path>>(
    dir: P,
    run_lint: bool,
) -> std::io::Result<Vec<ValidationResult>> {
    let mut results = Vec::new();
    validate_directory_recursive(dir.as_ref(), run_lint, &mut results)?;

    // Sort by path for consistent output
    results.sort_by(|a, b| a.path().cmp(b.path()));

    Ok(results)
}

fn validate_directory_recursive(
    dir: &Path,
    run_lint: bool,
    results: &mut Vec<ValidationResult>,
) -> std::io::Result<()> {
    if !dir.is_dir() {
        return Ok(());
    }

    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();

        if path.is_dir() {
            validate_directory_recursive(&path, run_lint, results)?;
        } else if path
            .extension()
            .map_or(false, |e| e == SOURCE_EXTENSION || e == BINARY_EXTENSION)
        {
            results.push(validate_file_with_lint(&path, run_lint));
        }
    }

    Ok(())
}

/// Summary of validation results
#[derive(Debug, Default)]
pub struct ValidationSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    pub errors: Vec<(PathBuf, ValidationError)>,
    pub warnings: usize,
    pub infos: usize,
}

impl ValidationSummary {
    pub fn from_results(results: &[ValidationResult]) -> Self {
        let mut summary = Self {
            total: results.len(),
            ..Self::default()
        };

        for result in results {
            match result {
                ValidationResult::Ok { diagnostics, .. } => {
                    summary.passed += 1;
                    for d in diagnostics {
                        match d.level {
                            DiagnosticLevel::Warning => summary.warnings += 1,
                            DiagnosticLevel::Info => summary.infos += 1,
                        }
                    }
                }
                ValidationResult::Err { path, error } => {
                    summary.failed += 1;
                    summary.errors.push((path.clone(), error.clone()));
                }
            }
        }

        summary
    }

    /// Print summary to stderr
    pub fn print_report(&self) {
        if !self.errors.is_empty() {
            eprintln!("\n{} ASSEMBLY ERRORS:", self.errors.len());
            for (path, error) in &self.errors {
                eprintln!("\n  {}", path.display());
                match error.line {
                    Some(line) => eprintln!("    line {}: {}", line, error.message),
                    None => eprintln!("    {}", error.message),
                }
                if let Some(snippet) = &error.snippet {
                    eprintln!("    | {}", snippet);
                }
            }
            eprintln!();
        }

        eprintln!(
            "Validated {} files: {} passed, {} failed",
            self.total, self.passed, self.failed
        );

        if self.warnings + self.infos > 0 {
            eprintln!("Lint: {} warnings, {} info", self.warnings, self.infos);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{assemble, save_to_file};
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_validate_valid_source() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "# wander\nwalk:\n    MOVE\n    JMP walk\n").unwrap();

        let result = validate_file(file.path());
        assert!(result.is_ok());
        assert!(result.diagnostics().is_empty());
    }

    #[test]
    fn test_validate_invalid_source() {
        let mut file = NamedTempFile::new().unwrap();
        write!(file, "LOAD A 1\n\n  FLY A\n").unwrap();

        match validate_file(file.path()) {
            ValidationResult::Err { error, .. } => {
                assert_eq!(error.line, Some(3));
                assert!(error.message.contains("FLY"));
                assert_eq!(error.snippet.as_deref(), Some("FLY A"));
            }
            other => panic!("expected an error, got {:?}", other),
        }
    }

    #[test]
    fn test_lint_findings() {
        let machine_code = assemble(&["spin:", "INC A", "JMP spin", "spare:", "JMP 9"]).unwrap();
        let diagnostics = lint(&machine_code);

        assert!(diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warning && d.message.contains("'spare'")));
        assert!(diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Warning && d.message.contains("step budget")));
        assert!(diagnostics
            .iter()
            .any(|d| d.level == DiagnosticLevel::Info && d.step == Some(9)));
        assert!(!diagnostics.iter().any(|d| d.message.contains("'spin'")));
    }

    #[test]
    fn test_lint_quiet_for_yielding_loop() {
        let machine_code = assemble(&["walk:", "MOVE", "JMP walk"]).unwrap();
        assert!(lint(&machine_code).is_empty());
    }

    #[test]
    fn test_directory_and_summary() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("good.ant"), "unused:\nNOP\n").unwrap();
        std::fs::write(dir.path().join("bad.ant"), "JMP nowhere\n").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "not a program").unwrap();
        let nested = dir.path().join("nested");
        std::fs::create_dir(&nested).unwrap();
        save_to_file(&assemble(&["DIG"]).unwrap(), nested.join("digger.antm")).unwrap();

        let results = validate_directory_with_lint(dir.path(), true).unwrap();
        assert_eq!(results.len(), 3);

        let summary = ValidationSummary::from_results(&results);
        assert_eq!(summary.total, 3);
        assert_eq!(summary.passed, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.warnings, 1);
        assert!(summary.errors[0].1.message.contains("nowhere"));
    }

    #[test]
    fn test_corrupt_binary() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.antm");
        std::fs::write(&path, b"ANTMxx").unwrap();
        let result = validate_file(&path);
        assert!(result.is_err());
    }
}
