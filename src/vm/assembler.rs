//! Assembler - Parses worker programs to bytecode, and back
//!
//! ## Assembly Syntax
//!
//! ```text
//! # Comments start with a hash, also after an instruction
//!
//!     LOAD A 5        # A := 5
//! loop:
//!     DEC A
//!     JNZ loop        # labels resolve to step indices
//!     MOVE
//! ```
//!
//! Mnemonics and register names are case-insensitive. Labels are case
//! sensitive and may be declared before or after their use. Every line
//! that is not blank, a comment or a label becomes exactly one step, so
//! jump targets are step indices rather than byte offsets. A literal step
//! index is accepted wherever a label is.
//!
//! Assembly runs in two passes: preprocessing collects labels and strips
//! non-instruction lines, then each instruction's parse rule appends its
//! bytes. Any error rejects the whole program.

use super::compiler::{compile, Program};
use super::instruction::{by_mnemonic, decode};
use super::labels::LabelTable;
use super::operand::{strip_comment, Operands};
use crate::error::CodeError;

/// Bytecode plus its label table. Self-contained and relocatable.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MachineCode {
    /// Packed instructions
    pub code: Vec<u8>,
    /// Label name <-> step index
    pub labels: LabelTable,
}

impl MachineCode {
    /// Number of steps the bytecode compiles to
    pub fn step_count(&self) -> Result<usize, CodeError> {
        decode(&self.code).try_fold(0, |count, decoded| decoded.map(|_| count + 1))
    }

    /// Compile into executable steps
    pub fn compile(&self) -> Result<Program, CodeError> {
        compile(&self.code)
    }

    /// Reconstruct normalized source lines
    pub fn disassemble(&self) -> Result<Vec<String>, CodeError> {
        disassemble(self)
    }

    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }
}

/// Assembler for worker programs
pub struct Assembler {
    /// Current line number (for error reporting)
    line_number: usize,
    /// Labels to step indices
    labels: LabelTable,
    /// Emitted bytecode
    code: Vec<u8>,
}

impl Assembler {
    pub fn new() -> Self {
        Self {
            line_number: 0,
            labels: LabelTable::new(),
            code: Vec::new(),
        }
    }

    pub fn assemble<S: AsRef<str>>(&mut self, lines: &[S]) -> Result<MachineCode, AssemblerError> {
        self.line_number = 0;
        self.labels = LabelTable::new();
        self.code.clear();

        let instructions = self.preprocess(lines)?;

        for (line_number, text) in &instructions {
            self.line_number = *line_number;
            self.parse_instruction(text)?;
        }

        log::debug!(
            "assembled {} instructions into {} bytes ({} labels)",
            instructions.len(),
            self.code.len(),
            self.labels.len()
        );

        Ok(MachineCode {
            code: std::mem::take(&mut self.code),
            labels: std::mem::take(&mut self.labels),
        })
    }

    /// Collect labels and return the instruction lines with their line numbers
    fn preprocess<'a, S: AsRef<str>>(
        &mut self,
        lines: &'a [S],
    ) -> Result<Vec<(usize, &'a str)>, AssemblerError> {
        let mut instructions = Vec::new();

        for (idx, line) in lines.iter().enumerate() {
            self.line_number = idx + 1;
            let line = strip_comment(line.as_ref()).trim();

            if line.is_empty() {
                continue;
            }

            if let Some(name) = line.strip_suffix(':') {
                self.declare_label(name.trim(), instructions.len())?;
                continue;
            }

            if instructions.len() >= u16::MAX as usize {
                return Err(self.error(format!(
                    "program has more than {} instructions",
                    u16::MAX
                )));
            }
            instructions.push((self.line_number, line));
        }

        Ok(instructions)
    }

    fn declare_label(&mut self, name: &str, step: usize) -> Result<(), AssemblerError> {
        if name.is_empty() {
            return Err(self.error("defined an empty label".to_string()));
        }
        if name.contains(char::is_whitespace) {
            return Err(self.error(format!("label '{}' must be a single word", name)));
        }
        if name.parse::<u16>().is_ok() {
            return Err(self.error(format!("label '{}' cannot be a number", name)));
        }
        if !self.labels.insert(name, step as u16) {
            return Err(self.error(format!("label '{}' defined twice", name)));
        }
        Ok(())
    }

    fn parse_instruction(&mut self, text: &str) -> Result<(), AssemblerError> {
        let (mnemonic, rest) = text
            .split_once(char::is_whitespace)
            .unwrap_or((text, ""));

        let def = by_mnemonic(mnemonic)
            .ok_or_else(|| self.error(format!("'{}' is not a valid command", mnemonic)))?;

        let mut operands = Operands::new(rest, def.mnemonic(), def.usage());
        let parsed = (def.parse)(def, &mut operands, &self.labels, &mut self.code);
        parsed.map_err(|message| self.error(message))?;
        operands.finish().map_err(|message| self.error(message))
    }

    /// Create an error at current line
    fn error(&self, message: String) -> AssemblerError {
        AssemblerError {
            line: self.line_number,
            message,
        }
    }
}

impl Default for Assembler {
    fn default() -> Self {
        Self::new()
    }
}

/// Assembler error
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssemblerError {
    /// 1-based source line
    pub line: usize,
    pub message: String,
}

impl std::fmt::Display for AssemblerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Line {}: {}", self.line, self.message)
    }
}

impl std::error::Error for AssemblerError {}

/// Convenience function to assemble source lines
pub fn assemble<S: AsRef<str>>(lines: &[S]) -> Result<MachineCode, AssemblerError> {
    Assembler::new().assemble(lines)
}

/// Assemble a whole source text
pub fn assemble_source(source: &str) -> Result<MachineCode, AssemblerError> {
    let lines: Vec<&str> = source.lines().collect();
    assemble(&lines)
}

/// Turn machine code back into source lines.
///
/// Output is normalized: upper-case mnemonics, single spaces, no comments,
/// decimal constants, and jump targets rendered as the first label (by
/// name) at that step. Label lines are re-inserted from the highest step
/// down so earlier insertions never shift later positions.
pub fn disassemble(machine_code: &MachineCode) -> Result<Vec<String>, CodeError> {
    let labels = &machine_code.labels;
    let mut lines = Vec::new();

    for decoded in decode(&machine_code.code) {
        let decoded = decoded?;
        lines.push((decoded.def.deparse)(decoded.def, decoded.bytes, labels));
    }

    let step_count = lines.len();
    for step in labels.steps_descending() {
        let position = step as usize;
        let names: Vec<&str> = labels.names_at(step).collect();
        if position > step_count {
            return Err(CodeError::LabelOutOfRange {
                name: names.first().map(|n| n.to_string()).unwrap_or_default(),
                step: position,
                len: step_count,
            });
        }
        for name in names.iter().rev() {
            lines.insert(position, format!("{}:", name));
        }
    }

    Ok(lines)
}
