//! Error types for antvm

use crate::vm::AssemblerError;
use thiserror::Error;

/// Bytecode that cannot be compiled or disassembled
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodeError {
    /// Header byte names no catalogue entry
    #[error("Unknown opcode {opcode} at byte {offset}")]
    UnknownOpcode { offset: usize, opcode: u8 },

    /// Instruction runs past the end of the buffer
    #[error("Truncated {mnemonic} at byte {offset}: needs {needed} bytes, {available} available")]
    Truncated {
        offset: usize,
        mnemonic: &'static str,
        needed: usize,
        available: usize,
    },

    /// Label points beyond the last step
    #[error("Label '{name}' points at step {step} but the program has {len} steps")]
    LabelOutOfRange { name: String, step: usize, len: usize },
}

/// antvm error type
#[derive(Debug, Error)]
pub enum AntvmError {
    /// Program text rejected by the assembler
    #[error("Assembly error: {0}")]
    Assembly(#[from] AssemblerError),

    /// Bytecode rejected by the compiler
    #[error("Code error: {0}")]
    Code(#[from] CodeError),

    /// No actor with this id
    #[error("Unknown actor: {0}")]
    UnknownActor(u32),

    /// The program library has no draft to hand out
    #[error("Program library has no program to assign")]
    EmptyProgram,

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Worker pool could not be started
    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, AntvmError>;
