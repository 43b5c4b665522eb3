//! Ant VM - Bytecode virtual machine for worker programs
//!
//! Programs are written as short assembly listings, assembled to packed
//! bytecode, and compiled to one executable step per instruction line.
//! Each worker owns a [`Cpu`] and a [`ProgramScheduler`] that advances its
//! steps once per world tick.
//!
//! ## Pipeline
//!
//! ```text
//! text lines ──assemble──▶ MachineCode { code, labels } ──compile──▶ Program [Step]
//!      ▲                          │                                     │
//!      └───────disassemble────────┘                       ProgramScheduler + Cpu
//! ```
//!
//! ## Step costs
//!
//! ```text
//! ticks == 0   local: registers, stack, flags, heading, scent state
//!              runs in the async phase, many per tick, in parallel
//! ticks  > 0   MOVE (1), DIG (2), CHK (1)
//!              runs in the sync phase, at most one per tick, serialized
//! ```
//!
//! ## Example Assembly
//!
//! ```text
//! # wander until blocked, then dig
//!     SWN A
//! walk:
//!     MOVE
//!     JNF walk
//!     DIG
//!     JNF walk
//!     RT
//!     JMP walk
//! ```

mod assembler;
mod binary;
mod compiler;
pub mod hot_reload;
mod instruction;
mod labels;
mod opcode;
mod operand;
mod register;
mod scent;
mod scheduler;

pub use assembler::{assemble, assemble_source, disassemble, Assembler, AssemblerError, MachineCode};
pub use binary::{deserialize, load_from_file, save_to_file, serialize, Header, HEADER_SIZE};
pub use compiler::{compile, Effect, Program, Step};
pub use hot_reload::{ProgramWatcher, ReloadEvent};
pub use instruction::{
    by_mnemonic, by_opcode, catalogue, decode, target_operand, Decoded, Decoder, InstructionDef, OperandShape,
};
pub use labels::LabelTable;
pub use opcode::Opcode;
pub use register::{Cpu, Heading, Reg};
pub use scent::{channel_name, parse_channel, ScentLevels, ScentState};
pub use scheduler::{ProgramScheduler, SchedulerState};

/// Magic bytes for machine code blobs
pub const MACHINE_CODE_MAGIC: [u8; 4] = [0x41, 0x4E, 0x54, 0x4D]; // "ANTM"

/// Current version of the machine code format
pub const MACHINE_CODE_VERSION: u16 = 0x0001;

/// Words of private stack memory per worker
pub const RAM_WORDS: usize = 64;

/// Default cap on local steps per worker per tick
pub const DEFAULT_STEP_BUDGET: usize = 500;

/// Number of scent channels (`A`-`H`)
pub const SCENT_CHANNELS: usize = 8;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_roundtrip() {
        let source = ["SWN A", "walk:", "MOVE", "JNF walk", "DIG", "JNF walk", "RT", "JMP walk"];
        let machine_code = assemble(&source).unwrap();

        let bytes = serialize(&machine_code).unwrap();
        let restored = deserialize(&bytes).unwrap();
        assert_eq!(restored, machine_code);

        let program = restored.compile().unwrap();
        assert_eq!(program.len(), 7);
        assert_eq!(restored.disassemble().unwrap(), source);
    }

    #[test]
    fn test_magic() {
        assert_eq!(&MACHINE_CODE_MAGIC, b"ANTM");
    }
}
