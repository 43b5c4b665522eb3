//! Opcode - Instruction identifiers for the ant VM
//!
//! Every instruction starts with a header byte. The opcode lives in the
//! high 5 bits, leaving 3 bits for small operands:
//!
//! ```text
//! [OPCODE:5][OPERAND:3]  [EXTRA BYTES...]
//! ```
//!
//! | Range | Category      | Opcodes                                  |
//! |-------|---------------|------------------------------------------|
//! | 0-1   | System/World  | NOP, MOVE                                |
//! | 2-7   | Arithmetic    | LOAD, COPY, ADD, SUB, INC, DEC           |
//! | 8-12  | Control Flow  | JMP, JNZ, JNF, CALL, RET                 |
//! | 13-14 | Stack         | PUSH, POP                                |
//! | 15-18 | Body          | LT, RT, DIG, CHK                         |
//! | 19-22 | Scent         | SRT, SWP, SWN, SWF                       |

use std::fmt;

/// Instruction opcode (5 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Opcode(pub u8);

impl Opcode {
    /// No operation
    pub const NOP: Self = Self(0);
    /// Request a step forward along the heading
    pub const MOVE: Self = Self(1);
    /// reg := constant
    pub const LOAD: Self = Self(2);
    /// dst := src
    pub const COPY: Self = Self(3);
    /// dst := dst + src
    pub const ADD: Self = Self(4);
    /// dst := dst - src
    pub const SUB: Self = Self(5);
    /// reg := reg + 1
    pub const INC: Self = Self(6);
    /// reg := reg - 1
    pub const DEC: Self = Self(7);

    // =========================================================================
    // Control Flow
    // =========================================================================

    /// Unconditional jump
    pub const JMP: Self = Self(8);
    /// Jump if zero flag is clear
    pub const JNZ: Self = Self(9);
    /// Jump if failed flag is clear
    pub const JNF: Self = Self(10);
    /// Push return address and base pointer, then jump
    pub const CALL: Self = Self(11);
    /// Return from CALL
    pub const RET: Self = Self(12);

    // =========================================================================
    // Stack
    // =========================================================================

    pub const PUSH: Self = Self(13);
    pub const POP: Self = Self(14);

    // =========================================================================
    // Body
    // =========================================================================

    /// Turn 90 degrees left
    pub const LT: Self = Self(15);
    /// Turn 90 degrees right
    pub const RT: Self = Self(16);
    /// Request digging the tile ahead
    pub const DIG: Self = Self(17);
    /// Check whether the tile ahead is open
    pub const CHK: Self = Self(18);

    // =========================================================================
    // Scent
    // =========================================================================

    /// Turn towards the strongest weighted scent
    pub const SRT: Self = Self(19);
    /// Set reaction priority of a scent channel
    pub const SWP: Self = Self(20);
    /// Start laying scent on a channel
    pub const SWN: Self = Self(21);
    /// Stop laying scent
    pub const SWF: Self = Self(22);

    /// Number of defined opcodes
    pub const COUNT: usize = 23;

    /// All opcodes in numeric order
    pub const ALL: [Self; Self::COUNT] = [
        Self::NOP, Self::MOVE, Self::LOAD, Self::COPY, Self::ADD, Self::SUB,
        Self::INC, Self::DEC, Self::JMP, Self::JNZ, Self::JNF, Self::CALL,
        Self::RET, Self::PUSH, Self::POP, Self::LT, Self::RT, Self::DIG,
        Self::CHK, Self::SRT, Self::SWP, Self::SWN, Self::SWF,
    ];

    /// Extract the opcode from an instruction header byte
    pub const fn from_header(byte: u8) -> Self {
        Self(byte >> 3)
    }

    /// Build a header byte from this opcode and 3 operand bits
    pub const fn header(&self, operand: u8) -> u8 {
        (self.0 << 3) | (operand & 0x07)
    }

    /// Check if the opcode is defined
    pub const fn is_defined(&self) -> bool {
        (self.0 as usize) < Self::COUNT
    }

    /// Check if this instruction writes the program counter
    pub const fn modifies_pc(&self) -> bool {
        matches!(self.0, 8..=12)
    }

    /// Check if this instruction takes a jump target operand
    pub const fn takes_target(&self) -> bool {
        matches!(self.0, 8..=11)
    }

    /// Get the assembly mnemonic
    pub fn name(&self) -> &'static str {
        match *self {
            Self::NOP => "NOP",
            Self::MOVE => "MOVE",
            Self::LOAD => "LOAD",
            Self::COPY => "COPY",
            Self::ADD => "ADD",
            Self::SUB => "SUB",
            Self::INC => "INC",
            Self::DEC => "DEC",
            Self::JMP => "JMP",
            Self::JNZ => "JNZ",
            Self::JNF => "JNF",
            Self::CALL => "CALL",
            Self::RET => "RET",
            Self::PUSH => "PUSH",
            Self::POP => "POP",
            Self::LT => "LT",
            Self::RT => "RT",
            Self::DIG => "DIG",
            Self::CHK => "CHK",
            Self::SRT => "SRT",
            Self::SWP => "SWP",
            Self::SWN => "SWN",
            Self::SWF => "SWF",
            _ => "UNKNOWN",
        }
    }

    /// Look up an opcode by mnemonic (case-insensitive)
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .iter()
            .copied()
            .find(|op| op.name().eq_ignore_ascii_case(name))
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl Default for Opcode {
    fn default() -> Self {
        Self::NOP
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_packing() {
        let byte = Opcode::LOAD.header(0b1);
        assert_eq!(byte, 0b0001_0001);
        assert_eq!(Opcode::from_header(byte), Opcode::LOAD);
        assert_eq!(byte & 0x07, 1);

        // Operand bits never leak into the opcode
        assert_eq!(Opcode::from_header(Opcode::SWF.header(0xFF)), Opcode::SWF);
    }

    #[test]
    fn test_all_fit_in_five_bits() {
        for (i, op) in Opcode::ALL.iter().enumerate() {
            assert_eq!(op.0 as usize, i);
            assert!(op.0 < 32);
            assert!(op.is_defined());
        }
        assert!(!Opcode(23).is_defined());
    }

    #[test]
    fn test_names() {
        assert_eq!(Opcode::JNZ.name(), "JNZ");
        assert_eq!(Opcode::from_name("jnz"), Some(Opcode::JNZ));
        assert_eq!(Opcode::from_name("Swp"), Some(Opcode::SWP));
        assert_eq!(Opcode::from_name("HALT"), None);
        assert_eq!(Opcode(31).name(), "UNKNOWN");
    }

    #[test]
    fn test_pc_modifying() {
        assert!(Opcode::JMP.modifies_pc());
        assert!(Opcode::RET.modifies_pc());
        assert!(Opcode::CALL.takes_target());
        assert!(!Opcode::RET.takes_target());
        assert!(!Opcode::MOVE.modifies_pc());
    }
}
