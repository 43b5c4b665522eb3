//! Instruction catalogue - parse, deparse and compile rules per opcode
//!
//! ## Encodings
//!
//! ```text
//! Shape            Bytes  Header low bits   Extra bytes
//! none             1      000               -
//! reg              1      00r               -
//! reg, const       5      00r               u32 little-endian
//! src, dst         1      0sd               -
//! target           3      000               u16 little-endian step index
//! channel          1      ccc               -
//! channel, prio    2      ccc               i8
//! ```
//!
//! The catalogue is a fixed table indexed by opcode. Parse and deparse
//! rules are shared per operand shape; compile rules are per opcode and
//! live in the compiler.

use super::compiler::{rules, Effect};
use super::labels::LabelTable;
use super::opcode::Opcode;
use super::operand::Operands;
use super::register::Reg;
use super::scent::channel_name;
use crate::error::CodeError;

/// text -> bytes
pub type ParseRule =
    fn(&InstructionDef, &mut Operands<'_>, &LabelTable, &mut Vec<u8>) -> Result<(), String>;
/// bytes -> text
pub type DeparseRule = fn(&InstructionDef, &[u8], &LabelTable) -> String;
/// bytes -> executable effect
pub type CompileRule = fn(&[u8]) -> Effect;

/// Operand layout of an instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandShape {
    None,
    Reg,
    RegConst,
    RegPair,
    Target,
    Channel,
    ChannelPriority,
}

impl OperandShape {
    /// Encoded size in bytes, header included
    pub const fn width(&self) -> usize {
        match self {
            Self::None | Self::Reg | Self::RegPair | Self::Channel => 1,
            Self::ChannelPriority => 2,
            Self::Target => 3,
            Self::RegConst => 5,
        }
    }

    pub const fn usage(&self) -> &'static str {
        match self {
            Self::None => "",
            Self::Reg => "<register>",
            Self::RegConst => "<register> <constant>",
            Self::RegPair => "<src> <dst>",
            Self::Target => "<label|index>",
            Self::Channel => "<channel>",
            Self::ChannelPriority => "<channel> <priority>",
        }
    }
}

/// One catalogue entry
pub struct InstructionDef {
    pub opcode: Opcode,
    pub shape: OperandShape,
    /// 0 = local step, >0 = world step taking that many ticks
    pub ticks: u16,
    pub parse: ParseRule,
    pub deparse: DeparseRule,
    pub compile: CompileRule,
}

impl InstructionDef {
    pub fn mnemonic(&self) -> &'static str {
        self.opcode.name()
    }

    pub const fn width(&self) -> usize {
        self.shape.width()
    }

    pub fn usage(&self) -> &'static str {
        self.shape.usage()
    }
}

impl std::fmt::Debug for InstructionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InstructionDef")
            .field("opcode", &self.opcode)
            .field("shape", &self.shape)
            .field("ticks", &self.ticks)
            .finish()
    }
}

const fn entry(opcode: Opcode, shape: OperandShape, ticks: u16, compile: CompileRule) -> InstructionDef {
    let (parse, deparse): (ParseRule, DeparseRule) = match shape {
        OperandShape::None => (parse_none, deparse_none),
        OperandShape::Reg => (parse_reg, deparse_reg),
        OperandShape::RegConst => (parse_reg_const, deparse_reg_const),
        OperandShape::RegPair => (parse_reg_pair, deparse_reg_pair),
        OperandShape::Target => (parse_target, deparse_target),
        OperandShape::Channel => (parse_channel, deparse_channel),
        OperandShape::ChannelPriority => (parse_channel_priority, deparse_channel_priority),
    };
    InstructionDef {
        opcode,
        shape,
        ticks,
        parse,
        deparse,
        compile,
    }
}

use OperandShape as S;

static CATALOGUE: [InstructionDef; Opcode::COUNT] = [
    entry(Opcode::NOP, S::None, 0, rules::nop),
    entry(Opcode::MOVE, S::None, 1, rules::move_forward),
    entry(Opcode::LOAD, S::RegConst, 0, rules::load),
    entry(Opcode::COPY, S::RegPair, 0, rules::copy),
    entry(Opcode::ADD, S::RegPair, 0, rules::add),
    entry(Opcode::SUB, S::RegPair, 0, rules::sub),
    entry(Opcode::INC, S::Reg, 0, rules::inc),
    entry(Opcode::DEC, S::Reg, 0, rules::dec),
    entry(Opcode::JMP, S::Target, 0, rules::jmp),
    entry(Opcode::JNZ, S::Target, 0, rules::jnz),
    entry(Opcode::JNF, S::Target, 0, rules::jnf),
    entry(Opcode::CALL, S::Target, 0, rules::call),
    entry(Opcode::RET, S::None, 0, rules::ret),
    entry(Opcode::PUSH, S::Reg, 0, rules::push),
    entry(Opcode::POP, S::Reg, 0, rules::pop),
    entry(Opcode::LT, S::None, 0, rules::turn_left),
    entry(Opcode::RT, S::None, 0, rules::turn_right),
    entry(Opcode::DIG, S::None, 2, rules::dig),
    entry(Opcode::CHK, S::None, 1, rules::check),
    entry(Opcode::SRT, S::None, 0, rules::scent_read_turn),
    entry(Opcode::SWP, S::ChannelPriority, 0, rules::scent_priority),
    entry(Opcode::SWN, S::Channel, 0, rules::scent_write_on),
    entry(Opcode::SWF, S::None, 0, rules::scent_write_off),
];

/// The full instruction table, ordered by opcode
pub fn catalogue() -> &'static [InstructionDef] {
    &CATALOGUE
}

pub fn by_opcode(opcode: Opcode) -> Option<&'static InstructionDef> {
    CATALOGUE.get(opcode.0 as usize)
}

pub fn by_mnemonic(mnemonic: &str) -> Option<&'static InstructionDef> {
    Opcode::from_name(mnemonic).and_then(by_opcode)
}

// =============================================================================
// Operand decoding helpers
// =============================================================================

/// Single register in bit 0
pub fn reg_operand(bytes: &[u8]) -> Reg {
    Reg::from_bit(bytes[0])
}

/// `(src, dst)` from bits 1 and 0
pub fn reg_pair_operand(bytes: &[u8]) -> (Reg, Reg) {
    (Reg::from_bit(bytes[0] >> 1), Reg::from_bit(bytes[0]))
}

pub fn const_operand(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[1], bytes[2], bytes[3], bytes[4]])
}

pub fn target_operand(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[1], bytes[2]])
}

pub fn channel_operand(bytes: &[u8]) -> u8 {
    bytes[0] & 0x07
}

pub fn priority_operand(bytes: &[u8]) -> i8 {
    bytes[1] as i8
}

// =============================================================================
// Parse rules
// =============================================================================

fn parse_none(def: &InstructionDef, _: &mut Operands<'_>, _: &LabelTable, out: &mut Vec<u8>) -> Result<(), String> {
    out.push(def.opcode.header(0));
    Ok(())
}

fn parse_reg(def: &InstructionDef, ops: &mut Operands<'_>, _: &LabelTable, out: &mut Vec<u8>) -> Result<(), String> {
    let reg = ops.register()?;
    out.push(def.opcode.header(reg.bit()));
    Ok(())
}

fn parse_reg_const(def: &InstructionDef, ops: &mut Operands<'_>, _: &LabelTable, out: &mut Vec<u8>) -> Result<(), String> {
    let reg = ops.register()?;
    let value = ops.constant()?;
    out.push(def.opcode.header(reg.bit()));
    out.extend_from_slice(&value.to_le_bytes());
    Ok(())
}

fn parse_reg_pair(def: &InstructionDef, ops: &mut Operands<'_>, _: &LabelTable, out: &mut Vec<u8>) -> Result<(), String> {
    let src = ops.register()?;
    let dst = ops.register()?;
    out.push(def.opcode.header((src.bit() << 1) | dst.bit()));
    Ok(())
}

fn parse_target(def: &InstructionDef, ops: &mut Operands<'_>, labels: &LabelTable, out: &mut Vec<u8>) -> Result<(), String> {
    let target = ops.target(labels)?;
    out.push(def.opcode.header(0));
    out.extend_from_slice(&target.to_le_bytes());
    Ok(())
}

fn parse_channel(def: &InstructionDef, ops: &mut Operands<'_>, _: &LabelTable, out: &mut Vec<u8>) -> Result<(), String> {
    let channel = ops.channel()?;
    out.push(def.opcode.header(channel));
    Ok(())
}

fn parse_channel_priority(def: &InstructionDef, ops: &mut Operands<'_>, _: &LabelTable, out: &mut Vec<u8>) -> Result<(), String> {
    let channel = ops.channel()?;
    let priority = ops.priority()?;
    out.push(def.opcode.header(channel));
    out.push(priority as u8);
    Ok(())
}

// =============================================================================
// Deparse rules
// =============================================================================

fn deparse_none(def: &InstructionDef, _: &[u8], _: &LabelTable) -> String {
    def.mnemonic().to_string()
}

fn deparse_reg(def: &InstructionDef, bytes: &[u8], _: &LabelTable) -> String {
    format!("{} {}", def.mnemonic(), reg_operand(bytes))
}

fn deparse_reg_const(def: &InstructionDef, bytes: &[u8], _: &LabelTable) -> String {
    // Constants with the high bit set read back as negative numbers
    let value = const_operand(bytes) as i32;
    format!("{} {} {}", def.mnemonic(), reg_operand(bytes), value)
}

fn deparse_reg_pair(def: &InstructionDef, bytes: &[u8], _: &LabelTable) -> String {
    let (src, dst) = reg_pair_operand(bytes);
    format!("{} {} {}", def.mnemonic(), src, dst)
}

fn deparse_target(def: &InstructionDef, bytes: &[u8], labels: &LabelTable) -> String {
    let target = target_operand(bytes);
    match labels.name_at(target) {
        Some(name) => format!("{} {}", def.mnemonic(), name),
        None => format!("{} {}", def.mnemonic(), target),
    }
}

fn deparse_channel(def: &InstructionDef, bytes: &[u8], _: &LabelTable) -> String {
    format!("{} {}", def.mnemonic(), channel_name(channel_operand(bytes)))
}

fn deparse_channel_priority(def: &InstructionDef, bytes: &[u8], _: &LabelTable) -> String {
    format!(
        "{} {} {}",
        def.mnemonic(),
        channel_name(channel_operand(bytes)),
        priority_operand(bytes)
    )
}

// =============================================================================
// Decoder
// =============================================================================

/// One instruction located in a bytecode buffer
#[derive(Debug, Clone, Copy)]
pub struct Decoded<'a> {
    /// Byte offset of the header
    pub offset: usize,
    pub def: &'static InstructionDef,
    /// Exactly `def.width()` bytes, header first
    pub bytes: &'a [u8],
}

/// Walks a bytecode buffer one instruction at a time.
///
/// Yields an error for an unknown opcode or a truncated instruction and
/// stops afterwards.
pub struct Decoder<'a> {
    code: &'a [u8],
    offset: usize,
    done: bool,
}

pub fn decode(code: &[u8]) -> Decoder<'_> {
    Decoder {
        code,
        offset: 0,
        done: false,
    }
}

impl<'a> Iterator for Decoder<'a> {
    type Item = Result<Decoded<'a>, CodeError>;

    fn next(&mut self) -> Option<Self::Item> {
        let code = self.code;
        if self.done || self.offset >= code.len() {
            return None;
        }

        let offset = self.offset;
        let opcode = Opcode::from_header(code[offset]);
        let Some(def) = by_opcode(opcode) else {
            self.done = true;
            return Some(Err(CodeError::UnknownOpcode {
                offset,
                opcode: opcode.0,
            }));
        };

        let end = offset + def.width();
        if end > code.len() {
            self.done = true;
            return Some(Err(CodeError::Truncated {
                offset,
                mnemonic: def.mnemonic(),
                needed: def.width(),
                available: code.len() - offset,
            }));
        }

        self.offset = end;
        Some(Ok(Decoded {
            offset,
            def,
            bytes: &code[offset..end],
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalogue_indexed_by_opcode() {
        assert_eq!(catalogue().len(), Opcode::COUNT);
        for (i, def) in catalogue().iter().enumerate() {
            assert_eq!(def.opcode.0 as usize, i);
        }
    }

    #[test]
    fn test_tick_costs() {
        let world_steps: Vec<_> = catalogue()
            .iter()
            .filter(|d| d.ticks > 0)
            .map(|d| d.mnemonic())
            .collect();
        assert_eq!(world_steps, vec!["MOVE", "DIG", "CHK"]);
        assert_eq!(by_mnemonic("dig").map(|d| d.ticks), Some(2));
    }

    #[test]
    fn test_widths() {
        assert_eq!(by_opcode(Opcode::LOAD).map(|d| d.width()), Some(5));
        assert_eq!(by_opcode(Opcode::CALL).map(|d| d.width()), Some(3));
        assert_eq!(by_opcode(Opcode::SWP).map(|d| d.width()), Some(2));
        assert_eq!(by_opcode(Opcode::ADD).map(|d| d.width()), Some(1));
        assert!(by_opcode(Opcode(30)).is_none());
    }

    #[test]
    fn test_parse_reg_pair_bits() {
        let def = by_opcode(Opcode::SUB).unwrap();
        let mut out = Vec::new();
        let mut ops = Operands::new("B A", def.mnemonic(), def.usage());
        (def.parse)(def, &mut ops, &LabelTable::new(), &mut out).unwrap();
        assert_eq!(out, vec![Opcode::SUB.header(0b10)]);
        assert_eq!(reg_pair_operand(&out), (Reg::B, Reg::A));
        assert_eq!((def.deparse)(def, &out, &LabelTable::new()), "SUB B A");
    }

    #[test]
    fn test_parse_load_layout() {
        let def = by_opcode(Opcode::LOAD).unwrap();
        let mut out = Vec::new();
        let mut ops = Operands::new("B 0x01020304", def.mnemonic(), def.usage());
        (def.parse)(def, &mut ops, &LabelTable::new(), &mut out).unwrap();
        assert_eq!(out, vec![Opcode::LOAD.header(1), 4, 3, 2, 1]);
    }

    #[test]
    fn test_deparse_target_prefers_label() {
        let def = by_opcode(Opcode::JNZ).unwrap();
        let mut labels = LabelTable::new();
        labels.insert("loop", 2);
        let bytes = [Opcode::JNZ.header(0), 2, 0];
        assert_eq!((def.deparse)(def, &bytes, &labels), "JNZ loop");
        let bytes = [Opcode::JNZ.header(0), 7, 0];
        assert_eq!((def.deparse)(def, &bytes, &labels), "JNZ 7");
    }

    #[test]
    fn test_decoder_errors() {
        let code = [Opcode::NOP.header(0), Opcode::LOAD.header(0), 1, 2];
        let results: Vec<_> = decode(&code).collect();
        assert_eq!(results.len(), 2);
        assert!(results[0].is_ok());
        assert!(matches!(
            results[1],
            Err(CodeError::Truncated { offset: 1, needed: 5, available: 3, .. })
        ));

        let code = [31 << 3, Opcode::NOP.header(0)];
        let results: Vec<_> = decode(&code).collect();
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(CodeError::UnknownOpcode { offset: 0, opcode: 31 })));
    }
}
