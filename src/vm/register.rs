//! Register - CPU register file for one ant worker
//!
//! ## Layout
//!
//! ```text
//! General    A, B          u32, addressed by one operand bit
//! Flags      Z F           zero, instruction failed
//! Heading    D1 D2         00 right, 01 up, 10 left, 11 down
//! Deferred   MV DG         move / dig requested, resolved by the actor
//! Pointers   PC BP SP      u16, PC wraps
//! Memory     RAM[64]       private stack words
//! Senses     OPEN[4]       adjacent tiles, indexed by heading
//! Scent      see scent.rs
//! ```
//!
//! The program counter is the scheduler's live cursor. Jumps store
//! `target - 1` and the scheduler's post-step increment lands on `target`.

use super::scent::ScentState;
use super::RAM_WORDS;
use crate::world::Surroundings;
use serde::{Deserialize, Serialize};
use std::fmt;

/// General purpose register selector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Reg {
    A = 0,
    B = 1,
}

impl Reg {
    /// Decode from a single operand bit
    pub const fn from_bit(bit: u8) -> Self {
        if bit & 1 == 0 {
            Self::A
        } else {
            Self::B
        }
    }

    pub const fn bit(&self) -> u8 {
        *self as u8
    }

    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Parse an assembly register name (case-insensitive)
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "A" | "a" => Some(Self::A),
            "B" | "b" => Some(Self::B),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::A => "A",
            Self::B => "B",
        }
    }
}

impl fmt::Display for Reg {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// One of the four cardinal headings
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(u8)]
pub enum Heading {
    Right = 0b00,
    Up = 0b01,
    Left = 0b10,
    Down = 0b11,
}

/// Heading after LT, indexed by the current flag pair
const TURN_LEFT: [(bool, bool); 4] = [
    (false, true),  // right -> up
    (true, false),  // up    -> left
    (true, true),   // left  -> down
    (false, false), // down  -> right
];

/// Heading after RT, indexed by the current flag pair
const TURN_RIGHT: [(bool, bool); 4] = [
    (true, true),   // right -> down
    (false, false), // up    -> right
    (false, true),  // left  -> up
    (true, false),  // down  -> left
];

/// Grid offset per heading (y grows downwards)
const OFFSETS: [(i32, i32); 4] = [(1, 0), (0, -1), (-1, 0), (0, 1)];

impl Heading {
    /// All headings in flag order
    pub const ALL: [Self; 4] = [Self::Right, Self::Up, Self::Left, Self::Down];

    pub const fn from_flags(dir_flag1: bool, dir_flag2: bool) -> Self {
        match (dir_flag1, dir_flag2) {
            (false, false) => Self::Right,
            (false, true) => Self::Up,
            (true, false) => Self::Left,
            (true, true) => Self::Down,
        }
    }

    pub const fn flags(&self) -> (bool, bool) {
        let bits = *self as u8;
        (bits & 0b10 != 0, bits & 0b01 != 0)
    }

    pub const fn index(&self) -> usize {
        *self as usize
    }

    /// Grid offset `(dx, dy)` of the tile ahead
    pub const fn offset(&self) -> (i32, i32) {
        OFFSETS[self.index()]
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Right => "right",
            Self::Up => "up",
            Self::Left => "left",
            Self::Down => "down",
        }
    }
}

impl fmt::Display for Heading {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// Register file owned by exactly one actor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cpu {
    /// General registers A and B
    pub regs: [u32; 2],
    /// Zero flag, set by arithmetic and loads
    pub zero: bool,
    /// Instruction failed flag
    pub failed: bool,
    /// Heading flags
    pub dir_flag1: bool,
    pub dir_flag2: bool,
    /// Deferred side effects
    pub move_pending: bool,
    pub dig_pending: bool,
    /// Program counter (shared with the scheduler)
    pub pc: u16,
    /// Base pointer into `ram`
    pub bp: u16,
    /// Stack pointer into `ram`
    pub sp: u16,
    /// Private stack memory
    pub ram: Vec<u32>,
    /// Cached openness of adjacent tiles, indexed by heading
    pub open: [bool; 4],
    /// Scent reaction state
    pub scent: ScentState,
}

impl Cpu {
    pub fn new() -> Self {
        Self {
            regs: [0; 2],
            zero: false,
            failed: false,
            dir_flag1: false,
            dir_flag2: false,
            move_pending: false,
            dig_pending: false,
            pc: 0,
            bp: 0,
            sp: 0,
            ram: vec![0; RAM_WORDS],
            open: [false; 4],
            scent: ScentState::default(),
        }
    }

    // =========================================================================
    // Registers
    // =========================================================================

    pub fn reg(&self, reg: Reg) -> u32 {
        self.regs[reg.index()]
    }

    /// Write a register and update the zero flag
    pub fn set_reg(&mut self, reg: Reg, value: u32) {
        self.regs[reg.index()] = value;
        self.zero = value == 0;
    }

    // =========================================================================
    // Heading
    // =========================================================================

    pub fn heading(&self) -> Heading {
        Heading::from_flags(self.dir_flag1, self.dir_flag2)
    }

    pub fn set_heading(&mut self, heading: Heading) {
        let (d1, d2) = heading.flags();
        self.dir_flag1 = d1;
        self.dir_flag2 = d2;
    }

    pub fn turn_left(&mut self) {
        let (d1, d2) = TURN_LEFT[self.heading().index()];
        self.dir_flag1 = d1;
        self.dir_flag2 = d2;
    }

    pub fn turn_right(&mut self) {
        let (d1, d2) = TURN_RIGHT[self.heading().index()];
        self.dir_flag1 = d1;
        self.dir_flag2 = d2;
    }

    // =========================================================================
    // Control flow
    // =========================================================================

    /// Point the program counter so the next step executed is `target`
    pub fn jump_to(&mut self, target: u16) {
        self.pc = target.wrapping_sub(1);
    }

    /// Push a word; sets the failed flag on overflow
    pub fn push(&mut self, value: u32) -> bool {
        let sp = self.sp as usize;
        if sp >= self.ram.len() {
            self.failed = true;
            return false;
        }
        self.ram[sp] = value;
        self.sp += 1;
        self.failed = false;
        true
    }

    /// Pop a word; sets the failed flag on underflow
    pub fn pop(&mut self) -> Option<u32> {
        if self.sp == 0 {
            self.failed = true;
            return None;
        }
        self.sp -= 1;
        self.failed = false;
        Some(self.ram[self.sp as usize])
    }

    /// Save return address and frame, then jump.
    ///
    /// The return address is the CALL's own step index; the scheduler's
    /// increment after RET resumes at the step following it.
    pub fn call(&mut self, target: u16) -> bool {
        if self.sp as usize + 2 > self.ram.len() {
            self.failed = true;
            return false;
        }
        let ret = self.pc as u32;
        let bp = self.bp as u32;
        self.push(ret);
        self.push(bp);
        self.bp = self.sp;
        self.jump_to(target);
        true
    }

    /// Unwind the current frame and restore the caller's pc and bp
    pub fn ret(&mut self) -> bool {
        if self.bp < 2 || self.bp as usize > self.ram.len() {
            self.failed = true;
            return false;
        }
        self.sp = self.bp;
        let bp = self.ram[self.sp as usize - 1];
        let ret = self.ram[self.sp as usize - 2];
        self.sp -= 2;
        self.bp = bp as u16;
        self.pc = ret as u16;
        self.failed = false;
        true
    }

    // =========================================================================
    // Senses
    // =========================================================================

    pub fn is_open(&self, heading: Heading) -> bool {
        self.open[heading.index()]
    }

    /// Refresh cached adjacent-tile state from the world
    pub fn observe(&mut self, surroundings: &Surroundings) {
        self.open = surroundings.open;
        self.scent.neighbors = surroundings.scents;
    }

    /// Face the open neighbour with the highest weighted scent
    pub fn scent_read_turn(&mut self) {
        let current = self.heading();
        match self.scent.preferred_heading(&self.open, current) {
            Some(heading) => {
                self.set_heading(heading);
                self.failed = false;
            }
            None => self.failed = true,
        }
    }
}

impl Default for Cpu {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_heading_flags() {
        for heading in Heading::ALL {
            let (d1, d2) = heading.flags();
            assert_eq!(Heading::from_flags(d1, d2), heading);
        }
        assert_eq!(Heading::Up.flags(), (false, true));
        assert_eq!(Heading::Left.flags(), (true, false));
    }

    #[test]
    fn test_turn_tables() {
        let mut cpu = Cpu::new();
        assert_eq!(cpu.heading(), Heading::Right);

        cpu.turn_left();
        assert_eq!(cpu.heading(), Heading::Up);
        cpu.turn_left();
        assert_eq!(cpu.heading(), Heading::Left);
        cpu.turn_left();
        assert_eq!(cpu.heading(), Heading::Down);
        cpu.turn_left();
        assert_eq!(cpu.heading(), Heading::Right);

        cpu.turn_right();
        assert_eq!(cpu.heading(), Heading::Down);
        cpu.turn_right();
        assert_eq!(cpu.heading(), Heading::Left);

        // LT then RT is the identity for every heading
        for heading in Heading::ALL {
            cpu.set_heading(heading);
            cpu.turn_left();
            cpu.turn_right();
            assert_eq!(cpu.heading(), heading);
        }
    }

    #[test]
    fn test_zero_flag() {
        let mut cpu = Cpu::new();
        cpu.set_reg(Reg::A, 3);
        assert!(!cpu.zero);
        cpu.set_reg(Reg::B, 0);
        assert!(cpu.zero);
        assert_eq!(cpu.reg(Reg::A), 3);
    }

    #[test]
    fn test_stack_bounds() {
        let mut cpu = Cpu::new();
        assert_eq!(cpu.pop(), None);
        assert!(cpu.failed);

        for i in 0..RAM_WORDS as u32 {
            assert!(cpu.push(i));
        }
        assert!(!cpu.failed);
        assert!(!cpu.push(99));
        assert!(cpu.failed);
        assert_eq!(cpu.sp as usize, RAM_WORDS);

        assert_eq!(cpu.pop(), Some(RAM_WORDS as u32 - 1));
        assert!(!cpu.failed);
    }

    #[test]
    fn test_call_ret_frame() {
        let mut cpu = Cpu::new();
        cpu.push(7);
        cpu.pc = 4;

        assert!(cpu.call(10));
        assert_eq!(cpu.pc, 9);
        assert_eq!(cpu.sp, 3);
        assert_eq!(cpu.bp, 3);

        // Callee scratch
        cpu.push(1);
        cpu.push(2);

        assert!(cpu.ret());
        assert_eq!(cpu.pc, 4);
        assert_eq!(cpu.sp, 1);
        assert_eq!(cpu.bp, 0);
        assert_eq!(cpu.pop(), Some(7));
    }

    #[test]
    fn test_ret_without_frame_fails() {
        let mut cpu = Cpu::new();
        cpu.pc = 5;
        assert!(!cpu.ret());
        assert!(cpu.failed);
        assert_eq!(cpu.pc, 5);
        assert_eq!(cpu.sp, 0);
    }

    #[test]
    fn test_jump_wraps() {
        let mut cpu = Cpu::new();
        cpu.jump_to(0);
        assert_eq!(cpu.pc, u16::MAX);
        assert_eq!(cpu.pc.wrapping_add(1), 0);
    }

    #[test]
    fn test_serde_snapshot() {
        let mut cpu = Cpu::new();
        cpu.set_reg(Reg::B, 42);
        cpu.turn_right();
        let json = serde_json::to_string(&cpu).unwrap();
        let back: Cpu = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cpu);
    }
}
