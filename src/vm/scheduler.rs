//! Program scheduler - advances one worker's steps once per tick
//!
//! ```text
//!  Idle ──load──▶ Compiled ──async──▶ Executing ──blocked/end/budget──▶ HaltedForTick
//!                                        ▲                                   │
//!                                        └───────────next due tick───────────┘
//! ```
//!
//! Per tick:
//!
//! 1. `reset` clears the async/sync completion flags.
//! 2. `execute_async` runs only if the worker is due. It executes 0-tick
//!    steps until the pc leaves the program, reaches a step costing ticks,
//!    or the step budget runs out.
//! 3. `execute_sync` runs only after the async phase did. If the pc is on
//!    a step costing N ticks it executes that one step with world access,
//!    advances past it and throttles the worker to every (N+1)th tick.
//!
//! The pc is the [`Cpu`] field, never a copy. Jump steps store
//! `target - 1` and the wrapping increment here lands on `target`.

use super::compiler::Program;
use super::register::Cpu;
use crate::world::{ActorId, World};

/// Lifecycle of a worker's program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedulerState {
    /// No program loaded
    Idle,
    /// Program loaded, nothing executed yet
    Compiled,
    /// Local steps ran this tick
    Executing,
    /// Waiting for the next due tick
    HaltedForTick,
}

#[derive(Debug)]
pub struct ProgramScheduler {
    program: Program,
    tick_divisor: u32,
    async_done: bool,
    sync_done: bool,
    state: SchedulerState,
}

impl ProgramScheduler {
    pub fn new() -> Self {
        Self {
            program: Program::empty(),
            tick_divisor: 1,
            async_done: false,
            sync_done: false,
            state: SchedulerState::Idle,
        }
    }

    /// Install a compiled program and rewind the pc
    pub fn load(&mut self, program: Program, cpu: &mut Cpu) {
        self.state = if program.is_empty() {
            SchedulerState::Idle
        } else {
            SchedulerState::Compiled
        };
        self.program = program;
        self.tick_divisor = 1;
        self.async_done = false;
        self.sync_done = false;
        cpu.pc = 0;
    }

    pub fn program(&self) -> &Program {
        &self.program
    }

    pub fn state(&self) -> SchedulerState {
        self.state
    }

    pub fn tick_divisor(&self) -> u32 {
        self.tick_divisor
    }

    pub fn async_done(&self) -> bool {
        self.async_done
    }

    pub fn sync_done(&self) -> bool {
        self.sync_done
    }

    /// Whether the worker advances on this tick
    pub fn is_due(&self, clock: u64) -> bool {
        clock % self.tick_divisor as u64 == 0
    }

    pub fn reset(&mut self) {
        self.async_done = false;
        self.sync_done = false;
    }

    /// Run local steps. Returns how many executed.
    pub fn execute_async(&mut self, cpu: &mut Cpu, clock: u64, budget: usize) -> usize {
        if !self.is_due(clock) {
            return 0;
        }
        self.async_done = true;
        self.tick_divisor = 1;

        let mut executed = 0;
        while executed < budget {
            let step = match self.program.get(cpu.pc as usize) {
                Some(step) if step.is_local() => step,
                _ => break,
            };
            step.run_local(cpu);
            cpu.pc = cpu.pc.wrapping_add(1);
            executed += 1;
        }

        if executed == budget && budget > 0 {
            log::trace!("step budget of {} exhausted at pc {}", budget, cpu.pc);
        }

        if !self.program.is_empty() {
            self.state = if executed > 0 {
                SchedulerState::Executing
            } else {
                SchedulerState::HaltedForTick
            };
        }
        executed
    }

    /// Run at most one world step. Returns its tick cost if one ran.
    pub fn execute_sync(&mut self, cpu: &mut Cpu, world: &mut dyn World, actor: ActorId) -> Option<u16> {
        if !self.async_done || self.sync_done {
            return None;
        }
        self.sync_done = true;
        if !self.program.is_empty() {
            self.state = SchedulerState::HaltedForTick;
        }

        let step = self.program.get(cpu.pc as usize)?;
        if step.is_local() {
            return None;
        }

        let ticks = step.ticks();
        step.run(cpu, world, actor);
        cpu.pc = cpu.pc.wrapping_add(1);
        self.tick_divisor = ticks as u32 + 1;
        Some(ticks)
    }
}

impl Default for ProgramScheduler {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::register::Reg;
    use crate::vm::{assemble, Opcode, DEFAULT_STEP_BUDGET};
    use crate::world::GridWorld;

    fn loaded(lines: &[&str]) -> (ProgramScheduler, Cpu) {
        let program = assemble(lines).unwrap().compile().unwrap();
        let mut cpu = Cpu::new();
        let mut scheduler = ProgramScheduler::new();
        scheduler.load(program, &mut cpu);
        (scheduler, cpu)
    }

    fn world_with_actor() -> (GridWorld, ActorId) {
        let mut world = GridWorld::new(8, 1);
        let id = ActorId(0);
        world.place_actor(id, 0, 0);
        (world, id)
    }

    /// One full tick without actor-level resolution
    fn tick(s: &mut ProgramScheduler, cpu: &mut Cpu, world: &mut GridWorld, id: ActorId, clock: u64) {
        s.reset();
        s.execute_async(cpu, clock, DEFAULT_STEP_BUDGET);
        s.execute_sync(cpu, world, id);
    }

    #[test]
    fn test_countdown_loop() {
        let (mut s, mut cpu) = loaded(&["LOAD A 5", "INC A", "loop:", "DEC A", "JNZ loop"]);
        assert_eq!(s.program().len(), 4);
        assert_eq!(s.state(), SchedulerState::Compiled);

        let executed = s.execute_async(&mut cpu, 0, DEFAULT_STEP_BUDGET);
        // LOAD, INC, then 6 x (DEC, JNZ)
        assert_eq!(executed, 2 + 12);
        assert_eq!(cpu.reg(Reg::A), 0);
        assert!(cpu.zero);
        assert_eq!(cpu.pc, 4);
    }

    #[test]
    fn test_jump_lands_on_target() {
        let (mut s, mut cpu) = loaded(&["JMP 2", "INC A", "INC B"]);
        s.execute_async(&mut cpu, 0, 1);
        assert_eq!(cpu.pc, 2);
        s.reset();
        s.execute_async(&mut cpu, 0, 1);
        assert_eq!(cpu.reg(Reg::A), 0);
        assert_eq!(cpu.reg(Reg::B), 1);
    }

    #[test]
    fn test_jump_to_zero_wraps() {
        let (mut s, mut cpu) = loaded(&["top:", "INC A", "JMP top"]);
        s.execute_async(&mut cpu, 0, 10);
        assert_eq!(cpu.reg(Reg::A), 5);
        assert_eq!(cpu.pc, 0);
    }

    #[test]
    fn test_async_stops_at_world_step() {
        let (mut s, mut cpu) = loaded(&["INC A", "MOVE", "INC A"]);
        let executed = s.execute_async(&mut cpu, 0, DEFAULT_STEP_BUDGET);
        assert_eq!(executed, 1);
        assert_eq!(cpu.pc, 1);
        assert!(!cpu.move_pending);
        assert_eq!(s.program().get(cpu.pc as usize).map(|st| st.opcode()), Some(Opcode::MOVE));
    }

    #[test]
    fn test_sync_runs_at_most_one_step() {
        let (mut s, mut cpu) = loaded(&["MOVE", "MOVE"]);
        let (mut world, id) = world_with_actor();

        s.execute_async(&mut cpu, 0, DEFAULT_STEP_BUDGET);
        assert_eq!(s.execute_sync(&mut cpu, &mut world, id), Some(1));
        assert_eq!(s.execute_sync(&mut cpu, &mut world, id), None);
        assert_eq!(cpu.pc, 1);
        assert!(cpu.move_pending);
    }

    #[test]
    fn test_sync_requires_async() {
        let (mut s, mut cpu) = loaded(&["MOVE"]);
        let (mut world, id) = world_with_actor();
        assert_eq!(s.execute_sync(&mut cpu, &mut world, id), None);
        assert_eq!(cpu.pc, 0);
    }

    #[test]
    fn test_tick_divisor_throttles() {
        let (mut s, mut cpu) = loaded(&["top:", "INC A", "DIG", "JMP top"]);
        let (mut world, id) = world_with_actor();

        // Tick 0: INC, then DIG costs 2 ticks
        tick(&mut s, &mut cpu, &mut world, id, 0);
        assert_eq!(cpu.reg(Reg::A), 1);
        assert_eq!(s.tick_divisor(), 3);

        // Ticks 1 and 2 are skipped
        tick(&mut s, &mut cpu, &mut world, id, 1);
        tick(&mut s, &mut cpu, &mut world, id, 2);
        assert_eq!(cpu.reg(Reg::A), 1);
        assert!(!s.async_done());

        // Tick 3 is due again
        tick(&mut s, &mut cpu, &mut world, id, 3);
        assert_eq!(cpu.reg(Reg::A), 2);
        assert!(s.sync_done());
    }

    #[test]
    fn test_budget_bounds_runaway_loop() {
        let (mut s, mut cpu) = loaded(&["spin:", "JMP spin"]);
        assert_eq!(s.execute_async(&mut cpu, 0, 500), 500);
        s.reset();
        assert_eq!(s.execute_async(&mut cpu, 1, 500), 500);
        assert_eq!(s.state(), SchedulerState::Executing);
    }

    #[test]
    fn test_empty_and_out_of_bounds_are_noops() {
        let mut s = ProgramScheduler::new();
        let mut cpu = Cpu::new();
        let (mut world, id) = world_with_actor();
        assert_eq!(s.execute_async(&mut cpu, 0, 500), 0);
        assert_eq!(s.execute_sync(&mut cpu, &mut world, id), None);
        assert_eq!(s.state(), SchedulerState::Idle);

        let (mut s, mut cpu) = loaded(&["INC A"]);
        cpu.pc = 40;
        assert_eq!(s.execute_async(&mut cpu, 0, 500), 0);
        assert_eq!(s.execute_sync(&mut cpu, &mut world, id), None);
        assert_eq!(s.state(), SchedulerState::HaltedForTick);
    }

    #[test]
    fn test_call_ret_through_scheduler() {
        let (mut s, mut cpu) = loaded(&[
            "PUSH A",
            "CALL sub",
            "INC B",
            "MOVE",
            "sub:",
            "PUSH A",
            "PUSH A",
            "RET",
        ]);
        s.execute_async(&mut cpu, 0, DEFAULT_STEP_BUDGET);
        // Resumed after the CALL, ran INC B, stopped at MOVE
        assert_eq!(cpu.reg(Reg::B), 1);
        assert_eq!(cpu.pc, 3);
        assert_eq!(cpu.sp, 1);
        assert_eq!(cpu.bp, 0);
    }
}
