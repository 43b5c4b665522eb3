//! Tick coordinator - advances every worker's program in lockstep
//!
//! ## Tick protocol
//!
//! ```text
//!            ┌──────────── worker pool ────────────┐
//! reset      │ actor 0 │ actor 1 │ ... │ actor N   │  parallel, own Cpu only
//! async      │ actor 0 │ actor 1 │ ... │ actor N   │  parallel, own Cpu only
//!            └──────────────── join ───────────────┘
//! await_all  ─────────────── barrier ───────────────
//! sync       actor 0 ▶ actor 1 ▶ ... ▶ actor N         coordinating thread,
//!            (step + resolve)                          fixed order, &mut World
//! ```
//!
//! Local steps only ever see `&mut Cpu` of their own actor, so the async
//! phase needs no locks. The world is borrowed mutably only by the serial
//! sync loop, which makes collisions and digging deterministic regardless
//! of pool size.

use crate::config::VmConfig;
use crate::error::{AntvmError, Result};
use crate::vm::{Cpu, MachineCode, Program, ProgramScheduler, SchedulerState};
use crate::world::{ActorId, World};
use rayon::prelude::*;

/// One worker: register file, scheduler and the machine code it runs
#[derive(Debug)]
pub struct Actor {
    id: ActorId,
    cpu: Cpu,
    scheduler: ProgramScheduler,
    machine_code: MachineCode,
}

impl Actor {
    fn new(id: ActorId, machine_code: MachineCode, program: Program) -> Self {
        let mut cpu = Cpu::new();
        let mut scheduler = ProgramScheduler::new();
        scheduler.load(program, &mut cpu);
        Self {
            id,
            cpu,
            scheduler,
            machine_code,
        }
    }

    pub fn id(&self) -> ActorId {
        self.id
    }

    pub fn cpu(&self) -> &Cpu {
        &self.cpu
    }

    /// Direct register access for the host (debuggers, save games)
    pub fn cpu_mut(&mut self) -> &mut Cpu {
        &mut self.cpu
    }

    pub fn machine_code(&self) -> &MachineCode {
        &self.machine_code
    }

    pub fn scheduler(&self) -> &ProgramScheduler {
        &self.scheduler
    }

    pub fn state(&self) -> SchedulerState {
        self.scheduler.state()
    }

    /// Swap in a new program, rewinding pc and the call stack
    fn load(&mut self, machine_code: MachineCode, program: Program) {
        self.scheduler.load(program, &mut self.cpu);
        self.cpu.bp = 0;
        self.cpu.sp = 0;
        self.cpu.move_pending = false;
        self.cpu.dig_pending = false;
        self.machine_code = machine_code;
    }

    pub fn reset(&mut self) {
        self.scheduler.reset();
    }

    pub fn execute_async(&mut self, clock: u64, budget: usize) -> usize {
        self.scheduler.execute_async(&mut self.cpu, clock, budget)
    }

    pub fn execute_sync(&mut self, world: &mut dyn World) -> Option<u16> {
        self.scheduler.execute_sync(&mut self.cpu, world, self.id)
    }

    /// Apply deferred moves and digs, then refresh the senses
    pub fn resolve(&mut self, world: &mut dyn World, scent_deposit: u8) {
        let heading = self.cpu.heading();

        if self.cpu.move_pending {
            self.cpu.move_pending = false;
            let moved = world.move_actor(self.id, heading);
            self.cpu.failed = !moved;
            if moved {
                if let Some(channel) = self.cpu.scent.write_channel {
                    world.deposit_scent(self.id, channel, scent_deposit);
                }
            }
        }

        if self.cpu.dig_pending {
            self.cpu.dig_pending = false;
            self.cpu.failed = !world.dig(self.id, heading);
        }

        self.cpu.observe(&world.surroundings(self.id));
    }
}

/// Where the coordinator is within the current tick
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TickPhase {
    Idle,
    Reset,
    Async,
    Awaited,
}

/// Counters for one completed tick
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TickStats {
    /// Clock value the tick ran at
    pub clock: u64,
    /// Local steps executed across all actors
    pub async_steps: usize,
    /// World steps executed across all actors
    pub sync_steps: usize,
}

/// Owns the world, the actors and the worker pool
pub struct Simulation<W: World> {
    world: W,
    actors: Vec<Actor>,
    clock: u64,
    next_id: u32,
    pool: rayon::ThreadPool,
    config: VmConfig,
    phase: TickPhase,
    async_steps: usize,
}

impl<W: World> Simulation<W> {
    pub fn new(world: W, config: VmConfig) -> Result<Self> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.worker_threads)
            .thread_name(|i| format!("antvm-worker-{}", i))
            .build()?;
        log::debug!("worker pool started with {} threads", pool.current_num_threads());

        Ok(Self {
            world,
            actors: Vec::new(),
            clock: 0,
            next_id: 0,
            pool,
            config,
            phase: TickPhase::Idle,
            async_steps: 0,
        })
    }

    pub fn world(&self) -> &W {
        &self.world
    }

    pub fn world_mut(&mut self) -> &mut W {
        &mut self.world
    }

    pub fn clock(&self) -> u64 {
        self.clock
    }

    pub fn config(&self) -> &VmConfig {
        &self.config
    }

    pub fn actors(&self) -> &[Actor] {
        &self.actors
    }

    pub fn actor(&self, id: ActorId) -> Option<&Actor> {
        self.actors.iter().find(|a| a.id == id)
    }

    pub fn actor_mut(&mut self, id: ActorId) -> Option<&mut Actor> {
        self.actors.iter_mut().find(|a| a.id == id)
    }

    /// Add an actor running `machine_code`. Placing it in the world is up
    /// to the caller.
    pub fn spawn(&mut self, machine_code: &MachineCode) -> Result<ActorId> {
        let program = machine_code.compile()?;
        let id = ActorId(self.next_id);
        self.next_id += 1;
        self.actors.push(Actor::new(id, machine_code.clone(), program));
        log::debug!("spawned actor {}", id);
        Ok(id)
    }

    /// Remove an actor and its place in the world. Returns its final state.
    pub fn despawn(&mut self, id: ActorId) -> Option<Actor> {
        let index = self.actors.iter().position(|a| a.id == id)?;
        self.world.remove_actor(id);
        log::debug!("despawned actor {}", id);
        Some(self.actors.remove(index))
    }

    /// Give an actor a new program. On a compile error the old program
    /// keeps running.
    pub fn assign(&mut self, id: ActorId, machine_code: &MachineCode) -> Result<()> {
        let program = machine_code.compile()?;
        let actor = self
            .actor_mut(id)
            .ok_or(AntvmError::UnknownActor(id.0))?;
        actor.load(machine_code.clone(), program);
        Ok(())
    }

    /// Give every actor a new program, keeping registers and flags
    pub fn reload_all(&mut self, machine_code: &MachineCode) -> Result<()> {
        // Every program compiles before any actor is touched
        let programs = self
            .actors
            .iter()
            .map(|_| machine_code.compile())
            .collect::<std::result::Result<Vec<_>, _>>()?;
        for (actor, program) in self.actors.iter_mut().zip(programs) {
            actor.load(machine_code.clone(), program);
        }
        log::info!("reloaded {} actors", self.actors.len());
        Ok(())
    }

    // =========================================================================
    // Tick driver
    // =========================================================================

    /// Clear every actor's per-tick completion flags
    pub fn reset(&mut self) {
        let actors = &mut self.actors;
        self.pool.install(|| actors.par_iter_mut().for_each(Actor::reset));
        self.async_steps = 0;
        self.phase = TickPhase::Reset;
    }

    /// Run the async phase for all actors on the worker pool
    pub fn execute_async(&mut self) {
        debug_assert_eq!(self.phase, TickPhase::Reset, "execute_async before reset");
        let clock = self.clock;
        let budget = self.config.max_steps_per_tick;
        let actors = &mut self.actors;
        self.async_steps = self.pool.install(|| {
            actors
                .par_iter_mut()
                .map(|actor| actor.execute_async(clock, budget))
                .sum()
        });
        self.phase = TickPhase::Async;
    }

    /// Barrier between the phases.
    ///
    /// `execute_async` only returns once every job has joined, so by the
    /// time this runs no async work is in flight. It records the barrier
    /// so `execute_sync` can check the driver order.
    pub fn await_all(&mut self) {
        debug_assert_eq!(self.phase, TickPhase::Async, "await_all before execute_async");
        self.phase = TickPhase::Awaited;
    }

    /// Run the sync phase serially in actor order, then advance the clock
    pub fn execute_sync(&mut self) -> TickStats {
        debug_assert_eq!(self.phase, TickPhase::Awaited, "execute_sync before await_all");
        let mut sync_steps = 0;
        let deposit = self.config.scent_deposit;
        for actor in &mut self.actors {
            if actor.execute_sync(&mut self.world).is_some() {
                sync_steps += 1;
            }
            actor.resolve(&mut self.world, deposit);
        }

        let stats = TickStats {
            clock: self.clock,
            async_steps: self.async_steps,
            sync_steps,
        };
        log::trace!(
            "tick {}: {} async steps, {} sync steps",
            stats.clock,
            stats.async_steps,
            stats.sync_steps
        );

        self.clock += 1;
        self.phase = TickPhase::Idle;
        stats
    }

    /// One full tick in the required order
    pub fn tick(&mut self) -> TickStats {
        self.reset();
        self.execute_async();
        self.await_all();
        self.execute_sync()
    }

    /// Run `ticks` ticks and sum their counters
    pub fn run(&mut self, ticks: u64) -> TickStats {
        let mut total = TickStats {
            clock: self.clock,
            ..TickStats::default()
        };
        for _ in 0..ticks {
            let stats = self.tick();
            total.async_steps += stats.async_steps;
            total.sync_steps += stats.sync_steps;
        }
        total
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::{assemble, Heading, Opcode, Reg};
    use crate::world::{GridWorld, Tile};

    fn sim(width: u32, height: u32) -> Simulation<GridWorld> {
        Simulation::new(GridWorld::new(width, height), VmConfig::single_threaded()).unwrap()
    }

    fn spawn_at(sim: &mut Simulation<GridWorld>, lines: &[&str], x: i32, y: i32) -> ActorId {
        let code = assemble(lines).unwrap();
        let id = sim.spawn(&code).unwrap();
        assert!(sim.world_mut().place_actor(id, x, y));
        id
    }

    #[test]
    fn test_countdown_reaches_zero() {
        let mut sim = sim(4, 4);
        let id = spawn_at(&mut sim, &["LOAD A 5", "INC A", "loop:", "DEC A", "JNZ loop"], 0, 0);
        sim.run(3);
        let cpu = sim.actor(id).unwrap().cpu();
        assert_eq!(cpu.reg(Reg::A), 0);
        assert_eq!(cpu.pc, 4);
    }

    #[test]
    fn test_move_into_occupied_tile_fails() {
        let mut sim = sim(4, 1);
        let mover = spawn_at(&mut sim, &["MOVE"], 0, 0);
        let _blocker = spawn_at(&mut sim, &[], 1, 0);

        let stats = sim.tick();
        assert_eq!(stats.sync_steps, 1);
        assert_eq!(sim.world().position(mover), Some((0, 0)));
        assert!(sim.actor(mover).unwrap().cpu().failed);
        assert!(!sim.actor(mover).unwrap().cpu().move_pending);
    }

    #[test]
    fn test_move_succeeds_and_lays_scent() {
        let mut sim = sim(4, 1);
        let id = spawn_at(&mut sim, &["SWN B", "MOVE", "MOVE"], 0, 0);
        sim.tick();
        assert_eq!(sim.world().position(id), Some((1, 0)));
        assert!(!sim.actor(id).unwrap().cpu().failed);
        assert_eq!(sim.world().scent_at(1, 0).unwrap()[1], 1);
        assert_eq!(sim.world().scent_at(0, 0).unwrap()[1], 0);
    }

    #[test]
    fn test_move_throttled_by_cost() {
        let mut sim = sim(8, 1);
        let id = spawn_at(&mut sim, &["walk:", "MOVE", "JMP walk"], 0, 0);
        // MOVE costs 1 tick, so the worker acts on every second tick
        sim.run(4);
        assert_eq!(sim.world().position(id), Some((2, 0)));
    }

    #[test]
    fn test_dig_then_walk() {
        let mut sim = sim(3, 1);
        sim.world_mut().set_tile(1, 0, Tile::Dirt);
        let id = spawn_at(&mut sim, &["try:", "MOVE", "JNF try", "DIG", "JMP try"], 0, 0);
        sim.run(10);
        assert_eq!(sim.world().tile(1, 0), Some(Tile::Open));
        assert!(sim.world().position(id).unwrap().0 >= 1);
    }

    #[test]
    fn test_check_and_turn() {
        let mut sim = sim(2, 2);
        let id = spawn_at(&mut sim, &["CHK", "JNF done", "RT", "done:", "NOP"], 0, 0);
        sim.world_mut().set_tile(1, 0, Tile::Rock);
        sim.run(3);
        let cpu = sim.actor(id).unwrap().cpu();
        assert!(cpu.failed);
        assert_eq!(cpu.heading(), Heading::Down);
    }

    #[test]
    fn test_call_ret_restores_frame() {
        let mut sim = sim(2, 2);
        let id = spawn_at(
            &mut sim,
            &["CALL sub", "INC B", "end:", "JMP end", "sub:", "LOAD A 9", "PUSH A", "RET"],
            0,
            0,
        );
        sim.tick();
        let cpu = sim.actor(id).unwrap().cpu();
        assert_eq!(cpu.reg(Reg::A), 9);
        assert_eq!(cpu.reg(Reg::B), 1);
        assert_eq!(cpu.sp, 0);
        assert_eq!(cpu.bp, 0);
    }

    #[test]
    fn test_assign_keeps_old_program_on_error() {
        let mut sim = sim(2, 2);
        let id = spawn_at(&mut sim, &["INC A"], 0, 0);
        let bad = MachineCode {
            code: vec![Opcode::LOAD.header(0), 1],
            labels: Default::default(),
        };
        assert!(sim.assign(id, &bad).is_err());
        assert!(sim.reload_all(&bad).is_err());
        sim.tick();
        assert_eq!(sim.actor(id).unwrap().cpu().reg(Reg::A), 1);

        assert!(matches!(
            sim.assign(ActorId(99), &assemble(&["NOP"]).unwrap()),
            Err(AntvmError::UnknownActor(99))
        ));
    }

    #[test]
    fn test_reload_keeps_registers() {
        let mut sim = sim(2, 2);
        let id = spawn_at(&mut sim, &["LOAD B 4", "end:", "JMP end"], 0, 0);
        sim.tick();
        sim.reload_all(&assemble(&["INC B"]).unwrap()).unwrap();
        sim.tick();
        let actor = sim.actor(id).unwrap();
        assert_eq!(actor.cpu().reg(Reg::B), 5);
        assert_eq!(actor.machine_code().step_count().unwrap(), 1);
    }

    #[test]
    fn test_driver_phases_explicit() {
        let mut sim = sim(2, 2);
        spawn_at(&mut sim, &["INC A", "MOVE"], 0, 0);
        sim.reset();
        sim.execute_async();
        sim.await_all();
        let stats = sim.execute_sync();
        assert_eq!(stats, TickStats { clock: 0, async_steps: 1, sync_steps: 1 });
        assert_eq!(sim.clock(), 1);
    }

    #[test]
    fn test_despawn() {
        let mut sim = sim(2, 2);
        let id = spawn_at(&mut sim, &["NOP"], 0, 0);
        assert!(sim.despawn(id).is_some());
        assert!(sim.actor(id).is_none());
        assert!(sim.despawn(id).is_none());
    }

    #[test]
    fn test_despawn_frees_tile() {
        let mut sim = sim(3, 1);
        let walker = spawn_at(&mut sim, &["MOVE"], 0, 0);
        let gone = spawn_at(&mut sim, &["NOP"], 1, 0);
        sim.despawn(gone);

        assert_eq!(sim.world().position(gone), None);
        assert_eq!(sim.world().actor_count(), 1);
        assert!(sim.world().surroundings(walker).open[Heading::Right.index()]);

        sim.tick();
        assert_eq!(sim.world().position(walker), Some((1, 0)));
        assert!(!sim.actor(walker).unwrap().cpu().failed);
    }

    #[test]
    fn test_pool_size_does_not_change_outcome() {
        let wanderer = assemble(&[
            "SWN A",
            "SWP A 3",
            "top:",
            "MOVE",
            "JNF top",
            "DIG",
            "JNF top",
            "SRT",
            "JNF top",
            "RT",
            "JMP top",
        ])
        .unwrap();

        let run = |threads: usize| {
            let world = GridWorld::generate(16, 16, 7, 0.3);
            let config = VmConfig::default().with_threads(threads);
            let mut sim = Simulation::new(world, config).unwrap();
            for _ in 0..12 {
                let id = sim.spawn(&wanderer).unwrap();
                sim.world_mut().place_anywhere(id);
            }
            sim.run(40);
            sim.actors()
                .iter()
                .map(|a| (sim.world().position(a.id()), a.cpu().clone()))
                .collect::<Vec<_>>()
        };

        assert_eq!(run(1), run(4));
    }
}
