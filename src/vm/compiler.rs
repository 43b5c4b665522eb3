//! Compiler - bytecode to executable steps
//!
//! Each instruction compiles to exactly one [`Step`]. A step captures its
//! decoded operands and is invoked against the owning actor's register
//! file. Steps never hold references to actor state, so a compiled
//! program can be moved between threads and reused across reassignments.
//!
//! ```text
//! bytecode ──decode──▶ InstructionDef ──compile rule──▶ Step { ticks, effect }
//!
//! Effect::Local  fn(&mut Cpu)                          async phase, ticks == 0
//!                                                      (or a flag-setting world step)
//! Effect::World  fn(&mut Cpu, &mut dyn World, ActorId) sync phase only
//! ```

use super::instruction::{decode, Decoded};
use super::opcode::Opcode;
use super::register::Cpu;
use crate::error::CodeError;
use crate::world::{ActorId, World};

/// Local effect: touches only the actor's own register file
pub type LocalFn = Box<dyn Fn(&mut Cpu) + Send + Sync>;
/// World effect: may read or mutate shared world state
pub type WorldFn = Box<dyn Fn(&mut Cpu, &mut dyn World, ActorId) + Send + Sync>;

/// What a step does when invoked
pub enum Effect {
    Local(LocalFn),
    World(WorldFn),
}

impl Effect {
    pub fn local(f: impl Fn(&mut Cpu) + Send + Sync + 'static) -> Self {
        Self::Local(Box::new(f))
    }

    pub fn world(f: impl Fn(&mut Cpu, &mut dyn World, ActorId) + Send + Sync + 'static) -> Self {
        Self::World(Box::new(f))
    }

    pub fn touches_world(&self) -> bool {
        matches!(self, Self::World(_))
    }
}

/// One executable unit produced from one bytecode instruction
pub struct Step {
    opcode: Opcode,
    ticks: u16,
    effect: Effect,
}

impl Step {
    pub fn opcode(&self) -> Opcode {
        self.opcode
    }

    /// 0 = local, N>0 = world step costing N ticks
    pub fn ticks(&self) -> u16 {
        self.ticks
    }

    pub fn is_local(&self) -> bool {
        self.ticks == 0
    }

    /// Run a 0-tick step. Only valid in the async phase.
    pub fn run_local(&self, cpu: &mut Cpu) {
        debug_assert!(self.ticks == 0, "{} costs {} ticks but ran in the async phase", self.opcode, self.ticks);
        match &self.effect {
            Effect::Local(f) => f(cpu),
            Effect::World(_) => {
                debug_assert!(false, "{} needs the world but ran in the async phase", self.opcode);
            }
        }
    }

    /// Run any step with world access. Only valid in the sync phase.
    pub fn run(&self, cpu: &mut Cpu, world: &mut dyn World, actor: ActorId) {
        match &self.effect {
            Effect::Local(f) => f(cpu),
            Effect::World(f) => f(cpu, world, actor),
        }
    }
}

impl std::fmt::Debug for Step {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Step")
            .field("opcode", &self.opcode)
            .field("ticks", &self.ticks)
            .field("world", &self.effect.touches_world())
            .finish()
    }
}

/// A compiled program: one step per instruction line
#[derive(Debug, Default)]
pub struct Program {
    steps: Vec<Step>,
}

impl Program {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Step> {
        self.steps.get(index)
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }
}

fn compile_one(decoded: Decoded<'_>) -> Step {
    let def = decoded.def;
    Step {
        opcode: def.opcode,
        ticks: def.ticks,
        effect: (def.compile)(decoded.bytes),
    }
}

/// Compile a bytecode buffer. No partial program is returned on error.
pub fn compile(code: &[u8]) -> Result<Program, CodeError> {
    let steps = decode(code)
        .map(|decoded| decoded.map(compile_one))
        .collect::<Result<Vec<_>, _>>()?;
    log::debug!("compiled {} bytes into {} steps", code.len(), steps.len());
    Ok(Program { steps })
}

/// Per-opcode compile rules referenced by the instruction catalogue
pub(crate) mod rules {
    use super::Effect;
    use crate::vm::instruction::{
        channel_operand, const_operand, priority_operand, reg_operand, reg_pair_operand,
        target_operand,
    };

    pub fn nop(_: &[u8]) -> Effect {
        Effect::local(|_| {})
    }

    pub fn move_forward(_: &[u8]) -> Effect {
        Effect::local(|cpu| cpu.move_pending = true)
    }

    pub fn dig(_: &[u8]) -> Effect {
        Effect::local(|cpu| cpu.dig_pending = true)
    }

    pub fn check(_: &[u8]) -> Effect {
        Effect::world(|cpu, world, actor| {
            cpu.observe(&world.surroundings(actor));
            cpu.failed = !cpu.is_open(cpu.heading());
        })
    }

    pub fn load(bytes: &[u8]) -> Effect {
        let reg = reg_operand(bytes);
        let value = const_operand(bytes);
        Effect::local(move |cpu| cpu.set_reg(reg, value))
    }

    pub fn copy(bytes: &[u8]) -> Effect {
        let (src, dst) = reg_pair_operand(bytes);
        Effect::local(move |cpu| cpu.set_reg(dst, cpu.reg(src)))
    }

    pub fn add(bytes: &[u8]) -> Effect {
        let (src, dst) = reg_pair_operand(bytes);
        Effect::local(move |cpu| cpu.set_reg(dst, cpu.reg(dst).wrapping_add(cpu.reg(src))))
    }

    pub fn sub(bytes: &[u8]) -> Effect {
        let (src, dst) = reg_pair_operand(bytes);
        Effect::local(move |cpu| cpu.set_reg(dst, cpu.reg(dst).wrapping_sub(cpu.reg(src))))
    }

    pub fn inc(bytes: &[u8]) -> Effect {
        let reg = reg_operand(bytes);
        Effect::local(move |cpu| cpu.set_reg(reg, cpu.reg(reg).wrapping_add(1)))
    }

    pub fn dec(bytes: &[u8]) -> Effect {
        let reg = reg_operand(bytes);
        Effect::local(move |cpu| cpu.set_reg(reg, cpu.reg(reg).wrapping_sub(1)))
    }

    pub fn jmp(bytes: &[u8]) -> Effect {
        let target = target_operand(bytes);
        Effect::local(move |cpu| cpu.jump_to(target))
    }

    pub fn jnz(bytes: &[u8]) -> Effect {
        let target = target_operand(bytes);
        Effect::local(move |cpu| {
            if !cpu.zero {
                cpu.jump_to(target);
            }
        })
    }

    pub fn jnf(bytes: &[u8]) -> Effect {
        let target = target_operand(bytes);
        Effect::local(move |cpu| {
            if !cpu.failed {
                cpu.jump_to(target);
            }
        })
    }

    pub fn call(bytes: &[u8]) -> Effect {
        let target = target_operand(bytes);
        Effect::local(move |cpu| {
            cpu.call(target);
        })
    }

    pub fn ret(_: &[u8]) -> Effect {
        Effect::local(|cpu| {
            cpu.ret();
        })
    }

    pub fn push(bytes: &[u8]) -> Effect {
        let reg = reg_operand(bytes);
        Effect::local(move |cpu| {
            let value = cpu.reg(reg);
            cpu.push(value);
        })
    }

    pub fn pop(bytes: &[u8]) -> Effect {
        let reg = reg_operand(bytes);
        Effect::local(move |cpu| {
            if let Some(value) = cpu.pop() {
                cpu.set_reg(reg, value);
            }
        })
    }

    pub fn turn_left(_: &[u8]) -> Effect {
        Effect::local(|cpu| cpu.turn_left())
    }

    pub fn turn_right(_: &[u8]) -> Effect {
        Effect::local(|cpu| cpu.turn_right())
    }

    pub fn scent_read_turn(_: &[u8]) -> Effect {
        Effect::local(|cpu| cpu.scent_read_turn())
    }

    pub fn scent_priority(bytes: &[u8]) -> Effect {
        let channel = channel_operand(bytes);
        let priority = priority_operand(bytes);
        Effect::local(move |cpu| cpu.scent.set_priority(channel, priority))
    }

    pub fn scent_write_on(bytes: &[u8]) -> Effect {
        let channel = channel_operand(bytes);
        Effect::local(move |cpu| cpu.scent.set_write_channel(Some(channel)))
    }

    pub fn scent_write_off(_: &[u8]) -> Effect {
        Effect::local(|cpu| cpu.scent.set_write_channel(None))
    }
}
