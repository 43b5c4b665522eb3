//! # Antvm - Worker Program Virtual Machine
//!
//! Runs small assembly programs that drive worker ants through a shared
//! world, one program per worker, all workers advancing in lockstep ticks.
//!
//! ## Core Components
//!
//! - **Ant VM** (`vm`): instruction catalogue, assembler/disassembler,
//!   compiler to executable steps, register file and per-worker scheduler
//! - **Tick coordinator** (`sim`): async phase on a worker pool, barrier,
//!   serialized sync phase against the world
//! - **World** (`world`): the trait programs act through, plus a grid
//! - **Program library** (`library`): draft and assigned programs
//!
//! ## Example
//!
//! ```ignore
//! use antvm::{assemble, GridWorld, Simulation, VmConfig};
//!
//! let code = assemble(&["walk:", "MOVE", "JNF walk", "RT", "JMP walk"])?;
//! let mut sim = Simulation::new(GridWorld::generate(32, 32, 1, 0.2), VmConfig::default())?;
//! let ant = sim.spawn(&code)?;
//! sim.world_mut().place_anywhere(ant);
//! sim.run(100);
//! ```

pub mod config;
pub mod error;
pub mod library;
pub mod sim;
pub mod validate;
pub mod vm;
pub mod world;

pub use config::VmConfig;
pub use error::{AntvmError, CodeError, Result};
pub use library::{LibrarySnapshot, ProgramLibrary};
pub use sim::{Actor, Simulation, TickStats};
pub use vm::{
    // Assembly
    assemble, assemble_source, disassemble, AssemblerError, MachineCode,
    // Execution
    compile, Cpu, Heading, Program, ProgramScheduler, Reg, Step,
    // Binary format
    deserialize, load_from_file, save_to_file, serialize,
    // Hot reload
    ProgramWatcher, ReloadEvent,
};
pub use world::{ActorId, GridWorld, Surroundings, Tile, World};
