//! antvm-run - Run a worker program in a generated world
//!
//! Usage: `antvm-run <program.ant> [--workers N] [--ticks T] [--seed S] [--watch]`
//!
//! Log output is controlled with `RUST_LOG`, e.g. `RUST_LOG=antvm=debug`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;

use antvm::vm::load_from_file;
use antvm::{GridWorld, ProgramLibrary, ProgramWatcher, Simulation, VmConfig};

#[derive(Parser, Debug)]
#[command(name = "antvm-run")]
#[command(about = "Run an ant worker program (.ant or .antm) on a seeded grid")]
struct Args {
    /// Program listing (.ant) or serialized machine code (.antm)
    program: PathBuf,

    /// Number of workers to spawn
    #[arg(long, default_value = "8")]
    workers: u32,

    /// Number of ticks to run
    #[arg(long, default_value = "100")]
    ticks: u64,

    /// Grid width
    #[arg(long, default_value = "32")]
    width: u32,

    /// Grid height
    #[arg(long, default_value = "32")]
    height: u32,

    /// World generation seed
    #[arg(long, default_value = "1")]
    seed: u64,

    /// Fraction of tiles filled with dirt or rock
    #[arg(long, default_value = "0.25")]
    density: f64,

    /// VM config file (JSON)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Worker pool size, overrides the config file
    #[arg(long)]
    threads: Option<usize>,

    /// Reload the program whenever the file changes
    #[arg(long)]
    watch: bool,

    /// Pause between ticks in milliseconds
    #[arg(long, default_value = "0")]
    tick_ms: u64,

    /// Write the program library snapshot (JSON) here when done
    #[arg(long)]
    save_library: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("antvm=info")),
        )
        .init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => VmConfig::from_json_file(path)?,
        None => VmConfig::default(),
    };
    if let Some(threads) = args.threads {
        config = config.with_threads(threads);
    }

    let mut library = ProgramLibrary::new();
    let lines = read_program(&args.program)?;
    library
        .add_lines(&lines)
        .with_context(|| format!("Failed to assemble {}", args.program.display()))?;
    if !library.has_code() {
        bail!("{} has no instructions", args.program.display());
    }
    if !args.density.is_finite() {
        bail!("--density must be a number between 0 and 1");
    }

    let world = GridWorld::generate(args.width, args.height, args.seed, args.density);
    let mut sim = Simulation::new(world, config)?;

    for _ in 0..args.workers {
        let id = sim.spawn(library.draft())?;
        if sim.world_mut().place_anywhere(id).is_none() {
            bail!("No free tile left for worker {}", id);
        }
        library.assign(id)?;
    }
    log::info!(
        "{} workers on a {}x{} grid (seed {})",
        args.workers,
        args.width,
        args.height,
        args.seed
    );

    let mut watcher = if args.watch {
        Some(ProgramWatcher::new(&args.program)?)
    } else {
        None
    };

    let mut async_steps = 0;
    let mut sync_steps = 0;
    for _ in 0..args.ticks {
        if let Some(watcher) = watcher.as_mut() {
            if let Some(machine_code) = watcher.poll_reload()? {
                if machine_code.is_empty() {
                    log::warn!("ignoring empty program, workers keep their current one");
                } else {
                    library.add_lines(&machine_code.disassemble()?)?;
                    sim.reload_all(library.draft())?;
                    for actor in sim.actors() {
                        library.assign(actor.id())?;
                    }
                }
            }
        }

        let stats = sim.tick();
        async_steps += stats.async_steps;
        sync_steps += stats.sync_steps;

        if args.tick_ms > 0 {
            std::thread::sleep(Duration::from_millis(args.tick_ms));
        }
    }

    println!(
        "{} ticks: {} local steps, {} world steps",
        sim.clock(),
        async_steps,
        sync_steps
    );
    println!("{:>5} {:>9} {:>6} {:>10} {:>10} {:>5} {}", "actor", "position", "facing", "A", "B", "pc", "flags");
    for actor in sim.actors() {
        let cpu = actor.cpu();
        let position = match sim.world().position(actor.id()) {
            Some((x, y)) => format!("{},{}", x, y),
            None => "-".to_string(),
        };
        let flags = format!(
            "{}{}",
            if cpu.zero { 'Z' } else { '-' },
            if cpu.failed { 'F' } else { '-' }
        );
        println!(
            "{:>5} {:>9} {:>6} {:>10} {:>10} {:>5} {}",
            actor.id().to_string(),
            position,
            cpu.heading().name(),
            cpu.regs[0],
            cpu.regs[1],
            cpu.pc,
            flags
        );
    }

    if let Some(path) = &args.save_library {
        library.save_json(path)?;
        log::info!("library saved to {}", path.display());
    }

    Ok(())
}

/// Source lines of a listing, or the disassembly of a machine code blob
fn read_program(path: &Path) -> Result<Vec<String>> {
    if path.extension().map_or(false, |e| e == "antm") {
        let machine_code = load_from_file(path)?;
        return Ok(machine_code.disassemble()?);
    }
    let source = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(source.lines().map(str::to_string).collect())
}
