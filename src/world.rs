//! World - The shared map that worker programs act upon
//!
//! The VM never walks world internals. World-touching steps and the
//! actor-level resolution of pending moves and digs go through the
//! [`World`] trait, and only during the serialized sync phase.
//!
//! [`GridWorld`] is a small tile grid implementation used by the runner
//! binary and the tests.

use crate::vm::{Heading, ScentLevels, SCENT_CHANNELS};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::fmt;

/// Stable handle of an actor inside a simulation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ActorId(pub u32);

impl fmt::Display for ActorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// What an actor can sense from its tile
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Surroundings {
    /// Whether each adjacent tile can be entered, indexed by heading
    pub open: [bool; 4],
    /// Scent levels of each adjacent tile, indexed by heading
    pub scents: [ScentLevels; 4],
}

/// Call surface the VM uses to touch shared state
pub trait World {
    /// Move the actor one tile along `heading`. Returns false if blocked.
    fn move_actor(&mut self, actor: ActorId, heading: Heading) -> bool;

    /// Dig out the tile ahead. Returns false if there is nothing diggable.
    fn dig(&mut self, actor: ActorId, heading: Heading) -> bool;

    /// Sense the four adjacent tiles
    fn surroundings(&self, actor: ActorId) -> Surroundings;

    /// Lay scent on the actor's current tile
    fn deposit_scent(&mut self, actor: ActorId, channel: u8, amount: u8);

    /// Take the actor off the map, freeing its tile
    fn remove_actor(&mut self, actor: ActorId);
}

/// Tile material
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Tile {
    /// Walkable
    Open,
    /// Blocks movement, can be dug
    Dirt,
    /// Blocks movement permanently
    Rock,
}

/// Rectangular tile grid with occupancy and scent layers
#[derive(Debug, Clone)]
pub struct GridWorld {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
    scents: Vec<ScentLevels>,
    positions: HashMap<ActorId, (i32, i32)>,
    occupant: Vec<Option<ActorId>>,
}

impl GridWorld {
    /// Create an all-open grid
    pub fn new(width: u32, height: u32) -> Self {
        let len = width as usize * height as usize;
        Self {
            width: width as i32,
            height: height as i32,
            tiles: vec![Tile::Open; len],
            scents: vec![[0; SCENT_CHANNELS]; len],
            positions: HashMap::new(),
            occupant: vec![None; len],
        }
    }

    /// Create a grid with a seeded scatter of dirt and rock
    pub fn generate(width: u32, height: u32, seed: u64, dirt_density: f64) -> Self {
        let mut world = Self::new(width, height);
        let mut rng = StdRng::seed_from_u64(seed);
        let density = if dirt_density.is_finite() {
            dirt_density.clamp(0.0, 1.0)
        } else {
            0.0
        };
        for tile in world.tiles.iter_mut() {
            if rng.gen_bool(density) {
                *tile = if rng.gen_ratio(1, 8) { Tile::Rock } else { Tile::Dirt };
            }
        }
        world
    }

    pub fn width(&self) -> u32 {
        self.width as u32
    }

    pub fn height(&self) -> u32 {
        self.height as u32
    }

    fn index(&self, x: i32, y: i32) -> Option<usize> {
        if x < 0 || y < 0 || x >= self.width || y >= self.height {
            return None;
        }
        Some((y * self.width + x) as usize)
    }

    pub fn tile(&self, x: i32, y: i32) -> Option<Tile> {
        self.index(x, y).map(|i| self.tiles[i])
    }

    pub fn set_tile(&mut self, x: i32, y: i32, tile: Tile) {
        if let Some(i) = self.index(x, y) {
            self.tiles[i] = tile;
        }
    }

    pub fn scent_at(&self, x: i32, y: i32) -> Option<ScentLevels> {
        self.index(x, y).map(|i| self.scents[i])
    }

    /// Place (or teleport) an actor onto an open, unoccupied tile
    pub fn place_actor(&mut self, actor: ActorId, x: i32, y: i32) -> bool {
        let Some(i) = self.index(x, y) else {
            return false;
        };
        if self.tiles[i] != Tile::Open || self.occupant[i].is_some() {
            return false;
        }
        self.remove_actor(actor);
        self.occupant[i] = Some(actor);
        self.positions.insert(actor, (x, y));
        true
    }

    /// Place an actor on the first free open tile in row-major order
    pub fn place_anywhere(&mut self, actor: ActorId) -> Option<(i32, i32)> {
        for y in 0..self.height {
            for x in 0..self.width {
                if self.place_actor(actor, x, y) {
                    return Some((x, y));
                }
            }
        }
        None
    }

    pub fn remove_actor(&mut self, actor: ActorId) {
        if let Some((x, y)) = self.positions.remove(&actor) {
            if let Some(i) = self.index(x, y) {
                self.occupant[i] = None;
            }
        }
    }

    pub fn position(&self, actor: ActorId) -> Option<(i32, i32)> {
        self.positions.get(&actor).copied()
    }

    pub fn actor_count(&self) -> usize {
        self.positions.len()
    }

    fn ahead(&self, actor: ActorId, heading: Heading) -> Option<(i32, i32)> {
        let (x, y) = self.position(actor)?;
        let (dx, dy) = heading.offset();
        Some((x + dx, y + dy))
    }

    fn is_enterable(&self, x: i32, y: i32) -> bool {
        match self.index(x, y) {
            Some(i) => self.tiles[i] == Tile::Open && self.occupant[i].is_none(),
            None => false,
        }
    }
}

impl World for GridWorld {
    fn move_actor(&mut self, actor: ActorId, heading: Heading) -> bool {
        let Some((x, y)) = self.ahead(actor, heading) else {
            return false;
        };
        if !self.is_enterable(x, y) {
            return false;
        }
        self.place_actor(actor, x, y)
    }

    fn dig(&mut self, actor: ActorId, heading: Heading) -> bool {
        let Some((x, y)) = self.ahead(actor, heading) else {
            return false;
        };
        match self.index(x, y) {
            Some(i) if self.tiles[i] == Tile::Dirt => {
                self.tiles[i] = Tile::Open;
                true
            }
            _ => false,
        }
    }

    fn surroundings(&self, actor: ActorId) -> Surroundings {
        let mut surroundings = Surroundings::default();
        let Some((x, y)) = self.position(actor) else {
            return surroundings;
        };
        for heading in Heading::ALL {
            let (dx, dy) = heading.offset();
            let (nx, ny) = (x + dx, y + dy);
            surroundings.open[heading.index()] = self.is_enterable(nx, ny);
            if let Some(levels) = self.scent_at(nx, ny) {
                surroundings.scents[heading.index()] = levels;
            }
        }
        surroundings
    }

    fn deposit_scent(&mut self, actor: ActorId, channel: u8, amount: u8) {
        let Some((x, y)) = self.position(actor) else {
            return;
        };
        if let Some(i) = self.index(x, y) {
            let level = &mut self.scents[i][channel as usize % SCENT_CHANNELS];
            *level = level.saturating_add(amount);
        }
    }

    fn remove_actor(&mut self, actor: ActorId) {
        GridWorld::remove_actor(self, actor);
    }
}
