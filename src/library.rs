//! Program library - the editor-facing side of worker programs
//!
//! Holds one draft program and every program that was ever handed to a
//! worker. Assigning the draft pins it; the next edit archives the pinned
//! draft and starts a fresh one, so workers keep running exactly what
//! they were given.
//!
//! ```text
//!  add_lines ──▶ draft ──assign(actor)──▶ draft (pinned)
//!                  │                          │ add_lines
//!                  │ add_lines                ▼
//!                  ▼                     archive[n] ◀── actor
//!               discarded
//! ```

use crate::error::{AntvmError, Result};
use crate::vm::{assemble, deserialize, serialize, AssemblerError, MachineCode};
use crate::world::ActorId;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

#[derive(Debug, Clone, Default)]
pub struct ProgramLibrary {
    draft: MachineCode,
    draft_assigned: bool,
    archive: Vec<MachineCode>,
    assignments: BTreeMap<ActorId, usize>,
}

impl ProgramLibrary {
    pub fn new() -> Self {
        Self::default()
    }

    /// Whether the draft holds any instructions
    pub fn has_code(&self) -> bool {
        !self.draft.is_empty()
    }

    pub fn draft(&self) -> &MachineCode {
        &self.draft
    }

    /// Replace the draft with freshly assembled lines.
    ///
    /// On error the draft is left empty; programs already assigned to
    /// workers are untouched.
    pub fn add_lines<S: AsRef<str>>(&mut self, lines: &[S]) -> std::result::Result<(), AssemblerError> {
        self.retire_draft();
        match assemble(lines) {
            Ok(machine_code) => {
                self.draft = machine_code;
                Ok(())
            }
            Err(e) => {
                log::warn!("rejected program draft: {}", e);
                Err(e)
            }
        }
    }

    /// Normalized source of the draft, for the editor
    pub fn get_lines(&self) -> Result<Vec<String>> {
        Ok(self.draft.disassemble()?)
    }

    /// Pin the draft to `actor`. An empty draft is never handed out.
    pub fn assign(&mut self, actor: ActorId) -> Result<()> {
        if !self.has_code() {
            return Err(AntvmError::EmptyProgram);
        }
        self.draft_assigned = true;
        // The draft takes this slot once it is archived
        self.assignments.insert(actor, self.archive.len());
        Ok(())
    }

    /// Program an actor was given (the draft if it is still pinned)
    pub fn program_for(&self, actor: ActorId) -> Result<&MachineCode> {
        let index = *self
            .assignments
            .get(&actor)
            .ok_or(AntvmError::UnknownActor(actor.0))?;
        Ok(self.archive.get(index).unwrap_or(&self.draft))
    }

    /// Forget an actor's assignment
    pub fn unassign(&mut self, actor: ActorId) -> bool {
        self.assignments.remove(&actor).is_some()
    }

    /// Programs that were assigned and then superseded by an edit
    pub fn archived(&self) -> &[MachineCode] {
        &self.archive
    }

    fn retire_draft(&mut self) {
        let draft = std::mem::take(&mut self.draft);
        if self.draft_assigned {
            log::debug!("archiving assigned draft as program {}", self.archive.len());
            self.archive.push(draft);
            self.draft_assigned = false;
        } else {
            log::debug!("discarding unassigned draft ({} bytes)", draft.code.len());
        }
    }

    // =========================================================================
    // Persistence
    // =========================================================================

    pub fn snapshot(&self) -> anyhow::Result<LibrarySnapshot> {
        let archive = self
            .archive
            .iter()
            .map(serialize)
            .collect::<anyhow::Result<Vec<_>>>()?;
        let assignments = self
            .assignments
            .iter()
            .map(|(actor, program)| Assignment {
                actor: actor.0,
                program: *program,
            })
            .collect();

        Ok(LibrarySnapshot {
            draft: serialize(&self.draft)?,
            draft_assigned: self.draft_assigned,
            archive,
            assignments,
        })
    }

    pub fn from_snapshot(snapshot: &LibrarySnapshot) -> anyhow::Result<Self> {
        let draft = deserialize(&snapshot.draft).context("Invalid draft program")?;
        let archive = snapshot
            .archive
            .iter()
            .enumerate()
            .map(|(i, blob)| deserialize(blob).with_context(|| format!("Invalid archived program {}", i)))
            .collect::<anyhow::Result<Vec<_>>>()?;
        let assignments = snapshot
            .assignments
            .iter()
            .map(|a| (ActorId(a.actor), a.program))
            .collect();

        Ok(Self {
            draft,
            draft_assigned: snapshot.draft_assigned,
            archive,
            assignments,
        })
    }

    pub fn save_json(&self, path: impl AsRef<Path>) -> anyhow::Result<()> {
        let path = path.as_ref();
        let json = serde_json::to_string_pretty(&self.snapshot()?)?;
        std::fs::write(path, json).with_context(|| format!("Failed to write {}", path.display()))
    }

    pub fn load_json(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let snapshot: LibrarySnapshot = serde_json::from_str(&json)
            .with_context(|| format!("Invalid library snapshot {}", path.display()))?;
        Self::from_snapshot(&snapshot)
    }
}

/// Serializable form of a [`ProgramLibrary`]. Programs are stored as
/// machine code blobs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LibrarySnapshot {
    pub draft: Vec<u8>,
    pub draft_assigned: bool,
    pub archive: Vec<Vec<u8>>,
    /// Sorted by actor
    pub assignments: Vec<Assignment>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Assignment {
    pub actor: u32,
    pub program: usize,
}
