//! Organisms, inert molecules and lineage records.

use serde::{Deserialize, Serialize};

use crate::opcode::{Atom, MOL_FLAG};
use crate::program::Program;

/// Lineage counter (organisms produced by `split` increment this).
#[derive(
    Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord,
)]
pub struct Generation(pub u32);

impl Generation {
    /// Advances to the next lineage generation.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

/// Inert code fragment lying on the grid.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Molecule {
    pub code: Vec<Atom>,
    pub offset: usize,
}

impl Molecule {
    /// Build a molecule, flagging its final atom as the molecule boundary.
    #[must_use]
    pub fn new(mut code: Vec<Atom>, offset: usize) -> Self {
        if let Some(last) = code.last_mut() {
            *last |= MOL_FLAG;
        }
        Self { code, offset }
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Remove and return the atom at `index`, keeping the boundary flag on
    /// whatever atom ends up last.
    pub fn take_atom(&mut self, index: usize) -> Option<Atom> {
        if index >= self.code.len() {
            return None;
        }
        let atom = self.code.remove(index);
        if let Some(last) = self.code.last_mut() {
            *last |= MOL_FLAG;
        }
        Some(atom)
    }
}

/// A running program placed on the grid.
#[derive(Debug, Clone)]
pub struct Organism {
    /// Unique lineage identifier, never reused.
    pub id: u64,
    pub parent: Option<u64>,
    pub generation: Generation,
    /// Grid cell holding this organism.
    pub offset: usize,
    pub energy: i64,
    /// Ticks lived.
    pub age: u64,
    pub color: u32,
    /// Molecule picked up with `get`, dropped with `put`.
    pub packet: Option<Molecule>,
    pub program: Program,
}

impl Organism {
    /// Alive while it has energy left and code to run.
    #[must_use]
    pub fn is_alive(&self) -> bool {
        self.energy > 0 && !self.program.is_empty()
    }
}

/// Snapshot emitted whenever a new organism appears.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BirthRecord {
    pub id: u64,
    pub parent: Option<u64>,
    pub generation: Generation,
    pub code: Vec<Atom>,
}

/// Consumer of lineage records (for example an external database writer).
pub trait LineageSink: Send {
    fn on_birth(&mut self, record: &BirthRecord);
}

/// No-op lineage sink.
#[derive(Debug, Default)]
pub struct NullLineage;

impl LineageSink for NullLineage {
    fn on_birth(&mut self, _record: &BirthRecord) {}
}
