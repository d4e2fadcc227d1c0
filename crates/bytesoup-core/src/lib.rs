//! Core types and scheduler for the bytesoup artificial-life simulation.
//!
//! Organisms are small byte programs living on a bounded grid next to inert
//! molecules of code. An [`Engine`] advances a [`World`] in bounded batches:
//! every organism executes a fixed instruction budget per tick, pays a
//! metabolic cost, and periodically mutates by trading atoms with the
//! molecule pool.

pub mod assembly;
pub mod compiler;
pub mod config;
pub mod engine;
pub mod extension;
pub mod grid;
pub mod hooks;
pub mod mutation;
pub mod opcode;
pub mod organism;
pub mod pool;
pub mod program;
pub mod world;

pub use assembly::{Assembly, AssemblyError};
pub use config::{SoupConfig, WorldError};
pub use engine::{
    BaseInstructions, Dispatch, Engine, InstructionTable, NoExtension, RunSummary, Slice,
};
pub use extension::SpatialExtension;
pub use grid::{Grid, Occupant};
pub use hooks::{HookMode, HookRegistry, LifecycleListener, ListenerId};
pub use mutation::{MutationEngine, MutationReport, Operator};
pub use opcode::{Atom, Band, Decoded, Opcode};
pub use organism::{BirthRecord, Generation, LineageSink, Molecule, NullLineage, Organism};
pub use pool::{Pool, PoolError};
pub use program::{Program, RET_ERR, RET_OK};
pub use world::World;
