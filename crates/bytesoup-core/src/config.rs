//! Static world configuration.

use rand::{SeedableRng, rngs::SmallRng};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::assembly::AssemblyError;
use crate::mutation::Operator;
use crate::opcode::{Band, Opcode, VALUE_MASK};
use crate::pool::PoolError;

/// Errors that can occur when constructing or editing world state.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WorldError {
    /// Indicates an invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    #[error("offset {0} lies outside the grid")]
    OutOfBounds(usize),
    #[error("cell {0} is already occupied")]
    Occupied(usize),
    #[error("code of {len} atoms exceeds the maximum of {max}")]
    CodeTooLarge { len: usize, max: usize },
    #[error("code must contain at least one atom")]
    EmptyCode,
    #[error(transparent)]
    Pool(#[from] PoolError),
    #[error("seed program: {0}")]
    Assembly(#[from] AssemblyError),
}

/// Static configuration for a bytesoup world.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SoupConfig {
    /// Grid width in cells.
    pub world_width: u32,
    /// Grid height in cells.
    pub world_height: u32,
    /// Maximum number of live organisms.
    pub org_capacity: usize,
    /// Maximum number of inert molecules.
    pub mol_capacity: usize,
    /// Instructions each organism executes per tick.
    pub instructions_per_tick: usize,
    /// Scheduling passes per [`crate::Engine::run`] call.
    pub repeats_per_run: usize,
    /// Upper bound on an organism's code length.
    pub code_max_size: usize,
    /// First atom value interpreted as a command; lower values are literals.
    pub cmd_offset: u8,
    /// Number of enabled commands starting at `cmd_offset`.
    pub opcode_count: u8,
    /// Cells in each organism's circular memory.
    pub memory_size: usize,
    /// Maximum nested calls.
    pub stack_depth: usize,
    /// Default ticks between mutation bursts.
    pub mutation_period: u32,
    /// Default fraction of the code mutated per burst.
    pub mutation_percent: f32,
    /// Upper bound when an organism redraws its mutation period.
    pub mutation_period_max: u32,
    /// Upper bound when an organism redraws its mutation percent.
    pub mutation_percent_max: f32,
    /// Upper bound when an organism redraws one operator weight.
    pub mutation_probability_max: u32,
    /// Whether the `period` operator may redraw the period.
    pub mutate_period: bool,
    /// Whether the `percent` operator may redraw the percent.
    pub mutate_percent: bool,
    /// Default operator weights, one per [`Operator`].
    pub mutation_probabilities: Vec<u32>,
    /// Energy stored in a single atom.
    pub atom_energy: i64,
    /// Metabolic cost per atom paid every tick.
    pub atom_cost: f64,
    /// Energy per atom of code paid for each `step`.
    pub step_energy_coefficient: f64,
    /// Lowest color an organism may choose.
    pub color_min: u32,
    /// Colors wrap modulo this value.
    pub color_max: u32,
    /// Number of `say`/`listen` frequencies.
    pub frequency_channels: usize,
    /// Organisms placed by [`crate::World::populate`].
    pub initial_organisms: usize,
    /// Molecules placed by [`crate::World::populate`].
    pub initial_molecules: usize,
    /// Length of randomly generated seed code.
    pub seed_code_size: usize,
    /// Optional assembly listing used for every seeded organism.
    pub seed_program: Option<String>,
    /// Longest randomly generated molecule.
    pub molecule_max_atoms: usize,
    /// Ticks between molecule decay passes; read by plugins only.
    pub decay_period: u64,
    /// Ticks between molecule fusion passes; read by plugins only.
    pub fusion_period: u64,
    /// Optional RNG seed for reproducible worlds.
    pub rng_seed: Option<u64>,
}

impl Default for SoupConfig {
    fn default() -> Self {
        Self {
            world_width: 320,
            world_height: 200,
            org_capacity: 2_000,
            mol_capacity: 8_000,
            instructions_per_tick: 24,
            repeats_per_run: 10,
            code_max_size: 256,
            cmd_offset: 64,
            opcode_count: Opcode::ALL.len() as u8,
            memory_size: 32,
            stack_depth: 16,
            mutation_period: 500,
            mutation_percent: 0.02,
            mutation_period_max: 2_000,
            mutation_percent_max: 0.1,
            mutation_probability_max: 100,
            mutate_period: true,
            mutate_percent: true,
            mutation_probabilities: vec![60, 15, 15, 2, 2, 6],
            atom_energy: 100,
            atom_cost: 0.01,
            step_energy_coefficient: 0.05,
            color_min: 0x30_30_30,
            color_max: 0xFF_FF_FF,
            frequency_channels: 16,
            initial_organisms: 200,
            initial_molecules: 2_000,
            seed_code_size: 32,
            seed_program: None,
            molecule_max_atoms: 8,
            decay_period: 0,
            fusion_period: 0,
            rng_seed: None,
        }
    }
}

impl SoupConfig {
    /// Validates every field, returning the first problem found.
    pub fn validate(&self) -> Result<(), WorldError> {
        if self.world_width == 0 || self.world_height == 0 {
            return Err(WorldError::InvalidConfig(
                "world dimensions must be non-zero",
            ));
        }
        let cells = (self.world_width as usize) * (self.world_height as usize);
        if cells > i32::MAX as usize {
            return Err(WorldError::InvalidConfig("world has too many cells"));
        }
        if self.org_capacity == 0 || self.org_capacity >= i32::MAX as usize {
            return Err(WorldError::InvalidConfig(
                "org_capacity must be positive and fit in a grid cell",
            ));
        }
        if self.mol_capacity >= i32::MAX as usize {
            return Err(WorldError::InvalidConfig(
                "mol_capacity must fit in a grid cell",
            ));
        }
        if self.instructions_per_tick == 0 || self.repeats_per_run == 0 {
            return Err(WorldError::InvalidConfig(
                "instructions_per_tick and repeats_per_run must be positive",
            ));
        }
        if self.code_max_size == 0 {
            return Err(WorldError::InvalidConfig("code_max_size must be positive"));
        }
        if self.cmd_offset == 0 || self.cmd_offset > VALUE_MASK {
            return Err(WorldError::InvalidConfig(
                "cmd_offset must lie within the 7-bit atom value range",
            ));
        }
        if usize::from(self.opcode_count) > Opcode::ALL.len()
            || u16::from(self.cmd_offset) + u16::from(self.opcode_count)
                > u16::from(VALUE_MASK) + 1
        {
            return Err(WorldError::InvalidConfig(
                "opcode band must fit inside the atom value range",
            ));
        }
        if self.memory_size == 0 || self.stack_depth == 0 {
            return Err(WorldError::InvalidConfig(
                "memory_size and stack_depth must be positive",
            ));
        }
        if self.mutation_period == 0 || self.mutation_period_max == 0 {
            return Err(WorldError::InvalidConfig(
                "mutation periods must be positive",
            ));
        }
        if !(0.0..=1.0).contains(&self.mutation_percent)
            || !(0.0..=1.0).contains(&self.mutation_percent_max)
        {
            return Err(WorldError::InvalidConfig(
                "mutation percents must lie in [0, 1]",
            ));
        }
        if self.mutation_probabilities.len() != Operator::ALL.len() {
            return Err(WorldError::InvalidConfig(
                "mutation_probabilities needs one weight per operator",
            ));
        }
        if self.atom_energy <= 0
            || self.atom_cost < 0.0
            || self.step_energy_coefficient < 0.0
        {
            return Err(WorldError::InvalidConfig(
                "atom_energy must be positive and costs non-negative",
            ));
        }
        if self.color_max == 0 || self.color_min >= self.color_max {
            return Err(WorldError::InvalidConfig(
                "color_min must be below a positive color_max",
            ));
        }
        if self.frequency_channels == 0 {
            return Err(WorldError::InvalidConfig(
                "frequency_channels must be positive",
            ));
        }
        if self.initial_organisms > self.org_capacity
            || self.initial_molecules > self.mol_capacity
            || self.initial_organisms + self.initial_molecules > cells
        {
            return Err(WorldError::InvalidConfig(
                "initial population exceeds pool or grid capacity",
            ));
        }
        if self.seed_code_size == 0
            || self.seed_code_size > self.code_max_size
            || self.molecule_max_atoms == 0
        {
            return Err(WorldError::InvalidConfig(
                "seed sizes must be positive and within code_max_size",
            ));
        }
        Ok(())
    }

    /// Command band derived from `cmd_offset` and `opcode_count`.
    #[must_use]
    pub fn band(&self) -> Band {
        Band::new(self.cmd_offset, self.opcode_count)
    }

    /// Returns the configured RNG seed, generating one from entropy if absent.
    pub(crate) fn seeded_rng(&self) -> SmallRng {
        match self.rng_seed {
            Some(seed) => SmallRng::seed_from_u64(seed),
            None => {
                let seed: u64 = rand::random();
                SmallRng::seed_from_u64(seed)
            }
        }
    }
}
