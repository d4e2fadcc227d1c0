//! Grid, pools and the shared state every organism acts on.

use rand::Rng;
use rand::rngs::SmallRng;
use tracing::{debug, info};

use crate::assembly::Assembly;
use crate::config::{SoupConfig, WorldError};
use crate::grid::{DIRECTIONS, Grid, Occupant};
use crate::opcode::{Atom, Band};
use crate::organism::{BirthRecord, Generation, LineageSink, Molecule, NullLineage, Organism};
use crate::pool::Pool;
use crate::program::Program;

/// Random probes before [`World::random_free_cell`] falls back to a scan.
const FREE_CELL_PROBES: usize = 64;

/// Simulation state: grid, organism and molecule pools, radio channels.
pub struct World {
    pub(crate) config: SoupConfig,
    pub(crate) band: Band,
    pub(crate) rng: SmallRng,
    pub(crate) grid: Grid,
    pub(crate) organisms: Pool<Organism>,
    pub(crate) molecules: Pool<Molecule>,
    pub(crate) channels: Vec<i32>,
    next_id: u64,
    lineage: Box<dyn LineageSink>,
    births: usize,
    pub(crate) deaths: usize,
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("width", &self.grid.width())
            .field("height", &self.grid.height())
            .field("organisms", &self.organisms.count_active())
            .field("molecules", &self.molecules.count_active())
            .field("next_id", &self.next_id)
            .finish()
    }
}

impl World {
    /// Instantiate an empty world from the provided config.
    pub fn new(config: SoupConfig) -> Result<Self, WorldError> {
        Self::with_lineage(config, Box::new(NullLineage))
    }

    /// Instantiate an empty world that reports every birth to `lineage`.
    pub fn with_lineage(
        config: SoupConfig,
        lineage: Box<dyn LineageSink>,
    ) -> Result<Self, WorldError> {
        config.validate()?;
        let grid = Grid::new(config.world_width, config.world_height)?;
        Ok(Self {
            band: config.band(),
            rng: config.seeded_rng(),
            grid,
            organisms: Pool::new(config.org_capacity),
            molecules: Pool::new(config.mol_capacity),
            channels: vec![0; config.frequency_channels],
            next_id: 0,
            lineage,
            births: 0,
            deaths: 0,
            config,
        })
    }

    /// Seed the grid with `initial_organisms` and `initial_molecules`.
    ///
    /// Organisms run `seed_program` when one is configured and random code
    /// otherwise; molecules are always random.
    pub fn populate(&mut self) -> Result<(), WorldError> {
        let seed = match &self.config.seed_program {
            Some(text) => Some(Assembly::new(self.band).assemble(text)?),
            None => None,
        };
        if seed.as_ref().is_some_and(Vec::is_empty) {
            return Err(WorldError::EmptyCode);
        }

        for _ in 0..self.config.initial_organisms {
            let Some(offset) = self.random_free_cell() else {
                break;
            };
            let code = match &seed {
                Some(code) => code.clone(),
                None => self.random_code(self.config.seed_code_size),
            };
            self.spawn_organism(offset, code)?;
        }
        for _ in 0..self.config.initial_molecules {
            let Some(offset) = self.random_free_cell() else {
                break;
            };
            let len = self.rng.random_range(1..=self.config.molecule_max_atoms);
            let code = self.random_code(len);
            self.spawn_molecule(offset, code)?;
        }

        info!(
            organisms = self.organisms.count_active(),
            molecules = self.molecules.count_active(),
            "populated world"
        );
        Ok(())
    }

    /// Atoms drawn uniformly from literals and enabled commands.
    fn random_code(&mut self, len: usize) -> Vec<Atom> {
        let upper = self.band.cmd_offset + self.band.opcode_count;
        (0..len).map(|_| self.rng.random_range(0..upper)).collect()
    }

    /// Place a fresh generation-zero organism at `offset`.
    pub fn spawn_organism(&mut self, offset: usize, code: Vec<Atom>) -> Result<usize, WorldError> {
        self.check_target(offset, &code)?;
        if code.len() > self.config.code_max_size {
            return Err(WorldError::CodeTooLarge {
                len: code.len(),
                max: self.config.code_max_size,
            });
        }
        let energy = code.len() as i64 * self.config.atom_energy;
        let color = self
            .rng
            .random_range(self.config.color_min..self.config.color_max);
        let program = Program::new(code, &self.config);
        self.admit(None, Generation::default(), offset, energy, color, program)
    }

    /// Place an inert molecule at `offset`.
    pub fn spawn_molecule(&mut self, offset: usize, code: Vec<Atom>) -> Result<usize, WorldError> {
        self.check_target(offset, &code)?;
        let slot = self.molecules.add(Molecule::new(code, offset))?;
        self.grid.place(offset, Occupant::Molecule(slot));
        Ok(slot)
    }

    fn check_target(&self, offset: usize, code: &[Atom]) -> Result<(), WorldError> {
        if !self.grid.in_bounds(offset) {
            return Err(WorldError::OutOfBounds(offset));
        }
        if !self.grid.is_free(offset) {
            return Err(WorldError::Occupied(offset));
        }
        if code.is_empty() {
            return Err(WorldError::EmptyCode);
        }
        Ok(())
    }

    /// Register a new organism in the pool, on the grid and with the sink.
    fn admit(
        &mut self,
        parent: Option<u64>,
        generation: Generation,
        offset: usize,
        energy: i64,
        color: u32,
        program: Program,
    ) -> Result<usize, WorldError> {
        let id = self.next_id;
        let record = BirthRecord {
            id,
            parent,
            generation,
            code: program.code().to_vec(),
        };
        let slot = self.organisms.add(Organism {
            id,
            parent,
            generation,
            offset,
            energy,
            age: 0,
            color,
            packet: None,
            program,
        })?;
        self.next_id += 1;
        self.grid.place(offset, Occupant::Organism(slot));
        self.births += 1;
        self.lineage.on_birth(&record);
        Ok(slot)
    }

    /// Place a child of `parent` produced by `split`.
    pub(crate) fn adopt_offspring(
        &mut self,
        parent: &Organism,
        program: Program,
        offset: usize,
        energy: i64,
    ) -> Option<usize> {
        let generation = parent.generation.next();
        match self.admit(
            Some(parent.id),
            generation,
            offset,
            energy,
            parent.color,
            program,
        ) {
            Ok(slot) => {
                debug!(parent = parent.id, slot, generation = generation.0, "offspring born");
                Some(slot)
            }
            Err(err) => {
                debug!(parent = parent.id, error = %err, "offspring rejected");
                None
            }
        }
    }

    /// Remove an organism by handle, leaving its cell empty.
    pub fn remove_organism(&mut self, slot: usize) -> Option<Organism> {
        let organism = self.organisms.remove(slot)?;
        self.grid.clear(organism.offset);
        self.deaths += 1;
        Some(organism)
    }

    /// Remove a molecule by handle, leaving its cell empty.
    pub fn remove_molecule(&mut self, slot: usize) -> Option<Molecule> {
        let molecule = self.molecules.remove(slot)?;
        self.grid.clear(molecule.offset);
        Some(molecule)
    }

    /// Drop `code` as a molecule when the cell is free and the pool has room.
    pub(crate) fn drop_molecule(&mut self, offset: usize, code: Vec<Atom>) -> Option<usize> {
        if code.is_empty() || self.molecules.is_full() || !self.grid.is_free(offset) {
            return None;
        }
        self.spawn_molecule(offset, code).ok()
    }

    /// Release the checked-out `slot` of a dead organism.
    ///
    /// Its code stays behind as a molecule on its cell and any carried packet
    /// is dropped on a free neighbouring cell, each only while the molecule
    /// pool has room.
    pub(crate) fn bury(&mut self, slot: usize, organism: Organism) {
        self.organisms.release_vacant(slot);
        self.grid.clear(organism.offset);
        self.deaths += 1;
        let Organism {
            id,
            offset,
            program,
            packet,
            age,
            ..
        } = organism;
        let remains = self.drop_molecule(offset, program.code().to_vec());
        if let Some(packet) = packet
            && let Some(cell) = self.free_neighbor(offset)
        {
            self.drop_molecule(cell, packet.code);
        }
        debug!(id, slot, age, remains = remains.is_some(), "organism died");
    }

    /// A uniformly chosen empty cell, if any remain.
    pub fn random_free_cell(&mut self) -> Option<usize> {
        let cells = self.grid.len();
        for _ in 0..FREE_CELL_PROBES {
            let offset = self.rng.random_range(0..cells);
            if self.grid.is_free(offset) {
                return Some(offset);
            }
        }
        let start = self.rng.random_range(0..cells);
        (0..cells)
            .map(|i| (start + i) % cells)
            .find(|&offset| self.grid.is_free(offset))
    }

    /// A random empty in-bounds neighbour of `offset`.
    pub fn free_neighbor(&mut self, offset: usize) -> Option<usize> {
        let mut free = [0usize; DIRECTIONS];
        let mut count = 0;
        for direction in 0..DIRECTIONS {
            if let Some(cell) = self.grid.neighbor(offset, direction)
                && self.grid.is_free(cell)
            {
                free[count] = cell;
                count += 1;
            }
        }
        (count > 0).then(|| free[self.rng.random_range(0..count)])
    }

    /// Change the organism pool capacity, relabelling relocated handles on
    /// the grid. Returns the `(old, new)` handle remapping.
    pub fn resize_organisms(&mut self, capacity: usize) -> Result<Vec<(usize, usize)>, WorldError> {
        if capacity == 0 || capacity >= i32::MAX as usize {
            return Err(WorldError::InvalidConfig(
                "org_capacity must be positive and fit in a grid cell",
            ));
        }
        let remap = self.organisms.resize(capacity)?;
        for &(_, to) in &remap {
            if let Some(organism) = self.organisms.get(to) {
                self.grid.relabel(organism.offset, Occupant::Organism(to));
            }
        }
        self.config.org_capacity = capacity;
        info!(capacity, relocated = remap.len(), "resized organism pool");
        Ok(remap)
    }

    /// Change the molecule pool capacity, relabelling relocated handles.
    pub fn resize_molecules(&mut self, capacity: usize) -> Result<Vec<(usize, usize)>, WorldError> {
        if capacity >= i32::MAX as usize {
            return Err(WorldError::InvalidConfig(
                "mol_capacity must fit in a grid cell",
            ));
        }
        let remap = self.molecules.resize(capacity)?;
        for &(_, to) in &remap {
            if let Some(molecule) = self.molecules.get(to) {
                self.grid.relabel(molecule.offset, Occupant::Molecule(to));
            }
        }
        self.config.mol_capacity = capacity;
        info!(capacity, relocated = remap.len(), "resized molecule pool");
        Ok(remap)
    }

    /// Births and deaths since the previous call.
    pub(crate) fn take_counters(&mut self) -> (usize, usize) {
        (
            std::mem::take(&mut self.births),
            std::mem::take(&mut self.deaths),
        )
    }

    #[must_use]
    pub fn config(&self) -> &SoupConfig {
        &self.config
    }

    #[must_use]
    pub const fn band(&self) -> Band {
        self.band
    }

    #[must_use]
    pub fn grid(&self) -> &Grid {
        &self.grid
    }

    #[must_use]
    pub fn organisms(&self) -> &Pool<Organism> {
        &self.organisms
    }

    #[must_use]
    pub fn molecules(&self) -> &Pool<Molecule> {
        &self.molecules
    }

    #[must_use]
    pub fn organism(&self, slot: usize) -> Option<&Organism> {
        self.organisms.get(slot)
    }

    #[must_use]
    pub fn organism_mut(&mut self, slot: usize) -> Option<&mut Organism> {
        self.organisms.get_mut(slot)
    }

    #[must_use]
    pub fn molecule(&self, slot: usize) -> Option<&Molecule> {
        self.molecules.get(slot)
    }

    #[must_use]
    pub fn organism_count(&self) -> usize {
        self.organisms.count_active()
    }

    #[must_use]
    pub fn molecule_count(&self) -> usize {
        self.molecules.count_active()
    }

    /// Current value broadcast on `frequency`, taken modulo the channel count.
    #[must_use]
    pub fn channel(&self, frequency: i32) -> i32 {
        self.channels[self.channel_index(frequency)]
    }

    pub(crate) fn channel_index(&self, frequency: i32) -> usize {
        i64::from(frequency).rem_euclid(self.channels.len() as i64) as usize
    }

    /// Mutable access to the world RNG for plugins.
    pub fn rng(&mut self) -> &mut SmallRng {
        &mut self.rng
    }
}
