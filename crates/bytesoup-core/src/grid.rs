//! Flat occupancy grid mapping cell offsets to pool handles.

use serde::{Deserialize, Serialize};

use crate::WorldError;

/// Eight compass directions, clockwise from north.
pub const DIRECTIONS: usize = 8;

const DIR_OFFSETS: [(i64, i64); DIRECTIONS] = [
    (0, -1),
    (1, -1),
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
];

/// What lives in an occupied cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Occupant {
    /// Handle into the organism pool.
    Organism(usize),
    /// Handle into the molecule pool.
    Molecule(usize),
}

impl Occupant {
    fn encode(self) -> i32 {
        match self {
            Self::Organism(slot) => slot as i32 + 1,
            Self::Molecule(slot) => -(slot as i32 + 1),
        }
    }

    fn decode(cell: i32) -> Option<Self> {
        match cell {
            0 => None,
            c if c > 0 => Some(Self::Organism(c as usize - 1)),
            c => Some(Self::Molecule(c.unsigned_abs() as usize - 1)),
        }
    }
}

/// Width × height array of cells; `0` is empty, otherwise `±(slot + 1)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grid {
    width: u32,
    height: u32,
    cells: Vec<i32>,
}

impl Grid {
    /// Construct an empty grid.
    pub fn new(width: u32, height: u32) -> Result<Self, WorldError> {
        if width == 0 || height == 0 {
            return Err(WorldError::InvalidConfig("grid dimensions must be non-zero"));
        }
        Ok(Self {
            width,
            height,
            cells: vec![0; (width as usize) * (height as usize)],
        })
    }

    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells.
    #[must_use]
    pub fn len(&self) -> usize {
        self.cells.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    #[inline]
    #[must_use]
    pub fn in_bounds(&self, offset: usize) -> bool {
        offset < self.cells.len()
    }

    /// Flat offset for `(x, y)`, if inside the grid.
    #[must_use]
    pub fn offset(&self, x: u32, y: u32) -> Option<usize> {
        (x < self.width && y < self.height)
            .then(|| (y as usize) * (self.width as usize) + (x as usize))
    }

    /// Inverse of [`Grid::offset`].
    #[must_use]
    pub fn xy(&self, offset: usize) -> (u32, u32) {
        let width = self.width as usize;
        ((offset % width) as u32, (offset / width) as u32)
    }

    /// Offset of the neighbour in `direction` (taken modulo 8). No wrap-around.
    #[must_use]
    pub fn neighbor(&self, offset: usize, direction: usize) -> Option<usize> {
        if !self.in_bounds(offset) {
            return None;
        }
        let (x, y) = self.xy(offset);
        let (dx, dy) = DIR_OFFSETS[direction % DIRECTIONS];
        let nx = i64::from(x) + dx;
        let ny = i64::from(y) + dy;
        if nx < 0 || ny < 0 {
            return None;
        }
        self.offset(nx as u32, ny as u32)
    }

    #[inline]
    #[must_use]
    pub fn occupant_at(&self, offset: usize) -> Option<Occupant> {
        self.cells.get(offset).copied().and_then(Occupant::decode)
    }

    #[must_use]
    pub fn is_free(&self, offset: usize) -> bool {
        self.cells.get(offset) == Some(&0)
    }

    /// Record `occupant` at `offset`. The cell must be empty.
    pub fn place(&mut self, offset: usize, occupant: Occupant) {
        debug_assert!(self.is_free(offset), "cell {offset} already occupied");
        if let Some(cell) = self.cells.get_mut(offset) {
            *cell = occupant.encode();
        }
    }

    /// Empty a cell, returning what was there.
    pub fn clear(&mut self, offset: usize) -> Option<Occupant> {
        let cell = self.cells.get_mut(offset)?;
        Occupant::decode(std::mem::take(cell))
    }

    /// Move the occupant of `from` to the empty cell `to`, keeping its identity.
    pub fn move_occupant(&mut self, from: usize, to: usize) -> Option<Occupant> {
        if !self.is_free(to) {
            return None;
        }
        let occupant = self.clear(from)?;
        self.place(to, occupant);
        Some(occupant)
    }

    /// Rewrite the handle stored for `occupant` in place.
    pub(crate) fn relabel(&mut self, offset: usize, occupant: Occupant) {
        if let Some(cell) = self.cells.get_mut(offset) {
            *cell = occupant.encode();
        }
    }

    /// Number of occupied cells.
    #[must_use]
    pub fn occupied(&self) -> usize {
        self.cells.iter().filter(|&&cell| cell != 0).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn place_and_clear_round_trip_occupants() {
        let mut grid = Grid::new(4, 3).expect("grid");
        assert_eq!(grid.len(), 12);
        assert!(grid.occupant_at(5).is_none());
        grid.place(5, Occupant::Organism(0));
        grid.place(6, Occupant::Molecule(0));
        grid.place(7, Occupant::Molecule(41));
        assert_eq!(grid.occupant_at(5), Some(Occupant::Organism(0)));
        assert_eq!(grid.occupant_at(6), Some(Occupant::Molecule(0)));
        assert_eq!(grid.occupant_at(7), Some(Occupant::Molecule(41)));
        assert_eq!(grid.occupied(), 3);
        assert_eq!(grid.clear(6), Some(Occupant::Molecule(0)));
        assert!(grid.is_free(6));
        assert_eq!(grid.clear(6), None);
    }

    #[test]
    fn move_preserves_identity_and_refuses_occupied_target() {
        let mut grid = Grid::new(3, 3).expect("grid");
        grid.place(0, Occupant::Organism(9));
        grid.place(2, Occupant::Organism(3));
        assert_eq!(grid.move_occupant(0, 2), None);
        assert_eq!(grid.move_occupant(0, 4), Some(Occupant::Organism(9)));
        assert!(grid.is_free(0));
        assert_eq!(grid.occupant_at(4), Some(Occupant::Organism(9)));
    }

    #[test]
    fn neighbors_stop_at_edges() {
        let grid = Grid::new(3, 3).expect("grid");
        let corner = grid.offset(0, 0).expect("offset");
        assert_eq!(grid.neighbor(corner, 0), None);
        assert_eq!(grid.neighbor(corner, 2), Some(1));
        assert_eq!(grid.neighbor(corner, 3), Some(4));
        assert_eq!(grid.neighbor(corner, 6), None);
        let centre = grid.offset(1, 1).expect("offset");
        let all: Vec<_> = (0..DIRECTIONS)
            .filter_map(|dir| grid.neighbor(centre, dir))
            .collect();
        assert_eq!(all, vec![1, 2, 5, 8, 7, 6, 3, 0]);
        assert_eq!(grid.neighbor(centre, 10), Some(5));
        assert!(grid.offset(3, 0).is_none());
        assert_eq!(grid.xy(7), (1, 2));
    }

    #[test]
    fn zero_sized_grid_is_rejected() {
        assert!(Grid::new(0, 5).is_err());
    }
}
