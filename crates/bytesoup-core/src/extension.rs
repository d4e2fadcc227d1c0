//! Spatial and social instructions layered on top of the base table.

use tracing::trace;

use crate::engine::{Dispatch, InstructionTable, Slice};
use crate::grid::{DIRECTIONS, Occupant};
use crate::opcode::{Opcode, value};
use crate::organism::Organism;
use crate::program::{RET_ERR, RET_OK};
use crate::world::World;

/// Movement, sensing, messaging and matter exchange between neighbours.
///
/// Direction operands are read from `ax` modulo eight. Instructions that can
/// fail for lack of room or a missing target report through `ret`.
#[derive(Debug, Default)]
pub struct SpatialExtension;

/// Occupant kind reported by `see`.
pub const SEE_EMPTY: i32 = 0;
pub const SEE_MOLECULE: i32 = 1;
pub const SEE_ORGANISM: i32 = 2;

fn direction(ax: i32) -> usize {
    ax.rem_euclid(DIRECTIONS as i32) as usize
}

fn saturate(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

/// In-bounds neighbour in the direction held by `ax`.
fn target(organism: &Organism, world: &World) -> Option<usize> {
    world
        .grid
        .neighbor(organism.offset, direction(organism.program.ax))
}

fn join(organism: &mut Organism, world: &mut World) -> bool {
    let Some(cell) = target(organism, world) else {
        return false;
    };
    match world.grid.occupant_at(cell) {
        Some(Occupant::Molecule(slot)) => {
            let Some(len) = world.molecules.get(slot).map(|m| m.len()) else {
                return false;
            };
            if !organism.program.has_room(len) {
                return false;
            }
            let Some(molecule) = world.remove_molecule(slot) else {
                return false;
            };
            let end = organism.program.len();
            organism.program.apply_edit(end..end, &molecule.code);
            let gained = len as i64 * world.config.atom_energy;
            organism.energy = organism.energy.saturating_add(gained);
            true
        }
        Some(Occupant::Organism(slot)) => {
            let Some(len) = world.organisms.get(slot).map(|o| o.program.len()) else {
                return false;
            };
            if !organism.program.has_room(len) {
                return false;
            }
            let Some(prey) = world.remove_organism(slot) else {
                return false;
            };
            let end = organism.program.len();
            organism.program.apply_edit(end..end, prey.program.code());
            organism.energy = organism.energy.saturating_add(prey.energy.max(0));
            if let Some(packet) = prey.packet {
                world.drop_molecule(cell, packet.code);
            }
            trace!(id = organism.id, prey = prey.id, "joined organism");
            true
        }
        None => false,
    }
}

fn split(organism: &mut Organism, world: &mut World) -> bool {
    let program = &organism.program;
    let len = program.len();
    let (Ok(start), Ok(end)) = (usize::try_from(program.ax), usize::try_from(program.bx)) else {
        return false;
    };
    if start >= end || end > len || end - start >= len {
        return false;
    }
    let as_organism = program.ret > 0;
    let pool_full = if as_organism {
        world.organisms.is_full()
    } else {
        world.molecules.is_full()
    };
    if pool_full {
        return false;
    }
    let Some(cell) = world.free_neighbor(organism.offset) else {
        return false;
    };

    let fragment = program.code()[start..end].to_vec();
    let share = (i128::from(organism.energy.max(0)) * (end - start) as i128 / len as i128) as i64;
    if organism.program.apply_edit(start..end, &[]).is_none() {
        return false;
    }
    if as_organism {
        let child = organism.program.offspring(fragment);
        organism.energy -= share;
        world.adopt_offspring(organism, child, cell, share).is_some()
    } else {
        world.drop_molecule(cell, fragment).is_some()
    }
}

fn step(organism: &mut Organism, world: &mut World) -> bool {
    let Some(cell) = target(organism, world) else {
        return false;
    };
    if !world.grid.is_free(cell) {
        return false;
    }
    world.grid.move_occupant(organism.offset, cell);
    organism.offset = cell;
    let cost = (organism.program.len() as f64 * world.config.step_energy_coefficient).ceil() as i64;
    organism.energy = organism.energy.saturating_sub(cost);
    true
}

/// Code of whatever occupies `cell`; `None` for an empty cell.
fn code_at<'w>(world: &'w World, cell: usize) -> Option<&'w [u8]> {
    match world.grid.occupant_at(cell)? {
        Occupant::Organism(slot) => world.organisms.get(slot).map(|o| o.program.code()),
        Occupant::Molecule(slot) => world.molecules.get(slot).map(|m| m.code.as_slice()),
    }
}

fn see(organism: &mut Organism, world: &World) -> bool {
    let Some(cell) = target(organism, world) else {
        return false;
    };
    let kind = match world.grid.occupant_at(cell) {
        None => SEE_EMPTY,
        Some(Occupant::Molecule(_)) => SEE_MOLECULE,
        Some(Occupant::Organism(_)) => SEE_ORGANISM,
    };
    organism.program.ax = kind;
    organism.program.bx = code_at(world, cell).map_or(0, |code| saturate(code.len()));
    true
}

fn nread(organism: &mut Organism, world: &World) -> bool {
    let Some(cell) = target(organism, world) else {
        return false;
    };
    let Ok(index) = usize::try_from(organism.program.bx) else {
        return false;
    };
    match code_at(world, cell).and_then(|code| code.get(index)) {
        Some(&atom) => {
            organism.program.ax = i32::from(value(atom));
            true
        }
        None => false,
    }
}

fn get(organism: &mut Organism, world: &mut World) -> bool {
    if organism.packet.is_some() {
        return false;
    }
    let Some(cell) = target(organism, world) else {
        return false;
    };
    let Some(Occupant::Molecule(slot)) = world.grid.occupant_at(cell) else {
        return false;
    };
    organism.packet = world.remove_molecule(slot);
    organism.packet.is_some()
}

fn put(organism: &mut Organism, world: &mut World) -> bool {
    let Some(cell) = target(organism, world) else {
        return false;
    };
    let Some(packet) = organism.packet.take() else {
        return false;
    };
    match world.drop_molecule(cell, packet.code.clone()) {
        Some(_) => true,
        None => {
            organism.packet = Some(packet);
            false
        }
    }
}

impl InstructionTable for SpatialExtension {
    fn name(&self) -> &'static str {
        "spatial"
    }

    fn execute(&mut self, op: Opcode, slice: &mut Slice<'_>) -> Dispatch {
        let organism = &mut *slice.organism;
        let world = &mut *slice.world;
        let mut advanced = false;
        let outcome = match op {
            Opcode::Join => Some(join(organism, world)),
            Opcode::Split => {
                // The carved range may hold this very instruction, so the
                // pointer moves first and the edit patch carries it along.
                organism.program.line += 1;
                advanced = true;
                Some(split(organism, world))
            }
            Opcode::Step => Some(step(organism, world)),
            Opcode::See => Some(see(organism, world)),
            Opcode::Nread => Some(nread(organism, world)),
            Opcode::Get => Some(get(organism, world)),
            Opcode::Put => Some(put(organism, world)),
            Opcode::Say => {
                let index = world.channel_index(organism.program.bx);
                world.channels[index] = organism.program.ax;
                None
            }
            Opcode::Listen => {
                organism.program.ax = world.channel(organism.program.bx);
                None
            }
            Opcode::Offs => {
                organism.program.ax = saturate(organism.offset);
                None
            }
            Opcode::Color => {
                let color = organism.program.ax.unsigned_abs() % world.config.color_max;
                organism.color = color.max(world.config.color_min);
                None
            }
            _ => return Dispatch::Unhandled,
        };
        let program = &mut organism.program;
        if let Some(ok) = outcome {
            program.ret = if ok { RET_OK } else { RET_ERR };
        }
        if !advanced {
            program.line += 1;
        }
        Dispatch::Handled
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SoupConfig;
    use crate::opcode::{Atom, Band};

    // Directions: 0 N, 2 E, 4 S, 6 W on a 5x5 grid; cell 12 is the centre.
    const CENTRE: usize = 12;
    const EAST: i32 = 2;

    fn config() -> SoupConfig {
        SoupConfig {
            world_width: 5,
            world_height: 5,
            org_capacity: 4,
            mol_capacity: 4,
            initial_organisms: 0,
            initial_molecules: 0,
            rng_seed: Some(8),
            ..SoupConfig::default()
        }
    }

    fn nops(n: usize) -> Vec<Atom> {
        vec![Band::default().encode(Opcode::Nop); n]
    }

    fn setup(code: Vec<Atom>) -> (World, usize, Organism) {
        let mut world = World::new(config()).expect("world");
        let slot = world.spawn_organism(CENTRE, code).expect("spawn");
        let organism = world.organisms.checkout(slot).expect("organism");
        (world, slot, organism)
    }

    fn exec(op: Opcode, slot: usize, organism: &mut Organism, world: &mut World) -> Dispatch {
        let mut slice = Slice {
            slot,
            organism,
            world,
            looped: false,
        };
        SpatialExtension.execute(op, &mut slice)
    }

    #[test]
    fn base_opcodes_are_not_handled() {
        let (mut world, slot, mut organism) = setup(nops(2));
        assert_eq!(
            exec(Opcode::Inc, slot, &mut organism, &mut world),
            Dispatch::Unhandled
        );
        assert_eq!(organism.program.line(), 0);
    }

    #[test]
    fn step_moves_and_costs_energy() {
        let (mut world, slot, mut organism) = setup(nops(40));
        let energy = organism.energy;
        organism.program.ax = EAST;
        exec(Opcode::Step, slot, &mut organism, &mut world);
        assert_eq!(organism.offset, CENTRE + 1);
        assert_eq!(organism.program.ret, RET_OK);
        assert_eq!(organism.energy, energy - 2);
        assert!(world.grid().is_free(CENTRE));
        assert_eq!(
            world.grid().occupant_at(CENTRE + 1),
            Some(Occupant::Organism(slot))
        );
        assert_eq!(organism.program.line(), 1);
    }

    #[test]
    fn step_into_edge_or_occupied_cell_fails() {
        let (mut world, slot, mut organism) = setup(nops(4));
        world.spawn_molecule(CENTRE + 1, vec![1]).expect("molecule");
        organism.program.ax = EAST;
        exec(Opcode::Step, slot, &mut organism, &mut world);
        assert_eq!(organism.offset, CENTRE);
        assert_eq!(organism.program.ret, RET_ERR);

        let (mut world, slot, _) = setup(nops(1));
        let edge = world.spawn_organism(4, nops(4)).expect("spawn");
        let mut organism = world.organisms.checkout(edge).expect("organism");
        organism.program.ax = EAST;
        exec(Opcode::Step, slot, &mut organism, &mut world);
        assert_eq!(organism.offset, 4);
        assert_eq!(organism.program.ret, RET_ERR);
    }

    #[test]
    fn join_absorbs_molecule_code_and_energy() {
        let (mut world, slot, mut organism) = setup(nops(2));
        world.spawn_molecule(CENTRE + 1, vec![3, 4]).expect("molecule");
        organism.program.ax = EAST;
        let energy = organism.energy;
        exec(Opcode::Join, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_OK);
        assert_eq!(organism.program.len(), 4);
        assert_eq!(value(organism.program.code()[3]), 4);
        assert_eq!(organism.energy, energy + 2 * world.config().atom_energy);
        assert_eq!(world.molecule_count(), 0);
        assert!(world.grid().is_free(CENTRE + 1));
    }

    #[test]
    fn join_absorbs_neighbouring_organism() {
        let (mut world, slot, mut organism) = setup(nops(2));
        let prey = world.spawn_organism(CENTRE + 1, vec![5, 6, 7]).expect("spawn");
        let prey_energy = world.organism(prey).expect("prey").energy;
        let energy = organism.energy;
        organism.program.ax = EAST;
        exec(Opcode::Join, slot, &mut organism, &mut world);
        assert_eq!(organism.program.code(), &[nops(1)[0], nops(1)[0], 5, 6, 7]);
        assert_eq!(organism.energy, energy + prey_energy);
        assert!(world.organism(prey).is_none());
    }

    #[test]
    fn join_respects_code_limit() {
        let (mut world, slot, mut organism) = setup(nops(config().code_max_size));
        world.spawn_molecule(CENTRE + 1, vec![1]).expect("molecule");
        organism.program.ax = EAST;
        exec(Opcode::Join, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_ERR);
        assert_eq!(world.molecule_count(), 1);
    }

    #[test]
    fn split_creates_offspring_with_energy_share() {
        let (mut world, slot, mut organism) = setup(vec![1, 2, 3, 4]);
        let parent_energy = organism.energy;
        organism.program.ax = 1;
        organism.program.bx = 3;
        organism.program.ret = RET_OK;
        exec(Opcode::Split, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_OK);
        assert_eq!(organism.program.code(), &[1, 4]);
        assert_eq!(organism.energy, parent_energy / 2);
        let (child_slot, child) = world
            .organisms()
            .iter()
            .find(|(s, _)| *s != slot)
            .expect("child");
        assert_eq!(child.program.code(), &[2, 3]);
        assert_eq!(child.parent, Some(organism.id));
        assert_eq!(child.generation, organism.generation.next());
        assert_eq!(child.energy, parent_energy / 2);
        assert_eq!(
            world.grid().occupant_at(child.offset),
            Some(Occupant::Organism(child_slot))
        );
    }

    #[test]
    fn split_without_ret_drops_molecule() {
        let (mut world, slot, mut organism) = setup(vec![1, 2, 3]);
        organism.program.ax = 0;
        organism.program.bx = 1;
        organism.program.ret = RET_ERR;
        exec(Opcode::Split, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_OK);
        assert_eq!(world.molecule_count(), 1);
        // Only the checked-out parent holds an organism slot.
        assert_eq!(world.organisms().iter().count(), 0);
    }

    #[test]
    fn split_rejects_bad_ranges() {
        let (mut world, slot, mut organism) = setup(vec![1, 2, 3]);
        for (ax, bx) in [(0, 3), (2, 2), (-1, 1), (1, 9), (2, 1)] {
            organism.program.ax = ax;
            organism.program.bx = bx;
            exec(Opcode::Split, slot, &mut organism, &mut world);
            assert_eq!(organism.program.ret, RET_ERR, "{ax}..{bx}");
            assert_eq!(organism.program.len(), 3);
        }
    }

    #[test]
    fn split_covering_its_own_line_keeps_line_in_code() {
        let (mut world, slot, mut organism) = setup(nops(4));
        organism.program.line = 3;
        organism.program.ax = 2;
        organism.program.bx = 4;
        organism.program.ret = RET_ERR;
        exec(Opcode::Split, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_OK);
        assert_eq!(organism.program.len(), 2);
        assert_eq!(organism.program.line(), 2);
        assert!(organism.program.line() <= organism.program.len());
    }

    #[test]
    fn split_resumes_at_atom_that_slides_into_the_gap() {
        let (mut world, slot, mut organism) = setup(vec![1, 2, 3, 4, 5, 6]);
        organism.program.line = 2;
        organism.program.ax = 1;
        organism.program.bx = 3;
        organism.program.ret = RET_ERR;
        exec(Opcode::Split, slot, &mut organism, &mut world);
        assert_eq!(organism.program.code(), &[1, 4, 5, 6]);
        assert_eq!(organism.program.line(), 1);
        assert_eq!(organism.program.code()[organism.program.line()], 4);
    }

    #[test]
    fn split_before_its_line_shifts_the_pointer_back() {
        let (mut world, slot, mut organism) = setup(vec![1, 2, 3, 4, 5, 6]);
        organism.program.line = 4;
        organism.program.ax = 0;
        organism.program.bx = 2;
        organism.program.ret = RET_ERR;
        exec(Opcode::Split, slot, &mut organism, &mut world);
        assert_eq!(organism.program.code(), &[3, 4, 5, 6]);
        assert_eq!(organism.program.code()[organism.program.line()], 6);
    }

    #[test]
    fn failed_split_still_advances_one_line() {
        let (mut world, slot, mut organism) = setup(vec![1, 2, 3]);
        organism.program.line = 1;
        organism.program.ax = 2;
        organism.program.bx = 1;
        exec(Opcode::Split, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_ERR);
        assert_eq!(organism.program.line(), 2);
    }

    #[test]
    fn see_and_nread_inspect_neighbours() {
        let (mut world, slot, mut organism) = setup(nops(1));
        world.spawn_molecule(CENTRE + 1, vec![9, 17]).expect("molecule");
        organism.program.ax = EAST;
        exec(Opcode::See, slot, &mut organism, &mut world);
        assert_eq!((organism.program.ax, organism.program.bx), (SEE_MOLECULE, 2));

        organism.program.ax = EAST;
        organism.program.bx = 1;
        exec(Opcode::Nread, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ax, 17);
        assert_eq!(organism.program.ret, RET_OK);

        organism.program.ax = EAST;
        organism.program.bx = 5;
        exec(Opcode::Nread, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_ERR);

        organism.program.ax = 6;
        exec(Opcode::See, slot, &mut organism, &mut world);
        assert_eq!((organism.program.ax, organism.program.bx), (SEE_EMPTY, 0));
    }

    #[test]
    fn get_and_put_carry_a_molecule() {
        let (mut world, slot, mut organism) = setup(nops(1));
        world.spawn_molecule(CENTRE + 1, vec![9]).expect("molecule");
        organism.program.ax = EAST;
        exec(Opcode::Get, slot, &mut organism, &mut world);
        assert!(organism.packet.is_some());
        assert_eq!(world.molecule_count(), 0);

        organism.program.ax = EAST;
        exec(Opcode::Get, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_ERR);

        organism.program.ax = 4;
        exec(Opcode::Put, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ret, RET_OK);
        assert!(organism.packet.is_none());
        assert!(matches!(
            world.grid().occupant_at(CENTRE + 5),
            Some(Occupant::Molecule(_))
        ));
    }

    #[test]
    fn say_and_listen_share_channels() {
        let (mut world, slot, mut organism) = setup(nops(1));
        organism.program.ax = 77;
        organism.program.bx = 3;
        exec(Opcode::Say, slot, &mut organism, &mut world);
        organism.program.ax = 0;
        organism.program.bx = 3 + world.config().frequency_channels as i32;
        exec(Opcode::Listen, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ax, 77);
    }

    #[test]
    fn offs_and_color() {
        let (mut world, slot, mut organism) = setup(nops(1));
        exec(Opcode::Offs, slot, &mut organism, &mut world);
        assert_eq!(organism.program.ax, CENTRE as i32);
        organism.program.ax = -5;
        exec(Opcode::Color, slot, &mut organism, &mut world);
        assert_eq!(organism.color, world.config().color_min);
        organism.program.ax = 0x40_40_40;
        exec(Opcode::Color, slot, &mut organism, &mut world);
        assert_eq!(organism.color, 0x40_40_40);
    }
}
