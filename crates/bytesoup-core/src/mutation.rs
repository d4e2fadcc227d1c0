//! Periodic code mutation driven by per-organism operator weights.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::trace;

use crate::opcode::{value, with_value};
use crate::organism::Organism;
use crate::world::World;

/// Mutation operators, in the order of the weight vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    /// Swap one code atom's value with an atom of a random molecule.
    Change,
    /// Eject one code atom as a single-atom molecule next to the organism.
    Delete,
    /// Move one atom out of a random molecule into the code.
    Insert,
    /// Redraw the mutation period.
    Period,
    /// Redraw the mutation percent.
    Percent,
    /// Redraw one operator weight.
    Probabilities,
}

impl Operator {
    pub const ALL: [Operator; 6] = [
        Operator::Change,
        Operator::Delete,
        Operator::Insert,
        Operator::Period,
        Operator::Percent,
        Operator::Probabilities,
    ];
}

/// Pick an index with probability proportional to its weight.
///
/// Returns `None` when every weight is zero.
pub fn pick_weighted<R: Rng + ?Sized>(weights: &[u32], rng: &mut R) -> Option<usize> {
    let total: u64 = weights.iter().map(|&w| u64::from(w)).sum();
    if total == 0 {
        return None;
    }
    let roll = rng.random_range(0..total);
    // Walk from whichever end the roll is nearer to.
    if roll < total / 2 {
        let mut acc = 0;
        weights.iter().position(|&w| {
            acc += u64::from(w);
            roll < acc
        })
    } else {
        let mut acc = total;
        weights.iter().rposition(|&w| {
            acc -= u64::from(w);
            roll >= acc
        })
    }
}

/// Tally of one mutation burst.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MutationReport {
    pub applied: usize,
    pub skipped: usize,
}

/// Applies mutation bursts to organisms.
#[derive(Debug, Clone, Copy, Default)]
pub struct MutationEngine;

impl MutationEngine {
    /// Run `max(1, round(len * percent))` weighted operators on `organism`.
    ///
    /// Operators whose preconditions fail are skipped without side effects.
    /// A `delete` may leave the organism with no code, which kills it.
    pub fn mutate(&self, organism: &mut Organism, world: &mut World) -> MutationReport {
        let mut report = MutationReport::default();
        let len = organism.program.len() as f64;
        let count = ((len * f64::from(organism.program.mutation.percent)).round() as usize).max(1);
        for _ in 0..count {
            if organism.program.is_empty() {
                break;
            }
            let Some(op) = pick_weighted(&organism.program.mutation.probabilities, &mut world.rng)
                .and_then(|index| Operator::ALL.get(index).copied())
            else {
                break;
            };
            if self.apply(op, organism, world) {
                report.applied += 1;
            } else {
                report.skipped += 1;
            }
        }
        trace!(
            id = organism.id,
            applied = report.applied,
            skipped = report.skipped,
            "mutation burst"
        );
        report
    }

    /// Apply a single operator, returning whether it took effect.
    pub fn apply(&self, op: Operator, organism: &mut Organism, world: &mut World) -> bool {
        match op {
            Operator::Change => change(organism, world),
            Operator::Delete => delete(organism, world),
            Operator::Insert => insert(organism, world),
            Operator::Period => {
                if !world.config.mutate_period {
                    return false;
                }
                organism.program.mutation.period =
                    world.rng.random_range(1..=world.config.mutation_period_max);
                true
            }
            Operator::Percent => {
                if !world.config.mutate_percent {
                    return false;
                }
                organism.program.mutation.percent =
                    world.rng.random_range(0.0..=world.config.mutation_percent_max);
                true
            }
            Operator::Probabilities => {
                let weights = &mut organism.program.mutation.probabilities;
                if weights.is_empty() {
                    return false;
                }
                let index = world.rng.random_range(0..weights.len());
                weights[index] = world
                    .rng
                    .random_range(0..=world.config.mutation_probability_max);
                true
            }
        }
    }
}

fn change(organism: &mut Organism, world: &mut World) -> bool {
    let len = organism.program.len();
    if len == 0 {
        return false;
    }
    let Some(slot) = world.molecules.random_live(&mut world.rng) else {
        return false;
    };
    let Some(mol_len) = world.molecules.get(slot).map(|m| m.len()) else {
        return false;
    };
    let at = world.rng.random_range(0..len);
    let mol_at = world.rng.random_range(0..mol_len);
    let Some(molecule) = world.molecules.get_mut(slot) else {
        return false;
    };
    let atom = organism.program.code()[at];
    let mol_atom = molecule.code[mol_at];
    molecule.code[mol_at] = with_value(mol_atom, value(atom));
    organism
        .program
        .apply_edit(at..at + 1, &[with_value(atom, value(mol_atom))])
        .is_some()
}

fn delete(organism: &mut Organism, world: &mut World) -> bool {
    let len = organism.program.len();
    if len == 0 || world.molecules.is_full() {
        return false;
    }
    let Some(cell) = world.free_neighbor(organism.offset) else {
        return false;
    };
    let at = world.rng.random_range(0..len);
    let atom = organism.program.code()[at];
    if organism.program.apply_edit(at..at + 1, &[]).is_none() {
        return false;
    }
    world.drop_molecule(cell, vec![atom]).is_some()
}

fn insert(organism: &mut Organism, world: &mut World) -> bool {
    if !organism.program.has_room(1) {
        return false;
    }
    let Some(slot) = world.molecules.random_live(&mut world.rng) else {
        return false;
    };
    let Some(mol_len) = world.molecules.get(slot).map(|m| m.len()) else {
        return false;
    };
    let mol_at = world.rng.random_range(0..mol_len);
    let Some(atom) = world
        .molecules
        .get_mut(slot)
        .and_then(|molecule| molecule.take_atom(mol_at))
    else {
        return false;
    };
    if world.molecules.get(slot).is_some_and(|m| m.is_empty()) {
        world.remove_molecule(slot);
    }
    let at = world.rng.random_range(0..=organism.program.len());
    organism.program.apply_edit(at..at, &[atom]).is_some()
}
