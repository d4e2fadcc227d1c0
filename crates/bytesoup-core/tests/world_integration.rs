use std::sync::{Arc, Mutex};

use bytesoup_core::{
    Assembly, BirthRecord, Engine, Generation, HookMode, LifecycleListener, LineageSink, Occupant,
    Opcode, Organism, RunSummary, SoupConfig, World,
};

fn small_config() -> SoupConfig {
    SoupConfig {
        world_width: 32,
        world_height: 32,
        org_capacity: 64,
        mol_capacity: 256,
        initial_organisms: 24,
        initial_molecules: 120,
        instructions_per_tick: 16,
        repeats_per_run: 4,
        mutation_period: 3,
        rng_seed: Some(0xDEAD_BEEF),
        ..SoupConfig::default()
    }
}

fn snapshot(world: &World) -> Vec<(usize, u64, usize, Vec<u8>, i64)> {
    world
        .organisms()
        .iter()
        .map(|(slot, o)| (slot, o.id, o.offset, o.program.code().to_vec(), o.energy))
        .collect()
}

#[test]
fn seeded_world_advances_deterministically() {
    let build = || {
        let mut world = World::new(small_config()).expect("world");
        world.populate().expect("populate");
        Engine::new(world)
    };
    let mut a = build();
    let mut b = build();
    for _ in 0..10 {
        assert_eq!(a.run(), b.run());
        assert_eq!(snapshot(a.world()), snapshot(b.world()));
    }
    assert_eq!(a.runs(), 10);
}

#[test]
fn grid_and_pools_stay_consistent_across_runs() {
    let mut world = World::new(small_config()).expect("world");
    world.populate().expect("populate");
    let mut engine = Engine::new(world);
    for _ in 0..20 {
        engine.run();
        let world = engine.world();
        for (slot, organism) in world.organisms().iter() {
            assert_eq!(
                world.grid().occupant_at(organism.offset),
                Some(Occupant::Organism(slot))
            );
            assert!(organism.program.len() <= world.config().code_max_size);
            assert!(organism.program.line() <= organism.program.len());
        }
        for (slot, molecule) in world.molecules().iter() {
            assert!(!molecule.is_empty());
            assert_eq!(
                world.grid().occupant_at(molecule.offset),
                Some(Occupant::Molecule(slot))
            );
        }
        assert_eq!(
            world.grid().occupied(),
            world.organism_count() + world.molecule_count()
        );
    }
}

#[derive(Clone, Default)]
struct Visits(Arc<Mutex<Vec<(usize, bool)>>>);

impl LifecycleListener for Visits {
    fn before_iteration(&mut self, slot: usize, organism: &Organism) {
        self.0
            .lock()
            .expect("visits lock")
            .push((slot, organism.is_alive()));
    }
}

#[test]
fn organisms_starving_in_their_own_slice_do_not_disturb_the_pass() {
    let config = SoupConfig {
        initial_organisms: 0,
        initial_molecules: 0,
        repeats_per_run: 1,
        mutation_period: 1_000,
        atom_cost: 0.0,
        step_energy_coefficient: 200.0,
        ..small_config()
    };
    let mut world = World::new(config).expect("world");
    // `2 step` moves east at a cost of 400, twice the energy the code seeds.
    let starving = vec![2, world.band().encode(Opcode::Step)];
    let slots: Vec<usize> = (0..8)
        .map(|i| {
            let code = if i % 2 == 0 {
                starving.clone()
            } else {
                vec![1, 2]
            };
            world.spawn_organism(i * 3, code).expect("spawn")
        })
        .collect();

    let visits = Visits::default();
    let mut engine = Engine::new(world);
    engine
        .hooks_mut()
        .install(Box::new(visits.clone()), HookMode::Chain);
    let summary = engine.run();

    let expected: Vec<(usize, bool)> = (0..8).rev().map(|slot| (slot, true)).collect();
    assert_eq!(*visits.0.lock().expect("lock"), expected);
    assert_eq!(summary.deaths, 4);
    assert_eq!(summary.organisms, 4);
    let world = engine.world();
    for slot in slots {
        assert_eq!(world.organism(slot).is_some(), slot % 2 == 1, "slot {slot}");
    }
    // Remains of the four dead organisms stay behind as molecules.
    assert_eq!(world.molecule_count(), 4);
}

#[derive(Clone, Default)]
struct Lineage(Arc<Mutex<Vec<BirthRecord>>>);

impl LineageSink for Lineage {
    fn on_birth(&mut self, record: &BirthRecord) {
        self.0.lock().expect("lineage lock").push(record.clone());
    }
}

const SPLITTER: &str = "\
func
  1
  ret      # publish 1 through the ret register
end
call
4
toggle     # ax = 0, bx = 4
split      # carve [0, 4) into a child organism
nop
";

#[test]
fn split_produces_a_child_that_waits_for_the_next_pass() {
    let config = SoupConfig {
        initial_organisms: 0,
        initial_molecules: 0,
        repeats_per_run: 1,
        instructions_per_tick: 7,
        atom_cost: 0.0,
        mutation_period: 1_000,
        ..small_config()
    };
    let lineage = Lineage::default();
    let mut world = World::with_lineage(config, Box::new(lineage.clone())).expect("world");
    let code = Assembly::new(world.band())
        .assemble(SPLITTER)
        .expect("assemble");
    let parent_slot = world.spawn_organism(16 * 32 + 16, code).expect("spawn");

    let mut engine = Engine::new(world);
    let summary = engine.run();
    assert_eq!(summary.births, 2);
    assert_eq!(summary.organisms, 2);

    let world = engine.world();
    let parent = world.organism(parent_slot).expect("parent");
    let (_, child) = world
        .organisms()
        .iter()
        .find(|(slot, _)| *slot != parent_slot)
        .expect("child");
    assert_eq!(parent.program.len(), 5);
    assert_eq!(parent.energy, 900 - 400);
    assert_eq!(child.energy, 400);
    assert_eq!(child.age, 0);
    assert_eq!(child.generation, Generation(1));
    assert_eq!(
        Assembly::new(world.band()).disassemble(child.program.code()),
        "func\n  1\n  ret\nend\n"
    );

    let records = lineage.0.lock().expect("lock");
    assert_eq!(records.len(), 2);
    assert_eq!(records[1].parent, Some(records[0].id));
}

#[derive(Clone, Default)]
struct Summaries(Arc<Mutex<Vec<RunSummary>>>);

impl LifecycleListener for Summaries {
    fn after_run(&mut self, _world: &World, summary: &RunSummary) {
        self.0.lock().expect("summary lock").push(*summary);
    }
}

#[test]
fn replaced_listener_resumes_after_uninstall() {
    let mut world = World::new(small_config()).expect("world");
    world.populate().expect("populate");
    let mut engine = Engine::new(world);
    let first = Summaries::default();
    let second = Summaries::default();
    engine
        .hooks_mut()
        .install(Box::new(first.clone()), HookMode::Chain);
    let replacing = engine
        .hooks_mut()
        .install(Box::new(second.clone()), HookMode::Replace);

    engine.run();
    assert!(first.0.lock().expect("lock").is_empty());
    assert_eq!(second.0.lock().expect("lock").len(), 1);

    engine.hooks_mut().uninstall(replacing).expect("installed");
    let summary = engine.run();
    assert_eq!(*first.0.lock().expect("lock"), vec![summary]);
    assert_eq!(summary.run, 2);
}

#[test]
fn organism_pool_can_shrink_between_runs() {
    let mut world = World::new(small_config()).expect("world");
    world.populate().expect("populate");
    let mut engine = Engine::new(world);
    engine.run();
    let live = engine.world().organism_count();
    let remap = engine
        .world_mut()
        .resize_organisms(live.max(1))
        .expect("resize");
    for (_, to) in remap {
        assert!(to < live.max(1));
    }
    engine.run();
    let world = engine.world();
    for (slot, organism) in world.organisms().iter() {
        assert_eq!(
            world.grid().occupant_at(organism.offset),
            Some(Occupant::Organism(slot))
        );
    }
}
