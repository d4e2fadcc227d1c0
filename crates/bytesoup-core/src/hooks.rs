//! Lifecycle listeners invoked by the scheduler.

use crate::engine::RunSummary;
use crate::organism::Organism;
use crate::world::World;

/// Observer of scheduler lifecycle points. Every method defaults to a no-op.
pub trait LifecycleListener: Send {
    /// Before an organism's slice runs.
    fn before_iteration(&mut self, _slot: usize, _organism: &Organism) {}

    /// After an organism's slice, metabolism and mutation.
    fn after_iteration(&mut self, _slot: usize, _organism: &Organism) {}

    /// After every organism has been visited once.
    fn after_repeat(&mut self, _world: &World) {}

    /// At the end of [`crate::Engine::run`].
    fn after_run(&mut self, _world: &World, _summary: &RunSummary) {}
}

/// How a newly installed listener relates to the ones before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookMode {
    /// Run after every listener installed earlier. Chained listeners fire
    /// oldest first, in the order they were installed.
    Chain,
    /// Silence every listener installed earlier until this one is removed.
    Replace,
}

/// Handle returned by [`HookRegistry::install`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

struct Entry {
    id: ListenerId,
    mode: HookMode,
    listener: Box<dyn LifecycleListener>,
}

/// Ordered listener stack.
#[derive(Default)]
pub struct HookRegistry {
    entries: Vec<Entry>,
    next_id: u64,
}

impl std::fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|entry| (entry.id, entry.mode)))
            .finish()
    }
}

impl HookRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn install(&mut self, listener: Box<dyn LifecycleListener>, mode: HookMode) -> ListenerId {
        let id = ListenerId(self.next_id);
        self.next_id += 1;
        self.entries.push(Entry { id, mode, listener });
        id
    }

    /// Remove a listener; listeners it replaced become active again.
    pub fn uninstall(&mut self, id: ListenerId) -> Option<Box<dyn LifecycleListener>> {
        let index = self.entries.iter().position(|entry| entry.id == id)?;
        Some(self.entries.remove(index).listener)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Listeners that currently receive callbacks, in call order.
    fn active(&mut self) -> impl Iterator<Item = &mut Box<dyn LifecycleListener>> {
        let start = self
            .entries
            .iter()
            .rposition(|entry| entry.mode == HookMode::Replace)
            .unwrap_or(0);
        self.entries[start..].iter_mut().map(|entry| &mut entry.listener)
    }

    pub(crate) fn before_iteration(&mut self, slot: usize, organism: &Organism) {
        for listener in self.active() {
            listener.before_iteration(slot, organism);
        }
    }

    pub(crate) fn after_iteration(&mut self, slot: usize, organism: &Organism) {
        for listener in self.active() {
            listener.after_iteration(slot, organism);
        }
    }

    pub(crate) fn after_repeat(&mut self, world: &World) {
        for listener in self.active() {
            listener.after_repeat(world);
        }
    }

    pub(crate) fn after_run(&mut self, world: &World, summary: &RunSummary) {
        for listener in self.active() {
            listener.after_run(world, summary);
        }
    }
}
