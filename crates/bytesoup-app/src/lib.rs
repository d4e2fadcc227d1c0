//! Shared pieces of the bytesoup runner: config loading and status reporting.

use std::path::Path;

use anyhow::{Context, Result};
use bytesoup_core::{LifecycleListener, RunSummary, SoupConfig, World};
use serde::{Deserialize, Serialize};
use tracing::info;

/// Read a JSON config file; missing fields fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<SoupConfig> {
    let Some(path) = path else {
        return Ok(SoupConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read config {}", path.display()))?;
    let config: SoupConfig = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse config {}", path.display()))?;
    Ok(config)
}

/// Population statistics derived from a world.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct WorldStats {
    pub organisms: usize,
    pub molecules: usize,
    pub average_energy: f64,
    pub average_code_len: f64,
    pub max_generation: u32,
    pub oldest: u64,
}

impl WorldStats {
    #[must_use]
    pub fn collect(world: &World) -> Self {
        let mut stats = Self {
            organisms: world.organism_count(),
            molecules: world.molecule_count(),
            ..Self::default()
        };
        let mut energy = 0.0;
        let mut code = 0.0;
        for (_, organism) in world.organisms().iter() {
            energy += organism.energy as f64;
            code += organism.program.len() as f64;
            stats.max_generation = stats.max_generation.max(organism.generation.0);
            stats.oldest = stats.oldest.max(organism.age);
        }
        if stats.organisms > 0 {
            stats.average_energy = energy / stats.organisms as f64;
            stats.average_code_len = code / stats.organisms as f64;
        }
        stats
    }
}

/// Logs population statistics every `every` runs.
#[derive(Debug, Clone)]
pub struct StatusReporter {
    every: u64,
}

impl StatusReporter {
    #[must_use]
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
        }
    }
}

impl LifecycleListener for StatusReporter {
    fn after_run(&mut self, world: &World, summary: &RunSummary) {
        if !summary.run.is_multiple_of(self.every) {
            return;
        }
        let stats = WorldStats::collect(world);
        info!(
            run = summary.run,
            organisms = stats.organisms,
            molecules = stats.molecules,
            births = summary.births,
            deaths = summary.deaths,
            avg_energy = stats.average_energy,
            avg_len = stats.average_code_len,
            max_generation = stats.max_generation,
            "status"
        );
    }
}
