//! Cooperative scheduler and the base instruction set.

use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::extension::SpatialExtension;
use crate::hooks::HookRegistry;
use crate::mutation::MutationEngine;
use crate::opcode::{Decoded, Opcode};
use crate::organism::Organism;
use crate::program::{Frame, LoopCounter, Program};
use crate::world::World;

/// Outcome of offering an opcode to an [`InstructionTable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Handled,
    /// The table does not implement this opcode; try the next one.
    Unhandled,
}

/// Everything one organism's instruction may touch.
pub struct Slice<'a> {
    /// Pool slot of the running organism.
    pub slot: usize,
    pub organism: &'a mut Organism,
    pub world: &'a mut World,
    /// The previous instruction was a loop `end` jumping back.
    pub looped: bool,
}

/// One opcode-dispatch table. The engine offers each command to the base
/// table first and to the extension table second.
pub trait InstructionTable: Send {
    /// Static identifier used in logs.
    fn name(&self) -> &'static str;

    /// Execute `op`, leaving `line` at the next instruction to run.
    fn execute(&mut self, op: Opcode, slice: &mut Slice<'_>) -> Dispatch;
}

/// Extension table that recognises nothing.
#[derive(Debug, Default)]
pub struct NoExtension;

impl InstructionTable for NoExtension {
    fn name(&self) -> &'static str {
        "none"
    }

    fn execute(&mut self, _op: Opcode, _slice: &mut Slice<'_>) -> Dispatch {
        Dispatch::Unhandled
    }
}

/// Arithmetic, control flow and memory instructions.
#[derive(Debug, Default)]
pub struct BaseInstructions;

/// Rounded `a / b`, saturating; a non-finite quotient yields `i32::MIN`.
fn divide(a: i32, b: i32) -> i32 {
    let quotient = (f64::from(a) / f64::from(b)).round();
    if quotient.is_finite() {
        // Float-to-int `as` saturates at the i32 bounds.
        quotient as i32
    } else {
        i32::MIN
    }
}

fn saturate(value: usize) -> i32 {
    i32::try_from(value).unwrap_or(i32::MAX)
}

fn skip_block(program: &Program, line: usize) -> usize {
    program.offs.get(&line).copied().unwrap_or(line + 1)
}

fn enter_loop(program: &mut Program, line: usize, looped: bool) -> usize {
    let exit = skip_block(program, line);
    let counter = match program.loops.get(&line).copied() {
        Some(mut counter) => {
            if looped {
                counter.remaining -= 1;
            } else {
                counter.remaining = counter.initial;
            }
            counter
        }
        None => LoopCounter {
            remaining: program.ax,
            initial: program.ax,
        },
    };
    if counter.remaining > 0 {
        program.loops.insert(line, counter);
        line + 1
    } else {
        // Keep the captured count for the next round of this pass.
        program.loops.insert(
            line,
            LoopCounter {
                remaining: counter.initial,
                initial: counter.initial,
            },
        );
        exit
    }
}

fn leave_loop(program: &mut Program, line: usize) -> usize {
    let Some(&exit) = program.offs.get(&line) else {
        return line + 1;
    };
    if let Some(&start) = program.offs.get(&(exit - 1))
        && let Some(counter) = program.loops.get_mut(&start)
    {
        counter.remaining = counter.initial;
    }
    exit
}

fn close_block(program: &mut Program, line: usize) -> usize {
    let Some(&opener) = program.offs.get(&line) else {
        return line + 1;
    };
    match program.band.command(program.code[opener]) {
        Some(Opcode::Loop) => {
            program.just_looped = true;
            opener
        }
        Some(Opcode::Func) => match program.stack.pop() {
            Some(frame) => {
                program.restore(frame);
                program.line
            }
            None => line + 1,
        },
        _ => line + 1,
    }
}

fn call(program: &mut Program, line: usize) -> usize {
    if program.funcs.is_empty() {
        return line + 1;
    }
    let index = i64::from(program.ax).rem_euclid(program.funcs.len() as i64) as usize;
    let func = program.funcs[index];
    let body = func + 1;
    let exit = skip_block(program, func);
    if body >= program.code.len() || exit == body + 1 {
        return line + 1;
    }
    let frame = Frame {
        line: line + 1,
        ax: program.ax,
        bx: program.bx,
    };
    if !program.push_frame(frame) {
        program.restart();
        return 0;
    }
    body
}

fn ret(program: &mut Program) -> usize {
    program.ret = program.ax;
    match program.stack.pop() {
        Some(frame) => {
            program.restore(frame);
            program.line
        }
        None => {
            program.restart();
            0
        }
    }
}

impl InstructionTable for BaseInstructions {
    fn name(&self) -> &'static str {
        "base"
    }

    fn execute(&mut self, op: Opcode, slice: &mut Slice<'_>) -> Dispatch {
        let age = slice.organism.age;
        let p = &mut slice.organism.program;
        let line = p.line;
        let mut next = line + 1;
        match op {
            Opcode::Toggle => std::mem::swap(&mut p.ax, &mut p.bx),
            Opcode::Eq => p.ax = p.bx,
            Opcode::Nop => {}
            Opcode::Add => p.ax = p.ax.saturating_add(p.bx),
            Opcode::Sub => p.ax = p.ax.saturating_sub(p.bx),
            Opcode::Mul => p.ax = p.ax.saturating_mul(p.bx),
            Opcode::Div => p.ax = divide(p.ax, p.bx),
            Opcode::Inc => p.ax = p.ax.saturating_add(1),
            Opcode::Dec => p.ax = p.ax.saturating_sub(1),
            Opcode::RShift => p.ax >>= 1,
            Opcode::LShift => p.ax = p.ax.saturating_mul(2),
            Opcode::Rand => {
                p.ax = slice
                    .world
                    .rng
                    .random_range(0..i32::from(p.band.cmd_offset));
            }
            Opcode::Ifp if p.ax <= 0 => next = skip_block(p, line),
            Opcode::Ifn if p.ax >= 0 => next = skip_block(p, line),
            Opcode::Ifz if p.ax != 0 => next = skip_block(p, line),
            Opcode::Ifg if p.ax <= p.bx => next = skip_block(p, line),
            Opcode::Ifl if p.ax >= p.bx => next = skip_block(p, line),
            Opcode::Ife if p.ax != p.bx => next = skip_block(p, line),
            Opcode::Ifne if p.ax == p.bx => next = skip_block(p, line),
            Opcode::Ifp
            | Opcode::Ifn
            | Opcode::Ifz
            | Opcode::Ifg
            | Opcode::Ifl
            | Opcode::Ife
            | Opcode::Ifne => {}
            Opcode::Loop => next = enter_loop(p, line, slice.looped),
            Opcode::Call => next = call(p, line),
            Opcode::Func => next = skip_block(p, line),
            Opcode::Ret => next = ret(p),
            Opcode::End => next = close_block(p, line),
            Opcode::Nand => p.ax = !(p.ax & p.bx),
            Opcode::Age => p.ax = i32::try_from(age).unwrap_or(i32::MAX),
            Opcode::Line => p.ax = saturate(line),
            Opcode::Len => p.ax = saturate(p.code.len()),
            Opcode::Left => p.shift_memory(false),
            Opcode::Right => p.shift_memory(true),
            Opcode::Save => {
                let pos = p.mem_pos;
                p.mem[pos] = p.ax;
            }
            Opcode::Load => p.ax = p.mem[p.mem_pos],
            Opcode::Break => next = leave_loop(p, line),
            Opcode::Rax => p.ax = p.ret,
            _ => return Dispatch::Unhandled,
        }
        p.line = next;
        Dispatch::Handled
    }
}

/// Counters describing one [`Engine::run`] batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    /// Number of runs completed including this one.
    pub run: u64,
    pub repeats: usize,
    pub instructions: u64,
    pub births: usize,
    pub deaths: usize,
    pub organisms: usize,
    pub molecules: usize,
}

/// Owns a world and advances it in bounded batches.
pub struct Engine {
    world: World,
    base: Box<dyn InstructionTable>,
    extension: Box<dyn InstructionTable>,
    hooks: HookRegistry,
    mutations: MutationEngine,
    runs: u64,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("world", &self.world)
            .field("base", &self.base.name())
            .field("extension", &self.extension.name())
            .field("hooks", &self.hooks.len())
            .field("runs", &self.runs)
            .finish()
    }
}

impl Engine {
    /// Engine with the spatial extension installed.
    #[must_use]
    pub fn new(world: World) -> Self {
        Self::with_extension(world, Box::new(SpatialExtension))
    }

    /// Engine whose second dispatch table is `extension`.
    #[must_use]
    pub fn with_extension(world: World, extension: Box<dyn InstructionTable>) -> Self {
        Self {
            world,
            base: Box::new(BaseInstructions),
            extension,
            hooks: HookRegistry::new(),
            mutations: MutationEngine,
            runs: 0,
        }
    }

    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    #[must_use]
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    #[must_use]
    pub fn into_world(self) -> World {
        self.world
    }

    #[must_use]
    pub fn hooks(&self) -> &HookRegistry {
        &self.hooks
    }

    #[must_use]
    pub fn hooks_mut(&mut self) -> &mut HookRegistry {
        &mut self.hooks
    }

    /// Runs completed so far.
    #[must_use]
    pub const fn runs(&self) -> u64 {
        self.runs
    }

    /// Execute `repeats_per_run` scheduling passes and return.
    ///
    /// Each pass walks organism slots from the highest index down, so an
    /// organism removed or created during the pass is never visited twice.
    pub fn run(&mut self) -> RunSummary {
        let repeats = self.world.config.repeats_per_run;
        let mut instructions = 0;
        for _ in 0..repeats {
            for slot in (0..self.world.organisms.capacity()).rev() {
                let Some(mut organism) = self.world.organisms.checkout(slot) else {
                    continue;
                };
                self.hooks.before_iteration(slot, &organism);
                instructions += self.execute_slice(slot, &mut organism);
                self.finish_tick(&mut organism);
                self.hooks.after_iteration(slot, &organism);
                if organism.is_alive() {
                    self.world.organisms.restore(slot, organism);
                } else {
                    self.world.bury(slot, organism);
                }
            }
            self.hooks.after_repeat(&self.world);
        }

        self.runs += 1;
        let (births, deaths) = self.world.take_counters();
        let summary = RunSummary {
            run: self.runs,
            repeats,
            instructions,
            births,
            deaths,
            organisms: self.world.organism_count(),
            molecules: self.world.molecule_count(),
        };
        self.hooks.after_run(&self.world, &summary);
        debug!(
            run = summary.run,
            organisms = summary.organisms,
            molecules = summary.molecules,
            births,
            deaths,
            "run complete"
        );
        summary
    }

    /// Run one organism's instruction budget, stopping early if it dies.
    fn execute_slice(&mut self, slot: usize, organism: &mut Organism) -> u64 {
        let budget = self.world.config.instructions_per_tick;
        let band = self.world.band;
        let mut executed = 0;
        while executed < budget && organism.is_alive() {
            let program = &mut organism.program;
            if program.line >= program.code.len() {
                program.wrap();
                continue;
            }
            let looped = std::mem::take(&mut program.just_looped);
            match band.decode(program.code[program.line]) {
                Decoded::Literal(value) => {
                    program.ax = i32::from(value);
                    program.line += 1;
                }
                Decoded::Command(op) => {
                    let mut slice = Slice {
                        slot,
                        organism: &mut *organism,
                        world: &mut self.world,
                        looped,
                    };
                    if self.base.execute(op, &mut slice) == Dispatch::Unhandled
                        && self.extension.execute(op, &mut slice) == Dispatch::Unhandled
                    {
                        slice.organism.program.line += 1;
                    }
                }
                Decoded::Unknown(_) => program.line += 1,
            }
            executed += 1;
        }
        executed as u64
    }

    /// Age, metabolism and periodic mutation after a slice.
    fn finish_tick(&mut self, organism: &mut Organism) {
        organism.age += 1;
        let cost = (organism.program.len() as f64 * self.world.config.atom_cost).ceil() as i64;
        organism.energy = organism.energy.saturating_sub(cost);
        let period = u64::from(organism.program.mutation.period.max(1));
        if organism.is_alive() && organism.age.is_multiple_of(period) {
            self.mutations.mutate(organism, &mut self.world);
        }
    }
}
