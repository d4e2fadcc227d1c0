//! Per-organism code, registers and compiled jump metadata.

use std::collections::HashMap;
use std::ops::Range;

use serde::{Deserialize, Serialize};

use crate::SoupConfig;
use crate::opcode::{Atom, Band};

/// `ret` value after a successful spatial instruction.
pub const RET_OK: i32 = 1;
/// `ret` value after a spatial instruction that could not be carried out.
pub const RET_ERR: i32 = 0;

/// Saved caller state pushed by `call`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Frame {
    /// Line to resume at when the callee returns.
    pub line: usize,
    pub ax: i32,
    pub bx: i32,
}

/// Live iteration state of one `loop` instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoopCounter {
    /// Iterations left in the current round.
    pub remaining: i32,
    /// Count captured from `ax` when the slot was first filled.
    pub initial: i32,
}

/// Heritable knobs steering the mutation engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MutationParams {
    /// One weight per mutation operator.
    pub probabilities: Vec<u32>,
    /// Ticks between mutation bursts.
    pub period: u32,
    /// Fraction of the code edited per burst.
    pub percent: f32,
}

impl MutationParams {
    #[must_use]
    pub fn from_config(config: &SoupConfig) -> Self {
        Self {
            probabilities: config.mutation_probabilities.clone(),
            period: config.mutation_period,
            percent: config.mutation_percent,
        }
    }
}

/// Shape of one applied code edit, consumed by the incremental patcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EditDelta {
    /// First affected index.
    pub index1: usize,
    /// `index1` plus the number of inserted or removed atoms.
    pub index2: usize,
    /// `1` for insertion, `-1` for deletion, `0` for same-length replacement.
    pub direction: i8,
    /// Function count before the edit.
    pub previous_function_count: usize,
    /// Whether any atom entering or leaving the code carries block structure.
    pub structural: bool,
}

impl EditDelta {
    /// Number of atoms inserted or removed.
    #[must_use]
    pub fn amount(&self) -> usize {
        self.index2 - self.index1
    }
}

/// Code buffer plus everything the interpreter derives from it.
///
/// The buffer is private: every change goes through [`Program::apply_edit`],
/// which patches `offs`, `loops`, `funcs`, the call stack and `line` in the
/// same call.
#[derive(Debug, Clone)]
pub struct Program {
    pub(crate) code: Vec<Atom>,
    pub(crate) band: Band,
    pub(crate) max_size: usize,
    pub ax: i32,
    pub bx: i32,
    pub ret: i32,
    pub(crate) line: usize,
    pub(crate) mem: Vec<i32>,
    pub(crate) mem_pos: usize,
    pub(crate) offs: HashMap<usize, usize>,
    pub(crate) loops: HashMap<usize, LoopCounter>,
    pub(crate) stack: Vec<Frame>,
    pub(crate) stack_depth: usize,
    pub(crate) funcs: Vec<usize>,
    pub(crate) just_looped: bool,
    pub mutation: MutationParams,
}

impl Program {
    /// Build and compile a program with configuration defaults.
    ///
    /// Code longer than `code_max_size` is truncated.
    #[must_use]
    pub fn new(mut code: Vec<Atom>, config: &SoupConfig) -> Self {
        code.truncate(config.code_max_size);
        let mut program = Self {
            code,
            band: config.band(),
            max_size: config.code_max_size,
            ax: 0,
            bx: 0,
            ret: 0,
            line: 0,
            mem: vec![0; config.memory_size],
            mem_pos: 0,
            offs: HashMap::new(),
            loops: HashMap::new(),
            stack: Vec::with_capacity(config.stack_depth),
            stack_depth: config.stack_depth,
            funcs: Vec::new(),
            just_looped: false,
            mutation: MutationParams::from_config(config),
        };
        program.compile();
        program
    }

    /// Fresh program for `code` inheriting this program's mutation parameters.
    #[must_use]
    pub fn offspring(&self, mut code: Vec<Atom>) -> Self {
        code.truncate(self.max_size);
        let mut child = Self {
            code,
            band: self.band,
            max_size: self.max_size,
            ax: 0,
            bx: 0,
            ret: 0,
            line: 0,
            mem: vec![0; self.mem.len()],
            mem_pos: 0,
            offs: HashMap::new(),
            loops: HashMap::new(),
            stack: Vec::with_capacity(self.stack_depth),
            stack_depth: self.stack_depth,
            funcs: Vec::new(),
            just_looped: false,
            mutation: self.mutation.clone(),
        };
        child.compile();
        child
    }

    #[must_use]
    pub fn code(&self) -> &[Atom] {
        &self.code
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    #[must_use]
    pub fn max_size(&self) -> usize {
        self.max_size
    }

    /// Whether `extra` atoms can be inserted without passing the size limit.
    #[must_use]
    pub fn has_room(&self, extra: usize) -> bool {
        self.code.len() + extra <= self.max_size
    }

    #[must_use]
    pub fn band(&self) -> Band {
        self.band
    }

    /// Index of the next instruction.
    #[must_use]
    pub fn line(&self) -> usize {
        self.line
    }

    #[must_use]
    pub fn memory(&self) -> &[i32] {
        &self.mem
    }

    #[must_use]
    pub fn memory_pos(&self) -> usize {
        self.mem_pos
    }

    /// Jump-offset table linking block openers and closers.
    #[must_use]
    pub fn offs(&self) -> &HashMap<usize, usize> {
        &self.offs
    }

    #[must_use]
    pub fn loops(&self) -> &HashMap<usize, LoopCounter> {
        &self.loops
    }

    #[must_use]
    pub fn call_stack(&self) -> &[Frame] {
        &self.stack
    }

    /// Indices of every `func` opener in code order.
    #[must_use]
    pub fn funcs(&self) -> &[usize] {
        &self.funcs
    }

    /// Replace `range` with `replacement` and patch every derived table.
    ///
    /// Returns `None`, leaving the program untouched, when the range is out
    /// of bounds or the result would exceed the maximum code size. A splice
    /// whose removed and inserted lengths differ is applied as a same-length
    /// replacement followed by one insertion or deletion, each patched in
    /// turn.
    pub fn apply_edit(&mut self, range: Range<usize>, replacement: &[Atom]) -> Option<EditDelta> {
        debug_assert!(
            range.start <= range.end && range.end <= self.code.len(),
            "edit range {range:?} outside code of length {}",
            self.code.len()
        );
        if range.start > range.end || range.end > self.code.len() {
            return None;
        }
        let removed = range.len();
        let inserted = replacement.len();
        if inserted > removed && !self.has_room(inserted - removed) {
            return None;
        }

        let common = removed.min(inserted);
        let mut delta = None;
        if common > 0 {
            delta = Some(self.replace(range.start, &replacement[..common]));
        }
        if removed > common {
            delta = Some(self.remove(range.start + common..range.end));
        } else if inserted > common {
            delta = Some(self.insert(range.start + common, &replacement[common..]));
        }
        delta.or(Some(EditDelta {
            index1: range.start,
            index2: range.start,
            direction: 0,
            previous_function_count: self.funcs.len(),
            structural: false,
        }))
    }

    fn replace(&mut self, at: usize, atoms: &[Atom]) -> EditDelta {
        let band = self.band;
        let span = at..at + atoms.len();
        let structural = self.code[span.clone()]
            .iter()
            .chain(atoms)
            .any(|&atom| band.is_structural(atom));
        self.code[span].copy_from_slice(atoms);
        let delta = EditDelta {
            index1: at,
            index2: at,
            direction: 0,
            previous_function_count: self.funcs.len(),
            structural,
        };
        self.update_metadata(&delta);
        delta
    }

    fn remove(&mut self, range: Range<usize>) -> EditDelta {
        let band = self.band;
        let structural = self.code[range.clone()]
            .iter()
            .any(|&atom| band.is_structural(atom));
        let delta = EditDelta {
            index1: range.start,
            index2: range.end,
            direction: -1,
            previous_function_count: self.funcs.len(),
            structural,
        };
        self.code.drain(range);
        self.update_metadata(&delta);
        delta
    }

    fn insert(&mut self, at: usize, atoms: &[Atom]) -> EditDelta {
        let band = self.band;
        let structural = atoms.iter().any(|&atom| band.is_structural(atom));
        let delta = EditDelta {
            index1: at,
            index2: at + atoms.len(),
            direction: 1,
            previous_function_count: self.funcs.len(),
            structural,
        };
        self.code.splice(at..at, atoms.iter().copied());
        self.update_metadata(&delta);
        delta
    }

    /// Move the memory pointer one cell left or right, wrapping around.
    pub(crate) fn shift_memory(&mut self, right: bool) {
        let len = self.mem.len();
        self.mem_pos = if right {
            (self.mem_pos + 1) % len
        } else {
            (self.mem_pos + len - 1) % len
        };
    }

    /// Handle running off the end of the code: return from a pending call or
    /// start a new pass at line 0.
    pub(crate) fn wrap(&mut self) {
        if let Some(frame) = self.stack.pop() {
            self.restore(frame);
        } else {
            self.restart();
        }
    }

    /// Start a new pass from line 0 with no pending calls or loop rounds.
    pub(crate) fn restart(&mut self) {
        self.line = 0;
        self.stack.clear();
        self.loops.clear();
        self.just_looped = false;
    }

    pub(crate) fn restore(&mut self, frame: Frame) {
        self.line = frame.line;
        self.ax = frame.ax;
        self.bx = frame.bx;
    }

    /// Push a call frame; `false` when the stack is exhausted.
    pub(crate) fn push_frame(&mut self, frame: Frame) -> bool {
        if self.stack.len() >= self.stack_depth {
            return false;
        }
        self.stack.push(frame);
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::opcode::Opcode;

    fn config() -> SoupConfig {
        SoupConfig {
            code_max_size: 8,
            ..SoupConfig::default()
        }
    }

    fn op(op: Opcode) -> Atom {
        config().band().encode(op)
    }

    #[test]
    fn new_truncates_and_compiles() {
        let code = vec![op(Opcode::Ifp), 1, op(Opcode::End), 2, 3, 4, 5, 6, 7, 8];
        let program = Program::new(code, &config());
        assert_eq!(program.len(), 8);
        assert_eq!(program.offs().get(&0), Some(&3));
        assert_eq!(program.offs().get(&2), Some(&0));
    }

    #[test]
    fn apply_edit_respects_size_limit() {
        let mut program = Program::new(vec![1; 7], &config());
        assert!(program.apply_edit(7..7, &[2, 3]).is_none());
        assert_eq!(program.len(), 7);
        let delta = program.apply_edit(7..7, &[2]).expect("room for one");
        assert_eq!(delta.direction, 1);
        assert_eq!(program.len(), 8);
        assert!(!program.has_room(1));
    }

    #[test]
    fn apply_edit_reports_direction() {
        let mut program = Program::new(vec![1, 2, 3, 4], &config());
        let delta = program.apply_edit(1..3, &[]).expect("delete");
        assert_eq!((delta.index1, delta.index2, delta.direction), (1, 3, -1));
        assert_eq!(program.code(), &[1, 4]);
        let delta = program.apply_edit(0..1, &[9]).expect("replace");
        assert_eq!(delta.direction, 0);
        assert_eq!(program.code(), &[9, 4]);
        let delta = program.apply_edit(0..1, &[5, 6, 7]).expect("grow");
        assert_eq!((delta.index1, delta.index2, delta.direction), (1, 3, 1));
        assert_eq!(program.code(), &[5, 6, 7, 4]);
    }

    #[test]
    fn offspring_inherits_mutation_params_only() {
        let mut parent = Program::new(vec![1, 2, 3], &config());
        parent.mutation.period = 7;
        parent.ax = 99;
        let child = parent.offspring(vec![4, 5]);
        assert_eq!(child.mutation.period, 7);
        assert_eq!(child.ax, 0);
        assert_eq!(child.code(), &[4, 5]);
    }

    #[test]
    fn memory_pointer_wraps_both_ways() {
        let mut program = Program::new(vec![1], &config());
        let len = program.memory().len();
        program.shift_memory(false);
        assert_eq!(program.memory_pos(), len - 1);
        program.shift_memory(true);
        assert_eq!(program.memory_pos(), 0);
    }
}
