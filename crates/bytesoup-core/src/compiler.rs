//! Block-matching compiler and the incremental patcher used after edits.
//!
//! `offs` links every block opener (`if*`, `loop`, `func`) to the line after
//! its closing `end`, every `end` back to its opener, and every `break` to the
//! line after its loop's `end`. Unclosed openers fall through (`offs[i] =
//! i + 1`); unmatched `end` and stray `break` get no entry.
//!
//! The patcher shifts tables in place only while an edit leaves block atoms
//! alone, costing O(table size). An edit that adds or removes an `if*`,
//! `loop`, `func`, `end` or `break` atom can re-pair every block after it, so
//! those edits pay for a full O(code length) scan instead.

use std::collections::HashMap;

use crate::opcode::{Atom, Band, Opcode};
use crate::program::{EditDelta, Program};

/// Result of a full scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BlockTable {
    pub offs: HashMap<usize, usize>,
    pub funcs: Vec<usize>,
}

/// Scan `code` once, matching blocks with an explicit stack.
#[must_use]
pub fn compile_blocks(code: &[Atom], band: Band) -> BlockTable {
    let mut table = BlockTable::default();
    let mut blocks: Vec<usize> = Vec::new();
    let mut loops: Vec<Vec<usize>> = Vec::new();

    for (line, &atom) in code.iter().enumerate() {
        let Some(op) = band.command(atom) else {
            continue;
        };
        if op.is_block_opener() {
            blocks.push(line);
            table.offs.insert(line, line + 1);
            match op {
                Opcode::Loop => loops.push(Vec::new()),
                Opcode::Func => table.funcs.push(line),
                _ => {}
            }
            continue;
        }
        match op {
            Opcode::Break => {
                if let Some(breaks) = loops.last_mut() {
                    breaks.push(line);
                }
            }
            Opcode::End => {
                let Some(opener) = blocks.pop() else {
                    continue;
                };
                table.offs.insert(line, opener);
                table.offs.insert(opener, line + 1);
                if band.command(code[opener]) == Some(Opcode::Loop)
                    && let Some(breaks) = loops.pop()
                {
                    for brk in breaks {
                        table.offs.insert(brk, line + 1);
                    }
                }
            }
            _ => {}
        }
    }

    table
}

/// New position of the instruction that sat at `index`.
fn shift_line(index: usize, delta: &EditDelta) -> usize {
    let amount = delta.amount();
    match delta.direction {
        1 if index >= delta.index1 => index + amount,
        -1 if index >= delta.index2 => index - amount,
        -1 if index >= delta.index1 => delta.index1,
        _ => index,
    }
}

/// New value of a "just after instruction `target - 1`" jump target.
fn shift_target(target: usize, delta: &EditDelta) -> usize {
    let amount = delta.amount();
    match delta.direction {
        1 if target > delta.index1 => target + amount,
        -1 if target > delta.index2 => target - amount,
        -1 if target > delta.index1 => delta.index1,
        _ => target,
    }
}

impl Program {
    /// Compile from scratch: rebuild the block table and reset `line`, the
    /// call stack, the memory pointer and every loop counter.
    pub fn compile(&mut self) {
        let table = compile_blocks(&self.code, self.band);
        self.offs = table.offs;
        self.funcs = table.funcs;
        self.line = 0;
        self.stack.clear();
        self.mem_pos = 0;
        self.loops.clear();
        self.just_looped = false;
    }

    /// Bring every derived table in line with the edit described by `delta`.
    ///
    /// Positions at or after the edit shift by its size; positions inside a
    /// deleted range collapse onto `index1`. When a block-structured atom
    /// entered or left the code the block table is rebuilt by a full scan
    /// instead, leaving execution state in place.
    pub(crate) fn update_metadata(&mut self, delta: &EditDelta) {
        debug_assert!(delta.index1 <= delta.index2, "inverted edit {delta:?}");
        debug_assert!(
            delta.direction != 0 || delta.index1 == delta.index2,
            "replacement with non-zero extent {delta:?}"
        );

        self.line = shift_line(self.line, delta);
        for frame in &mut self.stack {
            frame.line = shift_line(frame.line, delta);
        }
        let removed_range = delta.index1..delta.index2;
        self.loops = std::mem::take(&mut self.loops)
            .into_iter()
            .filter(|(start, _)| delta.direction >= 0 || !removed_range.contains(start))
            .map(|(start, counter)| (shift_line(start, delta), counter))
            .collect();

        if delta.structural {
            let table = compile_blocks(&self.code, self.band);
            self.offs = table.offs;
            self.funcs = table.funcs;
            let (code, band) = (&self.code, self.band);
            self.loops.retain(|&start, _| {
                code.get(start)
                    .is_some_and(|&atom| band.command(atom) == Some(Opcode::Loop))
            });
            if self.funcs.len() != delta.previous_function_count {
                tracing::trace!(
                    before = delta.previous_function_count,
                    after = self.funcs.len(),
                    "function table changed by edit"
                );
            }
            return;
        }

        if delta.direction == 0 {
            return;
        }
        let band = self.band;
        let code = &self.code;
        self.offs = std::mem::take(&mut self.offs)
            .into_iter()
            .map(|(from, to)| {
                let from = shift_line(from, delta);
                let closes = code
                    .get(from)
                    .is_some_and(|&atom| band.command(atom) == Some(Opcode::End));
                let to = if closes {
                    shift_line(to, delta)
                } else {
                    shift_target(to, delta)
                };
                (from, to)
            })
            .collect();
        for func in &mut self.funcs {
            *func = shift_line(*func, delta);
        }
    }
}
