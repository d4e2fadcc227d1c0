//! Text form of code: one instruction per line.
//!
//! ```text
//! # comments run to end of line
//! 3            # literal
//! loop
//!   inc
//! end ;        # `;` marks the molecule's final atom
//! op120        # command value with no enabled opcode
//! ```

use std::fmt::Write as _;

use thiserror::Error;

use crate::opcode::{Atom, Band, Decoded, MOL_FLAG, Opcode, VALUE_MASK, is_last};

/// Problems found while assembling a listing.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum AssemblyError {
    #[error("line {line}: unknown mnemonic `{token}`")]
    UnknownMnemonic { line: usize, token: String },
    #[error("line {line}: `{token}` is not a literal below {limit}")]
    InvalidLiteral {
        line: usize,
        token: String,
        limit: u8,
    },
    #[error("line {line}: `{token}` is not an unassigned command value")]
    InvalidCommand { line: usize, token: String },
    #[error("line {line}: unexpected `{token}`")]
    UnexpectedToken { line: usize, token: String },
}

/// Converts between atoms and listings for one command band.
#[derive(Debug, Clone, Copy, Default)]
pub struct Assembly {
    band: Band,
}

impl Assembly {
    #[must_use]
    pub const fn new(band: Band) -> Self {
        Self { band }
    }

    /// Render `code` as a listing, indenting block bodies.
    #[must_use]
    pub fn disassemble(&self, code: &[Atom]) -> String {
        let mut out = String::new();
        let mut depth: usize = 0;
        for &atom in code {
            let decoded = self.band.decode(atom);
            if decoded == Decoded::Command(Opcode::End) {
                depth = depth.saturating_sub(1);
            }
            for _ in 0..depth {
                out.push_str("  ");
            }
            match decoded {
                Decoded::Literal(value) => {
                    let _ = write!(out, "{value}");
                }
                Decoded::Command(op) => out.push_str(op.mnemonic()),
                Decoded::Unknown(value) => {
                    let _ = write!(out, "op{value}");
                }
            }
            if is_last(atom) {
                out.push_str(" ;");
            }
            out.push('\n');
            if let Decoded::Command(op) = decoded
                && op.is_block_opener()
            {
                depth += 1;
            }
        }
        out
    }

    /// Parse a listing back into atoms.
    pub fn assemble(&self, text: &str) -> Result<Vec<Atom>, AssemblyError> {
        let mut code = Vec::new();
        for (index, raw) in text.lines().enumerate() {
            let line = index + 1;
            let source = raw.split('#').next().unwrap_or_default();
            let mut tokens = source.split_whitespace();
            let Some(first) = tokens.next() else {
                continue;
            };
            let (word, mut last) = match first.strip_suffix(';') {
                Some(word) => (word, true),
                None => (first, false),
            };
            for token in tokens {
                if token == ";" && !last {
                    last = true;
                } else {
                    return Err(AssemblyError::UnexpectedToken {
                        line,
                        token: token.to_owned(),
                    });
                }
            }
            let atom = self.parse_word(word, line)?;
            code.push(if last { atom | MOL_FLAG } else { atom });
        }
        Ok(code)
    }

    fn parse_word(&self, word: &str, line: usize) -> Result<Atom, AssemblyError> {
        let band = self.band;
        if word.starts_with(|c: char| c.is_ascii_digit() || c == '-' || c == '+') {
            return match word.parse::<u8>() {
                Ok(value) if value < band.cmd_offset => Ok(value),
                _ => Err(AssemblyError::InvalidLiteral {
                    line,
                    token: word.to_owned(),
                    limit: band.cmd_offset,
                }),
            };
        }
        if let Some(raw) = word.strip_prefix("op")
            && raw.starts_with(|c: char| c.is_ascii_digit())
        {
            let first_unassigned = u16::from(band.cmd_offset) + u16::from(band.opcode_count);
            return match raw.parse::<u8>() {
                Ok(value) if u16::from(value) >= first_unassigned && value <= VALUE_MASK => {
                    Ok(value)
                }
                _ => Err(AssemblyError::InvalidCommand {
                    line,
                    token: word.to_owned(),
                }),
            };
        }
        match Opcode::from_mnemonic(word) {
            Some(op) if op.index() < usize::from(band.opcode_count) => Ok(band.encode(op)),
            _ => Err(AssemblyError::UnknownMnemonic {
                line,
                token: word.to_owned(),
            }),
        }
    }
}
