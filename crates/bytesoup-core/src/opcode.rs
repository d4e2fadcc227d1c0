//! Atom encoding and the instruction set.

use serde::{Deserialize, Serialize};

/// One code byte.
pub type Atom = u8;

/// High bit marking the last atom of a molecule.
pub const MOL_FLAG: Atom = 0b1000_0000;
/// Low seven bits hold the literal or command value.
pub const VALUE_MASK: Atom = 0b0111_1111;

/// Value of `atom` without its molecule flag.
#[inline]
#[must_use]
pub const fn value(atom: Atom) -> u8 {
    atom & VALUE_MASK
}

/// Whether `atom` closes a molecule.
#[inline]
#[must_use]
pub const fn is_last(atom: Atom) -> bool {
    atom & MOL_FLAG != 0
}

/// `atom` with its value replaced, keeping its molecule flag.
#[inline]
#[must_use]
pub const fn with_value(atom: Atom, value: u8) -> Atom {
    (atom & MOL_FLAG) | (value & VALUE_MASK)
}

/// Every command the interpreter knows, in band order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Opcode {
    Toggle,
    Eq,
    Nop,
    Add,
    Sub,
    Mul,
    Div,
    Inc,
    Dec,
    RShift,
    LShift,
    Rand,
    Ifp,
    Ifn,
    Ifz,
    Ifg,
    Ifl,
    Ife,
    Ifne,
    Loop,
    Call,
    Func,
    Ret,
    End,
    Nand,
    Age,
    Line,
    Len,
    Left,
    Right,
    Save,
    Load,
    Break,
    Rax,
    Join,
    Split,
    Step,
    See,
    Say,
    Listen,
    Nread,
    Get,
    Put,
    Offs,
    Color,
}

impl Opcode {
    /// All opcodes; position in this table is the band index.
    pub const ALL: [Opcode; 45] = [
        Opcode::Toggle,
        Opcode::Eq,
        Opcode::Nop,
        Opcode::Add,
        Opcode::Sub,
        Opcode::Mul,
        Opcode::Div,
        Opcode::Inc,
        Opcode::Dec,
        Opcode::RShift,
        Opcode::LShift,
        Opcode::Rand,
        Opcode::Ifp,
        Opcode::Ifn,
        Opcode::Ifz,
        Opcode::Ifg,
        Opcode::Ifl,
        Opcode::Ife,
        Opcode::Ifne,
        Opcode::Loop,
        Opcode::Call,
        Opcode::Func,
        Opcode::Ret,
        Opcode::End,
        Opcode::Nand,
        Opcode::Age,
        Opcode::Line,
        Opcode::Len,
        Opcode::Left,
        Opcode::Right,
        Opcode::Save,
        Opcode::Load,
        Opcode::Break,
        Opcode::Rax,
        Opcode::Join,
        Opcode::Split,
        Opcode::Step,
        Opcode::See,
        Opcode::Say,
        Opcode::Listen,
        Opcode::Nread,
        Opcode::Get,
        Opcode::Put,
        Opcode::Offs,
        Opcode::Color,
    ];

    /// Number of base (non-spatial) opcodes at the front of [`Opcode::ALL`].
    pub const BASE_COUNT: usize = 34;

    #[must_use]
    pub fn index(self) -> usize {
        self as usize
    }

    #[must_use]
    pub fn from_index(index: usize) -> Option<Self> {
        Self::ALL.get(index).copied()
    }

    /// Lower-case assembly mnemonic.
    #[must_use]
    pub const fn mnemonic(self) -> &'static str {
        match self {
            Self::Toggle => "toggle",
            Self::Eq => "eq",
            Self::Nop => "nop",
            Self::Add => "add",
            Self::Sub => "sub",
            Self::Mul => "mul",
            Self::Div => "div",
            Self::Inc => "inc",
            Self::Dec => "dec",
            Self::RShift => "rshift",
            Self::LShift => "lshift",
            Self::Rand => "rand",
            Self::Ifp => "ifp",
            Self::Ifn => "ifn",
            Self::Ifz => "ifz",
            Self::Ifg => "ifg",
            Self::Ifl => "ifl",
            Self::Ife => "ife",
            Self::Ifne => "ifne",
            Self::Loop => "loop",
            Self::Call => "call",
            Self::Func => "func",
            Self::Ret => "ret",
            Self::End => "end",
            Self::Nand => "nand",
            Self::Age => "age",
            Self::Line => "line",
            Self::Len => "len",
            Self::Left => "left",
            Self::Right => "right",
            Self::Save => "save",
            Self::Load => "load",
            Self::Break => "break",
            Self::Rax => "rax",
            Self::Join => "join",
            Self::Split => "split",
            Self::Step => "step",
            Self::See => "see",
            Self::Say => "say",
            Self::Listen => "listen",
            Self::Nread => "nread",
            Self::Get => "get",
            Self::Put => "put",
            Self::Offs => "offs",
            Self::Color => "color",
        }
    }

    #[must_use]
    pub fn from_mnemonic(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|op| op.mnemonic() == name)
    }

    /// Opens a block that `end` closes.
    #[must_use]
    pub const fn is_block_opener(self) -> bool {
        matches!(
            self,
            Self::Ifp
                | Self::Ifn
                | Self::Ifz
                | Self::Ifg
                | Self::Ifl
                | Self::Ife
                | Self::Ifne
                | Self::Loop
                | Self::Func
        )
    }

    /// Carries an entry in the jump-offset table.
    #[must_use]
    pub const fn is_structural(self) -> bool {
        self.is_block_opener() || matches!(self, Self::End | Self::Break)
    }
}

/// Meaning of one atom under a given [`Band`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decoded {
    Literal(u8),
    Command(Opcode),
    /// Inside the command band but past the enabled opcodes.
    Unknown(u8),
}

/// Placement of the command band inside the 7-bit atom value space.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Band {
    pub cmd_offset: u8,
    pub opcode_count: u8,
}

impl Band {
    #[must_use]
    pub const fn new(cmd_offset: u8, opcode_count: u8) -> Self {
        Self {
            cmd_offset,
            opcode_count,
        }
    }

    #[inline]
    #[must_use]
    pub fn decode(self, atom: Atom) -> Decoded {
        let value = value(atom);
        if value < self.cmd_offset {
            return Decoded::Literal(value);
        }
        let index = value - self.cmd_offset;
        if index >= self.opcode_count {
            return Decoded::Unknown(value);
        }
        match Opcode::from_index(usize::from(index)) {
            Some(op) => Decoded::Command(op),
            None => Decoded::Unknown(value),
        }
    }

    /// Decoded command, if `atom` is an enabled one.
    #[inline]
    #[must_use]
    pub fn command(self, atom: Atom) -> Option<Opcode> {
        match self.decode(atom) {
            Decoded::Command(op) => Some(op),
            _ => None,
        }
    }

    /// Atom for `op`, without molecule flag.
    #[must_use]
    pub fn encode(self, op: Opcode) -> Atom {
        self.cmd_offset + op.index() as u8
    }

    /// Whether `atom` carries a jump-table entry.
    #[inline]
    #[must_use]
    pub fn is_structural(self, atom: Atom) -> bool {
        self.command(atom).is_some_and(Opcode::is_structural)
    }
}

impl Default for Band {
    fn default() -> Self {
        Self::new(64, Opcode::ALL.len() as u8)
    }
}
