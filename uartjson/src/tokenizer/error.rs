// SPDX-License-Identifier: Apache-2.0

/// What went wrong while tokenizing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrKind {
    /// Malformed input: bad escape, mismatched or unmatched closer, control
    /// byte in a primitive, or a character strict mode does not accept.
    Invalid,
    /// Input ended inside a string, a primitive (strict mode) or an open
    /// container. More data may complete it.
    Incomplete,
    /// The token array is full. Retry with a larger one.
    NoMemory,
    /// More nested containers than the open-container stack holds.
    MaxDepthReached,
}

impl ErrKind {
    /// Stable negative code, for reporting over the wire.
    pub const fn code(self) -> i8 {
        match self {
            ErrKind::NoMemory => -1,
            ErrKind::Invalid => -2,
            ErrKind::Incomplete => -3,
            ErrKind::MaxDepthReached => -4,
        }
    }
}

/// A tokenizer failure, with the offending byte and its offset.
#[derive(PartialEq, Eq, Clone, Copy)]
pub struct Error {
    kind: ErrKind,
    character: u8,
    position: usize,
}

impl Error {
    pub fn new<T>(kind: ErrKind, character: u8, position: usize) -> Result<T, Self> {
        Err(Self {
            kind,
            character,
            position,
        })
    }

    pub fn kind(&self) -> ErrKind {
        self.kind
    }

    /// The byte at [`position`](Error::position), or a space at end of input.
    pub fn character(&self) -> u8 {
        self.character
    }

    pub fn position(&self) -> usize {
        self.position
    }
}

impl core::fmt::Debug for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(
            f,
            "{:?}({}) at {}",
            self.kind, self.character as char, self.position
        )
    }
}

impl core::fmt::Display for Error {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let what = match self.kind {
            ErrKind::Invalid => "invalid input",
            ErrKind::Incomplete => "incomplete input",
            ErrKind::NoMemory => "out of tokens",
            ErrKind::MaxDepthReached => "nesting too deep",
        };
        write!(f, "{} ({}) at {}", what, self.kind.code(), self.position)
    }
}
