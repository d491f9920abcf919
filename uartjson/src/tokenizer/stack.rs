// SPDX-License-Identifier: Apache-2.0

use super::TokenKind;

/// One open container: where its token lives and what closes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Frame {
    pub index: usize,
    pub kind: TokenKind,
}

impl Frame {
    const EMPTY: Frame = Frame {
        index: 0,
        kind: TokenKind::Undefined,
    };
}

/// Fixed-depth stack of the containers that are currently open.
///
/// The top is the container new values attach to once a key/value pair is
/// finished. Depth tracking is the caller's job only in the sense that a full
/// stack refuses the push.
#[derive(Debug, Clone)]
pub struct OpenStack<const DEPTH: usize> {
    frames: [Frame; DEPTH],
    len: usize,
}

impl<const DEPTH: usize> OpenStack<DEPTH> {
    pub const fn new() -> Self {
        Self {
            frames: [Frame::EMPTY; DEPTH],
            len: 0,
        }
    }

    /// Pushes a frame, returning false if the stack is full.
    #[must_use]
    pub fn push(&mut self, frame: Frame) -> bool {
        match self.frames.get_mut(self.len) {
            Some(slot) => {
                *slot = frame;
                self.len += 1;
                true
            }
            None => false,
        }
    }

    pub fn pop(&mut self) -> Option<Frame> {
        let top = self.top()?;
        self.len -= 1;
        Some(top)
    }

    pub fn top(&self) -> Option<Frame> {
        self.len
            .checked_sub(1)
            .and_then(|i| self.frames.get(i))
            .copied()
    }

    pub fn depth(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn clear(&mut self) {
        self.len = 0;
    }
}

impl<const DEPTH: usize> Default for OpenStack<DEPTH> {
    fn default() -> Self {
        Self::new()
    }
}
