//! Wrapping cursor over slide indices.

use crate::error::Error;
use crate::events::Direction;

/// Position in a show of `len` slides. Moves wrap in both directions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlideCursor {
    idx: usize,
    len: usize,
}

impl SlideCursor {
    /// Cursor at slide 0.
    ///
    /// # Errors
    /// Returns [`Error::EmptyShow`] if `len` is zero.
    pub fn new(len: usize) -> Result<Self, Error> {
        if len == 0 {
            return Err(Error::EmptyShow);
        }
        Ok(Self { idx: 0, len })
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// Always false; a cursor cannot be built over an empty show.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn current(&self) -> usize {
        self.idx
    }

    /// Index one step away from the current slide, without moving.
    #[must_use]
    pub const fn peek(&self, direction: Direction) -> usize {
        match direction {
            Direction::Forward => (self.idx + 1) % self.len,
            Direction::Backward => (self.idx + self.len - 1) % self.len,
        }
    }

    /// Index of the effect that animates the entry into slide `target`: the
    /// effect stored on the slide before it.
    #[must_use]
    pub const fn entry_effect(&self, target: usize) -> usize {
        (target + self.len - 1) % self.len
    }

    /// Moves to `index`, which must come from [`SlideCursor::peek`].
    pub const fn commit(&mut self, index: usize) {
        self.idx = index % self.len;
    }
}
