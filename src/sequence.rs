//! Per-run sequence numbering.

/// Hands out sequence numbers starting at 1.
///
/// One counter is created per run (or per association type) and threaded
/// through the pipeline explicitly.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceCounter {
    next: u32,
}

impl SequenceCounter {
    /// Counter starting at 1.
    #[must_use]
    pub const fn new() -> Self {
        Self::starting_at(1)
    }

    /// Counter starting at `start`.
    #[must_use]
    pub const fn starting_at(start: u32) -> Self {
        Self { next: start }
    }

    /// The value the next call will return.
    #[must_use]
    pub const fn peek(&self) -> u32 {
        self.next
    }
}

impl Default for SequenceCounter {
    fn default() -> Self {
        Self::new()
    }
}

impl Iterator for SequenceCounter {
    type Item = u32;

    fn next(&mut self) -> Option<u32> {
        let current = self.next;
        self.next = self.next.checked_add(1)?;
        Some(current)
    }
}
