/// Rotation cursor over the currency table.
///
/// Owned by the runner and touched by one cycle at a time, so it is a
/// plain struct with no synchronization. Lives only in memory: a restart
/// begins again at index 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunnerState {
    cursor: usize,
    len: usize,
}

impl RunnerState {
    /// Cursor over a table of `len` entries, starting at 0.
    ///
    /// PANICS:
    /// - if `len` is zero (there would be nothing to rotate over)
    pub fn new(len: usize) -> Self {
        assert!(len > 0, "rotation needs at least one entry");
        Self { cursor: 0, len }
    }

    /// Index of the entry due this cycle.
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    /// Moves to the next entry after a cycle, wrapping at the table size.
    pub fn advance(&mut self) {
        self.cursor += 1;
        if self.cursor == self.len {
            self.cursor = 0;
        }
    }
}
