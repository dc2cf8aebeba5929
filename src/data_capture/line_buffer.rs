//! Newline reassembly for one stream direction.
//!
//! Bytes arrive in arbitrary chunks; records are the bytes between two `\n`
//! delimiters. The buffer only ever carries the bytes after the last delimiter
//! seen, so its size is bounded by one partial line.

const DELIMITER: u8 = b'\n';

#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
    /// Length of the prefix of `pending` already known to hold no delimiter.
    scanned: usize,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `chunk` and yields every record it completes, in arrival order.
    ///
    /// Records are produced lazily; lines the caller does not consume stay
    /// buffered and are yielded by the next `push` or `flush`.
    pub fn push(&mut self, chunk: &[u8]) -> Lines<'_> {
        self.pending.extend_from_slice(chunk);
        self.lines(false)
    }

    /// Yields any remaining complete lines, then the undelimited remainder
    /// as a final record if it is non-empty. Leaves the buffer empty.
    pub fn flush(&mut self) -> Lines<'_> {
        self.lines(true)
    }

    /// Bytes carried over since the last delimiter.
    pub fn pending(&self) -> &[u8] {
        &self.pending
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }

    fn lines(&mut self, at_end: bool) -> Lines<'_> {
        let search_from = self.scanned;
        Lines {
            buffer: self,
            consumed: 0,
            search_from,
            at_end,
        }
    }
}

/// Iterator over the records completed by one `push` or `flush`.
#[derive(Debug)]
pub struct Lines<'a> {
    buffer: &'a mut LineBuffer,
    consumed: usize,
    search_from: usize,
    at_end: bool,
}

impl Iterator for Lines<'_> {
    type Item = Vec<u8>;

    fn next(&mut self) -> Option<Vec<u8>> {
        loop {
            let pending = &self.buffer.pending;
            let start = self.consumed;
            let from = self.search_from.max(start);
            match pending[from..].iter().position(|&b| b == DELIMITER) {
                Some(offset) => {
                    let end = from + offset;
                    self.consumed = end + 1;
                    self.search_from = self.consumed;
                    if end == start {
                        // Blank lines carry nothing worth logging.
                        continue;
                    }
                    return Some(pending[start..end].to_vec());
                }
                None => {
                    self.search_from = pending.len();
                    if self.at_end && start < pending.len() {
                        self.consumed = pending.len();
                        return Some(pending[start..].to_vec());
                    }
                    return None;
                }
            }
        }
    }
}

impl Drop for Lines<'_> {
    fn drop(&mut self) {
        let buffer = &mut *self.buffer;
        buffer.pending.drain(..self.consumed);
        buffer.scanned = self.search_from.saturating_sub(self.consumed);
    }
}
