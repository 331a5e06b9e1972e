//! # Transfer Cursors
//!
//! A cursor is the caller's side of a transfer: a starting physical offset
//! and a buffer that is consumed strictly front to back. The engine hands it
//! one in-page window at a time.

/// Caller side of a transfer.
pub trait TransferCursor {
    /// Physical offset the transfer started at.
    fn offset(&self) -> i64;

    /// Bytes still to move.
    fn residual(&self) -> usize;

    /// Move bytes between `window` and the caller's buffer and advance.
    ///
    /// Returns how many bytes of `window` were *not* moved; anything other
    /// than zero aborts the transfer.
    fn move_window(&mut self, window: &mut [u8]) -> usize;
}

/// Copies physical memory into a caller buffer.
#[derive(Debug)]
pub struct ReadCursor<'b> {
    offset: i64,
    buf: &'b mut [u8],
    done: usize,
}

impl<'b> ReadCursor<'b> {
    #[must_use]
    pub const fn new(offset: i64, buf: &'b mut [u8]) -> Self {
        Self {
            offset,
            buf,
            done: 0,
        }
    }

    /// Bytes filled so far.
    #[must_use]
    pub const fn transferred(&self) -> usize {
        self.done
    }
}

impl TransferCursor for ReadCursor<'_> {
    fn offset(&self) -> i64 {
        self.offset
    }

    fn residual(&self) -> usize {
        self.buf.len() - self.done
    }

    fn move_window(&mut self, window: &mut [u8]) -> usize {
        let n = window.len().min(self.residual());
        self.buf[self.done..self.done + n].copy_from_slice(&window[..n]);
        self.done += n;
        window.len() - n
    }
}

/// Copies a caller buffer into physical memory.
#[derive(Debug)]
pub struct WriteCursor<'b> {
    offset: i64,
    data: &'b [u8],
    done: usize,
}

impl<'b> WriteCursor<'b> {
    #[must_use]
    pub const fn new(offset: i64, data: &'b [u8]) -> Self {
        Self {
            offset,
            data,
            done: 0,
        }
    }

    #[must_use]
    pub const fn transferred(&self) -> usize {
        self.done
    }
}

impl TransferCursor for WriteCursor<'_> {
    fn offset(&self) -> i64 {
        self.offset
    }

    fn residual(&self) -> usize {
        self.data.len() - self.done
    }

    fn move_window(&mut self, window: &mut [u8]) -> usize {
        let n = window.len().min(self.residual());
        window[..n].copy_from_slice(&self.data[self.done..self.done + n]);
        self.done += n;
        window.len() - n
    }
}
