//! Incremental JSON output for large result sets.
//!
//! Items are written inside `{"results":[` ... `],"count":N}` as they are
//! produced, and the writer is flushed every `flush_every` items so a
//! consumer behind a buffered writer sees them before the end. Only
//! [`JsonArrayStream::finish`] writes the closing frame, so a stream that
//! stops early because of an error or cancellation never parses as a
//! complete document.

use crate::error::{FramedexError, Result};
use serde::Serialize;
use std::io::Write;
use tokio_util::sync::CancellationToken;

const OPEN: &[u8] = br#"{"results":["#;

pub struct JsonArrayStream<W: Write> {
    writer: W,
    count: usize,
    flush_every: usize,
}

impl<W: Write> JsonArrayStream<W> {
    /// Write the opening frame. Flushes after every item until
    /// [`with_flush_every`](Self::with_flush_every) says otherwise.
    pub fn new(mut writer: W) -> Result<Self> {
        writer.write_all(OPEN)?;
        Ok(Self {
            writer,
            count: 0,
            flush_every: 1,
        })
    }

    /// Flush after every `n` items; 0 is treated as 1.
    pub fn with_flush_every(mut self, n: usize) -> Self {
        self.flush_every = n.max(1);
        self
    }

    pub fn push<T: Serialize>(&mut self, item: &T) -> Result<()> {
        if self.count > 0 {
            self.writer.write_all(b",")?;
        }
        serde_json::to_writer(&mut self.writer, item)?;
        self.count += 1;
        if self.count % self.flush_every == 0 {
            self.writer.flush()?;
        }
        Ok(())
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Close the frame with the final count.
    pub fn finish(mut self) -> Result<W> {
        write!(self.writer, r#"],"count":{}}}"#, self.count)?;
        self.writer.flush()?;
        Ok(self.writer)
    }

    /// Push every item, checking `cancel` before each one, then close the
    /// frame. On cancellation the frame is left open and
    /// `FramedexError::Cancelled` is returned.
    pub fn finish_with<T, I>(mut self, items: I, cancel: &CancellationToken) -> Result<W>
    where
        T: Serialize,
        I: IntoIterator<Item = T>,
    {
        for item in items {
            if cancel.is_cancelled() {
                log::warn!("Result stream cancelled after {} items", self.count);
                self.abort();
                return Err(FramedexError::Cancelled);
            }
            self.push(&item)?;
        }
        self.finish()
    }

    /// Stop without closing the frame. Bytes already written are flushed.
    pub fn abort(mut self) -> W {
        if let Err(e) = self.writer.flush() {
            log::warn!("Flush failed while aborting stream: {}", e);
        }
        self.writer
    }
}

/// Stream every item, checking `cancel` before each one.
///
/// On cancellation the writer is flushed, the frame is left open, and
/// `FramedexError::Cancelled` is returned.
pub fn stream_results<W, T, I>(writer: W, items: I, cancel: &CancellationToken) -> Result<W>
where
    W: Write,
    T: Serialize,
    I: IntoIterator<Item = T>,
{
    JsonArrayStream::new(writer)?.finish_with(items, cancel)
}
