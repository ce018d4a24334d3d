use std::io;

use crate::chunkstore::{ChunkStore, StoreHandle};
use crate::descriptor::BlobContext;
use crate::error::Error;
use crate::provider::CloneStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WriteState {
    /// Nothing was written yet.
    Empty,
    /// `buffer[..filled]` holds the bytes of chunk `index`; `pending` is set
    /// while they have not reached the store.
    Accumulating {
        index: u32,
        filled: usize,
        pending: bool,
    },
    Closed,
}

/// An append-only write stream over one blob.
///
/// Bytes are collected into a single chunk-sized buffer. A full chunk is
/// stored once the next byte arrives, a partial one on [`WriteCursor::flush`]
/// or [`WriteCursor::close`]. Dropping an unclosed cursor flushes as well but
/// can only log a failure, so prefer `close`.
#[derive(Debug)]
pub struct WriteCursor<S: ChunkStore> {
    ctx: BlobContext,
    io: StoreHandle<S>,
    state: WriteState,
    written: u64,
    buffer: Vec<u8>,
}

impl<S: ChunkStore> WriteCursor<S> {
    pub fn new(ctx: BlobContext, io: StoreHandle<S>) -> Self {
        Self {
            ctx,
            io,
            state: WriteState::Empty,
            written: 0,
            buffer: Vec::new(),
        }
    }

    pub fn len(&self) -> u64 {
        self.ctx.descriptor.blob_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// How many bytes were accepted so far.
    pub fn position(&self) -> u64 {
        self.written
    }

    /// Appends `buffer[offset..offset + count]`.
    ///
    /// Fails with [`Error::StreamLengthExceeded`] if the bytes would not all
    /// fit into the blob, in which case none of them are taken.
    pub fn write(&mut self, buffer: &[u8], offset: usize, count: usize) -> Result<(), Error> {
        let end = offset
            .checked_add(count)
            .filter(|end| *end <= buffer.len())
            .ok_or_else(|| {
                Error::Argument(format!(
                    "invalid write parameters: buffer length {}, offset {offset}, count {count}",
                    buffer.len()
                ))
            })?;
        if count == 0 {
            return Ok(());
        }
        let requested = self.written.saturating_add(count as u64);
        if requested > self.len() {
            return Err(Error::StreamLengthExceeded {
                blob_size: self.len(),
                requested,
            });
        }

        let chunk_size = self.ctx.descriptor.chunk_size() as usize;
        if self.buffer.is_empty() {
            self.buffer = vec![0; chunk_size];
        }

        let mut rest = &buffer[offset..end];
        while !rest.is_empty() {
            let (index, filled) = match self.state {
                WriteState::Empty => (0, 0),
                WriteState::Accumulating { index, filled, .. } if filled == chunk_size => {
                    self.flush()?;
                    let next = index.checked_add(1).ok_or(Error::ChunkIndexOverflow {
                        position: self.written,
                        chunk_size: chunk_size as u32,
                    })?;
                    (next, 0)
                }
                WriteState::Accumulating { index, filled, .. } => (index, filled),
                WriteState::Closed => return Err(Error::NotSupported("write on a closed stream")),
            };

            let taken = rest.len().min(chunk_size - filled);
            self.buffer[filled..filled + taken].copy_from_slice(&rest[..taken]);
            self.state = WriteState::Accumulating {
                index,
                filled: filled + taken,
                pending: true,
            };
            self.written += taken as u64;
            rest = &rest[taken..];
        }
        Ok(())
    }

    pub fn write_all(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.write(bytes, 0, bytes.len())
    }

    pub fn write_byte(&mut self, byte: u8) -> Result<(), Error> {
        self.write(&[byte], 0, 1)
    }

    /// Stores the buffered chunk, if anything is pending.
    ///
    /// A partial chunk may be flushed more than once as it grows; each flush
    /// replaces the previous version of that chunk.
    pub fn flush(&mut self) -> Result<(), Error> {
        let WriteState::Accumulating {
            index,
            filled,
            pending: true,
        } = self.state
        else {
            return Ok(());
        };

        self.io.write_chunk(
            self.ctx.descriptor.identifier(),
            index,
            self.buffer[..filled].to_vec(),
        )?;
        self.state = WriteState::Accumulating {
            index,
            filled,
            pending: false,
        };
        Ok(())
    }

    /// Flushes the buffered tail and releases the buffer.
    ///
    /// The cursor is closed even if the flush fails; the failure is returned.
    pub fn close(mut self) -> Result<(), Error> {
        self.finish()
    }

    fn finish(&mut self) -> Result<(), Error> {
        let result = self.flush();
        self.state = WriteState::Closed;
        self.buffer = Vec::new();
        if self.written < self.len() {
            tracing::debug!(
                identifier = self.ctx.descriptor.identifier(),
                written = self.written,
                blob_size = self.len(),
                tag = self.ctx.tag(),
                "write stream closed before reaching the blob size"
            );
        }
        result
    }
}

impl<S: ChunkStore> Drop for WriteCursor<S> {
    fn drop(&mut self) {
        if self.state == WriteState::Closed {
            return;
        }
        if let Err(err) = self.finish() {
            tracing::warn!(
                identifier = self.ctx.descriptor.identifier(),
                tag = self.ctx.tag(),
                "failed to flush dropped write stream: {err}"
            );
        }
    }
}

impl<S: ChunkStore> CloneStream for WriteCursor<S> {
    fn clone_stream(&self, ctx: &BlobContext) -> Self {
        Self::new(ctx.clone(), self.io.clone())
    }
}

impl<S: ChunkStore> io::Write for WriteCursor<S> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        WriteCursor::write(self, buf, 0, buf.len())?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(WriteCursor::flush(self)?)
    }
}
