use std::io;

use crate::address;
use crate::chunkstore::{ChunkStore, StoreHandle};
use crate::descriptor::BlobContext;
use crate::error::Error;
use crate::provider::CloneStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekOrigin {
    Begin,
    Current,
    /// Counts backwards: `End` with offset `n` lands on `len - n`.
    End,
}

#[derive(Debug)]
struct LoadedChunk {
    index: u32,
    bytes: Vec<u8>,
}

/// A random-access read stream over one blob.
///
/// At most one chunk is held in memory. Seeking never touches the store; the
/// chunk under the new position is loaded by the next read.
#[derive(Debug)]
pub struct ReadCursor<S> {
    ctx: BlobContext,
    io: StoreHandle<S>,
    position: u64,
    loaded: Option<LoadedChunk>,
}

impl<S: ChunkStore> ReadCursor<S> {
    pub fn new(ctx: BlobContext, io: StoreHandle<S>) -> Self {
        Self {
            ctx,
            io,
            position: 0,
            loaded: None,
        }
    }

    pub fn len(&self) -> u64 {
        self.ctx.descriptor.blob_size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn position(&self) -> u64 {
        self.position
    }

    /// Fills `buf` from the current position and returns how many bytes were
    /// copied. Returns `0` at or past the end of the blob.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        let blob_size = self.len();
        let chunk_size = self.ctx.descriptor.chunk_size();

        let mut copied = 0;
        while copied < buf.len() && self.position < blob_size {
            let index = address::chunk_index_of(self.position, chunk_size)?;
            let intra = address::intra_offset_of(self.position, chunk_size) as usize;
            let remaining = usize::try_from(blob_size - self.position).unwrap_or(usize::MAX);

            let available = self.chunk_from(index, intra)?;
            let count = available.len().min(buf.len() - copied).min(remaining);
            buf[copied..copied + count].copy_from_slice(&available[..count]);

            copied += count;
            self.position += count as u64;
        }
        Ok(copied)
    }

    pub fn read_byte(&mut self) -> Result<Option<u8>, Error> {
        let mut byte = [0];
        match self.read(&mut byte)? {
            0 => Ok(None),
            _ => Ok(Some(byte[0])),
        }
    }

    /// Moves the cursor and returns the new absolute position.
    ///
    /// Positions past the end are allowed; reading there yields nothing.
    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, Error> {
        let offset = i128::from(offset);
        let target = match origin {
            SeekOrigin::Begin => offset,
            SeekOrigin::Current => i128::from(self.position) + offset,
            SeekOrigin::End => i128::from(self.len()) - offset,
        };
        self.seek_to(target)
    }

    fn seek_to(&mut self, target: i128) -> Result<u64, Error> {
        let position = u64::try_from(target).map_err(|_| Error::InvalidOffset {
            offset: target,
            chunk_size: self.ctx.descriptor.chunk_size(),
            blob_size: self.len(),
        })?;
        self.position = position;
        Ok(position)
    }

    /// The bytes of chunk `index` starting at `intra`, loading the chunk if it
    /// is not the one currently held.
    fn chunk_from(&mut self, index: u32, intra: usize) -> Result<&[u8], Error> {
        let chunk = match self.loaded.take() {
            Some(chunk) if chunk.index == index => chunk,
            _ => {
                let identifier = self.ctx.descriptor.identifier();
                tracing::trace!(identifier, index, tag = self.ctx.tag(), "chunk cache miss");
                let bytes = self.io.load_chunk(identifier, index)?.ok_or_else(|| {
                    Error::ChunkNotFound {
                        identifier: identifier.to_owned(),
                        index,
                    }
                })?;
                LoadedChunk { index, bytes }
            }
        };
        let chunk = self.loaded.insert(chunk);

        let len = chunk.bytes.len();
        match chunk.bytes.get(intra..) {
            Some(rest) if !rest.is_empty() => Ok(rest),
            _ => Err(Error::TruncatedChunk {
                identifier: self.ctx.descriptor.identifier().to_owned(),
                index,
                len,
                offset: intra,
            }),
        }
    }
}

impl<S: ChunkStore> CloneStream for ReadCursor<S> {
    fn clone_stream(&self, ctx: &BlobContext) -> Self {
        Self::new(ctx.clone(), self.io.clone())
    }
}

impl<S: ChunkStore> io::Read for ReadCursor<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        Ok(ReadCursor::read(self, buf)?)
    }
}

/// Follows `std` conventions, so `SeekFrom::End(n)` lands on `len + n`.
impl<S: ChunkStore> io::Seek for ReadCursor<S> {
    fn seek(&mut self, pos: io::SeekFrom) -> io::Result<u64> {
        let target = match pos {
            io::SeekFrom::Start(offset) => i128::from(offset),
            io::SeekFrom::Current(offset) => i128::from(self.position) + i128::from(offset),
            io::SeekFrom::End(offset) => i128::from(self.len()) + i128::from(offset),
        };
        Ok(self.seek_to(target)?)
    }
}
