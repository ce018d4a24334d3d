//! Writes of pre-sliced, chunk-aligned byte ranges in any order.
//!
//! An uploader that cuts a blob into its own slices (the same size as the
//! chunk size or a multiple of it) can hand them over as they arrive. Each
//! range is split into chunks and every chunk is validated before the first
//! one is stored, so a rejected range leaves no trace in the store.

use std::ops::Range;

use crate::address;
use crate::chunkstore::{ChunkStore, StoreHandle};
use crate::descriptor::BlobDescriptor;
use crate::error::{ChunkRule, Error};

#[derive(Debug)]
pub struct RandomChunkWriter<S> {
    io: StoreHandle<S>,
}

/// One chunk of a validated range.
#[derive(Debug, PartialEq, Eq)]
struct Piece {
    index: u32,
    bytes: Range<usize>,
}

impl<S: ChunkStore> RandomChunkWriter<S> {
    pub fn new(io: StoreHandle<S>) -> Self {
        Self { io }
    }

    pub fn write_range(
        &self,
        descriptor: &BlobDescriptor,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), Error> {
        let pieces = plan(descriptor, offset, bytes.len())?;
        for Piece { index, bytes: range } in pieces {
            self.io
                .write_chunk(descriptor.identifier(), index, bytes[range].to_vec())?;
        }
        Ok(())
    }

    pub async fn write_range_async(
        &self,
        descriptor: &BlobDescriptor,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), Error> {
        let pieces = plan(descriptor, offset, bytes.len())?;
        for Piece { index, bytes: range } in pieces {
            self.io
                .write_chunk_async(descriptor.identifier(), index, bytes[range].to_vec())
                .await?;
        }
        Ok(())
    }
}

/// Checks that `offset` starts a chunk inside the blob.
fn validate_offset(descriptor: &BlobDescriptor, offset: u64) -> Result<(), Error> {
    let chunk_size = descriptor.chunk_size();
    let blob_size = descriptor.blob_size();
    if offset % u64::from(chunk_size) != 0 || offset >= blob_size {
        return Err(Error::InvalidOffset {
            offset: i128::from(offset),
            chunk_size,
            blob_size,
        });
    }
    Ok(())
}

/// Checks a single chunk of `size` bytes starting at `offset`.
fn validate_chunk(descriptor: &BlobDescriptor, offset: u64, size: usize) -> Result<(), Error> {
    let chunk_size = descriptor.chunk_size();
    let blob_size = descriptor.blob_size();

    let (rule, expected) = if address::is_last_chunk(blob_size, chunk_size, offset) {
        // past the last chunk nothing is expected at all
        let expected = if offset == address::last_chunk_offset(blob_size, chunk_size) {
            address::last_chunk_len(blob_size, chunk_size)
        } else {
            0
        };
        (ChunkRule::Last, expected)
    } else {
        (ChunkRule::Full, u64::from(chunk_size))
    };

    if size as u64 != expected {
        return Err(Error::InvalidChunkSize {
            rule,
            size,
            expected,
            blob_size,
            offset,
        });
    }
    Ok(())
}

/// Splits `len` bytes written at `offset` into chunks and validates all of them.
fn plan(descriptor: &BlobDescriptor, offset: u64, len: usize) -> Result<Vec<Piece>, Error> {
    validate_offset(descriptor, offset)?;
    if len == 0 && !address::is_last_chunk(descriptor.blob_size(), descriptor.chunk_size(), offset)
    {
        // zero full chunks
        return Ok(Vec::new());
    }

    let chunk_size = descriptor.chunk_size() as usize;
    let mut pieces = Vec::with_capacity(len.div_ceil(chunk_size));
    let mut start = 0;
    loop {
        let end = len.min(start + chunk_size);
        let piece_offset = offset + start as u64;

        validate_chunk(descriptor, piece_offset, end - start)?;
        pieces.push(Piece {
            index: address::chunk_index_of(piece_offset, descriptor.chunk_size())?,
            bytes: start..end,
        });

        start = end;
        if start >= len {
            break;
        }
    }

    tracing::debug!(
        identifier = descriptor.identifier(),
        offset,
        len,
        chunks = pieces.len(),
        "validated random write"
    );
    Ok(pieces)
}
