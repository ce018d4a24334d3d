//! Translation between logical blob positions and chunk coordinates.
//!
//! A blob of `blob_size` bytes is cut into chunks of `chunk_size` bytes; only
//! the final chunk may be shorter. Chunk indices are `u32`, so a position whose
//! index does not fit is reported as [`Error::ChunkIndexOverflow`] instead of
//! wrapping.

use crate::error::Error;

/// The zero-based index of the chunk holding `position`.
pub fn chunk_index_of(position: u64, chunk_size: u32) -> Result<u32, Error> {
    let index = position / u64::from(chunk_size);
    u32::try_from(index).map_err(|_| Error::ChunkIndexOverflow {
        position,
        chunk_size,
    })
}

/// The offset of `position` inside its chunk.
pub fn intra_offset_of(position: u64, chunk_size: u32) -> u32 {
    // always < chunk_size
    (position % u64::from(chunk_size)) as u32
}

/// The absolute offset at which chunk `index` starts.
pub fn chunk_offset(index: u32, chunk_size: u32) -> u64 {
    u64::from(index) * u64::from(chunk_size)
}

/// How many chunks a blob of `blob_size` bytes occupies.
pub fn chunk_count(blob_size: u64, chunk_size: u32) -> u64 {
    blob_size.div_ceil(u64::from(chunk_size))
}

/// The length of the final chunk.
///
/// A blob that is an exact multiple of `chunk_size` ends with a full chunk, not
/// an empty one. An empty blob has no chunks, so this is `0`.
pub fn last_chunk_len(blob_size: u64, chunk_size: u32) -> u64 {
    match blob_size % u64::from(chunk_size) {
        0 if blob_size == 0 => 0,
        0 => u64::from(chunk_size),
        remainder => remainder,
    }
}

/// The absolute offset at which the final chunk starts.
pub fn last_chunk_offset(blob_size: u64, chunk_size: u32) -> u64 {
    blob_size - last_chunk_len(blob_size, chunk_size)
}

/// Whether a chunk starting at `offset` is (or lies past) the final chunk.
pub fn is_last_chunk(blob_size: u64, chunk_size: u32, offset: u64) -> bool {
    last_chunk_offset(blob_size, chunk_size) <= offset
}
