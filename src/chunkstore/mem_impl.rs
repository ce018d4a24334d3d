use core::fmt;
use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::{PoisonError, RwLock};

use chrono::{DateTime, Utc};

use super::*;

pub struct StoredChunk {
    pub created_at: DateTime<Utc>,
    pub blob: Vec<u8>,
}

impl fmt::Debug for StoredChunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.blob.len().min(32);
        write!(
            f,
            "StoredChunk({}, {:x}{})",
            self.created_at.to_rfc3339(),
            base16ct::HexDisplay(&self.blob[..len]),
            if len < self.blob.len() { "…" } else { "" }
        )
    }
}

/// Keeps every chunk in a process-local map.
#[derive(Debug, Default)]
pub struct MemChunkStore {
    chunks: RwLock<HashMap<(String, u32), StoredChunk>>,
}

impl MemChunkStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// How many chunks are stored for `identifier`.
    pub fn chunk_count(&self, identifier: &str) -> usize {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        chunks.keys().filter(|(id, _)| id == identifier).count()
    }
}

impl ChunkStore for MemChunkStore {
    type Error = Infallible;

    fn load_chunk(&self, identifier: &str, index: u32) -> Result<Option<Vec<u8>>, Self::Error> {
        let chunks = self.chunks.read().unwrap_or_else(PoisonError::into_inner);
        Ok(chunks
            .get(&(identifier.to_owned(), index))
            .map(|chunk| chunk.blob.clone()))
    }

    fn write_chunk(&self, document: ChunkDocument) -> Result<(), Self::Error> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        chunks.insert(
            (document.identifier, document.index),
            StoredChunk {
                created_at: document.created_at,
                blob: document.blob,
            },
        );
        Ok(())
    }

    fn delete_chunk(&self, identifier: &str, index: u32) -> Result<bool, Self::Error> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        Ok(chunks.remove(&(identifier.to_owned(), index)).is_some())
    }

    fn delete_chunks(&self, identifier: &str) -> Result<Option<u64>, Self::Error> {
        let mut chunks = self.chunks.write().unwrap_or_else(PoisonError::into_inner);
        let before = chunks.len();
        chunks.retain(|(id, _), _| id != identifier);
        Ok(Some((before - chunks.len()) as u64))
    }
}
