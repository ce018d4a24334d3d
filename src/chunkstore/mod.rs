//! The backing document store, seen through the narrow contract the chunk
//! engine needs: load, store and delete chunks keyed by
//! `(identifier, chunk index)`.
//!
//! Every implementation upserts on that key, so writing the same chunk twice
//! leaves the last write in place.

use core::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::counters::ChunkCounters;
use crate::error::Error;

pub mod fjall_impl;
pub mod mem_impl;

pub use fjall_impl::FjallChunkStore;
pub use mem_impl::MemChunkStore;

/// One stored slice of a blob.
pub struct ChunkDocument {
    pub identifier: String,
    pub index: u32,
    /// Diagnostic only.
    pub created_at: DateTime<Utc>,
    pub blob: Vec<u8>,
}

impl ChunkDocument {
    pub fn new(identifier: impl Into<String>, index: u32, blob: Vec<u8>) -> Self {
        Self {
            identifier: identifier.into(),
            index,
            created_at: Utc::now(),
            blob,
        }
    }
}

impl fmt::Debug for ChunkDocument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let len = self.blob.len().min(32);
        write!(
            f,
            "ChunkDocument({}#{}, {} bytes: {:x}{})",
            self.identifier,
            self.index,
            self.blob.len(),
            base16ct::HexDisplay(&self.blob[..len]),
            if len < self.blob.len() { "…" } else { "" }
        )
    }
}

#[async_trait::async_trait]
pub trait ChunkStore: Send + Sync + 'static {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Returns `None` if no chunk is stored under this key.
    fn load_chunk(&self, identifier: &str, index: u32) -> Result<Option<Vec<u8>>, Self::Error>;

    fn write_chunk(&self, document: ChunkDocument) -> Result<(), Self::Error>;

    async fn write_chunk_async(&self, document: ChunkDocument) -> Result<(), Self::Error> {
        self.write_chunk(document)
    }

    /// Returns whether a chunk was removed.
    fn delete_chunk(&self, identifier: &str, index: u32) -> Result<bool, Self::Error>;

    /// Removes every chunk of `identifier`.
    ///
    /// Returns the number of removed chunks, or `None` when the store did not
    /// acknowledge the deletion.
    fn delete_chunks(&self, identifier: &str) -> Result<Option<u64>, Self::Error>;
}

/// A shared store together with the counters it reports into.
///
/// This is what cursors hold; cloning it is cheap.
pub struct StoreHandle<S> {
    store: Arc<S>,
    counters: Arc<ChunkCounters>,
}

impl<S> Clone for StoreHandle<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            counters: Arc::clone(&self.counters),
        }
    }
}

impl<S> fmt::Debug for StoreHandle<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreHandle")
            .field("counters", &self.counters)
            .finish_non_exhaustive()
    }
}

impl<S: ChunkStore> StoreHandle<S> {
    pub fn new(store: Arc<S>, counters: Arc<ChunkCounters>) -> Self {
        Self { store, counters }
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn counters(&self) -> &Arc<ChunkCounters> {
        &self.counters
    }

    pub(crate) fn store_arc(&self) -> &Arc<S> {
        &self.store
    }

    pub fn load_chunk(&self, identifier: &str, index: u32) -> Result<Option<Vec<u8>>, Error> {
        tracing::trace!(identifier, index, "loading chunk");
        let bytes = self
            .store
            .load_chunk(identifier, index)
            .map_err(Error::store)?;
        if bytes.is_some() {
            self.counters.record_read();
        }
        Ok(bytes)
    }

    pub fn write_chunk(&self, identifier: &str, index: u32, blob: Vec<u8>) -> Result<(), Error> {
        tracing::trace!(identifier, index, len = blob.len(), "writing chunk");
        self.store
            .write_chunk(ChunkDocument::new(identifier, index, blob))
            .map_err(Error::store)?;
        self.counters.record_write();
        Ok(())
    }

    pub async fn write_chunk_async(
        &self,
        identifier: &str,
        index: u32,
        blob: Vec<u8>,
    ) -> Result<(), Error> {
        tracing::trace!(identifier, index, len = blob.len(), "writing chunk");
        self.store
            .write_chunk_async(ChunkDocument::new(identifier, index, blob))
            .await
            .map_err(Error::store)?;
        self.counters.record_write();
        Ok(())
    }

    pub fn delete_chunk(&self, identifier: &str, index: u32) -> Result<bool, Error> {
        let deleted = self
            .store
            .delete_chunk(identifier, index)
            .map_err(Error::store)?;
        tracing::trace!(identifier, index, deleted, "deleted chunk");
        Ok(deleted)
    }

    /// Deletion is best effort: an unacknowledged delete is logged and counts
    /// as zero removed chunks.
    pub fn delete_chunks(&self, identifier: &str) -> Result<u64, Error> {
        match self.store.delete_chunks(identifier).map_err(Error::store)? {
            Some(deleted) => {
                tracing::debug!(identifier, deleted, "deleted chunks");
                Ok(deleted)
            }
            None => {
                tracing::warn!(identifier, "chunk deletion was not acknowledged");
                Ok(0)
            }
        }
    }
}
