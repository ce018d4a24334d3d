use std::path::Path;

use chrono::{DateTime, Utc};
use fjall::{TransactionalKeyspace, TransactionalPartitionHandle};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use super::*;

#[derive(Debug, thiserror::Error)]
pub enum FjallStoreError {
    #[error(transparent)]
    Fjall(#[from] fjall::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("failed to encode chunk")]
    Encoding(#[from] postcard::Error),
    #[error("write transaction conflicted")]
    Conflict,
    #[error("blocking chunk write failed")]
    Join(#[from] tokio::task::JoinError),
}

#[derive(Serialize, Deserialize)]
struct StoredChunk {
    created_at: DateTime<Utc>,
    blob: Vec<u8>,
}

/// Chunks persisted in a `fjall` keyspace.
///
/// Keys are the postcard encoding of `(identifier, index)`. Since postcard
/// length-prefixes strings, the encoding of the identifier alone is a prefix
/// that selects exactly the chunks of one blob.
pub struct FjallChunkStore {
    _tempdir: Option<TempDir>,
    database: TransactionalKeyspace,
    chunks: TransactionalPartitionHandle,
}

impl FjallChunkStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self, FjallStoreError> {
        let database = fjall::Config::new(path).open_transactional()?;
        Self::with_database(database, None)
    }

    /// Opens a store inside a fresh temporary directory, removed on drop.
    pub fn temporary() -> Result<Self, FjallStoreError> {
        let tempdir = tempfile::tempdir()?;
        let database = fjall::Config::new(&tempdir).open_transactional()?;
        Self::with_database(database, Some(tempdir))
    }

    fn with_database(
        database: TransactionalKeyspace,
        tempdir: Option<TempDir>,
    ) -> Result<Self, FjallStoreError> {
        let chunks = database.open_partition("chunks", Default::default())?;
        Ok(Self {
            _tempdir: tempdir,
            database,
            chunks,
        })
    }

    fn encode(document: ChunkDocument) -> Result<(Vec<u8>, Vec<u8>), FjallStoreError> {
        let key = postcard::to_stdvec(&(document.identifier.as_str(), document.index))?;
        let value = postcard::to_stdvec(&StoredChunk {
            created_at: document.created_at,
            blob: document.blob,
        })?;
        Ok((key, value))
    }
}

#[async_trait::async_trait]
impl ChunkStore for FjallChunkStore {
    type Error = FjallStoreError;

    fn load_chunk(&self, identifier: &str, index: u32) -> Result<Option<Vec<u8>>, Self::Error> {
        let key = postcard::to_stdvec(&(identifier, index))?;
        let Some(value) = self.chunks.get(key)? else {
            return Ok(None);
        };
        let chunk: StoredChunk = postcard::from_bytes(&value)?;
        Ok(Some(chunk.blob))
    }

    fn write_chunk(&self, document: ChunkDocument) -> Result<(), Self::Error> {
        let (key, value) = Self::encode(document)?;
        self.chunks.insert(key, value)?;
        Ok(())
    }

    async fn write_chunk_async(&self, document: ChunkDocument) -> Result<(), Self::Error> {
        let (key, value) = Self::encode(document)?;
        let chunks = self.chunks.clone();
        tokio::task::spawn_blocking(move || chunks.insert(key, value)).await??;
        Ok(())
    }

    fn delete_chunk(&self, identifier: &str, index: u32) -> Result<bool, Self::Error> {
        let key = postcard::to_stdvec(&(identifier, index))?;

        let mut write_tx = self.database.write_tx()?;
        let existed = write_tx.contains_key(&self.chunks, &key)?;
        if existed {
            write_tx.remove(&self.chunks, key);
        }
        write_tx.commit()?.map_err(|_| FjallStoreError::Conflict)?;

        Ok(existed)
    }

    fn delete_chunks(&self, identifier: &str) -> Result<Option<u64>, Self::Error> {
        let prefix = postcard::to_stdvec(identifier)?;

        let keys = {
            let read_tx = self.database.read_tx();
            read_tx
                .prefix(&self.chunks, prefix)
                .map(|kv| kv.map(|(key, _value)| key))
                .collect::<Result<Vec<_>, _>>()?
        };

        let mut write_tx = self.database.write_tx()?;
        for key in &keys {
            write_tx.remove(&self.chunks, key.clone());
        }
        write_tx.commit()?.map_err(|_| FjallStoreError::Conflict)?;

        Ok(Some(keys.len() as u64))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fjall_chunkstore() {
        let store = FjallChunkStore::temporary().unwrap();
        store
            .write_chunk(ChunkDocument::new("file", 0, b"0123456789".to_vec()))
            .unwrap();
        store
            .write_chunk(ChunkDocument::new("file", 1, b"abc".to_vec()))
            .unwrap();
        // an identifier sharing a textual prefix must not be caught by deletion
        store
            .write_chunk(ChunkDocument::new("file-2", 0, b"other".to_vec()))
            .unwrap();

        assert_eq!(store.load_chunk("file", 0).unwrap().unwrap(), b"0123456789");
        assert_eq!(store.load_chunk("file", 2).unwrap(), None);

        store
            .write_chunk(ChunkDocument::new("file", 1, b"xyz".to_vec()))
            .unwrap();
        assert_eq!(store.load_chunk("file", 1).unwrap().unwrap(), b"xyz");

        assert!(store.delete_chunk("file", 1).unwrap());
        assert!(!store.delete_chunk("file", 1).unwrap());

        assert_eq!(store.delete_chunks("file").unwrap(), Some(1));
        assert_eq!(store.load_chunk("file", 0).unwrap(), None);
        assert_eq!(store.load_chunk("file-2", 0).unwrap().unwrap(), b"other");
    }

    #[tokio::test]
    async fn async_writes_land_in_the_keyspace() {
        let store = FjallChunkStore::temporary().unwrap();
        store
            .write_chunk_async(ChunkDocument::new("file", 3, b"async".to_vec()))
            .await
            .unwrap();
        assert_eq!(store.load_chunk("file", 3).unwrap().unwrap(), b"async");
    }
}
