use std::sync::Arc;

use crate::address;
use crate::chunkstore::{ChunkStore, StoreHandle};
use crate::config::Config;
use crate::counters::ChunkCounters;
use crate::descriptor::{BlobContext, BlobDescriptor};
use crate::error::Error;
use crate::random_write::RandomChunkWriter;
use crate::reader::{ReadCursor, SeekOrigin};
use crate::writer::WriteCursor;

/// Streams that can be reopened for another context.
pub trait CloneStream: Sized {
    /// A fresh stream of the same kind over `ctx`, positioned at the start and
    /// sharing only the backing store with `self`.
    fn clone_stream(&self, ctx: &BlobContext) -> Self;
}

/// Either kind of stream, for hosts that keep them side by side.
#[derive(Debug)]
pub enum BlobStream<S: ChunkStore> {
    Read(ReadCursor<S>),
    Write(WriteCursor<S>),
}

impl<S: ChunkStore> BlobStream<S> {
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, Error> {
        match self {
            Self::Read(stream) => stream.read(buf),
            Self::Write(_) => Err(Error::NotSupported("read on a write stream")),
        }
    }

    pub fn seek(&mut self, offset: i64, origin: SeekOrigin) -> Result<u64, Error> {
        match self {
            Self::Read(stream) => stream.seek(offset, origin),
            Self::Write(_) => Err(Error::NotSupported("seek on a write stream")),
        }
    }

    pub fn write(&mut self, buffer: &[u8], offset: usize, count: usize) -> Result<(), Error> {
        match self {
            Self::Read(_) => Err(Error::NotSupported("write on a read stream")),
            Self::Write(stream) => stream.write(buffer, offset, count),
        }
    }

    pub fn flush(&mut self) -> Result<(), Error> {
        match self {
            Self::Read(_) => Err(Error::NotSupported("flush on a read stream")),
            Self::Write(stream) => stream.flush(),
        }
    }

    pub fn close(self) -> Result<(), Error> {
        match self {
            Self::Read(_) => Ok(()),
            Self::Write(stream) => stream.close(),
        }
    }
}

impl<S: ChunkStore> CloneStream for BlobStream<S> {
    fn clone_stream(&self, ctx: &BlobContext) -> Self {
        match self {
            Self::Read(stream) => Self::Read(stream.clone_stream(ctx)),
            Self::Write(stream) => Self::Write(stream.clone_stream(ctx)),
        }
    }
}

/// The surface a host uses to store binary properties as chunked blobs.
#[derive(Debug)]
pub struct BlobProvider<S> {
    io: StoreHandle<S>,
    config: Config,
}

impl<S: ChunkStore> BlobProvider<S> {
    pub fn new(store: S) -> Self {
        Self::from_shared(Arc::new(store))
    }

    pub fn from_shared(store: Arc<S>) -> Self {
        Self {
            io: StoreHandle::new(store, Arc::default()),
            config: Config::default(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn with_counters(mut self, counters: Arc<ChunkCounters>) -> Self {
        self.io = StoreHandle::new(Arc::clone(self.io.store_arc()), counters);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn counters(&self) -> &ChunkCounters {
        self.io.counters()
    }

    pub fn store(&self) -> &S {
        self.io.store()
    }

    /// Plans a new blob of `blob_size` bytes using the configured chunk size.
    pub fn allocate(&self, blob_size: u64) -> Result<BlobDescriptor, Error> {
        let descriptor = BlobDescriptor::allocate(self.config.chunk_size, blob_size)?;
        tracing::debug!(%descriptor, "allocated blob");
        Ok(descriptor)
    }

    pub fn open_read(&self, ctx: &BlobContext) -> ReadCursor<S> {
        tracing::debug!(descriptor = %ctx.descriptor, tag = ctx.tag(), "opening read stream");
        ReadCursor::new(ctx.clone(), self.io.clone())
    }

    pub fn open_write(&self, ctx: &BlobContext) -> WriteCursor<S> {
        tracing::debug!(descriptor = %ctx.descriptor, tag = ctx.tag(), "opening write stream");
        WriteCursor::new(ctx.clone(), self.io.clone())
    }

    /// Stores a chunk-aligned range, see [`RandomChunkWriter`].
    pub fn write_range(&self, ctx: &BlobContext, offset: u64, bytes: &[u8]) -> Result<(), Error> {
        tracing::debug!(
            descriptor = %ctx.descriptor,
            tag = ctx.tag(),
            offset,
            len = bytes.len(),
            "writing range"
        );
        RandomChunkWriter::new(self.io.clone()).write_range(&ctx.descriptor, offset, bytes)
    }

    pub async fn write_range_async(
        &self,
        ctx: &BlobContext,
        offset: u64,
        bytes: &[u8],
    ) -> Result<(), Error> {
        tracing::debug!(
            descriptor = %ctx.descriptor,
            tag = ctx.tag(),
            offset,
            len = bytes.len(),
            "writing range"
        );
        RandomChunkWriter::new(self.io.clone())
            .write_range_async(&ctx.descriptor, offset, bytes)
            .await
    }

    /// Removes every chunk of the blob and returns how many were removed.
    pub fn delete(&self, ctx: &BlobContext) -> Result<u64, Error> {
        tracing::debug!(descriptor = %ctx.descriptor, tag = ctx.tag(), "deleting blob");
        self.io.delete_chunks(ctx.descriptor.identifier())
    }

    /// Removes the chunks starting inside `offset..offset + length`, clamped
    /// to the blob size. `offset` has to start a chunk.
    pub fn delete_range(&self, ctx: &BlobContext, offset: u64, length: u64) -> Result<u64, Error> {
        let descriptor = &ctx.descriptor;
        let chunk_size = descriptor.chunk_size();
        if offset % u64::from(chunk_size) != 0 {
            return Err(Error::InvalidOffset {
                offset: i128::from(offset),
                chunk_size,
                blob_size: descriptor.blob_size(),
            });
        }

        let end = descriptor.blob_size().min(offset.saturating_add(length));
        let mut deleted = 0;
        let mut chunk_offset = offset;
        while chunk_offset < end {
            let index = address::chunk_index_of(chunk_offset, chunk_size)?;
            if self.io.delete_chunk(descriptor.identifier(), index)? {
                deleted += 1;
            }
            chunk_offset += u64::from(chunk_size);
        }
        tracing::debug!(
            descriptor = %descriptor,
            tag = ctx.tag(),
            offset,
            length,
            deleted,
            "deleted chunk range"
        );
        Ok(deleted)
    }

    pub fn clone_stream<T: CloneStream>(&self, ctx: &BlobContext, stream: &T) -> T {
        tracing::debug!(descriptor = %ctx.descriptor, tag = ctx.tag(), "cloning stream");
        stream.clone_stream(ctx)
    }

    pub fn parse_descriptor(&self, serialized: &str) -> Result<BlobDescriptor, Error> {
        tracing::trace!(serialized, "parsing descriptor");
        BlobDescriptor::parse(serialized)
    }

    /// Loads one chunk without going through a cursor.
    pub fn read_chunk(&self, identifier: &str, index: u32) -> Result<Option<Vec<u8>>, Error> {
        self.io.load_chunk(identifier, index)
    }

    /// Stores one chunk without any validation.
    pub fn write_chunk(&self, identifier: &str, index: u32, bytes: Vec<u8>) -> Result<(), Error> {
        self.io.write_chunk(identifier, index, bytes)
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;
    use tracing_test::traced_test;

    use super::*;
    use crate::chunkstore::{ChunkDocument, FjallChunkStore, MemChunkStore};

    fn test_bytes(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8).collect()
    }

    fn provider(chunk_size: u32) -> BlobProvider<MemChunkStore> {
        BlobProvider::new(MemChunkStore::new()).with_config(Config { chunk_size })
    }

    fn store_via_stream<S: ChunkStore>(provider: &BlobProvider<S>, input: &[u8]) -> BlobContext {
        let descriptor = provider.allocate(input.len() as u64).unwrap();
        let ctx = BlobContext::new(descriptor).with_tag("test");
        let mut stream = provider.open_write(&ctx);
        stream.write_all(input).unwrap();
        stream.close().unwrap();
        ctx
    }

    fn load_all<S: ChunkStore>(provider: &BlobProvider<S>, ctx: &BlobContext) -> Vec<u8> {
        let mut stream = provider.open_read(ctx);
        let mut loaded = vec![0; stream.len() as usize];
        assert_eq!(stream.read(&mut loaded).unwrap(), loaded.len());
        assert_eq!(stream.read(&mut [0; 1]).unwrap(), 0);
        loaded
    }

    #[test]
    fn write_then_read() {
        let provider = provider(10);
        for len in [0, 5, 8, 9, 10, 11, 12, 19, 20, 21, 30, 42] {
            let input = test_bytes(len);
            let ctx = store_via_stream(&provider, &input);
            assert_eq!(load_all(&provider, &ctx), input, "length {len}");

            let chunks = address::chunk_count(len as u64, 10);
            assert_eq!(
                provider.store().chunk_count(ctx.descriptor.identifier()) as u64,
                chunks
            );
        }
    }

    #[test]
    fn sequential_read_loads_every_chunk_once() {
        let counters = Arc::new(ChunkCounters::default());
        let provider = provider(10).with_counters(Arc::clone(&counters));
        let ctx = store_via_stream(&provider, &test_bytes(25));
        assert_eq!(counters.writes(), 3);

        counters.reset();
        let mut stream = provider.open_read(&ctx);
        while stream.read_byte().unwrap().is_some() {}
        assert_eq!(counters.reads(), 3);
    }

    #[test]
    fn random_writes_read_back() {
        let provider = provider(10);
        let input = test_bytes(67);
        let descriptor = provider.allocate(input.len() as u64).unwrap();
        let ctx = BlobContext::new(descriptor);

        let slices: Vec<_> = input.chunks(20).enumerate().collect();
        for (i, slice) in slices.into_iter().rev() {
            provider.write_range(&ctx, (i * 20) as u64, slice).unwrap();
        }
        assert_eq!(load_all(&provider, &ctx), input);
    }

    #[test]
    #[traced_test]
    fn delete_removes_every_chunk() {
        let provider = provider(10);
        for len in [9, 10, 11, 29, 30, 42] {
            let ctx = store_via_stream(&provider, &test_bytes(len));
            let other = store_via_stream(&provider, &test_bytes(len));

            let deleted = provider.delete(&ctx).unwrap();
            assert_eq!(deleted, address::chunk_count(len as u64, 10));

            let identifier = ctx.descriptor.identifier();
            for index in 0..=(len as u32 / 10) {
                assert_eq!(provider.read_chunk(identifier, index).unwrap(), None);
            }
            assert_eq!(load_all(&provider, &other), test_bytes(len));
        }
        assert!(logs_contain("deleted chunks"));
    }

    struct Unacknowledged(MemChunkStore);

    impl ChunkStore for Unacknowledged {
        type Error = std::convert::Infallible;

        fn load_chunk(&self, identifier: &str, index: u32) -> Result<Option<Vec<u8>>, Self::Error> {
            self.0.load_chunk(identifier, index)
        }

        fn write_chunk(&self, document: ChunkDocument) -> Result<(), Self::Error> {
            self.0.write_chunk(document)
        }

        fn delete_chunk(&self, identifier: &str, index: u32) -> Result<bool, Self::Error> {
            self.0.delete_chunk(identifier, index)
        }

        fn delete_chunks(&self, _identifier: &str) -> Result<Option<u64>, Self::Error> {
            Ok(None)
        }
    }

    #[test]
    #[traced_test]
    fn unacknowledged_delete_is_only_logged() {
        let provider = BlobProvider::new(Unacknowledged(MemChunkStore::new()));
        let ctx = store_via_stream(&provider, b"some bytes");

        assert_eq!(provider.delete(&ctx).unwrap(), 0);
        assert!(logs_contain("chunk deletion was not acknowledged"));
    }

    #[test]
    fn delete_range_removes_covered_chunks() {
        let provider = provider(10);
        let ctx = store_via_stream(&provider, &test_bytes(42));
        let identifier = ctx.descriptor.identifier();

        assert!(matches!(
            provider.delete_range(&ctx, 5, 10),
            Err(Error::InvalidOffset { offset: 5, .. })
        ));

        assert_eq!(provider.delete_range(&ctx, 10, 15).unwrap(), 2);
        assert!(provider.read_chunk(identifier, 0).unwrap().is_some());
        assert_eq!(provider.read_chunk(identifier, 1).unwrap(), None);
        assert_eq!(provider.read_chunk(identifier, 2).unwrap(), None);
        assert!(provider.read_chunk(identifier, 3).unwrap().is_some());

        // clamped to the blob size
        assert_eq!(provider.delete_range(&ctx, 30, 1000).unwrap(), 2);
        assert_eq!(provider.store().chunk_count(identifier), 1);
    }

    #[test]
    fn clone_streams_keep_their_kind() {
        let provider = provider(10);
        let input = test_bytes(25);
        let ctx = store_via_stream(&provider, &input);

        let mut stream = BlobStream::Read(provider.open_read(&ctx));
        stream.seek(12, SeekOrigin::Begin).unwrap();
        let retried = ctx.clone().with_tag("retry");
        let mut clone = provider.clone_stream(&retried, &stream);
        let mut buf = [0; 3];
        assert_eq!(clone.read(&mut buf).unwrap(), 3);
        assert_eq!(buf, input[..3]);
        assert!(matches!(
            clone.write(&buf, 0, 3),
            Err(Error::NotSupported(_))
        ));

        let target = BlobContext::new(provider.allocate(4).unwrap());
        let stream = BlobStream::Write(provider.open_write(&target));
        let mut clone = provider.clone_stream(&target, &stream);
        assert!(matches!(
            clone.read(&mut buf),
            Err(Error::NotSupported(_))
        ));
        clone.write(b"abcd", 0, 4).unwrap();
        clone.close().unwrap();
        stream.close().unwrap();
        assert_eq!(load_all(&provider, &target), b"abcd");
    }

    #[test]
    fn parse_descriptor_of_allocated_blob() {
        let provider = provider(123456);
        let descriptor = provider.allocate(987654321).unwrap();

        let parsed = provider
            .parse_descriptor(&descriptor.to_text().unwrap())
            .unwrap();
        assert_eq!(parsed, descriptor);
        assert_eq!(parsed.chunk_size(), 123456);
        assert_eq!(parsed.blob_size(), 987654321);

        assert!(matches!(
            provider.parse_descriptor("{}"),
            Err(Error::MalformedDescriptor(_))
        ));
    }

    #[test]
    fn raw_chunk_access() {
        let provider = provider(10);
        provider.write_chunk("42-asdf", 1, b"raw".to_vec()).unwrap();
        assert_eq!(provider.read_chunk("42-asdf", 1).unwrap().unwrap(), b"raw");
        assert_eq!(provider.read_chunk("42-asdf", 0).unwrap(), None);
        assert_eq!(provider.counters().writes(), 1);
        assert_eq!(provider.counters().reads(), 1);
    }

    #[tokio::test]
    async fn fjall_backed_round_trip() {
        let provider = BlobProvider::new(FjallChunkStore::temporary().unwrap())
            .with_config(Config { chunk_size: 16 });

        let input = test_bytes(100);
        let ctx = store_via_stream(&provider, &input);
        assert_eq!(load_all(&provider, &ctx), input);

        let reversed: Vec<u8> = input.iter().rev().copied().collect();
        let target = BlobContext::new(provider.allocate(100).unwrap());
        for (i, slice) in reversed.chunks(32).enumerate().rev() {
            provider
                .write_range_async(&target, (i * 32) as u64, slice)
                .await
                .unwrap();
        }
        assert_eq!(load_all(&provider, &target), reversed);

        assert_eq!(provider.delete(&ctx).unwrap(), 7);
        assert!(matches!(
            provider.open_read(&ctx).read(&mut [0; 1]),
            Err(Error::ChunkNotFound { index: 0, .. })
        ));
    }

    proptest! {
        #[test]
        fn stream_round_trip(
            input in proptest::collection::vec(any::<u8>(), 0..300),
            chunk_size in 1u32..40,
            write_size in 1usize..64,
            read_size in 1usize..64,
        ) {
            let provider = provider(chunk_size);
            let descriptor = provider.allocate(input.len() as u64).unwrap();
            let ctx = BlobContext::new(descriptor);

            let mut stream = provider.open_write(&ctx);
            for piece in input.chunks(write_size) {
                stream.write_all(piece).unwrap();
            }
            stream.close().unwrap();

            let mut stream = provider.open_read(&ctx);
            let mut loaded = vec![];
            let mut buf = vec![0; read_size];
            loop {
                let n = stream.read(&mut buf).unwrap();
                if n == 0 {
                    break;
                }
                loaded.extend_from_slice(&buf[..n]);
            }
            prop_assert_eq!(loaded, input);
        }
    }
}
