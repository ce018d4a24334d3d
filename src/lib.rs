//! Stores large binary values as a sequence of fixed-size chunks in a
//! document store, and exposes them again as seekable read streams and
//! append-only write streams.

pub mod address;
pub mod chunkstore;
pub mod config;
pub mod counters;
pub mod descriptor;
pub mod error;
pub mod provider;
pub mod random_write;
pub mod reader;
pub mod writer;

pub use chunkstore::{ChunkDocument, ChunkStore, FjallChunkStore, MemChunkStore, StoreHandle};
pub use config::Config;
pub use counters::ChunkCounters;
pub use descriptor::{BlobContext, BlobDescriptor};
pub use error::Error;
pub use provider::{BlobProvider, BlobStream, CloneStream};
pub use random_write::RandomChunkWriter;
pub use reader::{ReadCursor, SeekOrigin};
pub use writer::WriteCursor;
