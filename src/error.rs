use core::fmt;
use std::io;

/// Which size rule a chunk was checked against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChunkRule {
    /// Any chunk but the last must be exactly `chunk_size` long.
    Full,
    /// The last chunk must hold exactly the blob's remainder.
    Last,
}

impl fmt::Display for ChunkRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Full => Ok(()),
            Self::Last => f.write_str("last "),
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid argument: {0}")]
    Argument(String),

    #[error("invalid offset: {offset}. chunk size: {chunk_size}, blob size: {blob_size}")]
    InvalidOffset {
        offset: i128,
        chunk_size: u32,
        blob_size: u64,
    },

    #[error("invalid {rule}chunk size: {size}. expected: {expected}. blob size: {blob_size}, offset: {offset}")]
    InvalidChunkSize {
        rule: ChunkRule,
        size: usize,
        expected: u64,
        blob_size: u64,
        offset: u64,
    },

    #[error("chunk not found. identifier: {identifier}, chunk index: {index}")]
    ChunkNotFound { identifier: String, index: u32 },

    #[error("chunk is truncated. identifier: {identifier}, chunk index: {index}, length: {len}, requested offset: {offset}")]
    TruncatedChunk {
        identifier: String,
        index: u32,
        len: usize,
        offset: usize,
    },

    #[error("stream length exceeded. blob size: {blob_size}, requested end: {requested}")]
    StreamLengthExceeded { blob_size: u64, requested: u64 },

    #[error("chunk index overflow at position {position} with chunk size {chunk_size}")]
    ChunkIndexOverflow { position: u64, chunk_size: u32 },

    #[error("malformed blob descriptor")]
    MalformedDescriptor(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error("operation not supported: {0}")]
    NotSupported(&'static str),

    #[error("chunk store failure")]
    Store(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    pub(crate) fn store(err: impl std::error::Error + Send + Sync + 'static) -> Self {
        Self::Store(Box::new(err))
    }
}

impl From<Error> for io::Error {
    fn from(err: Error) -> Self {
        let kind = match &err {
            Error::Argument(_) | Error::InvalidOffset { .. } | Error::InvalidChunkSize { .. } => {
                io::ErrorKind::InvalidInput
            }
            Error::ChunkNotFound { .. } => io::ErrorKind::NotFound,
            Error::TruncatedChunk { .. } | Error::MalformedDescriptor(_) => {
                io::ErrorKind::InvalidData
            }
            Error::StreamLengthExceeded { .. } => io::ErrorKind::WriteZero,
            Error::NotSupported(_) => io::ErrorKind::Unsupported,
            Error::ChunkIndexOverflow { .. } | Error::Store(_) => io::ErrorKind::Other,
        };
        io::Error::new(kind, err)
    }
}
