use std::env;

/// Environment variable overriding [`Config::chunk_size`].
pub const CHUNK_SIZE_VAR: &str = "CHUNKED_BLOB_CHUNK_SIZE";

const KIB: u32 = 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Chunk size of newly allocated blobs. Existing blobs keep the chunk size
    /// recorded in their descriptor.
    pub chunk_size: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self { chunk_size: 8 * KIB }
    }
}

impl Config {
    /// The default configuration, with the chunk size taken from
    /// `CHUNKED_BLOB_CHUNK_SIZE` when that holds a positive integer.
    pub fn from_env() -> Self {
        Self::from_var(env::var(CHUNK_SIZE_VAR).ok().as_deref())
    }

    fn from_var(value: Option<&str>) -> Self {
        let mut config = Self::default();
        if let Some(value) = value {
            match value.trim().parse::<u32>() {
                Ok(chunk_size) if chunk_size > 0 => config.chunk_size = chunk_size,
                _ => tracing::warn!(
                    value,
                    default = config.chunk_size,
                    "ignoring invalid {CHUNK_SIZE_VAR}"
                ),
            }
        }
        tracing::debug!(chunk_size = config.chunk_size, "configured chunk size");
        config
    }
}
