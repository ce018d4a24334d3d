use core::fmt;

use serde::{Deserialize, Serialize};

use crate::error::Error;

/// The storage layout of one blob: who it is, how it is chunked, how long it is.
///
/// Created once by [`BlobDescriptor::allocate`] and never mutated afterwards.
#[derive(Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct BlobDescriptor {
    identifier: String,
    chunk_size: u32,
    blob_size: u64,
}

impl BlobDescriptor {
    /// Mints a fresh identifier for a blob of `blob_size` bytes.
    pub fn allocate(chunk_size: u32, blob_size: u64) -> Result<Self, Error> {
        if chunk_size < 1 {
            return Err(Error::Argument("the chunk size cannot be less than 1".into()));
        }
        Ok(Self {
            identifier: uuid::Uuid::new_v4().to_string(),
            chunk_size,
            blob_size,
        })
    }

    /// Rebuilds a descriptor for an already allocated blob.
    pub fn from_parts(
        identifier: impl Into<String>,
        chunk_size: u32,
        blob_size: u64,
    ) -> Result<Self, Error> {
        let identifier = identifier.into();
        if chunk_size < 1 {
            return Err(Error::Argument("the chunk size cannot be less than 1".into()));
        }
        if identifier.is_empty() {
            return Err(Error::Argument("the identifier cannot be empty".into()));
        }
        Ok(Self {
            identifier,
            chunk_size,
            blob_size,
        })
    }

    pub fn identifier(&self) -> &str {
        &self.identifier
    }

    pub fn chunk_size(&self) -> u32 {
        self.chunk_size
    }

    pub fn blob_size(&self) -> u64 {
        self.blob_size
    }

    /// Serializes into the textual form persisted next to the host's metadata.
    pub fn to_text(&self) -> Result<String, Error> {
        serde_json::to_string(self).map_err(|err| Error::MalformedDescriptor(Box::new(err)))
    }

    /// Parses the textual form produced by [`BlobDescriptor::to_text`].
    pub fn parse(serialized: &str) -> Result<Self, Error> {
        let parsed: Self = serde_json::from_str(serialized)
            .map_err(|err| Error::MalformedDescriptor(Box::new(err)))?;
        parsed.validated()
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        postcard::to_stdvec(self).map_err(|err| Error::MalformedDescriptor(Box::new(err)))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self, Error> {
        let parsed: Self =
            postcard::from_bytes(bytes).map_err(|err| Error::MalformedDescriptor(Box::new(err)))?;
        parsed.validated()
    }

    fn validated(self) -> Result<Self, Error> {
        if self.chunk_size < 1 {
            return Err(Error::MalformedDescriptor(
                "chunkSize must be at least 1".into(),
            ));
        }
        if self.identifier.is_empty() {
            return Err(Error::MalformedDescriptor("identifier is empty".into()));
        }
        Ok(self)
    }
}

impl fmt::Debug for BlobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "BlobDescriptor({}, chunk_size: {}, blob_size: {})",
            self.identifier, self.chunk_size, self.blob_size
        )
    }
}

impl fmt::Display for BlobDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "identifier: {}, chunk size: {}, blob size: {}",
            self.identifier, self.chunk_size, self.blob_size
        )
    }
}

/// Everything a cursor needs at construction time.
///
/// The `tag` is opaque to the engine and only shows up in log events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlobContext {
    pub descriptor: BlobDescriptor,
    pub tag: Option<String>,
}

impl BlobContext {
    pub fn new(descriptor: BlobDescriptor) -> Self {
        Self {
            descriptor,
            tag: None,
        }
    }

    pub fn with_tag(mut self, tag: impl Into<String>) -> Self {
        self.tag = Some(tag.into());
        self
    }

    pub(crate) fn tag(&self) -> &str {
        self.tag.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_mints_unique_identifiers() {
        let a = BlobDescriptor::allocate(10, 42).unwrap();
        let b = BlobDescriptor::allocate(10, 42).unwrap();
        assert_ne!(a.identifier(), b.identifier());
        assert_eq!(a.chunk_size(), 10);
        assert_eq!(a.blob_size(), 42);

        let empty = BlobDescriptor::allocate(1, 0).unwrap();
        assert_eq!(empty.blob_size(), 0);
    }

    #[test]
    fn allocation_rejects_zero_chunk_size() {
        assert!(matches!(
            BlobDescriptor::allocate(0, 42),
            Err(Error::Argument(_))
        ));
        assert!(matches!(
            BlobDescriptor::from_parts("42-asdf", 0, 42),
            Err(Error::Argument(_))
        ));
    }

    #[test]
    fn parse_serialized_descriptor() {
        let descriptor = BlobDescriptor::from_parts("42-asdf", 123456, 987654321).unwrap();
        let serialized = descriptor.to_text().unwrap();
        assert_eq!(
            serialized,
            r#"{"identifier":"42-asdf","chunkSize":123456,"blobSize":987654321}"#
        );

        let parsed = BlobDescriptor::parse(&serialized).unwrap();
        assert_eq!(parsed.identifier(), "42-asdf");
        assert_eq!(parsed.chunk_size(), 123456);
        assert_eq!(parsed.blob_size(), 987654321);

        let parsed = BlobDescriptor::from_bytes(&descriptor.to_bytes().unwrap()).unwrap();
        assert_eq!(parsed, descriptor);
    }

    #[test]
    fn blob_size_uses_the_full_64_bit_range() {
        let descriptor = BlobDescriptor::from_parts("big", 8192, u64::MAX).unwrap();
        let parsed = BlobDescriptor::parse(&descriptor.to_text().unwrap()).unwrap();
        assert_eq!(parsed.blob_size(), u64::MAX);
    }

    #[test]
    fn malformed_descriptors_are_rejected() {
        for serialized in [
            "",
            "not json",
            r#"{"identifier":"42-asdf","chunkSize":10}"#,
            r#"{"identifier":42,"chunkSize":10,"blobSize":42}"#,
            r#"{"identifier":"42-asdf","chunkSize":"10","blobSize":42}"#,
            r#"{"identifier":"42-asdf","chunkSize":10,"blobSize":-1}"#,
            r#"{"identifier":"42-asdf","chunkSize":0,"blobSize":42}"#,
            r#"{"identifier":"","chunkSize":10,"blobSize":42}"#,
        ] {
            assert!(
                matches!(
                    BlobDescriptor::parse(serialized),
                    Err(Error::MalformedDescriptor(_))
                ),
                "{serialized:?} should not parse"
            );
        }
    }

    #[test]
    fn context_carries_an_optional_tag() {
        let descriptor = BlobDescriptor::allocate(10, 42).unwrap();
        let ctx = BlobContext::new(descriptor.clone());
        assert_eq!(ctx.tag(), "");

        let ctx = ctx.with_tag("version 9999");
        assert_eq!(ctx.tag(), "version 9999");
        assert_eq!(ctx.descriptor, descriptor);
    }
}
