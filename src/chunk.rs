//! Chunk - the unit of data moved through the pipe
//!
//! A chunk is an opaque, immutable byte payload. Clones share the same
//! backing allocation, so passing a chunk to every listener is cheap.

use std::fmt;
use std::sync::Arc;

/// Opaque unit of data. Immutable once created.
#[derive(Clone, PartialEq, Eq)]
pub struct Chunk {
    data: Arc<[u8]>,
}

impl Chunk {
    #[must_use]
    pub fn new(data: impl Into<Arc<[u8]>>) -> Self {
        Self { data: data.into() }
    }

    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

impl From<&[u8]> for Chunk {
    fn from(data: &[u8]) -> Self {
        Self::new(data.to_vec())
    }
}

impl From<Vec<u8>> for Chunk {
    fn from(data: Vec<u8>) -> Self {
        Self::new(data)
    }
}

impl From<&str> for Chunk {
    fn from(data: &str) -> Self {
        Self::new(data.as_bytes().to_vec())
    }
}

impl From<String> for Chunk {
    fn from(data: String) -> Self {
        Self::new(data.into_bytes())
    }
}

impl fmt::Debug for Chunk {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Chunk(len={}, data={:?})",
            self.data.len(),
            String::from_utf8_lossy(&self.data)
        )
    }
}
