use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ChunkError {
    #[error("payload of {actual} bytes exceeds the {max} byte limit")]
    SizeExceeded { actual: usize, max: usize },

    #[error("chunk size must be greater than zero")]
    InvalidChunkSize,

    #[error("no chunks to reassemble")]
    EmptyChunkSet,

    #[error("chunk {index} reports {found} total chunks; expected {expected}")]
    InconsistentTotal {
        index: usize,
        expected: usize,
        found: usize,
    },

    #[error("chunk {index} is missing from a set of {total}")]
    MissingChunk { index: usize, total: usize },

    #[error("chunk {index} appears more than once")]
    DuplicateChunk { index: usize },
}

impl ChunkError {
    #[must_use]
    pub fn size_exceeded(actual: usize, max: usize) -> Self {
        Self::SizeExceeded { actual, max }
    }

    #[must_use]
    pub fn is_size_exceeded(&self) -> bool {
        matches!(self, Self::SizeExceeded { .. })
    }
}
