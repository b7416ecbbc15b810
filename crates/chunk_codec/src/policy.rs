use crate::error::ChunkError;
use crate::split::{split, validate, Chunk};

/// Characters per chunk once a payload is large enough to be chunked.
pub const DEFAULT_SOFT_THRESHOLD: usize = 2000;
/// Largest single insertion accepted, in raw bytes.
pub const DEFAULT_HARD_CEILING: usize = 100 * 1024;
/// Largest request body accepted, in wire bytes.
pub const DEFAULT_OUTER_CEILING: usize = 500 * 1024;

const ESTIMATE_HEADROOM_PERCENT: usize = 20;

/// Size limits applied at the transport boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkPolicy {
    pub soft_threshold: usize,
    pub hard_ceiling: usize,
    pub outer_ceiling: usize,
}

impl Default for ChunkPolicy {
    fn default() -> Self {
        Self {
            soft_threshold: DEFAULT_SOFT_THRESHOLD,
            hard_ceiling: DEFAULT_HARD_CEILING,
            outer_ceiling: DEFAULT_OUTER_CEILING,
        }
    }
}

/// How a single insertion payload should be written.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertionPlan {
    Single,
    Chunked(Vec<Chunk>),
}

impl InsertionPlan {
    #[must_use]
    pub fn chunk_count(&self) -> usize {
        match self {
            Self::Single => 1,
            Self::Chunked(chunks) => chunks.len(),
        }
    }
}

impl ChunkPolicy {
    #[must_use]
    pub fn with_soft_threshold(mut self, soft_threshold: usize) -> Self {
        self.soft_threshold = soft_threshold;
        self
    }

    #[must_use]
    pub fn with_hard_ceiling(mut self, hard_ceiling: usize) -> Self {
        self.hard_ceiling = hard_ceiling;
        self
    }

    #[must_use]
    pub fn with_outer_ceiling(mut self, outer_ceiling: usize) -> Self {
        self.outer_ceiling = outer_ceiling;
        self
    }

    /// Estimated-size limit for one insertion: the hard ceiling plus the same
    /// 20% headroom [`crate::estimate_encoded_size`] reserves.
    #[must_use]
    pub fn insertion_limit(&self) -> usize {
        self.hard_ceiling + (self.hard_ceiling * ESTIMATE_HEADROOM_PERCENT) / 100
    }

    /// Decides whether `text` is written whole, chunked, or rejected.
    ///
    /// The size check runs before any split, so a rejected payload is never chunked.
    pub fn plan(&self, text: &str) -> Result<InsertionPlan, ChunkError> {
        validate(text, self.insertion_limit())?;

        if text.chars().count() <= self.soft_threshold {
            return Ok(InsertionPlan::Single);
        }

        Ok(InsertionPlan::Chunked(split(text, self.soft_threshold)?))
    }

    /// Checks an already-encoded request body against the outer ceiling.
    pub fn validate_request(&self, payload: &str) -> Result<(), ChunkError> {
        if payload.len() > self.outer_ceiling {
            return Err(ChunkError::size_exceeded(payload.len(), self.outer_ceiling));
        }
        Ok(())
    }

    /// Guidance text attached to rejected payloads so the caller can restructure.
    #[must_use]
    pub fn recovery_hint(&self, error: &ChunkError) -> String {
        match error {
            ChunkError::SizeExceeded { actual, max } => {
                let parts = actual.div_ceil(self.hard_ceiling.max(1)).max(2);
                format!(
                    "Payload is about {actual} bytes, over the {max} byte limit. \
                     Split it into at least {parts} independent operations of at most \
                     {} bytes each, for example one function or section per insert call.",
                    self.hard_ceiling
                )
            }
            other => format!("{other}. Resend the payload as a fresh, complete sequence."),
        }
    }
}
