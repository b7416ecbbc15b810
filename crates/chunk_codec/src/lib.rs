//! Size pre-flight and ordered splitting for oversized text payloads.
//!
//! Large tool-call payloads (typically code insertions) are the one thing that
//! can overflow a single wire frame. Callers estimate the encoded size with
//! [`estimate_encoded_size`], reject anything over a limit with [`validate`],
//! and break what remains into ordered [`Chunk`]s with [`split`].
//!
//! [`ChunkPolicy`] bundles the three limits used across the workspace:
//! a soft threshold above which payloads are chunked, a hard ceiling above
//! which a single insertion is rejected outright, and an outer ceiling for a
//! whole request body.

mod error;
mod policy;
mod split;

pub use error::ChunkError;
pub use policy::{
    ChunkPolicy, InsertionPlan, DEFAULT_HARD_CEILING, DEFAULT_OUTER_CEILING,
    DEFAULT_SOFT_THRESHOLD,
};
pub use split::{estimate_encoded_size, reassemble, split, validate, Chunk};
