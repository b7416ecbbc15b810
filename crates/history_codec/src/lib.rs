//! Versioned, lossless wire encoding of conversation history.
//!
//! The server is stateless: every request carries the whole history in the
//! form produced by [`encode`], and every completed turn returns the new
//! history in the same form. [`decode`] rejects anything whose tool-call
//! correlation is broken.

mod codec;
mod error;
mod schema;

pub use codec::{decode, encode, validate_history, EMPTY_HISTORY};
pub use error::HistoryCodecError;
pub use schema::HISTORY_VERSION;
