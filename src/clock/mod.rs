//! Merkle clocks.
//!
//! Every field of a document has its own causal chain, and the composite
//! chain tracks whole-document versions. A clock reads the chain head,
//! builds the next commit on top of it, and decides whether a commit from
//! another replica replaces the head.
//!
//! Field chains never link to each other, so concurrent updates of
//! different fields merge without conflict.

mod error;
mod merkle;

pub use error::{ClockError, ClockResult};
pub use merkle::{ClockTick, FieldClock};
