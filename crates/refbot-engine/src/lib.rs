//! The reference reconciliation engine.
//!
//! Owns batching, deduplication, partial-failure policy, and idempotency for
//! the two operations that mutate the reference store: adding a batch of
//! DOIs and filling metadata into DOI-only records. All I/O goes through the
//! [`refbot_store::ReferenceStore`] and [`refbot_resolver::MetadataResolver`]
//! collaborators the engine is constructed with.

mod engine;
mod results;

pub use engine::{EngineConfig, ReconciliationEngine};
pub use results::{AddResult, FailedReference, FillResult};
