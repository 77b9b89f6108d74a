//! Reference data model and storage backends.
//!
//! The engine only sees the [`ReferenceStore`] trait; this crate ships the
//! strict in-memory implementation used for tests and offline runs, and the
//! Notion-backed implementation used in production.

mod memory_store;
mod notion_store;
mod reference;
mod store;

pub use memory_store::MemoryReferenceStore;
pub use notion_store::{NotionReferenceStore, NotionStoreConfig};
pub use reference::{normalize_doi, Reference, ReferenceFields};
pub use store::{ReferenceStore, StoreError};
