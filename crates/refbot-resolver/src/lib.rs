//! DOI metadata resolution against an external bibliographic registry.

mod crossref;
mod types;

pub use crossref::{CrossrefConfig, CrossrefResolver};
pub use types::{MetadataBundle, MetadataResolver, ResolveError};
