use async_trait::async_trait;
use thiserror::Error;

use crate::{Reference, ReferenceFields};

#[derive(Debug, Error)]
/// Enumerates the failure modes a storage backend can surface.
pub enum StoreError {
    #[error("a reference with DOI {doi} already exists")]
    Conflict { doi: String },
    #[error("record {record_id} not found")]
    NotFound { record_id: String },
    #[error("missing store credentials")]
    MissingCredentials,
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("store returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("invalid store response: {0}")]
    InvalidResponse(String),
}

impl StoreError {
    /// Transient failures are recorded per DOI and retried on a later pass;
    /// `Conflict` and `NotFound` carry meaning and are handled in place.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::HttpStatus { .. } | Self::InvalidResponse(_)
        )
    }
}

#[async_trait]
/// Narrow storage interface consumed by the reconciliation engine.
///
/// Implementations own the DOI uniqueness invariant: a duplicate
/// check-then-create race must be closed at this boundary, and `create`
/// reports a loser with [`StoreError::Conflict`].
pub trait ReferenceStore: Send + Sync {
    async fn find_by_doi(&self, doi: &str) -> Result<Option<Reference>, StoreError>;

    /// Creates a record carrying only the DOI; descriptive fields start
    /// empty and are filled by a later pass.
    async fn create(&self, doi: &str) -> Result<Reference, StoreError>;

    /// Snapshot of all records whose title is still empty.
    async fn list_incomplete(&self) -> Result<Vec<Reference>, StoreError>;

    /// Applies a descriptive-field delta. Never mutates the DOI and never
    /// clears a non-empty field.
    async fn update(
        &self,
        record_id: &str,
        fields: &ReferenceFields,
    ) -> Result<Reference, StoreError>;
}
