use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
/// Canonical bibliographic metadata for one DOI. Transient: lives only for
/// the duration of a fill pass.
pub struct MetadataBundle {
    pub title: String,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: Option<String>,
}

#[derive(Debug, Error)]
/// Enumerates the failure modes of a metadata lookup.
pub enum ResolveError {
    /// The registry has no record for this DOI; terminal for the pass.
    #[error("no registry record for DOI {doi}")]
    NotFound { doi: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("resolver returned non-success status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("invalid resolver response: {0}")]
    InvalidResponse(String),
}

impl ResolveError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

#[async_trait]
/// Trait contract for metadata lookup: one stateless request per DOI.
pub trait MetadataResolver: Send + Sync {
    async fn resolve(&self, doi: &str) -> Result<MetadataBundle, ResolveError>;
}
