use std::collections::HashSet;
use std::sync::Arc;

use futures_util::{stream, StreamExt};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use refbot_resolver::{MetadataBundle, MetadataResolver};
use refbot_store::{normalize_doi, Reference, ReferenceFields, ReferenceStore, StoreError};

use crate::{AddResult, FailedReference, FillResult};

#[derive(Clone)]
/// Construction-time knobs for [`ReconciliationEngine`].
pub struct EngineConfig {
    /// Ceiling on concurrent resolver calls within one fill pass.
    pub resolve_concurrency: usize,
    /// When the flag flips to `true`, in-flight per-DOI work completes but
    /// no new per-DOI work is started.
    pub shutdown: Option<watch::Receiver<bool>>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            resolve_concurrency: 4,
            shutdown: None,
        }
    }
}

/// Orchestrates ingestion of new DOIs and the fill pass over incomplete
/// records. Constructed once at startup with its two collaborators and
/// shared by handle; holds no per-request state.
pub struct ReconciliationEngine {
    store: Arc<dyn ReferenceStore>,
    resolver: Arc<dyn MetadataResolver>,
    resolve_concurrency: usize,
    shutdown: Option<watch::Receiver<bool>>,
}

enum AddOutcome {
    Created(String),
    AlreadyExisted(String),
    Failed(FailedReference),
}

enum FillOutcome {
    Filled(String),
    Unresolved(String),
    Failed(FailedReference),
    /// Shutdown was requested before this record was started; it stays
    /// incomplete and is picked up by the next pass.
    Skipped,
}

impl ReconciliationEngine {
    pub fn new(
        store: Arc<dyn ReferenceStore>,
        resolver: Arc<dyn MetadataResolver>,
        config: EngineConfig,
    ) -> Self {
        Self {
            store,
            resolver,
            resolve_concurrency: config.resolve_concurrency.max(1),
            shutdown: config.shutdown,
        }
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown
            .as_ref()
            .is_some_and(|signal| *signal.borrow())
    }

    /// Ingests a batch of raw DOI strings: normalizes, deduplicates within
    /// the batch, and creates store records for DOIs not seen before. No
    /// metadata is resolved here; that is deferred to the fill pass.
    pub async fn add_references(&self, dois: &[String]) -> AddResult {
        let mut batch = Vec::new();
        let mut seen = HashSet::new();
        for raw in dois {
            let doi = normalize_doi(raw);
            if doi.is_empty() || !seen.insert(doi.clone()) {
                continue;
            }
            batch.push(doi);
        }

        let mut result = AddResult::default();
        for doi in batch {
            if self.shutdown_requested() {
                result.failed.push(FailedReference {
                    doi,
                    reason: "shutdown requested before this DOI was processed".to_string(),
                });
                continue;
            }
            match self.add_one(&doi).await {
                AddOutcome::Created(doi) => result.created.push(doi),
                AddOutcome::AlreadyExisted(doi) => result.already_existed.push(doi),
                AddOutcome::Failed(failure) => {
                    warn!(doi = %failure.doi, reason = %failure.reason, "add failed for DOI");
                    result.failed.push(failure);
                }
            }
        }
        info!(
            created = result.created.len(),
            already_existed = result.already_existed.len(),
            failed = result.failed.len(),
            "add pass finished"
        );
        result
    }

    async fn add_one(&self, doi: &str) -> AddOutcome {
        match self.store.find_by_doi(doi).await {
            Ok(Some(_)) => return AddOutcome::AlreadyExisted(doi.to_string()),
            Ok(None) => {}
            Err(error) => return add_failure(doi, &error),
        }

        match self.store.create(doi).await {
            Ok(_) => AddOutcome::Created(doi.to_string()),
            // Lost a check-then-create race; the record exists now, which is
            // all the caller asked for.
            Err(StoreError::Conflict { .. }) => match self.store.find_by_doi(doi).await {
                Ok(Some(_)) => AddOutcome::AlreadyExisted(doi.to_string()),
                Ok(None) => AddOutcome::Failed(FailedReference {
                    doi: doi.to_string(),
                    reason: "store reported a conflict but the record is not readable".to_string(),
                }),
                Err(error) => add_failure(doi, &error),
            },
            Err(error) => add_failure(doi, &error),
        }
    }

    /// Resolves metadata for every record in a snapshot of the incomplete
    /// set and applies it back, one update per record. At most one resolver
    /// call per record per pass; per-DOI failures never abort the pass.
    pub async fn fill_incomplete(&self) -> Result<FillResult, StoreError> {
        let snapshot = self.store.list_incomplete().await?;
        debug!(working_set = snapshot.len(), "fill pass snapshot taken");

        let outcomes = stream::iter(snapshot.into_iter().map(|record| self.fill_one(record)))
            .buffered(self.resolve_concurrency)
            .collect::<Vec<_>>()
            .await;

        let mut result = FillResult::default();
        for outcome in outcomes {
            match outcome {
                FillOutcome::Filled(doi) => result.filled.push(doi),
                FillOutcome::Unresolved(doi) => result.unresolved.push(doi),
                FillOutcome::Failed(failure) => {
                    warn!(doi = %failure.doi, reason = %failure.reason, "fill failed for DOI");
                    result.failed.push(failure);
                }
                FillOutcome::Skipped => {}
            }
        }
        info!(
            filled = result.filled.len(),
            unresolved = result.unresolved.len(),
            failed = result.failed.len(),
            "fill pass finished"
        );
        Ok(result)
    }

    async fn fill_one(&self, record: Reference) -> FillOutcome {
        if self.shutdown_requested() {
            return FillOutcome::Skipped;
        }

        let bundle = match self.resolver.resolve(&record.doi).await {
            Ok(bundle) => bundle,
            Err(error) if error.is_not_found() => {
                return FillOutcome::Unresolved(record.doi);
            }
            Err(error) => {
                return FillOutcome::Failed(FailedReference {
                    reason: error.to_string(),
                    doi: record.doi,
                });
            }
        };

        let fields = fields_delta(&record, &bundle);
        if fields.is_empty() {
            // Nothing left to write; a retried pass after a partial prior
            // update can land here.
            return FillOutcome::Filled(record.doi);
        }
        match self.store.update(&record.record_id, &fields).await {
            Ok(_) => FillOutcome::Filled(record.doi),
            Err(error) => FillOutcome::Failed(FailedReference {
                reason: error.to_string(),
                doi: record.doi,
            }),
        }
    }
}

fn add_failure(doi: &str, error: &StoreError) -> AddOutcome {
    AddOutcome::Failed(FailedReference {
        doi: doi.to_string(),
        reason: error.to_string(),
    })
}

fn is_blank(value: Option<&str>) -> bool {
    value.map_or(true, |value| value.trim().is_empty())
}

/// Resolver output augments, never regresses: only fields still empty on
/// the record make it into the update.
fn fields_delta(record: &Reference, bundle: &MetadataBundle) -> ReferenceFields {
    let mut fields = ReferenceFields::default();
    if is_blank(record.title.as_deref()) && !bundle.title.trim().is_empty() {
        fields.title = Some(bundle.title.clone());
    }
    if record.authors.is_empty() && !bundle.authors.is_empty() {
        fields.authors = Some(bundle.authors.clone());
    }
    if is_blank(record.venue.as_deref()) {
        if let Some(venue) = bundle.venue.as_deref().filter(|venue| !venue.trim().is_empty()) {
            fields.venue = Some(venue.to_string());
        }
    }
    if is_blank(record.year.as_deref()) {
        if let Some(year) = bundle.year.as_deref().filter(|year| !year.trim().is_empty()) {
            fields.year = Some(year.to_string());
        }
    }
    fields
}
