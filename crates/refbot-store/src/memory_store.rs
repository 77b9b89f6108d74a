use std::sync::Mutex;

use async_trait::async_trait;

use crate::{normalize_doi, Reference, ReferenceFields, ReferenceStore, StoreError};

#[derive(Default)]
/// In-memory [`ReferenceStore`] used by tests and `--memory-store` runs.
///
/// All reads and writes happen under one lock, so the uniqueness check and
/// the insert in [`ReferenceStore::create`] are atomic: of two racing
/// creates for the same DOI exactly one wins and the other sees `Conflict`.
pub struct MemoryReferenceStore {
    inner: Mutex<MemoryStoreInner>,
}

#[derive(Default)]
struct MemoryStoreInner {
    next_id: u64,
    records: Vec<Reference>,
}

impl MemoryReferenceStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds a record directly, bypassing the create path. Test helper and
    /// stand-in for records imported by other means.
    pub fn insert(&self, reference: Reference) {
        let mut inner = self.inner.lock().expect("memory store lock");
        inner.records.push(reference);
    }

    pub fn snapshot(&self) -> Vec<Reference> {
        let inner = self.inner.lock().expect("memory store lock");
        inner.records.clone()
    }
}

fn apply_fields(record: &mut Reference, fields: &ReferenceFields) {
    if let Some(title) = fields.title.as_deref() {
        if !title.trim().is_empty() {
            record.title = Some(title.to_string());
        }
    }
    if let Some(authors) = fields.authors.as_deref() {
        if !authors.is_empty() {
            record.authors = authors.to_vec();
        }
    }
    if let Some(venue) = fields.venue.as_deref() {
        if !venue.trim().is_empty() {
            record.venue = Some(venue.to_string());
        }
    }
    if let Some(year) = fields.year.as_deref() {
        if !year.trim().is_empty() {
            record.year = Some(year.to_string());
        }
    }
}

#[async_trait]
impl ReferenceStore for MemoryReferenceStore {
    async fn find_by_doi(&self, doi: &str) -> Result<Option<Reference>, StoreError> {
        let needle = normalize_doi(doi);
        let inner = self.inner.lock().expect("memory store lock");
        Ok(inner
            .records
            .iter()
            .find(|record| normalize_doi(&record.doi) == needle)
            .cloned())
    }

    async fn create(&self, doi: &str) -> Result<Reference, StoreError> {
        let normalized = normalize_doi(doi);
        let mut inner = self.inner.lock().expect("memory store lock");
        if inner
            .records
            .iter()
            .any(|record| normalize_doi(&record.doi) == normalized)
        {
            return Err(StoreError::Conflict { doi: normalized });
        }
        inner.next_id += 1;
        let record = Reference::new(format!("mem-{}", inner.next_id), normalized);
        inner.records.push(record.clone());
        Ok(record)
    }

    async fn list_incomplete(&self) -> Result<Vec<Reference>, StoreError> {
        let inner = self.inner.lock().expect("memory store lock");
        Ok(inner
            .records
            .iter()
            .filter(|record| !record.is_complete())
            .cloned()
            .collect())
    }

    async fn update(
        &self,
        record_id: &str,
        fields: &ReferenceFields,
    ) -> Result<Reference, StoreError> {
        let mut inner = self.inner.lock().expect("memory store lock");
        let record = inner
            .records
            .iter_mut()
            .find(|record| record.record_id == record_id)
            .ok_or_else(|| StoreError::NotFound {
                record_id: record_id.to_string(),
            })?;
        apply_fields(record, fields);
        Ok(record.clone())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::MemoryReferenceStore;
    use crate::{Reference, ReferenceFields, ReferenceStore, StoreError};

    #[tokio::test]
    async fn unit_create_assigns_ids_and_normalizes_doi() {
        let store = MemoryReferenceStore::new();
        let record = store
            .create("https://doi.org/10.1000/XYZ123")
            .await
            .expect("create");
        assert_eq!(record.record_id, "mem-1");
        assert_eq!(record.doi, "10.1000/xyz123");
        assert!(record.title.is_none());
    }

    #[tokio::test]
    async fn unit_create_reports_conflict_for_equivalent_dois() {
        let store = MemoryReferenceStore::new();
        store.create("10.1000/xyz123").await.expect("first create");

        let error = store
            .create(" 10.1000/XYZ123 ")
            .await
            .expect_err("duplicate should conflict");
        assert!(matches!(error, StoreError::Conflict { doi } if doi == "10.1000/xyz123"));
        assert_eq!(store.snapshot().len(), 1);
    }

    #[tokio::test]
    async fn functional_find_by_doi_matches_any_equivalent_spelling() {
        let store = MemoryReferenceStore::new();
        store.create("10.1000/xyz123").await.expect("create");

        let found = store
            .find_by_doi("HTTPS://DOI.ORG/10.1000/xyz123")
            .await
            .expect("find");
        assert!(found.is_some());

        let missing = store.find_by_doi("10.9999/other").await.expect("find");
        assert!(missing.is_none());
    }

    #[tokio::test]
    async fn functional_list_incomplete_excludes_titled_records() {
        let store = MemoryReferenceStore::new();
        store.create("10.1/a").await.expect("create a");
        let mut complete = Reference::new("mem-seeded", "10.1/b");
        complete.title = Some("Already Imported".to_string());
        store.insert(complete);

        let incomplete = store.list_incomplete().await.expect("list");
        assert_eq!(incomplete.len(), 1);
        assert_eq!(incomplete[0].doi, "10.1/a");
    }

    #[tokio::test]
    async fn functional_update_never_clears_non_empty_fields() {
        let store = MemoryReferenceStore::new();
        let record = store.create("10.1/a").await.expect("create");

        store
            .update(
                &record.record_id,
                &ReferenceFields {
                    title: Some("Kept Title".to_string()),
                    venue: Some("Kept Venue".to_string()),
                    ..ReferenceFields::default()
                },
            )
            .await
            .expect("first update");

        let updated = store
            .update(
                &record.record_id,
                &ReferenceFields {
                    title: Some("".to_string()),
                    venue: None,
                    year: Some("2021".to_string()),
                    ..ReferenceFields::default()
                },
            )
            .await
            .expect("second update");

        assert_eq!(updated.title.as_deref(), Some("Kept Title"));
        assert_eq!(updated.venue.as_deref(), Some("Kept Venue"));
        assert_eq!(updated.year.as_deref(), Some("2021"));
    }

    #[tokio::test]
    async fn unit_update_unknown_record_reports_not_found() {
        let store = MemoryReferenceStore::new();
        let error = store
            .update("mem-404", &ReferenceFields::default())
            .await
            .expect_err("unknown record");
        assert!(matches!(error, StoreError::NotFound { record_id } if record_id == "mem-404"));
    }

    #[tokio::test]
    async fn integration_racing_creates_for_one_doi_produce_one_record() {
        let store = Arc::new(MemoryReferenceStore::new());
        let first = {
            let store = store.clone();
            tokio::spawn(async move { store.create("10.1000/race").await })
        };
        let second = {
            let store = store.clone();
            tokio::spawn(async move { store.create("10.1000/RACE").await })
        };

        let outcomes = [
            first.await.expect("join first"),
            second.await.expect("join second"),
        ];
        let created = outcomes.iter().filter(|outcome| outcome.is_ok()).count();
        let conflicts = outcomes
            .iter()
            .filter(|outcome| matches!(outcome, Err(StoreError::Conflict { .. })))
            .count();
        assert_eq!(created, 1);
        assert_eq!(conflicts, 1);
        assert_eq!(store.snapshot().len(), 1);
    }
}
