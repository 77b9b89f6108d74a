use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
/// A bibliographic record as persisted by a [`crate::ReferenceStore`].
pub struct Reference {
    /// Store-assigned opaque identifier, set on creation.
    pub record_id: String,
    /// Normalized DOI; immutable once set, unique store-wide.
    pub doi: String,
    pub title: Option<String>,
    pub authors: Vec<String>,
    pub venue: Option<String>,
    pub year: Option<String>,
}

impl Reference {
    pub fn new(record_id: impl Into<String>, doi: impl Into<String>) -> Self {
        Self {
            record_id: record_id.into(),
            doi: doi.into(),
            title: None,
            authors: Vec::new(),
            venue: None,
            year: None,
        }
    }

    /// A record is complete once it carries a non-empty title.
    pub fn is_complete(&self) -> bool {
        self.title
            .as_deref()
            .is_some_and(|title| !title.trim().is_empty())
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Descriptive-field delta applied by the fill pass. `None` leaves the
/// stored field untouched; empty values are never written over non-empty
/// ones (backends enforce this independently of the engine).
pub struct ReferenceFields {
    pub title: Option<String>,
    pub authors: Option<Vec<String>>,
    pub venue: Option<String>,
    pub year: Option<String>,
}

impl ReferenceFields {
    pub fn is_empty(&self) -> bool {
        self.title.is_none() && self.authors.is_none() && self.venue.is_none() && self.year.is_none()
    }
}

/// Canonical DOI form: trimmed, lowercased, with any `doi.org` URL prefix
/// stripped. Uniqueness and deduplication key on this form.
pub fn normalize_doi(raw: &str) -> String {
    let lowered = raw.trim().to_lowercase();
    for prefix in ["https://doi.org/", "http://doi.org/", "doi.org/"] {
        if let Some(rest) = lowered.strip_prefix(prefix) {
            return rest.trim_start_matches('/').trim().to_string();
        }
    }
    lowered
}

#[cfg(test)]
mod tests {
    use super::{normalize_doi, Reference};

    #[test]
    fn unit_normalize_doi_trims_folds_case_and_strips_url_prefixes() {
        assert_eq!(normalize_doi("10.1000/xyz123"), "10.1000/xyz123");
        assert_eq!(normalize_doi("  10.1000/XYZ123 "), "10.1000/xyz123");
        assert_eq!(
            normalize_doi("https://doi.org/10.1000/XYZ123"),
            "10.1000/xyz123"
        );
        assert_eq!(
            normalize_doi("HTTP://DOI.ORG/10.1000/xyz123"),
            "10.1000/xyz123"
        );
        assert_eq!(normalize_doi("doi.org/10.1000/xyz123"), "10.1000/xyz123");
    }

    #[test]
    fn unit_reference_completeness_requires_non_empty_title() {
        let mut reference = Reference::new("rec-1", "10.1000/xyz123");
        assert!(!reference.is_complete());

        reference.title = Some("   ".to_string());
        assert!(!reference.is_complete());

        reference.title = Some("An Actual Title".to_string());
        assert!(reference.is_complete());
    }
}
