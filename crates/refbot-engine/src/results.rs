#[derive(Debug, Clone, PartialEq, Eq)]
/// A DOI whose per-record work failed this pass; eligible for retry on a
/// future pass.
pub struct FailedReference {
    pub doi: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Outcome of one add pass, input order within each bucket.
pub struct AddResult {
    pub created: Vec<String>,
    pub already_existed: Vec<String>,
    pub failed: Vec<FailedReference>,
}

impl AddResult {
    pub fn is_empty(&self) -> bool {
        self.created.is_empty() && self.already_existed.is_empty() && self.failed.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
/// Outcome of one fill pass, snapshot order within each bucket.
pub struct FillResult {
    pub filled: Vec<String>,
    pub unresolved: Vec<String>,
    pub failed: Vec<FailedReference>,
}

impl FillResult {
    pub fn is_empty(&self) -> bool {
        self.filled.is_empty() && self.unresolved.is_empty() && self.failed.is_empty()
    }
}
