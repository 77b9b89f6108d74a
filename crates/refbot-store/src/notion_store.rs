//! Notion-backed [`ReferenceStore`]. References live as pages of one Notion
//! database: title property `Name`, rich-text properties `DOI`, `Authors`,
//! `Venue`, `Year`.

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use tokio::sync::Mutex;
use tokio::time::sleep;
use tracing::warn;

use refbot_core::retry::{
    is_retryable_transport_error, parse_retry_after_ms, retry_delay, should_retry_status,
};

use crate::{normalize_doi, Reference, ReferenceFields, ReferenceStore, StoreError};

const NOTION_VERSION: &str = "2022-06-28";
const QUERY_PAGE_SIZE: u32 = 100;

#[derive(Debug, Clone)]
/// Connection settings for [`NotionReferenceStore`].
pub struct NotionStoreConfig {
    pub api_base: String,
    pub token: String,
    pub database_id: String,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_jitter: bool,
}

/// Talks to the Notion API; the only component with I/O against the store.
pub struct NotionReferenceStore {
    http: reqwest::Client,
    api_base: String,
    database_id: String,
    max_retries: usize,
    retry_jitter: bool,
    // Notion enforces no uniqueness, so creates re-check under this lock to
    // close the check-then-create race within the process.
    create_lock: Mutex<()>,
}

impl NotionReferenceStore {
    pub fn new(config: NotionStoreConfig) -> Result<Self, StoreError> {
        if config.token.trim().is_empty() {
            return Err(StoreError::MissingCredentials);
        }

        let mut headers = reqwest::header::HeaderMap::new();
        let bearer = format!("Bearer {}", config.token.trim());
        headers.insert(
            reqwest::header::AUTHORIZATION,
            reqwest::header::HeaderValue::from_str(&bearer).map_err(|error| {
                StoreError::InvalidResponse(format!("invalid notion token header: {error}"))
            })?,
        );
        headers.insert(
            "Notion-Version",
            reqwest::header::HeaderValue::from_static(NOTION_VERSION),
        );
        headers.insert(
            reqwest::header::CONTENT_TYPE,
            reqwest::header::HeaderValue::from_static("application/json"),
        );

        let http = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(std::time::Duration::from_millis(
                config.request_timeout_ms.max(1),
            ))
            .build()?;

        Ok(Self {
            http,
            api_base: config.api_base.trim_end_matches('/').to_string(),
            database_id: config.database_id.trim().to_string(),
            max_retries: config.max_retries,
            retry_jitter: config.retry_jitter,
            create_lock: Mutex::new(()),
        })
    }

    async fn query_database(&self, body: Value) -> Result<Value, StoreError> {
        let url = format!(
            "{}/v1/databases/{}/query",
            self.api_base, self.database_id
        );
        self.request_json("database query", || self.http.post(&url).json(&body))
            .await
    }

    async fn find_by_doi_unlocked(&self, doi: &str) -> Result<Option<Reference>, StoreError> {
        let normalized = normalize_doi(doi);
        let response = self
            .query_database(json!({
                "filter": { "property": "DOI", "rich_text": { "equals": normalized } },
                "page_size": 1,
            }))
            .await?;
        let results = response
            .get("results")
            .and_then(Value::as_array)
            .ok_or_else(|| {
                StoreError::InvalidResponse("database query response missing results[]".to_string())
            })?;
        match results.first() {
            Some(page) => Ok(Some(page_to_reference(page)?)),
            None => Ok(None),
        }
    }

    async fn request_json<F>(&self, operation: &str, builder: F) -> Result<Value, StoreError>
    where
        F: Fn() -> reqwest::RequestBuilder,
    {
        let mut attempt = 0_usize;
        loop {
            let request = builder().header("x-refbot-retry-attempt", attempt.to_string());
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        return response.json::<Value>().await.map_err(StoreError::Http);
                    }
                    let retry_after = parse_retry_after_ms(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.max_retries && should_retry_status(status.as_u16()) {
                        sleep(retry_delay(attempt, self.retry_jitter, retry_after)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(StoreError::HttpStatus {
                        status: status.as_u16(),
                        body: truncate_for_error(&body, 800),
                    });
                }
                Err(error) => {
                    if attempt < self.max_retries && is_retryable_transport_error(&error) {
                        sleep(retry_delay(attempt, self.retry_jitter, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(StoreError::Http(error));
                }
            }
        }
    }
}

#[async_trait]
impl ReferenceStore for NotionReferenceStore {
    async fn find_by_doi(&self, doi: &str) -> Result<Option<Reference>, StoreError> {
        self.find_by_doi_unlocked(doi).await
    }

    async fn create(&self, doi: &str) -> Result<Reference, StoreError> {
        let normalized = normalize_doi(doi);
        let _guard = self.create_lock.lock().await;

        if self.find_by_doi_unlocked(&normalized).await?.is_some() {
            return Err(StoreError::Conflict { doi: normalized });
        }

        let url = format!("{}/v1/pages", self.api_base);
        let body = json!({
            "parent": { "database_id": self.database_id },
            "properties": {
                "DOI": { "rich_text": [{ "text": { "content": normalized } }] },
            },
        });
        let page = self
            .request_json("page create", || self.http.post(&url).json(&body))
            .await?;
        page_to_reference(&page)
    }

    async fn list_incomplete(&self) -> Result<Vec<Reference>, StoreError> {
        let mut incomplete = Vec::new();
        let mut start_cursor: Option<String> = None;
        loop {
            let mut body = json!({
                "filter": { "property": "Name", "title": { "is_empty": true } },
                "page_size": QUERY_PAGE_SIZE,
            });
            if let Some(cursor) = start_cursor.as_deref() {
                body["start_cursor"] = Value::String(cursor.to_string());
            }
            let response = self.query_database(body).await?;
            let results = response
                .get("results")
                .and_then(Value::as_array)
                .ok_or_else(|| {
                    StoreError::InvalidResponse(
                        "database query response missing results[]".to_string(),
                    )
                })?;
            for page in results {
                match page_to_reference(page) {
                    Ok(reference) => incomplete.push(reference),
                    // Pages added by hand may lack a DOI; they are outside
                    // the reconciliation working set.
                    Err(error) => warn!("skipping malformed reference page: {error}"),
                }
            }
            let has_more = response
                .get("has_more")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            start_cursor = response
                .get("next_cursor")
                .and_then(Value::as_str)
                .map(str::to_string);
            if !has_more || start_cursor.is_none() {
                return Ok(incomplete);
            }
        }
    }

    async fn update(
        &self,
        record_id: &str,
        fields: &ReferenceFields,
    ) -> Result<Reference, StoreError> {
        let url = format!("{}/v1/pages/{}", self.api_base, record_id.trim());

        let page = if fields.is_empty() {
            self.request_json("page retrieve", || self.http.get(&url))
                .await
        } else {
            let body = json!({ "properties": fields_to_properties(fields) });
            self.request_json("page update", || self.http.patch(&url).json(&body))
                .await
        };

        match page {
            Ok(page) => page_to_reference(&page),
            Err(StoreError::HttpStatus { status: 404, .. }) => Err(StoreError::NotFound {
                record_id: record_id.to_string(),
            }),
            Err(error) => Err(error),
        }
    }
}

fn rich_text_payload(content: &str) -> Value {
    json!({ "rich_text": [{ "text": { "content": content } }] })
}

fn fields_to_properties(fields: &ReferenceFields) -> Value {
    let mut properties = Map::new();
    if let Some(title) = fields.title.as_deref().filter(|title| !title.trim().is_empty()) {
        properties.insert(
            "Name".to_string(),
            json!({ "title": [{ "text": { "content": title } }] }),
        );
    }
    if let Some(authors) = fields.authors.as_deref().filter(|authors| !authors.is_empty()) {
        properties.insert("Authors".to_string(), rich_text_payload(&authors.join("; ")));
    }
    if let Some(venue) = fields.venue.as_deref().filter(|venue| !venue.trim().is_empty()) {
        properties.insert("Venue".to_string(), rich_text_payload(venue));
    }
    if let Some(year) = fields.year.as_deref().filter(|year| !year.trim().is_empty()) {
        properties.insert("Year".to_string(), rich_text_payload(year));
    }
    Value::Object(properties)
}

fn joined_plain_text(items: Option<&Value>) -> Option<String> {
    let joined = items?
        .as_array()?
        .iter()
        .filter_map(|item| item.get("plain_text").and_then(Value::as_str))
        .collect::<Vec<_>>()
        .join("");
    if joined.trim().is_empty() {
        None
    } else {
        Some(joined)
    }
}

fn rich_text_property(properties: &Value, name: &str) -> Option<String> {
    joined_plain_text(properties.get(name).and_then(|prop| prop.get("rich_text")))
}

fn title_property(properties: &Value) -> Option<String> {
    joined_plain_text(properties.get("Name").and_then(|prop| prop.get("title")))
}

fn page_to_reference(page: &Value) -> Result<Reference, StoreError> {
    let record_id = page
        .get("id")
        .and_then(Value::as_str)
        .ok_or_else(|| StoreError::InvalidResponse("page missing id".to_string()))?;
    let properties = page
        .get("properties")
        .ok_or_else(|| StoreError::InvalidResponse("page missing properties".to_string()))?;
    let doi = rich_text_property(properties, "DOI")
        .ok_or_else(|| StoreError::InvalidResponse(format!("page {record_id} has no DOI")))?;

    let authors = rich_text_property(properties, "Authors")
        .map(|joined| {
            joined
                .split(';')
                .map(str::trim)
                .filter(|author| !author.is_empty())
                .map(str::to_string)
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();

    Ok(Reference {
        record_id: record_id.to_string(),
        doi,
        title: title_property(properties),
        authors,
        venue: rich_text_property(properties, "Venue"),
        year: rich_text_property(properties, "Year"),
    })
}

fn truncate_for_error(body: &str, limit: usize) -> String {
    if body.len() <= limit {
        return body.to_string();
    }
    let mut cut = limit;
    while !body.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &body[..cut])
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{fields_to_properties, page_to_reference, truncate_for_error};
    use crate::ReferenceFields;

    fn sample_page() -> serde_json::Value {
        json!({
            "id": "page-1",
            "properties": {
                "Name": { "title": [{ "plain_text": "A Title" }] },
                "DOI": { "rich_text": [{ "plain_text": "10.1000/xyz123" }] },
                "Authors": { "rich_text": [{ "plain_text": "Ada Lovelace; Alan Turing" }] },
                "Venue": { "rich_text": [{ "plain_text": "Nature" }] },
                "Year": { "rich_text": [{ "plain_text": "1950" }] },
            },
        })
    }

    #[test]
    fn unit_page_to_reference_extracts_all_properties() {
        let reference = page_to_reference(&sample_page()).expect("parse");
        assert_eq!(reference.record_id, "page-1");
        assert_eq!(reference.doi, "10.1000/xyz123");
        assert_eq!(reference.title.as_deref(), Some("A Title"));
        assert_eq!(reference.authors, vec!["Ada Lovelace", "Alan Turing"]);
        assert_eq!(reference.venue.as_deref(), Some("Nature"));
        assert_eq!(reference.year.as_deref(), Some("1950"));
    }

    #[test]
    fn unit_page_to_reference_rejects_pages_without_doi() {
        let page = json!({
            "id": "page-2",
            "properties": { "Name": { "title": [] } },
        });
        assert!(page_to_reference(&page).is_err());
    }

    #[test]
    fn unit_empty_title_property_is_treated_as_incomplete() {
        let mut page = sample_page();
        page["properties"]["Name"]["title"] = json!([]);
        let reference = page_to_reference(&page).expect("parse");
        assert!(reference.title.is_none());
        assert!(!reference.is_complete());
    }

    #[test]
    fn unit_fields_to_properties_skips_empty_values() {
        let properties = fields_to_properties(&ReferenceFields {
            title: Some("A Title".to_string()),
            authors: Some(vec![]),
            venue: Some("  ".to_string()),
            year: Some("2020".to_string()),
        });
        let object = properties.as_object().expect("object");
        assert!(object.contains_key("Name"));
        assert!(object.contains_key("Year"));
        assert!(!object.contains_key("Authors"));
        assert!(!object.contains_key("Venue"));
    }

    #[test]
    fn unit_truncate_for_error_respects_char_boundaries() {
        assert_eq!(truncate_for_error("short", 10), "short");
        let truncated = truncate_for_error("long-body-text", 4);
        assert_eq!(truncated, "long…");
    }
}
