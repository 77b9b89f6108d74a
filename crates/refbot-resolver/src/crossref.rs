//! Crossref-backed [`MetadataResolver`].

use async_trait::async_trait;
use serde::Deserialize;
use tokio::time::sleep;

use refbot_core::retry::{
    is_retryable_transport_error, parse_retry_after_ms, retry_delay, should_retry_status,
};

use crate::{MetadataBundle, MetadataResolver, ResolveError};

#[derive(Debug, Clone)]
/// Connection settings for [`CrossrefResolver`].
pub struct CrossrefConfig {
    pub api_base: String,
    /// Contact address advertised in the User-Agent (Crossref polite pool).
    pub mailto: Option<String>,
    pub request_timeout_ms: u64,
    pub max_retries: usize,
    pub retry_jitter: bool,
}

#[derive(Debug, Clone)]
/// Stateless Crossref works client: one `GET /works/{doi}` per lookup.
pub struct CrossrefResolver {
    http: reqwest::Client,
    api_base: String,
    max_retries: usize,
    retry_jitter: bool,
}

#[derive(Debug, Deserialize)]
struct CrossrefWorkEnvelope {
    message: CrossrefWork,
}

#[derive(Debug, Default, Deserialize)]
struct CrossrefWork {
    #[serde(default)]
    title: Vec<String>,
    #[serde(default)]
    author: Vec<CrossrefAuthor>,
    #[serde(default, rename = "container-title")]
    container_title: Vec<String>,
    issued: Option<CrossrefDate>,
}

#[derive(Debug, Deserialize)]
struct CrossrefAuthor {
    given: Option<String>,
    family: Option<String>,
    /// Organizational contributors carry a bare `name` instead.
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CrossrefDate {
    #[serde(default, rename = "date-parts")]
    date_parts: Vec<Vec<Option<i64>>>,
}

impl CrossrefResolver {
    pub fn new(config: CrossrefConfig) -> Result<Self, ResolveError> {
        let user_agent = match config.mailto.as_deref().map(str::trim) {
            Some(mailto) if !mailto.is_empty() => {
                format!("refbot/0.1 (mailto:{mailto})")
            }
            _ => "refbot/0.1".to_string(),
        };
        let mut headers = reqwest::header::HeaderMap::new();
        headers.insert(
            reqwest::header::USER_AGENT,
            reqwest::header::HeaderValue::from_str(&user_agent).map_err(|error| {
                ResolveError::InvalidResponse(format!("invalid user-agent header: {error}"))
            })?,
        );
        headers.insert(
            reqwest::header::ACCEPT,
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
            max_retries: config.max_retries,
            retry_jitter: config.retry_jitter,
        })
    }
}

#[async_trait]
impl MetadataResolver for CrossrefResolver {
    async fn resolve(&self, doi: &str) -> Result<MetadataBundle, ResolveError> {
        let url = format!("{}/works/{}", self.api_base, encode_doi_path(doi));
        let mut attempt = 0_usize;
        let envelope = loop {
            let request = self
                .http
                .get(&url)
                .header("x-refbot-retry-attempt", attempt.to_string());
            match request.send().await {
                Ok(response) => {
                    let status = response.status();
                    if status.is_success() {
                        break response
                            .json::<CrossrefWorkEnvelope>()
                            .await
                            .map_err(|error| {
                                ResolveError::InvalidResponse(format!(
                                    "failed to decode crossref work: {error}"
                                ))
                            })?;
                    }
                    if status.as_u16() == 404 {
                        return Err(ResolveError::NotFound {
                            doi: doi.to_string(),
                        });
                    }
                    let retry_after = parse_retry_after_ms(response.headers());
                    let body = response.text().await.unwrap_or_default();
                    if attempt < self.max_retries && should_retry_status(status.as_u16()) {
                        sleep(retry_delay(attempt, self.retry_jitter, retry_after)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ResolveError::HttpStatus {
                        status: status.as_u16(),
                        body,
                    });
                }
                Err(error) => {
                    if attempt < self.max_retries && is_retryable_transport_error(&error) {
                        sleep(retry_delay(attempt, self.retry_jitter, None)).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ResolveError::Http(error));
                }
            }
        };

        work_to_bundle(envelope.message, doi)
    }
}

fn work_to_bundle(work: CrossrefWork, doi: &str) -> Result<MetadataBundle, ResolveError> {
    let title = work
        .title
        .iter()
        .map(|title| title.trim())
        .find(|title| !title.is_empty())
        .ok_or_else(|| {
            ResolveError::InvalidResponse(format!("registry record for {doi} has no title"))
        })?
        .to_string();

    let authors = work
        .author
        .iter()
        .filter_map(author_display_name)
        .collect::<Vec<_>>();

    let venue = work
        .container_title
        .iter()
        .map(|venue| venue.trim())
        .find(|venue| !venue.is_empty())
        .map(str::to_string);

    let year = work
        .issued
        .as_ref()
        .and_then(|issued| issued.date_parts.first())
        .and_then(|parts| parts.first())
        .and_then(|year| year.as_ref())
        .map(|year| year.to_string());

    Ok(MetadataBundle {
        title,
        authors,
        venue,
        year,
    })
}

fn author_display_name(author: &CrossrefAuthor) -> Option<String> {
    let given = author.given.as_deref().map(str::trim).unwrap_or_default();
    let family = author.family.as_deref().map(str::trim).unwrap_or_default();
    let display = match (given.is_empty(), family.is_empty()) {
        (false, false) => format!("{given} {family}"),
        (true, false) => family.to_string(),
        (false, true) => given.to_string(),
        (true, true) => author.name.as_deref().map(str::trim).unwrap_or_default().to_string(),
    };
    if display.is_empty() {
        None
    } else {
        Some(display)
    }
}

// DOIs go into the URL path; slashes stay literal (Crossref accepts them)
// but characters that would terminate or corrupt the path are escaped.
fn encode_doi_path(doi: &str) -> String {
    let mut encoded = String::with_capacity(doi.len());
    for byte in doi.bytes() {
        match byte {
            b'%' | b'?' | b'#' | b'[' | b']' | b' ' => {
                encoded.push('%');
                encoded.push_str(&format!("{byte:02X}"));
            }
            _ => encoded.push(byte as char),
        }
    }
    encoded
}
