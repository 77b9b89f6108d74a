use httpmock::prelude::*;
use serde_json::json;

use refbot_resolver::{CrossrefConfig, CrossrefResolver, MetadataResolver, ResolveError};

fn resolver_for(server: &MockServer, mailto: Option<&str>) -> CrossrefResolver {
    CrossrefResolver::new(CrossrefConfig {
        api_base: server.base_url(),
        mailto: mailto.map(str::to_string),
        request_timeout_ms: 5_000,
        max_retries: 2,
        retry_jitter: false,
    })
    .expect("crossref resolver should be created")
}

#[tokio::test]
async fn integration_resolve_extracts_full_metadata_bundle() {
    let server = MockServer::start();
    let work = server.mock(|when, then| {
        when.method(GET)
            .path("/works/10.1000/xyz123")
            .header("user-agent", "refbot/0.1 (mailto:team@example.org)");
        then.status(200).json_body(json!({
            "status": "ok",
            "message": {
                "title": ["A Landmark Study"],
                "author": [
                    { "given": "Ada", "family": "Lovelace" },
                    { "family": "Turing" },
                    { "name": "The Consortium" }
                ],
                "container-title": ["Nature"],
                "issued": { "date-parts": [[1950, 10]] }
            }
        }));
    });

    let resolver = resolver_for(&server, Some("team@example.org"));
    let bundle = resolver
        .resolve("10.1000/xyz123")
        .await
        .expect("resolution should succeed");

    work.assert();
    assert_eq!(bundle.title, "A Landmark Study");
    assert_eq!(bundle.authors, vec!["Ada Lovelace", "Turing", "The Consortium"]);
    assert_eq!(bundle.venue.as_deref(), Some("Nature"));
    assert_eq!(bundle.year.as_deref(), Some("1950"));
}

#[tokio::test]
async fn integration_resolve_maps_404_to_not_found() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/works/10.9999/missing");
        then.status(404).body("Resource not found.");
    });

    let resolver = resolver_for(&server, None);
    let error = resolver
        .resolve("10.9999/missing")
        .await
        .expect_err("unknown DOI should fail");

    assert!(matches!(error, ResolveError::NotFound { doi } if doi == "10.9999/missing"));
}

#[tokio::test]
async fn integration_resolve_retries_on_server_error_then_succeeds() {
    let server = MockServer::start();
    let first = server.mock(|when, then| {
        when.method(GET)
            .path("/works/10.1000/xyz123")
            .header("x-refbot-retry-attempt", "0");
        then.status(503).body("overloaded");
    });
    let second = server.mock(|when, then| {
        when.method(GET)
            .path("/works/10.1000/xyz123")
            .header("x-refbot-retry-attempt", "1");
        then.status(200).json_body(json!({
            "message": {
                "title": ["Recovered"],
                "author": [],
                "container-title": [],
            }
        }));
    });

    let resolver = resolver_for(&server, None);
    let bundle = resolver
        .resolve("10.1000/xyz123")
        .await
        .expect("retry should eventually succeed");

    assert_eq!(bundle.title, "Recovered");
    assert!(bundle.authors.is_empty());
    assert!(bundle.venue.is_none());
    assert!(bundle.year.is_none());
    first.assert_calls(1);
    second.assert_calls(1);
}

#[tokio::test]
async fn regression_resolve_surfaces_non_retryable_status() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/works/10.1000/xyz123");
        then.status(400).body("bad request");
    });

    let resolver = resolver_for(&server, None);
    let error = resolver
        .resolve("10.1000/xyz123")
        .await
        .expect_err("bad request should fail");

    match error {
        ResolveError::HttpStatus { status, body } => {
            assert_eq!(status, 400);
            assert!(body.contains("bad request"));
        }
        other => panic!("expected ResolveError::HttpStatus, got {other:?}"),
    }
}

#[tokio::test]
async fn regression_record_without_title_is_reported_as_invalid() {
    let server = MockServer::start();
    server.mock(|when, then| {
        when.method(GET).path("/works/10.1000/untitled");
        then.status(200).json_body(json!({
            "message": { "title": [], "author": [] }
        }));
    });

    let resolver = resolver_for(&server, None);
    let error = resolver
        .resolve("10.1000/untitled")
        .await
        .expect_err("titleless record should fail");

    assert!(matches!(error, ResolveError::InvalidResponse(_)));
}
