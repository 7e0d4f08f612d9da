mod common;

use common::{MockRegistry, MockResponse};
use serde_json::json;

const TAGS_PATH: &str = "/v2/library/nginx/tags/list";
const SECOND_PAGE: &str = "/v2/library/nginx/tags/list?n=100&last=1.1";

fn first_page() -> MockResponse {
    MockResponse::json(&json!({"name": "library/nginx", "tags": ["1.0", "1.1"]}))
        .header("link", &format!("<{}>; rel=\"next\"", SECOND_PAGE))
}

#[test]
fn test_tags_follow_link_header() {
    let registry = MockRegistry::start();
    registry.with_token("t");
    registry.on(TAGS_PATH, first_page());
    registry.on(
        SECOND_PAGE,
        MockResponse::json(&json!({"name": "library/nginx", "tags": ["1.2", "latest"]})),
    );

    let client = registry.client().build().unwrap();
    let mut seen = Vec::new();
    let listing = client
        .tags_with("library/nginx", |tag| seen.push(tag.to_string()))
        .unwrap();

    assert!(listing.is_complete());
    assert_eq!(listing.value, vec!["1.0", "1.1", "1.2", "latest"]);
    assert_eq!(seen, listing.value);

    let requests = registry.requests_to(TAGS_PATH);
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0].path_and_query, "/v2/library/nginx/tags/list?n=100");
    assert_eq!(requests[1].path_and_query, SECOND_PAGE);
    assert_eq!(requests[1].header("authorization"), Some("Bearer t"));
}

#[test]
fn test_tags_failed_page_keeps_earlier_tags() {
    let registry = MockRegistry::start();
    registry.with_token("t");
    registry.on(TAGS_PATH, first_page());
    registry.on(SECOND_PAGE, MockResponse::status(503).body("try later"));

    let client = registry.client().build().unwrap();
    let listing = client.tags("library/nginx").unwrap();

    assert_eq!(listing.value, vec!["1.0", "1.1"]);
    assert_eq!(listing.failures.len(), 1);
    let failure = &listing.failures[0];
    assert_eq!(failure.status.map(|s| s.as_u16()), Some(503));
    assert!(failure.url.ends_with(SECOND_PAGE), "{}", failure.url);
    assert!(failure.message.contains("try later"));
}

#[test]
fn test_tags_null_list_is_empty() {
    let registry = MockRegistry::start();
    registry.with_token("t");
    registry.on(TAGS_PATH, MockResponse::json(&json!({"name": "library/nginx", "tags": null})));

    let client = registry.client().build().unwrap();
    let listing = client.tags("library/nginx").unwrap();

    assert!(listing.is_complete());
    assert!(listing.value.is_empty());
}

#[test]
fn test_tags_self_link_stops() {
    let registry = MockRegistry::start();
    registry.with_token("t");
    registry.on(
        TAGS_PATH,
        MockResponse::json(&json!({"tags": ["only"]}))
            .header("link", "</v2/library/nginx/tags/list?n=100>; rel=\"next\""),
    );

    let client = registry.client().build().unwrap();
    let listing = client.tags("library/nginx").unwrap();

    assert_eq!(listing.value, vec!["only"]);
    assert_eq!(listing.failures.len(), 1);
    assert_eq!(registry.requests_to(TAGS_PATH).len(), 1);
}

#[test]
fn test_tags_link_cycle_stops() {
    let registry = MockRegistry::start();
    registry.with_token("t");
    registry.on(TAGS_PATH, first_page());
    registry.on(
        SECOND_PAGE,
        MockResponse::json(&json!({"tags": ["1.2"]}))
            .header("link", "</v2/library/nginx/tags/list?n=100>; rel=\"next\""),
    );

    let client = registry.client().build().unwrap();
    let listing = client.tags("library/nginx").unwrap();

    assert_eq!(listing.value, vec!["1.0", "1.1", "1.2"]);
    assert_eq!(listing.failures.len(), 1);
    assert!(listing.failures[0].url.ends_with(SECOND_PAGE));
    assert_eq!(registry.requests_to(TAGS_PATH).len(), 2);
}

#[test]
fn test_tags_invalid_body_is_soft_failure() {
    let registry = MockRegistry::start();
    registry.with_token("t");
    registry.on(TAGS_PATH, MockResponse::bytes(b"<html>proxy error</html>".to_vec()));

    let client = registry.client().build().unwrap();
    let listing = client.tags("library/nginx").unwrap();

    assert!(listing.value.is_empty());
    assert_eq!(listing.failures.len(), 1);
    assert_eq!(listing.failures[0].status, None);
}

#[test]
fn test_tags_token_failure_is_hard_error() {
    let registry = MockRegistry::start();
    registry.on("/token", MockResponse::status(403));

    let client = registry.client().build().unwrap();
    assert!(client.tags("library/nginx").is_err());
    assert!(registry.requests_to(TAGS_PATH).is_empty());
}
