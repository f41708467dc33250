use deepresearch::search::{placeholder_results, TavilyClient};
use serde_json::json;

#[test]
fn parse_response_extracts_urls_and_snippets() {
    let body = json!({
        "query": "ev emissions",
        "results": [
            { "url": "https://climate.mit.edu", "content": "40-60% lower lifecycle emissions" },
            { "url": "https://www.epa.gov", "content": "61,000 charging stations" }
        ]
    });

    let results = TavilyClient::parse_response(&body).unwrap();
    assert_eq!(results.len(), 2);
    assert_eq!(results[0].url, "https://climate.mit.edu");
    assert_eq!(results[1].snippet, "61,000 charging stations");
    assert!(results.iter().all(|r| !r.placeholder && r.tier.is_none()));
}

#[test]
fn parse_response_skips_entries_without_urls() {
    let body = json!({
        "results": [
            { "content": "no url at all" },
            { "url": "", "content": "empty url" },
            { "url": "https://www.edmunds.com", "content": "kept" }
        ]
    });

    let results = TavilyClient::parse_response(&body).unwrap();
    assert_eq!(results.len(), 1);
    assert_eq!(results[0].url, "https://www.edmunds.com");
}

#[test]
fn parse_response_tolerates_missing_snippets() {
    let body = json!({
        "results": [{ "url": "https://example.com" }]
    });

    let results = TavilyClient::parse_response(&body).unwrap();
    assert_eq!(results[0].snippet, "");
}

#[test]
fn parse_response_rejects_bodies_without_a_results_array() {
    assert!(TavilyClient::parse_response(&json!({})).is_err());
    assert!(TavilyClient::parse_response(&json!({ "results": "oops" })).is_err());
}

#[test]
fn placeholder_set_is_flagged_and_non_empty() {
    let results = placeholder_results();
    assert_eq!(results.len(), 5);
    assert!(results.iter().all(|r| r.placeholder));
    assert!(results.iter().any(|r| r.url.contains("epa.gov")));
    assert!(results.iter().all(|r| !r.snippet.is_empty()));
}
