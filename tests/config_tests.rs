use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

use deepresearch::ResearchConfig;

fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let map: HashMap<String, String> = pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |key: &str| map.get(key).cloned()
}

#[test]
fn both_api_keys_are_required() {
    let err = ResearchConfig::from_lookup(lookup_from(&[("TAVILY_API_KEY", "t")]))
        .unwrap_err();
    assert!(err.to_string().contains("API KEY MISSING: GEMINI_API_KEY"));

    let err = ResearchConfig::from_lookup(lookup_from(&[("GEMINI_API_KEY", "g")]))
        .unwrap_err();
    assert!(err.to_string().contains("API KEY MISSING: TAVILY_API_KEY"));
}

#[test]
fn blank_keys_count_as_missing() {
    let err = ResearchConfig::from_lookup(lookup_from(&[
        ("GEMINI_API_KEY", "   "),
        ("TAVILY_API_KEY", "t"),
    ]))
    .unwrap_err();
    assert!(err.to_string().contains("GEMINI_API_KEY"));
}

#[test]
fn defaults_apply_when_only_keys_are_set() {
    let config = ResearchConfig::from_lookup(lookup_from(&[
        ("GEMINI_API_KEY", "g"),
        ("TAVILY_API_KEY", "t"),
    ]))
    .unwrap();

    assert_eq!(config.llm_api_key, "g");
    assert_eq!(config.search_api_key, "t");
    assert_eq!(config.model, "gemini-2.5-pro");
    assert!(config.llm_base_url.contains("generativelanguage.googleapis.com"));
    assert_eq!(config.session_dir, PathBuf::from("sessions"));
    assert_eq!(config.search_timeout, Duration::from_secs(10));
    assert_eq!(config.query_deadline, Duration::from_secs(30));
    assert_eq!(config.retry_pause, Duration::from_secs(1));
}

#[test]
fn optional_variables_override_defaults() {
    let config = ResearchConfig::from_lookup(lookup_from(&[
        ("GEMINI_API_KEY", "g"),
        ("TAVILY_API_KEY", "t"),
        ("BASE_URL", "http://localhost:8080/v1/"),
        ("RESEARCH_MODEL", "gemini-2.5-flash"),
        ("SESSION_DIR", "/tmp/transcripts"),
    ]))
    .unwrap();

    assert_eq!(config.llm_base_url, "http://localhost:8080/v1/");
    assert_eq!(config.model, "gemini-2.5-flash");
    assert_eq!(config.session_dir, PathBuf::from("/tmp/transcripts"));
}
