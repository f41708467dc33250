//! Configuration for DeepResearch.
//!
//! Provides the [`ResearchConfig`] struct holding provider credentials, the model
//! selection, the transcript directory, and the loop's timeout/budget knobs. The
//! configuration is read once at startup from the environment (`GEMINI_API_KEY`,
//! `TAVILY_API_KEY`, optional `BASE_URL` and friends).
//!
//! # Example
//!
//! ```rust,no_run
//! use deepresearch::ResearchConfig;
//!
//! let config = ResearchConfig::from_env().expect("API KEY MISSING");
//! println!("model: {}", config.model);
//! ```

use std::error::Error;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use crate::deepresearch::clients::gemini::GEMINI_OPENAI_BASE_URL;

/// Error raised when mandatory configuration is absent at startup.
#[derive(Debug, Clone)]
pub struct ConfigError {
    message: String,
}

impl ConfigError {
    pub fn new(message: impl Into<String>) -> Self {
        ConfigError {
            message: message.into(),
        }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "configuration error: {}", self.message)
    }
}

impl Error for ConfigError {}

/// Startup configuration for the research chatbot.
///
/// Credentials are mandatory; everything else has a default. The struct can be
/// built manually in tests, or via [`ResearchConfig::from_env`] in the binary.
#[derive(Debug, Clone)]
pub struct ResearchConfig {
    /// API key for the language-model provider.
    pub llm_api_key: String,
    /// Base URL of the OpenAI-compatible endpoint (defaults to Gemini's).
    pub llm_base_url: String,
    /// Model identifier sent with each completion request.
    pub model: String,
    /// API key for the web-search provider.
    pub search_api_key: String,
    /// Directory where per-conversation `.jsonl` transcripts are stored.
    pub session_dir: PathBuf,
    /// Upper bound for a single search call, including its one retry pause.
    pub search_timeout: Duration,
    /// Upper bound for a whole query; past it, synthesis runs on partial data.
    pub query_deadline: Duration,
    /// Pause between the first search attempt and its single retry.
    pub retry_pause: Duration,
}

impl Default for ResearchConfig {
    fn default() -> Self {
        Self {
            llm_api_key: String::new(),
            llm_base_url: GEMINI_OPENAI_BASE_URL.to_string(),
            model: "gemini-2.5-pro".to_string(),
            search_api_key: String::new(),
            session_dir: PathBuf::from("sessions"),
            search_timeout: Duration::from_secs(10),
            query_deadline: Duration::from_secs(30),
            retry_pause: Duration::from_secs(1),
        }
    }
}

impl ResearchConfig {
    /// Read the configuration from process environment variables.
    ///
    /// `GEMINI_API_KEY` and `TAVILY_API_KEY` are required and missing either fails
    /// fast. `BASE_URL`, `RESEARCH_MODEL`, and `SESSION_DIR` override the defaults
    /// when present.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read the configuration through an injectable lookup function.
    ///
    /// Tests use this with a closure over a fixed map so they never mutate the
    /// process environment.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let llm_api_key = non_empty(lookup("GEMINI_API_KEY"))
            .ok_or_else(|| ConfigError::new("API KEY MISSING: GEMINI_API_KEY"))?;
        let search_api_key = non_empty(lookup("TAVILY_API_KEY"))
            .ok_or_else(|| ConfigError::new("API KEY MISSING: TAVILY_API_KEY"))?;

        let mut config = ResearchConfig {
            llm_api_key,
            search_api_key,
            ..ResearchConfig::default()
        };
        if let Some(base_url) = non_empty(lookup("BASE_URL")) {
            config.llm_base_url = base_url;
        }
        if let Some(model) = non_empty(lookup("RESEARCH_MODEL")) {
            config.model = model;
        }
        if let Some(dir) = non_empty(lookup("SESSION_DIR")) {
            config.session_dir = PathBuf::from(dir);
        }
        Ok(config)
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.filter(|v| !v.trim().is_empty())
}
