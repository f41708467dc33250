//! Data model for one research query.
//!
//! Everything a single pass of the loop produces lives here: the plan, the collected
//! search results with their credibility tiers, the per-cycle reflection outcomes, the
//! formatted citations, and the final answer. A [`ResearchSession`] owns all of it and
//! is created per user query and dropped once the response is returned — the only
//! cross-query state is the transcript kept by
//! [`SessionStore`](crate::session_store::SessionStore).
//!
//! All structures serialize with `serde`; the JSON field names match what the LLM-backed
//! capabilities are instructed to emit, so parsing a capability reply is a plain
//! `serde_json::from_str` after JSON extraction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Hard cap on sub-queries per cycle, and therefore on searches per cycle.
pub const MAX_SUB_QUERIES: usize = 3;

/// Hard cap on research cycles per query (initial + one gap-driven refinement).
pub const MAX_CYCLES: usize = 2;

/// Hard cap on searches per top-level query, however many gaps reflection reports.
pub const MAX_SEARCHES_PER_QUERY: usize = MAX_SUB_QUERIES * MAX_CYCLES;

/// Credibility classification of a source, assigned by the rating capability.
///
/// Only `High` and `Medium` sources are eligible for the citation list; `Low`
/// sources may still inform synthesis but are never cited.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CredibilityTier {
    /// .edu, .gov, major news outlets.
    High,
    /// Wikipedia, established industry sites.
    Medium,
    /// Blogs, forums, unattributed content.
    Low,
}

impl CredibilityTier {
    /// Whether a source of this tier may appear in the citation list.
    pub fn citable(self) -> bool {
        matches!(self, CredibilityTier::High | CredibilityTier::Medium)
    }

    /// Parse the tier names the rating prompt instructs the model to emit.
    /// Unknown strings map to `None` so callers can apply their own default.
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "high" => Some(CredibilityTier::High),
            "medium" => Some(CredibilityTier::Medium),
            "low" => Some(CredibilityTier::Low),
            _ => None,
        }
    }
}

/// A research plan: the objective plus an ordered sequence of at most
/// [`MAX_SUB_QUERIES`] sub-queries, created once per top-level query (and once
/// more for the optional refinement cycle).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchPlan {
    /// What the user ultimately wants answered.
    pub objective: String,
    /// Search queries, in execution order. Never more than [`MAX_SUB_QUERIES`].
    pub sub_queries: Vec<String>,
}

impl ResearchPlan {
    /// Build a plan, truncating any excess sub-queries to [`MAX_SUB_QUERIES`].
    pub fn new(objective: impl Into<String>, mut sub_queries: Vec<String>) -> Self {
        sub_queries.truncate(MAX_SUB_QUERIES);
        Self {
            objective: objective.into(),
            sub_queries,
        }
    }
}

/// A single search hit: where it came from and what it said.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult {
    /// Source URL.
    pub url: String,
    /// Snippet text returned by the search provider.
    pub snippet: String,
    /// Credibility tier once the rating capability has run; `None` before rating.
    pub tier: Option<CredibilityTier>,
    /// True when this is substituted placeholder data from degraded mode rather
    /// than a live search hit.
    pub placeholder: bool,
}

impl SearchResult {
    pub fn new(url: impl Into<String>, snippet: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            snippet: snippet.into(),
            tier: None,
            placeholder: false,
        }
    }

    /// Mark this result as degraded-mode placeholder data.
    pub fn as_placeholder(mut self) -> Self {
        self.placeholder = true;
        self
    }
}

/// A pair of contradictory claims with their sources, detected by reflection.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceConflict {
    pub source_a: String,
    pub claim_a: String,
    pub source_b: String,
    pub claim_b: String,
}

impl SourceConflict {
    /// Render the conflict the way the synthesized answer names it:
    /// "Source A claims X, while Source B claims Y".
    pub fn describe(&self) -> String {
        format!(
            "{} claims {}, while {} claims {}",
            self.source_a, self.claim_a, self.source_b, self.claim_b
        )
    }
}

/// What the reflection capability concluded about one cycle's aggregate data.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReflectionOutcome {
    /// Detected biases (e.g. media exaggeration).
    #[serde(default)]
    pub biases: Vec<String>,
    /// Detected insufficiencies in the collected data.
    #[serde(default)]
    pub gaps: Vec<String>,
    /// Notable trends or takeaways.
    #[serde(default)]
    pub insights: Vec<String>,
    /// Contradictory claim pairs.
    #[serde(default)]
    pub conflicts: Vec<SourceConflict>,
    /// Suggested queries for a refinement cycle (at most [`MAX_SUB_QUERIES`] are used).
    #[serde(default)]
    pub follow_up_queries: Vec<String>,
}

impl ReflectionOutcome {
    /// A gap triggers the single refinement cycle, provided follow-up queries exist
    /// and the first cycle is the one that just completed.
    pub fn needs_another_cycle(&self) -> bool {
        !self.gaps.is_empty() && !self.follow_up_queries.is_empty()
    }
}

/// One formatted citation in the final answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Citation {
    /// APA-style citation line.
    pub formatted: String,
    /// Source URL the line refers to.
    pub url: String,
    /// Tier of the cited source. Always `High` or `Medium`.
    pub tier: CredibilityTier,
}

/// The synthesized answer returned to the user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Answer {
    /// Conversational answer text.
    pub text: String,
    /// Citations for High/Medium sources only.
    pub citations: Vec<Citation>,
    /// True when the answer was produced from placeholder or partial data.
    pub degraded: bool,
}

impl Answer {
    /// The fixed degraded-mode response used when no usable data was collected
    /// and synthesis itself could not run.
    pub fn no_sufficient_data() -> Self {
        Answer {
            text: "I could not gather sufficient data to answer this reliably. \
                   Please try again in a moment."
                .to_string(),
            citations: Vec::new(),
            degraded: true,
        }
    }
}

/// Everything collected while answering one top-level query.
///
/// Owns one [`ResearchPlan`] per cycle, the results of at most
/// [`MAX_SEARCHES_PER_QUERY`] searches across at most two cycles (each search
/// contributes up to a provider-defined handful of snippets), one
/// [`ReflectionOutcome`] per cycle, and the final synthesized answer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResearchSession {
    /// Unique id for this query, used to correlate events and logs.
    pub query_id: String,
    /// Conversation identifier linking this query to its transcript.
    pub conversation_id: String,
    /// The raw user query.
    pub query: String,
    /// When the controller accepted the query.
    pub started_at: DateTime<Utc>,
    /// One plan per executed cycle (1 or 2 entries).
    pub plans: Vec<ResearchPlan>,
    /// All collected results across cycles.
    pub results: Vec<SearchResult>,
    /// One reflection outcome per executed cycle.
    pub reflections: Vec<ReflectionOutcome>,
    /// Searches actually issued (attempted sub-queries, not retries).
    pub searches_issued: usize,
    /// Searches that fell back to placeholder data.
    pub searches_degraded: usize,
    /// The final answer, present once synthesis has run.
    pub answer: Option<Answer>,
}

impl ResearchSession {
    pub fn new(conversation_id: impl Into<String>, query: impl Into<String>) -> Self {
        Self {
            query_id: Uuid::new_v4().to_string(),
            conversation_id: conversation_id.into(),
            query: query.into(),
            started_at: Utc::now(),
            plans: Vec::new(),
            results: Vec::new(),
            reflections: Vec::new(),
            searches_issued: 0,
            searches_degraded: 0,
            answer: None,
        }
    }

    /// Remaining search budget for this query.
    pub fn searches_remaining(&self) -> usize {
        MAX_SEARCHES_PER_QUERY.saturating_sub(self.searches_issued)
    }

    /// True when every issued search ended up on placeholder data.
    pub fn all_searches_degraded(&self) -> bool {
        self.searches_issued > 0 && self.searches_degraded == self.searches_issued
    }
}
