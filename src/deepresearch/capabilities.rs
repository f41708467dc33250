//! Injected capabilities consumed by the research loop.
//!
//! Every AI-shaped step of the loop — triage, planning, source rating, reflection,
//! citation formatting, synthesis — is a trait here with exactly one async call, a
//! result, and an error outcome. The controller composes these; it never talks to a
//! provider directly. That keeps the whole loop deterministic under mock
//! implementations and keeps prompt wiring out of the control flow.
//!
//! The `Llm*` implementations each drive an [`Agent`] whose instructions are ported
//! from the original agent prompt set. Model output is parsed tolerantly: JSON is
//! extracted from fenced blocks or surrounding prose, and malformed output degrades
//! per capability (a malformed plan falls back to the raw query, a malformed
//! reflection reads as "no additional cycle") instead of failing the query.
//!
//! # Example: a deterministic planner for tests
//!
//! ```rust
//! use async_trait::async_trait;
//! use deepresearch::capabilities::{CapabilityResult, QueryPlanner};
//! use deepresearch::research::ResearchPlan;
//!
//! struct FixedPlanner;
//!
//! #[async_trait]
//! impl QueryPlanner for FixedPlanner {
//!     async fn plan(&mut self, objective: &str) -> CapabilityResult<ResearchPlan> {
//!         Ok(ResearchPlan::new(objective, vec![objective.to_string()]))
//!     }
//! }
//! ```

use async_trait::async_trait;
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::error::Error;
use std::io;
use std::sync::Arc;

use crate::deepresearch::agent::Agent;
use crate::deepresearch::client_wrapper::ClientWrapper;
use crate::deepresearch::research::{
    Citation, CredibilityTier, ReflectionOutcome, ResearchPlan, SearchResult,
};

pub type CapabilityResult<T> = Result<T, Box<dyn Error + Send + Sync>>;

/// What triage decided about a raw user input.
#[derive(Debug, Clone)]
pub enum TriageOutcome {
    /// Greeting or smalltalk; reply directly without spending the search budget.
    SmallTalk(String),
    /// The input is too vague to research; ask this clarifying question.
    Clarify(String),
    /// A factual or analytical query; hand off to the research loop.
    Research,
}

/// First contact for every user input: greet, clarify, or hand off to research.
#[async_trait]
pub trait QueryTriage: Send + Sync {
    async fn triage(&mut self, input: &str) -> CapabilityResult<TriageOutcome>;
}

/// Produces the research plan (≤ 3 sub-queries) for an objective.
#[async_trait]
pub trait QueryPlanner: Send + Sync {
    async fn plan(&mut self, objective: &str) -> CapabilityResult<ResearchPlan>;

    /// Forget per-query conversational state. No-op for stateless implementations.
    fn reset(&mut self) {}
}

/// Assigns a credibility tier to every collected result, in input order.
#[async_trait]
pub trait SourceRater: Send + Sync {
    async fn rate(&mut self, results: &[SearchResult]) -> CapabilityResult<Vec<CredibilityTier>>;

    /// Forget per-query conversational state. No-op for stateless implementations.
    fn reset(&mut self) {}
}

/// Analyzes the aggregate for biases, gaps, insights, and conflicts.
#[async_trait]
pub trait ReflectionAnalyst: Send + Sync {
    async fn reflect(
        &mut self,
        objective: &str,
        results: &[SearchResult],
    ) -> CapabilityResult<ReflectionOutcome>;

    /// Forget per-query conversational state. No-op for stateless implementations.
    fn reset(&mut self) {}
}

/// Formats APA citations. Callers pass High/Medium sources only.
#[async_trait]
pub trait CitationFormatter: Send + Sync {
    async fn format(&mut self, results: &[SearchResult]) -> CapabilityResult<Vec<Citation>>;

    /// Forget per-query conversational state. No-op for stateless implementations.
    fn reset(&mut self) {}
}

/// Everything the synthesizer needs to produce the final answer text.
pub struct SynthesisRequest<'a> {
    /// The user's original query.
    pub query: &'a str,
    /// All collected results, rated.
    pub results: &'a [SearchResult],
    /// Reflection outcome(s), first cycle first.
    pub reflections: &'a [ReflectionOutcome],
    /// Pre-formatted citations to weave into the response.
    pub citations: &'a [Citation],
}

/// Synthesizes the conversational answer text from the collected material.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    async fn synthesize(&mut self, request: &SynthesisRequest<'_>) -> CapabilityResult<String>;

    /// Forget per-query conversational state. No-op for stateless implementations.
    fn reset(&mut self) {}
}

// ─── LLM-backed implementations ──────────────────────────────────────────────

const TRIAGE_INSTRUCTIONS: &str = "You are a friendly Query Agent, the user's primary contact. \
Classify the user input and answer with EXACTLY this JSON: \
{\"action\": \"greet\" | \"research\" | \"clarify\", \"reply\": \"...\"}. \
1) For greetings or small talk use action 'greet' with a short warm reply; \
2) For factual or analytical queries use action 'research' with an empty reply; \
3) If unclear, use action 'clarify' with one clarifying question; \
4) Never answer research queries directly.";

const PLANNER_INSTRUCTIONS: &str = "You are a Planning Agent. \
1) Analyze the query to identify the core topic, sub-questions, and ambiguities; \
2) Create a research plan and return it as pure JSON: \
{\"objectives\": [], \"sub_questions\": [], \"queries\": []} with up to 3 queries; \
3) Refine queries with dates, regions, or metrics where useful; \
4) Return the JSON only, no commentary.";

const RATER_INSTRUCTIONS: &str = "You are an expert SourceChecker Agent. \
1) Receive raw data as a JSON string; \
2) If data is empty or invalid, return []; \
3) Rate sources as High (.edu, .gov, major news), Medium (Wikipedia, industry sites), \
or Low (blogs, forums); \
4) Return pure JSON: [{\"source\": \"<URL>\", \"rating\": \"High|Medium|Low\"}].";

const REFLECTION_INSTRUCTIONS: &str = "You are an expert Reflection Agent. \
1) Receive the research objective and the collected data as JSON; \
2) Identify biases (e.g., media exaggeration), gaps (e.g., missing metrics), insights \
(e.g., trends), and conflicts (contradictory claims between two sources); \
3) Suggest up to 3 additional queries if gaps are found; \
4) Return pure JSON: {\"biases\": [], \"gaps\": [], \"insights\": [], \
\"conflicts\": [{\"source_a\": \"\", \"claim_a\": \"\", \"source_b\": \"\", \"claim_b\": \"\"}], \
\"follow_up_queries\": []}.";

const CITATION_INSTRUCTIONS: &str = "You are an expert Citation Agent. \
1) Receive source data as a JSON string; \
2) If the data is empty, return []; \
3) Format one citation in APA style per source, preserving input order; \
4) Return pure JSON: an array of citation strings.";

const SYNTHESIZER_INSTRUCTIONS: &str = "You are an expert research writer. \
Synthesize the provided findings into a concise, conversational response with sections \
(e.g., Environmental, Cost, Performance). Explicitly name any conflicts \
(e.g., 'Source A claims X, while Source B claims Y') and trends. Include the provided \
APA citations at the end. Mention no internal processes, plans, or agents; deliver only \
the final response.";

/// [`QueryTriage`] backed by an LLM agent. Fails open: anything unparseable is
/// handed to the research loop, which is robust to odd input.
pub struct LlmQueryTriage {
    agent: Agent,
}

impl LlmQueryTriage {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            agent: Agent::new("triage", "Query Agent", client)
                .with_instructions(TRIAGE_INSTRUCTIONS),
        }
    }
}

#[async_trait]
impl QueryTriage for LlmQueryTriage {
    async fn triage(&mut self, input: &str) -> CapabilityResult<TriageOutcome> {
        let response = self.agent.generate(input).await.map_err(map_agent_error)?;

        let parsed = match extract_json(&response.content) {
            Some(value) => value,
            None => return Ok(TriageOutcome::Research),
        };
        let action = parsed.get("action").and_then(|a| a.as_str()).unwrap_or("");
        let reply = parsed
            .get("reply")
            .and_then(|r| r.as_str())
            .unwrap_or("")
            .to_string();

        Ok(match action {
            "greet" if !reply.is_empty() => TriageOutcome::SmallTalk(reply),
            "clarify" if !reply.is_empty() => TriageOutcome::Clarify(reply),
            _ => TriageOutcome::Research,
        })
    }
}

/// [`QueryPlanner`] backed by an LLM agent.
///
/// A malformed plan falls back to a single sub-query: the raw objective. The
/// loop then still searches once and synthesizes from whatever it finds.
pub struct LlmQueryPlanner {
    agent: Agent,
}

impl LlmQueryPlanner {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            agent: Agent::new("planner", "Planning Agent", client)
                .with_instructions(PLANNER_INSTRUCTIONS),
        }
    }
}

#[async_trait]
impl QueryPlanner for LlmQueryPlanner {
    async fn plan(&mut self, objective: &str) -> CapabilityResult<ResearchPlan> {
        let response = self
            .agent
            .generate(objective)
            .await
            .map_err(map_agent_error)?;

        let sub_queries = extract_json(&response.content)
            .and_then(|value| string_array(value.get("queries")))
            .filter(|queries| !queries.is_empty())
            .unwrap_or_else(|| vec![objective.to_string()]);

        Ok(ResearchPlan::new(objective, sub_queries))
    }

    fn reset(&mut self) {
        self.agent.reset();
    }
}

/// [`SourceRater`] backed by an LLM agent.
///
/// The reply maps URLs to tiers; any result the model skipped or mislabeled is
/// tiered `Low`, which keeps it out of the citation list.
pub struct LlmSourceRater {
    agent: Agent,
}

impl LlmSourceRater {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            agent: Agent::new("rater", "SourceChecker Agent", client)
                .with_instructions(RATER_INSTRUCTIONS),
        }
    }
}

#[async_trait]
impl SourceRater for LlmSourceRater {
    async fn rate(&mut self, results: &[SearchResult]) -> CapabilityResult<Vec<CredibilityTier>> {
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let payload = serde_json::to_string(
            &results
                .iter()
                .map(|r| serde_json::json!({ "source": r.url, "content": r.snippet }))
                .collect::<Vec<_>>(),
        )?;

        let response = self.agent.generate(&payload).await.map_err(map_agent_error)?;

        let mut by_url: HashMap<String, CredibilityTier> = HashMap::new();
        if let Some(JsonValue::Array(entries)) = extract_json(&response.content) {
            for entry in entries {
                let url = entry.get("source").and_then(|s| s.as_str());
                let tier = entry
                    .get("rating")
                    .and_then(|r| r.as_str())
                    .and_then(CredibilityTier::parse);
                if let (Some(url), Some(tier)) = (url, tier) {
                    by_url.insert(url.to_string(), tier);
                }
            }
        }

        Ok(results
            .iter()
            .map(|r| by_url.get(&r.url).copied().unwrap_or(CredibilityTier::Low))
            .collect())
    }

    fn reset(&mut self) {
        self.agent.reset();
    }
}

/// [`ReflectionAnalyst`] backed by an LLM agent.
///
/// Malformed output reads as an empty [`ReflectionOutcome`] — no gaps, so no
/// refinement cycle — per the degraded-mode policy.
pub struct LlmReflectionAnalyst {
    agent: Agent,
}

impl LlmReflectionAnalyst {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            agent: Agent::new("reflector", "Reflection Agent", client)
                .with_instructions(REFLECTION_INSTRUCTIONS),
        }
    }
}

#[async_trait]
impl ReflectionAnalyst for LlmReflectionAnalyst {
    async fn reflect(
        &mut self,
        objective: &str,
        results: &[SearchResult],
    ) -> CapabilityResult<ReflectionOutcome> {
        if results.is_empty() {
            return Ok(ReflectionOutcome {
                gaps: vec!["No data available".to_string()],
                ..ReflectionOutcome::default()
            });
        }

        let payload = serde_json::json!({
            "objective": objective,
            "data": results
                .iter()
                .map(|r| serde_json::json!({ "source": r.url, "content": r.snippet }))
                .collect::<Vec<_>>(),
        })
        .to_string();

        let response = self.agent.generate(&payload).await.map_err(map_agent_error)?;

        let outcome = extract_json(&response.content)
            .and_then(|value| serde_json::from_value::<ReflectionOutcome>(value).ok())
            .unwrap_or_default();

        Ok(outcome)
    }

    fn reset(&mut self) {
        self.agent.reset();
    }
}

/// [`CitationFormatter`] backed by an LLM agent.
///
/// When the reply does not yield one line per source, the missing entries get a
/// deterministic fallback citation derived from the URL.
pub struct LlmCitationFormatter {
    agent: Agent,
}

impl LlmCitationFormatter {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            agent: Agent::new("citations", "Citation Agent", client)
                .with_instructions(CITATION_INSTRUCTIONS),
        }
    }
}

#[async_trait]
impl CitationFormatter for LlmCitationFormatter {
    async fn format(&mut self, results: &[SearchResult]) -> CapabilityResult<Vec<Citation>> {
        if results.is_empty() {
            return Ok(Vec::new());
        }

        let payload = serde_json::to_string(
            &results
                .iter()
                .map(|r| serde_json::json!({ "source": r.url, "content": r.snippet }))
                .collect::<Vec<_>>(),
        )?;

        let response = self.agent.generate(&payload).await.map_err(map_agent_error)?;

        let lines = extract_json(&response.content)
            .and_then(|value| string_array(Some(&value)))
            .unwrap_or_default();

        Ok(results
            .iter()
            .enumerate()
            .map(|(idx, result)| {
                let tier = result.tier.unwrap_or(CredibilityTier::Low);
                let formatted = lines
                    .get(idx)
                    .cloned()
                    .unwrap_or_else(|| fallback_citation(&result.url));
                Citation {
                    formatted,
                    url: result.url.clone(),
                    tier,
                }
            })
            .collect())
    }

    fn reset(&mut self) {
        self.agent.reset();
    }
}

/// [`Synthesizer`] backed by an LLM agent.
pub struct LlmSynthesizer {
    agent: Agent,
}

impl LlmSynthesizer {
    pub fn new(client: Arc<dyn ClientWrapper>) -> Self {
        Self {
            agent: Agent::new("synthesizer", "Research Writer", client)
                .with_instructions(SYNTHESIZER_INSTRUCTIONS),
        }
    }
}

#[async_trait]
impl Synthesizer for LlmSynthesizer {
    async fn synthesize(&mut self, request: &SynthesisRequest<'_>) -> CapabilityResult<String> {
        let conflicts: Vec<String> = request
            .reflections
            .iter()
            .flat_map(|r| r.conflicts.iter().map(|c| c.describe()))
            .collect();
        let insights: Vec<String> = request
            .reflections
            .iter()
            .flat_map(|r| r.insights.iter().cloned())
            .collect();

        let payload = serde_json::json!({
            "query": request.query,
            "findings": request.results
                .iter()
                .map(|r| serde_json::json!({
                    "source": r.url,
                    "content": r.snippet,
                    "rating": r.tier,
                }))
                .collect::<Vec<_>>(),
            "conflicts": conflicts,
            "insights": insights,
            "citations": request.citations.iter().map(|c| &c.formatted).collect::<Vec<_>>(),
        })
        .to_string();

        let response = self.agent.generate(&payload).await.map_err(map_agent_error)?;
        Ok(response.content)
    }

    fn reset(&mut self) {
        self.agent.reset();
    }
}

// ─── Parsing helpers ─────────────────────────────────────────────────────────

/// Extract the first JSON document from a model reply.
///
/// Handles replies that are pure JSON, JSON inside a fenced code block, or JSON
/// embedded in prose. Returns `None` when nothing parseable is found — callers
/// apply their per-capability default instead of failing the query.
pub fn extract_json(text: &str) -> Option<JsonValue> {
    let trimmed = strip_code_fences(text.trim());

    if let Ok(value) = serde_json::from_str::<JsonValue>(trimmed) {
        return Some(value);
    }

    // Fall back to the widest {...} or [...] span in the text.
    for (open, close) in &[('{', '}'), ('[', ']')] {
        if let (Some(start), Some(end)) = (trimmed.find(*open), trimmed.rfind(*close)) {
            if end > start {
                if let Ok(value) = serde_json::from_str::<JsonValue>(&trimmed[start..=end]) {
                    return Some(value);
                }
            }
        }
    }
    None
}

/// Remove a Markdown code fence (```json ... ``` or ``` ... ```) when the reply
/// is wrapped in one.
fn strip_code_fences(text: &str) -> &str {
    let text = text.trim();
    if !text.starts_with("```") {
        return text;
    }
    let without_open = match text.find('\n') {
        Some(idx) => &text[idx + 1..],
        None => return text,
    };
    match without_open.rfind("```") {
        Some(idx) => without_open[..idx].trim(),
        None => without_open.trim(),
    }
}

/// Read a JSON array of strings, ignoring non-string entries.
fn string_array(value: Option<&JsonValue>) -> Option<Vec<String>> {
    let array = value?.as_array()?;
    Some(
        array
            .iter()
            .filter_map(|entry| entry.as_str().map(|s| s.to_string()))
            .collect(),
    )
}

/// Deterministic citation used when the model output did not cover a source:
/// "example.com. (n.d.). Retrieved from https://example.com/page".
fn fallback_citation(url: &str) -> String {
    let domain = url
        .trim_start_matches("https://")
        .trim_start_matches("http://")
        .split('/')
        .next()
        .unwrap_or(url)
        .trim_start_matches("www.");
    format!("{}. (n.d.). Retrieved from {}", domain, url)
}

/// Convert agent errors into Send + Sync errors for capability callers.
///
/// Session errors may not be Send + Sync; wrap them in an io::Error that is.
fn map_agent_error(err: Box<dyn Error>) -> Box<dyn Error + Send + Sync> {
    Box::new(io::Error::new(io::ErrorKind::Other, err.to_string()))
}
