//! # DeepResearch
//!
//! DeepResearch is a Rust toolkit for building a citation-backed research chatbot on top of
//! remote Large Language Models and a web-search provider. At its heart sits a bounded
//! research loop: plan a query into at most three sub-queries, search each one once, rate
//! the credibility of every source, reflect on the aggregate, optionally run exactly one
//! gap-driven refinement cycle, then synthesize a conversational answer with APA citations.
//!
//! The crate provides layered abstractions for:
//!
//! * **Provider Flexibility**: [`ClientWrapper`] trait implemented for OpenAI and Google
//!   Gemini (through its OpenAI-compatible endpoint), with per-call token accounting
//! * **Stateful Conversations**: [`LLMSession`] for rolling conversation history with
//!   context trimming, and [`Agent`] for prompt-steered identities built on top of it
//! * **Injected Capabilities**: every AI or search step the loop needs — triage, planning,
//!   source rating, reflection, citation formatting, synthesis — is a trait in
//!   [`capabilities`], so the whole loop is deterministic under mock implementations
//! * **The Research Loop**: [`ResearchLoopController`] enforces the search budget (at most
//!   six searches per query), the two-cycle cap, per-search and per-query timeouts, and a
//!   degraded mode that substitutes placeholder data instead of failing the user
//! * **Observability**: [`event`] module with a callback-based [`EventHandler`] emitting
//!   [`ResearchEvent`]s at every lifecycle boundary of a query
//! * **Persistence**: [`SessionStore`] keeping an append-only `.jsonl` transcript per
//!   conversation identifier
//!
//! ## Getting Started
//!
//! ```rust,no_run
//! use deepresearch::clients::gemini::{GeminiClient, Model};
//! use deepresearch::client_wrapper::{ClientWrapper, Message, Role};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     deepresearch::init_logger();
//!
//!     let api_key = std::env::var("GEMINI_API_KEY")?;
//!     let client = GeminiClient::new_with_model_enum(&api_key, Model::Gemini25Pro);
//!
//!     let response = client
//!         .send_message(&[
//!             Message { role: Role::System, content: "You are terse.".into() },
//!             Message { role: Role::User, content: "Summarise Rust in one sentence.".into() },
//!         ])
//!         .await?;
//!
//!     println!("{}", response.content);
//!     Ok(())
//! }
//! ```
//!
//! For the full loop, wire the LLM-backed capabilities into a
//! [`ResearchLoopController`] — see the `research_chat` binary for an end-to-end example.

use std::sync::Once;

static INIT_LOGGER: Once = Once::new();

/// Initialise the global [`env_logger`] subscriber exactly once.
///
/// The helper is intentionally lightweight so that applications embedding DeepResearch can
/// opt-in to simple `RUST_LOG` driven diagnostics without having to choose a specific
/// logging backend upfront.
///
/// ```rust
/// deepresearch::init_logger();
/// log::info!("Logger is ready");
/// ```
pub fn init_logger() {
    INIT_LOGGER.call_once(|| {
        env_logger::init();
    });
}

// Import the top-level `deepresearch` module.
pub mod deepresearch;

// Re-exporting key items for easier external access.
pub use crate::deepresearch::agent::{Agent, AgentResponse};
pub use crate::deepresearch::capabilities;
pub use crate::deepresearch::capabilities::{
    CapabilityResult, CitationFormatter, QueryPlanner, QueryTriage, ReflectionAnalyst,
    SourceRater, Synthesizer, TriageOutcome,
};
pub use crate::deepresearch::client_wrapper;
pub use crate::deepresearch::client_wrapper::{ClientWrapper, Message, Role, TokenUsage};
pub use crate::deepresearch::clients;
pub use crate::deepresearch::config::ResearchConfig;
pub use crate::deepresearch::controller::ResearchLoopController;
pub use crate::deepresearch::event;
pub use crate::deepresearch::event::{EventHandler, ResearchEvent};
pub use crate::deepresearch::llm_session::LLMSession;
pub use crate::deepresearch::research;
pub use crate::deepresearch::research::{
    Answer, Citation, CredibilityTier, ReflectionOutcome, ResearchPlan, ResearchSession,
    SearchResult, SourceConflict,
};
pub use crate::deepresearch::search;
pub use crate::deepresearch::search::{SearchProvider, TavilyClient};
pub use crate::deepresearch::session_store;
pub use crate::deepresearch::session_store::{SessionStore, Speaker, TranscriptEntry};
