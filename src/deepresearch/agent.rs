//! Agent System
//!
//! This module provides the slim [`Agent`] struct that represents an LLM-powered agent
//! with identity and instructions. Agents are the building blocks of the research loop:
//! every injected capability (planning, source rating, reflection, citation formatting,
//! synthesis, triage) is an `Agent` steered by its own instruction set.
//!
//! # Core Components
//!
//! - **Agent**: identity (id, display name) plus an instruction prompt
//! - **LLMSession**: each agent wraps its own session with rolling history and token tracking
//!
//! # Example
//!
//! ```rust,no_run
//! use deepresearch::Agent;
//! use deepresearch::clients::gemini::{GeminiClient, Model};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Arc::new(GeminiClient::new_with_model_enum("key", Model::Gemini25Pro));
//!
//! let mut agent = Agent::new("planner", "Planning Agent", client)
//!     .with_instructions("You create JSON research plans with up to 3 queries.");
//!
//! let response = agent.generate("benefits of electric cars").await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

use crate::deepresearch::client_wrapper::{ClientWrapper, Role, TokenUsage};
use crate::deepresearch::llm_session::LLMSession;
use std::sync::Arc;

/// Default per-agent context window in tokens.
const DEFAULT_MAX_TOKENS: usize = 128_000;

/// Response body returned after asking an agent to generate content.
///
/// Wraps both the final text output and optional token-usage accounting
/// reported by the provider for the underlying call.
#[derive(Debug, Clone)]
pub struct AgentResponse {
    /// Final message content.
    pub content: String,
    /// Token usage for the call, when the provider reports it.
    pub tokens_used: Option<TokenUsage>,
}

/// Represents an agent with identity and instructions.
///
/// Agents are LLM-powered entities that generate responses steered by their
/// instruction prompt while maintaining per-agent conversation memory via
/// [`LLMSession`]. Unlike a free-form assistant, research agents are invoked by
/// the [`ResearchLoopController`](crate::ResearchLoopController) at fixed points
/// of the loop; they never decide control flow themselves.
pub struct Agent {
    /// Stable identifier referenced in events and logs.
    pub id: String,
    /// Human-readable display name for logging and UI surfaces.
    pub name: String,
    /// Instruction prompt embedded as the session's system message.
    pub instructions: String,

    session: LLMSession,
}

impl Agent {
    /// Create a new agent with the mandatory identity information.
    ///
    /// Internally creates an [`LLMSession`] with the provided client, an empty
    /// system prompt, and a 128k token budget.
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        client: Arc<dyn ClientWrapper>,
    ) -> Self {
        let session = LLMSession::new(client, String::new(), DEFAULT_MAX_TOKENS);
        Self {
            id: id.into(),
            name: name.into(),
            instructions: String::new(),
            session,
        }
    }

    /// Attach the instruction prompt that steers this agent (builder pattern).
    pub fn with_instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = instructions.into();
        self.session.set_system_prompt(self.instructions.clone());
        self
    }

    /// Override the default token budget (builder pattern).
    ///
    /// Recreates the internal [`LLMSession`] with the new budget while keeping
    /// the same client. History is reset (the session starts empty).
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        let client = self.session.client().clone();
        self.session = LLMSession::new(client, self.instructions.clone(), max_tokens);
        self
    }

    /// Send `input` to the agent and return its response.
    ///
    /// The input and the reply are appended to the agent's rolling history, so a
    /// capability invoked twice in the same query (e.g. reflection across two
    /// cycles) keeps its earlier context.
    pub async fn generate(
        &mut self,
        input: &str,
    ) -> Result<AgentResponse, Box<dyn std::error::Error>> {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!("Agent[{}]::generate({} chars)", self.id, input.len());
        }

        let reply = self
            .session
            .send_message(Role::User, input.to_string())
            .await?;

        Ok(AgentResponse {
            content: reply.content,
            tokens_used: self.session.client().get_last_usage(),
        })
    }

    /// Forget accumulated conversation history, keeping identity and instructions.
    ///
    /// Called between top-level queries so one research session never leaks
    /// context into the next.
    pub fn reset(&mut self) {
        self.session.clear_history();
    }

    /// Cumulative token usage recorded by the underlying session.
    pub fn token_usage(&self) -> TokenUsage {
        self.session.token_usage()
    }
}
