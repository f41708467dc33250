//! The `llm_session` module manages a conversational session with an LLM,
//! handling not just message history and context pruning, but also
//! real token accounting (input vs. output) for cost estimates.
//!
//! **Key features:**
//! - **Automatic context trimming**: never exceed your `max_tokens` window.
//! - **Token tracking**: accumulates `input_tokens` & `output_tokens` per call.
//! - **Easy inspection**: call `session.token_usage()` to get a `TokenUsage` struct.
//!
//! ## Quickstart
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use deepresearch::client_wrapper::Role;
//! use deepresearch::clients::gemini::{GeminiClient, Model};
//! use deepresearch::LLMSession;
//!
//! # async fn example() {
//! // 1) Build the client & session
//! let client = GeminiClient::new_with_model_enum("YOUR_GEMINI_KEY", Model::Gemini25Pro);
//! let mut session = LLMSession::new(
//!     Arc::new(client),
//!     "You are a meticulous research assistant.".into(),
//!     8_192, // max context window
//! );
//!
//! // 2) Send a message
//! let reply = session.send_message(Role::User, "Hello!".into()).await.unwrap();
//! println!("Assistant: {}", reply.content);
//!
//! // 3) Inspect token usage so far
//! let usage = session.token_usage();
//! println!(
//!     "Input: {} tokens, Output: {} tokens, Total: {} tokens",
//!     usage.input_tokens, usage.output_tokens, usage.total_tokens
//! );
//! # }
//! ```
//!
//! The session automatically prunes oldest messages when cumulative tokens exceed the
//! configured window.

use crate::client_wrapper;
use std::sync::Arc;
// src/deepresearch/llm_session.rs
use crate::deepresearch::client_wrapper::{ClientWrapper, Message, Role};

/// A conversation session with an LLM, including:
///
/// - `client`: your `ClientWrapper` (e.g. `GeminiClient`).
/// - `system_prompt`: the context-steering system message.
/// - `conversation_history`: all user & assistant messages (excluding system prompt).
/// - `max_tokens`: your configured context window size.
pub struct LLMSession {
    client: Arc<dyn ClientWrapper>,
    system_prompt: Message,
    conversation_history: Vec<Message>,
    max_tokens: usize,
    total_input_tokens: usize,
    total_output_tokens: usize,
    total_token_count: usize,
}

impl LLMSession {
    /// Creates a new `LLMSession` with the given client and system prompt.
    /// Initializes the conversation history and sets a default maximum token limit.
    pub fn new(client: Arc<dyn ClientWrapper>, system_prompt: String, max_tokens: usize) -> Self {
        let system_prompt_message = Message {
            role: Role::System,
            content: system_prompt,
        };
        LLMSession {
            client,
            system_prompt: system_prompt_message,
            conversation_history: Vec::new(),
            max_tokens,
            total_input_tokens: 0,
            total_output_tokens: 0,
            total_token_count: 0,
        }
    }

    /// Sends a user/system message, receives the assistant's reply, and
    /// automatically:
    /// 1. Adds the system prompt + message to history
    /// 2. Calls into your client's `send_message(...)`
    /// 3. Pulls real token usage via `client.get_last_usage()`
    /// 4. Updates `total_input_tokens`, `total_output_tokens`
    /// 5. Prunes oldest messages if `total_token_count > max_tokens`
    ///
    /// Returns the assistant's `Message`; call `session.token_usage()`
    /// to see your cumulative usage.
    pub async fn send_message(
        &mut self,
        role: Role,
        content: String,
    ) -> Result<Message, Box<dyn std::error::Error>> {
        let message = Message { role, content };

        // Add the new message to the conversation history
        self.conversation_history.push(message);

        // Temporarily add the system prompt to the start of the conversation history
        self.conversation_history
            .insert(0, self.system_prompt.clone());

        // Send the messages to the LLM
        let response = self.client.send_message(&self.conversation_history).await?;

        // Remove the system prompt from the conversation history
        self.conversation_history.remove(0);

        if let Some(usage) = self.client.get_last_usage() {
            // Update the total token counts based on the usage
            self.total_input_tokens = usage.input_tokens;
            self.total_output_tokens = usage.output_tokens;
            self.total_token_count = usage.total_tokens;

            // Trim the conversation history again after adding the response
            if self.total_token_count > self.max_tokens {
                // How many tokens we're over by
                let mut excess = self.total_token_count - self.max_tokens;

                // Remove the oldest messages until we've cleared at least `excess` tokens
                while excess > 0 && !self.conversation_history.is_empty() {
                    let msg = self.conversation_history.remove(0);
                    let removed = estimate_message_token_count(&msg);
                    excess = excess.saturating_sub(removed);
                }
            }
        }

        // Add the LLM's response to the conversation history
        self.conversation_history.push(response.clone());

        Ok(response)
    }

    /// Sets a new system prompt for the session.
    pub fn set_system_prompt(&mut self, prompt: String) {
        self.system_prompt = Message {
            role: Role::System,
            content: prompt,
        };
    }

    /// Clears the rolling conversation history while keeping the system prompt.
    pub fn clear_history(&mut self) {
        self.conversation_history.clear();
    }

    /// The messages exchanged so far (system prompt excluded).
    pub fn history(&self) -> &[Message] {
        &self.conversation_history
    }

    /// The wrapped provider client.
    pub fn client(&self) -> &Arc<dyn ClientWrapper> {
        &self.client
    }

    /// Returns the current token usage statistics
    pub fn token_usage(&self) -> client_wrapper::TokenUsage {
        client_wrapper::TokenUsage {
            input_tokens: self.total_input_tokens,
            output_tokens: self.total_output_tokens,
            total_tokens: self.total_token_count,
        }
    }

    pub fn get_max_tokens(&self) -> usize {
        self.max_tokens
    }
}

/// Estimates the number of tokens in a string.
/// Uses an approximate formula: one token per 4 characters.
fn estimate_token_count(text: &str) -> usize {
    (text.len() / 4).max(1)
}

/// Estimates the number of tokens in a Message, including role annotations.
fn estimate_message_token_count(message: &Message) -> usize {
    // Assuming the role adds some fixed number of tokens, e.g., 1 token
    let role_token_count = 1;
    let content_token_count = estimate_token_count(&message.content);
    role_token_count + content_token_count
}
