//! Interactive research chatbot.
//!
//! Reads `GEMINI_API_KEY` and `TAVILY_API_KEY` from the environment (failing fast
//! when either is missing), then runs a stdin chat loop: greetings are answered
//! directly, research queries go through the bounded research loop, and `exit`
//! clears the conversation transcript before quitting.
//!
//! Run from the repo root:
//!
//! ```text
//! GEMINI_API_KEY=... TAVILY_API_KEY=... cargo run --bin research_chat
//! ```

use std::io::{self, Write};
use std::process;
use std::sync::Arc;

use tokio::time::timeout;
use uuid::Uuid;

use deepresearch::capabilities::{
    LlmCitationFormatter, LlmQueryPlanner, LlmQueryTriage, LlmReflectionAnalyst, LlmSourceRater,
    LlmSynthesizer, QueryTriage, TriageOutcome,
};
use deepresearch::client_wrapper::ClientWrapper;
use deepresearch::clients::gemini::GeminiClient;
use deepresearch::event::LogHandler;
use deepresearch::session_store::{SessionStore, Speaker};
use deepresearch::{ResearchConfig, ResearchLoopController, TavilyClient};

const TIMEOUT_MESSAGE: &str = "Request timed out. Please check your network and try again.";

#[tokio::main]
async fn main() {
    deepresearch::init_logger();

    let config = match ResearchConfig::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{}", err);
            process::exit(1);
        }
    };

    let llm: Arc<dyn ClientWrapper> = Arc::new(GeminiClient::new_with_base_url(
        &config.llm_api_key,
        &config.model,
        &config.llm_base_url,
    ));

    let mut triage = LlmQueryTriage::new(llm.clone());
    let store = SessionStore::new(config.session_dir.clone());
    let search = Arc::new(TavilyClient::new(config.search_api_key.clone()));

    // Outer hard stop for one user turn. The loop's own cooperative deadline
    // normally fires first; this catches an LLM call hanging past it.
    let turn_timeout = config.query_deadline * 2;

    let mut controller = ResearchLoopController::new(
        Box::new(LlmQueryPlanner::new(llm.clone())),
        Box::new(LlmSourceRater::new(llm.clone())),
        Box::new(LlmReflectionAnalyst::new(llm.clone())),
        Box::new(LlmCitationFormatter::new(llm.clone())),
        Box::new(LlmSynthesizer::new(llm.clone())),
        search,
        config,
    )
    .with_event_handler(Arc::new(LogHandler));

    let conversation_id = Uuid::new_v4().to_string();

    println!("Hi! I'm a research assistant. Ask me anything, or type 'exit' to quit.");

    loop {
        print!("\nYou: ");
        if io::stdout().flush().is_err() {
            break;
        }

        let mut line = String::new();
        match io::stdin().read_line(&mut line) {
            Ok(0) | Err(_) => break,
            Ok(_) => {}
        }
        let input = line.trim();
        if input.is_empty() {
            continue;
        }

        if input.eq_ignore_ascii_case("exit") {
            if let Err(err) = store.clear(&conversation_id) {
                log::warn!("failed to clear transcript: {}", err);
            }
            println!("Chatbot: Session cleared. Goodbye!");
            break;
        }

        if let Err(err) = store.append(&conversation_id, Speaker::User, input) {
            log::warn!("failed to record user input: {}", err);
        }

        let reply = match timeout(turn_timeout, handle_turn(&mut triage, &mut controller, &conversation_id, input))
            .await
        {
            Ok(reply) => reply,
            Err(_) => TIMEOUT_MESSAGE.to_string(),
        };

        println!("\nChatbot: {}", reply);
        if let Err(err) = store.append(&conversation_id, Speaker::Assistant, &reply) {
            log::warn!("failed to record response: {}", err);
        }
    }
}

/// Triage one input and, for research queries, run the full loop.
async fn handle_turn(
    triage: &mut LlmQueryTriage,
    controller: &mut ResearchLoopController,
    conversation_id: &str,
    input: &str,
) -> String {
    // Triage failures fall open into the research path, which tolerates odd input.
    let outcome = triage
        .triage(input)
        .await
        .unwrap_or(TriageOutcome::Research);

    match outcome {
        TriageOutcome::SmallTalk(reply) | TriageOutcome::Clarify(reply) => reply,
        TriageOutcome::Research => {
            let session = controller.run_query(conversation_id, input).await;
            match session.answer {
                Some(answer) => {
                    let mut text = answer.text;
                    if answer.degraded {
                        text.push_str(
                            "\n\n(Note: some results could not be fetched live, so parts of \
                             this answer rely on fallback data.)",
                        );
                    }
                    text
                }
                None => TIMEOUT_MESSAGE.to_string(),
            }
        }
    }
}
