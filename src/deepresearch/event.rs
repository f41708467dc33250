//! Research loop event system.
//!
//! Provides a callback-based observability layer for the research loop. Implement
//! [`EventHandler`] to receive real-time notifications about:
//!
//! - **Query lifecycle**: acceptance, completion, deadline expiry
//! - **Planning**: the plan created for each cycle
//! - **Searches**: start, completion, retries exhausted into degraded mode
//! - **Rating and reflection**: per-cycle outcomes, gap detection
//! - **Refinement**: the single extra cycle being entered
//!
//! The handler is wrapped in `Arc<dyn EventHandler>` and registered on the
//! [`ResearchLoopController`](crate::ResearchLoopController) via
//! `with_event_handler`. The single method has a default no-op implementation, so
//! you only match on the variants you care about.
//!
//! # Example
//!
//! ```rust
//! use deepresearch::event::{EventHandler, ResearchEvent};
//! use async_trait::async_trait;
//!
//! struct MyHandler;
//!
//! #[async_trait]
//! impl EventHandler for MyHandler {
//!     async fn on_research_event(&self, event: &ResearchEvent) {
//!         match event {
//!             ResearchEvent::SearchStarted { sub_query, cycle, .. } => {
//!                 println!("searching '{}' (cycle {})", sub_query, cycle);
//!             }
//!             ResearchEvent::AnswerReady { degraded, .. } => {
//!                 println!("answer ready (degraded: {})", degraded);
//!             }
//!             _ => {}
//!         }
//!     }
//! }
//! ```

use async_trait::async_trait;

/// Events emitted by the [`ResearchLoopController`](crate::ResearchLoopController)
/// while answering one top-level query.
///
/// Every variant carries the `query_id` assigned when the query was accepted, so
/// handlers can correlate events without external state.
///
/// # Event Flow (for a typical two-cycle query)
///
/// ```text
/// QueryStarted
///   └─ PlanCreated { cycle: 1 }
///   └─ SearchStarted / SearchCompleted   (×3)
///   └─ SourcesRated { cycle: 1 }
///   └─ ReflectionCompleted { cycle: 1, needs_another_cycle: true }
///   └─ RefinementStarted
///   └─ PlanCreated { cycle: 2 }
///   └─ SearchStarted / SearchCompleted   (×3)
///   └─ SourcesRated { cycle: 2 }
///   └─ ReflectionCompleted { cycle: 2, .. }
/// AnswerReady
/// ```
#[derive(Debug, Clone)]
pub enum ResearchEvent {
    /// Fired when the controller accepts a query and opens a research session.
    QueryStarted {
        query_id: String,
        /// First ~120 characters of the user query, useful for logging.
        query_preview: String,
    },

    /// A plan was produced for the given cycle (1 = initial, 2 = refinement).
    PlanCreated {
        query_id: String,
        cycle: usize,
        sub_queries: Vec<String>,
    },

    /// A search is about to be issued for one sub-query.
    SearchStarted {
        query_id: String,
        cycle: usize,
        sub_query: String,
    },

    /// A search finished. `degraded` is true when both attempts failed and
    /// placeholder data was substituted.
    SearchCompleted {
        query_id: String,
        cycle: usize,
        sub_query: String,
        result_count: usize,
        degraded: bool,
    },

    /// Every result collected in this cycle has been assigned a credibility tier.
    SourcesRated {
        query_id: String,
        cycle: usize,
        rated: usize,
    },

    /// Reflection over the cycle's aggregate completed. When
    /// `needs_another_cycle` is true and this was the first cycle, the
    /// controller will run exactly one refinement cycle.
    ReflectionCompleted {
        query_id: String,
        cycle: usize,
        gaps: usize,
        conflicts: usize,
        needs_another_cycle: bool,
    },

    /// The single gap-driven refinement cycle is starting.
    RefinementStarted { query_id: String },

    /// The whole-query deadline expired between phases; the controller is
    /// proceeding straight to synthesis with partial data.
    DeadlineExpired { query_id: String },

    /// The final answer is ready to be returned to the user.
    AnswerReady {
        query_id: String,
        citations: usize,
        degraded: bool,
        searches_issued: usize,
    },
}

/// Callback interface for observing the research loop.
///
/// The method has a default no-op implementation, so implementors only
/// override what they need. Handlers must be cheap or hand the event off —
/// they run inline on the loop's task.
#[async_trait]
pub trait EventHandler: Send + Sync {
    async fn on_research_event(&self, _event: &ResearchEvent) {}
}

/// An [`EventHandler`] that forwards every event to the [`log`] crate at
/// `info` level (searches and degradations at `warn` when they degrade).
pub struct LogHandler;

#[async_trait]
impl EventHandler for LogHandler {
    async fn on_research_event(&self, event: &ResearchEvent) {
        match event {
            ResearchEvent::SearchCompleted {
                query_id,
                sub_query,
                degraded: true,
                ..
            } => {
                log::warn!(
                    "[{}] search '{}' exhausted retries; substituted placeholder data",
                    query_id,
                    sub_query
                );
            }
            ResearchEvent::DeadlineExpired { query_id } => {
                log::warn!("[{}] query deadline expired; synthesizing partial data", query_id);
            }
            other => {
                log::info!("{:?}", other);
            }
        }
    }
}
