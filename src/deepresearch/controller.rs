//! The bounded research loop.
//!
//! [`ResearchLoopController`] owns one pass of plan → search → rate → reflect →
//! (optional single refinement) → cite → synthesize, and enforces every budget
//! along the way:
//!
//! - at most [`MAX_SUB_QUERIES`] searches per cycle,
//! - at most [`MAX_CYCLES`] cycles per query (the second only when reflection
//!   reports a gap with follow-up queries),
//! - at most [`MAX_SEARCHES_PER_QUERY`] searches total,
//! - a per-search timeout with exactly one retry, after which placeholder data
//!   is substituted,
//! - a whole-query deadline checked cooperatively between phases; once it
//!   expires the loop stops searching and synthesizes from whatever it has.
//!
//! The controller never returns an error to the caller. Every failure path
//! degrades into an [`Answer`] with `degraded = true`, down to the fixed
//! no-sufficient-data response when nothing usable was collected.
//!
//! All AI-shaped steps come in through the capability traits, so the whole loop
//! runs deterministically under mocks; see `tests/research_loop_tests.rs`.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Instant;

use tokio::time::{sleep, timeout};

use crate::deepresearch::capabilities::{
    CitationFormatter, QueryPlanner, ReflectionAnalyst, SourceRater, Synthesizer,
    SynthesisRequest,
};
use crate::deepresearch::config::ResearchConfig;
use crate::deepresearch::event::{EventHandler, ResearchEvent};
use crate::deepresearch::research::{
    Answer, CredibilityTier, ResearchPlan, ResearchSession, SearchResult, MAX_CYCLES,
};
use crate::deepresearch::search::{placeholder_results, SearchProvider};

/// How much of the user query is carried in `QueryStarted` events.
const QUERY_PREVIEW_CHARS: usize = 120;

/// Drives one research query end to end within fixed budgets.
pub struct ResearchLoopController {
    planner: Box<dyn QueryPlanner>,
    rater: Box<dyn SourceRater>,
    analyst: Box<dyn ReflectionAnalyst>,
    citation_formatter: Box<dyn CitationFormatter>,
    synthesizer: Box<dyn Synthesizer>,
    search: Arc<dyn SearchProvider>,
    config: ResearchConfig,
    event_handler: Option<Arc<dyn EventHandler>>,
}

impl ResearchLoopController {
    pub fn new(
        planner: Box<dyn QueryPlanner>,
        rater: Box<dyn SourceRater>,
        analyst: Box<dyn ReflectionAnalyst>,
        citation_formatter: Box<dyn CitationFormatter>,
        synthesizer: Box<dyn Synthesizer>,
        search: Arc<dyn SearchProvider>,
        config: ResearchConfig,
    ) -> Self {
        Self {
            planner,
            rater,
            analyst,
            citation_formatter,
            synthesizer,
            search,
            config,
            event_handler: None,
        }
    }

    /// Register an [`EventHandler`] receiving every loop event.
    pub fn with_event_handler(mut self, handler: Arc<dyn EventHandler>) -> Self {
        self.event_handler = Some(handler);
        self
    }

    /// Answer one top-level query.
    ///
    /// Always produces an answer; failures degrade rather than propagate. The
    /// returned [`ResearchSession`] carries the full trace (plans, results,
    /// reflections, counters) with `answer` set.
    pub async fn run_query(&mut self, conversation_id: &str, query: &str) -> ResearchSession {
        self.reset_capabilities();

        let mut session = ResearchSession::new(conversation_id, query);
        let deadline = Instant::now() + self.config.query_deadline;

        self.emit(ResearchEvent::QueryStarted {
            query_id: session.query_id.clone(),
            query_preview: preview(query),
        })
        .await;

        let mut deadline_expired = false;

        for cycle in 1..=MAX_CYCLES {
            let plan = self.plan_for_cycle(&session, cycle, query).await;
            self.emit(ResearchEvent::PlanCreated {
                query_id: session.query_id.clone(),
                cycle,
                sub_queries: plan.sub_queries.clone(),
            })
            .await;

            let cycle_start = session.results.len();
            for sub_query in &plan.sub_queries {
                if session.searches_remaining() == 0 {
                    break;
                }
                if Instant::now() >= deadline {
                    deadline_expired = true;
                    break;
                }

                self.emit(ResearchEvent::SearchStarted {
                    query_id: session.query_id.clone(),
                    cycle,
                    sub_query: sub_query.clone(),
                })
                .await;

                let (results, degraded) = self.search_with_retry(sub_query).await;
                session.searches_issued += 1;
                if degraded {
                    session.searches_degraded += 1;
                }

                self.emit(ResearchEvent::SearchCompleted {
                    query_id: session.query_id.clone(),
                    cycle,
                    sub_query: sub_query.clone(),
                    result_count: results.len(),
                    degraded,
                })
                .await;

                session.results.extend(results);
            }
            session.plans.push(plan);

            if deadline_expired {
                break;
            }

            self.rate_cycle(&mut session, cycle_start).await;
            self.emit(ResearchEvent::SourcesRated {
                query_id: session.query_id.clone(),
                cycle,
                rated: session.results.len() - cycle_start,
            })
            .await;

            let reflection = match self.analyst.reflect(query, &session.results).await {
                Ok(outcome) => outcome,
                Err(err) => {
                    log::warn!(
                        "[{}] reflection failed ({}); treating as no additional cycle",
                        session.query_id,
                        err
                    );
                    Default::default()
                }
            };
            let wants_refinement = reflection.needs_another_cycle();
            self.emit(ResearchEvent::ReflectionCompleted {
                query_id: session.query_id.clone(),
                cycle,
                gaps: reflection.gaps.len(),
                conflicts: reflection.conflicts.len(),
                needs_another_cycle: wants_refinement,
            })
            .await;
            session.reflections.push(reflection);

            let can_refine = cycle < MAX_CYCLES
                && wants_refinement
                && session.searches_remaining() > 0
                && Instant::now() < deadline;
            if !can_refine {
                break;
            }
            self.emit(ResearchEvent::RefinementStarted {
                query_id: session.query_id.clone(),
            })
            .await;
        }

        if deadline_expired {
            self.emit(ResearchEvent::DeadlineExpired {
                query_id: session.query_id.clone(),
            })
            .await;
        }

        let answer = self.synthesize(&session, deadline_expired).await;
        self.emit(ResearchEvent::AnswerReady {
            query_id: session.query_id.clone(),
            citations: answer.citations.len(),
            degraded: answer.degraded,
            searches_issued: session.searches_issued,
        })
        .await;

        session.answer = Some(answer);
        session
    }

    /// Plan for the given cycle: the planner for cycle 1, reflection's
    /// follow-up queries for the refinement cycle.
    async fn plan_for_cycle(
        &mut self,
        session: &ResearchSession,
        cycle: usize,
        query: &str,
    ) -> ResearchPlan {
        if cycle > 1 {
            let follow_ups = session
                .reflections
                .last()
                .map(|r| r.follow_up_queries.clone())
                .unwrap_or_default();
            return ResearchPlan::new(query, follow_ups);
        }

        match self.planner.plan(query).await {
            Ok(plan) if !plan.sub_queries.is_empty() => plan,
            Ok(_) | Err(_) => {
                // Planner failed or produced nothing; search the raw query once.
                ResearchPlan::new(query, vec![query.to_string()])
            }
        }
    }

    /// One search with a per-attempt timeout and a single retry after a pause.
    /// When both attempts fail, substitutes the placeholder set.
    async fn search_with_retry(&self, sub_query: &str) -> (Vec<SearchResult>, bool) {
        for attempt in 0..2 {
            if attempt > 0 {
                sleep(self.config.retry_pause).await;
            }
            match timeout(self.config.search_timeout, self.search.search(sub_query)).await {
                Ok(Ok(results)) => return (results, false),
                Ok(Err(err)) => {
                    log::warn!("search '{}' attempt {} failed: {}", sub_query, attempt + 1, err);
                }
                Err(_) => {
                    log::warn!("search '{}' attempt {} timed out", sub_query, attempt + 1);
                }
            }
        }
        (placeholder_results(), true)
    }

    /// Assign tiers to the results collected this cycle. A rating failure tiers
    /// everything `Low`, which keeps unvetted sources out of the citations.
    async fn rate_cycle(&mut self, session: &mut ResearchSession, cycle_start: usize) {
        let cycle_results = &session.results[cycle_start..];
        if cycle_results.is_empty() {
            return;
        }

        let tiers = match self.rater.rate(cycle_results).await {
            Ok(tiers) if tiers.len() == cycle_results.len() => tiers,
            Ok(_) | Err(_) => {
                log::warn!("source rating failed; tiering {} results Low", cycle_results.len());
                vec![CredibilityTier::Low; cycle_results.len()]
            }
        };
        for (result, tier) in session.results[cycle_start..].iter_mut().zip(tiers) {
            result.tier = Some(tier);
        }
    }

    /// Cite and synthesize. Citations draw only on High/Medium sources,
    /// deduplicated by URL; everything still informs the answer text.
    async fn synthesize(&mut self, session: &ResearchSession, deadline_expired: bool) -> Answer {
        let citable = dedup_citable(&session.results);
        let citations = if citable.is_empty() {
            Vec::new()
        } else {
            match self.citation_formatter.format(&citable).await {
                Ok(citations) => citations,
                Err(err) => {
                    log::warn!("[{}] citation formatting failed: {}", session.query_id, err);
                    Vec::new()
                }
            }
        };

        let degraded =
            deadline_expired || session.searches_degraded > 0 || session.results.is_empty();

        if session.results.is_empty() {
            return Answer::no_sufficient_data();
        }

        let request = SynthesisRequest {
            query: &session.query,
            results: &session.results,
            reflections: &session.reflections,
            citations: &citations,
        };
        match self.synthesizer.synthesize(&request).await {
            Ok(text) => Answer {
                text,
                citations,
                degraded,
            },
            Err(err) => {
                log::warn!("[{}] synthesis failed: {}", session.query_id, err);
                Answer::no_sufficient_data()
            }
        }
    }

    /// Every query starts with fresh capability agents; research context never
    /// crosses top-level queries.
    fn reset_capabilities(&mut self) {
        self.planner.reset();
        self.rater.reset();
        self.analyst.reset();
        self.citation_formatter.reset();
        self.synthesizer.reset();
    }

    async fn emit(&self, event: ResearchEvent) {
        if let Some(handler) = &self.event_handler {
            handler.on_research_event(&event).await;
        }
    }
}

/// Keep one result per URL, High/Medium tiers only, input order preserved.
fn dedup_citable(results: &[SearchResult]) -> Vec<SearchResult> {
    let mut seen: HashSet<&str> = HashSet::new();
    results
        .iter()
        .filter(|r| r.tier.map(CredibilityTier::citable).unwrap_or(false))
        .filter(|r| seen.insert(r.url.as_str()))
        .cloned()
        .collect()
}

fn preview(query: &str) -> String {
    query.chars().take(QUERY_PREVIEW_CHARS).collect()
}
