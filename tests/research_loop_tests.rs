use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use deepresearch::capabilities::{
    CapabilityResult, CitationFormatter, LlmQueryPlanner, QueryPlanner, ReflectionAnalyst,
    SourceRater, SynthesisRequest, Synthesizer,
};
use deepresearch::client_wrapper::{ClientWrapper, Message, Role};
use deepresearch::event::{EventHandler, ResearchEvent};
use deepresearch::research::{
    Answer, Citation, CredibilityTier, ReflectionOutcome, ResearchPlan, SearchResult,
    SourceConflict, MAX_SEARCHES_PER_QUERY,
};
use deepresearch::search::SearchProvider;
use deepresearch::{ResearchConfig, ResearchLoopController};

// ── Deterministic capability mocks ──────────────────────────────────────────

struct FixedPlanner {
    sub_queries: Vec<String>,
}

#[async_trait]
impl QueryPlanner for FixedPlanner {
    async fn plan(&mut self, objective: &str) -> CapabilityResult<ResearchPlan> {
        Ok(ResearchPlan::new(objective, self.sub_queries.clone()))
    }
}

struct ErrPlanner;

#[async_trait]
impl QueryPlanner for ErrPlanner {
    async fn plan(&mut self, _objective: &str) -> CapabilityResult<ResearchPlan> {
        Err("planner unavailable".into())
    }
}

struct TierRater {
    tier: CredibilityTier,
}

#[async_trait]
impl SourceRater for TierRater {
    async fn rate(&mut self, results: &[SearchResult]) -> CapabilityResult<Vec<CredibilityTier>> {
        Ok(vec![self.tier; results.len()])
    }
}

/// Returns a wrong-length rating vector, which the loop must treat as a failure.
struct BadRater;

#[async_trait]
impl SourceRater for BadRater {
    async fn rate(&mut self, _results: &[SearchResult]) -> CapabilityResult<Vec<CredibilityTier>> {
        Ok(Vec::new())
    }
}

/// Pops one scripted outcome per reflection call, defaulting once exhausted.
struct ScriptedAnalyst {
    outcomes: Mutex<Vec<ReflectionOutcome>>,
}

impl ScriptedAnalyst {
    fn new(outcomes: Vec<ReflectionOutcome>) -> Self {
        Self {
            outcomes: Mutex::new(outcomes),
        }
    }
}

#[async_trait]
impl ReflectionAnalyst for ScriptedAnalyst {
    async fn reflect(
        &mut self,
        _objective: &str,
        _results: &[SearchResult],
    ) -> CapabilityResult<ReflectionOutcome> {
        let mut outcomes = self.outcomes.lock().unwrap();
        if outcomes.is_empty() {
            Ok(ReflectionOutcome::default())
        } else {
            Ok(outcomes.remove(0))
        }
    }
}

struct PassthroughCitations;

#[async_trait]
impl CitationFormatter for PassthroughCitations {
    async fn format(&mut self, results: &[SearchResult]) -> CapabilityResult<Vec<Citation>> {
        Ok(results
            .iter()
            .map(|r| Citation {
                formatted: format!("{} (2025)", r.url),
                url: r.url.clone(),
                tier: r.tier.unwrap(),
            })
            .collect())
    }
}

/// Folds the finding count and every reported conflict into the answer text so
/// tests can assert on what actually reached synthesis.
struct RecordingSynthesizer;

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(&mut self, request: &SynthesisRequest<'_>) -> CapabilityResult<String> {
        let conflicts: Vec<String> = request
            .reflections
            .iter()
            .flat_map(|r| r.conflicts.iter().map(|c| c.describe()))
            .collect();
        Ok(format!(
            "synthesized from {} findings. {}",
            request.results.len(),
            conflicts.join("; ")
        ))
    }
}

struct ErrSynthesizer;

#[async_trait]
impl Synthesizer for ErrSynthesizer {
    async fn synthesize(&mut self, _request: &SynthesisRequest<'_>) -> CapabilityResult<String> {
        Err("model offline".into())
    }
}

// ── Search provider mocks ───────────────────────────────────────────────────

/// One unique result per sub-query, plus a call counter.
struct CountingSearch {
    calls: AtomicUsize,
}

impl CountingSearch {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl SearchProvider for CountingSearch {
    async fn search(
        &self,
        query: &str,
    ) -> Result<Vec<SearchResult>, Box<dyn std::error::Error + Send + Sync>> {
        let n = self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(vec![SearchResult::new(
            format!("https://example.com/{}-{}", n, query.len()),
            format!("snippet for '{}'", query),
        )])
    }
}

struct FailingSearch;

#[async_trait]
impl SearchProvider for FailingSearch {
    async fn search(
        &self,
        _query: &str,
    ) -> Result<Vec<SearchResult>, Box<dyn std::error::Error + Send + Sync>> {
        Err("connection refused".into())
    }
}

// ── Event collection ────────────────────────────────────────────────────────

struct CollectingHandler {
    events: Mutex<Vec<ResearchEvent>>,
}

impl CollectingHandler {
    fn new() -> Self {
        Self {
            events: Mutex::new(Vec::new()),
        }
    }

    fn snapshot(&self) -> Vec<ResearchEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[async_trait]
impl EventHandler for CollectingHandler {
    async fn on_research_event(&self, event: &ResearchEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}

// ── Helpers ─────────────────────────────────────────────────────────────────

fn test_config() -> ResearchConfig {
    ResearchConfig {
        search_timeout: Duration::from_millis(200),
        retry_pause: Duration::from_millis(1),
        query_deadline: Duration::from_secs(30),
        ..ResearchConfig::default()
    }
}

fn gap_outcome(follow_ups: Vec<&str>) -> ReflectionOutcome {
    ReflectionOutcome {
        gaps: vec!["missing cost data".to_string()],
        follow_up_queries: follow_ups.into_iter().map(String::from).collect(),
        ..ReflectionOutcome::default()
    }
}

fn controller_with(
    planner: Box<dyn QueryPlanner>,
    rater: Box<dyn SourceRater>,
    analyst: Box<dyn ReflectionAnalyst>,
    synthesizer: Box<dyn Synthesizer>,
    search: Arc<dyn SearchProvider>,
    config: ResearchConfig,
) -> (ResearchLoopController, Arc<CollectingHandler>) {
    let handler = Arc::new(CollectingHandler::new());
    let controller = ResearchLoopController::new(
        planner,
        rater,
        analyst,
        Box::new(PassthroughCitations),
        synthesizer,
        search,
        config,
    )
    .with_event_handler(handler.clone());
    (controller, handler)
}

// ── Tests ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn single_cycle_searches_once_per_sub_query_and_cites() {
    let (mut controller, handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["ev emissions".into(), "ev cost".into(), "ev range".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    let session = controller.run_query("conv", "benefits of electric cars").await;

    assert_eq!(session.plans.len(), 1);
    assert_eq!(session.searches_issued, 3);
    assert_eq!(session.searches_degraded, 0);
    assert_eq!(session.reflections.len(), 1);

    let answer = session.answer.unwrap();
    assert!(!answer.degraded);
    assert_eq!(answer.citations.len(), 3);
    assert!(answer.text.starts_with("synthesized from 3 findings"));

    let events = handler.snapshot();
    assert!(matches!(events.first(), Some(ResearchEvent::QueryStarted { .. })));
    assert!(matches!(events.last(), Some(ResearchEvent::AnswerReady { .. })));
    assert!(!events
        .iter()
        .any(|e| matches!(e, ResearchEvent::RefinementStarted { .. })));
}

#[tokio::test]
async fn gap_with_follow_ups_triggers_exactly_one_refinement() {
    let (mut controller, handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into(), "q2".into(), "q3".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::Medium,
        }),
        // Even a second gap report must not buy a third cycle.
        Box::new(ScriptedAnalyst::new(vec![
            gap_outcome(vec!["charging costs 2025", "resale value"]),
            gap_outcome(vec!["one more"]),
        ])),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    let session = controller.run_query("conv", "query").await;

    assert_eq!(session.plans.len(), 2);
    assert_eq!(session.plans[1].sub_queries.len(), 2);
    assert_eq!(session.searches_issued, 5);
    assert_eq!(session.reflections.len(), 2);

    let refinements = handler
        .snapshot()
        .iter()
        .filter(|e| matches!(e, ResearchEvent::RefinementStarted { .. }))
        .count();
    assert_eq!(refinements, 1);
}

#[tokio::test]
async fn follow_ups_without_gaps_do_not_refine() {
    let outcome = ReflectionOutcome {
        follow_up_queries: vec!["extra".to_string()],
        ..ReflectionOutcome::default()
    };
    let (mut controller, _handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(vec![outcome])),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    let session = controller.run_query("conv", "query").await;
    assert_eq!(session.plans.len(), 1);
    assert_eq!(session.searches_issued, 1);
}

#[tokio::test]
async fn search_budget_is_never_exceeded() {
    let search = Arc::new(CountingSearch::new());
    let (mut controller, _handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into(), "q2".into(), "q3".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        // Five follow-ups; the plan cap and the total budget must clamp them.
        Box::new(ScriptedAnalyst::new(vec![gap_outcome(vec![
            "f1", "f2", "f3", "f4", "f5",
        ])])),
        Box::new(RecordingSynthesizer),
        search.clone(),
        test_config(),
    );

    let session = controller.run_query("conv", "query").await;

    assert_eq!(session.searches_issued, MAX_SEARCHES_PER_QUERY);
    assert_eq!(search.calls.load(Ordering::SeqCst), MAX_SEARCHES_PER_QUERY);
}

#[tokio::test]
async fn failed_searches_fall_back_to_placeholder_data() {
    let config = ResearchConfig {
        search_timeout: Duration::from_millis(50),
        retry_pause: Duration::from_millis(1),
        ..test_config()
    };
    let (mut controller, _handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["only query".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(RecordingSynthesizer),
        Arc::new(FailingSearch),
        config,
    );

    let session = controller.run_query("conv", "query").await;

    assert_eq!(session.searches_issued, 1);
    assert_eq!(session.searches_degraded, 1);
    assert!(session.all_searches_degraded());
    assert!(!session.results.is_empty());
    assert!(session.results.iter().all(|r| r.placeholder));

    let answer = session.answer.unwrap();
    assert!(answer.degraded);
    assert!(!answer.text.is_empty());
    assert!(!answer.citations.is_empty());
}

#[tokio::test]
async fn low_tier_sources_are_never_cited() {
    let (mut controller, _handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into(), "q2".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::Low,
        }),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    let session = controller.run_query("conv", "query").await;
    let answer = session.answer.unwrap();
    assert!(answer.citations.is_empty());
    // Low sources still inform the synthesized text.
    assert!(answer.text.starts_with("synthesized from 2 findings"));
}

#[tokio::test]
async fn rating_failure_tiers_everything_low() {
    let (mut controller, _handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into()],
        }),
        Box::new(BadRater),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    let session = controller.run_query("conv", "query").await;
    assert!(session
        .results
        .iter()
        .all(|r| r.tier == Some(CredibilityTier::Low)));
    assert!(session.answer.unwrap().citations.is_empty());
}

#[tokio::test]
async fn synthesis_failure_degrades_to_fixed_answer() {
    let (mut controller, _handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(ErrSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    let session = controller.run_query("conv", "query").await;
    let answer = session.answer.unwrap();
    assert!(answer.degraded);
    assert_eq!(answer.text, Answer::no_sufficient_data().text);
}

#[tokio::test]
async fn expired_deadline_skips_searches_and_reports_it() {
    let config = ResearchConfig {
        query_deadline: Duration::from_secs(0),
        ..test_config()
    };
    let (mut controller, handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        config,
    );

    let session = controller.run_query("conv", "query").await;

    assert_eq!(session.searches_issued, 0);
    let answer = session.answer.unwrap();
    assert!(answer.degraded);

    assert!(handler
        .snapshot()
        .iter()
        .any(|e| matches!(e, ResearchEvent::DeadlineExpired { .. })));
}

#[tokio::test]
async fn conflicts_are_named_in_the_answer() {
    let outcome = ReflectionOutcome {
        conflicts: vec![SourceConflict {
            source_a: "mit.edu".to_string(),
            claim_a: "EVs cut emissions 60%".to_string(),
            source_b: "some-blog.com".to_string(),
            claim_b: "EVs pollute more".to_string(),
        }],
        ..ReflectionOutcome::default()
    };
    let (mut controller, _handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(vec![outcome])),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    let session = controller.run_query("conv", "query").await;
    let answer = session.answer.unwrap();
    assert!(answer
        .text
        .contains("mit.edu claims EVs cut emissions 60%, while some-blog.com claims EVs pollute more"));
}

#[tokio::test]
async fn planner_failure_falls_back_to_the_raw_query() {
    let (mut controller, _handler) = controller_with(
        Box::new(ErrPlanner),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    let session = controller.run_query("conv", "electric car adoption 2025").await;

    assert_eq!(session.plans[0].sub_queries, vec!["electric car adoption 2025"]);
    assert_eq!(session.searches_issued, 1);
}

/// Replays scripted LLM replies while recording every request batch it sees.
struct RecordingSequentialClient {
    responses: Vec<String>,
    index: AtomicUsize,
    seen: Mutex<Vec<Vec<Message>>>,
}

impl RecordingSequentialClient {
    fn new(responses: Vec<&str>) -> Arc<Self> {
        Arc::new(Self {
            responses: responses.into_iter().map(String::from).collect(),
            index: AtomicUsize::new(0),
            seen: Mutex::new(Vec::new()),
        })
    }
}

#[async_trait]
impl ClientWrapper for RecordingSequentialClient {
    async fn send_message(
        &self,
        messages: &[Message],
    ) -> Result<Message, Box<dyn std::error::Error>> {
        self.seen.lock().unwrap().push(messages.to_vec());
        let i = self.index.fetch_add(1, Ordering::SeqCst);
        let content = self
            .responses
            .get(i)
            .cloned()
            .ok_or("mock client ran out of scripted responses")?;
        Ok(Message {
            role: Role::Assistant,
            content,
        })
    }

    fn model_name(&self) -> &str {
        "mock"
    }
}

#[tokio::test]
async fn capability_agents_start_each_query_fresh() {
    let client = RecordingSequentialClient::new(vec![
        r#"{"queries": ["first topic sources"]}"#,
        r#"{"queries": ["second topic sources"]}"#,
    ]);
    let (mut controller, _handler) = controller_with(
        Box::new(LlmQueryPlanner::new(client.clone())),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(RecordingSynthesizer),
        Arc::new(CountingSearch::new()),
        test_config(),
    );

    controller.run_query("conv", "first topic").await;
    controller.run_query("conv", "second topic").await;

    let batches = client.seen.lock().unwrap();
    assert_eq!(batches.len(), 2);
    // The second planning request starts over: system prompt + the new query,
    // with nothing from the earlier exchange.
    assert_eq!(batches[1].len(), 2);
    assert_eq!(batches[1][0].role, Role::System);
    assert!(batches[1].iter().all(|m| !m.content.contains("first topic")));
}

#[tokio::test]
async fn duplicate_urls_are_cited_once() {
    struct SameUrlSearch;

    #[async_trait]
    impl SearchProvider for SameUrlSearch {
        async fn search(
            &self,
            _query: &str,
        ) -> Result<Vec<SearchResult>, Box<dyn std::error::Error + Send + Sync>> {
            Ok(vec![SearchResult::new("https://epa.gov", "snippet")])
        }
    }

    let (mut controller, _handler) = controller_with(
        Box::new(FixedPlanner {
            sub_queries: vec!["q1".into(), "q2".into(), "q3".into()],
        }),
        Box::new(TierRater {
            tier: CredibilityTier::High,
        }),
        Box::new(ScriptedAnalyst::new(Vec::new())),
        Box::new(RecordingSynthesizer),
        Arc::new(SameUrlSearch),
        test_config(),
    );

    let session = controller.run_query("conv", "query").await;
    assert_eq!(session.results.len(), 3);
    assert_eq!(session.answer.unwrap().citations.len(), 1);
}
