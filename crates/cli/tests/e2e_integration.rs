//! End-to-end integration tests for the Stepwise agent.
//!
//! These tests run the full pipeline from user query to answer: system
//! prompt, context rendering, response parsing, real built-in tools, and the
//! loop controller, with only the model service scripted.

use std::sync::{Arc, Mutex};

use serde_json::json;
use stepwise_agent::{LoopOutcome, ReactEngine};
use stepwise_core::error::ProviderError;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::message::Message;
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse, Usage};
use stepwise_core::tool::{FailureKind, ToolRegistry};
use stepwise_tools::{MemoryStore, default_registry};

// ── Mock Provider ────────────────────────────────────────────────────────

/// Replays scripted replies; optionally fails on a given call.
struct ScriptedProvider {
    replies: Vec<String>,
    fail_on: Option<usize>,
    call_count: Mutex<usize>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedProvider {
    fn new(replies: &[&str]) -> Self {
        Self {
            replies: replies.iter().map(|r| r.to_string()).collect(),
            fail_on: None,
            call_count: Mutex::new(0),
            prompts: Mutex::new(Vec::new()),
        }
    }

    fn failing_on(mut self, call: usize) -> Self {
        self.fail_on = Some(call);
        self
    }

    fn calls(&self) -> usize {
        *self.call_count.lock().unwrap()
    }

    fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl Provider for ScriptedProvider {
    fn name(&self) -> &str {
        "e2e_mock"
    }

    async fn complete(&self, request: ProviderRequest) -> Result<ProviderResponse, ProviderError> {
        let mut count = self.call_count.lock().unwrap();
        let call = *count;
        *count += 1;

        if let Some(user) = request.messages.last() {
            self.prompts.lock().unwrap().push(user.content.clone());
        }

        if self.fail_on == Some(call) {
            return Err(ProviderError::AuthenticationFailed("invalid api key".into()));
        }

        let text = self
            .replies
            .get(call)
            .or_else(|| self.replies.last())
            .cloned()
            .unwrap_or_default();

        Ok(ProviderResponse {
            message: Message::assistant(text),
            usage: Some(Usage {
                prompt_tokens: 20,
                completion_tokens: 10,
                total_tokens: 30,
            }),
            model: "e2e-model".into(),
        })
    }
}

fn engine_with(provider: Arc<ScriptedProvider>, max_steps: usize) -> ReactEngine {
    let tools = Arc::new(default_registry(MemoryStore::new()).unwrap());
    ReactEngine::new(provider, "e2e-model", tools, Arc::new(EventBus::default()))
        .with_agent_id("e2e-agent")
        .with_max_steps(max_steps)
}

// ── Scenarios ────────────────────────────────────────────────────────────

#[tokio::test]
async fn calculator_question_is_answered_in_two_steps() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "Thought: I should compute this.\nAction: calculator\nAction Input: {\"expression\": \"2+2\"}",
        "Thought: The calculator returned 4.\nFinal Answer: The answer is 4.",
    ]));
    let mut engine = engine_with(provider.clone(), 10);

    let answer = engine.process("What is 2+2?").await.unwrap();
    assert_eq!(answer, "The answer is 4.");

    let summary = engine.get_execution_summary();
    assert_eq!(summary.agent_id, "e2e-agent");
    assert_eq!(summary.step_count, 2);
    assert!(summary.completed);
    assert_eq!(summary.usage.total_tokens, 60);
    assert_eq!(
        summary.capabilities,
        vec!["calculator", "get_weather", "text_analyzer", "current_time", "memory_store"]
    );

    let outcome = summary.steps[0].outcome().unwrap();
    assert_eq!(outcome.data().unwrap(), &json!({"expression": "2+2", "result": 4}));

    let prompts = provider.prompts();
    assert_eq!(prompts[0], "User question: What is 2+2?");
    assert!(prompts[1].contains("Observation: Tool execution succeeded:\nexpression: 2+2\nresult: 4"));
}

#[tokio::test]
async fn always_unparseable_exhausts_budget_of_three() {
    let provider = Arc::new(ScriptedProvider::new(&["Hmm, let me think about that some more."]));
    let mut engine = engine_with(provider.clone(), 3);

    let outcome = engine.run("What is the meaning of life?").await.unwrap();
    assert!(matches!(outcome, LoopOutcome::BudgetExhausted { .. }));
    assert_eq!(provider.calls(), 3);

    let summary = engine.get_execution_summary();
    assert!(!summary.completed);
    assert!(summary.final_answer.is_none());
    assert_eq!(summary.step_count, 3);
    assert!(summary.steps.iter().all(|s| s.outcome().is_none()));
}

#[tokio::test]
async fn unknown_capability_continues_to_round_two() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "Thought: I will translate.\nAction: translate\nAction Input: {\"text\": \"bonjour\"}",
        "Thought: There is no translator.\nFinal Answer: Bonjour means hello.",
    ]));
    let mut engine = engine_with(provider.clone(), 10);

    let answer = engine.process("Translate bonjour").await.unwrap();
    assert_eq!(answer, "Bonjour means hello.");
    assert_eq!(provider.calls(), 2);

    let first = &engine.get_execution_summary().steps[0];
    assert_eq!(first.outcome().unwrap().category(), Some(FailureKind::NotFound));
    let observation = first.observation.as_deref().unwrap();
    assert!(observation.contains("capability not found: 'translate'"));
    assert!(observation.contains("calculator, get_weather"));
}

#[tokio::test]
async fn model_failure_on_round_one_returns_message() {
    let provider = Arc::new(ScriptedProvider::new(&["unused"]).failing_on(0));
    let mut engine = engine_with(provider.clone(), 10);

    let answer = engine.process("What is 2+2?").await.unwrap();
    assert!(answer.contains("invalid api key"));
    assert_eq!(provider.calls(), 1);

    let summary = engine.get_execution_summary();
    assert_eq!(summary.step_count, 0);
    assert!(!summary.completed);
}

#[tokio::test]
async fn model_failure_mid_run_keeps_partial_state() {
    let provider = Arc::new(
        ScriptedProvider::new(&[
            "Thought: Weather first.\nAction: get_weather\nAction Input: {\"city\": \"Paris\"}",
        ])
        .failing_on(1),
    );
    let mut engine = engine_with(provider, 10);

    let outcome = engine.run("Weather in Paris?").await.unwrap();
    assert!(matches!(
        outcome,
        LoopOutcome::ModelFailure {
            error: ProviderError::AuthenticationFailed(_),
            ..
        }
    ));
    let summary = engine.get_execution_summary();
    assert_eq!(summary.step_count, 1);
    assert_eq!(summary.steps[0].capability(), Some("get_weather"));
}

// ── Tools through the loop ───────────────────────────────────────────────

#[tokio::test]
async fn memory_store_persists_across_queries_in_one_session() {
    let store = MemoryStore::new();
    let tools = Arc::new(default_registry(store.clone()).unwrap());
    let provider = Arc::new(ScriptedProvider::new(&[
        "Thought: Save it.\nAction: memory_store\nAction Input: {\"key\": \"color\", \"value\": \"green\"}",
        "Final Answer: Noted.",
        "Thought: Recall it.\nAction: memory_store\nAction Input: {\"key\": \"color\", \"operation\": \"get\"}",
        "Final Answer: Your favorite color is green.",
    ]));
    let mut engine = ReactEngine::new(provider, "e2e-model", tools, Arc::new(EventBus::default()));

    assert_eq!(engine.process("My favorite color is green").await.unwrap(), "Noted.");
    assert_eq!(store.get("color").await.as_deref(), Some("green"));

    let answer = engine.process("What is my favorite color?").await.unwrap();
    assert_eq!(answer, "Your favorite color is green.");
    let recalled = engine.get_execution_summary().steps[0].outcome().unwrap().clone();
    assert_eq!(recalled.data().unwrap()["value"], "green");
}

#[tokio::test]
async fn sloppy_formatting_still_dispatches() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "**Thought:** check the weather\n**Action:** `get_weather`\n**Action Input:**\n```json\n{'city': 'Tokyo', 'units': 'imperial'}\n```",
        "## Final Answer: It is mild in Tokyo.",
    ]));
    let mut engine = engine_with(provider, 5);

    let answer = engine.process("Weather in Tokyo?").await.unwrap();
    assert_eq!(answer, "It is mild in Tokyo.");

    let step = &engine.get_execution_summary().steps[0];
    assert_eq!(step.thought, "check the weather");
    let data = step.outcome().unwrap().data().unwrap().clone();
    assert_eq!(data["city"], "Tokyo");
    assert_eq!(data["units"], "°F");
}

#[tokio::test]
async fn validation_failures_are_observed() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "Thought: Analyze.\nAction: text_analyzer\nAction Input: {\"text\": \"hi\", \"analysis_type\": \"grammar\"}",
        "Final Answer: I could not analyze that.",
    ]));
    let mut engine = engine_with(provider, 5);
    engine.process("Analyze 'hi'").await.unwrap();

    let step = &engine.get_execution_summary().steps[0];
    assert_eq!(step.outcome().unwrap().category(), Some(FailureKind::Validation));
    assert!(step
        .observation
        .as_deref()
        .unwrap()
        .starts_with("Tool execution failed (validation): invalid parameters for 'text_analyzer'"));
}

#[tokio::test]
async fn registry_is_shared_between_engines() {
    let tools = Arc::new(default_registry(MemoryStore::new()).unwrap());
    let bus = Arc::new(EventBus::default());

    let a = Arc::new(ScriptedProvider::new(&["Final Answer: A"]));
    let b = Arc::new(ScriptedProvider::new(&["Final Answer: B"]));
    let mut first = ReactEngine::new(a, "m", tools.clone(), bus.clone());
    let mut second = ReactEngine::new(b, "m", tools.clone(), bus);

    let (x, y) = tokio::join!(first.process("a"), second.process("b"));
    assert_eq!(x.unwrap(), "A");
    assert_eq!(y.unwrap(), "B");
    assert_eq!(Arc::strong_count(&tools), 3);
}

#[tokio::test]
async fn telemetry_sees_every_step() {
    let provider = Arc::new(ScriptedProvider::new(&[
        "Thought: Time.\nAction: current_time\nAction Input: {\"timezone\": \"utc\"}",
        "Final Answer: Done.",
    ]));
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let tools = Arc::new(default_registry(MemoryStore::new()).unwrap());
    let mut engine = ReactEngine::new(provider, "e2e-model", tools, bus);

    engine.process("What time is it?").await.unwrap();

    let mut steps = Vec::new();
    let mut last_phase = None;
    while let Ok(event) = rx.try_recv() {
        match event.as_ref() {
            DomainEvent::StepRecorded { step, .. } => steps.push(step.clone()),
            DomainEvent::StateChanged { to, .. } => last_phase = Some(*to),
            _ => {}
        }
    }
    assert_eq!(steps, engine.get_execution_summary().steps);
    assert_eq!(last_phase, Some(stepwise_core::LoopPhase::Concluding));
}

#[tokio::test]
async fn empty_registry_is_rejected() {
    let provider = Arc::new(ScriptedProvider::new(&["Final Answer: x"]));
    let mut engine = ReactEngine::new(
        provider.clone(),
        "e2e-model",
        Arc::new(ToolRegistry::new()),
        Arc::new(EventBus::default()),
    );
    assert!(engine.process("hello").await.is_err());
    assert_eq!(provider.calls(), 0);
}
