//! ReAct engine: Thought, Action, Observation until a final answer.
//!
//! One round:
//!
//! 1. **Think**: send the system prompt and the rendered history to the model
//! 2. **Decide**: parse the reply into a [`ParsedStep`]
//! 3. **Act**: invoke the requested capability and record the observation,
//!    or record corrective feedback when the reply could not be parsed
//!
//! The loop ends on a final answer, a model-service failure, cancellation,
//! or when the step budget is spent. Every phase change and every recorded
//! step is published on the [`EventBus`].

use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use stepwise_core::agent::{LoopPhase, Step, StepKind};
use stepwise_core::error::ProviderError;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::message::Message;
use stepwise_core::provider::{Provider, ProviderRequest, ProviderResponse};
use stepwise_core::tool::ToolRegistry;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::context::{build_prompt, build_system_prompt};
use crate::parser::{self, ParsedStep};
use crate::state::LoopState;
use crate::summary::ExecutionSummary;

/// Thought recorded for a reply the parser could not read.
pub const UNPARSEABLE_THOUGHT: &str = "(the previous response could not be parsed)";

/// Observation fed back after an unparseable reply.
pub const FORMAT_REMINDER: &str = "The response could not be parsed, please follow the required format: \
     either 'Thought:' then 'Action:' then 'Action Input:' with a JSON object, \
     or 'Thought:' then 'Final Answer:'.";

/// Models tend to invent the observation; stop them before they do.
const STOP_SEQUENCE: &str = "\nObservation:";

const CANCELLED_MESSAGE: &str = "The request was cancelled before an answer was produced.";

/// Caller mistakes. Everything else ends in a [`LoopOutcome`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("query must not be empty")]
    EmptyQuery,

    #[error("no capabilities are registered")]
    NoCapabilities,
}

/// How a run ended.
#[derive(Debug, Clone)]
pub enum LoopOutcome {
    /// The model produced a final answer.
    Answer(String),
    /// The budget ran out; `partial` summarizes the thoughts so far.
    BudgetExhausted { partial: String },
    /// The model service failed; `message` is safe to show to users.
    ModelFailure {
        error: ProviderError,
        message: String,
    },
    Cancelled { message: String },
}

impl LoopOutcome {
    /// The user-facing text.
    pub fn text(&self) -> &str {
        match self {
            LoopOutcome::Answer(answer) => answer,
            LoopOutcome::BudgetExhausted { partial } => partial,
            LoopOutcome::ModelFailure { message, .. } => message,
            LoopOutcome::Cancelled { message } => message,
        }
    }

    pub fn into_text(self) -> String {
        match self {
            LoopOutcome::Answer(answer) => answer,
            LoopOutcome::BudgetExhausted { partial } => partial,
            LoopOutcome::ModelFailure { message, .. } => message,
            LoopOutcome::Cancelled { message } => message,
        }
    }

    pub fn is_answer(&self) -> bool {
        matches!(self, LoopOutcome::Answer(_))
    }
}

enum ThinkError {
    Model(ProviderError),
    Cancelled,
}

/// The loop controller.
pub struct ReactEngine {
    agent_id: String,
    provider: Arc<dyn Provider>,
    model: String,
    temperature: f32,
    max_tokens: Option<u32>,
    tools: Arc<ToolRegistry>,
    event_bus: Arc<EventBus>,
    model_timeout: Option<Duration>,
    cancel: CancellationToken,
    state: LoopState,
}

impl ReactEngine {
    /// Create an engine with a budget of 10 steps.
    pub fn new(
        provider: Arc<dyn Provider>,
        model: impl Into<String>,
        tools: Arc<ToolRegistry>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            agent_id: format!("agent-{}", Uuid::new_v4()),
            provider,
            model: model.into(),
            temperature: 0.1,
            max_tokens: None,
            tools,
            event_bus,
            model_timeout: None,
            cancel: CancellationToken::new(),
            state: LoopState::new(10),
        }
    }

    /// Set the step budget (at least 1).
    pub fn with_max_steps(mut self, max_steps: usize) -> Self {
        self.state.set_max_steps(max_steps);
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = temperature;
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn with_agent_id(mut self, agent_id: impl Into<String>) -> Self {
        self.agent_id = agent_id.into();
        self
    }

    /// Fail the run if the model does not answer within `timeout`.
    pub fn with_model_timeout(mut self, timeout: Duration) -> Self {
        self.model_timeout = Some(timeout);
        self
    }

    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    /// Install a new cancellation token and return a handle to it.
    ///
    /// A cancelled token stays cancelled, so interactive front-ends call
    /// this before every query.
    pub fn fresh_cancellation_token(&mut self) -> CancellationToken {
        self.cancel = CancellationToken::new();
        self.cancel.clone()
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    pub fn state(&self) -> &LoopState {
        &self.state
    }

    pub fn tools(&self) -> &ToolRegistry {
        &self.tools
    }

    /// Process a query and return the text to show the user: the answer,
    /// a partial-progress summary, or a model-failure message.
    pub async fn process(&mut self, query: &str) -> Result<String, EngineError> {
        Ok(self.run(query).await?.into_text())
    }

    /// Clear the state of the previous run.
    pub fn reset(&mut self) {
        self.state.reset();
    }

    pub fn get_execution_summary(&self) -> ExecutionSummary {
        ExecutionSummary::from_state(&self.agent_id, &self.state, self.tools.list_capabilities())
    }

    /// Run the loop for one query.
    pub async fn run(&mut self, query: &str) -> Result<LoopOutcome, EngineError> {
        let query = query.trim();
        if query.is_empty() {
            return Err(EngineError::EmptyQuery);
        }
        if self.tools.is_empty() {
            return Err(EngineError::NoCapabilities);
        }

        self.state.reset();
        let system_prompt = build_system_prompt(&self.tools);

        info!(
            agent_id = %self.agent_id,
            model = %self.model,
            max_steps = self.state.max_steps(),
            "ReAct loop starting"
        );

        loop {
            if self.cancel.is_cancelled() {
                return Ok(self.cancelled());
            }

            let Some(round) = self.state.begin_round() else {
                self.transition(LoopPhase::BudgetExhausted);
                warn!(
                    agent_id = %self.agent_id,
                    max_steps = self.state.max_steps(),
                    "Step budget exhausted without a final answer"
                );
                return Ok(LoopOutcome::BudgetExhausted {
                    partial: self.state.progress_summary(),
                });
            };

            self.transition(LoopPhase::Thinking);
            debug!(agent_id = %self.agent_id, step = round, "Asking the model");

            let response = match self.think(&system_prompt, query).await {
                Ok(response) => response,
                Err(ThinkError::Cancelled) => return Ok(self.cancelled()),
                Err(ThinkError::Model(error)) => return Ok(self.model_failed(error)),
            };

            if let Some(usage) = &response.usage {
                self.state.add_usage(usage);
                self.event_bus.publish(DomainEvent::ResponseGenerated {
                    agent_id: self.agent_id.clone(),
                    model: response.model.clone(),
                    tokens_used: usage.total_tokens,
                    timestamp: Utc::now(),
                });
            }

            self.transition(LoopPhase::Deciding);

            match parser::parse(&response.message.content) {
                ParsedStep::Terminal { thought, answer } => {
                    self.record(Step::terminal(round, thought, answer.clone()));
                    self.state.complete(answer.clone());
                    self.transition(LoopPhase::Concluding);
                    info!(agent_id = %self.agent_id, steps = round, "ReAct loop completed");
                    return Ok(LoopOutcome::Answer(answer));
                }
                ParsedStep::Action {
                    thought,
                    capability,
                    parameters,
                } => {
                    self.transition(LoopPhase::Acting);
                    let outcome = self.tools.invoke(&capability, parameters.clone()).await;

                    debug!(
                        agent_id = %self.agent_id,
                        step = round,
                        tool = %capability,
                        success = outcome.is_success(),
                        duration_ms = outcome.duration_ms,
                        "Capability invoked"
                    );
                    self.event_bus.publish(DomainEvent::ToolExecuted {
                        tool_name: capability.clone(),
                        success: outcome.is_success(),
                        duration_ms: outcome.duration_ms,
                        timestamp: Utc::now(),
                    });

                    let mut step = Step::action(round, thought, capability, parameters);
                    step.observation = Some(outcome.render_observation());
                    if let StepKind::Action { outcome: slot, .. } = &mut step.kind {
                        *slot = Some(outcome);
                    }
                    self.record(step);
                }
                ParsedStep::Unparseable { raw } => {
                    self.transition(LoopPhase::Retrying);
                    warn!(agent_id = %self.agent_id, step = round, "Model response could not be parsed");

                    let mut step = Step::malformed(round, raw);
                    step.thought = UNPARSEABLE_THOUGHT.to_string();
                    step.observation = Some(FORMAT_REMINDER.to_string());
                    self.record(step);
                }
            }
        }
    }

    async fn think(&self, system_prompt: &str, query: &str) -> Result<ProviderResponse, ThinkError> {
        let request = ProviderRequest {
            model: self.model.clone(),
            messages: vec![
                Message::system(system_prompt),
                Message::user(build_prompt(query, self.state.steps())),
            ],
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            stop: vec![STOP_SEQUENCE.to_string()],
        };

        let call = self.provider.complete(request);
        let bounded = async {
            match self.model_timeout {
                Some(limit) => tokio::time::timeout(limit, call).await.unwrap_or_else(|_| {
                    Err(ProviderError::Timeout(format!(
                        "no response within {}ms",
                        limit.as_millis()
                    )))
                }),
                None => call.await,
            }
        };

        tokio::select! {
            biased;
            _ = self.cancel.cancelled() => Err(ThinkError::Cancelled),
            result = bounded => result.map_err(ThinkError::Model),
        }
    }

    fn model_failed(&mut self, error: ProviderError) -> LoopOutcome {
        self.transition(LoopPhase::Failed);
        warn!(agent_id = %self.agent_id, error = %error, "Model service failed");
        self.event_bus.publish(DomainEvent::ErrorOccurred {
            context: format!("model call in step {}", self.state.rounds()),
            error_message: error.to_string(),
            timestamp: Utc::now(),
        });

        LoopOutcome::ModelFailure {
            message: format!(
                "Sorry, I ran into a problem while processing your request: {error}"
            ),
            error,
        }
    }

    fn cancelled(&mut self) -> LoopOutcome {
        self.transition(LoopPhase::Cancelled);
        info!(agent_id = %self.agent_id, step = self.state.rounds(), "ReAct loop cancelled");
        LoopOutcome::Cancelled {
            message: CANCELLED_MESSAGE.to_string(),
        }
    }

    fn record(&mut self, step: Step) {
        self.event_bus.publish(DomainEvent::StepRecorded {
            agent_id: self.agent_id.clone(),
            step: step.clone(),
        });
        self.state.record(step);
    }

    fn transition(&mut self, to: LoopPhase) {
        let from = self.state.set_phase(to);
        self.event_bus.publish(DomainEvent::StateChanged {
            agent_id: self.agent_id.clone(),
            from,
            to,
            step: self.state.rounds(),
            timestamp: Utc::now(),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_helpers::{FailingProvider, SequentialMockProvider, StallingProvider};
    use stepwise_core::tool::FailureKind;
    use stepwise_tools::{MemoryStore, default_registry};

    const CALC_ACTION: &str =
        "Thought: I need to add the numbers.\nAction: calculator\nAction Input: {\"expression\": \"2+2\"}";
    const CALC_ANSWER: &str = "Thought: I know the result.\nFinal Answer: The answer is 4.";

    fn tools() -> Arc<ToolRegistry> {
        Arc::new(default_registry(MemoryStore::new()).unwrap())
    }

    fn engine(provider: Arc<dyn Provider>) -> ReactEngine {
        ReactEngine::new(provider, "mock-model", tools(), Arc::new(EventBus::default()))
    }

    #[tokio::test]
    async fn calculator_round_trip() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[CALC_ACTION, CALC_ANSWER]));
        let mut engine = engine(provider.clone());

        let answer = engine.process("What is 2+2?").await.unwrap();
        assert_eq!(answer, "The answer is 4.");
        assert_eq!(provider.call_count(), 2);

        let summary = engine.get_execution_summary();
        assert_eq!(summary.step_count, 2);
        assert!(summary.completed);
        assert_eq!(summary.final_answer.as_deref(), Some("The answer is 4."));
        assert_eq!(summary.phase, LoopPhase::Concluding);
        assert_eq!(summary.usage.total_tokens, 30);

        let first = &summary.steps[0];
        assert_eq!(first.number, 1);
        assert_eq!(first.thought, "I need to add the numbers.");
        assert_eq!(first.capability(), Some("calculator"));
        assert_eq!(first.outcome().unwrap().data().unwrap()["result"], 4);
        assert!(first.observation.as_deref().unwrap().contains("result: 4"));
        assert!(summary.steps[1].is_terminal());
    }

    #[tokio::test]
    async fn unparseable_replies_exhaust_budget() {
        let provider = Arc::new(SequentialMockProvider::repeating("I am not sure what to do."));
        let mut engine = engine(provider.clone()).with_max_steps(3);

        let outcome = engine.run("What is 2+2?").await.unwrap();
        assert!(matches!(outcome, LoopOutcome::BudgetExhausted { .. }));
        assert!(outcome.text().starts_with("Unable to complete the request within 3 steps."));
        assert_eq!(provider.call_count(), 3);

        let summary = engine.get_execution_summary();
        assert!(!summary.completed);
        assert_eq!(summary.step_count, 3);
        assert_eq!(summary.phase, LoopPhase::BudgetExhausted);
        for step in &summary.steps {
            assert!(step.capability().is_none());
            assert!(step.observation.as_deref().unwrap().contains("could not be parsed"));
        }
    }

    #[tokio::test]
    async fn unknown_capability_is_observed_and_loop_continues() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[
            "Thought: Translate it.\nAction: translate\nAction Input: {\"text\": \"hola\"}",
            "Thought: No translator, I will answer directly.\nFinal Answer: It means hello.",
        ]));
        let mut engine = engine(provider.clone());

        let answer = engine.process("What does hola mean?").await.unwrap();
        assert_eq!(answer, "It means hello.");
        assert_eq!(provider.call_count(), 2);

        let summary = engine.get_execution_summary();
        let first = &summary.steps[0];
        assert_eq!(first.outcome().unwrap().category(), Some(FailureKind::NotFound));
        assert!(first.observation.as_deref().unwrap().contains("capability not found"));
    }

    #[tokio::test]
    async fn model_failure_in_first_round() {
        let provider = Arc::new(FailingProvider::new(ProviderError::Network(
            "connection refused".into(),
        )));
        let mut engine = engine(provider.clone());

        let outcome = engine.run("What is 2+2?").await.unwrap();
        let LoopOutcome::ModelFailure { error, message } = &outcome else {
            panic!("expected model failure, got {outcome:?}");
        };
        assert!(matches!(error, ProviderError::Network(_)));
        assert!(message.starts_with("Sorry, I ran into a problem"));
        assert!(message.contains("connection refused"));
        assert_eq!(provider.call_count(), 1);

        let summary = engine.get_execution_summary();
        assert_eq!(summary.step_count, 0);
        assert!(!summary.completed);
        assert_eq!(summary.phase, LoopPhase::Failed);
    }

    #[tokio::test]
    async fn failed_tool_does_not_abort() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[
            "Thought: Divide.\nAction: calculator\nAction Input: {\"expression\": \"1/0\"}",
            "Thought: Missing argument.\nAction: calculator\nAction Input: {}",
            "Final Answer: Division by zero is undefined.",
        ]));
        let mut engine = engine(provider.clone());

        let answer = engine.process("What is 1/0?").await.unwrap();
        assert_eq!(answer, "Division by zero is undefined.");

        let steps = engine.state().steps();
        assert_eq!(steps[0].outcome().unwrap().category(), Some(FailureKind::Execution));
        assert_eq!(steps[1].outcome().unwrap().category(), Some(FailureKind::Validation));
        assert!(steps[1]
            .observation
            .as_deref()
            .unwrap()
            .starts_with("Tool execution failed (validation)"));
    }

    #[tokio::test]
    async fn budget_of_one_runs_one_round() {
        let provider = Arc::new(SequentialMockProvider::repeating(CALC_ACTION));
        let mut engine = engine(provider.clone()).with_max_steps(1);

        let outcome = engine.run("What is 2+2?").await.unwrap();
        assert!(!outcome.is_answer());
        assert_eq!(provider.call_count(), 1);
        assert_eq!(
            outcome.text(),
            "Unable to complete the request within 1 steps. Progress so far:\n\
             Step 1: I need to add the numbers."
        );
    }

    #[tokio::test]
    async fn programmer_errors() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[]));
        let mut engine = engine(provider.clone());
        assert_eq!(engine.process("   ").await.unwrap_err(), EngineError::EmptyQuery);

        let mut bare = ReactEngine::new(
            provider.clone(),
            "mock-model",
            Arc::new(ToolRegistry::new()),
            Arc::new(EventBus::default()),
        );
        assert_eq!(bare.process("hi").await.unwrap_err(), EngineError::NoCapabilities);
        assert_eq!(provider.call_count(), 0);
    }

    #[tokio::test]
    async fn prompts_carry_system_rules_and_history() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[CALC_ACTION, CALC_ANSWER]));
        let mut engine = engine(provider.clone()).with_max_tokens(256);
        engine.process("  What is 2+2?  ").await.unwrap();

        let requests = provider.requests();
        assert_eq!(requests.len(), 2);

        let first = &requests[0];
        assert_eq!(first.messages.len(), 2);
        assert!(first.messages[0].content.contains("- calculator:"));
        assert_eq!(first.messages[1].content, "User question: What is 2+2?");
        assert_eq!(first.stop, vec!["\nObservation:"]);
        assert_eq!(first.max_tokens, Some(256));

        let second = &requests[1].messages[1].content;
        assert!(second.contains("Previous steps:\nStep 1:\nThought: I need to add the numbers."));
        assert!(second.contains("Action: calculator"));
        assert!(second.contains("Observation: Tool execution succeeded:"));
    }

    #[tokio::test]
    async fn events_follow_the_state_machine() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[CALC_ACTION, CALC_ANSWER]));
        let bus = Arc::new(EventBus::default());
        let mut rx = bus.subscribe();
        let mut engine = ReactEngine::new(provider, "mock-model", tools(), bus).with_agent_id("test-agent");

        engine.process("What is 2+2?").await.unwrap();

        let mut transitions = Vec::new();
        let mut recorded = 0;
        let mut executed = 0;
        while let Ok(event) = rx.try_recv() {
            match event.as_ref() {
                DomainEvent::StateChanged { agent_id, from, to, .. } => {
                    assert_eq!(agent_id, "test-agent");
                    transitions.push((*from, *to));
                }
                DomainEvent::StepRecorded { step, .. } => {
                    recorded += 1;
                    assert_eq!(step.number, recorded);
                }
                DomainEvent::ToolExecuted { tool_name, success, .. } => {
                    executed += 1;
                    assert_eq!(tool_name, "calculator");
                    assert!(*success);
                }
                _ => {}
            }
        }

        use LoopPhase::*;
        assert_eq!(
            transitions,
            vec![
                (Idle, Thinking),
                (Thinking, Deciding),
                (Deciding, Acting),
                (Acting, Thinking),
                (Thinking, Deciding),
                (Deciding, Concluding),
            ]
        );
        assert_eq!(recorded, 2);
        assert_eq!(executed, 1);
    }

    #[tokio::test]
    async fn cancelled_before_first_round() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[CALC_ANSWER]));
        let token = CancellationToken::new();
        token.cancel();
        let mut engine = engine(provider.clone()).with_cancellation(token);

        let outcome = engine.run("What is 2+2?").await.unwrap();
        assert!(matches!(outcome, LoopOutcome::Cancelled { .. }));
        assert_eq!(provider.call_count(), 0);
        assert_eq!(engine.state().phase(), LoopPhase::Cancelled);
        assert_eq!(engine.get_execution_summary().rounds, 0);

        // A fresh token makes the engine usable again.
        engine.fresh_cancellation_token();
        assert_eq!(engine.process("What is 2+2?").await.unwrap(), "The answer is 4.");
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_while_waiting_on_model() {
        let mut engine = engine(Arc::new(StallingProvider));
        let token = engine.fresh_cancellation_token();

        let (outcome, _) = tokio::join!(engine.run("What is 2+2?"), async {
            tokio::time::sleep(Duration::from_millis(50)).await;
            token.cancel();
        });
        assert!(matches!(outcome.unwrap(), LoopOutcome::Cancelled { .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn model_timeout_is_a_model_failure() {
        let mut engine = engine(Arc::new(StallingProvider)).with_model_timeout(Duration::from_secs(30));

        let outcome = engine.run("What is 2+2?").await.unwrap();
        let LoopOutcome::ModelFailure { error, .. } = outcome else {
            panic!("expected model failure");
        };
        assert!(matches!(error, ProviderError::Timeout(_)));
        assert_eq!(engine.get_execution_summary().step_count, 0);
    }

    #[tokio::test]
    async fn each_run_starts_from_a_clean_state() {
        let provider = Arc::new(SequentialMockProvider::from_texts(&[
            CALC_ACTION,
            CALC_ANSWER,
            "Final Answer: Hello!",
        ]));
        let mut engine = engine(provider);

        engine.process("What is 2+2?").await.unwrap();
        assert_eq!(engine.state().step_count(), 2);

        engine.process("Say hello").await.unwrap();
        let summary = engine.get_execution_summary();
        assert_eq!(summary.step_count, 1);
        assert_eq!(summary.steps[0].number, 1);
        assert_eq!(summary.final_answer.as_deref(), Some("Hello!"));

        engine.reset();
        assert_eq!(engine.state().step_count(), 0);
        assert_eq!(engine.state().phase(), LoopPhase::Idle);
    }
}
