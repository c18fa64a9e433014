//! Per-run loop state, owned by the engine.

use serde::Serialize;
use stepwise_core::agent::{LoopPhase, Step};
use stepwise_core::provider::Usage;

/// Everything the engine accumulates while processing one query.
///
/// Steps are append-only within a run; [`LoopState::reset`] clears them
/// before the next one. The budget survives resets.
#[derive(Debug, Clone, Serialize)]
pub struct LoopState {
    steps: Vec<Step>,
    rounds: usize,
    max_steps: usize,
    completed: bool,
    final_answer: Option<String>,
    phase: LoopPhase,
    usage: Usage,
}

impl LoopState {
    pub fn new(max_steps: usize) -> Self {
        Self {
            steps: Vec::new(),
            rounds: 0,
            max_steps: max_steps.max(1),
            completed: false,
            final_answer: None,
            phase: LoopPhase::Idle,
            usage: Usage::default(),
        }
    }

    pub fn reset(&mut self) {
        self.steps.clear();
        self.rounds = 0;
        self.completed = false;
        self.final_answer = None;
        self.phase = LoopPhase::Idle;
        self.usage = Usage::default();
    }

    /// Start a new round. Returns its 1-based number, or `None` once the
    /// budget is spent.
    pub fn begin_round(&mut self) -> Option<usize> {
        if self.rounds >= self.max_steps {
            return None;
        }
        self.rounds += 1;
        Some(self.rounds)
    }

    pub fn record(&mut self, step: Step) {
        self.steps.push(step);
    }

    pub fn complete(&mut self, answer: impl Into<String>) {
        self.completed = true;
        self.final_answer = Some(answer.into());
    }

    /// Move to `phase`, returning the previous one.
    pub fn set_phase(&mut self, phase: LoopPhase) -> LoopPhase {
        std::mem::replace(&mut self.phase, phase)
    }

    pub fn add_usage(&mut self, usage: &Usage) {
        self.usage.accumulate(usage);
    }

    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    pub fn rounds(&self) -> usize {
        self.rounds
    }

    pub fn max_steps(&self) -> usize {
        self.max_steps
    }

    pub fn set_max_steps(&mut self, max_steps: usize) {
        self.max_steps = max_steps.max(1);
    }

    pub fn is_completed(&self) -> bool {
        self.completed
    }

    pub fn final_answer(&self) -> Option<&str> {
        self.final_answer.as_deref()
    }

    pub fn phase(&self) -> LoopPhase {
        self.phase
    }

    pub fn usage(&self) -> Usage {
        self.usage
    }

    /// The degraded answer returned when the budget runs out: every
    /// recorded thought, in order.
    pub fn progress_summary(&self) -> String {
        let mut out = format!(
            "Unable to complete the request within {} steps.",
            self.max_steps
        );
        let thoughts: Vec<String> = self
            .steps
            .iter()
            .filter(|s| !s.thought.is_empty())
            .map(|s| format!("Step {}: {}", s.number, s.thought))
            .collect();
        if !thoughts.is_empty() {
            out.push_str(" Progress so far:\n");
            out.push_str(&thoughts.join("\n"));
        }
        out
    }
}
