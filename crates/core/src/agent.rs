//! Loop phases and the step record.

use crate::tool::{ToolOutcome, ToolParams};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where the loop controller currently is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPhase {
    /// No query is being processed.
    Idle,
    /// Waiting on the model.
    Thinking,
    /// Parsing the model response.
    Deciding,
    /// Invoking a capability.
    Acting,
    /// A final answer was produced.
    Concluding,
    /// The response could not be parsed; corrective feedback queued.
    Retrying,
    /// The step budget ran out without a final answer.
    BudgetExhausted,
    /// The model service failed.
    Failed,
    /// An external caller cancelled the run.
    Cancelled,
}

impl LoopPhase {
    /// Whether the loop stops in this phase.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            LoopPhase::Concluding
                | LoopPhase::BudgetExhausted
                | LoopPhase::Failed
                | LoopPhase::Cancelled
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LoopPhase::Idle => "idle",
            LoopPhase::Thinking => "thinking",
            LoopPhase::Deciding => "deciding",
            LoopPhase::Acting => "acting",
            LoopPhase::Concluding => "concluding",
            LoopPhase::Retrying => "retrying",
            LoopPhase::BudgetExhausted => "budget_exhausted",
            LoopPhase::Failed => "failed",
            LoopPhase::Cancelled => "cancelled",
        }
    }
}

impl std::fmt::Display for LoopPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a step did.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StepKind {
    /// The model requested a capability.
    Action {
        capability: String,
        parameters: ToolParams,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        outcome: Option<ToolOutcome>,
    },
    /// The model produced the final answer.
    Final { answer: String },
    /// The response could not be parsed.
    Malformed { raw: String },
}

/// One round of the loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Step {
    /// 1-based, monotonic within one run.
    pub number: usize,

    /// The model's stated rationale; empty when unparseable.
    pub thought: String,

    #[serde(flatten)]
    pub kind: StepKind,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub observation: Option<String>,

    pub timestamp: DateTime<Utc>,
}

impl Step {
    pub fn action(
        number: usize,
        thought: impl Into<String>,
        capability: impl Into<String>,
        parameters: ToolParams,
    ) -> Self {
        Self::with_kind(
            number,
            thought.into(),
            StepKind::Action {
                capability: capability.into(),
                parameters,
                outcome: None,
            },
        )
    }

    pub fn terminal(number: usize, thought: impl Into<String>, answer: impl Into<String>) -> Self {
        Self::with_kind(
            number,
            thought.into(),
            StepKind::Final {
                answer: answer.into(),
            },
        )
    }

    pub fn malformed(number: usize, raw: impl Into<String>) -> Self {
        Self::with_kind(number, String::new(), StepKind::Malformed { raw: raw.into() })
    }

    fn with_kind(number: usize, thought: String, kind: StepKind) -> Self {
        Self {
            number,
            thought,
            kind,
            observation: None,
            timestamp: Utc::now(),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.kind, StepKind::Final { .. })
    }

    pub fn capability(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Action { capability, .. } => Some(capability),
            _ => None,
        }
    }

    pub fn parameters(&self) -> Option<&ToolParams> {
        match &self.kind {
            StepKind::Action { parameters, .. } => Some(parameters),
            _ => None,
        }
    }

    pub fn answer(&self) -> Option<&str> {
        match &self.kind {
            StepKind::Final { answer } => Some(answer),
            _ => None,
        }
    }

    pub fn outcome(&self) -> Option<&ToolOutcome> {
        match &self.kind {
            StepKind::Action { outcome, .. } => outcome.as_ref(),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn terminal_phases() {
        assert!(LoopPhase::Concluding.is_terminal());
        assert!(LoopPhase::BudgetExhausted.is_terminal());
        assert!(LoopPhase::Cancelled.is_terminal());
        assert!(!LoopPhase::Retrying.is_terminal());
        assert!(!LoopPhase::Idle.is_terminal());
    }

    #[test]
    fn step_accessors() {
        let step = Step::action(1, "need math", "calculator", ToolParams::new());
        assert_eq!(step.capability(), Some("calculator"));
        assert!(step.answer().is_none());
        assert!(!step.is_terminal());

        let step = Step::terminal(2, "done", "4");
        assert!(step.is_terminal());
        assert!(step.capability().is_none());
        assert_eq!(step.answer(), Some("4"));

        let step = Step::malformed(3, "???");
        assert!(step.thought.is_empty());
        assert!(step.parameters().is_none());
    }

    #[test]
    fn step_serializes_with_kind_tag() {
        let json = serde_json::to_value(Step::terminal(1, "t", "a")).unwrap();
        assert_eq!(json["kind"], "final");
        assert_eq!(json["answer"], "a");
        assert_eq!(json["number"], 1);
    }
}
