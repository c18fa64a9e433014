//! Read-only view over a run, for front-ends and recorders.

use serde::{Deserialize, Serialize};
use stepwise_core::agent::{LoopPhase, Step, StepKind};
use stepwise_core::provider::Usage;

use crate::state::LoopState;

const CELL_WIDTH: usize = 100;

/// Snapshot of the engine after (or during) a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExecutionSummary {
    pub agent_id: String,
    /// Recorded steps; a model failure in round 1 leaves this at 0.
    pub step_count: usize,
    pub completed: bool,
    pub final_answer: Option<String>,
    pub phase: LoopPhase,
    /// Model calls started, including one that failed.
    pub rounds: usize,
    pub max_steps: usize,
    pub usage: Usage,
    pub steps: Vec<Step>,
    pub capabilities: Vec<String>,
}

impl ExecutionSummary {
    pub fn from_state(agent_id: &str, state: &LoopState, capabilities: Vec<String>) -> Self {
        Self {
            agent_id: agent_id.to_string(),
            step_count: state.step_count(),
            completed: state.is_completed(),
            final_answer: state.final_answer().map(str::to_string),
            phase: state.phase(),
            rounds: state.rounds(),
            max_steps: state.max_steps(),
            usage: state.usage(),
            steps: state.steps().to_vec(),
            capabilities,
        }
    }

    /// Plain-text table of the steps, one row per step.
    pub fn render_trace(&self) -> String {
        if self.steps.is_empty() {
            return "No steps recorded.".to_string();
        }

        let headers = ["Step", "Thought", "Action", "Observation"];
        let rows: Vec<[String; 4]> = self
            .steps
            .iter()
            .map(|step| {
                let action = match &step.kind {
                    StepKind::Action { capability, .. } => capability.clone(),
                    StepKind::Final { .. } => "final answer".to_string(),
                    StepKind::Malformed { .. } => "N/A".to_string(),
                };
                [
                    step.number.to_string(),
                    cell(&step.thought),
                    cell(&action),
                    cell(step.observation.as_deref().unwrap_or("N/A")),
                ]
            })
            .collect();

        let mut widths = headers.map(|h| h.chars().count());
        for row in &rows {
            for (width, value) in widths.iter_mut().zip(row) {
                *width = (*width).max(value.chars().count());
            }
        }

        let line = |cells: [&str; 4]| {
            cells
                .iter()
                .zip(widths)
                .map(|(c, w)| format!("{c:<w$}"))
                .collect::<Vec<_>>()
                .join(" | ")
                .trim_end()
                .to_string()
        };
        let rule = widths
            .iter()
            .map(|w| "-".repeat(*w))
            .collect::<Vec<_>>()
            .join("-+-");

        let mut out = vec![line(headers), rule];
        for row in &rows {
            out.push(line([row[0].as_str(), row[1].as_str(), row[2].as_str(), row[3].as_str()]));
        }
        if let Some(answer) = &self.final_answer {
            out.push(String::new());
            out.push(format!("Final answer: {answer}"));
        }
        out.join("\n")
    }
}

fn cell(text: &str) -> String {
    let flat = text.replace(['\r', '\n'], " ");
    if flat.chars().count() > CELL_WIDTH {
        let cut: String = flat.chars().take(CELL_WIDTH).collect();
        format!("{cut}...")
    } else {
        flat
    }
}
