//! Prompt rendering.
//!
//! Two pure functions feed every model call: [`build_system_prompt`] lists
//! the registered capabilities and the response format, and
//! [`build_prompt`] replays the user question plus all prior steps.
//! Nothing is truncated; the step budget bounds the history instead.

use serde_json::Value;
use std::fmt::Write;
use stepwise_core::agent::{Step, StepKind};
use stepwise_core::schema::ParamSpec;
use stepwise_core::tool::ToolRegistry;

/// Render the question and the steps taken so far.
///
/// With no history the result is the question line alone.
pub fn build_prompt(query: &str, steps: &[Step]) -> String {
    let mut out = format!("User question: {query}");
    if steps.is_empty() {
        return out;
    }

    out.push_str("\n\nPrevious steps:");
    for step in steps {
        out.push('\n');
        out.push_str(&render_step(step));
    }
    out
}

fn render_step(step: &Step) -> String {
    let mut out = format!("Step {}:\n", step.number);
    if !step.thought.is_empty() {
        let _ = writeln!(out, "Thought: {}", step.thought);
    }
    match &step.kind {
        StepKind::Action {
            capability,
            parameters,
            ..
        } => {
            let _ = writeln!(out, "Action: {capability}");
            let _ = writeln!(out, "Action Input: {}", Value::Object(parameters.clone()));
        }
        StepKind::Final { answer } => {
            let _ = writeln!(out, "Final Answer: {answer}");
        }
        StepKind::Malformed { .. } => {}
    }
    if let Some(observation) = &step.observation {
        let _ = writeln!(out, "Observation: {observation}");
    }
    out
}

/// The fixed instruction sent before every context prompt.
pub fn build_system_prompt(tools: &ToolRegistry) -> String {
    let mut out = String::from(
        "You are a helpful assistant that solves problems step by step, \
         using the tools below whenever they help.\n\nAvailable tools:\n",
    );

    for spec in tools.specs() {
        let _ = write!(out, "\n- {}: {}\n", spec.name, spec.description);
        if !spec.params.is_empty() {
            out.push_str("  Parameters:\n");
            for param in &spec.params {
                let _ = writeln!(out, "    - {}", describe_param(param));
            }
        }
        for example in &spec.examples {
            let _ = writeln!(out, "  Example: {example}");
        }
    }

    let names = tools.list_capabilities().join(", ");
    let _ = write!(
        out,
        "\nRespond in exactly one of these two formats.\n\
         \n\
         To use a tool:\n\
         Thought: <your reasoning>\n\
         Action: <tool name, one of: {names}>\n\
         Action Input: <a JSON object with the tool parameters>\n\
         \n\
         To answer the user:\n\
         Thought: <your reasoning>\n\
         Final Answer: <the answer>\n\
         \n\
         Rules:\n\
         - Use at most one Action per reply, then stop and wait for the Observation.\n\
         - Action Input must be a valid JSON object.\n\
         - Never write an Observation yourself.\n\
         - Reply with a Final Answer as soon as you have enough information.\n"
    );
    out
}

fn describe_param(param: &ParamSpec) -> String {
    let mut traits = vec![
        param.param_type.as_str().to_string(),
        if param.required { "required" } else { "optional" }.to_string(),
    ];
    if let Some(default) = &param.default {
        traits.push(format!("default {default}"));
    }
    if !param.allowed.is_empty() {
        let allowed: Vec<String> = param.allowed.iter().map(Value::to_string).collect();
        traits.push(format!("one of {}", allowed.join(", ")));
    }

    let mut line = format!("{} ({})", param.name, traits.join(", "));
    if !param.description.is_empty() {
        line.push_str(": ");
        line.push_str(&param.description);
    }
    line
}
