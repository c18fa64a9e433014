//! Response parser: turns free model text into a [`ParsedStep`].
//!
//! The model is asked to answer in sections:
//!
//! ```text
//! Thought: <reasoning>
//! Action: <capability name>
//! Action Input: {"param": "value"}
//! ```
//!
//! or
//!
//! ```text
//! Thought: <reasoning>
//! Final Answer: <answer>
//! ```
//!
//! Markers are matched case-insensitively at the start of a line, after
//! optional `#`, `>`, `-` or indentation, and may be bold-wrapped
//! (`**Action**:`, `**Thought:**`). Bold phrases inside prose are not
//! markers. A final-answer marker wins over any action block in the same
//! response.
//!
//! Parsing is pure: the same text always yields the same result.

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::LazyLock;
use stepwise_core::ToolParams;

/// The structured reading of one model response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ParsedStep {
    /// The model concluded with a final answer.
    Terminal { thought: String, answer: String },
    /// The model requested a capability.
    Action {
        thought: String,
        capability: String,
        parameters: ToolParams,
    },
    /// Neither a final answer nor a complete action block was found.
    Unparseable { raw: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MarkerKind {
    Thought,
    Action,
    ActionInput,
    FinalAnswer,
    Observation,
}

#[derive(Debug, Clone, Copy)]
struct Marker {
    kind: MarkerKind,
    /// Byte offset where the marker starts.
    start: usize,
    /// Byte offset where the section body starts.
    end: usize,
}

static MARKERS: LazyLock<Option<Regex>> = LazyLock::new(|| {
    Regex::new(
        r"(?im)^[ \t>#\-]*[*_]*[ \t]*(final[ \t]+answer|action[ \t_]*input|action|thought|observation)[ \t]*[*_]*[ \t]*:[ \t]*[*_]*",
    )
    .ok()
});

/// Key under which unparseable parameter text is passed on.
pub const RAW_INPUT_KEY: &str = "raw_input";

/// Parse one model response.
pub fn parse(raw: &str) -> ParsedStep {
    let markers = scan(raw);
    let unparseable = || ParsedStep::Unparseable {
        raw: raw.to_string(),
    };

    // A final answer always wins.
    if let Some(fin) = markers.iter().find(|m| m.kind == MarkerKind::FinalAnswer) {
        let answer = clean_section(&raw[fin.end..]);
        if answer.is_empty() {
            return unparseable();
        }
        return ParsedStep::Terminal {
            thought: thought_before(raw, &markers, fin.start),
            answer,
        };
    }

    let Some((index, action)) = markers
        .iter()
        .enumerate()
        .find(|(_, m)| m.kind == MarkerKind::Action)
    else {
        return unparseable();
    };

    let capability = capability_name(section(raw, &markers, index));
    if capability.is_empty() {
        return unparseable();
    }

    let Some(input_index) = markers
        .iter()
        .enumerate()
        .skip(index + 1)
        .find(|(_, m)| m.kind == MarkerKind::ActionInput)
        .map(|(i, _)| i)
    else {
        return unparseable();
    };

    ParsedStep::Action {
        thought: thought_before(raw, &markers, action.start),
        capability,
        parameters: parse_parameters(section(raw, &markers, input_index)),
    }
}

fn scan(raw: &str) -> Vec<Marker> {
    let Some(re) = MARKERS.as_ref() else {
        return Vec::new();
    };

    re.captures_iter(raw)
        .filter_map(|caps| {
            let whole = caps.get(0)?;
            let keyword = caps.get(1)?.as_str().to_ascii_lowercase();
            let kind = if keyword.starts_with("final") {
                MarkerKind::FinalAnswer
            } else if keyword.starts_with("action") && keyword.ends_with("input") {
                MarkerKind::ActionInput
            } else if keyword == "action" {
                MarkerKind::Action
            } else if keyword == "thought" {
                MarkerKind::Thought
            } else {
                MarkerKind::Observation
            };
            Some(Marker {
                kind,
                start: whole.start(),
                end: whole.end(),
            })
        })
        .collect()
}

/// Body of marker `index`, up to the next marker.
fn section<'a>(raw: &'a str, markers: &[Marker], index: usize) -> &'a str {
    let start = markers[index].end;
    let end = markers
        .get(index + 1)
        .map(|m| m.start)
        .unwrap_or(raw.len());
    &raw[start..end]
}

/// The last thought preceding `limit`; falls back to unmarked leading text.
fn thought_before(raw: &str, markers: &[Marker], limit: usize) -> String {
    let last_thought = markers
        .iter()
        .enumerate()
        .rev()
        .find(|(_, m)| m.kind == MarkerKind::Thought && m.start < limit);

    match last_thought {
        Some((i, _)) => clean_section(section(raw, markers, i)),
        None => {
            let first = markers.first().map(|m| m.start).unwrap_or(raw.len());
            clean_section(&raw[..first.min(limit)])
        }
    }
}

fn clean_section(text: &str) -> String {
    text.trim()
        .trim_end_matches(['*', '_'])
        .trim()
        .to_string()
}

fn capability_name(text: &str) -> String {
    text.trim()
        .lines()
        .next()
        .unwrap_or("")
        .trim()
        .trim_matches(|c: char| matches!(c, '`' | '*' | '_' | '"' | '\'' | '[' | ']'))
        .trim()
        .to_string()
}

/// Parse an `Action Input` payload into a parameter object.
///
/// - a fenced or bare JSON object is used as-is
/// - an empty payload yields `{}`
/// - near-miss JSON gets one pass of quote substitution
/// - valid JSON that is not an object, and anything still unparseable,
///   is passed on under [`RAW_INPUT_KEY`] for the registry to reject
pub fn parse_parameters(text: &str) -> ToolParams {
    let stripped = strip_fences(text);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        return ToolParams::new();
    }

    let candidate = outermost_object(trimmed).unwrap_or(trimmed);

    let parsed = serde_json::from_str::<Value>(candidate)
        .or_else(|_| serde_json::from_str::<Value>(&candidate.replace('\'', "\"")));

    match parsed {
        Ok(Value::Object(map)) => map,
        Ok(other) => wrap_raw(other),
        Err(_) => wrap_raw(Value::String(trimmed.to_string())),
    }
}

fn wrap_raw(value: Value) -> ToolParams {
    let mut params = ToolParams::new();
    params.insert(RAW_INPUT_KEY.to_string(), value);
    params
}

fn strip_fences(text: &str) -> String {
    text.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

fn outermost_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}
