//! Text analyzer: keyword-based sentiment, keyword frequency and length
//! statistics.

use async_trait::async_trait;
use serde_json::{Value, json};
use std::collections::HashMap;
use stepwise_core::error::ToolError;
use stepwise_core::schema::{ParamSpec, ParamType, ToolSpec};
use stepwise_core::tool::{Tool, ToolParams};

pub struct TextAnalyzerTool;

impl TextAnalyzerTool {
    pub const NAME: &'static str = "text_analyzer";

    pub fn spec() -> ToolSpec {
        ToolSpec::new(
            Self::NAME,
            "Analyze a piece of text: sentiment, top keywords, or length statistics.",
        )
        .param(
            ParamSpec::new("text", ParamType::String)
                .describe("The text to analyze")
                .required(),
        )
        .param(
            ParamSpec::new("analysis_type", ParamType::String)
                .describe("'sentiment', 'keywords' or 'length'")
                .with_default("sentiment")
                .one_of(["sentiment", "keywords", "length"]),
        )
        .example(json!({"text": "This product is great, I love it!", "analysis_type": "sentiment"}))
        .example(json!({"text": "Rust is a systems programming language", "analysis_type": "keywords"}))
    }
}

#[async_trait]
impl Tool for TextAnalyzerTool {
    async fn call(&self, params: ToolParams) -> Result<Value, ToolError> {
        let text = crate::str_param(&params, "text")?;
        let analysis = params
            .get("analysis_type")
            .and_then(Value::as_str)
            .unwrap_or("sentiment");

        match analysis {
            "sentiment" => Ok(sentiment(text)),
            "keywords" => Ok(keywords(text)),
            "length" => Ok(length(text)),
            other => Err(ToolError::InvalidArguments(format!(
                "unsupported analysis type: {other}"
            ))),
        }
    }
}

const POSITIVE: [&str; 10] = [
    "good", "great", "excellent", "amazing", "love", "like", "happy", "perfect", "satisfied",
    "wonderful",
];

const NEGATIVE: [&str; 10] = [
    "bad", "terrible", "awful", "hate", "poor", "disappointed", "problem", "error", "fail",
    "worst",
];

const STOP_WORDS: [&str; 20] = [
    "the", "and", "but", "for", "with", "are", "was", "were", "this", "that", "from", "have",
    "has", "not", "you", "your", "its", "our", "their", "into",
];

fn words(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_lowercase)
}

fn sentiment(text: &str) -> Value {
    let lower = text.to_lowercase();
    let positive = POSITIVE.iter().filter(|w| lower.contains(*w)).count() as i64;
    let negative = NEGATIVE.iter().filter(|w| lower.contains(*w)).count() as i64;

    let (label, confidence) = match positive - negative {
        d if d > 0 => ("positive", (0.5 + d as f64 * 0.1).min(0.9)),
        d if d < 0 => ("negative", (0.5 + d as f64 * 0.1).max(0.1)),
        _ => ("neutral", 0.5),
    };

    json!({
        "sentiment": label,
        "confidence": (confidence * 100.0_f64).round() / 100.0,
        "positive_words": positive,
        "negative_words": negative,
    })
}

fn keywords(text: &str) -> Value {
    let mut total = 0usize;
    let mut freq: HashMap<String, usize> = HashMap::new();
    for word in words(text) {
        total += 1;
        if word.chars().count() > 2 && !STOP_WORDS.contains(&word.as_str()) {
            *freq.entry(word).or_default() += 1;
        }
    }

    let mut ranked: Vec<(String, usize)> = freq.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.truncate(10);

    json!({
        "keywords": ranked
            .into_iter()
            .map(|(word, frequency)| json!({"word": word, "frequency": frequency}))
            .collect::<Vec<_>>(),
        "total_words": total,
    })
}

fn length(text: &str) -> Value {
    let sentences = text
        .split(['.', '!', '?'])
        .filter(|s| !s.trim().is_empty())
        .count();

    json!({
        "character_count": text.chars().count(),
        "word_count": text.split_whitespace().count(),
        "line_count": text.lines().count(),
        "sentence_count": sentences,
    })
}
