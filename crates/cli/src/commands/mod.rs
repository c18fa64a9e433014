//! Subcommand implementations and the session wiring they share.

pub mod ask;
pub mod chat;
pub mod config_cmd;
pub mod tools;

use std::sync::Arc;
use std::time::Duration;
use stepwise_agent::{EngineError, LoopOutcome, ReactEngine};
use stepwise_config::AppConfig;
use stepwise_core::error::RegistryError;
use stepwise_core::event::{DomainEvent, EventBus};
use stepwise_core::tool::ToolRegistry;
use stepwise_tools::MemoryStore;
use tokio::sync::broadcast;

/// Global flags that override the loaded configuration.
#[derive(Debug, Default)]
pub struct Overrides {
    pub provider: Option<String>,
    pub model: Option<String>,
}

/// Load the config file plus environment, then apply command-line overrides.
pub fn load_config(overrides: &Overrides) -> Result<AppConfig, Box<dyn std::error::Error>> {
    let mut config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    if let Some(provider) = &overrides.provider {
        config.default_provider = provider.clone();
    }
    if let Some(model) = &overrides.model {
        config.default_model = model.clone();
    }
    Ok(config)
}

/// The built-in capabilities, bounded by the configured tool timeout.
pub fn build_registry(config: &AppConfig, store: MemoryStore) -> Result<ToolRegistry, RegistryError> {
    let registry =
        ToolRegistry::new().with_timeout(Duration::from_secs(config.agent.tool_timeout_secs));
    stepwise_tools::populate(registry, store)
}

/// Wire provider, tools and event recorder into a ready engine.
pub fn build_engine(config: &AppConfig) -> Result<ReactEngine, Box<dyn std::error::Error>> {
    // Local endpoints usually run without a key
    let keyless = config.default_provider == "ollama" || config.default_provider.starts_with("custom:");
    if !config.has_api_key() && !keyless {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    STEPWISE_API_KEY   (generic)");
        eprintln!("    DEEPSEEK_API_KEY   (for DeepSeek)");
        eprintln!("    OPENAI_API_KEY     (for OpenAI)");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_path().display());
        eprintln!();
        return Err("No API key found. See above for setup instructions.".into());
    }

    let router = stepwise_providers::build_from_config(config);
    let provider = router.default().ok_or("No default provider configured")?;
    let tools = Arc::new(build_registry(config, MemoryStore::new())?);

    let event_bus = Arc::new(EventBus::default());
    tokio::spawn(record_events(event_bus.subscribe()));

    Ok(ReactEngine::new(provider, &config.default_model, tools, event_bus)
        .with_agent_id(&config.agent.agent_id)
        .with_max_steps(config.agent.max_steps)
        .with_temperature(config.default_temperature)
        .with_max_tokens(config.default_max_tokens)
        .with_model_timeout(Duration::from_secs(config.agent.model_timeout_secs)))
}

/// Mirror domain events into the log.
async fn record_events(mut rx: broadcast::Receiver<Arc<DomainEvent>>) {
    loop {
        match rx.recv().await {
            Ok(event) => match event.as_ref() {
                DomainEvent::StateChanged { from, to, step, .. } => {
                    tracing::debug!(step, %from, %to, "Phase changed");
                }
                DomainEvent::StepRecorded { step, .. } => {
                    tracing::debug!(
                        step = step.number,
                        tool = step.capability().unwrap_or("-"),
                        "Step recorded"
                    );
                }
                DomainEvent::ToolExecuted {
                    tool_name,
                    success,
                    duration_ms,
                    ..
                } => {
                    tracing::info!(tool = %tool_name, success, duration_ms, "Tool executed");
                }
                DomainEvent::ResponseGenerated { model, tokens_used, .. } => {
                    tracing::debug!(%model, tokens_used, "Model responded");
                }
                DomainEvent::ErrorOccurred {
                    context,
                    error_message,
                    ..
                } => {
                    tracing::error!(%context, error = %error_message, "Run failed");
                }
            },
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                tracing::warn!(missed, "Event recorder lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Run one query; Ctrl+C cancels it before the next round.
pub async fn run_cancellable(
    engine: &mut ReactEngine,
    query: &str,
) -> Result<LoopOutcome, EngineError> {
    let token = engine.fresh_cancellation_token();
    let run = engine.run(query);
    tokio::pin!(run);

    loop {
        tokio::select! {
            outcome = &mut run => return outcome,
            signal = tokio::signal::ctrl_c() => {
                if signal.is_err() {
                    return (&mut run).await;
                }
                eprintln!("\n  Cancelling...");
                token.cancel();
            }
        }
    }
}
