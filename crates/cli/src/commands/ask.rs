//! `stepwise ask`: answer a single question.

use super::{Overrides, build_engine, load_config, run_cancellable};

pub async fn run(
    query: &str,
    max_steps: Option<usize>,
    json: bool,
    overrides: &Overrides,
) -> Result<(), Box<dyn std::error::Error>> {
    let mut config = load_config(overrides)?;
    if let Some(max_steps) = max_steps {
        config.agent.max_steps = max_steps;
        config.validate()?;
    }

    let mut engine = build_engine(&config)?;

    if !json {
        eprint!("  Thinking...");
    }
    let outcome = run_cancellable(&mut engine, query).await?;
    let summary = engine.get_execution_summary();

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }

    eprint!("\r              \r");
    if config.agent.show_trace {
        eprintln!("{}", summary.render_trace());
        eprintln!();
    }
    println!("{}", outcome.text());
    Ok(())
}
