//! `stepwise chat`: interactive session.

use std::io::Write;
use stepwise_agent::ReactEngine;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::{Overrides, build_engine, load_config, run_cancellable};

/// A line the user typed.
#[derive(Debug, Clone, PartialEq, Eq)]
enum Input<'a> {
    Help,
    Tools,
    Trace,
    Summary,
    Reset,
    Exit,
    Unknown(&'a str),
    Query(&'a str),
    Blank,
}

fn parse_input(line: &str) -> Input<'_> {
    let line = line.trim();
    if line.is_empty() {
        return Input::Blank;
    }
    if line == "exit" || line == "quit" {
        return Input::Exit;
    }
    let Some(command) = line.strip_prefix('/') else {
        return Input::Query(line);
    };
    match command.trim().to_ascii_lowercase().as_str() {
        "help" | "?" => Input::Help,
        "tools" => Input::Tools,
        "trace" => Input::Trace,
        "summary" => Input::Summary,
        "reset" => Input::Reset,
        "exit" | "quit" => Input::Exit,
        _ => Input::Unknown(command),
    }
}

pub async fn run(overrides: &Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let config = load_config(overrides)?;
    let mut engine = build_engine(&config)?;

    println!();
    println!("  Stepwise interactive session");
    println!();
    println!("  Provider:  {}", config.default_provider);
    println!("  Model:     {}", config.default_model);
    println!("  Tools:     {}", engine.tools().list_capabilities().join(", "));
    println!("  Budget:    {} steps", config.agent.max_steps);
    println!();
    println!("  Type a question and press Enter, or /help for commands.");
    println!("  Ctrl+C cancels a running question.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let line = tokio::select! {
            line = lines.next_line() => line?,
            _ = tokio::signal::ctrl_c() => None,
        };
        let Some(line) = line else { break };

        match parse_input(&line) {
            Input::Blank => continue,
            Input::Exit => break,
            Input::Help => print_help(),
            Input::Tools => print_tools(&engine),
            Input::Trace => println!("{}\n", engine.get_execution_summary().render_trace()),
            Input::Summary => {
                println!("{}\n", serde_json::to_string_pretty(&engine.get_execution_summary())?);
            }
            Input::Reset => {
                engine.reset();
                println!("  Session state cleared.\n");
            }
            Input::Unknown(command) => println!("  Unknown command: /{command} (try /help)\n"),
            Input::Query(query) => {
                eprint!("  Thinking...");
                let result = run_cancellable(&mut engine, query).await;
                eprint!("\r              \r");
                match result {
                    Ok(outcome) => {
                        if config.agent.show_trace {
                            eprintln!("{}\n", engine.get_execution_summary().render_trace());
                        }
                        println!("  Agent > {}\n", outcome.text());
                    }
                    Err(e) => eprintln!("  Error: {e}\n"),
                }
            }
        }
    }

    println!("\n  Goodbye!");
    Ok(())
}

fn print_help() {
    println!("  /help     Show this help");
    println!("  /tools    List available tools");
    println!("  /trace    Show the steps of the last question");
    println!("  /summary  Show the execution summary as JSON");
    println!("  /reset    Clear the state of the last question");
    println!("  /exit     Leave the session");
    println!();
}

fn print_tools(engine: &ReactEngine) {
    for spec in engine.tools().specs() {
        let params: Vec<String> = spec
            .params
            .iter()
            .map(|p| {
                if p.required {
                    p.name.clone()
                } else {
                    format!("{}?", p.name)
                }
            })
            .collect();
        println!("  {}({}): {}", spec.name, params.join(", "), spec.description);
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slash_commands() {
        assert_eq!(parse_input("/help"), Input::Help);
        assert_eq!(parse_input("  /TOOLS "), Input::Tools);
        assert_eq!(parse_input("/trace"), Input::Trace);
        assert_eq!(parse_input("/summary"), Input::Summary);
        assert_eq!(parse_input("/reset"), Input::Reset);
        assert_eq!(parse_input("/exit"), Input::Exit);
        assert_eq!(parse_input("/dance"), Input::Unknown("dance"));
    }

    #[test]
    fn plain_lines() {
        assert_eq!(parse_input("   "), Input::Blank);
        assert_eq!(parse_input("quit"), Input::Exit);
        assert_eq!(parse_input(" What is 2+2? "), Input::Query("What is 2+2?"));
    }
}
