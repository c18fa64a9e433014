//! `stepwise config`: show or initialize the configuration.

use stepwise_config::AppConfig;

use super::{Overrides, load_config};

pub fn run(init: bool, force: bool, overrides: &Overrides) -> Result<(), Box<dyn std::error::Error>> {
    let path = AppConfig::config_path();

    if init {
        if path.exists() && !force {
            println!("  Config already exists at {}", path.display());
            println!("  Use --force to overwrite it.");
            return Ok(());
        }
        AppConfig::write_default(&path)?;
        println!("  Wrote default config to {}", path.display());
        return Ok(());
    }

    let config = load_config(overrides)?;
    println!("# {}", path.display());
    if !path.exists() {
        println!("# (file not found, showing defaults and environment overrides)");
    }
    println!("{}", config.redacted_toml());
    if !config.has_api_key() {
        println!("# No API key set: export STEPWISE_API_KEY, DEEPSEEK_API_KEY or OPENAI_API_KEY");
    }
    Ok(())
}
