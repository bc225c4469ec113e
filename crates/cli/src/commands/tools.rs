//! `ivan tools`: list the registered tools.

use std::path::Path;

use ivan_core::tool::ToolDefinition;

pub async fn run(config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let config =
        super::load_config(config_path).map_err(|e| format!("Failed to load config: {e}"))?;
    let registry = ivan_tools::registry_with_currency(&config.tools.default_currency);

    println!("Available tools ({}):", registry.len());
    println!();
    for def in registry.definitions() {
        println!("  {}", format_definition(&def));
    }
    Ok(())
}

fn format_definition(def: &ToolDefinition) -> String {
    format!("{}({})\n      {}", def.name, def.signature.join(", "), def.description)
}
