//! `smore tools`: List what the model can call.

use anyhow::{Context, Result};
use smore_core::tool::ToolKind;

pub fn run() -> Result<()> {
    let config = super::load_config()?;
    let provider = smore_providers::router::build_from_config(&config);
    let registry = smore_agent::build_registry(&config, provider).context("build tool registry")?;

    println!("Tools ({}), max subagent depth {}:", registry.len(), registry.max_depth());
    for tool in registry.list(0) {
        let kind = match tool.kind() {
            ToolKind::Direct => "tool",
            ToolKind::Recursive => "subagent",
        };
        println!("  {:<20} {:<9} {}", tool.name(), kind, tool.description());
    }
    Ok(())
}
