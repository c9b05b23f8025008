//! `smore init`: First-time setup.

use anyhow::{Context, Result};
use smore_config::AppConfig;

/// Starting point for the long-term notes document.
const MEMORY_TEMPLATE: &str = "# Memory

## Preferences
- (nothing yet)

## People

## Notes
";

pub fn run() -> Result<()> {
    let config_dir = AppConfig::config_dir();
    let config_path = config_dir.join("config.toml");

    println!("Smore: first-time setup\n");

    std::fs::create_dir_all(&config_dir)
        .with_context(|| format!("create {}", config_dir.display()))?;

    if config_path.exists() {
        println!("  Config already exists: {}", config_path.display());
    } else {
        std::fs::write(&config_path, AppConfig::default_toml())
            .with_context(|| format!("write {}", config_path.display()))?;
        println!("  Created {}", config_path.display());
    }

    let memory_path = AppConfig::load_from(&config_path)
        .context("read back config")?
        .memory
        .resolved_path();
    if memory_path.exists() {
        println!("  Notes already exist:  {}", memory_path.display());
    } else {
        if let Some(parent) = memory_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(&memory_path, MEMORY_TEMPLATE)
            .with_context(|| format!("write {}", memory_path.display()))?;
        println!("  Created {}", memory_path.display());
    }

    println!("\nNext steps:");
    println!("  1. Start Ollama and pull the model named in config.toml");
    println!("  2. Run: smore chat");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn template_has_sections_for_notes() {
        assert!(MEMORY_TEMPLATE.contains("## Preferences"));
        assert!(smore_core::memory::insert_note(MEMORY_TEMPLATE, "People", "Sam: coworker").is_some());
        assert!(MEMORY_TEMPLATE.chars().count() < smore_core::memory::DEFAULT_MAX_CHARS);
    }
}
