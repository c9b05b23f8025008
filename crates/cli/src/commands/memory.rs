//! `smore memory`: Long-term notes management.

use anyhow::{Context, Result};
use smore_core::memory::{MemoryStore, WriteOutcome};

fn store() -> Result<std::sync::Arc<dyn MemoryStore>> {
    let config = super::load_config()?;
    if config.memory.backend == "file" {
        println!("# {}", config.memory.resolved_path().display());
    }
    Ok(smore_memory::build_from_config(&config.memory))
}

pub async fn show() -> Result<()> {
    let store = store()?;
    let notes = store.read().await.context("read notes")?;
    if notes.trim().is_empty() {
        println!("(no notes)");
    } else {
        println!("{notes}");
    }
    println!(
        "\n{} of {} characters used",
        notes.chars().count(),
        store.max_chars()
    );
    Ok(())
}

pub async fn add(section: &str, note: &str) -> Result<()> {
    let store = store()?;
    let outcome = store
        .append_to_section(section, note)
        .await
        .with_context(|| format!("add note to '{section}'"))?;
    report(outcome)
}

pub async fn clear() -> Result<()> {
    let store = store()?;
    let outcome = store.write("").await.context("clear notes")?;
    report(outcome)
}

fn report(outcome: WriteOutcome) -> Result<()> {
    match outcome {
        WriteOutcome::Written => {
            println!("Saved.");
            Ok(())
        }
        WriteOutcome::RejectedTooLarge { len, max } => {
            anyhow::bail!("notes would be {len} characters, the limit is {max}")
        }
    }
}
