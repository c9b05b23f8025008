//! `smore chat`: Interactive or single-message chat mode.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, Result};
use smore_agent::Session;
use smore_core::event::{ChannelObserver, EventKind, SessionEvent};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::debug;

pub async fn run(message: Option<String>) -> Result<()> {
    let config = super::load_config()?;
    let agent = smore_agent::build_agent(&config).context("build agent")?;
    super::check_backend(agent.provider().as_ref()).await;
    let session = Session::new(Arc::new(agent));

    if let Some(msg) = message {
        turn(&session, &msg).await?;
        return Ok(());
    }

    println!();
    println!("  {}", config.assistant_name);
    println!("  Provider:  {:?} ({})", config.provider.kind, config.provider.resolved_base_url());
    println!("  Model:     {}", config.provider.model);
    println!();
    println!("  Type your message and press Enter.");
    println!("  Type 'exit' or Ctrl+D to quit.");
    println!();

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        print!("  You > ");
        std::io::stdout().flush()?;

        let Some(line) = lines.next_line().await.context("read stdin")? else {
            break;
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if matches!(line, "exit" | "quit") {
            break;
        }

        print!("  {} > ", config.assistant_name);
        turn(&session, line).await?;
        println!();
    }

    println!();
    println!("  Goodbye!");
    Ok(())
}

/// Run one turn, printing the answer as it streams in.
async fn turn(session: &Session, text: &str) -> Result<()> {
    let (observer, mut events) = ChannelObserver::new();
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            render(&event);
        }
    });

    let outcome = session.send(text, Some(Arc::new(observer))).await;
    printer.await.context("event printer")?;
    debug!(
        iterations = outcome.iterations,
        tool_calls = outcome.tool_calls,
        exhausted = outcome.exhausted,
        "Turn finished"
    );
    println!();
    Ok(())
}

/// Print one event: answer text to stdout, tool activity to stderr.
fn render(event: &SessionEvent) {
    match &event.kind {
        EventKind::AssistantChunk { content } => {
            print!("{content}");
            let _ = std::io::stdout().flush();
        }
        EventKind::ToolStart {
            tool_name,
            params,
            depth,
            subagent,
            ..
        } => {
            let indent = "  ".repeat(*depth as usize + 1);
            let via = subagent
                .as_deref()
                .map(|s| format!("{s} → "))
                .unwrap_or_default();
            eprintln!("\n{indent}[{via}{tool_name}] {params}");
        }
        EventKind::ToolResult {
            tool_name,
            duration,
            depth,
            ..
        } => {
            let indent = "  ".repeat(*depth as usize + 1);
            eprintln!("{indent}[{tool_name} done in {duration:.2}s]");
        }
        _ => {}
    }
}
