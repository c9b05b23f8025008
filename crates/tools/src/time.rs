//! `get_time`: the current local date and time.

use async_trait::async_trait;
use chrono::Local;
use smore_core::error::ToolError;
use smore_core::tool::{Tool, ToolContext};

pub struct TimeTool;

#[async_trait]
impl Tool for TimeTool {
    fn name(&self) -> &str {
        "get_time"
    }

    fn description(&self) -> &str {
        "Get the current date and time"
    }

    async fn invoke(&self, _params: &str, _ctx: ToolContext<'_>) -> Result<String, ToolError> {
        Ok(format!("Current time: {}", Local::now().format("%Y-%m-%d %H:%M:%S")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use smore_core::tool::ToolRegistry;

    #[tokio::test]
    async fn reports_formatted_time() {
        let registry = ToolRegistry::new();
        let ctx = registry.root_context(1);
        let out = TimeTool
            .invoke("", ToolContext { registry: &registry, recursion: &ctx })
            .await
            .unwrap();
        let stamp = out.strip_prefix("Current time: ").unwrap();
        assert!(chrono::NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M:%S").is_ok());
    }
}
