use anyhow::{Context, Result};

use mergington_core::mcp::{McpClient, SearchOptions};

use crate::config::MergingtonConfig;

/// Execute the `mergington search` command: run one issue search through
/// the MCP transport chain and print the JSON result.
pub async fn run_search(config: &MergingtonConfig, query: &str, options: &SearchOptions) -> Result<()> {
    let client = McpClient::from_config(&config.mcp).context("failed to build MCP client")?;
    tracing::debug!(transports = ?client.transport_names(), sort = %options.sort, "searching issues");

    let result = client
        .search_issues_with(query, options)
        .await
        .with_context(|| format!("issue search for {query:?} failed"))?;

    let pretty = serde_json::to_string_pretty(&result).context("failed to format search result")?;
    println!("{pretty}");
    Ok(())
}
