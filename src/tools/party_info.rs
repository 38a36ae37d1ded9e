/// `get_ofac_party_info` Tool
///
/// Fetches the full record of one sanctioned party (details, identifications,
/// aliases, addresses) through the `/ofacParty` API.

use std::sync::Arc;

use serde_json::Value;

use crate::core::server::{MCPTool, ToolFuture, ToolHandler, ToolRegistry};
use crate::tools::client::OfacApiClient;
use crate::tools::status_result;

pub const TOOL_NAME: &str = "get_ofac_party_info";

/// Register the party lookup tool with the tool registry.
pub fn register(registry: &mut ToolRegistry, client: Arc<OfacApiClient>) {
    let tool = MCPTool {
        name: TOOL_NAME.to_string(),
        description: "Fetch one OFAC sanctioned party by party_id: details, \
                      identifications, aliases and addresses."
            .to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "party_id": {
                    "type": "integer",
                    "description": "OFAC party identifier"
                }
            },
            "required": ["party_id"]
        }),
    };

    let handler: ToolHandler = Box::new(move |args: Value| -> ToolFuture {
        let client = Arc::clone(&client);
        Box::pin(async move {
            let party_id = party_id_arg(&args)?;
            Ok(lookup(&client, party_id).await)
        })
    });

    registry.register(tool, handler);
}

/// Accept an integer, or a string holding one.
fn party_id_arg(args: &Value) -> Result<i64, String> {
    let value = args
        .get("party_id")
        .ok_or_else(|| "Missing required parameter: party_id".to_string())?;
    value
        .as_i64()
        .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
        .ok_or_else(|| format!("party_id must be an integer, got {}", value))
}

async fn lookup(client: &OfacApiClient, party_id: i64) -> Value {
    tracing::info!("{} start: party_id={}", TOOL_NAME, party_id);
    let outcome = client.get_party(party_id).await;
    match &outcome {
        Ok(_) => tracing::info!("{} success: party_id={}", TOOL_NAME, party_id),
        Err(e) => tracing::warn!("{} failed: party_id={} error={}", TOOL_NAME, party_id, e),
    }
    status_result(outcome)
}
