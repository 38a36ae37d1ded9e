/// `search_party` Tool
///
/// Combined search over primary names, aliases and addresses, forwarded to
/// the `/ofacParty/search` API. Argument problems the caller can fix (short
/// query, unknown scope) come back as `{"status": "error"}` results rather
/// than tool errors.

use std::sync::Arc;

use serde_json::Value;

use crate::core::server::{MCPTool, ToolFuture, ToolHandler, ToolRegistry};
use crate::ofac::model::{DEFAULT_SEARCH_LIMIT, MIN_QUERY_CHARS, SearchScope, clamp_limit};
use crate::tools::client::OfacApiClient;
use crate::tools::{status_error, status_result};

pub const TOOL_NAME: &str = "search_party";

pub fn register(registry: &mut ToolRegistry, client: Arc<OfacApiClient>) {
    let tool = MCPTool {
        name: TOOL_NAME.to_string(),
        description: "Search OFAC sanctioned parties by name, alias and address.".to_string(),
        input_schema: serde_json::json!({
            "type": "object",
            "properties": {
                "q": {
                    "type": "string",
                    "description": "Search text, at least 2 characters"
                },
                "scope": {
                    "type": "string",
                    "enum": SearchScope::ALLOWED,
                    "default": "all",
                    "description": "Fields to match: all, name, alias or address"
                },
                "country": {
                    "type": "string",
                    "description": "Only parties with an address in this country"
                },
                "city": {
                    "type": "string",
                    "description": "Only parties with an address in this city"
                },
                "limit": {
                    "type": "integer",
                    "default": DEFAULT_SEARCH_LIMIT,
                    "minimum": 1,
                    "maximum": 1000
                },
                "fuzzy": {
                    "type": "boolean",
                    "default": false,
                    "description": "Match each word separately"
                }
            },
            "required": ["q"]
        }),
    };

    let handler: ToolHandler = Box::new(move |args: Value| -> ToolFuture {
        let client = Arc::clone(&client);
        Box::pin(async move {
            if args.get("q").and_then(Value::as_str).is_none() {
                return Err("Missing required parameter: q".to_string());
            }
            let scope = args.get("scope").cloned().unwrap_or_default();
            tracing::info!("{} start: q={} scope={}", TOOL_NAME, args["q"], scope);

            let query = match search_query(&args) {
                Ok(query) => query,
                Err(message) => return Ok(status_error(message)),
            };

            let outcome = client.search(&query).await;
            match &outcome {
                Ok(data) => tracing::info!(
                    "{} success: hits={}",
                    TOOL_NAME,
                    data.as_array().map(Vec::len).unwrap_or(0)
                ),
                Err(e) => tracing::warn!("{} failed: {}", TOOL_NAME, e),
            }
            Ok(status_result(outcome))
        })
    });

    registry.register(tool, handler);
}

fn non_empty_str<'a>(args: &'a Value, key: &str) -> Option<&'a str> {
    args.get(key)
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Validate the tool arguments and build the API query string.
///
/// A missing, null or zero `limit` means the default.
fn search_query(args: &Value) -> Result<Vec<(&'static str, String)>, String> {
    let q = args.get("q").and_then(Value::as_str).unwrap_or("").trim();
    if q.chars().count() < MIN_QUERY_CHARS {
        return Err(format!("q must be at least {} characters", MIN_QUERY_CHARS));
    }

    let scope_raw = non_empty_str(args, "scope").unwrap_or("all").to_lowercase();
    let Some(scope) = SearchScope::parse(&scope_raw) else {
        return Err(format!("scope must be one of {}", SearchScope::ALLOWED.join(", ")));
    };

    let limit = match args.get("limit") {
        None | Some(Value::Null) => DEFAULT_SEARCH_LIMIT,
        Some(value) => {
            let requested = value
                .as_i64()
                .or_else(|| value.as_str().and_then(|s| s.trim().parse().ok()))
                .ok_or_else(|| "limit must be an integer".to_string())?;
            if requested == 0 {
                DEFAULT_SEARCH_LIMIT
            } else {
                clamp_limit(requested)
            }
        }
    };

    let mut query = vec![
        ("q", q.to_string()),
        ("scope", scope.as_str().to_string()),
        ("limit", limit.to_string()),
    ];
    if let Some(country) = non_empty_str(args, "country") {
        query.push(("country", country.to_string()));
    }
    if let Some(city) = non_empty_str(args, "city") {
        query.push(("city", city.to_string()));
    }
    if args.get("fuzzy").and_then(Value::as_bool).unwrap_or(false) {
        query.push(("fuzzy", "true".to_string()));
    }
    Ok(query)
}
