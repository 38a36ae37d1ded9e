/// MCP Server Implementation
///
/// This module contains the core MCP server implementation including:
/// - JSON-RPC 2.0 request/response structures
/// - Tool registry for managing available tools
/// - A transport-independent dispatcher (`McpServer`)
/// - HTTP server setup with Actix Web (REST API + MCP on one listener)
/// - STDIO server implementation for line-based communication

use actix_web::{
    App, HttpResponse, HttpServer, Result, web,
    middleware::{Compress, DefaultHeaders, Logger},
};
use futures_util::future::BoxFuture;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use crate::core::config::ServerConfig;
use crate::core::sse::{self, SseSessions};
use crate::ofac::{api, store::PartyStore};
use crate::tools::{self, client::OfacApiClient};

/// MCP protocol revision implemented by this server.
pub const PROTOCOL_VERSION: &str = "2024-11-05";

pub const PARSE_ERROR: i32 = -32700;
pub const METHOD_NOT_FOUND: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;

/// Server metadata reported in MCP initialize responses.
#[derive(Clone, Debug)]
pub struct AppState {
    pub server_name: String,
    pub server_version: String,
}

/// JSON-RPC 2.0 request structure for MCP protocol.
///
/// All MCP requests follow the JSON-RPC 2.0 specification. The jsonrpc field
/// must be "2.0", id is optional (None for notifications), method specifies
/// the MCP method to call, and params contains method-specific parameters.
#[derive(Deserialize, Debug)]
pub struct MCPRequest {
    /// JSON-RPC version identifier, must be "2.0"
    #[allow(dead_code)]
    jsonrpc: String,
    /// Request ID for correlating responses. None indicates a notification.
    #[serde(default)]
    id: Option<serde_json::Value>,
    /// MCP method name (e.g., "initialize", "tools/list", "tools/call")
    method: String,
    /// Method-specific parameters as JSON value
    #[serde(default)]
    params: Option<serde_json::Value>,
}

/// JSON-RPC 2.0 response structure for MCP protocol.
///
/// Responses must include jsonrpc "2.0", the request id, and either a result
/// or an error. The error field is only present when an error occurred.
#[derive(Serialize, Debug)]
pub struct MCPResponse {
    jsonrpc: String,
    id: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<MCPError>,
}

impl MCPResponse {
    fn success(id: Option<serde_json::Value>, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    fn failure(id: Option<serde_json::Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(MCPError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    pub fn id(&self) -> Option<&serde_json::Value> {
        self.id.as_ref()
    }

    pub fn result(&self) -> Option<&serde_json::Value> {
        self.result.as_ref()
    }

    pub fn error_code(&self) -> Option<i32> {
        self.error.as_ref().map(|e| e.code)
    }
}

/// JSON-RPC 2.0 error structure.
#[derive(Serialize, Debug)]
pub struct MCPError {
    /// JSON-RPC error code (e.g., -32601 for method not found)
    code: i32,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<serde_json::Value>,
}

/// MCP tool definition structure.
///
/// Each tool must have a unique name, description, and JSON schema defining
/// its input parameters. This structure is serialized when listing tools.
#[derive(Serialize, Debug, Clone)]
pub struct MCPTool {
    pub name: String,
    pub description: String,
    /// JSON Schema defining the tool's input parameters
    #[serde(rename = "inputSchema")]
    pub input_schema: serde_json::Value,
}

/// Future returned by a tool handler.
pub type ToolFuture = BoxFuture<'static, Result<serde_json::Value, String>>;

/// Tool handler function type definition.
///
/// Tool handlers take JSON arguments and return a boxed future resolving to
/// either a JSON result or an error string. The handler must be Send + Sync
/// to be shared across actix workers and the STDIO task.
pub type ToolHandler = Box<dyn Fn(serde_json::Value) -> ToolFuture + Send + Sync>;

/// Registry of available MCP tools.
///
/// The registry maintains a list of tool definitions for discovery and a
/// HashMap of tool names to their handler functions for execution.
pub struct ToolRegistry {
    /// List of all registered tools (for tools/list method)
    pub tools: Vec<MCPTool>,
    /// Map of tool names to their handler functions (for tools/call method)
    pub handlers: HashMap<String, ToolHandler>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: Vec::new(),
            handlers: HashMap::new(),
        }
    }

    /// Register a tool with the registry.
    ///
    /// This method adds the tool definition to the tools list and stores
    /// the handler function in the handlers map for later execution.
    pub fn register(&mut self, tool: MCPTool, handler: ToolHandler) {
        let name = tool.name.clone();
        self.tools.push(tool);
        self.handlers.insert(name, handler);
    }
}

/// Initialize and register all tools.
///
/// Both tools reach the sanctions data through the REST API client.
pub fn initialize_tools(client: Arc<OfacApiClient>) -> Arc<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    tools::party_info::register(&mut registry, client.clone());
    tools::search::register(&mut registry, client);
    Arc::new(registry)
}

/// Transport-independent MCP request dispatcher.
///
/// Cheap to clone; every transport (HTTP, SSE, STDIO) shares one instance.
#[derive(Clone)]
pub struct McpServer {
    state: AppState,
    registry: Arc<ToolRegistry>,
}

impl McpServer {
    pub fn new(state: AppState, registry: Arc<ToolRegistry>) -> Self {
        Self { state, registry }
    }

    pub fn registry(&self) -> &ToolRegistry {
        &self.registry
    }

    /// Process one request. Notifications (no id) produce no response.
    pub async fn handle(&self, req: MCPRequest) -> Option<MCPResponse> {
        if req.id.is_none() {
            tracing::debug!("Notification received: {}", req.method);
            return None;
        }

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(req.id),
            "ping" => MCPResponse::success(req.id, serde_json::json!({})),
            "tools/list" => self.handle_tools_list(req.id),
            "tools/call" => self.handle_tools_call(req.id, req.params).await,
            _ => {
                tracing::warn!("Method not found: {}", req.method);
                MCPResponse::failure(
                    req.id,
                    METHOD_NOT_FOUND,
                    format!("Method not found: {}", req.method),
                )
            }
        };
        Some(response)
    }

    /// Handle MCP initialize method.
    ///
    /// The initialize method is the first method called by MCP clients to establish
    /// a connection. It returns the protocol version, server capabilities, and
    /// server information.
    fn handle_initialize(&self, id: Option<serde_json::Value>) -> MCPResponse {
        MCPResponse::success(
            id,
            serde_json::json!({
                "protocolVersion": PROTOCOL_VERSION,
                "capabilities": {
                    "tools": {}
                },
                "serverInfo": {
                    "name": self.state.server_name,
                    "version": self.state.server_version
                }
            }),
        )
    }

    fn handle_tools_list(&self, id: Option<serde_json::Value>) -> MCPResponse {
        MCPResponse::success(id, serde_json::json!({ "tools": self.registry.tools }))
    }

    /// Handle MCP tools/call method.
    ///
    /// Handler errors are reported in-band as `isError: true` content so the
    /// client model can see them; only protocol problems (missing params,
    /// unknown tool) become JSON-RPC errors.
    async fn handle_tools_call(
        &self,
        id: Option<serde_json::Value>,
        params: Option<serde_json::Value>,
    ) -> MCPResponse {
        let Some(tool_name) = params
            .as_ref()
            .and_then(|p| p.get("name"))
            .and_then(|v| v.as_str())
        else {
            return MCPResponse::failure(id, INVALID_PARAMS, "Invalid params: missing tool name");
        };

        let arguments = params
            .as_ref()
            .and_then(|p| p.get("arguments"))
            .cloned()
            .unwrap_or_else(|| serde_json::json!({}));

        let Some(handler) = self.registry.handlers.get(tool_name) else {
            tracing::warn!("Unknown tool: {}", tool_name);
            return MCPResponse::failure(id, METHOD_NOT_FOUND, format!("Unknown tool: {}", tool_name));
        };

        tracing::info!("Calling tool {}", tool_name);
        match handler(arguments).await {
            Ok(result) => MCPResponse::success(
                id,
                serde_json::json!({
                    "content": [
                        {
                            "type": "text",
                            "text": serde_json::to_string(&result).unwrap_or_default()
                        }
                    ],
                    "isError": false
                }),
            ),
            Err(e) => {
                tracing::warn!("Tool {} failed: {}", tool_name, e);
                MCPResponse::success(
                    id,
                    serde_json::json!({
                        "content": [
                            {
                                "type": "text",
                                "text": format!("Error: {}", e)
                            }
                        ],
                        "isError": true
                    }),
                )
            }
        }
    }
}

/// Parse a JSON-RPC request, producing a parse-error response on failure.
///
/// The error response carries the request id when the payload is valid JSON
/// with an `id` field; otherwise the id is null.
pub fn parse_request(payload: &[u8]) -> Result<MCPRequest, MCPResponse> {
    serde_json::from_slice::<MCPRequest>(payload).map_err(|e| {
        let id = serde_json::from_slice::<serde_json::Value>(payload)
            .ok()
            .and_then(|v| v.get("id").cloned());
        MCPResponse::failure(id, PARSE_ERROR, format!("Parse error: {}", e))
    })
}

/// Health check endpoint handler.
async fn health(state: web::Data<AppState>, store: web::Data<PartyStore>) -> Result<HttpResponse> {
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "status": "ok",
        "service": state.server_name,
        "database": store.db_path().exists()
    })))
}

/// MCP JSON-RPC request handler for plain HTTP POST.
///
/// The JSON-RPC response is the HTTP body; notifications are acknowledged
/// with 202 and no body.
async fn mcp_handler(
    server: web::Data<McpServer>,
    counter: web::Data<AtomicU64>,
    body: web::Bytes,
) -> Result<HttpResponse> {
    counter.fetch_add(1, Ordering::Relaxed);

    let request = match parse_request(&body) {
        Ok(request) => request,
        Err(error_response) => return Ok(HttpResponse::Ok().json(error_response)),
    };

    match server.handle(request).await {
        Some(response) => Ok(HttpResponse::Ok().json(response)),
        None => Ok(HttpResponse::Accepted().finish()),
    }
}

/// Metrics endpoint handler for monitoring.
async fn metrics_handler(
    counter: web::Data<AtomicU64>,
    sessions: web::Data<SseSessions>,
) -> Result<HttpResponse> {
    let count = counter.load(Ordering::Relaxed);
    Ok(HttpResponse::Ok().json(serde_json::json!({
        "requests_total": count,
        "sse_sessions": sessions.len(),
        "status": "ok"
    })))
}

/// Server-Sent Events endpoint for tools discovery.
///
/// Returns a single SSE event holding the registered tools and their count.
async fn sse_tools_discovery(server: web::Data<McpServer>) -> Result<HttpResponse> {
    let tools = &server.registry().tools;
    let tools_data = serde_json::json!({
        "tools": tools,
        "count": tools.len()
    });

    Ok(sse::event_stream_response()
        .body(sse::format_event(None, &serde_json::to_string(&tools_data).unwrap_or_else(|_| "{}".to_string()))))
}

/// Register the MCP and operational routes.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/health", web::get().to(health))
        .route("/metrics", web::get().to(metrics_handler))
        .route("/sse", web::get().to(sse_tools_discovery))
        .route("/mcp", web::post().to(mcp_handler))
        .route("/mcp/sse", web::get().to(sse::connect))
        .route("/mcp/messages", web::post().to(sse::post_message))
        .route("/", web::post().to(mcp_handler))
        .route("/", web::get().to(health));
}

/// Run the combined REST API + MCP server in HTTP mode.
///
/// # Configuration
/// The server is configured with:
/// - Worker threads: from config (CPU count capped at 16 by default)
/// - Max connections: 10,000 concurrent connections
/// - Connection rate limit: 1,000 connections per second
/// - Keep-alive: from config (65 seconds by default)
/// - Request timeout: 30 seconds
/// - Shutdown timeout: 10 seconds
pub async fn run_server_http(
    config: &ServerConfig,
    server: McpServer,
    store: PartyStore,
) -> std::io::Result<()> {
    let bind_addr = config.bind_addr();

    let app_state = web::Data::new(server.state.clone());
    let mcp_server = web::Data::new(server);
    let party_store = web::Data::new(store);
    let request_count = web::Data::new(AtomicU64::new(0));
    let sessions = web::Data::new(SseSessions::default());

    tracing::info!(
        "Starting OFAC API + MCP server (HTTP mode): name={} version={} bind={} workers={} db={}",
        app_state.server_name,
        app_state.server_version,
        bind_addr,
        config.workers,
        party_store.db_path().display()
    );

    HttpServer::new(move || {
        App::new()
            .app_data(app_state.clone())
            .app_data(mcp_server.clone())
            .app_data(party_store.clone())
            .app_data(request_count.clone())
            .app_data(sessions.clone())
            // Enable compression for JSON responses (gzip/brotli)
            .wrap(Compress::default())
            // Add security headers to all responses
            .wrap(
                DefaultHeaders::new()
                    .add(("X-Content-Type-Options", "nosniff"))
                    .add(("X-Frame-Options", "DENY"))
                    .add(("X-XSS-Protection", "1; mode=block")),
            )
            // Format: %r = request line, %s = status, %Dms = duration in milliseconds
            .wrap(Logger::new("%r %s %Dms"))
            .configure(api::configure)
            .configure(configure)
    })
    .workers(config.workers)
    // Connection limits for high-traffic scenarios
    .max_connections(10000)
    .max_connection_rate(1000)
    .keep_alive(config.keep_alive)
    .client_request_timeout(Duration::from_secs(30))
    .client_disconnect_timeout(Duration::from_secs(2))
    .shutdown_timeout(10)
    .bind(&bind_addr)?
    .run()
    .await
}

/// Run the MCP server in STDIO mode.
///
/// Reads JSON-RPC requests line-by-line from stdin and writes responses to
/// stdout. All logging goes to stderr to keep the protocol stream clean.
///
/// # Implementation Details
/// - Uses buffered I/O with 8KB buffers
/// - Processes requests one at a time
/// - Skips notifications (requests without IDs)
/// - Flushes after each response
pub async fn run_server_stdio(server: McpServer) -> std::io::Result<()> {
    let stdin = tokio::io::stdin();
    let stdout = tokio::io::stdout();
    tracing::info!(
        "Starting MCP server (STDIO mode): name={} version={}",
        server.state.server_name,
        server.state.server_version
    );
    serve_lines(&server, stdin, stdout).await
}

/// Line-delimited JSON-RPC loop over arbitrary async reader/writer.
pub async fn serve_lines<R, W>(server: &McpServer, reader: R, writer: W) -> std::io::Result<()>
where
    R: tokio::io::AsyncRead + Unpin,
    W: tokio::io::AsyncWrite + Unpin,
{
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, BufWriter};

    let mut lines = BufReader::with_capacity(8192, reader).lines();
    let mut writer = BufWriter::with_capacity(8192, writer);

    while let Some(line) = lines.next_line().await? {
        if line.trim().is_empty() {
            continue;
        }

        let response = match parse_request(line.as_bytes()) {
            Ok(request) => match server.handle(request).await {
                Some(response) => response,
                None => continue,
            },
            Err(error_response) => {
                tracing::warn!("Parse error on stdin line");
                // Without an id there is nobody to answer.
                if error_response.id().is_none() {
                    continue;
                }
                error_response
            }
        };

        let response_json = match serde_json::to_string(&response) {
            Ok(json) => json,
            Err(e) => {
                tracing::error!("Error serializing response: {}", e);
                continue;
            }
        };

        // Each response must be on a single line followed by newline
        writer.write_all(response_json.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }

    Ok(())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    /// A registry with one succeeding and one failing tool.
    pub(crate) fn test_server() -> McpServer {
        let mut registry = ToolRegistry::new();
        registry.register(
            MCPTool {
                name: "echo_args".to_string(),
                description: "Return the arguments".to_string(),
                input_schema: serde_json::json!({ "type": "object" }),
            },
            Box::new(|args: serde_json::Value| -> ToolFuture { Box::pin(async move { Ok(args) }) }),
        );
        registry.register(
            MCPTool {
                name: "always_fails".to_string(),
                description: "Fail".to_string(),
                input_schema: serde_json::json!({ "type": "object" }),
            },
            Box::new(|_: serde_json::Value| -> ToolFuture {
                Box::pin(async { Err("boom".to_string()) })
            }),
        );
        McpServer::new(
            AppState {
                server_name: "ofac_party_service".to_string(),
                server_version: "0.1.0".to_string(),
            },
            Arc::new(registry),
        )
    }

    fn request(raw: serde_json::Value) -> MCPRequest {
        serde_json::from_value(raw).unwrap()
    }

    #[tokio::test]
    async fn initialize_reports_protocol_and_server_info() {
        let server = test_server();
        let resp = server
            .handle(request(serde_json::json!({"jsonrpc": "2.0", "id": 1, "method": "initialize"})))
            .await
            .unwrap();
        let result = resp.result().unwrap();
        assert_eq!(result["protocolVersion"], PROTOCOL_VERSION);
        assert_eq!(result["serverInfo"]["name"], "ofac_party_service");
        assert!(result["capabilities"]["tools"].is_object());
    }

    #[tokio::test]
    async fn tools_list_uses_camel_case_schema() {
        let server = test_server();
        let resp = server
            .handle(request(serde_json::json!({"jsonrpc": "2.0", "id": "a", "method": "tools/list"})))
            .await
            .unwrap();
        let tools = resp.result().unwrap()["tools"].as_array().unwrap().clone();
        assert_eq!(tools.len(), 2);
        assert!(tools[0].get("inputSchema").is_some());
        assert!(tools[0].get("input_schema").is_none());
    }

    #[tokio::test]
    async fn tools_call_wraps_results_and_errors() {
        let server = test_server();
        let resp = server
            .handle(request(serde_json::json!({
                "jsonrpc": "2.0", "id": 2, "method": "tools/call",
                "params": {"name": "echo_args", "arguments": {"x": 1}}
            })))
            .await
            .unwrap();
        let result = resp.result().unwrap();
        assert_eq!(result["isError"], false);
        assert_eq!(result["content"][0]["text"], "{\"x\":1}");

        let resp = server
            .handle(request(serde_json::json!({
                "jsonrpc": "2.0", "id": 3, "method": "tools/call",
                "params": {"name": "always_fails"}
            })))
            .await
            .unwrap();
        let result = resp.result().unwrap();
        assert_eq!(result["isError"], true);
        assert_eq!(result["content"][0]["text"], "Error: boom");
    }

    #[tokio::test]
    async fn protocol_errors_use_json_rpc_codes() {
        let server = test_server();
        let resp = server
            .handle(request(serde_json::json!({"jsonrpc": "2.0", "id": 4, "method": "resources/list"})))
            .await
            .unwrap();
        assert_eq!(resp.error_code(), Some(METHOD_NOT_FOUND));

        let resp = server
            .handle(request(serde_json::json!({
                "jsonrpc": "2.0", "id": 5, "method": "tools/call",
                "params": {"name": "missing_tool"}
            })))
            .await
            .unwrap();
        assert_eq!(resp.error_code(), Some(METHOD_NOT_FOUND));

        let resp = server
            .handle(request(serde_json::json!({"jsonrpc": "2.0", "id": 6, "method": "tools/call"})))
            .await
            .unwrap();
        assert_eq!(resp.error_code(), Some(INVALID_PARAMS));
    }

    #[tokio::test]
    async fn notifications_get_no_response() {
        let server = test_server();
        let resp = server
            .handle(request(serde_json::json!({"jsonrpc": "2.0", "method": "notifications/initialized"})))
            .await;
        assert!(resp.is_none());
    }

    #[test]
    fn parse_errors_keep_the_id_when_possible() {
        let err = parse_request(br#"{"id": 9, "method": 42}"#).unwrap_err();
        assert_eq!(err.id(), Some(&serde_json::json!(9)));
        assert_eq!(err.error_code(), Some(PARSE_ERROR));

        let err = parse_request(b"not json").unwrap_err();
        assert!(err.id().is_none());
    }

    #[tokio::test]
    async fn stdio_loop_answers_requests_line_by_line() {
        let server = test_server();
        let input = concat!(
            "{\"jsonrpc\":\"2.0\",\"id\":1,\"method\":\"ping\"}\n",
            "\n",
            "{\"jsonrpc\":\"2.0\",\"method\":\"notifications/initialized\"}\n",
            "garbage\n",
            "{\"id\":7,\"method\":true}\n",
            "{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"tools/list\"}\n",
        );
        let mut output = Vec::new();
        serve_lines(&server, input.as_bytes(), &mut output).await.unwrap();

        let lines: Vec<serde_json::Value> = String::from_utf8(output)
            .unwrap()
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0]["id"], 1);
        assert_eq!(lines[0]["result"], serde_json::json!({}));
        assert_eq!(lines[1]["id"], 7);
        assert_eq!(lines[1]["error"]["code"], PARSE_ERROR);
        assert_eq!(lines[2]["id"], 2);
    }

    #[actix_web::test]
    async fn http_transport_routes_json_rpc() {
        use actix_web::test;

        let app = test::init_service(
            App::new()
                .app_data(web::Data::new(test_server()))
                .app_data(web::Data::new(AtomicU64::new(0)))
                .app_data(web::Data::new(SseSessions::default()))
                .app_data(web::Data::new(AppState {
                    server_name: "ofac_party_service".to_string(),
                    server_version: "0.1.0".to_string(),
                }))
                .app_data(web::Data::new(PartyStore::new("/nonexistent/ofac_demo.db")))
                .configure(configure),
        )
        .await;

        let req = test::TestRequest::post()
            .uri("/mcp")
            .set_payload(r#"{"jsonrpc":"2.0","id":1,"method":"tools/list"}"#)
            .to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["id"], 1);
        assert_eq!(body["result"]["tools"].as_array().unwrap().len(), 2);

        let req = test::TestRequest::post()
            .uri("/")
            .set_payload(r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#)
            .to_request();
        let resp = test::call_service(&app, req).await;
        assert_eq!(resp.status(), actix_web::http::StatusCode::ACCEPTED);

        let req = test::TestRequest::get().uri("/metrics").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["requests_total"], 2);

        let req = test::TestRequest::get().uri("/health").to_request();
        let body: serde_json::Value = test::call_and_read_body_json(&app, req).await;
        assert_eq!(body["status"], "ok");
        assert_eq!(body["database"], false);

        let req = test::TestRequest::get().uri("/sse").to_request();
        let body = test::call_and_read_body(&app, req).await;
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.contains("\"count\":2"));
    }
}
