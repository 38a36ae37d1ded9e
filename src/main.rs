/// OFAC Party Service Entry Point
///
/// Serves the OFAC sanctioned-party REST API and an MCP server exposing the
/// `get_ofac_party_info` and `search_party` tools. Configuration comes from
/// environment variables (optionally via `.env`); see `core::config`.
///
/// Transport modes (MCP_TRANSPORT_MODE):
/// - "http": REST API + MCP (POST /mcp, SSE /mcp/sse) on one listener
/// - "stdio": MCP over stdin/stdout only
/// - "both": STDIO in the background, HTTP in the foreground

mod core;
mod ofac;
mod tools;

use std::sync::Arc;

use crate::core::config::{ServerConfig, TransportMode};
use crate::core::logging;
use crate::core::server::{self, AppState, McpServer};
use crate::ofac::store::PartyStore;
use crate::tools::client::OfacApiClient;

#[tokio::main]
async fn main() -> std::io::Result<()> {
    let config = match ServerConfig::from_env() {
        Ok(config) => config,
        Err(e) => {
            logging::init_stderr();
            tracing::error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };

    logging::init(&config.log_dir, &config.log_file_name);

    let store = PartyStore::new(&config.db_file);
    if !store.db_path().exists() {
        tracing::warn!(
            "Database file {} not found; party lookups will fail until it exists",
            store.db_path().display()
        );
    }

    let client = match OfacApiClient::from_config(&config) {
        Ok(client) => Arc::new(client),
        Err(e) => {
            tracing::error!("Could not build HTTP client: {}", e);
            std::process::exit(1);
        }
    };
    tracing::info!("API_ENDPOINT = {}", client.api_endpoint());
    tracing::info!("SEARCH_ENDPOINT = {}", client.search_endpoint());

    let mcp = McpServer::new(
        AppState {
            server_name: config.server_name.clone(),
            server_version: config.server_version.clone(),
        },
        server::initialize_tools(client),
    );

    match config.transport {
        TransportMode::Stdio => server::run_server_stdio(mcp).await,
        TransportMode::Http => run_http(&config, mcp, store).await,
        TransportMode::Both => {
            // STDIO for local MCP clients while the HTTP endpoints stay available
            let stdio_server = mcp.clone();
            let stdio_handle = tokio::spawn(async move {
                if let Err(e) = server::run_server_stdio(stdio_server).await {
                    tracing::error!("STDIO server error: {}", e);
                }
            });

            let http_result = run_http(&config, mcp, store).await;

            // If HTTP server exits, abort STDIO task
            stdio_handle.abort();
            http_result
        }
    }
}

async fn run_http(config: &ServerConfig, mcp: McpServer, store: PartyStore) -> std::io::Result<()> {
    let result = server::run_server_http(config, mcp, store).await;
    if let Err(e) = &result {
        tracing::error!("Server startup failed: {}", e);
    }
    result
}
