//! MCP over stdio, served by rmcp.
//!
//! rmcp ends the session on the first line it cannot decode, so input passes through
//! [`forward_messages`] first: lines that are not UTF-8 JSON-RPC client messages are
//! logged and dropped.

use anyhow::Context as _;
use apibridge_openapi_tools::{InvocationContext, OpenApiToolSource};
use rmcp::model::{
    CallToolRequestParams, CallToolResult, ClientJsonRpcMessage, Implementation,
    ListToolsResult, PaginatedRequestParams, ProtocolVersion, ServerCapabilities, ServerInfo,
};
use rmcp::service::RequestContext;
use rmcp::{ErrorData as McpError, RoleServer, ServerHandler, ServiceExt as _};
use serde_json::Value;
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt as _, AsyncRead, AsyncWrite, AsyncWriteExt as _, BufReader};

const PIPE_CAPACITY: usize = 64 * 1024;

/// MCP handler exposing one tool source.
#[derive(Clone)]
pub struct ApiBridgeServer {
    source: Arc<OpenApiToolSource>,
    ctx: Arc<InvocationContext>,
}

impl ApiBridgeServer {
    #[must_use]
    pub fn new(source: Arc<OpenApiToolSource>, ctx: InvocationContext) -> Self {
        Self {
            source,
            ctx: Arc::new(ctx),
        }
    }
}

impl ServerHandler for ApiBridgeServer {
    fn get_info(&self) -> ServerInfo {
        let catalog = self.source.catalog().ok();
        ServerInfo {
            protocol_version: ProtocolVersion::default(),
            capabilities: ServerCapabilities::builder().enable_tools().build(),
            server_info: Implementation {
                name: "apibridge".to_string(),
                title: catalog.as_ref().map(|c| c.title().to_string()),
                version: env!("CARGO_PKG_VERSION").to_string(),
                description: None,
                icons: None,
                website_url: None,
            },
            instructions: catalog.map(|c| {
                format!(
                    "Tools for {} ({} operations at {})",
                    c.title(),
                    c.len(),
                    c.base_url()
                )
            }),
        }
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParams>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        Ok(ListToolsResult {
            tools: self.source.list_tools(),
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParams,
        _context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let arguments = request.arguments.map_or(Value::Null, Value::Object);
        Ok(self.source.call_tool(&request.name, arguments, &self.ctx).await)
    }
}

/// Serve `server` until the client disconnects or `input` reaches EOF.
///
/// # Errors
///
/// Returns an error if the initialize handshake fails or the session task panics.
pub async fn serve<R, W>(server: ApiBridgeServer, input: R, output: W) -> anyhow::Result<()>
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (filtered, feed) = tokio::io::duplex(PIPE_CAPACITY);
    let forward = tokio::spawn(forward_messages(BufReader::new(input), feed));

    let service = server
        .serve((filtered, output))
        .await
        .context("MCP initialize handshake failed")?;
    let reason = service.waiting().await.context("MCP session task failed")?;
    tracing::info!(?reason, "MCP session ended");

    forward.abort();
    Ok(())
}

/// Copy decodable client messages from `input` to `output`, one per line. Blank lines
/// are skipped silently; anything else that fails to decode is logged and skipped.
pub async fn forward_messages<R, W>(mut input: R, mut output: W) -> std::io::Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut line = Vec::new();
    loop {
        line.clear();
        if input.read_until(b'\n', &mut line).await? == 0 {
            break;
        }
        let message = line.trim_ascii();
        if message.is_empty() {
            continue;
        }
        if let Err(reason) = decode_check(message) {
            tracing::warn!(bytes = message.len(), %reason, "dropping undecodable input line");
            continue;
        }
        output.write_all(message).await?;
        output.write_all(b"\n").await?;
        output.flush().await?;
    }
    output.shutdown().await
}

fn decode_check(message: &[u8]) -> Result<(), String> {
    let text = std::str::from_utf8(message).map_err(|e| format!("not UTF-8: {e}"))?;
    serde_json::from_str::<ClientJsonRpcMessage>(text)
        .map(|_| ())
        .map_err(|e| format!("not a JSON-RPC client message: {e}"))
}
