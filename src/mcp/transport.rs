//! MCP transport - JSON-RPC over HTTP or SSE
//!
//! Each configured server gets one transport. Plain HTTP POSTs the
//! envelope and reads a JSON body; the SSE variant POSTs the envelope
//! and reads the response off a `text/event-stream`, taking the first
//! `data:` event that answers the request id.

use futures::StreamExt;
use reqwest::{header, Client};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

use super::protocol::{McpContent, McpRequest, McpResponse, McpTool, McpToolResult};
use crate::config::McpServerConfig;
use crate::error::{Error, Result};

/// Per-server timeout for tools/list during discovery
pub const LIST_TOOLS_TIMEOUT: Duration = Duration::from_secs(30);

/// Per-call timeout for tools/call
pub const CALL_TOOL_TIMEOUT: Duration = Duration::from_secs(60);

/// Wire flavor used to reach a server
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// POST the envelope, read a JSON body
    Http,
    /// POST the envelope, read the response off an event stream
    Sse,
}

impl TransportKind {
    /// Pick the transport for a server: explicit configuration wins,
    /// otherwise URLs whose path mentions `sse` get the SSE flavor.
    pub fn for_server(config: &McpServerConfig) -> TransportKind {
        if let Some(kind) = config.transport {
            return kind;
        }
        match Url::parse(&config.url) {
            Ok(url) if url.path().to_ascii_lowercase().contains("sse") => TransportKind::Sse,
            _ => TransportKind::Http,
        }
    }
}

/// JSON-RPC client for one MCP server
pub struct McpTransport {
    client: Client,
    server_name: String,
    url: String,
    headers: header::HeaderMap,
    kind: TransportKind,
    next_id: AtomicU64,
}

impl McpTransport {
    /// Build a transport from server configuration.
    ///
    /// Extra headers from the configuration are merged into every
    /// request sent to this server.
    pub fn new(server_name: impl Into<String>, config: &McpServerConfig) -> Result<Self> {
        let server_name = server_name.into();

        Url::parse(&config.url)
            .map_err(|e| Error::Config(format!("invalid MCP url for '{}': {}", server_name, e)))?;

        let mut headers = header::HeaderMap::new();
        for (key, value) in &config.headers {
            let name = header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| Error::Config(format!("invalid MCP header '{}': {}", key, e)))?;
            let value = header::HeaderValue::from_str(value)
                .map_err(|e| Error::Config(format!("invalid MCP header value for '{}': {}", key, e)))?;
            headers.insert(name, value);
        }

        Ok(McpTransport {
            client: Client::new(),
            kind: TransportKind::for_server(config),
            server_name,
            url: config.url.clone(),
            headers,
            next_id: AtomicU64::new(1),
        })
    }

    /// The server this transport talks to
    pub fn server_name(&self) -> &str {
        &self.server_name
    }

    /// The server's URL
    pub fn url(&self) -> &str {
        &self.url
    }

    /// List available tools from the server
    pub async fn list_tools(&self) -> Result<Vec<McpTool>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .send(McpRequest::list_tools(id), LIST_TOOLS_TIMEOUT)
            .await?;

        let result = response.result.unwrap_or_default();
        let tools: Vec<McpTool> = result
            .get("tools")
            .and_then(|t| serde_json::from_value(t.clone()).ok())
            .unwrap_or_default();

        debug!(server = %self.server_name, count = tools.len(), "listed MCP tools");
        Ok(tools)
    }

    /// Call a tool on the server.
    ///
    /// Extracts the first textual content item into `result`, keeps the
    /// structured content when no text is present, and attaches
    /// `_meta = {server, tool, timestamp}`.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<HashMap<String, Value>> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let response = self
            .send(McpRequest::call_tool(id, name, arguments), CALL_TOOL_TIMEOUT)
            .await?;

        let raw = response.result.unwrap_or_default();
        let mut output = HashMap::new();

        match serde_json::from_value::<McpToolResult>(raw.clone()) {
            Ok(tool_result) => {
                if tool_result.is_error {
                    let text = tool_result
                        .content
                        .iter()
                        .filter_map(McpContent::as_text)
                        .collect::<Vec<_>>()
                        .join("\n");
                    return Err(Error::Mcp(if text.is_empty() {
                        format!("tool '{}' reported an error", name)
                    } else {
                        text
                    }));
                }

                match tool_result.content.iter().find_map(|c| c.as_text()) {
                    Some(text) => {
                        output.insert("result".to_string(), Value::String(text.to_string()));
                    }
                    None => {
                        output.insert(
                            "content".to_string(),
                            serde_json::to_value(&tool_result.content)?,
                        );
                    }
                }
            }
            // Servers that return a bare result object rather than the
            // content-array shape.
            Err(_) => {
                output.insert("content".to_string(), raw);
            }
        }

        output.insert(
            "_meta".to_string(),
            serde_json::json!({
                "server": self.server_name,
                "tool": name,
                "timestamp": chrono::Utc::now().to_rfc3339(),
            }),
        );

        Ok(output)
    }

    async fn send(&self, request: McpRequest, timeout: Duration) -> Result<McpResponse> {
        let response = match self.kind {
            TransportKind::Http => self.send_http(&request, timeout).await?,
            TransportKind::Sse => self.send_sse(&request, timeout).await?,
        };

        if let Some(err) = response.error {
            warn!(
                server = %self.server_name,
                method = %request.method,
                code = err.code,
                "MCP server returned error"
            );
            return Err(Error::Mcp(err.message));
        }

        Ok(response)
    }

    async fn send_http(&self, request: &McpRequest, timeout: Duration) -> Result<McpResponse> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Mcp(format!(
                "server '{}' returned {}: {}",
                self.server_name, status, body
            )));
        }

        Ok(response.json::<McpResponse>().await?)
    }

    async fn send_sse(&self, request: &McpRequest, timeout: Duration) -> Result<McpResponse> {
        let response = self
            .client
            .post(&self.url)
            .headers(self.headers.clone())
            .header(header::ACCEPT, "text/event-stream")
            .timeout(timeout)
            .json(request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Mcp(format!(
                "server '{}' returned {}: {}",
                self.server_name, status, body
            )));
        }

        let mut stream = response.bytes_stream();
        let mut buffer = String::new();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            buffer.push_str(&String::from_utf8_lossy(&chunk));

            // Events are newline-delimited; a data: line carries one envelope.
            while let Some(pos) = buffer.find('\n') {
                let line = buffer[..pos].trim().to_string();
                buffer.drain(..=pos);

                let Some(payload) = line.strip_prefix("data:") else {
                    continue;
                };
                let payload = payload.trim();
                if payload.is_empty() {
                    continue;
                }

                match serde_json::from_str::<McpResponse>(payload) {
                    Ok(parsed) if parsed.id.is_none() || parsed.id == Some(request.id) => {
                        return Ok(parsed);
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        debug!(server = %self.server_name, error = %e, "skipping non-envelope SSE event");
                    }
                }
            }
        }

        Err(Error::Mcp(format!(
            "server '{}' closed the event stream without answering request {}",
            self.server_name, request.id
        )))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn server_config(url: String) -> McpServerConfig {
        McpServerConfig {
            url,
            headers: HashMap::from([("x-api-key".to_string(), "secret".to_string())]),
            transport: None,
        }
    }

    #[test]
    fn test_transport_selection_by_url_shape() {
        let http = server_config("http://localhost:9000/mcp".to_string());
        assert_eq!(TransportKind::for_server(&http), TransportKind::Http);

        let sse = server_config("http://localhost:9000/sse".to_string());
        assert_eq!(TransportKind::for_server(&sse), TransportKind::Sse);

        let mut forced = server_config("http://localhost:9000/mcp".to_string());
        forced.transport = Some(TransportKind::Sse);
        assert_eq!(TransportKind::for_server(&forced), TransportKind::Sse);
    }

    #[tokio::test]
    async fn test_list_tools_over_http() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/mcp"))
            .and(body_partial_json(serde_json::json!({"method": "tools/list"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"tools": [
                    {"name": "search", "description": "Search the web",
                     "inputSchema": {"type": "object", "properties": {"q": {"type": "string"}}}}
                ]}
            })))
            .mount(&server)
            .await;

        let transport =
            McpTransport::new("alpha", &server_config(format!("{}/mcp", server.uri()))).unwrap();
        let tools = transport.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "search");
    }

    #[tokio::test]
    async fn test_extra_headers_are_sent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(wiremock::matchers::header("x-api-key", "secret"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0", "id": 1, "result": {"tools": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let transport =
            McpTransport::new("alpha", &server_config(format!("{}/mcp", server.uri()))).unwrap();
        transport.list_tools().await.unwrap();
    }

    #[tokio::test]
    async fn test_call_tool_extracts_first_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(serde_json::json!({"method": "tools/call"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"content": [
                    {"type": "text", "text": "first"},
                    {"type": "text", "text": "second"}
                ]}
            })))
            .mount(&server)
            .await;

        let transport =
            McpTransport::new("alpha", &server_config(format!("{}/mcp", server.uri()))).unwrap();
        let output = transport
            .call_tool("search", serde_json::json!({"q": "rust"}))
            .await
            .unwrap();

        assert_eq!(output["result"], Value::from("first"));
        assert_eq!(output["_meta"]["server"], "alpha");
        assert_eq!(output["_meta"]["tool"], "search");
    }

    #[tokio::test]
    async fn test_call_tool_keeps_structured_content_without_text() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "result": {"content": [
                    {"type": "image", "data": "aGk=", "mimeType": "image/png"}
                ]}
            })))
            .mount(&server)
            .await;

        let transport =
            McpTransport::new("alpha", &server_config(format!("{}/mcp", server.uri()))).unwrap();
        let output = transport
            .call_tool("render", serde_json::json!({}))
            .await
            .unwrap();

        assert!(output.contains_key("content"));
        assert!(!output.contains_key("result"));
        assert_eq!(output["content"][0]["type"], "image");
    }

    #[tokio::test]
    async fn test_jsonrpc_error_message_propagates_verbatim() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32000, "message": "tool exploded: index unavailable"}
            })))
            .mount(&server)
            .await;

        let transport =
            McpTransport::new("alpha", &server_config(format!("{}/mcp", server.uri()))).unwrap();
        let err = transport
            .call_tool("search", serde_json::json!({}))
            .await
            .unwrap_err();

        assert_eq!(err.to_string(), "MCP error: tool exploded: index unavailable");
    }

    #[tokio::test]
    async fn test_sse_response_parsed_from_data_events() {
        let server = MockServer::start().await;
        let body = concat!(
            ": keep-alive\n",
            "event: message\n",
            "data: {\"jsonrpc\":\"2.0\",\"id\":1,\"result\":{\"tools\":[{\"name\":\"lookup\"}]}}\n",
            "\n"
        );
        Mock::given(method("POST"))
            .and(path("/sse"))
            .respond_with(
                ResponseTemplate::new(200)
                    .insert_header("content-type", "text/event-stream")
                    .set_body_string(body),
            )
            .mount(&server)
            .await;

        let transport =
            McpTransport::new("alpha", &server_config(format!("{}/sse", server.uri()))).unwrap();
        let tools = transport.list_tools().await.unwrap();
        assert_eq!(tools.len(), 1);
        assert_eq!(tools[0].name, "lookup");
    }

    #[tokio::test]
    async fn test_http_status_error_is_mcp_error() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(503).set_body_string("down"))
            .mount(&server)
            .await;

        let transport =
            McpTransport::new("alpha", &server_config(format!("{}/mcp", server.uri()))).unwrap();
        let err = transport.list_tools().await.unwrap_err();
        assert!(matches!(err, Error::Mcp(_)));
        assert!(err.is_retryable());
    }
}
