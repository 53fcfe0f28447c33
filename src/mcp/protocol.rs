//! MCP wire protocol types
//!
//! JSON-RPC 2.0 envelopes plus the `tools/list` and `tools/call`
//! payload shapes of the Model Context Protocol.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// JSON-RPC request to an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRequest {
    pub jsonrpc: String,
    pub id: u64,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl McpRequest {
    /// Create a new MCP request
    pub fn new(id: u64, method: impl Into<String>, params: Option<Value>) -> Self {
        McpRequest {
            jsonrpc: "2.0".to_string(),
            id,
            method: method.into(),
            params,
        }
    }

    /// Create a tools/list request
    pub fn list_tools(id: u64) -> Self {
        Self::new(id, "tools/list", None)
    }

    /// Create a tools/call request
    pub fn call_tool(id: u64, name: impl Into<String>, arguments: Value) -> Self {
        Self::new(
            id,
            "tools/call",
            Some(serde_json::json!({
                "name": name.into(),
                "arguments": arguments
            })),
        )
    }
}

/// JSON-RPC response from an MCP server
///
/// A message is an error iff `error` is present; its `message` field
/// propagates to the caller verbatim.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpResponse {
    pub jsonrpc: String,
    pub id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<McpRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpRpcError {
    pub code: i64,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Tool definition advertised by an MCP server
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpTool {
    /// Tool name
    pub name: String,
    /// Tool description
    #[serde(default)]
    pub description: String,
    /// Input schema (JSON Schema object with properties/required)
    #[serde(rename = "inputSchema", default = "default_schema")]
    pub input_schema: Value,
}

fn default_schema() -> Value {
    serde_json::json!({"type": "object", "properties": {}})
}

/// Result payload of a tools/call response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpToolResult {
    #[serde(default)]
    pub content: Vec<McpContent>,
    #[serde(rename = "isError", default)]
    pub is_error: bool,
}

/// One typed content item in a tool result
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum McpContent {
    /// Plain text
    Text { text: String },
    /// Base64 image data
    Image {
        data: String,
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
    /// Embedded resource
    Resource { resource: Value },
}

impl McpContent {
    /// Text payload if this is a text item
    pub fn as_text(&self) -> Option<&str> {
        match self {
            McpContent::Text { text } => Some(text),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_call_tool_request_shape() {
        let request = McpRequest::call_tool(7, "search", serde_json::json!({"q": "rust"}));
        let json = serde_json::to_value(&request).unwrap();
        assert_eq!(json["jsonrpc"], "2.0");
        assert_eq!(json["id"], 7);
        assert_eq!(json["method"], "tools/call");
        assert_eq!(json["params"]["name"], "search");
        assert_eq!(json["params"]["arguments"]["q"], "rust");
    }

    #[test]
    fn test_list_tools_request_omits_params() {
        let json = serde_json::to_value(McpRequest::list_tools(1)).unwrap();
        assert_eq!(json["method"], "tools/list");
        assert!(json.get("params").is_none());
    }

    #[test]
    fn test_tool_parses_with_missing_schema() {
        let tool: McpTool = serde_json::from_value(serde_json::json!({
            "name": "search",
            "description": "Search the web"
        }))
        .unwrap();
        assert_eq!(tool.input_schema["type"], "object");
    }

    #[test]
    fn test_content_items_are_tagged() {
        let result: McpToolResult = serde_json::from_value(serde_json::json!({
            "content": [
                {"type": "text", "text": "hello"},
                {"type": "image", "data": "aGk=", "mimeType": "image/png"}
            ]
        }))
        .unwrap();
        assert_eq!(result.content.len(), 2);
        assert_eq!(result.content[0].as_text(), Some("hello"));
        assert!(result.content[1].as_text().is_none());
        assert!(!result.is_error);
    }

    #[test]
    fn test_error_response_parses() {
        let response: McpResponse = serde_json::from_value(serde_json::json!({
            "jsonrpc": "2.0",
            "id": 3,
            "error": {"code": -32601, "message": "method not found"}
        }))
        .unwrap();
        assert_eq!(response.error.unwrap().message, "method not found");
        assert!(response.result.is_none());
    }
}
