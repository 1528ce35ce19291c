//! Simple MCP Client Example
//!
//! Demonstrates how to connect to the coordination server and drive a few
//! tool calls over the HTTP POST + SSE transport: open the SSE stream for
//! the welcome event and heartbeats, then issue JSON-RPC calls against
//! `/mcp/v1/rpc` with a bearer token.

use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_stream::StreamExt;
use url::Url;

#[derive(Serialize, Debug)]
struct JsonRpcRequest {
    jsonrpc: String,
    method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<Value>,
    id: u64,
}

#[derive(Deserialize, Debug)]
struct JsonRpcResponse {
    #[allow(dead_code)]
    jsonrpc: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<Value>,
    id: Value,
}

struct SimpleMcpClient {
    http_client: Client,
    base_url: Url,
    token: String,
    request_counter: u64,
}

impl SimpleMcpClient {
    fn new(base_url: &str, token: &str) -> Result<Self, Box<dyn std::error::Error>> {
        Ok(SimpleMcpClient {
            http_client: Client::new(),
            base_url: Url::parse(base_url)?,
            token: token.to_string(),
            request_counter: 0,
        })
    }

    async fn call(&mut self, method: &str, params: Option<Value>) -> Result<JsonRpcResponse, Box<dyn std::error::Error>> {
        self.request_counter += 1;
        let request_id = self.request_counter;

        let request_url = self.base_url.join("/mcp/v1/rpc")?;
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: method.to_string(),
            params,
            id: request_id,
        };

        println!("🚀 Sending: {} (ID: {})", method, request_id);

        let response = self
            .http_client
            .post(request_url)
            .bearer_auth(&self.token)
            .json(&request)
            .send()
            .await?
            .json::<JsonRpcResponse>()
            .await?;

        if let Some(error) = &response.error {
            println!("❌ Error: {}", serde_json::to_string_pretty(error)?);
        } else if let Some(result) = &response.result {
            println!("✅ Result: {}", serde_json::to_string_pretty(result)?);
        }

        Ok(response)
    }

    async fn listen_sse_events(&self) -> Result<(), Box<dyn std::error::Error>> {
        let sse_url = self.base_url.join("/mcp/v1")?;

        println!("🔄 Connecting to SSE stream: {}", sse_url);

        let response = self
            .http_client
            .get(sse_url)
            .header("Accept", "text/event-stream")
            .bearer_auth(&self.token)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(format!("SSE connection failed: {}", response.status()).into());
        }

        println!("✅ SSE connection established");

        let stream = response.bytes_stream();
        let reader = BufReader::new(stream.map(|r| r.map_err(std::io::Error::other)).into_async_read());
        let mut lines = reader.lines();

        while let Ok(Some(line)) = lines.next_line().await {
            let line = line.trim();
            if line.starts_with("data: ") {
                println!("📨 {}", &line[6..]);
            } else if line.starts_with("event: heartbeat") {
                println!("💓 heartbeat");
            }
        }

        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    println!("🎯 Agent-MCP Client Example");
    println!("===========================");

    let server_url = "http://127.0.0.1:3000";
    let token = std::env::var("AGENT_MCP_ADMIN_TOKEN").unwrap_or_else(|_| "dev-admin-token".to_string());

    let sse_client = SimpleMcpClient::new(server_url, &token)?;
    let sse_handle = tokio::spawn(async move {
        if let Err(e) = sse_client.listen_sse_events().await {
            eprintln!("SSE error: {}", e);
        }
    });

    tokio::time::sleep(Duration::from_millis(500)).await;

    let mut client = SimpleMcpClient::new(server_url, &token)?;

    println!("\n1️⃣ Health check");
    client.call("health_check", None).await?;

    println!("\n2️⃣ Create task");
    let create_params = json!({
        "title": "Write onboarding docs",
        "description": "Draft the quickstart guide for new agents",
        "priority": "medium",
    });
    let created = client.call("create_task", Some(create_params)).await?;
    let task_id = created
        .result
        .as_ref()
        .and_then(|r| r["task_id"].as_str())
        .map(str::to_string);

    println!("\n3️⃣ View tasks");
    client.call("view_tasks", Some(json!({}))).await?;

    if let Some(task_id) = task_id {
        println!("\n4️⃣ Add a note");
        client
            .call(
                "add_task_note",
                Some(json!({ "task_id": task_id, "content": "Picking this up now." })),
            )
            .await?;

        println!("\n5️⃣ Update task status");
        client
            .call(
                "update_task_status",
                Some(json!({ "task_id": task_id, "new_status": "in_progress" })),
            )
            .await?;
    }

    println!("\n6️⃣ Unknown method");
    client.call("no_such_tool", None).await?;

    println!("\n✅ Example completed. Ctrl+C to exit the SSE listener.");
    sse_handle.await?;

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_construction_parses_base_url() {
        let client = SimpleMcpClient::new("http://localhost:3000", "tok");
        assert!(client.is_ok());
    }

    #[test]
    fn json_rpc_request_serializes_expected_shape() {
        let request = JsonRpcRequest {
            jsonrpc: "2.0".to_string(),
            method: "view_tasks".to_string(),
            params: Some(json!({})),
            id: 1,
        };

        let serialized = serde_json::to_string(&request).unwrap();
        assert!(serialized.contains("\"jsonrpc\":\"2.0\""));
        assert!(serialized.contains("\"method\":\"view_tasks\""));
        assert!(serialized.contains("\"id\":1"));
    }
}
