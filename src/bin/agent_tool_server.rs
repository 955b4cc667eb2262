//! MCP-style JSON-RPC-over-stdio tool server for the Optimization Agent
//!: exposes the agent's tool-loop contract so a host language
//! model can drive dispatch decisions turn by turn, following the
//! `tools/list` / `tools/call` protocol shape of the teacher's
//! `bin/mcp_server.rs`.

use std::io::{self, BufRead, Write};
use std::sync::Arc;

use anyhow::Result;
use last_mile_dispatch::agent::tools;
use last_mile_dispatch::config::Config;
use last_mile_dispatch::db;
use last_mile_dispatch::identity::{StaticIdentityService, User};
use last_mile_dispatch::models::ActorRole;
use last_mile_dispatch::notification::LoggingNotificationSink;
use last_mile_dispatch::services::Services;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

#[derive(Debug, Deserialize)]
struct JsonRpcRequest {
    #[allow(dead_code)]
    jsonrpc: String,
    id: Option<Value>,
    method: String,
    params: Option<Value>,
}

#[derive(Debug, Serialize)]
struct JsonRpcResponse {
    jsonrpc: String,
    id: Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<JsonRpcError>,
}

#[derive(Debug, Serialize)]
struct JsonRpcError {
    code: i32,
    message: String,
}

fn get_server_info() -> Value {
    json!({
        "protocolVersion": "2024-11-05",
        "capabilities": { "tools": {} },
        "serverInfo": {
            "name": "dispatch-optimization-agent",
            "version": "1.0.0"
        }
    })
}

async fn handle_request(services: &Services, request: JsonRpcRequest) -> JsonRpcResponse {
    let id = request.id.unwrap_or(Value::Null);

    let result = match request.method.as_str() {
        "initialize" => Ok(get_server_info()),
        "tools/list" => Ok(json!({ "tools": tools::tool_schemas() })),
        "tools/call" => {
            if let Some(params) = request.params {
                let name = params.get("name").and_then(|v| v.as_str()).unwrap_or("");
                let empty_args = json!({});
                let args = params.get("arguments").unwrap_or(&empty_args);
                match tools::dispatch_tool(&services.agent, name, args).await {
                    Ok(result) => Ok(json!({
                        "content": [{
                            "type": "text",
                            "text": serde_json::to_string_pretty(&result).unwrap_or_default()
                        }]
                    })),
                    Err(err) => Ok(json!({
                        "content": [{ "type": "text", "text": format!("Error: {err}") }],
                        "isError": true
                    })),
                }
            } else {
                Err("Missing params")
            }
        }
        "notifications/initialized" => {
            return JsonRpcResponse {
                jsonrpc: "2.0".to_string(),
                id,
                result: None,
                error: None,
            };
        }
        _ => Err("Method not found"),
    };

    match result {
        Ok(r) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(r),
            error: None,
        },
        Err(msg) => JsonRpcResponse {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(JsonRpcError {
                code: -32601,
                message: msg.to_string(),
            }),
        },
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();
    let db = db::connect(&config.db_path).await?;
    db::init_schema(&db).await?;

    let identity = Arc::new(StaticIdentityService {
        user: User {
            user_id: "agent-tool-server".to_string(),
            role: ActorRole::WarehouseStaff,
            sme_id: None,
        },
    });
    let notifications = Arc::new(LoggingNotificationSink);
    let services = Services::build(db, config, identity, notifications);

    // MCP servers stay silent on stdout/stderr outside of the protocol
    // itself; debug info is opt-in.
    if std::env::var("DISPATCH_AGENT_DEBUG").is_ok() {
        eprintln!("dispatch optimization-agent tool server started");
    }

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    for line in stdin.lock().lines() {
        let line = line?;
        if line.is_empty() {
            continue;
        }

        match serde_json::from_str::<JsonRpcRequest>(&line) {
            Ok(request) => {
                let response = handle_request(&services, request).await;
                let response_json = serde_json::to_string(&response)?;
                writeln!(stdout, "{response_json}")?;
                stdout.flush()?;
            }
            Err(err) => {
                let error_response = JsonRpcResponse {
                    jsonrpc: "2.0".to_string(),
                    id: Value::Null,
                    result: None,
                    error: Some(JsonRpcError {
                        code: -32700,
                        message: format!("Parse error: {err}"),
                    }),
                };
                let response_json = serde_json::to_string(&error_response)?;
                writeln!(stdout, "{response_json}")?;
                stdout.flush()?;
            }
        }
    }

    Ok(())
}
