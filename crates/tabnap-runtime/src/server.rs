//! Control socket: JSON-RPC 2.0 over a Unix domain socket.
//! One newline-terminated request and one response per connection.
//!
//! Serves both the browser bridge (events in, `pull_commands` out) and the
//! CLI queries.

use std::path::Path;
#[cfg(unix)]
use std::os::unix::fs::PermissionsExt;

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};

use tabnap_host::CommandQueue;

use crate::coordinator::Coordinator;
use crate::protocol::BrowserEvent;

const METHOD_NOT_FOUND: i64 = -32601;
const INVALID_PARAMS: i64 = -32602;
const SERVER_ERROR: i64 = -32000;

const DEFAULT_PULL_LIMIT: u64 = 100;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct RpcError {
    pub code: i64,
    pub message: String,
}

impl RpcError {
    fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// Create the socket directory (0700) and clear a stale socket file.
/// Fails if a live daemon already answers on `socket_path`.
async fn prepare_socket(socket_path: &Path) -> anyhow::Result<()> {
    let socket_dir = socket_path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path {}", socket_path.display()))?;
    std::fs::create_dir_all(socket_dir)?;
    #[cfg(unix)]
    std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;

    if socket_path.exists() {
        if UnixStream::connect(socket_path).await.is_ok() {
            anyhow::bail!("another daemon is already running at {}", socket_path.display());
        }
        std::fs::remove_file(socket_path)?;
        tracing::info!("removed stale socket at {}", socket_path.display());
    }
    Ok(())
}

/// Run the UDS JSON-RPC server until the listener fails.
pub async fn run_server(
    socket_path: &str,
    coordinator: Coordinator<CommandQueue>,
) -> anyhow::Result<()> {
    let path = Path::new(socket_path);
    prepare_socket(path).await?;

    let listener = UnixListener::bind(path)?;
    #[cfg(unix)]
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;

    tracing::info!("control socket listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let coordinator = coordinator.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, coordinator).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: UnixStream,
    coordinator: Coordinator<CommandQueue>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let id = request["id"].clone();

    let response = match dispatch(&coordinator, method, &request["params"]).await {
        Ok(result) => json!({
            "jsonrpc": "2.0",
            "result": result,
            "id": id,
        }),
        Err(e) => {
            tracing::debug!("{method}: {} ({})", e.message, e.code);
            json!({
                "jsonrpc": "2.0",
                "error": {"code": e.code, "message": e.message},
                "id": id,
            })
        }
    };

    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

fn encode<T: serde::Serialize>(value: T) -> Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(SERVER_ERROR, e.to_string()))
}

pub(crate) async fn dispatch(
    coordinator: &Coordinator<CommandQueue>,
    method: &str,
    params: &Value,
) -> Result<Value, RpcError> {
    match method {
        "list_tabs" => encode(coordinator.list_tabs().await),
        "status" => encode(coordinator.status().await),
        "get_prefs" => encode(&*coordinator.prefs().current()),
        "set_prefs" => {
            let delta = coordinator
                .prefs()
                .apply_patch(params)
                .map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))?;
            Ok(json!({"changed": delta.keys}))
        }
        "reload_prefs" => {
            let delta = coordinator
                .prefs()
                .reload()
                .map_err(|e| RpcError::new(SERVER_ERROR, e.to_string()))?;
            Ok(json!({"changed": delta.keys}))
        }
        "run_census" => encode(coordinator.run_census().await),
        "pull_commands" => {
            let cursor = params["cursor"].as_u64().unwrap_or(0);
            let limit = params["limit"].as_u64().unwrap_or(DEFAULT_PULL_LIMIT) as usize;
            encode(coordinator.host().pull(cursor, limit))
        }
        m if BrowserEvent::is_event_method(m) => {
            let event = BrowserEvent::from_rpc(m, params)
                .map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))?;
            coordinator
                .handle_event(event)
                .await
                .map_err(|e| RpcError::new(SERVER_ERROR, e.to_string()))?;
            Ok(json!({"ok": true}))
        }
        _ => Err(RpcError::new(METHOD_NOT_FOUND, "method not found")),
    }
}
