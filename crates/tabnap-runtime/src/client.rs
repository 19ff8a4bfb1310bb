//! UDS JSON-RPC client for CLI subcommands.

use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use tabnap_core::TabId;

pub(crate) async fn rpc_call(socket_path: &str, method: &str, params: Value) -> anyhow::Result<Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .map_err(|e| anyhow::anyhow!("cannot connect to daemon at {socket_path}: {e}"))?;

    let (reader, mut writer) = stream.into_split();

    let request = json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut req = serde_json::to_string(&request)?;
    req.push('\n');
    writer.write_all(req.as_bytes()).await?;
    writer.shutdown().await?;

    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let response: Value = serde_json::from_str(line.trim())?;

    if let Some(error) = response.get("error") {
        anyhow::bail!("RPC error: {error}");
    }

    Ok(response["result"].clone())
}

/// `tabnap status`
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let status = rpc_call(socket_path, "status", json!({})).await?;
    print!("{}", format_status(&status));
    Ok(())
}

/// `tabnap tabs`
pub async fn cmd_tabs(socket_path: &str) -> anyhow::Result<()> {
    let tabs = rpc_call(socket_path, "list_tabs", json!({})).await?;
    for line in format_tabs(&tabs) {
        println!("{line}");
    }
    Ok(())
}

/// `tabnap discard TAB [--force]`
pub async fn cmd_discard(socket_path: &str, tab_id: TabId, force: bool) -> anyhow::Result<()> {
    let method = if force { "bypass_discard" } else { "can_discard" };
    rpc_call(socket_path, method, json!({"tab_id": tab_id})).await?;
    println!("discard requested for tab {tab_id}");
    Ok(())
}

/// `tabnap prefs`
pub async fn cmd_prefs(socket_path: &str) -> anyhow::Result<()> {
    let prefs = rpc_call(socket_path, "get_prefs", json!({})).await?;
    println!("{}", serde_json::to_string_pretty(&prefs)?);
    Ok(())
}

/// `tabnap set KEY VALUE`
pub async fn cmd_set(socket_path: &str, key: &str, value: &str) -> anyhow::Result<()> {
    let mut patch = serde_json::Map::new();
    patch.insert(key.to_string(), parse_value(value));
    let result = rpc_call(socket_path, "set_prefs", Value::Object(patch)).await?;
    let changed = result["changed"].as_array().map_or(0, Vec::len);
    if changed == 0 {
        println!("{key}: unchanged");
    } else {
        println!("{key}: updated");
    }
    Ok(())
}

/// `tabnap census`
pub async fn cmd_census(socket_path: &str) -> anyhow::Result<()> {
    let outcome = rpc_call(socket_path, "run_census", json!({})).await?;
    println!("{}", format_census(&outcome));
    Ok(())
}

/// JSON if it parses, otherwise the raw word as a string.
pub(crate) fn parse_value(raw: &str) -> Value {
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

pub(crate) fn format_status(status: &Value) -> String {
    let mut out = String::new();
    out.push_str(&format!(
        "mode: {}  period: {}s  number: {}\n",
        status["mode"].as_str().unwrap_or("?"),
        status["period"].as_u64().unwrap_or(0),
        status["number"].as_u64().unwrap_or(0),
    ));
    out.push_str(&format!(
        "tabs: {} ({} web, {} discarded, {} agents)\n",
        status["tabs"].as_u64().unwrap_or(0),
        status["web_tabs"].as_u64().unwrap_or(0),
        status["discarded"].as_u64().unwrap_or(0),
        status["agents"].as_u64().unwrap_or(0),
    ));
    let stats = &status["stats"];
    out.push_str(&format!(
        "discards: {}  refused: {}  restored: {}  reloaded: {}\n",
        stats["discarded"].as_u64().unwrap_or(0),
        stats["refused"].as_u64().unwrap_or(0),
        stats["restored"].as_u64().unwrap_or(0),
        stats["reloaded"].as_u64().unwrap_or(0),
    ));
    if let Some(at) = status["last_census"]["at"].as_str() {
        out.push_str(&format!(
            "last census: {at} ({})\n",
            format_census(&status["last_census"])
        ));
    }
    out
}

pub(crate) fn format_census(outcome: &Value) -> String {
    let candidates = outcome["candidates"]
        .as_array()
        .map(|ids| {
            ids.iter()
                .filter_map(Value::as_u64)
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
        })
        .unwrap_or_default();
    let mut line = format!(
        "{} open, {} eligible",
        outcome["open"].as_u64().unwrap_or(0),
        outcome["eligible"].as_u64().unwrap_or(0),
    );
    if candidates.is_empty() {
        line.push_str(", nothing to discard");
    } else {
        line.push_str(&format!(", discarding {}", candidates.join(" ")));
    }
    line
}

/// One line per tab: id, flags, title (or URL).
///
/// Flags: `A` active, `P` pinned, `S` audible, `D` discarded, `*` has agent.
pub(crate) fn format_tabs(tabs: &Value) -> Vec<String> {
    let Some(arr) = tabs.as_array() else {
        return Vec::new();
    };
    arr.iter()
        .map(|tab| {
            let flag = |key: &str, c: char| if tab[key].as_bool() == Some(true) { c } else { '-' };
            let flags: String = [
                flag("active", 'A'),
                flag("pinned", 'P'),
                flag("audible", 'S'),
                flag("discarded", 'D'),
                flag("has_agent", '*'),
            ]
            .iter()
            .collect();
            let title = tab["title"].as_str().filter(|t| !t.is_empty());
            let label = title.or_else(|| tab["url"].as_str()).unwrap_or("");
            format!(
                "{:>6} w{:<3} {flags} {label}",
                tab["tab_id"].as_u64().unwrap_or(0),
                tab["window_id"].as_u64().unwrap_or(0),
            )
        })
        .collect()
}
