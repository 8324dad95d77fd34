//! Client-side helpers: one JSON-RPC exchange per connection, plus the
//! human-readable status rendering used by `status` and `watch`.

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;

use revsim_core::types::StatusSnapshot;

/// Send one request and return the JSON-RPC result.
pub async fn request(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<serde_json::Value> {
    let stream = UnixStream::connect(socket_path)
        .await
        .with_context(|| format!("cannot connect to daemon at {socket_path}"))?;
    let (reader, mut writer) = stream.into_split();

    let request = serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": 1,
    });
    let mut line = serde_json::to_string(&request)?;
    line.push('\n');
    writer.write_all(line.as_bytes()).await?;

    let mut reader = BufReader::new(reader);
    let mut response = String::new();
    reader.read_line(&mut response).await?;

    let response: serde_json::Value =
        serde_json::from_str(response.trim()).context("malformed daemon response")?;
    if let Some(error) = response.get("error") {
        anyhow::bail!("daemon error: {error}");
    }
    Ok(response["result"].clone())
}

/// Fetch a status snapshot.
pub async fn fetch_status(socket_path: &str) -> anyhow::Result<StatusSnapshot> {
    let result = request(socket_path, "status", serde_json::Value::Null).await?;
    serde_json::from_value(result).context("malformed status snapshot")
}

/// One-line status in the station's display format.
pub fn format_status_line(snap: &StatusSnapshot) -> String {
    let mut line = format!(
        "Batch {} | Item {}/{} | {} | OK:{} NG:{}",
        snap.batch_number, snap.item, snap.batch_size, snap.state, snap.ok_count, snap.ng_count
    );
    if snap.countdown.active {
        line.push_str(&format!(
            " | Timeout: {:.1}s",
            snap.countdown.remaining_ms as f64 / 1_000.0
        ));
    }
    if snap.timeout_pending {
        line.push_str(" | TIMED OUT");
    }
    if snap.lagging {
        line.push_str(" | LAG");
    }
    line
}

/// Print the status line plus any open popups.
pub async fn cmd_status(socket_path: &str) -> anyhow::Result<()> {
    let snap = fetch_status(socket_path).await?;
    println!("{}", format_status_line(&snap));
    for popup in &snap.popups {
        println!("popup #{}: {} - {}", popup.id, popup.title, popup.message);
    }
    Ok(())
}

/// Poll and print the status line until interrupted.
pub async fn cmd_watch(socket_path: &str, interval_ms: u64) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(tokio::time::Duration::from_millis(interval_ms.max(50)));
    loop {
        ticker.tick().await;
        match fetch_status(socket_path).await {
            Ok(snap) => println!("{}", format_status_line(&snap)),
            Err(e) => {
                eprintln!("watch: {e}");
                return Err(e);
            }
        }
    }
}

/// Fire a command and print the raw reply.
pub async fn cmd_simple(
    socket_path: &str,
    method: &str,
    params: serde_json::Value,
) -> anyhow::Result<()> {
    let result = request(socket_path, method, params).await?;
    println!("{result}");
    Ok(())
}

/// Print transition-log entries after `since`.
pub async fn cmd_transitions(socket_path: &str, since: u64) -> anyhow::Result<()> {
    let result = request(
        socket_path,
        "transitions",
        serde_json::json!({ "since_seq": since }),
    )
    .await?;
    if let Some(entries) = result["transitions"].as_array() {
        for entry in entries {
            println!("{entry}");
        }
    }
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────
