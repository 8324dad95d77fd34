//! UDS JSON-RPC server: minimal hand-rolled implementation.
//! Connection-per-request, newline-delimited JSON.
//!
//! The server never touches station state: every method is translated into
//! a [`StationCommand`] and sent to the event loop, which replies through a
//! oneshot channel.

use std::str::FromStr;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::{mpsc, oneshot};

use revsim_core::types::InputSymbol;

use crate::event_loop::{LoopEvent, StationCommand};

/// Run the UDS JSON-RPC server.
pub async fn run_server(
    socket_path: &str,
    events_tx: mpsc::Sender<LoopEvent>,
) -> anyhow::Result<()> {
    // Create socket directory with mode 0700
    let socket_dir = std::path::Path::new(socket_path)
        .parent()
        .ok_or_else(|| anyhow::anyhow!("invalid socket path"))?;

    std::fs::create_dir_all(socket_dir)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_dir, std::fs::Permissions::from_mode(0o700))?;
    }

    // Check for stale socket
    if std::path::Path::new(socket_path).exists() {
        if tokio::net::UnixStream::connect(socket_path).await.is_err() {
            std::fs::remove_file(socket_path)?;
            tracing::info!("removed stale socket at {socket_path}");
        } else {
            anyhow::bail!("another daemon is already running at {socket_path}");
        }
    }

    let listener = UnixListener::bind(socket_path)?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(socket_path, std::fs::Permissions::from_mode(0o600))?;
    }

    tracing::info!("UDS server listening on {socket_path}");

    loop {
        let (stream, _) = listener.accept().await?;
        let events_tx = events_tx.clone();
        tokio::spawn(async move {
            if let Err(e) = handle_connection(stream, events_tx).await {
                tracing::debug!("connection error: {e}");
            }
        });
    }
}

async fn handle_connection(
    stream: tokio::net::UnixStream,
    events_tx: mpsc::Sender<LoopEvent>,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();
    reader.read_line(&mut line).await?;

    let request: serde_json::Value = serde_json::from_str(line.trim())?;
    let method = request["method"].as_str().unwrap_or("");
    let params = &request["params"];
    let id = request["id"].clone();

    let command = match parse_command(method, params) {
        Ok(command) => command,
        Err(error) => {
            let response = serde_json::json!({
                "jsonrpc": "2.0",
                "error": error,
                "id": id,
            });
            let mut resp = serde_json::to_string(&response)?;
            resp.push('\n');
            writer.write_all(resp.as_bytes()).await?;
            return Ok(());
        }
    };

    let (reply_tx, reply_rx) = oneshot::channel();
    events_tx
        .send(LoopEvent::Command {
            command,
            reply: reply_tx,
        })
        .await
        .map_err(|_| anyhow::anyhow!("event loop is gone"))?;
    let result = reply_rx
        .await
        .map_err(|_| anyhow::anyhow!("event loop dropped the reply"))?;

    let response = serde_json::json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    });
    let mut resp = serde_json::to_string(&response)?;
    resp.push('\n');
    writer.write_all(resp.as_bytes()).await?;

    Ok(())
}

fn method_not_found() -> serde_json::Value {
    serde_json::json!({"code": -32601, "message": "method not found"})
}

fn invalid_params(message: &str) -> serde_json::Value {
    serde_json::json!({"code": -32602, "message": message})
}

/// Map a JSON-RPC method + params onto a station command.
fn parse_command(
    method: &str,
    params: &serde_json::Value,
) -> Result<StationCommand, serde_json::Value> {
    match method {
        "status" => Ok(StationCommand::Status),
        "start" => Ok(StationCommand::Start),
        "pause" => Ok(StationCommand::Pause),
        "resume" => Ok(StationCommand::Resume),
        "stop" => Ok(StationCommand::Stop),
        "confirm" => Ok(StationCommand::Confirm),
        "cancel" => Ok(StationCommand::Cancel),
        "key" => {
            let symbol = params["symbol"]
                .as_str()
                .ok_or_else(|| invalid_params("missing symbol"))?;
            let symbol = InputSymbol::from_str(symbol)
                .map_err(|e| invalid_params(&e.to_string()))?;
            Ok(StationCommand::Key { symbol })
        }
        "set_batch_count" => {
            let count = params["count"]
                .as_i64()
                .ok_or_else(|| invalid_params("missing count"))?;
            Ok(StationCommand::SetBatchCount {
                count: count.clamp(i32::MIN as i64, i32::MAX as i64) as i32,
            })
        }
        "set_cycling" => {
            let enabled = params["enabled"]
                .as_bool()
                .ok_or_else(|| invalid_params("missing enabled"))?;
            let sequence = params["sequence"]
                .as_array()
                .map(|entries| {
                    entries
                        .iter()
                        .filter_map(|v| v.as_u64())
                        .map(|n| n.min(u32::MAX as u64) as u32)
                        .collect()
                })
                .unwrap_or_default();
            Ok(StationCommand::SetCycling { enabled, sequence })
        }
        "inject_lag" => Ok(StationCommand::InjectLag {
            duration_ms: params["duration_ms"].as_u64(),
        }),
        "inject_popup" => Ok(StationCommand::InjectPopup),
        "dismiss_popup" => {
            let id = params["id"]
                .as_u64()
                .ok_or_else(|| invalid_params("missing id"))?;
            Ok(StationCommand::DismissPopup { id })
        }
        "crash" => Ok(StationCommand::Crash),
        "transitions" => Ok(StationCommand::Transitions {
            since_seq: params["since_seq"].as_u64().unwrap_or(0),
        }),
        _ => Err(method_not_found()),
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn known_methods_parse() {
        for method in [
            "status",
            "start",
            "pause",
            "resume",
            "stop",
            "confirm",
            "cancel",
            "inject_popup",
            "crash",
        ] {
            assert!(
                parse_command(method, &serde_json::Value::Null).is_ok(),
                "method {method}"
            );
        }
    }

    #[test]
    fn unknown_method_is_rejected() {
        let err = parse_command("reboot", &serde_json::Value::Null).unwrap_err();
        assert_eq!(err["code"], -32601);
    }

    #[test]
    fn key_requires_valid_symbol() {
        let params = serde_json::json!({"symbol": "accept"});
        assert!(matches!(
            parse_command("key", &params),
            Ok(StationCommand::Key {
                symbol: InputSymbol::Accept
            })
        ));

        let params = serde_json::json!({"symbol": "zap"});
        let err = parse_command("key", &params).unwrap_err();
        assert_eq!(err["code"], -32602);

        let err = parse_command("key", &serde_json::Value::Null).unwrap_err();
        assert_eq!(err["code"], -32602);
    }

    #[test]
    fn set_cycling_parses_sequence() {
        let params = serde_json::json!({"enabled": true, "sequence": [1, 3, 6]});
        match parse_command("set_cycling", &params) {
            Ok(StationCommand::SetCycling { enabled, sequence }) => {
                assert!(enabled);
                assert_eq!(sequence, vec![1, 3, 6]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn inject_lag_duration_is_optional() {
        match parse_command("inject_lag", &serde_json::Value::Null) {
            Ok(StationCommand::InjectLag { duration_ms }) => assert!(duration_ms.is_none()),
            other => panic!("unexpected: {other:?}"),
        }
        let params = serde_json::json!({"duration_ms": 1500});
        match parse_command("inject_lag", &params) {
            Ok(StationCommand::InjectLag { duration_ms }) => assert_eq!(duration_ms, Some(1500)),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
