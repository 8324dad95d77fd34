//! revsim: headless review-station simulator runtime binary.
//! Single-process daemon embedding the session core, plus thin client
//! subcommands that drive it over the UDS socket.

use clap::Parser;

mod cli;
mod client;
mod config;
mod event_loop;
mod server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();
    let socket_path = args.socket_path.unwrap_or_else(cli::default_socket_path);

    match args.command {
        cli::Command::Daemon(opts) => {
            let filter = std::env::var("REVSIM_LOG")
                .or_else(|_| std::env::var("RUST_LOG"))
                .unwrap_or_else(|_| "info".to_string());
            tracing_subscriber::fmt()
                .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
                .init();

            tracing::info!("revsim daemon starting");
            event_loop::run_daemon(opts, &socket_path).await?;
        }
        cli::Command::Status => client::cmd_status(&socket_path).await?,
        cli::Command::Watch(opts) => client::cmd_watch(&socket_path, opts.interval_ms).await?,
        cli::Command::Start => {
            client::cmd_simple(&socket_path, "start", serde_json::Value::Null).await?
        }
        cli::Command::Pause => {
            client::cmd_simple(&socket_path, "pause", serde_json::Value::Null).await?
        }
        cli::Command::Resume => {
            client::cmd_simple(&socket_path, "resume", serde_json::Value::Null).await?
        }
        cli::Command::Stop => {
            client::cmd_simple(&socket_path, "stop", serde_json::Value::Null).await?
        }
        cli::Command::Key { symbol } => {
            let symbol: revsim_core::types::InputSymbol = symbol.parse()?;
            client::cmd_simple(
                &socket_path,
                "key",
                serde_json::json!({ "symbol": symbol.as_str() }),
            )
            .await?
        }
        cli::Command::Confirm => {
            client::cmd_simple(&socket_path, "confirm", serde_json::Value::Null).await?
        }
        cli::Command::Cancel => {
            client::cmd_simple(&socket_path, "cancel", serde_json::Value::Null).await?
        }
        cli::Command::SetCount { count } => {
            client::cmd_simple(
                &socket_path,
                "set_batch_count",
                serde_json::json!({ "count": count }),
            )
            .await?
        }
        cli::Command::SetCycling { sequence } => {
            client::cmd_simple(
                &socket_path,
                "set_cycling",
                serde_json::json!({
                    "enabled": !sequence.is_empty(),
                    "sequence": sequence,
                }),
            )
            .await?
        }
        cli::Command::InjectLag { duration_ms } => {
            client::cmd_simple(
                &socket_path,
                "inject_lag",
                serde_json::json!({ "duration_ms": duration_ms }),
            )
            .await?
        }
        cli::Command::InjectPopup => {
            client::cmd_simple(&socket_path, "inject_popup", serde_json::Value::Null).await?
        }
        cli::Command::DismissPopup { id } => {
            client::cmd_simple(
                &socket_path,
                "dismiss_popup",
                serde_json::json!({ "id": id }),
            )
            .await?
        }
        cli::Command::Crash => {
            // The daemon exits without replying; a dropped connection is the
            // expected outcome.
            match client::request(&socket_path, "crash", serde_json::Value::Null).await {
                Ok(_) => println!("crash requested"),
                Err(_) => println!("daemon terminated"),
            }
        }
        cli::Command::Transitions { since } => {
            client::cmd_transitions(&socket_path, since).await?
        }
    }

    Ok(())
}
