//! CLI definition using clap derive.

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "revsim", about = "headless review-station simulator")]
pub struct Cli {
    /// UDS socket path (default: $XDG_RUNTIME_DIR/revsim/revsimd.sock)
    #[arg(long, short = 's', global = true)]
    pub socket_path: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand)]
pub enum Command {
    /// Start the station daemon (event loop + UDS server)
    Daemon(DaemonOpts),
    /// Show a station status snapshot
    Status,
    /// Poll and print the status line at an interval
    Watch(WatchOpts),
    /// Start a new batch
    Start,
    /// Pause the running batch
    Pause,
    /// Resume a paused batch
    Resume,
    /// Stop the run and reset all counters
    Stop,
    /// Send an input symbol (accept | reject | confirm | cancel)
    Key { symbol: String },
    /// Confirm the completed batch
    Confirm,
    /// Cancel the completed batch
    Cancel,
    /// Set the fixed batch size (clamped to 0-6)
    SetCount { count: i32 },
    /// Set cycling batch sizes; an empty sequence disables cycling
    SetCycling {
        /// Batch sizes to cycle through, e.g. 1 3 6
        sequence: Vec<u32>,
    },
    /// Freeze the station for a duration (config default when omitted)
    InjectLag {
        #[arg(long)]
        duration_ms: Option<u64>,
    },
    /// Open a distraction popup
    InjectPopup,
    /// Dismiss an open popup by id
    DismissPopup { id: u64 },
    /// Terminate the daemon abruptly (simulated crash)
    Crash,
    /// Print the transition log
    Transitions {
        /// Only entries with a sequence number greater than this
        #[arg(long, default_value = "0")]
        since: u64,
    },
}

#[derive(clap::Args)]
pub struct DaemonOpts {
    /// Config file path (default: revsim.json, missing file uses defaults)
    #[arg(long, short = 'c')]
    pub config: Option<String>,
}

#[derive(clap::Args)]
pub struct WatchOpts {
    /// Poll interval in milliseconds
    #[arg(long, default_value = "500")]
    pub interval_ms: u64,
}

/// Default socket path using $USER for per-user isolation.
pub fn default_socket_path() -> String {
    if let Ok(dir) = std::env::var("XDG_RUNTIME_DIR") {
        return format!("{dir}/revsim/revsimd.sock");
    }
    let user = std::env::var("USER").unwrap_or_else(|_| "unknown".to_string());
    format!("/tmp/revsim-{user}/revsimd.sock")
}
