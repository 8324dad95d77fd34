//! Event loop: the single logical actor owning the review station.
//!
//! All station mutations are serialized through one mpsc channel: client
//! commands (with a oneshot reply), countdown expirations, and lag
//! expirations are discrete events handled one at a time. Timer wake-ups
//! are scheduled as detached sleeps tagged with the timer's generation;
//! staleness is decided inside the loop, never by cancelling the sleeper.

use std::collections::VecDeque;
use std::time::Instant;

use tokio::sync::{mpsc, oneshot};

use revsim_core::coordinator::{ExpiryOutcome, TimeoutCoordinator};
use revsim_core::lag::LagInjector;
use revsim_core::popup::PopupInjector;
use revsim_core::router;
use revsim_core::session::Session;
use revsim_core::types::{
    CountdownStatus, InputSymbol, Notification, PopupStatus, SessionState, StatusSnapshot,
    TransitionRecord,
};

use crate::cli::DaemonOpts;
use crate::config::StationConfig;
use crate::server;

/// Maximum retained transition-log entries.
const TRANSITION_LOG_CAP: usize = 1024;

/// Exit code used by the crash injector.
const CRASH_EXIT_CODE: i32 = 86;

// ─── Events & Commands ───────────────────────────────────────────

/// A client command deserialized by the server.
#[derive(Debug, Clone)]
pub enum StationCommand {
    Status,
    Start,
    Pause,
    Resume,
    Stop,
    Confirm,
    Cancel,
    Key { symbol: InputSymbol },
    SetBatchCount { count: i32 },
    SetCycling { enabled: bool, sequence: Vec<u32> },
    InjectLag { duration_ms: Option<u64> },
    InjectPopup,
    DismissPopup { id: u64 },
    Crash,
    Transitions { since_seq: u64 },
}

/// One event on the station's serialized queue.
#[derive(Debug)]
pub enum LoopEvent {
    Command {
        command: StationCommand,
        reply: oneshot::Sender<serde_json::Value>,
    },
    CountdownExpired {
        generation: u64,
    },
    LagExpired {
        generation: u64,
    },
}

// ─── Station State ───────────────────────────────────────────────

/// Monotonic millisecond clock anchored at daemon start.
#[derive(Debug, Clone, Copy)]
struct Clock {
    origin: Instant,
}

impl Clock {
    fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }

    fn now_ms(&self) -> u64 {
        self.origin.elapsed().as_millis() as u64
    }
}

/// All station state, owned by the event-loop task.
pub struct StationState {
    session: Session,
    coordinator: TimeoutCoordinator,
    lag: LagInjector,
    popups: PopupInjector,
    lag_duration_ms: u64,
    transitions: VecDeque<TransitionRecord>,
    next_seq: u64,
    clock: Clock,
    events_tx: mpsc::Sender<LoopEvent>,
}

impl StationState {
    pub fn new(config: &StationConfig, events_tx: mpsc::Sender<LoopEvent>) -> Self {
        let mut session = Session::new();
        session.set_batch_count(config.batch.default_count);
        session.set_cycling(config.batch.cycling_enabled, &config.batch.cycling_sequence);

        Self {
            session,
            coordinator: TimeoutCoordinator::new(
                config.timeout.duration_ms(),
                config.timeout.policy,
            ),
            lag: LagInjector::new(),
            popups: PopupInjector::new(),
            lag_duration_ms: config.lag.duration_ms,
            transitions: VecDeque::new(),
            next_seq: 0,
            clock: Clock::new(),
            events_tx,
        }
    }

    pub fn handle_event(&mut self, event: LoopEvent) {
        match event {
            LoopEvent::Command { command, reply } => {
                let result = self.handle_command(command);
                // A dropped receiver just means the client went away.
                let _ = reply.send(result);
            }
            LoopEvent::CountdownExpired { generation } => {
                let now_ms = self.clock.now_ms();
                let outcome = self
                    .coordinator
                    .on_expired(&mut self.session, generation, now_ms);
                match outcome {
                    ExpiryOutcome::Stale => tracing::trace!(generation, "stale countdown expiry"),
                    ExpiryOutcome::Ignored => {
                        tracing::debug!(generation, "countdown expired outside Running")
                    }
                    ExpiryOutcome::Advanced => tracing::warn!("timeout: forced NG recorded"),
                    ExpiryOutcome::Flagged => {
                        tracing::warn!("timeout: item flagged, awaiting acknowledgement")
                    }
                }
                self.after_mutation();
            }
            LoopEvent::LagExpired { generation } => {
                if self.lag.on_expired(&mut self.session, generation) {
                    tracing::info!("lag expired");
                } else {
                    tracing::trace!(generation, "stale lag expiry");
                }
                self.after_mutation();
            }
        }
    }

    fn handle_command(&mut self, command: StationCommand) -> serde_json::Value {
        let result = match command {
            StationCommand::Status => {
                return serde_json::to_value(self.snapshot()).unwrap_or_default();
            }
            StationCommand::Start => {
                let ok = self.session.start_batch();
                serde_json::json!({ "ok": ok })
            }
            StationCommand::Pause => {
                let ok = if self.session.state() == SessionState::Running {
                    // Operator pause suspends the item's time budget; a lag
                    // injection never takes this path.
                    self.coordinator.on_paused();
                    self.session.pause()
                } else {
                    false
                };
                serde_json::json!({ "ok": ok })
            }
            StationCommand::Resume => {
                let ok = self.session.resume();
                if ok {
                    let generation = self.coordinator.on_resumed(self.clock.now_ms());
                    self.schedule_countdown(generation);
                }
                serde_json::json!({ "ok": ok })
            }
            StationCommand::Stop => {
                // Cancel an active lag first so its later expiry cannot
                // resurrect pre-stop state.
                self.lag.cancel(&mut self.session);
                self.coordinator.on_stopped();
                self.session.stop();
                serde_json::json!({ "ok": true })
            }
            StationCommand::Confirm => {
                serde_json::json!({ "ok": self.session.confirm_batch() })
            }
            StationCommand::Cancel => {
                serde_json::json!({ "ok": self.session.cancel_batch() })
            }
            StationCommand::Key { symbol } => {
                let processed = self.handle_key(symbol);
                serde_json::json!({ "processed": processed })
            }
            StationCommand::SetBatchCount { count } => {
                self.session.set_batch_count(count);
                serde_json::json!({ "ok": true, "batch_size": self.session.batch_size() })
            }
            StationCommand::SetCycling { enabled, sequence } => {
                self.session.set_cycling(enabled, &sequence);
                serde_json::json!({ "ok": true, "cycling_enabled": self.session.cycling_enabled() })
            }
            StationCommand::InjectLag { duration_ms } => {
                let duration_ms = duration_ms.unwrap_or(self.lag_duration_ms);
                let injected = match self.lag.inject(&mut self.session) {
                    Some(generation) => {
                        tracing::info!(duration_ms, "lag injected");
                        self.schedule_lag(generation, duration_ms);
                        true
                    }
                    None => false,
                };
                serde_json::json!({ "injected": injected })
            }
            StationCommand::InjectPopup => {
                let popup = self.popups.inject();
                tracing::info!(id = popup.id, title = popup.title, "popup injected");
                serde_json::json!({
                    "id": popup.id,
                    "title": popup.title,
                    "message": popup.message,
                })
            }
            StationCommand::DismissPopup { id } => {
                let dismissed = self.popups.dismiss(id);
                if dismissed {
                    tracing::info!(id, "popup dismissed");
                }
                serde_json::json!({ "dismissed": dismissed })
            }
            StationCommand::Crash => {
                tracing::error!("crash injected; terminating");
                std::process::exit(CRASH_EXIT_CODE);
            }
            StationCommand::Transitions { since_seq } => {
                let entries: Vec<&TransitionRecord> = self
                    .transitions
                    .iter()
                    .filter(|t| t.seq > since_seq)
                    .collect();
                return serde_json::json!({ "transitions": entries });
            }
        };
        self.after_mutation();
        result
    }

    fn handle_key(&mut self, symbol: InputSymbol) -> bool {
        let action = router::route(
            self.session.state(),
            self.session.timeout_pending(),
            symbol,
        );
        let Some(action) = action else {
            tracing::debug!(symbol = %symbol, state = %self.session.state(), "input not processed");
            return false;
        };
        if action.advances_item() {
            // Stop the countdown before the verdict lands so its expiry
            // cannot race the advance.
            self.coordinator.on_verdict_applied();
        }
        let processed = router::apply(&mut self.session, action);
        tracing::info!(symbol = %symbol, action = ?action, processed, "input routed");
        processed
    }

    /// Drain queued notifications: log, record, and react.
    fn after_mutation(&mut self) {
        let now = chrono::Utc::now();
        for note in self.session.drain_notifications() {
            match &note {
                Notification::StateChanged { state } => {
                    tracing::info!(state = %state, "state changed");
                }
                Notification::ItemChanged { item, batch_size } => {
                    tracing::info!(item, batch_size, "item changed");
                    if let Some(generation) = self
                        .coordinator
                        .on_item_started(self.session.state(), self.clock.now_ms())
                    {
                        self.schedule_countdown(generation);
                    }
                }
                Notification::ProgressUpdated { ok, ng } => {
                    tracing::info!(ok, ng, "progress updated");
                }
                Notification::BatchCompleted {
                    batch_number,
                    ok,
                    ng,
                } => {
                    tracing::info!(batch = batch_number, ok, ng, "batch completed");
                }
                Notification::ItemTimedOut { item } => {
                    tracing::warn!(item, "item timed out");
                }
                Notification::LagStarted => tracing::info!("lag started"),
                Notification::LagEnded => tracing::info!("lag ended"),
            }

            self.next_seq += 1;
            self.transitions.push_back(TransitionRecord {
                seq: self.next_seq,
                at: now,
                event: note,
            });
            if self.transitions.len() > TRANSITION_LOG_CAP {
                self.transitions.pop_front();
            }
        }
    }

    fn schedule_countdown(&self, generation: u64) {
        let duration_ms = self.coordinator.countdown().duration_ms();
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(duration_ms)).await;
            let _ = tx.send(LoopEvent::CountdownExpired { generation }).await;
        });
    }

    fn schedule_lag(&self, generation: u64, duration_ms: u64) {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(tokio::time::Duration::from_millis(duration_ms)).await;
            let _ = tx.send(LoopEvent::LagExpired { generation }).await;
        });
    }

    fn snapshot(&self) -> StatusSnapshot {
        let now_ms = self.clock.now_ms();
        StatusSnapshot {
            state: self.session.state(),
            batch_number: self.session.batch_number(),
            item: self.session.current_item(),
            batch_size: self.session.batch_size(),
            ok_count: self.session.ok_count(),
            ng_count: self.session.ng_count(),
            timeout_count: self.session.timeout_count(),
            global_item_index: self.session.global_item_index(),
            timeout_pending: self.session.timeout_pending(),
            timeout_policy: self.coordinator.policy(),
            countdown: CountdownStatus {
                active: self.coordinator.is_active(),
                duration_ms: self.coordinator.countdown().duration_ms(),
                remaining_ms: self.coordinator.remaining_ms(now_ms),
                elapsed_ms: self.coordinator.elapsed_ms(now_ms),
            },
            lagging: self.lag.is_lagging(),
            popups: self
                .popups
                .open()
                .iter()
                .map(|p| PopupStatus {
                    id: p.id,
                    title: p.title.to_owned(),
                    message: p.message.to_owned(),
                })
                .collect(),
        }
    }
}

// ─── Daemon entry ────────────────────────────────────────────────

/// Run the daemon: event loop + UDS server, until a shutdown signal.
pub async fn run_daemon(opts: DaemonOpts, socket_path: &str) -> anyhow::Result<()> {
    let config = StationConfig::load(opts.config.as_deref())?;
    tracing::info!(
        timeout_ms = config.timeout.duration_ms(),
        policy = %config.timeout.policy,
        batch_count = config.batch.default_count,
        cycling = config.batch.cycling_enabled,
        "station configured"
    );

    let (events_tx, mut events_rx) = mpsc::channel::<LoopEvent>(256);
    let mut state = StationState::new(&config, events_tx.clone());

    // Event-loop task: the only place station state is touched.
    let loop_handle = tokio::spawn(async move {
        while let Some(event) = events_rx.recv().await {
            state.handle_event(event);
        }
    });

    // UDS server task.
    let server_tx = events_tx.clone();
    let server_socket = socket_path.to_string();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = server::run_server(&server_socket, server_tx).await {
            tracing::error!("UDS server error: {e}");
        }
    });

    // Wait for shutdown signal (ctrl-c or SIGTERM).
    let shutdown = async {
        let ctrl_c = tokio::signal::ctrl_c();

        #[cfg(unix)]
        {
            let mut sigterm =
                tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
                    .expect("failed to register SIGTERM handler");
            tokio::select! {
                _ = ctrl_c => tracing::info!("received ctrl-c, shutting down"),
                _ = sigterm.recv() => tracing::info!("received SIGTERM, shutting down"),
            }
        }

        #[cfg(not(unix))]
        {
            ctrl_c.await.ok();
            tracing::info!("received ctrl-c, shutting down");
        }
    };

    tokio::select! {
        () = shutdown => {}
        _ = loop_handle => {
            tracing::warn!("event loop exited unexpectedly");
        }
        _ = server_handle => {
            tracing::warn!("server exited unexpectedly");
        }
    }

    // Cleanup socket
    let _ = std::fs::remove_file(socket_path);
    tracing::info!("daemon stopped");
    Ok(())
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use revsim_core::types::TimeoutPolicy;

    fn station() -> StationState {
        let (tx, _rx) = mpsc::channel(16);
        StationState::new(&StationConfig::default(), tx)
    }

    fn state_of(st: &mut StationState) -> StatusSnapshot {
        let value = st.handle_command(StationCommand::Status);
        serde_json::from_value(value).expect("status snapshot")
    }

    #[tokio::test]
    async fn status_reflects_config_defaults() {
        let mut st = station();
        let snap = state_of(&mut st);
        assert_eq!(snap.state, SessionState::Idle);
        assert_eq!(snap.batch_size, 6);
        assert_eq!(snap.timeout_policy, TimeoutPolicy::AcknowledgeRequired);
        assert_eq!(snap.countdown.duration_ms, 10_000);
        assert!(!snap.countdown.active);
        assert!(!snap.lagging);
    }

    #[tokio::test]
    async fn start_arms_countdown_and_logs_transitions() {
        let mut st = station();
        let reply = st.handle_command(StationCommand::Start);
        assert_eq!(reply["ok"], true);

        let snap = state_of(&mut st);
        assert_eq!(snap.state, SessionState::Running);
        assert_eq!(snap.batch_number, 1);
        assert!(snap.countdown.active);

        let log = st.handle_command(StationCommand::Transitions { since_seq: 0 });
        let entries = log["transitions"].as_array().expect("array");
        assert_eq!(entries.len(), 2); // state_changed + item_changed
        assert_eq!(entries[0]["event"]["kind"], "state_changed");
        assert_eq!(entries[1]["event"]["kind"], "item_changed");
    }

    #[tokio::test]
    async fn key_advances_and_rearms() {
        let mut st = station();
        st.handle_command(StationCommand::Start);

        let reply = st.handle_command(StationCommand::Key {
            symbol: InputSymbol::Accept,
        });
        assert_eq!(reply["processed"], true);

        let snap = state_of(&mut st);
        assert_eq!(snap.ok_count, 1);
        assert_eq!(snap.item, 2);
        assert!(snap.countdown.active);
    }

    #[tokio::test]
    async fn rejected_key_reports_not_processed() {
        let mut st = station();
        let reply = st.handle_command(StationCommand::Key {
            symbol: InputSymbol::Accept,
        });
        assert_eq!(reply["processed"], false);
    }

    #[tokio::test]
    async fn pause_deactivates_countdown() {
        let mut st = station();
        st.handle_command(StationCommand::Start);
        st.handle_command(StationCommand::Pause);

        let snap = state_of(&mut st);
        assert_eq!(snap.state, SessionState::Paused);
        assert!(!snap.countdown.active);
        assert_eq!(snap.countdown.remaining_ms, 0);
    }

    #[tokio::test]
    async fn lag_keeps_countdown_active() {
        let mut st = station();
        st.handle_command(StationCommand::Start);
        let reply = st.handle_command(StationCommand::InjectLag { duration_ms: None });
        assert_eq!(reply["injected"], true);

        let snap = state_of(&mut st);
        assert_eq!(snap.state, SessionState::Paused);
        assert!(snap.lagging);
        assert!(snap.countdown.active, "lag must not stop the countdown");

        let again = st.handle_command(StationCommand::InjectLag { duration_ms: None });
        assert_eq!(again["injected"], false);
    }

    #[tokio::test]
    async fn stop_cancels_lag_and_resets() {
        let mut st = station();
        st.handle_command(StationCommand::Start);
        st.handle_command(StationCommand::InjectLag { duration_ms: None });
        st.handle_command(StationCommand::Stop);

        let snap = state_of(&mut st);
        assert_eq!(snap.state, SessionState::Idle);
        assert!(!snap.lagging);
        assert_eq!(snap.batch_number, 0);
        assert!(!snap.countdown.active);
    }

    #[tokio::test]
    async fn stale_countdown_expiry_is_dropped() {
        let mut st = station();
        st.handle_command(StationCommand::Start);
        let generation = st.coordinator.countdown().generation();
        st.handle_command(StationCommand::Key {
            symbol: InputSymbol::Accept,
        });

        // The expiry scheduled for item 1 fires after the verdict; it must
        // not touch item 2.
        st.handle_event(LoopEvent::CountdownExpired { generation });
        let snap = state_of(&mut st);
        assert_eq!(snap.ng_count, 0);
        assert_eq!(snap.timeout_count, 0);
        assert_eq!(snap.item, 2);
    }

    #[tokio::test]
    async fn popup_inject_and_dismiss() {
        let mut st = station();
        let popup = st.handle_command(StationCommand::InjectPopup);
        let id = popup["id"].as_u64().expect("id");

        let snap = state_of(&mut st);
        assert_eq!(snap.popups.len(), 1);

        let reply = st.handle_command(StationCommand::DismissPopup { id });
        assert_eq!(reply["dismissed"], true);
        let reply = st.handle_command(StationCommand::DismissPopup { id });
        assert_eq!(reply["dismissed"], false);
    }

    #[tokio::test]
    async fn set_batch_count_clamps() {
        let mut st = station();
        let reply = st.handle_command(StationCommand::SetBatchCount { count: 9 });
        assert_eq!(reply["batch_size"], 6);
        let reply = st.handle_command(StationCommand::SetBatchCount { count: -2 });
        assert_eq!(reply["batch_size"], 0);
    }
}
