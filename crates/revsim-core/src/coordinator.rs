//! Timeout coordinator: binds the per-item countdown to the session.
//!
//! Starts a fresh countdown whenever a new item becomes current while the
//! session is Running, and turns expirations into session mutations
//! according to the configured [`TimeoutPolicy`]:
//!
//! - **AcknowledgeRequired** (default): flag the item as timed out and
//!   freeze progression until an explicit verdict key acknowledges it.
//! - **AutoAdvance**: record the forced NG immediately.
//!
//! The countdown runs on wall-clock time and is deliberately untouched by
//! lag injection; only operator pause/stop and applied verdicts stop it.

use crate::countdown::Countdown;
use crate::session::Session;
use crate::types::{SessionState, TimeoutPolicy};

/// What an expiry delivery amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpiryOutcome {
    /// Generation mismatch: superseded by a stop or restart.
    Stale,
    /// Valid expiry, but the session was not Running (e.g. mid-lag).
    Ignored,
    /// Auto-advance policy: the forced NG was recorded.
    Advanced,
    /// Acknowledge-required policy: the item is flagged, awaiting a key.
    Flagged,
}

#[derive(Debug, Clone)]
pub struct TimeoutCoordinator {
    countdown: Countdown,
    policy: TimeoutPolicy,
}

impl TimeoutCoordinator {
    pub fn new(duration_ms: u64, policy: TimeoutPolicy) -> Self {
        Self {
            countdown: Countdown::new(duration_ms),
            policy,
        }
    }

    pub fn policy(&self) -> TimeoutPolicy {
        self.policy
    }

    pub fn countdown(&self) -> &Countdown {
        &self.countdown
    }

    pub fn set_duration_ms(&mut self, duration_ms: u64) {
        self.countdown.set_duration_ms(duration_ms);
    }

    // ── Session bindings ────────────────────────────────────────

    /// A new item became current. Starts the countdown if the session is
    /// Running; returns the generation for the runtime to schedule.
    pub fn on_item_started(&mut self, state: SessionState, now_ms: u64) -> Option<u64> {
        if state != SessionState::Running {
            return None;
        }
        Some(self.countdown.start(now_ms))
    }

    /// Operator paused: the item's time budget is suspended with it.
    pub fn on_paused(&mut self) {
        self.countdown.stop();
    }

    /// Operator resumed: the current item gets a fresh budget.
    pub fn on_resumed(&mut self, now_ms: u64) -> u64 {
        self.countdown.start(now_ms)
    }

    pub fn on_stopped(&mut self) {
        self.countdown.stop();
    }

    /// An explicit verdict is about to be applied: stop the countdown first
    /// so its expiry cannot race the advance.
    pub fn on_verdict_applied(&mut self) {
        self.countdown.stop();
    }

    /// Deliver a scheduled expiry.
    pub fn on_expired(
        &mut self,
        session: &mut Session,
        generation: u64,
        _now_ms: u64,
    ) -> ExpiryOutcome {
        if !self.countdown.try_expire(generation) {
            return ExpiryOutcome::Stale;
        }
        if session.state() != SessionState::Running {
            // Expired underneath a lag or a racing state change; the next
            // item (or resume) starts a fresh budget.
            return ExpiryOutcome::Ignored;
        }
        match self.policy {
            TimeoutPolicy::AutoAdvance => {
                session.advance_timeout();
                ExpiryOutcome::Advanced
            }
            TimeoutPolicy::AcknowledgeRequired => {
                session.mark_timeout();
                ExpiryOutcome::Flagged
            }
        }
    }

    // ── Idempotent reads ────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.countdown.is_active()
    }

    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        self.countdown.remaining_ms(now_ms)
    }

    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        self.countdown.elapsed_ms(now_ms)
    }
}

// ─── Tests ───────────────────────────────────────────────────────
