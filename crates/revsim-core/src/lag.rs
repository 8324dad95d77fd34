//! Lag injector: an operator-visible freeze with the countdown still live.
//!
//! Injection saves the session state and, if the session was Running,
//! pauses it, which also makes input inert for the duration. The item
//! countdown is deliberately not touched: it runs on wall-clock time, so an
//! automation client watching the display must not mistake the freeze for a
//! stopped clock.
//!
//! Restore distinguishes two paths: a saved Running state goes back through
//! the public `resume()` transition; any other saved state is rewritten
//! directly (Idle→Idle, Paused→Paused and WaitingConfirm→WaitingConfirm are
//! safe no-op restorations that bypass the transition guards).

use crate::session::Session;
use crate::types::{Notification, SessionState};

/// Default freeze length (milliseconds).
pub const DEFAULT_LAG_MS: u64 = 3_000;

#[derive(Debug, Clone, Default)]
pub struct LagInjector {
    saved_state: Option<SessionState>,
    /// Bumped on every injection and cancellation; a lag-timer expiry is
    /// valid only if it carries the generation of the active injection.
    generation: u64,
}

impl LagInjector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_lagging(&self) -> bool {
        self.saved_state.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Begin a lag. No-op if one is already active. Returns the generation
    /// for the runtime to attach to its scheduled end-of-lag event.
    pub fn inject(&mut self, session: &mut Session) -> Option<u64> {
        if self.is_lagging() {
            return None;
        }

        let saved = session.state();
        self.saved_state = Some(saved);
        if saved == SessionState::Running {
            session.pause();
        }
        session.push_note(Notification::LagStarted);

        self.generation += 1;
        Some(self.generation)
    }

    /// Cut the lag short. Runs the same restore as natural expiry and
    /// invalidates the still-pending lag timer.
    pub fn cancel(&mut self, session: &mut Session) -> bool {
        if !self.is_lagging() {
            return false;
        }
        self.generation += 1;
        self.finish(session);
        true
    }

    /// Deliver a scheduled end-of-lag. Stale generations are dropped.
    pub fn on_expired(&mut self, session: &mut Session, generation: u64) -> bool {
        if !self.is_lagging() || generation != self.generation {
            return false;
        }
        self.finish(session);
        true
    }

    fn finish(&mut self, session: &mut Session) {
        let Some(saved) = self.saved_state.take() else {
            return;
        };
        if saved == SessionState::Running {
            session.resume();
        } else {
            session.force_state(saved);
        }
        session.push_note(Notification::LagEnded);
    }
}

// ─── Tests ───────────────────────────────────────────────────────
