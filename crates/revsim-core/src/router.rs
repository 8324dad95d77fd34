//! Verdict router: maps input symbols to session operations.
//!
//! Routing is state-dependent with a strict priority order, highest first:
//!
//! 1. WaitingConfirm accepts only `confirm`/`cancel`.
//! 2. Paused rejects every symbol (input is inert while paused, including
//!    during an injected lag).
//! 3. Running accepts `accept`/`reject`; with a pending timeout either
//!    verdict key acknowledges the timed-out item instead.
//! 4. Everything else is "not processed" with no side effects.
//!
//! The ordering is load-bearing: automation clients depend on which inputs
//! are swallowed in which states.

use crate::session::Session;
use crate::types::{InputSymbol, SessionState, Verdict};

/// Session operation selected for an input symbol.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteAction {
    AdvanceOk,
    AdvanceNg,
    /// Acknowledge a flagged timeout: records the forced NG.
    AcknowledgeTimeout,
    ConfirmBatch,
    CancelBatch,
}

impl RouteAction {
    /// Whether applying this action consumes the current item (and thus the
    /// active countdown).
    pub fn advances_item(self) -> bool {
        matches!(
            self,
            Self::AdvanceOk | Self::AdvanceNg | Self::AcknowledgeTimeout
        )
    }
}

/// Pure routing decision. `None` means "not processed".
pub fn route(
    state: SessionState,
    timeout_pending: bool,
    symbol: InputSymbol,
) -> Option<RouteAction> {
    match state {
        SessionState::WaitingConfirm => match symbol {
            InputSymbol::Confirm => Some(RouteAction::ConfirmBatch),
            InputSymbol::Cancel => Some(RouteAction::CancelBatch),
            _ => None,
        },
        SessionState::Paused => None,
        SessionState::Running => match symbol {
            InputSymbol::Accept | InputSymbol::Reject if timeout_pending => {
                Some(RouteAction::AcknowledgeTimeout)
            }
            InputSymbol::Accept => Some(RouteAction::AdvanceOk),
            InputSymbol::Reject => Some(RouteAction::AdvanceNg),
            _ => None,
        },
        SessionState::Idle => None,
    }
}

/// Apply a routed action to the session.
pub fn apply(session: &mut Session, action: RouteAction) -> bool {
    match action {
        RouteAction::AdvanceOk => session.advance(Verdict::Ok),
        RouteAction::AdvanceNg => session.advance(Verdict::Ng),
        RouteAction::AcknowledgeTimeout => session.advance_timeout(),
        RouteAction::ConfirmBatch => session.confirm_batch(),
        RouteAction::CancelBatch => session.cancel_batch(),
    }
}

/// Route and apply in one step. Returns whether the symbol was processed.
pub fn handle_input(session: &mut Session, symbol: InputSymbol) -> bool {
    match route(session.state(), session.timeout_pending(), symbol) {
        Some(action) => apply(session, action),
        None => false,
    }
}

// ─── Tests ───────────────────────────────────────────────────────
