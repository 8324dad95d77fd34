//! revsim-core: the pure review-station core.
//!
//! Models an operator workflow used to validate external automation
//! clients: a bounded batch of items, one OK/NG verdict per item inside a
//! time window, and injectable faults (lag, popups). No I/O, no async, no
//! system clock: the runtime injects monotonic milliseconds and schedules
//! timer wake-ups; everything here is deterministic and unit-testable.
//!
//! Module map:
//!
//! - [`session`]: the review-session state machine (single source of truth)
//! - [`countdown`]: single-shot countdown state with stale-expiry rejection
//! - [`coordinator`]: binds the countdown to the session; timeout policies
//! - [`router`]: state-dependent input routing
//! - [`lag`] / [`popup`]: fault injectors
//! - [`types`]: shared vocabulary and client-facing protocol types

pub mod coordinator;
pub mod countdown;
pub mod lag;
pub mod popup;
pub mod router;
pub mod session;
pub mod types;

pub use coordinator::{ExpiryOutcome, TimeoutCoordinator};
pub use countdown::{Countdown, DEFAULT_COUNTDOWN_MS, MIN_COUNTDOWN_MS};
pub use lag::{DEFAULT_LAG_MS, LagInjector};
pub use popup::{PopupInjector, PopupRecord};
pub use router::{RouteAction, apply, handle_input, route};
pub use session::{MAX_BATCH_SIZE, Session};
pub use types::{
    CountdownStatus, InputSymbol, Notification, PopupStatus, RevsimError, SessionState,
    StatusSnapshot, TimeoutPolicy, TransitionRecord, Verdict,
};
