use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

// ─── Session State ────────────────────────────────────────────────

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    #[default]
    Idle,
    Running,
    Paused,
    WaitingConfirm,
}

impl SessionState {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Running => "running",
            Self::Paused => "paused",
            Self::WaitingConfirm => "waiting_confirm",
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ─── Verdict & Input ──────────────────────────────────────────────

/// Operator judgment on a single item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Verdict {
    Ok,
    Ng,
}

impl Verdict {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ok => "ok",
            Self::Ng => "ng",
        }
    }
}

impl fmt::Display for Verdict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Categorical input symbol delivered by an automation client or operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
#[non_exhaustive]
pub enum InputSymbol {
    Accept,
    Reject,
    Confirm,
    Cancel,
}

impl InputSymbol {
    pub const ALL: [Self; 4] = [Self::Accept, Self::Reject, Self::Confirm, Self::Cancel];

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Confirm => "confirm",
            Self::Cancel => "cancel",
        }
    }
}

impl fmt::Display for InputSymbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for InputSymbol {
    type Err = RevsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "accept" => Ok(Self::Accept),
            "reject" => Ok(Self::Reject),
            "confirm" => Ok(Self::Confirm),
            "cancel" => Ok(Self::Cancel),
            _ => Err(RevsimError::InvalidSymbol(s.to_owned())),
        }
    }
}

// ─── Timeout Policy ───────────────────────────────────────────────

/// What happens when an item's countdown expires.
///
/// `AcknowledgeRequired` freezes progression and waits for an explicit
/// verdict key; `AutoAdvance` records the forced NG immediately and the
/// session proceeds unattended.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TimeoutPolicy {
    #[default]
    #[serde(rename = "acknowledge")]
    AcknowledgeRequired,
    #[serde(rename = "auto")]
    AutoAdvance,
}

impl TimeoutPolicy {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AcknowledgeRequired => "acknowledge",
            Self::AutoAdvance => "auto",
        }
    }
}

impl fmt::Display for TimeoutPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TimeoutPolicy {
    type Err = RevsimError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "acknowledge" => Ok(Self::AcknowledgeRequired),
            "auto" => Ok(Self::AutoAdvance),
            _ => Err(RevsimError::InvalidPolicy(s.to_owned())),
        }
    }
}

// ─── Notifications ────────────────────────────────────────────────

/// Closed set of events the session queues for its owner.
///
/// Delivered in mutation order; `item` fields are 1-based display indices.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Notification {
    StateChanged { state: SessionState },
    ItemChanged { item: u32, batch_size: u32 },
    ProgressUpdated { ok: u32, ng: u32 },
    BatchCompleted { batch_number: u64, ok: u32, ng: u32 },
    ItemTimedOut { item: u32 },
    LagStarted,
    LagEnded,
}

/// One entry in the runtime's bounded transition log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionRecord {
    pub seq: u64,
    pub at: DateTime<Utc>,
    pub event: Notification,
}

// ─── Protocol: Station <-> Client ─────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CountdownStatus {
    pub active: bool,
    pub duration_ms: u64,
    pub remaining_ms: u64,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PopupStatus {
    pub id: u64,
    pub title: String,
    pub message: String,
}

/// Full station snapshot served by the `status` method.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub state: SessionState,
    pub batch_number: u64,
    /// 1-based display index of the current item.
    pub item: u32,
    pub batch_size: u32,
    pub ok_count: u32,
    pub ng_count: u32,
    pub timeout_count: u32,
    pub global_item_index: u64,
    pub timeout_pending: bool,
    pub timeout_policy: TimeoutPolicy,
    pub countdown: CountdownStatus,
    pub lagging: bool,
    pub popups: Vec<PopupStatus>,
}

// ─── Error ────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RevsimError {
    #[error("unknown input symbol: {0:?}")]
    InvalidSymbol(String),
    #[error("unknown timeout policy: {0:?}")]
    InvalidPolicy(String),
}

// ─── Tests ────────────────────────────────────────────────────────
