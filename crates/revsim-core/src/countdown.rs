//! Single-shot countdown state with injected time.
//!
//! Pure and clock-free: callers pass `now_ms` from a monotonic source. The
//! runtime schedules the actual wake-up; expiry delivery is validated with a
//! generation counter so an expiry queued before `stop`/restart is
//! recognized as stale and dropped.

/// Floor clamp for countdown durations (milliseconds).
pub const MIN_COUNTDOWN_MS: u64 = 100;

/// Default per-item time budget (milliseconds).
pub const DEFAULT_COUNTDOWN_MS: u64 = 10_000;

#[derive(Debug, Clone)]
pub struct Countdown {
    /// Duration applied to the next start (clamped).
    duration_ms: u64,
    /// Duration captured by the active run; changing `duration_ms` does not
    /// move an in-flight deadline.
    run_duration_ms: u64,
    started_at_ms: Option<u64>,
    /// Bumped on every start and stop; an expiry event is valid only if it
    /// carries the generation of the currently active run.
    generation: u64,
}

impl Countdown {
    /// Create an inactive countdown. Duration is clamped to
    /// [`MIN_COUNTDOWN_MS`].
    pub fn new(duration_ms: u64) -> Self {
        let duration_ms = duration_ms.max(MIN_COUNTDOWN_MS);
        Self {
            duration_ms,
            run_duration_ms: duration_ms,
            started_at_ms: None,
            generation: 0,
        }
    }

    /// Set the duration for subsequent starts (clamped). An active run keeps
    /// the deadline it started with.
    pub fn set_duration_ms(&mut self, duration_ms: u64) {
        self.duration_ms = duration_ms.max(MIN_COUNTDOWN_MS);
    }

    pub fn duration_ms(&self) -> u64 {
        self.duration_ms
    }

    pub fn is_active(&self) -> bool {
        self.started_at_ms.is_some()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Start (or restart) the countdown at `now_ms`. Returns the new
    /// generation for the caller to attach to its scheduled expiry.
    pub fn start(&mut self, now_ms: u64) -> u64 {
        self.generation += 1;
        self.run_duration_ms = self.duration_ms;
        self.started_at_ms = Some(now_ms);
        self.generation
    }

    /// Stop the countdown. Invalidates any scheduled expiry.
    pub fn stop(&mut self) {
        self.generation += 1;
        self.started_at_ms = None;
    }

    /// Deliver a scheduled expiry. Returns `true` if it matched the active
    /// run (the countdown is deactivated); `false` for stale deliveries.
    pub fn try_expire(&mut self, generation: u64) -> bool {
        if self.started_at_ms.is_none() || generation != self.generation {
            return false;
        }
        self.started_at_ms = None;
        true
    }

    /// Remaining time at `now_ms`. 0 when inactive; never negative.
    pub fn remaining_ms(&self, now_ms: u64) -> u64 {
        match self.started_at_ms {
            Some(start) => start
                .saturating_add(self.run_duration_ms)
                .saturating_sub(now_ms),
            None => 0,
        }
    }

    /// Elapsed time since start, capped at the run's duration. 0 when
    /// inactive.
    pub fn elapsed_ms(&self, now_ms: u64) -> u64 {
        if self.started_at_ms.is_none() {
            return 0;
        }
        self.run_duration_ms
            .saturating_sub(self.remaining_ms(now_ms))
    }
}

// ─── Tests ───────────────────────────────────────────────────────
