//! Review-session state machine.
//!
//! Single source of truth for the review flow:
//!
//! - **Batch progression**: `start_batch` / `confirm_batch` / `cancel_batch`
//!   drive the Idle ↔ Running ↔ WaitingConfirm cycle.
//! - **Item progression**: `advance` / `advance_timeout` move through the
//!   current batch and maintain the OK/NG/timeout counters.
//! - **Notifications**: every mutation queues [`Notification`] values in
//!   order; the owner drains them with [`Session::drain_notifications`].
//!
//! The machine is pure and clock-free. Countdown timing lives in
//! [`crate::coordinator`]; input routing lives in [`crate::router`].

use crate::types::{Notification, SessionState, Verdict};

/// Largest selectable batch size (fixed display surface of 6 slots).
pub const MAX_BATCH_SIZE: u32 = 6;

/// Review-session state for one process-wide run.
#[derive(Debug, Clone)]
pub struct Session {
    state: SessionState,
    /// Monotonically increasing; 0 while no batch has ever started.
    batch_number: u64,
    /// Size of the current (or next) batch, in `[0, MAX_BATCH_SIZE]`.
    batch_size: u32,
    /// Operator-configured fixed size, applied at the next `start_batch`.
    configured_count: u32,
    /// Zero-based position within the current batch.
    item_index: u32,
    ok_count: u32,
    ng_count: u32,
    timeout_count: u32,
    /// Cumulative item index across batches; picks the underlying display
    /// asset in cycling mode. Reset only on `stop` and `cancel_batch`.
    global_item_index: u64,
    cycling_enabled: bool,
    cycling_sequence: Vec<u32>,
    /// Acknowledge-required timeout flag: the current item ran out of time
    /// and progression is frozen until an explicit verdict key arrives.
    timeout_pending: bool,
    notes: Vec<Notification>,
}

impl Default for Session {
    fn default() -> Self {
        Self::new()
    }
}

impl Session {
    pub fn new() -> Self {
        Self {
            state: SessionState::Idle,
            batch_number: 0,
            batch_size: MAX_BATCH_SIZE,
            configured_count: MAX_BATCH_SIZE,
            item_index: 0,
            ok_count: 0,
            ng_count: 0,
            timeout_count: 0,
            global_item_index: 0,
            cycling_enabled: false,
            cycling_sequence: Vec::new(),
            timeout_pending: false,
            notes: Vec::new(),
        }
    }

    // ── Accessors ───────────────────────────────────────────────

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn batch_number(&self) -> u64 {
        self.batch_number
    }

    pub fn batch_size(&self) -> u32 {
        self.batch_size
    }

    /// Zero-based index of the current item.
    pub fn item_index(&self) -> u32 {
        self.item_index
    }

    /// 1-based display index of the current item.
    pub fn current_item(&self) -> u32 {
        self.item_index + 1
    }

    pub fn ok_count(&self) -> u32 {
        self.ok_count
    }

    pub fn ng_count(&self) -> u32 {
        self.ng_count
    }

    pub fn timeout_count(&self) -> u32 {
        self.timeout_count
    }

    pub fn global_item_index(&self) -> u64 {
        self.global_item_index
    }

    pub fn cycling_enabled(&self) -> bool {
        self.cycling_enabled
    }

    pub fn timeout_pending(&self) -> bool {
        self.timeout_pending
    }

    // ── Configuration ───────────────────────────────────────────

    /// Set the fixed batch size. Out-of-range values are silently clamped
    /// to `[0, MAX_BATCH_SIZE]`; applied at the next `start_batch`.
    pub fn set_batch_count(&mut self, count: i32) {
        self.configured_count = count.clamp(0, MAX_BATCH_SIZE as i32) as u32;
        if self.state == SessionState::Idle {
            self.batch_size = self.configured_count;
        }
    }

    /// Enable or disable cycling batch sizes.
    ///
    /// Entries of 0 are dropped; entries above `MAX_BATCH_SIZE` are clamped
    /// down. Enabling with an empty (or all-invalid) sequence is a silent
    /// no-op that leaves cycling disabled.
    pub fn set_cycling(&mut self, enabled: bool, sequence: &[u32]) {
        let sequence: Vec<u32> = sequence
            .iter()
            .copied()
            .filter(|&n| n > 0)
            .map(|n| n.min(MAX_BATCH_SIZE))
            .collect();

        if enabled && sequence.is_empty() {
            self.cycling_enabled = false;
            self.cycling_sequence.clear();
            return;
        }

        self.cycling_enabled = enabled;
        self.cycling_sequence = sequence;
    }

    // ── Flow control ────────────────────────────────────────────

    /// Start a new batch. Accepted only from Idle.
    pub fn start_batch(&mut self) -> bool {
        if self.state != SessionState::Idle {
            return false;
        }

        self.batch_number += 1;
        self.item_index = 0;
        // Counters are per batch: the batch boundary resets them so the
        // batch-completed report always covers exactly one batch.
        self.ok_count = 0;
        self.ng_count = 0;
        self.timeout_count = 0;
        self.timeout_pending = false;
        self.batch_size = if self.cycling_enabled {
            let len = self.cycling_sequence.len() as u64;
            self.cycling_sequence[((self.batch_number - 1) % len) as usize]
        } else {
            self.configured_count
        };

        self.set_state(SessionState::Running);
        self.notes.push(Notification::ItemChanged {
            item: 1,
            batch_size: self.batch_size,
        });
        true
    }

    pub fn pause(&mut self) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        self.set_state(SessionState::Paused);
        true
    }

    pub fn resume(&mut self) -> bool {
        if self.state != SessionState::Paused {
            return false;
        }
        self.set_state(SessionState::Running);
        true
    }

    /// Stop the run from any state: all counters and indices reset to 0.
    pub fn stop(&mut self) {
        self.batch_number = 0;
        self.item_index = 0;
        self.ok_count = 0;
        self.ng_count = 0;
        self.timeout_count = 0;
        self.global_item_index = 0;
        self.timeout_pending = false;
        self.set_state(SessionState::Idle);
        self.notes.push(Notification::ProgressUpdated { ok: 0, ng: 0 });
    }

    pub fn confirm_batch(&mut self) -> bool {
        if self.state != SessionState::WaitingConfirm {
            return false;
        }
        self.item_index = 0;
        self.set_state(SessionState::Idle);
        true
    }

    /// Cancel at the batch boundary. Unlike `confirm_batch`, this also
    /// rewinds the cumulative asset index.
    pub fn cancel_batch(&mut self) -> bool {
        if self.state != SessionState::WaitingConfirm {
            return false;
        }
        self.item_index = 0;
        self.global_item_index = 0;
        self.set_state(SessionState::Idle);
        true
    }

    // ── Item progression ────────────────────────────────────────

    /// Record an explicit verdict and advance past the current item.
    ///
    /// No-op outside Running; in particular a second advance arriving in
    /// WaitingConfirm (the coordinator/router race at the batch boundary)
    /// is swallowed here.
    pub fn advance(&mut self, verdict: Verdict) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        self.timeout_pending = false;
        match verdict {
            Verdict::Ok => self.ok_count += 1,
            Verdict::Ng => self.ng_count += 1,
        }
        self.advance_item();
        true
    }

    /// Record a timeout-forced NG and advance. Counts toward both
    /// `ng_count` and `timeout_count`.
    pub fn advance_timeout(&mut self) -> bool {
        if self.state != SessionState::Running {
            return false;
        }
        self.timeout_pending = false;
        self.timeout_count += 1;
        self.ng_count += 1;
        self.advance_item();
        true
    }

    /// Flag the current item as timed out without advancing
    /// (acknowledge-required policy). At most once per item.
    pub fn mark_timeout(&mut self) -> bool {
        if self.state != SessionState::Running || self.timeout_pending {
            return false;
        }
        self.timeout_pending = true;
        self.notes.push(Notification::ItemTimedOut {
            item: self.current_item(),
        });
        true
    }

    fn advance_item(&mut self) {
        self.item_index += 1;
        self.global_item_index += 1;
        self.notes.push(Notification::ProgressUpdated {
            ok: self.ok_count,
            ng: self.ng_count,
        });

        if self.item_index >= self.batch_size {
            self.notes.push(Notification::BatchCompleted {
                batch_number: self.batch_number,
                ok: self.ok_count,
                ng: self.ng_count,
            });
            self.set_state(SessionState::WaitingConfirm);
            return;
        }

        self.notes.push(Notification::ItemChanged {
            item: self.current_item(),
            batch_size: self.batch_size,
        });
    }

    // ── Internals ───────────────────────────────────────────────

    fn set_state(&mut self, new_state: SessionState) {
        self.state = new_state;
        self.notes.push(Notification::StateChanged { state: new_state });
    }

    /// Direct state overwrite for the lag injector's restore path. Bypasses
    /// transition guards; must not be used for normal flow control.
    pub(crate) fn force_state(&mut self, state: SessionState) {
        self.set_state(state);
    }

    pub(crate) fn push_note(&mut self, note: Notification) {
        self.notes.push(note);
    }

    /// Take all queued notifications, in mutation order.
    pub fn drain_notifications(&mut self) -> Vec<Notification> {
        std::mem::take(&mut self.notes)
    }
}

// ─── Tests ───────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;

    fn started(count: i32) -> Session {
        let mut s = Session::new();
        s.set_batch_count(count);
        s.start_batch();
        s.drain_notifications();
        s
    }

    // ── Initial state ───────────────────────────────────────────

    #[test]
    fn initial_state() {
        let s = Session::new();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.batch_number(), 0);
        assert_eq!(s.batch_size(), MAX_BATCH_SIZE);
        assert_eq!(s.ok_count(), 0);
        assert_eq!(s.ng_count(), 0);
        assert_eq!(s.timeout_count(), 0);
        assert!(!s.timeout_pending());
    }

    // ── Batch count clamping ────────────────────────────────────

    #[test]
    fn batch_count_in_range_is_kept() {
        for n in 0..=6 {
            let mut s = Session::new();
            s.set_batch_count(n);
            s.start_batch();
            assert_eq!(s.batch_size(), n as u32);
        }
    }

    #[test]
    fn batch_count_clamps_high_and_low() {
        let mut s = Session::new();
        s.set_batch_count(7);
        assert_eq!(s.batch_size(), 6);
        s.set_batch_count(-1);
        assert_eq!(s.batch_size(), 0);
    }

    #[test]
    fn batch_count_change_applies_at_next_start() {
        let mut s = started(3);
        s.set_batch_count(5);
        // Mid-batch: current batch keeps its size.
        assert_eq!(s.batch_size(), 3);
        s.stop();
        s.start_batch();
        assert_eq!(s.batch_size(), 5);
    }

    // ── Start / pause / resume / stop ───────────────────────────

    #[test]
    fn start_batch_from_idle() {
        let mut s = Session::new();
        s.set_batch_count(3);
        assert!(s.start_batch());
        assert_eq!(s.state(), SessionState::Running);
        assert_eq!(s.batch_number(), 1);
        assert_eq!(s.current_item(), 1);

        let notes = s.drain_notifications();
        assert_eq!(
            notes,
            vec![
                Notification::StateChanged {
                    state: SessionState::Running
                },
                Notification::ItemChanged {
                    item: 1,
                    batch_size: 3
                },
            ]
        );
    }

    #[test]
    fn start_batch_rejected_outside_idle() {
        let mut s = started(3);
        assert!(!s.start_batch());
        assert_eq!(s.batch_number(), 1);
    }

    #[test]
    fn pause_resume_cycle() {
        let mut s = started(3);
        assert!(s.pause());
        assert_eq!(s.state(), SessionState::Paused);
        assert!(!s.pause());
        assert!(s.resume());
        assert_eq!(s.state(), SessionState::Running);
        assert!(!s.resume());
    }

    #[test]
    fn stop_resets_everything() {
        let mut s = started(3);
        s.advance(Verdict::Ok);
        s.advance_timeout();
        s.drain_notifications();

        s.stop();
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.batch_number(), 0);
        assert_eq!(s.item_index(), 0);
        assert_eq!(s.ok_count(), 0);
        assert_eq!(s.ng_count(), 0);
        assert_eq!(s.timeout_count(), 0);
        assert_eq!(s.global_item_index(), 0);

        let notes = s.drain_notifications();
        assert_eq!(
            notes,
            vec![
                Notification::StateChanged {
                    state: SessionState::Idle
                },
                Notification::ProgressUpdated { ok: 0, ng: 0 },
            ]
        );
    }

    // ── Advancing ───────────────────────────────────────────────

    #[test]
    fn advance_ok_increments_and_moves() {
        let mut s = started(3);
        assert!(s.advance(Verdict::Ok));
        assert_eq!(s.ok_count(), 1);
        assert_eq!(s.current_item(), 2);
        assert_eq!(s.global_item_index(), 1);
        assert_eq!(s.state(), SessionState::Running);
    }

    #[test]
    fn advance_notifies_progress_then_item() {
        let mut s = started(3);
        s.advance(Verdict::Ng);
        let notes = s.drain_notifications();
        assert_eq!(
            notes,
            vec![
                Notification::ProgressUpdated { ok: 0, ng: 1 },
                Notification::ItemChanged {
                    item: 2,
                    batch_size: 3
                },
            ]
        );
    }

    #[test]
    fn last_advance_completes_batch_without_item_changed() {
        let mut s = started(2);
        s.advance(Verdict::Ok);
        s.drain_notifications();

        s.advance(Verdict::Ng);
        assert_eq!(s.state(), SessionState::WaitingConfirm);
        let notes = s.drain_notifications();
        assert_eq!(
            notes,
            vec![
                Notification::ProgressUpdated { ok: 1, ng: 1 },
                Notification::BatchCompleted {
                    batch_number: 1,
                    ok: 1,
                    ng: 1
                },
                Notification::StateChanged {
                    state: SessionState::WaitingConfirm
                },
            ]
        );
    }

    #[test]
    fn advance_rejected_outside_running() {
        let mut s = Session::new();
        assert!(!s.advance(Verdict::Ok));

        let mut s = started(1);
        s.advance(Verdict::Ok); // completes the batch
        assert_eq!(s.state(), SessionState::WaitingConfirm);
        // Re-entrancy guard: a racing second advance is a no-op.
        assert!(!s.advance(Verdict::Ng));
        assert!(!s.advance_timeout());
        assert_eq!(s.ok_count(), 1);
        assert_eq!(s.ng_count(), 0);
    }

    #[test]
    fn advance_rejected_while_paused() {
        let mut s = started(3);
        s.pause();
        assert!(!s.advance(Verdict::Ok));
        assert_eq!(s.ok_count(), 0);
    }

    #[test]
    fn advance_timeout_counts_both() {
        let mut s = started(3);
        assert!(s.advance_timeout());
        assert_eq!(s.ng_count(), 1);
        assert_eq!(s.timeout_count(), 1);
        assert_eq!(s.ok_count(), 0);
        assert_eq!(s.current_item(), 2);
    }

    #[test]
    fn zero_size_batch_completes_on_first_verdict() {
        let mut s = started(0);
        assert_eq!(s.state(), SessionState::Running);
        s.advance(Verdict::Ok);
        assert_eq!(s.state(), SessionState::WaitingConfirm);
    }

    // ── Timeout flag ────────────────────────────────────────────

    #[test]
    fn mark_timeout_flags_once() {
        let mut s = started(3);
        assert!(s.mark_timeout());
        assert!(s.timeout_pending());
        assert!(!s.mark_timeout());

        let notes = s.drain_notifications();
        assert_eq!(notes, vec![Notification::ItemTimedOut { item: 1 }]);
    }

    #[test]
    fn mark_timeout_rejected_outside_running() {
        let mut s = Session::new();
        assert!(!s.mark_timeout());
        let mut s = started(3);
        s.pause();
        assert!(!s.mark_timeout());
    }

    #[test]
    fn advance_clears_timeout_flag() {
        let mut s = started(3);
        s.mark_timeout();
        s.advance_timeout();
        assert!(!s.timeout_pending());
        assert_eq!(s.timeout_count(), 1);
    }

    #[test]
    fn stop_clears_timeout_flag() {
        let mut s = started(3);
        s.mark_timeout();
        s.stop();
        assert!(!s.timeout_pending());
    }

    // ── Confirm / cancel ────────────────────────────────────────

    #[test]
    fn confirm_returns_to_idle() {
        let mut s = started(1);
        s.advance(Verdict::Ok);
        assert!(s.confirm_batch());
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.item_index(), 0);
        // Counters survive confirmation; the next batch start resets them.
        assert_eq!(s.ok_count(), 1);
        // Asset index keeps advancing across confirmed batches.
        assert_eq!(s.global_item_index(), 1);
    }

    #[test]
    fn batch_start_resets_counters() {
        let mut s = started(1);
        s.advance_timeout();
        s.confirm_batch();
        assert_eq!(s.ng_count(), 1);

        s.start_batch();
        assert_eq!(s.ok_count(), 0);
        assert_eq!(s.ng_count(), 0);
        assert_eq!(s.timeout_count(), 0);
        // The cumulative asset index is not a per-batch counter.
        assert_eq!(s.global_item_index(), 1);
    }

    #[test]
    fn confirm_is_idempotent() {
        let mut s = started(1);
        s.advance(Verdict::Ok);
        assert!(s.confirm_batch());
        assert!(!s.confirm_batch());
        assert_eq!(s.state(), SessionState::Idle);
    }

    #[test]
    fn cancel_rewinds_global_index() {
        let mut s = started(2);
        s.advance(Verdict::Ok);
        s.advance(Verdict::Ng);
        assert_eq!(s.global_item_index(), 2);
        assert!(s.cancel_batch());
        assert_eq!(s.state(), SessionState::Idle);
        assert_eq!(s.global_item_index(), 0);
    }

    #[test]
    fn confirm_cancel_rejected_outside_waiting() {
        let mut s = started(3);
        assert!(!s.confirm_batch());
        assert!(!s.cancel_batch());
        assert_eq!(s.state(), SessionState::Running);
    }

    // ── Cycling mode ────────────────────────────────────────────

    #[test]
    fn cycling_sequence_wraps() {
        let mut s = Session::new();
        s.set_cycling(true, &[1, 3]);

        let mut sizes = Vec::new();
        for _ in 0..3 {
            s.start_batch();
            sizes.push(s.batch_size());
            // Drain the batch and confirm to get back to Idle.
            for _ in 0..s.batch_size() {
                s.advance(Verdict::Ok);
            }
            s.confirm_batch();
        }
        assert_eq!(sizes, vec![1, 3, 1]);
    }

    #[test]
    fn cycling_entries_are_sanitized() {
        let mut s = Session::new();
        s.set_cycling(true, &[0, 9, 2]);
        assert!(s.cycling_enabled());
        s.start_batch();
        // 0 dropped, 9 clamped to 6: sequence is [6, 2].
        assert_eq!(s.batch_size(), 6);
    }

    #[test]
    fn cycling_with_empty_sequence_is_noop() {
        let mut s = Session::new();
        s.set_cycling(true, &[]);
        assert!(!s.cycling_enabled());
        s.set_cycling(true, &[0, 0]);
        assert!(!s.cycling_enabled());
        s.start_batch();
        assert_eq!(s.batch_size(), MAX_BATCH_SIZE);
    }

    #[test]
    fn cycling_disable_restores_fixed_count() {
        let mut s = Session::new();
        s.set_batch_count(4);
        s.set_cycling(true, &[2]);
        s.start_batch();
        assert_eq!(s.batch_size(), 2);
        for _ in 0..2 {
            s.advance(Verdict::Ok);
        }
        s.confirm_batch();

        s.set_cycling(false, &[]);
        s.start_batch();
        assert_eq!(s.batch_size(), 4);
    }

    // ── Counter invariants ──────────────────────────────────────

    #[test]
    fn ok_plus_ng_equals_advances() {
        let mut s = started(6);
        s.advance(Verdict::Ok);
        s.advance(Verdict::Ng);
        s.advance_timeout();
        s.advance(Verdict::Ok);
        assert_eq!(s.ok_count() + s.ng_count(), 4);
        assert!(s.timeout_count() <= s.ng_count());
    }
}
